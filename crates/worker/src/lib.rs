//! The worker pool: consumes the job stream, resolves per-chat
//! configuration, calls the provider, and replies.
//!
//! Delivery discipline per job (see the queue crate): success acks; failure
//! with retries left re-enqueues a bumped copy and then acks the old entry;
//! terminal failure posts a user-visible error and acks. A crash between
//! re-enqueue and ack duplicates, never loses.

pub mod error;

mod job;

pub use error::{Result, WorkerError};
pub use job::PresetParams;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use botmetrics::Metrics;
use envelope::Keyring;
use providers::RetryPolicy;
use queue::{QueueMessage, StreamQueue};
use storage::Store;
use telegram_api::BotClient;

const READ_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Collaborators and tunables for the pool.
pub struct WorkerDeps {
    pub bot: BotClient,
    pub store: Store,
    pub queue: StreamQueue,
    pub keyring: Keyring,
    /// Client used for provider calls; carries the per-call timeout.
    pub http: reqwest::Client,
    pub provider_retry: RetryPolicy,
    pub max_job_retries: u32,
}

pub struct Worker {
    pub(crate) bot: BotClient,
    pub(crate) store: Store,
    pub(crate) queue: StreamQueue,
    pub(crate) keyring: Keyring,
    pub(crate) http: reqwest::Client,
    pub(crate) provider_retry: RetryPolicy,
    pub(crate) max_job_retries: u32,
    pub(crate) metrics: &'static Metrics,
}

impl Worker {
    pub fn new(deps: WorkerDeps) -> Self {
        Self {
            bot: deps.bot,
            store: deps.store,
            queue: deps.queue,
            keyring: deps.keyring,
            http: deps.http,
            provider_retry: deps.provider_retry,
            max_job_retries: deps.max_job_retries,
            metrics: botmetrics::global(),
        }
    }

    /// Ensure the consumer group exists, then fan out `concurrency`
    /// consumers. Returns once every consumer has observed shutdown and
    /// drained its current job.
    pub async fn start(
        self: Arc<Self>,
        concurrency: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        self.queue.ensure_group().await?;
        let concurrency = concurrency.max(1);
        info!(concurrency, consumer = self.queue.consumer(), "worker pool starting");

        let mut handles = Vec::with_capacity(concurrency);
        for slot in 0..concurrency {
            let worker = Arc::clone(&self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                worker.consume_loop(slot, shutdown).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        info!("worker pool stopped");
        Ok(())
    }

    async fn consume_loop(&self, slot: usize, mut shutdown: watch::Receiver<bool>) {
        'reconnect: loop {
            if *shutdown.borrow() {
                return;
            }

            let mut reader = loop {
                match self.queue.reader().await {
                    Ok(reader) => break reader,
                    Err(e) => {
                        error!(slot, error = %e, "failed to open queue reader");
                        tokio::select! {
                            _ = shutdown.changed() => return,
                            _ = tokio::time::sleep(READ_RETRY_DELAY) => {}
                        }
                    }
                }
            };

            loop {
                if *shutdown.borrow() {
                    return;
                }

                let messages = tokio::select! {
                    _ = shutdown.changed() => return,
                    result = reader.read(1) => match result {
                        Ok(messages) => messages,
                        Err(e) => {
                            error!(slot, error = %e, "failed to read queue");
                            tokio::select! {
                                _ = shutdown.changed() => return,
                                _ = tokio::time::sleep(READ_RETRY_DELAY) => {}
                            }
                            continue 'reconnect;
                        }
                    }
                };

                for message in messages {
                    self.handle_message(slot, message).await;
                }
            }
        }
    }

    /// Ack / re-enqueue / terminal-reply bookkeeping around one job.
    async fn handle_message(&self, slot: usize, message: QueueMessage) {
        let QueueMessage { id, job } = message;

        match self.process_job(&job).await {
            Ok(()) => {
                self.metrics.processed_jobs.inc();
                if let Err(e) = self.queue.ack(&id).await {
                    error!(slot, entry_id = %id, error = %e, "failed to ack message");
                }
            }
            Err(e) => {
                self.metrics.failed_jobs.inc();
                error!(
                    slot,
                    job_id = %job.job_id,
                    attempt = job.attempts,
                    error = %e,
                    "job failed"
                );

                if job.attempts < self.max_job_retries {
                    let mut retry = job.clone();
                    retry.attempts += 1;
                    // Enqueue before ack: a crash in between duplicates
                    // instead of losing the job.
                    if let Err(e) = self.queue.enqueue(retry).await {
                        error!(slot, job_id = %job.job_id, error = %e, "failed to re-enqueue failed job");
                        return;
                    }
                    if let Err(e) = self.queue.ack(&id).await {
                        error!(slot, entry_id = %id, error = %e, "failed to ack after re-enqueue");
                    }
                } else {
                    self.send_error(
                        job.chat_id,
                        job.message_id,
                        "LLM provider error. Please try again later.",
                    )
                    .await;
                    if let Err(e) = self.queue.ack(&id).await {
                        error!(slot, entry_id = %id, error = %e, "failed to ack terminal failed message");
                    }
                }
            }
        }
    }

    async fn send_error(&self, chat_id: i64, reply_to: i64, text: &str) {
        let reply_to = (reply_to > 0).then_some(reply_to);
        if let Err(e) = self.bot.send_message(chat_id, text, reply_to).await {
            error!(chat_id, error = %e, "failed to send error reply");
        }
    }
}
