//! hyprbot: multi-tenant LLM chat-bot backend.
//!
//! One binary, three deployment modes: `WEBHOOK` runs the ingress only,
//! `WORKER` runs the queue consumers only, `ALL` runs both. Any mix of the
//! two roles scales horizontally behind the shared Redis stream and the
//! shared configuration store.

mod config;
mod poll;
mod server;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use envelope::Keyring;
use ingress::{Service, ServiceConfig, ServiceDeps, UpdateDispatcher};
use queue::{RateLimiter, StreamQueue, TtlCache, UpdateDeduplicator};
use storage::Store;
use telegram_api::{scrub_token, BotClient};
use worker::{Worker, WorkerDeps};

use crate::config::{AppMode, Config};
use crate::server::WebhookSink;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const MAX_UPDATE_HANDLERS: usize = 100;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_new(&cfg.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cfg).await {
        error!(error = %e, "fatal startup error");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        mode = ?cfg.app_mode,
        access_mode = cfg.access_mode.as_str(),
        dev_polling = cfg.dev_polling,
        admin_user_id = cfg.admin_user_id,
        "starting hyprbot"
    );

    // Shared infrastructure.
    info!(driver = %cfg.db.driver, "opening configuration store");
    let store = Store::connect(&cfg.db.dsn).await?;
    if cfg.db.auto_migrate {
        store.init_schema().await?;
    }

    let redis_client = queue::client(&cfg.redis.addr, &cfg.redis.password, cfg.redis.db)?;
    let redis_conn = queue::connect(&redis_client).await?;

    let keyring = Keyring::new(cfg.crypto.current_key_id.clone(), cfg.crypto.keys.clone())?;

    let bot = BotClient::new(cfg.bot_token.clone())?;
    let me = bot
        .get_me()
        .await
        .map_err(|e| format!("identify bot: {e}"))?;
    let bot_username = me.username.clone().unwrap_or_default();
    info!(bot_username = %bot_username, bot_id = me.id, "telegram bot initialized");

    let job_queue = StreamQueue::new(
        redis_client.clone(),
        cfg.redis.queue_stream.clone(),
        cfg.redis.queue_group.clone(),
        cfg.worker.consumer_name.clone(),
        cfg.redis.queue_block,
    )
    .await?;

    botmetrics::global();

    // Root cancellation: SIGINT/SIGTERM flips the watch.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(wait_for_signal(shutdown_tx));

    // Role selection.
    let run_polling = cfg.dev_polling && cfg.app_mode != AppMode::Worker;
    let run_webhook = !run_polling && matches!(cfg.app_mode, AppMode::Webhook | AppMode::All);
    let run_ingress = run_polling || run_webhook;
    let run_worker = matches!(cfg.app_mode, AppMode::Worker | AppMode::All);

    let mut webhook_route = None;
    if run_ingress {
        let service = Service::new(ServiceDeps {
            bot: bot.clone(),
            store: store.clone(),
            queue: job_queue.clone(),
            keyring: keyring.clone(),
            rate: RateLimiter::new(redis_conn.clone(), cfg.rate_limit_per_hour),
            dedupe: UpdateDeduplicator::new(redis_conn.clone(), cfg.redis.update_dedupe_ttl),
            cache: TtlCache::new(redis_conn.clone()),
            config: ServiceConfig {
                bot_username,
                access_mode: cfg.access_mode,
                admin_user_id: cfg.admin_user_id,
                admin_cache_ttl: cfg.redis.admin_cache_ttl,
                wizard_ttl: cfg.redis.wizard_ttl,
            },
        });
        let dispatcher = Arc::new(UpdateDispatcher::new(Arc::new(service), MAX_UPDATE_HANDLERS));

        if run_polling {
            tokio::spawn(poll::run(bot.clone(), Arc::clone(&dispatcher), shutdown_rx.clone()));
        } else {
            let path = if cfg.webhook.secret_path.is_empty() {
                "telegram".to_string()
            } else {
                cfg.webhook.secret_path.clone()
            };
            if cfg.webhook.public_url.is_empty() {
                return Err("WEBHOOK_URL is required in webhook mode".into());
            }
            let webhook_url = format!("{}/{}", cfg.webhook.public_url.trim_end_matches('/'), path);
            bot.set_webhook(&webhook_url, &cfg.webhook.secret_token, false)
                .await
                .map_err(|e| format!("set webhook: {e}"))?;
            info!(webhook_url = %scrub_token(&webhook_url, bot.token()), "webhook registered");

            webhook_route = Some((
                path,
                WebhookSink {
                    dispatcher,
                    secret_token: cfg.webhook.secret_token.clone(),
                },
            ));
        }
    }

    // HTTP listener runs in every mode: healthz + metrics, plus the webhook
    // sink when registered.
    let app = server::router(webhook_route);
    let listen_addr = server::normalize_listen_addr(&cfg.webhook.listen_addr);
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!(addr = %listen_addr, "http server started");
    let mut server_shutdown = shutdown_rx.clone();
    let server_task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await;
        if let Err(e) = result {
            error!(component = "http", error = %e, "http server failed");
        }
    });

    // Worker pool.
    let mut worker_task = None;
    if run_worker {
        let http = reqwest::Client::builder()
            .timeout(cfg.http.client_timeout)
            .build()?;
        let pool = Arc::new(Worker::new(WorkerDeps {
            bot: bot.clone(),
            store: store.clone(),
            queue: job_queue.clone(),
            keyring: keyring.clone(),
            http,
            provider_retry: providers_retry(&cfg),
            max_job_retries: cfg.worker.max_retries,
        }));
        let shutdown = shutdown_rx.clone();
        let concurrency = cfg.worker.concurrency;
        worker_task = Some(tokio::spawn(async move {
            if let Err(e) = pool.start(concurrency, shutdown).await {
                error!(component = "worker", error = %e, "worker pool failed");
            }
        }));
        info!(concurrency = cfg.worker.concurrency, "worker started");
    }

    // Park until the shutdown signal, then drain with a bounded grace.
    let mut shutdown = shutdown_rx.clone();
    let _ = shutdown.changed().await;
    info!("shutdown signal received");

    let _ = tokio::time::timeout(SHUTDOWN_GRACE, server_task).await;
    if let Some(task) = worker_task {
        let _ = tokio::time::timeout(cfg.http.client_timeout, task).await;
    }
    store.close().await;
    info!("stopped");
    Ok(())
}

fn providers_retry(cfg: &Config) -> providers::RetryPolicy {
    providers::RetryPolicy {
        max_retries: cfg.http.max_retries,
        backoff_base: cfg.http.backoff_base,
    }
}

async fn wait_for_signal(shutdown: watch::Sender<bool>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                let _ = ctrl_c.await;
                let _ = shutdown.send(true);
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    let _ = shutdown.send(true);
}
