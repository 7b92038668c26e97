//! At-least-once job stream over Redis consumer groups.
//!
//! Each job is one stream entry with a single `payload` field holding the
//! JSON-encoded [`Job`]. Delivery is at-least-once: a worker that finishes
//! acks; a worker that fails re-enqueues a fresh entry with bumped
//! `attempts` and only then acks the old one, so a crash between the two
//! steps duplicates rather than loses.

use std::time::Duration;

use chrono::Utc;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tracing::warn;

use crate::error::Result;
use crate::job::Job;

const PAYLOAD_FIELD: &str = "payload";

/// Producer/acker handle for the job stream. Cheap to clone.
#[derive(Clone)]
pub struct StreamQueue {
    client: redis::Client,
    conn: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
    block: Duration,
}

/// One delivered entry.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: String,
    pub job: Job,
}

impl StreamQueue {
    pub async fn new(
        client: redis::Client,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
        block: Duration,
    ) -> Result<Self> {
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client,
            conn,
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
            block,
        })
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Create the consumer group at the stream head if absent. A
    /// "group already exists" reply is swallowed; safe to call from every
    /// worker concurrently.
    pub async fn ensure_group(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<String> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "$")
            .await;
        match created {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append a job. Assigns `job_id` and `enqueued_at` when missing and
    /// returns the engine-assigned entry id.
    pub async fn enqueue(&self, mut job: Job) -> Result<String> {
        if job.job_id.trim().is_empty() {
            job.job_id = Job::new_job_id();
        }
        if job.enqueued_at.is_none() {
            job.enqueued_at = Some(Utc::now());
        }
        let payload = serde_json::to_string(&job)?;

        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(&self.stream, "*", &[(PAYLOAD_FIELD, payload)])
            .await?;
        Ok(id)
    }

    /// Acknowledge an entry in the group and delete it from the stream.
    /// Both must succeed for the ack to be complete.
    pub async fn ack(&self, entry_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(&self.stream, &self.group, &[entry_id]).await?;
        let _: i64 = conn.xdel(&self.stream, &[entry_id]).await?;
        Ok(())
    }

    /// Open a dedicated connection for blocking group reads. Each consumer
    /// loop holds its own reader so a blocked `XREADGROUP` never stalls
    /// enqueues or acks on the shared connection.
    pub async fn reader(&self) -> Result<QueueReader> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(QueueReader {
            conn,
            stream: self.stream.clone(),
            group: self.group.clone(),
            consumer: self.consumer.clone(),
            block: self.block,
        })
    }
}

/// A consumer's blocking read handle.
pub struct QueueReader {
    conn: MultiplexedConnection,
    stream: String,
    group: String,
    consumer: String,
    block: Duration,
}

impl QueueReader {
    /// Blocking read of new entries for this consumer. An idle long-poll
    /// returns an empty batch. Entries with a missing or unparsable payload
    /// are skipped with a warning.
    pub async fn read(&mut self, count: usize) -> Result<Vec<QueueMessage>> {
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(count)
            .block(self.block.as_millis() as usize);

        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[&self.stream], &[">"], &options)
            .await?;

        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                let Some(payload) = entry.get::<String>(PAYLOAD_FIELD) else {
                    warn!(entry_id = %entry.id, "stream entry without payload field");
                    continue;
                };
                match serde_json::from_str::<Job>(&payload) {
                    Ok(job) => out.push(QueueMessage { id: entry.id, job }),
                    Err(e) => {
                        warn!(entry_id = %entry.id, error = %e, "skipping undecodable job payload");
                    }
                }
            }
        }
        Ok(out)
    }
}
