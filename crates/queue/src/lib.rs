//! Shared-state layer over Redis: the at-least-once job stream, the hourly
//! rate limiter, the update deduplicator, and a small TTL'd key/value
//! store.
//!
//! All handles are cheap clones over a multiplexed connection; blocking
//! stream reads open their own connection per consumer (see
//! [`StreamQueue::reader`]).

pub mod dedupe;
pub mod error;
pub mod job;
pub mod kv;
pub mod ratelimit;
pub mod stream;

pub use dedupe::UpdateDeduplicator;
pub use error::{QueueError, Result};
pub use job::Job;
pub use kv::TtlCache;
pub use ratelimit::{RateDecision, RateLimiter};
pub use stream::{QueueMessage, QueueReader, StreamQueue};

use redis::aio::ConnectionManager;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

/// Build a Redis client from the `host:port` / password / db triple the
/// environment provides.
pub fn client(addr: &str, password: &str, db: i64) -> Result<redis::Client> {
    let (host, port) = addr
        .rsplit_once(':')
        .and_then(|(h, p)| p.parse::<u16>().ok().map(|p| (h.to_string(), p)))
        .ok_or_else(|| QueueError::InvalidAddr(addr.to_string()))?;

    let info = ConnectionInfo {
        addr: ConnectionAddr::Tcp(host, port),
        redis: RedisConnectionInfo {
            db,
            password: if password.is_empty() {
                None
            } else {
                Some(password.to_string())
            },
            ..Default::default()
        },
    };
    Ok(redis::Client::open(info)?)
}

/// Open a managed (auto-reconnecting) connection.
pub async fn connect(client: &redis::Client) -> Result<ConnectionManager> {
    Ok(ConnectionManager::new(client.clone()).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_parses_addr() {
        assert!(client("127.0.0.1:6379", "", 0).is_ok());
        assert!(client("redis.internal:6380", "hunter2", 3).is_ok());
        assert!(matches!(
            client("no-port", "", 0),
            Err(QueueError::InvalidAddr(_))
        ));
        assert!(matches!(
            client("host:notaport", "", 0),
            Err(QueueError::InvalidAddr(_))
        ));
    }
}
