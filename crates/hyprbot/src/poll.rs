//! Dev-mode long polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use ingress::UpdateDispatcher;
use telegram_api::BotClient;

const POLL_TIMEOUT: Duration = Duration::from_secs(50);
const POLL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Long-poll updates until shutdown. Deletes any registered webhook first
/// and drops pending updates, so a dev instance never fights a deployed
/// webhook.
pub async fn run(
    bot: BotClient,
    dispatcher: Arc<UpdateDispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = bot.delete_webhook(true).await {
        error!(component = "telegram", error = %e, "failed to delete webhook before polling");
    }
    info!("polling mode started");

    let mut offset = 0i64;
    loop {
        if *shutdown.borrow() {
            return;
        }

        let updates = tokio::select! {
            _ = shutdown.changed() => return,
            result = bot.get_updates(offset, POLL_TIMEOUT) => match result {
                Ok(updates) => updates,
                Err(e) => {
                    error!(component = "telegram", error = %e, "get updates failed");
                    tokio::select! {
                        _ = shutdown.changed() => return,
                        _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                    }
                    continue;
                }
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            dispatcher.dispatch(update);
        }
    }
}
