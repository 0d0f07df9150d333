//! Change feed subscription.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::session::Session;
use crate::transport::ChangeSource;

/// A live change-feed subscription. Dropping it stops the polling task.
pub struct FeedSubscription {
    task: JoinHandle<()>,
    cursor: Arc<AtomicU64>,
}

impl FeedSubscription {
    pub(crate) fn spawn(
        session: Session,
        source: Arc<dyn ChangeSource>,
        wait: Duration,
        retry_delay: Duration,
    ) -> Self {
        let cursor = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(poll_loop(
            session,
            source,
            wait,
            retry_delay,
            cursor.clone(),
        ));
        Self { task, cursor }
    }

    /// Last feed sequence number seen.
    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!("Feed subscription closed at cursor {}", self.cursor());
    }
}

async fn poll_loop(
    session: Session,
    source: Arc<dyn ChangeSource>,
    wait: Duration,
    retry_delay: Duration,
    cursor_cell: Arc<AtomicU64>,
) {
    let handshake = loop {
        match source.handshake().await {
            Ok(batch) => break batch,
            Err(e) => {
                tracing::warn!("Feed handshake failed, retrying in {:?}: {}", retry_delay, e);
                tokio::time::sleep(retry_delay).await;
            }
        }
    };
    let mut cursor = handshake.cursor;
    let mut epoch = handshake.epoch;
    cursor_cell.store(cursor, Ordering::Release);
    tracing::debug!("Subscribed to change feed {} at cursor {}", epoch, cursor);

    // Changes made before the handshake are not in the feed for us.
    session.on_external_change();

    loop {
        match source.poll(cursor, wait).await {
            Ok(batch) => {
                if batch.epoch != epoch {
                    // The server restarted; our cursor means nothing there.
                    tracing::info!(
                        "Change feed restarted ({} -> {}), resyncing at cursor {}",
                        epoch,
                        batch.epoch,
                        batch.cursor
                    );
                    epoch = batch.epoch;
                    session.on_external_change();
                } else if batch.has_changes() {
                    tracing::debug!(
                        "Feed delivered {} event(s){}",
                        batch.events.len(),
                        if batch.truncated { ", truncated" } else { "" }
                    );
                    session.on_external_change();
                }
                cursor = batch.cursor;
                cursor_cell.store(cursor, Ordering::Release);
            }
            Err(e) => {
                tracing::warn!("Feed poll failed, retrying in {:?}: {}", retry_delay, e);
                tokio::time::sleep(retry_delay).await;
            }
        }
    }
}
