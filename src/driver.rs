//! Driver runs a relay loop on a tokio blocking thread

use futures::Stream;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::pacing::Clock;
use crate::relay::{RelayLoop, RelayReport, RelayStats};
use crate::sink::DeviceSink;

/// Handles returned by [`RelayDriver::spawn`]
pub struct RelayChannels {
    /// Counters, updated after every loop iteration
    pub stats: watch::Receiver<RelayStats>,
    /// Cancelling latches `terminate`; the loop stops at its next iteration
    pub cancel: CancellationToken,
    /// Completes with the loop's report once it stops
    pub finished: JoinHandle<RelayReport>,
}

impl RelayChannels {
    /// Stats as a stream, starting with the current value
    pub fn stats_updates(&self) -> impl Stream<Item = RelayStats> + Unpin + use<> {
        WatchStream::new(self.stats.clone())
    }

    /// Cancel the loop and wait for its report.
    pub async fn shutdown(self) -> Result<RelayReport, JoinError> {
        self.cancel.cancel();
        self.finished.await
    }
}

/// Driver spawns the relay loop and its cancellation bridge
///
/// The loop is blocking and single-threaded, so it runs on one
/// `spawn_blocking` thread for its whole life. A small async task bridges
/// the cancellation token to the loop's `terminate` flag.
pub struct RelayDriver;

impl RelayDriver {
    /// Spawn `relay` on the current tokio runtime.
    ///
    /// Must be called from within a runtime.
    pub fn spawn<S, C>(mut relay: RelayLoop<S, C>) -> RelayChannels
    where
        S: DeviceSink + Send + 'static,
        C: Clock + Send + 'static,
    {
        let (stats_tx, stats_rx) = watch::channel(relay.stats().clone());
        relay.attach_stats_sender(stats_tx);

        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        let flags = relay.flags();

        let bridge_cancel = cancel.clone();
        let bridge_done = done.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = bridge_cancel.cancelled() => {
                    debug!("Relay cancelled, latching terminate");
                    flags.request_terminate();
                }
                _ = bridge_done.cancelled() => {}
            }
        });

        let finished = tokio::task::spawn_blocking(move || {
            // Releases the bridge task however the loop ends, panics included.
            let _done = done.drop_guard();
            info!("Relay thread started");
            relay.run()
        });

        RelayChannels { stats: stats_rx, cancel, finished }
    }
}
