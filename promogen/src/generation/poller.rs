//! Waiting on long-running synthesis operations.

use crate::synthesis::{OperationHandle, OperationStatus, SynthesisClient, SynthesisError, VideoRef};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Video generation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Video generation was interrupted by a server shutdown")]
    Cancelled,

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

/// Poll `handle` every `interval` until it finishes.
///
/// The first check happens one interval after the call. Gives up with `TimedOut` once `timeout`
/// has elapsed and with `Cancelled` as soon as `cancel` fires; a failed status check ends the
/// wait immediately.
#[instrument(skip(client, cancel), fields(operation = %handle), err)]
pub async fn poll_operation(
    client: &dyn SynthesisClient,
    handle: &OperationHandle,
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<VideoRef, PollError> {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let wait = async {
        let mut checks = 0u32;
        loop {
            ticker.tick().await;
            checks += 1;
            match client.poll_video(handle).await? {
                OperationStatus::Pending => debug!(checks, "Operation still running"),
                OperationStatus::Done(video) => {
                    debug!(checks, "Operation finished");
                    return Ok::<_, PollError>(video);
                }
            }
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(PollError::Cancelled),
        result = tokio::time::timeout(timeout, wait) => result.unwrap_or(Err(PollError::TimedOut(timeout))),
    }
}
