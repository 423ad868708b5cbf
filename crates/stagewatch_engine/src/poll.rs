use std::sync::Arc;
use std::time::Duration;

use stagewatch_logging::{sw_debug, sw_info};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{ApiError, ChannelEvent, JobApi};

/// Polls the job-status resource every `interval` until the job is terminal or `cancel` fires.
///
/// Failed polls are logged and retried on the next tick; a job the service
/// does not know yet answers 404 for a short while after submission.
pub async fn run_poll(
    api: Arc<dyn JobApi>,
    job_id: String,
    interval: Duration,
    tx: mpsc::Sender<ChannelEvent>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let report = tokio::select! {
            _ = cancel.cancelled() => return,
            report = api.fetch_status(&job_id) => report,
        };
        match report {
            Ok(report) => {
                let terminal = report.status.is_terminal();
                if tx.send(ChannelEvent::Polled(report)).await.is_err() {
                    return;
                }
                if terminal {
                    sw_info!("poll observed terminal status for {}", job_id);
                    return;
                }
            }
            Err(ApiError::HttpStatus(404)) => sw_debug!("job {} not registered yet", job_id),
            Err(err) => sw_debug!("status poll for {} failed: {}", job_id, err),
        }
    }
}
