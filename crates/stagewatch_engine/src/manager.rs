use std::sync::Arc;

use reqwest::Url;
use stagewatch_logging::{sw_debug, sw_warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::poll::run_poll;
use crate::push::{push_url, run_push};
use crate::{ChannelEvent, EngineConfig, JobApi};

const EVENT_BUFFER: usize = 256;

/// Owns the push subscription and the poll loop for observed jobs.
#[derive(Clone)]
pub struct ChannelManager {
    api: Arc<dyn JobApi>,
    push_base: Option<Url>,
    config: EngineConfig,
}

/// A running observation: one merged event stream for one job.
pub struct Observation {
    job_id: String,
    events: mpsc::Receiver<ChannelEvent>,
    cancel: CancellationToken,
}

impl Observation {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Next event from either channel. `None` after [`ChannelEvent::Closed`].
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Detaches local observation. The backend job keeps running.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl ChannelManager {
    /// `push_base` is the API base URL the push address is derived from; `None` disables push.
    pub fn new(api: Arc<dyn JobApi>, push_base: Option<Url>, config: EngineConfig) -> Self {
        Self {
            api,
            push_base,
            config,
        }
    }

    /// Starts observing `job_id`. Must be called inside a Tokio runtime.
    pub fn start(&self, job_id: &str) -> Observation {
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let manager = self.clone();
        let task_job_id = job_id.to_string();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            manager.observe(task_job_id, tx, task_cancel).await;
        });
        Observation {
            job_id: job_id.to_string(),
            events,
            cancel,
        }
    }

    async fn observe(self, job_id: String, tx: mpsc::Sender<ChannelEvent>, cancel: CancellationToken) {
        // Push and poll stop together: whichever side ends the observation cancels the other.
        let channels = cancel.child_token();

        let push = self.push_base.as_ref().filter(|_| self.config.push_enabled).map(|base| {
            let target = push_url(base, &job_id);
            let tx = tx.clone();
            let channels = channels.clone();
            let keepalive = self.config.keepalive_interval;
            let job_id = job_id.clone();
            tokio::spawn(async move {
                let result = match target {
                    Ok(url) => run_push(url, keepalive, tx.clone(), channels).await,
                    Err(err) => Err(err),
                };
                if let Err(err) = result {
                    sw_warn!("push channel for job {} failed: {}; continuing with polling only", job_id, err);
                    let _ = tx.send(ChannelEvent::PushDegraded { reason: err.to_string() }).await;
                }
            })
        });

        self.backfill(&job_id, &tx).await;

        run_poll(
            self.api.clone(),
            job_id.clone(),
            self.config.poll_interval,
            tx.clone(),
            channels.clone(),
        )
        .await;

        channels.cancel();
        if let Some(push) = push {
            let _ = push.await;
        }
        sw_debug!("observation of job {} closed", job_id);
        let _ = tx.send(ChannelEvent::Closed).await;
    }

    /// Replays the log entries recorded before the push subscription opened.
    async fn backfill(&self, job_id: &str, tx: &mpsc::Sender<ChannelEvent>) {
        match self.api.fetch_logs(job_id).await {
            Ok(events) => {
                for event in events {
                    if tx.send(ChannelEvent::Raw(event)).await.is_err() {
                        return;
                    }
                }
            }
            Err(err) => sw_debug!("log backfill for {} unavailable: {}", job_id, err),
        }
    }
}
