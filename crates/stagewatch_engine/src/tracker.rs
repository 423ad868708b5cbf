use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use stagewatch_core::{update, Effect, FileMap, JobId, Msg, TrackerState, TrackerView};
use stagewatch_logging::{sw_debug, sw_error, JobContextGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::archive::{build_archive, ArchiveError, ARCHIVE_FILE_NAME};
use crate::{AtomicFileWriter, ChannelEvent, ChannelManager, Clock, EngineConfig, JobApi, Observation};

/// Handle to the single-writer job tracker.
///
/// All state changes go through one task: user messages, events from both
/// channels and effect results are queued on the same inbox and applied one
/// at a time with [`stagewatch_core::update`].
pub struct TrackerHandle {
    inbox: mpsc::UnboundedSender<Msg>,
    view: watch::Receiver<TrackerView>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl TrackerHandle {
    /// Spawns the tracker on the current Tokio runtime. Archives are saved under `output_dir`.
    pub fn spawn(api: Arc<dyn JobApi>, manager: ChannelManager, config: &EngineConfig, output_dir: PathBuf) -> Self {
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let state = TrackerState::with_config(config.weights, config.classifier);
        let (view_tx, view) = watch::channel(state.view());
        let shutdown = CancellationToken::new();

        let tracker = Tracker {
            state,
            api,
            manager,
            clock: config.clock.clone(),
            output_dir,
            inbox: inbox.clone(),
            observations: HashMap::new(),
            view_tx,
        };
        let task = tokio::spawn(tracker.run(inbox_rx, shutdown.clone()));

        Self {
            inbox,
            view,
            shutdown,
            task,
        }
    }

    pub fn send(&self, msg: Msg) {
        let _ = self.inbox.send(msg);
    }

    pub fn view(&self) -> TrackerView {
        self.view.borrow().clone()
    }

    /// Receiver that is notified after every state change.
    pub fn subscribe(&self) -> watch::Receiver<TrackerView> {
        self.view.clone()
    }

    /// Stops the tracker and detaches every observation.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
    }
}

struct Tracker {
    state: TrackerState,
    api: Arc<dyn JobApi>,
    manager: ChannelManager,
    clock: Clock,
    output_dir: PathBuf,
    inbox: mpsc::UnboundedSender<Msg>,
    /// Live channel pairs by job, tagged with the observation id that started them.
    observations: HashMap<JobId, (u64, CancellationToken)>,
    view_tx: watch::Sender<TrackerView>,
}

impl Tracker {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Msg>, shutdown: CancellationToken) {
        loop {
            let msg = tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = inbox.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            self.dispatch(msg);
        }
        for (_, (_, token)) in self.observations.drain() {
            token.cancel();
        }
    }

    fn dispatch(&mut self, msg: Msg) {
        if let Msg::ObservationClosed { job_id, observation } = &msg {
            if self.observations.get(job_id).is_some_and(|(live, _)| live == observation) {
                self.observations.remove(job_id);
            }
        }

        let state = std::mem::take(&mut self.state);
        let (mut next, effects) = {
            let _ctx = state.job().map(|job| JobContextGuard::enter(&job.job_id));
            update(state, msg)
        };
        if next.consume_dirty() {
            self.view_tx.send_replace(next.view());
        }
        self.state = next;

        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::SubmitPrompt { request_id, prompt } => {
                let api = self.api.clone();
                let clock = self.clock.clone();
                self.spawn_reply(async move {
                    match api.submit(&prompt).await {
                        Ok(ticket) => Msg::JobAccepted {
                            request_id,
                            job_id: ticket.job_id,
                            created_at: clock(),
                        },
                        Err(err) => Msg::SubmitFailed {
                            request_id,
                            message: err.to_string(),
                        },
                    }
                });
            }
            Effect::StartObserving { job_id, observation: id } => {
                let observation = self.manager.start(&job_id);
                if let Some((_, old)) = self.observations.insert(job_id, (id, observation.stop_token())) {
                    old.cancel();
                }
                tokio::spawn(forward(observation, id, self.inbox.clone()));
            }
            Effect::StopObserving { job_id } => {
                if let Some((_, token)) = self.observations.remove(&job_id) {
                    sw_debug!("detaching observation of {}", job_id);
                    token.cancel();
                }
            }
            Effect::FetchResult { job_id } => {
                let api = self.api.clone();
                self.spawn_reply(async move {
                    match api.fetch_status(&job_id).await {
                        Ok(report) => Msg::ResultFetched { job_id, report },
                        Err(err) => Msg::ResultFetchFailed {
                            job_id,
                            message: err.to_string(),
                        },
                    }
                });
            }
            Effect::BuildArchive { job_id, files, readme } => {
                let writer = AtomicFileWriter::for_job(&self.output_dir, &job_id);
                self.spawn_reply(async move {
                    let built =
                        tokio::task::spawn_blocking(move || save_archive(&writer, &files, readme.as_deref())).await;
                    match built {
                        Ok(Ok((path, bytes))) => Msg::ArchiveBuilt {
                            job_id,
                            path: path.display().to_string(),
                            bytes,
                        },
                        Ok(Err(err)) => {
                            sw_error!("archive for {} failed: {}", job_id, err);
                            Msg::ArchiveFailed {
                                job_id,
                                message: err.to_string(),
                            }
                        }
                        Err(err) => Msg::ArchiveFailed {
                            job_id,
                            message: err.to_string(),
                        },
                    }
                });
            }
        }
    }

    fn spawn_reply<F>(&self, work: F)
    where
        F: std::future::Future<Output = Msg> + Send + 'static,
    {
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let _ = inbox.send(work.await);
        });
    }
}

/// Turns one observation's channel events into tracker messages.
async fn forward(mut observation: Observation, id: u64, inbox: mpsc::UnboundedSender<Msg>) {
    let job_id = observation.job_id().to_string();
    while let Some(event) = observation.next().await {
        let msg = match event {
            ChannelEvent::Raw(event) => Msg::Observed {
                job_id: job_id.clone(),
                event,
            },
            ChannelEvent::Polled(report) => Msg::StatusPolled {
                job_id: job_id.clone(),
                report,
            },
            ChannelEvent::PushDegraded { reason } => Msg::PushDegraded {
                job_id: job_id.clone(),
                reason,
            },
            ChannelEvent::Closed => break,
        };
        if inbox.send(msg).is_err() {
            return;
        }
    }
    let _ = inbox.send(Msg::ObservationClosed {
        job_id,
        observation: id,
    });
}

fn save_archive(
    writer: &AtomicFileWriter,
    files: &FileMap,
    readme: Option<&str>,
) -> Result<(PathBuf, u64), ArchiveError> {
    let bytes = build_archive(files, readme)?;
    let path = writer.write(ARCHIVE_FILE_NAME, &bytes)?;
    Ok((path, bytes.len() as u64))
}
