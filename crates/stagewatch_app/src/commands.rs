use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use stagewatch_core::{
    detect_shape, ArchiveStatus, FileMap, FileTree, JobStatus, JobView, Msg, TrackerView,
};
use stagewatch_engine::{
    archive_path, build_archive, AtomicFileWriter, ChannelManager, JobApi, ReqwestJobApi,
    TrackerHandle, ARCHIVE_FILE_NAME, README_NAME,
};
use stagewatch_logging::sw_info;
use tokio::sync::watch;

use crate::cli::OutputArgs;
use crate::config::AppSettings;
use crate::persistence::{load_history, save_history};
use crate::render::{history_line, write_previews, write_summary, write_tree, Printer};

/// Submits `prompt` and follows the job it creates.
pub async fn submit(settings: &AppSettings, prompt: String, output: &OutputArgs) -> Result<()> {
    if prompt.trim().is_empty() {
        bail!("prompt is empty");
    }
    follow_job(settings, Msg::PromptSubmitted(prompt), output).await
}

/// Follows a job submitted earlier.
pub async fn watch(settings: &AppSettings, job_id: String, output: &OutputArgs) -> Result<()> {
    let created_at = (settings.engine.clock)();
    follow_job(settings, Msg::ResumeJob { job_id, created_at }, output).await
}

async fn follow_job(settings: &AppSettings, start: Msg, output: &OutputArgs) -> Result<()> {
    let client = Arc::new(ReqwestJobApi::new(&settings.engine.api).context("configuring the job API client")?);
    let push_base = Some(client.base_url().clone());
    let api: Arc<dyn JobApi> = client;
    let manager = ChannelManager::new(api.clone(), push_base, settings.engine.clone());
    let tracker = TrackerHandle::spawn(api, manager, &settings.engine, settings.output_dir.clone());

    let mut rx = tracker.subscribe();
    tracker.send(Msg::RestoreHistory(load_history(&settings.output_dir)));
    tracker.send(start);

    let mut printer = Printer::new();
    let mut stdout = io::stdout();
    let outcome = follow(&tracker, &mut rx, &mut printer, &mut stdout, job_settled).await;
    let view = match outcome {
        Ok(Some(view)) => view,
        Ok(None) => {
            let view = tracker.view();
            if let Some(job) = &view.job {
                writeln!(
                    stdout,
                    "stopped following job {id}; it keeps running on the service (resume with `stagewatch watch {id}`)",
                    id = job.job_id
                )?;
            }
            tracker.shutdown().await;
            return Ok(());
        }
        Err(err) => {
            tracker.shutdown().await;
            return Err(err);
        }
    };

    let Some(job) = view.job.clone() else {
        tracker.shutdown().await;
        let message = view.submit_error.unwrap_or_else(|| "no job was created".to_string());
        bail!("submission failed: {message}");
    };

    let view = if output.archive {
        match &job.files {
            Some(files) => {
                tracker.send(Msg::ArchiveRequested {
                    readme: readme_for(&job, files),
                });
                match follow(&tracker, &mut rx, &mut printer, &mut stdout, archive_settled).await {
                    Ok(Some(view)) => view,
                    Ok(None) => tracker.view(),
                    Err(err) => {
                        tracker.shutdown().await;
                        return Err(err);
                    }
                }
            }
            None => {
                writeln!(stdout, "no result files to archive")?;
                view
            }
        }
    } else {
        view
    };

    save_history(&settings.output_dir, &view.history);
    tracker.shutdown().await;

    let job = view.job.ok_or_else(|| anyhow!("job disappeared from the tracker"))?;
    write_summary(&mut stdout, &job, output.preview)?;
    if job.status == JobStatus::Failed {
        bail!("job {} failed", job.job_id);
    }
    Ok(())
}

/// Prints every view change until `done` holds. `None` means the user interrupted.
async fn follow<W: Write>(
    tracker: &TrackerHandle,
    rx: &mut watch::Receiver<TrackerView>,
    printer: &mut Printer,
    out: &mut W,
    done: fn(&TrackerView) -> bool,
) -> Result<Option<TrackerView>> {
    loop {
        tokio::select! {
            changed = rx.changed() => {
                changed.context("tracker stopped unexpectedly")?;
                let view = rx.borrow_and_update().clone();
                printer.update(out, &view)?;
                if done(&view) {
                    return Ok(Some(view));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracker.send(Msg::CancelClicked);
                return Ok(None);
            }
        }
    }
}

fn job_settled(view: &TrackerView) -> bool {
    match &view.job {
        Some(job) => job.status.is_terminal() && !job.observing,
        None => !view.submitting && view.submit_error.is_some(),
    }
}

fn archive_settled(view: &TrackerView) -> bool {
    view.job
        .as_ref()
        .is_some_and(|job| matches!(job.archive, ArchiveStatus::Ready { .. } | ArchiveStatus::Failed(_)))
}

/// README for the archive root, unless the job generated one that would land there.
fn readme_for(job: &JobView, files: &FileMap) -> Option<String> {
    if files.keys().any(|path| archive_path(path) == README_NAME) {
        return None;
    }
    let mut readme = String::from("# Generated project\n\n");
    if !job.prompt.is_empty() {
        readme.push_str(&job.prompt);
        readme.push_str("\n\n");
    }
    readme.push_str(&format!("Job `{}`, created {}.\n", job.job_id, job.created_at));
    Some(readme)
}

/// Normalizes a saved payload offline and optionally archives it.
pub fn normalize(settings: &AppSettings, payload_path: &Path, output: &OutputArgs) -> Result<()> {
    let text = fs::read_to_string(payload_path).with_context(|| format!("reading {}", payload_path.display()))?;
    let value: Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {} as JSON", payload_path.display()))?;
    let payload = result_payload(value);

    let mut stdout = io::stdout();
    let files = match detect_shape(&payload) {
        Some(shape) => {
            writeln!(stdout, "shape: {:?}", shape.kind())?;
            shape.into_files()
        }
        None => {
            writeln!(stdout, "shape: none recognised")?;
            FileMap::new()
        }
    };
    writeln!(stdout, "{} files:", files.len())?;
    write_tree(&mut stdout, &FileTree::from_files(&files))?;
    if output.preview {
        write_previews(&mut stdout, &files)?;
    }

    if output.archive {
        let name = payload_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("payload");
        let bytes = build_archive(&files, None).context("building archive")?;
        let writer = AtomicFileWriter::for_job(&settings.output_dir, name);
        let path = writer.write(ARCHIVE_FILE_NAME, &bytes).context("saving archive")?;
        sw_info!("archive for {} written to {:?}", payload_path.display(), path);
        writeln!(stdout, "archive: {} ({} B)", path.display(), bytes.len())?;
    }
    Ok(())
}

/// A whole job-status response is unwrapped to its result; anything else is the result itself.
fn result_payload(value: Value) -> Value {
    if let Value::Object(map) = &value {
        if map.contains_key("status") {
            if let Some(results) = map.get("results").or_else(|| map.get("result")) {
                return results.clone();
            }
        }
    }
    value
}

pub fn history(settings: &AppSettings) -> Result<()> {
    let jobs = load_history(&settings.output_dir);
    let mut stdout = io::stdout();
    if jobs.is_empty() {
        writeln!(stdout, "no finished jobs recorded in {}", settings.output_dir.display())?;
        return Ok(());
    }
    for job in &jobs {
        writeln!(stdout, "{}", history_line(job))?;
    }
    Ok(())
}
