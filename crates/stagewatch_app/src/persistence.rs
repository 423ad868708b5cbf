use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stagewatch_core::{CompletedJobSnapshot, JobStatus};
use stagewatch_engine::{ensure_output_dir, AtomicFileWriter};
use stagewatch_logging::{sw_error, sw_info, sw_warn};

const STATE_FILENAME: &str = ".stagewatch_state.ron";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedJob {
    job_id: String,
    status: String,
    created_at: String,
    #[serde(default)]
    file_count: Option<usize>,
    #[serde(default)]
    archive_path: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedState {
    jobs: Vec<PersistedJob>,
}

/// Finished jobs recorded by earlier runs. A missing or unreadable file means no history.
pub(crate) fn load_history(output_dir: &Path) -> Vec<CompletedJobSnapshot> {
    let path = output_dir.join(STATE_FILENAME);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Vec::new();
        }
        Err(err) => {
            sw_warn!("Failed to read job history from {:?}: {}", path, err);
            return Vec::new();
        }
    };

    let state: PersistedState = match ron::from_str(&content) {
        Ok(state) => state,
        Err(err) => {
            sw_warn!("Failed to parse job history from {:?}: {}", path, err);
            return Vec::new();
        }
    };

    let jobs: Vec<CompletedJobSnapshot> = state
        .jobs
        .into_iter()
        .map(|job| CompletedJobSnapshot {
            job_id: job.job_id,
            status: JobStatus::from(job.status),
            created_at: job.created_at,
            file_count: job.file_count,
            archive_path: job.archive_path,
            error: job.error,
        })
        .collect();

    sw_info!("Loaded {} finished jobs from {:?}", jobs.len(), path);
    jobs
}

pub(crate) fn save_history(output_dir: &Path, jobs: &[CompletedJobSnapshot]) {
    if let Err(err) = ensure_output_dir(output_dir) {
        sw_error!("Failed to ensure output dir {:?}: {}", output_dir, err);
        return;
    }

    let state = PersistedState {
        jobs: jobs
            .iter()
            .map(|job| PersistedJob {
                job_id: job.job_id.clone(),
                status: job.status.to_string(),
                created_at: job.created_at.clone(),
                file_count: job.file_count,
                archive_path: job.archive_path.clone(),
                error: job.error.clone(),
            })
            .collect(),
    };

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(&state, pretty) {
        Ok(text) => text,
        Err(err) => {
            sw_error!("Failed to serialize job history: {}", err);
            return;
        }
    };

    let writer = AtomicFileWriter::new(PathBuf::from(output_dir));
    if let Err(err) = writer.write(STATE_FILENAME, content.as_bytes()) {
        sw_error!("Failed to write job history to {:?}: {}", output_dir, err);
    }
}
