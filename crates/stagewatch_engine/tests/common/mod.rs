#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use stagewatch_core::{JobStatusReport, JobTicket, RawEvent};
use stagewatch_engine::{ApiError, EngineConfig, JobApi};

/// In-memory job service: answers status polls from a script, repeating the last answer.
pub struct ScriptedApi {
    job_id: String,
    statuses: Mutex<VecDeque<Result<JobStatusReport, ApiError>>>,
    logs: Vec<RawEvent>,
    polls: Mutex<usize>,
}

impl ScriptedApi {
    pub fn new(job_id: &str, statuses: Vec<Result<JobStatusReport, ApiError>>, logs: Vec<RawEvent>) -> Self {
        Self {
            job_id: job_id.to_string(),
            statuses: Mutex::new(statuses.into()),
            logs,
            polls: Mutex::new(0),
        }
    }

    pub fn polls(&self) -> usize {
        *self.polls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl JobApi for ScriptedApi {
    async fn submit(&self, _prompt: &str) -> Result<JobTicket, ApiError> {
        Ok(JobTicket {
            job_id: self.job_id.clone(),
            status: Default::default(),
        })
    }

    async fn fetch_status(&self, _job_id: &str) -> Result<JobStatusReport, ApiError> {
        *self.polls.lock().unwrap() += 1;
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap()
        } else {
            statuses.front().cloned().unwrap()
        }
    }

    async fn fetch_logs(&self, _job_id: &str) -> Result<Vec<RawEvent>, ApiError> {
        Ok(self.logs.clone())
    }
}

pub fn fast_config() -> EngineConfig {
    EngineConfig {
        poll_interval: Duration::from_millis(20),
        keepalive_interval: Duration::from_millis(50),
        clock: std::sync::Arc::new(|| "2026-10-16T09:00:00Z".to_string()),
        ..EngineConfig::default()
    }
}
