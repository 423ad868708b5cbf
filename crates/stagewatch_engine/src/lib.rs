//! Stagewatch engine: job API client, push and poll channels, archive output and the tracker actor.
mod archive;
mod client;
mod manager;
mod persist;
mod poll;
mod push;
mod tracker;
mod types;
mod wire;

pub use archive::{
    archive_path, build_archive, plan_layout, ArchiveError, PlannedEntry, ARCHIVE_FILE_NAME, MANIFEST_NAME,
    README_NAME,
};
pub use client::{parse_base_url, JobApi, ReqwestJobApi};
pub use manager::{ChannelManager, Observation};
pub use persist::{ensure_output_dir, job_archive_dir, AtomicFileWriter, PersistError};
pub use poll::run_poll;
pub use push::{push_url, run_push};
pub use tracker::TrackerHandle;
pub use types::{ApiError, ApiSettings, ChannelError, ChannelEvent, Clock, EngineConfig};
pub use wire::decode_push_frame;
