//! Plain-text rendering of the tracker view for the terminal.

use std::io::{self, Write};

use stagewatch_core::{
    prepare_preview, ArchiveStatus, CompletedJobSnapshot, FileMap, FileTree, JobStatus, JobView, LogLine,
    StageRowView, StageStatus, TrackerView,
};

const BAR_WIDTH: usize = 20;

pub fn progress_bar(percent: u8) -> String {
    let filled = usize::from(percent.min(100)) * BAR_WIDTH / 100;
    format!("[{}{}] {:>3}%", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled), percent)
}

fn stage_status_label(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => "pending",
        StageStatus::Running => "running",
        StageStatus::Completed => "done",
        StageStatus::Failed => "FAILED",
    }
}

pub fn stage_line(row: &StageRowView) -> String {
    let mut line = format!(
        "  {:<10} {:<7} {:>3}%  (weight {})",
        row.stage.label(),
        stage_status_label(row.status),
        row.intra_progress,
        row.weight
    );
    if let Some(message) = &row.last_message {
        line.push_str("  ");
        line.push_str(message);
    }
    line
}

/// One display-log line; `*` marks events that moved a stage.
pub fn log_line(line: &LogLine) -> String {
    let marker = if line.classified { '*' } else { ' ' };
    match &line.agent {
        Some(agent) => format!("{marker} [{}] {agent}: {}", line.channel, line.message),
        None => format!("{marker} [{}] {}", line.channel, line.message),
    }
}

pub fn history_line(job: &CompletedJobSnapshot) -> String {
    let files = job
        .file_count
        .map(|count| format!("{count} files"))
        .unwrap_or_else(|| "no result".to_string());
    let mut line = format!("{}  {:<9}  {}  {}", job.created_at, job.status.as_str(), job.job_id, files);
    if let Some(path) = &job.archive_path {
        line.push_str("  ");
        line.push_str(path);
    }
    if let Some(error) = &job.error {
        line.push_str("  error: ");
        line.push_str(error);
    }
    line
}

pub fn write_tree<W: Write>(out: &mut W, tree: &FileTree) -> io::Result<()> {
    if tree.is_empty() {
        return writeln!(out, "  (no files recognised in the result)");
    }
    for line in tree.lines() {
        writeln!(out, "  {line}")?;
    }
    Ok(())
}

pub fn write_previews<W: Write>(out: &mut W, files: &FileMap) -> io::Result<()> {
    for (path, content) in files {
        writeln!(out, "===== {path} =====")?;
        writeln!(out, "{}", prepare_preview(content))?;
    }
    Ok(())
}

/// Prints what changed between successive views of one job.
#[derive(Debug, Default)]
pub struct Printer {
    last_log: Option<LogLine>,
    last_progress: Option<(JobStatus, u8, Vec<StageStatus>)>,
    degraded_shown: bool,
    submit_error_shown: bool,
}

impl Printer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update<W: Write>(&mut self, out: &mut W, view: &TrackerView) -> io::Result<()> {
        if let Some(error) = &view.submit_error {
            if !self.submit_error_shown {
                self.submit_error_shown = true;
                writeln!(out, "submission failed: {error}")?;
            }
        }
        let Some(job) = &view.job else {
            return Ok(());
        };

        for line in self.unseen_log(&job.log) {
            writeln!(out, "{}", log_line(line))?;
        }
        self.last_log = job.log.last().cloned();

        if let Some(reason) = &job.push_degraded {
            if !self.degraded_shown {
                self.degraded_shown = true;
                writeln!(out, "! live updates unavailable ({reason}); polling for status")?;
            }
        }

        let progress = (
            job.status,
            job.overall,
            job.stages.iter().map(|row| row.status).collect::<Vec<_>>(),
        );
        if self.last_progress.as_ref() != Some(&progress) {
            write_progress(out, job)?;
            self.last_progress = Some(progress);
        }
        Ok(())
    }

    /// Log lines after the last one printed. The log drops its oldest lines
    /// once full, so position is found by content rather than index.
    fn unseen_log<'a>(&self, log: &'a [LogLine]) -> &'a [LogLine] {
        match &self.last_log {
            None => log,
            Some(last) => match log.iter().rposition(|line| line == last) {
                Some(index) => &log[index + 1..],
                None => log,
            },
        }
    }
}

fn write_progress<W: Write>(out: &mut W, job: &JobView) -> io::Result<()> {
    writeln!(out, "job {} {} {}", job.job_id, job.status, progress_bar(job.overall))?;
    for row in &job.stages {
        writeln!(out, "{}", stage_line(row))?;
    }
    Ok(())
}

/// Final summary: status, error, file tree, previews and archive outcome.
pub fn write_summary<W: Write>(out: &mut W, job: &JobView, preview: bool) -> io::Result<()> {
    writeln!(out, "job {} finished: {} ({}%)", job.job_id, job.status, job.overall)?;
    if let Some(error) = &job.error {
        writeln!(out, "error: {error}")?;
    }
    match (&job.tree, job.file_count) {
        (Some(tree), Some(count)) => {
            writeln!(out, "{count} files:")?;
            write_tree(out, tree)?;
        }
        _ => writeln!(out, "no result files")?,
    }
    if preview {
        if let Some(files) = &job.files {
            write_previews(out, files)?;
        }
    }
    match &job.archive {
        ArchiveStatus::Idle | ArchiveStatus::Building => {}
        ArchiveStatus::Ready { path, bytes } => writeln!(out, "archive: {path} ({bytes} B)")?,
        ArchiveStatus::Failed(message) => writeln!(out, "archive failed: {message}")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use stagewatch_core::{update, Channel, Msg, RawEvent, TrackerState};

    fn tracked_view(events: &[RawEvent]) -> TrackerView {
        let (state, _) = update(TrackerState::new(), Msg::PromptSubmitted("todo app".to_string()));
        let (mut state, _) = update(
            state,
            Msg::JobAccepted {
                request_id: 1,
                job_id: "job-1".to_string(),
                created_at: String::new(),
            },
        );
        for event in events {
            state = update(
                state,
                Msg::Observed {
                    job_id: "job-1".to_string(),
                    event: event.clone(),
                },
            )
            .0;
        }
        state.view()
    }

    #[test]
    fn progress_bar_scales_to_width() {
        assert_eq!(progress_bar(0), "[--------------------]   0%");
        assert_eq!(progress_bar(25), "[#####---------------]  25%");
        assert_eq!(progress_bar(100), "[####################] 100%");
    }

    #[test]
    fn log_lines_show_channel_agent_and_classification() {
        let line = LogLine {
            channel: Channel::Push,
            agent: Some("Backend Engineer".to_string()),
            message: "Executing task".to_string(),
            timestamp: None,
            classified: true,
        };
        assert_eq!(log_line(&line), "* [push] Backend Engineer: Executing task");
    }

    #[test]
    fn printer_only_prints_new_lines_and_changed_progress() {
        let planning = RawEvent::new(Channel::Push, "Task Completed").with_agent("Planning Architect");
        let chatter = RawEvent::new(Channel::Push, "crew kicked off");
        let mut printer = Printer::new();

        let mut first = Vec::new();
        printer.update(&mut first, &tracked_view(&[planning.clone()])).unwrap();
        let first = String::from_utf8(first).unwrap();
        assert!(first.contains("* [push] Planning Architect: Task Completed"));
        assert!(first.contains("job job-1 running"));

        let mut second = Vec::new();
        printer
            .update(&mut second, &tracked_view(&[planning, chatter]))
            .unwrap();
        let second = String::from_utf8(second).unwrap();
        assert_eq!(second, "  [push] crew kicked off\n");
    }

    #[test]
    fn summary_lists_files_and_archive() {
        let mut view = tracked_view(&[]).job.unwrap();
        let mut files = FileMap::new();
        files.insert("backend/main.py".to_string(), "print(1)".to_string());
        view.tree = Some(FileTree::from_files(&files));
        view.file_count = Some(1);
        view.files = Some(files);
        view.archive = ArchiveStatus::Ready {
            path: "out/job-1/generated-project.zip".to_string(),
            bytes: 321,
        };

        let mut out = Vec::new();
        write_summary(&mut out, &view, true).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("1 files:\n  backend/\n    main.py (8 B)\n"));
        assert!(out.contains("===== backend/main.py =====\nprint(1)\n"));
        assert!(out.ends_with("archive: out/job-1/generated-project.zip (321 B)\n"));
    }
}
