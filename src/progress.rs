//! Plain-text progress rendering for the CLI.

use std::time::Duration;

use crate::model::{ExecutionSummary, ResumePoint};
use crate::orchestration::{BatchResult, ExecutionResult, ProgressUpdate, TaskResult};

const BAR_FILLED: char = '█';
const BAR_EMPTY: char = '░';

/// `[████░░░░]  50.0%` style bar.
pub fn progress_bar(current: usize, total: usize, width: usize) -> String {
    let ratio = if total == 0 {
        0.0
    } else {
        (current.min(total) as f64) / (total as f64)
    };
    let filled = (width as f64 * ratio) as usize;
    let bar: String = std::iter::repeat(BAR_FILLED)
        .take(filled)
        .chain(std::iter::repeat(BAR_EMPTY).take(width - filled))
        .collect();
    format!("[{}] {:5.1}%", bar, ratio * 100.0)
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        let total = duration.as_secs();
        format!("{}m {}s", total / 60, total % 60)
    } else {
        let total = duration.as_secs();
        format!("{}h {}m", total / 3600, (total % 3600) / 60)
    }
}

/// Linear estimate from the average time per finished task.
pub fn estimate_remaining(elapsed: Duration, finished: usize, total: usize) -> Option<Duration> {
    if finished == 0 || finished >= total {
        return None;
    }
    let per_task = elapsed.as_secs_f64() / finished as f64;
    Some(Duration::from_secs_f64(per_task * (total - finished) as f64))
}

pub fn result_icon(result: ExecutionResult) -> &'static str {
    match result {
        ExecutionResult::Success => "✓",
        ExecutionResult::Failed => "✗",
        ExecutionResult::Timeout => "⏱",
        ExecutionResult::Skipped => "⊘",
        ExecutionResult::Cancelled => "■",
    }
}

pub fn task_line(result: &TaskResult) -> String {
    let mut line = format!(
        "  {} {} [{}] {} ({})",
        result_icon(result.result),
        result.task_id,
        result.executor,
        result.task_name,
        format_duration(result.duration)
    );
    if result.retry_count > 0 {
        line.push_str(&format!(", {} retries", result.retry_count));
    }
    if let Some(error) = &result.error {
        line.push_str(&format!(": {error}"));
    }
    line
}

pub fn progress_line(update: &ProgressUpdate) -> String {
    format!(
        "  batch {} {} {} ok, {} failed",
        update.batch_id,
        progress_bar(update.completed, update.total, 20),
        update.success,
        update.failed
    )
}

pub fn batch_line(result: &BatchResult) -> String {
    format!(
        "Batch {} ({}, {}): {} | {} ok, {} failed, {} skipped in {}",
        result.batch_id,
        result.batch_name,
        result.batch_type,
        result.status,
        result.success_count(),
        result.failed_count(),
        result.skipped_count(),
        format_duration(result.duration)
    )
}

/// Multi-line report for `nexus show`.
pub fn summary_report(summary: &ExecutionSummary) -> String {
    let status = &summary.status;
    let total =
        status.completed + status.failed + status.skipped + status.pending + status.in_progress;
    let mut lines = vec![
        format!("Feature:      {}", summary.feature_name),
        format!("Execution:    {}", summary.execution_id),
        format!("Batches:      {}", summary.progress.batches),
        format!("Tasks:        {}", summary.progress.tasks),
        format!(
            "Progress:     {}",
            progress_bar(status.completed, total, 30)
        ),
        format!(
            "Status:       {} completed, {} failed, {} skipped, {} pending, {} in progress",
            status.completed, status.failed, status.skipped, status.pending, status.in_progress
        ),
        format!("Current batch: {}", summary.current_batch),
        format!("Updated:      {}", summary.updated_at.format("%Y-%m-%d %H:%M:%S UTC")),
    ];
    if summary.has_errors {
        lines.push(format!("Errors:       {}", summary.error_count));
    }
    lines.join("\n")
}

pub fn resume_report(point: &ResumePoint) -> String {
    let mut lines = vec![format!(
        "Resume at batch {} ({}): {} incomplete, {} completed",
        point.batch_id,
        point.batch_name,
        point.incomplete_tasks.len(),
        point.completed_tasks.len()
    )];
    for task in &point.incomplete_tasks {
        lines.push(format!("  - {} [{}] {}", task.id, task.executor, task.name));
    }
    lines.join("\n")
}
