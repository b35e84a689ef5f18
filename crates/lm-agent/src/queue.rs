//! Reads the workload scheduler's queue (spec.md §4.3 step 1-3, §6).
//!
//! Grounded on `original_source/agent/lm_agent/reconciliation.py`'s
//! `return_formatted_squeue_out`/`squeue_parser` pair, translated to the `squeue`-shaped
//! tab-separated format spec.md §6 specifies exactly (`job_id, user, state, run_time`)
//! rather than the original's positional `sinfo`-style columns.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

const SQUEUE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub job_id: i64,
    pub user: String,
    pub state: String,
    pub run_time_seconds: i64,
}

impl QueuedJob {
    pub fn is_running(&self) -> bool {
        self.state == "RUNNING"
    }
}

/// Abstraction over "ask the workload scheduler for its current queue" so the
/// reconciliation loop can be tested without a real `squeue` binary, mirroring the
/// ledger's `Store` test-double pattern (spec.md §9).
#[async_trait]
pub trait QueueSource: Send + Sync {
    async fn read_queue(&self) -> Option<Vec<QueuedJob>>;
}

/// Shells out to an `squeue`-shaped command producing one job per line,
/// tab-separated `job_id, user, state, run_time` (spec.md §6).
pub struct SqueueSource {
    program: String,
    args: Vec<String>,
}

impl SqueueSource {
    pub fn new() -> Self {
        let program = std::env::var("SQUEUE_PATH").unwrap_or_else(|_| "squeue".to_string());
        SqueueSource {
            program,
            args: vec![
                "--noheader".to_string(),
                "--format=%i\t%u\t%T\t%M".to_string(),
            ],
        }
    }
}

impl Default for SqueueSource {
    fn default() -> Self {
        SqueueSource::new()
    }
}

#[async_trait]
impl QueueSource for SqueueSource {
    async fn read_queue(&self) -> Option<Vec<QueuedJob>> {
        let spawn = Command::new(&self.program)
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output();

        let output = match timeout(SQUEUE_TIMEOUT, spawn).await {
            Ok(Ok(output)) if output.status.success() => output,
            Ok(Ok(_)) => {
                tracing::warn!(program = %self.program, "squeue exited non-zero");
                return None;
            }
            Ok(Err(e)) => {
                tracing::warn!(program = %self.program, error = %e, "failed to spawn squeue");
                return None;
            }
            Err(_) => {
                tracing::warn!(program = %self.program, "squeue timed out");
                return None;
            }
        };

        let text = String::from_utf8_lossy(&output.stdout);
        let jobs = squeue_parser(&text);
        if jobs.is_empty() { None } else { Some(jobs) }
    }
}

/// Test double returning a fixed queue snapshot, or `None` to exercise the
/// "read failed or empty" abort path (spec.md §4.3 step 1).
pub struct StaticQueueSource(pub Option<Vec<QueuedJob>>);

#[async_trait]
impl QueueSource for StaticQueueSource {
    async fn read_queue(&self) -> Option<Vec<QueuedJob>> {
        self.0.clone()
    }
}

/// Parses tab-separated `job_id, user, state, run_time` lines, skipping any line that
/// doesn't fit the shape rather than aborting the whole read.
pub fn squeue_parser(text: &str) -> Vec<QueuedJob> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let job_id: i64 = fields.next()?.trim().parse().ok()?;
            let user = fields.next()?.trim().to_string();
            let state = fields.next()?.trim().to_string();
            let run_time_seconds = parse_run_time(fields.next()?.trim())?;
            Some(QueuedJob { job_id, user, state, run_time_seconds })
        })
        .collect()
}

/// Parses Slurm's `[[DD-]HH:]MM:SS` elapsed-time format into seconds (spec.md §6).
pub fn parse_run_time(raw: &str) -> Option<i64> {
    let (days, rest) = match raw.split_once('-') {
        Some((d, rest)) => (d.parse::<i64>().ok()?, rest),
        None => (0, raw),
    };
    let parts: Vec<&str> = rest.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (h.parse::<i64>().ok()?, m.parse::<i64>().ok()?, s.parse::<i64>().ok()?),
        [m, s] => (0, m.parse::<i64>().ok()?, s.parse::<i64>().ok()?),
        _ => return None,
    };
    Some(((days * 24 + hours) * 60 + minutes) * 60 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mm_ss() {
        assert_eq!(parse_run_time("05:30"), Some(330));
    }

    #[test]
    fn parses_hh_mm_ss() {
        assert_eq!(parse_run_time("01:05:30"), Some(3930));
    }

    #[test]
    fn parses_days_hh_mm_ss() {
        assert_eq!(parse_run_time("2-01:05:30"), Some(176_730));
    }

    #[test]
    fn rejects_malformed_run_time() {
        assert_eq!(parse_run_time("not-a-time"), None);
    }

    #[test]
    fn squeue_parser_reads_tab_separated_lines_and_skips_malformed_ones() {
        let text = "123\talice\tRUNNING\t01:00:00\nnot-a-line\n456\tbob\tPENDING\t00:00:00\n";
        let jobs = squeue_parser(text);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0], QueuedJob { job_id: 123, user: "alice".into(), state: "RUNNING".into(), run_time_seconds: 3600 });
        assert!(!jobs[1].is_running());
    }

    #[test]
    fn is_running_matches_only_running_state() {
        let job = QueuedJob { job_id: 1, user: "a".into(), state: "RUNNING".into(), run_time_seconds: 0 };
        assert!(job.is_running());
        let job = QueuedJob { state: "COMPLETING".into(), ..job };
        assert!(!job.is_running());
    }
}
