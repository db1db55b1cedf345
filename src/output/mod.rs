//! Output module for reporting ledger contents and crawl sessions
//!
//! This module handles:
//! - Counting stored addresses by kind and status
//! - Listing recent crawl sessions with their stop reasons
//! - Printing the report of a finished session

pub mod stats;

pub use stats::{load_statistics, print_statistics, LedgerStatistics};

use crate::crawler::SessionReport;
use crate::storage::{SessionRecord, Storage};
use crate::FurlongError;

/// Loads the most recent sessions, newest first
pub fn load_sessions(
    storage: &dyn Storage,
    limit: usize,
) -> Result<Vec<SessionRecord>, FurlongError> {
    Ok(storage.list_sessions(limit)?)
}

/// Wall-clock length of a finished session in seconds
///
/// `None` while the session is still open or if a timestamp does not parse.
pub fn session_duration_secs(session: &SessionRecord) -> Option<i64> {
    let started = session
        .started_at
        .parse::<chrono::DateTime<chrono::Utc>>()
        .ok()?;
    let ended = session
        .ended_at
        .as_ref()?
        .parse::<chrono::DateTime<chrono::Utc>>()
        .ok()?;
    Some((ended - started).num_seconds())
}

/// Prints a table of sessions
pub fn print_sessions(sessions: &[SessionRecord]) {
    println!("=== Crawl Sessions ===\n");

    if sessions.is_empty() {
        println!("  No sessions recorded");
        return;
    }

    for session in sessions {
        let reason = session
            .stop_reason
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unfinished".to_string());
        let duration = session_duration_secs(session)
            .map(|secs| format!("{}s", secs))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "  #{:<5} {}  {:>8}  {:>6} discovered  {:>6} pages  {}{}",
            session.id,
            session.started_at,
            duration,
            session.discovered_count,
            session.pages_visited,
            reason,
            if session.resumed { " (resumed)" } else { "" }
        );
        println!("         seed: {}", session.seed_address);
    }
}

/// Prints the report of a finished crawl
pub fn print_report(report: &SessionReport) {
    println!("\n=== Session {} Finished ===\n", report.session_id);
    println!("  Stop reason: {}", report.stop_reason);
    println!("  Pages visited: {}", report.pages_visited);
    println!("  Discovered: {}", report.discovered);
    for (kind, count) in &report.discovered_by_kind {
        println!("    {}: {}", kind, count);
    }
    println!("  Failures: {}", report.failures);
    println!("  Still queued: {}", report.queue_depth);
    println!("  Final discovery rate: {:.3}", report.saturation_rate);
}
