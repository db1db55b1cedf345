//! Running a crawl in the background
//!
//! `start_crawl` moves a coordinator onto a tokio task and hands back a
//! handle for cancellation, progress events and the final report.

use crate::crawler::coordinator::{CrawlOptions, Coordinator, SessionReport};
use crate::crawler::fetcher::PageSource;
use crate::crawler::frontier::AddressLedger;
use crate::storage::Storage;
use crate::FurlongError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

/// Messages emitted by a running crawl
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    /// Sent after every fetched page
    Progress {
        discovered: u64,
        queue_depth: usize,
        saturation_rate: f64,
    },
    /// Human-readable status line
    Log(String),
}

/// Handle to a crawl running on a background task
pub struct CrawlHandle {
    session_id: i64,
    cancel: Arc<AtomicBool>,
    events: UnboundedReceiver<CrawlEvent>,
    task: JoinHandle<SessionReport>,
}

impl CrawlHandle {
    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    /// Asks the crawl to stop at the start of its next step
    ///
    /// An in-flight fetch is allowed to finish; the stop reason will be
    /// `UserCancelled`.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// A clone of the cancellation flag, for signal handlers
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Waits for the next event; `None` once the crawl has finished
    pub async fn next_event(&mut self) -> Option<CrawlEvent> {
        self.events.recv().await
    }

    /// Waits for the crawl to finish and returns its report
    pub async fn wait(self) -> Result<SessionReport, FurlongError> {
        self.task
            .await
            .map_err(|e| FurlongError::Worker(e.to_string()))
    }
}

/// Starts a crawl session on a background task
///
/// The session record is created before this returns, so a failure to open
/// or seed the session surfaces here rather than from `wait`.
///
/// # Arguments
///
/// * `storage` - The store; the crawl task becomes its only writer
/// * `source` - Where pages come from
/// * `options` - Seed, limits and politeness settings
///
/// # Example
///
/// ```no_run
/// use furlong::config::load_config_with_hash;
/// use furlong::crawler::{start_crawl, CrawlOptions, HttpSource};
/// use furlong::storage::open_storage;
/// use std::path::Path;
/// use std::time::Duration;
///
/// # async fn example() -> furlong::Result<()> {
/// let (config, hash) = load_config_with_hash(Path::new("furlong.toml"))?;
/// let storage = open_storage(Path::new(&config.output.database_path))?;
/// let source = HttpSource::new(&config.user_agent, Duration::from_secs(10))?;
///
/// let mut options = CrawlOptions::from_config(&config);
/// options.config_hash = hash;
///
/// let mut handle = start_crawl(storage, source, options)?;
/// while let Some(event) = handle.next_event().await {
///     println!("{:?}", event);
/// }
/// let report = handle.wait().await?;
/// println!("stopped: {}", report.stop_reason);
/// # Ok(())
/// # }
/// ```
pub fn start_crawl<S, P>(
    storage: S,
    source: P,
    options: CrawlOptions,
) -> Result<CrawlHandle, FurlongError>
where
    S: Storage + AddressLedger + Send + 'static,
    P: PageSource + 'static,
{
    let mut coordinator = Coordinator::new(storage, source, options)?;

    let (sender, events) = mpsc::unbounded_channel();
    coordinator.set_event_sender(sender);

    let session_id = coordinator.session_id();
    let cancel = coordinator.cancel_flag();

    let task = tokio::spawn(async move { coordinator.run().await });

    Ok(CrawlHandle {
        session_id,
        cancel,
        events,
        task,
    })
}
