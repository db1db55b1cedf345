//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that coordinates one session:
//! - Seeding the frontier (fresh, or resumed from a snapshot and the ledger)
//! - Fetching one page at a time with a politeness delay
//! - Classifying and enqueueing discovered links
//! - Deciding when to stop
//! - Persisting the session record and a bounded resume snapshot

use crate::config::Config;
use crate::crawler::fetcher::{FetchResult, PageSource};
use crate::crawler::frontier::{AddressLedger, FrontierEntry, Frontier};
use crate::crawler::handle::CrawlEvent;
use crate::crawler::saturation::SaturationMonitor;
use crate::state::UrlStatus;
use crate::storage::{Storage, StopReason, UpsertOutcome};
use crate::url::{classify, normalize_url, CrawlScope, UrlKind};
use crate::FurlongError;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use url::Url;

/// Settings for one crawl session
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Where a fresh crawl starts
    pub seed: String,
    /// Entity discoveries after which the session stops
    pub quota: u64,
    /// Wall-clock budget for the session
    pub deadline: Duration,
    pub saturation_threshold: f64,
    pub window_size: usize,
    /// Seed from the last snapshot and unfetched ledger rows instead of `seed`
    pub resume: bool,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub snapshot_cap: usize,
    pub priority_offset: usize,
    pub checkpoint_interval: u64,
    pub scope: CrawlScope,
    /// Stored on the session record
    pub config_hash: String,
}

impl CrawlOptions {
    /// Builds options from a loaded configuration
    ///
    /// The config hash is left empty; callers that loaded the file with
    /// `load_config_with_hash` should fill it in.
    pub fn from_config(config: &Config) -> Self {
        let crawler = &config.crawler;
        Self {
            seed: config.site.seed.clone(),
            quota: u64::from(crawler.quota),
            deadline: Duration::try_from_secs_f64(crawler.timeout_mins * 60.0)
                .unwrap_or(Duration::MAX),
            saturation_threshold: crawler.saturation_threshold,
            window_size: crawler.window_size,
            resume: false,
            min_delay: Duration::from_millis(crawler.min_delay_ms),
            max_delay: Duration::from_millis(crawler.max_delay_ms),
            snapshot_cap: crawler.snapshot_cap,
            priority_offset: crawler.priority_offset,
            checkpoint_interval: crawler.checkpoint_interval.max(1),
            scope: CrawlScope::from_config(&config.site),
            config_hash: String::new(),
        }
    }
}

/// Lifecycle of the crawl loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// Final counters of a crawl session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: i64,
    pub stop_reason: StopReason,
    /// Entity pages fetched this session that were not already `Succeeded`
    pub discovered: u64,
    pub pages_visited: u64,
    pub failures: u64,
    /// Addresses still queued when the session ended
    pub queue_depth: usize,
    pub saturation_rate: f64,
    pub discovered_by_kind: BTreeMap<UrlKind, u64>,
    pub resumed: bool,
}

/// Main crawler coordinator structure
///
/// Owns the frontier, the saturation monitor and the only writer handle to
/// the store for the duration of a session.
pub struct Coordinator<S, P> {
    options: CrawlOptions,
    storage: S,
    source: P,
    frontier: Frontier,
    saturation: SaturationMonitor,
    session_id: i64,
    state: CrawlState,
    stop_reason: Option<StopReason>,
    cancel: Arc<AtomicBool>,
    events: Option<UnboundedSender<CrawlEvent>>,
    discovered: u64,
    discovered_by_kind: BTreeMap<UrlKind, u64>,
    pages_visited: u64,
    failures: u64,
}

impl<S, P> Coordinator<S, P>
where
    S: Storage + AddressLedger,
    P: PageSource,
{
    /// Creates a coordinator and records a new session
    ///
    /// In resume mode the frontier is seeded from the latest session's
    /// snapshot plus `Unprocessed` rows no crawl has fetched yet, deduplicated
    /// against each other. The seed address is used when there is nothing
    /// to resume.
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run, in the `Idle` state
    /// * `Err(FurlongError)` - Invalid seed, or the store could not be read or written
    pub fn new(mut storage: S, source: P, mut options: CrawlOptions) -> Result<Self, FurlongError> {
        let seed = normalize_url(&options.seed)?;
        if !options.scope.has_canonical_origin() {
            options.scope = options.scope.with_canonical_origin(&seed);
        }
        let seed = options.scope.canonicalize(seed);
        let mut frontier = Frontier::new(options.priority_offset, options.resume);

        if options.resume {
            let snapshot = storage.load_latest_snapshot()?;
            let unvisited = storage.load_unvisited(options.snapshot_cap)?;
            let candidates = snapshot.len() + unvisited.len();

            for address in snapshot {
                if let Ok(url) = normalize_url(&address) {
                    let url = options.scope.canonicalize(url);
                    let kind = classify(&url).kind;
                    frontier.enqueue(url.as_str(), kind, UrlKind::Unknown, &storage);
                }
            }
            for record in unvisited {
                frontier.enqueue(&record.address, record.kind, UrlKind::Unknown, &storage);
            }

            tracing::info!(
                "Resuming with {} pending addresses ({} candidates)",
                frontier.len(),
                candidates
            );
        }

        if frontier.is_empty() {
            frontier.push_seed(seed.as_str(), classify(&seed).kind, &storage);
        }

        let session_id =
            storage.create_session(seed.as_str(), &options.config_hash, options.resume)?;
        // Written before the first step so a session killed early still leaves
        // the queue it inherited for the next resume
        storage.save_snapshot(
            session_id,
            &frontier.pending(options.snapshot_cap),
            options.snapshot_cap,
        )?;
        let saturation = SaturationMonitor::new(options.window_size, options.saturation_threshold);

        Ok(Self {
            options,
            storage,
            source,
            frontier,
            saturation,
            session_id,
            state: CrawlState::Idle,
            stop_reason: None,
            cancel: Arc::new(AtomicBool::new(false)),
            events: None,
            discovered: 0,
            discovered_by_kind: BTreeMap::new(),
            pages_visited: 0,
            failures: 0,
        })
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    /// The flag checked at the top of every step
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Routes progress and log messages to a listener
    pub fn set_event_sender(&mut self, sender: UnboundedSender<CrawlEvent>) {
        self.events = Some(sender);
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Runs the crawl loop until a stop condition fires
    ///
    /// Each step checks, in order: cancellation, deadline, quota, saturation,
    /// and finally whether the frontier is empty. Per-address failures never
    /// end the session.
    pub async fn run(&mut self) -> SessionReport {
        if let Some(reason) = self.stop_reason {
            tracing::warn!("Session {} already finished", self.session_id);
            return self.report(reason);
        }

        self.state = CrawlState::Running;
        self.log(format!(
            "Session {} started from {} ({} queued)",
            self.session_id,
            self.options.seed,
            self.frontier.len()
        ));

        let started = Instant::now();

        let reason = loop {
            if let Some(reason) = self.stop_condition(started) {
                break reason;
            }

            let entry = match self.frontier.next() {
                Some(entry) => entry,
                None => break StopReason::Exhausted,
            };

            if self.visit(entry).await {
                self.pages_visited += 1;
                self.emit(CrawlEvent::Progress {
                    discovered: self.discovered,
                    queue_depth: self.frontier.len(),
                    saturation_rate: self.saturation.rate(),
                });

                if self.pages_visited % 10 == 0 {
                    let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
                    tracing::info!(
                        "Progress: {} pages, {} discovered, {} queued, rate {:.3}, {:.2} pages/sec",
                        self.pages_visited,
                        self.discovered,
                        self.frontier.len(),
                        self.saturation.rate(),
                        self.pages_visited as f64 / elapsed
                    );
                }

                if self.pages_visited % self.options.checkpoint_interval.max(1) == 0 {
                    self.checkpoint();
                }
            }
        };

        self.finish(reason)
    }

    fn stop_condition(&self, started: Instant) -> Option<StopReason> {
        if self.cancel.load(Ordering::SeqCst) {
            return Some(StopReason::UserCancelled);
        }
        if started.elapsed() >= self.options.deadline {
            return Some(StopReason::Timeout);
        }
        if self.discovered >= self.options.quota {
            return Some(StopReason::QuotaReached);
        }
        if self.saturation.should_stop() {
            return Some(StopReason::SaturationReached);
        }
        None
    }

    /// Fetches one address and processes the result
    ///
    /// Returns false if the address was skipped without a fetch.
    async fn visit(&mut self, entry: FrontierEntry) -> bool {
        let url = match Url::parse(&entry.address) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Dropping unparseable queued address {}: {}", entry.address, e);
                return false;
            }
        };

        // The scraper may have finished it since it was queued
        let finished = matches!(
            self.storage.status_of(&entry.address),
            Ok(Some(UrlStatus::Succeeded))
        );
        if finished {
            tracing::debug!("Skipping {}: already successful", entry.address);
            return false;
        }

        let delay = politeness_delay(self.options.min_delay, self.options.max_delay);
        tokio::time::sleep(delay).await;

        tracing::debug!("Fetching {}", url);
        let result = self.source.fetch(&url).await;

        match result {
            FetchResult::Success {
                final_url, body, ..
            } => self.handle_page(&entry, &final_url, &body),
            FetchResult::ContentMismatch { content_type } => {
                tracing::debug!("Not HTML ({}): {}", content_type, entry.address);
                self.record_access(&entry);
                self.saturation.record_page(0);
            }
            FetchResult::HttpError { status_code } => {
                self.handle_failure(&entry, &format!("HTTP {}", status_code));
            }
            FetchResult::NetworkError { error } => {
                self.handle_failure(&entry, &error);
            }
        }

        true
    }

    fn handle_failure(&mut self, entry: &FrontierEntry, reason: &str) {
        self.failures += 1;
        tracing::warn!("Failed to fetch {}: {}", entry.address, reason);
        self.emit(CrawlEvent::Log(format!(
            "Failed: {} ({})",
            entry.address, reason
        )));

        if let Err(e) = self
            .storage
            .upsert(&entry.address, entry.kind, UrlStatus::Failed)
        {
            tracing::warn!("Could not mark {} failed: {}", entry.address, e);
        }
        self.record_access(entry);
    }

    fn handle_page(&mut self, entry: &FrontierEntry, base_url: &Url, body: &str) {
        if entry.kind.is_entity() {
            self.record_discovery(entry);
        }
        self.record_access(entry);

        let links = self.source.extract_links(body, base_url);
        let mut new_discoveries = 0u32;

        for link in &links {
            let normalized = match normalize_url(link) {
                Ok(url) => self.options.scope.canonicalize(url),
                Err(_) => continue,
            };
            let class = classify(&normalized);
            if !self.options.scope.admits(&normalized, &class) {
                continue;
            }

            let address = normalized.as_str();
            let outcome = self
                .frontier
                .enqueue(address, class.kind, entry.kind, &self.storage);

            if outcome.was_added() && class.kind.is_entity() {
                match self
                    .storage
                    .upsert(address, class.kind, UrlStatus::Unprocessed)
                {
                    Ok(UpsertOutcome::Inserted) => new_discoveries += 1,
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Could not store {}: {}", address, e),
                }
            }
        }

        tracing::debug!(
            "{}: {} links, {} new entities",
            entry.address,
            links.len(),
            new_discoveries
        );
        self.saturation.record_page(new_discoveries);
    }

    /// Counts an entity page and leaves it `Unprocessed` for the scraper
    fn record_discovery(&mut self, entry: &FrontierEntry) {
        let status = match self.storage.status_of(&entry.address) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Could not read status of {}: {}", entry.address, e);
                return;
            }
        };

        let stored = match status {
            Some(UrlStatus::Succeeded) => return,
            Some(UrlStatus::Failed) => self
                .storage
                .mark_status(&entry.address, UrlStatus::Unprocessed)
                .map(|_| ()),
            _ => self
                .storage
                .upsert(&entry.address, entry.kind, UrlStatus::Unprocessed)
                .map(|_| ()),
        };
        if let Err(e) = stored {
            tracing::warn!("Could not store {}: {}", entry.address, e);
        }

        self.discovered += 1;
        *self.discovered_by_kind.entry(entry.kind).or_insert(0) += 1;
        self.emit(CrawlEvent::Log(format!(
            "Discovered {} {}",
            entry.kind, entry.address
        )));
    }

    fn record_access(&mut self, entry: &FrontierEntry) {
        if let Err(e) = self.storage.record_access(&entry.address, entry.kind) {
            tracing::warn!("Could not stamp {}: {}", entry.address, e);
        }
    }

    fn checkpoint(&mut self) {
        let pending = self.frontier.pending(self.options.snapshot_cap);
        match self
            .storage
            .save_snapshot(self.session_id, &pending, self.options.snapshot_cap)
        {
            Ok(()) => tracing::debug!("Checkpointed {} pending addresses", pending.len()),
            Err(e) => tracing::warn!("Checkpoint failed: {}", e),
        }
    }

    fn finish(&mut self, reason: StopReason) -> SessionReport {
        self.state = match reason {
            StopReason::UserCancelled => CrawlState::Cancelled,
            _ => CrawlState::Completed,
        };
        self.stop_reason = Some(reason);

        if let Err(e) = self.storage.finish_session(
            self.session_id,
            reason,
            self.discovered,
            self.pages_visited,
        ) {
            tracing::warn!("Could not record end of session {}: {}", self.session_id, e);
        }
        self.checkpoint();

        self.log(format!(
            "Session {} ended: {} ({} discovered, {} pages, {} failures, {} still queued)",
            self.session_id,
            reason,
            self.discovered,
            self.pages_visited,
            self.failures,
            self.frontier.len()
        ));

        self.report(reason)
    }

    fn report(&self, reason: StopReason) -> SessionReport {
        SessionReport {
            session_id: self.session_id,
            stop_reason: reason,
            discovered: self.discovered,
            pages_visited: self.pages_visited,
            failures: self.failures,
            queue_depth: self.frontier.len(),
            saturation_rate: self.saturation.rate(),
            discovered_by_kind: self.discovered_by_kind.clone(),
            resumed: self.options.resume,
        }
    }

    fn log(&self, message: String) {
        tracing::info!("{}", message);
        self.emit(CrawlEvent::Log(message));
    }

    fn emit(&self, event: CrawlEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is listening
            let _ = events.send(event);
        }
    }
}

/// Picks a random delay in `[min, max]`
fn politeness_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let ms = rand::thread_rng().gen_range(min.as_millis()..=max.as_millis());
    Duration::from_millis(ms as u64)
}
