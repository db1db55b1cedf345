//! The crawl frontier
//!
//! An ordered, deduplicated work queue owned by the crawl loop. Membership is
//! checked against three sources before an address is accepted:
//! - the live queue itself
//! - addresses already handed out by `next()` this run
//! - the durable ledger (anything `Succeeded` is never queued again)

use crate::storage::{AddressRecord, SqliteStorage, Storage};
use crate::url::UrlKind;
use std::collections::{HashMap, HashSet, VecDeque};

/// Read access to the durable address ledger
pub trait AddressLedger {
    /// Looks up an address; `None` if it has never been stored
    fn lookup(&self, address: &str) -> Option<AddressRecord>;
}

impl AddressLedger for SqliteStorage {
    fn lookup(&self, address: &str) -> Option<AddressRecord> {
        match self.get_record(address) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Ledger lookup failed for {}: {}", address, e);
                None
            }
        }
    }
}

impl AddressLedger for HashMap<String, AddressRecord> {
    fn lookup(&self, address: &str) -> Option<AddressRecord> {
        self.get(address).cloned()
    }
}

/// An address waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub address: String,
    pub kind: UrlKind,
}

/// What `enqueue` did with an address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended at the tail
    Queued,
    /// Inserted near the head
    Prioritized,
    AlreadyQueued,
    AlreadyVisited,
    AlreadySucceeded,
    /// Fetched by an earlier session; only checked when resuming
    FetchedPreviously,
}

impl EnqueueOutcome {
    pub fn was_added(&self) -> bool {
        matches!(self, Self::Queued | Self::Prioritized)
    }
}

/// Ordered work queue with O(1) membership checks
#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<FrontierEntry>,
    queued: HashSet<String>,
    visited: HashSet<String>,
    priority_offset: usize,
    resume_mode: bool,
    // Links enqueued since the last `next()`, at the head and at the tail
    fresh_head: usize,
    fresh_tail: usize,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `priority_offset` - Queue position at which participant links found on
    ///   a race page are inserted, so the current page's siblings are not starved
    /// * `resume_mode` - Also skip addresses fetched by an earlier session
    pub fn new(priority_offset: usize, resume_mode: bool) -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            visited: HashSet::new(),
            priority_offset,
            resume_mode,
            fresh_head: 0,
            fresh_tail: 0,
        }
    }

    /// Offers an address to the frontier
    ///
    /// A no-op if the address is already queued, already visited this run,
    /// or already `Succeeded` in the ledger. Participant links found while
    /// visiting a race page go near the head; everything else is appended.
    ///
    /// # Arguments
    ///
    /// * `address` - Normalized address
    /// * `kind` - Classification of the address
    /// * `origin_kind` - Classification of the page the link was found on
    /// * `ledger` - The durable store
    pub fn enqueue<L: AddressLedger + ?Sized>(
        &mut self,
        address: &str,
        kind: UrlKind,
        origin_kind: UrlKind,
        ledger: &L,
    ) -> EnqueueOutcome {
        if self.queued.contains(address) {
            return EnqueueOutcome::AlreadyQueued;
        }
        if self.visited.contains(address) {
            return EnqueueOutcome::AlreadyVisited;
        }

        if let Some(record) = ledger.lookup(address) {
            if record.status.is_done() {
                return EnqueueOutcome::AlreadySucceeded;
            }
            if self.resume_mode && record.was_fetched() {
                return EnqueueOutcome::FetchedPreviously;
            }
        }

        self.insert(address, kind, origin_kind)
    }

    /// Queues a seed address, skipping only in-run and `Succeeded` duplicates
    pub fn push_seed<L: AddressLedger + ?Sized>(
        &mut self,
        address: &str,
        kind: UrlKind,
        ledger: &L,
    ) -> EnqueueOutcome {
        if self.queued.contains(address) {
            return EnqueueOutcome::AlreadyQueued;
        }
        if self.visited.contains(address) {
            return EnqueueOutcome::AlreadyVisited;
        }
        if ledger
            .lookup(address)
            .map_or(false, |record| record.status.is_done())
        {
            return EnqueueOutcome::AlreadySucceeded;
        }

        self.insert(address, kind, UrlKind::Unknown)
    }

    fn insert(&mut self, address: &str, kind: UrlKind, origin_kind: UrlKind) -> EnqueueOutcome {
        let entry = FrontierEntry {
            address: address.to_string(),
            kind,
        };
        self.queued.insert(entry.address.clone());

        if origin_kind == UrlKind::Race && kind.is_participant() {
            // Ahead of anything appended from the same page, in discovery order
            let position = (self.priority_offset + self.fresh_head)
                .min(self.queue.len() - self.fresh_tail);
            self.queue.insert(position, entry);
            self.fresh_head += 1;
            EnqueueOutcome::Prioritized
        } else {
            self.queue.push_back(entry);
            self.fresh_tail += 1;
            EnqueueOutcome::Queued
        }
    }

    /// Pops the next address and marks it visited for this run
    pub fn next(&mut self) -> Option<FrontierEntry> {
        let entry = self.queue.pop_front()?;
        self.queued.remove(&entry.address);
        self.visited.insert(entry.address.clone());
        self.fresh_head = 0;
        self.fresh_tail = 0;
        Some(entry)
    }

    /// Returns true if the address is waiting in the queue
    pub fn contains(&self, address: &str) -> bool {
        self.queued.contains(address)
    }

    /// Returns true if `next()` has handed out this address during this run
    pub fn is_visited(&self, address: &str) -> bool {
        self.visited.contains(address)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// The first `cap` pending addresses, in dequeue order
    pub fn pending(&self, cap: usize) -> Vec<String> {
        self.queue
            .iter()
            .take(cap)
            .map(|entry| entry.address.clone())
            .collect()
    }
}
