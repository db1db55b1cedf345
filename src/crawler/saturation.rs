//! Saturation detection
//!
//! There is no authoritative page count for the site, so the crawl infers
//! diminishing returns: once the mean number of new discoveries over the
//! last `window_size` pages drops below a threshold, continued exploration
//! is assumed unproductive. A link-sparse stretch can stop a crawl early;
//! rerunning with a lower threshold or a larger window is the remedy.

use std::collections::VecDeque;

/// Sliding-window discovery-rate monitor
#[derive(Debug, Clone)]
pub struct SaturationMonitor {
    window: VecDeque<u32>,
    window_size: usize,
    threshold: f64,
    sum: u64,
}

impl SaturationMonitor {
    /// Creates a monitor
    ///
    /// # Arguments
    ///
    /// * `window_size` - Pages in the sliding window (at least 1)
    /// * `threshold` - Mean discoveries per page below which the crawl is saturated
    pub fn new(window_size: usize, threshold: f64) -> Self {
        let window_size = window_size.max(1);
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
            threshold,
            sum: 0,
        }
    }

    /// Records the number of new discoveries made on one page
    pub fn record_page(&mut self, new_discoveries: u32) {
        if self.window.len() == self.window_size {
            if let Some(oldest) = self.window.pop_front() {
                self.sum -= u64::from(oldest);
            }
        }
        self.window.push_back(new_discoveries);
        self.sum += u64::from(new_discoveries);
    }

    /// Returns true once the window is full and its mean is below the threshold
    pub fn should_stop(&self) -> bool {
        self.is_warm() && self.rate() < self.threshold
    }

    /// True when the window holds `window_size` samples
    pub fn is_warm(&self) -> bool {
        self.window.len() == self.window_size
    }

    /// Mean discoveries per page over the current window (0 when empty)
    pub fn rate(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.sum as f64 / self.window.len() as f64
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}
