//! Exact accounting of latency samples.

use std::fmt;
use std::time::Duration;

use sketches_ddsketch::DDSketch;

use crate::error::{Error, Result};
use crate::report::Report;

/// Counts latency samples until the expected number has arrived.
pub struct ResultCollector {
    expected: u64,
    received: u64,
    latency: DDSketch,
}

impl ResultCollector {
    /// Creates a collector waiting for `expected` samples.
    pub fn new(expected: u64) -> Self {
        Self {
            expected,
            received: 0,
            latency: DDSketch::default(),
        }
    }

    /// Records one write latency.
    pub fn record(&mut self, sample: Duration) {
        self.received += 1;
        self.latency.add(sample.as_secs_f64());
    }

    /// The number of samples recorded so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Returns `true` once all expected samples have been recorded.
    pub fn is_complete(&self) -> bool {
        self.received >= self.expected
    }

    /// Turns the collected samples into a [`Report`].
    ///
    /// Fails with [`Error::Stalled`] unless exactly the expected number of samples was recorded.
    pub fn finish(self, elapsed: Duration) -> Result<Report> {
        if self.received != self.expected {
            return Err(Error::Stalled {
                expected: self.expected,
                received: self.received,
            });
        }

        Ok(Report::new(self.received, elapsed, self.latency))
    }
}

impl fmt::Debug for ResultCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCollector")
            .field("expected", &self.expected)
            .field("received", &self.received)
            .finish_non_exhaustive()
    }
}
