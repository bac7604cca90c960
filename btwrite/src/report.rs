//! Latency and throughput summary of a finished run.

use std::fmt;
use std::time::Duration;

use sketches_ddsketch::DDSketch;
use yansi::Paint;

/// Summary of a successful run.
pub struct Report {
    samples: u64,
    elapsed: Duration,
    latency: DDSketch,
}

impl Report {
    pub(crate) fn new(samples: u64, elapsed: Duration, latency: DDSketch) -> Self {
        Self {
            samples,
            elapsed,
            latency,
        }
    }

    /// The number of latency samples, equal to the number of completed writes.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Wall time from workload generation until the last sample arrived.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Achieved writes per second over the whole run.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.samples as f64 / secs
        } else {
            0.0
        }
    }

    /// Mean write latency, if any writes completed.
    pub fn mean(&self) -> Option<Duration> {
        let sum = self.latency.sum()?;
        if self.latency.count() == 0 {
            return None;
        }
        Duration::try_from_secs_f64(sum / self.latency.count() as f64).ok()
    }

    /// Approximate write latency at quantile `q` between `0.0` and `1.0`.
    pub fn quantile(&self, q: f64) -> Option<Duration> {
        let secs = self.latency.quantile(q).ok()??;
        Duration::try_from_secs_f64(secs).ok()
    }

    /// Prints the report to stdout.
    pub fn print(&self) {
        println!();
        println!(
            "{} ({} writes in {:.2?})",
            "## WRITES".bold(),
            self.samples.bold(),
            self.elapsed
        );
        println!("  {:.2} operations/s", self.ops_per_second().bold());

        if let (Some(avg), Some(p50), Some(p90), Some(p99)) = (
            self.mean(),
            self.quantile(0.5),
            self.quantile(0.9),
            self.quantile(0.99),
        ) {
            println!(
                "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
                avg.bold()
            );
        }
    }
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("samples", &self.samples)
            .field("elapsed", &self.elapsed)
            .field("p50", &self.quantile(0.5))
            .finish_non_exhaustive()
    }
}
