//! Aggregation of per-target outcomes into run statistics.
//!
//! Workers share one [`ResultsAggregator`] for the duration of a write. Every
//! mutation takes the aggregator's own lock; [`ResultsAggregator::finalize`]
//! turns the accumulated state into an owned, immutable [`Results`] snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

/// Diagnostic key used for slots that hold no target.
pub const NULL_TARGET_KEY: &str = "null_target";

/// One failed target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    /// Path of the target, `None` for a null slot
    pub target: Option<PathBuf>,
    /// Rendered error
    pub error: String,
}

/// Frozen statistics of one write invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Results {
    /// Number of target slots in the run
    pub total: u64,
    /// Targets written successfully
    pub success: u64,
    /// Targets that failed (acquisition, null slot, or exhausted retries)
    pub failure: u64,
    /// `success / total`, `0.0` for an empty run
    pub success_rate: f64,
    /// `failure / total`, `0.0` for an empty run
    pub failure_rate: f64,
    /// Failures in the order they were recorded
    pub failures: Vec<FailureRecord>,
    /// Diagnostic per target path (last attempt wins)
    pub info: BTreeMap<String, String>,
}

impl Results {
    /// Multi-line human-readable summary.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Print [`render`](Self::render) to stdout.
    pub fn print(&self) {
        println!("{}", self);
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Whether every target succeeded.
    pub fn is_complete_success(&self) -> bool {
        self.failure == 0 && self.success == self.total
    }

    /// Format the summary with colors (requires console feature)
    pub fn format_colored(&self) -> String {
        #[cfg(feature = "colorized_output")]
        {
            use console::style;

            let mut output = String::new();
            output.push_str(&format!("{}: {}\n", style("Total").bold(), self.total));
            output.push_str(&format!(
                "{}: {}\n",
                style("Success").bold(),
                style(self.success).green()
            ));
            let failure = if self.failure > 0 {
                style(self.failure).red().bold()
            } else {
                style(self.failure).green()
            };
            output.push_str(&format!("{}: {}\n", style("Failure").bold(), failure));
            output.push_str(&format!(
                "{}: {:.6}\n",
                style("Success Rate").bold(),
                self.success_rate
            ));
            output.push_str(&format!(
                "{}: {:.6}\n",
                style("Failure Rate").bold(),
                self.failure_rate
            ));
            output.push_str(&format!("{}:", style("Info").bold()));
            for (key, value) in &self.info {
                output.push_str(&format!("\n{}: {}", style(key).yellow(), value));
            }
            output
        }

        #[cfg(not(feature = "colorized_output"))]
        {
            self.render()
        }
    }
}

impl fmt::Display for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total: {}", self.total)?;
        writeln!(f, "Success: {}", self.success)?;
        writeln!(f, "Failure: {}", self.failure)?;
        writeln!(f, "Success Rate: {:.6}", self.success_rate)?;
        writeln!(f, "Failure Rate: {:.6}", self.failure_rate)?;
        write!(f, "Info:")?;
        for (key, value) in &self.info {
            write!(f, "\n{}: {}", key, value)?;
        }
        Ok(())
    }
}

/// Mutable accumulation state behind the aggregator lock
#[derive(Debug, Default)]
struct Tally {
    success: u64,
    failure: u64,
    failures: Vec<FailureRecord>,
    info: BTreeMap<String, String>,
}

/// Thread-safe accumulator shared by the workers of one write
#[derive(Debug, Default)]
pub struct ResultsAggregator {
    tally: Mutex<Tally>,
}

impl ResultsAggregator {
    /// Zeroed counters, empty containers.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tally> {
        // A panicking worker must not hide the outcomes of the others
        self.tally.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Count one successful target.
    pub fn record_success(&self) {
        self.lock().success += 1;
    }

    /// Count one failed target and keep its error.
    pub fn record_failure(&self, target: Option<&Path>, error: impl fmt::Display) {
        let mut tally = self.lock();
        tally.failure += 1;
        tally.failures.push(FailureRecord {
            target: target.map(Path::to_path_buf),
            error: error.to_string(),
        });
    }

    /// Attach a diagnostic to `key`, replacing any previous one.
    pub fn add_info(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().info.insert(key.into(), value.into());
    }

    /// Successes recorded so far.
    pub fn success(&self) -> u64 {
        self.lock().success
    }

    /// Failures recorded so far.
    pub fn failure(&self) -> u64 {
        self.lock().failure
    }

    /// Freeze into [`Results`] over `total` targets.
    pub fn finalize(self, total: u64) -> Results {
        let tally = self.tally.into_inner().unwrap_or_else(|p| p.into_inner());
        let (success_rate, failure_rate) = if total > 0 {
            (
                tally.success as f64 / total as f64,
                tally.failure as f64 / total as f64,
            )
        } else {
            (0.0, 0.0)
        };

        Results {
            total,
            success: tally.success,
            failure: tally.failure,
            success_rate,
            failure_rate,
            failures: tally.failures,
            info: tally.info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_results_are_zeroed() {
        let results = ResultsAggregator::new().finalize(0);
        assert_eq!(results.total, 0);
        assert_eq!(results.success, 0);
        assert_eq!(results.failure, 0);
        assert_eq!(results.success_rate, 0.0);
        assert_eq!(results.failure_rate, 0.0);
        assert!(results.failures.is_empty());
        assert!(results.info.is_empty());
    }

    #[test]
    fn test_rates() {
        let aggregator = ResultsAggregator::new();
        for _ in 0..3 {
            aggregator.record_success();
        }
        aggregator.record_failure(Some(Path::new("/tmp/x")), "boom");

        let results = aggregator.finalize(4);
        assert_eq!(results.success_rate, 0.75);
        assert_eq!(results.failure_rate, 0.25);
        assert_eq!(results.success_rate + results.failure_rate, 1.0);
        assert_eq!(
            results.failures,
            vec![FailureRecord {
                target: Some(PathBuf::from("/tmp/x")),
                error: "boom".to_string(),
            }]
        );
    }

    #[test]
    fn test_concurrent_updates() {
        let aggregator = Arc::new(ResultsAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let aggregator = Arc::clone(&aggregator);
                thread::spawn(move || {
                    for j in 0..100 {
                        if j % 4 == 0 {
                            aggregator.record_failure(None, "fail");
                            aggregator.add_info(format!("t{i}-{j}"), "fail");
                        } else {
                            aggregator.record_success();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let aggregator = Arc::try_unwrap(aggregator).unwrap();
        let results = aggregator.finalize(800);
        assert_eq!(results.success, 600);
        assert_eq!(results.failure, 200);
        assert_eq!(results.failures.len(), 200);
        assert_eq!(results.info.len(), 200);
    }

    #[test]
    fn test_render_format() {
        let aggregator = ResultsAggregator::new();
        aggregator.record_success();
        aggregator.record_failure(None, "received null target");
        aggregator.add_info(NULL_TARGET_KEY, "received null target");
        aggregator.add_info("/a", "permission denied");

        let rendered = aggregator.finalize(2).render();
        assert_eq!(
            rendered,
            "Total: 2\nSuccess: 1\nFailure: 1\nSuccess Rate: 0.500000\nFailure Rate: 0.500000\n\
             Info:\n/a: permission denied\nnull_target: received null target"
        );
    }

    #[test]
    fn test_json_fields() {
        let aggregator = ResultsAggregator::new();
        aggregator.record_success();
        let json = aggregator.finalize(1).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["total"], 1);
        assert_eq!(value["success_rate"], 1.0);
        assert!(value["info"].as_object().unwrap().is_empty());
    }
}
