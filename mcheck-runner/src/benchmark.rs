//! Concurrent Set/Get/Delete load
//!
//! Each worker owns one connection and runs its own loop on a dedicated OS
//! thread. Completed iterations are sent as immutable [`OpLatency`] records
//! over a channel; nothing is accumulated until every worker has been joined.

use crate::error::BenchmarkError;
use mcheck_core::config::BenchmarkConfig;
use mcheck_core::{CacheClient, CacheError, Connector, Item, Operation};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkParams {
    pub concurrency: usize,
    pub requests_per_worker: usize,
}

impl BenchmarkParams {
    pub fn total_requests(&self) -> usize {
        self.concurrency.saturating_mul(self.requests_per_worker)
    }

    pub fn validate(&self) -> Result<(), BenchmarkError> {
        if self.concurrency == 0 {
            return Err(BenchmarkError::InvalidParams(
                "concurrency must be positive".to_owned(),
            ));
        }
        if self.requests_per_worker == 0 {
            return Err(BenchmarkError::InvalidParams(
                "requests per worker must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

impl From<&BenchmarkConfig> for BenchmarkParams {
    fn from(config: &BenchmarkConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            requests_per_worker: config.requests,
        }
    }
}

/// Latencies of one fully successful Set/Get/Delete iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpLatency {
    pub set: Duration,
    pub get: Duration,
    pub delete: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpStats {
    pub total: Duration,
    pub mean: Duration,
    pub qps: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkSummary {
    pub wall_time: Duration,
    pub completed: usize,
    pub set: OpStats,
    pub get: OpStats,
    pub delete: OpStats,
}

impl fmt::Display for BenchmarkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "------ Benchmark Result ------")?;
        writeln!(f, "Total time: {:?}", self.wall_time)?;
        writeln!(f, "Total request: {}", self.completed)?;
        for (name, stats) in [("Set", &self.set), ("Get", &self.get), ("Del", &self.delete)] {
            writeln!(
                f,
                "{} - average latency: {:?}, QPS: {:.2}",
                name, stats.mean, stats.qps
            )?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
enum IterationError {
    #[error("{op} error: {source}")]
    Operation { op: Operation, source: CacheError },

    #[error("Get value mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },
}

/// Runs the benchmark and aggregates the results once all workers are done.
pub async fn run<F>(connector: Arc<F>, params: BenchmarkParams) -> Result<BenchmarkSummary, BenchmarkError>
where
    F: Connector + 'static,
{
    params.validate()?;
    info!(
        "Starting {} workers against {} ({} requests each)",
        params.concurrency,
        connector.target(),
        params.requests_per_worker
    );

    let (results_tx, mut results_rx) = mpsc::unbounded_channel();
    let started = Instant::now();

    let mut workers = Vec::new();
    for worker in 0..params.concurrency {
        let connector = Arc::clone(&connector);
        let results_tx = results_tx.clone();
        let requests = params.requests_per_worker;
        let spawned = thread::Builder::new()
            .name(format!("bench-worker-{worker}"))
            .spawn(move || run_worker(worker, connector.as_ref(), requests, &results_tx));
        match spawned {
            Ok(handle) => workers.push((worker, handle)),
            Err(e) => {
                error!(worker, "Failed to spawn benchmark worker, starting no more: {}", e);
                break;
            }
        }
    }
    // Only worker clones remain, so the channel closes once they all finish.
    drop(results_tx);

    // Joining blocks, so it happens off the async worker threads.
    let joined = tokio::task::spawn_blocking(move || {
        for (worker, handle) in workers {
            if handle.join().is_err() {
                error!(worker, "Benchmark worker panicked");
            }
        }
    })
    .await;
    if let Err(e) = joined {
        error!("Failed to join benchmark workers: {}", e);
    }
    let wall_time = started.elapsed();

    let mut records = Vec::new();
    while let Some(record) = results_rx.recv().await {
        records.push(record);
    }

    aggregate(records, wall_time)
}

/// Sums the records and derives per-operation means and the run's QPS.
///
/// QPS is completed iterations over the whole wall time and is reported
/// identically for Set, Get and Delete.
pub fn aggregate(
    records: impl IntoIterator<Item = OpLatency>,
    wall_time: Duration,
) -> Result<BenchmarkSummary, BenchmarkError> {
    let mut completed = 0usize;
    let mut set = Duration::ZERO;
    let mut get = Duration::ZERO;
    let mut delete = Duration::ZERO;

    for record in records {
        completed += 1;
        set += record.set;
        get += record.get;
        delete += record.delete;
    }

    if completed == 0 {
        return Err(BenchmarkError::EmptyResult);
    }

    // Clamp to 1ns so an instantaneous run still yields a finite QPS.
    let qps = completed as f64 / wall_time.as_secs_f64().max(1e-9);
    let stats = |total: Duration| OpStats {
        total,
        mean: mean(total, completed),
        qps,
    };

    Ok(BenchmarkSummary {
        wall_time,
        completed,
        set: stats(set),
        get: stats(get),
        delete: stats(delete),
    })
}

fn mean(total: Duration, count: usize) -> Duration {
    let nanos = total.as_nanos() / count as u128;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

fn run_worker<F: Connector>(
    worker: usize,
    connector: &F,
    requests: usize,
    results: &mpsc::UnboundedSender<OpLatency>,
) -> usize {
    let client = match connector.connect() {
        Ok(client) => client,
        Err(e) => {
            error!(worker, "Failed to connect to {}: {}", connector.target(), e);
            return 0;
        }
    };

    // The token keeps this worker's keys disjoint from every other worker's.
    let token = Uuid::new_v4().simple();
    let mut completed = 0;

    for iteration in 0..requests {
        let item = Item::new(format!("key_{token}_{iteration}"), format!("value_{iteration}"));
        match run_iteration(&client, &item) {
            Ok(latency) => {
                if results.send(latency).is_err() {
                    warn!(worker, "Result channel closed, stopping worker");
                    break;
                }
                completed += 1;
            }
            Err(e) => warn!(worker, iteration, "{}", e),
        }
    }

    debug!(worker, completed, "Benchmark worker finished");
    completed
}

fn run_iteration<C: CacheClient>(client: &C, item: &Item) -> Result<OpLatency, IterationError> {
    let started = Instant::now();
    client.set(item).map_err(op_error(Operation::Set))?;
    let set = started.elapsed();

    let started = Instant::now();
    let value = client.get(&item.key).map_err(op_error(Operation::Get))?;
    if value != item.value {
        return Err(IterationError::Mismatch {
            expected: String::from_utf8_lossy(&item.value).into_owned(),
            actual: String::from_utf8_lossy(&value).into_owned(),
        });
    }
    let get = started.elapsed();

    let started = Instant::now();
    client.delete(&item.key).map_err(op_error(Operation::Delete))?;
    let delete = started.elapsed();

    Ok(OpLatency { set, get, delete })
}

fn op_error(op: Operation) -> impl FnOnce(CacheError) -> IterationError {
    move |source| IterationError::Operation { op, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(set_ms: u64, get_ms: u64, delete_ms: u64) -> OpLatency {
        OpLatency {
            set: Duration::from_millis(set_ms),
            get: Duration::from_millis(get_ms),
            delete: Duration::from_millis(delete_ms),
        }
    }

    #[test]
    fn test_aggregate_empty_is_error() {
        let result = aggregate(Vec::new(), Duration::from_secs(1));
        assert_eq!(result, Err(BenchmarkError::EmptyResult));
    }

    #[test]
    fn test_aggregate_means() {
        let summary = aggregate(
            vec![record(1, 2, 3), record(3, 4, 5)],
            Duration::from_secs(2),
        )
        .unwrap();

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.set.total, Duration::from_millis(4));
        assert_eq!(summary.set.mean, Duration::from_millis(2));
        assert_eq!(summary.get.mean, Duration::from_millis(3));
        assert_eq!(summary.delete.mean, Duration::from_millis(4));
    }

    #[test]
    fn test_qps_is_shared_by_all_operations() {
        let summary = aggregate(vec![record(1, 1, 1); 10], Duration::from_secs(4)).unwrap();
        assert_eq!(summary.set.qps, 2.5);
        assert_eq!(summary.get.qps, summary.set.qps);
        assert_eq!(summary.delete.qps, summary.set.qps);
    }

    #[test]
    fn test_zero_wall_time_stays_finite() {
        let summary = aggregate(vec![record(0, 0, 0); 3], Duration::ZERO).unwrap();
        assert!(summary.set.qps.is_finite());
        assert_eq!(summary.set.mean, Duration::ZERO);
    }

    #[test]
    fn test_params_validation() {
        let ok = BenchmarkParams {
            concurrency: 4,
            requests_per_worker: 10,
        };
        assert!(ok.validate().is_ok());
        assert_eq!(ok.total_requests(), 40);

        let wide = BenchmarkParams {
            concurrency: 4096,
            requests_per_worker: 1,
        };
        assert!(wide.validate().is_ok());

        let huge = BenchmarkParams {
            concurrency: 2,
            requests_per_worker: usize::MAX,
        };
        assert_eq!(huge.total_requests(), usize::MAX);

        for (concurrency, requests_per_worker) in [(0, 10), (4, 0), (0, 0)] {
            let params = BenchmarkParams {
                concurrency,
                requests_per_worker,
            };
            assert!(matches!(params.validate(), Err(BenchmarkError::InvalidParams(_))));
        }
    }

    #[test]
    fn test_summary_report_format() {
        let summary = aggregate(vec![record(1, 2, 3)], Duration::from_secs(1)).unwrap();
        let report = summary.to_string();
        assert!(report.starts_with("------ Benchmark Result ------\n"));
        assert!(report.contains("Total request: 1\n"));
        assert!(report.contains("Set - average latency: 1ms, QPS: 1.00\n"));
        assert!(report.contains("Del - average latency: 3ms, QPS: 1.00\n"));
    }
}
