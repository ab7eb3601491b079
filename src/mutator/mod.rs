// # SharedMutator
//
// Buffers cell writes from potentially many caller threads and flushes
// them to a `RangeClient` in batches, either when the buffer crosses
// `auto_flush_threshold_bytes` or on a periodic interval. Modeled on the
// original TableMutatorShared/TableMutatorIntervalHandler pair: one
// re-entrant-locked buffer, one timer task that can be stopped but never
// restarted.

mod interval;

use crate::common::{Component, ComponentStats, HealthStatus, MetricValue, Monitorable};
use crate::config::MutatorConfig;
use crate::concurrent::Backoff;
use crate::error::{RangeTableError, Result};
use crate::rpc::{CellFailure, FailureKind, PendingCell, RangeClient};
use interval::IntervalHandle;
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

struct MutatorState {
    buffered: Vec<PendingCell>,
    buffered_bytes: u64,
    failed: Vec<CellFailure>,
}

impl MutatorState {
    fn new() -> Self {
        MutatorState {
            buffered: Vec::new(),
            buffered_bytes: 0,
            failed: Vec::new(),
        }
    }
}

fn cell_size(cell: &PendingCell) -> u64 {
    (cell.key.row.len() + cell.key.column_qualifier.len() + cell.value.len() + 32) as u64
}

/// Batched, retrying writer over a `RangeClient`. `C` is the client
/// implementation; tests use `rpc::MemRangeClient`.
pub struct SharedMutator<C: RangeClient> {
    client: Arc<C>,
    config: MutatorConfig,
    state: ReentrantMutex<RefCell<MutatorState>>,
    resend_count: AtomicU64,
    interval: Mutex<Option<Arc<IntervalHandle>>>,
    stats: Mutex<ComponentStats>,
}

impl<C: RangeClient + 'static> SharedMutator<C> {
    pub fn new(client: Arc<C>, config: MutatorConfig) -> Self {
        SharedMutator {
            client,
            config,
            state: ReentrantMutex::new(RefCell::new(MutatorState::new())),
            resend_count: AtomicU64::new(0),
            interval: Mutex::new(None),
            stats: Mutex::new(ComponentStats::default()),
        }
    }

    /// Buffers one cell write, triggering an auto-flush if the buffer
    /// crosses `config.auto_flush_threshold_bytes`.
    pub async fn set(&self, cell: PendingCell) -> Result<()> {
        self.set_cells(vec![cell]).await
    }

    pub async fn set_delete(&self, cell: PendingCell) -> Result<()> {
        self.set_cells(vec![cell]).await
    }

    /// Buffers a batch of cell writes.
    pub async fn set_cells(&self, cells: Vec<PendingCell>) -> Result<()> {
        let should_flush = {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            for cell in cells {
                state.buffered_bytes += cell_size(&cell);
                state.buffered.push(cell);
            }
            state.buffered_bytes >= self.config.auto_flush_threshold_bytes
        };
        if should_flush {
            self.flush().await?;
        }
        Ok(())
    }

    /// Sends every buffered cell to the client in one `apply` call,
    /// recording any rejected cells into the failure list for `retry` to
    /// pick up later.
    pub async fn flush(&self) -> Result<()> {
        let batch = {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            if state.buffered.is_empty() {
                return Ok(());
            }
            state.buffered_bytes = 0;
            std::mem::take(&mut state.buffered)
        };

        let batch_len = batch.len();
        let failures = self.client.apply(batch).await?;
        if !failures.is_empty() {
            warn!(count = failures.len(), "flush produced per-cell failures");
            let guard = self.state.lock();
            guard.borrow_mut().failed.extend(failures);
        }
        self.stats.lock().record_success();
        info!(cells = batch_len, "flushed buffered cells");
        Ok(())
    }

    /// Resends only the retryable cells on the failure list within
    /// `timeout_ms`, backing off between attempts. Semantic failures
    /// (`FailureKind::Semantic`) are left untouched in `failed` — they are
    /// permanent, resending them would just fail the same way again, and
    /// they stay visible through `get_failed()` for the caller to notice.
    /// Returns an error if the deadline elapses with retryable cells still
    /// failing; a failure list containing only semantic entries returns
    /// `Ok` immediately since there is nothing left to retry.
    pub async fn retry(&self, timeout_ms: u64) -> Result<()> {
        let deadline = Duration::from_millis(timeout_ms);
        let attempt = async {
            let mut backoff = Backoff::new();
            loop {
                let pending: Vec<PendingCell> = {
                    let guard = self.state.lock();
                    let mut state = guard.borrow_mut();
                    let (retryable, semantic): (Vec<_>, Vec<_>) = std::mem::take(&mut state.failed)
                        .into_iter()
                        .partition(|f| f.kind == FailureKind::Retryable);
                    state.failed = semantic;
                    retryable.into_iter().map(|f| f.cell).collect()
                };
                if pending.is_empty() {
                    return Ok(());
                }
                self.resend_count.fetch_add(1, Ordering::Relaxed);
                let failures = self.client.apply(pending).await?;
                if !failures.is_empty() {
                    let guard = self.state.lock();
                    guard.borrow_mut().failed.extend(failures);
                }
                backoff.snooze();
                tokio::task::yield_now().await;
            }
        };

        match timeout(deadline, attempt).await {
            Ok(result) => result,
            Err(_) => Err(RangeTableError::Timeout(timeout_ms)),
        }
    }

    pub fn get_failed(&self) -> Vec<CellFailure> {
        let guard = self.state.lock();
        guard.borrow().failed.clone()
    }

    /// True if the failure list holds at least one cell worth resending.
    /// A failure list containing only semantic failures does not count —
    /// `retry` would skip all of them anyway.
    pub fn need_retry(&self) -> bool {
        let guard = self.state.lock();
        guard
            .borrow()
            .failed
            .iter()
            .any(|f| f.kind == FailureKind::Retryable)
    }

    pub fn get_resend_count(&self) -> u64 {
        self.resend_count.load(Ordering::Relaxed)
    }

    pub fn memory_used(&self) -> u64 {
        let guard = self.state.lock();
        guard.borrow().buffered_bytes
    }

    /// Spawns the periodic flush task, if `config.flush_interval_ms != 0`.
    /// Returns `None` when interval flushing is disabled. Calling this
    /// more than once replaces any previous handle's reference here but
    /// does not stop the earlier task; callers are expected to call this
    /// once per `SharedMutator`.
    pub fn start_interval_flush(self: &Arc<Self>) -> Option<IntervalFlushGuard> {
        if self.config.flush_interval_ms == 0 {
            return None;
        }
        let handle = Arc::new(IntervalHandle::new());
        let period = Duration::from_millis(self.config.flush_interval_ms);
        let mutator = Arc::clone(self);
        let task_handle = Arc::clone(&handle);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if !task_handle.is_active() {
                    break;
                }
                if let Err(err) = mutator.flush().await {
                    warn!(error = %err, "interval flush failed");
                }
            }
        });
        *self.interval.lock() = Some(Arc::clone(&handle));
        Some(IntervalFlushGuard { handle })
    }
}

/// Handle returned by `start_interval_flush`. Dropping this does not stop
/// the timer; call `stop` explicitly, matching the one-way nature of the
/// underlying state machine.
pub struct IntervalFlushGuard {
    handle: Arc<IntervalHandle>,
}

impl IntervalFlushGuard {
    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }
}

impl<C: RangeClient> Component for SharedMutator<C> {
    fn health_check(&self) -> HealthStatus {
        if self.need_retry() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl<C: RangeClient> Monitorable for SharedMutator<C> {
    fn collect_metrics(&self) -> HashMap<String, MetricValue> {
        let mut metrics = HashMap::new();
        metrics.insert(
            "buffered_bytes".to_string(),
            MetricValue::Gauge(self.memory_used() as f64),
        );
        metrics.insert(
            "resend_count".to_string(),
            MetricValue::Counter(self.get_resend_count()),
        );
        metrics.insert(
            "failed_cells".to_string(),
            MetricValue::Gauge(self.get_failed().len() as f64),
        );
        metrics
    }
}
