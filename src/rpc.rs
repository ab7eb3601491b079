// # RangeClient
//
// The network seam between `SharedMutator` and the range server that would
// actually own a row range. Production code would dial out over a real RPC
// transport; tests and this crate's own `main.rs` loop use `MemRangeClient`.

use crate::error::{RangeTableError, Result};
use crate::key::{Flag, OwnedKey};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A fully-owned cell write queued by `SharedMutator`, ready to cross an
/// RPC boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCell {
    pub key: OwnedKey,
    pub value: Vec<u8>,
}

impl PendingCell {
    pub fn insert(row: &[u8], column_family: u8, column_qualifier: &[u8], timestamp: i64, revision: i64, value: &[u8]) -> Self {
        PendingCell {
            key: OwnedKey {
                row: row.to_vec(),
                column_family,
                column_qualifier: column_qualifier.to_vec(),
                flag: Flag::Insert,
                timestamp,
                revision,
            },
            value: value.to_vec(),
        }
    }

    pub fn delete(row: &[u8], column_family: u8, column_qualifier: &[u8], flag: Flag, timestamp: i64, revision: i64) -> Self {
        PendingCell {
            key: OwnedKey {
                row: row.to_vec(),
                column_family,
                column_qualifier: column_qualifier.to_vec(),
                flag,
                timestamp,
                revision,
            },
            value: Vec::new(),
        }
    }
}

/// Whether a `CellFailure` is worth resending. Drawn from the
/// `RangeTableError` that produced it — see `RangeTableError::is_retryable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient: a later `apply` of the same cell might succeed.
    Retryable,
    /// Permanent: the cell itself is invalid. `SharedMutator::retry` never
    /// resends these; they stay in `get_failed()` until the caller notices.
    Semantic,
}

/// A cell that an `apply` call failed to commit, with the reason and
/// whether it's worth resending. Returned from `SharedMutator::get_failed`
/// for the caller to inspect or retry.
#[derive(Debug, Clone)]
pub struct CellFailure {
    pub cell: PendingCell,
    pub reason: String,
    pub kind: FailureKind,
}

impl CellFailure {
    /// Builds a `CellFailure` from the `RangeTableError` a range client
    /// rejected `cell` with, deriving `kind` from
    /// `RangeTableError::is_retryable`.
    pub fn from_error(cell: PendingCell, error: &RangeTableError) -> Self {
        let kind = if error.is_retryable() {
            FailureKind::Retryable
        } else {
            FailureKind::Semantic
        };
        CellFailure {
            cell,
            reason: error.to_string(),
            kind,
        }
    }
}

/// The range server RPC surface `SharedMutator` depends on. A real
/// implementation would serialize `cells` onto a connection and await a
/// response; see `MemRangeClient` for the in-process test double.
#[async_trait]
pub trait RangeClient: Send + Sync {
    /// Applies a batch of cell writes. Returns one `CellFailure` per cell
    /// that didn't commit; an empty vec means every cell in `cells`
    /// committed.
    async fn apply(&self, cells: Vec<PendingCell>) -> Result<Vec<CellFailure>>;
}

/// Scripted behavior for one `MemRangeClient::apply` call.
#[derive(Debug)]
pub enum Scripted {
    /// Accept every cell.
    Accept,
    /// Time out entirely, as if the RPC never returned.
    Timeout,
    /// Reject the cells at these indices (into the batch passed to `apply`)
    /// with the given error; accept everything else. The error's
    /// `is_retryable()` becomes the resulting `CellFailure::kind`.
    RejectIndices(Vec<usize>, RangeTableError),
    /// Reject specific indices with distinct errors, each producing its
    /// own `CellFailure::kind`; indices not listed commit. Used to script
    /// a single `apply` call that rejects different cells for different
    /// reasons (e.g. one schema violation, one timeout).
    RejectEach(Vec<(usize, RangeTableError)>),
}

/// An in-memory `RangeClient` double. Applied batches land in `committed`
/// (unless scripted otherwise) so tests can assert on exactly what a
/// `SharedMutator` flushed.
pub struct MemRangeClient {
    committed: Mutex<Vec<PendingCell>>,
    script: Mutex<VecDeque<Scripted>>,
}

impl MemRangeClient {
    pub fn new() -> Self {
        MemRangeClient {
            committed: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues scripted behaviors, consumed one per `apply` call; once the
    /// queue is empty, calls default to `Scripted::Accept`.
    pub fn push_script(&self, behavior: Scripted) {
        self.script.lock().push_back(behavior);
    }

    pub fn committed(&self) -> Vec<PendingCell> {
        self.committed.lock().clone()
    }

    pub fn committed_count(&self) -> usize {
        self.committed.lock().len()
    }
}

impl Default for MemRangeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RangeClient for MemRangeClient {
    async fn apply(&self, cells: Vec<PendingCell>) -> Result<Vec<CellFailure>> {
        let behavior = self.script.lock().pop_front().unwrap_or(Scripted::Accept);
        match behavior {
            Scripted::Accept => {
                self.committed.lock().extend(cells);
                Ok(Vec::new())
            }
            Scripted::Timeout => Err(RangeTableError::Timeout(0)),
            Scripted::RejectIndices(indices, error) => {
                let mut failures = Vec::new();
                let mut committed = self.committed.lock();
                for (i, cell) in cells.into_iter().enumerate() {
                    if indices.contains(&i) {
                        failures.push(CellFailure::from_error(cell, &error));
                    } else {
                        committed.push(cell);
                    }
                }
                Ok(failures)
            }
            Scripted::RejectEach(mut rejections) => {
                let mut failures = Vec::new();
                let mut committed = self.committed.lock();
                for (i, cell) in cells.into_iter().enumerate() {
                    if let Some(pos) = rejections.iter().position(|(idx, _)| *idx == i) {
                        let (_, error) = rejections.remove(pos);
                        failures.push(CellFailure::from_error(cell, &error));
                    } else {
                        committed.push(cell);
                    }
                }
                Ok(failures)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_behavior_accepts_everything() {
        let client = MemRangeClient::new();
        let cells = vec![PendingCell::insert(b"row", 0, b"q", 1, 0, b"v")];
        let failures = client.apply(cells).await.unwrap();
        assert!(failures.is_empty());
        assert_eq!(client.committed_count(), 1);
    }

    #[tokio::test]
    async fn scripted_rejection_reports_failures_and_commits_the_rest() {
        let client = MemRangeClient::new();
        client.push_script(Scripted::RejectIndices(
            vec![0],
            RangeTableError::RangeNotFound(b"a".to_vec()),
        ));
        let cells = vec![
            PendingCell::insert(b"a", 0, b"q", 1, 0, b"v"),
            PendingCell::insert(b"b", 0, b"q", 1, 0, b"v"),
        ];
        let failures = client.apply(cells).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Retryable);
        assert_eq!(client.committed_count(), 1);
    }

    #[tokio::test]
    async fn scripted_schema_rejection_is_reported_as_semantic() {
        let client = MemRangeClient::new();
        client.push_script(Scripted::RejectIndices(
            vec![0],
            RangeTableError::Schema("unknown column family".to_string()),
        ));
        let cells = vec![PendingCell::insert(b"a", 0, b"q", 1, 0, b"v")];
        let failures = client.apply(cells).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Semantic);
    }

    #[tokio::test]
    async fn reject_each_scripts_distinct_kinds_in_one_call() {
        let client = MemRangeClient::new();
        client.push_script(Scripted::RejectEach(vec![
            (0, RangeTableError::Schema("bad column family".to_string())),
            (1, RangeTableError::Rpc("range server unreachable".to_string())),
        ]));
        let cells = vec![
            PendingCell::insert(b"a", 0, b"q", 1, 0, b"v"),
            PendingCell::insert(b"b", 0, b"q", 1, 0, b"v"),
            PendingCell::insert(b"c", 0, b"q", 1, 0, b"v"),
        ];
        let failures = client.apply(cells).await.unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].kind, FailureKind::Semantic);
        assert_eq!(failures[1].kind, FailureKind::Retryable);
        assert_eq!(client.committed_count(), 1);
    }

    #[tokio::test]
    async fn scripted_timeout_is_an_error() {
        let client = MemRangeClient::new();
        client.push_script(Scripted::Timeout);
        let result = client.apply(vec![PendingCell::insert(b"a", 0, b"q", 1, 0, b"v")]).await;
        assert!(result.is_err());
    }
}
