// SharedMutator scenario and property tests.
//
// Covers the buffer/flush/retry lifecycle against a scripted RangeClient,
// and the invariant that every cell a flush couldn't commit ends up
// accounted for on the failure list (no cell is ever silently dropped).

use rangetable::config::MutatorConfig;
use rangetable::error::RangeTableError;
use rangetable::mutator::SharedMutator;
use rangetable::rpc::{FailureKind, MemRangeClient, PendingCell, Scripted};
use std::sync::Arc;

fn config() -> MutatorConfig {
    MutatorConfig {
        timeout_ms: 5_000,
        flush_interval_ms: 0,
        flags: 0,
        auto_flush_threshold_bytes: 1024 * 1024,
    }
}

#[tokio::test]
async fn buffered_writes_survive_a_transient_range_server_outage() {
    let client = Arc::new(MemRangeClient::new());
    client.push_script(Scripted::Timeout);
    let mutator = SharedMutator::new(Arc::clone(&client), config());

    mutator.set(PendingCell::insert(b"row", 0, b"q", 1, 0, b"v")).await.unwrap();
    assert!(mutator.flush().await.is_err());
    assert_eq!(client.committed_count(), 0);

    mutator.set(PendingCell::insert(b"row", 0, b"q", 1, 0, b"v")).await.unwrap();
    mutator.flush().await.unwrap();
    assert_eq!(client.committed_count(), 1);
}

#[tokio::test]
async fn failure_list_accounts_for_every_rejected_cell_exactly_once() {
    let client = Arc::new(MemRangeClient::new());
    client.push_script(Scripted::RejectIndices(
        vec![1, 3],
        RangeTableError::RangeNotFound(b"row-1".to_vec()),
    ));
    let mutator = SharedMutator::new(Arc::clone(&client), config());

    let cells: Vec<_> = (0..5)
        .map(|i| PendingCell::insert(format!("row-{i}").as_bytes(), 0, b"q", i, 0, b"v"))
        .collect();
    mutator.set_cells(cells).await.unwrap();
    mutator.flush().await.unwrap();

    let failed = mutator.get_failed();
    assert_eq!(failed.len(), 2);
    assert_eq!(client.committed_count(), 3);

    let total_accounted = failed.len() + client.committed_count();
    assert_eq!(total_accounted, 5);
}

#[tokio::test]
async fn retry_eventually_drains_the_failure_list_once_the_client_recovers() {
    let client = Arc::new(MemRangeClient::new());
    client.push_script(Scripted::RejectIndices(vec![0], RangeTableError::Rpc("down".to_string())));
    client.push_script(Scripted::RejectIndices(
        vec![0],
        RangeTableError::Rpc("still down".to_string()),
    ));
    let mutator = SharedMutator::new(Arc::clone(&client), config());

    mutator.set(PendingCell::insert(b"row", 0, b"q", 1, 0, b"v")).await.unwrap();
    mutator.flush().await.unwrap();
    assert!(mutator.need_retry());

    mutator.retry(2_000).await.unwrap();
    assert!(!mutator.need_retry());
    assert_eq!(client.committed_count(), 1);
    assert!(mutator.get_resend_count() >= 2);
}

#[tokio::test]
async fn a_schema_rejection_never_gets_resent_even_when_a_sibling_cell_times_out() {
    let client = Arc::new(MemRangeClient::new());
    // cell index 0 is rejected outright (schema violation, never retryable);
    // cell index 1 is rejected as a transient RPC failure this round.
    client.push_script(Scripted::RejectEach(vec![
        (0, RangeTableError::Schema("unknown column family".to_string())),
        (1, RangeTableError::Rpc("range server unavailable".to_string())),
    ]));
    let mutator = SharedMutator::new(Arc::clone(&client), config());

    let cell2 = PendingCell::insert(b"row-2", 0, b"q", 2, 0, b"v");
    let cell3 = PendingCell::insert(b"row-3", 0, b"q", 3, 0, b"v");
    mutator.set_cells(vec![cell2.clone(), cell3.clone()]).await.unwrap();
    mutator.flush().await.unwrap();

    let failed = mutator.get_failed();
    assert_eq!(failed.len(), 2);

    mutator.retry(5_000).await.unwrap();

    let failed = mutator.get_failed();
    assert_eq!(failed.len(), 1, "only the schema failure should remain");
    assert_eq!(failed[0].cell, cell2);
    assert_eq!(failed[0].kind, FailureKind::Semantic);
    assert_eq!(client.committed_count(), 1, "cell3 should have committed on retry");
    assert!(client.committed().contains(&cell3));
}

#[tokio::test]
async fn retry_times_out_while_still_reporting_the_failed_cells() {
    let client = Arc::new(MemRangeClient::new());
    for _ in 0..1000 {
        client.push_script(Scripted::RejectIndices(vec![0], RangeTableError::Rpc("down".to_string())));
    }
    let mutator = SharedMutator::new(Arc::clone(&client), config());
    mutator.set(PendingCell::insert(b"row", 0, b"q", 1, 0, b"v")).await.unwrap();
    mutator.flush().await.unwrap();

    let result = mutator.retry(50).await;
    assert!(result.is_err());
    assert_eq!(client.committed_count(), 0);
}

#[tokio::test]
async fn auto_flush_commits_without_an_explicit_flush_call() {
    let client = Arc::new(MemRangeClient::new());
    let mut cfg = config();
    cfg.auto_flush_threshold_bytes = 1;
    let mutator = SharedMutator::new(Arc::clone(&client), cfg);

    for i in 0..10 {
        mutator
            .set(PendingCell::insert(format!("row-{i}").as_bytes(), 0, b"q", i, 0, b"v"))
            .await
            .unwrap();
    }

    assert_eq!(client.committed_count(), 10);
    assert_eq!(mutator.memory_used(), 0);
}

#[tokio::test]
async fn interval_flush_drains_the_buffer_on_its_own() {
    let client = Arc::new(MemRangeClient::new());
    let mut cfg = config();
    cfg.flush_interval_ms = 20;
    let mutator = Arc::new(SharedMutator::new(Arc::clone(&client), cfg));
    let guard = mutator.start_interval_flush().expect("interval enabled");

    mutator.set(PendingCell::insert(b"row", 0, b"q", 1, 0, b"v")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert_eq!(client.committed_count(), 1);
    guard.stop();
    assert!(!guard.is_active());
}
