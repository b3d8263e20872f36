// Copyright 2025 Eventum Contributors.

//! Specification tests for the snapshot-accelerated state repository

mod support;

use chrono::Utc;
use eventum::{
    EventStore, InMemoryEventStore, InMemorySnapshotRepository, Snapshot, SnapshotRepository,
    StateAggregate, StateAggregateRepository,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use support::{wallet_metadata, wallet_stream, WalletEvent, WalletState};

fn repository() -> StateAggregateRepository<InMemoryEventStore, InMemorySnapshotRepository> {
    StateAggregateRepository::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemorySnapshotRepository::new()),
    )
}

async fn seed_wallet(
    repo: &StateAggregateRepository<InMemoryEventStore, InMemorySnapshotRepository>,
    id: &eventum::AggregateId,
    credits: &[u64],
) {
    let mut version = 1;
    repo.event_store()
        .append(&wallet_stream(
            id,
            version,
            "req-create",
            vec![WalletEvent::Created {
                owner: "alice".to_string(),
                initial: 0,
            }],
        ))
        .await
        .unwrap();
    for amount in credits {
        version += 1;
        repo.event_store()
            .append(&wallet_stream(
                id,
                version,
                &format!("req-{version}"),
                vec![WalletEvent::Credited { amount: *amount }],
            ))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn unknown_aggregates_load_uninitialized() {
    let repo = repository();
    let id = wallet_metadata().aggregate_id("w-1");
    let loaded: StateAggregate<WalletState> = repo.load(&id).await.unwrap();
    assert!(!loaded.initialized());
    assert_eq!(loaded.version(), 0);
    assert!(!loaded.deleted());
}

#[tokio::test]
async fn replay_reaches_head_state() {
    let repo = repository();
    let id = wallet_metadata().aggregate_id("w-1");
    seed_wallet(&repo, &id, &[10, 20, 30]).await;

    let loaded: StateAggregate<WalletState> = repo.load(&id).await.unwrap();
    assert_eq!(loaded.version(), 4);
    assert_eq!(loaded.state().balance, 60);
    assert_eq!(loaded.owner_id(), "");
}

#[tokio::test]
async fn deletion_events_set_the_deleted_flag() {
    let repo = repository();
    let id = wallet_metadata().aggregate_id("w-1");
    seed_wallet(&repo, &id, &[5]).await;
    repo.event_store()
        .append(&wallet_stream(&id, 3, "req-freeze", vec![WalletEvent::Frozen]))
        .await
        .unwrap();

    let loaded: StateAggregate<WalletState> = repo.load(&id).await.unwrap();
    assert!(loaded.deleted());
    assert_eq!(loaded.version(), 3);
}

#[tokio::test]
async fn snapshot_plus_trailing_replay_equals_full_replay() {
    let repo = repository();
    let id = wallet_metadata().aggregate_id("w-1");
    seed_wallet(&repo, &id, &[1, 2, 3, 4, 5, 6, 7]).await;

    // Snapshot in the middle of the history.
    let middle: StateAggregate<WalletState> = repo.load_to(&id, 5).await.unwrap();
    repo.snapshots()
        .save(Snapshot::new(middle, Utc::now()).to_record().unwrap())
        .await
        .unwrap();

    let accelerated: StateAggregate<WalletState> = repo.load(&id).await.unwrap();
    let replayed = StateAggregateRepository::new(
        repo.event_store().clone(),
        Arc::new(InMemorySnapshotRepository::new()),
    )
    .load::<WalletState>(&id)
    .await
    .unwrap();

    assert_eq!(accelerated.version(), replayed.version());
    assert_eq!(accelerated.state(), replayed.state());
    assert_eq!(accelerated.event_id(), replayed.event_id());
}

#[tokio::test]
async fn bounded_load_ignores_newer_snapshots() {
    let repo = repository();
    let id = wallet_metadata().aggregate_id("w-1");
    seed_wallet(&repo, &id, &[10, 10, 10]).await;

    let head: StateAggregate<WalletState> = repo.load(&id).await.unwrap();
    repo.snapshots()
        .save(Snapshot::new(head, Utc::now()).to_record().unwrap())
        .await
        .unwrap();

    let bounded: StateAggregate<WalletState> = repo.load_to(&id, 2).await.unwrap();
    assert_eq!(bounded.version(), 2);
    assert_eq!(bounded.state().balance, 10);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// P4: for any event count and any snapshot point, client-side replay of
    /// all loaded streams onto a fresh state equals the repository's answer.
    #[test]
    fn replay_equivalence_holds_for_any_history(
        credits in proptest::collection::vec(1u64..100, 0..12),
        snapshot_at in 0usize..12,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let repo = repository();
            let id = wallet_metadata().aggregate_id("w-prop");
            seed_wallet(&repo, &id, &credits).await;
            let head_version = credits.len() as u64 + 1;

            // Optionally install a snapshot somewhere in the history.
            let snapshot_version = (snapshot_at as u64).min(head_version);
            if snapshot_version >= 1 {
                let at: StateAggregate<WalletState> =
                    repo.load_to(&id, snapshot_version).await.unwrap();
                repo.snapshots()
                    .save(Snapshot::new(at, Utc::now()).to_record().unwrap())
                    .await
                    .unwrap();
            }

            // Client-side replay from the raw streams.
            let mut manual = StateAggregate::<WalletState>::uninitialized(id.clone());
            for stream in repo.event_store().load_all(&id).await.unwrap() {
                manual.source(&stream).unwrap();
            }

            let repository_answer: StateAggregate<WalletState> =
                repo.load(&id).await.unwrap();
            prop_assert_eq!(repository_answer.version(), manual.version());
            prop_assert_eq!(repository_answer.state(), manual.state());
            Ok(())
        })?;
    }
}
