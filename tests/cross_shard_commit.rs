//! Cross-shard commit tests
//!
//! Two services in one process, wired through `LocalSender`. A transaction
//! started on shard 1 writes to shard 2 and commits with two-phase commit.

mod common;

use std::sync::Arc;

use shardtxn::mvcc::ReadCommitted;
use shardtxn::row;
use shardtxn::service::{LocalSender, Shard, ShardTxnService, TxnRequest, TxnResponse};
use shardtxn::storage::{Mutation, Predicate};
use shardtxn::{TxnError, TxnId};

use common::{create_t1, service_with, session};

struct Cluster {
    sender: Arc<LocalSender>,
    coordinator: Arc<ShardTxnService>,
    participant: Arc<ShardTxnService>,
}

impl Cluster {
    fn new() -> Self {
        let sender = Arc::new(LocalSender::new());
        let coordinator = service_with(1, ReadCommitted, sender.clone());
        let participant = service_with(2, ReadCommitted, sender.clone());
        sender.register(&coordinator).unwrap();
        sender.register(&participant).unwrap();
        create_t1(&coordinator);
        create_t1(&participant);
        Self {
            sender,
            coordinator,
            participant,
        }
    }

    fn rows(service: &ShardTxnService) -> usize {
        let txn = service.begin(session()).unwrap();
        let n = service
            .read(&txn, "db1", "t1", &Predicate::All)
            .unwrap()
            .len();
        service.commit(txn).unwrap();
        n
    }
}

#[test]
fn test_commit_publishes_on_all_shards() {
    let cluster = Cluster::new();
    let remote = Shard::new(2);

    let mut txn = cluster.coordinator.begin(session()).unwrap();
    cluster
        .coordinator
        .write(&txn, "db1", "t1", Mutation::Insert(row![1i64, "local"]))
        .unwrap();
    cluster
        .coordinator
        .write_remote(&mut txn, &remote, "db1", "t1", Mutation::Insert(row![2i64, "remote"]))
        .unwrap();
    assert_eq!(txn.participants(), &[remote]);

    // Nothing visible on either shard yet
    assert_eq!(Cluster::rows(&cluster.coordinator), 0);
    assert_eq!(Cluster::rows(&cluster.participant), 0);

    cluster.coordinator.commit(txn).unwrap();

    assert_eq!(Cluster::rows(&cluster.coordinator), 1);
    assert_eq!(Cluster::rows(&cluster.participant), 1);
    assert_eq!(cluster.participant.active_count().unwrap(), 0);
}

#[test]
fn test_local_shard_write_is_not_enlisted() {
    let cluster = Cluster::new();
    let mut txn = cluster.coordinator.begin(session()).unwrap();
    cluster
        .coordinator
        .write_remote(&mut txn, &Shard::new(1), "db1", "t1", Mutation::Insert(row![1i64, "a"]))
        .unwrap();
    assert!(txn.participants().is_empty());
    cluster.coordinator.commit(txn).unwrap();
    assert_eq!(Cluster::rows(&cluster.coordinator), 1);
}

#[test]
fn test_failed_prepare_aborts_everywhere() {
    let cluster = Cluster::new();

    let mut txn = cluster.coordinator.begin(session()).unwrap();
    cluster
        .coordinator
        .write(&txn, "db1", "t1", Mutation::Insert(row![1i64, "local"]))
        .unwrap();
    cluster
        .coordinator
        .write_remote(&mut txn, &Shard::new(2), "db1", "t1", Mutation::Insert(row![2i64, "remote"]))
        .unwrap();

    // The participant goes away before prepare; its pending write is aborted
    cluster.participant.stop().unwrap();

    let err = cluster.coordinator.commit(txn).unwrap_err();
    assert!(matches!(err, TxnError::Remote { .. }));

    cluster.participant.start().unwrap();
    assert_eq!(Cluster::rows(&cluster.coordinator), 0);
    assert_eq!(Cluster::rows(&cluster.participant), 0);
}

#[test]
fn test_remote_conflict_surfaces_to_coordinator() {
    let cluster = Cluster::new();
    let remote = Shard::new(2);

    let mut first = cluster.coordinator.begin(session()).unwrap();
    let mut second = cluster.coordinator.begin(session()).unwrap();

    cluster
        .coordinator
        .write_remote(&mut first, &remote, "db1", "t1", Mutation::Upsert(row![5i64, "first"]))
        .unwrap();
    let err = cluster
        .coordinator
        .write_remote(&mut second, &remote, "db1", "t1", Mutation::Upsert(row![5i64, "second"]))
        .unwrap_err();
    match err {
        TxnError::Remote { address, message } => {
            assert_eq!(address, "shard-2");
            assert!(message.contains("write conflict"), "{}", message);
        }
        other => panic!("unexpected error: {other}"),
    }

    cluster.coordinator.abort(second).unwrap();
    cluster.coordinator.commit(first).unwrap();

    let reader = cluster.participant.begin(session()).unwrap();
    assert_eq!(
        cluster
            .participant
            .read(&reader, "db1", "t1", &Predicate::All)
            .unwrap(),
        vec![row![5i64, "first"]]
    );
}

#[test]
fn test_participant_commit_not_before_coordinator_ts() {
    let cluster = Cluster::new();
    let txn = TxnId::new();

    let begin_ts = cluster.coordinator.begin(session()).unwrap().begin_ts();
    let write = cluster.participant.handle(TxnRequest::Write {
        txn,
        begin_ts,
        database: "db1".into(),
        relation: "t1".into(),
        mutation: Mutation::Insert(row![9i64, "x"]),
    });
    assert_eq!(write, TxnResponse::Ok);
    assert_eq!(
        cluster.participant.handle(TxnRequest::Prepare { txn }),
        TxnResponse::Prepared
    );

    let floor = shardtxn::mvcc::Timestamp::new(1_000);
    match cluster
        .participant
        .handle(TxnRequest::Commit { txn, commit_ts: floor })
    {
        TxnResponse::Committed { commit_ts } => assert!(commit_ts >= floor),
        other => panic!("unexpected reply: {:?}", other),
    }

    // Later transactions on the participant begin after that commit
    let next = cluster.participant.begin(session()).unwrap();
    assert!(next.begin_ts() > floor);
    assert_eq!(
        cluster.participant.read(&next, "db1", "t1", &Predicate::All).unwrap().len(),
        1
    );
}

#[test]
fn test_unregistered_participant_unreachable() {
    let cluster = Cluster::new();
    cluster.sender.unregister("shard-2").unwrap();

    let mut txn = cluster.coordinator.begin(session()).unwrap();
    let err = cluster
        .coordinator
        .write_remote(&mut txn, &Shard::new(2), "db1", "t1", Mutation::Insert(row![1i64, "a"]))
        .unwrap_err();
    assert!(matches!(err, TxnError::Remote { .. }));
    cluster.coordinator.abort(txn).unwrap();
}

#[test]
fn test_participant_rejects_begin_below_collected_history() {
    let cluster = Cluster::new();
    let mut txn = cluster.coordinator.begin(session()).unwrap();

    // Move the participant's clock well past the coordinator's, then collect
    for _ in 0..3 {
        Cluster::rows(&cluster.participant);
    }
    cluster.participant.collect_garbage().unwrap();

    let err = cluster
        .coordinator
        .write_remote(&mut txn, &Shard::new(2), "db1", "t1", Mutation::Insert(row![1i64, "a"]))
        .unwrap_err();
    match err {
        TxnError::Remote { message, .. } => {
            assert!(message.contains("snapshot too old"), "{}", message)
        }
        other => panic!("unexpected error: {other}"),
    }
    cluster.coordinator.abort(txn).unwrap();
    assert_eq!(cluster.participant.active_count().unwrap(), 0);
}
