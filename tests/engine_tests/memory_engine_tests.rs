//! Tests for the Memory Engine
//!
//! These tests verify:
//! - Insert / replace / delete inside statements
//! - Transactions reading their own writes
//! - Statement savepoints
//! - Reads served from the tuple cache versus the row store
//! - Cache invalidation on commit
//! - Read views (vlsn)

use std::sync::Arc;

use cellar::cache::CacheEnv;
use cellar::config::WalMode;
use cellar::engine::LATEST_VLSN;
use cellar::{
    key, tuple, CellarError, Config, IteratorType, Key, KeyDef, MemoryEngine, Request, Result,
    Session, Space, Tuple, TxnEnv, Value,
};

// =============================================================================
// Helper Functions
// =============================================================================

struct Fixture {
    env: Arc<TxnEnv>,
    engine: Arc<MemoryEngine>,
    space: Arc<Space>,
}

/// Engine with one space keyed by the first two fields, no WAL
fn setup() -> Fixture {
    let config = Config::builder().wal_mode(WalMode::None).build();
    let env = Arc::new(TxnEnv::open(config).unwrap());
    let engine = MemoryEngine::new("memory", CacheEnv::new(1024 * 1024));
    let space = engine
        .create_space(512, "items", KeyDef::new(vec![0, 1]), false)
        .unwrap();
    Fixture { env, engine, space }
}

fn replace(session: &mut Session, fx: &Fixture, tuple: Tuple) -> Result<()> {
    let request = Request::replace(fx.space.id(), &tuple);
    let txn = session.begin_statement(&fx.space)?;
    fx.engine.replace(txn, &fx.space, tuple)?;
    session.commit_statement(Some(&request))
}

fn delete(session: &mut Session, fx: &Fixture, key: Key) -> Result<Option<Arc<Tuple>>> {
    let request = Request::delete(fx.space.id(), &key);
    let txn = session.begin_statement(&fx.space)?;
    let old = fx.engine.delete(txn, &fx.space, &key)?;
    session.commit_statement(Some(&request))?;
    Ok(old)
}

/// Commit each tuple in its own autocommit transaction
fn load(fx: &Fixture, tuples: Vec<Tuple>) {
    let mut session = Session::new(Arc::clone(&fx.env));
    for tuple in tuples {
        replace(&mut session, fx, tuple).unwrap();
    }
}

fn field_pairs(tuples: &[Arc<Tuple>]) -> Vec<(u64, u64)> {
    tuples
        .iter()
        .map(|t| match t.fields() {
            [Value::Unsigned(a), Value::Unsigned(b), ..] => (*a, *b),
            other => panic!("unexpected tuple {:?}", other),
        })
        .collect()
}

// =============================================================================
// DML Tests
// =============================================================================

#[test]
fn test_insert_duplicate_key() {
    let fx = setup();
    load(&fx, vec![tuple![1u64, 1u64, "a"]]);
    let mut session = Session::new(Arc::clone(&fx.env));

    let txn = session.begin_statement(&fx.space).unwrap();
    let err = fx
        .engine
        .insert(txn, &fx.space, tuple![1u64, 1u64, "b"])
        .unwrap_err();
    assert!(matches!(err, CellarError::DuplicateKey(512)));
    session.rollback_statement().unwrap();

    // Duplicate inside the same transaction
    session.begin(false).unwrap();
    let txn = session.begin_statement(&fx.space).unwrap();
    fx.engine.insert(txn, &fx.space, tuple![2u64, 1u64]).unwrap();
    let err = fx.engine.insert(txn, &fx.space, tuple![2u64, 1u64]).unwrap_err();
    assert!(matches!(err, CellarError::DuplicateKey(_)));
}

#[test]
fn test_replace_returns_old_tuple() {
    let fx = setup();
    load(&fx, vec![tuple![1u64, 1u64, "old"]]);
    let mut session = Session::new(Arc::clone(&fx.env));

    let txn = session.begin_statement(&fx.space).unwrap();
    let old = fx
        .engine
        .replace(txn, &fx.space, tuple![1u64, 1u64, "new"])
        .unwrap()
        .unwrap();
    assert_eq!(old.field(2), Some(&Value::from("old")));

    // The statement carries both images
    let stmt = txn.current_statement().unwrap();
    assert!(stmt.has_images());
    assert_eq!(stmt.new_tuple().unwrap().field(2), Some(&Value::from("new")));
    session.commit_statement(None).unwrap();

    let stored = fx.engine.get(None, 512, &key![1u64, 1u64]).unwrap().unwrap();
    assert_eq!(stored.field(2), Some(&Value::from("new")));
}

#[test]
fn test_delete() {
    let fx = setup();
    load(&fx, vec![tuple![1u64, 1u64], tuple![1u64, 2u64]]);
    let mut session = Session::new(Arc::clone(&fx.env));

    let old = delete(&mut session, &fx, key![1u64, 1u64]).unwrap();
    assert!(old.is_some());
    assert_eq!(fx.engine.len(512).unwrap(), 1);

    // Deleting a missing key is not an error
    let old = delete(&mut session, &fx, key![9u64, 9u64]).unwrap();
    assert!(old.is_none());

    let txn = session.begin_statement(&fx.space).unwrap();
    let err = fx.engine.delete(txn, &fx.space, &key![1u64]).unwrap_err();
    assert!(matches!(err, CellarError::IllegalParams(_)));
}

#[test]
fn test_tuple_must_cover_key() {
    let fx = setup();
    let mut session = Session::new(Arc::clone(&fx.env));

    let txn = session.begin_statement(&fx.space).unwrap();
    let err = fx.engine.replace(txn, &fx.space, tuple![1u64]).unwrap_err();
    assert!(matches!(err, CellarError::IllegalParams(_)));
}

#[test]
fn test_transaction_reads_own_writes() {
    let fx = setup();
    load(&fx, vec![tuple![1u64, 1u64, "committed"]]);
    let mut session = Session::new(Arc::clone(&fx.env));

    session.begin(false).unwrap();
    replace(&mut session, &fx, tuple![1u64, 1u64, "mine"]).unwrap();
    delete(&mut session, &fx, key![1u64, 1u64]).unwrap();
    replace(&mut session, &fx, tuple![2u64, 2u64]).unwrap();

    let own = session.txn();
    assert!(fx.engine.get(own, 512, &key![1u64, 1u64]).unwrap().is_none());
    assert!(fx.engine.get(own, 512, &key![2u64, 2u64]).unwrap().is_some());

    // Others still see the committed state
    let committed = fx.engine.get(None, 512, &key![1u64, 1u64]).unwrap().unwrap();
    assert_eq!(committed.field(2), Some(&Value::from("committed")));
    assert!(fx.engine.get(None, 512, &key![2u64, 2u64]).unwrap().is_none());

    session.commit().unwrap();
    assert!(fx.engine.get(None, 512, &key![1u64, 1u64]).unwrap().is_none());
    assert_eq!(fx.engine.len(512).unwrap(), 1);
}

#[test]
fn test_statement_savepoint() {
    let fx = setup();
    let mut session = Session::new(Arc::clone(&fx.env));

    session.begin(false).unwrap();
    replace(&mut session, &fx, tuple![1u64, 1u64]).unwrap();

    let txn = session.begin_statement(&fx.space).unwrap();
    fx.engine.replace(txn, &fx.space, tuple![1u64, 2u64]).unwrap();
    fx.engine.replace(txn, &fx.space, tuple![1u64, 3u64]).unwrap();
    session.rollback_statement().unwrap();

    session.commit().unwrap();
    assert_eq!(fx.engine.len(512).unwrap(), 1);
    assert!(fx.engine.get(None, 512, &key![1u64, 1u64]).unwrap().is_some());
}

#[test]
fn test_space_registry() {
    let fx = setup();

    let err = fx
        .engine
        .create_space(512, "again", KeyDef::new(vec![0]), false)
        .unwrap_err();
    assert!(matches!(err, CellarError::IllegalParams(_)));

    let err = fx
        .engine
        .select(999, IteratorType::All, &Key::empty(), LATEST_VLSN)
        .unwrap_err();
    assert!(matches!(err, CellarError::NoSuchSpace(999)));
    assert_eq!(fx.space.name(), "items");
    assert!(!fx.space.is_temporary());
}

// =============================================================================
// Select / Cache Tests
// =============================================================================

#[test]
fn test_select_order() {
    let fx = setup();
    load(
        &fx,
        vec![
            tuple![2u64, 1u64],
            tuple![1u64, 2u64],
            tuple![1u64, 1u64],
            tuple![3u64, 1u64],
        ],
    );

    let all = fx
        .engine
        .select(512, IteratorType::All, &Key::empty(), LATEST_VLSN)
        .unwrap();
    assert_eq!(field_pairs(&all), vec![(1, 1), (1, 2), (2, 1), (3, 1)]);

    let lt = fx
        .engine
        .select(512, IteratorType::Lt, &key![2u64], LATEST_VLSN)
        .unwrap();
    assert_eq!(field_pairs(&lt), vec![(1, 2), (1, 1)]);

    let req = fx
        .engine
        .select(512, IteratorType::Req, &key![1u64], LATEST_VLSN)
        .unwrap();
    assert_eq!(field_pairs(&req), vec![(1, 2), (1, 1)]);
}

#[test]
fn test_second_select_hits_cache() {
    let fx = setup();
    load(&fx, vec![tuple![1u64, 1u64], tuple![1u64, 2u64], tuple![2u64, 1u64]]);

    let first = fx
        .engine
        .select(512, IteratorType::Eq, &key![1u64], LATEST_VLSN)
        .unwrap();
    let stats = fx.engine.stats();
    assert_eq!(stats.store_reads, 1);
    assert_eq!(stats.cache_hits, 0);
    assert_eq!(fx.engine.cached_len(512).unwrap(), 2);

    let second = fx
        .engine
        .select(512, IteratorType::Eq, &key![1u64], LATEST_VLSN)
        .unwrap();
    let stats = fx.engine.stats();
    assert_eq!(stats.store_reads, 1);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(field_pairs(&first), field_pairs(&second));
    assert!(Arc::ptr_eq(&first[0], &second[0]));
}

#[test]
fn test_point_select_hits_cache() {
    let fx = setup();
    load(&fx, vec![tuple![1u64, 1u64, "x"]]);

    for _ in 0..3 {
        let found = fx
            .engine
            .select(512, IteratorType::Eq, &key![1u64, 1u64], LATEST_VLSN)
            .unwrap();
        assert_eq!(found.len(), 1);
    }
    let stats = fx.engine.stats();
    assert_eq!(stats.store_reads, 1);
    assert_eq!(stats.cache_hits, 2);
}

#[test]
fn test_empty_result_not_cached() {
    let fx = setup();
    load(&fx, vec![tuple![1u64, 1u64]]);

    for _ in 0..2 {
        let found = fx
            .engine
            .select(512, IteratorType::Eq, &key![5u64], LATEST_VLSN)
            .unwrap();
        assert!(found.is_empty());
    }
    assert_eq!(fx.engine.stats().store_reads, 2);
    assert_eq!(fx.engine.cached_len(512).unwrap(), 0);
}

#[test]
fn test_commit_invalidates_cache() {
    let fx = setup();
    load(&fx, vec![tuple![1u64, 1u64, "a"], tuple![1u64, 2u64, "b"]]);
    fx.engine
        .select(512, IteratorType::Eq, &key![1u64], LATEST_VLSN)
        .unwrap();
    assert_eq!(fx.engine.cached_len(512).unwrap(), 2);

    load(&fx, vec![tuple![1u64, 2u64, "c"]]);
    assert_eq!(fx.engine.cached_len(512).unwrap(), 1);

    let found = fx
        .engine
        .select(512, IteratorType::Eq, &key![1u64], LATEST_VLSN)
        .unwrap();
    assert_eq!(found[1].field(2), Some(&Value::from("c")));
    assert_eq!(fx.engine.stats().store_reads, 2);
}

#[test]
fn test_insert_into_cached_gap_forces_store_read() {
    let fx = setup();
    load(&fx, vec![tuple![1u64, 1u64], tuple![1u64, 3u64]]);
    fx.engine
        .select(512, IteratorType::Eq, &key![1u64], LATEST_VLSN)
        .unwrap();

    load(&fx, vec![tuple![1u64, 2u64]]);

    let found = fx
        .engine
        .select(512, IteratorType::Eq, &key![1u64], LATEST_VLSN)
        .unwrap();
    assert_eq!(field_pairs(&found), vec![(1, 1), (1, 2), (1, 3)]);
    assert_eq!(fx.engine.stats().store_reads, 2);
}

#[test]
fn test_rolled_back_writes_never_reach_cache() {
    let fx = setup();
    load(&fx, vec![tuple![1u64, 1u64]]);
    let mut session = Session::new(Arc::clone(&fx.env));

    session.begin(false).unwrap();
    replace(&mut session, &fx, tuple![1u64, 2u64]).unwrap();
    let found = fx
        .engine
        .select(512, IteratorType::Eq, &key![1u64], LATEST_VLSN)
        .unwrap();
    assert_eq!(found.len(), 1);
    session.rollback().unwrap();

    let cached = fx
        .engine
        .select(512, IteratorType::Eq, &key![1u64], LATEST_VLSN)
        .unwrap();
    assert_eq!(field_pairs(&cached), vec![(1, 1)]);
    assert_eq!(fx.engine.stats().cache_hits, 1);
}

// =============================================================================
// Read View Tests
// =============================================================================

#[test]
fn test_commit_lsn_follows_signature() {
    let fx = setup();
    load(&fx, vec![tuple![1u64, 1u64], tuple![1u64, 2u64], tuple![1u64, 3u64]]);

    let lsns: Vec<i64> = fx
        .engine
        .select(512, IteratorType::All, &Key::empty(), LATEST_VLSN)
        .unwrap()
        .iter()
        .map(|t| t.lsn())
        .collect();
    assert_eq!(lsns, vec![1, 2, 3]);
    assert_eq!(fx.env.signature(), 3);
}

#[test]
fn test_old_read_view_skips_cache_population() {
    let fx = setup();
    load(&fx, vec![tuple![1u64, 1u64], tuple![1u64, 2u64], tuple![1u64, 3u64]]);

    let found = fx
        .engine
        .select(512, IteratorType::All, &Key::empty(), 2)
        .unwrap();
    assert_eq!(field_pairs(&found), vec![(1, 1), (1, 2)]);
    assert_eq!(fx.engine.cached_len(512).unwrap(), 0);

    // A latest read fills the cache, an old read view then uses it
    fx.engine
        .select(512, IteratorType::All, &Key::empty(), LATEST_VLSN)
        .unwrap();
    assert_eq!(fx.engine.cached_len(512).unwrap(), 3);
    let point = fx
        .engine
        .select(512, IteratorType::Eq, &key![1u64, 1u64], 2)
        .unwrap();
    assert_eq!(point.len(), 1);
    assert_eq!(fx.engine.stats().cache_hits, 1);
}

#[test]
fn test_temporary_commit_keeps_last_lsn() {
    let fx = setup();
    load(&fx, vec![tuple![1u64, 1u64]]);
    let scratch = fx
        .engine
        .create_space(700, "scratch", KeyDef::new(vec![0]), true)
        .unwrap();

    let mut session = Session::new(Arc::clone(&fx.env));
    let txn = session.begin_statement(&scratch).unwrap();
    fx.engine.replace(txn, &scratch, tuple![5u64]).unwrap();
    session.commit_statement(None).unwrap();

    let stored = fx.engine.get(None, 700, &key![5u64]).unwrap().unwrap();
    assert_eq!(stored.lsn(), 1);
    assert_eq!(fx.env.signature(), 1);
}
