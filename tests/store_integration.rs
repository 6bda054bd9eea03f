//! Integration tests for the preference store
//!
//! Covers typed round-trips, key lifecycle, observation and the type-mismatch
//! policy across the put, get and observe paths.

use livepref::{
    MemoryProvider, ObjectHolder, PrefError, PrefKind, PrefStore, PrefValue, SqliteProvider,
    StorageProvider,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DateData {
    year: i32,
    month: u8,
    day: u8,
}

async fn memory_store() -> PrefStore {
    let store = PrefStore::new();
    store
        .initialize(&MemoryProvider::new(), "com.example.test")
        .await
        .unwrap();
    store
}

fn recorder<T: Clone + Send + 'static>()
-> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |v: &T| sink.lock().unwrap().push(v.clone()))
}

/// Every primitive type reads back what was written
#[tokio::test]
async fn test_primitive_roundtrips() {
    let store = memory_store().await;
    let tags: BTreeSet<String> = ["rust", "prefs"].iter().map(|s| s.to_string()).collect();

    store.put_int("int", i32::MIN).await.unwrap();
    store.put_long("long", i64::MAX).await.unwrap();
    store.put_float("float", 3.25).await.unwrap();
    store.put_double("double", std::f64::consts::PI).await.unwrap();
    store.put_bool("bool", true).await.unwrap();
    store.put_string("string", "héllo").await.unwrap();
    store.put_string_set("set", tags.clone()).await.unwrap();

    assert_eq!(store.get_int("int", 0).await.unwrap(), i32::MIN);
    assert_eq!(store.get_long("long", 0).await.unwrap(), i64::MAX);
    assert_eq!(store.get_float("float", 0.0).await.unwrap(), 3.25);
    assert_eq!(
        store.get_double("double", 0.0).await.unwrap(),
        std::f64::consts::PI
    );
    assert!(store.get_bool("bool", false).await.unwrap());
    assert_eq!(store.get_string("string", "").await.unwrap(), "héllo");
    assert_eq!(store.get_string_set("set", BTreeSet::new()).await.unwrap(), tags);
}

/// Absent keys fall back to the caller's default
#[tokio::test]
async fn test_get_returns_default_when_absent() {
    let store = memory_store().await;
    assert_eq!(store.get_int("missing", 42).await.unwrap(), 42);
    assert_eq!(store.get_string("missing", "fallback").await.unwrap(), "fallback");
    assert_eq!(store.get_object::<DateData>("missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_has_key_and_delete_lifecycle() {
    let store = memory_store().await;
    assert!(!store.has_key("k").await.unwrap());

    store.put_int("k", 1).await.unwrap();
    assert!(store.has_key("k").await.unwrap());

    assert!(store.delete_key("k").await.unwrap());
    assert!(!store.delete_key("k").await.unwrap());
    assert!(!store.has_key("k").await.unwrap());
}

/// Observing an unwritten key yields the type's zero value
#[tokio::test]
async fn test_observe_unwritten_key_yields_zero() {
    let store = memory_store().await;
    assert_eq!(store.observe_int("a").await.unwrap().value(), 0);
    assert!(!store.observe_bool("b").await.unwrap().value());
    assert_eq!(store.observe_string("c").await.unwrap().value(), "");
    assert_eq!(store.observe_double("d").await.unwrap().value(), 0.0);
    assert!(store.observe_string_set("e").await.unwrap().value().is_empty());
    assert!(
        store
            .observe_object::<DateData>("f")
            .await
            .unwrap()
            .value()
            .is_empty()
    );
}

/// A put is delivered to the listener exactly once, before put returns
#[tokio::test]
async fn test_put_notifies_listener_once_before_returning() {
    let store = memory_store().await;
    let observer = store.observe_int("volume").await.unwrap();
    let (seen, listener) = recorder::<i32>();
    observer.listen(listener);
    seen.lock().unwrap().clear();

    store.put_int("volume", 11).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![11]);
    assert_eq!(observer.value(), 11);
}

/// Two observers of one key share a subscription
#[tokio::test]
async fn test_second_observer_shares_subscription() {
    let store = memory_store().await;
    let first = store.observe_long("ticks").await.unwrap();
    store.put_long("ticks", 5).await.unwrap();

    let second = store.observe_long("ticks").await.unwrap();
    assert_eq!(second.value(), 5);

    let (seen, listener) = recorder::<i64>();
    first.listen(listener);
    store.put_long("ticks", 6).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![5, 6]);
    assert_eq!(store.registry().len(), 1);
}

/// Writing a String to a key bound to Integer is rejected and changes nothing
#[tokio::test]
async fn test_mismatched_put_is_rejected_and_state_preserved() {
    let store = memory_store().await;
    store.put_int("age", 30).await.unwrap();
    let observer = store.observe_int("age").await.unwrap();
    let (seen, listener) = recorder::<i32>();
    observer.listen(listener);

    let err = store.put_string("age", "thirty").await.unwrap_err();
    match err {
        PrefError::TypeMismatch {
            key,
            expected,
            found,
        } => {
            assert_eq!(key, "age");
            assert_eq!(expected, PrefKind::Int);
            assert_eq!(found, PrefKind::String);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(store.get_int("age", 0).await.unwrap(), 30);
    assert_eq!(observer.value(), 30);
    assert_eq!(*seen.lock().unwrap(), vec![30]);
}

/// The same key rejects other types on every path once bound
#[tokio::test]
async fn test_mismatch_policy_is_uniform() {
    let store = memory_store().await;
    store.observe_int("age").await.unwrap();

    assert!(store.put_string("age", "x").await.unwrap_err().is_type_mismatch());
    assert!(store.get_string("age", "").await.unwrap_err().is_type_mismatch());
    assert!(store.observe_string("age").await.unwrap_err().is_type_mismatch());
    assert!(
        store
            .registry()
            .notify("age", PrefValue::String("x".to_string()))
            .unwrap_err()
            .is_type_mismatch()
    );
    assert!(
        store
            .put_object("age", Some(DateData { year: 1, month: 1, day: 1 }))
            .await
            .unwrap_err()
            .is_type_mismatch()
    );

    // Same type still works
    store.put_int("age", 31).await.unwrap();
    assert_eq!(store.observe_int("age").await.unwrap().value(), 31);
}

/// Unobserved keys are not bound; writes of any type go through
#[tokio::test]
async fn test_unobserved_key_accepts_any_type() {
    let store = memory_store().await;
    store.put_int("free", 1).await.unwrap();
    store.put_string("free", "now a string").await.unwrap();
    assert_eq!(store.get_string("free", "").await.unwrap(), "now a string");
    assert!(store.registry().binding("free").is_none());
}

#[tokio::test]
async fn test_object_roundtrip_and_null() {
    let store = memory_store().await;
    let date = DateData {
        year: 2021,
        month: 5,
        day: 31,
    };

    store.put_object("date", Some(date.clone())).await.unwrap();
    assert_eq!(store.get_object::<DateData>("date").await.unwrap(), Some(date));

    store.put_object::<DateData>("date", None).await.unwrap();
    assert_eq!(store.get_object::<DateData>("date").await.unwrap(), None);
    assert!(store.has_key("date").await.unwrap());
}

#[tokio::test]
async fn test_object_observer_receives_holders() {
    let store = memory_store().await;
    let date = DateData {
        year: 2021,
        month: 5,
        day: 31,
    };
    store.put_object("date", Some(date.clone())).await.unwrap();

    let observer = store.observe_object::<DateData>("date").await.unwrap();
    assert_eq!(observer.value().value(), Some(&date));

    let (seen, listener) = recorder::<ObjectHolder<DateData>>();
    observer.listen(listener);
    store.put_object::<DateData>("date", None).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].value(), Some(&date));
    assert!(seen[1].is_empty());
}

/// Every operation fails before initialize
#[tokio::test]
async fn test_operations_require_initialization() {
    let store = PrefStore::new();
    assert!(!store.is_initialized());

    fn not_initialized<T: std::fmt::Debug>(result: livepref::Result<T>) {
        assert!(matches!(result, Err(PrefError::NotInitialized)), "{:?}", result);
    }

    not_initialized(store.has_key("k").await);
    not_initialized(store.delete_key("k").await);
    not_initialized(store.keys().await);
    not_initialized(store.put_int("k", 1).await);
    not_initialized(store.get_int("k", 0).await);
    not_initialized(store.put_long("k", 1).await);
    not_initialized(store.get_long("k", 0).await);
    not_initialized(store.put_float("k", 1.0).await);
    not_initialized(store.get_float("k", 0.0).await);
    not_initialized(store.put_double("k", 1.0).await);
    not_initialized(store.get_double("k", 0.0).await);
    not_initialized(store.put_bool("k", true).await);
    not_initialized(store.get_bool("k", false).await);
    not_initialized(store.put_string("k", "v").await);
    not_initialized(store.get_string("k", "").await);
    not_initialized(store.put_string_set("k", BTreeSet::new()).await);
    not_initialized(store.get_string_set("k", BTreeSet::new()).await);
    not_initialized(store.put_object("k", Some(1_u8)).await);
    not_initialized(store.get_object::<u8>("k").await);
    not_initialized(store.observe_int("k").await.map(|o| o.value()));
    not_initialized(store.observe_object::<u8>("k").await.map(|o| o.value().is_empty()));
}

/// A failed commit neither changes storage nor notifies
#[tokio::test]
async fn test_storage_failure_propagates_without_notify() {
    let provider = MemoryProvider::new();
    let store = PrefStore::new();
    store.initialize(&provider, "flaky").await.unwrap();

    let observer = store.observe_int("n").await.unwrap();
    let (seen, listener) = recorder::<i32>();
    observer.listen(listener);

    provider.backend("flaky_prefs").set_fail_commits(true);
    let err = store.put_int("n", 9).await.unwrap_err();
    assert!(matches!(err, PrefError::Storage(_)));

    assert_eq!(*seen.lock().unwrap(), vec![0]);
    assert_eq!(observer.value(), 0);
    assert!(!store.has_key("n").await.unwrap());
}

/// Failed reads surface as storage errors on every read path
#[tokio::test]
async fn test_read_failure_propagates() {
    let provider = MemoryProvider::new();
    let store = PrefStore::new();
    store.initialize(&provider, "flaky").await.unwrap();
    store.put_int("n", 3).await.unwrap();
    store
        .put_object(
            "date",
            Some(DateData {
                year: 2021,
                month: 5,
                day: 31,
            }),
        )
        .await
        .unwrap();

    fn storage_error<T: std::fmt::Debug>(result: livepref::Result<T>) {
        assert!(matches!(result, Err(PrefError::Storage(_))), "{:?}", result);
    }

    let backend = provider.backend("flaky_prefs");
    backend.set_fail_reads(true);

    storage_error(store.get_int("n", 0).await);
    storage_error(store.has_key("n").await);
    storage_error(store.keys().await);
    storage_error(store.delete_key("n").await);
    storage_error(store.get_object::<DateData>("date").await);
    storage_error(store.observe_int("n").await);
    storage_error(store.observe_object::<DateData>("date").await);

    // A failed first observation must not bind the key
    assert!(!store.registry().is_observed("n"));
    assert!(!store.registry().is_observed("date"));

    backend.set_fail_reads(false);
    assert_eq!(store.observe_int("n").await.unwrap().value(), 3);
    assert!(store.has_key("date").await.unwrap());
}

/// Fresh stores are isolated from each other
#[tokio::test]
async fn test_stores_are_independent_contexts() {
    let a = memory_store().await;
    let b = memory_store().await;

    a.observe_int("shared").await.unwrap();
    b.put_string("shared", "fine here").await.unwrap();
    assert!(a.put_string("shared", "not here").await.is_err());
}

/// Values written through SQLite survive reopening the namespace
#[tokio::test]
async fn test_sqlite_persists_across_stores() {
    let dir = std::env::temp_dir().join(format!("livepref-test-{}", std::process::id()));
    let provider = SqliteProvider::new(&dir);

    {
        let store = PrefStore::new();
        store.initialize(&provider, "persist").await.unwrap();
        store.put_int("launches", 3).await.unwrap();
        store.put_double("ratio", 0.5).await.unwrap();
        store
            .put_object(
                "date",
                Some(DateData {
                    year: 2021,
                    month: 5,
                    day: 31,
                }),
            )
            .await
            .unwrap();
    }

    let store = PrefStore::new();
    store.initialize(&provider, "persist").await.unwrap();
    assert_eq!(store.get_int("launches", 0).await.unwrap(), 3);
    assert_eq!(store.get_double("ratio", 0.0).await.unwrap(), 0.5);
    assert_eq!(
        store.get_object::<DateData>("date").await.unwrap(),
        Some(DateData {
            year: 2021,
            month: 5,
            day: 31
        })
    );
    assert_eq!(
        store.keys().await.unwrap(),
        vec!["date".to_string(), "launches".to_string(), "ratio".to_string()]
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_sqlite_in_memory_behaves_like_memory() {
    let provider: Box<dyn StorageProvider> = Box::new(SqliteProvider::in_memory());
    let store = PrefStore::new();
    store.initialize(provider.as_ref(), "mem").await.unwrap();

    let observer = store.observe_bool("flag").await.unwrap();
    store.put_bool("flag", true).await.unwrap();
    assert!(observer.value());
    assert!(store.delete_key("flag").await.unwrap());
    assert!(!observer.value());
}

fn race_dir(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("livepref-{}-{}", name, std::process::id()))
}

/// A write racing the first observation of a key either lands before the
/// binding or is rejected without touching storage
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_put_racing_observe_never_commits_rejected_value() {
    let dir = race_dir("bind-race");
    let provider = SqliteProvider::new(&dir);
    let store = PrefStore::new();
    store.initialize(&provider, "race").await.unwrap();

    for i in 0..50 {
        let key = format!("m{}", i);
        let (observed, written) =
            tokio::join!(store.observe_int(&key), store.put_string(&key, "x"));

        match (observed, written) {
            (Ok(observer), Err(err)) => {
                assert!(err.is_type_mismatch());
                assert!(!store.has_key(&key).await.unwrap());
                assert_eq!(store.get_int(&key, 7).await.unwrap(), 7);
                assert_eq!(observer.value(), 0);
            }
            (Err(err), Ok(())) => {
                assert!(err.is_type_mismatch());
                assert!(!store.registry().is_observed(&key));
                assert_eq!(store.get_string(&key, "").await.unwrap(), "x");
            }
            (observed, written) => panic!(
                "observe and put both {}",
                if observed.is_ok() && written.is_ok() {
                    "succeeded"
                } else {
                    "failed"
                }
            ),
        }
    }

    let _ = std::fs::remove_dir_all(&dir);
}

/// An observation racing a write of the same type ends on the written value
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_observe_racing_put_sees_written_value() {
    let dir = race_dir("seed-race");
    let provider = SqliteProvider::new(&dir);
    let store = PrefStore::new();
    store.initialize(&provider, "race").await.unwrap();

    for i in 0..50 {
        let key = format!("s{}", i);
        let (observed, written) = tokio::join!(store.observe_int(&key), store.put_int(&key, 5));

        written.unwrap();
        assert_eq!(observed.unwrap().value(), 5);
        assert_eq!(store.get_int(&key, 0).await.unwrap(), 5);
    }

    let _ = std::fs::remove_dir_all(&dir);
}
