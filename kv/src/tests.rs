use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::thread;

use serde_json::json;
use tempfile::TempDir;

use crate::{DettiDb, KVError, Limits, Options, Rejection, Shape, Value};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_in(dir: &TempDir) -> DettiDb {
    DettiDb::open(Options::new(dir.path().join("db.json"), Limits::new(16, 32))).unwrap()
}

fn reopen(db: &DettiDb) -> DettiDb {
    DettiDb::open(Options::new(db.path(), db.limits())).unwrap()
}

fn file_contents(db: &DettiDb) -> String {
    fs::read_to_string(db.path()).unwrap()
}

// ---------------------------------------------------------------------------
// Set / get
// ---------------------------------------------------------------------------

#[test]
fn test_set_get_each_shape() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);

    db.set("s", "text").unwrap();
    db.set("i", 123).unwrap();
    db.set("f", 123.123).unwrap();
    db.set("l", json!(["a", 1])).unwrap();
    db.set("b", true).unwrap();

    assert_eq!(db.get("s"), Some(Value::from("text")));
    assert_eq!(db.get("i"), Some(Value::Int(123)));
    assert_eq!(db.get("f"), Some(Value::Float(123.123)));
    assert_eq!(db.get("l"), Some(Value::List(vec![json!("a"), json!(1)])));
    assert_eq!(db.get("b"), Some(Value::Int(1)));
    assert_eq!(db.get("missing"), None);
}

#[test]
fn test_set_rejects_unsupported() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);

    let err = db.set("k", json!(null)).unwrap_err();
    assert!(matches!(err, KVError::Rejected(Rejection::Unsupported("null"))));
    let err = db.set("k", json!({"a": 1})).unwrap_err();
    assert!(matches!(err, KVError::Rejected(Rejection::Unsupported("object"))));
    assert!(!db.exists("k"));
}

#[test]
fn test_typed_setters_coerce() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);

    db.set_int("i", "42").unwrap();
    db.set_float("f", "2.5").unwrap();
    db.set_float("g", 3).unwrap();
    db.set_string("s", 17).unwrap();
    db.set_list("l", "ab").unwrap();

    assert_eq!(db.get("i"), Some(Value::Int(42)));
    assert_eq!(db.get("f"), Some(Value::Float(2.5)));
    assert_eq!(db.get("g"), Some(Value::Float(3.0)));
    assert_eq!(db.get("s"), Some(Value::from("17")));
    assert_eq!(db.get("l"), Some(Value::List(vec![json!("a"), json!("b")])));
}

#[test]
fn test_typed_setters_reject_bad_input() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);
    db.set("keep", "original").unwrap();
    let before = file_contents(&db);

    let err = db.set_int("keep", "not a number").unwrap_err();
    assert!(matches!(
        err,
        KVError::Rejected(Rejection::Coercion {
            target: Shape::Int,
            ..
        })
    ));
    assert!(db.set_float("keep", json!([1])).is_err());
    assert!(db.set_list("keep", 5).is_err());

    assert_eq!(db.get("keep"), Some(Value::from("original")));
    assert_eq!(file_contents(&db), before);
}

#[test]
fn test_set_trims_key_and_string_value() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);

    db.set("  padded  ", "  value \n").unwrap();
    assert_eq!(db.get("padded"), Some(Value::from("value")));
    assert!(!db.exists("  padded  "));

    let err = db.set("   ", "v").unwrap_err();
    assert!(matches!(err, KVError::Rejected(Rejection::EmptyKey)));
}

#[test]
fn test_set_value_typed() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);

    db.set_value("n", Value::Int(-7)).unwrap();
    db.set_value("s", Value::from(" x ")).unwrap();
    assert_eq!(db.get("n"), Some(Value::Int(-7)));
    assert_eq!(db.get("s"), Some(Value::from("x")));

    assert!(db.set_value("nan", Value::Float(f64::NAN)).is_err());
    assert!(!db.exists("nan"));
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

#[test]
fn test_limits_leave_store_unchanged() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);
    db.set("k", "v").unwrap();
    let before = file_contents(&db);

    let err = db.set("k".repeat(17).as_str(), "v").unwrap_err();
    assert!(matches!(
        err,
        KVError::Rejected(Rejection::KeyTooLong { len: 17, max: 16 })
    ));

    let err = db.set("k", "v".repeat(33)).unwrap_err();
    assert!(matches!(
        err,
        KVError::Rejected(Rejection::ValueTooLong { len: 33, max: 32 })
    ));

    let big = json!(["aaaaaaaaaa", "bbbbbbbbbb", "cccccccccc"]);
    assert!(db.set_list("k", big).is_err());

    assert_eq!(db.get_all().len(), 1);
    assert_eq!(db.get("k"), Some(Value::from("v")));
    assert_eq!(file_contents(&db), before);
}

#[test]
fn test_limits_at_boundary() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);

    db.set("k".repeat(16).as_str(), "v".repeat(32)).unwrap();
    db.set_int("n", "12345678901234567").unwrap();
    assert_eq!(db.len(), 2);
}

// ---------------------------------------------------------------------------
// Append / delete / clear
// ---------------------------------------------------------------------------

#[test]
fn test_append() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);

    db.set_list("l", json!(["a"])).unwrap();
    db.append("l", 1).unwrap();
    db.append("l", 2.5).unwrap();
    assert_eq!(
        db.get("l"),
        Some(Value::List(vec![json!("a"), json!(1), json!(2.5)]))
    );
    assert_eq!(reopen(&db).get("l"), db.get("l"));
}

#[test]
fn test_append_failures() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);
    db.set("s", "text").unwrap();

    let err = db.append("missing", 1).unwrap_err();
    assert!(matches!(err, KVError::NotFound(k) if k == "missing"));

    let err = db.append("s", 1).unwrap_err();
    assert!(matches!(err, KVError::NotList(k) if k == "s"));
    assert_eq!(db.get("s"), Some(Value::from("text")));
    assert!(!db.exists("missing"));
}

#[test]
fn test_append_respects_value_limit() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);
    db.set_list("l", json!(["0123456789", "0123456789"])).unwrap();

    let err = db.append("l", "0123456789").unwrap_err();
    assert!(matches!(err, KVError::Rejected(Rejection::ValueTooLong { .. })));
    assert_eq!(db.get("l").unwrap().as_list().unwrap().len(), 2);
}

#[test]
fn test_list_elements_must_be_flat() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);

    let err = db.set_list("l", json!([{"nested": {"o": 1}}, null])).unwrap_err();
    assert!(matches!(err, KVError::Rejected(Rejection::Element("object"))));
    assert!(!db.exists("l"));

    db.set("l", json!([1])).unwrap();
    let err = db.append("l", json!({"o": 1})).unwrap_err();
    assert!(matches!(err, KVError::Rejected(Rejection::Element("object"))));
    let err = db.append("l", json!(null)).unwrap_err();
    assert!(matches!(err, KVError::Rejected(Rejection::Element("null"))));

    let err = db.set_value("v", Value::List(vec![json!([1])])).unwrap_err();
    assert!(matches!(err, KVError::Rejected(Rejection::Element("array"))));
    assert_eq!(db.get("l"), Some(Value::List(vec![json!(1)])));
}

#[test]
fn test_delete() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);
    db.set("a", "1").unwrap();
    db.set("b", "2").unwrap();

    db.delete("a").unwrap();
    assert!(!db.exists("a"));
    assert!(!reopen(&db).exists("a"));

    let before = file_contents(&db);
    let err = db.delete("a").unwrap_err();
    assert!(matches!(err, KVError::NotFound(_)));
    assert_eq!(file_contents(&db), before);
    assert_eq!(db.keys(), vec!["b".to_string()]);
}

#[test]
fn test_clear() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);
    db.set("a", 1).unwrap();
    db.set("b", 2).unwrap();

    db.clear().unwrap();
    assert!(db.is_empty());
    assert_eq!(db.get_all(), BTreeMap::new());
    assert_eq!(file_contents(&db), "{}");
    assert!(reopen(&db).is_empty());
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[test]
fn test_search() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);
    db.set("test_key", "test_val").unwrap();
    db.set("prod_key_1", "prod_val_1").unwrap();
    db.set("prod_key_2", "prod_val_2").unwrap();

    let found = db.search_by_key_prefix("prod_");
    assert_eq!(found.len(), 2);
    assert_eq!(found["prod_key_1"], Value::from("prod_val_1"));
    assert_eq!(found["prod_key_2"], Value::from("prod_val_2"));

    db.set("prod_key_3", 128).unwrap();
    let found = db.search_by_value_prefix("prod_");
    assert_eq!(found.len(), 2);
    assert!(!found.contains_key("prod_key_3"));

    assert_eq!(db.search_by_key_prefix("prod_").len(), 3);
    assert!(db.search_by_key_prefix("nope").is_empty());
    assert!(db.search_by_value_prefix("nope").is_empty());
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn test_reopen_reproduces_mapping() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);

    db.set("s", "text").unwrap();
    db.set("i", 5).unwrap();
    db.set("f", 2.0).unwrap();
    db.set_list("l", json!([1, "two", 3.5])).unwrap();
    db.append("l", "four").unwrap();
    db.set("gone", "x").unwrap();
    db.delete("gone").unwrap();
    db.set("s", "replaced").unwrap();

    let snapshot = db.get_all();
    db.shutdown();
    drop(db);

    let db = DettiDb::open(Options::new(tmp.path().join("db.json"), Limits::new(16, 32))).unwrap();
    assert_eq!(db.get_all(), snapshot);
    assert_eq!(db.get("f"), Some(Value::Float(2.0)));
}

#[test]
fn test_open_empty_and_corrupt_files() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("db.json");

    fs::write(&path, "").unwrap();
    let db = DettiDb::open(Options::new(&path, Limits::new(8, 8))).unwrap();
    assert!(db.is_empty());
    drop(db);

    fs::write(&path, "[1, 2").unwrap();
    let err = DettiDb::open(Options::new(&path, Limits::new(8, 8))).unwrap_err();
    assert!(matches!(err, KVError::CorruptData { .. }));
}

#[test]
fn test_stats() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);
    assert_eq!(db.stats().unwrap().size_on_disk, 0);

    db.set("a", "b").unwrap();
    let stats = db.stats().unwrap();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.size_on_disk, r#"{"a":"b"}"#.len() as u64);
}

#[test]
fn test_write_failure_keeps_memory() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("sub");
    let db = DettiDb::open(Options::new(dir.join("db.json"), Limits::new(16, 32))).unwrap();
    db.set("a", "1").unwrap();

    // No directory, no temp file: the save fails for any user.
    fs::remove_dir_all(&dir).unwrap();
    let err = db.set("b", "2").unwrap_err();
    assert!(matches!(err, KVError::WriteFailed { .. }));
    assert_eq!(db.get("b"), Some(Value::from("2")));
    assert!(!db.path().exists());

    fs::create_dir_all(&dir).unwrap();
    db.set("c", "3").unwrap();

    let reloaded = reopen(&db);
    assert_eq!(reloaded.get("a"), Some(Value::from("1")));
    assert_eq!(reloaded.get("b"), Some(Value::from("2")));
    assert_eq!(reloaded.get("c"), Some(Value::from("3")));
}

// ---------------------------------------------------------------------------
// Shutdown / concurrency
// ---------------------------------------------------------------------------

#[test]
fn test_shutdown_refuses_mutations() {
    let tmp = TempDir::new().unwrap();
    let db = open_in(&tmp);
    db.set("a", "1").unwrap();

    db.shutdown();
    assert!(db.is_closed());
    assert!(matches!(db.set("b", "2"), Err(KVError::ShuttingDown)));
    assert!(matches!(db.delete("a"), Err(KVError::ShuttingDown)));
    assert!(matches!(db.clear(), Err(KVError::ShuttingDown)));

    assert_eq!(db.get("a"), Some(Value::from("1")));
    db.shutdown();
}

#[test]
fn test_shutdown_during_writes() {
    let tmp = TempDir::new().unwrap();
    let db = Arc::new(open_in(&tmp));

    let writer = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            let mut stored = Vec::new();
            let mut refused = 0;
            for i in 0..100_000 {
                let key = format!("k{i}");
                match db.set(&key, i) {
                    Ok(()) => {
                        assert_eq!(refused, 0, "{key} stored after a refusal");
                        stored.push(key);
                    }
                    Err(KVError::ShuttingDown) => {
                        refused += 1;
                        if refused == 10 {
                            break;
                        }
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            (stored, refused)
        })
    };

    thread::sleep(std::time::Duration::from_millis(20));
    db.shutdown();
    assert!(matches!(db.set("late", 1), Err(KVError::ShuttingDown)));

    let (stored, refused) = writer.join().unwrap();
    assert_eq!(refused, 10);

    let reloaded = reopen(&db);
    assert_eq!(reloaded.len(), stored.len());
    for key in &stored {
        assert!(reloaded.exists(key), "{key} missing after reopen");
    }
}

#[test]
fn test_concurrent_writers() {
    let tmp = TempDir::new().unwrap();
    let db = Arc::new(DettiDb::open(Options::new(
        tmp.path().join("db.json"),
        Limits::new(16, 64),
    ))
    .unwrap());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..10 {
                    db.set(format!("t{t}_{i}").as_str(), i).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(db.len(), 40);
    db.shutdown();
    assert_eq!(reopen(&db).get_all(), db.get_all());
}
