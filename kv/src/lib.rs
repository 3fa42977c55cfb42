//! Lightweight JSON-file backed key-value store.
//!
//! Values are typed (string, integer, float or list) and the whole store is
//! written back to a single JSON object file after every mutation.
//!
//! # Example
//!
//! ```no_run
//! use detti_kv::{DettiDb, Limits, Options, Value};
//!
//! let db = DettiDb::open(Options::new("data/detti.json", Limits::new(64, 1024)))?;
//!
//! db.set("greeting", "hello")?;
//! db.set_int("answer", "42")?;
//! db.set_list("tags", vec!["a", "b"])?;
//! db.append("tags", 3)?;
//!
//! assert_eq!(db.get("answer"), Some(Value::Int(42)));
//! assert_eq!(db.search_by_value_prefix("hel").len(), 1);
//!
//! db.shutdown();
//! # Ok::<(), detti_kv::KVError>(())
//! ```

pub mod coerce;
pub mod error;
pub mod persist;
pub mod search;
pub mod store;
pub mod value;

pub use coerce::Limits;
pub use error::{KVError, KVResult, Rejection};
pub use persist::Persister;
pub use store::{DettiDb, Options, Stats};
pub use value::{Shape, Value};

#[cfg(test)]
mod tests;
