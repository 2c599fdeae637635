//! `kv` is the core library behind a small distributed key-value store:
//! a versioned in-memory map, a per-client sliding-window rate limiter,
//! and a hit counter with a few deliberately different concurrency
//! disciplines. The HTTP leader/follower nodes live in the `kv-cli`
//! crate; this crate has no knowledge of HTTP, replication topology or
//! process configuration — it is the part that gets locked.
//!
//! ## Getting started
//!
//! ```rust
//! use kv::store::VersionedStore;
//! use serde_json::json;
//!
//! let store = VersionedStore::new();
//! let version = store.set("greeting", json!("hello")).unwrap();
//! assert_eq!(store.get("greeting").unwrap().version, version);
//! ```

pub mod error;
pub mod hitcounter;
pub mod ratelimit;
pub mod store;
