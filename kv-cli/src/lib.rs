//! `kvcli` hosts the leader and follower HTTP nodes for the distributed
//! kv storage. [Author fengyang]
//!
//! Both binaries share the `server` module for routing and state, and
//! `trace` for log setup.

pub mod server;
pub mod trace;
