//! # leaseq
//!
//! Lease-based work queue. Producers enqueue opaque items; workers take them
//! under a time-bounded lease and report completion; items whose lease runs
//! out are returned to the queue by a background reaper for redelivery.
//!
//! Semantics are at-least-once over a single [`store::Store`], which is the
//! only synchronization point: every state transition is one store
//! transaction. Backends: in-process ([`store::MemoryStore`]) and Postgres
//! ([`db::Db`]).

pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod store;
pub mod telemetry;
