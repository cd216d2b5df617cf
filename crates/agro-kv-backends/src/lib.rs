//! Concrete [`agro_kv::KvEngine`] implementations.

pub mod memdb;

pub use memdb::{FaultInjection, MemDbEngine};
