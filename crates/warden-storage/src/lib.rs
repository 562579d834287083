//! Warden storage abstractions.
//!
//! Two durable collections back the engine:
//! - the append-only sanction event log
//! - the live restriction table keyed by (member, scope), each row carrying
//!   the member's prior-role snapshot
//!
//! Both sit behind async traits so the in-memory adapter (tests, dry runs)
//! and the PostgreSQL adapter (feature `postgres`) are interchangeable.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryModerationStorage;
pub use traits::{ModerationStorage, RestrictionStore, SanctionEventStore};
