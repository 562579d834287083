//! Warden Restriction - the Timed Restriction Manager.
//!
//! A restriction moves one (member, scope) pair through
//! `Unrestricted → Restricted → Unrestricted`:
//!
//! - **apply**: snapshot the member's non-base roles, strip them, grant the
//!   marker role, persist a [`RestrictionRecord`], arm a reversal timer
//! - **reverse**: drop the marker, re-grant the snapshot verbatim, delete the
//!   record, cancel the timer
//! - **reconcile_on_startup**: reverse every record already past expiry and
//!   re-arm a timer for the rest
//!
//! The durable store, not the timer registry, is the source of truth. Timers
//! are an in-process optimisation that reconciliation rebuilds after a
//! restart.
//!
//! [`RestrictionRecord`]: warden_types::RestrictionRecord

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod error;
pub mod manager;
pub mod memory;
pub mod platform;

pub use config::RestrictionConfig;
pub use error::{RestrictionError, RestrictionResult};
pub use manager::{
    ReconcileReport, RestrictionEvent, RestrictionRequest, ReversalOrigin,
    TimedRestrictionManager,
};
pub use memory::{InMemoryPlatform, PlatformOp, PlatformOpKind};
pub use platform::{PlatformError, PlatformPermissions, PlatformResult};
