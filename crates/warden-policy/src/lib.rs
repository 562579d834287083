//! Warden Policy - pure escalation decisions.
//!
//! The policy maps a counts snapshot to the next sanction. Tiers are
//! evaluated left to right, once each per command:
//!
//! ```text
//! Warning ──▶ Restriction ──▶ Removal
//!   │ every 3rd     │ every 3rd     │ every 2nd
//!   ▼               ▼               ▼
//! restrict 1d     remove          ban
//! ```
//!
//! The caller applies a directive, recomputes counts from the ledger, and
//! evaluates [`SanctionDirective::next_tier`]. The chain never loops back.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod decision;

pub use config::{PolicyConfig, PolicyError};
pub use decision::{EscalationPolicy, EscalationTier, SanctionDirective};
