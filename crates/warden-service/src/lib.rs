//! Warden Service - the command surface of the moderation engine.
//!
//! Each command follows the same flow:
//!
//! ```text
//! command ─▶ ledger.record_event ─▶ policy.next_action ─▶ restriction manager
//!                    ▲                      │                 / platform
//!                    └──── recompute ◀──────┘
//! ```
//!
//! Authorization is the caller's job; the service trusts the actor it is
//! given. Every failure comes back as a [`ModerationError`] whose
//! [`ModerationError::user_message`] is safe to show the moderator.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod outcome;
pub mod service;

pub use error::{ModerationError, ModerationResult};
pub use outcome::{AppliedEscalation, CommandOutcome, SanctionContext};
pub use service::ModerationService;
