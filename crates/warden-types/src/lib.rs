//! Warden Types - shared vocabulary for the moderation-state engine.
//!
//! Every other warden crate speaks in these types:
//!
//! - **Identifiers**: [`MemberId`], [`ScopeId`], [`RoleId`], [`EventId`]
//! - **Sanction history**: [`SanctionEvent`] is immutable once written; a
//!   logical "undo" is a new event with [`SanctionAction::Remove`]
//! - **Restrictions**: [`RestrictionRecord`] carries the prior-role snapshot
//!   that reversal replays verbatim
//! - **Time**: [`Clock`] makes "now" injectable; [`parse_duration`] and
//!   [`format_duration`] handle moderator-entered tokens such as `2h30m`

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod clock;
pub mod duration;
pub mod event;
pub mod ids;
pub mod restriction;

pub use clock::{Clock, ManualClock, SystemClock};
pub use duration::{format_duration, parse_duration, DurationParseError};
pub use event::{
    LogKind, NewSanction, SanctionAction, SanctionCategory, SanctionCounts, SanctionEvent,
};
pub use ids::{EventId, Identity, MemberId, RoleId, ScopeId};
pub use restriction::{RestrictionKey, RestrictionRecord};
