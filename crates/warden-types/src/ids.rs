//! Identifier newtypes.
//!
//! Members, scopes and roles are owned by the chat platform; warden only
//! references them by their numeric snowflake.

use serde::{Deserialize, Serialize};

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

snowflake_id!(
    /// A member of a moderated community.
    MemberId
);

snowflake_id!(
    /// A community (guild) within which sanctions and permissions apply.
    ScopeId
);

snowflake_id!(
    /// A permission grant (role) inside a scope.
    RoleId
);

impl RoleId {
    /// The base role every member of `scope` implicitly holds.
    ///
    /// It shares the scope's numeric id and is never snapshotted or stripped.
    pub fn everyone(scope: ScopeId) -> Self {
        Self(scope.0)
    }
}

/// Unique identifier for a stored sanction event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub uuid::Uuid);

impl EventId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An addressable member together with the name shown in reports.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: MemberId,
    pub display_name: String,
}

impl Identity {
    pub fn new(id: impl Into<MemberId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}
