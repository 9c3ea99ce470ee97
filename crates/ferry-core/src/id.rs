//! Record identifiers.
//!
//! Identifiers are assigned by the store when a record is first saved. A
//! record that has not been saved yet carries [`Default`], which is zero.

use derive_more::Display;
use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
        )]
        #[display("{_0}")]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            pub const fn get(self) -> i64 {
                self.0
            }

            /// Whether the store has assigned this identifier.
            pub const fn is_assigned(self) -> bool {
                self.0 > 0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

record_id!(
    /// Identifier of a connected repository.
    RepoId
);
record_id!(
    /// Identifier of the user that owns a repository.
    UserId
);
record_id!(
    /// Identifier of a commit record.
    CommitId
);
record_id!(
    /// Identifier of one build attempt.
    BuildId
);
