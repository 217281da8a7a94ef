//! Identifier newtypes for server-owned entities.
//!
//! The backend hands out opaque string ids. Distinct newtypes keep a
//! `SessionId` from being passed where a `TemplateId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of leading id characters used in synthesized display names.
pub const SHORT_ID_LEN: usize = 8;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Leading characters of the id, for compact display.
            pub fn short(&self) -> &str {
                match self.0.char_indices().nth(SHORT_ID_LEN) {
                    Some((idx, _)) => &self.0[..idx],
                    None => &self.0,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(id)
            }
        }
    };
}

string_id!(
    /// Template identity.
    TemplateId
);
string_id!(
    /// Session identity.
    SessionId
);
string_id!(
    /// Execution identity.
    ExecutionId
);
