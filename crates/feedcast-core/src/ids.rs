//! Branded ID newtypes.
//!
//! IDs wrap a `String` so a session ID can never be passed where a feed ID is
//! expected. Fresh IDs are UUID v7 (time-ordered) with a short type prefix.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, process-unique ID.
            #[must_use]
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7()))
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id! {
    /// Identity of one live subscriber connection.
    ///
    /// Generated locally on upgrade; never derived from the remote address,
    /// so two connections behind the same proxy port never collide.
    SessionId, "ws"
}

branded_id! {
    /// Identifier of a created feed.
    FeedId, "feed"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("ws_"));
    }

    #[test]
    fn feed_id_prefix() {
        assert!(FeedId::new().as_str().starts_with("feed_"));
    }

    #[test]
    fn display_matches_inner() {
        let id = SessionId::from("ws_fixed");
        assert_eq!(id.to_string(), "ws_fixed");
        assert_eq!(id.into_inner(), "ws_fixed");
    }

    #[test]
    fn serde_is_transparent() {
        let id = FeedId::from("feed_1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"feed_1\"");
        let back: FeedId = serde_json::from_str("\"feed_1\"").unwrap();
        assert_eq!(back, id);
    }
}
