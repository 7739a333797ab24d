//! Package-level constants.

/// Current version of feedcast (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name, also used as the default bus client name.
pub const NAME: &str = "feedcast";

/// Bus topic carrying [`FeedCreatedEvent`](crate::FeedCreatedEvent) payloads.
pub const CREATED_FEED_TOPIC: &str = "created_feed";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION must be semver (MAJOR.MINOR.PATCH)");
        for part in parts {
            let _: u32 = part.parse().expect("each semver segment must be a number");
        }
    }

    #[test]
    fn topic_has_no_whitespace() {
        assert!(!CREATED_FEED_TOPIC.contains(char::is_whitespace));
        assert!(!CREATED_FEED_TOPIC.is_empty());
    }
}
