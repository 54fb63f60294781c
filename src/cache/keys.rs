//! Cache key layout.
//!
//! Every key is `<prefix>:<family>:...` so one Redis can host several
//! deployments and families can be inspected or flushed with `SCAN`.

use crate::domain::types::{CounterKey, UserId};

/// Builds namespaced cache keys.
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_end_matches(':').to_string();
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `pulse:counter:<post>:view`, `pulse:counter:<post>:share:twitter`.
    pub fn counter(&self, key: &CounterKey) -> String {
        format!(
            "{}:counter:{}:{}",
            self.prefix,
            key.subject.as_str(),
            key.metric.key()
        )
    }

    pub fn follower_info(&self, user: &UserId) -> String {
        format!("{}:followers:{}", self.prefix, user.as_str())
    }

    pub fn trending(&self, window_hours: u32, limit: usize) -> String {
        format!("{}:trending:{window_hours}h:{limit}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{PostId, SharePlatform};

    #[test]
    fn keys_are_namespaced_per_family() {
        let keys = KeySpace::new("pulse:");
        let post = PostId::parse("p1").expect("post id");
        let user = UserId::parse("u1").expect("user id");

        assert_eq!(keys.prefix(), "pulse");
        assert_eq!(keys.counter(&CounterKey::view(post.clone())), "pulse:counter:p1:view");
        assert_eq!(
            keys.counter(&CounterKey::share(post, SharePlatform::Hackernews)),
            "pulse:counter:p1:share:hackernews"
        );
        assert_eq!(keys.follower_info(&user), "pulse:followers:u1");
        assert_eq!(keys.trending(24, 10), "pulse:trending:24h:10");
    }
}
