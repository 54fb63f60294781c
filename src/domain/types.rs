//! Identifiers and metric kinds shared by every cache.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

const MAX_IDENTIFIER_LEN: usize = 128;

fn validate_identifier(kind: &'static str, raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{kind} is required")));
    }
    if trimmed.len() > MAX_IDENTIFIER_LEN {
        return Err(DomainError::validation(format!(
            "{kind} must be at most {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if !trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(DomainError::validation(format!(
            "{kind} may only contain ASCII letters, digits, `-` and `_`"
        )));
    }
    Ok(trimmed.to_string())
}

/// Identifier of a post, as issued by the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        validate_identifier("post id", raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a user account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        validate_identifier("user id", raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharePlatform {
    Twitter,
    Facebook,
    Reddit,
    Linkedin,
    Hackernews,
    Email,
    CopyLink,
}

impl SharePlatform {
    pub const ALL: [SharePlatform; 7] = [
        SharePlatform::Twitter,
        SharePlatform::Facebook,
        SharePlatform::Reddit,
        SharePlatform::Linkedin,
        SharePlatform::Hackernews,
        SharePlatform::Email,
        SharePlatform::CopyLink,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SharePlatform::Twitter => "twitter",
            SharePlatform::Facebook => "facebook",
            SharePlatform::Reddit => "reddit",
            SharePlatform::Linkedin => "linkedin",
            SharePlatform::Hackernews => "hackernews",
            SharePlatform::Email => "email",
            SharePlatform::CopyLink => "copy_link",
        }
    }
}

impl FromStr for SharePlatform {
    type Err = DomainError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let needle = raw.trim().to_ascii_lowercase();
        SharePlatform::ALL
            .into_iter()
            .find(|platform| platform.as_str() == needle)
            .ok_or_else(|| DomainError::validation(format!("unknown share platform `{raw}`")))
    }
}

impl fmt::Display for SharePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a counter measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    View,
    Share(SharePlatform),
}

impl Metric {
    /// Stable name used in cache keys and the `counters.metric` column.
    pub fn key(self) -> String {
        match self {
            Metric::View => "view".to_string(),
            Metric::Share(platform) => format!("share:{}", platform.as_str()),
        }
    }

    /// Low-cardinality label for metrics.
    pub fn kind(self) -> &'static str {
        match self {
            Metric::View => "view",
            Metric::Share(_) => "share",
        }
    }
}

impl FromStr for Metric {
    type Err = DomainError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.split_once(':') {
            None if raw == "view" => Ok(Metric::View),
            Some(("share", platform)) => platform.parse().map(Metric::Share),
            _ => Err(DomainError::validation(format!("unknown metric `{raw}`"))),
        }
    }
}

/// Identity of a single counter: one metric of one subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub subject: PostId,
    pub metric: Metric,
}

impl CounterKey {
    pub fn new(subject: PostId, metric: Metric) -> Self {
        Self { subject, metric }
    }

    pub fn view(subject: PostId) -> Self {
        Self::new(subject, Metric::View)
    }

    pub fn share(subject: PostId, platform: SharePlatform) -> Self {
        Self::new(subject, Metric::Share(platform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_trimmed_and_validated() {
        assert_eq!(PostId::parse("  p1 ").expect("valid").as_str(), "p1");
        assert!(PostId::parse("").is_err());
        assert!(PostId::parse("   ").is_err());
        assert!(UserId::parse("user:1").is_err());
        assert!(UserId::parse(&"x".repeat(129)).is_err());
        assert!(UserId::parse("clx_9f-a").is_ok());
    }

    #[test]
    fn share_platform_parses_case_insensitively() {
        assert_eq!(
            "Twitter".parse::<SharePlatform>().expect("known"),
            SharePlatform::Twitter
        );
        assert_eq!(
            " copy_link ".parse::<SharePlatform>().expect("known"),
            SharePlatform::CopyLink
        );
        assert!("myspace".parse::<SharePlatform>().is_err());
    }

    #[test]
    fn metric_keys_are_stable_and_parse_back() {
        let share = Metric::Share(SharePlatform::Reddit);
        assert_eq!(Metric::View.key(), "view");
        assert_eq!(share.key(), "share:reddit");
        assert_eq!("share:reddit".parse::<Metric>().expect("metric"), share);
        assert_eq!("view".parse::<Metric>().expect("metric"), Metric::View);
        assert!("share".parse::<Metric>().is_err());
        assert!("like".parse::<Metric>().is_err());
    }
}
