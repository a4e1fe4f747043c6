use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

const REDIRECT_MARKER: &str = "redirect_url=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Deleted,
    Active,
}

impl Category {
    /// Processing order of a run.
    pub const ALL: [Category; 2] = [Category::Deleted, Category::Active];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Deleted => "deleted",
            Category::Active => "active",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDescriptor {
    pub source_ref: String,
    pub timestamp: String,
    pub deleted_timestamp: Option<String>,
    pub category: Category,
}

impl ItemDescriptor {
    pub fn active(source_ref: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            source_ref: source_ref.into(),
            timestamp: timestamp.into(),
            deleted_timestamp: None,
            category: Category::Active,
        }
    }

    pub fn deleted(
        source_ref: impl Into<String>,
        timestamp: impl Into<String>,
        deleted_timestamp: impl Into<String>,
    ) -> Self {
        Self {
            source_ref: source_ref.into(),
            timestamp: timestamp.into(),
            deleted_timestamp: Some(deleted_timestamp.into()),
            category: Category::Deleted,
        }
    }

    pub fn effective_url(&self) -> Cow<'_, str> {
        effective_url(&self.source_ref)
    }
}

/// Unwraps one level of `redirect_url=` envelope. Anything that does not
/// decode to UTF-8 is returned untouched.
pub fn effective_url(source_ref: &str) -> Cow<'_, str> {
    let Some((_, encoded)) = source_ref.split_once(REDIRECT_MARKER) else {
        return Cow::Borrowed(source_ref);
    };
    match urlencoding::decode(encoded) {
        Ok(decoded) => Cow::Owned(decoded.into_owned()),
        Err(err) => {
            tracing::warn!(%err, source_ref, "redirect target is not valid UTF-8, using raw link");
            Cow::Borrowed(source_ref)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Skipped,
    Failed { reason: String, attempts_made: u32 },
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success | AttemptOutcome::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub source_ref: String,
    pub timestamp: String,
    pub category: Category,
    pub error_message: String,
    pub attempts_made: u32,
}

impl FailureRecord {
    pub fn new(item: &ItemDescriptor, error_message: impl Into<String>, attempts_made: u32) -> Self {
        Self {
            source_ref: item.source_ref.clone(),
            timestamp: item.timestamp.clone(),
            category: item.category,
            error_message: error_message.into(),
            attempts_made,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn unwraps_redirect_envelope() {
        let link = "https://www.tiktokv.com/share/video/1/?redirect_url=http%3A%2F%2Fexample.com%2Fv";
        assert_eq!(effective_url(link), "http://example.com/v");
    }

    #[test]
    fn plain_link_is_used_verbatim() {
        let link = "https://www.tiktokv.com/share/video/7000000000000000000/";
        assert_matches!(effective_url(link), Cow::Borrowed(value) if value == link);
    }

    #[test]
    fn undecodable_redirect_falls_back_to_raw_link() {
        let link = "https://t.example/?redirect_url=%FF%FE";
        assert_eq!(effective_url(link), link);
    }

    #[test]
    fn empty_redirect_target_is_empty() {
        assert_eq!(effective_url("https://t.example/?redirect_url="), "");
    }

    #[test]
    fn failure_record_uses_camel_case_keys() {
        let item = ItemDescriptor::active("https://t.example/v", "2023-01-02 03:04:05");
        let record = FailureRecord::new(&item, "boom", 3);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sourceRef"], "https://t.example/v");
        assert_eq!(json["category"], "active");
        assert_eq!(json["errorMessage"], "boom");
        assert_eq!(json["attemptsMade"], 3);
    }
}
