use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Thresholds below which a post is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub min_likes: u32,
    pub min_retweets: u32,
    pub min_age_days: u32,
    pub include_replies: bool,
}

impl RetentionPolicy {
    /// Replies are filtered server-side, at fetch time.
    pub fn exclude_replies(&self) -> bool {
        !self.include_replies
    }
}

/// The threshold form exactly as submitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdForm {
    #[serde(default)]
    pub min_likes: String,
    #[serde(default)]
    pub min_retweets: String,
    #[serde(default)]
    pub min_age: String,
    #[serde(default)]
    pub include_replies: Option<String>,
}

impl From<&RetentionPolicy> for ThresholdForm {
    fn from(policy: &RetentionPolicy) -> Self {
        Self {
            min_likes: policy.min_likes.to_string(),
            min_retweets: policy.min_retweets.to_string(),
            min_age: policy.min_age_days.to_string(),
            include_replies: policy.include_replies.then(|| "on".to_string()),
        }
    }
}

/// Rejected threshold input, keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("invalid thresholds: {}", summary(.fields))]
pub struct ValidationError {
    pub fields: BTreeMap<&'static str, String>,
}

fn summary(fields: &BTreeMap<&'static str, String>) -> String {
    fields
        .iter()
        .map(|(field, message)| format!("{field} {message}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Validate)]
struct ThresholdInput {
    #[validate(range(min = 0, message = "must be zero or greater"))]
    min_likes: i64,
    #[validate(range(min = 0, message = "must be zero or greater"))]
    min_retweets: i64,
    #[validate(range(min = 0, message = "must be zero or greater"))]
    min_age: i64,
}

/// Form field name for a validated struct field.
fn form_field(name: &str) -> Option<&'static str> {
    match name {
        "min_likes" => Some("minLikes"),
        "min_retweets" => Some("minRetweets"),
        "min_age" => Some("minAge"),
        _ => None,
    }
}

impl ThresholdForm {
    /// Validate every field, collecting all problems rather than stopping at
    /// the first.
    pub fn validate(&self) -> Result<RetentionPolicy, ValidationError> {
        let mut errors = ValidationError::default();

        let min_likes = parse_integer("minLikes", &self.min_likes, &mut errors);
        let min_retweets = parse_integer("minRetweets", &self.min_retweets, &mut errors);
        let min_age = parse_integer("minAge", &self.min_age, &mut errors);
        let include_replies = parse_flag(self.include_replies.as_deref(), &mut errors);

        let input = ThresholdInput {
            min_likes: min_likes.unwrap_or(0),
            min_retweets: min_retweets.unwrap_or(0),
            min_age: min_age.unwrap_or(0),
        };
        if let Err(range_errors) = input.validate() {
            for (field, field_errors) in range_errors.field_errors() {
                let (Some(name), Some(first)) = (form_field(&field), field_errors.first()) else {
                    continue;
                };
                let message = first
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "is out of range".to_string());
                errors.fields.entry(name).or_insert(message);
            }
        }

        let to_u32 = |name: &'static str, value: i64, errors: &mut ValidationError| {
            u32::try_from(value).unwrap_or_else(|_| {
                errors
                    .fields
                    .entry(name)
                    .or_insert_with(|| "is too large".to_string());
                0
            })
        };
        let policy = RetentionPolicy {
            min_likes: to_u32("minLikes", input.min_likes, &mut errors),
            min_retweets: to_u32("minRetweets", input.min_retweets, &mut errors),
            min_age_days: to_u32("minAge", input.min_age, &mut errors),
            include_replies,
        };

        if errors.fields.is_empty() {
            Ok(policy)
        } else {
            Err(errors)
        }
    }
}

fn parse_integer(name: &'static str, raw: &str, errors: &mut ValidationError) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.fields.insert(name, "is required".to_string());
        return None;
    }
    match raw.parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.fields.insert(name, "must be a whole number".to_string());
            None
        }
    }
}

/// Checkbox semantics: absent is false, `on`/`true` are true.
fn parse_flag(raw: Option<&str>, errors: &mut ValidationError) -> bool {
    match raw.map(str::trim) {
        None | Some("") => false,
        Some(v) if v.eq_ignore_ascii_case("on") || v.eq_ignore_ascii_case("true") => true,
        Some(v) if v.eq_ignore_ascii_case("off") || v.eq_ignore_ascii_case("false") => false,
        Some(_) => {
            errors
                .fields
                .insert("includeReplies", "must be a boolean".to_string());
            false
        }
    }
}
