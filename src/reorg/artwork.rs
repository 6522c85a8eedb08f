use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const UNKNOWN_YEAR_TOKEN: &str = "unknown";

/// One catalog entry. Only `id`, `image` and `imageHigh` are rewritten by a
/// reorganization; every other field round-trips untouched through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artwork {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<Value>,
    #[serde(default)]
    pub image: String,
    #[serde(default, rename = "imageHigh")]
    pub image_high: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Artwork {
    pub fn new(id: impl Into<String>, title: impl Into<String>, year: Option<&str>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            year: year.map(|y| Value::String(y.to_string())),
            image: String::new(),
            image_high: String::new(),
            extra: Map::new(),
        }
    }

    /// The `year` field as trimmed text; numbers are rendered as written.
    pub fn year_text(&self) -> Option<String> {
        let text = match self.year.as_ref()? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if text.is_empty() { None } else { Some(text) }
    }

    /// Numeric value of the year for sorting, or `None` when the year groups
    /// as `unknown`. A sub-version such as `2022.8` sorts as 2022.
    pub fn parsed_year(&self) -> Option<u32> {
        let text = self.year_text()?;
        if !is_year_token(&text) {
            return None;
        }
        let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse::<u32>().ok()
    }

    /// Grouping key for ID assignment: `2021`, `2022.8`, or `unknown`.
    pub fn year_token(&self) -> String {
        match self.year_text() {
            Some(text) if is_year_token(&text) => text,
            _ => UNKNOWN_YEAR_TOKEN.to_string(),
        }
    }

    /// The previous identifier, if the catalog carried a usable one.
    pub fn old_id(&self) -> Option<&str> {
        let trimmed = self.id.trim();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

pub fn is_year_token(text: &str) -> bool {
    let (head, tail) = match text.split_once('.') {
        Some((head, tail)) => (head, Some(tail)),
        None => (text, None),
    };
    if !all_digits(head) || head.chars().all(|c| c == '0') {
        return false;
    }
    tail.is_none_or(all_digits)
}

/// Split an identifier into its year token and sequence number.
pub fn split_id(id: &str) -> Option<(&str, u32)> {
    let (token, seq) = id.rsplit_once('_')?;
    if token != UNKNOWN_YEAR_TOKEN && !is_year_token(token) {
        return None;
    }
    if seq.len() < 3 || !all_digits(seq) {
        return None;
    }
    Some((token, seq.parse().ok()?))
}
