//! Loosely-typed records produced by the extractors.
//!
//! The field set differs per page and per extractor, so a [`Record`] is an
//! ordered map rather than a struct. A handful of field names carry meaning
//! across the pipeline; they are listed as constants here.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Display name of a link-extractor record.
pub const NAME: &str = "name";
/// Alternative display name used by some tables.
pub const TITLE: &str = "title";
/// Absolute URL of the record's own detail page.
pub const LINK: &str = "link";
/// JSON key of the nested detail object. A scraped field with this name is
/// stored as `detail_0` so the two never collide in output.
pub const DETAIL: &str = "detail";

fn stored_key(key: &str) -> Cow<'_, str> {
    if key == DETAIL {
        Cow::Owned(format!("{DETAIL}_0"))
    } else {
        Cow::Borrowed(key)
    }
}

/// A single field value: plain text, or an ordered list of texts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(v) => Some(v),
            FieldValue::Text(_) => None,
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        FieldValue::List(v)
    }
}

/// Biography and images scraped from a record's detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailInfo {
    pub bio: String,
    pub images: Vec<String>,
}

/// One extracted item. Field order follows insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(flatten)]
    fields: IndexMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<DetailInfo>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for the `{name, link}` shape of the link extractor.
    pub fn named_link(name: impl Into<String>, link: impl Into<String>) -> Self {
        let mut r = Self::new();
        r.insert(NAME, name.into());
        r.insert(LINK, link.into());
        r
    }

    /// Insert or replace a field, keeping its original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key: String = key.into();
        let key = stored_key(&key).into_owned();
        self.fields.insert(key, value.into());
    }

    /// Append `text` to the list stored under `key`, creating it if needed.
    pub fn push_text(&mut self, key: &str, text: String) {
        let key = stored_key(key);
        match self.fields.get_mut(key.as_ref()) {
            Some(FieldValue::List(items)) => items.push(text),
            Some(slot @ FieldValue::Text(_)) => {
                if let FieldValue::Text(prev) =
                    std::mem::replace(slot, FieldValue::List(Vec::new()))
                {
                    *slot = FieldValue::List(vec![prev, text]);
                }
            }
            None => {
                self.fields
                    .insert(key.into_owned(), FieldValue::List(vec![text]));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(stored_key(key).as_ref())
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_text)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(stored_key(key).as_ref())
    }

    /// `name`, falling back to `title`.
    pub fn display_name(&self) -> Option<&str> {
        self.text(NAME).or_else(|| self.text(TITLE))
    }

    pub fn link(&self) -> Option<&str> {
        self.text(LINK)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field-wise equality, ignoring field order and any attached detail.
    pub fn same_fields(&self, other: &Record) -> bool {
        self.fields == other.fields
    }

    pub fn detail(&self) -> Option<&DetailInfo> {
        self.detail.as_ref()
    }

    pub fn set_detail(&mut self, detail: Option<DetailInfo>) {
        self.detail = detail;
    }

    /// Merge fields returned by an external lookup; later values win.
    pub fn merge_fields<I>(&mut self, extra: I)
    where
        I: IntoIterator<Item = (String, FieldValue)>,
    {
        for (k, v) in extra {
            self.insert(k, v);
        }
    }
}
