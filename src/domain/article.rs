use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::StageName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    Title,
    Abstract,
    FullText,
}

impl TextField {
    pub const ALL: [TextField; 3] = [TextField::Title, TextField::Abstract, TextField::FullText];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextField::Title => "ti",
            TextField::Abstract => "ab",
            TextField::FullText => "fullText",
        }
    }
}

/// Uninterpreted client keys live in `fields`. Every key keeps its presence, so an
/// untouched document serializes back exactly as it was submitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    ti: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    ab: Option<Option<String>>,
    #[serde(
        default,
        rename = "fullText",
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    full_text: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    skip_annotation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    annotations: Option<BTreeMap<StageName, Value>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip)]
    pub parsed: ParsedArticle,
}

// Distinguishes `"key": null` (Some(None)) from a missing key (None).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl Article {
    pub fn with_text(mut self, field: TextField, text: impl Into<String>) -> Self {
        *self.slot(field) = Some(Some(text.into()));
        self
    }

    pub fn text(&self, field: TextField) -> Option<&str> {
        let slot = match field {
            TextField::Title => &self.ti,
            TextField::Abstract => &self.ab,
            TextField::FullText => &self.full_text,
        };
        slot.as_ref().and_then(Option::as_deref)
    }

    fn slot(&mut self, field: TextField) -> &mut Option<Option<String>> {
        match field {
            TextField::Title => &mut self.ti,
            TextField::Abstract => &mut self.ab,
            TextField::FullText => &mut self.full_text,
        }
    }

    pub fn field(&self, key: &str) -> Option<Value> {
        let text = match key {
            "ti" => &self.ti,
            "ab" => &self.ab,
            "fullText" => &self.full_text,
            other => return self.fields.get(other).cloned(),
        };
        text.as_ref()
            .map(|t| t.clone().map(Value::String).unwrap_or(Value::Null))
    }

    pub fn annotation(&self, stage: &str) -> Option<&Value> {
        self.annotations.as_ref()?.get(stage)
    }

    pub fn annotations(&self) -> impl Iterator<Item = (&StageName, &Value)> {
        self.annotations.iter().flatten()
    }

    /// Records a stage result. Skipped articles are never written to.
    pub fn annotate(&mut self, stage: &StageName, value: Value) -> bool {
        if self.is_skipped() {
            return false;
        }
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(stage.clone(), value);
        true
    }

    pub fn is_skipped(&self) -> bool {
        self.skip_annotation == Some(true)
    }

    pub fn mark_skipped(&mut self) {
        self.skip_annotation = Some(true);
    }

    pub fn clear_parsed(&mut self) {
        self.parsed = ParsedArticle::default();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedText {
    pub sentences: Vec<String>,
    pub tokens: Vec<String>,
}

impl ParsedText {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedArticle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<ParsedText>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<ParsedText>,
    #[serde(rename = "fullText", skip_serializing_if = "Option::is_none")]
    pub full_text: Option<ParsedText>,
}

impl ParsedArticle {
    pub fn set(&mut self, field: TextField, parsed: ParsedText) {
        match field {
            TextField::Title => self.title = Some(parsed),
            TextField::Abstract => self.abstract_text = Some(parsed),
            TextField::FullText => self.full_text = Some(parsed),
        }
    }

    pub fn get(&self, field: TextField) -> Option<&ParsedText> {
        match field {
            TextField::Title => self.title.as_ref(),
            TextField::Abstract => self.abstract_text.as_ref(),
            TextField::FullText => self.full_text.as_ref(),
        }
    }
}
