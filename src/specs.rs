//! Field, facet, badge and sort definitions.

use crate::codec::Codec;
use crate::composer::SchemaError;
use crate::document::{Document, FieldValue};
use crate::extraction::{Extractor, TagPattern};
use crate::record::{Library, Record};
use crate::transforms::{self, RegexFlags, TransformError};
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// How the indexing engine stores a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageType {
    /// Stored for display only, not searchable.
    Stored,
    Id {
        #[serde(default)]
        stored: bool,
    },
    Text {
        #[serde(default)]
        stored: bool,
    },
    Keyword {
        #[serde(default)]
        stored: bool,
    },
    Boolean {
        #[serde(default)]
        stored: bool,
    },
}

impl StorageType {
    /// Whether the engine keeps the value for display.
    pub fn is_stored(&self) -> bool {
        match self {
            StorageType::Stored => true,
            StorageType::Id { stored }
            | StorageType::Text { stored }
            | StorageType::Keyword { stored }
            | StorageType::Boolean { stored } => *stored,
        }
    }

    /// Name used in configuration (`type:`).
    pub fn name(&self) -> &'static str {
        match self {
            StorageType::Stored => "stored",
            StorageType::Id { .. } => "id",
            StorageType::Text { .. } => "text",
            StorageType::Keyword { .. } => "keyword",
            StorageType::Boolean { .. } => "boolean",
        }
    }
}

/// A derived field.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub key: String,
    pub storage: StorageType,
    pub extractor: Extractor,
    pub codec: Option<Arc<dyn Codec>>,
}

impl FieldDefinition {
    /// A field without a storage codec.
    pub fn new(key: impl Into<String>, storage: StorageType, extractor: Extractor) -> Self {
        Self {
            key: key.into(),
            storage,
            extractor,
            codec: None,
        }
    }

    /// Encode extracted values with `codec` before they are stored.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }
}

/// Where a facet's values come from.
#[derive(Debug, Clone)]
pub enum FacetSource {
    /// Sub-collections of `collection_key` the record belongs to.
    Collection { collection_key: String },
    /// The record's tags, optionally restricted to those matching a pattern.
    Tag { pattern: Option<TagPattern> },
    ItemType,
    /// Whether the record has a URL.
    Link,
}

impl FacetSource {
    /// Facet values for one record.
    pub fn values(&self, record: &Record, library: &Library) -> FieldValue {
        match self {
            FacetSource::Collection { collection_key } => {
                let mut keys = IndexSet::new();
                for collection in library.iter() {
                    if !record.in_collection(&collection.key) {
                        continue;
                    }
                    if let Some(path) = library.path_below(&collection.key, collection_key) {
                        // Ancestors first so a parent precedes its children.
                        for key in path.into_iter().rev() {
                            keys.insert(key.to_string());
                        }
                    }
                }
                FieldValue::strings(keys)
            }
            FacetSource::Tag { pattern } => FieldValue::strings(
                record
                    .tags()
                    .iter()
                    .map(|tag| tag.trim())
                    .filter(|tag| !tag.is_empty())
                    .filter(|tag| pattern.as_ref().map_or(true, |p| p.matches(tag))),
            ),
            FacetSource::ItemType => match record.get("itemType").and_then(Value::as_str) {
                Some(item_type) if !item_type.is_empty() => FieldValue::strings([item_type]),
                _ => FieldValue::List(Vec::new()),
            },
            FacetSource::Link => FieldValue::Bool(
                record
                    .get("url")
                    .and_then(Value::as_str)
                    .map_or(false, |url| !url.trim().is_empty()),
            ),
        }
    }
}

/// A selectable search filter.
#[derive(Debug, Clone)]
pub struct FacetDefinition {
    pub key: String,
    /// Query-string name of the filter.
    pub filter_key: String,
    pub title: String,
    pub weight: Option<i32>,
    pub source: FacetSource,
}

impl FacetDefinition {
    /// A facet without a weight.
    pub fn new(
        key: impl Into<String>,
        filter_key: impl Into<String>,
        title: impl Into<String>,
        source: FacetSource,
    ) -> Self {
        Self {
            key: key.into(),
            filter_key: filter_key.into(),
            title: title.into(),
            weight: None,
            source,
        }
    }

    /// Facet over the sub-collections of one collection.
    pub fn collection(
        key: impl Into<String>,
        filter_key: impl Into<String>,
        title: impl Into<String>,
        collection_key: impl Into<String>,
    ) -> Self {
        Self::new(
            key,
            filter_key,
            title,
            FacetSource::Collection {
                collection_key: collection_key.into(),
            },
        )
    }

    /// Set the display weight; lower weights come first.
    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Effective weight, 0 when unset.
    pub fn weight(&self) -> i32 {
        self.weight.unwrap_or_default()
    }
}

/// Predicate deciding whether a badge is shown for a document.
#[derive(Debug, Clone)]
pub enum Activator {
    IsTrue,
    /// The value is present and non-empty.
    IsSet,
    Equals(FieldValue),
    /// A text value (or any element of a list) matches the regex.
    Matches(Regex),
}

impl Activator {
    /// Compile a [`Activator::Matches`].
    pub fn matches(pattern: &str, flags: RegexFlags) -> Result<Self, TransformError> {
        Ok(Activator::Matches(transforms::compile(pattern, flags)?))
    }

    /// Evaluate against a document value; absent values are `Null`.
    pub fn is_active(&self, value: &FieldValue) -> bool {
        match self {
            Activator::IsTrue => value.is_truthy(),
            Activator::IsSet => !value.is_absent(),
            Activator::Equals(expected) => value == expected,
            Activator::Matches(regex) => match value {
                FieldValue::String(s) => regex.is_match(s),
                FieldValue::List(items) => items
                    .iter()
                    .filter_map(FieldValue::as_str)
                    .any(|s| regex.is_match(s)),
                _ => false,
            },
        }
    }
}

/// Opaque reference handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeRenderer {
    pub template: String,
    #[serde(default)]
    pub context: IndexMap<String, String>,
}

impl BadgeRenderer {
    /// A renderer with an empty context.
    pub fn template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            context: IndexMap::new(),
        }
    }

    /// Add a context variable.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// A conditional marker on a record's display, gated by a field value.
#[derive(Debug, Clone)]
pub struct BadgeDefinition {
    pub key: String,
    /// Key of the field the activator looks at.
    pub field: String,
    pub activator: Activator,
    pub renderer: BadgeRenderer,
    pub weight: Option<i32>,
}

impl BadgeDefinition {
    /// A badge without a weight.
    pub fn new(
        key: impl Into<String>,
        field: impl Into<String>,
        activator: Activator,
        renderer: BadgeRenderer,
    ) -> Self {
        Self {
            key: key.into(),
            field: field.into(),
            activator,
            renderer,
            weight: None,
        }
    }

    /// Set the display weight; higher weights come first.
    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Effective weight, 0 when unset.
    pub fn weight(&self) -> i32 {
        self.weight.unwrap_or_default()
    }

    /// Whether the badge shows for `doc`.
    pub fn is_active(&self, doc: &Document) -> bool {
        self.activator.is_active(doc.value_or_null(&self.field))
    }
}

/// A named multi-key ordering.
///
/// `fields` and `reverse` always have the same length.
#[derive(Debug, Clone)]
pub struct SortDefinition {
    key: String,
    label: String,
    weight: Option<i32>,
    fields: Vec<String>,
    reverse: Vec<bool>,
}

impl SortDefinition {
    /// Fails unless there is one reverse flag per field, and at least one field.
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        fields: Vec<String>,
        reverse: Vec<bool>,
    ) -> Result<Self, SchemaError> {
        let key = key.into();
        if fields.is_empty() || fields.len() != reverse.len() {
            return Err(SchemaError::SortArity {
                sort: key,
                fields: fields.len(),
                reverse: reverse.len(),
            });
        }
        Ok(Self {
            key,
            label: label.into(),
            weight: None,
            fields,
            reverse,
        })
    }

    /// Build from `(field, reverse)` pairs.
    pub fn from_keys<I, S>(key: impl Into<String>, label: impl Into<String>, keys: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let (fields, reverse): (Vec<String>, Vec<bool>) =
            keys.into_iter().map(|(field, rev)| (field.into(), rev)).unzip();
        Self::new(key, label, fields, reverse)
    }

    /// Set the menu weight; lower weights come first.
    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub(crate) fn set_weight(&mut self, weight: Option<i32>) {
        self.weight = weight;
    }

    /// Name used to select this sort.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Human-readable menu label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Effective weight, 0 when unset.
    pub fn weight(&self) -> i32 {
        self.weight.unwrap_or_default()
    }

    pub(crate) fn weight_opt(&self) -> Option<i32> {
        self.weight
    }

    /// Sort keys, most significant first.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// One descending flag per key.
    pub fn reverse(&self) -> &[bool] {
        &self.reverse
    }

    /// Compare two documents key by key.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for (field, reverse) in self.fields.iter().zip(&self.reverse) {
            let ord = a.value_or_null(field).sort_cmp(b.value_or_null(field));
            let ord = if *reverse { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}
