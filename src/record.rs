//! Raw bibliographic records and the collection hierarchy they belong to.
//!
//! A [`Record`] is the immutable input of the extraction pipeline. It keeps the
//! item's structured data untouched and exposes the parts extractors look at
//! most often (tags, collection membership, pre-rendered formats, child notes
//! and attachments) as plain Rust collections.

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Error type for record and library construction
#[derive(Debug, Clone)]
pub enum RecordError {
    NotAnObject(String),
    MissingKey,
    InvalidMember { member: String, reason: String },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::NotAnObject(what) => write!(f, "Expected a JSON object for {}", what),
            RecordError::MissingKey => write!(f, "Item has no 'key'"),
            RecordError::InvalidMember { member, reason } => {
                write!(f, "Invalid member '{}': {}", member, reason)
            }
        }
    }
}

impl std::error::Error for RecordError {}

/// Item type of a child note.
pub const ITEM_TYPE_NOTE: &str = "note";
/// Item type of a child attachment.
pub const ITEM_TYPE_ATTACHMENT: &str = "attachment";

/// A note or attachment filed under a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildItem {
    key: String,
    data: Map<String, Value>,
    tags: Vec<String>,
}

impl ChildItem {
    /// Create a child of the given item type.
    pub fn new(key: impl Into<String>, item_type: &str) -> Self {
        let key = key.into();
        let mut data = Map::new();
        data.insert("key".to_string(), Value::String(key.clone()));
        data.insert("itemType".to_string(), Value::String(item_type.to_string()));
        Self {
            key,
            data,
            tags: Vec::new(),
        }
    }

    /// A child note holding `html`.
    pub fn note(key: impl Into<String>, html: impl Into<String>) -> Self {
        Self::new(key, ITEM_TYPE_NOTE).with_data("note", html.into())
    }

    /// A stored file attachment.
    pub fn attachment(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(key, ITEM_TYPE_ATTACHMENT)
            .with_data("title", title.into())
            .with_data("linkMode", "imported_file")
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Add a tag, mirroring it into `data.tags`.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        push_tag(&mut self.data, &tag);
        self.tags.push(tag);
        self
    }

    /// Build a child from a Zotero-style item, with or without a `data` wrapper.
    pub fn from_item(item: Value) -> Result<Self, RecordError> {
        let Value::Object(mut item) = item else {
            return Err(RecordError::NotAnObject("child item".to_string()));
        };
        let mut data = match item.remove("data") {
            Some(Value::Object(data)) => data,
            Some(_) => return Err(RecordError::NotAnObject("child item data".to_string())),
            None => item.clone(),
        };
        let key = item
            .get("key")
            .and_then(Value::as_str)
            .or_else(|| data.get("key").and_then(Value::as_str))
            .map(str::to_string)
            .ok_or(RecordError::MissingKey)?;
        data.entry("key").or_insert_with(|| Value::String(key.clone()));
        let tags = parse_tags(&data)?;
        Ok(Self { key, data, tags })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// `itemType` member; empty when missing.
    pub fn item_type(&self) -> &str {
        self.data.get("itemType").and_then(Value::as_str).unwrap_or("")
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Note markup, for child notes.
    pub fn note_html(&self) -> Option<&str> {
        if self.item_type() != ITEM_TYPE_NOTE {
            return None;
        }
        self.data.get("note").and_then(Value::as_str)
    }

    pub fn is_attachment(&self) -> bool {
        self.item_type() == ITEM_TYPE_ATTACHMENT
    }
}

/// One bibliographic item to be indexed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    key: String,
    data: Map<String, Value>,
    tags: Vec<String>,
    collections: IndexSet<String>,
    formats: HashMap<String, String>,
    children: Vec<ChildItem>,
}

impl Record {
    /// Create a record whose data holds only its `key`.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let mut data = Map::new();
        data.insert("key".to_string(), Value::String(key.clone()));
        Self {
            key,
            data,
            ..Self::default()
        }
    }

    /// Set a data member.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Add a tag, mirroring it into `data.tags` the way the item source lays it out.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        push_tag(&mut self.data, &tag);
        self.tags.push(tag);
        self
    }

    /// Add collection membership, mirrored into `data.collections`.
    pub fn with_collection(mut self, collection_key: impl Into<String>) -> Self {
        let collection_key = collection_key.into();
        if self.collections.insert(collection_key.clone()) {
            match self.data.get_mut("collections") {
                Some(Value::Array(keys)) => keys.push(Value::String(collection_key)),
                _ => {
                    self.data.insert(
                        "collections".to_string(),
                        Value::Array(vec![Value::String(collection_key)]),
                    );
                }
            }
        }
        self
    }

    /// Attach a pre-rendered format such as `citation`.
    pub fn with_format(mut self, format: impl Into<String>, rendered: impl Into<String>) -> Self {
        self.formats.insert(format.into(), rendered.into());
        self
    }

    /// File a note or attachment under this record.
    pub fn with_child(mut self, child: ChildItem) -> Self {
        self.children.push(child);
        self
    }

    /// Build a record from a Zotero-style item.
    ///
    /// ```json
    /// {
    ///   "key": "ABCD1234",
    ///   "data": {"title": "...", "extra": "...", "tags": [{"tag": "x"}], "collections": ["JUDM2WBF"]},
    ///   "citation": "<span>...</span>",
    ///   "children": [{"key": "N1", "data": {"itemType": "note", "note": "<p>...</p>"}}]
    /// }
    /// ```
    ///
    /// Top-level string members other than `key` are kept as pre-rendered formats.
    pub fn from_item(item: Value) -> Result<Self, RecordError> {
        let Value::Object(mut item) = item else {
            return Err(RecordError::NotAnObject("item".to_string()));
        };

        let mut data = match item.remove("data") {
            Some(Value::Object(data)) => data,
            Some(_) => return Err(RecordError::NotAnObject("item data".to_string())),
            None => Map::new(),
        };

        let key = item
            .get("key")
            .and_then(Value::as_str)
            .or_else(|| data.get("key").and_then(Value::as_str))
            .map(str::to_string)
            .ok_or(RecordError::MissingKey)?;
        data.entry("key").or_insert_with(|| Value::String(key.clone()));

        let tags = parse_tags(&data)?;

        let collections = match data.get("collections") {
            Some(Value::Array(keys)) => keys
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::Null) | None => IndexSet::new(),
            Some(_) => {
                return Err(RecordError::InvalidMember {
                    member: "collections".to_string(),
                    reason: "expected an array".to_string(),
                })
            }
        };

        let children = match item.remove("children") {
            Some(Value::Array(children)) => children
                .into_iter()
                .map(ChildItem::from_item)
                .collect::<Result<_, _>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(RecordError::InvalidMember {
                    member: "children".to_string(),
                    reason: "expected an array".to_string(),
                })
            }
        };

        let formats = item
            .into_iter()
            .filter(|(name, _)| name != "key")
            .filter_map(|(name, value)| match value {
                Value::String(rendered) => Some((name, rendered)),
                _ => None,
            })
            .collect();

        Ok(Self {
            key,
            data,
            tags,
            collections,
            formats,
            children,
        })
    }

    /// The record's unique key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The item's top-level data, unmodified.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// One data member.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Tags as delivered, untrimmed.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Keys of the collections the record is filed in.
    pub fn collections(&self) -> &IndexSet<String> {
        &self.collections
    }

    pub fn in_collection(&self, collection_key: &str) -> bool {
        self.collections.contains(collection_key)
    }

    /// A pre-rendered format, if the source delivered one.
    pub fn format(&self, name: &str) -> Option<&str> {
        self.formats.get(name).map(String::as_str)
    }

    /// Notes and attachments, in source order and unfiltered.
    pub fn children(&self) -> &[ChildItem] {
        &self.children
    }
}

fn push_tag(data: &mut Map<String, Value>, tag: &str) {
    let entry = serde_json::json!({ "tag": tag });
    match data.get_mut("tags") {
        Some(Value::Array(tags)) => tags.push(entry),
        _ => {
            data.insert("tags".to_string(), Value::Array(vec![entry]));
        }
    }
}

// Tags may be `{"tag": ...}` objects or bare strings.
fn parse_tags(data: &Map<String, Value>) -> Result<Vec<String>, RecordError> {
    match data.get("tags") {
        Some(Value::Array(entries)) => Ok(entries
            .iter()
            .filter_map(|entry| match entry {
                Value::Object(obj) => obj.get("tag").and_then(Value::as_str),
                Value::String(s) => Some(s.as_str()),
                _ => None,
            })
            .map(str::to_string)
            .collect()),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(_) => Err(RecordError::InvalidMember {
            member: "tags".to_string(),
            reason: "expected an array".to_string(),
        }),
    }
}

/// A collection node in the library tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub key: String,
    pub name: String,
    pub parent: Option<String>,
}

/// The library's collection tree, in source order.
#[derive(Debug, Clone, Default)]
pub struct Library {
    collections: IndexMap<String, Collection>,
}

impl Library {
    /// An empty library.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(
        mut self,
        key: impl Into<String>,
        name: impl Into<String>,
        parent: Option<&str>,
    ) -> Self {
        self.add(Collection {
            key: key.into(),
            name: name.into(),
            parent: parent.map(str::to_string),
        });
        self
    }

    /// Insert or replace a collection by key.
    pub fn add(&mut self, collection: Collection) {
        self.collections.insert(collection.key.clone(), collection);
    }

    /// Load collections from a JSON array of Zotero collection objects.
    ///
    /// Zotero reports a top-level collection with `parentCollection: false`.
    pub fn from_json(value: Value) -> Result<Self, RecordError> {
        let Value::Array(entries) = value else {
            return Err(RecordError::NotAnObject("collection list".to_string()));
        };

        let mut library = Self::new();
        for entry in entries {
            let data = match entry.get("data") {
                Some(data @ Value::Object(_)) => data.clone(),
                _ => entry,
            };
            let key = data
                .get("key")
                .and_then(Value::as_str)
                .ok_or(RecordError::MissingKey)?;
            let name = data.get("name").and_then(Value::as_str).unwrap_or(key);
            let parent = data
                .get("parentCollection")
                .or_else(|| data.get("parent"))
                .and_then(Value::as_str);
            library.add(Collection {
                key: key.to_string(),
                name: name.to_string(),
                parent: parent.map(str::to_string),
            });
        }
        Ok(library)
    }

    pub fn get(&self, key: &str) -> Option<&Collection> {
        self.collections.get(key)
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Collections in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    /// Keys from `key` up to (excluding) `root`, nearest first.
    ///
    /// Returns `None` when `key` is not a strict descendant of `root`.
    pub fn path_below(&self, key: &str, root: &str) -> Option<Vec<&str>> {
        let mut path = Vec::new();
        let mut current = self.collections.get(key)?;
        // A malformed tree can contain a cycle; never walk more than every node once.
        for _ in 0..=self.collections.len() {
            path.push(current.key.as_str());
            match current.parent.as_deref() {
                Some(parent) if parent == root => return Some(path),
                Some(parent) => current = self.collections.get(parent)?,
                None => return None,
            }
        }
        None
    }
}
