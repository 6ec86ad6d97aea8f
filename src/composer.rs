//! The field registry used while assembling a schema.
//!
//! A [`Composer`] is built once at startup: the base schema is registered,
//! unwanted built-ins are excluded, and deployment rules add, override or
//! extend definitions. [`Composer::resolve_schema`] then validates the result
//! and copies it into an immutable [`Schema`] used for extraction.
//!
//! All definitions live in insertion-ordered maps, so lookups are O(1) and
//! the resolved order depends only on the sequence of calls.
//!
//! The composer also holds the child filter that decides which notes and
//! attachments child extractors see.

use crate::extraction::{ChildFilter, Extractor};
use crate::schema::Schema;
use crate::specs::{BadgeDefinition, FacetDefinition, FieldDefinition, SortDefinition};
use crate::transforms::TransformError;
use indexmap::IndexMap;
use std::fmt;

/// Error type for schema assembly. Any of these is fatal at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaError {
    UnknownField(String),
    UnknownSort(String),
    /// A badge or sort names a field that is not registered.
    DanglingReference {
        kind: &'static str,
        key: String,
        field: String,
    },
    /// A facet key equals a field key.
    KeyCollision(String),
    SortArity {
        sort: String,
        fields: usize,
        reverse: usize,
    },
    InvalidPattern(TransformError),
    UnknownCodec {
        field: String,
        codec: String,
    },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::UnknownField(key) => write!(f, "Field '{}' is not defined", key),
            SchemaError::UnknownSort(key) => write!(f, "Sort '{}' is not defined", key),
            SchemaError::DanglingReference { kind, key, field } => {
                write!(f, "{} '{}' references undefined field '{}'", kind, key, field)
            }
            SchemaError::KeyCollision(key) => {
                write!(f, "Facet key '{}' collides with a field of the same key", key)
            }
            SchemaError::SortArity {
                sort,
                fields,
                reverse,
            } => write!(
                f,
                "Sort '{}' has {} fields but {} reverse flags (need the same non-zero count)",
                sort, fields, reverse
            ),
            SchemaError::InvalidPattern(err) => write!(f, "{}", err),
            SchemaError::UnknownCodec { field, codec } => {
                write!(f, "Field '{}' uses unknown codec '{}'", field, codec)
            }
        }
    }
}

impl std::error::Error for SchemaError {}

impl From<TransformError> for SchemaError {
    fn from(err: TransformError) -> Self {
        SchemaError::InvalidPattern(err)
    }
}

/// Mutable registry of field, facet, badge and sort definitions.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    fields: IndexMap<String, FieldDefinition>,
    facets: IndexMap<String, FacetDefinition>,
    badges: IndexMap<String, BadgeDefinition>,
    sorts: IndexMap<String, SortDefinition>,
    children: ChildFilter,
}

impl Composer {
    /// Create an empty composer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a composer holding the base schema.
    pub fn with_defaults() -> Result<Self, SchemaError> {
        let mut composer = Self::new();
        crate::defaults::register_defaults(&mut composer)?;
        Ok(composer)
    }

    /// Insert a field, replacing any field with the same key in place.
    ///
    /// Returns the replaced definition.
    pub fn register_field(&mut self, definition: FieldDefinition) -> Option<FieldDefinition> {
        let replaced = self.fields.insert(definition.key.clone(), definition);
        if let Some(old) = &replaced {
            tracing::debug!(field = %old.key, "Replaced field definition");
        }
        replaced
    }

    /// Look up a registered field.
    pub fn field(&self, key: &str) -> Option<&FieldDefinition> {
        self.fields.get(key)
    }

    /// Whether a field is registered under `key`.
    pub fn has_field(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Replace the extractor of an existing field.
    pub fn replace_extractor(&mut self, key: &str, extractor: Extractor) -> Result<(), SchemaError> {
        self.override_extractor(key, |_| extractor)
    }

    /// Rebuild an existing field's extractor from the current one (e.g. to wrap it).
    pub fn override_extractor<F>(&mut self, key: &str, f: F) -> Result<(), SchemaError>
    where
        F: FnOnce(Extractor) -> Extractor,
    {
        let definition = self
            .fields
            .get_mut(key)
            .ok_or_else(|| SchemaError::UnknownField(key.to_string()))?;
        let current = std::mem::replace(&mut definition.extractor, Extractor::RawData);
        definition.extractor = f(current);
        tracing::debug!(field = key, extractor = definition.extractor.kind(), "Overrode extractor");
        Ok(())
    }

    /// Add a child extractor to a field, wrapping its extractor in a composite if needed.
    pub fn append_extractor(&mut self, key: &str, extractor: Extractor) -> Result<(), SchemaError> {
        self.override_extractor(key, |current| current.push_child(extractor))
    }

    /// Remove fields by key; unknown keys are ignored.
    pub fn exclude_fields<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        exclude(&mut self.fields, "field", keys);
    }

    /// Remove facets by key; unknown keys are ignored.
    pub fn exclude_facets<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        exclude(&mut self.facets, "facet", keys);
    }

    /// Remove badges by key.
    pub fn exclude_badges<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        exclude(&mut self.badges, "badge", keys);
    }

    /// Remove sorts by key.
    pub fn exclude_sorts<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        exclude(&mut self.sorts, "sort", keys);
    }

    /// Register a facet. A replacement without a weight keeps the previous weight.
    pub fn add_facet(&mut self, mut facet: FacetDefinition) {
        if let Some(old) = self.facets.get(&facet.key) {
            facet.weight = facet.weight.or(old.weight);
        }
        tracing::debug!(facet = %facet.key, weight = facet.weight(), "Registered facet");
        self.facets.insert(facet.key.clone(), facet);
    }

    /// Look up a registered facet.
    pub fn facet(&self, key: &str) -> Option<&FacetDefinition> {
        self.facets.get(key)
    }

    /// Register a badge on an existing field.
    pub fn add_badge(&mut self, mut badge: BadgeDefinition) -> Result<(), SchemaError> {
        if !self.fields.contains_key(&badge.field) {
            return Err(SchemaError::DanglingReference {
                kind: "Badge",
                key: badge.key,
                field: badge.field,
            });
        }
        if let Some(old) = self.badges.get(&badge.key) {
            badge.weight = badge.weight.or(old.weight);
        }
        tracing::debug!(badge = %badge.key, field = %badge.field, "Registered badge");
        self.badges.insert(badge.key.clone(), badge);
        Ok(())
    }

    /// Look up a registered badge.
    pub fn badge(&self, key: &str) -> Option<&BadgeDefinition> {
        self.badges.get(key)
    }

    /// Register a sort over existing fields.
    pub fn add_sort(&mut self, mut sort: SortDefinition) -> Result<(), SchemaError> {
        if let Some(missing) = sort.fields().iter().find(|f| !self.fields.contains_key(*f)) {
            return Err(SchemaError::DanglingReference {
                kind: "Sort",
                key: sort.key().to_string(),
                field: missing.clone(),
            });
        }
        if let Some(old) = self.sorts.get(sort.key()) {
            let weight = sort.weight_opt().or(old.weight_opt());
            sort.set_weight(weight);
        }
        tracing::debug!(sort = sort.key(), fields = ?sort.fields(), "Registered sort");
        self.sorts.insert(sort.key().to_string(), sort);
        Ok(())
    }

    /// Look up a registered sort.
    pub fn sort(&self, key: &str) -> Option<&SortDefinition> {
        self.sorts.get(key)
    }

    /// Select which child notes and attachments are extracted, by tag.
    ///
    /// Children need a tag matching `whitelist` and no tag matching
    /// `blacklist`; an empty pattern disables that side. Both are empty
    /// until set.
    pub fn set_child_filter(&mut self, whitelist: &str, blacklist: &str) -> Result<(), SchemaError> {
        self.children = ChildFilter::new(whitelist, blacklist)?;
        tracing::debug!(whitelist, blacklist, "Set child filter");
        Ok(())
    }

    pub fn child_filter(&self) -> &ChildFilter {
        &self.children
    }

    /// Validate cross references and produce the immutable schema.
    ///
    /// Facets come out by ascending weight, badges by descending weight and
    /// sorts by ascending weight; ties keep registration order.
    ///
    /// # Example
    /// ```ignore
    /// let mut composer = Composer::with_defaults()?;
    /// composer.exclude_facets(["facet_tag"]);
    /// composer.add_facet(FacetDefinition::collection("facet_theme", "theme", "Theme", "QK8NXPKZ").with_weight(15));
    /// let schema = composer.resolve_schema()?;
    /// assert!(schema.facet("facet_tag").is_none());
    /// ```
    pub fn resolve_schema(&self) -> Result<Schema, SchemaError> {
        for badge in self.badges.values() {
            if !self.fields.contains_key(&badge.field) {
                return Err(SchemaError::DanglingReference {
                    kind: "Badge",
                    key: badge.key.clone(),
                    field: badge.field.clone(),
                });
            }
        }
        for sort in self.sorts.values() {
            if let Some(missing) = sort.fields().iter().find(|f| !self.fields.contains_key(*f)) {
                return Err(SchemaError::DanglingReference {
                    kind: "Sort",
                    key: sort.key().to_string(),
                    field: missing.clone(),
                });
            }
        }
        if let Some(key) = self.facets.keys().find(|k| self.fields.contains_key(*k)) {
            return Err(SchemaError::KeyCollision(key.clone()));
        }

        let mut facets: Vec<FacetDefinition> = self.facets.values().cloned().collect();
        facets.sort_by_key(|f| f.weight());
        let mut badges: Vec<BadgeDefinition> = self.badges.values().cloned().collect();
        badges.sort_by_key(|b| std::cmp::Reverse(b.weight()));
        let mut sorts: Vec<SortDefinition> = self.sorts.values().cloned().collect();
        sorts.sort_by_key(|s| s.weight());

        let schema = Schema::new(
            self.fields.values().cloned().collect(),
            facets,
            badges,
            sorts,
            self.children.clone(),
        );
        tracing::info!(
            fields = schema.fields().len(),
            facets = schema.facets().len(),
            badges = schema.badges().len(),
            sorts = schema.sorts().len(),
            "Resolved schema"
        );
        Ok(schema)
    }
}

fn exclude<T, I, S>(map: &mut IndexMap<String, T>, kind: &str, keys: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for key in keys {
        let key = key.as_ref();
        if map.shift_remove(key).is_some() {
            tracing::debug!(kind, key, "Excluded definition");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specs::{Activator, BadgeRenderer, StorageType};

    fn flag(key: &str, collection: &str) -> FieldDefinition {
        FieldDefinition::new(
            key,
            StorageType::Boolean { stored: true },
            Extractor::in_collection(collection),
        )
    }

    fn text(key: &str) -> FieldDefinition {
        FieldDefinition::new(key, StorageType::Text { stored: true }, Extractor::item_data(key))
    }

    #[test]
    fn test_register_field_replaces_in_place() {
        let mut composer = Composer::new();
        composer.register_field(text("title"));
        composer.register_field(text("date"));
        let replaced = composer.register_field(flag("title", "C"));

        assert!(replaced.is_some());
        let schema = composer.resolve_schema().unwrap();
        let keys: Vec<&str> = schema.fields().iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["title", "date"]);
        assert_eq!(schema.field("title").unwrap().storage.name(), "boolean");
    }

    #[test]
    fn test_exclude_missing_key_is_noop() {
        let mut composer = Composer::new();
        composer.register_field(text("title"));
        composer.exclude_fields(["nope"]);
        composer.exclude_facets(["facet_nope"]);

        assert!(composer.has_field("title"));
    }

    #[test]
    fn test_exclude_then_readd_facet() {
        let mut composer = Composer::new();
        composer.add_facet(FacetDefinition::collection("facet_theme", "theme", "Old", "A").with_weight(1));
        composer.add_facet(FacetDefinition::collection("facet_other", "other", "Other", "B").with_weight(1));
        composer.exclude_facets(["facet_theme"]);
        composer.add_facet(FacetDefinition::collection("facet_theme", "theme", "Theme", "QK8NXPKZ"));

        let schema = composer.resolve_schema().unwrap();
        let themes: Vec<_> = schema.facets().iter().filter(|f| f.key == "facet_theme").collect();
        assert_eq!(themes.len(), 1);
        assert_eq!(themes[0].title, "Theme");
        // Excluded first, so the old weight is not inherited.
        assert_eq!(themes[0].weight, None);
    }

    #[test]
    fn test_replacement_inherits_weight_unless_given() {
        let mut composer = Composer::new();
        composer.add_facet(FacetDefinition::collection("f", "f", "F", "A").with_weight(7));
        composer.add_facet(FacetDefinition::collection("f", "f", "F2", "A"));
        assert_eq!(composer.facet("f").unwrap().weight, Some(7));

        composer.add_facet(FacetDefinition::collection("f", "f", "F3", "A").with_weight(2));
        assert_eq!(composer.facet("f").unwrap().weight, Some(2));
    }

    #[test]
    fn test_append_extractor_wraps_and_orders() {
        let mut composer = Composer::new();
        composer.register_field(FieldDefinition::new(
            "alternate_id",
            StorageType::Keyword { stored: true },
            Extractor::item_data("DOI"),
        ));
        composer.append_extractor("alternate_id", Extractor::item_data("ISBN")).unwrap();
        composer.append_extractor("alternate_id", Extractor::item_data("ISSN")).unwrap();

        match &composer.field("alternate_id").unwrap().extractor {
            Extractor::Composite { extractors } => {
                let keys: Vec<_> = extractors
                    .iter()
                    .map(|e| match e {
                        Extractor::ItemData { key } => key.as_str(),
                        _ => "",
                    })
                    .collect();
                assert_eq!(keys, vec!["DOI", "ISBN", "ISSN"]);
            }
            other => panic!("expected composite, got {}", other.kind()),
        }
    }

    #[test]
    fn test_override_requires_existing_field() {
        let mut composer = Composer::new();
        let err = composer.replace_extractor("data", Extractor::RawData).unwrap_err();
        assert_eq!(err, SchemaError::UnknownField("data".to_string()));

        let err = composer.append_extractor("alternate_id", Extractor::RawData).unwrap_err();
        assert_eq!(err, SchemaError::UnknownField("alternate_id".to_string()));
    }

    #[test]
    fn test_badge_requires_field() {
        let mut composer = Composer::new();
        let badge = BadgeDefinition::new("internal", "internal", Activator::IsTrue, BadgeRenderer::default());
        assert!(matches!(
            composer.add_badge(badge.clone()),
            Err(SchemaError::DanglingReference { kind: "Badge", .. })
        ));

        composer.register_field(flag("internal", "C"));
        composer.add_badge(badge).unwrap();
        composer.exclude_fields(["internal"]);
        assert!(matches!(
            composer.resolve_schema(),
            Err(SchemaError::DanglingReference { .. })
        ));
    }

    #[test]
    fn test_sort_requires_fields() {
        let mut composer = Composer::new();
        composer.register_field(text("title"));
        let sort = SortDefinition::from_keys("s", "S", [("title", false), ("date", true)]).unwrap();

        let err = composer.add_sort(sort).unwrap_err();
        assert!(matches!(err, SchemaError::DanglingReference { ref field, .. } if field == "date"));
    }

    #[test]
    fn test_facet_key_collision() {
        let mut composer = Composer::new();
        composer.register_field(text("theme"));
        composer.add_facet(FacetDefinition::collection("theme", "theme", "Theme", "A"));

        assert_eq!(
            composer.resolve_schema().unwrap_err(),
            SchemaError::KeyCollision("theme".to_string())
        );
    }

    #[test]
    fn test_child_filter_carried_into_schema() {
        let mut composer = Composer::new();
        assert_eq!(composer.child_filter().whitelist(), None);

        composer.set_child_filter("^publishPDF$", "").unwrap();
        let schema = composer.resolve_schema().unwrap();
        assert_eq!(schema.child_filter().whitelist(), Some("^publishPDF$"));
        assert_eq!(schema.child_filter().blacklist(), None);

        assert!(matches!(
            composer.set_child_filter("[", ""),
            Err(SchemaError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_resolved_ordering_is_stable() {
        let mut composer = Composer::new();
        composer.register_field(flag("a", "A"));
        composer.register_field(flag("b", "B"));
        composer.register_field(flag("c", "C"));
        for (key, weight) in [("a", 10), ("b", 100), ("c", 10)] {
            composer
                .add_badge(BadgeDefinition::new(key, key, Activator::IsTrue, BadgeRenderer::default()).with_weight(weight))
                .unwrap();
        }
        composer.add_facet(FacetDefinition::collection("f15", "t", "T", "X").with_weight(15));
        composer.add_facet(FacetDefinition::collection("f5", "f", "F", "Y").with_weight(5));

        let schema = composer.resolve_schema().unwrap();
        let badges: Vec<_> = schema.badges().iter().map(|b| b.key.as_str()).collect();
        let facets: Vec<_> = schema.facets().iter().map(|f| f.key.as_str()).collect();
        assert_eq!(badges, vec!["b", "a", "c"]);
        assert_eq!(facets, vec!["f5", "f15"]);

        let again = composer.resolve_schema().unwrap();
        let again_badges: Vec<_> = again.badges().iter().map(|b| b.key.as_str()).collect();
        assert_eq!(badges, again_badges);
        assert_eq!(schema.field("a").unwrap().storage, StorageType::Boolean { stored: true });
    }
}
