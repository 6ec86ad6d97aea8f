//! The resolved, read-only schema and the per-record extraction pipeline.
//!
//! A [`Schema`] is produced by [`Composer::resolve_schema`](crate::Composer::resolve_schema)
//! and never changes afterwards. It is `Send + Sync`, so one instance behind
//! an `Arc` can serve any number of extraction workers.

use crate::codec::CodecError;
use crate::composer::SchemaError;
use crate::document::{Document, ExtractionFailure, FieldValue};
use crate::extraction::{ChildFilter, ExtractionContext};
use crate::record::Record;
use crate::specs::{BadgeDefinition, FacetDefinition, FieldDefinition, SortDefinition};
use rayon::prelude::*;
use std::collections::HashMap;

/// Definitions of one kind, ordered, with key -> position lookup.
#[derive(Debug, Clone)]
struct Ordered<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Ordered<T> {
    fn new(items: Vec<T>, key: impl Fn(&T) -> &str) -> Self {
        let index = items
            .iter()
            .enumerate()
            .map(|(i, item)| (key(item).to_string(), i))
            .collect();
        Self { items, index }
    }

    fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|&i| &self.items[i])
    }
}

/// Sealed field, facet, badge and sort definitions.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Ordered<FieldDefinition>,
    facets: Ordered<FacetDefinition>,
    badges: Ordered<BadgeDefinition>,
    sorts: Ordered<SortDefinition>,
    children: ChildFilter,
}

impl Schema {
    pub(crate) fn new(
        fields: Vec<FieldDefinition>,
        facets: Vec<FacetDefinition>,
        badges: Vec<BadgeDefinition>,
        sorts: Vec<SortDefinition>,
        children: ChildFilter,
    ) -> Self {
        Self {
            fields: Ordered::new(fields, |f| f.key.as_str()),
            facets: Ordered::new(facets, |f| f.key.as_str()),
            badges: Ordered::new(badges, |b| b.key.as_str()),
            sorts: Ordered::new(sorts, |s| s.key()),
            children,
        }
    }

    /// Fields in registration order.
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields.items
    }

    pub fn field(&self, key: &str) -> Option<&FieldDefinition> {
        self.fields.get(key)
    }

    /// Facets by ascending weight.
    pub fn facets(&self) -> &[FacetDefinition] {
        &self.facets.items
    }

    pub fn facet(&self, key: &str) -> Option<&FacetDefinition> {
        self.facets.get(key)
    }

    /// Badges by descending weight.
    pub fn badges(&self) -> &[BadgeDefinition] {
        &self.badges.items
    }

    pub fn badge(&self, key: &str) -> Option<&BadgeDefinition> {
        self.badges.get(key)
    }

    /// Sorts by ascending weight.
    pub fn sorts(&self) -> &[SortDefinition] {
        &self.sorts.items
    }

    pub fn sort(&self, key: &str) -> Option<&SortDefinition> {
        self.sorts.get(key)
    }

    /// Filter applied to child notes and attachments during extraction.
    pub fn child_filter(&self) -> &ChildFilter {
        &self.children
    }

    /// Extract every field and facet of one record.
    ///
    /// A failing field is left out of the document and reported in
    /// `Document::failures`; the remaining fields are still extracted.
    /// Child extractors see only the children this schema's filter accepts.
    ///
    /// # Example
    /// ```ignore
    /// let schema = customize::composer()?.resolve_schema()?;
    /// let library = Library::new();
    /// let ctx = ExtractionContext::new(&PrerenderedFormats, &library);
    ///
    /// let doc = schema.extract(&Record::new("ABCD1234").with_data("title", "T"), &ctx);
    /// assert_eq!(doc.get("title"), Some(&FieldValue::from("T")));
    /// assert!(!doc.has_failures());
    /// ```
    pub fn extract(&self, record: &Record, ctx: &ExtractionContext<'_>) -> Document {
        let scoped = ctx.with_child_filter(&self.children);
        let mut doc = Document::new(record.key());

        for field in &self.fields.items {
            let encoded = field
                .extractor
                .extract(record, &scoped)
                .map_err(|e| e.to_string())
                .and_then(|value| match &field.codec {
                    Some(codec) => codec.encode(&value).map_err(|e| e.to_string()),
                    None => Ok(value),
                });

            match encoded {
                Ok(value) => {
                    doc.values.insert(field.key.clone(), value);
                }
                Err(reason) => {
                    tracing::warn!(record = record.key(), field = %field.key, %reason, "Field extraction failed");
                    doc.failures.push(ExtractionFailure {
                        record: record.key().to_string(),
                        field: field.key.clone(),
                        reason,
                    });
                }
            }
        }

        for facet in &self.facets.items {
            doc.values
                .insert(facet.key.clone(), facet.source.values(record, scoped.library()));
        }

        doc
    }

    /// Extract many records in parallel, preserving input order.
    pub fn extract_batch(&self, records: &[Record], ctx: &ExtractionContext<'_>) -> Vec<Document> {
        let docs: Vec<Document> = records.par_iter().map(|record| self.extract(record, ctx)).collect();
        let failed = docs.iter().filter(|d| d.has_failures()).count();
        tracing::info!(records = docs.len(), failed, "Extracted batch");
        docs
    }

    /// Badges active for a document, highest weight first.
    pub fn active_badges<'s>(&'s self, doc: &Document) -> Vec<&'s BadgeDefinition> {
        self.badges.items.iter().filter(|badge| badge.is_active(doc)).collect()
    }

    /// Order documents with a named sort. The sort is stable.
    pub fn sort_documents(&self, sort_key: &str, docs: &mut [Document]) -> Result<(), SchemaError> {
        let sort = self
            .sort(sort_key)
            .ok_or_else(|| SchemaError::UnknownSort(sort_key.to_string()))?;
        docs.sort_by(|a, b| sort.compare(a, b));
        Ok(())
    }

    /// Reverse a field's storage encoding.
    pub fn decode(&self, field_key: &str, value: &FieldValue) -> Result<FieldValue, CodecError> {
        match self.field(field_key).and_then(|f| f.codec.as_ref()) {
            Some(codec) => codec.decode(value),
            None => Ok(value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::composer::Composer;
    use crate::extraction::{Extractor, PrerenderedFormats};
    use crate::record::{ChildItem, Library};
    use crate::specs::{Activator, BadgeRenderer, StorageType};
    use crate::transforms::Transform;
    use serde_json::json;
    use std::sync::Arc;

    fn composer() -> Composer {
        let mut composer = Composer::new();
        composer.register_field(FieldDefinition::new(
            "title",
            StorageType::Text { stored: true },
            Extractor::item_data("title"),
        ));
        composer.register_field(
            FieldDefinition::new("data", StorageType::Stored, Extractor::RawData).with_codec(Arc::new(JsonCodec)),
        );
        composer.register_field(FieldDefinition::new(
            "preview",
            StorageType::Stored,
            Extractor::item_format("citation"),
        ));
        composer.register_field(FieldDefinition::new(
            "broken",
            StorageType::Keyword { stored: false },
            Extractor::transformer(Extractor::in_collection("C"), vec![Transform::split(";")]),
        ));
        composer.register_field(FieldDefinition::new(
            "featured",
            StorageType::Boolean { stored: true },
            Extractor::in_collection("C"),
        ));
        composer
    }

    #[test]
    fn test_failure_is_isolated_to_its_field() {
        let schema = composer().resolve_schema().unwrap();
        let record = Record::new("K").with_data("title", "T").with_collection("C");
        let library = Library::new();
        let ctx = ExtractionContext::new(&PrerenderedFormats, &library);

        let doc = schema.extract(&record, &ctx);

        assert_eq!(doc.get("title"), Some(&FieldValue::from("T")));
        assert_eq!(doc.get("featured"), Some(&FieldValue::Bool(true)));
        assert!(doc.get("preview").is_none());
        assert!(doc.get("broken").is_none());
        let failed: Vec<_> = doc.failures.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(failed, vec!["preview", "broken"]);
        assert!(doc.failures.iter().all(|f| f.record == "K"));
    }

    #[test]
    fn test_codec_round_trip_through_schema() {
        let schema = composer().resolve_schema().unwrap();
        let record = Record::new("K").with_data("title", "T");
        let library = Library::new();
        let ctx = ExtractionContext::new(&PrerenderedFormats, &library);

        let doc = schema.extract(&record, &ctx);
        let stored = doc.get("data").unwrap();

        assert!(stored.as_str().is_some());
        let decoded = schema.decode("data", stored).unwrap();
        assert_eq!(decoded.to_json(), json!({"key": "K", "title": "T"}));
        assert_eq!(schema.decode("title", &"T".into()).unwrap(), FieldValue::from("T"));
    }

    #[test]
    fn test_schema_child_filter_applies_to_extraction() {
        let mut composer = Composer::new();
        composer.register_field(FieldDefinition::new(
            "notes",
            StorageType::Text { stored: false },
            Extractor::ChildNotes,
        ));
        composer.set_child_filter("^publishPDF$", "").unwrap();
        let schema = composer.resolve_schema().unwrap();
        let record = Record::new("K")
            .with_child(ChildItem::note("N1", "shown").with_tag("publishPDF"))
            .with_child(ChildItem::note("N2", "hidden"));
        let library = Library::new();
        let ctx = ExtractionContext::new(&PrerenderedFormats, &library);

        let doc = schema.extract(&record, &ctx);

        assert_eq!(doc.get("notes"), Some(&FieldValue::strings(["shown"])));
        assert_eq!(
            Extractor::ChildNotes.extract(&record, &ctx).unwrap(),
            FieldValue::strings(["shown", "hidden"])
        );
    }

    #[test]
    fn test_batch_matches_sequential() {
        let schema = composer().resolve_schema().unwrap();
        let records: Vec<Record> = (0..64)
            .map(|i| {
                let record = Record::new(format!("K{}", i)).with_data("title", format!("T{}", i));
                if i % 3 == 0 {
                    record.with_collection("C")
                } else {
                    record
                }
            })
            .collect();
        let library = Library::new();
        let ctx = ExtractionContext::new(&PrerenderedFormats, &library);

        let parallel = schema.extract_batch(&records, &ctx);
        let sequential: Vec<Document> = records.iter().map(|r| schema.extract(r, &ctx)).collect();

        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_active_badges_by_weight() {
        let mut composer = composer();
        composer.register_field(FieldDefinition::new(
            "internal",
            StorageType::Boolean { stored: true },
            Extractor::matches_tag("^_internal$").unwrap(),
        ));
        composer
            .add_badge(BadgeDefinition::new("internal", "internal", Activator::IsTrue, BadgeRenderer::default()).with_weight(10))
            .unwrap();
        composer
            .add_badge(BadgeDefinition::new("featured", "featured", Activator::IsTrue, BadgeRenderer::default()).with_weight(100))
            .unwrap();
        let schema = composer.resolve_schema().unwrap();

        let doc = Document::new("K")
            .with_value("internal", true)
            .with_value("featured", true);
        let keys: Vec<_> = schema.active_badges(&doc).iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["featured", "internal"]);

        let plain = Document::new("P").with_value("internal", false);
        assert!(schema.active_badges(&plain).is_empty());
    }

    #[test]
    fn test_sort_documents() {
        let mut composer = composer();
        composer
            .add_sort(SortDefinition::from_keys("featured_first", "Featured", [("featured", true), ("title", false)]).unwrap())
            .unwrap();
        let schema = composer.resolve_schema().unwrap();
        let mut docs = vec![
            Document::new("1").with_value("featured", false).with_value("title", "a"),
            Document::new("2").with_value("featured", true).with_value("title", "b"),
            Document::new("3").with_value("featured", true).with_value("title", "a"),
        ];

        schema.sort_documents("featured_first", &mut docs).unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2", "1"]);

        assert_eq!(
            schema.sort_documents("nope", &mut docs),
            Err(SchemaError::UnknownSort("nope".to_string()))
        );
    }
}
