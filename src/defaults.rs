//! The base schema every deployment starts from.
//!
//! Deployments exclude or override these definitions by key; the keys used
//! here are therefore part of the configuration surface.

use crate::codec::JsonCodec;
use crate::composer::{Composer, SchemaError};
use crate::extraction::Extractor;
use crate::specs::{FacetDefinition, FacetSource, FieldDefinition, SortDefinition, StorageType};
use crate::transforms::{RegexFlags, Transform};
use std::sync::Arc;

/// The record key.
pub const FIELD_ID: &str = "id";
/// DOIs, ISBNs and other identifiers the item is also known by.
pub const FIELD_ALTERNATE_ID: &str = "alternate_id";
/// The raw item data, JSON-encoded for storage.
pub const FIELD_DATA: &str = "data";
pub const FIELD_SORT_TITLE: &str = "sort_title";
pub const FIELD_SORT_CREATOR: &str = "sort_creator";
pub const FIELD_SORT_DATE: &str = "sort_date";
/// Text of child notes, markup removed.
pub const FIELD_NOTES: &str = "notes";
/// Stored data of child attachments.
pub const FIELD_ATTACHMENTS: &str = "attachments";

/// Facet over all tags.
pub const FACET_TAG: &str = "facet_tag";
pub const FACET_ITEM_TYPE: &str = "facet_item_type";
/// Whether the item has an online URL.
pub const FACET_LINK: &str = "facet_link";

/// Register the base fields, facets and sorts.
///
/// The child filter is left open; deployments narrow it with
/// [`Composer::set_child_filter`].
pub fn register_defaults(composer: &mut Composer) -> Result<(), SchemaError> {
    for field in default_fields()? {
        composer.register_field(field);
    }
    for facet in default_facets() {
        composer.add_facet(facet);
    }
    for sort in default_sorts()? {
        composer.add_sort(sort)?;
    }
    Ok(())
}

// Stored text read straight from a data member.
fn text(key: &str, data_key: &str) -> FieldDefinition {
    FieldDefinition::new(key, StorageType::Text { stored: true }, Extractor::item_data(data_key))
}

fn keyword(key: &str, extractor: Extractor) -> FieldDefinition {
    FieldDefinition::new(key, StorageType::Keyword { stored: true }, extractor)
}

fn default_fields() -> Result<Vec<FieldDefinition>, SchemaError> {
    let multi_line = RegexFlags::none().ignore_case().multi_line();

    let alternate_id = Extractor::composite(vec![
        Extractor::transformer(
            Extractor::item_data("DOI"),
            vec![Transform::find(r"(\S+)", RegexFlags::none(), 1)?],
        ),
        Extractor::transformer(Extractor::item_data("ISBN"), vec![Transform::split(" ")]),
        Extractor::transformer(
            Extractor::item_data("extra"),
            vec![Transform::find(r"^\s*DOI\s*:\s*(\S+)\s*$", multi_line, 1)?],
        ),
    ]);

    let creator_names = Extractor::transformer(
        Extractor::item_data("creators"),
        vec![Transform::pluck("lastName")],
    );

    Ok(vec![
        FieldDefinition::new(FIELD_ID, StorageType::Id { stored: true }, Extractor::item_data("key")),
        keyword(FIELD_ALTERNATE_ID, alternate_id),
        FieldDefinition::new(FIELD_DATA, StorageType::Stored, Extractor::RawData)
            .with_codec(Arc::new(JsonCodec)),
        keyword("item_type", Extractor::item_data("itemType")),
        text("title", "title"),
        FieldDefinition::new("creator", StorageType::Text { stored: false }, creator_names.clone()),
        text("date", "date"),
        keyword(
            "year",
            Extractor::transformer(
                Extractor::item_data("date"),
                vec![Transform::find(r"\b(\d{4})\b", RegexFlags::none(), 1)?],
            ),
        ),
        keyword(
            "tag",
            Extractor::transformer(Extractor::item_data("tags"), vec![Transform::pluck("tag")]),
        ),
        keyword("collections", Extractor::item_data("collections")),
        FieldDefinition::new("url", StorageType::Stored, Extractor::item_data("url")),
        FieldDefinition::new(
            FIELD_NOTES,
            StorageType::Text { stored: false },
            Extractor::transformer(
                Extractor::ChildNotes,
                vec![Transform::replace(r"<[^>]+>", RegexFlags::none(), "", 0)?],
            ),
        ),
        FieldDefinition::new(FIELD_ATTACHMENTS, StorageType::Stored, Extractor::ChildAttachments)
            .with_codec(Arc::new(JsonCodec)),
        keyword(
            FIELD_SORT_TITLE,
            Extractor::transformer(
                Extractor::item_data("title"),
                vec![
                    Transform::replace(r"^\s*(?:a|an|the)\s+", RegexFlags::none().ignore_case(), "", 1)?,
                    Transform::Lowercase,
                ],
            ),
        ),
        keyword(
            FIELD_SORT_CREATOR,
            Extractor::transformer(creator_names, vec![Transform::Lowercase]),
        ),
        keyword(
            FIELD_SORT_DATE,
            Extractor::transformer(
                Extractor::item_data("date"),
                vec![Transform::find_group(r"\d{4}(?:-\d{2}){0,2}", RegexFlags::none(), 0, 1)?],
            ),
        ),
    ])
}

fn default_facets() -> Vec<FacetDefinition> {
    vec![
        FacetDefinition::new(FACET_TAG, "tag", "Topic", FacetSource::Tag { pattern: None }).with_weight(10),
        FacetDefinition::new(FACET_ITEM_TYPE, "type", "Resource type", FacetSource::ItemType).with_weight(20),
        FacetDefinition::new(FACET_LINK, "link", "Online resource", FacetSource::Link).with_weight(30),
    ]
}

fn default_sorts() -> Result<Vec<SortDefinition>, SchemaError> {
    Ok(vec![
        SortDefinition::from_keys(
            "date_desc",
            "Newest first",
            [(FIELD_SORT_DATE, true), (FIELD_SORT_CREATOR, false), (FIELD_SORT_TITLE, false)],
        )?
        .with_weight(10),
        SortDefinition::from_keys(
            "date_asc",
            "Oldest first",
            [(FIELD_SORT_DATE, false), (FIELD_SORT_CREATOR, false), (FIELD_SORT_TITLE, false)],
        )?
        .with_weight(15),
        SortDefinition::from_keys(
            "author_asc",
            "Author A-Z",
            [(FIELD_SORT_CREATOR, false), (FIELD_SORT_TITLE, false), (FIELD_SORT_DATE, false)],
        )?
        .with_weight(20),
        SortDefinition::from_keys(
            "title_asc",
            "Title A-Z",
            [(FIELD_SORT_TITLE, false), (FIELD_SORT_CREATOR, false), (FIELD_SORT_DATE, false)],
        )?
        .with_weight(30),
    ])
}
