//! Deployment rules for the Evidence Library.
//!
//! Starts from the base schema and:
//! - swaps built-in facets for collection facets (featured publisher,
//!   references, themes),
//! - cleans internal annotations out of the stored raw data,
//! - adds a citation preview,
//! - feeds alternate identifiers from the `extra` notes,
//! - adds publisher and status flags with their badges,
//! - adds a publisher-first sort,
//! - only extracts child notes and attachments tagged `publishPDF`.
//!
//! `config/schema.yaml` carries the same rules in declarative form.

use crate::composer::{Composer, SchemaError};
use crate::defaults::{
    FACET_LINK, FACET_TAG, FIELD_ALTERNATE_ID, FIELD_DATA, FIELD_SORT_CREATOR, FIELD_SORT_DATE,
    FIELD_SORT_TITLE,
};
use crate::extraction::Extractor;
use crate::specs::{
    Activator, BadgeDefinition, BadgeRenderer, FacetDefinition, FieldDefinition, SortDefinition,
    StorageType,
};
use crate::transforms::{RegexFlags, Transform};

/// Collection holding items published by Open Development & Education.
pub const OPENDEVED_COLLECTION: &str = "JG6T4YVA";

/// Citation markup shown in result lists.
pub const FIELD_PREVIEW: &str = "preview";
/// Member of [`OPENDEVED_COLLECTION`].
pub const FIELD_OPENDEVED: &str = "opendeved";
/// Tagged `_internal`.
pub const FIELD_INTERNAL: &str = "internal";
/// Tagged `_comingsoon`.
pub const FIELD_COMINGSOON: &str = "comingsoon";

/// Children must carry this tag to be extracted.
pub const CHILD_WHITELIST: &str = "^publishPDF$";
pub const CHILD_BLACKLIST: &str = "";

/// Lines of `extra` that only feed identifier extraction and must not be stored.
const INTERNAL_EXTRA_LINES: &str = r"^\s*(?:EdTechHub|KerkoCite)\.\S+\s*:";

/// Build the deployment schema: base schema plus every rule below.
pub fn composer() -> Result<Composer, SchemaError> {
    let mut composer = Composer::with_defaults()?;
    apply(&mut composer)?;
    Ok(composer)
}

/// Apply the deployment rules to a composer holding the base schema.
pub fn apply(composer: &mut Composer) -> Result<(), SchemaError> {
    composer.exclude_facets([FACET_TAG, FACET_LINK]);
    composer.set_child_filter(CHILD_WHITELIST, CHILD_BLACKLIST)?;
    add_collection_facets(composer);
    clean_stored_data(composer)?;
    add_preview(composer)?;
    add_alternate_ids(composer)?;
    add_flags_and_badges(composer)?;
    add_sorts(composer)?;
    Ok(())
}

fn add_collection_facets(composer: &mut Composer) {
    composer.add_facet(
        FacetDefinition::collection("facet_featured", "featured", "Featured publisher", "JUDM2WBF")
            .with_weight(5),
    );
    composer.add_facet(
        FacetDefinition::collection("facet_references", "ref", "References", "Y37ULQ86").with_weight(10),
    );
    composer.add_facet(
        FacetDefinition::collection("facet_theme", "theme", "Theme", "QK8NXPKZ").with_weight(15),
    );
}

fn clean_stored_data(composer: &mut Composer) -> Result<(), SchemaError> {
    let cleaner = Transform::strip_lines("extra", INTERNAL_EXTRA_LINES, RegexFlags::none().ignore_case())?;
    composer.replace_extractor(FIELD_DATA, Extractor::transformer(Extractor::RawData, vec![cleaner]))
}

fn add_preview(composer: &mut Composer) -> Result<(), SchemaError> {
    // The in-text citation comes wrapped in a <span>, but the citation style
    // nests <div>s inside it; use the bibliography entry markup instead.
    let transforms = vec![
        Transform::replace(r"^<span>", RegexFlags::none(), r#"<div class="csl-entry">"#, 1)?,
        Transform::replace(r"</span>$", RegexFlags::none(), "</div>", 1)?,
    ];
    composer.register_field(FieldDefinition::new(
        FIELD_PREVIEW,
        StorageType::Stored,
        Extractor::transformer(Extractor::item_format("citation"), transforms),
    ));
    Ok(())
}

fn extra_rule(pattern: &str, max_matches: usize, separator: Option<&str>) -> Result<Extractor, SchemaError> {
    let mut transforms = vec![Transform::find(
        pattern,
        RegexFlags::none().ignore_case().multi_line(),
        max_matches,
    )?];
    if let Some(separator) = separator {
        transforms.push(Transform::split(separator));
    }
    Ok(Extractor::transformer(Extractor::item_data("extra"), transforms))
}

fn add_alternate_ids(composer: &mut Composer) -> Result<(), SchemaError> {
    composer.append_extractor(
        FIELD_ALTERNATE_ID,
        extra_rule(r"^\s*EdTechHub.ItemAlsoKnownAs\s*:\s*(.*)$", 1, Some(";"))?,
    )?;
    composer.append_extractor(
        FIELD_ALTERNATE_ID,
        extra_rule(r"^\s*KerkoCite.ItemAlsoKnownAs\s*:\s*(.*)$", 1, Some(" "))?,
    )?;
    composer.append_extractor(
        FIELD_ALTERNATE_ID,
        extra_rule(r"^\s*shortDOI\s*:\s*(\S+)\s*$", 0, None)?,
    )
}

fn add_flags_and_badges(composer: &mut Composer) -> Result<(), SchemaError> {
    let flag = StorageType::Boolean { stored: true };

    composer.register_field(FieldDefinition::new(
        FIELD_OPENDEVED,
        flag,
        Extractor::in_collection(OPENDEVED_COLLECTION),
    ));
    composer.add_badge(
        BadgeDefinition::new(
            FIELD_OPENDEVED,
            FIELD_OPENDEVED,
            Activator::IsTrue,
            BadgeRenderer::template("kerkoapp/_ode-badge.html.jinja2")
                .with("badge_title", "Published by Open Development & Education"),
        )
        .with_weight(100),
    )?;

    composer.register_field(FieldDefinition::new(
        FIELD_INTERNAL,
        flag,
        Extractor::matches_tag(r"^_internal$")?,
    ));
    composer.add_badge(
        BadgeDefinition::new(
            FIELD_INTERNAL,
            FIELD_INTERNAL,
            Activator::IsTrue,
            BadgeRenderer::template("kerkoapp/_text-badge.html.jinja2").with("text", "Internal<br />document"),
        )
        .with_weight(10),
    )?;

    composer.register_field(FieldDefinition::new(
        FIELD_COMINGSOON,
        flag,
        Extractor::matches_tag(r"^_comingsoon$")?,
    ));
    composer.add_badge(
        BadgeDefinition::new(
            FIELD_COMINGSOON,
            FIELD_COMINGSOON,
            Activator::IsTrue,
            BadgeRenderer::template("kerkoapp/_text-badge.html.jinja2").with("text", "Coming<br >soon"),
        )
        .with_weight(20),
    )
}

// The flag sorts ascending and false < true, so items outside the
// collection come first despite the label.
fn add_sorts(composer: &mut Composer) -> Result<(), SchemaError> {
    composer.add_sort(
        SortDefinition::from_keys(
            "ode_desc",
            "Open Development & Education first",
            [
                (FIELD_OPENDEVED, false),
                (FIELD_SORT_DATE, true),
                (FIELD_SORT_CREATOR, false),
                (FIELD_SORT_TITLE, false),
            ],
        )?
        .with_weight(100),
    )
}
