//! Declarative schema rules loaded from YAML.
//!
//! A [`SchemaConfig`] describes the same registrations a deployment would
//! otherwise make in code: exclusions from the base schema, extractor
//! overrides, new fields, appended extractors, facets, badges and sorts.
//! Sections are applied in that order, so badges and sorts may reference
//! fields declared in the same file. An optional `children` section narrows
//! which child notes and attachments are extracted.
//!
//! ```yaml
//! defaults:
//!   exclude_facets: [facet_tag]
//! fields:
//!   - key: internal
//!     storage: { type: boolean, stored: true }
//!     extractor: { kind: matches_tag, pattern: '^_internal$' }
//! badges:
//!   - key: internal
//!     field: internal
//!     weight: 10
//!     activator: { kind: is_true }
//!     renderer: { template: _text-badge.html }
//! ```

use crate::codec::codec_by_name;
use crate::composer::{Composer, SchemaError};
use crate::document::FieldValue;
use crate::extraction::{Extractor, TagPattern};
use crate::schema::Schema;
use crate::specs::{
    Activator, BadgeDefinition, BadgeRenderer, FacetDefinition, FacetSource, FieldDefinition, SortDefinition,
    StorageType,
};
use crate::transforms::{RegexFlags, Transform, TransformError};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;

/// Top-level schema rules file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub overrides: Vec<OverrideConfig>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub append_extractors: Vec<OverrideConfig>,
    #[serde(default)]
    pub facets: Vec<FacetConfig>,
    #[serde(default)]
    pub badges: Vec<BadgeConfig>,
    #[serde(default)]
    pub sorts: Vec<SortConfig>,
    /// Child filter; the composer's current filter is kept when omitted.
    #[serde(default)]
    pub children: Option<ChildrenConfig>,
}

/// Whether to start from the base schema, and what to drop from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub enabled: bool,
    pub exclude_fields: Vec<String>,
    pub exclude_facets: Vec<String>,
    pub exclude_badges: Vec<String>,
    pub exclude_sorts: Vec<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exclude_fields: Vec::new(),
            exclude_facets: Vec::new(),
            exclude_badges: Vec::new(),
            exclude_sorts: Vec::new(),
        }
    }
}

/// Tag patterns selecting child notes and attachments; empty disables a side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChildrenConfig {
    pub whitelist: String,
    pub blacklist: String,
}

/// Extractor targeting an existing field (used for overrides and appends).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideConfig {
    pub field: String,
    pub extractor: ExtractorConfig,
}

/// A new field, or a replacement for one with the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub key: String,
    pub storage: StorageType,
    pub extractor: ExtractorConfig,
    /// Codec name, see [`codec_by_name`].
    #[serde(default)]
    pub codec: Option<String>,
}

/// An [`Extractor`], selected with `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorConfig {
    RawData,
    ItemData {
        key: String,
    },
    ItemFormat {
        format: String,
    },
    InCollection {
        collection_key: String,
    },
    MatchesTag {
        pattern: String,
    },
    ChildNotes,
    ChildAttachments,
    Transformer {
        extractor: Box<ExtractorConfig>,
        #[serde(default)]
        transforms: Vec<TransformConfig>,
    },
    Composite {
        extractors: Vec<ExtractorConfig>,
    },
}

/// A [`Transform`], selected with `op`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformConfig {
    Find {
        pattern: String,
        #[serde(default)]
        flags: RegexFlags,
        /// Capture group to keep; 0 is the whole match.
        #[serde(default = "default_group")]
        group: usize,
        #[serde(default)]
        max_matches: usize,
    },
    Split {
        separator: String,
    },
    Replace {
        pattern: String,
        #[serde(default)]
        flags: RegexFlags,
        #[serde(default)]
        replacement: String,
        #[serde(default)]
        limit: usize,
    },
    Lowercase,
    Pluck {
        key: String,
    },
    StripLines {
        field: String,
        pattern: String,
        #[serde(default)]
        flags: RegexFlags,
    },
}

/// A facet; `weight` falls back to the replaced facet's weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetConfig {
    pub key: String,
    pub filter_key: String,
    pub title: String,
    #[serde(default)]
    pub weight: Option<i32>,
    pub source: FacetSourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FacetSourceConfig {
    Collection {
        collection_key: String,
    },
    Tag {
        #[serde(default)]
        pattern: Option<String>,
    },
    ItemType,
    Link,
}

/// A badge shown when `activator` accepts the value of `field`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeConfig {
    pub key: String,
    pub field: String,
    #[serde(default)]
    pub weight: Option<i32>,
    pub activator: ActivatorConfig,
    #[serde(default)]
    pub renderer: BadgeRenderer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivatorConfig {
    IsTrue,
    IsSet,
    Equals {
        value: JsonValue,
    },
    Matches {
        pattern: String,
        #[serde(default)]
        flags: RegexFlags,
    },
}

/// A named sort over existing fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortConfig {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub weight: Option<i32>,
    pub fields: Vec<String>,
    /// One flag per field; all ascending when omitted.
    #[serde(default)]
    pub reverse: Option<Vec<bool>>,
}

fn default_group() -> usize {
    1
}

impl SchemaConfig {
    /// Load schema rules from a YAML file.
    ///
    /// # Example
    /// ```ignore
    /// let config = SchemaConfig::load_from_file("config/schema.yaml")?;
    /// let schema = config.resolve()?;
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read schema config {}: {}", path.display(), e))?;

        Self::from_yaml_str(&contents).map_err(|e| format!("{}: {}", path.display(), e))
    }

    /// Parse schema rules from YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self, String> {
        serde_yaml::from_str(contents).map_err(|e| format!("Failed to parse YAML: {}", e))
    }

    /// Build a composer: base schema (unless disabled) plus these rules.
    pub fn build(&self) -> Result<Composer, SchemaError> {
        let mut composer = if self.defaults.enabled {
            Composer::with_defaults()?
        } else {
            Composer::new()
        };
        self.apply(&mut composer)?;
        Ok(composer)
    }

    /// Build and resolve in one step.
    pub fn resolve(&self) -> Result<Schema, SchemaError> {
        self.build()?.resolve_schema()
    }

    /// Apply these rules to an existing composer.
    pub fn apply(&self, composer: &mut Composer) -> Result<(), SchemaError> {
        composer.exclude_fields(&self.defaults.exclude_fields);
        composer.exclude_facets(&self.defaults.exclude_facets);
        composer.exclude_badges(&self.defaults.exclude_badges);
        composer.exclude_sorts(&self.defaults.exclude_sorts);

        if let Some(children) = &self.children {
            composer.set_child_filter(&children.whitelist, &children.blacklist)?;
        }

        for rule in &self.overrides {
            composer.replace_extractor(&rule.field, rule.extractor.build()?)?;
        }

        for field in &self.fields {
            let mut definition = FieldDefinition::new(&field.key, field.storage, field.extractor.build()?);
            if let Some(name) = &field.codec {
                let codec = codec_by_name(name).ok_or_else(|| SchemaError::UnknownCodec {
                    field: field.key.clone(),
                    codec: name.clone(),
                })?;
                definition = definition.with_codec(codec);
            }
            composer.register_field(definition);
        }

        for rule in &self.append_extractors {
            composer.append_extractor(&rule.field, rule.extractor.build()?)?;
        }

        for facet in &self.facets {
            let mut definition = FacetDefinition::new(&facet.key, &facet.filter_key, &facet.title, facet.source.build()?);
            definition.weight = facet.weight;
            composer.add_facet(definition);
        }

        for badge in &self.badges {
            let mut definition = BadgeDefinition::new(
                &badge.key,
                &badge.field,
                badge.activator.build()?,
                badge.renderer.clone(),
            );
            definition.weight = badge.weight;
            composer.add_badge(definition)?;
        }

        for sort in &self.sorts {
            let reverse = sort
                .reverse
                .clone()
                .unwrap_or_else(|| vec![false; sort.fields.len()]);
            let mut definition = SortDefinition::new(&sort.key, &sort.label, sort.fields.clone(), reverse)?;
            if let Some(weight) = sort.weight {
                definition = definition.with_weight(weight);
            }
            composer.add_sort(definition)?;
        }

        tracing::debug!(
            overrides = self.overrides.len(),
            fields = self.fields.len(),
            facets = self.facets.len(),
            badges = self.badges.len(),
            sorts = self.sorts.len(),
            "Applied schema config"
        );
        Ok(())
    }
}

impl ExtractorConfig {
    /// Compile into an extractor; fails on an invalid pattern.
    pub fn build(&self) -> Result<Extractor, TransformError> {
        Ok(match self {
            ExtractorConfig::RawData => Extractor::RawData,
            ExtractorConfig::ItemData { key } => Extractor::item_data(key),
            ExtractorConfig::ItemFormat { format } => Extractor::item_format(format),
            ExtractorConfig::InCollection { collection_key } => Extractor::in_collection(collection_key),
            ExtractorConfig::MatchesTag { pattern } => Extractor::matches_tag(pattern)?,
            ExtractorConfig::ChildNotes => Extractor::ChildNotes,
            ExtractorConfig::ChildAttachments => Extractor::ChildAttachments,
            ExtractorConfig::Transformer { extractor, transforms } => Extractor::transformer(
                extractor.build()?,
                transforms.iter().map(TransformConfig::build).collect::<Result<_, _>>()?,
            ),
            ExtractorConfig::Composite { extractors } => Extractor::composite(
                extractors.iter().map(ExtractorConfig::build).collect::<Result<_, _>>()?,
            ),
        })
    }
}

impl TransformConfig {
    /// Compile into a transform.
    pub fn build(&self) -> Result<Transform, TransformError> {
        match self {
            TransformConfig::Find {
                pattern,
                flags,
                group,
                max_matches,
            } => Transform::find_group(pattern, *flags, *group, *max_matches),
            TransformConfig::Split { separator } => Ok(Transform::split(separator)),
            TransformConfig::Replace {
                pattern,
                flags,
                replacement,
                limit,
            } => Transform::replace(pattern, *flags, replacement, *limit),
            TransformConfig::Lowercase => Ok(Transform::Lowercase),
            TransformConfig::Pluck { key } => Ok(Transform::pluck(key)),
            TransformConfig::StripLines { field, pattern, flags } => Transform::strip_lines(field, pattern, *flags),
        }
    }
}

impl FacetSourceConfig {
    pub fn build(&self) -> Result<FacetSource, TransformError> {
        Ok(match self {
            FacetSourceConfig::Collection { collection_key } => FacetSource::Collection {
                collection_key: collection_key.clone(),
            },
            FacetSourceConfig::Tag { pattern } => FacetSource::Tag {
                pattern: pattern.as_deref().map(TagPattern::new).transpose()?,
            },
            FacetSourceConfig::ItemType => FacetSource::ItemType,
            FacetSourceConfig::Link => FacetSource::Link,
        })
    }
}

impl ActivatorConfig {
    pub fn build(&self) -> Result<Activator, TransformError> {
        Ok(match self {
            ActivatorConfig::IsTrue => Activator::IsTrue,
            ActivatorConfig::IsSet => Activator::IsSet,
            ActivatorConfig::Equals { value } => Activator::Equals(FieldValue::from_json(value)),
            ActivatorConfig::Matches { pattern, flags } => Activator::matches(pattern, *flags)?,
        })
    }
}

/// The rules bundled with the crate (`config/schema.yaml`).
pub fn bundled() -> Result<SchemaConfig, String> {
    SchemaConfig::from_yaml_str(include_str!("../config/schema.yaml"))
}
