//! Extractors: rules that compute a raw field value from a record.
//!
//! The set of extractors is closed. Composite and transformer extractors wrap
//! other extractors, so a field's rule is a small tree that is built once at
//! startup and evaluated per record without retaining any state.

use crate::document::FieldValue;
use crate::record::{ChildItem, Library, Record};
use crate::transforms::{self, RegexFlags, Transform, TransformError};
use regex::Regex;
use std::fmt;

/// Error type for the external format renderer
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// The record carries no such format and nothing can render it.
    FormatUnavailable { record: String, format: String },
    /// The renderer ran and gave up.
    Failed(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::FormatUnavailable { record, format } => {
                write!(f, "Format '{}' is not available for record '{}'", format, record)
            }
            RenderError::Failed(msg) => write!(f, "Rendering failed: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

/// Error type for a single extractor evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractError {
    Render(RenderError),
    Transform(TransformError),
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::Render(e) => write!(f, "{}", e),
            ExtractError::Transform(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

impl From<RenderError> for ExtractError {
    fn from(err: RenderError) -> Self {
        ExtractError::Render(err)
    }
}

impl From<TransformError> for ExtractError {
    fn from(err: TransformError) -> Self {
        ExtractError::Transform(err)
    }
}

/// Renders a record in a named citation format.
///
/// Implementations may be slow (e.g. a remote citation service); callers own
/// any timeout or retry policy.
pub trait FormatRenderer: Send + Sync {
    /// Render `record` as `format` (e.g. `citation`).
    fn render(&self, record: &Record, format: &str) -> Result<String, RenderError>;
}

impl<F> FormatRenderer for F
where
    F: Fn(&Record, &str) -> Result<String, RenderError> + Send + Sync,
{
    fn render(&self, record: &Record, format: &str) -> Result<String, RenderError> {
        self(record, format)
    }
}

/// Renderer that serves the formats the record source delivered along with the item.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrerenderedFormats;

impl FormatRenderer for PrerenderedFormats {
    fn render(&self, record: &Record, format: &str) -> Result<String, RenderError> {
        record
            .format(format)
            .map(str::to_string)
            .ok_or_else(|| RenderError::FormatUnavailable {
                record: record.key().to_string(),
                format: format.to_string(),
            })
    }
}

static ACCEPT_ALL_CHILDREN: ChildFilter = ChildFilter {
    whitelist: None,
    blacklist: None,
};

/// Collaborators available to extractors while processing records.
#[derive(Clone, Copy)]
pub struct ExtractionContext<'a> {
    renderer: &'a dyn FormatRenderer,
    library: &'a Library,
    children: &'a ChildFilter,
}

impl<'a> ExtractionContext<'a> {
    /// A context that accepts every child item.
    pub fn new(renderer: &'a dyn FormatRenderer, library: &'a Library) -> Self {
        Self {
            renderer,
            library,
            children: &ACCEPT_ALL_CHILDREN,
        }
    }

    /// The same collaborators, with `children` deciding which notes and attachments are visible.
    pub fn with_child_filter<'b>(self, children: &'b ChildFilter) -> ExtractionContext<'b>
    where
        'a: 'b,
    {
        ExtractionContext {
            renderer: self.renderer,
            library: self.library,
            children,
        }
    }

    /// Renderer used by [`Extractor::ItemFormat`].
    pub fn renderer(&self) -> &'a dyn FormatRenderer {
        self.renderer
    }

    /// Collection tree used by collection facets.
    pub fn library(&self) -> &'a Library {
        self.library
    }

    pub fn child_filter(&self) -> &'a ChildFilter {
        self.children
    }
}

/// A tag pattern compiled once, anchored at the start of the tag.
#[derive(Debug, Clone)]
pub struct TagPattern {
    source: String,
    anchored: Regex,
}

impl TagPattern {
    /// Compile `pattern`, anchored at the start of the tag.
    pub fn new(pattern: &str) -> Result<Self, TransformError> {
        let anchored = transforms::compile(&format!("^(?:{})", pattern), RegexFlags::none())?;
        Ok(Self {
            source: pattern.to_string(),
            anchored,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// `true` when the trimmed tag matches from its first character.
    pub fn matches(&self, tag: &str) -> bool {
        let tag = tag.trim();
        !tag.is_empty() && self.anchored.is_match(tag)
    }
}

/// Selects child notes and attachments by their tags.
///
/// With a whitelist, only children carrying a matching tag are kept; a
/// blacklist then drops children carrying a matching tag. Either side may be
/// left empty to disable it.
#[derive(Debug, Clone, Default)]
pub struct ChildFilter {
    whitelist: Option<TagPattern>,
    blacklist: Option<TagPattern>,
}

impl ChildFilter {
    /// Build a filter; an empty pattern disables that side.
    pub fn new(whitelist: &str, blacklist: &str) -> Result<Self, TransformError> {
        let pattern = |source: &str| match source {
            "" => Ok(None),
            source => TagPattern::new(source).map(Some),
        };
        Ok(Self {
            whitelist: pattern(whitelist)?,
            blacklist: pattern(blacklist)?,
        })
    }

    pub fn whitelist(&self) -> Option<&str> {
        self.whitelist.as_ref().map(TagPattern::as_str)
    }

    pub fn blacklist(&self) -> Option<&str> {
        self.blacklist.as_ref().map(TagPattern::as_str)
    }

    /// Whether `child` passes both sides of the filter.
    pub fn accepts(&self, child: &ChildItem) -> bool {
        let tagged = |pattern: &TagPattern| child.tags().iter().any(|tag| pattern.matches(tag));
        self.whitelist.as_ref().map_or(true, tagged) && !self.blacklist.as_ref().map_or(false, tagged)
    }
}

/// A rule computing a value from a record.
#[derive(Debug, Clone)]
pub enum Extractor {
    /// The record's structured data, unmodified.
    RawData,
    /// One member of the record's data; empty string when absent.
    ItemData { key: String },
    /// The record rendered by the format renderer.
    ItemFormat { format: String },
    InCollection { collection_key: String },
    /// Whether any tag matches, anchored at the tag's start.
    MatchesTag { pattern: TagPattern },
    /// Markup of the child notes the context's filter accepts.
    ChildNotes,
    /// Data of the child attachments the context's filter accepts.
    ChildAttachments,
    Transformer {
        extractor: Box<Extractor>,
        transforms: Vec<Transform>,
    },
    /// Concatenation of every child's non-empty results, in order, without deduplication.
    Composite { extractors: Vec<Extractor> },
}

impl Extractor {
    /// Read data member `key`.
    pub fn item_data(key: impl Into<String>) -> Self {
        Extractor::ItemData { key: key.into() }
    }

    /// Render the record as `format`.
    pub fn item_format(format: impl Into<String>) -> Self {
        Extractor::ItemFormat { format: format.into() }
    }

    /// Membership flag for one collection.
    pub fn in_collection(collection_key: impl Into<String>) -> Self {
        Extractor::InCollection {
            collection_key: collection_key.into(),
        }
    }

    /// Tag flag; fails on an invalid pattern.
    pub fn matches_tag(pattern: &str) -> Result<Self, TransformError> {
        Ok(Extractor::MatchesTag {
            pattern: TagPattern::new(pattern)?,
        })
    }

    /// Run `transforms` over the output of `extractor`.
    pub fn transformer(extractor: Extractor, transforms: Vec<Transform>) -> Self {
        Extractor::Transformer {
            extractor: Box::new(extractor),
            transforms,
        }
    }

    /// Concatenate the results of `extractors`.
    pub fn composite(extractors: Vec<Extractor>) -> Self {
        Extractor::Composite { extractors }
    }

    /// Add a child, wrapping a non-composite extractor into a composite first.
    pub fn push_child(self, child: Extractor) -> Self {
        match self {
            Extractor::Composite { mut extractors } => {
                extractors.push(child);
                Extractor::Composite { extractors }
            }
            other => Extractor::Composite {
                extractors: vec![other, child],
            },
        }
    }

    /// Name used in configuration and `describe` output.
    pub fn kind(&self) -> &'static str {
        match self {
            Extractor::RawData => "raw_data",
            Extractor::ItemData { .. } => "item_data",
            Extractor::ItemFormat { .. } => "item_format",
            Extractor::InCollection { .. } => "in_collection",
            Extractor::MatchesTag { .. } => "matches_tag",
            Extractor::ChildNotes => "child_notes",
            Extractor::ChildAttachments => "child_attachments",
            Extractor::Transformer { .. } => "transformer",
            Extractor::Composite { .. } => "composite",
        }
    }

    /// Evaluate against one record. Fails only on renderer or transform errors.
    pub fn extract(&self, record: &Record, ctx: &ExtractionContext<'_>) -> Result<FieldValue, ExtractError> {
        match self {
            Extractor::RawData => Ok(FieldValue::Object(record.data().clone())),
            Extractor::ItemData { key } => Ok(record
                .get(key)
                .map(FieldValue::from_json)
                .unwrap_or_else(|| FieldValue::String(String::new()))),
            Extractor::ItemFormat { format } => {
                Ok(FieldValue::String(ctx.renderer().render(record, format)?))
            }
            Extractor::InCollection { collection_key } => {
                Ok(FieldValue::Bool(record.in_collection(collection_key)))
            }
            Extractor::MatchesTag { pattern } => Ok(FieldValue::Bool(
                record.tags().iter().any(|tag| pattern.matches(tag)),
            )),
            Extractor::ChildNotes => Ok(FieldValue::strings(
                accepted_children(record, ctx.child_filter()).filter_map(ChildItem::note_html),
            )),
            Extractor::ChildAttachments => Ok(FieldValue::List(
                accepted_children(record, ctx.child_filter())
                    .filter(|child| child.is_attachment())
                    .map(|child| FieldValue::Object(child.data().clone()))
                    .collect(),
            )),
            Extractor::Transformer {
                extractor,
                transforms,
            } => {
                let base = extractor.extract(record, ctx)?;
                Ok(transforms::apply_chain(transforms, base)?)
            }
            Extractor::Composite { extractors } => {
                let mut out = Vec::new();
                for child in extractors {
                    child.extract(record, ctx)?.flatten_into(&mut out);
                }
                Ok(FieldValue::List(out))
            }
        }
    }
}

fn accepted_children<'r>(record: &'r Record, filter: &'r ChildFilter) -> impl Iterator<Item = &'r ChildItem> + 'r {
    record.children().iter().filter(move |child| filter.accepts(child))
}
