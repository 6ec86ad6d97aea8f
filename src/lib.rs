//! # bibfields: schema composition and field extraction for bibliographic indexing
//!
//! bibfields turns bibliographic records (Zotero-style items) into flat search
//! documents. A deployment starts from a base schema, then excludes, overrides
//! and extends field definitions before the schema is sealed and used to
//! extract every record.
//!
//! ## Features
//!
//! - **Composable schema**: fields, facets, badges and sorts keyed by name, with
//!   override, wrap and append-with-wrap operations ([`Composer`])
//! - **Extractor trees**: raw data, data members, rendered formats, collection
//!   membership, tag matching and child notes/attachments, combined with
//!   transform chains ([`Extractor`])
//! - **Text transforms**: bounded regex find, split, replace, pluck and line
//!   stripping, compiled once at startup ([`Transform`])
//! - **Declarative rules**: the same registrations from YAML ([`SchemaConfig`])
//! - **Parallel extraction**: a sealed [`Schema`] is shared across rayon workers
//!
//! ## Example: alternate identifiers from notes
//!
//! ```yaml
//! append_extractors:
//!   - field: alternate_id
//!     extractor:
//!       kind: transformer
//!       extractor: { kind: item_data, key: extra }
//!       transforms:
//!         - op: find
//!           pattern: '^\s*KerkoCite.ItemAlsoKnownAs\s*:\s*(.*)$'
//!           flags: { ignore_case: true, multi_line: true }
//!           max_matches: 1
//!         - op: split
//!           separator: ' '
//! ```
//!
//! ## Example: in code
//!
//! ```ignore
//! use bibfields::{customize, ExtractionContext, Library, PrerenderedFormats, Record};
//!
//! let schema = customize::composer()?.resolve_schema()?;
//! let library = Library::new();
//! let ctx = ExtractionContext::new(&PrerenderedFormats, &library);
//! let doc = schema.extract(&Record::new("ABCD1234").with_data("title", "T"), &ctx);
//! ```

// Records and extracted values
pub mod record;
pub mod document;

// Extraction rules
pub mod transforms;
pub mod extraction;
pub mod codec;
pub mod specs;

// Schema assembly
pub mod composer;
pub mod schema;
pub mod defaults;
pub mod customize;
pub mod config_loader;

// Process plumbing
pub mod settings;
pub mod serialization;

pub use record::{ChildItem, Collection, Library, Record, RecordError};
pub use document::{Document, ExtractionFailure, FieldValue};
pub use transforms::{RegexFlags, Transform, TransformError};
pub use extraction::{
    ChildFilter, ExtractError, ExtractionContext, Extractor, FormatRenderer, PrerenderedFormats, RenderError,
    TagPattern,
};
pub use codec::{Codec, CodecError, JsonCodec};
pub use specs::{
    Activator, BadgeDefinition, BadgeRenderer, FacetDefinition, FacetSource, FieldDefinition, SortDefinition,
    StorageType,
};
pub use composer::{Composer, SchemaError};
pub use schema::Schema;
pub use config_loader::SchemaConfig;
pub use settings::{Profile, Settings};
pub use serialization::{NdjsonWriter, SerializationError};
