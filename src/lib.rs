//! # Almanac: field-value normalization and extraction
//!
//! Almanac turns the loosely structured free text of almanac-style entity
//! documents (one JSON document per country or region) into typed values.
//!
//! ## Building blocks
//!
//! - [`normalize`]: entity decoding, markup stripping, ASCII typography and
//!   whitespace cleanup for one text leaf
//! - [`split`]: delimiter-aware list splitting that respects parentheses
//! - [`parse_value`]: scalar parsing of strings like `"$1.2 trillion (2023 est.)"`
//! - [`aggregate_year_series`]: year-keyed siblings to a descending series
//! - [`extract`]: resolve a dotted path, run a named handler, and always
//!   produce a usable value plus an outcome
//!
//! ## Example: field plan
//!
//! ```yaml
//! aggregate_entity: World
//! fields:
//!   - name: exports
//!     path: Economy.Exports
//!     handler: year_series
//!   - name: languages
//!     path: People and Society.Languages
//!     handler: list
//!     default: []
//! ```
//!
//! The plan is loaded into an [`EngineConfig`] and run per entity by
//! [`runtime::EntityParser`].

pub mod config;
pub mod extraction;
pub mod handler_registry;
pub mod node;
pub mod normalize;
pub mod report;
pub mod runtime;
pub mod serialization;
pub mod series;
pub mod split;
pub mod value;

pub use config::{ConfigError, EngineConfig, FieldSpec};
pub use extraction::{extract, resolve, ExtractError, ExtractOptions, Extraction, FieldOutcome, FieldPath};
pub use handler_registry::{FieldHandler, Handler, HandlerError, HandlerRegistry};
pub use node::FieldNode;
pub use normalize::normalize;
pub use report::{EntityReport, FieldFailure, FieldTally, RunSummary};
pub use runtime::{EntityContext, EntityParser, EntityRecord};
pub use serialization::{JsonArrayWriter, NdjsonWriter, OutputFormat, RecordWriter, SerializationError};
pub use series::{aggregate_year_series, aggregate_year_series_with, SeriesField, YearSeries, YearSeriesEntry};
pub use split::{select_delimiter, split, SplitOptions};
pub use value::{parse_value, parse_value_with, try_parse_value, ParsedValue, UnparsedValue, ValueOptions, ValueStatus};
