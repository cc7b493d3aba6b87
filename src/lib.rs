//! Constraint compiler and live resolution engine for the Spindle issue
//! tracker.
//!
//! The crate turns persisted filter criteria into boolean predicate trees
//! evaluated against a transactional item store, and into textual query
//! formulas for storage; both directions round-trip. A live resolution
//! index keeps reference values ("item keys") resolved as the store
//! changes.
//!
//! Module map, leaves first:
//! - [`calendar`] - day/week/month arithmetic and wake-up scheduling
//! - [`model`] - keys, attribute values, date values, criteria records
//! - [`hypercube`] - multi-axis narrowing context
//! - [`store`] - external store interfaces + in-memory reference store
//! - [`predicate`] - AND/OR/NOT trees and point-in-time resolution
//! - [`narrow`] - identity / source-filtered / aggregating narrowing
//! - [`index`] - the live resolution index
//! - [`subtree`] - parent-to-descendants closure expansion
//! - [`constraint`] - enum/date/numeric/text constraint descriptors
//! - [`formula`] - tokenizer, writer and registry-based parser
//!
//! # Example
//!
//! ```
//! use spindle_query::constraint::{Descriptor, EnumDescriptor, F_SUBSET};
//! use spindle_query::formula;
//! use spindle_query::model::{ConstraintData, FieldValue, ItemKey};
//!
//! let descriptor = Descriptor::Enum(EnumDescriptor::new("status"));
//! let data = ConstraintData::new("status").with(
//!     F_SUBSET,
//!     FieldValue::Refs(vec![ItemKey::unresolved("open")]),
//! );
//!
//! let text = descriptor.formula(&data);
//! assert_eq!(text, "status in open");
//!
//! let parsed = formula::parse(&text).unwrap();
//! assert!(descriptor.is_same_data(&data, &parsed[0]));
//! ```

pub mod calendar;
pub mod config;
pub mod constraint;
pub mod error;
pub mod formula;
pub mod hypercube;
pub mod index;
pub mod logging;
pub mod model;
pub mod narrow;
pub mod predicate;
pub mod store;
pub mod subtree;

pub use config::Tunables;
pub use error::{QueryError, Result};
pub use hypercube::Hypercube;
pub use index::KeyIndex;
pub use model::{Attribute, ConstraintData, ItemId, ItemKey, SourceId};
pub use predicate::{Predicate, Resolved};
