//! Document structure model for folioscan.
//!
//! - [`model`]: the arena-backed [`DocumentTree`] (physical pages plus the
//!   logical structure tree, linked by `logical_physical` references)
//! - [`schema`]: the [`Schema`] capability used to resolve structural types
//! - [`io`]: reading and writing the JSON structure file

pub mod io;
pub mod model;
pub mod schema;

pub use io::{DOCUMENT_FORMAT_VERSION, DocumentFile, load_document, save_document};
pub use model::{ClearedStructure, DocumentTree, Metadata, NodeId, Page, PageId, StructureNode};
pub use schema::{PermissiveSchema, Ruleset, Schema, TypeHandle};
