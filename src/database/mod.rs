pub mod collection;
pub mod condition;
pub mod document;
pub mod registry;
pub mod schema;

pub use collection::{CollectionAccessor, CollectionError, Page};
pub use condition::{ConditionCompiler, ConditionError, SqlFragment};
pub use document::{Document, DocumentPatch, NewDocument, INVALID, VALID};
pub use registry::{ConnectionRegistry, RegistryError};
pub use schema::{CollectionSchema, FieldKind, FieldSpec};
