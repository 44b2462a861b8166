pub mod attribute;
pub mod entity;
pub mod registry;

pub use attribute::{Attribute, AttributeType};
pub use entity::{Entity, ExternalSource, SourceAuth};
pub use registry::{SchemaRegistry, SchemaStore};
