pub mod arena;
pub mod object;
pub mod value;

pub use arena::{ObjectArena, ObjectId};
pub use object::ObjectEntity;
pub use value::{Scalar, Value, ValueData};
