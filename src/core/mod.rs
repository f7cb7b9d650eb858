pub mod error;
pub mod types;
pub mod value;

pub use error::{EditError, ErrorKind, HandleError, Result};
pub use types::{EnumType, FieldType, RecordType};
pub use value::Value;
