pub mod attachment;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod record;

pub use attachment::{AttachmentPolicy, AttachmentRef, LocalAttachment};
pub use error::CoreError;
pub use field_value::FieldValue;
pub use ids::*;
pub use record::{Fields, Record, StagedRecord};
