pub mod field;
pub mod form;
pub mod submission;

pub use field::{FieldType, FormField, JumpRule};
pub use form::{FormSchema, MIN_VALID_CREATED_AT, SchemaIssue};
pub use submission::Submission;
