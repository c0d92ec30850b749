#![allow(missing_docs)]

pub mod cache;
pub mod catalog;
pub mod export;
pub mod filter;
pub mod generate;
pub mod navigation;
pub mod render;
pub mod spec;
pub mod store;
pub mod validate;

/// Answers keyed by field id.
pub type Answers = serde_json::Map<String, serde_json::Value>;

pub use cache::{CacheError, FormCache};
pub use catalog::FormCatalog;
pub use export::{ExportError, ExportFormat, export, export_file_name};
pub use filter::filter_submission;
pub use generate::{GenerateError, Generator, parse_generated, strip_code_fence, system_prompt};
pub use navigation::{JumpTarget, NavigationPlan, VisibleFields, visible_fields};
pub use render::{
    RenderField, RenderPayload, RenderProgress, RenderStatus, build_render_payload,
    render_json_ui, render_text,
};
pub use spec::{FieldType, FormField, FormSchema, JumpRule, SchemaIssue, Submission};
pub use store::{FormStore, JsonFileStore, MemoryStore, StoreError};
pub use validate::{
    FieldRule, RuleError, RuleKind, RuleSet, ValidationError, ValidationResult, build_rules,
    validate,
};
