//! Checkbox plans: parsing, rewriting and the step-count sidecar.

pub mod metadata;
pub mod parser;

pub use metadata::{PlanMetadata, CHECKBOX_PATTERN, METADATA_FILE, METADATA_VERSION};
pub use parser::{
    complete_all, count_checkboxes, parse_checkboxes, set_item_status, set_status_at,
    set_statuses, validate_plan, validate_step_count, CheckboxItem, CheckboxStatus, MalformedLine,
    ParsedPlan,
};
