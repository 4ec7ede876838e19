//! SDK Utilities

mod validation;

pub use validation::{validate_addon_name, validate_event_name, validate_version, ValidationError};
