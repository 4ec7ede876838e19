//! Manifest field validation.

use thiserror::Error;

/// Maximum length of addon and event names.
const MAX_NAME_LEN: usize = 64;

/// Validation error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid addon name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("Invalid event name '{0}'")]
    InvalidEvent(String),
}

fn invalid_name(name: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn invalid_version(version: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidVersion {
        version: version.to_string(),
        reason: reason.into(),
    }
}

/// Validate an addon name.
///
/// Names start with a lowercase letter and contain only lowercase letters,
/// digits, `-` and `_`. Separators may not repeat or end the name.
pub fn validate_addon_name(name: &str) -> Result<(), ValidationError> {
    let Some(first) = name.chars().next() else {
        return Err(invalid_name(name, "must not be empty"));
    };
    if name.len() > MAX_NAME_LEN {
        return Err(invalid_name(name, format!("longer than {MAX_NAME_LEN} characters")));
    }
    if !first.is_ascii_lowercase() {
        return Err(invalid_name(name, "must start with a lowercase letter"));
    }

    let is_sep = |c: char| c == '-' || c == '_';
    let mut prev_sep = false;
    for c in name.chars() {
        if is_sep(c) {
            if prev_sep {
                return Err(invalid_name(name, "repeated separator"));
            }
            prev_sep = true;
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            prev_sep = false;
        } else {
            return Err(invalid_name(name, format!("invalid character '{c}'")));
        }
    }
    if prev_sep {
        return Err(invalid_name(name, "must not end with a separator"));
    }
    Ok(())
}

/// Validate a `MAJOR.MINOR[.PATCH][-prerelease]` version.
pub fn validate_version(version: &str) -> Result<(), ValidationError> {
    let (numbers, prerelease) = match version.split_once('-') {
        Some((numbers, pre)) => (numbers, Some(pre)),
        None => (version, None),
    };

    let parts: Vec<&str> = numbers.split('.').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(invalid_version(version, "expected MAJOR.MINOR or MAJOR.MINOR.PATCH"));
    }
    for part in &parts {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid_version(version, format!("'{part}' is not a number")));
        }
        if part.len() > 1 && part.starts_with('0') {
            return Err(invalid_version(version, format!("'{part}' has a leading zero")));
        }
    }

    if let Some(pre) = prerelease {
        if pre.is_empty() || !pre.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
            return Err(invalid_version(version, "invalid prerelease identifier"));
        }
    }
    Ok(())
}

/// Validate a lifecycle event name (snake_case identifier).
pub fn validate_event_name(event: &str) -> Result<(), ValidationError> {
    let valid = !event.is_empty()
        && event.len() <= MAX_NAME_LEN
        && event.starts_with(|c: char| c.is_ascii_lowercase())
        && event
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidEvent(event.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addon_names() {
        assert!(validate_addon_name("postgres").is_ok());
        assert!(validate_addon_name("slack-notify").is_ok());
        assert!(validate_addon_name("node_18").is_ok());

        assert!(validate_addon_name("").is_err());
        assert!(validate_addon_name("1password").is_err());
        assert!(validate_addon_name("Redis").is_err());
        assert!(validate_addon_name("a--b").is_err());
        assert!(validate_addon_name("trailing-").is_err());
        assert!(validate_addon_name("has space").is_err());
        assert!(validate_addon_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_versions() {
        assert!(validate_version("1.0").is_ok());
        assert!(validate_version("2.14.3").is_ok());
        assert!(validate_version("1.0.0-rc.1").is_ok());

        assert!(validate_version("").is_err());
        assert!(validate_version("3").is_err());
        assert!(validate_version("1.2.3.4").is_err());
        assert!(validate_version("v1.0").is_err());
        assert!(validate_version("1.02").is_err());
        assert!(validate_version("1.0-").is_err());
    }

    #[test]
    fn test_event_names() {
        assert!(validate_event_name("pre_deployment").is_ok());
        assert!(validate_event_name("db_migrated2").is_ok());
        assert!(validate_event_name("Pre-Deploy").is_err());
        assert!(validate_event_name("").is_err());
    }
}
