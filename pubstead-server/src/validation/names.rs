//! # Input Validation: Names, Versions and Storage Keys

use crate::validation::error::{ValidationError, ValidationResult};
use crate::validation::limits::{MAX_PACKAGE_NAME_LENGTH, MAX_VERSION_LENGTH};
use regex::Regex;
use std::sync::OnceLock;

fn package_name_regex() -> &'static Regex {
    static PACKAGE_NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    PACKAGE_NAME_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap_or_else(|e| {
            panic!("Failed to compile package name regex: {}. This is a bug in the code.", e)
        })
    })
}

/// Validate a pub package name: an identifier of letters, digits and underscores
/// that does not start with a digit.
pub fn validate_package_name(name: &str) -> ValidationResult<&str> {
    if name.is_empty() {
        return Err(ValidationError::Empty);
    }

    if name.len() > MAX_PACKAGE_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            actual: name.len(),
            max: MAX_PACKAGE_NAME_LENGTH,
        });
    }

    if !package_name_regex().is_match(name) {
        return Err(ValidationError::InvalidCharacters {
            input: name.to_string(),
        });
    }

    Ok(name)
}

/// Validate the characters of a version string. Semantic version syntax is
/// checked separately when the version is parsed.
pub fn validate_version_text(version: &str) -> ValidationResult<&str> {
    if version.is_empty() {
        return Err(ValidationError::Empty);
    }

    if version.len() > MAX_VERSION_LENGTH {
        return Err(ValidationError::TooLong {
            actual: version.len(),
            max: MAX_VERSION_LENGTH,
        });
    }

    if version.chars().any(|c| c.is_control()) {
        return Err(ValidationError::ControlCharacters);
    }

    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'))
    {
        return Err(ValidationError::InvalidCharacters {
            input: version.to_string(),
        });
    }

    Ok(version)
}

/// Validate one `/`-separated segment of a storage key.
///
/// Keys map onto file paths in the on-disk backend, so a segment must never
/// be able to escape its parent directory.
pub fn validate_key_segment(segment: &str) -> ValidationResult<&str> {
    if segment.is_empty() {
        return Err(ValidationError::Empty);
    }

    if segment == "." || segment == ".." || segment.starts_with('.') {
        return Err(ValidationError::PathTraversal {
            path: segment.to_string(),
        });
    }

    if segment.chars().any(|c| c.is_control()) {
        return Err(ValidationError::ControlCharacters);
    }

    if segment.contains(['/', '\\', ':']) {
        return Err(ValidationError::InvalidCharacters {
            input: segment.to_string(),
        });
    }

    Ok(segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_names() {
        assert!(validate_package_name("http").is_ok());
        assert!(validate_package_name("_private_utils").is_ok());
        assert!(validate_package_name("flutter_bloc2").is_ok());

        assert_eq!(validate_package_name(""), Err(ValidationError::Empty));
        assert!(validate_package_name("2fast").is_err());
        assert!(validate_package_name("with-dash").is_err());
        assert!(validate_package_name("../etc").is_err());
        assert!(validate_package_name(&"a".repeat(MAX_PACKAGE_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_version_text() {
        assert!(validate_version_text("1.0.0").is_ok());
        assert!(validate_version_text("2.0.0-dev.1+build.7").is_ok());
        assert!(validate_version_text("").is_err());
        assert!(validate_version_text("1.0.0/../x").is_err());
    }

    #[test]
    fn test_key_segments() {
        assert!(validate_key_segment("my_pkg").is_ok());
        assert!(validate_key_segment("1.2.3+4").is_ok());
        assert!(validate_key_segment("..").is_err());
        assert!(validate_key_segment(".hidden").is_err());
        assert!(validate_key_segment("a/b").is_err());
        assert!(validate_key_segment("a\\b").is_err());
        assert!(validate_key_segment("").is_err());
    }
}
