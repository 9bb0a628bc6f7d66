//! # Input Validation: Size Limits & Thresholds

use crate::validation::error::{ValidationError, ValidationResult};

/// Default cap on an uploaded archive (32 MB). Archives are buffered in memory.
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 32 * 1024 * 1024;

/// Largest `pubspec.yaml`, `README.md` or `CHANGELOG.md` read out of an archive (4 MB).
pub const MAX_TEXT_ENTRY_SIZE: u64 = 4 * 1024 * 1024;

/// Cap on the summed entry sizes of one archive (512 MB), bounding decompression work.
pub const MAX_UNPACKED_SIZE: u64 = 512 * 1024 * 1024;

/// Maximum allowed number of multipart fields in an upload form
pub const MAX_MULTIPART_FIELDS: usize = 10;

/// Maximum allowed package name length
pub const MAX_PACKAGE_NAME_LENGTH: usize = 64;

/// Maximum allowed version string length
pub const MAX_VERSION_LENGTH: usize = 64;

/// Validate file size against limits.
///
/// `max_size` defaults to [`DEFAULT_MAX_UPLOAD_SIZE`].
pub fn validate_file_size(size: u64, max_size: Option<u64>) -> ValidationResult<()> {
    let limit = max_size.unwrap_or(DEFAULT_MAX_UPLOAD_SIZE);

    if size > limit {
        return Err(ValidationError::FileTooLarge {
            actual: size,
            max: limit,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_file_size() {
        assert!(validate_file_size(1024, None).is_ok());
        assert!(validate_file_size(DEFAULT_MAX_UPLOAD_SIZE, None).is_ok());
        assert!(validate_file_size(DEFAULT_MAX_UPLOAD_SIZE + 1, None).is_err());
        assert!(validate_file_size(1024, Some(512)).is_err());
    }
}
