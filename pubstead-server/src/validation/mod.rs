//! # Input Validation
//!
//! Checks applied to anything that ends up in a storage key or is read from an
//! untrusted archive: package names, version strings, key segments, and size
//! limits.

pub mod error;
pub mod limits;
pub mod names;

pub use self::{
    error::{ValidationError, ValidationResult},
    limits::{
        validate_file_size, DEFAULT_MAX_UPLOAD_SIZE, MAX_MULTIPART_FIELDS, MAX_PACKAGE_NAME_LENGTH,
        MAX_TEXT_ENTRY_SIZE, MAX_UNPACKED_SIZE, MAX_VERSION_LENGTH,
    },
    names::{validate_key_segment, validate_package_name, validate_version_text},
};
