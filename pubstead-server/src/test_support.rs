//! Fixtures shared by unit tests.

use flate2::{write::GzEncoder, Compression};

/// Minimal `pubspec.yaml` text.
pub fn pubspec(name: &str, version: &str) -> String {
    format!("name: {name}\nversion: {version}\ndescription: Test package {name}\n")
}

/// Build a `.tar.gz` holding the given `(path, contents)` entries in order.
pub fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}
