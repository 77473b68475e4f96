//! Architecture enforcement tests.
//!
//! The listing pipeline only ever sees `dyn Bucket`. Concrete backends are
//! chosen in one place (`objstore::factory`), and nothing outside
//! `objstore` talks to a storage API or the network directly. These tests
//! read the source tree and fail on violations.
//!
//! # Test Categories
//!
//! 1. **Backend Isolation** - Pipeline and commands must not name a backend
//! 2. **Transport Isolation** - Only `objstore` may use the HTTP client
//! 3. **Read-Only Pipeline** - `inspect` must not write files

use std::fs;
use std::path::{Path, PathBuf};

/// Backend modules that only `objstore` itself (and tests) may reference.
const BACKEND_PATHS: &[&str] = &["objstore::gcs", "objstore::filesystem", "objstore::memory"];

/// Collect every `.rs` file under `dir`.
fn rust_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).unwrap_or_else(|_| panic!("Failed to read {}", dir.display())) {
        let path = entry.expect("Failed to read entry").path();
        if path.is_dir() {
            files.extend(rust_files(&path));
        } else if path.extension().map(|e| e == "rs").unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    files
}

/// Code lines before the first `#[cfg(test)]` marker, comments dropped.
///
/// Unit tests and doc examples may use the memory bucket and write
/// fixtures freely.
fn non_test_source(path: &Path) -> String {
    let content =
        fs::read_to_string(path).unwrap_or_else(|_| panic!("Failed to read {}", path.display()));
    let code = match content.find("#[cfg(test)]") {
        Some(idx) => &content[..idx],
        None => content.as_str(),
    };
    code.lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

// =============================================================================
// Backend Isolation
// =============================================================================

/// `inspect` and the commands must reach backends through `create_bucket`.
#[test]
fn pipeline_does_not_name_backends() {
    let mut violations = Vec::new();

    for dir in ["src/inspect", "src/cli", "src/core", "src/ui"] {
        for path in rust_files(Path::new(dir)) {
            let source = non_test_source(&path);
            for backend in BACKEND_PATHS {
                if source.contains(backend) {
                    violations.push(format!(
                        "{}: references {} - use objstore::create_bucket instead",
                        path.display(),
                        backend
                    ));
                }
            }
        }
    }

    assert!(
        violations.is_empty(),
        "Architecture violations found:\n  {}",
        violations.join("\n  ")
    );
}

/// The factory is the only place that constructs a concrete backend.
#[test]
fn factory_constructs_backends() {
    let factory = fs::read_to_string("src/objstore/factory.rs").expect("Failed to read factory");
    assert!(factory.contains("GcsBucket::new"));
    assert!(factory.contains("FilesystemBucket::new"));
}

// =============================================================================
// Transport Isolation
// =============================================================================

/// Only the object store layer may use the HTTP client.
#[test]
fn only_objstore_uses_http() {
    let mut violations = Vec::new();

    for path in rust_files(Path::new("src")) {
        if path.starts_with("src/objstore") {
            continue;
        }
        if non_test_source(&path).contains("reqwest") {
            violations.push(format!("{}: uses reqwest outside objstore", path.display()));
        }
    }

    assert!(
        violations.is_empty(),
        "Architecture violations found:\n  {}",
        violations.join("\n  ")
    );
}

// =============================================================================
// Read-Only Pipeline
// =============================================================================

/// The listing pipeline never writes to the filesystem.
#[test]
fn inspect_never_writes_files() {
    const WRITE_CALLS: &[&str] = &[
        "fs::write",
        "fs::remove",
        "fs::create_dir",
        "File::create",
        "OpenOptions",
    ];

    let mut violations = Vec::new();
    for path in rust_files(Path::new("src/inspect")) {
        let source = non_test_source(&path);
        for call in WRITE_CALLS {
            if source.contains(call) {
                violations.push(format!("{}: calls {}", path.display(), call));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "Architecture violations found:\n  {}",
        violations.join("\n  ")
    );
}
