//! Filesystem utility functions
//!
//! This module provides utility functions for filesystem operations used
//! while resolving log paths in the configuration: canonicalizing the
//! directory part of a log file path, creating log directories, and
//! splitting `%`-format path specifications into a base directory and a
//! per-connection template.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Check if a file exists and is a regular file
pub fn check_file_exists(path: &Path) -> io::Result<()> {
    if !path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("file does not exist: {}", path.display()),
        ));
    }
    if !path.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path is not a file: {}", path.display()),
        ));
    }
    Ok(())
}

/// Canonicalize the directory part of a file path, keeping the file name.
///
/// The directory part must exist; the file itself does not have to.
pub fn realdir(path: &str) -> io::Result<PathBuf> {
    let p = Path::new(path);
    let file = p.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("no file name in '{}'", path))
    })?;
    let dir = match p.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    Ok(fs::canonicalize(dir)?.join(file))
}

/// Create a directory and all of its parents with mode 0777.
pub fn mkpath(path: &str) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o777);
    }
    builder.create(path)
}

/// Split a `%`-format path specification into a directory part and a
/// per-connection template part.
///
/// The split point is the last path separator before the first format
/// character; `%%` is a literal escape and does not count as a format
/// character. A spec without any format character splits at its last
/// separator.
pub fn split_pathspec(spec: &str) -> (String, String) {
    let bytes = spec.as_bytes();
    let mut fmt_pos = None;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 1 < bytes.len() && bytes[i + 1] == b'%' {
                i += 2;
                continue;
            }
            fmt_pos = Some(i);
            break;
        }
        i += 1;
    }
    let limit = fmt_pos.unwrap_or(bytes.len());
    match spec[..limit].rfind('/') {
        Some(slash) => (spec[..slash].to_string(), spec[slash + 1..].to_string()),
        None => (String::new(), spec.to_string()),
    }
}

/// Resolve a log path specification.
///
/// Splits the spec, resolves `%%` escapes in the directory part, creates
/// the directory with mode 0777, canonicalizes it, re-doubles any `%` the
/// canonical path contains, and rejoins the template part. Returns the
/// canonical base directory and the full log path spec.
pub fn resolve_pathspec(spec: &str) -> io::Result<(PathBuf, String)> {
    let (lhs, rhs) = split_pathspec(spec);
    let lhs = if lhs.is_empty() { ".".to_string() } else { lhs };
    // All %% in the directory part resolve to literal %
    let lhs = lhs.replace("%%", "%");
    mkpath(&lhs)?;
    let basedir = fs::canonicalize(&lhs)?;
    let encoded = basedir.to_string_lossy().replace('%', "%%");
    let logspec = format!("{}/{}", encoded, rhs);
    Ok((basedir, logspec))
}
