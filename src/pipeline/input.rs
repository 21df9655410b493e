//! Input validation: check the operator's PDF path before any page work.
//!
//! pdfium reports a missing or non-PDF file as an opaque load error; checking
//! existence, readability and the `%PDF` magic bytes up front turns those
//! into specific messages.

use crate::error::MenuOcrError;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;

/// Validate a user-supplied PDF path.
///
/// An empty path means nothing was selected.
pub fn resolve_pdf(path_str: &str) -> Result<PathBuf, MenuOcrError> {
    if path_str.trim().is_empty() {
        return Err(MenuOcrError::NoPdfSelected);
    }
    let path = PathBuf::from(path_str);

    if !path.is_file() {
        return Err(MenuOcrError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(MenuOcrError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(MenuOcrError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(MenuOcrError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}
