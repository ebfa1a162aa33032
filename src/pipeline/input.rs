//! Input validation: make sure a user-supplied path or buffer is a PDF
//! before pdfium sees it.
//!
//! Checking the `%PDF` magic bytes up front turns "pdfium could not parse
//! this" into a clear [`BillRouteError::NotAPdf`].

use crate::error::BillRouteError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Validate a local file path: it must exist, be readable and start with
/// `%PDF`.
pub fn resolve_local(path: impl AsRef<Path>) -> Result<PathBuf, BillRouteError> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(BillRouteError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != PDF_MAGIC {
                return Err(BillRouteError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(BillRouteError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(BillRouteError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// Validate an in-memory PDF.
pub fn check_bytes(bytes: &[u8]) -> Result<(), BillRouteError> {
    if bytes.len() >= 4 && &bytes[..4] != PDF_MAGIC {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(BillRouteError::NotAPdf {
            path: PathBuf::from("<memory>"),
            magic,
        });
    }
    Ok(())
}

/// Default batch name: the file stem, or "batch".
pub fn batch_name_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "batch".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file() {
        let err = resolve_local("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, BillRouteError::FileNotFound { .. }));
    }

    #[test]
    fn wrong_magic() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"PK\x03\x04zip").unwrap();
        match resolve_local(f.path()).unwrap_err() {
            BillRouteError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn accepts_pdf_header() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7\n").unwrap();
        assert_eq!(resolve_local(f.path()).unwrap(), f.path());
    }

    #[test]
    fn bytes_magic() {
        assert!(check_bytes(b"%PDF-1.4").is_ok());
        assert!(check_bytes(b"<html>").is_err());
    }

    #[test]
    fn batch_name_from_stem() {
        assert_eq!(batch_name_for(Path::new("/tmp/ward-12.pdf")), "ward-12");
        assert_eq!(batch_name_for(Path::new("/")), "batch");
    }
}
