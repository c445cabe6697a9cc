//! Document reader: PDF → per-page glyphs and plain text via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is not
//! safe to call from async contexts. `tokio::task::spawn_blocking` moves the
//! work onto the blocking pool so Tokio worker threads never stall on it.
//!
//! ## Coordinates
//!
//! Glyphs keep pdfium's bottom-left origin: `y` is the bottom edge of the
//! text segment, so larger `y` means higher on the page. Row grouping sorts
//! on that assumption.

use crate::document::{Glyph, PageContent};
use crate::error::AnalysisError;
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Check the file exists, is readable and starts with the `%PDF` magic bytes.
///
/// Gives callers a meaningful error rather than a pdfium failure.
pub fn validate_pdf(path: &Path) -> Result<(), AnalysisError> {
    if !path.exists() {
        return Err(AnalysisError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
                return Err(AnalysisError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(AnalysisError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(AnalysisError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

/// Read every page's glyphs and text.
pub async fn read_pages(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<Vec<PageContent>, AnalysisError> {
    validate_pdf(pdf_path)?;
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || read_pages_blocking(&path, password.as_deref()))
        .await
        .map_err(|e| AnalysisError::Internal(format!("Reader task panicked: {}", e)))?
}

fn read_pages_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<Vec<PageContent>, AnalysisError> {
    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| load_error(pdf_path, password.is_some(), e))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {} pages", total);

    let mut contents = Vec::with_capacity(total);
    for (index, page) in pages.iter().enumerate() {
        let text = page.text().map_err(|e| AnalysisError::TextExtractionFailed {
            page: index + 1,
            detail: format!("{:?}", e),
        })?;

        let glyphs: Vec<Glyph> = text
            .segments()
            .iter()
            .filter_map(|segment| {
                let content = segment.text();
                let content = content.trim();
                if content.is_empty() {
                    return None;
                }
                let bounds = segment.bounds();
                Some(Glyph::new(
                    content,
                    bounds.left().value,
                    bounds.bottom().value,
                    bounds.right().value - bounds.left().value,
                    bounds.top().value - bounds.bottom().value,
                    index,
                ))
            })
            .collect();

        debug!("Page {}: {} text segments", index + 1, glyphs.len());
        contents.push(PageContent {
            index,
            glyphs,
            text: text.all(),
        });
    }

    Ok(contents)
}

fn load_error(path: &Path, had_password: bool, e: PdfiumError) -> AnalysisError {
    let detail = format!("{:?}", e);
    let path: PathBuf = path.to_path_buf();
    if detail.contains("Password") || detail.contains("password") {
        if had_password {
            AnalysisError::WrongPassword { path }
        } else {
            AnalysisError::PasswordRequired { path }
        }
    } else {
        AnalysisError::CorruptPdf { path, detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_not_found() {
        let err = validate_pdf(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, AnalysisError::FileNotFound { .. }));
    }

    #[test]
    fn wrong_magic_is_not_a_pdf() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"PK\x03\x04 zip archive").unwrap();
        match validate_pdf(tmp.path()).unwrap_err() {
            AnalysisError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pdf_magic_passes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.7\n").unwrap();
        assert!(validate_pdf(tmp.path()).is_ok());
    }

    #[test]
    fn truncated_file_is_not_a_pdf() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%P").unwrap();
        assert!(matches!(
            validate_pdf(tmp.path()).unwrap_err(),
            AnalysisError::NotAPdf { .. }
        ));
    }

    #[test]
    fn read_pages_rejects_before_loading_pdfium() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"<html></html>").unwrap();
        let err = tokio_test::block_on(read_pages(tmp.path(), None)).unwrap_err();
        assert!(matches!(err, AnalysisError::NotAPdf { .. }));
    }

    #[test]
    fn password_errors_are_mapped() {
        let p = Path::new("x.pdf");
        assert!(matches!(
            load_error(p, false, PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError)),
            AnalysisError::PasswordRequired { .. }
        ));
        assert!(matches!(
            load_error(p, true, PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError)),
            AnalysisError::WrongPassword { .. }
        ));
        assert!(matches!(
            load_error(p, false, PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FormatError)),
            AnalysisError::CorruptPdf { .. }
        ));
    }
}
