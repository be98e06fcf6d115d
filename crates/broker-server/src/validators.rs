//! Upload validation (spec §4.8, §6): artifacts are checked for structural
//! validity before being written to disk and before their flag is set, so
//! a job never becomes ready on the strength of a corrupt upload.
//!
//! Per spec §6's status code contract, a payload that isn't the right kind
//! of file at all (undecodable image, unreadable ZIP) is 415; a payload of
//! the right kind that fails a content check (malformed XML, wrong root
//! element) is 422 — these are distinct failure classes, not interchangeable
//! "bad request" cases.

use crate::envelope::{err_detail, AppCode};
use axum::http::StatusCode;
use axum::response::Response;

fn unsupported_media(code: AppCode, detail: impl Into<String>) -> Response {
    err_detail(StatusCode::UNSUPPORTED_MEDIA_TYPE, code, detail)
}

fn unprocessable_content(code: AppCode, detail: impl Into<String>) -> Response {
    err_detail(StatusCode::UNPROCESSABLE_ENTITY, code, detail)
}

/// Decodes the bytes as an image purely to confirm they form one; the
/// original used OpenCV for the same purpose. Rejects empty or malformed
/// payloads before they ever reach disk.
pub fn validate_image(bytes: &[u8]) -> Result<(), Response> {
    image::load_from_memory(bytes)
        .map(|_| ())
        .map_err(|e| unsupported_media(AppCode::RequestValidationError, format!("not a decodable image: {e}")))
}

/// Confirms the bytes are well-formed XML, and optionally validates
/// against the expected ALTO/PAGE root element name when schema
/// validation is enabled (spec §6 Config `ALTO_SCHEMA_VALIDATION`).
pub fn validate_xml(bytes: &[u8], expect_root: Option<&str>) -> Result<(), Response> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| unprocessable_content(AppCode::RequestValidationError, "not valid UTF-8 XML"))?;
    let doc = roxmltree::Document::parse(text)
        .map_err(|e| unprocessable_content(AppCode::RequestValidationError, format!("XML parse error: {e}")))?;

    if let Some(expected) = expect_root {
        let root_name = doc.root_element().tag_name().name();
        if !root_name.eq_ignore_ascii_case(expected) {
            return Err(unprocessable_content(
                AppCode::RequestValidationError,
                format!("expected root element '{expected}', found '{root_name}'"),
            ));
        }
    }
    Ok(())
}

/// Confirms the bytes form a readable ZIP archive (its central directory
/// parses) before it's accepted as a job result or engine files bundle
/// (spec §4.8, §6 Config `RESULT_ZIP_VALIDATION`).
pub fn validate_zip(bytes: &[u8], invalid_code: AppCode) -> Result<(), Response> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map(|_| ())
        .map_err(|e| unsupported_media(invalid_code, format!("not a valid ZIP archive: {e}")))
}
