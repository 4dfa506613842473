//! # Custom Extractors & Validation
//!
//! The [`Validate`] trait for request DTOs, helpers that map JSON rejections
//! to [`AppError::BadRequest`], and multipart form reading for uploads.

use axum::extract::multipart::{Field, Multipart};
use axum::extract::rejection::JsonRejection;
use axum::Json;

use rosp_lifecycle::UploadedDocument;

use crate::error::AppError;

/// Business rules beyond what serde checks.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and run [`Validate`] on it.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

// ── Multipart ───────────────────────────────────────────────────────────────

/// A multipart form read into memory: text fields and file parts by name.
#[derive(Debug, Default)]
pub struct FormParts {
    pub texts: Vec<(String, String)>,
    pub files: Vec<(String, UploadedDocument)>,
}

impl FormParts {
    /// Read every part. A part with a filename is a file; others are text.
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("malformed multipart body: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if field.file_name().is_some() {
                form.files.push((name, read_file(field).await?));
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("unreadable field {name}: {e}")))?;
                form.texts.push((name, text));
            }
        }
        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Remove and return the named file part.
    pub fn take_file(&mut self, name: &str) -> Option<UploadedDocument> {
        let index = self.files.iter().position(|(n, _)| n == name)?;
        Some(self.files.swap_remove(index).1)
    }
}

async fn read_file(field: Field<'_>) -> Result<UploadedDocument, AppError> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let media_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| AppError::BadRequest(format!("unreadable upload {filename}: {e}")))?;
    Ok(UploadedDocument {
        filename,
        media_type,
        bytes: bytes.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str) -> UploadedDocument {
        UploadedDocument {
            filename: name.into(),
            media_type: "application/pdf".into(),
            bytes: vec![1, 2, 3],
        }
    }

    #[test]
    fn take_file_removes_the_named_part() {
        let mut form = FormParts {
            texts: vec![("payload".into(), "{}".into())],
            files: vec![
                ("identity_document".into(), doc("id.pdf")),
                ("address_proof".into(), doc("bill.pdf")),
            ],
        };
        assert_eq!(form.text("payload"), Some("{}"));
        assert_eq!(form.take_file("address_proof").unwrap().filename, "bill.pdf");
        assert!(form.take_file("address_proof").is_none());
        assert_eq!(form.take_file("identity_document").unwrap().filename, "id.pdf");
    }
}
