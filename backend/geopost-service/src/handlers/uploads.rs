/// Upload handlers - multipart image upload and serving in-process objects
use crate::error::{AppError, Result};
use crate::models::UploadResponse;
use crate::services::{UploadGateway, UploadedFile};
use actix_multipart::Multipart;
use actix_web::{http::header, web, HttpResponse};
use bytes::BytesMut;
use futures::StreamExt;

const FILE_FIELD: &str = "file";

/// POST /api/upload with a multipart form field named `file`
pub async fn upload_file(
    gateway: web::Data<UploadGateway>,
    mut payload: Multipart,
) -> Result<HttpResponse> {
    let max_bytes = gateway.max_bytes();
    let mut upload: Option<UploadedFile> = None;

    while let Some(field) = payload.next().await {
        let mut field =
            field.map_err(|e| AppError::Validation(format!("Multipart error: {}", e)))?;

        if field.name() != Some(FILE_FIELD) || upload.is_some() {
            // Drain fields we do not use
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| AppError::Validation(format!("Multipart error: {}", e)))?;
            }
            continue;
        }

        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let content_type = field.content_type().map(|mime| mime.to_string());

        let mut data = BytesMut::new();
        while let Some(chunk) = field.next().await {
            let chunk =
                chunk.map_err(|e| AppError::Validation(format!("File read error: {}", e)))?;
            if data.len() + chunk.len() > max_bytes {
                return Err(AppError::Validation(format!(
                    "File exceeds maximum size of {} bytes",
                    max_bytes
                )));
            }
            data.extend_from_slice(&chunk);
        }

        upload = Some(UploadedFile {
            bytes: data.freeze(),
            file_name,
            content_type,
        });
    }

    let file = upload.ok_or_else(|| AppError::Validation("No file uploaded".to_string()))?;
    let url = gateway.store(file).await?;

    Ok(HttpResponse::Ok().json(UploadResponse { url }))
}

/// GET /uploads/{key} - objects kept by the in-process store.
///
/// Only the memory backend answers here; S3 URLs point at the bucket.
pub async fn serve_upload(
    gateway: web::Data<UploadGateway>,
    key: web::Path<String>,
) -> Result<HttpResponse> {
    match gateway.fetch(&key).await? {
        Some(object) => Ok(HttpResponse::Ok()
            .content_type(object.content_type)
            .insert_header((header::CACHE_CONTROL, "public, max-age=31536000, immutable"))
            .body(object.body)),
        None => Ok(HttpResponse::NotFound().finish()),
    }
}
