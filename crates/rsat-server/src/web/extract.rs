//! Turning POST bodies into raw request parameters.
//!
//! Dispatches on the `Content-Type` header: multipart forms (file uploads),
//! url-encoded forms, and JSON objects. Anything else is read as JSON.

use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::Form;
use serde_json::Value;

use rsat_shared::params::{RawValue, UploadedFile};

use super::response::ApiError;

const MULTIPART: &str = "multipart/form-data";
const URL_ENCODED: &str = "application/x-www-form-urlencoded";

/// Read all parameters from a POST body, keeping their order.
pub async fn body_params(request: Request, limit: usize) -> Result<Vec<(String, RawValue)>, ApiError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if content_type.starts_with(MULTIPART) {
        multipart_params(request).await
    } else if content_type.starts_with(URL_ENCODED) {
        let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, &())
            .await
            .map_err(ApiError::bad_request)?;
        Ok(pairs
            .into_iter()
            .map(|(name, value)| (name, RawValue::Text(value)))
            .collect())
    } else {
        json_params(request, limit).await
    }
}

async fn multipart_params(request: Request) -> Result<Vec<(String, RawValue)>, ApiError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(ApiError::bad_request)?;

    let mut raw = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(ApiError::bad_request)? {
        let Some(name) = field.name().map(str::to_string) else {
            return Err(ApiError::bad_request("multipart field without a name"));
        };
        let file_name = field.file_name().map(str::to_string);
        let content = field.bytes().await.map_err(ApiError::bad_request)?;

        match file_name {
            // Browsers send an empty part for file inputs left blank
            Some(file_name) if file_name.is_empty() && content.is_empty() => {}
            Some(file_name) => raw.push((
                name,
                RawValue::Upload(UploadedFile {
                    file_name: Some(file_name),
                    content,
                }),
            )),
            None => {
                let text = String::from_utf8(content.to_vec()).map_err(|_| {
                    ApiError::bad_request(format!("field '{name}' is not valid UTF-8"))
                })?;
                raw.push((name, RawValue::Text(text)));
            }
        }
    }
    Ok(raw)
}

async fn json_params(request: Request, limit: usize) -> Result<Vec<(String, RawValue)>, ApiError> {
    let bytes = axum::body::to_bytes(request.into_body(), limit)
        .await
        .map_err(ApiError::bad_request)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    match serde_json::from_slice::<Value>(&bytes).map_err(ApiError::bad_request)? {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(name, value)| (name, RawValue::Json(value)))
            .collect()),
        _ => Err(ApiError::bad_request("request body must be a JSON object")),
    }
}
