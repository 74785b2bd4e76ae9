//! Request body decoding into a flat field mapping.
//!
//! Supports `application/json` (object bodies only),
//! `application/x-www-form-urlencoded` and `multipart/form-data` (text fields
//! only). Form decoders keep the first value seen for a key and drop blank
//! values, so a blank field reads as missing.

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart};
use axum::http::{header::CONTENT_TYPE, Request};
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};

pub type Fields = Map<String, Value>;

/// Decodes `body` according to `content_type`.
pub async fn decode_body(content_type: &str, body: Bytes) -> AppResult<Fields> {
    let ct = content_type.to_ascii_lowercase();

    if ct.contains("application/json") {
        parse_json(&body)
    } else if ct.contains("application/x-www-form-urlencoded") {
        parse_form(&body)
    } else if ct.contains("multipart/form-data") {
        parse_multipart(content_type, body).await
    } else {
        Err(AppError::MalformedInput("Unsupported content type".to_string()))
    }
}

fn parse_json(body: &[u8]) -> AppResult<Fields> {
    let text = std::str::from_utf8(body)
        .map_err(|_| AppError::MalformedInput("Invalid JSON: body is not valid UTF-8".to_string()))?;
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::MalformedInput("Invalid JSON: expected an object".to_string())),
        Err(e) => Err(AppError::MalformedInput(format!("Invalid JSON: {}", e))),
    }
}

fn parse_form(body: &[u8]) -> AppResult<Fields> {
    if std::str::from_utf8(body).is_err() {
        return Err(AppError::MalformedInput("Invalid form data: body is not valid UTF-8".to_string()));
    }
    let mut fields = Fields::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        if value.is_empty() || fields.contains_key(key.as_ref()) {
            continue;
        }
        fields.insert(key.into_owned(), Value::String(value.into_owned()));
    }
    Ok(fields)
}

async fn parse_multipart(content_type: &str, body: Bytes) -> AppResult<Fields> {
    let request = Request::builder()
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .map_err(|e| AppError::MalformedInput(format!("Invalid multipart data: {}", e)))?;
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| AppError::MalformedInput(format!("Invalid multipart data: {}", e.body_text())))?;

    let mut fields = Fields::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::MalformedInput(format!("Invalid multipart data: {}", e.body_text())))?
    {
        // file uploads are not part of a registration
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field
            .text()
            .await
            .map_err(|e| AppError::MalformedInput(format!("Invalid multipart data: {}", e.body_text())))?;
        if value.is_empty() || fields.contains_key(&name) {
            continue;
        }
        fields.insert(name, Value::String(value));
    }
    Ok(fields)
}
