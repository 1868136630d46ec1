use super::AppState;
use crate::{
    config::RemovalMode,
    error::MatteError,
    remover::RemovalRequest,
    services::ImageUpload,
};
use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::Instrument;

pub const MISSING_IMAGE_BODY: &str = "Missing image_file";
pub const GENERIC_ERROR_BODY: &str = "Internal Server Error";
pub const PROXY_ERROR_BODY: &str = "Proxy error";

pub(super) async fn healthz() -> &'static str {
    "OK"
}

pub(super) async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
}

pub(super) async fn remove_background(State(state): State<AppState>, request: Request) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("removebg_request", %request_id, mode = ?state.mode);

    async move {
        if let Err(e) = state.remover.ready() {
            return error_response(&e, state.mode);
        }

        let removal = match read_upload(&state, request).await {
            Ok(removal) => removal,
            Err(response) => return response,
        };

        tracing::info!(
            bytes = removal.upload.bytes.len(),
            remover = state.remover.name(),
            "processing upload"
        );

        match state.remover.remove(removal).await {
            Ok(bytes) => (
                StatusCode::OK,
                [
                    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                    (header::CONTENT_TYPE, state.content_type),
                    (header::CACHE_CONTROL, "no-store"),
                ],
                bytes,
            )
                .into_response(),
            Err(e) => error_response(&e, state.mode),
        }
    }
    .instrument(span)
    .await
}

/// Upload from a multipart form (`image_file`, `size`, `format`) or a raw image body
async fn read_upload(state: &AppState, request: Request) -> Result<RemovalRequest, Response> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|_| text_response(StatusCode::BAD_REQUEST, MISSING_IMAGE_BODY))?;
        return read_multipart(multipart).await;
    }

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let body = Bytes::from_request(request, state)
        .await
        .map_err(|rejection| text_response(rejection.status(), &rejection.body_text()))?;
    if body.is_empty() {
        return Err(text_response(StatusCode::BAD_REQUEST, MISSING_IMAGE_BODY));
    }

    Ok(RemovalRequest::new(ImageUpload {
        bytes: body.to_vec(),
        file_name: None,
        content_type,
    }))
}

async fn read_multipart(mut multipart: Multipart) -> Result<RemovalRequest, Response> {
    let mut upload = None;
    let mut size = None;
    let mut format = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(text_response(e.status(), &e.body_text())),
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image_file" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| text_response(e.status(), &e.body_text()))?;
                upload = Some(ImageUpload {
                    bytes: bytes.to_vec(),
                    file_name,
                    content_type,
                });
            },
            "size" | "format" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| text_response(e.status(), &e.body_text()))?;
                if name == "size" {
                    size = Some(value);
                } else {
                    format = Some(value);
                }
            },
            _ => {},
        }
    }

    let upload = upload
        .filter(|upload| !upload.bytes.is_empty())
        .ok_or_else(|| text_response(StatusCode::BAD_REQUEST, MISSING_IMAGE_BODY))?;

    Ok(RemovalRequest {
        upload,
        size,
        format,
    })
}

/// Map a removal failure to a plain-text response
fn error_response(error: &MatteError, mode: RemovalMode) -> Response {
    match error {
        MatteError::Upstream { status, body } => {
            let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY);
            text_response(status, body)
        },
        MatteError::InvalidConfig(message) if mode == RemovalMode::Proxy => {
            tracing::error!(error = %error, "proxy misconfigured");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, message)
        },
        _ => {
            tracing::error!(error = %error, "background removal failed");
            let body = match mode {
                RemovalMode::Local => GENERIC_ERROR_BODY,
                RemovalMode::Proxy => PROXY_ERROR_BODY,
            };
            text_response(StatusCode::INTERNAL_SERVER_ERROR, body)
        },
    }
}

fn text_response(status: StatusCode, body: &str) -> Response {
    (
        status,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
        ],
        body.to_string(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_status_passthrough() {
        let response = error_response(&MatteError::upstream(402, "no credits"), RemovalMode::Proxy);
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_generic_errors_are_500() {
        let local = error_response(&MatteError::decode("bad bytes"), RemovalMode::Local);
        assert_eq!(local.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let proxy = error_response(&MatteError::network("reset"), RemovalMode::Proxy);
        assert_eq!(proxy.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
