// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! axum integration
//!
//! `protect` mounts the handshake endpoint on a router and wraps every route
//! in `e2ee_middleware`. Handlers behind it see plaintext bodies and can read
//! the session through the `SessionInfo` request extension; their responses
//! are sealed on the way out.

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use tracing::error;

use super::errors::TransportError;
use super::headers::{self, is_marked_encrypted};
use super::pipeline::{E2eeTransport, Route, SessionContext};

/// Mount the handshake route and apply the transport to all routes of `router`
///
/// Call this after every route that should be protected has been added.
pub fn protect<S>(router: Router<S>, transport: E2eeTransport) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let handshake_path = transport.config().handshake_path.clone();
    let handshake_transport = transport.clone();

    router
        .route(
            &handshake_path,
            post(move |body: Bytes| {
                let transport = handshake_transport.clone();
                async move { handshake_handler(transport, body).await }
            }),
        )
        .layer(middleware::from_fn_with_state(transport, e2ee_middleware))
}

async fn handshake_handler(transport: E2eeTransport, body: Bytes) -> Response {
    match transport.handshake(&body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Open the request, run the inner service, seal the response
pub async fn e2ee_middleware(
    State(transport): State<E2eeTransport>,
    request: Request,
    next: Next,
) -> Response {
    match transport.route(request.uri().path()) {
        Route::Disabled | Route::Handshake | Route::Excluded => return next.run(request).await,
        Route::Protected => {}
    }

    let (mut parts, body) = request.into_parts();
    let session_id = header_str(&parts.headers, headers::SESSION_ID).map(str::to_owned);
    let encrypted = is_marked_encrypted(header_str(&parts.headers, headers::ENCRYPTED));

    let limit = transport.config().max_body_bytes;
    let bytes = match to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(_) => return TransportError::BodyTooLarge { limit }.into_response(),
    };

    let opened = match transport
        .open_request(session_id.as_deref(), encrypted, &bytes)
        .await
    {
        Ok(opened) => opened,
        Err(e) => return e.into_response(),
    };

    let Some(context) = opened.context else {
        let request = Request::from_parts(parts, Body::from(opened.body));
        return next.run(request).await;
    };

    // Downstream sees a plaintext request
    parts.headers.remove(headers::ENCRYPTED);
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.extensions.insert(context.info());

    let response = next
        .run(Request::from_parts(parts, Body::from(opened.body)))
        .await;
    seal(&transport, &context, response).await
}

async fn seal(transport: &E2eeTransport, context: &SessionContext, response: Response) -> Response {
    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to buffer response for session {}: {}", context.session_id(), e);
            return TransportError::Internal("response body unreadable".to_string())
                .into_response();
        }
    };

    let sealed = match transport.seal_response(context, &bytes) {
        Ok(sealed) => sealed,
        Err(e) => {
            error!("Failed to seal response for session {}: {}", context.session_id(), e);
            return e.into_response();
        }
    };

    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    parts
        .headers
        .insert(headers::ENCRYPTED, HeaderValue::from_static(headers::ENCRYPTED_MARKER));
    parts
        .headers
        .insert(headers::SEQUENCE, HeaderValue::from(context.seq()));

    Response::from_parts(parts, Body::from(sealed))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
