//! Actor context extracted from request headers.
//!
//! The `X-Actor-ID` header is set by the auth middleware after validating the
//! caller's bearer token. This extractor trusts it unconditionally; requests
//! that never passed the auth middleware arrive without the header and are
//! rejected with 401.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";

/// The authenticated employee making the request.
#[derive(Debug, Clone, Copy)]
pub struct ActorContext {
    pub actor_id: i64,
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor_id = parts
            .headers
            .get(ACTOR_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| {
                AppError::AuthError(anyhow::anyhow!(
                    "Missing or invalid {} header (required from auth middleware)",
                    ACTOR_ID_HEADER
                ))
            })?;

        // Surface the actor in the request span for log correlation.
        tracing::Span::current().record("actor_id", actor_id);

        Ok(ActorContext { actor_id })
    }
}
