//! Thin request extractors shared by the job/DLQ handlers.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::HttpError;

/// A UUID path parameter, rejected as `400` (not `422`) on malformed input
/// since the id never reaches schedule/field validation.
pub struct PathId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for PathId
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<Uuid>::from_request_parts(parts, state)
            .await
            .map_err(|_| HttpError::bad_request("invalid job id"))?;
        Ok(PathId(id))
    }
}

/// `GET /jobs[?status=…]` query parameters.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}
