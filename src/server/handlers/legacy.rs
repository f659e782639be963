use axum::extract::Path;

use crate::server::error::ApiError;
use crate::services::legacy::LegacyEndpoint;

/// Every method on a retired weekly-results path answers 410; unknown
/// segments answer 404
pub async fn removed_endpoint(Path(segment): Path<String>) -> ApiError {
    match segment.parse::<LegacyEndpoint>() {
        Ok(endpoint) => endpoint.invoke().into(),
        Err(err) => err.into(),
    }
}
