use std::convert::Infallible;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::common::Actor;

pub const ACTOR_HEADER: &str = "x-actor";
pub const ROLE_HEADER: &str = "x-actor-role";

/// Caller identity taken from the `x-actor` and `x-actor-role` headers
pub struct RequestActor(pub Actor);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestActor {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Ok(RequestActor(Actor {
            name: header(ACTOR_HEADER).unwrap_or_else(|| "anonymous".to_string()),
            role: header(ROLE_HEADER),
        }))
    }
}
