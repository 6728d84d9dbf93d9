pub mod common;
pub mod orders;
pub mod purchase_requests;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

pub use crate::AppState;

/// Caller identity carried on every request via headers.
///
/// `x-actor-id` is mandatory and must be a UUID. `x-actor-role` defaults
/// to `client` when absent. `x-organization-id` is kept as the raw header
/// value; listing falls back to a derived client scope when it is missing
/// or malformed rather than rejecting the request.
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub actor_id: Uuid,
    pub role: String,
    pub organization_id: Option<Uuid>,
}

impl ActorContext {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }

    fn from_headers(headers: &HeaderMap) -> Result<Self, String> {
        let actor_id = headers
            .get("x-actor-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| "Missing x-actor-id header".to_string())?;
        let actor_id = actor_id
            .parse::<Uuid>()
            .map_err(|_| format!("Invalid x-actor-id header: {}", actor_id))?;

        let role = headers
            .get("x-actor-role")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("client")
            .to_string();

        let organization_id = headers
            .get("x-organization-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<Uuid>().ok());

        Ok(Self {
            actor_id,
            role,
            organization_id,
        })
    }
}

/// Rejection body returned when actor headers are missing or malformed.
#[derive(Debug, Serialize)]
pub struct ActorRejection {
    error: String,
    message: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ActorRejection>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        ActorContext::from_headers(&parts.headers).map_err(|message| {
            (
                StatusCode::BAD_REQUEST,
                Json(ActorRejection {
                    error: "Bad Request".to_string(),
                    message,
                }),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                k.parse::<HeaderName>().unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn actor_context_parses_all_headers() {
        let actor = Uuid::new_v4();
        let org = Uuid::new_v4();
        let ctx = ActorContext::from_headers(&headers(&[
            ("x-actor-id", &actor.to_string()),
            ("x-actor-role", "admin"),
            ("x-organization-id", &org.to_string()),
        ]))
        .unwrap();
        assert_eq!(ctx.actor_id, actor);
        assert!(ctx.is_admin());
        assert_eq!(ctx.organization_id, Some(org));
    }

    #[test]
    fn actor_context_requires_actor_id() {
        let err = ActorContext::from_headers(&headers(&[("x-actor-role", "client")]));
        assert!(err.is_err());
    }

    #[test]
    fn malformed_organization_id_is_dropped_not_rejected() {
        let actor = Uuid::new_v4();
        let ctx = ActorContext::from_headers(&headers(&[
            ("x-actor-id", &actor.to_string()),
            ("x-organization-id", "not-a-uuid"),
        ]))
        .unwrap();
        assert_eq!(ctx.organization_id, None);
        assert_eq!(ctx.role, "client");
    }
}
