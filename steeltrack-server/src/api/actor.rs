//! Actor identity resolution middleware
//!
//! The identity/session collaborator verifies credentials upstream and
//! forwards a verified (actor_id, role) pair as request headers. This
//! middleware resolves them into an [`Actor`] request extension; the core
//! performs no credential verification of its own. Requests with missing or
//! malformed identity never reach a handler.

use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use steeltrack_common::auth::Actor;
use steeltrack_common::domain::Role;
use steeltrack_common::Error;
use uuid::Uuid;

use super::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Resolve actor headers into a request extension
pub async fn actor_middleware(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let actor = resolve_actor(req.headers())?;
    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}

fn resolve_actor(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let actor_id = headers
        .get(ACTOR_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::InvalidInput(format!("missing {} header", ACTOR_ID_HEADER)))?;
    let actor_id = Uuid::parse_str(actor_id)
        .map_err(|_| Error::InvalidInput(format!("{} is not a valid UUID", ACTOR_ID_HEADER)))?;

    let role = headers
        .get(ACTOR_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::InvalidInput(format!("missing {} header", ACTOR_ROLE_HEADER)))?;
    let role: Role = role.parse()?;

    Ok(Actor::new(actor_id, role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_resolve_valid_actor() {
        let mut headers = HeaderMap::new();
        let id = Uuid::new_v4();
        headers.insert(ACTOR_ID_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        headers.insert(ACTOR_ROLE_HEADER, HeaderValue::from_static("shop"));

        let actor = resolve_actor(&headers).unwrap();
        assert_eq!(actor.actor_id, id);
        assert_eq!(actor.role, Role::Shop);
    }

    #[test]
    fn test_missing_headers_rejected() {
        let headers = HeaderMap::new();
        assert!(resolve_actor(&headers).is_err());
    }

    #[test]
    fn test_unknown_role_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACTOR_ID_HEADER,
            HeaderValue::from_str(&Uuid::new_v4().to_string()).unwrap(),
        );
        headers.insert(ACTOR_ROLE_HEADER, HeaderValue::from_static("superuser"));
        assert!(resolve_actor(&headers).is_err());
    }
}
