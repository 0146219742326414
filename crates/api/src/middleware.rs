use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use bizhub_auth::{Principal, TokenService};

use crate::app::errors::ApiError;
use crate::context::{PrincipalContext, TenantContext};

#[derive(Clone)]
pub struct AuthState {
    pub tokens: Arc<dyn TokenService>,
}

/// Validate the bearer token and attach tenant/principal context.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer(req.headers()) {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };

    let claims = match state.tokens.validate(token) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::debug!(error = %err, "rejecting bearer token");
            return ApiError::Unauthorized("invalid or expired token".into()).into_response();
        }
    };

    let principal = Principal::from(claims);
    req.extensions_mut()
        .insert(TenantContext::new(principal.tenant_id));
    req.extensions_mut().insert(PrincipalContext::new(principal));

    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let missing = || ApiError::Unauthorized("missing bearer token".into());

    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(missing)?;

    let header = header.to_str().map_err(|_| missing())?;

    let header = header.strip_prefix("Bearer ").ok_or_else(missing)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(missing());
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")).unwrap(), "abc.def");
    }

    #[test]
    fn malformed_headers_are_unauthorized() {
        for value in ["Basic abc", "Bearer    ", "bearer abc"] {
            assert!(matches!(
                extract_bearer(&headers(value)),
                Err(ApiError::Unauthorized(_))
            ));
        }
        assert!(extract_bearer(&HeaderMap::new()).is_err());
    }
}
