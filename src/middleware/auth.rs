use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::{Principal, Role};
use crate::error::AppError;
use crate::AppState;

/// Claims carried by the bearer token issued at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub roles: String,
    pub exp: i64,
}

impl Claims {
    pub fn into_principal(self) -> Principal {
        Principal {
            id: self.id,
            role: Role::from_claim(&self.roles),
            username: self.username,
            email: self.email,
            phone: self.phone,
        }
    }
}

/// HS256 validator for the shared application secret.
#[derive(Clone)]
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.key, &self.validation).map(|data| data.claims)
    }
}

/// Decodes the bearer token and stores the caller's `Principal` in the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer(req.headers())?;

    let claims = state.jwt.validate(token).map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        AppError::Unauthorized("invalid or expired token".to_string())
    })?;

    req.extensions_mut().insert(claims.into_principal());
    Ok(next.run(req).await)
}

/// Must run after `require_auth`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    let principal = req
        .extensions()
        .get::<Principal>()
        .ok_or_else(|| AppError::Unauthorized("missing credentials".to_string()))?;

    if !principal.is_admin() {
        return Err(AppError::Forbidden("admin role required".to_string()));
    }

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, AppError> {
    let unauthorized = || AppError::Unauthorized("missing or malformed bearer token".to_string());

    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(unauthorized)?
        .to_str()
        .map_err(|_| unauthorized())?;

    let token = value.strip_prefix("Bearer ").ok_or_else(unauthorized)?.trim();
    if token.is_empty() {
        return Err(unauthorized());
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, roles: &str, exp: i64) -> String {
        let claims = Claims {
            id: 7,
            username: "budi".to_string(),
            email: "budi@example.com".to_string(),
            phone: "0812".to_string(),
            roles: roles.to_string(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn in_an_hour() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_bearer(&headers).unwrap(), "abc");
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert!(extract_bearer(&headers).is_err());
    }

    #[test]
    fn validates_token_into_principal() {
        let validator = JwtValidator::new("secret");
        let principal = validator
            .validate(&token("secret", "admin", in_an_hour()))
            .unwrap()
            .into_principal();

        assert_eq!(principal.id, 7);
        assert_eq!(principal.username, "budi");
        assert!(principal.is_admin());
    }

    #[test]
    fn rejects_wrong_secret_and_expired_tokens() {
        let validator = JwtValidator::new("secret");
        assert!(validator.validate(&token("other", "user", in_an_hour())).is_err());

        let expired = chrono::Utc::now().timestamp() - 3600;
        assert!(validator.validate(&token("secret", "user", expired)).is_err());
    }
}
