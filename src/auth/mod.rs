use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::{errors::ServiceError, AppState};

pub mod policy;

pub use policy::{authorize, Action, Ownership};

/// Role carried in the bearer token. Vendors additionally carry the vendor
/// id their catalog rows belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Customer,
    Vendor,
    Admin,
}

/// JWT claims for the marketplace API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user id
    pub sub: Uuid,
    pub role: Role,
    /// Set for vendor tokens only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<Uuid>,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated principal resolved from the bearer credential.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
    pub vendor_id: Option<Uuid>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// The vendor id this principal acts for, if it is a vendor token.
    pub fn acting_vendor_id(&self) -> Result<Uuid, ServiceError> {
        self.vendor_id.ok_or_else(|| {
            ServiceError::Forbidden("vendor credential without a vendor id".to_string())
        })
    }
}

/// Issue a signed access token. The login flow lives outside this
/// subsystem; this is used by dev tooling and the test harness.
pub fn issue_token(
    user_id: Uuid,
    role: Role,
    vendor_id: Option<Uuid>,
    secret: &str,
    ttl_secs: i64,
) -> Result<String, ServiceError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        role,
        vendor_id,
        iat: now,
        exp: now + ttl_secs,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("token signing failed: {e}")))
}

fn decode_token(token: &str, secret: &str) -> Result<Claims, ServiceError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| ServiceError::Unauthorized(format!("invalid bearer token: {e}")))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ServiceError::Unauthorized("missing Authorization header".to_string())
            })?;

        let token = header_value.strip_prefix("Bearer ").ok_or_else(|| {
            ServiceError::Unauthorized("expected a Bearer credential".to_string())
        })?;

        let claims = decode_token(token.trim(), &app_state.config.jwt_secret)?;
        Ok(AuthUser {
            user_id: claims.sub,
            role: claims.role,
            vendor_id: claims.vendor_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-test-secret-test-secret-test-secret-test-secret-1234";

    #[test]
    fn round_trips_vendor_claims() {
        let user = Uuid::new_v4();
        let vendor = Uuid::new_v4();
        let token = issue_token(user, Role::Vendor, Some(vendor), SECRET, 3600).unwrap();
        let claims = decode_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.role, Role::Vendor);
        assert_eq!(claims.vendor_id, Some(vendor));
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let token = issue_token(Uuid::new_v4(), Role::Customer, None, SECRET, 3600).unwrap();
        assert!(decode_token(&token, "another-secret-another-secret-another-secret-12").is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let token = issue_token(Uuid::new_v4(), Role::Customer, None, SECRET, -120).unwrap();
        assert!(decode_token(&token, SECRET).is_err());
    }
}
