use actix_web::{dev::Payload, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use std::future::{ready, Ready};

use crate::error::ApiError;
use crate::models::{AttachedFile, Id};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Staff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Numeric user id.
    pub sub: String,
    pub username: String,
    pub exp: usize,
    pub roles: Vec<Role>,
}

fn jwt_secret() -> Result<String, ApiError> {
    env::var("JWT_SECRET").map_err(|_| {
        tracing::error!("JWT_SECRET not set");
        ApiError::Internal
    })
}

/// Validate a JWT and return its claims.
fn decode_jwt(token: &str) -> Result<Claims, ApiError> {
    let secret = jwt_secret()?;
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|_| ApiError::Unauthorized)?;
    Ok(data.claims)
}

/// Extractor yielding the authenticated identity. Use `Option<Auth>` on
/// endpoints that also serve anonymous callers.
pub struct Auth(pub Claims);

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() else {
            return ready(Err(ApiError::Unauthorized));
        };
        let claims = decode_jwt(bearer.token()).and_then(|c| {
            // the subject must be a user id; anything else is a forged token shape
            c.sub.parse::<Id>().map(|_| c).map_err(|_| ApiError::Unauthorized)
        });
        ready(claims.map(Auth))
    }
}

impl Auth {
    pub fn user_id(&self) -> Id {
        // validated in `from_request`
        self.0.sub.parse().unwrap_or_default()
    }

    pub fn username(&self) -> &str {
        &self.0.username
    }

    pub fn is_staff(&self) -> bool {
        self.0.roles.iter().any(|r| matches!(r, Role::Staff))
    }
}

/// Reject callers lacking `$role` with a JSON 403 carrying `$msg`.
#[macro_export]
macro_rules! require_role {
    ($auth:expr, $role:pat, $msg:expr) => {
        if !$auth.0.roles.iter().any(|r| matches!(r, $role)) {
            return Err($crate::error::ApiError::forbidden($msg));
        }
    };
}

/// Staff may always act; otherwise only the owning record's author.
pub fn can_modify(auth: &Auth, owner: Option<Id>) -> bool {
    auth.is_staff() || owner == Some(auth.user_id())
}

/// Staff, the uploader, or the author of the record the file hangs off.
pub fn can_delete_file(auth: &Auth, file: &AttachedFile, owner_author: Option<Id>) -> bool {
    auth.is_staff() || file.uploaded_by == Some(auth.user_id()) || owner_author == Some(auth.user_id())
}

pub fn ensure_can_modify(auth: &Auth, owner: Option<Id>, what: &str) -> Result<(), ApiError> {
    if can_modify(auth, owner) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!("You do not have permission to modify this {what}")))
    }
}

/// Create a JWT for a user (24h lifetime).
pub fn create_jwt(user_id: Id, username: &str, roles: Vec<Role>) -> Result<String, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").unwrap_or_default();
    let expiration = (chrono::Utc::now() + chrono::Duration::hours(24)).timestamp() as usize;

    let claims = Claims { sub: user_id.to_string(), username: username.to_string(), exp: expiration, roles };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}
