//! Caller identity extraction. The auth layer in front of this service sets
//! `x-user-id` (required on protected routes) and `x-user-role`.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::domain::{RequestContext, Role};
use crate::error::BankError;

pub const USER_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
  S: Send + Sync,
{
  type Rejection = BankError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let user_id = parts
      .headers
      .get(USER_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .ok_or_else(|| BankError::Unauthorized("sign in required".into()))?;

    let role = match parts.headers.get(ROLE_HEADER).map(|v| v.to_str()) {
      None => Role::User,
      Some(Ok(r)) if r.eq_ignore_ascii_case("admin") => Role::Admin,
      Some(Ok(r)) if r.eq_ignore_ascii_case("user") => Role::User,
      Some(_) => return Err(BankError::Validation("unknown user role".into())),
    };

    Ok(match role {
      Role::Admin => RequestContext::admin(user_id),
      Role::User => RequestContext::user(user_id),
    })
  }
}
