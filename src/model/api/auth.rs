use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, TokenData, Validation};
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::common::identity::Identity;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// The verified identity of the caller.
///
/// Tokens are issued by the account service; this service only checks them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    identity: Identity,
}

impl AuthToken {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Verify a JWT and extract the identity it was issued to.
    pub fn decode(token: &str, config: &Config) -> Result<Self, Error> {
        let claims = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|data: TokenData<Claims>| data.claims)?;
        Ok(Self {
            identity: claims.sub,
        })
    }
}

/// Token claims: the member's identity plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    sub: Identity,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = Error;

    /// Get an [`AuthToken`] from the `Authorization: Bearer` header, falling
    /// back to the auth cookie.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = match req.rocket().state::<Config>() {
            Some(config) => config,
            None => {
                let err = Error::Status(
                    Status::InternalServerError,
                    "Application config is not managed".to_string(),
                );
                return Outcome::Failure((Status::InternalServerError, err));
            }
        };

        let bearer = req
            .headers()
            .get_one("Authorization")
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(str::to_string);
        let token = match bearer.or_else(|| {
            req.cookies()
                .get(AUTH_TOKEN_COOKIE)
                .map(|cookie| cookie.value().to_string())
        }) {
            Some(token) => token,
            None => {
                let err = Error::Unauthorized("No identity token provided".to_string());
                return Outcome::Failure((Status::Unauthorized, err));
            }
        };

        match Self::decode(token.trim(), config) {
            Ok(token) => Outcome::Success(token),
            Err(err) => Outcome::Failure((Status::Unauthorized, err)),
        }
    }
}
