use rocket::{serde::json::Json, Route, State};

use crate::error::{Error, Result};
use crate::model::api::{auth::AuthToken, suggestion::PushTokenRequest};
use crate::store::PushTokens;

pub fn routes() -> Vec<Route> {
    routes![register_push_token]
}

/// Register the caller's device for push notifications.
#[put("/notifications/token", data = "<request>", format = "json")]
async fn register_push_token(
    token: AuthToken,
    request: Json<PushTokenRequest>,
    push_tokens: &State<PushTokens>,
) -> Result<()> {
    let push_token = request.token.trim();
    if push_token.is_empty() {
        return Err(Error::Status(
            rocket::http::Status::BadRequest,
            "Push token must not be empty".to_string(),
        ));
    }

    push_tokens.set_token(token.identity(), push_token).await?;
    debug!("Registered push token for {}", token.identity());
    Ok(())
}
