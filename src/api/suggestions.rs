use rocket::{serde::json::Json, Route, State};

use crate::consensus::ConsensusEngine;
use crate::error::{Error, Result};
use crate::model::{
    api::{
        auth::AuthToken,
        suggestion::{StatusMessage, SuggestRequest, SuggestionDescription},
    },
    mongodb::Id,
};

pub fn routes() -> Vec<Route> {
    routes![
        list_suggestions,
        suggest,
        remove_suggestion,
        vote,
        unvote,
        set_availability,
    ]
}

#[get("/groups/<group_id>/suggestions")]
async fn list_suggestions(
    token: AuthToken,
    group_id: Id,
    engine: &State<ConsensusEngine>,
) -> Result<Json<Vec<SuggestionDescription>>> {
    let suggestions = engine.list_suggestions(group_id, token.identity()).await?;
    Ok(Json(suggestions.into_iter().map(Into::into).collect()))
}

#[post("/groups/<group_id>/suggestions", data = "<request>", format = "json")]
async fn suggest(
    token: AuthToken,
    group_id: Id,
    request: Json<SuggestRequest>,
    engine: &State<ConsensusEngine>,
) -> Result<Json<StatusMessage>> {
    // An ID that can't exist can't be in the catalog either.
    let restaurant_id = request.restaurant_id.parse::<Id>().map_err(|_| {
        Error::not_found(format!("Restaurant with ID '{}'", request.restaurant_id))
    })?;

    let suggestion = engine
        .suggest(group_id, restaurant_id, token.identity())
        .await?;
    Ok(Json(StatusMessage::new(
        "Restaurant suggested to the group",
        suggestion.id,
    )))
}

#[delete("/groups/<group_id>/suggestions/<suggestion_id>")]
async fn remove_suggestion(
    token: AuthToken,
    group_id: Id,
    suggestion_id: Id,
    engine: &State<ConsensusEngine>,
) -> Result<Json<StatusMessage>> {
    engine
        .remove_suggestion(group_id, suggestion_id, token.identity())
        .await?;
    Ok(Json(StatusMessage::new("Suggestion removed", suggestion_id)))
}

#[post("/groups/<group_id>/suggestions/<suggestion_id>/vote")]
async fn vote(
    token: AuthToken,
    group_id: Id,
    suggestion_id: Id,
    engine: &State<ConsensusEngine>,
) -> Result<Json<StatusMessage>> {
    let suggestion = engine
        .vote(group_id, suggestion_id, token.identity())
        .await?;
    let message = if suggestion.closed {
        "Vote recorded, the group is now choosing a date"
    } else {
        "Vote recorded"
    };
    Ok(Json(StatusMessage::new(message, suggestion_id)))
}

#[delete("/groups/<group_id>/suggestions/<suggestion_id>/vote")]
async fn unvote(
    token: AuthToken,
    group_id: Id,
    suggestion_id: Id,
    engine: &State<ConsensusEngine>,
) -> Result<Json<StatusMessage>> {
    engine
        .unvote(group_id, suggestion_id, token.identity())
        .await?;
    Ok(Json(StatusMessage::new("Vote withdrawn", suggestion_id)))
}

#[put(
    "/groups/<group_id>/suggestions/<suggestion_id>/availability",
    data = "<dates>",
    format = "json"
)]
async fn set_availability(
    token: AuthToken,
    group_id: Id,
    suggestion_id: Id,
    dates: Json<Vec<String>>,
    engine: &State<ConsensusEngine>,
) -> Result<Json<StatusMessage>> {
    let suggestion = engine
        .set_availability(group_id, suggestion_id, token.identity(), &dates.0)
        .await?;
    let message = match suggestion.locked_date {
        Some(date) => format!("Availability saved, the visit is on {date}"),
        None => "Availability saved".to_string(),
    };
    Ok(Json(StatusMessage::new(message, suggestion_id)))
}
