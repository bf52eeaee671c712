use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::db::models::{ConversationSummary, Message};
use crate::error::AppResult;
use crate::extractors::{CurrentUser, Json, Path};
use crate::state::AppState;

// --- Request/Response types ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenConversation {
    pub user_id: String,
    pub listing_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    #[serde(alias = "message")]
    pub text: String,
    pub listing_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    pub unread_count: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkedRead {
    pub marked: usize,
    pub unread_count: i64,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/messages/conversations",
            get(conversations).post(open_conversation),
        )
        .route("/messages/conversations/{id}", get(messages))
        .route("/messages/conversations/read/{id}", post(mark_read))
        .route("/messages/send/{recipient_id}", post(send))
        .route("/messages/unread-count", get(unread_count))
}

// --- Handlers ---

async fn conversations(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<ConversationSummary>>> {
    Ok(Json(state.chat.conversations(&user.id).await?))
}

async fn open_conversation(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<OpenConversation>,
) -> AppResult<Json<ConversationSummary>> {
    let summary = state
        .chat
        .open_conversation(&user.id, req.user_id.trim(), req.listing_id.as_deref())
        .await?;
    Ok(Json(summary))
}

async fn messages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(state.chat.messages(&id, &user.id).await?))
}

async fn send(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(recipient_id): Path<String>,
    Json(req): Json<SendMessage>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let message = state
        .chat
        .send(&user.id, &recipient_id, &req.text, req.listing_id.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<MarkedRead>> {
    let receipt = state.chat.mark_read(&id, &user.id).await?;
    Ok(Json(MarkedRead {
        marked: receipt.marked,
        unread_count: receipt.unread_total,
    }))
}

async fn unread_count(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<UnreadCount>> {
    Ok(Json(UnreadCount {
        unread_count: state.chat.unread_count(&user.id).await?,
    }))
}
