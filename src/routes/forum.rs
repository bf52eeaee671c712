use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::Router;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::models::{ForumPost, ForumReply, User};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Json, Path};
use crate::state::AppState;

const MAX_TITLE_LEN: usize = 200;
const MAX_BODY_LEN: usize = 5000;

const POST_SELECT: &str = "SELECT p.id, p.author_id, u.name, p.title, p.body, p.category, \
     (SELECT COUNT(*) FROM forum_replies r WHERE r.post_id = p.id), p.created_at, p.updated_at \
     FROM forum_posts p JOIN users u ON u.id = p.author_id";

// --- Request/Response types ---

#[derive(Deserialize)]
pub struct CreatePost {
    pub title: String,
    pub body: String,
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateReply {
    pub body: String,
}

#[derive(Serialize)]
pub struct PostWithReplies {
    #[serde(flatten)]
    pub post: ForumPost,
    pub replies: Vec<ForumReply>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/forum/posts", get(list_posts).post(create_post))
        .route(
            "/forum/posts/{id}",
            get(show_post).put(update_post).delete(delete_post),
        )
        .route("/forum/posts/{id}/replies", post(create_reply))
        .route("/forum/replies/{id}", delete(delete_reply))
}

// --- Queries ---

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ForumPost> {
    Ok(ForumPost {
        id: row.get(0)?,
        author_id: row.get(1)?,
        author_name: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        category: row.get(5)?,
        reply_count: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn find_post(conn: &Connection, id: &str) -> rusqlite::Result<Option<ForumPost>> {
    conn.query_row(
        &format!("{POST_SELECT} WHERE p.id = ?1"),
        params![id],
        post_from_row,
    )
    .optional()
}

fn replies_for(conn: &Connection, post_id: &str) -> rusqlite::Result<Vec<ForumReply>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.post_id, r.author_id, u.name, r.body, r.created_at
         FROM forum_replies r JOIN users u ON u.id = r.author_id
         WHERE r.post_id = ?1
         ORDER BY r.created_at ASC, r.rowid ASC",
    )?;
    let replies = stmt
        .query_map(params![post_id], |row| {
            Ok(ForumReply {
                id: row.get(0)?,
                post_id: row.get(1)?,
                author_id: row.get(2)?,
                author_name: row.get(3)?,
                body: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(replies)
}

fn validated_text(value: &str, field: &str, max: usize) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} cannot be empty")));
    }
    if value.chars().count() > max {
        return Err(AppError::BadRequest(format!(
            "{field} must be {max} characters or less"
        )));
    }
    Ok(value.to_string())
}

fn category_or_default(category: Option<&str>) -> String {
    category
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "general".to_string())
}

fn can_moderate(author_id: &str, actor: &User) -> bool {
    author_id == actor.id || actor.is_admin
}

// --- Handlers ---

async fn list_posts(State(state): State<AppState>) -> AppResult<Json<Vec<ForumPost>>> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(&format!(
        "{POST_SELECT} ORDER BY p.created_at DESC, p.rowid DESC"
    ))?;
    let posts = stmt
        .query_map([], post_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Json(posts))
}

async fn show_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PostWithReplies>> {
    let conn = state.db.get()?;
    let post = find_post(&conn, &id)?.ok_or(AppError::NotFound)?;
    let replies = replies_for(&conn, &id)?;
    Ok(Json(PostWithReplies { post, replies }))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreatePost>,
) -> AppResult<(StatusCode, Json<ForumPost>)> {
    let title = validated_text(&req.title, "Title", MAX_TITLE_LEN)?;
    let body = validated_text(&req.body, "Body", MAX_BODY_LEN)?;
    let category = category_or_default(req.category.as_deref());

    let id = crate::db::new_id();
    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO forum_posts (id, author_id, title, body, category) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, user.id, title, body, category],
    )?;
    let post = find_post(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdatePost>,
) -> AppResult<Json<ForumPost>> {
    let conn = state.db.get()?;
    let post = find_post(&conn, &id)?.ok_or(AppError::NotFound)?;
    if post.author_id != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to edit this post".into(),
        ));
    }

    let title = match req.title {
        Some(ref t) => validated_text(t, "Title", MAX_TITLE_LEN)?,
        None => post.title,
    };
    let body = match req.body {
        Some(ref b) => validated_text(b, "Body", MAX_BODY_LEN)?,
        None => post.body,
    };
    let category = match req.category {
        Some(ref c) => category_or_default(Some(c)),
        None => post.category,
    };

    conn.execute(
        "UPDATE forum_posts SET title = ?2, body = ?3, category = ?4,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
        params![id, title, body, category],
    )?;
    let post = find_post(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(post))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    let author_id: String = conn
        .query_row(
            "SELECT author_id FROM forum_posts WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .map_err(AppError::not_found_or)?;

    if !can_moderate(&author_id, &user) {
        return Err(AppError::Forbidden(
            "Not authorized to delete this post".into(),
        ));
    }

    conn.execute("DELETE FROM forum_posts WHERE id = ?1", params![id])?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_reply(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
    Json(req): Json<CreateReply>,
) -> AppResult<(StatusCode, Json<ForumReply>)> {
    let body = validated_text(&req.body, "Body", MAX_BODY_LEN)?;

    let conn = state.db.get()?;
    if find_post(&conn, &post_id)?.is_none() {
        return Err(AppError::NotFound);
    }
    let id = crate::db::new_id();
    conn.execute(
        "INSERT INTO forum_replies (id, post_id, author_id, body) VALUES (?1, ?2, ?3, ?4)",
        params![id, post_id, user.id, body],
    )?;

    let reply = ForumReply {
        id,
        post_id,
        author_id: user.id.clone(),
        author_name: user.name.clone(),
        body,
        created_at: crate::db::now_timestamp(),
    };
    Ok((StatusCode::CREATED, Json(reply)))
}

async fn delete_reply(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    let author_id: String = conn
        .query_row(
            "SELECT author_id FROM forum_replies WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .map_err(AppError::not_found_or)?;

    if !can_moderate(&author_id, &user) {
        return Err(AppError::Forbidden(
            "Not authorized to delete this reply".into(),
        ));
    }

    conn.execute("DELETE FROM forum_replies WHERE id = ?1", params![id])?;
    Ok(StatusCode::NO_CONTENT)
}
