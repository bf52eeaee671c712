use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::Router;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;

use crate::db::models::Ad;
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, Json, Path};
use crate::state::AppState;

const AD_COLUMNS: &str = "id, title, description, image_url, target_url, is_active, created_at";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
    pub target_url: Option<String>,
    pub is_active: Option<bool>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ads", get(list).post(create))
        .route("/ads/{id}", put(update).delete(remove))
}

fn ad_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ad> {
    Ok(Ad {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        image_url: row.get(3)?,
        target_url: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Ad>> {
    conn.query_row(
        &format!("SELECT {AD_COLUMNS} FROM ads WHERE id = ?1"),
        params![id],
        ad_from_row,
    )
    .optional()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<Ad>>> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {AD_COLUMNS} FROM ads WHERE is_active = 1 ORDER BY created_at DESC, rowid DESC"
    ))?;
    let ads = stmt
        .query_map([], ad_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Json(ads))
}

async fn create(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<AdInput>,
) -> AppResult<(StatusCode, Json<Ad>)> {
    if input.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title is required".into()));
    }
    let id = crate::db::new_id();
    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO ads (id, title, description, image_url, target_url, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            input.title.trim(),
            input.description.trim(),
            non_blank(&input.image_url),
            non_blank(&input.target_url),
            input.is_active.unwrap_or(true)
        ],
    )?;
    let ad = find(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok((StatusCode::CREATED, Json(ad)))
}

async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(input): Json<AdInput>,
) -> AppResult<Json<Ad>> {
    if input.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title is required".into()));
    }
    let conn = state.db.get()?;
    let current = find(&conn, &id)?.ok_or(AppError::NotFound)?;
    conn.execute(
        "UPDATE ads SET title = ?2, description = ?3, image_url = ?4, target_url = ?5, is_active = ?6
         WHERE id = ?1",
        params![
            id,
            input.title.trim(),
            input.description.trim(),
            non_blank(&input.image_url),
            non_blank(&input.target_url),
            input.is_active.unwrap_or(current.is_active)
        ],
    )?;
    let ad = find(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(ad))
}

async fn remove(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    if conn.execute("DELETE FROM ads WHERE id = ?1", params![id])? == 0 {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}
