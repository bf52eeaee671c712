use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Router;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::models::Reward;
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, CurrentUser, Json, Path};
use crate::state::AppState;
use crate::users::points;

const REWARD_COLUMNS: &str = "id, title, description, points_cost, is_active, created_at";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub points_cost: i64,
    pub is_active: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub id: String,
    pub reward_id: String,
    pub points_spent: i64,
    pub points: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rewards", get(list).post(create))
        .route("/rewards/{id}", put(update).delete(remove))
        .route("/rewards/{id}/redeem", post(redeem))
}

fn reward_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reward> {
    Ok(Reward {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        points_cost: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Reward>> {
    conn.query_row(
        &format!("SELECT {REWARD_COLUMNS} FROM rewards WHERE id = ?1"),
        params![id],
        reward_from_row,
    )
    .optional()
}

fn validate(input: &RewardInput) -> AppResult<()> {
    if input.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title is required".into()));
    }
    if input.points_cost <= 0 {
        return Err(AppError::BadRequest(
            "Points cost must be positive".into(),
        ));
    }
    Ok(())
}

async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<Reward>>> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {REWARD_COLUMNS} FROM rewards WHERE is_active = 1 ORDER BY points_cost ASC, rowid ASC"
    ))?;
    let rewards = stmt
        .query_map([], reward_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Json(rewards))
}

async fn create(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<RewardInput>,
) -> AppResult<(StatusCode, Json<Reward>)> {
    validate(&input)?;
    let id = crate::db::new_id();
    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO rewards (id, title, description, points_cost, is_active) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id,
            input.title.trim(),
            input.description.trim(),
            input.points_cost,
            input.is_active.unwrap_or(true)
        ],
    )?;
    let reward = find(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok((StatusCode::CREATED, Json(reward)))
}

async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(input): Json<RewardInput>,
) -> AppResult<Json<Reward>> {
    validate(&input)?;
    let conn = state.db.get()?;
    let current = find(&conn, &id)?.ok_or(AppError::NotFound)?;
    conn.execute(
        "UPDATE rewards SET title = ?2, description = ?3, points_cost = ?4, is_active = ?5 WHERE id = ?1",
        params![
            id,
            input.title.trim(),
            input.description.trim(),
            input.points_cost,
            input.is_active.unwrap_or(current.is_active)
        ],
    )?;
    let reward = find(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(reward))
}

async fn remove(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    if conn.execute("DELETE FROM rewards WHERE id = ?1", params![id])? == 0 {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Spend points on a reward. The balance check and the debit share a
/// transaction so concurrent redemptions cannot overdraw the ledger.
async fn redeem(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<(StatusCode, Json<Redemption>)> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    let reward = find(&tx, &id)?
        .filter(|r| r.is_active)
        .ok_or(AppError::NotFound)?;
    let balance = points::balance(&tx, &user.id)?;
    if balance < reward.points_cost {
        tracing::debug!(user_id = %user.id, reward_id = %id, balance, "Redemption rejected");
        return Err(AppError::BadRequest("Insufficient points".into()));
    }

    points::credit(&tx, &user.id, -reward.points_cost, "redeem")?;
    let redemption_id = crate::db::new_id();
    tx.execute(
        "INSERT INTO reward_redemptions (id, reward_id, user_id, points_spent) VALUES (?1, ?2, ?3, ?4)",
        params![redemption_id, reward.id, user.id, reward.points_cost],
    )?;
    let remaining = points::balance(&tx, &user.id)?;
    tx.commit()?;

    tracing::info!(user_id = %user.id, reward_id = %reward.id, "Reward redeemed");
    Ok((
        StatusCode::CREATED,
        Json(Redemption {
            id: redemption_id,
            reward_id: reward.id,
            points_spent: reward.points_cost,
            points: remaining,
        }),
    ))
}
