use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::Router;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::auth::session;
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, Json, Path, Query};
use crate::listings;
use crate::state::AppState;
use crate::uploads;
use crate::users;

#[derive(Serialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub users: i64,
    pub landlords: i64,
    pub tenants: i64,
    pub listings: i64,
    pub available_listings: i64,
    pub occupied_listings: i64,
    pub messages: i64,
    pub pending_verifications: i64,
    pub active_subscriptions: i64,
    pub banned_users: i64,
}

#[derive(Deserialize)]
pub struct UserSearch {
    pub q: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/stats", get(stats))
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}/ban", post(ban))
        .route("/admin/users/{id}/unban", post(unban))
        .route("/admin/verification-requests", get(verification_requests))
        .route(
            "/admin/verification-requests/{id}/approve",
            post(approve_verification),
        )
        .route(
            "/admin/verification-requests/{id}/reject",
            post(reject_verification),
        )
        .route("/admin/listings/{id}", delete(delete_listing))
}

fn count(conn: &Connection, sql: &str) -> rusqlite::Result<i64> {
    conn.query_row(sql, [], |r| r.get(0))
}

fn collect_stats(conn: &Connection) -> rusqlite::Result<Stats> {
    Ok(Stats {
        users: count(conn, "SELECT COUNT(*) FROM users")?,
        landlords: count(conn, "SELECT COUNT(*) FROM users WHERE role = 'landlord'")?,
        tenants: count(conn, "SELECT COUNT(*) FROM users WHERE role = 'tenant'")?,
        listings: count(conn, "SELECT COUNT(*) FROM listings")?,
        available_listings: count(conn, "SELECT COUNT(*) FROM listings WHERE status = 'available'")?,
        occupied_listings: count(conn, "SELECT COUNT(*) FROM listings WHERE status = 'occupied'")?,
        messages: count(conn, "SELECT COUNT(*) FROM messages")?,
        pending_verifications: count(
            conn,
            "SELECT COUNT(*) FROM users WHERE verification_status = 'pending'",
        )?,
        active_subscriptions: count(
            conn,
            "SELECT COUNT(*) FROM users WHERE subscription_status = 'active'",
        )?,
        banned_users: count(conn, "SELECT COUNT(*) FROM users WHERE is_banned = 1")?,
    })
}

async fn stats(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Json<Stats>> {
    let conn = state.db.get()?;
    Ok(Json(collect_stats(&conn)?))
}

async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(search): Query<UserSearch>,
) -> AppResult<Json<Vec<User>>> {
    let conn = state.db.get()?;
    Ok(Json(users::search(&conn, search.q.as_deref())?))
}

async fn ban(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    if id == admin.id {
        return Err(AppError::BadRequest("You cannot ban yourself".into()));
    }
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    if !users::set_banned(&tx, &id, true)? {
        return Err(AppError::NotFound);
    }
    let revoked = session::delete_user_sessions(&tx, &id)?;
    let user = users::find_by_id(&tx, &id)?.ok_or(AppError::NotFound)?;
    tx.commit()?;

    tracing::info!(user_id = %id, admin_id = %admin.id, revoked, "User banned");
    Ok(Json(user))
}

async fn unban(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    let conn = state.db.get()?;
    if !users::set_banned(&conn, &id, false)? {
        return Err(AppError::NotFound);
    }
    tracing::info!(user_id = %id, admin_id = %admin.id, "User unbanned");
    let user = users::find_by_id(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(user))
}

async fn verification_requests(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<User>>> {
    let conn = state.db.get()?;
    Ok(Json(users::pending_verifications(&conn)?))
}

fn decide_verification(state: &AppState, id: &str, status: &str) -> AppResult<User> {
    let conn = state.db.get()?;
    let user = users::find_by_id(&conn, id)?.ok_or(AppError::NotFound)?;
    if user.verification_status != "pending" {
        return Err(AppError::BadRequest(
            "No pending verification request for this user".into(),
        ));
    }
    users::set_verification(&conn, id, status)?;
    users::find_by_id(&conn, id)?.ok_or(AppError::NotFound)
}

async fn approve_verification(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    let user = decide_verification(&state, &id, "approved")?;
    tracing::info!(user_id = %id, admin_id = %admin.id, "Verification approved");
    Ok(Json(user))
}

async fn reject_verification(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    let user = decide_verification(&state, &id, "rejected")?;
    tracing::info!(user_id = %id, admin_id = %admin.id, "Verification rejected");
    Ok(Json(user))
}

async fn delete_listing(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let deleted = {
        let conn = state.db.get()?;
        listings::delete(&conn, &id)?
    };
    if !deleted {
        return Err(AppError::NotFound);
    }
    uploads::remove_listing_dir(&state.config.uploads_path(), &id).await;
    tracing::info!(listing_id = %id, admin_id = %admin.id, "Listing removed by admin");
    Ok(StatusCode::NO_CONTENT)
}
