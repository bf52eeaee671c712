use axum::extract::State;
use axum::http::StatusCode;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::auth::{password, referral, session};
use crate::db::{self, models::User};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Json};
use crate::state::AppState;
use crate::users::{self, points, NewUser};

// -- Request/Response types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub referral_code: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

// -- Handlers --

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }
    if !users::is_plausible_email(&req.email) {
        return Err(AppError::BadRequest("A valid email is required".into()));
    }
    password::validate_password(&req.password).map_err(AppError::BadRequest)?;
    let role = req.role.as_deref().unwrap_or("tenant");
    if !users::ROLES.contains(&role) {
        return Err(AppError::BadRequest(
            "Role must be tenant or landlord".into(),
        ));
    }

    let hash = password::hash_password(&req.password, state.config.auth.bcrypt_cost)?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;

    if users::email_taken(&tx, &req.email)? {
        tracing::debug!("Registration rejected: email already in use");
        return Err(email_taken());
    }

    let referrer = match req.referral_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => Some(
            referral::referrer_for_code(&tx, code)?
                .ok_or_else(|| AppError::BadRequest("Invalid referral code".into()))?,
        ),
        _ => None,
    };

    let code = referral::unique_code(&tx)?;
    let user_id = insert_user(
        &tx,
        &NewUser {
            name,
            email: &req.email,
            password_hash: &hash,
            role,
            is_admin: state.config.is_admin_email(&req.email),
            referral_code: &code,
            referred_by: referrer.as_deref(),
        },
    )?;

    if let Some(ref referrer_id) = referrer {
        points::credit(&tx, referrer_id, state.config.rewards.referral_bonus, "referral")?;
        points::credit(
            &tx,
            &user_id,
            state.config.rewards.signup_bonus,
            "referral_signup",
        )?;
    }

    let token = session::create_session(&tx, &user_id, state.config.auth.session_hours)?;
    let user = users::find_by_id(&tx, &user_id)?
        .ok_or_else(|| AppError::Internal("Registered user vanished".into()))?;
    tx.commit()?;

    tracing::info!(user_id = %user.id, role = %user.role, referred = referrer.is_some(), "User registered");
    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

fn email_taken() -> AppError {
    AppError::Conflict("User with this email already exists".into())
}

/// A concurrent registration can claim the email between the check and the
/// insert; the UNIQUE index catches it.
fn insert_user(conn: &Connection, new: &NewUser<'_>) -> AppResult<String> {
    users::insert(conn, new).map_err(|e| {
        if db::is_unique_violation(&e) {
            tracing::debug!("Registration rejected: email claimed concurrently");
            email_taken()
        } else {
            AppError::Database(e)
        }
    })
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let conn = state.db.get()?;

    let invalid = || AppError::InvalidCredentials("Invalid email or password".into());
    let (user, hash) = users::find_with_hash_by_email(&conn, &req.email)?.ok_or_else(invalid)?;
    if !password::verify_password(&req.password, &hash) {
        tracing::debug!(user_id = %user.id, "Login rejected: wrong password");
        return Err(invalid());
    }
    if user.is_banned {
        return Err(AppError::Forbidden("Account has been banned".into()));
    }

    let token = session::create_session(&conn, &user.id, state.config.auth.session_hours)?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(AuthResponse { user, token }))
}

pub async fn logout(State(state): State<AppState>, user: CurrentUser) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    session::delete_session(&conn, &user.token)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user<'a>(email: &'a str, code: &'a str) -> NewUser<'a> {
        NewUser {
            name: "Amani",
            email,
            password_hash: "x",
            role: "tenant",
            is_admin: false,
            referral_code: code,
            referred_by: None,
        }
    }

    #[test]
    fn duplicate_email_on_insert_is_a_conflict() {
        let (_tmp, pool) = crate::db::test_pool();
        let conn = pool.get().unwrap();
        insert_user(&conn, &new_user("amani@nyumba.test", "AMANI234")).unwrap();

        // Same address in another case, as a racing request would send it.
        let err = insert_user(&conn, &new_user("Amani@Nyumba.test", "AMANI567")).unwrap_err();
        match err {
            AppError::Conflict(msg) => assert_eq!(msg, "User with this email already exists"),
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
