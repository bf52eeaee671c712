use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::auth::{handlers, password};
use crate::db::models::{Listing, PointsEntry, PublicUser, TenantPreferences, User};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Json, Path};
use crate::listings::{self, PROPERTY_TYPES};
use crate::state::AppState;
use crate::users::{self, points, ProfileChanges, ROLES};

const MAX_BIO_LEN: usize = 1000;

// --- Request/Response types ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
    pub current_password: Option<String>,
}

#[derive(Serialize)]
pub struct PointsResponse {
    pub points: i64,
    pub history: Vec<PointsEntry>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralSummary {
    pub referral_code: String,
    pub referred_count: i64,
}

#[derive(Deserialize)]
pub struct PasswordConfirmation {
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionScheduled {
    pub deletion_scheduled_at: String,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(handlers::register))
        .route("/users/login", post(handlers::login))
        .route("/users/logout", post(handlers::logout))
        .route("/users/profile", get(profile).put(update_profile))
        .route("/users/preferences", get(preferences).put(save_preferences))
        .route("/users/saved-listings", get(saved_listings))
        .route(
            "/users/saved-listings/{listing_id}",
            post(save_listing).delete(unsave_listing),
        )
        .route("/users/points", get(points_summary))
        .route("/users/referrals", get(referrals))
        .route("/users/verification-request", post(request_verification))
        .route("/users/delete-account", post(delete_account))
        .route("/users/cancel-deletion", post(cancel_deletion))
        .route("/users/{id}", get(public_profile))
}

// --- Handlers ---

async fn profile(user: CurrentUser) -> Json<User> {
    Json(user.user)
}

/// Optional text field: absent keeps the old value, blank clears it.
fn merge_optional(update: Option<String>, current: &Option<String>) -> Option<String> {
    match update {
        Some(value) => {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        None => current.clone(),
    }
}

async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ProfileUpdate>,
) -> AppResult<Json<User>> {
    let name = match req.name.as_deref().map(str::trim) {
        Some("") => return Err(AppError::BadRequest("Name cannot be empty".into())),
        Some(name) => name.to_string(),
        None => user.name.clone(),
    };
    let role = match req.role.as_deref().map(str::trim) {
        Some(role) if !ROLES.contains(&role) => {
            return Err(AppError::BadRequest(
                "Role must be tenant or landlord".into(),
            ))
        }
        Some(role) => role.to_string(),
        None => user.role.clone(),
    };
    let bio = merge_optional(req.bio, &user.bio);
    if bio.as_ref().is_some_and(|b| b.chars().count() > MAX_BIO_LEN) {
        return Err(AppError::BadRequest(format!(
            "Bio must be {MAX_BIO_LEN} characters or less"
        )));
    }
    let phone = merge_optional(req.phone, &user.phone);
    let avatar_url = merge_optional(req.avatar_url, &user.avatar_url);

    let new_hash = match req.password {
        Some(ref new_password) => {
            password::validate_password(new_password).map_err(AppError::BadRequest)?;
            let current = req.current_password.as_deref().ok_or_else(|| {
                AppError::BadRequest("Current password is required".into())
            })?;
            let stored = {
                let conn = state.db.get()?;
                users::password_hash(&conn, &user.id)?
            };
            if !password::verify_password(current, &stored) {
                return Err(AppError::BadRequest("Current password is incorrect".into()));
            }
            Some(password::hash_password(
                new_password,
                state.config.auth.bcrypt_cost,
            )?)
        }
        None => None,
    };

    let conn = state.db.get()?;
    users::update_profile(
        &conn,
        &user.id,
        &ProfileChanges {
            name: &name,
            phone: phone.as_deref(),
            bio: bio.as_deref(),
            avatar_url: avatar_url.as_deref(),
            role: &role,
        },
    )?;
    if let Some(hash) = new_hash {
        users::set_password(&conn, &user.id, &hash)?;
        tracing::info!(user_id = %user.id, "Password changed");
    }

    let updated = users::find_by_id(&conn, &user.id)?.ok_or(AppError::NotFound)?;
    Ok(Json(updated))
}

async fn public_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PublicUser>> {
    let conn = state.db.get()?;
    let user = users::find_by_id(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(user.public()))
}

async fn preferences(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<TenantPreferences>> {
    let conn = state.db.get()?;
    Ok(Json(users::preferences(&conn, &user.id)?))
}

async fn save_preferences(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(mut prefs): Json<TenantPreferences>,
) -> AppResult<Json<TenantPreferences>> {
    if prefs.max_rent.is_some_and(|r| r < 0) || prefs.min_bedrooms.is_some_and(|b| b < 0) {
        return Err(AppError::BadRequest(
            "Preferences cannot be negative".into(),
        ));
    }
    prefs.property_type = prefs
        .property_type
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty());
    if let Some(ref kind) = prefs.property_type {
        if !PROPERTY_TYPES.contains(&kind.as_str()) {
            return Err(AppError::BadRequest(format!(
                "Property type must be one of: {}",
                PROPERTY_TYPES.join(", ")
            )));
        }
    }
    prefs.location = prefs
        .location
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty());

    let conn = state.db.get()?;
    users::save_preferences(&conn, &user.id, &prefs)?;
    Ok(Json(prefs))
}

async fn saved_listings(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Listing>>> {
    let conn = state.db.get()?;
    Ok(Json(listings::saved_by_user(&conn, &user.id)?))
}

async fn save_listing(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(listing_id): Path<String>,
) -> AppResult<Json<Vec<Listing>>> {
    let conn = state.db.get()?;
    if listings::find(&conn, &listing_id)?.is_none() {
        return Err(AppError::NotFound);
    }
    listings::save_for_user(&conn, &user.id, &listing_id)?;
    Ok(Json(listings::saved_by_user(&conn, &user.id)?))
}

async fn unsave_listing(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(listing_id): Path<String>,
) -> AppResult<Json<Vec<Listing>>> {
    let conn = state.db.get()?;
    listings::unsave_for_user(&conn, &user.id, &listing_id)?;
    Ok(Json(listings::saved_by_user(&conn, &user.id)?))
}

async fn points_summary(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<PointsResponse>> {
    let conn = state.db.get()?;
    Ok(Json(PointsResponse {
        points: points::balance(&conn, &user.id)?,
        history: points::history(&conn, &user.id)?,
    }))
}

async fn referrals(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<ReferralSummary>> {
    let conn = state.db.get()?;
    Ok(Json(ReferralSummary {
        referred_count: users::referral_count(&conn, &user.id)?,
        referral_code: user.user.referral_code,
    }))
}

async fn request_verification(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<User>> {
    if user.subscription_status != "active" {
        return Err(AppError::Forbidden(
            "An active subscription is required for verification".into(),
        ));
    }
    match user.verification_status.as_str() {
        "pending" => {
            return Err(AppError::Conflict(
                "Verification request already pending".into(),
            ))
        }
        "approved" => return Err(AppError::Conflict("Account is already verified".into())),
        _ => {}
    }

    let conn = state.db.get()?;
    users::set_verification(&conn, &user.id, "pending")?;
    tracing::info!(user_id = %user.id, "Verification requested");
    let updated = users::find_by_id(&conn, &user.id)?.ok_or(AppError::NotFound)?;
    Ok(Json(updated))
}

async fn delete_account(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<PasswordConfirmation>,
) -> AppResult<Json<DeletionScheduled>> {
    let conn = state.db.get()?;
    let stored = users::password_hash(&conn, &user.id)?;
    if !password::verify_password(&req.password, &stored) {
        return Err(AppError::BadRequest("Password is incorrect".into()));
    }

    let at = users::schedule_deletion(&conn, &user.id, state.config.accounts.deletion_grace_days)?;
    tracing::info!(user_id = %user.id, deletion_scheduled_at = %at, "Account deletion scheduled");
    Ok(Json(DeletionScheduled {
        deletion_scheduled_at: at,
    }))
}

async fn cancel_deletion(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    if !users::cancel_deletion(&conn, &user.id)? {
        return Err(AppError::BadRequest(
            "No account deletion is scheduled".into(),
        ));
    }
    tracing::info!(user_id = %user.id, "Account deletion cancelled");
    Ok(StatusCode::NO_CONTENT)
}
