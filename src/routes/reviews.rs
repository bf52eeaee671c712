use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::db::{self, models::Review};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Json, Path};
use crate::listings;
use crate::state::AppState;

const MAX_COMMENT_LEN: usize = 1000;

#[derive(Deserialize)]
pub struct CreateReview {
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewList {
    pub reviews: Vec<Review>,
    pub average_rating: f64,
    pub count: usize,
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/reviews/{listing_id}",
        get(list).post(create).delete(remove),
    )
}

fn reviews_for(conn: &Connection, listing_id: &str) -> rusqlite::Result<Vec<Review>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.listing_id, r.user_id, u.name, r.rating, r.comment, r.created_at
         FROM reviews r JOIN users u ON u.id = r.user_id
         WHERE r.listing_id = ?1
         ORDER BY r.created_at DESC, r.rowid DESC",
    )?;
    let reviews = stmt
        .query_map(params![listing_id], |row| {
            Ok(Review {
                id: row.get(0)?,
                listing_id: row.get(1)?,
                user_id: row.get(2)?,
                user_name: row.get(3)?,
                rating: row.get(4)?,
                comment: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(reviews)
}

/// Mean rating rounded to one decimal place; 0 when there are no reviews.
fn average_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let sum: i64 = reviews.iter().map(|r| r.rating).sum();
    let mean = sum as f64 / reviews.len() as f64;
    (mean * 10.0).round() / 10.0
}

async fn list(
    State(state): State<AppState>,
    Path(listing_id): Path<String>,
) -> AppResult<Json<ReviewList>> {
    let conn = state.db.get()?;
    let reviews = reviews_for(&conn, &listing_id)?;
    Ok(Json(ReviewList {
        average_rating: average_rating(&reviews),
        count: reviews.len(),
        reviews,
    }))
}

async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(listing_id): Path<String>,
    Json(req): Json<CreateReview>,
) -> AppResult<(StatusCode, Json<Review>)> {
    if !(1..=5).contains(&req.rating) {
        return Err(AppError::BadRequest(
            "Rating must be between 1 and 5".into(),
        ));
    }
    let comment = req.comment.trim();
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::BadRequest(format!(
            "Comment must be {MAX_COMMENT_LEN} characters or less"
        )));
    }

    let conn = state.db.get()?;
    let listing = listings::find(&conn, &listing_id)?.ok_or(AppError::NotFound)?;
    if listing.landlord_id == user.id {
        return Err(AppError::Forbidden(
            "You cannot review your own listing".into(),
        ));
    }

    let id = db::new_id();
    conn.execute(
        "INSERT INTO reviews (id, listing_id, user_id, rating, comment) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, listing_id, user.id, req.rating, comment],
    )
    .map_err(|e| {
        if db::is_unique_violation(&e) {
            AppError::Conflict("You have already reviewed this listing".into())
        } else {
            AppError::Database(e)
        }
    })?;

    let review = Review {
        id,
        listing_id,
        user_id: user.id.clone(),
        user_name: user.name.clone(),
        rating: req.rating,
        comment: comment.to_string(),
        created_at: db::now_timestamp(),
    };
    Ok((StatusCode::CREATED, Json(review)))
}

async fn remove(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(listing_id): Path<String>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    let deleted = conn.execute(
        "DELETE FROM reviews WHERE listing_id = ?1 AND user_id = ?2",
        params![listing_id, user.id],
    )?;
    if deleted == 0 {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(rating: i64) -> Review {
        Review {
            id: String::new(),
            listing_id: String::new(),
            user_id: String::new(),
            user_name: String::new(),
            rating,
            comment: String::new(),
            created_at: String::new(),
        }
    }

    #[test]
    fn average_is_rounded_to_one_decimal() {
        assert_eq!(average_rating(&[]), 0.0);
        assert_eq!(average_rating(&[review(5), review(4), review(4)]), 4.3);
        assert_eq!(average_rating(&[review(1), review(2)]), 1.5);
    }
}
