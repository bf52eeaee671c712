use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::db::models::{Listing, ListingImage, User};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Json, MaybeUser, Path, Query};
use crate::listings::geo::{self, Point};
use crate::listings::bulk::{self, RowError};
use crate::listings::{self, matching, ListingFilter, ListingInput, ListingPatch, MAX_IMAGES, STATUSES};
use crate::state::AppState;
use crate::uploads;

const IMAGE_FIELD: &str = "images";
const CSV_FIELD: &str = "file";

// --- Request/Response types ---

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyListing {
    #[serde(flatten)]
    pub listing: Listing,
    pub distance_km: f64,
}

#[derive(Serialize)]
pub struct Recommendation {
    #[serde(flatten)]
    pub listing: Listing,
    pub score: u32,
}

#[derive(Serialize)]
pub struct BulkUploadReport {
    pub created: usize,
    pub listings: Vec<Listing>,
    pub errors: Vec<RowError>,
}

#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/listings", get(list).post(create))
        .route("/listings/bulk", post(bulk_create))
        .route("/listings/mine", get(mine))
        .route("/listings/nearby", get(nearby))
        .route("/listings/recommendations", get(recommendations))
        .route(
            "/listings/{id}",
            get(show).put(update).delete(remove),
        )
        .route("/listings/{id}/status", patch(set_status))
        .route("/listings/{id}/images", post(upload_images))
        .route("/listings/{id}/images/{image_id}", delete(delete_image))
}

/// Load a listing the actor owns. Admins moderate through the admin routes.
fn owned_listing(conn: &rusqlite::Connection, id: &str, actor: &User) -> AppResult<Listing> {
    let listing = listings::find(conn, id)?.ok_or(AppError::NotFound)?;
    if listing.landlord_id != actor.id {
        tracing::debug!(listing_id = %id, user_id = %actor.id, "Listing mutation rejected: not owner");
        return Err(AppError::Forbidden(
            "Not authorized to modify this listing".into(),
        ));
    }
    Ok(listing)
}

// --- Handlers ---

async fn list(
    State(state): State<AppState>,
    Query(filter): Query<ListingFilter>,
) -> AppResult<Json<Vec<Listing>>> {
    let conn = state.db.get()?;
    Ok(Json(listings::search(&conn, &filter)?))
}

async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(mut input): Json<ListingInput>,
) -> AppResult<(StatusCode, Json<Listing>)> {
    if !user.is_landlord() && !user.is_admin {
        return Err(AppError::Forbidden(
            "Only landlords can create listings".into(),
        ));
    }
    input.validate().map_err(AppError::BadRequest)?;

    let conn = state.db.get()?;
    let id = listings::insert(&conn, &user.id, &input)?;
    let listing = listings::find(&conn, &id)?.ok_or(AppError::NotFound)?;
    tracing::info!(listing_id = %id, landlord_id = %user.id, "Listing created");
    Ok((StatusCode::CREATED, Json(listing)))
}

/// `POST /listings/bulk`: a CSV file in the `file` part. Valid rows are
/// created together; invalid ones come back in `errors` with their line.
async fn bulk_create(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<BulkUploadReport>)> {
    if !user.is_landlord() && !user.is_admin {
        return Err(AppError::Forbidden(
            "Only landlords can create listings".into(),
        ));
    }

    let mut data: Option<Bytes> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid upload: {e}")))?
    {
        if field.name() != Some(CSV_FIELD) {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid upload: {e}")))?;
        if bytes.len() > state.config.storage.max_upload_bytes {
            return Err(AppError::BadRequest(format!(
                "File exceeds the {} byte limit",
                state.config.storage.max_upload_bytes
            )));
        }
        data = Some(bytes);
    }
    let data = data.ok_or_else(|| AppError::BadRequest("No CSV file uploaded".into()))?;

    let parsed = bulk::parse(&data).map_err(AppError::BadRequest)?;
    if parsed.valid.is_empty() {
        let detail = parsed
            .errors
            .first()
            .map(|e| format!(" (row {}: {})", e.row, e.message))
            .unwrap_or_default();
        return Err(AppError::BadRequest(format!("No valid rows in CSV{detail}")));
    }

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    let mut ids = Vec::with_capacity(parsed.valid.len());
    for (_, input) in &parsed.valid {
        ids.push(listings::insert(&tx, &user.id, input)?);
    }
    tx.commit()?;

    let mut created = Vec::with_capacity(ids.len());
    for id in &ids {
        if let Some(listing) = listings::find(&conn, id)? {
            created.push(listing);
        }
    }
    tracing::info!(
        landlord_id = %user.id,
        created = created.len(),
        rejected = parsed.errors.len(),
        "Bulk listing upload"
    );
    Ok((
        StatusCode::CREATED,
        Json(BulkUploadReport {
            created: created.len(),
            listings: created,
            errors: parsed.errors,
        }),
    ))
}

async fn mine(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Vec<Listing>>> {
    let conn = state.db.get()?;
    Ok(Json(listings::by_landlord(&conn, &user.id)?))
}

async fn nearby(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> AppResult<Json<Vec<NearbyListing>>> {
    let center = Point::new(query.lat, query.lng).map_err(AppError::BadRequest)?;
    let radius = geo::clamp_radius(query.radius);

    let candidates = {
        let conn = state.db.get()?;
        listings::within_box(&conn, geo::bounding_box(center, radius))?
    };

    let mut results: Vec<NearbyListing> = candidates
        .into_iter()
        .filter_map(|listing| {
            let at = Point::new(listing.latitude?, listing.longitude?).ok()?;
            let distance_km = geo::haversine_km(center, at);
            (distance_km <= radius).then_some(NearbyListing {
                listing,
                distance_km,
            })
        })
        .collect();
    results.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    Ok(Json(results))
}

async fn recommendations(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Recommendation>>> {
    let conn = state.db.get()?;
    let prefs = crate::users::preferences(&conn, &user.id)?;
    let available = listings::available(&conn)?;

    let ranked: Vec<(Listing, u32)> = if prefs.is_empty() {
        available
            .into_iter()
            .take(matching::MAX_RECOMMENDATIONS)
            .map(|l| (l, 0))
            .collect()
    } else {
        matching::rank(available, &prefs)
    };

    Ok(Json(
        ranked
            .into_iter()
            .map(|(listing, score)| Recommendation { listing, score })
            .collect(),
    ))
}

async fn show(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<Listing>> {
    let conn = state.db.get()?;
    let listing = listings::find(&conn, &id)?.ok_or(AppError::NotFound)?;
    let is_owner = viewer.is_some_and(|v| v.id == listing.landlord_id);
    if is_owner {
        return Ok(Json(listing));
    }
    listings::record_view(&conn, &id)?;
    Ok(Json(Listing {
        views: listing.views + 1,
        ..listing
    }))
}

async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(patch): Json<ListingPatch>,
) -> AppResult<Json<Listing>> {
    let conn = state.db.get()?;
    let listing = owned_listing(&conn, &id, &user)?;

    let mut input = ListingInput::patched(&listing, patch);
    input.validate().map_err(AppError::BadRequest)?;
    listings::update(&conn, &id, &input)?;

    let listing = listings::find(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(listing))
}

async fn remove(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    {
        let conn = state.db.get()?;
        owned_listing(&conn, &id, &user)?;
        listings::delete(&conn, &id)?;
    }
    uploads::remove_listing_dir(&state.config.uploads_path(), &id).await;
    tracing::info!(listing_id = %id, "Listing deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn set_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<StatusUpdate>,
) -> AppResult<Json<Listing>> {
    let status = req.status.trim().to_ascii_lowercase();
    if !STATUSES.contains(&status.as_str()) {
        return Err(AppError::BadRequest(
            "Status must be available or occupied".into(),
        ));
    }

    let conn = state.db.get()?;
    owned_listing(&conn, &id, &user)?;
    listings::set_status(&conn, &id, &status)?;
    let listing = listings::find(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(listing))
}

async fn upload_images(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Vec<ListingImage>>)> {
    let existing = {
        let conn = state.db.get()?;
        owned_listing(&conn, &id, &user)?;
        listings::image_count(&conn, &id)?
    };

    let mut files: Vec<(String, Bytes)> = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid upload: {e}")))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let content_type = uploads::content_type_of(field.content_type(), field.file_name());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid upload: {e}")))?;
        let accepted = uploads::validate(content_type.as_deref(), bytes.len(), &state.config.storage)
            .map_err(AppError::BadRequest)?
            .to_string();
        files.push((accepted, bytes));
    }

    if files.is_empty() {
        return Err(AppError::BadRequest("No images uploaded".into()));
    }
    if existing + files.len() as i64 > MAX_IMAGES {
        return Err(AppError::BadRequest(format!(
            "A listing can have at most {MAX_IMAGES} images"
        )));
    }

    let root = state.config.uploads_path();
    let subdir = format!("listings/{id}");
    let mut stored = Vec::with_capacity(files.len());
    for (content_type, bytes) in &files {
        match uploads::store(&root, &subdir, bytes, content_type).await {
            Ok(file) => stored.push(file),
            Err(e) => {
                discard(&stored).await;
                return Err(e.into());
            }
        }
    }

    let recorded = (|| -> AppResult<()> {
        let mut conn = state.db.get()?;
        let tx = conn.transaction()?;
        if listings::image_count(&tx, &id)? + stored.len() as i64 > MAX_IMAGES {
            return Err(AppError::BadRequest(format!(
                "A listing can have at most {MAX_IMAGES} images"
            )));
        }
        for file in &stored {
            listings::insert_image(
                &tx,
                &id,
                &file.id,
                &file.path.to_string_lossy(),
                &file.url,
                &file.content_type,
            )?;
        }
        tx.commit()?;
        Ok(())
    })();
    if let Err(e) = recorded {
        discard(&stored).await;
        return Err(e);
    }

    tracing::info!(listing_id = %id, count = stored.len(), "Listing images uploaded");
    let conn = state.db.get()?;
    Ok((StatusCode::CREATED, Json(listings::images(&conn, &id)?)))
}

async fn discard(files: &[uploads::StoredFile]) {
    for file in files {
        if let Err(e) = uploads::remove(&file.path).await {
            tracing::warn!("Failed to remove {}: {}", file.path.display(), e);
        }
    }
}

async fn delete_image(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, image_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let path = {
        let conn = state.db.get()?;
        owned_listing(&conn, &id, &user)?;
        listings::delete_image(&conn, &id, &image_id)?.ok_or(AppError::NotFound)?
    };
    uploads::remove(std::path::Path::new(&path)).await?;
    Ok(StatusCode::NO_CONTENT)
}
