pub mod bulk;
pub mod filter;
pub mod geo;
pub mod matching;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Deserializer};

use crate::db::models::{Listing, ListingImage};
use self::geo::BoundingBox;

pub use filter::ListingFilter;

pub const PROPERTY_TYPES: &[&str] = &[
    "apartment",
    "house",
    "studio",
    "room",
    "bedsitter",
    "commercial",
];
pub const STATUSES: &[&str] = &["available", "occupied"];
pub const MAX_IMAGES: i64 = 10;
const MAX_TITLE_LEN: usize = 120;
const MAX_DESCRIPTION_LEN: usize = 5000;

const LISTING_SELECT: &str = "SELECT l.id, l.landlord_id, u.name, l.title, l.description, l.price, \
     l.location, l.latitude, l.longitude, l.bedrooms, l.bathrooms, l.property_type, l.status, \
     l.views, l.inquiries, l.created_at, l.updated_at \
     FROM listings l JOIN users u ON u.id = l.landlord_id";

const NEWEST_FIRST: &str = "ORDER BY l.created_at DESC, l.rowid DESC";

/// Fields accepted when creating a listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: i64,
    #[serde(default)]
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub bedrooms: i64,
    #[serde(default)]
    pub bathrooms: i64,
    pub property_type: Option<String>,
}

/// Allow-listed fields an owner may change. Anything else in the body is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub location: Option<String>,
    /// `Some(Some(v))` = set, `Some(None)` = clear, `None` = no change.
    #[serde(default, deserialize_with = "present")]
    pub latitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub longitude: Option<Option<f64>>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub property_type: Option<String>,
}

/// Wraps any present value, `null` included, so an explicit `null` is told
/// apart from an absent field (which `#[serde(default)]` leaves as `None`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl ListingInput {
    pub fn validate(&mut self) -> Result<(), String> {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self.location = self.location.trim().to_string();
        if let Some(ref mut kind) = self.property_type {
            *kind = kind.trim().to_ascii_lowercase();
        }

        if self.title.is_empty() {
            return Err("Title is required".into());
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(format!("Title must be {MAX_TITLE_LEN} characters or less"));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(format!(
                "Description must be {MAX_DESCRIPTION_LEN} characters or less"
            ));
        }
        if self.price < 0 {
            return Err("Price cannot be negative".into());
        }
        if self.bedrooms < 0 || self.bathrooms < 0 {
            return Err("Bedrooms and bathrooms cannot be negative".into());
        }
        if let Some(ref kind) = self.property_type {
            if !PROPERTY_TYPES.contains(&kind.as_str()) {
                return Err(format!(
                    "Property type must be one of: {}",
                    PROPERTY_TYPES.join(", ")
                ));
            }
        }
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => {
                geo::Point::new(lat, lng)?;
            }
            (None, None) => {}
            _ => return Err("Latitude and longitude must be provided together".into()),
        }
        Ok(())
    }

    /// Merge a patch over an existing listing.
    pub fn patched(listing: &Listing, patch: ListingPatch) -> Self {
        Self {
            title: patch.title.unwrap_or_else(|| listing.title.clone()),
            description: patch
                .description
                .unwrap_or_else(|| listing.description.clone()),
            price: patch.price.unwrap_or(listing.price),
            location: patch.location.unwrap_or_else(|| listing.location.clone()),
            latitude: patch.latitude.unwrap_or(listing.latitude),
            longitude: patch.longitude.unwrap_or(listing.longitude),
            bedrooms: patch.bedrooms.unwrap_or(listing.bedrooms),
            bathrooms: patch.bathrooms.unwrap_or(listing.bathrooms),
            property_type: Some(
                patch
                    .property_type
                    .unwrap_or_else(|| listing.property_type.clone()),
            ),
        }
    }
}

fn listing_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Listing> {
    Ok(Listing {
        id: row.get(0)?,
        landlord_id: row.get(1)?,
        landlord_name: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        price: row.get(5)?,
        location: row.get(6)?,
        latitude: row.get(7)?,
        longitude: row.get(8)?,
        bedrooms: row.get(9)?,
        bathrooms: row.get(10)?,
        property_type: row.get(11)?,
        status: row.get(12)?,
        views: row.get(13)?,
        inquiries: row.get(14)?,
        images: Vec::new(),
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

fn query_listings(
    conn: &Connection,
    sql: &str,
    values: impl rusqlite::Params,
) -> rusqlite::Result<Vec<Listing>> {
    let mut stmt = conn.prepare(sql)?;
    let mut listings = stmt
        .query_map(values, listing_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    attach_images(conn, &mut listings)?;
    Ok(listings)
}

fn attach_images(conn: &Connection, listings: &mut [Listing]) -> rusqlite::Result<()> {
    for listing in listings.iter_mut() {
        listing.images = images(conn, &listing.id)?;
    }
    Ok(())
}

pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Listing>> {
    let listing = conn
        .query_row(
            &format!("{LISTING_SELECT} WHERE l.id = ?1"),
            params![id],
            listing_from_row,
        )
        .optional()?;
    match listing {
        Some(mut l) => {
            l.images = images(conn, &l.id)?;
            Ok(Some(l))
        }
        None => Ok(None),
    }
}

pub fn search(conn: &Connection, filter: &ListingFilter) -> rusqlite::Result<Vec<Listing>> {
    let (clause, values) = filter.to_sql();
    query_listings(
        conn,
        &format!("{LISTING_SELECT} WHERE {clause} {NEWEST_FIRST}"),
        params_from_iter(values),
    )
}

pub fn by_landlord(conn: &Connection, landlord_id: &str) -> rusqlite::Result<Vec<Listing>> {
    query_listings(
        conn,
        &format!("{LISTING_SELECT} WHERE l.landlord_id = ?1 {NEWEST_FIRST}"),
        params![landlord_id],
    )
}

pub fn available(conn: &Connection) -> rusqlite::Result<Vec<Listing>> {
    query_listings(
        conn,
        &format!("{LISTING_SELECT} WHERE l.status = 'available' {NEWEST_FIRST}"),
        [],
    )
}

/// Listings with coordinates inside the given box, in no particular order.
pub fn within_box(conn: &Connection, bbox: BoundingBox) -> rusqlite::Result<Vec<Listing>> {
    let lng_clause = if bbox.wraps_antimeridian() {
        "(l.longitude >= ?3 OR l.longitude <= ?4)"
    } else {
        "l.longitude BETWEEN ?3 AND ?4"
    };
    query_listings(
        conn,
        &format!(
            "{LISTING_SELECT} WHERE l.latitude IS NOT NULL AND l.longitude IS NOT NULL \
             AND l.latitude BETWEEN ?1 AND ?2 AND {lng_clause}"
        ),
        params![bbox.min_lat, bbox.max_lat, bbox.min_lng, bbox.max_lng],
    )
}

pub fn insert(conn: &Connection, landlord_id: &str, input: &ListingInput) -> rusqlite::Result<String> {
    let id = crate::db::new_id();
    conn.execute(
        "INSERT INTO listings (id, landlord_id, title, description, price, location, latitude, longitude,
                               bedrooms, bathrooms, property_type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id,
            landlord_id,
            input.title,
            input.description,
            input.price,
            input.location,
            input.latitude,
            input.longitude,
            input.bedrooms,
            input.bathrooms,
            input.property_type.as_deref().unwrap_or("apartment"),
        ],
    )?;
    Ok(id)
}

pub fn update(conn: &Connection, id: &str, input: &ListingInput) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE listings SET title = ?2, description = ?3, price = ?4, location = ?5,
                latitude = ?6, longitude = ?7, bedrooms = ?8, bathrooms = ?9, property_type = ?10,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
        params![
            id,
            input.title,
            input.description,
            input.price,
            input.location,
            input.latitude,
            input.longitude,
            input.bedrooms,
            input.bathrooms,
            input.property_type.as_deref().unwrap_or("apartment"),
        ],
    )?;
    Ok(())
}

pub fn set_status(conn: &Connection, id: &str, status: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE listings SET status = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?1",
        params![id, status],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    Ok(conn.execute("DELETE FROM listings WHERE id = ?1", params![id])? > 0)
}

pub fn record_view(conn: &Connection, id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE listings SET views = views + 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

pub fn record_inquiry(conn: &Connection, id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE listings SET inquiries = inquiries + 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

// --- Images ---

pub fn images(conn: &Connection, listing_id: &str) -> rusqlite::Result<Vec<ListingImage>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, url, content_type, position FROM listing_images
         WHERE listing_id = ?1 ORDER BY position ASC, rowid ASC",
    )?;
    let images = stmt
        .query_map(params![listing_id], |row| {
            Ok(ListingImage {
                id: row.get(0)?,
                url: row.get(1)?,
                content_type: row.get(2)?,
                position: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(images)
}

pub fn image_count(conn: &Connection, listing_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM listing_images WHERE listing_id = ?1",
        params![listing_id],
        |r| r.get(0),
    )
}

pub fn insert_image(
    conn: &Connection,
    listing_id: &str,
    image_id: &str,
    file_path: &str,
    url: &str,
    content_type: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO listing_images (id, listing_id, file_path, url, content_type, position)
         VALUES (?1, ?2, ?3, ?4, ?5,
                 (SELECT COALESCE(MAX(position) + 1, 0) FROM listing_images WHERE listing_id = ?2))",
        params![image_id, listing_id, file_path, url, content_type],
    )?;
    Ok(())
}

/// Remove an image row, returning its stored file path.
pub fn delete_image(
    conn: &Connection,
    listing_id: &str,
    image_id: &str,
) -> rusqlite::Result<Option<String>> {
    let path: Option<String> = conn
        .query_row(
            "SELECT file_path FROM listing_images WHERE id = ?1 AND listing_id = ?2",
            params![image_id, listing_id],
            |r| r.get(0),
        )
        .optional()?;
    if path.is_some() {
        conn.execute(
            "DELETE FROM listing_images WHERE id = ?1",
            params![image_id],
        )?;
    }
    Ok(path)
}

// --- Saved listings ---

pub fn save_for_user(conn: &Connection, user_id: &str, listing_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO saved_listings (user_id, listing_id) VALUES (?1, ?2)",
        params![user_id, listing_id],
    )?;
    Ok(())
}

pub fn unsave_for_user(conn: &Connection, user_id: &str, listing_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM saved_listings WHERE user_id = ?1 AND listing_id = ?2",
        params![user_id, listing_id],
    )?;
    Ok(())
}

pub fn saved_by_user(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<Listing>> {
    query_listings(
        conn,
        &format!(
            "{LISTING_SELECT} JOIN saved_listings s ON s.listing_id = l.id \
             WHERE s.user_id = ?1 ORDER BY s.created_at DESC, s.rowid DESC"
        ),
        params![user_id],
    )
}
