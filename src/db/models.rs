use serde::{Deserialize, Serialize};

/// Column list matching [`User::from_row`]. Expects the users table aliased as `u`.
pub const USER_COLUMNS: &str = "u.id, u.name, u.email, u.role, u.phone, u.bio, u.avatar_url, \
     u.is_admin, u.is_banned, u.is_verified, u.verification_status, u.subscription_status, \
     u.subscription_type, u.subscription_expires_at, u.referral_code, u.deletion_scheduled_at, \
     u.created_at, \
     COALESCE((SELECT SUM(p.delta) FROM points_ledger p WHERE p.user_id = u.id), 0)";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub is_banned: bool,
    pub is_verified: bool,
    pub verification_status: String,
    pub subscription_status: String,
    pub subscription_type: Option<String>,
    pub subscription_expires_at: Option<String>,
    pub referral_code: String,
    pub deletion_scheduled_at: Option<String>,
    pub created_at: String,
    pub points: i64,
}

impl User {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            role: row.get(3)?,
            phone: row.get(4)?,
            bio: row.get(5)?,
            avatar_url: row.get(6)?,
            is_admin: row.get(7)?,
            is_banned: row.get(8)?,
            is_verified: row.get(9)?,
            verification_status: row.get(10)?,
            subscription_status: row.get(11)?,
            subscription_type: row.get(12)?,
            subscription_expires_at: row.get(13)?,
            referral_code: row.get(14)?,
            deletion_scheduled_at: row.get(15)?,
            created_at: row.get(16)?,
            points: row.get(17)?,
        })
    }

    pub fn is_landlord(&self) -> bool {
        self.role == "landlord"
    }

    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
            bio: self.bio.clone(),
            avatar_url: self.avatar_url.clone(),
            is_verified: self.is_verified,
            created_at: self.created_at.clone(),
        }
    }
}

/// Profile as shown to other users. Never carries the email address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub role: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsEntry {
    pub id: String,
    pub delta: i64,
    pub reason: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantPreferences {
    pub max_rent: Option<i64>,
    pub min_bedrooms: Option<i64>,
    pub property_type: Option<String>,
    pub location: Option<String>,
}

impl TenantPreferences {
    pub fn is_empty(&self) -> bool {
        self.max_rent.is_none()
            && self.min_bedrooms.is_none()
            && self.property_type.is_none()
            && self.location.as_deref().map_or(true, |l| l.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub landlord_id: String,
    pub landlord_name: String,
    pub title: String,
    pub description: String,
    pub price: i64,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub property_type: String,
    pub status: String,
    pub views: i64,
    pub inquiries: i64,
    pub images: Vec<ListingImage>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingImage {
    pub id: String,
    pub url: String,
    pub content_type: String,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub participant: PublicUser,
    pub listing_id: Option<String>,
    pub last_message: Option<Message>,
    pub unread_count: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub listing_id: String,
    pub user_id: String,
    pub user_name: String,
    pub rating: i64,
    pub comment: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumPost {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub title: String,
    pub body: String,
    pub category: String,
    pub reply_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumReply {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_name: String,
    pub body: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: String,
    pub title: String,
    pub description: String,
    pub points_cost: i64,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ad {
    pub id: String,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub target_url: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    pub reference: String,
    pub plan: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Payment {
    pub const COLUMNS: &'static str =
        "id, user_id, reference, plan, amount, currency, status, created_at, updated_at";

    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            reference: row.get(2)?,
            plan: row.get(3)?,
            amount: row.get(4)?,
            currency: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}
