pub mod points;

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{TenantPreferences, User, USER_COLUMNS};

pub const ROLES: &[&str] = &["tenant", "landlord"];

pub fn find_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"),
        params![id],
        User::from_row,
    )
    .optional()
}

/// User plus stored password hash, for credential checks.
pub fn find_with_hash_by_email(
    conn: &Connection,
    email: &str,
) -> rusqlite::Result<Option<(User, String)>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS}, u.password_hash FROM users u WHERE u.email = ?1"),
        params![email.trim()],
        |row| Ok((User::from_row(row)?, row.get(18)?)),
    )
    .optional()
}

pub fn password_hash(conn: &Connection, user_id: &str) -> rusqlite::Result<String> {
    conn.query_row(
        "SELECT password_hash FROM users WHERE id = ?1",
        params![user_id],
        |r| r.get(0),
    )
}

pub fn email_taken(conn: &Connection, email: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = ?1",
        params![email.trim()],
        |r| r.get(0),
    )
}

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: &'a str,
    pub is_admin: bool,
    pub referral_code: &'a str,
    pub referred_by: Option<&'a str>,
}

pub fn insert(conn: &Connection, new: &NewUser<'_>) -> rusqlite::Result<String> {
    let id = crate::db::new_id();
    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, role, is_admin, referral_code, referred_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            new.name.trim(),
            new.email.trim(),
            new.password_hash,
            new.role,
            new.is_admin,
            new.referral_code,
            new.referred_by,
        ],
    )?;
    Ok(id)
}

/// Loose syntactic check: something@domain.tld with no whitespace.
pub fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

pub fn preferences(conn: &Connection, user_id: &str) -> rusqlite::Result<TenantPreferences> {
    let prefs = conn
        .query_row(
            "SELECT max_rent, min_bedrooms, property_type, location
             FROM tenant_preferences WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(TenantPreferences {
                    max_rent: row.get(0)?,
                    min_bedrooms: row.get(1)?,
                    property_type: row.get(2)?,
                    location: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(prefs.unwrap_or_default())
}

pub fn save_preferences(
    conn: &Connection,
    user_id: &str,
    prefs: &TenantPreferences,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO tenant_preferences (user_id, max_rent, min_bedrooms, property_type, location, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
         ON CONFLICT(user_id) DO UPDATE SET
           max_rent = excluded.max_rent,
           min_bedrooms = excluded.min_bedrooms,
           property_type = excluded.property_type,
           location = excluded.location,
           updated_at = excluded.updated_at",
        params![
            user_id,
            prefs.max_rent,
            prefs.min_bedrooms,
            prefs.property_type,
            prefs.location
        ],
    )?;
    Ok(())
}

/// Listings owned by accounts that the next purge will delete.
pub fn listings_due_for_deletion(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT l.id FROM listings l JOIN users u ON u.id = l.landlord_id
         WHERE u.deletion_scheduled_at IS NOT NULL
           AND u.deletion_scheduled_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
    )?;
    let ids = stmt
        .query_map([], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// Delete accounts whose deletion grace period has elapsed.
/// Listings, messages and sessions go with them via cascades.
pub fn purge_scheduled_deletions(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM users
         WHERE deletion_scheduled_at IS NOT NULL
           AND deletion_scheduled_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        [],
    )
}

/// Profile fields after merging a request over the stored user.
pub struct ProfileChanges<'a> {
    pub name: &'a str,
    pub phone: Option<&'a str>,
    pub bio: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub role: &'a str,
}

pub fn update_profile(
    conn: &Connection,
    user_id: &str,
    changes: &ProfileChanges<'_>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET name = ?2, phone = ?3, bio = ?4, avatar_url = ?5, role = ?6,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
        params![
            user_id,
            changes.name,
            changes.phone,
            changes.bio,
            changes.avatar_url,
            changes.role
        ],
    )?;
    Ok(())
}

pub fn set_password(conn: &Connection, user_id: &str, hash: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET password_hash = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?1",
        params![user_id, hash],
    )?;
    Ok(())
}

pub fn referral_count(conn: &Connection, user_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM users WHERE referred_by = ?1",
        params![user_id],
        |r| r.get(0),
    )
}

/// Schedule deletion `grace_days` from now. Returns the scheduled time.
pub fn schedule_deletion(
    conn: &Connection,
    user_id: &str,
    grace_days: i64,
) -> rusqlite::Result<String> {
    conn.query_row(
        "UPDATE users SET deletion_scheduled_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2)
         WHERE id = ?1
         RETURNING deletion_scheduled_at",
        params![user_id, format!("+{grace_days} days")],
        |r| r.get(0),
    )
}

pub fn cancel_deletion(conn: &Connection, user_id: &str) -> rusqlite::Result<bool> {
    Ok(conn.execute(
        "UPDATE users SET deletion_scheduled_at = NULL
         WHERE id = ?1 AND deletion_scheduled_at IS NOT NULL",
        params![user_id],
    )? > 0)
}

pub fn set_verification(
    conn: &Connection,
    user_id: &str,
    status: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET verification_status = ?2, is_verified = (?2 = 'approved'),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
        params![user_id, status],
    )?;
    Ok(())
}

pub fn set_banned(conn: &Connection, user_id: &str, banned: bool) -> rusqlite::Result<bool> {
    Ok(conn.execute(
        "UPDATE users SET is_banned = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?1",
        params![user_id, banned],
    )? > 0)
}

/// All users, newest first, optionally narrowed by a name or email substring.
pub fn search(conn: &Connection, term: Option<&str>) -> rusqlite::Result<Vec<User>> {
    let term = term.map(str::trim).filter(|t| !t.is_empty());
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users u
         WHERE ?1 IS NULL OR u.name LIKE ?1 ESCAPE '\\' OR u.email LIKE ?1 ESCAPE '\\'
         ORDER BY u.created_at DESC, u.rowid DESC"
    ))?;
    let pattern = term.map(crate::listings::filter::contains_pattern);
    let users = stmt
        .query_map(params![pattern], User::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

pub fn pending_verifications(conn: &Connection) -> rusqlite::Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users u
         WHERE u.verification_status = 'pending'
         ORDER BY u.updated_at ASC, u.rowid ASC"
    ))?;
    let users = stmt
        .query_map([], User::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}
