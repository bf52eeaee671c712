use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{User, USER_COLUMNS};

/// Create a new session for a user. Returns the bearer token.
pub fn create_session(conn: &Connection, user_id: &str, hours: u64) -> rusqlite::Result<String> {
    let token = generate_token();
    let id = crate::db::new_id();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, user_id, token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Delete a session by token.
pub fn delete_session(conn: &Connection, token: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Revoke every session of a user. Returns how many were removed.
pub fn delete_user_sessions(conn: &Connection, user_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])
}

/// Resolve a live session token to its user. Banned users resolve to `None`.
pub fn user_for_token(conn: &Connection, token: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!(
            "SELECT {USER_COLUMNS} FROM sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1 AND s.expires_at > datetime('now') AND u.is_banned = 0"
        ),
        params![token],
        User::from_row,
    )
    .optional()
}

/// Remove expired sessions. Returns the number purged.
pub fn purge_expired(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM sessions WHERE expires_at <= datetime('now')", [])
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_user(conn: &Connection, id: &str) {
        conn.execute(
            "INSERT INTO users (id, name, email, password_hash, referral_code) VALUES (?1, 'Amani', ?2, 'x', ?3)",
            params![id, format!("{id}@nyumba.test"), id.to_uppercase()],
        )
        .unwrap();
    }

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn session_round_trip_and_logout() {
        let (_tmp, pool) = crate::db::test_pool();
        let conn = pool.get().unwrap();
        seed_user(&conn, "u1");

        let token = create_session(&conn, "u1", 1).unwrap();
        let user = user_for_token(&conn, &token).unwrap().unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.points, 0);

        delete_session(&conn, &token).unwrap();
        assert!(user_for_token(&conn, &token).unwrap().is_none());
    }

    #[test]
    fn banned_user_tokens_are_rejected() {
        let (_tmp, pool) = crate::db::test_pool();
        let conn = pool.get().unwrap();
        seed_user(&conn, "u1");
        let token = create_session(&conn, "u1", 1).unwrap();

        conn.execute("UPDATE users SET is_banned = 1 WHERE id = 'u1'", [])
            .unwrap();
        assert!(user_for_token(&conn, &token).unwrap().is_none());
    }

    #[test]
    fn expired_sessions_are_rejected_and_purged() {
        let (_tmp, pool) = crate::db::test_pool();
        let conn = pool.get().unwrap();
        seed_user(&conn, "u1");
        conn.execute(
            "INSERT INTO sessions (id, user_id, token, expires_at) VALUES ('s1', 'u1', 'old', datetime('now', '-1 hours'))",
            [],
        )
        .unwrap();

        assert!(user_for_token(&conn, "old").unwrap().is_none());
        assert_eq!(purge_expired(&conn).unwrap(), 1);
    }
}
