use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LEN: usize = 8;

/// Random referral code. Ambiguous glyphs (0/O, 1/I) are excluded.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Generate a code not yet taken by any user.
pub fn unique_code(conn: &Connection) -> rusqlite::Result<String> {
    loop {
        let code = generate_code();
        let taken: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE referral_code = ?1",
            params![code],
            |r| r.get(0),
        )?;
        if !taken {
            return Ok(code);
        }
    }
}

/// Look up the owner of a referral code. Codes are matched case-insensitively.
pub fn referrer_for_code(conn: &Connection, code: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT id FROM users WHERE referral_code = ?1",
        params![code.trim().to_ascii_uppercase()],
        |r| r.get(0),
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_has_expected_shape() {
        let code = generate_code();
        assert_eq!(code.len(), CODE_LEN);
        assert!(code.bytes().all(|b| CHARSET.contains(&b)));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let (_tmp, pool) = crate::db::test_pool();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (id, name, email, password_hash, referral_code) VALUES ('u1', 'Wanjiru', 'w@nyumba.test', 'x', 'ABCD2345')",
            [],
        )
        .unwrap();

        assert_eq!(
            referrer_for_code(&conn, " abcd2345 ").unwrap().as_deref(),
            Some("u1")
        );
        assert!(referrer_for_code(&conn, "ZZZZZZZZ").unwrap().is_none());
        assert_ne!(unique_code(&conn).unwrap(), "ABCD2345");
    }
}
