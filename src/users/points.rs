//! Append-only points ledger. A user's balance is the sum of their entries.

use rusqlite::{params, Connection};

use crate::db::models::PointsEntry;

pub fn credit(conn: &Connection, user_id: &str, delta: i64, reason: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO points_ledger (id, user_id, delta, reason) VALUES (?1, ?2, ?3, ?4)",
        params![crate::db::new_id(), user_id, delta, reason],
    )?;
    Ok(())
}

pub fn balance(conn: &Connection, user_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(delta), 0) FROM points_ledger WHERE user_id = ?1",
        params![user_id],
        |r| r.get(0),
    )
}

pub fn history(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<PointsEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, delta, reason, created_at FROM points_ledger
         WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let entries = stmt
        .query_map(params![user_id], |row| {
            Ok(PointsEntry {
                id: row.get(0)?,
                delta: row.get(1)?,
                reason: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}
