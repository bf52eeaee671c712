//! Subscription plans and payment confirmation.
//!
//! A payment starts `pending` and moves once to `confirmed` or `failed`.
//! Settled payments are never re-applied, so webhook redelivery is harmless.

use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::Payment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub name: &'static str,
    pub days: i64,
    pub amount: i64,
}

pub const PLANS: &[Plan] = &[
    Plan {
        name: "basic",
        days: 30,
        amount: 500,
    },
    Plan {
        name: "premium",
        days: 30,
        amount: 1500,
    },
];

pub fn plan(name: &str) -> Option<Plan> {
    let name = name.trim();
    PLANS
        .iter()
        .copied()
        .find(|p| p.name.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Confirmed,
    Failed,
}

impl Settlement {
    pub fn parse(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "confirmed" => Some(Self::Confirmed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

/// Result of applying a webhook notification.
#[derive(Debug, Clone)]
pub struct Applied {
    pub payment: Payment,
    /// False when the payment was already settled and nothing changed.
    pub changed: bool,
}

fn generate_reference() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    format!("NYB-{}", hex::encode_upper(bytes))
}

pub fn create_payment(
    conn: &Connection,
    user_id: &str,
    plan: Plan,
    currency: &str,
) -> rusqlite::Result<Payment> {
    let id = crate::db::new_id();
    conn.execute(
        "INSERT INTO payments (id, user_id, reference, plan, amount, currency)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, user_id, generate_reference(), plan.name, plan.amount, currency],
    )?;
    find(conn, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Payment>> {
    conn.query_row(
        &format!("SELECT {} FROM payments WHERE id = ?1", Payment::COLUMNS),
        params![id],
        Payment::from_row,
    )
    .optional()
}

fn find_by_reference(conn: &Connection, reference: &str) -> rusqlite::Result<Option<Payment>> {
    conn.query_row(
        &format!("SELECT {} FROM payments WHERE reference = ?1", Payment::COLUMNS),
        params![reference.trim()],
        Payment::from_row,
    )
    .optional()
}

pub fn for_user(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<Payment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM payments WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
        Payment::COLUMNS
    ))?;
    let payments = stmt
        .query_map(params![user_id], Payment::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(payments)
}

/// Settle a pending payment. Confirmation activates the payer's
/// subscription, extending from the later of now and the current expiry.
/// Returns `None` for an unknown reference.
pub fn settle(
    conn: &mut Connection,
    reference: &str,
    outcome: Settlement,
) -> rusqlite::Result<Option<Applied>> {
    let tx = conn.transaction()?;

    let Some(payment) = find_by_reference(&tx, reference)? else {
        return Ok(None);
    };
    if payment.status != "pending" {
        return Ok(Some(Applied {
            payment,
            changed: false,
        }));
    }

    tx.execute(
        "UPDATE payments SET status = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
        params![payment.id, outcome.as_str()],
    )?;

    if outcome == Settlement::Confirmed {
        let days = plan(&payment.plan).map_or(30, |p| p.days);
        tx.execute(
            "UPDATE users SET
                subscription_status = 'active',
                subscription_type = ?2,
                subscription_expires_at = strftime('%Y-%m-%dT%H:%M:%fZ',
                    max(strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), COALESCE(subscription_expires_at, '')),
                    ?3),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?1",
            params![payment.user_id, payment.plan, format!("+{days} days")],
        )?;
    }

    let payment = find(&tx, &payment.id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
    tx.commit()?;
    Ok(Some(Applied {
        payment,
        changed: true,
    }))
}

/// Expire lapsed subscriptions and withdraw the verification badge they
/// were carrying. Returns the number of users affected.
pub fn expire_lapsed(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE users SET
            subscription_status = 'expired',
            is_verified = 0,
            verification_status = CASE
                WHEN verification_status IN ('pending', 'approved') THEN 'none'
                ELSE verification_status
            END,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE subscription_status = 'active'
           AND subscription_expires_at IS NOT NULL
           AND subscription_expires_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        [],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users;

    fn seed(conn: &Connection) {
        conn.execute(
            "INSERT INTO users (id, name, email, password_hash, referral_code) VALUES ('u1', 'Wanjiru', 'w@nyumba.test', 'x', 'WANJIRU2')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn plans_resolve_case_insensitively() {
        assert_eq!(plan("Premium").unwrap().amount, 1500);
        assert_eq!(plan(" basic ").unwrap().days, 30);
        assert!(plan("gold").is_none());
    }

    #[test]
    fn references_are_unique_and_prefixed() {
        let a = generate_reference();
        assert!(a.starts_with("NYB-"));
        assert_eq!(a.len(), 4 + 16);
        assert_ne!(a, generate_reference());
    }

    #[test]
    fn confirmation_activates_once() {
        let (_tmp, pool) = crate::db::test_pool();
        let mut conn = pool.get().unwrap();
        seed(&conn);
        let payment = create_payment(&conn, "u1", plan("basic").unwrap(), "USDC").unwrap();
        assert_eq!(payment.status, "pending");

        let applied = settle(&mut conn, &payment.reference, Settlement::Confirmed)
            .unwrap()
            .unwrap();
        assert!(applied.changed);
        assert_eq!(applied.payment.status, "confirmed");

        let user = users::find_by_id(&conn, "u1").unwrap().unwrap();
        assert_eq!(user.subscription_status, "active");
        assert_eq!(user.subscription_type.as_deref(), Some("basic"));
        let first_expiry = user.subscription_expires_at.unwrap();

        let again = settle(&mut conn, &payment.reference, Settlement::Confirmed)
            .unwrap()
            .unwrap();
        assert!(!again.changed);
        let user = users::find_by_id(&conn, "u1").unwrap().unwrap();
        assert_eq!(user.subscription_expires_at.unwrap(), first_expiry);
    }

    #[test]
    fn renewal_extends_from_current_expiry() {
        let (_tmp, pool) = crate::db::test_pool();
        let mut conn = pool.get().unwrap();
        seed(&conn);
        conn.execute(
            "UPDATE users SET subscription_status = 'active', subscription_expires_at = '2999-01-01T00:00:00.000Z' WHERE id = 'u1'",
            [],
        )
        .unwrap();

        let payment = create_payment(&conn, "u1", plan("premium").unwrap(), "USDC").unwrap();
        settle(&mut conn, &payment.reference, Settlement::Confirmed).unwrap();

        let user = users::find_by_id(&conn, "u1").unwrap().unwrap();
        assert_eq!(
            user.subscription_expires_at.as_deref(),
            Some("2999-01-31T00:00:00.000Z")
        );
        assert_eq!(user.subscription_type.as_deref(), Some("premium"));
    }

    #[test]
    fn failure_leaves_subscription_untouched() {
        let (_tmp, pool) = crate::db::test_pool();
        let mut conn = pool.get().unwrap();
        seed(&conn);
        let payment = create_payment(&conn, "u1", plan("basic").unwrap(), "USDC").unwrap();

        let applied = settle(&mut conn, &payment.reference, Settlement::Failed)
            .unwrap()
            .unwrap();
        assert_eq!(applied.payment.status, "failed");
        let user = users::find_by_id(&conn, "u1").unwrap().unwrap();
        assert_eq!(user.subscription_status, "inactive");

        assert!(settle(&mut conn, "NYB-UNKNOWN", Settlement::Confirmed)
            .unwrap()
            .is_none());
    }

    #[test]
    fn lapsed_subscriptions_lose_verification() {
        let (_tmp, pool) = crate::db::test_pool();
        let conn = pool.get().unwrap();
        seed(&conn);
        conn.execute(
            "UPDATE users SET subscription_status = 'active', subscription_expires_at = '2000-01-01T00:00:00.000Z',
                              is_verified = 1, verification_status = 'approved' WHERE id = 'u1'",
            [],
        )
        .unwrap();

        assert_eq!(expire_lapsed(&conn).unwrap(), 1);
        let user = users::find_by_id(&conn, "u1").unwrap().unwrap();
        assert_eq!(user.subscription_status, "expired");
        assert!(!user.is_verified);
        assert_eq!(user.verification_status, "none");
        assert_eq!(expire_lapsed(&conn).unwrap(), 0);
    }
}
