use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Row, Transaction};
use uuid::Uuid;

use issuehub_types::{IssueStatus, Priority, Subscription};

use crate::issues::append_timeline;
use crate::models::{NewPayment, PaymentOutcome, PaymentRow};
use crate::{Database, OptionalExt, parse_col, parse_opt_col, timestamp};

const PAYMENT_COLUMNS: &str =
    "id, session_id, kind, user_id, issue_id, amount, currency, status, created_at";

const UNKNOWN_PAYER: &str = "Unknown payer";

impl Database {
    /// Record a confirmed boost and raise the issue's priority, atomically.
    ///
    /// The payment insert is keyed on the provider session id; if the session
    /// was already recorded nothing else happens. A boost paid for an issue
    /// that has since been resolved or rejected is still recorded but leaves
    /// the issue untouched. The timeline names the payer.
    pub fn apply_boost_payment(&self, payment: &NewPayment) -> Result<PaymentOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if !insert_payment(&tx, payment)? {
                return Ok(PaymentOutcome::AlreadyApplied);
            }

            let Some(issue_id) = payment.issue_id else {
                return Ok(PaymentOutcome::TargetMissing);
            };
            let status: Option<String> = tx
                .query_row(
                    "SELECT status FROM issues WHERE id = ?1",
                    [issue_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(status) = status else {
                return Ok(PaymentOutcome::TargetMissing);
            };
            let status: IssueStatus = status.parse()?;
            if matches!(status, IssueStatus::Resolved | IssueStatus::Rejected) {
                tx.commit()?;
                return Ok(PaymentOutcome::TargetClosed);
            }

            let payer: Option<String> = tx
                .query_row(
                    "SELECT name FROM users WHERE id = ?1",
                    [payment.user_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            let actor = payer.unwrap_or_else(|| UNKNOWN_PAYER.to_string());

            tx.execute(
                "UPDATE issues SET priority = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![
                    issue_id.to_string(),
                    Priority::High.as_str(),
                    timestamp(Utc::now()),
                ],
            )?;
            let message = format!(
                "Priority boosted to high (payment session {})",
                payment.session_id
            );
            append_timeline(&tx, issue_id, status, &message, &actor, Utc::now())?;

            tx.commit()?;
            Ok(PaymentOutcome::Applied)
        })
    }

    /// Record a confirmed premium purchase and upgrade the payer, atomically.
    pub fn apply_premium_payment(&self, payment: &NewPayment) -> Result<PaymentOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if !insert_payment(&tx, payment)? {
                return Ok(PaymentOutcome::AlreadyApplied);
            }

            let changed = tx.execute(
                "UPDATE users SET subscription = ?2 WHERE id = ?1",
                rusqlite::params![payment.user_id.to_string(), Subscription::Premium.as_str()],
            )?;
            if changed == 0 {
                return Ok(PaymentOutcome::TargetMissing);
            }

            tx.commit()?;
            Ok(PaymentOutcome::Applied)
        })
    }

    pub fn get_payment_by_session(&self, session_id: &str) -> Result<Option<PaymentRow>> {
        self.with_conn(|conn| query_payment_by_session(conn, session_id))
    }

    pub fn list_payments(&self) -> Result<Vec<PaymentRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM payments ORDER BY created_at DESC, rowid DESC",
                PAYMENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_payment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Returns false when the session id is already on record.
fn insert_payment(tx: &Transaction<'_>, payment: &NewPayment) -> Result<bool> {
    let inserted = tx.execute(
        "INSERT INTO payments (id, session_id, kind, user_id, issue_id, amount, currency, status,
            created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'success', ?8)
         ON CONFLICT (session_id) DO NOTHING",
        rusqlite::params![
            payment.id.to_string(),
            payment.session_id,
            payment.kind.as_str(),
            payment.user_id.to_string(),
            payment.issue_id.map(|id| id.to_string()),
            payment.amount,
            payment.currency.to_lowercase(),
            timestamp(Utc::now()),
        ],
    )?;
    Ok(inserted == 1)
}

fn query_payment_by_session(conn: &Connection, session_id: &str) -> Result<Option<PaymentRow>> {
    let sql = format!("SELECT {} FROM payments WHERE session_id = ?1", PAYMENT_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([session_id], map_payment).optional()
}

fn map_payment(row: &Row<'_>) -> rusqlite::Result<PaymentRow> {
    Ok(PaymentRow {
        id: parse_col(row, 0)?,
        session_id: row.get(1)?,
        kind: parse_col(row, 2)?,
        user_id: parse_col(row, 3)?,
        issue_id: parse_opt_col::<Uuid>(row, 4)?,
        amount: row.get(5)?,
        currency: row.get(6)?,
        status: row.get(7)?,
        created_at: parse_col(row, 8)?,
    })
}
