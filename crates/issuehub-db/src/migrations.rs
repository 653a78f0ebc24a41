use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                email           TEXT NOT NULL UNIQUE,
                password        TEXT NOT NULL,
                role            TEXT NOT NULL DEFAULT 'citizen',
                subscription    TEXT NOT NULL DEFAULT 'free',
                blocked         INTEGER NOT NULL DEFAULT 0,
                avatar_url      TEXT,
                phone           TEXT,
                issues_created  INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE issues (
                id                  TEXT PRIMARY KEY,
                owner_id            TEXT NOT NULL REFERENCES users(id),
                citizen_name        TEXT NOT NULL,
                title               TEXT NOT NULL,
                title_folded        TEXT NOT NULL,
                description         TEXT NOT NULL,
                category            TEXT NOT NULL,
                location            TEXT NOT NULL,
                status              TEXT NOT NULL DEFAULT 'pending',
                priority            TEXT NOT NULL DEFAULT 'normal',
                assigned_staff_id   TEXT,
                assigned_staff_name TEXT,
                image_url           TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_issues_ranking ON issues(priority, created_at);
            CREATE INDEX idx_issues_owner ON issues(owner_id);
            CREATE INDEX idx_issues_staff ON issues(assigned_staff_id);

            CREATE TABLE issue_upvotes (
                issue_id    TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (issue_id, user_id)
            );

            CREATE TABLE issue_reactions (
                issue_id    TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL,
                kind        TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (issue_id, user_id)
            );

            CREATE TABLE issue_comments (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                issue_id    TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL,
                name        TEXT NOT NULL,
                avatar_url  TEXT,
                body        TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_comments_issue ON issue_comments(issue_id, id);

            CREATE TABLE issue_timeline (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                issue_id    TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
                status      TEXT NOT NULL,
                message     TEXT NOT NULL,
                actor       TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_timeline_issue ON issue_timeline(issue_id, id);

            -- Audit trail: no foreign key so records outlive deleted issues.
            CREATE TABLE payments (
                id          TEXT PRIMARY KEY,
                session_id  TEXT NOT NULL UNIQUE,
                kind        TEXT NOT NULL,
                user_id     TEXT NOT NULL,
                issue_id    TEXT,
                amount      INTEGER NOT NULL,
                currency    TEXT NOT NULL,
                status      TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TRIGGER payments_no_update BEFORE UPDATE ON payments
            BEGIN
                SELECT RAISE(ABORT, 'payment records are immutable');
            END;

            CREATE TRIGGER payments_no_delete BEFORE DELETE ON payments
            BEGIN
                SELECT RAISE(ABORT, 'payment records are immutable');
            END;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
