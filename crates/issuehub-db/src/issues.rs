use std::collections::HashMap;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params_from_iter};
use uuid::Uuid;

use issuehub_types::IssueStatus;

use crate::models::{
    CommentRow, CreateIssueOutcome, IssueDetail, IssueEdit, IssueFilter, IssuePage, IssueRow,
    NewComment, NewIssue, ReactionRow, TimelineRow,
};
use crate::{Database, OptionalExt, parse_col, parse_opt_col, placeholders, timestamp};

const ISSUE_COLUMNS: &str = "id, owner_id, citizen_name, title, description, category, location, \
     status, priority, assigned_staff_id, assigned_staff_name, image_url, created_at, updated_at";

/// High priority first, then newest first. Insertion order breaks ties.
const RANKING: &str = "CASE priority WHEN 'high' THEN 1 ELSE 0 END DESC, created_at DESC, rowid DESC";

impl Database {
    // -- Issues --

    /// Insert an issue with its first timeline entry. When `quota` is set the
    /// owner's lifetime creation counter is checked and bumped in the same
    /// transaction, so concurrent creations cannot overshoot the cap.
    pub fn create_issue(&self, issue: &NewIssue, quota: Option<u32>) -> Result<CreateIssueOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let owner = issue.owner_id.to_string();

            let created: u32 = tx
                .query_row("SELECT issues_created FROM users WHERE id = ?1", [&owner], |row| {
                    row.get(0)
                })
                .optional()?
                .ok_or_else(|| anyhow!("Issue owner not found: {}", owner))?;

            if quota.is_some_and(|limit| created >= limit) {
                return Ok(CreateIssueOutcome::QuotaExceeded);
            }

            let created_at = timestamp(issue.created_at);
            tx.execute(
                "INSERT INTO issues (id, owner_id, citizen_name, title, title_folded, description,
                    category, location, status, priority, image_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?12, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                rusqlite::params![
                    issue.id.to_string(),
                    owner,
                    issue.citizen_name,
                    issue.title,
                    issue.description,
                    issue.category,
                    issue.location,
                    IssueStatus::Pending.as_str(),
                    issue.priority.as_str(),
                    issue.image_url,
                    created_at,
                    fold_case(&issue.title),
                ],
            )?;
            tx.execute(
                "UPDATE users SET issues_created = issues_created + 1 WHERE id = ?1",
                [&owner],
            )?;
            append_timeline(
                &tx,
                issue.id,
                IssueStatus::Pending,
                &issue.timeline_message,
                &issue.citizen_name,
                issue.created_at,
            )?;

            tx.commit()?;
            Ok(CreateIssueOutcome::Created)
        })
    }

    pub fn get_issue(&self, id: Uuid) -> Result<Option<IssueRow>> {
        self.with_conn(|conn| query_issue(conn, id))
    }

    pub fn get_issue_detail(&self, id: Uuid) -> Result<Option<IssueDetail>> {
        self.with_conn(|conn| match query_issue(conn, id)? {
            Some(issue) => Ok(load_details(conn, vec![issue])?.pop()),
            None => Ok(None),
        })
    }

    pub fn list_issues(&self, filter: &IssueFilter) -> Result<IssuePage> {
        self.with_conn(|conn| {
            let (clause, mut values) = filter_clause(filter);

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM issues{}", clause),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )?;

            let limit = filter.limit.max(1) as i64;
            let offset = (filter.page.max(1) as i64 - 1) * limit;
            let n = values.len();
            values.push(Value::Integer(limit));
            values.push(Value::Integer(offset));

            let sql = format!(
                "SELECT {} FROM issues{} ORDER BY {} LIMIT ?{} OFFSET ?{}",
                ISSUE_COLUMNS,
                clause,
                RANKING,
                n + 1,
                n + 2
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), map_issue)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(IssuePage {
                issues: load_details(conn, rows)?,
                total: total as u64,
            })
        })
    }

    /// Most recently resolved issues, newest resolution first.
    pub fn latest_resolved(&self, limit: u32) -> Result<Vec<IssueDetail>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM issues WHERE status = ?1 ORDER BY updated_at DESC, rowid DESC LIMIT ?2",
                ISSUE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![IssueStatus::Resolved.as_str(), limit],
                    map_issue,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            load_details(conn, rows)
        })
    }

    /// Content edit, only while the issue is still pending. Returns false if
    /// the issue is gone or has moved on.
    pub fn edit_issue(&self, id: Uuid, edit: &IssueEdit, actor: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE issues SET title = ?3, description = ?4, category = ?5, location = ?6,
                    updated_at = ?7, title_folded = ?8
                 WHERE id = ?1 AND status = ?2",
                rusqlite::params![
                    id.to_string(),
                    IssueStatus::Pending.as_str(),
                    edit.title,
                    edit.description,
                    edit.category,
                    edit.location,
                    timestamp(Utc::now()),
                    fold_case(&edit.title),
                ],
            )?;
            if changed == 0 {
                return Ok(false);
            }
            append_timeline(&tx, id, IssueStatus::Pending, "Issue edited", actor, Utc::now())?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Sub-resources go with the issue via ON DELETE CASCADE.
    pub fn delete_issue(&self, id: Uuid, only_if_pending: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "DELETE FROM issues WHERE id = ?1 AND (?2 = 0 OR status = ?3)",
                rusqlite::params![id.to_string(), only_if_pending, IssueStatus::Pending.as_str()],
            )?;
            Ok(changed == 1)
        })
    }

    /// Compare-and-swap from `from` to in-progress with a new assignee.
    pub fn assign_issue(
        &self,
        id: Uuid,
        from: IssueStatus,
        staff_id: Uuid,
        staff_name: &str,
        actor: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE issues SET status = ?3, assigned_staff_id = ?4, assigned_staff_name = ?5,
                    updated_at = ?6
                 WHERE id = ?1 AND status = ?2",
                rusqlite::params![
                    id.to_string(),
                    from.as_str(),
                    IssueStatus::InProgress.as_str(),
                    staff_id.to_string(),
                    staff_name,
                    timestamp(Utc::now()),
                ],
            )?;
            if changed == 0 {
                return Ok(false);
            }
            let message = format!("Assigned to {}", staff_name);
            append_timeline(&tx, id, IssueStatus::InProgress, &message, actor, Utc::now())?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Compare-and-swap from `from` to `to`, recording `message` on the timeline.
    /// Used for rejection and for staff progress updates.
    pub fn transition_issue(
        &self,
        id: Uuid,
        from: IssueStatus,
        to: IssueStatus,
        message: &str,
        actor: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE issues SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
                rusqlite::params![
                    id.to_string(),
                    from.as_str(),
                    to.as_str(),
                    timestamp(Utc::now()),
                ],
            )?;
            if changed == 0 {
                return Ok(false);
            }
            append_timeline(&tx, id, to, message, actor, Utc::now())?;
            tx.commit()?;
            Ok(true)
        })
    }

    // -- Reactions --

    /// Replace the user's reaction in one statement. Returns false if the
    /// issue does not exist.
    pub fn set_reaction(&self, issue_id: Uuid, user_id: Uuid, kind: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "INSERT INTO issue_reactions (issue_id, user_id, kind, created_at)
                 SELECT ?1, ?2, ?3, ?4 WHERE EXISTS (SELECT 1 FROM issues WHERE id = ?1)
                 ON CONFLICT (issue_id, user_id)
                 DO UPDATE SET kind = excluded.kind, created_at = excluded.created_at",
                rusqlite::params![
                    issue_id.to_string(),
                    user_id.to_string(),
                    kind,
                    timestamp(Utc::now()),
                ],
            )?;
            Ok(changed == 1)
        })
    }

    // -- Upvotes --

    /// Toggle: removes if present, inserts if not.
    /// Returns Some((added, upvote_count)), or None if the issue does not exist.
    pub fn toggle_upvote(&self, issue_id: Uuid, user_id: Uuid) -> Result<Option<(bool, usize)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let iid = issue_id.to_string();
            let uid = user_id.to_string();

            let exists = tx
                .query_row("SELECT 1 FROM issues WHERE id = ?1", [&iid], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Ok(None);
            }

            let removed = tx.execute(
                "DELETE FROM issue_upvotes WHERE issue_id = ?1 AND user_id = ?2",
                [&iid, &uid],
            )?;
            if removed == 0 {
                tx.execute(
                    "INSERT INTO issue_upvotes (issue_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![iid, uid, timestamp(Utc::now())],
                )?;
            }

            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM issue_upvotes WHERE issue_id = ?1",
                [&iid],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok(Some((removed == 0, count as usize)))
        })
    }

    // -- Comments --

    /// Append a comment. Returns false if the issue does not exist.
    pub fn add_comment(&self, issue_id: Uuid, comment: &NewComment) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "INSERT INTO issue_comments (issue_id, user_id, name, avatar_url, body, created_at)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6 WHERE EXISTS (SELECT 1 FROM issues WHERE id = ?1)",
                rusqlite::params![
                    issue_id.to_string(),
                    comment.user_id.to_string(),
                    comment.name,
                    comment.avatar_url,
                    comment.body,
                    timestamp(Utc::now()),
                ],
            )?;
            Ok(changed == 1)
        })
    }
}

/// Append one timeline entry. The stored time never goes backwards relative
/// to the previous entry, even if the wall clock does.
pub(crate) fn append_timeline(
    conn: &Connection,
    issue_id: Uuid,
    status: IssueStatus,
    message: &str,
    actor: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let iid = issue_id.to_string();
    let last: Option<String> = conn
        .query_row(
            "SELECT created_at FROM issue_timeline WHERE issue_id = ?1 ORDER BY id DESC LIMIT 1",
            [&iid],
            |row| row.get(0),
        )
        .optional()?;

    let at = match last.map(|s| s.parse::<DateTime<Utc>>()).transpose()? {
        Some(prev) if prev > at => prev,
        _ => at,
    };

    conn.execute(
        "INSERT INTO issue_timeline (issue_id, status, message, actor, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![iid, status.as_str(), message, actor, timestamp(at)],
    )?;
    Ok(())
}

fn filter_clause(filter: &IssueFilter) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    let mut push = |column_sql: &str, value: String| {
        values.push(Value::Text(value));
        clauses.push(column_sql.replace('?', &format!("?{}", values.len())));
    };

    if let Some(owner) = filter.owner_id {
        push("owner_id = ?", owner.to_string());
    }
    if let Some(staff) = filter.assigned_staff_id {
        push("assigned_staff_id = ?", staff.to_string());
    }
    if let Some(category) = &filter.category {
        push("category = ?", category.clone());
    }
    if let Some(status) = filter.status {
        push("status = ?", status.as_str().to_string());
    }
    if let Some(search) = &filter.search {
        // LIKE only folds ASCII, so both sides are folded up front
        push(
            "title_folded LIKE ? ESCAPE '\\'",
            format!("%{}%", escape_like(&fold_case(search))),
        );
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

/// Unicode lowercase used for the stored search key and the search term.
fn fold_case(input: &str) -> String {
    input.to_lowercase()
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn query_issue(conn: &Connection, id: Uuid) -> Result<Option<IssueRow>> {
    let sql = format!("SELECT {} FROM issues WHERE id = ?1", ISSUE_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([id.to_string()], map_issue).optional()
}

fn map_issue(row: &Row<'_>) -> rusqlite::Result<IssueRow> {
    Ok(IssueRow {
        id: parse_col(row, 0)?,
        owner_id: parse_col(row, 1)?,
        citizen_name: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        category: row.get(5)?,
        location: row.get(6)?,
        status: parse_col(row, 7)?,
        priority: parse_col(row, 8)?,
        assigned_staff_id: parse_opt_col(row, 9)?,
        assigned_staff_name: row.get(10)?,
        image_url: row.get(11)?,
        created_at: parse_col(row, 12)?,
        updated_at: parse_col(row, 13)?,
    })
}

/// Batch-fetch upvotes, reactions, comments and timeline for a page of
/// issues (four queries regardless of page size) and keep the page order.
fn load_details(conn: &Connection, issues: Vec<IssueRow>) -> Result<Vec<IssueDetail>> {
    if issues.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<String> = issues.iter().map(|i| i.id.to_string()).collect();
    let in_list = placeholders(ids.len());

    let mut details: HashMap<Uuid, IssueDetail> = issues
        .iter()
        .map(|issue| {
            (
                issue.id,
                IssueDetail {
                    issue: issue.clone(),
                    upvotes: vec![],
                    reactions: vec![],
                    comments: vec![],
                    timeline: vec![],
                },
            )
        })
        .collect();

    let mut stmt = conn.prepare(&format!(
        "SELECT issue_id, user_id FROM issue_upvotes WHERE issue_id IN ({}) ORDER BY rowid",
        in_list
    ))?;
    let upvotes = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok((parse_col::<Uuid>(row, 0)?, parse_col::<Uuid>(row, 1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for (issue_id, user_id) in upvotes {
        if let Some(d) = details.get_mut(&issue_id) {
            d.upvotes.push(user_id);
        }
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT issue_id, user_id, kind, created_at FROM issue_reactions
         WHERE issue_id IN ({}) ORDER BY created_at, rowid",
        in_list
    ))?;
    let reactions = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok(ReactionRow {
                issue_id: parse_col(row, 0)?,
                user_id: parse_col(row, 1)?,
                kind: row.get(2)?,
                created_at: parse_col(row, 3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for r in reactions {
        if let Some(d) = details.get_mut(&r.issue_id) {
            d.reactions.push(r);
        }
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT issue_id, user_id, name, avatar_url, body, created_at FROM issue_comments
         WHERE issue_id IN ({}) ORDER BY id",
        in_list
    ))?;
    let comments = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok(CommentRow {
                issue_id: parse_col(row, 0)?,
                user_id: parse_col(row, 1)?,
                name: row.get(2)?,
                avatar_url: row.get(3)?,
                body: row.get(4)?,
                created_at: parse_col(row, 5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for c in comments {
        if let Some(d) = details.get_mut(&c.issue_id) {
            d.comments.push(c);
        }
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT issue_id, status, message, actor, created_at FROM issue_timeline
         WHERE issue_id IN ({}) ORDER BY id",
        in_list
    ))?;
    let timeline = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok(TimelineRow {
                issue_id: parse_col(row, 0)?,
                status: parse_col(row, 1)?,
                message: row.get(2)?,
                actor: row.get(3)?,
                created_at: parse_col(row, 4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for t in timeline {
        if let Some(d) = details.get_mut(&t.issue_id) {
            d.timeline.push(t);
        }
    }

    Ok(issues
        .iter()
        .filter_map(|issue| details.remove(&issue.id))
        .collect())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use issuehub_types::{Priority, Role};

    use super::*;
    use crate::test_support::{new_issue, new_issue_at, seed_user};

    #[test]
    fn create_records_first_timeline_entry() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "Rahim", Role::Citizen);
        let issue = new_issue(&owner, "Broken streetlight", Priority::Normal);

        assert_eq!(db.create_issue(&issue, Some(3)).unwrap(), CreateIssueOutcome::Created);

        let detail = db.get_issue_detail(issue.id).unwrap().unwrap();
        assert_eq!(detail.issue.status, IssueStatus::Pending);
        assert_eq!(detail.issue.priority, Priority::Normal);
        assert_eq!(detail.timeline.len(), 1);
        assert_eq!(detail.timeline[0].actor, "Rahim");
        assert_eq!(db.get_user_by_id(owner.id).unwrap().unwrap().issues_created, 1);
    }

    #[test]
    fn quota_counts_issues_ever_created() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "Rahim", Role::Citizen);

        let mut first = None;
        for i in 0..3 {
            let issue = new_issue(&owner, &format!("Issue {}", i), Priority::Normal);
            assert_eq!(db.create_issue(&issue, Some(3)).unwrap(), CreateIssueOutcome::Created);
            first.get_or_insert(issue.id);
        }

        // Deleting does not hand the slot back
        assert!(db.delete_issue(first.unwrap(), true).unwrap());

        let fourth = new_issue(&owner, "Issue 4", Priority::Normal);
        assert_eq!(
            db.create_issue(&fourth, Some(3)).unwrap(),
            CreateIssueOutcome::QuotaExceeded
        );
        assert!(db.get_issue(fourth.id).unwrap().is_none());

        // Uncapped creation still works
        assert_eq!(db.create_issue(&fourth, None).unwrap(), CreateIssueOutcome::Created);
    }

    #[test]
    fn listing_ranks_priority_before_date() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "Rahim", Role::Citizen);
        let base = Utc::now() - Duration::hours(4);

        let priorities = [Priority::Normal, Priority::High, Priority::Normal, Priority::High];
        let mut ids = vec![];
        for (i, priority) in priorities.iter().enumerate() {
            let issue = new_issue_at(
                &owner,
                &format!("Issue {}", i),
                *priority,
                base + Duration::minutes(i as i64),
            );
            db.create_issue(&issue, None).unwrap();
            ids.push(issue.id);
        }

        let page = db.list_issues(&IssueFilter::default()).unwrap();
        let order: Vec<Uuid> = page.issues.iter().map(|d| d.issue.id).collect();
        assert_eq!(order, vec![ids[3], ids[1], ids[2], ids[0]]);
        assert_eq!(page.total, 4);
    }

    #[test]
    fn listing_filters_and_paginates() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "Alpha", Role::Citizen);
        let b = seed_user(&db, "Beta", Role::Citizen);

        for i in 0..5 {
            db.create_issue(&new_issue(&a, &format!("Pothole {}", i), Priority::Normal), None)
                .unwrap();
        }
        let mut drain = new_issue(&b, "Blocked drain_100%", Priority::Normal);
        drain.category = "drainage".into();
        db.create_issue(&drain, None).unwrap();

        let mine = db
            .list_issues(&IssueFilter {
                owner_id: Some(b.id),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(mine.total, 1);

        let search = db
            .list_issues(&IssueFilter {
                search: Some("POTHOLE".into()),
                limit: 2,
                page: 3,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(search.total, 5);
        assert_eq!(search.issues.len(), 1);

        let out_of_range = db
            .list_issues(&IssueFilter {
                page: 9,
                ..Default::default()
            })
            .unwrap();
        assert!(out_of_range.issues.is_empty());
        assert_eq!(out_of_range.total, 6);

        // Wildcards in the search text are literal
        let literal = db
            .list_issues(&IssueFilter {
                search: Some("_100%".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(literal.total, 1);
        let none = db
            .list_issues(&IssueFilter {
                search: Some("%x".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(none.total, 0);

        let by_category = db
            .list_issues(&IssueFilter {
                category: Some("drainage".into()),
                status: Some(IssueStatus::Pending),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_category.total, 1);
    }

    #[test]
    fn search_folds_non_ascii_case() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "Jonas", Role::Citizen);
        let issue = new_issue(&owner, "Überflutete Straße", Priority::Normal);
        db.create_issue(&issue, None).unwrap();
        db.create_issue(&new_issue(&owner, "Umgestürzter Baum", Priority::Normal), None)
            .unwrap();

        let search = |term: &str| {
            db.list_issues(&IssueFilter {
                search: Some(term.into()),
                ..Default::default()
            })
            .unwrap()
            .total
        };
        assert_eq!(search("überflutete"), 1);
        assert_eq!(search("ÜBERFLUTETE"), 1);
        assert_eq!(search("straße"), 1);

        // Edits keep the folded title in step
        let edit = IssueEdit {
            title: "Ölspur auf der Fahrbahn".into(),
            description: "description".into(),
            category: "road".into(),
            location: "Mirpur 10".into(),
        };
        assert!(db.edit_issue(issue.id, &edit, "Jonas").unwrap());
        assert_eq!(search("überflutete"), 0);
        assert_eq!(search("ÖLSPUR"), 1);
    }

    #[test]
    fn reaction_is_replaced_not_accumulated() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "Rahim", Role::Citizen);
        let other = seed_user(&db, "Sumi", Role::Citizen);
        let issue = new_issue(&owner, "Flooded road", Priority::Normal);
        db.create_issue(&issue, None).unwrap();

        assert!(db.set_reaction(issue.id, other.id, "up").unwrap());
        assert!(db.set_reaction(issue.id, other.id, "down").unwrap());

        let detail = db.get_issue_detail(issue.id).unwrap().unwrap();
        assert_eq!(detail.reactions.len(), 1);
        assert_eq!(detail.reactions[0].user_id, other.id);
        assert_eq!(detail.reactions[0].kind, "down");

        assert!(!db.set_reaction(Uuid::new_v4(), other.id, "up").unwrap());
    }

    #[test]
    fn upvote_toggle_is_an_involution() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "Rahim", Role::Citizen);
        let other = seed_user(&db, "Sumi", Role::Citizen);
        let issue = new_issue(&owner, "Flooded road", Priority::Normal);
        db.create_issue(&issue, None).unwrap();

        assert_eq!(db.toggle_upvote(issue.id, other.id).unwrap(), Some((true, 1)));
        assert_eq!(db.toggle_upvote(issue.id, other.id).unwrap(), Some((false, 0)));
        assert!(db.get_issue_detail(issue.id).unwrap().unwrap().upvotes.is_empty());
        assert_eq!(db.toggle_upvote(Uuid::new_v4(), other.id).unwrap(), None);
    }

    #[test]
    fn transitions_are_compare_and_swap() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "Rahim", Role::Citizen);
        let staff = seed_user(&db, "Nadia", Role::Staff);
        let issue = new_issue(&owner, "Broken bench", Priority::Normal);
        db.create_issue(&issue, None).unwrap();

        assert!(db.assign_issue(issue.id, IssueStatus::Pending, staff.id, "Nadia", "Admin").unwrap());
        // Stale expectation loses
        assert!(!db.assign_issue(issue.id, IssueStatus::Pending, staff.id, "Nadia", "Admin").unwrap());
        assert!(
            !db.edit_issue(
                issue.id,
                &IssueEdit {
                    title: "x".into(),
                    description: "x".into(),
                    category: "x".into(),
                    location: "x".into(),
                },
                "Rahim"
            )
            .unwrap()
        );

        assert!(
            db.transition_issue(issue.id, IssueStatus::InProgress, IssueStatus::Resolved, "done", "Nadia")
                .unwrap()
        );

        let detail = db.get_issue_detail(issue.id).unwrap().unwrap();
        assert_eq!(detail.issue.status, IssueStatus::Resolved);
        assert_eq!(detail.issue.assigned_staff_id, Some(staff.id));
        assert_eq!(detail.timeline.len(), 3);
        assert_eq!(detail.timeline[1].message, "Assigned to Nadia");
        assert_eq!(detail.timeline[2].message, "done");
        assert!(
            detail
                .timeline
                .windows(2)
                .all(|w| w[0].created_at <= w[1].created_at)
        );

        assert!(!db.delete_issue(issue.id, true).unwrap());
        assert!(db.delete_issue(issue.id, false).unwrap());
        assert!(db.get_issue(issue.id).unwrap().is_none());
    }

    #[test]
    fn timeline_never_goes_backwards() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "Rahim", Role::Citizen);
        // Creation stamped in the future relative to the next edit
        let issue = new_issue_at(&owner, "Clock skew", Priority::Normal, Utc::now() + Duration::hours(1));
        db.create_issue(&issue, None).unwrap();

        let edit = IssueEdit {
            title: "Clock skew".into(),
            description: "d".into(),
            category: "c".into(),
            location: "l".into(),
        };
        assert!(db.edit_issue(issue.id, &edit, "Rahim").unwrap());

        let timeline = db.get_issue_detail(issue.id).unwrap().unwrap().timeline;
        assert_eq!(timeline.len(), 2);
        assert!(timeline[1].created_at >= timeline[0].created_at);
    }

    #[test]
    fn latest_resolved_only_lists_resolved() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "Rahim", Role::Citizen);
        let open = new_issue(&owner, "Still open", Priority::Normal);
        let done = new_issue(&owner, "Fixed", Priority::Normal);
        db.create_issue(&open, None).unwrap();
        db.create_issue(&done, None).unwrap();
        let staff = seed_user(&db, "Sam", Role::Staff);
        assert!(
            db.assign_issue(done.id, IssueStatus::Pending, staff.id, &staff.name, "Admin")
                .unwrap()
        );
        assert!(
            db.transition_issue(done.id, IssueStatus::InProgress, IssueStatus::Resolved, "fixed", "Sam")
                .unwrap()
        );

        let latest = db.latest_resolved(6).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].issue.id, done.id);
    }

    #[test]
    fn comments_append_in_order() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "Rahim", Role::Citizen);
        let issue = new_issue(&owner, "Noise", Priority::Normal);
        db.create_issue(&issue, None).unwrap();

        for body in ["first", "second"] {
            let comment = NewComment {
                user_id: owner.id,
                name: owner.name.clone(),
                avatar_url: None,
                body: body.into(),
            };
            assert!(db.add_comment(issue.id, &comment).unwrap());
        }

        let comments = db.get_issue_detail(issue.id).unwrap().unwrap().comments;
        let bodies: Vec<&str> = comments.iter().map(|c| c.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
    }
}
