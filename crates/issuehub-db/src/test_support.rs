use chrono::{DateTime, Utc};
use uuid::Uuid;

use issuehub_types::{Priority, Role};

use crate::Database;
use crate::models::{NewIssue, NewUser};

pub(crate) fn new_user(name: &str, role: Role) -> NewUser {
    NewUser {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        password_hash: "hash".to_string(),
        role,
        avatar_url: None,
        phone: None,
    }
}

pub(crate) fn seed_user(db: &Database, name: &str, role: Role) -> NewUser {
    let user = new_user(name, role);
    db.create_user(&user).unwrap();
    user
}

pub(crate) fn new_issue(owner: &NewUser, title: &str, priority: Priority) -> NewIssue {
    new_issue_at(owner, title, priority, Utc::now())
}

pub(crate) fn new_issue_at(
    owner: &NewUser,
    title: &str,
    priority: Priority,
    created_at: DateTime<Utc>,
) -> NewIssue {
    NewIssue {
        id: Uuid::new_v4(),
        owner_id: owner.id,
        citizen_name: owner.name.clone(),
        title: title.to_string(),
        description: "description".to_string(),
        category: "road".to_string(),
        location: "Mirpur 10".to_string(),
        priority,
        image_url: None,
        created_at,
        timeline_message: "Issue reported".to_string(),
    }
}
