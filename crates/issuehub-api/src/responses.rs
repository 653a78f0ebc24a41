//! Row-to-wire conversions shared by the handlers.

use issuehub_db::models::{IssueDetail, PaymentRow, UserRow};
use issuehub_types::api::{
    AssignedStaff, Comment, IssueResponse, PaymentResponse, Reaction, TimelineEntry, UserSummary,
};

pub fn user_summary(user: &UserRow) -> UserSummary {
    UserSummary {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        role: user.role,
        subscription: user.subscription,
        blocked: user.blocked,
        avatar_url: user.avatar_url.clone(),
        phone: user.phone.clone(),
        issues_created: user.issues_created,
        created_at: user.created_at,
    }
}

pub fn issue_response(detail: IssueDetail) -> IssueResponse {
    let IssueDetail {
        issue,
        upvotes,
        reactions,
        comments,
        timeline,
    } = detail;

    let assigned_staff = match (issue.assigned_staff_id, issue.assigned_staff_name) {
        (Some(id), Some(name)) => Some(AssignedStaff { id, name }),
        _ => None,
    };

    IssueResponse {
        id: issue.id,
        owner_id: issue.owner_id,
        citizen_name: issue.citizen_name,
        title: issue.title,
        description: issue.description,
        category: issue.category,
        location: issue.location,
        status: issue.status,
        priority: issue.priority,
        assigned_staff,
        upvotes,
        reactions: reactions
            .into_iter()
            .map(|r| Reaction {
                user_id: r.user_id,
                kind: r.kind,
                created_at: r.created_at,
            })
            .collect(),
        comments: comments
            .into_iter()
            .map(|c| Comment {
                user_id: c.user_id,
                name: c.name,
                avatar_url: c.avatar_url,
                text: c.body,
                created_at: c.created_at,
            })
            .collect(),
        timeline: timeline
            .into_iter()
            .map(|t| TimelineEntry {
                status: t.status,
                message: t.message,
                updated_by: t.actor,
                created_at: t.created_at,
            })
            .collect(),
        image_url: issue.image_url,
        created_at: issue.created_at,
        updated_at: issue.updated_at,
    }
}

pub fn payment_response(payment: PaymentRow) -> PaymentResponse {
    PaymentResponse {
        id: payment.id,
        session_id: payment.session_id,
        kind: payment.kind,
        user_id: payment.user_id,
        issue_id: payment.issue_id,
        amount: payment.amount,
        currency: payment.currency,
        status: payment.status,
        created_at: payment.created_at,
    }
}
