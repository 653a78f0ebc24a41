use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a stored or submitted enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Implements `as_str`, `Display` and `FromStr` over the serde names so the
/// database and the wire format always agree.
macro_rules! string_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Citizen,
    Staff,
    Admin,
}

string_enum!(Role, "role", {
    Citizen => "citizen",
    Staff => "staff",
    Admin => "admin",
});

impl Role {
    /// Admins satisfy every role requirement; everyone else must match exactly.
    pub fn satisfies(&self, required: Role) -> bool {
        *self == Role::Admin || *self == required
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subscription {
    Free,
    Premium,
}

string_enum!(Subscription, "subscription", {
    Free => "free",
    Premium => "premium",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueStatus {
    Pending,
    InProgress,
    Resolved,
    Rejected,
}

string_enum!(IssueStatus, "status", {
    Pending => "pending",
    InProgress => "in-progress",
    Resolved => "resolved",
    Rejected => "rejected",
});

impl IssueStatus {
    /// Moves an assignee may make from the staff surface. Work starts through
    /// assignment, so the only edge here is in-progress to resolved.
    pub fn can_advance_to(&self, next: IssueStatus) -> bool {
        matches!((self, next), (Self::InProgress, Self::Resolved))
    }

    /// Assignment keeps or moves the issue into progress.
    pub fn can_assign(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    pub fn can_reject(&self) -> bool {
        *self != Self::Rejected
    }

    /// Owners may only touch an issue nobody has started on.
    pub fn is_editable(&self) -> bool {
        *self == Self::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    High,
}

string_enum!(Priority, "priority", {
    Normal => "normal",
    High => "high",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Boost,
    Premium,
}

string_enum!(PaymentKind, "payment kind", {
    Boost => "boost",
    Premium => "premium",
});
