use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::subscription::Subscription;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier for a registered borrower, lender or administrator.
    UserId
);
string_id!(
    /// Identifier for a country-scoped lending group.
    GroupId
);
string_id!(
    /// Identifier for a loan request and, once funded, its ledger.
    LoanId
);
string_id!(RepaymentId);
string_id!(BlacklistId);
string_id!(OverrideId);
string_id!(
    /// Loan category slug such as `fare` or `school-fees`.
    CategoryId
);
string_id!(
    /// ISO 3166 alpha-2 code (`KE`, `UG`, ...).
    CountryCode
);

/// Platform roles. A user may hold several at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Borrower,
    Lender,
    Admin,
    GroupAdmin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Borrower => "borrower",
            Role::Lender => "lender",
            Role::Admin => "admin",
            Role::GroupAdmin => "group_admin",
        }
    }
}

/// Person vouching for a borrower at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guarantor {
    pub name: String,
    pub phone: String,
    #[serde(default = "default_relationship")]
    pub relationship: String,
}

fn default_relationship() -> String {
    "guarantor".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub phone: String,
    pub roles: BTreeSet<Role>,
    pub country: CountryCode,
    #[serde(default = "default_rating")]
    pub rating: f32,
    #[serde(default)]
    pub rating_count: u32,
    #[serde(default)]
    pub blacklisted: bool,
    #[serde(default)]
    pub groups: Vec<GroupId>,
    #[serde(default)]
    pub guarantors: Vec<Guarantor>,
    #[serde(default)]
    pub subscription: Option<Subscription>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

fn default_rating() -> f32 {
    User::DEFAULT_RATING
}

fn default_active() -> bool {
    true
}

impl User {
    pub const DEFAULT_RATING: f32 = 5.0;
    pub const MAX_RATING: f32 = 5.0;

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_borrower(&self) -> bool {
        self.has_role(Role::Borrower)
    }

    pub fn is_lender(&self) -> bool {
        self.has_role(Role::Lender)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn is_group_admin(&self) -> bool {
        self.has_role(Role::GroupAdmin)
    }

    pub fn belongs_to(&self, group: &GroupId) -> bool {
        self.groups.contains(group)
    }

    /// Fold a new score into the running average.
    pub fn apply_rating(&mut self, score: f32) {
        let total = self.rating * self.rating_count as f32 + score;
        self.rating_count += 1;
        self.rating = (total / self.rating_count as f32).clamp(0.0, Self::MAX_RATING);
    }
}

/// Stored lifecycle of a loan. Overdue is never stored; see [`LoanStanding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Requested,
    Approved,
    Active,
    Cleared,
}

impl LoanStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LoanStatus::Requested => "requested",
            LoanStatus::Approved => "approved",
            LoanStatus::Active => "active",
            LoanStatus::Cleared => "cleared",
        }
    }

    /// Funded and not yet cleared.
    pub const fn is_outstanding(self) -> bool {
        matches!(self, LoanStatus::Approved | LoanStatus::Active)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "requested" => Some(LoanStatus::Requested),
            "approved" => Some(LoanStatus::Approved),
            "active" => Some(LoanStatus::Active),
            "cleared" | "repaid" => Some(LoanStatus::Cleared),
            _ => None,
        }
    }
}

/// Display status derived from the stored status and the evaluation date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStanding {
    Requested,
    Approved,
    Active,
    Overdue,
    Cleared,
}

impl LoanStanding {
    pub const fn label(self) -> &'static str {
        match self {
            LoanStanding::Requested => "requested",
            LoanStanding::Approved => "approved",
            LoanStanding::Active => "active",
            LoanStanding::Overdue => "overdue",
            LoanStanding::Cleared => "cleared",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub borrower_id: UserId,
    pub lender_id: Option<UserId>,
    pub group_id: GroupId,
    pub category: CategoryId,
    pub amount: f64,
    /// Weekly rate as a fraction (0.10 = 10% per week).
    pub interest_rate: f64,
    /// Daily rate as a fraction applied per overdue day.
    pub penalty_rate: f64,
    pub purpose: String,
    pub repayment_days: u32,
    pub requested_at: DateTime<Utc>,
    pub loan_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub repayments: Vec<Repayment>,
    pub guarantors: Vec<Guarantor>,
    /// Fixed penalty set by an admin override; replaces the computed penalty.
    pub penalty_override: Option<f64>,
    pub cleared_at: Option<DateTime<Utc>>,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepaymentMethod {
    Mpesa,
    Cash,
    BankTransfer,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepaymentStatus {
    Verified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repayment {
    pub id: RepaymentId,
    pub loan_id: LoanId,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub method: RepaymentMethod,
    pub reference: String,
    pub recorded_by: UserId,
    pub recorded_at: DateTime<Utc>,
    pub status: RepaymentStatus,
}

/// A loan request staged by a borrower before submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub category: CategoryId,
    pub group_id: GroupId,
    pub amount: f64,
    pub repayment_days: u32,
    #[serde(default)]
    pub purpose: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoanCart {
    pub items: Vec<CartItem>,
}

impl LoanCart {
    pub fn contains(&self, category: &CategoryId) -> bool {
        self.items.iter().any(|item| &item.category == category)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
