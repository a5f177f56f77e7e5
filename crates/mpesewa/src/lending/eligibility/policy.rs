use serde::{Deserialize, Serialize};

use super::super::domain::{CategoryId, GroupId, UserId};
use super::super::groups::GroupRule;

/// Outcome of an eligibility check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Verdict {
    Allowed,
    Denied(DenialReason),
}

impl Verdict {
    pub fn allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }

    pub fn code(&self) -> &'static str {
        match self {
            Verdict::Allowed => "allowed",
            Verdict::Denied(reason) => reason.code(),
        }
    }

    /// Human-readable reason; empty when allowed.
    pub fn reason(&self) -> String {
        match self {
            Verdict::Allowed => String::new(),
            Verdict::Denied(reason) => reason.summary(),
        }
    }

    pub fn into_result(self) -> Result<(), DenialReason> {
        match self {
            Verdict::Allowed => Ok(()),
            Verdict::Denied(reason) => Err(reason),
        }
    }
}

/// Business-rule rejections, each with a stable machine code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DenialReason {
    Blacklisted,
    NotBorrower,
    NotLender,
    NoGroupMembership,
    LoanSlotsExhausted {
        active: usize,
        groups: usize,
    },
    CategoryActiveInGroup {
        category: CategoryId,
        group: GroupId,
    },
    CategoryAlreadyStaged(CategoryId),
    NotGroupMember(GroupId),
    SubscriptionInactive,
    ExceedsTierHeadroom {
        requested: f64,
        available: f64,
    },
    ExceedsPerLoanCap {
        requested: f64,
        cap: f64,
    },
    BorrowerBlacklisted,
    SelfFunding,
    CountryMismatch,
    GroupDissolved,
    GroupFull {
        max: usize,
    },
    GroupBelowMinimum {
        members: usize,
        min: usize,
    },
    BorrowerGroupLimit {
        max: usize,
    },
    FoundingMembersOutOfRange {
        count: usize,
        min: usize,
        max: usize,
    },
    MemberBlacklisted(UserId),
    MemberCountryMismatch(UserId),
    InvalidInviteCode,
    GroupRuleBroken(GroupRule),
    EmptyCart,
    UnknownCategory(CategoryId),
    AmountOutOfBounds {
        amount: f64,
        min: f64,
        max: f64,
    },
}

impl DenialReason {
    pub const fn code(&self) -> &'static str {
        match self {
            DenialReason::Blacklisted => "blacklisted",
            DenialReason::NotBorrower => "not_borrower",
            DenialReason::NotLender => "not_lender",
            DenialReason::NoGroupMembership => "no_group_membership",
            DenialReason::LoanSlotsExhausted { .. } => "loan_slots_exhausted",
            DenialReason::CategoryActiveInGroup { .. } => "category_active_in_group",
            DenialReason::CategoryAlreadyStaged(_) => "category_already_staged",
            DenialReason::NotGroupMember(_) => "not_group_member",
            DenialReason::SubscriptionInactive => "subscription_inactive",
            DenialReason::ExceedsTierHeadroom { .. } => "exceeds_tier_limit",
            DenialReason::ExceedsPerLoanCap { .. } => "exceeds_per_loan_cap",
            DenialReason::BorrowerBlacklisted => "borrower_blacklisted",
            DenialReason::SelfFunding => "self_funding",
            DenialReason::CountryMismatch => "country_mismatch",
            DenialReason::GroupDissolved => "group_dissolved",
            DenialReason::GroupFull { .. } => "group_full",
            DenialReason::GroupBelowMinimum { .. } => "group_below_minimum",
            DenialReason::BorrowerGroupLimit { .. } => "borrower_group_limit",
            DenialReason::FoundingMembersOutOfRange { .. } => "founding_members_out_of_range",
            DenialReason::MemberBlacklisted(_) => "member_blacklisted",
            DenialReason::MemberCountryMismatch(_) => "member_country_mismatch",
            DenialReason::InvalidInviteCode => "invalid_invite_code",
            DenialReason::GroupRuleBroken(_) => "group_rule_broken",
            DenialReason::EmptyCart => "empty_cart",
            DenialReason::UnknownCategory(_) => "unknown_category",
            DenialReason::AmountOutOfBounds { .. } => "amount_out_of_bounds",
        }
    }

    pub fn summary(&self) -> String {
        match self {
            DenialReason::Blacklisted => "user is blacklisted".to_string(),
            DenialReason::NotBorrower => "user is not registered as a borrower".to_string(),
            DenialReason::NotLender => "user is not registered as a lender".to_string(),
            DenialReason::NoGroupMembership => "borrower must belong to a group".to_string(),
            DenialReason::LoanSlotsExhausted { active, groups } => format!(
                "{active} active loan(s) already use all {groups} group slot(s)"
            ),
            DenialReason::CategoryActiveInGroup { category, group } => format!(
                "an active {category} loan already exists in group {group}"
            ),
            DenialReason::CategoryAlreadyStaged(category) => {
                format!("{category} is already staged for request")
            }
            DenialReason::NotGroupMember(group) => format!("user is not a member of {group}"),
            DenialReason::SubscriptionInactive => "lender subscription is not active".to_string(),
            DenialReason::ExceedsTierHeadroom {
                requested,
                available,
            } => format!(
                "requested {requested:.2} exceeds available tier headroom of {available:.2}"
            ),
            DenialReason::ExceedsPerLoanCap { requested, cap } => {
                format!("requested {requested:.2} exceeds the per-loan cap of {cap:.2}")
            }
            DenialReason::BorrowerBlacklisted => "borrower is blacklisted".to_string(),
            DenialReason::SelfFunding => "lenders cannot fund their own loans".to_string(),
            DenialReason::CountryMismatch => {
                "lending and membership never cross countries".to_string()
            }
            DenialReason::GroupDissolved => "group has been dissolved".to_string(),
            DenialReason::GroupFull { max } => format!("group already has {max} members"),
            DenialReason::GroupBelowMinimum { members, min } => format!(
                "group has {members} member(s); only group admins may join below {min}"
            ),
            DenialReason::BorrowerGroupLimit { max } => {
                format!("borrowers may belong to at most {max} groups")
            }
            DenialReason::FoundingMembersOutOfRange { count, min, max } => {
                format!("groups start with {min} to {max} members, got {count}")
            }
            DenialReason::MemberBlacklisted(user) => format!("member {user} is blacklisted"),
            DenialReason::MemberCountryMismatch(user) => {
                format!("member {user} is registered in another country")
            }
            DenialReason::InvalidInviteCode => "invite code does not match".to_string(),
            DenialReason::GroupRuleBroken(rule) => {
                format!("group rule not met: {}", rule.describe())
            }
            DenialReason::EmptyCart => "loan cart is empty".to_string(),
            DenialReason::UnknownCategory(category) => {
                format!("unknown loan category {category}")
            }
            DenialReason::AmountOutOfBounds { amount, min, max } => {
                format!("amount {amount:.2} is outside [{min:.2}, {max:.2}]")
            }
        }
    }
}
