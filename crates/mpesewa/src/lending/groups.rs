//! Country-scoped lending groups: founding, membership and admin succession.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{CountryCode, GroupId, Loan, LoanId, LoanStatus, Role, User, UserId};
use super::eligibility::{DenialReason, EligibilityPolicy};
use super::error::{LendingError, StateError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum GroupRule {
    /// Most loans a borrower may hold in the group at once.
    MaxLoans(u32),
    MinRating(f32),
}

impl GroupRule {
    pub fn describe(&self) -> String {
        match self {
            GroupRule::MaxLoans(max) => format!("at most {max} loan(s) per borrower"),
            GroupRule::MinRating(min) => format!("member rating of at least {min:.1}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub country: CountryCode,
    pub members: Vec<GroupMember>,
    /// Group admins; the first entry is the primary admin.
    pub admins: Vec<UserId>,
    #[serde(default)]
    pub invite_only: bool,
    #[serde(default)]
    pub invite_code: Option<String>,
    #[serde(default)]
    pub loans: Vec<LoanId>,
    #[serde(default)]
    pub rules: Vec<GroupRule>,
    #[serde(default)]
    pub dissolved: bool,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.iter().any(|member| &member.user_id == user)
    }

    pub fn is_admin(&self, user: &UserId) -> bool {
        self.admins.contains(user)
    }

    pub fn primary_admin(&self) -> Option<&UserId> {
        self.admins.first()
    }

    fn joined_at(&self, user: &UserId) -> Option<DateTime<Utc>> {
        self.members
            .iter()
            .find(|member| &member.user_id == user)
            .map(|member| member.joined_at)
    }
}

/// Settings chosen by the group's creator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupDraft {
    pub name: String,
    #[serde(default)]
    pub invite_only: bool,
    #[serde(default)]
    pub invite_code: Option<String>,
    #[serde(default)]
    pub rules: Vec<GroupRule>,
}

static INVITE_SEQUENCE: AtomicU64 = AtomicU64::new(1);
const INVITE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Eight-character code from the alphabet `A-Z0-9`.
pub fn generate_invite_code(group: &GroupId) -> String {
    let mut hasher = RandomState::new().build_hasher();
    group.hash(&mut hasher);
    INVITE_SEQUENCE
        .fetch_add(1, Ordering::Relaxed)
        .hash(&mut hasher);
    let mut seed = hasher.finish();

    let mut code = String::with_capacity(8);
    for _ in 0..8 {
        let index = (seed % INVITE_ALPHABET.len() as u64) as usize;
        code.push(INVITE_ALPHABET[index] as char);
        seed /= INVITE_ALPHABET.len() as u64;
    }
    code
}

/// Found a group. The creator becomes primary admin and first member; the
/// other founders follow in the order given.
pub fn create(
    policy: &EligibilityPolicy,
    id: GroupId,
    draft: GroupDraft,
    creator: &mut User,
    others: &mut [User],
    now: DateTime<Utc>,
) -> Result<Group, LendingError> {
    let founders: Vec<User> = std::iter::once(creator.clone())
        .chain(others.iter().cloned())
        .collect();
    policy
        .can_create_group(creator, &founders)
        .into_result()?;

    let invite_code = if draft.invite_only {
        Some(
            draft
                .invite_code
                .filter(|code| !code.trim().is_empty())
                .unwrap_or_else(|| generate_invite_code(&id)),
        )
    } else {
        None
    };

    let group = Group {
        id: id.clone(),
        name: draft.name,
        country: creator.country.clone(),
        members: founders
            .iter()
            .map(|founder| GroupMember {
                user_id: founder.id.clone(),
                joined_at: now,
            })
            .collect(),
        admins: vec![creator.id.clone()],
        invite_only: draft.invite_only,
        invite_code,
        loans: Vec::new(),
        rules: draft.rules,
        dissolved: false,
        created_at: now,
    };

    creator.roles.insert(Role::GroupAdmin);
    creator.groups.push(id.clone());
    for member in others.iter_mut() {
        member.groups.push(id.clone());
    }

    Ok(group)
}

pub fn join(
    policy: &EligibilityPolicy,
    group: &mut Group,
    user: &mut User,
    invite_code: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), LendingError> {
    if group.is_member(&user.id) {
        return Err(StateError::AlreadyMember.into());
    }
    policy.can_join_group(user, group).into_result()?;

    if group.invite_only {
        let supplied = invite_code.map(str::trim);
        if supplied.is_none() || supplied != group.invite_code.as_deref() {
            return Err(DenialReason::InvalidInviteCode.into());
        }
    }

    group.members.push(GroupMember {
        user_id: user.id.clone(),
        joined_at: now,
    });
    if !user.belongs_to(&group.id) {
        user.groups.push(group.id.clone());
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveOutcome {
    pub dissolved: bool,
    pub primary_admin: Option<UserId>,
}

/// Remove a member. A departing primary admin hands over to the
/// earliest-joined remaining admin; the last member out dissolves the group.
pub fn leave(group: &mut Group, user: &mut User) -> Result<LeaveOutcome, LendingError> {
    if group.dissolved {
        return Err(StateError::GroupDissolved.into());
    }
    if !group.is_member(&user.id) {
        return Err(StateError::NotMember.into());
    }

    let remaining = group.members.len() - 1;
    let was_admin = group.is_admin(&user.id);
    if was_admin && group.admins.len() == 1 && remaining > 0 {
        return Err(StateError::SoleAdmin.into());
    }

    let was_primary = group.primary_admin() == Some(&user.id);
    group.admins.retain(|admin| admin != &user.id);
    if was_primary {
        promote_earliest_admin(group);
    }
    group.members.retain(|member| member.user_id != user.id);
    user.groups.retain(|id| id != &group.id);

    if group.members.is_empty() {
        group.dissolved = true;
        group.admins.clear();
    }

    Ok(LeaveOutcome {
        dissolved: group.dissolved,
        primary_admin: group.primary_admin().cloned(),
    })
}

fn promote_earliest_admin(group: &mut Group) {
    let successor = group
        .admins
        .iter()
        .enumerate()
        .min_by_key(|(_, admin)| group.joined_at(admin))
        .map(|(index, _)| index);
    if let Some(index) = successor {
        let admin = group.admins.remove(index);
        group.admins.insert(0, admin);
    }
}

pub fn appoint_admin(
    group: &mut Group,
    actor: &User,
    target: &mut User,
) -> Result<(), LendingError> {
    if !group.is_admin(&actor.id) {
        return Err(StateError::AdminRequired {
            action: "appointing a group admin",
        }
        .into());
    }
    if !group.is_member(&target.id) {
        return Err(StateError::NotMember.into());
    }
    if !group.is_admin(&target.id) {
        group.admins.push(target.id.clone());
    }
    target.roles.insert(Role::GroupAdmin);
    Ok(())
}

/// Hand `from`'s admin seat (primary included) to `to`.
pub fn transfer_admin(
    group: &mut Group,
    from: &User,
    to: &mut User,
) -> Result<(), LendingError> {
    if !group.is_admin(&from.id) {
        return Err(StateError::AdminRequired {
            action: "transferring group admin",
        }
        .into());
    }
    if !group.is_member(&to.id) {
        return Err(StateError::NotMember.into());
    }
    if from.id == to.id {
        return Ok(());
    }

    group.admins.retain(|admin| admin != &to.id);
    if let Some(seat) = group.admins.iter().position(|admin| admin == &from.id) {
        group.admins[seat] = to.id.clone();
    }
    to.roles.insert(Role::GroupAdmin);
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatistics {
    pub total_members: usize,
    pub lenders: usize,
    pub borrowers: usize,
    pub total_loans: usize,
    pub total_amount: f64,
    /// Whole percentage of the group's loans that are cleared; 100 with no loans.
    pub repayment_rate: u32,
    pub is_full: bool,
}

/// `members` should hold the group's member records; others are ignored.
pub fn statistics(
    policy: &EligibilityPolicy,
    group: &Group,
    members: &[User],
    loans: &[Loan],
) -> GroupStatistics {
    let members: Vec<&User> = members
        .iter()
        .filter(|user| group.is_member(&user.id))
        .collect();
    let lenders = members
        .iter()
        .filter(|user| {
            user.is_lender()
                && user
                    .subscription
                    .as_ref()
                    .is_some_and(|subscription| subscription.is_active())
        })
        .count();
    let borrowers = members
        .iter()
        .filter(|user| user.is_borrower() && !user.blacklisted)
        .count();

    let loans: Vec<&Loan> = loans
        .iter()
        .filter(|loan| loan.group_id == group.id)
        .collect();
    let cleared = loans
        .iter()
        .filter(|loan| loan.status == LoanStatus::Cleared)
        .count();
    let repayment_rate = if loans.is_empty() {
        100
    } else {
        (cleared as f64 / loans.len() as f64 * 100.0).round() as u32
    };

    GroupStatistics {
        total_members: group.members.len(),
        lenders,
        borrowers,
        total_loans: loans.len(),
        total_amount: loans.iter().map(|loan| loan.amount).sum(),
        repayment_rate,
        is_full: group.members.len() >= policy.max_group_members,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleViolation {
    pub member_id: UserId,
    pub rule: GroupRule,
    pub actual: f64,
    pub limit: f64,
}

fn loans_held(group: &Group, user: &UserId, loans: &[Loan]) -> usize {
    loans
        .iter()
        .filter(|loan| {
            loan.group_id == group.id
                && &loan.borrower_id == user
                && loan.status != LoanStatus::Cleared
        })
        .count()
}

/// Current members breaking the group's rules.
pub fn rule_violations(group: &Group, members: &[User], loans: &[Loan]) -> Vec<RuleViolation> {
    let mut violations = Vec::new();
    for member in members.iter().filter(|user| group.is_member(&user.id)) {
        for rule in &group.rules {
            match rule {
                GroupRule::MaxLoans(max) if member.is_borrower() => {
                    let held = loans_held(group, &member.id, loans);
                    if held > *max as usize {
                        violations.push(RuleViolation {
                            member_id: member.id.clone(),
                            rule: rule.clone(),
                            actual: held as f64,
                            limit: f64::from(*max),
                        });
                    }
                }
                GroupRule::MinRating(min) if member.rating < *min => {
                    violations.push(RuleViolation {
                        member_id: member.id.clone(),
                        rule: rule.clone(),
                        actual: f64::from(member.rating),
                        limit: f64::from(*min),
                    });
                }
                _ => {}
            }
        }
    }
    violations
}

/// First rule a new loan request by `borrower` would break.
pub fn rule_blocking_request<'a>(
    group: &'a Group,
    borrower: &User,
    loans: &[Loan],
) -> Option<&'a GroupRule> {
    group.rules.iter().find(|rule| match rule {
        GroupRule::MaxLoans(max) => loans_held(group, &borrower.id, loans) + 1 > *max as usize,
        GroupRule::MinRating(min) => borrower.rating < *min,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_codes_use_the_code_alphabet() {
        let first = generate_invite_code(&GroupId::new("grp-1"));
        let second = generate_invite_code(&GroupId::new("grp-1"));
        assert_eq!(first.len(), 8);
        assert!(first
            .bytes()
            .all(|byte| byte.is_ascii_uppercase() || byte.is_ascii_digit()));
        assert_ne!(first, second);
    }

    #[test]
    fn rules_describe_themselves() {
        assert_eq!(GroupRule::MaxLoans(2).describe(), "at most 2 loan(s) per borrower");
        assert_eq!(
            GroupRule::MinRating(3.5).describe(),
            "member rating of at least 3.5"
        );
    }
}
