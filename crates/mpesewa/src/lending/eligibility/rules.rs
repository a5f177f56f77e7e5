use super::super::domain::{CategoryId, Loan, LoanCart, User};
use super::super::groups::Group;
use super::super::reference::{Country, ReferenceData};
use super::super::tiers::{can_lend_amount, TierRegistry};
use super::config::EligibilityPolicy;
use super::policy::{DenialReason, Verdict};

macro_rules! deny {
    ($reason:expr) => {
        return Verdict::Denied($reason)
    };
}

pub(crate) fn request_loan(
    borrower: &User,
    category: &CategoryId,
    loans: &[Loan],
    staged: &[CategoryId],
) -> Verdict {
    if borrower.blacklisted {
        deny!(DenialReason::Blacklisted);
    }
    if !borrower.is_borrower() {
        deny!(DenialReason::NotBorrower);
    }
    if borrower.groups.is_empty() {
        deny!(DenialReason::NoGroupMembership);
    }

    let outstanding: Vec<&Loan> = loans
        .iter()
        .filter(|loan| loan.borrower_id == borrower.id && loan.status.is_outstanding())
        .collect();
    if outstanding.len() >= borrower.groups.len() {
        deny!(DenialReason::LoanSlotsExhausted {
            active: outstanding.len(),
            groups: borrower.groups.len(),
        });
    }

    if let Some(loan) = outstanding
        .iter()
        .find(|loan| &loan.category == category && borrower.belongs_to(&loan.group_id))
    {
        deny!(DenialReason::CategoryActiveInGroup {
            category: category.clone(),
            group: loan.group_id.clone(),
        });
    }

    if staged.contains(category) {
        deny!(DenialReason::CategoryAlreadyStaged(category.clone()));
    }

    Verdict::Allowed
}

pub(crate) fn lend(
    tiers: &TierRegistry,
    lender: &User,
    borrower: &User,
    loan: &Loan,
    group: &Group,
    lender_loans: &[Loan],
) -> Verdict {
    if !lender.is_lender() {
        deny!(DenialReason::NotLender);
    }
    let subscription = match &lender.subscription {
        Some(subscription) if subscription.is_active() => subscription,
        _ => deny!(DenialReason::SubscriptionInactive),
    };
    let tier = tiers.get(subscription.tier);

    let exposure: f64 = lender_loans
        .iter()
        .filter(|other| {
            other.lender_id.as_ref() == Some(&lender.id)
                && other.status.is_outstanding()
                && other.id != loan.id
        })
        .map(|other| other.amount)
        .sum();
    if !can_lend_amount(tier, loan.amount, exposure) {
        deny!(DenialReason::ExceedsTierHeadroom {
            requested: loan.amount,
            available: (tier.weekly_limit - exposure).max(0.0),
        });
    }

    if borrower.blacklisted {
        deny!(DenialReason::BorrowerBlacklisted);
    }
    if loan.amount > tier.per_loan_limit {
        deny!(DenialReason::ExceedsPerLoanCap {
            requested: loan.amount,
            cap: tier.per_loan_limit,
        });
    }
    if lender.country != borrower.country {
        deny!(DenialReason::CountryMismatch);
    }
    // Requests are only visible to lenders inside the loan's group.
    if !group.is_member(&lender.id) {
        deny!(DenialReason::NotGroupMember(group.id.clone()));
    }
    if lender.id == borrower.id {
        deny!(DenialReason::SelfFunding);
    }

    Verdict::Allowed
}

pub(crate) fn join_group(policy: &EligibilityPolicy, user: &User, group: &Group) -> Verdict {
    if user.blacklisted {
        deny!(DenialReason::Blacklisted);
    }
    if group.dissolved {
        deny!(DenialReason::GroupDissolved);
    }
    if user.country != group.country {
        deny!(DenialReason::CountryMismatch);
    }

    let members = group.members.len();
    if members >= policy.max_group_members {
        deny!(DenialReason::GroupFull {
            max: policy.max_group_members,
        });
    }
    if members < policy.min_group_members && !user.is_group_admin() {
        deny!(DenialReason::GroupBelowMinimum {
            members,
            min: policy.min_group_members,
        });
    }
    if user.is_borrower() && user.groups.len() >= policy.max_borrower_groups {
        deny!(DenialReason::BorrowerGroupLimit {
            max: policy.max_borrower_groups,
        });
    }

    Verdict::Allowed
}

/// `founders` is the full founding list, creator included.
pub(crate) fn create_group(
    policy: &EligibilityPolicy,
    creator: &User,
    founders: &[User],
) -> Verdict {
    if creator.blacklisted {
        deny!(DenialReason::Blacklisted);
    }

    let count = founders.len();
    if count < policy.min_group_members || count > policy.max_group_members {
        deny!(DenialReason::FoundingMembersOutOfRange {
            count,
            min: policy.min_group_members,
            max: policy.max_group_members,
        });
    }

    for member in founders {
        if member.blacklisted {
            deny!(DenialReason::MemberBlacklisted(member.id.clone()));
        }
        if member.country != creator.country {
            deny!(DenialReason::MemberCountryMismatch(member.id.clone()));
        }
        if member.is_borrower() && member.groups.len() >= policy.max_borrower_groups {
            deny!(DenialReason::BorrowerGroupLimit {
                max: policy.max_borrower_groups,
            });
        }
    }

    Verdict::Allowed
}

pub(crate) fn submit_cart(
    borrower: &User,
    cart: &LoanCart,
    country: &Country,
    reference: &ReferenceData,
) -> Verdict {
    if borrower.blacklisted {
        deny!(DenialReason::Blacklisted);
    }
    if cart.is_empty() {
        deny!(DenialReason::EmptyCart);
    }
    if borrower.groups.is_empty() {
        deny!(DenialReason::NoGroupMembership);
    }

    for item in &cart.items {
        if !borrower.belongs_to(&item.group_id) {
            deny!(DenialReason::NotGroupMember(item.group_id.clone()));
        }
        let category = match reference.category(&item.category) {
            Ok(category) => category,
            Err(_) => deny!(DenialReason::UnknownCategory(item.category.clone())),
        };
        let min = category.min_amount.max(country.min_loan);
        let max = category.max_amount.min(country.max_loan);
        if item.amount < min || item.amount > max {
            deny!(DenialReason::AmountOutOfBounds {
                amount: item.amount,
                min,
                max,
            });
        }
    }

    Verdict::Allowed
}
