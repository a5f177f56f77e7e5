//! Pure eligibility checks. Each returns a [`Verdict`] computed only from the
//! snapshot it is given.

mod config;
mod policy;
mod rules;

pub use config::EligibilityPolicy;
pub use policy::{DenialReason, Verdict};

use super::domain::{CategoryId, Loan, LoanCart, User};
use super::groups::Group;
use super::reference::{Country, ReferenceData};
use super::tiers::TierRegistry;

impl EligibilityPolicy {
    /// Blacklisting is checked first and dominates every other rule.
    /// `staged` holds categories already in the cart or awaiting a lender.
    pub fn can_request_loan(
        &self,
        borrower: &User,
        category: &CategoryId,
        loans: &[Loan],
        staged: &[CategoryId],
    ) -> Verdict {
        rules::request_loan(borrower, category, loans, staged)
    }

    /// `group` is the loan's group; the lender must be one of its members.
    pub fn can_lend(
        &self,
        tiers: &TierRegistry,
        lender: &User,
        borrower: &User,
        loan: &Loan,
        group: &Group,
        lender_loans: &[Loan],
    ) -> Verdict {
        rules::lend(tiers, lender, borrower, loan, group, lender_loans)
    }

    pub fn can_join_group(&self, user: &User, group: &Group) -> Verdict {
        rules::join_group(self, user, group)
    }

    pub fn can_create_group(&self, creator: &User, founders: &[User]) -> Verdict {
        rules::create_group(self, creator, founders)
    }

    pub fn can_submit_cart(
        &self,
        borrower: &User,
        cart: &LoanCart,
        country: &Country,
        reference: &ReferenceData,
    ) -> Verdict {
        rules::submit_cart(borrower, cart, country, reference)
    }
}
