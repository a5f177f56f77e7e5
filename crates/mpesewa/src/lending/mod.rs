//! Loan lifecycle, eligibility, group membership and lender subscriptions.
//!
//! Pure rule modules (`calculator`, `eligibility`, `ledger`, `groups`,
//! `blacklist`, `subscription`) operate on plain records. [`LendingService`]
//! composes them over a [`LendingRepository`] and a [`Clock`], and
//! [`lending_router`] exposes the service over HTTP.

pub mod blacklist;
pub mod calculator;
pub mod clock;
pub mod dates;
pub mod domain;
pub mod eligibility;
pub mod error;
pub mod groups;
pub mod ledger;
pub mod memory;
pub mod money;
pub mod reference;
pub mod repository;
pub mod router;
pub mod service;
pub mod subscription;
pub mod tiers;

#[cfg(test)]
mod tests;

pub use blacklist::{Blacklist, BlacklistEntry, DefaultedDebt, DEFAULT_BLACKLIST_AFTER_DAYS};
pub use calculator::{LoanQuote, QuoteWarning, RateCard};
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::{
    BlacklistId, CartItem, CategoryId, CountryCode, GroupId, Guarantor, Loan, LoanCart, LoanId,
    LoanStanding, LoanStatus, OverrideId, Repayment, RepaymentId, RepaymentMethod,
    RepaymentStatus, Role, User, UserId,
};
pub use eligibility::{DenialReason, EligibilityPolicy, Verdict};
pub use error::{LendingError, StateError, ValidationError};
pub use groups::{
    Group, GroupDraft, GroupMember, GroupRule, GroupStatistics, LeaveOutcome, RuleViolation,
};
pub use ledger::{
    LoanOverride, LoanRequest, LoanView, OverrideOutcome, OverrideRecord, OverrideRequest,
    RejectedOverride, RepaymentInput, RepaymentReceipt,
};
pub use memory::InMemoryLendingRepository;
pub use reference::{Country, LoanCategory, ReferenceData, ReferenceError};
pub use repository::{LendingRepository, RepositoryError, SeedData};
pub use router::lending_router;
pub use service::{BorrowerRegistration, LenderRegistration, LendingService};
pub use subscription::{BillingPeriod, LifecycleError, Subscription, SubscriptionStatus};
pub use tiers::{TierId, TierRegistry, TierSpec};
