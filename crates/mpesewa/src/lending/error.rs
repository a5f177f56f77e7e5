use super::eligibility::DenialReason;
use super::reference::ReferenceError;
use super::repository::RepositoryError;

/// Malformed or out-of-range input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    NonPositiveAmount { field: &'static str },
    #[error("amount {amount} is outside {scope} bounds [{min}, {max}]")]
    AmountOutOfBounds {
        scope: String,
        amount: f64,
        min: f64,
        max: f64,
    },
    #[error("repayment period must be at least one day")]
    ZeroRepaymentDays,
    #[error("a payment reference is required")]
    EmptyReference,
    #[error("reference '{0}' was already recorded on this loan")]
    DuplicateReference(String),
    #[error("an override needs a reason")]
    EmptyReason,
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("borrowers register with exactly {expected} guarantors, got {actual}")]
    GuarantorsRequired { expected: usize, actual: usize },
    #[error("rating {0} is outside 1..=5")]
    InvalidRating(f32),
    #[error("'{value}' is not a valid value for {field}")]
    InvalidOverrideValue { field: &'static str, value: String },
    #[error("date is out of the supported range")]
    DateOutOfRange,
}

impl ValidationError {
    pub const fn code(&self) -> &'static str {
        match self {
            ValidationError::NonPositiveAmount { .. } => "non_positive_amount",
            ValidationError::AmountOutOfBounds { .. } => "amount_out_of_bounds",
            ValidationError::ZeroRepaymentDays => "zero_repayment_days",
            ValidationError::EmptyReference => "empty_reference",
            ValidationError::DuplicateReference(_) => "duplicate_reference",
            ValidationError::EmptyReason => "empty_reason",
            ValidationError::MissingField { .. } => "missing_field",
            ValidationError::GuarantorsRequired { .. } => "guarantors_required",
            ValidationError::InvalidRating(_) => "invalid_rating",
            ValidationError::InvalidOverrideValue { .. } => "invalid_override_value",
            ValidationError::DateOutOfRange => "date_out_of_range",
        }
    }
}

/// Illegal transition for the record's current state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateError {
    #[error("loan has not been funded")]
    NotFunded,
    #[error("loan is already funded")]
    AlreadyFunded,
    #[error("loan is already cleared")]
    AlreadyCleared,
    #[error("cannot mark cleared while {balance:.2} is outstanding")]
    ClearedWithBalance { balance: f64 },
    #[error("user is already a member of this group")]
    AlreadyMember,
    #[error("user is not a member of this group")]
    NotMember,
    #[error("sole admin must transfer the role before leaving")]
    SoleAdmin,
    #[error("group has been dissolved")]
    GroupDissolved,
    #[error("subscription is {status}, not awaiting payment")]
    SubscriptionNotPending { status: &'static str },
    #[error("user has no subscription")]
    NoSubscription,
    #[error("blacklist entry cannot be removed until the debt is cleared")]
    EntryNotRemovable,
    #[error("{action} requires an admin")]
    AdminRequired { action: &'static str },
    #[error("category is not in the cart")]
    NotInCart,
}

impl StateError {
    pub const fn code(&self) -> &'static str {
        match self {
            StateError::NotFunded => "not_funded",
            StateError::AlreadyFunded => "already_funded",
            StateError::AlreadyCleared => "already_cleared",
            StateError::ClearedWithBalance { .. } => "cleared_with_balance",
            StateError::AlreadyMember => "already_member",
            StateError::NotMember => "not_member",
            StateError::SoleAdmin => "sole_admin",
            StateError::GroupDissolved => "group_dissolved",
            StateError::SubscriptionNotPending { .. } => "subscription_not_pending",
            StateError::NoSubscription => "no_subscription",
            StateError::EntryNotRemovable => "entry_not_removable",
            StateError::AdminRequired { .. } => "admin_required",
            StateError::NotInCart => "not_in_cart",
        }
    }
}

/// Error raised by the lending service.
#[derive(Debug, thiserror::Error)]
pub enum LendingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{}", .0.summary())]
    Eligibility(DenialReason),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

impl From<DenialReason> for LendingError {
    fn from(reason: DenialReason) -> Self {
        LendingError::Eligibility(reason)
    }
}

impl LendingError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LendingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LendingError::Validation(error) => error.code(),
            LendingError::Eligibility(reason) => reason.code(),
            LendingError::State(error) => error.code(),
            LendingError::NotFound { .. } => "not_found",
            LendingError::Repository(RepositoryError::VersionConflict) => "version_conflict",
            LendingError::Repository(RepositoryError::Conflict) => "conflict",
            LendingError::Repository(RepositoryError::NotFound) => "not_found",
            LendingError::Repository(_) => "repository_unavailable",
            LendingError::Reference(ReferenceError::UnknownCountry(_)) => "unknown_country",
            LendingError::Reference(ReferenceError::UnknownCategory(_)) => "unknown_category",
            LendingError::Reference(_) => "reference_data",
        }
    }
}
