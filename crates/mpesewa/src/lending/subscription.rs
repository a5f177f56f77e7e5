use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::dates::{days_until, expiry_on_28th};
use super::error::{LendingError, StateError, ValidationError};
use super::tiers::TierId;

/// Days before expiry when a renewal reminder is due.
pub const RENEWAL_REMINDER_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    Monthly,
    BiAnnual,
    Annual,
}

impl BillingPeriod {
    pub const fn months(self) -> u32 {
        match self {
            BillingPeriod::Monthly => 1,
            BillingPeriod::BiAnnual => 6,
            BillingPeriod::Annual => 12,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "monthly" => Some(BillingPeriod::Monthly),
            "bi_annual" | "biannual" | "bi-annual" => Some(BillingPeriod::BiAnnual),
            "annual" | "annually" | "yearly" => Some(BillingPeriod::Annual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    PendingPayment,
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            SubscriptionStatus::PendingPayment => "pending_payment",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

/// A lender's paid access to a tier. Expiry always falls on the 28th.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub tier: TierId,
    pub period: BillingPeriod,
    pub price: f64,
    pub start_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

impl Subscription {
    /// New subscription awaiting payment.
    pub fn new(
        tier: TierId,
        period: BillingPeriod,
        price: f64,
        start_date: NaiveDate,
    ) -> Result<Self, ValidationError> {
        let expiry_date = expiry_on_28th(start_date, period.months())
            .ok_or(ValidationError::DateOutOfRange)?;
        Ok(Self {
            tier,
            period,
            price,
            start_date,
            expiry_date,
            status: SubscriptionStatus::PendingPayment,
            payment_reference: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    pub fn activate(&mut self, reference: &str) -> Result<(), LifecycleError> {
        if reference.trim().is_empty() {
            return Err(ValidationError::EmptyReference.into());
        }
        match self.status {
            SubscriptionStatus::PendingPayment => {
                self.status = SubscriptionStatus::Active;
                self.payment_reference = Some(reference.trim().to_string());
                Ok(())
            }
            other => Err(StateError::SubscriptionNotPending {
                status: other.label(),
            }
            .into()),
        }
    }

    /// Expire an active subscription once `today` is past its expiry date.
    /// Returns true when the status changed.
    pub fn refresh(&mut self, today: NaiveDate) -> bool {
        if self.status == SubscriptionStatus::Active && today > self.expiry_date {
            self.status = SubscriptionStatus::Expired;
            return true;
        }
        false
    }

    pub fn cancel(&mut self) {
        self.status = SubscriptionStatus::Cancelled;
    }

    /// Start a fresh period from `today`; the renewal awaits payment again.
    pub fn renew(
        &self,
        period: BillingPeriod,
        price: f64,
        today: NaiveDate,
    ) -> Result<Self, ValidationError> {
        Self::new(self.tier, period, price, today)
    }

    pub fn days_remaining(&self, today: NaiveDate) -> i64 {
        days_until(today, self.expiry_date)
    }

    pub fn needs_renewal_reminder(&self, today: NaiveDate) -> bool {
        let remaining = self.days_remaining(today);
        self.is_active() && (0..=RENEWAL_REMINDER_DAYS).contains(&remaining)
    }
}

/// Failure while moving a subscription through its lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    State(#[from] StateError),
}

impl From<LifecycleError> for LendingError {
    fn from(error: LifecycleError) -> Self {
        match error {
            LifecycleError::Validation(error) => LendingError::Validation(error),
            LifecycleError::State(error) => LendingError::State(error),
        }
    }
}
