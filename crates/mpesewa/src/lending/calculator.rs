//! Interest and late-penalty arithmetic. Every function here is pure and
//! unrounded; callers round only for display.

use serde::{Deserialize, Serialize};

pub const DEFAULT_WEEKLY_INTEREST_RATE: f64 = 0.10;
pub const DEFAULT_DAILY_PENALTY_RATE: f64 = 0.05;
/// Days a calculator quote may run before the daily penalty starts.
pub const PENALTY_GRACE_DAYS: u32 = 7;

/// Pricing applied to a loan at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateCard {
    pub weekly_interest_rate: f64,
    pub daily_penalty_rate: f64,
}

impl Default for RateCard {
    fn default() -> Self {
        Self {
            weekly_interest_rate: DEFAULT_WEEKLY_INTEREST_RATE,
            daily_penalty_rate: DEFAULT_DAILY_PENALTY_RATE,
        }
    }
}

/// `principal * weekly_rate * (days / 7)`; fractional weeks are kept.
pub fn interest(principal: f64, days: u32, weekly_rate: f64) -> f64 {
    principal * weekly_rate * (f64::from(days) / 7.0)
}

/// `principal * daily_rate * overdue_days`.
pub fn penalty(principal: f64, overdue_days: u32, daily_rate: f64) -> f64 {
    principal * daily_rate * f64::from(overdue_days)
}

/// Principal plus interest for the agreed term plus any late penalty.
pub fn total_due(principal: f64, agreed_days: u32, overdue_days: u32, rates: &RateCard) -> f64 {
    principal
        + interest(principal, agreed_days, rates.weekly_interest_rate)
        + penalty(principal, overdue_days, rates.daily_penalty_rate)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakdownKind {
    Principal,
    Interest,
    Penalty,
    Total,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownLine {
    pub label: String,
    pub value: f64,
    pub kind: BreakdownKind,
}

/// What a borrower would owe for a given amount and repayment period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanQuote {
    pub principal: f64,
    pub period_days: u32,
    pub interest: f64,
    pub total_repayment: f64,
    pub penalty: f64,
    pub total_with_penalty: f64,
    pub breakdown: Vec<BreakdownLine>,
}

/// Quote a period; days beyond the grace window accrue the daily penalty.
pub fn quote(principal: f64, period_days: u32, rates: &RateCard) -> LoanQuote {
    let interest = interest(principal, period_days, rates.weekly_interest_rate);
    let total_repayment = principal + interest;
    let penalty_days = period_days.saturating_sub(PENALTY_GRACE_DAYS);
    let penalty = penalty(principal, penalty_days, rates.daily_penalty_rate);
    let total_with_penalty = total_repayment + penalty;

    let mut breakdown = vec![
        BreakdownLine {
            label: "Principal".to_string(),
            value: principal,
            kind: BreakdownKind::Principal,
        },
        BreakdownLine {
            label: format!(
                "Interest ({:.0}% per week for {period_days} days)",
                rates.weekly_interest_rate * 100.0
            ),
            value: interest,
            kind: BreakdownKind::Interest,
        },
    ];
    if penalty > 0.0 {
        breakdown.push(BreakdownLine {
            label: "Late payment penalty".to_string(),
            value: penalty,
            kind: BreakdownKind::Penalty,
        });
    }
    breakdown.push(BreakdownLine {
        label: "Total".to_string(),
        value: total_with_penalty,
        kind: BreakdownKind::Total,
    });

    LoanQuote {
        principal,
        period_days,
        interest,
        total_repayment,
        penalty,
        total_with_penalty,
        breakdown,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDay {
    pub day: u32,
    pub amount_due: f64,
    pub penalty_applies: bool,
}

/// Amount owed if the loan were settled on each day of the period.
pub fn daily_schedule(principal: f64, period_days: u32, rates: &RateCard) -> Vec<ScheduleDay> {
    (1..=period_days)
        .map(|day| ScheduleDay {
            day,
            amount_due: quote(principal, day, rates).total_with_penalty,
            penalty_applies: day > PENALTY_GRACE_DAYS,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum QuoteWarning {
    ExceedsTierLimit { limit: f64 },
    PenaltyPeriod { grace_days: u32 },
}

impl QuoteWarning {
    pub fn message(&self) -> String {
        match self {
            QuoteWarning::ExceedsTierLimit { limit } => format!(
                "amount exceeds the tier per-loan limit of {limit:.0}; consider upgrading the subscription"
            ),
            QuoteWarning::PenaltyPeriod { grace_days } => format!(
                "repayment period exceeds {grace_days} days; a daily penalty applies after day {grace_days}"
            ),
        }
    }
}

pub fn quote_warnings(quote: &LoanQuote, tier_per_loan_limit: Option<f64>) -> Vec<QuoteWarning> {
    let mut warnings = Vec::new();
    if let Some(limit) = tier_per_loan_limit {
        if quote.principal > limit {
            warnings.push(QuoteWarning::ExceedsTierLimit { limit });
        }
    }
    if quote.period_days > PENALTY_GRACE_DAYS {
        warnings.push(QuoteWarning::PenaltyPeriod {
            grace_days: PENALTY_GRACE_DAYS,
        });
    }
    warnings
}
