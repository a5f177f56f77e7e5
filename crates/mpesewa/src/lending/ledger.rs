//! Per-loan state machine and arithmetic.
//!
//! Stored status moves `requested → approved → active → cleared`. Overdue is
//! never stored; it is derived from the due date at evaluation time.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::calculator::{interest, penalty, RateCard};
use super::dates::{add_days, ceil_days_between, overdue_days};
use super::domain::{
    CategoryId, GroupId, Guarantor, Loan, LoanId, LoanStanding, LoanStatus, OverrideId, Repayment,
    RepaymentId, RepaymentMethod, RepaymentStatus, User, UserId,
};
use super::error::{LendingError, StateError, ValidationError};
use super::money::round_currency;

/// Fields needed to open a loan request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub borrower_id: UserId,
    pub category: CategoryId,
    pub group_id: GroupId,
    pub amount: f64,
    pub repayment_days: u32,
    #[serde(default)]
    pub purpose: String,
}

impl Loan {
    pub fn requested(
        id: LoanId,
        request: LoanRequest,
        rates: &RateCard,
        guarantors: Vec<Guarantor>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            borrower_id: request.borrower_id,
            lender_id: None,
            group_id: request.group_id,
            category: request.category,
            amount: request.amount,
            interest_rate: rates.weekly_interest_rate,
            penalty_rate: rates.daily_penalty_rate,
            purpose: request.purpose,
            repayment_days: request.repayment_days,
            requested_at: now,
            loan_date: None,
            due_date: None,
            status: LoanStatus::Requested,
            repayments: Vec::new(),
            guarantors,
            penalty_override: None,
            cleared_at: None,
            version: 0,
        }
    }

    /// Agreed term in days; the ceiling of loan date to due date once funded.
    pub fn agreed_days(&self) -> u32 {
        match (self.loan_date, self.due_date) {
            (Some(start), Some(due)) => ceil_days_between(start, due).max(0) as u32,
            _ => self.repayment_days,
        }
    }

    /// Interest for the agreed term, independent of when repayment happens.
    pub fn interest(&self) -> f64 {
        interest(self.amount, self.agreed_days(), self.interest_rate)
    }

    /// Overdue days as of `as_of`, frozen at the clearing date.
    pub fn overdue_days(&self, as_of: DateTime<Utc>) -> u32 {
        let Some(due) = self.due_date else {
            return 0;
        };
        let as_of = match self.cleared_at {
            Some(cleared) if cleared < as_of => cleared,
            _ => as_of,
        };
        overdue_days(due, as_of)
    }

    pub fn penalty(&self, as_of: DateTime<Utc>) -> f64 {
        match self.penalty_override {
            Some(fixed) => fixed,
            None => penalty(self.amount, self.overdue_days(as_of), self.penalty_rate),
        }
    }

    pub fn total_due(&self, as_of: DateTime<Utc>) -> f64 {
        self.amount + self.interest() + self.penalty(as_of)
    }

    pub fn repaid(&self) -> f64 {
        self.repayments.iter().map(|repayment| repayment.amount).sum()
    }

    /// Outstanding balance, never negative. Sub-cent remainders count as paid.
    pub fn balance(&self, as_of: DateTime<Utc>) -> f64 {
        let remaining = self.total_due(as_of) - self.repaid();
        if round_currency(remaining) <= 0.0 {
            0.0
        } else {
            remaining
        }
    }

    pub fn is_overdue(&self, as_of: DateTime<Utc>) -> bool {
        self.status.is_outstanding() && self.overdue_days(as_of) > 0
    }

    pub fn standing(&self, as_of: DateTime<Utc>) -> LoanStanding {
        match self.status {
            LoanStatus::Requested => LoanStanding::Requested,
            LoanStatus::Cleared => LoanStanding::Cleared,
            _ if self.is_overdue(as_of) => LoanStanding::Overdue,
            LoanStatus::Approved => LoanStanding::Approved,
            LoanStatus::Active => LoanStanding::Active,
        }
    }

    pub fn has_reference(&self, reference: &str) -> bool {
        self.repayments
            .iter()
            .any(|repayment| repayment.reference == reference)
    }

    pub fn view(&self, as_of: DateTime<Utc>) -> LoanView {
        LoanView {
            id: self.id.clone(),
            borrower_id: self.borrower_id.clone(),
            lender_id: self.lender_id.clone(),
            group_id: self.group_id.clone(),
            category: self.category.clone(),
            amount: self.amount,
            interest_rate: self.interest_rate,
            penalty_rate: self.penalty_rate,
            purpose: self.purpose.clone(),
            repayment_days: self.repayment_days,
            requested_at: self.requested_at,
            loan_date: self.loan_date,
            due_date: self.due_date,
            status: self.status,
            standing: self.standing(as_of),
            repayment_count: self.repayments.len(),
            interest: self.interest(),
            penalty: self.penalty(as_of),
            total_due: self.total_due(as_of),
            repaid: self.repaid(),
            balance: self.balance(as_of),
            overdue: self.is_overdue(as_of),
            overdue_days: self.overdue_days(as_of),
            cleared_at: self.cleared_at,
            version: self.version,
        }
    }
}

/// Stored fields plus values derived at `as_of`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanView {
    pub id: LoanId,
    pub borrower_id: UserId,
    pub lender_id: Option<UserId>,
    pub group_id: GroupId,
    pub category: CategoryId,
    pub amount: f64,
    pub interest_rate: f64,
    pub penalty_rate: f64,
    pub purpose: String,
    pub repayment_days: u32,
    pub requested_at: DateTime<Utc>,
    pub loan_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub standing: LoanStanding,
    pub repayment_count: usize,
    pub interest: f64,
    pub penalty: f64,
    pub total_due: f64,
    pub repaid: f64,
    pub balance: f64,
    pub overdue: bool,
    pub overdue_days: u32,
    pub cleared_at: Option<DateTime<Utc>>,
    pub version: u64,
}

/// `requested → approved`: records the lender and fixes the term.
pub fn fund(loan: &mut Loan, lender: &UserId, now: DateTime<Utc>) -> Result<(), StateError> {
    match loan.status {
        LoanStatus::Requested => {
            loan.lender_id = Some(lender.clone());
            loan.loan_date = Some(now);
            loan.due_date = Some(add_days(now, loan.repayment_days));
            loan.status = LoanStatus::Approved;
            Ok(())
        }
        LoanStatus::Cleared => Err(StateError::AlreadyCleared),
        _ => Err(StateError::AlreadyFunded),
    }
}

/// `approved → active` once funds are disbursed.
pub fn disburse(loan: &mut Loan) -> Result<(), StateError> {
    match loan.status {
        LoanStatus::Approved => {
            loan.status = LoanStatus::Active;
            Ok(())
        }
        LoanStatus::Requested => Err(StateError::NotFunded),
        LoanStatus::Active => Err(StateError::AlreadyFunded),
        LoanStatus::Cleared => Err(StateError::AlreadyCleared),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepaymentInput {
    pub amount: f64,
    pub method: RepaymentMethod,
    pub reference: String,
    pub date: DateTime<Utc>,
    pub recorded_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepaymentReceipt {
    pub repayment_id: RepaymentId,
    pub remaining_balance: f64,
    pub status: LoanStatus,
}

/// Append a repayment and clear the loan once nothing is outstanding.
pub fn record_repayment(
    loan: &mut Loan,
    id: RepaymentId,
    input: RepaymentInput,
    now: DateTime<Utc>,
) -> Result<RepaymentReceipt, LendingError> {
    if input.amount.is_nan() || input.amount <= 0.0 {
        return Err(ValidationError::NonPositiveAmount { field: "amount" }.into());
    }
    let reference = input.reference.trim();
    if reference.is_empty() {
        return Err(ValidationError::EmptyReference.into());
    }
    match loan.status {
        LoanStatus::Requested => return Err(StateError::NotFunded.into()),
        LoanStatus::Cleared => return Err(StateError::AlreadyCleared.into()),
        LoanStatus::Approved | LoanStatus::Active => {}
    }
    if loan.has_reference(reference) {
        return Err(ValidationError::DuplicateReference(reference.to_string()).into());
    }

    loan.repayments.push(Repayment {
        id: id.clone(),
        loan_id: loan.id.clone(),
        amount: input.amount,
        date: input.date,
        method: input.method,
        reference: reference.to_string(),
        recorded_by: input.recorded_by,
        recorded_at: now,
        status: RepaymentStatus::Verified,
    });

    // Settled once the remainder rounds to zero at currency precision.
    let remaining = round_currency(loan.total_due(now) - loan.repaid()).max(0.0);
    if remaining <= 0.0 {
        loan.status = LoanStatus::Cleared;
        loan.cleared_at = Some(now);
    }

    Ok(RepaymentReceipt {
        repayment_id: id,
        remaining_balance: remaining,
        status: loan.status,
    })
}

/// A typed admin correction to one loan field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum LoanOverride {
    Amount(f64),
    InterestRate(f64),
    DueDate(DateTime<Utc>),
    Status(LoanStatus),
    Penalty(f64),
}

impl LoanOverride {
    /// Parse a field name and textual value as entered by an admin.
    pub fn parse(field: &str, value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();
        let field = field.trim();
        let invalid = |field: &'static str| ValidationError::InvalidOverrideValue {
            field,
            value: value.to_string(),
        };

        match field {
            "amount" => match value.parse::<f64>() {
                Ok(amount) if amount > 0.0 && amount.is_finite() => Ok(LoanOverride::Amount(amount)),
                _ => Err(invalid("amount")),
            },
            "interest_rate" => match value.parse::<f64>() {
                Ok(rate) if (0.0..=1.0).contains(&rate) => Ok(LoanOverride::InterestRate(rate)),
                _ => Err(invalid("interest_rate")),
            },
            "due_date" => parse_due_date(value)
                .map(LoanOverride::DueDate)
                .ok_or_else(|| invalid("due_date")),
            "status" => LoanStatus::parse(value)
                .map(LoanOverride::Status)
                .ok_or_else(|| invalid("status")),
            "penalty" => match value.parse::<f64>() {
                Ok(fixed) if fixed >= 0.0 && fixed.is_finite() => Ok(LoanOverride::Penalty(fixed)),
                _ => Err(invalid("penalty")),
            },
            _ => Err(ValidationError::InvalidOverrideValue {
                field: "field",
                value: field.to_string(),
            }),
        }
    }

    pub const fn field(&self) -> &'static str {
        match self {
            LoanOverride::Amount(_) => "amount",
            LoanOverride::InterestRate(_) => "interest_rate",
            LoanOverride::DueDate(_) => "due_date",
            LoanOverride::Status(_) => "status",
            LoanOverride::Penalty(_) => "penalty",
        }
    }

    fn display_value(&self) -> String {
        match self {
            LoanOverride::Amount(value)
            | LoanOverride::InterestRate(value)
            | LoanOverride::Penalty(value) => value.to_string(),
            LoanOverride::DueDate(value) => value.to_rfc3339(),
            LoanOverride::Status(status) => status.label().to_string(),
        }
    }
}

fn parse_due_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn current_value(loan: &Loan, field: &str) -> String {
    match field {
        "amount" => loan.amount.to_string(),
        "interest_rate" => loan.interest_rate.to_string(),
        "due_date" => loan
            .due_date
            .map(|due| due.to_rfc3339())
            .unwrap_or_default(),
        "status" => loan.status.label().to_string(),
        "penalty" => loan
            .penalty_override
            .map(|fixed| fixed.to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum OverrideOutcome {
    Applied,
    Rejected { code: String },
}

/// Immutable audit entry for an override attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRecord {
    pub id: OverrideId,
    pub loan_id: LoanId,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
    pub reason: String,
    pub admin_id: UserId,
    pub timestamp: DateTime<Utc>,
    pub outcome: OverrideOutcome,
}

impl OverrideRecord {
    pub fn applied(&self) -> bool {
        self.outcome == OverrideOutcome::Applied
    }
}

/// Override attempt that was refused; the record must still be logged.
#[derive(Debug)]
pub struct RejectedOverride {
    pub record: OverrideRecord,
    pub error: LendingError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRequest {
    pub field: String,
    pub value: String,
    pub reason: String,
}

/// Apply an admin override outside the normal transitions. Both outcomes
/// carry an audit record.
pub fn apply_override(
    loan: &mut Loan,
    admin: &User,
    request: &OverrideRequest,
    id: OverrideId,
    now: DateTime<Utc>,
) -> Result<OverrideRecord, RejectedOverride> {
    let mut record = OverrideRecord {
        id,
        loan_id: loan.id.clone(),
        field: request.field.trim().to_string(),
        old_value: current_value(loan, request.field.trim()),
        new_value: request.value.trim().to_string(),
        reason: request.reason.trim().to_string(),
        admin_id: admin.id.clone(),
        timestamp: now,
        outcome: OverrideOutcome::Applied,
    };

    match check_override(loan, admin, request, now) {
        Ok(change) => {
            record.new_value = change.display_value();
            apply_change(loan, change, now);
            Ok(record)
        }
        Err(error) => {
            record.outcome = OverrideOutcome::Rejected {
                code: error.code().to_string(),
            };
            Err(RejectedOverride { record, error })
        }
    }
}

fn check_override(
    loan: &Loan,
    admin: &User,
    request: &OverrideRequest,
    now: DateTime<Utc>,
) -> Result<LoanOverride, LendingError> {
    if !admin.is_admin() {
        return Err(StateError::AdminRequired {
            action: "loan override",
        }
        .into());
    }
    if request.reason.trim().is_empty() {
        return Err(ValidationError::EmptyReason.into());
    }
    let change = LoanOverride::parse(&request.field, &request.value)?;
    if change == LoanOverride::Status(LoanStatus::Cleared) {
        let balance = loan.balance(now);
        if balance > 0.0 {
            return Err(StateError::ClearedWithBalance { balance }.into());
        }
    }
    Ok(change)
}

fn apply_change(loan: &mut Loan, change: LoanOverride, now: DateTime<Utc>) {
    match change {
        LoanOverride::Amount(amount) => loan.amount = amount,
        LoanOverride::InterestRate(rate) => loan.interest_rate = rate,
        LoanOverride::DueDate(due) => loan.due_date = Some(due),
        LoanOverride::Status(status) => {
            loan.cleared_at = match status {
                LoanStatus::Cleared => Some(now),
                _ => None,
            };
            loan.status = status;
        }
        LoanOverride::Penalty(fixed) => loan.penalty_override = Some(fixed),
    }
}
