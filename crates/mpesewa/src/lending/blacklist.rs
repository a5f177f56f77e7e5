use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{BlacklistId, CountryCode, GroupId, Loan, LoanId, User, UserId};
use super::error::{LendingError, StateError, ValidationError};

/// Days past the default date before a borrower is barred.
pub const DEFAULT_BLACKLIST_AFTER_DAYS: u32 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub id: BlacklistId,
    pub borrower_id: UserId,
    pub country: CountryCode,
    pub group_id: Option<GroupId>,
    /// Loan whose default raised the entry; manual entries carry none.
    #[serde(default)]
    pub loan_id: Option<LoanId>,
    pub amount_defaulted: f64,
    pub default_date: NaiveDate,
    pub blacklist_date: NaiveDate,
    /// Set once the debt is settled; only then may an admin remove the entry.
    #[serde(default)]
    pub can_remove: bool,
}

/// The unpaid debt a blacklist entry records.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultedDebt {
    pub group_id: Option<GroupId>,
    pub loan_id: Option<LoanId>,
    pub amount: f64,
    pub default_date: NaiveDate,
}

/// Registry of barred borrowers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blacklist {
    entries: Vec<BlacklistEntry>,
}

impl Blacklist {
    pub fn new(entries: Vec<BlacklistEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[BlacklistEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<BlacklistEntry> {
        self.entries
    }

    pub fn is_blacklisted(&self, borrower: &UserId) -> bool {
        self.entries.iter().any(|entry| &entry.borrower_id == borrower)
    }

    pub fn entry(&self, id: &BlacklistId) -> Option<&BlacklistEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    pub fn covers_loan(&self, loan: &LoanId) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.loan_id.as_ref() == Some(loan))
    }

    /// Record a default; the blacklist date is `after_days` past the default.
    pub fn add(
        &mut self,
        id: BlacklistId,
        borrower: &mut User,
        debt: DefaultedDebt,
        after_days: u32,
    ) -> Result<&BlacklistEntry, LendingError> {
        if debt.amount.is_nan() || debt.amount <= 0.0 {
            return Err(ValidationError::NonPositiveAmount {
                field: "amount_defaulted",
            }
            .into());
        }
        let blacklist_date = debt
            .default_date
            .checked_add_days(Days::new(u64::from(after_days)))
            .ok_or(ValidationError::DateOutOfRange)?;

        borrower.blacklisted = true;
        self.entries.push(BlacklistEntry {
            id,
            borrower_id: borrower.id.clone(),
            country: borrower.country.clone(),
            group_id: debt.group_id,
            loan_id: debt.loan_id,
            amount_defaulted: debt.amount,
            default_date: debt.default_date,
            blacklist_date,
            can_remove: false,
        });
        let index = self.entries.len() - 1;
        Ok(&self.entries[index])
    }

    /// Flag every entry for `borrower` as removable.
    pub fn mark_debt_cleared(&mut self, borrower: &UserId) -> usize {
        self.mark_where(|entry| &entry.borrower_id == borrower)
    }

    /// Flag the entries settled by clearing `loan`. Entries raised without a
    /// loan settle only once `borrower` has nothing outstanding.
    pub fn settle_loan(&mut self, borrower: &UserId, loan: &LoanId, has_outstanding: bool) -> usize {
        self.mark_where(|entry| match &entry.loan_id {
            Some(defaulted) => defaulted == loan,
            None => &entry.borrower_id == borrower && !has_outstanding,
        })
    }

    fn mark_where(&mut self, settled: impl Fn(&BlacklistEntry) -> bool) -> usize {
        let mut marked = 0;
        for entry in self
            .entries
            .iter_mut()
            .filter(|entry| !entry.can_remove && settled(entry))
        {
            entry.can_remove = true;
            marked += 1;
        }
        marked
    }

    /// Admin-only removal of a settled entry. Clears the borrower's flag once
    /// no entries remain for them.
    pub fn remove(
        &mut self,
        admin: &User,
        id: &BlacklistId,
        borrower: &mut User,
    ) -> Result<BlacklistEntry, LendingError> {
        if !admin.is_admin() {
            return Err(StateError::AdminRequired {
                action: "blacklist removal",
            }
            .into());
        }
        let index = self
            .entries
            .iter()
            .position(|entry| &entry.id == id)
            .ok_or_else(|| LendingError::not_found("blacklist entry", id))?;
        if !self.entries[index].can_remove {
            return Err(StateError::EntryNotRemovable.into());
        }

        let entry = self.entries.remove(index);
        if entry.borrower_id == borrower.id && !self.is_blacklisted(&borrower.id) {
            borrower.blacklisted = false;
        }
        Ok(entry)
    }
}

/// Outstanding loans more than `after_days` past due as of `as_of`.
pub fn defaulted_loans(loans: &[Loan], as_of: DateTime<Utc>, after_days: u32) -> Vec<&Loan> {
    loans
        .iter()
        .filter(|loan| loan.status.is_outstanding() && loan.overdue_days(as_of) > after_days)
        .collect()
}
