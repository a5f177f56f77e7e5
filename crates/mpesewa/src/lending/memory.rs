use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::blacklist::Blacklist;
use super::domain::{GroupId, Loan, LoanCart, LoanId, User, UserId};
use super::groups::Group;
use super::ledger::OverrideRecord;
use super::repository::{LendingRepository, RepositoryError, SeedData};

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<UserId, User>,
    groups: BTreeMap<GroupId, Group>,
    loans: BTreeMap<LoanId, Loan>,
    blacklist: Blacklist,
    overrides: Vec<OverrideRecord>,
    carts: BTreeMap<UserId, LoanCart>,
}

/// Process-local repository used by the API binary, demos and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLendingRepository {
    state: Arc<Mutex<State>>,
}

impl InMemoryLendingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: SeedData) -> Self {
        let state = State {
            users: seed
                .users
                .into_iter()
                .map(|user| (user.id.clone(), user))
                .collect(),
            groups: seed
                .groups
                .into_iter()
                .map(|group| (group.id.clone(), group))
                .collect(),
            loans: seed
                .loans
                .into_iter()
                .map(|loan| (loan.id.clone(), loan))
                .collect(),
            blacklist: Blacklist::new(seed.blacklist),
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }

    fn select_loans(&self, keep: impl Fn(&Loan) -> bool) -> Result<Vec<Loan>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.loans.values().filter(|loan| keep(loan)).cloned().collect())
    }

    /// Counts of stored users, groups and loans.
    pub fn counts(&self) -> Result<(usize, usize, usize), RepositoryError> {
        let guard = self.lock()?;
        Ok((guard.users.len(), guard.groups.len(), guard.loans.len()))
    }
}

impl LendingRepository for InMemoryLendingRepository {
    fn user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.lock()?.users.get(id).cloned())
    }

    fn insert_user(&self, user: User) -> Result<User, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.users.contains_key(&user.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    fn save_user(&self, user: User) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        match guard.users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn group(&self, id: &GroupId) -> Result<Option<Group>, RepositoryError> {
        Ok(self.lock()?.groups.get(id).cloned())
    }

    fn insert_group(&self, group: Group) -> Result<Group, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.groups.contains_key(&group.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.groups.insert(group.id.clone(), group.clone());
        Ok(group)
    }

    fn save_group(&self, group: Group) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        match guard.groups.get_mut(&group.id) {
            Some(stored) => {
                *stored = group;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn loan(&self, id: &LoanId) -> Result<Option<Loan>, RepositoryError> {
        Ok(self.lock()?.loans.get(id).cloned())
    }

    fn insert_loan(&self, loan: Loan) -> Result<Loan, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.loans.contains_key(&loan.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.loans.insert(loan.id.clone(), loan.clone());
        Ok(loan)
    }

    fn update_loan(&self, mut loan: Loan) -> Result<Loan, RepositoryError> {
        let mut guard = self.lock()?;
        let stored = guard
            .loans
            .get_mut(&loan.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != loan.version {
            return Err(RepositoryError::VersionConflict);
        }
        loan.version += 1;
        *stored = loan.clone();
        Ok(loan)
    }

    fn loans_for_borrower(&self, borrower: &UserId) -> Result<Vec<Loan>, RepositoryError> {
        self.select_loans(|loan| &loan.borrower_id == borrower)
    }

    fn loans_for_lender(&self, lender: &UserId) -> Result<Vec<Loan>, RepositoryError> {
        self.select_loans(|loan| loan.lender_id.as_ref() == Some(lender))
    }

    fn loans_in_group(&self, group: &GroupId) -> Result<Vec<Loan>, RepositoryError> {
        self.select_loans(|loan| &loan.group_id == group)
    }

    fn outstanding_loans(&self) -> Result<Vec<Loan>, RepositoryError> {
        self.select_loans(|loan| loan.status.is_outstanding())
    }

    fn blacklist(&self) -> Result<Blacklist, RepositoryError> {
        Ok(self.lock()?.blacklist.clone())
    }

    fn save_blacklist(&self, blacklist: Blacklist) -> Result<(), RepositoryError> {
        self.lock()?.blacklist = blacklist;
        Ok(())
    }

    fn append_override(&self, record: OverrideRecord) -> Result<(), RepositoryError> {
        self.lock()?.overrides.push(record);
        Ok(())
    }

    fn overrides_for(&self, loan: &LoanId) -> Result<Vec<OverrideRecord>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .overrides
            .iter()
            .filter(|record| &record.loan_id == loan)
            .cloned()
            .collect())
    }

    fn cart(&self, borrower: &UserId) -> Result<LoanCart, RepositoryError> {
        Ok(self.lock()?.carts.get(borrower).cloned().unwrap_or_default())
    }

    fn save_cart(&self, borrower: &UserId, cart: LoanCart) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        if cart.is_empty() {
            guard.carts.remove(borrower);
        } else {
            guard.carts.insert(borrower.clone(), cart);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lending::calculator::RateCard;
    use crate::lending::domain::CategoryId;
    use crate::lending::ledger::LoanRequest;
    use chrono::{TimeZone, Utc};

    fn loan(id: &str) -> Loan {
        Loan::requested(
            LoanId::new(id),
            LoanRequest {
                borrower_id: UserId::new("usr-1"),
                category: CategoryId::new("fare"),
                group_id: GroupId::new("grp-1"),
                amount: 500.0,
                repayment_days: 7,
                purpose: String::new(),
            },
            &RateCard::default(),
            Vec::new(),
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
                .single()
                .expect("valid timestamp"),
        )
    }

    #[test]
    fn update_loan_is_compare_and_swap() {
        let repository = InMemoryLendingRepository::new();
        let stored = repository.insert_loan(loan("ln-1")).expect("insert");
        assert_eq!(stored.version, 0);

        let first = repository.update_loan(stored.clone()).expect("first writer wins");
        assert_eq!(first.version, 1);

        match repository.update_loan(stored) {
            Err(RepositoryError::VersionConflict) => {}
            other => panic!("expected version conflict, got {other:?}"),
        }
        assert!(matches!(
            repository.update_loan(loan("ln-missing")),
            Err(RepositoryError::NotFound)
        ));
    }

    #[test]
    fn duplicate_inserts_conflict() {
        let repository = InMemoryLendingRepository::new();
        repository.insert_loan(loan("ln-1")).expect("insert");
        assert!(matches!(
            repository.insert_loan(loan("ln-1")),
            Err(RepositoryError::Conflict)
        ));
    }
}
