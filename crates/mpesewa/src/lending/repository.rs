use serde::{Deserialize, Serialize};

use super::blacklist::{Blacklist, BlacklistEntry};
use super::domain::{GroupId, Loan, LoanCart, LoanId, User, UserId};
use super::groups::Group;
use super::ledger::OverrideRecord;

/// Storage abstraction so the service can be exercised in isolation.
///
/// `update_loan` is compare-and-swap: it succeeds only when the stored
/// version equals `loan.version`, and returns the record with the version
/// bumped.
pub trait LendingRepository: Send + Sync {
    fn user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    fn insert_user(&self, user: User) -> Result<User, RepositoryError>;
    fn save_user(&self, user: User) -> Result<(), RepositoryError>;

    fn group(&self, id: &GroupId) -> Result<Option<Group>, RepositoryError>;
    fn insert_group(&self, group: Group) -> Result<Group, RepositoryError>;
    fn save_group(&self, group: Group) -> Result<(), RepositoryError>;

    fn loan(&self, id: &LoanId) -> Result<Option<Loan>, RepositoryError>;
    fn insert_loan(&self, loan: Loan) -> Result<Loan, RepositoryError>;
    fn update_loan(&self, loan: Loan) -> Result<Loan, RepositoryError>;
    fn loans_for_borrower(&self, borrower: &UserId) -> Result<Vec<Loan>, RepositoryError>;
    fn loans_for_lender(&self, lender: &UserId) -> Result<Vec<Loan>, RepositoryError>;
    fn loans_in_group(&self, group: &GroupId) -> Result<Vec<Loan>, RepositoryError>;
    fn outstanding_loans(&self) -> Result<Vec<Loan>, RepositoryError>;

    fn blacklist(&self) -> Result<Blacklist, RepositoryError>;
    fn save_blacklist(&self, blacklist: Blacklist) -> Result<(), RepositoryError>;

    /// Audit log is append-only.
    fn append_override(&self, record: OverrideRecord) -> Result<(), RepositoryError>;
    fn overrides_for(&self, loan: &LoanId) -> Result<Vec<OverrideRecord>, RepositoryError>;

    fn cart(&self, borrower: &UserId) -> Result<LoanCart, RepositoryError>;
    fn save_cart(&self, borrower: &UserId, cart: LoanCart) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record was modified concurrently")]
    VersionConflict,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Initial state loaded into a repository, typically from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub loans: Vec<Loan>,
    #[serde(default)]
    pub blacklist: Vec<BlacklistEntry>,
}

impl SeedData {
    pub fn from_json_reader<R: std::io::Read>(reader: R) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(reader)
    }
}
