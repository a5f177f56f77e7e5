use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::lending::blacklist::Blacklist;
use crate::lending::calculator::RateCard;
use crate::lending::clock::FixedClock;
use crate::lending::domain::{
    CategoryId, CountryCode, GroupId, Guarantor, Loan, LoanCart, LoanId, Role, User, UserId,
};
use crate::lending::groups::{Group, GroupMember};
use crate::lending::ledger::{self, LoanRequest, OverrideRecord};
use crate::lending::memory::InMemoryLendingRepository;
use crate::lending::reference::ReferenceData;
use crate::lending::repository::{LendingRepository, RepositoryError, SeedData};
use crate::lending::service::LendingService;
use crate::lending::subscription::{BillingPeriod, Subscription};
use crate::lending::tiers::TierId;

pub(super) const GROUP: &str = "grp-ke";
pub(super) const FOUNDERS: [&str; 5] = ["bor-1", "bor-2", "bor-3", "bor-4", "bor-5"];
pub(super) const GROUP_LENDERS: [&str; 2] = ["len-basic", "len-premium"];

pub(super) type TestService = LendingService<InMemoryLendingRepository, FixedClock>;

pub(super) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn today() -> NaiveDate {
    t0().date_naive()
}

pub(super) fn user(id: &str, roles: &[Role], country: &str) -> User {
    User {
        id: UserId::new(id),
        name: format!("User {id}"),
        phone: "+254700000000".to_string(),
        roles: roles.iter().copied().collect::<BTreeSet<_>>(),
        country: CountryCode::new(country),
        rating: User::DEFAULT_RATING,
        rating_count: 0,
        blacklisted: false,
        groups: Vec::new(),
        guarantors: guarantors(),
        subscription: None,
        active: true,
        created_at: t0(),
    }
}

pub(super) fn guarantors() -> Vec<Guarantor> {
    vec![
        Guarantor {
            name: "Achieng".to_string(),
            phone: "+254711111111".to_string(),
            relationship: "sister".to_string(),
        },
        Guarantor {
            name: "Mwangi".to_string(),
            phone: "+254722222222".to_string(),
            relationship: "colleague".to_string(),
        },
    ]
}

pub(super) fn borrower(id: &str) -> User {
    user(id, &[Role::Borrower], "KE")
}

pub(super) fn borrower_in(id: &str, groups: &[&str]) -> User {
    let mut user = borrower(id);
    user.groups = groups.iter().map(|group| GroupId::new(*group)).collect();
    user
}

pub(super) fn active_subscription(tier: TierId) -> Subscription {
    let mut subscription = Subscription::new(tier, BillingPeriod::Annual, 500.0, today())
        .expect("subscription dates in range");
    subscription
        .activate("MPESA-SUB-001")
        .expect("pending subscription activates");
    subscription
}

pub(super) fn lender(id: &str, tier: TierId) -> User {
    let mut user = user(id, &[Role::Lender], "KE");
    user.subscription = Some(active_subscription(tier));
    user
}

pub(super) fn admin(id: &str) -> User {
    user(id, &[Role::Admin], "KE")
}

/// Group whose members joined one minute apart in the order given.
pub(super) fn group(id: &str, country: &str, members: &[&str], admins: &[&str]) -> Group {
    Group {
        id: GroupId::new(id),
        name: format!("Group {id}"),
        country: CountryCode::new(country),
        members: members
            .iter()
            .enumerate()
            .map(|(offset, member)| GroupMember {
                user_id: UserId::new(*member),
                joined_at: t0() + Duration::minutes(offset as i64),
            })
            .collect(),
        admins: admins.iter().map(|admin| UserId::new(*admin)).collect(),
        invite_only: false,
        invite_code: None,
        loans: Vec::new(),
        rules: Vec::new(),
        dissolved: false,
        created_at: t0(),
    }
}

pub(super) fn request(borrower: &str, category: &str, amount: f64, days: u32) -> LoanRequest {
    LoanRequest {
        borrower_id: UserId::new(borrower),
        category: CategoryId::new(category),
        group_id: GroupId::new(GROUP),
        amount,
        repayment_days: days,
        purpose: "stock".to_string(),
    }
}

pub(super) fn requested_loan(id: &str, borrower: &str, category: &str, amount: f64) -> Loan {
    Loan::requested(
        LoanId::new(id),
        request(borrower, category, amount, 7),
        &RateCard::default(),
        guarantors(),
        t0(),
    )
}

/// Loan funded by `lender` at `t0` and disbursed.
pub(super) fn active_loan(id: &str, borrower: &str, lender: &str, amount: f64) -> Loan {
    let mut loan = requested_loan(id, borrower, "fare", amount);
    ledger::fund(&mut loan, &UserId::new(lender), t0()).expect("requested loan funds");
    ledger::disburse(&mut loan).expect("approved loan disburses");
    loan
}

pub(super) fn lender_in(id: &str, tier: TierId, groups: &[&str]) -> User {
    let mut user = lender(id, tier);
    user.groups = groups.iter().map(|group| GroupId::new(*group)).collect();
    user
}

/// `grp-ke`: the five founders followed by both seeded lenders.
pub(super) fn lending_group() -> Group {
    let members: Vec<&str> = FOUNDERS.iter().chain(GROUP_LENDERS.iter()).copied().collect();
    group(GROUP, "KE", &members, &["bor-1"])
}

/// Five Kenyan borrowers in `grp-ke` (bor-1 is primary admin) alongside
/// lenders on the basic and premium tiers, an unaffiliated Kenyan borrower,
/// a Ugandan borrower, and a platform admin.
pub(super) fn seed() -> SeedData {
    let mut users: Vec<User> = FOUNDERS
        .iter()
        .map(|id| borrower_in(id, &[GROUP]))
        .collect();
    users[0].roles.insert(Role::GroupAdmin);
    users.push(borrower("bor-6"));
    users.push(user("bor-ug", &[Role::Borrower], "UG"));
    users.push(lender_in("len-basic", TierId::Basic, &[GROUP]));
    users.push(lender_in("len-premium", TierId::Premium, &[GROUP]));
    users.push(admin("adm-1"));

    SeedData {
        users,
        groups: vec![lending_group()],
        loans: Vec::new(),
        blacklist: Vec::new(),
    }
}

pub(super) fn build_service() -> (
    TestService,
    Arc<InMemoryLendingRepository>,
    Arc<FixedClock>,
) {
    let repository = Arc::new(InMemoryLendingRepository::from_seed(seed()));
    let clock = Arc::new(FixedClock::new(t0()));
    let service = LendingService::new(repository.clone(), clock.clone(), ReferenceData::standard());
    (service, repository, clock)
}

pub(super) fn uid(id: &str) -> UserId {
    UserId::new(id)
}

pub(super) fn gid(id: &str) -> GroupId {
    GroupId::new(id)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) struct UnavailableRepository;

fn offline<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl LendingRepository for UnavailableRepository {
    fn user(&self, _id: &UserId) -> Result<Option<User>, RepositoryError> {
        offline()
    }

    fn insert_user(&self, _user: User) -> Result<User, RepositoryError> {
        offline()
    }

    fn save_user(&self, _user: User) -> Result<(), RepositoryError> {
        offline()
    }

    fn group(&self, _id: &GroupId) -> Result<Option<Group>, RepositoryError> {
        offline()
    }

    fn insert_group(&self, _group: Group) -> Result<Group, RepositoryError> {
        offline()
    }

    fn save_group(&self, _group: Group) -> Result<(), RepositoryError> {
        offline()
    }

    fn loan(&self, _id: &LoanId) -> Result<Option<Loan>, RepositoryError> {
        offline()
    }

    fn insert_loan(&self, _loan: Loan) -> Result<Loan, RepositoryError> {
        offline()
    }

    fn update_loan(&self, _loan: Loan) -> Result<Loan, RepositoryError> {
        offline()
    }

    fn loans_for_borrower(&self, _borrower: &UserId) -> Result<Vec<Loan>, RepositoryError> {
        offline()
    }

    fn loans_for_lender(&self, _lender: &UserId) -> Result<Vec<Loan>, RepositoryError> {
        offline()
    }

    fn loans_in_group(&self, _group: &GroupId) -> Result<Vec<Loan>, RepositoryError> {
        offline()
    }

    fn outstanding_loans(&self) -> Result<Vec<Loan>, RepositoryError> {
        offline()
    }

    fn blacklist(&self) -> Result<Blacklist, RepositoryError> {
        offline()
    }

    fn save_blacklist(&self, _blacklist: Blacklist) -> Result<(), RepositoryError> {
        offline()
    }

    fn append_override(&self, _record: OverrideRecord) -> Result<(), RepositoryError> {
        offline()
    }

    fn overrides_for(&self, _loan: &LoanId) -> Result<Vec<OverrideRecord>, RepositoryError> {
        offline()
    }

    fn cart(&self, _borrower: &UserId) -> Result<LoanCart, RepositoryError> {
        offline()
    }

    fn save_cart(&self, _borrower: &UserId, _cart: LoanCart) -> Result<(), RepositoryError> {
        offline()
    }
}

/// Delegates to an in-memory store with selected writes failing.
#[derive(Default)]
pub(super) struct FaultyRepository {
    pub(super) inner: InMemoryLendingRepository,
    /// Every loan update loses its compare-and-swap race.
    pub(super) contended_loans: bool,
    pub(super) blacklist_offline: AtomicBool,
}

impl FaultyRepository {
    pub(super) fn seeded() -> Self {
        Self {
            inner: InMemoryLendingRepository::from_seed(seed()),
            ..Self::default()
        }
    }
}

impl LendingRepository for FaultyRepository {
    fn user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        self.inner.user(id)
    }

    fn insert_user(&self, user: User) -> Result<User, RepositoryError> {
        self.inner.insert_user(user)
    }

    fn save_user(&self, user: User) -> Result<(), RepositoryError> {
        self.inner.save_user(user)
    }

    fn group(&self, id: &GroupId) -> Result<Option<Group>, RepositoryError> {
        self.inner.group(id)
    }

    fn insert_group(&self, group: Group) -> Result<Group, RepositoryError> {
        self.inner.insert_group(group)
    }

    fn save_group(&self, group: Group) -> Result<(), RepositoryError> {
        self.inner.save_group(group)
    }

    fn loan(&self, id: &LoanId) -> Result<Option<Loan>, RepositoryError> {
        self.inner.loan(id)
    }

    fn insert_loan(&self, loan: Loan) -> Result<Loan, RepositoryError> {
        self.inner.insert_loan(loan)
    }

    fn update_loan(&self, loan: Loan) -> Result<Loan, RepositoryError> {
        if self.contended_loans {
            return Err(RepositoryError::VersionConflict);
        }
        self.inner.update_loan(loan)
    }

    fn loans_for_borrower(&self, borrower: &UserId) -> Result<Vec<Loan>, RepositoryError> {
        self.inner.loans_for_borrower(borrower)
    }

    fn loans_for_lender(&self, lender: &UserId) -> Result<Vec<Loan>, RepositoryError> {
        self.inner.loans_for_lender(lender)
    }

    fn loans_in_group(&self, group: &GroupId) -> Result<Vec<Loan>, RepositoryError> {
        self.inner.loans_in_group(group)
    }

    fn outstanding_loans(&self) -> Result<Vec<Loan>, RepositoryError> {
        self.inner.outstanding_loans()
    }

    fn blacklist(&self) -> Result<Blacklist, RepositoryError> {
        self.inner.blacklist()
    }

    fn save_blacklist(&self, blacklist: Blacklist) -> Result<(), RepositoryError> {
        if self.blacklist_offline.load(Ordering::SeqCst) {
            return offline();
        }
        self.inner.save_blacklist(blacklist)
    }

    fn append_override(&self, record: OverrideRecord) -> Result<(), RepositoryError> {
        self.inner.append_override(record)
    }

    fn overrides_for(&self, loan: &LoanId) -> Result<Vec<OverrideRecord>, RepositoryError> {
        self.inner.overrides_for(loan)
    }

    fn cart(&self, borrower: &UserId) -> Result<LoanCart, RepositoryError> {
        self.inner.cart(borrower)
    }

    fn save_cart(&self, borrower: &UserId, cart: LoanCart) -> Result<(), RepositoryError> {
        self.inner.save_cart(borrower, cart)
    }
}
