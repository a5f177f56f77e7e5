use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::blacklist::{defaulted_loans, BlacklistEntry, DefaultedDebt, DEFAULT_BLACKLIST_AFTER_DAYS};
use super::calculator::{quote, quote_warnings, LoanQuote, QuoteWarning, RateCard};
use super::clock::Clock;
use super::domain::{
    BlacklistId, CartItem, CategoryId, CountryCode, GroupId, Guarantor, Loan, LoanCart, LoanId,
    LoanStatus, OverrideId, RepaymentId, Role, User, UserId,
};
use super::eligibility::{DenialReason, EligibilityPolicy};
use super::error::{LendingError, StateError, ValidationError};
use super::groups::{self, Group, GroupDraft, GroupStatistics, LeaveOutcome, RuleViolation};
use super::ledger::{
    self, LoanRequest, LoanView, OverrideRecord, OverrideRequest, RepaymentInput,
    RepaymentReceipt,
};
use super::reference::ReferenceData;
use super::repository::{LendingRepository, RepositoryError};
use super::subscription::{BillingPeriod, Subscription};
use super::tiers::TierRegistry;

/// Attempts made against a loan before a version conflict is surfaced.
const MAX_UPDATE_ATTEMPTS: usize = 3;
const REQUIRED_GUARANTORS: usize = 2;

static USER_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static GROUP_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static LOAN_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static REPAYMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static BLACKLIST_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static OVERRIDE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_id(sequence: &AtomicU64, prefix: &str) -> String {
    let id = sequence.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorrowerRegistration {
    pub name: String,
    pub phone: String,
    pub country: CountryCode,
    pub guarantors: Vec<Guarantor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LenderRegistration {
    pub name: String,
    pub phone: String,
    pub country: CountryCode,
    /// Free-form tier id; unknown ids fall back to basic.
    pub tier: String,
    pub period: BillingPeriod,
}

/// Service composing eligibility, ledger, group and blacklist rules over a
/// repository and a clock.
pub struct LendingService<R, C> {
    repository: Arc<R>,
    clock: Arc<C>,
    reference: Arc<ReferenceData>,
    tiers: Arc<TierRegistry>,
    rates: RateCard,
    policy: EligibilityPolicy,
    blacklist_after_days: u32,
}

impl<R, C> LendingService<R, C>
where
    R: LendingRepository + 'static,
    C: Clock + 'static,
{
    pub fn new(repository: Arc<R>, clock: Arc<C>, reference: ReferenceData) -> Self {
        Self {
            repository,
            clock,
            reference: Arc::new(reference),
            tiers: Arc::new(TierRegistry::standard()),
            rates: RateCard::default(),
            policy: EligibilityPolicy::default(),
            blacklist_after_days: DEFAULT_BLACKLIST_AFTER_DAYS,
        }
    }

    pub fn with_rates(mut self, rates: RateCard) -> Self {
        self.rates = rates;
        self
    }

    pub fn with_policy(mut self, policy: EligibilityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_blacklist_after_days(mut self, days: u32) -> Self {
        self.blacklist_after_days = days;
        self
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    pub fn tiers(&self) -> &TierRegistry {
        &self.tiers
    }

    pub fn rates(&self) -> &RateCard {
        &self.rates
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    fn require_user(&self, id: &UserId) -> Result<User, LendingError> {
        self.repository
            .user(id)?
            .ok_or_else(|| LendingError::not_found("user", id))
    }

    fn require_group(&self, id: &GroupId) -> Result<Group, LendingError> {
        self.repository
            .group(id)?
            .ok_or_else(|| LendingError::not_found("group", id))
    }

    fn require_loan(&self, id: &LoanId) -> Result<Loan, LendingError> {
        self.repository
            .loan(id)?
            .ok_or_else(|| LendingError::not_found("loan", id))
    }

    fn new_user(
        &self,
        name: &str,
        phone: &str,
        country: &CountryCode,
        role: Role,
    ) -> Result<User, LendingError> {
        if name.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "name" }.into());
        }
        if phone.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "phone" }.into());
        }
        self.reference.country(country)?;

        Ok(User {
            id: UserId::new(next_id(&USER_SEQUENCE, "usr")),
            name: name.trim().to_string(),
            phone: phone.trim().to_string(),
            roles: BTreeSet::from([role]),
            country: country.clone(),
            rating: User::DEFAULT_RATING,
            rating_count: 0,
            blacklisted: false,
            groups: Vec::new(),
            guarantors: Vec::new(),
            subscription: None,
            active: true,
            created_at: self.clock.now(),
        })
    }

    /// Register a borrower backed by exactly two guarantors.
    pub fn register_borrower(&self, registration: BorrowerRegistration) -> Result<User, LendingError> {
        if registration.guarantors.len() != REQUIRED_GUARANTORS {
            return Err(ValidationError::GuarantorsRequired {
                expected: REQUIRED_GUARANTORS,
                actual: registration.guarantors.len(),
            }
            .into());
        }
        if registration
            .guarantors
            .iter()
            .any(|guarantor| guarantor.name.trim().is_empty() || guarantor.phone.trim().is_empty())
        {
            return Err(ValidationError::MissingField { field: "guarantor" }.into());
        }

        let mut user = self.new_user(
            &registration.name,
            &registration.phone,
            &registration.country,
            Role::Borrower,
        )?;
        user.guarantors = registration.guarantors;

        let stored = self.repository.insert_user(user)?;
        info!(user_id = %stored.id, country = %stored.country, "borrower registered");
        Ok(stored)
    }

    /// Register a lender with a subscription awaiting payment.
    pub fn register_lender(&self, registration: LenderRegistration) -> Result<User, LendingError> {
        let mut user = self.new_user(
            &registration.name,
            &registration.phone,
            &registration.country,
            Role::Lender,
        )?;
        user.subscription = Some(self.new_subscription(&registration.tier, registration.period)?);

        let stored = self.repository.insert_user(user)?;
        info!(user_id = %stored.id, country = %stored.country, "lender registered");
        Ok(stored)
    }

    fn new_subscription(&self, tier: &str, period: BillingPeriod) -> Result<Subscription, LendingError> {
        let spec = self.tiers.lookup(tier);
        let subscription = Subscription::new(spec.id, period, spec.price(period), self.today())?;
        Ok(subscription)
    }

    /// Start a subscription for an existing user, adding the lender role.
    pub fn subscribe(
        &self,
        user_id: &UserId,
        tier: &str,
        period: BillingPeriod,
    ) -> Result<Subscription, LendingError> {
        let mut user = self.require_user(user_id)?;
        let subscription = self.new_subscription(tier, period)?;
        user.roles.insert(Role::Lender);
        user.subscription = Some(subscription.clone());
        self.repository.save_user(user)?;
        info!(user_id = %user_id, tier = subscription.tier.label(), "subscription started");
        Ok(subscription)
    }

    pub fn confirm_subscription_payment(
        &self,
        user_id: &UserId,
        reference: &str,
    ) -> Result<Subscription, LendingError> {
        let mut user = self.require_user(user_id)?;
        let subscription = user.subscription.as_mut().ok_or(StateError::NoSubscription)?;
        subscription.activate(reference)?;
        let activated = subscription.clone();
        self.repository.save_user(user)?;
        info!(user_id = %user_id, expires = %activated.expiry_date, "subscription activated");
        Ok(activated)
    }

    pub fn cancel_subscription(&self, user_id: &UserId) -> Result<Subscription, LendingError> {
        let mut user = self.require_user(user_id)?;
        let subscription = user.subscription.as_mut().ok_or(StateError::NoSubscription)?;
        subscription.cancel();
        let cancelled = subscription.clone();
        self.repository.save_user(user)?;
        info!(user_id = %user_id, "subscription cancelled");
        Ok(cancelled)
    }

    /// Replace the current subscription with a fresh period from today.
    pub fn renew_subscription(
        &self,
        user_id: &UserId,
        period: BillingPeriod,
    ) -> Result<Subscription, LendingError> {
        let mut user = self.require_user(user_id)?;
        let current = user.subscription.as_ref().ok_or(StateError::NoSubscription)?;
        let price = self.tiers.get(current.tier).price(period);
        let renewed = current.renew(period, price, self.today())?;
        user.subscription = Some(renewed.clone());
        self.repository.save_user(user)?;
        info!(user_id = %user_id, expires = %renewed.expiry_date, "subscription renewed");
        Ok(renewed)
    }

    pub fn rate_user(&self, user_id: &UserId, score: f32) -> Result<User, LendingError> {
        if !(1.0..=User::MAX_RATING).contains(&score) {
            return Err(ValidationError::InvalidRating(score).into());
        }
        let mut user = self.require_user(user_id)?;
        user.apply_rating(score);
        self.repository.save_user(user.clone())?;
        Ok(user)
    }

    pub fn deactivate_user(&self, user_id: &UserId) -> Result<User, LendingError> {
        let mut user = self.require_user(user_id)?;
        user.active = false;
        self.repository.save_user(user.clone())?;
        info!(user_id = %user_id, "user deactivated");
        Ok(user)
    }

    /// Categories already in the cart or requested and awaiting a lender.
    fn staged_categories(&self, borrower: &UserId, loans: &[Loan]) -> Result<Vec<CategoryId>, LendingError> {
        let cart = self.repository.cart(borrower)?;
        let mut staged: Vec<CategoryId> = cart.items.into_iter().map(|item| item.category).collect();
        staged.extend(
            loans
                .iter()
                .filter(|loan| loan.status == LoanStatus::Requested)
                .map(|loan| loan.category.clone()),
        );
        Ok(staged)
    }

    fn validate_amount(
        &self,
        country: &CountryCode,
        category: &CategoryId,
        amount: f64,
        repayment_days: u32,
    ) -> Result<(), LendingError> {
        if amount.is_nan() || amount <= 0.0 {
            return Err(ValidationError::NonPositiveAmount { field: "amount" }.into());
        }
        if repayment_days == 0 {
            return Err(ValidationError::ZeroRepaymentDays.into());
        }
        let country = self.reference.country(country)?;
        let category = self.reference.category(category)?;
        if !category.accepts(amount) {
            return Err(ValidationError::AmountOutOfBounds {
                scope: category.name.clone(),
                amount,
                min: category.min_amount,
                max: category.max_amount,
            }
            .into());
        }
        if !country.accepts(amount) {
            return Err(ValidationError::AmountOutOfBounds {
                scope: country.name.clone(),
                amount,
                min: country.min_loan,
                max: country.max_loan,
            }
            .into());
        }
        Ok(())
    }

    pub fn cart(&self, borrower_id: &UserId) -> Result<LoanCart, LendingError> {
        Ok(self.repository.cart(borrower_id)?)
    }

    pub fn add_to_cart(&self, borrower_id: &UserId, item: CartItem) -> Result<LoanCart, LendingError> {
        let borrower = self.require_user(borrower_id)?;
        let loans = self.repository.loans_for_borrower(borrower_id)?;
        let staged = self.staged_categories(borrower_id, &loans)?;
        self.policy
            .can_request_loan(&borrower, &item.category, &loans, &staged)
            .into_result()?;
        self.validate_amount(&borrower.country, &item.category, item.amount, item.repayment_days)?;
        if !borrower.belongs_to(&item.group_id) {
            return Err(DenialReason::NotGroupMember(item.group_id).into());
        }

        let mut cart = self.repository.cart(borrower_id)?;
        debug!(borrower_id = %borrower_id, category = %item.category, "cart item added");
        cart.items.push(item);
        self.repository.save_cart(borrower_id, cart.clone())?;
        Ok(cart)
    }

    pub fn remove_from_cart(
        &self,
        borrower_id: &UserId,
        category: &CategoryId,
    ) -> Result<LoanCart, LendingError> {
        let mut cart = self.repository.cart(borrower_id)?;
        if !cart.contains(category) {
            return Err(StateError::NotInCart.into());
        }
        cart.items.retain(|item| &item.category != category);
        self.repository.save_cart(borrower_id, cart.clone())?;
        Ok(cart)
    }

    /// Turn every staged cart item into a loan request and empty the cart.
    pub fn submit_cart(&self, borrower_id: &UserId) -> Result<Vec<Loan>, LendingError> {
        let borrower = self.require_user(borrower_id)?;
        let cart = self.repository.cart(borrower_id)?;
        let country = self.reference.country(&borrower.country)?;
        self.policy
            .can_submit_cart(&borrower, &cart, country, &self.reference)
            .into_result()?;

        let mut opened = Vec::with_capacity(cart.items.len());
        for item in cart.items {
            let request = LoanRequest {
                borrower_id: borrower.id.clone(),
                category: item.category,
                group_id: item.group_id,
                amount: item.amount,
                repayment_days: item.repayment_days,
                purpose: item.purpose,
            };
            opened.push(self.open_loan(&borrower, request)?);
        }
        self.repository.save_cart(borrower_id, LoanCart::default())?;
        info!(borrower_id = %borrower_id, requests = opened.len(), "cart submitted");
        Ok(opened)
    }

    /// Request a single loan directly, bypassing the cart.
    pub fn request_loan(&self, request: LoanRequest) -> Result<Loan, LendingError> {
        let borrower = self.require_user(&request.borrower_id)?;
        self.validate_amount(
            &borrower.country,
            &request.category,
            request.amount,
            request.repayment_days,
        )?;

        let loans = self.repository.loans_for_borrower(&borrower.id)?;
        let staged = self.staged_categories(&borrower.id, &loans)?;
        self.policy
            .can_request_loan(&borrower, &request.category, &loans, &staged)
            .into_result()?;
        if !borrower.belongs_to(&request.group_id) {
            return Err(DenialReason::NotGroupMember(request.group_id).into());
        }

        self.open_loan(&borrower, request)
    }

    fn open_loan(&self, borrower: &User, request: LoanRequest) -> Result<Loan, LendingError> {
        let mut group = self.require_group(&request.group_id)?;
        if group.dissolved {
            return Err(DenialReason::GroupDissolved.into());
        }
        let group_loans = self.repository.loans_in_group(&group.id)?;
        if let Some(rule) = groups::rule_blocking_request(&group, borrower, &group_loans) {
            return Err(DenialReason::GroupRuleBroken(rule.clone()).into());
        }

        let loan = Loan::requested(
            LoanId::new(next_id(&LOAN_SEQUENCE, "ln")),
            request,
            &self.rates,
            borrower.guarantors.clone(),
            self.clock.now(),
        );
        let stored = self.repository.insert_loan(loan)?;
        group.loans.push(stored.id.clone());
        self.repository.save_group(group)?;

        info!(
            loan_id = %stored.id,
            borrower_id = %stored.borrower_id,
            group_id = %stored.group_id,
            amount = stored.amount,
            "loan requested"
        );
        Ok(stored)
    }

    /// Fund a requested loan: approve it for `lender_id` and disburse.
    pub fn fund_loan(&self, loan_id: &LoanId, lender_id: &UserId) -> Result<Loan, LendingError> {
        let mut lender = self.require_user(lender_id)?;
        if let Some(subscription) = lender.subscription.as_mut() {
            if subscription.refresh(self.today()) {
                warn!(user_id = %lender_id, "subscription expired");
                self.repository.save_user(lender.clone())?;
            }
        }

        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut loan = self.require_loan(loan_id)?;
            match loan.status {
                LoanStatus::Requested => {}
                LoanStatus::Cleared => return Err(StateError::AlreadyCleared.into()),
                _ => return Err(StateError::AlreadyFunded.into()),
            }
            let borrower = self.require_user(&loan.borrower_id)?;
            let group = self.require_group(&loan.group_id)?;
            let lender_loans = self.repository.loans_for_lender(lender_id)?;
            let verdict = self
                .policy
                .can_lend(&self.tiers, &lender, &borrower, &loan, &group, &lender_loans);
            if let Err(reason) = verdict.into_result() {
                warn!(loan_id = %loan_id, lender_id = %lender_id, code = reason.code(), "funding refused");
                return Err(reason.into());
            }

            let now = self.clock.now();
            ledger::fund(&mut loan, lender_id, now)?;
            ledger::disburse(&mut loan)?;
            match self.repository.update_loan(loan) {
                Ok(stored) => {
                    info!(loan_id = %loan_id, lender_id = %lender_id, "loan funded");
                    return Ok(stored);
                }
                Err(RepositoryError::VersionConflict) => {
                    debug!(loan_id = %loan_id, "version conflict while funding; retrying");
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(RepositoryError::VersionConflict.into())
    }

    pub fn record_repayment(
        &self,
        loan_id: &LoanId,
        input: RepaymentInput,
    ) -> Result<RepaymentReceipt, LendingError> {
        self.require_user(&input.recorded_by)?;
        let repayment_id = RepaymentId::new(next_id(&REPAYMENT_SEQUENCE, "rp"));

        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut loan = self.require_loan(loan_id)?;
            let now = self.clock.now();
            let receipt = ledger::record_repayment(&mut loan, repayment_id.clone(), input.clone(), now)?;
            let borrower_id = loan.borrower_id.clone();

            match self.repository.update_loan(loan) {
                Ok(_) => {
                    info!(
                        loan_id = %loan_id,
                        amount = input.amount,
                        remaining = receipt.remaining_balance,
                        "repayment recorded"
                    );
                    if receipt.status == LoanStatus::Cleared {
                        info!(loan_id = %loan_id, "loan cleared");
                        // The repayment is stored; a retry would be a duplicate reference.
                        if let Err(error) = self.settle_blacklist(&borrower_id, loan_id) {
                            warn!(
                                loan_id = %loan_id,
                                borrower_id = %borrower_id,
                                error = %error,
                                "blacklist settlement deferred"
                            );
                        }
                    }
                    return Ok(receipt);
                }
                Err(RepositoryError::VersionConflict) => {
                    debug!(loan_id = %loan_id, "version conflict while recording repayment; retrying");
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(RepositoryError::VersionConflict.into())
    }

    fn settle_blacklist(&self, borrower_id: &UserId, loan_id: &LoanId) -> Result<(), LendingError> {
        let mut blacklist = self.repository.blacklist()?;
        if !blacklist.is_blacklisted(borrower_id) {
            return Ok(());
        }
        let has_outstanding = self
            .repository
            .loans_for_borrower(borrower_id)?
            .iter()
            .any(|loan| loan.status.is_outstanding());
        let marked = blacklist.settle_loan(borrower_id, loan_id, has_outstanding);
        if marked > 0 {
            self.repository.save_blacklist(blacklist)?;
            info!(borrower_id = %borrower_id, entries = marked, "blacklist debt cleared");
        }
        Ok(())
    }

    pub fn loan(&self, loan_id: &LoanId) -> Result<Loan, LendingError> {
        self.require_loan(loan_id)
    }

    /// Loan with interest, penalty and balance derived as of now.
    pub fn loan_view(&self, loan_id: &LoanId) -> Result<LoanView, LendingError> {
        Ok(self.require_loan(loan_id)?.view(self.clock.now()))
    }

    pub fn quote(&self, amount: f64, period_days: u32) -> LoanQuote {
        quote(amount, period_days, &self.rates)
    }

    /// Quote plus warnings against the lender's tier per-loan cap.
    pub fn quote_for_lender(
        &self,
        lender_id: &UserId,
        amount: f64,
        period_days: u32,
    ) -> Result<(LoanQuote, Vec<QuoteWarning>), LendingError> {
        let lender = self.require_user(lender_id)?;
        let cap = lender
            .subscription
            .as_ref()
            .map(|subscription| self.tiers.get(subscription.tier).per_loan_limit);
        let quote = self.quote(amount, period_days);
        let warnings = quote_warnings(&quote, cap);
        Ok((quote, warnings))
    }

    /// Apply an admin override. Rejected attempts are written to the audit
    /// log before the error is returned.
    pub fn override_loan(
        &self,
        loan_id: &LoanId,
        admin_id: &UserId,
        request: OverrideRequest,
    ) -> Result<OverrideRecord, LendingError> {
        let admin = self.require_user(admin_id)?;
        let override_id = OverrideId::new(next_id(&OVERRIDE_SEQUENCE, "ov"));

        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut loan = self.require_loan(loan_id)?;
            let now = self.clock.now();
            match ledger::apply_override(&mut loan, &admin, &request, override_id.clone(), now) {
                Ok(record) => match self.repository.update_loan(loan) {
                    Ok(_) => {
                        self.repository.append_override(record.clone())?;
                        info!(
                            loan_id = %loan_id,
                            admin_id = %admin_id,
                            field = %record.field,
                            old_value = %record.old_value,
                            new_value = %record.new_value,
                            "loan override applied"
                        );
                        return Ok(record);
                    }
                    Err(RepositoryError::VersionConflict) => {
                        debug!(loan_id = %loan_id, "version conflict while overriding; retrying");
                    }
                    Err(other) => return Err(other.into()),
                },
                Err(rejected) => {
                    self.repository.append_override(rejected.record)?;
                    warn!(
                        loan_id = %loan_id,
                        admin_id = %admin_id,
                        field = %request.field,
                        code = rejected.error.code(),
                        "loan override rejected"
                    );
                    return Err(rejected.error);
                }
            }
        }
        Err(RepositoryError::VersionConflict.into())
    }

    pub fn overrides(&self, loan_id: &LoanId) -> Result<Vec<OverrideRecord>, LendingError> {
        self.require_loan(loan_id)?;
        Ok(self.repository.overrides_for(loan_id)?)
    }

    /// Found a group with `creator_id` as primary admin. `member_ids` lists
    /// the other founders; duplicates and the creator are ignored.
    pub fn create_group(
        &self,
        creator_id: &UserId,
        draft: GroupDraft,
        member_ids: &[UserId],
    ) -> Result<Group, LendingError> {
        if draft.name.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "name" }.into());
        }
        let mut creator = self.require_user(creator_id)?;
        let mut seen = BTreeSet::from([creator_id.clone()]);
        let mut others = Vec::new();
        for id in member_ids {
            if seen.insert(id.clone()) {
                others.push(self.require_user(id)?);
            }
        }

        let id = GroupId::new(next_id(&GROUP_SEQUENCE, "grp"));
        let group = groups::create(
            &self.policy,
            id,
            draft,
            &mut creator,
            &mut others,
            self.clock.now(),
        )?;
        let stored = self.repository.insert_group(group)?;
        self.repository.save_user(creator)?;
        for member in others {
            self.repository.save_user(member)?;
        }

        info!(
            group_id = %stored.id,
            country = %stored.country,
            members = stored.members.len(),
            "group created"
        );
        Ok(stored)
    }

    pub fn group(&self, group_id: &GroupId) -> Result<Group, LendingError> {
        self.require_group(group_id)
    }

    pub fn join_group(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
        invite_code: Option<&str>,
    ) -> Result<Group, LendingError> {
        let mut group = self.require_group(group_id)?;
        let mut user = self.require_user(user_id)?;
        if let Err(error) = groups::join(&self.policy, &mut group, &mut user, invite_code, self.clock.now()) {
            warn!(group_id = %group_id, user_id = %user_id, code = error.code(), "group join refused");
            return Err(error);
        }
        self.repository.save_group(group.clone())?;
        self.repository.save_user(user)?;
        info!(group_id = %group_id, user_id = %user_id, "member joined group");
        Ok(group)
    }

    pub fn leave_group(&self, group_id: &GroupId, user_id: &UserId) -> Result<LeaveOutcome, LendingError> {
        let mut group = self.require_group(group_id)?;
        let mut user = self.require_user(user_id)?;
        let outcome = groups::leave(&mut group, &mut user)?;
        self.repository.save_group(group)?;
        self.repository.save_user(user)?;
        info!(
            group_id = %group_id,
            user_id = %user_id,
            dissolved = outcome.dissolved,
            "member left group"
        );
        Ok(outcome)
    }

    pub fn appoint_group_admin(
        &self,
        group_id: &GroupId,
        actor_id: &UserId,
        target_id: &UserId,
    ) -> Result<Group, LendingError> {
        let mut group = self.require_group(group_id)?;
        let actor = self.require_user(actor_id)?;
        let mut target = self.require_user(target_id)?;
        groups::appoint_admin(&mut group, &actor, &mut target)?;
        self.repository.save_group(group.clone())?;
        self.repository.save_user(target)?;
        info!(group_id = %group_id, admin_id = %target_id, "group admin appointed");
        Ok(group)
    }

    pub fn transfer_group_admin(
        &self,
        group_id: &GroupId,
        from_id: &UserId,
        to_id: &UserId,
    ) -> Result<Group, LendingError> {
        let mut group = self.require_group(group_id)?;
        let from = self.require_user(from_id)?;
        let mut to = self.require_user(to_id)?;
        groups::transfer_admin(&mut group, &from, &mut to)?;
        self.repository.save_group(group.clone())?;
        self.repository.save_user(to)?;
        info!(group_id = %group_id, from = %from_id, to = %to_id, "group admin transferred");
        Ok(group)
    }

    fn group_members(&self, group: &Group) -> Result<Vec<User>, LendingError> {
        let mut members = Vec::with_capacity(group.members.len());
        for member in &group.members {
            if let Some(user) = self.repository.user(&member.user_id)? {
                members.push(user);
            }
        }
        Ok(members)
    }

    pub fn group_statistics(&self, group_id: &GroupId) -> Result<GroupStatistics, LendingError> {
        let group = self.require_group(group_id)?;
        let members = self.group_members(&group)?;
        let loans = self.repository.loans_in_group(group_id)?;
        Ok(groups::statistics(&self.policy, &group, &members, &loans))
    }

    pub fn group_rule_violations(&self, group_id: &GroupId) -> Result<Vec<RuleViolation>, LendingError> {
        let group = self.require_group(group_id)?;
        let members = self.group_members(&group)?;
        let loans = self.repository.loans_in_group(group_id)?;
        Ok(groups::rule_violations(&group, &members, &loans))
    }

    /// Manual entry not tied to a loan. It becomes removable once the
    /// borrower has no outstanding loans, or through [`Self::mark_debt_cleared`].
    pub fn blacklist_borrower(
        &self,
        borrower_id: &UserId,
        group_id: Option<GroupId>,
        amount_defaulted: f64,
        default_date: NaiveDate,
    ) -> Result<BlacklistEntry, LendingError> {
        self.record_default(
            borrower_id,
            DefaultedDebt {
                group_id,
                loan_id: None,
                amount: amount_defaulted,
                default_date,
            },
        )
    }

    fn record_default(&self, borrower_id: &UserId, debt: DefaultedDebt) -> Result<BlacklistEntry, LendingError> {
        let mut borrower = self.require_user(borrower_id)?;
        let mut blacklist = self.repository.blacklist()?;
        let entry = blacklist
            .add(
                BlacklistId::new(next_id(&BLACKLIST_SEQUENCE, "bl")),
                &mut borrower,
                debt,
                self.blacklist_after_days,
            )?
            .clone();
        self.repository.save_blacklist(blacklist)?;
        self.repository.save_user(borrower)?;
        warn!(
            borrower_id = %borrower_id,
            loan_id = ?entry.loan_id,
            amount = entry.amount_defaulted,
            blacklist_date = %entry.blacklist_date,
            "borrower blacklisted"
        );
        Ok(entry)
    }

    /// Blacklist borrowers whose loans are past the default window, one entry
    /// per defaulted loan.
    pub fn flag_defaults(&self) -> Result<Vec<BlacklistEntry>, LendingError> {
        let now = self.clock.now();
        let loans = self.repository.outstanding_loans()?;
        let mut flagged = Vec::new();
        for loan in defaulted_loans(&loans, now, self.blacklist_after_days) {
            if self.repository.blacklist()?.covers_loan(&loan.id) {
                continue;
            }
            flagged.push(self.record_default(
                &loan.borrower_id,
                DefaultedDebt {
                    group_id: Some(loan.group_id.clone()),
                    loan_id: Some(loan.id.clone()),
                    amount: loan.balance(now),
                    default_date: loan.due_date.unwrap_or(loan.requested_at).date_naive(),
                },
            )?);
        }
        Ok(flagged)
    }

    pub fn blacklist_entries(&self) -> Result<Vec<BlacklistEntry>, LendingError> {
        Ok(self.repository.blacklist()?.into_entries())
    }

    pub fn mark_debt_cleared(&self, borrower_id: &UserId) -> Result<usize, LendingError> {
        self.require_user(borrower_id)?;
        let mut blacklist = self.repository.blacklist()?;
        let marked = blacklist.mark_debt_cleared(borrower_id);
        self.repository.save_blacklist(blacklist)?;
        Ok(marked)
    }

    pub fn remove_from_blacklist(
        &self,
        admin_id: &UserId,
        entry_id: &BlacklistId,
    ) -> Result<BlacklistEntry, LendingError> {
        let admin = self.require_user(admin_id)?;
        let mut blacklist = self.repository.blacklist()?;
        let borrower_id = blacklist
            .entry(entry_id)
            .map(|entry| entry.borrower_id.clone())
            .ok_or_else(|| LendingError::not_found("blacklist entry", entry_id))?;
        let mut borrower = self.require_user(&borrower_id)?;

        let removed = blacklist.remove(&admin, entry_id, &mut borrower)?;
        self.repository.save_blacklist(blacklist)?;
        self.repository.save_user(borrower)?;
        info!(borrower_id = %borrower_id, admin_id = %admin_id, "blacklist entry removed");
        Ok(removed)
    }
}
