//! End-to-end scenarios for the lending service and its HTTP router.
//!
//! Every record is created through the public registration, group and loan
//! operations so the scenarios exercise the same paths a deployment would.

mod common {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};

    use mpesewa::lending::{
        BillingPeriod, BorrowerRegistration, CountryCode, FixedClock, Group, GroupDraft,
        Guarantor, InMemoryLendingRepository, LenderRegistration, LendingService, RateCard,
        ReferenceData, User,
    };

    pub(super) type Service = LendingService<InMemoryLendingRepository, FixedClock>;

    pub(super) fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 8, 30, 0)
            .single()
            .expect("valid timestamp")
    }

    pub(super) fn service_with(rates: RateCard) -> (Arc<Service>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(start()));
        let service = LendingService::new(
            Arc::new(InMemoryLendingRepository::new()),
            clock.clone(),
            ReferenceData::standard(),
        )
        .with_rates(rates);
        (Arc::new(service), clock)
    }

    pub(super) fn service() -> (Arc<Service>, Arc<FixedClock>) {
        service_with(RateCard::default())
    }

    pub(super) fn register_borrower(service: &Service, name: &str, country: &str) -> User {
        service
            .register_borrower(BorrowerRegistration {
                name: name.to_string(),
                phone: "+254700123456".to_string(),
                country: CountryCode::new(country),
                guarantors: vec![
                    Guarantor {
                        name: format!("{name} guarantor one"),
                        phone: "+254711000001".to_string(),
                        relationship: "sibling".to_string(),
                    },
                    Guarantor {
                        name: format!("{name} guarantor two"),
                        phone: "+254711000002".to_string(),
                        relationship: "neighbour".to_string(),
                    },
                ],
            })
            .expect("borrower registers")
    }

    pub(super) fn register_borrowers(service: &Service, prefix: &str, count: usize) -> Vec<User> {
        (1..=count)
            .map(|index| register_borrower(service, &format!("{prefix} {index}"), "KE"))
            .collect()
    }

    /// Active lender on `tier`, paid monthly, enrolled in `group`.
    pub(super) fn register_lender(service: &Service, name: &str, tier: &str, group: &Group) -> User {
        let lender = service
            .register_lender(LenderRegistration {
                name: name.to_string(),
                phone: "+254722123456".to_string(),
                country: CountryCode::new("KE"),
                tier: tier.to_string(),
                period: BillingPeriod::Monthly,
            })
            .expect("lender registers");
        service
            .confirm_subscription_payment(&lender.id, &format!("MPESA-{name}"))
            .expect("subscription paid");
        service
            .join_group(&group.id, &lender.id, None)
            .expect("lender joins the group");
        lender
    }

    pub(super) fn found_group(service: &Service, name: &str, founders: &[User]) -> Group {
        let (creator, others) = founders.split_first().expect("at least one founder");
        let ids: Vec<_> = others.iter().map(|user| user.id.clone()).collect();
        service
            .create_group(
                &creator.id,
                GroupDraft {
                    name: name.to_string(),
                    ..GroupDraft::default()
                },
                &ids,
            )
            .expect("group founded")
    }
}

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use mpesewa::lending::calculator::{interest, penalty};
use mpesewa::lending::{
    lending_router, CategoryId, DenialReason, Group, LendingError, LoanId, LoanRequest,
    LoanStanding, LoanStatus, RateCard, RepaymentInput, RepaymentMethod, User,
};

use common::*;

fn loan_request(borrower: &User, group: &Group, category: &str, amount: f64) -> LoanRequest {
    LoanRequest {
        borrower_id: borrower.id.clone(),
        category: CategoryId::new(category),
        group_id: group.id.clone(),
        amount,
        repayment_days: 7,
        purpose: "restock".to_string(),
    }
}

fn payment(amount: f64, reference: &str, by: &User) -> RepaymentInput {
    RepaymentInput {
        amount,
        method: RepaymentMethod::Mpesa,
        reference: reference.to_string(),
        date: start(),
        recorded_by: by.id.clone(),
    }
}

#[test]
fn interest_scales_with_term_and_penalty_with_lateness() {
    let mut previous = 0.0;
    for days in 0..=60 {
        let accrued = interest(1000.0, days, 0.10);
        assert!((accrued - 1000.0 * 0.10 * (f64::from(days) / 7.0)).abs() < 1e-9);
        assert!(accrued >= previous, "interest fell at {days} days");
        previous = accrued;
    }

    assert_eq!(penalty(1000.0, 0, 0.05), 0.0);
    let mut previous = 0.0;
    for days in 1..=60 {
        let accrued = penalty(1000.0, days, 0.05);
        assert!(accrued > previous, "penalty did not grow at {days} days");
        previous = accrued;
    }
}

#[test]
fn loan_runs_from_request_to_cleared() {
    let (service, clock) = service();
    let borrowers = register_borrowers(&service, "Wanjiku", 5);
    let group = found_group(&service, "Kawangware Traders", &borrowers);
    let lender = register_lender(&service, "Njoroge", "premium", &group);

    let loan = service
        .request_loan(loan_request(&borrowers[0], &group, "fare", 1000.0))
        .expect("request accepted");
    assert_eq!(loan.status, LoanStatus::Requested);

    let funded = service.fund_loan(&loan.id, &lender.id).expect("funded");
    assert_eq!(funded.status, LoanStatus::Active);

    let view = service.loan_view(&loan.id).expect("view");
    assert_eq!(view.total_due, 1100.0);

    clock.advance_days(10);
    let view = service.loan_view(&loan.id).expect("view");
    assert_eq!(view.standing, LoanStanding::Overdue);
    assert_eq!(view.penalty, 150.0);
    assert_eq!(view.total_due, 1250.0);

    let receipt = service
        .record_repayment(&loan.id, payment(1250.0, "QK7TX9", &borrowers[0]))
        .expect("settled");
    assert_eq!(receipt.status, LoanStatus::Cleared);
    assert_eq!(receipt.remaining_balance, 0.0);

    clock.advance_days(30);
    let view = service.loan_view(&loan.id).expect("view");
    assert_eq!(view.balance, 0.0);
    assert_eq!(view.penalty, 150.0);
    assert!(!view.overdue);
}

#[test]
fn split_repayments_settle_a_hundred_exactly() {
    let (service, _) = service_with(RateCard {
        weekly_interest_rate: 0.0,
        ..RateCard::default()
    });
    let borrowers = register_borrowers(&service, "Akinyi", 5);
    let group = found_group(&service, "Kisumu Fishmongers", &borrowers);
    let lender = register_lender(&service, "Ochieng", "basic", &group);

    let loan = service
        .request_loan(loan_request(&borrowers[1], &group, "fare", 100.0))
        .expect("request accepted");
    service.fund_loan(&loan.id, &lender.id).expect("funded");

    let first = service
        .record_repayment(&loan.id, payment(60.0, "MP-60", &borrowers[1]))
        .expect("first instalment");
    assert_eq!(first.remaining_balance, 40.0);
    let second = service
        .record_repayment(&loan.id, payment(40.0, "MP-40", &borrowers[1]))
        .expect("second instalment");
    assert_eq!(second.status, LoanStatus::Cleared);
    assert_eq!(second.remaining_balance, 0.0);
}

#[test]
fn basic_lenders_stop_at_their_weekly_limit() {
    let (service, _) = service();
    let borrowers = register_borrowers(&service, "Mutua", 5);
    let group = found_group(&service, "Machakos Boda", &borrowers);
    let lender = register_lender(&service, "Chebet", "basic", &group);

    let first = service
        .request_loan(loan_request(&borrowers[0], &group, "fuel", 1000.0))
        .expect("first request");
    let second = service
        .request_loan(loan_request(&borrowers[1], &group, "fuel", 600.0))
        .expect("second request");
    service.fund_loan(&first.id, &lender.id).expect("within limit");

    match service.fund_loan(&second.id, &lender.id) {
        Err(LendingError::Eligibility(DenialReason::ExceedsTierHeadroom { .. })) => {}
        other => panic!("expected weekly limit denial, got {other:?}"),
    }
}

#[test]
fn borrowers_hold_at_most_four_groups() {
    let (service, _) = service();
    let regulars = register_borrowers(&service, "Kiprop", 5);
    for index in 1..=4 {
        found_group(&service, &format!("Eldoret Circle {index}"), &regulars);
    }
    let newcomers = register_borrowers(&service, "Jepchirchir", 5);
    let fifth = found_group(&service, "Iten Runners", &newcomers);

    match service.join_group(&fifth.id, &regulars[0].id, None) {
        Err(LendingError::Eligibility(DenialReason::BorrowerGroupLimit { max })) => {
            assert_eq!(max, 4);
        }
        other => panic!("expected group limit, got {other:?}"),
    }
}

#[test]
fn groups_never_cross_borders_and_blacklist_dominates() {
    let (service, _) = service();
    let borrowers = register_borrowers(&service, "Otieno", 5);
    let group = found_group(&service, "Nairobi West", &borrowers);

    let ugandan = register_borrower(&service, "Nakato", "UG");
    match service.join_group(&group.id, &ugandan.id, None) {
        Err(LendingError::Eligibility(DenialReason::CountryMismatch)) => {}
        other => panic!("expected country mismatch, got {other:?}"),
    }

    service
        .blacklist_borrower(&borrowers[2].id, Some(group.id.clone()), 2500.0, start().date_naive())
        .expect("blacklisted");
    match service.request_loan(loan_request(&borrowers[2], &group, "food", 500.0)) {
        Err(error @ LendingError::Eligibility(DenialReason::Blacklisted)) => {
            assert_eq!(error.code(), "blacklisted");
        }
        other => panic!("expected blacklisted, got {other:?}"),
    }
}

#[tokio::test]
async fn http_surface_drives_the_same_rules() {
    let (service, _) = service();
    let borrowers = register_borrowers(&service, "Kamau", 5);
    let group = found_group(&service, "Thika Greengrocers", &borrowers);
    let lender = register_lender(&service, "Wairimu", "basic", &group);
    let admin = register_borrower(&service, "Platform Admin", "KE");
    let router = lending_router(service.clone());

    let post = |uri: String, body: Value| {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    };

    let response = router
        .clone()
        .oneshot(post(
            "/loans".to_string(),
            json!({
                "borrowerId": borrowers[0].id,
                "categoryId": "food",
                "amount": 1000.0,
                "groupId": group.id,
                "repaymentDays": 7,
                "purpose": "stock",
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body");
    let payload: Value = serde_json::from_slice(&body).expect("json");
    let loan_id = payload["loanId"].as_str().expect("loan id").to_string();

    let response = router
        .clone()
        .oneshot(post(
            format!("/loans/{loan_id}/fund"),
            json!({ "lenderId": lender.id }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);

    // Registered borrowers are not platform admins.
    let response = router
        .oneshot(post(
            format!("/loans/{loan_id}/overrides"),
            json!({
                "adminId": admin.id,
                "field": "amount",
                "value": "1200",
                "reason": "data entry error",
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let audit = service
        .overrides(&LoanId::new(loan_id.clone()))
        .expect("audit");
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].applied());
    assert_eq!(
        service
            .loan(&LoanId::new(loan_id))
            .expect("loan")
            .amount,
        1000.0
    );
}
