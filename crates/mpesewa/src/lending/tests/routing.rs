use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::lending::clock::FixedClock;
use crate::lending::domain::LoanId;
use crate::lending::memory::InMemoryLendingRepository;
use crate::lending::reference::ReferenceData;
use crate::lending::router::{lending_router, LoanRequestBody};
use crate::lending::service::LendingService;

fn loan_body(borrower: &str, category: &str, amount: f64) -> Value {
    json!({
        "borrowerId": borrower,
        "categoryId": category,
        "amount": amount,
        "groupId": GROUP,
        "repaymentDays": 7,
        "purpose": "stock",
    })
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn code(payload: &Value) -> Option<&str> {
    payload.get("code").and_then(Value::as_str)
}

#[tokio::test]
async fn request_handler_returns_internal_error_on_repository_failure() {
    let service = Arc::new(LendingService::new(
        Arc::new(UnavailableRepository),
        Arc::new(FixedClock::new(t0())),
        ReferenceData::standard(),
    ));
    let body: LoanRequestBody =
        serde_json::from_value(loan_body("bor-1", "fare", 500.0)).expect("valid body");

    let response = crate::lending::router::request_loan_handler::<UnavailableRepository, FixedClock>(
        State(service),
        axum::Json(body),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(response).await;
    assert_eq!(code(&payload), Some("repository_unavailable"));
}

#[tokio::test]
async fn request_handler_reports_denial_reason() {
    let (service, _, _) = build_service();
    let body: LoanRequestBody =
        serde_json::from_value(loan_body("bor-6", "fare", 500.0)).expect("valid body");

    let response = crate::lending::router::request_loan_handler::<
        InMemoryLendingRepository,
        FixedClock,
    >(State(Arc::new(service)), axum::Json(body))
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert_eq!(code(&payload), Some("no_group_membership"));
    assert_eq!(
        payload.get("reason").and_then(Value::as_str),
        Some("borrower must belong to a group")
    );
}

#[tokio::test]
async fn loan_route_accepts_requests() {
    let (service, _, _) = build_service();
    let router = lending_router(Arc::new(service));

    let response = router
        .oneshot(post_json("/loans", &loan_body("bor-1", "fare", 1000.0)))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    let loan_id = payload.get("loanId").and_then(Value::as_str).unwrap_or_default();
    assert!(loan_id.starts_with("ln-"), "unexpected loan id {loan_id}");
    assert_eq!(payload.get("status").and_then(Value::as_str), Some("requested"));
}

#[tokio::test]
async fn unknown_categories_are_unprocessable() {
    let (service, _, _) = build_service();
    let router = lending_router(Arc::new(service));

    let response = router
        .oneshot(post_json("/loans", &loan_body("bor-1", "yacht", 1000.0)))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(code(&read_json_body(response).await), Some("unknown_category"));
}

#[tokio::test]
async fn loan_handler_returns_not_found_for_unknown_ids() {
    let (service, _, _) = build_service();

    let response = crate::lending::router::loan_handler::<InMemoryLendingRepository, FixedClock>(
        State(Arc::new(service)),
        Path("ln-missing".to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(code(&read_json_body(response).await), Some("not_found"));
}

#[tokio::test]
async fn loan_view_reports_derived_overdue_state() {
    let (service, _, clock) = build_service();
    let service = Arc::new(service);
    let loan = service
        .request_loan(request("bor-1", "fare", 1000.0, 7))
        .expect("request");
    service
        .fund_loan(&loan.id, &uid("len-premium"))
        .expect("funded");
    clock.advance_days(9);

    let response = lending_router(service)
        .oneshot(
            Request::get(format!("/loans/{}", loan.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("status").and_then(Value::as_str), Some("active"));
    assert_eq!(payload.get("overdue").and_then(Value::as_bool), Some(true));
    assert_eq!(payload.get("overdueDays").and_then(Value::as_u64), Some(2));
    assert_eq!(payload.get("balance").and_then(Value::as_f64), Some(1200.0));
}

#[tokio::test]
async fn fund_route_refuses_lenders_over_their_tier() {
    let (service, _, _) = build_service();
    let service = Arc::new(service);
    let first = service
        .request_loan(request("bor-1", "fare", 1000.0, 7))
        .expect("first request");
    let second = service
        .request_loan(request("bor-2", "fare", 600.0, 7))
        .expect("second request");
    let router = lending_router(service);

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/loans/{}/fund", first.id),
            &json!({ "lenderId": "len-basic" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("status").and_then(Value::as_str), Some("active"));
    assert!(payload.get("dueDate").and_then(Value::as_str).is_some());

    let response = router
        .oneshot(post_json(
            &format!("/loans/{}/fund", second.id),
            &json!({ "lenderId": "len-basic" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(code(&read_json_body(response).await), Some("exceeds_tier_limit"));
}

#[tokio::test]
async fn repayment_route_returns_receipts() {
    let (service, _, _) = build_service();
    let service = Arc::new(service);
    let loan = service
        .request_loan(request("bor-1", "fare", 1000.0, 7))
        .expect("request");
    service
        .fund_loan(&loan.id, &uid("len-premium"))
        .expect("funded");
    let router = lending_router(service.clone());
    let uri = format!("/loans/{}/repayments", loan.id);
    let body = json!({
        "amount": 600.0,
        "method": "mpesa",
        "reference": "QAB12CD34",
        "recordedBy": "bor-1",
    });

    let response = router
        .clone()
        .oneshot(post_json(&uri, &body))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("remainingBalance").and_then(Value::as_f64), Some(500.0));
    assert_eq!(payload.get("status").and_then(Value::as_str), Some("active"));

    let response = router
        .oneshot(post_json(&uri, &body))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(code(&read_json_body(response).await), Some("duplicate_reference"));
    assert_eq!(service.loan(&loan.id).expect("loan").repayments.len(), 1);
}

#[tokio::test]
async fn repayment_route_attributes_anonymous_payments_to_the_borrower() {
    let (service, _, _) = build_service();
    let service = Arc::new(service);
    let loan = service
        .request_loan(request("bor-2", "fare", 1000.0, 7))
        .expect("request");
    service
        .fund_loan(&loan.id, &uid("len-basic"))
        .expect("funded");
    let router = lending_router(service.clone());

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/loans/{}/repayments", loan.id),
            &json!({
                "amount": 1100.0,
                "method": "mpesa",
                "reference": "QKL55MN01",
                "date": "2025-03-05T12:00:00Z",
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("remainingBalance").and_then(Value::as_f64), Some(0.0));
    assert_eq!(payload.get("status").and_then(Value::as_str), Some("cleared"));

    let stored = service.loan(&loan.id).expect("loan");
    assert_eq!(stored.repayments[0].recorded_by, uid("bor-2"));

    let response = router
        .oneshot(post_json(
            "/loans/ln-missing/repayments",
            &json!({ "amount": 10.0, "method": "cash", "reference": "C-1" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn override_route_requires_an_admin() {
    let (service, _, _) = build_service();
    let service = Arc::new(service);
    let loan = service
        .request_loan(request("bor-1", "fare", 1000.0, 7))
        .expect("request");
    let router = lending_router(service.clone());
    let uri = format!("/loans/{}/overrides", loan.id);

    let response = router
        .clone()
        .oneshot(post_json(
            &uri,
            &json!({ "adminId": "bor-2", "field": "amount", "value": "10", "reason": "mine" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(code(&read_json_body(response).await), Some("admin_required"));

    let response = router
        .oneshot(post_json(
            &uri,
            &json!({ "adminId": "adm-1", "field": "amount", "value": "1200", "reason": "typo" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("oldValue").and_then(Value::as_str), Some("1000"));
    assert_eq!(payload.get("newValue").and_then(Value::as_str), Some("1200"));

    assert_eq!(service.overrides(&loan.id).expect("audit").len(), 2);
}

#[tokio::test]
async fn group_routes_create_join_and_leave() {
    let (service, _, _) = build_service();
    let router = lending_router(Arc::new(service));

    let response = router
        .clone()
        .oneshot(post_json(
            "/groups",
            &json!({
                "creatorId": "bor-2",
                "name": "Gikomba Traders",
                "memberIds": ["bor-3", "bor-4", "bor-5", "bor-6"],
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("members").and_then(Value::as_u64), Some(5));
    assert_eq!(payload.get("country").and_then(Value::as_str), Some("KE"));
    let group_id = payload
        .get("groupId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/groups/{group_id}/members"),
            &json!({ "userId": "bor-ug" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(code(&read_json_body(response).await), Some("country_mismatch"));

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/groups/{group_id}/members"),
            &json!({ "userId": "bor-1" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json_body(response).await.get("members").and_then(Value::as_u64),
        Some(6)
    );

    let response = router
        .clone()
        .oneshot(
            Request::delete(format!("/groups/{group_id}/members/bor-2"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(code(&read_json_body(response).await), Some("sole_admin"));

    let response = router
        .oneshot(
            Request::delete(format!("/groups/{group_id}/members/bor-6"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("dissolved").and_then(Value::as_bool), Some(false));
    assert_eq!(payload.get("primaryAdmin").and_then(Value::as_str), Some("bor-2"));
}

#[tokio::test]
async fn unknown_loans_cannot_be_funded() {
    let (service, _, _) = build_service();

    let response = crate::lending::router::fund_handler::<InMemoryLendingRepository, FixedClock>(
        State(Arc::new(service)),
        Path(LoanId::new("ln-missing").to_string()),
        axum::Json(crate::lending::router::FundBody {
            lender_id: "len-basic".to_string(),
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
