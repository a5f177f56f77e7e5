use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::clock::Clock;
use super::domain::{CategoryId, GroupId, LoanId, RepaymentMethod, UserId};
use super::error::{LendingError, StateError};
use super::groups::{GroupDraft, GroupRule};
use super::ledger::{LoanRequest, OverrideRequest, RepaymentInput};
use super::reference::ReferenceError;
use super::repository::{LendingRepository, RepositoryError};
use super::service::LendingService;

/// Router builder exposing the loan and group endpoints.
pub fn lending_router<R, C>(service: Arc<LendingService<R, C>>) -> Router
where
    R: LendingRepository + 'static,
    C: Clock + 'static,
{
    Router::new()
        .route("/loans", post(request_loan_handler::<R, C>))
        .route("/loans/:loan_id", get(loan_handler::<R, C>))
        .route("/loans/:loan_id/fund", post(fund_handler::<R, C>))
        .route("/loans/:loan_id/repayments", post(repayment_handler::<R, C>))
        .route("/loans/:loan_id/overrides", post(override_handler::<R, C>))
        .route("/groups", post(create_group_handler::<R, C>))
        .route("/groups/:group_id/members", post(join_handler::<R, C>))
        .route(
            "/groups/:group_id/members/:user_id",
            delete(leave_handler::<R, C>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoanRequestBody {
    pub borrower_id: String,
    pub category_id: String,
    pub amount: f64,
    pub group_id: String,
    pub repayment_days: u32,
    #[serde(default)]
    pub purpose: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FundBody {
    pub lender_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RepaymentBody {
    pub amount: f64,
    pub method: RepaymentMethod,
    pub reference: String,
    /// Defaults to the time the request is handled.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    /// Defaults to the loan's borrower.
    #[serde(default)]
    pub recorded_by: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OverrideBody {
    pub admin_id: String,
    pub field: String,
    pub value: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateGroupBody {
    pub creator_id: String,
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
    #[serde(default)]
    pub invite_only: bool,
    #[serde(default)]
    pub invite_code: Option<String>,
    #[serde(default)]
    pub rules: Vec<GroupRule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JoinBody {
    pub user_id: String,
    #[serde(default)]
    pub invite_code: Option<String>,
}

/// Status for a service error. Eligibility denials map to `denied`, which
/// differs per endpoint.
fn status_for(error: &LendingError, denied: StatusCode) -> StatusCode {
    match error {
        LendingError::Eligibility(_) => denied,
        LendingError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LendingError::State(StateError::AdminRequired { .. }) => StatusCode::FORBIDDEN,
        LendingError::State(_) => StatusCode::CONFLICT,
        LendingError::NotFound { .. } => StatusCode::NOT_FOUND,
        LendingError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        LendingError::Repository(RepositoryError::Conflict)
        | LendingError::Repository(RepositoryError::VersionConflict) => StatusCode::CONFLICT,
        LendingError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        LendingError::Reference(ReferenceError::UnknownCountry(_))
        | LendingError::Reference(ReferenceError::UnknownCategory(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LendingError::Reference(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: LendingError, denied: StatusCode) -> Response {
    let payload = json!({
        "reason": error.to_string(),
        "code": error.code(),
    });
    (status_for(&error, denied), axum::Json(payload)).into_response()
}

pub(crate) async fn request_loan_handler<R, C>(
    State(service): State<Arc<LendingService<R, C>>>,
    axum::Json(body): axum::Json<LoanRequestBody>,
) -> Response
where
    R: LendingRepository + 'static,
    C: Clock + 'static,
{
    let request = LoanRequest {
        borrower_id: UserId::new(body.borrower_id),
        category: CategoryId::new(body.category_id),
        group_id: GroupId::new(body.group_id),
        amount: body.amount,
        repayment_days: body.repayment_days,
        purpose: body.purpose,
    };
    match service.request_loan(request) {
        Ok(loan) => {
            let payload = json!({
                "loanId": loan.id,
                "status": loan.status.label(),
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error, StatusCode::UNPROCESSABLE_ENTITY),
    }
}

pub(crate) async fn loan_handler<R, C>(
    State(service): State<Arc<LendingService<R, C>>>,
    Path(loan_id): Path<String>,
) -> Response
where
    R: LendingRepository + 'static,
    C: Clock + 'static,
{
    match service.loan_view(&LoanId::new(loan_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error, StatusCode::UNPROCESSABLE_ENTITY),
    }
}

pub(crate) async fn fund_handler<R, C>(
    State(service): State<Arc<LendingService<R, C>>>,
    Path(loan_id): Path<String>,
    axum::Json(body): axum::Json<FundBody>,
) -> Response
where
    R: LendingRepository + 'static,
    C: Clock + 'static,
{
    match service.fund_loan(&LoanId::new(loan_id), &UserId::new(body.lender_id)) {
        Ok(loan) => {
            let payload = json!({
                "loanId": loan.id,
                "status": loan.status.label(),
                "dueDate": loan.due_date,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error, StatusCode::CONFLICT),
    }
}

pub(crate) async fn repayment_handler<R, C>(
    State(service): State<Arc<LendingService<R, C>>>,
    Path(loan_id): Path<String>,
    axum::Json(body): axum::Json<RepaymentBody>,
) -> Response
where
    R: LendingRepository + 'static,
    C: Clock + 'static,
{
    let loan_id = LoanId::new(loan_id);
    let recorded_by = match body.recorded_by {
        Some(user_id) => UserId::new(user_id),
        None => match service.loan(&loan_id) {
            Ok(loan) => loan.borrower_id,
            Err(error) => return error_response(error, StatusCode::CONFLICT),
        },
    };
    let input = RepaymentInput {
        amount: body.amount,
        method: body.method,
        reference: body.reference,
        date: body.date.unwrap_or_else(|| service.now()),
        recorded_by,
    };
    match service.record_repayment(&loan_id, input) {
        Ok(receipt) => (StatusCode::OK, axum::Json(receipt)).into_response(),
        Err(error) => error_response(error, StatusCode::CONFLICT),
    }
}

pub(crate) async fn override_handler<R, C>(
    State(service): State<Arc<LendingService<R, C>>>,
    Path(loan_id): Path<String>,
    axum::Json(body): axum::Json<OverrideBody>,
) -> Response
where
    R: LendingRepository + 'static,
    C: Clock + 'static,
{
    let request = OverrideRequest {
        field: body.field,
        value: body.value,
        reason: body.reason,
    };
    match service.override_loan(&LoanId::new(loan_id), &UserId::new(body.admin_id), request) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(error, StatusCode::CONFLICT),
    }
}

pub(crate) async fn create_group_handler<R, C>(
    State(service): State<Arc<LendingService<R, C>>>,
    axum::Json(body): axum::Json<CreateGroupBody>,
) -> Response
where
    R: LendingRepository + 'static,
    C: Clock + 'static,
{
    let draft = GroupDraft {
        name: body.name,
        invite_only: body.invite_only,
        invite_code: body.invite_code,
        rules: body.rules,
    };
    let members: Vec<UserId> = body.member_ids.into_iter().map(UserId::new).collect();
    match service.create_group(&UserId::new(body.creator_id), draft, &members) {
        Ok(group) => {
            let payload = json!({
                "groupId": group.id,
                "country": group.country,
                "members": group.members.len(),
                "inviteCode": group.invite_code,
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error, StatusCode::FORBIDDEN),
    }
}

pub(crate) async fn join_handler<R, C>(
    State(service): State<Arc<LendingService<R, C>>>,
    Path(group_id): Path<String>,
    axum::Json(body): axum::Json<JoinBody>,
) -> Response
where
    R: LendingRepository + 'static,
    C: Clock + 'static,
{
    let group_id = GroupId::new(group_id);
    let user_id = UserId::new(body.user_id);
    match service.join_group(&group_id, &user_id, body.invite_code.as_deref()) {
        Ok(group) => {
            let payload = json!({
                "groupId": group.id,
                "userId": user_id,
                "members": group.members.len(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error, StatusCode::FORBIDDEN),
    }
}

pub(crate) async fn leave_handler<R, C>(
    State(service): State<Arc<LendingService<R, C>>>,
    Path((group_id, user_id)): Path<(String, String)>,
) -> Response
where
    R: LendingRepository + 'static,
    C: Clock + 'static,
{
    match service.leave_group(&GroupId::new(group_id), &UserId::new(user_id)) {
        Ok(outcome) => {
            let payload = json!({
                "dissolved": outcome.dissolved,
                "primaryAdmin": outcome.primary_admin,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error, StatusCode::FORBIDDEN),
    }
}
