use actix_web::{get, patch, post, web, HttpResponse};
use uuid::Uuid;
use validator::Validate;

use crate::analytics::{BusinessDashboard, Metric, PeakHour};
use crate::auth::AuthenticatedBusiness;
use crate::database::Database;
use crate::errors::{ApiError, ApiResult};
use crate::models::{
    ApiResponse, CreateReconciliationRequest, CreateTransactionRequest, HistoryQuery,
    PeriodQuery, ReconciliationStatusRequest,
};

use super::{optional_window, period_window};

const PEAK_HOURS: i64 = 5;

// ============================================================================
// TRANSACTIONS
// ============================================================================

#[post("/transactions")]
pub async fn create_transaction(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    payload: web::Json<CreateTransactionRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    body.validate()?;

    let transaction = db.create_transaction(business.id, body).await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(transaction)))
}

#[get("/transactions")]
pub async fn list_transactions(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    query: web::Query<HistoryQuery>,
) -> ApiResult<HttpResponse> {
    let window = optional_window(query.start_date.as_deref(), query.end_date.as_deref())?;
    let transactions = db.list_transactions(business.id, window).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(transactions)))
}

#[get("/transactions/summary")]
pub async fn transaction_summary(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    query: web::Query<PeriodQuery>,
) -> ApiResult<HttpResponse> {
    let window = period_window(&query)?;
    let by_type = db.transaction_totals(business.id, window).await?;
    let total_count: i64 = by_type.iter().map(|row| row.count).sum();
    let total_amount: f64 = by_type.iter().map(|row| row.total_amount).sum();
    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "window": window,
        "total_count": total_count,
        "total_amount": total_amount,
        "by_type": by_type,
    }))))
}

// ============================================================================
// RECONCILIATIONS
// ============================================================================

#[post("/reconciliations")]
pub async fn create_reconciliation(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    payload: web::Json<CreateReconciliationRequest>,
) -> ApiResult<HttpResponse> {
    let reconciliation = db
        .create_reconciliation(business.id, payload.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(reconciliation)))
}

#[get("/reconciliations")]
pub async fn list_reconciliations(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
) -> ApiResult<HttpResponse> {
    let reconciliations = db.list_reconciliations(business.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(reconciliations)))
}

#[get("/reconciliations/{reconciliation_id}")]
pub async fn get_reconciliation(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    reconciliation_id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let reconciliation = db
        .get_reconciliation(business.id, reconciliation_id.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Reconciliation not found"))?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(reconciliation)))
}

#[patch("/reconciliations/{reconciliation_id}/status")]
pub async fn set_reconciliation_status(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    reconciliation_id: web::Path<Uuid>,
    payload: web::Json<ReconciliationStatusRequest>,
) -> ApiResult<HttpResponse> {
    let reconciliation = db
        .update_reconciliation_status(business.id, reconciliation_id.into_inner(), payload.into_inner())
        .await?;
    log::info!(
        "Reconciliation {} moved to {:?}",
        reconciliation.id,
        reconciliation.status
    );
    Ok(HttpResponse::Ok().json(ApiResponse::success(reconciliation)))
}

#[get("/reconciliations/{reconciliation_id}/line-items")]
pub async fn list_line_items(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    reconciliation_id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let reconciliation_id = reconciliation_id.into_inner();
    if db
        .get_reconciliation(business.id, reconciliation_id)
        .await?
        .is_none()
    {
        return Err(ApiError::not_found("Reconciliation not found"));
    }
    let items = db.list_line_items(business.id, reconciliation_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(items)))
}

#[get("/reconciliations/summary/stats")]
pub async fn reconciliation_summary(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    query: web::Query<PeriodQuery>,
) -> ApiResult<HttpResponse> {
    let window = period_window(&query)?;
    let summary = db.reconciliation_summary(business.id, window).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "window": window,
        "summary": summary,
    }))))
}

// ============================================================================
// BUSINESS DASHBOARD
// ============================================================================

#[get("/analytics/dashboard")]
pub async fn business_dashboard(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    query: web::Query<PeriodQuery>,
) -> ApiResult<HttpResponse> {
    let window = period_window(&query)?;
    let current = db.business_totals(business.id, window).await?;
    let previous = db.business_totals(business.id, window.previous()?).await?;
    let (total_members, active_members) = db.member_headcount(business.id).await?;
    let peak_hours = db.peak_hours(business.id, window, PEAK_HOURS).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(BusinessDashboard {
        window,
        revenue: Metric::new(current.revenue, previous.revenue),
        transactions: Metric::counts(current.transactions, previous.transactions),
        check_ins: Metric::counts(current.check_ins, previous.check_ins),
        total_members,
        active_members,
        new_members: Metric::counts(current.new_members, previous.new_members),
        peak_hours: peak_hours.into_iter().map(PeakHour::from).collect(),
    })))
}
