use actix_web::{delete, get, patch, post, put, web, HttpResponse};
use uuid::Uuid;
use validator::Validate;

use crate::analytics::{rate, FinancialOverview, MemberStatsOverview, StatusBreakdown};
use crate::auth::AuthenticatedBusiness;
use crate::database::Database;
use crate::errors::{ApiError, ApiResult};
use crate::lifecycle::MemberEvent;
use crate::models::{
    ApiResponse, CreateInvoiceRequest, CreateMemberRequest, InvoiceStatusUpdateRequest,
    InvoiceTotals, MemberCounts, MemberPaymentStatus, MembershipStatus,
    MembershipStatusUpdateRequest, PaymentStatusUpdateRequest, RecordMemberPaymentRequest,
    UpdateMemberRequest,
};

use super::conflict_on_duplicate;

// ============================================================================
// MEMBER CRUD
// ============================================================================

#[post("/members")]
pub async fn create_member(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    payload: web::Json<CreateMemberRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    body.validate()?;

    let member = db
        .create_member(body.into_new_member(business.id))
        .await
        .map_err(|err| conflict_on_duplicate(err, "A member with this email already exists"))?;
    log::info!("Business {} registered member {}", business.id, member.id);
    Ok(HttpResponse::Created().json(ApiResponse::success(member)))
}

#[get("/members")]
pub async fn list_members(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
) -> ApiResult<HttpResponse> {
    let members = db.list_members(business.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(members)))
}

#[get("/members/{member_id}")]
pub async fn get_member(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    member_id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let member = db
        .get_member(business.id, member_id.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(member)))
}

#[put("/members/{member_id}")]
pub async fn update_member(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    member_id: web::Path<Uuid>,
    payload: web::Json<UpdateMemberRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    body.validate()?;

    let existing = db
        .get_member(business.id, member_id.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;
    let member = db
        .update_member(body.apply_to_existing(existing))
        .await
        .map_err(|err| conflict_on_duplicate(err, "A member with this email already exists"))?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(member)))
}

#[delete("/members/{member_id}")]
pub async fn delete_member(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    member_id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    db.delete_member(business.id, member_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Member deleted")))
}

// ============================================================================
// STATUS LIFECYCLE
// ============================================================================

#[patch("/members/{member_id}/payment-status")]
pub async fn set_payment_status(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    member_id: web::Path<Uuid>,
    payload: web::Json<PaymentStatusUpdateRequest>,
) -> ApiResult<HttpResponse> {
    let status: MemberPaymentStatus = payload.payment_status.parse().map_err(ApiError::Validation)?;
    let member = db
        .apply_member_event(
            business.id,
            member_id.into_inner(),
            MemberEvent::PaymentStatusSet(status),
        )
        .await?;
    log::info!(
        "Member {} payment status set to {:?}",
        member.id,
        member.payment_status
    );
    Ok(HttpResponse::Ok().json(ApiResponse::success(member)))
}

#[patch("/members/{member_id}/membership-status")]
pub async fn set_membership_status(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    member_id: web::Path<Uuid>,
    payload: web::Json<MembershipStatusUpdateRequest>,
) -> ApiResult<HttpResponse> {
    let status: MembershipStatus = payload
        .membership_status
        .parse()
        .map_err(ApiError::Validation)?;
    let member = db
        .apply_member_event(
            business.id,
            member_id.into_inner(),
            MemberEvent::MembershipStatusSet(status),
        )
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(member)))
}

// ============================================================================
// MEMBER PAYMENTS / INVOICES
// ============================================================================

#[post("/members/{member_id}/payments")]
pub async fn record_member_payment(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    member_id: web::Path<Uuid>,
    payload: web::Json<RecordMemberPaymentRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    body.validate()?;

    let (payment, member) = db
        .record_member_payment(business.id, member_id.into_inner(), body)
        .await?;
    log::info!("Recorded payment {} for member {}", payment.id, member.id);
    Ok(HttpResponse::Created().json(ApiResponse::success(serde_json::json!({
        "payment": payment,
        "member": member,
    }))))
}

#[get("/members/{member_id}/payments")]
pub async fn list_member_payments(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    member_id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let payments = db
        .list_member_payments(business.id, member_id.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(payments)))
}

#[post("/members/{member_id}/invoices")]
pub async fn create_invoice(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    member_id: web::Path<Uuid>,
    payload: web::Json<CreateInvoiceRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    body.validate()?;

    let invoice = db
        .create_invoice(business.id, member_id.into_inner(), body)
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(invoice)))
}

#[get("/members/{member_id}/invoices")]
pub async fn list_invoices(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    member_id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let invoices = db.list_invoices(business.id, member_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(invoices)))
}

#[patch("/members/invoices/{invoice_id}/status")]
pub async fn set_invoice_status(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    invoice_id: web::Path<Uuid>,
    payload: web::Json<InvoiceStatusUpdateRequest>,
) -> ApiResult<HttpResponse> {
    let (invoice, member) = db
        .set_invoice_status(business.id, invoice_id.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "invoice": invoice,
        "member": member,
    }))))
}

// ============================================================================
// STATS
// ============================================================================

#[get("/members/stats/overview")]
pub async fn member_stats_overview(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
) -> ApiResult<HttpResponse> {
    let counts = db.member_counts(business.id).await?;
    let invoices = db.invoice_totals(business.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(stats_overview(counts, invoices))))
}

fn stats_overview(counts: MemberCounts, invoices: InvoiceTotals) -> MemberStatsOverview {
    let payment_status = StatusBreakdown::from([
        ("paid", counts.paid),
        ("unpaid", counts.unpaid),
        ("overdue", counts.overdue),
    ]);
    let membership_status = StatusBreakdown::from([
        ("active", counts.status_active),
        ("inactive", counts.status_inactive),
        ("suspended", counts.status_suspended),
        ("expired", counts.status_expired),
    ]);

    MemberStatsOverview {
        total_members: counts.total_members,
        active_members: counts.active_members,
        inactive_members: counts.inactive_members,
        new_members_last_30_days: counts.new_members_last_30_days,
        payment_status,
        membership_status,
        financial: FinancialOverview {
            total_invoices: invoices.total_invoices,
            paid_invoices: invoices.paid_invoices,
            pending_invoices: invoices.total_invoices - invoices.paid_invoices,
            total_revenue: invoices.total_revenue,
            payment_rate: rate(invoices.paid_invoices, invoices.total_invoices),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_overview_without_invoices() {
        let overview = stats_overview(MemberCounts::default(), InvoiceTotals::default());
        assert_eq!(overview.financial.payment_rate, 0.0);
        assert_eq!(overview.financial.pending_invoices, 0);
        assert_eq!(overview.payment_status.len(), 3);
        assert_eq!(overview.membership_status["expired"], 0);
    }

    #[test]
    fn test_stats_overview_payment_rate() {
        let counts = MemberCounts {
            total_members: 4,
            active_members: 3,
            inactive_members: 1,
            paid: 3,
            unpaid: 1,
            status_active: 3,
            status_inactive: 1,
            ..MemberCounts::default()
        };
        let invoices = InvoiceTotals {
            total_invoices: 8,
            paid_invoices: 6,
            total_revenue: 480.0,
        };
        let overview = stats_overview(counts, invoices);
        assert_eq!(overview.financial.payment_rate, 75.0);
        assert_eq!(overview.financial.pending_invoices, 2);
        assert_eq!(overview.payment_status["paid"], 3);
    }
}
