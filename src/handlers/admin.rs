use actix_web::{get, patch, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::analytics::{growth_percentage, round2, AdminDashboard, Metric, SeriesReport};
use crate::auth::AuthenticatedAdmin;
use crate::database::Database;
use crate::errors::{ApiError, ApiResult};
use crate::models::{AdStatus, AdStatusRequest, ApiResponse, CreateAdvertisementRequest, PeriodQuery};

use super::period_window;

// ============================================================================
// PLATFORM ANALYTICS
// ============================================================================

#[get("/admin/dashboard")]
pub async fn admin_dashboard(
    _admin: AuthenticatedAdmin,
    db: web::Data<Database>,
    query: web::Query<PeriodQuery>,
) -> ApiResult<HttpResponse> {
    let window = period_window(&query)?;
    let current = db.platform_totals(window).await?;
    let previous = db.platform_totals(window.previous()?).await?;
    let (total_users, total_businesses, total_members) = db.platform_headcount().await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(AdminDashboard {
        window,
        total_users,
        total_businesses,
        total_members,
        revenue: Metric::new(current.revenue, previous.revenue),
        payments: Metric::counts(current.payments, previous.payments),
        check_ins: Metric::counts(current.check_ins, previous.check_ins),
        new_users: Metric::counts(current.new_users, previous.new_users),
    })))
}

#[get("/admin/analytics/revenue")]
pub async fn revenue_analytics(
    db: web::Data<Database>,
    _admin: AuthenticatedAdmin,
    query: web::Query<PeriodQuery>,
) -> ApiResult<HttpResponse> {
    let window = period_window(&query)?;
    let rows = db.daily_revenue(window).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(SeriesReport::new(window, rows))))
}

#[get("/admin/analytics/checkins")]
pub async fn check_in_analytics(
    db: web::Data<Database>,
    _admin: AuthenticatedAdmin,
    query: web::Query<PeriodQuery>,
) -> ApiResult<HttpResponse> {
    let window = period_window(&query)?;
    let rows = db.daily_check_ins(window).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(SeriesReport::new(window, rows))))
}

#[get("/admin/analytics/payments")]
pub async fn payment_analytics(
    db: web::Data<Database>,
    _admin: AuthenticatedAdmin,
    query: web::Query<PeriodQuery>,
) -> ApiResult<HttpResponse> {
    let window = period_window(&query)?;
    let current = db.platform_totals(window).await?;
    let previous = db.platform_totals(window.previous()?).await?;
    let average = if current.payments == 0 {
        0.0
    } else {
        round2(current.revenue / current.payments as f64)
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "window": window,
        "total_payments": current.payments,
        "total_revenue": round2(current.revenue),
        "average_payment": average,
        "revenue_growth": growth_percentage(current.revenue, previous.revenue),
    }))))
}

// ============================================================================
// ADVERTISEMENTS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AdvertisementListQuery {
    pub status: Option<AdStatus>,
}

#[post("/admin/advertisements")]
pub async fn create_advertisement(
    db: web::Data<Database>,
    admin: AuthenticatedAdmin,
    payload: web::Json<CreateAdvertisementRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    body.validate()?;
    body.validate_business_rules().map_err(ApiError::Validation)?;

    let advertisement = db.create_advertisement(body, &admin.email).await?;
    log::info!("Advertisement {} created by {}", advertisement.id, admin.email);
    Ok(HttpResponse::Created().json(ApiResponse::success(advertisement)))
}

#[get("/admin/advertisements")]
pub async fn list_advertisements(
    db: web::Data<Database>,
    _admin: AuthenticatedAdmin,
    query: web::Query<AdvertisementListQuery>,
) -> ApiResult<HttpResponse> {
    let advertisements = db.list_advertisements(query.status).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(advertisements)))
}

#[patch("/admin/advertisements/{advertisement_id}/status")]
pub async fn set_advertisement_status(
    db: web::Data<Database>,
    _admin: AuthenticatedAdmin,
    advertisement_id: web::Path<Uuid>,
    payload: web::Json<AdStatusRequest>,
) -> ApiResult<HttpResponse> {
    let advertisement = db
        .transition_advertisement(advertisement_id.into_inner(), payload.status)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(advertisement)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, TokenSettings};
    use actix_web::{http::header, test, App};

    #[actix_web::test]
    async fn test_admin_routes_reject_business_tokens() {
        let settings = TokenSettings::new("admin-test", 1);
        let token = settings.issue("owner@gym.test", Role::Business).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(settings))
                .service(admin_dashboard),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/admin/dashboard")
            .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 403);
    }
}
