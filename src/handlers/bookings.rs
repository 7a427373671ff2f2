use actix_web::{get, post, web, HttpResponse};
use uuid::Uuid;
use validator::Validate;

use crate::analytics::{month_windows, BookingPeriod, BookingReport};
use crate::auth::AuthenticatedBusiness;
use crate::database::Database;
use crate::errors::ApiResult;
use crate::models::{
    ApiResponse, BookingCounts, BookingListQuery, BookingStatus, CreateBookingRequest,
    RejectBookingRequest,
};

use super::today;

#[post("/bookings")]
pub async fn create_booking(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    payload: web::Json<CreateBookingRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    body.validate()?;

    let booking = db.create_booking(business.id, body).await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(booking)))
}

#[get("/bookings")]
pub async fn list_bookings(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    query: web::Query<BookingListQuery>,
) -> ApiResult<HttpResponse> {
    let bookings = db.list_bookings(business.id, query.status).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(bookings)))
}

async fn transition(
    db: &Database,
    business_id: Uuid,
    booking_id: Uuid,
    next: BookingStatus,
    reason: Option<String>,
) -> ApiResult<HttpResponse> {
    let booking = db
        .transition_booking(business_id, booking_id, next, reason)
        .await?;
    log::info!("Booking {} moved to {:?}", booking.id, booking.status);
    Ok(HttpResponse::Ok().json(ApiResponse::success(booking)))
}

#[post("/bookings/{booking_id}/approve")]
pub async fn approve_booking(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    booking_id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    transition(&db, business.id, booking_id.into_inner(), BookingStatus::Approved, None).await
}

#[post("/bookings/{booking_id}/reject")]
pub async fn reject_booking(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    booking_id: web::Path<Uuid>,
    payload: web::Json<RejectBookingRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    body.validate()?;
    transition(
        &db,
        business.id,
        booking_id.into_inner(),
        BookingStatus::Rejected,
        Some(body.reason),
    )
    .await
}

#[post("/bookings/{booking_id}/cancel")]
pub async fn cancel_booking(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    booking_id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    transition(&db, business.id, booking_id.into_inner(), BookingStatus::Cancelled, None).await
}

#[post("/bookings/{booking_id}/complete")]
pub async fn complete_booking(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    booking_id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    transition(&db, business.id, booking_id.into_inner(), BookingStatus::Completed, None).await
}

fn period(counts: BookingCounts) -> BookingPeriod {
    BookingPeriod::new(counts.total, counts.approved, counts.rejected, counts.pending)
}

/// This calendar month against the previous one.
#[get("/bookings/report")]
pub async fn booking_report(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
) -> ApiResult<HttpResponse> {
    let (this_month, last_month) = month_windows(today());
    let current = db.booking_counts(business.id, this_month).await?;
    let previous = db.booking_counts(business.id, last_month).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(BookingReport::new(
        period(current),
        period(previous),
    ))))
}
