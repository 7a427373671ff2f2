use actix_web::{get, post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{AuthenticatedBusiness, AuthenticatedUser};
use crate::checkin::{ensure_sufficient_credit, QrPayload};
use crate::clients::notifications::NotificationClient;
use crate::database::Database;
use crate::errors::{ApiError, ApiResult};
use crate::models::{
    ApiResponse, HistoryQuery, MemberCheckInRequest, QrCheckInResponse, ScanConfirmRequest,
    ScanConfirmResponse, User, UserCheckInRequest, UserCheckOutResponse,
};

use super::{optional_window, refresh_rewards};

#[derive(Debug, Deserialize)]
pub struct MemberCheckOutRequest {
    pub member_id: Uuid,
}

// ============================================================================
// MEMBER (business-initiated)
// ============================================================================

#[post("/check-in/member")]
pub async fn member_check_in(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    payload: web::Json<MemberCheckInRequest>,
) -> ApiResult<HttpResponse> {
    let check_in = db
        .member_check_in(business.id, payload.member_id, payload.center_id)
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(check_in)))
}

#[post("/check-out/member")]
pub async fn member_check_out(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    payload: web::Json<MemberCheckOutRequest>,
) -> ApiResult<HttpResponse> {
    let check_out = db.member_check_out(business.id, payload.member_id).await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(check_out)))
}

// ============================================================================
// USER (QR flow)
// ============================================================================

/// Issues the QR payload for a visit. Nothing is written until the code is
/// scanned.
#[post("/check-in/")]
pub async fn user_check_in(
    db: web::Data<Database>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: web::Json<UserCheckInRequest>,
) -> ApiResult<HttpResponse> {
    let center = db
        .get_center(payload.center_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Center not found"))?;
    ensure_sufficient_credit(user.flex_credit, center.credit_required)?;

    let qr = QrPayload::check_in(user.id, center.id, Utc::now());
    Ok(HttpResponse::Ok().json(ApiResponse::success(QrCheckInResponse {
        qr_payload: qr.encode(),
        expires_at: qr.expires_at(),
        center_id: center.id,
        credit_required: center.credit_required,
        flex_credit: user.flex_credit,
    })))
}

/// Visit identified by a scan: who checked in where, and when the code was
/// issued when it came from a QR payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScannedVisit {
    user_id: Uuid,
    center_id: Uuid,
    issued_at: Option<DateTime<Utc>>,
}

fn scanned_visit(request: &ScanConfirmRequest, now: DateTime<Utc>) -> Result<ScannedVisit, ApiError> {
    match (&request.payload, request.user_id, request.center_id) {
        (Some(raw), _, _) => {
            let qr = QrPayload::parse(raw)?;
            if qr.checked_out {
                return Err(ApiError::validation(
                    "Check-out codes cannot confirm a check-in",
                ));
            }
            qr.ensure_fresh(now)?;
            Ok(ScannedVisit {
                user_id: qr.user_id,
                center_id: qr.center_id,
                issued_at: Some(qr.issued_at),
            })
        }
        (None, Some(user_id), Some(center_id)) => Ok(ScannedVisit {
            user_id,
            center_id,
            issued_at: None,
        }),
        (None, _, _) => Err(ApiError::validation(
            "Either payload or both user_id and center_id are required",
        )),
    }
}

/// The center's business scans the code the user presents and the visit's
/// cost is taken from that user's flex credit.
#[post("/check-in/scan-confirm")]
pub async fn scan_confirm(
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    db: web::Data<Database>,
    notifier: web::Data<NotificationClient>,
    payload: web::Json<ScanConfirmRequest>,
) -> ApiResult<HttpResponse> {
    let visit = scanned_visit(&payload, Utc::now())?;
    let (check_in, remaining) = db
        .confirm_user_check_in(business.id, visit.user_id, visit.center_id, visit.issued_at)
        .await?;
    log::info!(
        "Business {} confirmed user {} at center {} ({} credits left)",
        business.id,
        visit.user_id,
        visit.center_id,
        remaining
    );

    refresh_rewards(&db, &notifier, visit.user_id).await;

    Ok(HttpResponse::Created().json(ApiResponse::success(ScanConfirmResponse {
        check_in,
        remaining_flex_credit: remaining,
    })))
}

#[post("/check-out/")]
pub async fn user_check_out(
    db: web::Data<Database>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: web::Json<UserCheckInRequest>,
) -> ApiResult<HttpResponse> {
    let check_out = db.user_check_out(user.id, payload.center_id).await?;
    let qr = QrPayload::check_out(user.id, check_out.center_id, check_out.timestamp);
    Ok(HttpResponse::Created().json(ApiResponse::success(UserCheckOutResponse {
        qr_payload: qr.encode(),
        check_out,
    })))
}

// ============================================================================
// HISTORY
// ============================================================================

fn ensure_own_history(user: &User, user_id: Uuid) -> Result<(), ApiError> {
    if user.id != user_id {
        return Err(ApiError::Forbidden(
            "Cannot view another user's history".into(),
        ));
    }
    Ok(())
}

#[get("/check-in/history/{user_id}")]
pub async fn check_in_history(
    db: web::Data<Database>,
    AuthenticatedUser(user): AuthenticatedUser,
    user_id: web::Path<Uuid>,
    query: web::Query<HistoryQuery>,
) -> ApiResult<HttpResponse> {
    ensure_own_history(&user, *user_id)?;
    let window = optional_window(query.start_date.as_deref(), query.end_date.as_deref())?;
    let history = db.check_in_history(user.id, window).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(history)))
}

#[get("/check-out/history/{user_id}")]
pub async fn check_out_history(
    db: web::Data<Database>,
    AuthenticatedUser(user): AuthenticatedUser,
    user_id: web::Path<Uuid>,
    query: web::Query<HistoryQuery>,
) -> ApiResult<HttpResponse> {
    ensure_own_history(&user, *user_id)?;
    let window = optional_window(query.start_date.as_deref(), query.end_date.as_deref())?;
    let history = db.check_out_history(user.id, window).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(history)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkin::QR_TTL_MINUTES;
    use actix_web::ResponseError;
    use chrono::Duration;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "runner".into(),
            email: "runner@flexpass.test".into(),
            full_name: None,
            flex_credit: 10,
            balance: 0.0,
            plan: None,
            created_at: Utc::now(),
        }
    }

    fn scan(
        payload: Option<String>,
        user_id: Option<Uuid>,
        center_id: Option<Uuid>,
    ) -> ScanConfirmRequest {
        ScanConfirmRequest {
            payload,
            user_id,
            center_id,
        }
    }

    #[test]
    fn test_scan_reads_the_presented_code() {
        let now = Utc::now();
        let owner = Uuid::new_v4();
        let center_id = Uuid::new_v4();
        let raw = QrPayload::check_in(owner, center_id, now).encode();

        let visit = scanned_visit(&scan(Some(raw), None, None), now).unwrap();
        assert_eq!(visit.user_id, owner);
        assert_eq!(visit.center_id, center_id);
        assert!(visit.issued_at.is_some());
    }

    #[test]
    fn test_scan_explicit_ids() {
        let user_id = Uuid::new_v4();
        let center_id = Uuid::new_v4();
        let visit = scanned_visit(&scan(None, Some(user_id), Some(center_id)), Utc::now()).unwrap();
        assert_eq!(
            visit,
            ScannedVisit {
                user_id,
                center_id,
                issued_at: None,
            }
        );

        let err = scanned_visit(&scan(None, None, Some(center_id)), Utc::now()).unwrap_err();
        assert_eq!(err.status_code().as_u16(), 400);
        let err = scanned_visit(&scan(None, None, None), Utc::now()).unwrap_err();
        assert_eq!(err.status_code().as_u16(), 400);
    }

    #[test]
    fn test_scan_rejects_stale_or_checkout_codes() {
        let now = Utc::now();
        let user_id = Uuid::new_v4();
        let center_id = Uuid::new_v4();

        let issued = now - Duration::minutes(QR_TTL_MINUTES + 1);
        let stale = QrPayload::check_in(user_id, center_id, issued).encode();
        let err = scanned_visit(&scan(Some(stale), None, None), now).unwrap_err();
        assert_eq!(err.to_string(), "QR code has expired");

        let checkout = QrPayload::check_out(user_id, center_id, now).encode();
        let err = scanned_visit(&scan(Some(checkout), None, None), now).unwrap_err();
        assert_eq!(err.status_code().as_u16(), 400);
    }

    #[actix_web::test]
    async fn test_scan_confirm_requires_business_token() {
        use crate::auth::{Role, TokenSettings};
        use actix_web::{http::header, test as actix_test, App};

        let settings = TokenSettings::new("scan-secret", 1);
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(settings.clone()))
                .service(scan_confirm),
        )
        .await;

        let token = settings.issue("runner@flexpass.test", Role::User).unwrap();
        let req = actix_test::TestRequest::post()
            .uri("/check-in/scan-confirm")
            .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
            .set_json(serde_json::json!({ "payload": "ignored" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 403);
    }

    #[test]
    fn test_history_is_private() {
        let user = user();
        assert!(ensure_own_history(&user, user.id).is_ok());
        let err = ensure_own_history(&user, Uuid::new_v4()).unwrap_err();
        assert_eq!(err.status_code().as_u16(), 403);
    }
}
