use actix_web::{get, post, web, HttpResponse};
use validator::Validate;

use crate::auth::{AuthenticatedBusiness, AuthenticatedUser};
use crate::clients::notifications::NotificationClient;
use crate::database::Database;
use crate::errors::ApiResult;
use crate::models::{ApiResponse, BalanceResponse, PeriodQuery, SubscriptionRequest, TopUpRequest};

use super::{missing_reference, period_window, refresh_rewards};

#[post("/payments/user/topup")]
pub async fn top_up(
    db: web::Data<Database>,
    notifier: web::Data<NotificationClient>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: web::Json<TopUpRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    body.validate()?;

    let credits = body.credits();
    let (payment, user) = db
        .record_top_up(body.into_new_payment(user.id), credits)
        .await
        .map_err(|err| missing_reference(err, "Business not found"))?;
    log::info!("User {} topped up {} flex credits", user.id, credits);

    refresh_rewards(&db, &notifier, user.id).await;

    Ok(HttpResponse::Created().json(ApiResponse::success(serde_json::json!({
        "payment": payment,
        "credits_added": credits,
        "flex_credit": user.flex_credit,
        "balance": user.balance,
    }))))
}

#[post("/payments/user/subscription")]
pub async fn subscribe(
    db: web::Data<Database>,
    notifier: web::Data<NotificationClient>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: web::Json<SubscriptionRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    body.validate()?;

    let plan = body.plan_type.clone();
    let (payment, user) = db
        .record_subscription(body.into_new_payment(user.id), &plan)
        .await
        .map_err(|err| missing_reference(err, "Business not found"))?;

    refresh_rewards(&db, &notifier, user.id).await;

    Ok(HttpResponse::Created().json(ApiResponse::success(serde_json::json!({
        "payment": payment,
        "plan": user.plan,
    }))))
}

#[get("/payments/user/history")]
pub async fn payment_history(
    db: web::Data<Database>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResult<HttpResponse> {
    let payments = db.list_user_payments(user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(payments)))
}

#[get("/payments/user/balance")]
pub async fn balance(AuthenticatedUser(user): AuthenticatedUser) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::success(BalanceResponse {
        flex_credit: user.flex_credit,
        balance: user.balance,
        plan: user.plan,
    })))
}

#[get("/payments/stats/summary")]
pub async fn payment_summary(
    db: web::Data<Database>,
    AuthenticatedBusiness(business): AuthenticatedBusiness,
    query: web::Query<PeriodQuery>,
) -> ApiResult<HttpResponse> {
    let window = period_window(&query)?;
    let summary = db.payment_summary(business.id, window).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "window": window,
        "summary": summary,
    }))))
}
