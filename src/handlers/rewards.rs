use actix_web::{delete, get, post, put, web, HttpResponse};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AuthenticatedAdmin, AuthenticatedUser};
use crate::clients::notifications::NotificationClient;
use crate::database::Database;
use crate::errors::{ApiError, ApiResult};
use crate::models::{ApiResponse, RewardRequest, UserPoints};
use crate::rewards::RewardRule;

use super::{conflict_on_duplicate, refresh_rewards};

const DUPLICATE_RULE: &str = "A reward for this rule already exists";

#[get("/rewards/available")]
pub async fn available_rewards(db: web::Data<Database>) -> ApiResult<HttpResponse> {
    let rewards = db.list_rewards().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(rewards)))
}

/// Recomputes progress before listing, so the response always reflects the
/// user's current history.
#[get("/rewards/user")]
pub async fn user_rewards(
    db: web::Data<Database>,
    notifier: web::Data<NotificationClient>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResult<HttpResponse> {
    refresh_rewards(&db, &notifier, user.id).await;
    let rewards = db.list_user_rewards(user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(rewards)))
}

#[get("/rewards/points")]
pub async fn user_points(AuthenticatedUser(user): AuthenticatedUser) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::success(UserPoints {
        available_points: user.flex_credit,
        total_points: user.flex_credit,
    })))
}

#[post("/rewards/claim/{reward_id}")]
pub async fn claim_reward(
    db: web::Data<Database>,
    AuthenticatedUser(user): AuthenticatedUser,
    reward_id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let claimed = db.claim_reward(user.id, reward_id.into_inner()).await?;
    log::info!("User {} claimed reward {}", user.id, claimed.reward_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success(claimed)))
}

fn validate_reward(body: &RewardRequest) -> Result<(), ApiError> {
    body.validate()?;
    if RewardRule::from_key(&body.rule).is_none() {
        return Err(ApiError::validation(format!(
            "Unknown reward rule '{}'",
            body.rule
        )));
    }
    Ok(())
}

#[post("/rewards")]
pub async fn create_reward(
    db: web::Data<Database>,
    _admin: AuthenticatedAdmin,
    payload: web::Json<RewardRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    validate_reward(&body)?;

    let reward = db
        .create_reward(body)
        .await
        .map_err(|err| conflict_on_duplicate(err, DUPLICATE_RULE))?;
    Ok(HttpResponse::Created().json(ApiResponse::success(reward)))
}

#[put("/rewards/{reward_id}")]
pub async fn update_reward(
    db: web::Data<Database>,
    _admin: AuthenticatedAdmin,
    reward_id: web::Path<Uuid>,
    payload: web::Json<RewardRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    validate_reward(&body)?;

    let reward = db
        .update_reward(reward_id.into_inner(), body)
        .await
        .map_err(|err| conflict_on_duplicate(err, DUPLICATE_RULE))?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(reward)))
}

#[delete("/rewards/{reward_id}")]
pub async fn delete_reward(
    db: web::Data<Database>,
    _admin: AuthenticatedAdmin,
    reward_id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    db.delete_reward(reward_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Reward deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(rule: &str) -> RewardRequest {
        RewardRequest {
            rule: rule.to_string(),
            name: "Early Bird".into(),
            description: "Work out before 8am".into(),
            points_required: 10,
            category: "habit".into(),
            reward_type: "badge".into(),
            reward_value: 0.0,
            reward_description: "Badge".into(),
        }
    }

    #[test]
    fn test_reward_rule_must_be_known() {
        assert!(validate_reward(&request("early_bird")).is_ok());
        let err = validate_reward(&request("night_owl")).unwrap_err();
        assert!(err.to_string().contains("night_owl"));
    }
}
