//! Workouts, challenges and group activities. Every mutation re-runs the
//! rewards engine for the acting user.

use actix_web::{delete, get, post, put, web, HttpResponse};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthenticatedUser;
use crate::clients::notifications::NotificationClient;
use crate::database::Database;
use crate::errors::ApiResult;
use crate::models::{ApiResponse, ChallengeRequest, GroupActivityRequest, WorkoutRequest};

use super::refresh_rewards;

// ============================================================================
// WORKOUTS
// ============================================================================

#[post("/workouts")]
pub async fn create_workout(
    db: web::Data<Database>,
    notifier: web::Data<NotificationClient>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: web::Json<WorkoutRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    body.validate()?;

    let workout = db.create_workout(user.id, body).await?;
    refresh_rewards(&db, &notifier, user.id).await;
    Ok(HttpResponse::Created().json(ApiResponse::success(workout)))
}

#[get("/workouts")]
pub async fn list_workouts(
    db: web::Data<Database>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResult<HttpResponse> {
    let workouts = db.list_workouts(user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(workouts)))
}

#[put("/workouts/{workout_id}")]
pub async fn update_workout(
    db: web::Data<Database>,
    notifier: web::Data<NotificationClient>,
    AuthenticatedUser(user): AuthenticatedUser,
    workout_id: web::Path<Uuid>,
    payload: web::Json<WorkoutRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    body.validate()?;

    let workout = db
        .update_workout(user.id, workout_id.into_inner(), body)
        .await?;
    refresh_rewards(&db, &notifier, user.id).await;
    Ok(HttpResponse::Ok().json(ApiResponse::success(workout)))
}

#[delete("/workouts/{workout_id}")]
pub async fn delete_workout(
    db: web::Data<Database>,
    notifier: web::Data<NotificationClient>,
    AuthenticatedUser(user): AuthenticatedUser,
    workout_id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    db.delete_workout(user.id, workout_id.into_inner()).await?;
    refresh_rewards(&db, &notifier, user.id).await;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Workout deleted")))
}

// ============================================================================
// CHALLENGES
// ============================================================================

#[post("/challenges")]
pub async fn create_challenge(
    db: web::Data<Database>,
    notifier: web::Data<NotificationClient>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: web::Json<ChallengeRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    body.validate()?;

    let challenge = db.create_challenge(user.id, body).await?;
    refresh_rewards(&db, &notifier, user.id).await;
    Ok(HttpResponse::Created().json(ApiResponse::success(challenge)))
}

#[get("/challenges")]
pub async fn list_challenges(
    db: web::Data<Database>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResult<HttpResponse> {
    let challenges = db.list_challenges(user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(challenges)))
}

#[put("/challenges/{challenge_id}")]
pub async fn update_challenge(
    db: web::Data<Database>,
    notifier: web::Data<NotificationClient>,
    AuthenticatedUser(user): AuthenticatedUser,
    challenge_id: web::Path<Uuid>,
    payload: web::Json<ChallengeRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    body.validate()?;

    let challenge = db
        .update_challenge(user.id, challenge_id.into_inner(), body)
        .await?;
    refresh_rewards(&db, &notifier, user.id).await;
    Ok(HttpResponse::Ok().json(ApiResponse::success(challenge)))
}

#[delete("/challenges/{challenge_id}")]
pub async fn delete_challenge(
    db: web::Data<Database>,
    notifier: web::Data<NotificationClient>,
    AuthenticatedUser(user): AuthenticatedUser,
    challenge_id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    db.delete_challenge(user.id, challenge_id.into_inner()).await?;
    refresh_rewards(&db, &notifier, user.id).await;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Challenge deleted")))
}

// ============================================================================
// GROUP ACTIVITIES
// ============================================================================

#[post("/group-activities")]
pub async fn create_group_activity(
    db: web::Data<Database>,
    notifier: web::Data<NotificationClient>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: web::Json<GroupActivityRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    body.validate()?;

    let activity = db.create_group_activity(user.id, body).await?;
    refresh_rewards(&db, &notifier, user.id).await;
    Ok(HttpResponse::Created().json(ApiResponse::success(activity)))
}

#[get("/group-activities")]
pub async fn list_group_activities(
    db: web::Data<Database>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResult<HttpResponse> {
    let activities = db.list_group_activities(user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(activities)))
}

#[post("/group-activities/{activity_id}/join")]
pub async fn join_group_activity(
    db: web::Data<Database>,
    notifier: web::Data<NotificationClient>,
    AuthenticatedUser(user): AuthenticatedUser,
    activity_id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let joined = db
        .join_group_activity(user.id, activity_id.into_inner())
        .await?;
    refresh_rewards(&db, &notifier, user.id).await;
    Ok(HttpResponse::Created().json(ApiResponse::success(joined)))
}

#[delete("/group-activities/{activity_id}")]
pub async fn delete_group_activity(
    db: web::Data<Database>,
    notifier: web::Data<NotificationClient>,
    AuthenticatedUser(user): AuthenticatedUser,
    activity_id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    db.delete_group_activity(user.id, activity_id.into_inner())
        .await?;
    refresh_rewards(&db, &notifier, user.id).await;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Group activity deleted")))
}
