use actix_web::{get, web, HttpResponse, Responder};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::analytics::DateWindow;
use crate::clients::notifications::NotificationClient;
use crate::database::Database;
use crate::errors::ApiError;
use crate::models::PeriodQuery;

pub mod activity;
pub mod admin;
pub mod bookings;
pub mod checkin;
pub mod ledger;
pub mod members;
pub mod payments;
pub mod rewards;

// ============================================================================
// HEALTH CHECK
// ============================================================================

#[get("/health")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "flexpass-membership-service",
        "timestamp": Utc::now()
    }))
}

/// Registers every route of the `/api/v1` scope. Literal segments are
/// registered ahead of `{id}` patterns that would otherwise capture them.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        // Members
        .service(members::member_stats_overview)
        .service(members::set_invoice_status)
        .service(members::create_member)
        .service(members::list_members)
        .service(members::get_member)
        .service(members::update_member)
        .service(members::delete_member)
        .service(members::set_payment_status)
        .service(members::set_membership_status)
        .service(members::record_member_payment)
        .service(members::list_member_payments)
        .service(members::create_invoice)
        .service(members::list_invoices)
        // User payments
        .service(payments::top_up)
        .service(payments::subscribe)
        .service(payments::payment_history)
        .service(payments::balance)
        .service(payments::payment_summary)
        // Rewards
        .service(rewards::available_rewards)
        .service(rewards::user_rewards)
        .service(rewards::user_points)
        .service(rewards::claim_reward)
        .service(rewards::create_reward)
        .service(rewards::update_reward)
        .service(rewards::delete_reward)
        // Activity
        .service(activity::create_workout)
        .service(activity::list_workouts)
        .service(activity::update_workout)
        .service(activity::delete_workout)
        .service(activity::create_challenge)
        .service(activity::list_challenges)
        .service(activity::update_challenge)
        .service(activity::delete_challenge)
        .service(activity::create_group_activity)
        .service(activity::list_group_activities)
        .service(activity::join_group_activity)
        .service(activity::delete_group_activity)
        // Check-in / check-out
        .service(checkin::member_check_in)
        .service(checkin::scan_confirm)
        .service(checkin::user_check_in)
        .service(checkin::member_check_out)
        .service(checkin::user_check_out)
        .service(checkin::check_in_history)
        .service(checkin::check_out_history)
        // Bookings
        .service(bookings::booking_report)
        .service(bookings::create_booking)
        .service(bookings::list_bookings)
        .service(bookings::approve_booking)
        .service(bookings::reject_booking)
        .service(bookings::cancel_booking)
        .service(bookings::complete_booking)
        // Transactions / reconciliations / dashboard
        .service(ledger::transaction_summary)
        .service(ledger::create_transaction)
        .service(ledger::list_transactions)
        .service(ledger::reconciliation_summary)
        .service(ledger::create_reconciliation)
        .service(ledger::list_reconciliations)
        .service(ledger::get_reconciliation)
        .service(ledger::set_reconciliation_status)
        .service(ledger::list_line_items)
        .service(ledger::business_dashboard)
        // Admin
        .service(admin::admin_dashboard)
        .service(admin::revenue_analytics)
        .service(admin::check_in_analytics)
        .service(admin::payment_analytics)
        .service(admin::create_advertisement)
        .service(admin::list_advertisements)
        .service(admin::set_advertisement_status);
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// `days` (or `period_days`) trailing window, or the explicit date range.
pub(crate) fn period_window(query: &PeriodQuery) -> Result<DateWindow, ApiError> {
    DateWindow::from_query(
        today(),
        query.days.or(query.period_days),
        query.start_date.as_deref(),
        query.end_date.as_deref(),
    )
}

/// Like [`period_window`] but unbounded when no filter was given.
pub(crate) fn optional_window(
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<Option<DateWindow>, ApiError> {
    if start_date.is_none() && end_date.is_none() {
        return Ok(None);
    }
    DateWindow::from_query(today(), None, start_date, end_date).map(Some)
}

/// Unique-constraint violations become a 400 with `message`.
pub(crate) fn conflict_on_duplicate(err: sqlx::Error, message: &str) -> ApiError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => ApiError::conflict(message),
        _ => ApiError::Database(err),
    }
}

/// Foreign-key violations become a 404 with `message`.
pub(crate) fn missing_reference(err: sqlx::Error, message: &str) -> ApiError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            ApiError::not_found(message)
        }
        _ => ApiError::Database(err),
    }
}

/// Recomputes the user's rewards after an activity change and announces new
/// unlocks. The triggering write is already committed, so a failure here is
/// logged and does not fail the request.
pub(crate) async fn refresh_rewards(db: &Database, notifier: &NotificationClient, user_id: Uuid) {
    match db.check_and_unlock_rewards(user_id).await {
        Ok(unlocked) => notifier.announce_unlocked(user_id, &unlocked).await,
        Err(err) => log::error!("Failed to recompute rewards for user {user_id}: {err:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test as actix_test, App};

    #[actix_web::test]
    async fn test_health_check() {
        let app = actix_test::init_service(App::new().service(health_check)).await;
        let req = actix_test::TestRequest::get().uri("/health").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
    }

    #[test]
    fn test_period_window_defaults_to_thirty_days() {
        let query = PeriodQuery {
            days: None,
            period_days: None,
            start_date: None,
            end_date: None,
        };
        let window = period_window(&query).unwrap();
        assert_eq!(window.days(), 30);
        assert_eq!(window.end, today());
    }

    #[test]
    fn test_optional_window() {
        assert!(optional_window(None, None).unwrap().is_none());
        let window = optional_window(Some("2024-01-01"), Some("2024-01-31"))
            .unwrap()
            .unwrap();
        assert_eq!(window.days(), 31);
        assert!(optional_window(Some("2024-02-01"), Some("2024-01-01")).is_err());
        assert!(optional_window(Some("01/02/2024"), None).is_err());
        assert!(optional_window(Some("0001-01-01"), Some("9999-12-31")).is_err());
    }
}
