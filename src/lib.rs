use actix_web::web;

pub mod analytics;
pub mod auth;
pub mod checkin;
pub mod clients;
pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod rewards;

/// Extractor error handlers plus the versioned API scope.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default().error_handler(|err, req| errors::unprocessable(err, req)),
    )
    .app_data(web::PathConfig::default().error_handler(|err, req| errors::unprocessable(err, req)))
    .app_data(
        web::QueryConfig::default().error_handler(|err, req| errors::unprocessable(err, req)),
    )
    .service(web::scope("/api/v1").configure(handlers::configure));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{post, test, App, HttpResponse};

    use crate::models::TopUpRequest;

    #[post("/echo")]
    async fn echo(body: web::Json<TopUpRequest>) -> HttpResponse {
        HttpResponse::Ok().json(body.amount)
    }

    #[actix_web::test]
    async fn test_health_is_versioned() {
        let app = test::init_service(App::new().configure(configure_api)).await;
        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 200);
    }

    #[actix_web::test]
    async fn test_malformed_json_is_unprocessable() {
        let app = test::init_service(
            App::new()
                .app_data(
                    web::JsonConfig::default()
                        .error_handler(|err, req| errors::unprocessable(err, req)),
                )
                .service(echo),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/echo")
            .insert_header(("content-type", "application/json"))
            .set_payload(r#"{"amount": "lots"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 422);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["detail"].is_string());
    }
}
