use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::errors::ApiError;
use crate::models::{Business, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Business,
    Admin,
}

/// JWT claims. `sub` is the account email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
    pub iat: usize,
}

/// Signing settings shared with the HTTP layer through `web::Data`.
#[derive(Clone)]
pub struct TokenSettings {
    secret: String,
    expiration_hours: i64,
}

impl TokenSettings {
    pub fn new(secret: impl Into<String>, expiration_hours: i64) -> Self {
        Self {
            secret: secret.into(),
            expiration_hours,
        }
    }

    pub fn issue(&self, email: &str, role: Role) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: email.to_string(),
            role,
            exp: (now + chrono::Duration::hours(self.expiration_hours)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }
}

fn bearer_token(req: &HttpRequest) -> Result<&str, ApiError> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Bearer token".into()))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization format".into()))
}

fn claims_for(req: &HttpRequest, role: Role) -> Result<Claims, ApiError> {
    let settings = req
        .app_data::<web::Data<TokenSettings>>()
        .ok_or_else(|| ApiError::Internal("token settings not configured".into()))?;
    let claims = settings.verify(bearer_token(req)?)?;
    if claims.role != role {
        return Err(ApiError::Forbidden(format!(
            "This endpoint requires a {} account",
            match role {
                Role::User => "user",
                Role::Business => "business",
                Role::Admin => "admin",
            }
        )));
    }
    Ok(claims)
}

fn database(req: &HttpRequest) -> Result<web::Data<Database>, ApiError> {
    req.app_data::<web::Data<Database>>()
        .cloned()
        .ok_or_else(|| ApiError::Internal("database not configured".into()))
}

/// Consumer account behind a user token.
pub struct AuthenticatedUser(pub User);

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let resolved = claims_for(req, Role::User).and_then(|c| Ok((c, database(req)?)));
        Box::pin(async move {
            let (claims, db) = resolved?;
            let user = db
                .get_user_by_email(&claims.sub)
                .await?
                .ok_or_else(|| ApiError::Unauthorized("Could not validate credentials".into()))?;
            Ok(AuthenticatedUser(user))
        })
    }
}

/// Business account behind a business token. Inactive businesses are refused.
pub struct AuthenticatedBusiness(pub Business);

impl FromRequest for AuthenticatedBusiness {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let resolved = claims_for(req, Role::Business).and_then(|c| Ok((c, database(req)?)));
        Box::pin(async move {
            let (claims, db) = resolved?;
            let business = db
                .get_business_by_email(&claims.sub)
                .await?
                .ok_or_else(|| ApiError::Unauthorized("Could not validate credentials".into()))?;
            if !business.is_active {
                return Err(ApiError::Forbidden("Business account is deactivated".into()));
            }
            Ok(AuthenticatedBusiness(business))
        })
    }
}

/// Platform operator; the token alone is sufficient.
pub struct AuthenticatedAdmin {
    pub email: String,
}

impl FromRequest for AuthenticatedAdmin {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let claims = claims_for(req, Role::Admin);
        Box::pin(async move {
            let claims = claims?;
            Ok(AuthenticatedAdmin { email: claims.sub })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{get, test, App, HttpResponse};

    const SECRET: &str = "test-secret";

    #[get("/whoami")]
    async fn whoami(admin: AuthenticatedAdmin) -> HttpResponse {
        HttpResponse::Ok().body(admin.email)
    }

    #[get("/business-only")]
    async fn business_only(_business: AuthenticatedBusiness) -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    fn settings() -> TokenSettings {
        TokenSettings::new(SECRET, 1)
    }

    #[actix_web::test]
    async fn test_issue_and_verify() {
        let token = settings().issue("owner@gym.test", Role::Business).unwrap();
        let claims = settings().verify(&token).unwrap();
        assert_eq!(claims.sub, "owner@gym.test");
        assert_eq!(claims.role, Role::Business);
        assert!(claims.exp > claims.iat);
    }

    #[actix_web::test]
    async fn test_wrong_secret_rejected() {
        let token = TokenSettings::new("other", 1)
            .issue("owner@gym.test", Role::Business)
            .unwrap();
        let err = settings().verify(&token).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[actix_web::test]
    async fn test_admin_token_accepted() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(settings()))
                .service(whoami),
        )
        .await;
        let token = settings().issue("root@flexpass.test", Role::Admin).unwrap();
        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 200);
        let body = test::read_body(resp).await;
        assert_eq!(body, "root@flexpass.test");
    }

    #[actix_web::test]
    async fn test_missing_token_is_unauthorized() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(settings()))
                .service(business_only),
        )
        .await;
        let req = test::TestRequest::get().uri("/business-only").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 401);
    }

    #[actix_web::test]
    async fn test_wrong_role_is_forbidden() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(settings()))
                .service(business_only),
        )
        .await;
        let token = settings().issue("someone@flexpass.test", Role::User).unwrap();
        let req = test::TestRequest::get()
            .uri("/business-only")
            .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 403);
    }

    #[actix_web::test]
    async fn test_malformed_header_is_unauthorized() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(settings()))
                .service(whoami),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header((header::AUTHORIZATION, "Token abc"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 401);
    }
}
