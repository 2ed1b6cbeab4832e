#![allow(dead_code)]

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::middleware::Logger;
use actix_web::{http::header, test, web, App};
use serde_json::json;
use taskforge::auth::{AuthMiddleware, AuthResponse};
use taskforge::config::Config;
use taskforge::routes::{self, health};
use taskforge::store::MemoryStore;
use taskforge::AppServices;
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "Password123!";

/// In-memory configuration with the cheapest bcrypt cost.
pub fn test_config() -> Config {
    Config::from_lookup(|key| {
        match key {
            "STORAGE" => Some("memory"),
            "JWT_SECRET" => Some("integration_test_secret_0123456789abcdef"),
            "BCRYPT_COST" => Some("4"),
            _ => None,
        }
        .map(str::to_string)
    })
    .expect("test configuration is valid")
}

pub fn memory_services() -> AppServices {
    AppServices::new(Arc::new(MemoryStore::new()), &test_config())
}

/// The same middleware stack as main.rs, with a permissive CORS policy.
pub async fn init_app(
    services: &AppServices,
) -> impl Service<
    actix_http::Request,
    Response = ServiceResponse<impl MessageBody>,
    Error = actix_web::Error,
> {
    test::init_service(
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .app_data(services.auth.clone())
            .app_data(services.tasks.clone())
            .service(health::health)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware::new(services.tokens.clone()))
                    .configure(routes::config),
            ),
    )
    .await
}

pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub token: String,
}

impl TestUser {
    pub fn bearer(&self) -> (header::HeaderName, String) {
        (header::AUTHORIZATION, format!("Bearer {}", self.token))
    }
}

pub async fn register_user(
    app: &impl Service<
        actix_http::Request,
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
    >,
    email: &str,
) -> Result<TestUser, String> {
    let req_register = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&json!({
            "email": email,
            "password": TEST_PASSWORD,
            "first_name": "Test",
            "last_name": "User"
        }))
        .to_request();
    let resp_register = test::call_service(app, req_register).await;
    let resp_status = resp_register.status();
    let auth_response_bytes = test::read_body(resp_register).await;

    if !resp_status.is_success() {
        return Err(format!(
            "Failed to register user. Status: {}. Body: {}",
            resp_status,
            String::from_utf8_lossy(&auth_response_bytes)
        ));
    }
    let auth_response: AuthResponse = serde_json::from_slice(&auth_response_bytes)
        .map_err(|e| format!("Failed to parse registration response: {}", e))?;

    Ok(TestUser {
        id: auth_response.user_id,
        email: auth_response.email,
        token: auth_response.token,
    })
}
