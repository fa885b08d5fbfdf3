//! Auth API endpoints
//!
//! Provides REST API endpoints for the session lifecycle:
//! - POST /users/register - Register a new user
//! - POST /users/login - Login and get tokens
//! - POST /users/refresh - Rotate the refresh token
//! - POST /users/logout - Logout (drop refresh token)
//! - POST /users/email/send-confirmation - Email a confirmation link
//! - POST /users/email/confirm - Consume a confirmation token
//! - GET /users/email/confirmed - Confirmation status of the caller
//! - GET /health - Liveness probe

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::core::auth::{
    AuthError, AuthResponse, AuthService, LoginRequest, RefreshRequest, RegisterRequest,
};
use crate::core::validation::{self, ValidationError};

/// Auth API state containing the auth service
#[derive(Clone)]
pub struct AuthApiState {
    pub auth_service: AuthService,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// Everything a handler can reject a request with
#[derive(Debug, thiserror::Error)]
pub enum ApiRejection {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ApiRejection {
    fn status(&self) -> StatusCode {
        match self {
            ApiRejection::Validation(_) => StatusCode::BAD_REQUEST,
            ApiRejection::Auth(err) => match err {
                AuthError::InvalidCredentials
                | AuthError::MissingToken
                | AuthError::InvalidToken
                | AuthError::WrongTokenType
                | AuthError::TokenNotFound
                | AuthError::TokenMismatch => StatusCode::UNAUTHORIZED,
                AuthError::DuplicateEmail => StatusCode::CONFLICT,
                AuthError::MissingParameter(_) | AuthError::InvalidOrExpiredToken => {
                    StatusCode::BAD_REQUEST
                }
                AuthError::HashingFailure
                | AuthError::TokenIssuanceFailure
                | AuthError::TokenGenerationFailure
                | AuthError::PersistenceFailure
                | AuthError::StorageFailure
                | AuthError::ConfirmationPersistFailure
                | AuthError::UserLookupFailure => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn body(&self) -> ApiError {
        match self {
            ApiRejection::Validation(err) => ApiError::new(err.to_string(), err.code()),
            // Internal failure kinds stay in the logs
            ApiRejection::Auth(err) if err.is_internal() => {
                ApiError::new("Internal server error", "INTERNAL_ERROR")
            }
            ApiRejection::Auth(err) => ApiError::new(err.to_string(), err.code()),
        }
    }
}

/// Convert a rejection to an API response
impl IntoResponse for ApiRejection {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Response for operations that only report success
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response for the confirmation status query
#[derive(Debug, Serialize)]
pub struct ConfirmedResponse {
    pub confirmed: bool,
}

/// Request for sending a confirmation link; defaults to the token's email
#[derive(Debug, Deserialize)]
pub struct SendConfirmationRequest {
    #[serde(default)]
    pub email: Option<String>,
}

/// Request for confirming an email
#[derive(Debug, Deserialize)]
pub struct ConfirmEmailRequest {
    pub token: String,
}

/// Create the auth API router
pub fn auth_api_router(state: AuthApiState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/users/register", post(register_handler))
        .route("/users/login", post(login_handler))
        .route("/users/refresh", post(refresh_handler))
        .route("/users/logout", post(logout_handler))
        .route(
            "/users/email/send-confirmation",
            post(send_confirmation_handler),
        )
        .route("/users/email/confirm", post(confirm_email_handler))
        .route("/users/email/confirmed", get(email_confirmed_handler))
        .with_state(state)
}

/// Full application router with health probe, request tracing and timeout
pub fn app_router(state: AuthApiState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(auth_api_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
}

/// GET /health
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /users/register
/// Register a new user
async fn register_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiRejection> {
    validation::validate_email(&request.email)?;
    validation::validate_password(&request.password)?;

    let response = state.auth_service.register(request).await?;

    Ok(Json(response))
}

/// POST /users/login
/// Login and get access/refresh tokens
async fn login_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiRejection> {
    validation::require("email", &request.email)?;
    validation::require("password", &request.password)?;

    let response = state.auth_service.login(request).await?;

    Ok(Json(response))
}

/// POST /users/refresh
/// Exchange the refresh token for a new pair
async fn refresh_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiRejection> {
    validation::require("refresh_token", &request.refresh_token)?;

    let response = state.auth_service.refresh(&request.refresh_token).await?;

    Ok(Json(response))
}

/// POST /users/logout
/// Logout and invalidate the refresh token
async fn logout_handler(
    State(state): State<Arc<AuthApiState>>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiRejection> {
    let (user_id, _) = authenticate(&state, &headers)?;

    state.auth_service.logout(user_id).await?;

    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// POST /users/email/send-confirmation
/// Send a confirmation link to the caller's email
async fn send_confirmation_handler(
    State(state): State<Arc<AuthApiState>>,
    headers: HeaderMap,
    Json(request): Json<SendConfirmationRequest>,
) -> Result<Json<MessageResponse>, ApiRejection> {
    let (user_id, token_email) = authenticate(&state, &headers)?;

    let email = match request.email {
        Some(email) => {
            validation::validate_email(&email)?;
            email
        }
        None => token_email,
    };

    state
        .auth_service
        .send_confirmation_link(user_id, &email)
        .await?;

    Ok(Json(MessageResponse::new("Confirmation email sent")))
}

/// POST /users/email/confirm
/// Confirm an email with the token from the link
async fn confirm_email_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<ConfirmEmailRequest>,
) -> Result<Json<MessageResponse>, ApiRejection> {
    validation::require("token", &request.token)?;

    state.auth_service.confirm_email(&request.token).await?;

    Ok(Json(MessageResponse::new("Email confirmed successfully")))
}

/// GET /users/email/confirmed
/// Whether the caller's email is confirmed
async fn email_confirmed_handler(
    State(state): State<Arc<AuthApiState>>,
    headers: HeaderMap,
) -> Result<Json<ConfirmedResponse>, ApiRejection> {
    let (user_id, _) = authenticate(&state, &headers)?;

    let confirmed = state.auth_service.is_email_confirmed(user_id).await?;

    Ok(Json(ConfirmedResponse { confirmed }))
}

/// Resolve the caller from the access token in the Authorization header
fn authenticate(state: &AuthApiState, headers: &HeaderMap) -> Result<(Uuid, String), AuthError> {
    let token = extract_bearer_token(headers)?;
    let claims = state.auth_service.validate_access_token(token)?;
    let user_id = claims.user_id().map_err(|_| AuthError::InvalidToken)?;

    Ok((user_id, claims.email))
}

/// Extract Bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidToken)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderValue, Method, Request};
    use serde_json::{Value, json};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use crate::core::auth::jwt::{JwtConfig, JwtService};
    use crate::core::auth::password::BcryptHasher;
    use crate::core::cache::MemorySessionStore;
    use crate::core::db::repositories::MemoryCredentialStore;
    use crate::core::messaging::{ChannelEmailPublisher, EmailEvent};

    fn test_app() -> (Router, mpsc::Receiver<EmailEvent>) {
        let (publisher, rx) = ChannelEmailPublisher::new(8);
        let auth_service = AuthService::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(JwtService::new(JwtConfig::new("api-test-secret"))),
            Arc::new(BcryptHasher::new(4)),
        )
        .with_email_publisher(Arc::new(publisher));

        let app = app_router(AuthApiState { auth_service }, Duration::from_secs(5));
        (app, rx)
    }

    fn json_request(method: Method, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn register(app: &Router, email: &str) -> Value {
        let (status, body) = send(
            app,
            json_request(
                Method::POST,
                "/users/register",
                json!({ "email": email, "password": "password1" }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    // ========================================================================
    // Bearer Extraction Tests
    // ========================================================================

    #[test]
    fn test_extract_bearer_token_valid() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer my_token_123"),
        );

        let token = extract_bearer_token(&headers).unwrap();
        assert_eq!(token, "my_token_123");
    }

    #[test]
    fn test_extract_bearer_token_missing_header() {
        let headers = HeaderMap::new();

        let result = extract_bearer_token(&headers);
        assert_eq!(result, Err(AuthError::MissingToken));
    }

    #[test]
    fn test_extract_bearer_token_invalid_format() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic base64credentials"),
        );

        let result = extract_bearer_token(&headers);
        assert_eq!(result, Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_extract_bearer_token_empty_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));

        let result = extract_bearer_token(&headers);
        assert_eq!(result, Err(AuthError::MissingToken));
    }

    // ========================================================================
    // Rejection Mapping Tests
    // ========================================================================

    #[test]
    fn test_rejection_status_codes() {
        let cases = [
            (AuthError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AuthError::DuplicateEmail, StatusCode::CONFLICT),
            (AuthError::TokenMismatch, StatusCode::UNAUTHORIZED),
            (AuthError::InvalidOrExpiredToken, StatusCode::BAD_REQUEST),
            (AuthError::MissingParameter("email"), StatusCode::BAD_REQUEST),
            (AuthError::StorageFailure, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, status) in cases {
            assert_eq!(ApiRejection::from(error).status(), status, "{error:?}");
        }
        assert_eq!(
            ApiRejection::from(ValidationError::InvalidEmail).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_errors_are_masked() {
        let body = ApiRejection::from(AuthError::PersistenceFailure).body();

        assert_eq!(body.code, "INTERNAL_ERROR");
        assert_eq!(body.error, "Internal server error");
    }

    #[test]
    fn test_api_error_serialization() {
        let body = ApiRejection::from(AuthError::DuplicateEmail).body();
        let json = serde_json::to_string(&body).unwrap();

        assert!(json.contains("Email already registered"));
        assert!(json.contains("EMAIL_EXISTS"));
    }

    // ========================================================================
    // Router Tests
    // ========================================================================

    #[tokio::test]
    async fn test_health() {
        let (app, _rx) = test_app();

        let (status, body) = send(&app, get_request("/health", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let (app, _rx) = test_app();

        let registered = register(&app, "a@x.com").await;
        assert!(registered["access_token"].is_string());
        assert!(registered["expires_in"].as_i64().unwrap() > 0);

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/users/login",
                json!({ "email": "a@x.com", "password": "password1" }),
                None,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], registered["user_id"]);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (app, _rx) = test_app();

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/users/register",
                json!({ "email": "not-an-email", "password": "password1" }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_EMAIL");

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/users/register",
                json!({ "email": "a@x.com", "password": "short" }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "PASSWORD_TOO_SHORT");
    }

    #[tokio::test]
    async fn test_register_duplicate_is_conflict() {
        let (app, _rx) = test_app();
        register(&app, "a@x.com").await;

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/users/register",
                json!({ "email": "a@x.com", "password": "password1" }),
                None,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "EMAIL_EXISTS");
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let (app, _rx) = test_app();
        register(&app, "a@x.com").await;

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/users/login",
                json!({ "email": "a@x.com", "password": "wrong-password" }),
                None,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn test_refresh_then_logout() {
        let (app, _rx) = test_app();
        let registered = register(&app, "a@x.com").await;

        let (status, refreshed) = send(
            &app,
            json_request(
                Method::POST,
                "/users/refresh",
                json!({ "refresh_token": registered["refresh_token"] }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(refreshed["refresh_token"], registered["refresh_token"]);

        let access = refreshed["access_token"].as_str().unwrap();
        let (status, body) = send(
            &app,
            json_request(Method::POST, "/users/logout", json!({}), Some(access)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Logged out successfully");

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/users/refresh",
                json!({ "refresh_token": refreshed["refresh_token"] }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "TOKEN_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_logout_requires_bearer_token() {
        let (app, _rx) = test_app();

        let (status, body) = send(
            &app,
            json_request(Method::POST, "/users/logout", json!({}), None),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "MISSING_TOKEN");
    }

    #[tokio::test]
    async fn test_refresh_token_rejected_as_bearer() {
        let (app, _rx) = test_app();
        let registered = register(&app, "a@x.com").await;
        let refresh = registered["refresh_token"].as_str().unwrap();

        let (status, body) = send(&app, get_request("/users/email/confirmed", Some(refresh))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "WRONG_TOKEN_TYPE");
    }

    #[tokio::test]
    async fn test_email_confirmation_flow() {
        let (app, mut rx) = test_app();
        let registered = register(&app, "a@x.com").await;
        let access = registered["access_token"].as_str().unwrap();

        let (status, body) = send(&app, get_request("/users/email/confirmed", Some(access))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["confirmed"], false);

        let (status, _) = send(
            &app,
            json_request(
                Method::POST,
                "/users/email/send-confirmation",
                json!({}),
                Some(access),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.to, "a@x.com");
        let url = event.data["confirmation_url"].as_str().unwrap();
        let (_, token) = url.split_once("token=").unwrap();

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/users/email/confirm",
                json!({ "token": token }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Email confirmed successfully");

        let (_, body) = send(&app, get_request("/users/email/confirmed", Some(access))).await;
        assert_eq!(body["confirmed"], true);

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/users/email/confirm",
                json!({ "token": token }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_OR_EXPIRED_TOKEN");
    }

    #[tokio::test]
    async fn test_confirm_requires_token() {
        let (app, _rx) = test_app();

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/users/email/confirm",
                json!({ "token": " " }),
                None,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "FIELD_REQUIRED");
    }
}
