use crate::analyzer::report::{ProgressReport, build_progress_report};
use crate::auth::{Session, session_from_token};
use crate::config::Config;
use crate::db::Database;
use crate::error::VicesError;
use crate::service::{self, Quote};
use crate::streak::{Attempt, Goal, HabitKind, Streak};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_QUOTE_LIMIT: usize = 3;
const MAX_QUOTE_LIMIT: usize = 50;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/status", get(status))
        .route("/api/v1/streaks", get(streak_list).post(streak_create))
        .route("/api/v1/streaks/:id", get(streak_detail))
        .route("/api/v1/streaks/:id/confirm", post(streak_confirm))
        .route("/api/v1/streaks/:id/reset", post(streak_reset))
        .route("/api/v1/streaks/:id/deactivate", post(streak_deactivate))
        .route("/api/v1/streaks/:id/attempts", get(streak_attempts))
        .route("/api/v1/progress", get(progress))
        .route("/api/v1/quotes", get(quotes))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct QuotesQuery {
    limit: Option<usize>,
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateStreakPayload {
    #[serde(rename = "type")]
    kind: HabitKind,
    goal: Option<i64>,
}

#[derive(Debug, Serialize)]
struct StatusPayload {
    service: &'static str,
    version: &'static str,
    api_port: u16,
    users: i64,
    require_subscription: bool,
}

#[derive(Debug, Serialize)]
struct ResetPayload {
    attempt: Option<Attempt>,
    streak: Streak,
}

async fn status(State(state): State<ApiState>) -> ApiResult<Json<StatusPayload>> {
    let database = Database::open(&state.config.db_path)?;

    Ok(Json(StatusPayload {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        api_port: state.config.api_port,
        users: database.count_users()?,
        require_subscription: state.config.require_subscription,
    }))
}

async fn streak_list(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Streak>>> {
    let (database, session) = open_authenticated(&state, &headers)?;
    let streaks = service::user_streaks(&database, Some(&session), session.user_id)?;

    Ok(Json(streaks))
}

async fn streak_create(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(payload): Json<CreateStreakPayload>,
) -> ApiResult<(StatusCode, Json<Streak>)> {
    let (database, session) = open_authenticated(&state, &headers)?;
    let goal = payload.goal.map(Goal::new).transpose()?.unwrap_or_default();
    let streak = service::create_streak(
        &database,
        Some(&session),
        session.user_id,
        payload.kind,
        goal,
    )?;

    Ok((StatusCode::CREATED, Json(streak)))
}

async fn streak_detail(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Streak>> {
    let (database, session) = open_authenticated(&state, &headers)?;

    Ok(Json(service::get_streak(&database, Some(&session), id)?))
}

async fn streak_confirm(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Streak>> {
    let (database, session) = open_authenticated(&state, &headers)?;

    Ok(Json(service::confirm_today(&database, Some(&session), id)?))
}

async fn streak_reset(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<ResetPayload>> {
    let (database, session) = open_authenticated(&state, &headers)?;
    let attempt = service::reset_streak(&database, Some(&session), id)?;
    let streak = service::get_streak(&database, Some(&session), id)?;

    Ok(Json(ResetPayload { attempt, streak }))
}

async fn streak_deactivate(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let (database, session) = open_authenticated(&state, &headers)?;
    service::deactivate_streak(&database, Some(&session), id)?;

    Ok(Json(json!({ "id": id, "deactivated": true })))
}

async fn streak_attempts(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<Attempt>>> {
    let (database, session) = open_authenticated(&state, &headers)?;

    Ok(Json(service::streak_attempts(&database, Some(&session), id)?))
}

async fn progress(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Json<ProgressReport>> {
    let (database, session) = open_authenticated(&state, &headers)?;
    let streaks = service::user_streaks(&database, Some(&session), session.user_id)?
        .into_iter()
        .map(|streak| {
            service::streak_attempts(&database, Some(&session), streak.id)
                .map(|attempts| (streak, attempts))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(build_progress_report(
        Local::now().date_naive(),
        &session.email,
        &streaks,
        Utc::now(),
    )))
}

async fn quotes(
    State(state): State<ApiState>,
    Query(query): Query<QuotesQuery>,
) -> ApiResult<Json<Vec<Quote>>> {
    let database = Database::open(&state.config.db_path)?;
    let quotes = match query.category.as_deref().map(str::trim) {
        Some(category) if !category.is_empty() => service::quotes_by_category(&database, category)?,
        _ => {
            let limit = query
                .limit
                .unwrap_or(DEFAULT_QUOTE_LIMIT)
                .clamp(1, MAX_QUOTE_LIMIT);
            service::random_quotes(&database, limit)?
        }
    };

    Ok(Json(quotes))
}

fn open_authenticated(state: &ApiState, headers: &HeaderMap) -> ApiResult<(Database, Session)> {
    let token = bearer_token(headers).ok_or(VicesError::AuthenticationMissing)?;
    let database = Database::open(&state.config.db_path)?;
    let session = session_from_token(&database, token)?;
    debug!(user_id = session.user_id, "request authenticated");

    Ok((database, session))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
enum ApiError {
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        match value.downcast::<VicesError>() {
            Ok(error) => error.into(),
            Err(other) => Self::Internal(other),
        }
    }
}

impl From<VicesError> for ApiError {
    fn from(value: VicesError) -> Self {
        let message = value.to_string();
        match value {
            VicesError::AuthenticationMissing | VicesError::InvalidCredentials => {
                Self::Unauthorized(message)
            }
            VicesError::AuthorizationMismatch(_) => Self::Forbidden(message),
            VicesError::NotFound(_) => Self::NotFound(message),
            VicesError::InvalidGoal(_)
            | VicesError::InvalidEmail(_)
            | VicesError::WeakPassword(_)
            | VicesError::EmailTaken(_) => Self::BadRequest(message),
            VicesError::InvalidRow { .. } | VicesError::External(_) => {
                Self::Internal(anyhow::Error::new(value))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            ApiError::Unauthorized(message)
            | ApiError::Forbidden(message)
            | ApiError::BadRequest(message)
            | ApiError::NotFound(message) => message,
            ApiError::Internal(error) => {
                warn!(error = %error, "request failed");
                format!("{error:#}")
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authenticator;
    use reqwest::blocking::Client;
    use serde_json::Value;
    use tempfile::{TempDir, tempdir};
    use tokio::net::TcpListener;

    struct Harness {
        _dir: TempDir,
        base_url: String,
        token: String,
        other_token: String,
    }

    async fn harness() -> Harness {
        let dir = tempdir().expect("tempdir");
        let config = Config {
            db_path: dir.path().join("vices.db"),
            ..Config::default()
        };
        let database = Database::open(&config.db_path).expect("open db");
        let mut auth = Authenticator::new(None);
        auth.sign_up(&database, "owner@example.com", "secret-pass", "Owner")
            .expect("sign up owner");
        auth.sign_up(&database, "other@example.com", "secret-pass", "Other")
            .expect("sign up other");
        let token = auth
            .sign_in(&database, "owner@example.com", "secret-pass")
            .expect("sign in owner")
            .access_token;
        let other_token = auth
            .sign_in(&database, "other@example.com", "secret-pass")
            .expect("sign in other")
            .access_token;

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base_url = format!("http://{}", listener.local_addr().expect("local addr"));
        let app = router(ApiState {
            config: Arc::new(config),
        });
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Harness {
            _dir: dir,
            base_url,
            token,
            other_token,
        }
    }

    /// Sends one request off the runtime and returns status plus JSON body.
    async fn call(
        method: reqwest::Method,
        url: String,
        token: Option<String>,
        body: Option<Value>,
    ) -> (u16, Value) {
        tokio::task::spawn_blocking(move || {
            let client = Client::new();
            let mut request = client.request(method, url);
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(&body);
            }
            let response = request.send().expect("send");
            let status = response.status().as_u16();
            let body = response.json::<Value>().expect("json body");
            (status, body)
        })
        .await
        .expect("blocking call")
    }

    #[test]
    fn error_kinds_map_to_status_codes() {
        let cases = [
            (VicesError::AuthenticationMissing, StatusCode::UNAUTHORIZED),
            (VicesError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (
                VicesError::AuthorizationMismatch("Cannot update other user's streak".to_string()),
                StatusCode::FORBIDDEN,
            ),
            (VicesError::NotFound("Streak 9".to_string()), StatusCode::NOT_FOUND),
            (VicesError::InvalidGoal(0), StatusCode::BAD_REQUEST),
            (VicesError::External("disk full".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status_code(), expected);
        }

        let wrapped = anyhow::Error::new(VicesError::NotFound("User 1".to_string()));
        assert_eq!(ApiError::from(wrapped).status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, "Token abc".parse().expect("header"));
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().expect("header"));
        assert_eq!(bearer_token(&headers), Some("abc"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn streak_routes_enforce_session_and_ownership() {
        let harness = harness().await;
        let streaks_url = format!("{}/api/v1/streaks", harness.base_url);

        let (status, body) = call(reqwest::Method::GET, streaks_url.clone(), None, None).await;
        assert_eq!(status, 401);
        assert_eq!(body["error"], "No authenticated user session found");

        let (status, created) = call(
            reqwest::Method::POST,
            streaks_url.clone(),
            Some(harness.token.clone()),
            Some(json!({ "type": "drinking", "goal": 30 })),
        )
        .await;
        assert_eq!(status, 201);
        assert_eq!(created["goal"], 30);
        let id = created["id"].as_i64().expect("streak id");

        let (status, confirmed) = call(
            reqwest::Method::POST,
            format!("{streaks_url}/{id}/confirm"),
            Some(harness.token.clone()),
            None,
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(confirmed["current_streak"], 1);

        let (status, _) = call(
            reqwest::Method::POST,
            format!("{streaks_url}/{id}/reset"),
            Some(harness.other_token.clone()),
            None,
        )
        .await;
        assert_eq!(status, 403);

        let (status, reset) = call(
            reqwest::Method::POST,
            format!("{streaks_url}/{id}/reset"),
            Some(harness.token.clone()),
            None,
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(reset["attempt"]["duration"], 1);
        assert_eq!(reset["streak"]["current_streak"], 0);

        let (status, _) = call(
            reqwest::Method::GET,
            format!("{streaks_url}/999"),
            Some(harness.token.clone()),
            None,
        )
        .await;
        assert_eq!(status, 404);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn invalid_goal_and_public_quotes() {
        let harness = harness().await;

        let (status, body) = call(
            reqwest::Method::POST,
            format!("{}/api/v1/streaks", harness.base_url),
            Some(harness.token.clone()),
            Some(json!({ "type": "smoking", "goal": 0 })),
        )
        .await;
        assert_eq!(status, 400);
        assert!(body["error"].as_str().is_some_and(|message| message.contains("positive")));

        let (status, quotes) = call(
            reqwest::Method::GET,
            format!("{}/api/v1/quotes?limit=2", harness.base_url),
            None,
            None,
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(quotes.as_array().map(Vec::len), Some(2));

        let (status, progress) = call(
            reqwest::Method::GET,
            format!("{}/api/v1/progress", harness.base_url),
            Some(harness.token.clone()),
            None,
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(progress["owner"], "owner@example.com");
    }
}
