//! HTTP route handlers for the control API.

use std::path::PathBuf;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use forge::io::config::EngineConfig;
use forge::state::GenerationInProgressError;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::state::{AppState, RunReport, resolve_project};

type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    error: String,
}

fn api_error(status: StatusCode, err: &anyhow::Error) -> ApiError {
    let status = if err.downcast_ref::<GenerationInProgressError>().is_some() {
        StatusCode::CONFLICT
    } else {
        status
    };
    (
        status,
        Json(ErrorBody {
            error: format!("{err:#}"),
        }),
    )
}

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/generate", post(start_generation))
        .route("/engine", post(swap_engine))
        .route("/status", get(status))
        .route("/cancel", post(cancel))
        .route("/shutdown", post(shutdown))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    path: String,
}

#[derive(Debug, Serialize)]
struct Accepted {
    status: &'static str,
    project: PathBuf,
}

/// POST /api/generate - start a generation on a blocking worker.
///
/// Answers 202 once the project lock is held, 409 when another generation
/// holds it.
async fn start_generation(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    let project = resolve_project(&request.path)
        .map_err(|err| api_error(StatusCode::BAD_REQUEST, &err))?;

    let (ready_tx, ready_rx) = oneshot::channel();
    let worker_state = state.clone();
    let worker_project = project.clone();
    tokio::task::spawn_blocking(move || worker_state.run_generation(worker_project, ready_tx));

    match ready_rx.await {
        Ok(Ok(())) => {
            info!(project = %project.display(), "generation accepted");
            Ok((
                StatusCode::ACCEPTED,
                Json(Accepted {
                    status: "accepted",
                    project,
                }),
            ))
        }
        Ok(Err(err)) => {
            warn!(error = %err, "generation refused");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, &err))
        }
        Err(_) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &anyhow::anyhow!("generation worker exited before starting"),
        )),
    }
}

#[derive(Debug, Deserialize)]
struct EngineRequest {
    model: String,
    base_url: Option<String>,
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct EngineResponse {
    engine: String,
}

/// POST /api/engine - swap the reasoning engine between generations.
async fn swap_engine(
    State(state): State<AppState>,
    Json(request): Json<EngineRequest>,
) -> Result<Json<EngineResponse>, ApiError> {
    if request.model.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            &anyhow::anyhow!("model must be non-empty"),
        ));
    }
    let defaults = &state.config.engine;
    let config = EngineConfig {
        model: request.model,
        base_url: request.base_url.unwrap_or_else(|| defaults.base_url.clone()),
        temperature: request.temperature.unwrap_or(defaults.temperature),
        request_timeout_secs: defaults.request_timeout_secs,
    };

    let worker_state = state.clone();
    let swapped = tokio::task::spawn_blocking(move || worker_state.swap_engine(&config))
        .await
        .map_err(|err| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &anyhow::anyhow!("engine swap worker failed: {err}"),
            )
        })?;
    match swapped {
        Ok(engine) => {
            info!(%engine, "engine swapped");
            Ok(Json(EngineResponse { engine }))
        }
        Err(err) => Err(api_error(StatusCode::BAD_REQUEST, &err)),
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    busy: bool,
    project_path: Option<PathBuf>,
    engine: Option<String>,
    cancel_requested: bool,
    last_run: Option<RunReport>,
}

/// GET /api/status - never waits for a running generation.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.project.snapshot();
    Json(StatusResponse {
        busy: snapshot.busy,
        project_path: snapshot.project_path,
        engine: snapshot.engine,
        cancel_requested: snapshot.busy && state.cancel.is_cancelled(),
        last_run: state.last_run(),
    })
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    cancelling: bool,
}

/// POST /api/cancel - request cancellation at the next stage boundary.
async fn cancel(State(state): State<AppState>) -> Json<CancelResponse> {
    let busy = state.project.snapshot().busy;
    if busy {
        info!("cancellation requested");
        state.cancel.cancel();
    }
    Json(CancelResponse { cancelling: busy })
}

/// POST /api/shutdown - stop accepting requests and exit once idle.
async fn shutdown(State(state): State<AppState>) -> StatusCode {
    info!("shutdown requested");
    state.cancel.cancel();
    state.shutdown.notify_one();
    StatusCode::ACCEPTED
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use forge::generate::{Generator, GeneratorSettings};
    use forge::io::config::ForgeConfig;
    use forge::io::engine::Engine;
    use forge::test_support::{
        CallLog, FixtureProject, MarkerScaffolder, ScriptedBuildVerifier, ScriptedEngine,
        ScriptedReply, StaticToolProvider,
    };
    use serde_json::{Value, json};
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    use super::*;
    use crate::state::StatusEvent;

    fn plan_engine() -> Arc<dyn Engine> {
        Arc::new(ScriptedEngine::from_fn(|call| {
            if call.structured {
                ScriptedReply::Structured(json!({
                    "common_tasks": ["create shared layout"],
                    "backend_tasks": [],
                    "frontend_tasks": []
                }))
            } else {
                ScriptedReply::text("Done.")
            }
        }))
    }

    fn test_state(engine: Arc<dyn Engine>) -> AppState {
        AppState::with_factories(
            ForgeConfig::default(),
            engine,
            Arc::new(|engine: Arc<dyn Engine>, config: &ForgeConfig| -> anyhow::Result<Generator> {
                let log = CallLog::default();
                Generator::new(
                    engine,
                    Arc::new(MarkerScaffolder::new(log.clone())),
                    Arc::new(ScriptedBuildVerifier::passing(log.clone())),
                    Arc::new(StaticToolProvider::new(&["write_project_file"], log)),
                    GeneratorSettings::from_config(config),
                )
            }),
            Arc::new(|config: &EngineConfig| -> anyhow::Result<Arc<dyn Engine>> {
                Ok(Arc::new(ScriptedEngine::labelled(&config.model, Vec::new())))
            }),
        )
    }

    fn app(state: AppState) -> Router {
        Router::new().nest("/api", api_router()).with_state(state)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn wait_finished(rx: &mut broadcast::Receiver<StatusEvent>) -> RunReport {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Ok(StatusEvent::Finished { report }) = rx.recv().await {
                    return report;
                }
            }
        })
        .await
        .expect("generation finished in time")
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let response = app(test_state(plan_engine()))
            .oneshot(get("/api/health"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn generate_is_accepted_and_reports_success() {
        let project = FixtureProject::new(&[("index.txt", "A bakery site.")]).expect("fixture");
        let state = test_state(plan_engine());
        let mut rx = state.event_tx.subscribe();

        let response = app(state.clone())
            .oneshot(post_json(
                "/api/generate",
                json!({ "path": project.path().display().to_string() }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let report = wait_finished(&mut rx).await;
        assert!(
            matches!(report, RunReport::Succeeded { tasks_executed: 1, heal_attempts: 0, .. }),
            "{report:?}"
        );
        assert!(project.is_scaffolded());

        let status = body_json(
            app(state)
                .oneshot(get("/api/status"))
                .await
                .expect("status"),
        )
        .await;
        assert_eq!(status["busy"], json!(false));
        assert_eq!(status["last_run"]["result"], json!("succeeded"));
    }

    #[tokio::test]
    async fn generate_conflicts_while_state_is_held() {
        let project = FixtureProject::new(&[("index.txt", "A site.")]).expect("fixture");
        let state = test_state(plan_engine());
        let lease = state.project.try_begin().expect("lease");

        let response = app(state.clone())
            .oneshot(post_json(
                "/api/generate",
                json!({ "path": project.path().display().to_string() }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert!(body["error"].as_str().expect("error").contains("already in progress"));

        let swap = app(state.clone())
            .oneshot(post_json("/api/engine", json!({ "model": "qwen2.5-coder" })))
            .await
            .expect("response");
        assert_eq!(swap.status(), StatusCode::CONFLICT);

        let status = body_json(
            app(state.clone())
                .oneshot(get("/api/status"))
                .await
                .expect("status"),
        )
        .await;
        assert_eq!(status["busy"], json!(true));
        drop(lease);
    }

    #[tokio::test]
    async fn generate_rejects_missing_directory() {
        let response = app(test_state(plan_engine()))
            .oneshot(post_json("/api/generate", json!({ "path": "/no/such/project" })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn engine_swap_installs_new_label() {
        let state = test_state(plan_engine());
        let mut rx = state.event_tx.subscribe();
        let response = app(state.clone())
            .oneshot(post_json("/api/engine", json!({ "model": "qwen2.5-coder" })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["engine"], json!("qwen2.5-coder"));
        assert_eq!(state.project.snapshot().engine.as_deref(), Some("qwen2.5-coder"));
        assert_eq!(
            rx.try_recv().expect("event"),
            StatusEvent::EngineSwapped {
                engine: "qwen2.5-coder".to_string()
            }
        );
    }

    #[test]
    fn cancel_sent_before_the_run_starts_is_honoured() {
        let project = FixtureProject::new(&[("index.txt", "A site.")]).expect("fixture");
        let state = test_state(plan_engine());
        state.cancel.cancel();

        let (ready, accepted) = tokio::sync::oneshot::channel();
        state.run_generation(project.path().to_path_buf(), ready);
        accepted
            .blocking_recv()
            .expect("ready answered")
            .expect("lease taken");

        assert!(matches!(state.last_run(), Some(RunReport::Cancelled { .. })));
        assert!(!state.cancel.is_cancelled(), "flag is cleared once the run ends");
    }

    #[tokio::test]
    async fn cancel_is_a_no_op_when_idle() {
        let state = test_state(plan_engine());
        let response = app(state.clone())
            .oneshot(post_json("/api/cancel", json!({})))
            .await
            .expect("response");
        assert_eq!(body_json(response).await["cancelling"], json!(false));
        assert!(!state.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_notifies_waiters() {
        let state = test_state(plan_engine());
        let notified = state.shutdown.clone();
        let waiter = tokio::spawn(async move { notified.notified().await });
        tokio::task::yield_now().await;

        let response = app(state)
            .oneshot(post_json("/api/shutdown", json!({})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("notified in time")
            .expect("waiter task");
    }
}
