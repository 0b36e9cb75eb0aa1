#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use atelier_core::job::Job;
use atelier_events::EventBus;
use atelier_scheduler::{
    JobUpdater, ModeConfig, ModeDispatcher, Processor, Scheduler, SchedulerConfig,
};
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use atelier_api::config::ServerConfig;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;

/// Never reports back, so dispatched jobs stay in `preprocessing` and every
/// status change in a test is explicit.
pub struct HoldProcessor;

#[async_trait]
impl Processor for HoldProcessor {
    async fn process(&self, _job: Job, _config: ModeConfig, _updater: JobUpdater) {}
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
    }
}

pub fn test_scheduler() -> Scheduler {
    let dispatcher = ModeDispatcher::builder(&SchedulerConfig::default())
        .register_all(Arc::new(HoldProcessor))
        .build();
    Scheduler::new(dispatcher, Arc::new(EventBus::default()))
}

/// Build the full application router around `scheduler`, with the same
/// middleware stack production uses.
pub fn build_test_app(scheduler: Scheduler) -> Router {
    let config = test_config();
    let state = AppState {
        scheduler,
        shutdown: CancellationToken::new(),
    };
    build_app_router(state, &config)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Body::from(body.to_string())).await
}

async fn send(app: Router, method: Method, uri: &str, body: Body) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
