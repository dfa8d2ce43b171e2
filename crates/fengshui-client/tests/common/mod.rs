//! Scripted analysis API for integration tests

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// One scripted reply to a status request
#[derive(Debug, Clone)]
pub enum Reply {
    Status(Value),
    Error(u16),
}

impl Reply {
    pub fn processing() -> Self {
        Reply::Status(json!({ "status": "processing" }))
    }

    pub fn completed(filename: &str) -> Self {
        Reply::Status(json!({ "status": "completed", "filename": filename }))
    }

    pub fn failed(error: Option<&str>) -> Self {
        match error {
            Some(e) => Reply::Status(json!({ "status": "failed", "error": e })),
            None => Reply::Status(json!({ "status": "failed" })),
        }
    }
}

#[derive(Default)]
struct Script {
    /// Replies per job id; the last one repeats
    replies: HashMap<String, VecDeque<Reply>>,
    hits: HashMap<String, u32>,
    models: HashMap<String, Vec<u8>>,
    analysis: Option<Value>,
    uploads: Vec<Vec<u8>>,
}

#[derive(Clone, Default)]
pub struct ScriptedApi {
    script: Arc<Mutex<Script>>,
}

impl ScriptedApi {
    pub fn script_job(&self, job_id: &str, replies: Vec<Reply>) {
        self.script
            .lock()
            .unwrap()
            .replies
            .insert(job_id.to_string(), replies.into());
    }

    pub fn serve_model(&self, filename: &str, bytes: &[u8]) {
        self.script
            .lock()
            .unwrap()
            .models
            .insert(filename.to_string(), bytes.to_vec());
    }

    pub fn set_analysis(&self, body: Value) {
        self.script.lock().unwrap().analysis = Some(body);
    }

    pub fn hits(&self, job_id: &str) -> u32 {
        self.script
            .lock()
            .unwrap()
            .hits
            .get(job_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn uploads(&self) -> Vec<Vec<u8>> {
        self.script.lock().unwrap().uploads.clone()
    }

    /// Serve on an ephemeral port and return the base URL
    pub async fn start(&self) -> String {
        let app = Router::new()
            .route("/models/status/{id}", get(status))
            .route("/models/{filename}", get(model))
            .route("/analyze/", post(analyze))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

async fn status(State(api): State<ScriptedApi>, Path(id): Path<String>) -> Response {
    let reply = {
        let mut script = api.script.lock().unwrap();
        *script.hits.entry(id.clone()).or_default() += 1;
        match script.replies.get_mut(&id) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
    };
    match reply {
        Some(Reply::Status(body)) => Json(body).into_response(),
        Some(Reply::Error(code)) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn model(State(api): State<ScriptedApi>, Path(filename): Path<String>) -> Response {
    let bytes = api.script.lock().unwrap().models.get(&filename).cloned();
    match bytes {
        Some(bytes) => bytes.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn analyze(State(api): State<ScriptedApi>, body: Bytes) -> Response {
    let mut script = api.script.lock().unwrap();
    script.uploads.push(body.to_vec());
    match script.analysis.clone() {
        Some(body) => Json(body).into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
