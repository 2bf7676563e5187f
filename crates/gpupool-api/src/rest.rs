//! REST API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use gpupool_core::{GpuResource, Job, JobStatus, Organization, PoolError};
use gpupool_engine::{
    EngineStatus, ExecutionReport, NewGpuRequest, NewJobRequest, PoolService, UsageReport,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<PoolService>,
}

/// Create the API router
pub fn create_router(service: Arc<PoolService>) -> Router {
    let state = Arc::new(AppState { service });

    Router::new()
        .route("/api/v1/organizations", post(create_organization))
        .route("/api/v1/organizations/:id/usage", get(get_usage))
        .route("/api/v1/gpus", post(register_gpu))
        .route("/api/v1/gpus", get(list_gpus))
        .route("/api/v1/gpus/:id/heartbeat", post(gpu_heartbeat))
        .route("/api/v1/jobs", post(submit_job))
        .route("/api/v1/jobs", get(list_jobs))
        .route("/api/v1/jobs/:id", get(get_job))
        .route("/api/v1/jobs/:id/cancel", post(cancel_job))
        .route("/api/v1/jobs/:id/completion", post(report_completion))
        .route("/api/v1/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Map engine errors onto HTTP status codes
fn error_response(e: PoolError) -> (StatusCode, String) {
    let status = match &e {
        PoolError::Validation(_) => StatusCode::BAD_REQUEST,
        PoolError::OrganizationNotFound(_)
        | PoolError::JobNotFound(_)
        | PoolError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
        PoolError::IllegalTransition { .. } => StatusCode::CONFLICT,
        PoolError::Infrastructure(_) | PoolError::TransientStore(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// Request to create an organization
#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
}

/// Response for a job
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub model: String,
    pub memory_required_mb: u64,
    pub priority: i32,
    pub status: String,
    pub gpu_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            organization_id: job.organization_id,
            model: job.model,
            memory_required_mb: job.memory_required_mb,
            priority: job.priority,
            status: job.status.to_string(),
            gpu_id: job.gpu_id,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error_message: job.error_message,
        }
    }
}

/// Create a new organization
async fn create_organization(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrganizationRequest>,
) -> Result<Json<Organization>, (StatusCode, String)> {
    let org = state
        .service
        .create_organization(req.name)
        .await
        .map_err(error_response)?;
    Ok(Json(org))
}

/// Per-organization cost summary
async fn get_usage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<UsageReport>, (StatusCode, String)> {
    let usage = state.service.usage(id).await.map_err(error_response)?;
    Ok(Json(usage))
}

/// Provision a GPU resource
async fn register_gpu(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewGpuRequest>,
) -> Result<Json<GpuResource>, (StatusCode, String)> {
    info!(
        organization_id = %req.organization_id,
        gpu_type = %req.gpu_type,
        memory_total_mb = req.memory_total_mb,
        "Registering GPU"
    );
    let gpu = state
        .service
        .register_gpu(req)
        .await
        .map_err(error_response)?;
    Ok(Json(gpu))
}

/// Query parameters for listing GPUs
#[derive(Debug, Deserialize)]
pub struct GpusQuery {
    pub organization_id: Uuid,
}

/// List an organization's GPU resources
async fn list_gpus(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GpusQuery>,
) -> Result<Json<Vec<GpuResource>>, (StatusCode, String)> {
    let gpus = state
        .service
        .list_gpus(query.organization_id)
        .await
        .map_err(error_response)?;
    Ok(Json(gpus))
}

/// Telemetry heartbeat for a GPU resource
async fn gpu_heartbeat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .service
        .record_gpu_heartbeat(id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Submit a job
async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewJobRequest>,
) -> Result<Json<JobResponse>, (StatusCode, String)> {
    info!(
        organization_id = %req.organization_id,
        model = %req.model,
        memory_required_mb = req.memory_required_mb,
        "Submitting job"
    );
    let job = state.service.submit_job(req).await.map_err(error_response)?;
    Ok(Json(JobResponse::from(job)))
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    pub organization_id: Uuid,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// List an organization's jobs
async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<Vec<JobResponse>>, (StatusCode, String)> {
    let status = match query.status.as_deref() {
        Some(s) => Some(
            s.parse::<JobStatus>()
                .map_err(|e| (StatusCode::BAD_REQUEST, e))?,
        ),
        None => None,
    };

    let jobs = state
        .service
        .list_jobs(query.organization_id, status, query.limit.unwrap_or(100))
        .await
        .map_err(error_response)?;
    Ok(Json(jobs.into_iter().map(JobResponse::from).collect()))
}

/// Get a specific job
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, (StatusCode, String)> {
    let job = state.service.get_job(id).await.map_err(error_response)?;
    Ok(Json(JobResponse::from(job)))
}

/// Cancel a job
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, (StatusCode, String)> {
    info!(job_id = %id, "Cancelling job");
    let job = state.service.cancel_job(id).await.map_err(error_response)?;
    Ok(Json(JobResponse::from(job)))
}

/// Apply the compute collaborator's completion/failure signal
async fn report_completion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(report): Json<ExecutionReport>,
) -> Result<Json<JobResponse>, (StatusCode, String)> {
    let job = state
        .service
        .report_execution(id, report)
        .await
        .map_err(error_response)?;
    Ok(Json(JobResponse::from(job)))
}

/// System status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    #[serde(flatten)]
    pub engine: EngineStatus,
}

/// Get system status
async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let engine = state.service.status().await.map_err(error_response)?;
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use gpupool_compute::NoopBackend;
    use gpupool_engine::{CostTracker, LifecycleOrchestrator, ResourceCatalog};
    use gpupool_store::{MemoryStore, PoolStore};
    use tokio::sync::Notify;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let store: Arc<dyn PoolStore> = Arc::new(MemoryStore::new());
        let catalog = ResourceCatalog::new(store.clone());
        let lifecycle = Arc::new(LifecycleOrchestrator::new(
            store.clone(),
            catalog,
            CostTracker::new(store.clone()),
            Arc::new(NoopBackend::new()),
        ));
        let service = Arc::new(PoolService::new(store, lifecycle, Arc::new(Notify::new())));
        create_router(service)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_submit_and_fetch_job() {
        let router = test_router();

        let response = router
            .clone()
            .oneshot(
                Request::post("/api/v1/organizations")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"acme"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let org = json_body(response).await;
        let org_id = org["id"].as_str().unwrap().to_string();

        let submit = serde_json::json!({
            "organization_id": org_id,
            "model": "phi-2",
            "memory_required_mb": 8192,
            "priority": 3,
        });
        let response = router
            .clone()
            .oneshot(
                Request::post("/api/v1/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(submit.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let job = json_body(response).await;
        assert_eq!(job["status"], "queued");

        let job_id = job["id"].as_str().unwrap();
        let response = router
            .clone()
            .oneshot(
                Request::get(format!("/api/v1/jobs/{}", job_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = json_body(response).await;
        assert_eq!(fetched["id"], job["id"]);
    }

    #[tokio::test]
    async fn test_submit_to_unknown_organization_is_404() {
        let router = test_router();
        let submit = serde_json::json!({
            "organization_id": Uuid::new_v4(),
            "model": "phi-2",
            "memory_required_mb": 8192,
        });
        let response = router
            .oneshot(
                Request::post("/api/v1/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(submit.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_status_filter_is_400() {
        let router = test_router();
        let response = router
            .oneshot(
                Request::get(format!(
                    "/api/v1/jobs?organization_id={}&status=paused",
                    Uuid::new_v4()
                ))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let router = test_router();
        let response = router
            .oneshot(Request::get("/api/v1/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status = json_body(response).await;
        assert!(status["version"].is_string());
    }
}
