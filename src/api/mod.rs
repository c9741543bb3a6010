pub mod extract;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::model::{Closer, DutyStatus, Lead, LeadStatus, Session, Team};
use crate::notify::Notifier;
use crate::rotation::LineupView;
use crate::store::Store;
use crate::workflow::{self, NewCloser, NewLead};

pub use extract::ApiError;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<Store>,
    pub notifier: Notifier,
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    revision: u64,
    leads: usize,
}

#[derive(Deserialize)]
struct ListLeadsQuery {
    status: Option<LeadStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RescheduleRequest {
    scheduled_appointment_time: DateTime<Utc>,
}

#[derive(Deserialize)]
struct DispositionRequest {
    status: LeadStatus,
}

#[derive(Deserialize)]
struct DutyRequest {
    status: DutyStatus,
}

#[derive(Deserialize)]
struct ReorderRequest {
    order: Vec<String>,
}

#[derive(Deserialize)]
struct NewTeamRequest {
    id: String,
    name: String,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/leads", get(list_leads_handler).post(create_lead_handler))
        .route("/api/leads/{id}", get(get_lead_handler).delete(delete_lead_handler))
        .route("/api/leads/{id}/verify", post(verify_handler))
        .route("/api/leads/{id}/reschedule", post(reschedule_handler))
        .route("/api/leads/{id}/accept", post(accept_handler))
        .route("/api/leads/{id}/disposition", post(disposition_handler))
        .route("/api/closers", get(list_closers_handler).post(register_closer_handler))
        .route("/api/closers/{uid}/duty", put(duty_handler))
        .route("/api/lineup", get(lineup_handler).put(reorder_handler))
        .route("/api/teams", get(list_teams_handler).post(create_team_handler))
        .route("/api/teams/{id}", get(get_team_handler))
        .route("/api/notices", get(notices_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled.
pub async fn run_api(addr: SocketAddr, state: ApiState, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Starting API server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health_handler(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        revision: state.store.revision(),
        leads: state.store.lead_count().await,
    })
}

async fn list_leads_handler(
    State(state): State<ApiState>,
    session: Session,
    Query(query): Query<ListLeadsQuery>,
) -> Json<Vec<Lead>> {
    Json(workflow::leads::visible_leads(&state.store, &session, query.status).await)
}

async fn create_lead_handler(
    State(state): State<ApiState>,
    session: Session,
    Json(payload): Json<NewLead>,
) -> Result<(StatusCode, Json<Lead>), ApiError> {
    let lead = workflow::leads::create_lead(&state.store, &session, payload).await?;
    state
        .notifier
        .success(format!("Lead for {} created", lead.customer_name));
    Ok((StatusCode::CREATED, Json(lead)))
}

async fn get_lead_handler(
    State(state): State<ApiState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> ApiResult<Lead> {
    Ok(Json(workflow::leads::get_lead(&state.store, &session, id).await?))
}

async fn delete_lead_handler(
    State(state): State<ApiState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> ApiResult<Lead> {
    Ok(Json(workflow::leads::delete_lead(&state.store, &session, id).await?))
}

async fn verify_handler(
    State(state): State<ApiState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> ApiResult<Lead> {
    Ok(Json(
        workflow::leads::verify_appointment(&state.store, &session, id).await?,
    ))
}

async fn reschedule_handler(
    State(state): State<ApiState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<RescheduleRequest>,
) -> ApiResult<Lead> {
    Ok(Json(
        workflow::leads::reschedule(&state.store, &session, id, payload.scheduled_appointment_time)
            .await?,
    ))
}

async fn accept_handler(
    State(state): State<ApiState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> ApiResult<Lead> {
    Ok(Json(workflow::leads::accept(&state.store, &session, id).await?))
}

async fn disposition_handler(
    State(state): State<ApiState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<DispositionRequest>,
) -> ApiResult<Lead> {
    Ok(Json(
        workflow::leads::record_disposition(&state.store, &session, id, payload.status).await?,
    ))
}

async fn list_closers_handler(State(state): State<ApiState>, session: Session) -> Json<Vec<Closer>> {
    Json(state.store.closers(Some(session.team_id.as_str())).await)
}

async fn register_closer_handler(
    State(state): State<ApiState>,
    session: Session,
    Json(payload): Json<NewCloser>,
) -> Result<(StatusCode, Json<Closer>), ApiError> {
    let closer = workflow::closers::register_closer(&state.store, &session, payload).await?;
    Ok((StatusCode::CREATED, Json(closer)))
}

async fn duty_handler(
    State(state): State<ApiState>,
    session: Session,
    Path(uid): Path<String>,
    Json(payload): Json<DutyRequest>,
) -> ApiResult<Closer> {
    Ok(Json(
        workflow::closers::set_duty(&state.store, &session, &uid, payload.status).await?,
    ))
}

async fn lineup_handler(State(state): State<ApiState>, session: Session) -> Json<LineupView> {
    Json(workflow::closers::team_lineup(&state.store, &session).await)
}

async fn reorder_handler(
    State(state): State<ApiState>,
    session: Session,
    Json(payload): Json<ReorderRequest>,
) -> ApiResult<LineupView> {
    Ok(Json(
        workflow::closers::reorder_lineup(&state.store, &session, &payload.order).await?,
    ))
}

async fn list_teams_handler(State(state): State<ApiState>, _session: Session) -> Json<Vec<Team>> {
    Json(state.store.teams().await)
}

async fn get_team_handler(
    State(state): State<ApiState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<Team>, ApiError> {
    Ok(Json(workflow::closers::get_team(&state.store, &session, &id).await?))
}

async fn create_team_handler(
    State(state): State<ApiState>,
    session: Session,
    Json(payload): Json<NewTeamRequest>,
) -> Result<(StatusCode, Json<Team>), ApiError> {
    let team = workflow::closers::create_team(&state.store, &session, &payload.id, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(team)))
}

/// Server-sent stream of rotation notices. Slow consumers skip what they missed.
async fn notices_handler(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.notifier.subscribe()).filter_map(|notice| {
        notice
            .ok()
            .and_then(|n| Event::default().event("notice").json_data(&n).ok())
            .map(Ok)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
