use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use parcelflow_broker::{
    EndpointAddress, EpisodeFinalisationStatus, PublisherRegistration,
    PublisherSubscriptionRegistration, RemoteConnectionStatus, Subscription,
};
use parcelflow_core::{
    DataParcelManifest, EpisodeId, FunctionToken, Participant, Task, TaskId, TaskLineage,
    TaskPayload,
};

use crate::{error::ApiError, metrics, server::AppState};

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    pub status: &'a str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn metrics_text(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    if !state.metrics_enabled {
        return Err(ApiError::not_found("metrics are disabled"));
    }
    let body = metrics::render_metrics()
        .ok_or_else(|| ApiError::unavailable("metrics recorder not installed"))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

// =============================================================================
// Subscriptions
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub manifest: DataParcelManifest,
    pub subscriber: Participant,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub subscriber: Participant,
    pub endpoint: EndpointAddress,
    pub connection_status: RemoteConnectionStatus,
}

pub async fn add_subscription(
    State(state): State<AppState>,
    Json(req): Json<SubscriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .subscriptions
        .add_subscriber(&req.manifest, &req.subscriber)?;

    // A subscriber always has somewhere to receive into
    let endpoint = state.transport.endpoint_for(&req.subscriber);
    state.transport.ensure_mailbox(&endpoint);

    let connection_status = state.subscriptions.connection_status(&req.subscriber);
    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse {
            subscriber: req.subscriber,
            endpoint,
            connection_status,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: bool,
}

pub async fn remove_subscription(
    State(state): State<AppState>,
    Json(req): Json<SubscriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state
        .subscriptions
        .remove_subscriber(&req.manifest, &req.subscriber)?;
    Ok((StatusCode::OK, Json(RemovedResponse { removed })))
}

pub async fn list_subscriptions(State(state): State<AppState>) -> Json<Vec<Subscription>> {
    Json(state.subscriptions.all_subscriptions())
}

pub async fn match_subscribers(
    State(state): State<AppState>,
    Json(manifest): Json<DataParcelManifest>,
) -> Result<Json<Vec<Participant>>, ApiError> {
    manifest.validate()?;
    Ok(Json(state.subscriptions.derive_subscriber_list(&manifest)))
}

// =============================================================================
// Publishers
// =============================================================================

pub async fn register_publisher(
    State(state): State<AppState>,
    Json(participant): Json<Participant>,
) -> Result<Json<PublisherRegistration>, ApiError> {
    Ok(Json(
        state.publishers.register_publisher_instance(&participant)?,
    ))
}

pub async fn list_publishers(State(state): State<AppState>) -> Json<Vec<PublisherRegistration>> {
    Json(state.publishers.publisher_registrations())
}

pub async fn unregister_publisher(
    State(state): State<AppState>,
    Path(instance): Path<String>,
) -> Result<Json<PublisherRegistration>, ApiError> {
    state
        .publishers
        .unregister_publisher_instance(&instance)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("publisher instance {instance}")))
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityRequest {
    #[serde(default)]
    pub commentary: Option<String>,
}

pub async fn touch_publisher(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Json(req): Json<ActivityRequest>,
) -> Result<Json<PublisherRegistration>, ApiError> {
    if !state.publishers.touch_publisher(&instance, req.commentary) {
        return Err(ApiError::not_found(format!("publisher instance {instance}")));
    }
    state
        .publishers
        .get_publisher_registration(&instance)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("publisher instance {instance}")))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProvidersResponse {
    pub service_name: String,
    pub instances: Vec<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<PublisherSubscriptionRegistration>,
}

pub async fn service_providers(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Json<ServiceProvidersResponse> {
    Json(ServiceProvidersResponse {
        instances: state
            .publishers
            .get_publisher_service_provider_instances(&service),
        subscription: state.publishers.get_publisher_subscription(&service),
        service_name: service,
    })
}

pub async fn subscribe_to_publisher(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Json(manifests): Json<Vec<DataParcelManifest>>,
) -> Result<Json<PublisherSubscriptionRegistration>, ApiError> {
    Ok(Json(
        state
            .publishers
            .add_subscription_to_publisher(&manifests, &service)?,
    ))
}

pub async fn list_publisher_subscriptions(
    State(state): State<AppState>,
) -> Json<Vec<PublisherSubscriptionRegistration>> {
    Json(state.publishers.publisher_subscriptions())
}

// =============================================================================
// Distribution
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributeRequest {
    #[serde(default)]
    pub egress: Option<TaskPayload>,
    /// Continue an existing lineage instead of starting a fresh one
    #[serde(default)]
    pub lineage: Option<TaskLineage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributeResponse {
    pub task_id: TaskId,
    pub delivered: Vec<EndpointAddress>,
}

pub async fn distribute_task(
    State(state): State<AppState>,
    Json(req): Json<DistributeRequest>,
) -> Json<DistributeResponse> {
    let mut task = Task::new(req.egress);
    if let Some(lineage) = req.lineage {
        task = task.with_lineage(lineage);
    }
    let delivered = state.distributor.distribute_task(&task);
    Json(DistributeResponse {
        task_id: task.task_id,
        delivered,
    })
}

// =============================================================================
// Episodes
// =============================================================================

pub async fn list_episodes(State(state): State<AppState>) -> Json<Vec<EpisodeId>> {
    let mut episodes = state.finalisation.get_episode_list();
    episodes.sort();
    Json(episodes)
}

pub async fn get_episode(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EpisodeFinalisationStatus>, ApiError> {
    state
        .finalisation
        .episode_status(&EpisodeId::new(id.as_str()))
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("episode {id}")))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalisationResponse {
    pub episode_id: EpisodeId,
    pub finalised: bool,
}

pub async fn episode_finalisation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<FinalisationResponse> {
    let episode_id = EpisodeId::new(id);
    let finalised = state.finalisation.check_for_episode_finalisation(&episode_id);
    Json(FinalisationResponse {
        episode_id,
        finalised,
    })
}

#[derive(Debug, Deserialize)]
pub struct InterestRequest {
    pub function: FunctionToken,
}

pub async fn register_interest(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<InterestRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .finalisation
        .register_downstream_wup_interest(&EpisodeId::new(id), &req.function)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamRequest {
    pub function: FunctionToken,
    pub downstream_episode_id: EpisodeId,
}

pub async fn register_downstream(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DownstreamRequest>,
) -> Result<StatusCode, ApiError> {
    state.finalisation.register_downstream_episode_id(
        &EpisodeId::new(id),
        &req.function,
        &req.downstream_episode_id,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_episode(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.finalisation.remove_episode(&EpisodeId::new(id.as_str())) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("episode {id}")))
    }
}

// =============================================================================
// Mailboxes
// =============================================================================

#[derive(Debug, Serialize)]
pub struct MailboxSummary {
    pub endpoint: EndpointAddress,
    pub queued: usize,
}

pub async fn list_mailboxes(State(state): State<AppState>) -> Json<Vec<MailboxSummary>> {
    Json(
        state
            .transport
            .mailboxes()
            .into_iter()
            .map(|(endpoint, queued)| MailboxSummary { endpoint, queued })
            .collect(),
    )
}

pub async fn open_mailbox(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
) -> Result<StatusCode, ApiError> {
    if endpoint.trim().is_empty() {
        return Err(ApiError::bad_request("mailbox name is empty"));
    }
    state.transport.ensure_mailbox(&EndpointAddress::new(endpoint));
    Ok(StatusCode::CREATED)
}

pub async fn close_mailbox(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state
        .transport
        .close_mailbox(&EndpointAddress::new(endpoint.as_str()))
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("mailbox {endpoint}")))
    }
}

#[derive(Debug, Deserialize)]
pub struct DrainParams {
    #[serde(default = "default_drain_max")]
    pub max: usize,
}

fn default_drain_max() -> usize {
    100
}

pub async fn drain_mailbox(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    Query(params): Query<DrainParams>,
) -> Result<Json<Vec<Task>>, ApiError> {
    state
        .transport
        .drain(&EndpointAddress::new(endpoint.as_str()), params.max)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("mailbox {endpoint}")))
}
