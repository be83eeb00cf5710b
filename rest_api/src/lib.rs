// rest_api/src/lib.rs
//
// Thin JSON endpoints over the ipd services. Handlers validate shape,
// forward to a service and reshape the response; every error comes back as
// `{ "error": "<message>" }` with a 4xx/5xx status.

use axum::{
    extract::{Path, Query as UrlQuery, Request, State},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;

use ipd::doctors::{DoctorService, DoctorUpdate, NewDoctor};
use ipd::expenses::{ExpenseService, ExpenseUpdate, NewExpense};
use ipd::lifecycle::{AdmissionService, AdmissionUpdate, NewAdmission};
use ipd::panels::{NewPanel, PanelService, PanelUpdate};
use ipd::patients::{NewPatient, PatientService, PatientUpdate};
use ipd::registry::{BedRegistry, BedUpdate, NewBed};
use ipd::stats::WardStatsAggregator;
use models::{Admission, AdmissionStatus, Bed, HospitalError, PanelDocumentType};
use security::{Permission, RolesConfig};
use storage_api::{BlobStore, RowStore};

mod config;
pub use config::{load_server_config, ServerConfig};

pub const ROLE_HEADER: &str = "x-role-id";

#[derive(Debug, Error)]
pub enum RestApiError {
    #[error(transparent)]
    Hospital(#[from] HospitalError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl IntoResponse for RestApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            RestApiError::Hospital(e) => {
                let status = match e {
                    HospitalError::Validation(_)
                    | HospitalError::Duplicate(_)
                    | HospitalError::BedUnavailable(_) => StatusCode::BAD_REQUEST,
                    HospitalError::NotFound(_) => StatusCode::NOT_FOUND,
                    HospitalError::PermissionDenied(_) => StatusCode::FORBIDDEN,
                    HospitalError::Storage(_) | HospitalError::Serde(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.to_string())
            }
            RestApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };
        if status.is_server_error() {
            error!(%status, "request failed: {message}");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<BedRegistry>,
    pub admissions: Arc<AdmissionService>,
    pub patients: Arc<PatientService>,
    pub panels: Arc<PanelService>,
    pub doctors: Arc<DoctorService>,
    pub expenses: Arc<ExpenseService>,
    pub stats: Arc<WardStatsAggregator>,
    pub roles: Arc<RolesConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RowStore>,
        blobs: Arc<dyn BlobStore>,
        roles: Arc<RolesConfig>,
    ) -> Self {
        AppState {
            registry: Arc::new(BedRegistry::new(store.clone())),
            admissions: Arc::new(AdmissionService::new(store.clone())),
            patients: Arc::new(PatientService::new(store.clone())),
            panels: Arc::new(PanelService::new(store.clone(), blobs)),
            doctors: Arc::new(DoctorService::new(store.clone())),
            expenses: Arc::new(ExpenseService::new(store.clone())),
            stats: WardStatsAggregator::new(store),
            roles,
        }
    }
}

// --- request payloads ------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DischargeRequest {
    discharged_at: Option<DateTime<Utc>>,
    status: AdmissionStatus,
}

#[derive(Debug, Deserialize)]
struct ShiftBedRequest {
    new_bed_id: Uuid,
    shift_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct AdmissionListParams {
    status: Option<AdmissionStatus>,
    patient_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct UploadDocumentRequest {
    document_type: PanelDocumentType,
    file_name: String,
    content_base64: String,
}

// --- misc ------------------------------------------------------------------

async fn health_handler() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn version_handler() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({ "version": env!("CARGO_PKG_VERSION") })),
    )
}

// --- beds / wards ----------------------------------------------------------

async fn list_beds(State(state): State<AppState>) -> Result<Json<Vec<Bed>>, RestApiError> {
    Ok(Json(state.registry.list().await?))
}

async fn create_bed(
    State(state): State<AppState>,
    Json(payload): Json<NewBed>,
) -> Result<(StatusCode, Json<Bed>), RestApiError> {
    let bed = state.registry.create(payload).await?;
    Ok((StatusCode::CREATED, Json(bed)))
}

async fn update_bed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BedUpdate>,
) -> Result<Json<Bed>, RestApiError> {
    Ok(Json(state.registry.update(id, payload).await?))
}

async fn delete_bed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, RestApiError> {
    state.registry.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn bed_counts(
    State(state): State<AppState>,
) -> Result<Json<ipd::BedCounts>, RestApiError> {
    Ok(Json(state.registry.counts().await?))
}

async fn available_wards(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, RestApiError> {
    Ok(Json(state.registry.available_wards().await?))
}

async fn ward_stats(
    State(state): State<AppState>,
) -> Result<Json<Vec<ipd::WardStats>>, RestApiError> {
    Ok(Json(state.stats.current().await?))
}

// --- admissions ------------------------------------------------------------

async fn list_admissions(
    State(state): State<AppState>,
    UrlQuery(params): UrlQuery<AdmissionListParams>,
) -> Result<Json<Vec<Admission>>, RestApiError> {
    Ok(Json(
        state
            .admissions
            .list(params.status, params.patient_id)
            .await?,
    ))
}

async fn create_admission(
    State(state): State<AppState>,
    Json(payload): Json<NewAdmission>,
) -> Result<(StatusCode, Json<Admission>), RestApiError> {
    let admission = state.admissions.admit(payload).await?;
    Ok((StatusCode::CREATED, Json(admission)))
}

async fn next_admission_no(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, RestApiError> {
    let number = state.admissions.next_admission_no().await?;
    Ok(Json(json!({ "admission_no": number })))
}

async fn get_admission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Admission>, RestApiError> {
    Ok(Json(state.admissions.get(id).await?))
}

async fn edit_admission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdmissionUpdate>,
) -> Result<Json<Admission>, RestApiError> {
    Ok(Json(state.admissions.edit(id, payload).await?))
}

async fn delete_admission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, RestApiError> {
    state.admissions.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn discharge_admission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DischargeRequest>,
) -> Result<Json<Admission>, RestApiError> {
    Ok(Json(
        state
            .admissions
            .discharge(id, payload.discharged_at, payload.status)
            .await?,
    ))
}

async fn shift_bed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ShiftBedRequest>,
) -> Result<Json<Admission>, RestApiError> {
    Ok(Json(
        state
            .admissions
            .shift_bed(id, payload.new_bed_id, payload.shift_time)
            .await?,
    ))
}

async fn bed_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ipd::BedHistoryView>>, RestApiError> {
    Ok(Json(state.admissions.bed_history(id).await?))
}

// --- patients ----------------------------------------------------------------

async fn list_patients(
    State(state): State<AppState>,
) -> Result<Json<Vec<models::Patient>>, RestApiError> {
    Ok(Json(state.patients.list().await?))
}

async fn create_patient(
    State(state): State<AppState>,
    Json(payload): Json<NewPatient>,
) -> Result<(StatusCode, Json<models::Patient>), RestApiError> {
    let patient = state.patients.create(payload).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

async fn get_patient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<models::Patient>, RestApiError> {
    Ok(Json(state.patients.get(id).await?))
}

async fn update_patient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PatientUpdate>,
) -> Result<Json<models::Patient>, RestApiError> {
    Ok(Json(state.patients.update(id, payload).await?))
}

async fn delete_patient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, RestApiError> {
    state.patients.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- panels ------------------------------------------------------------------

async fn list_panels(
    State(state): State<AppState>,
) -> Result<Json<Vec<models::Panel>>, RestApiError> {
    Ok(Json(state.panels.list().await?))
}

async fn create_panel(
    State(state): State<AppState>,
    Json(payload): Json<NewPanel>,
) -> Result<(StatusCode, Json<models::Panel>), RestApiError> {
    let panel = state.panels.create(payload).await?;
    Ok((StatusCode::CREATED, Json(panel)))
}

async fn get_panel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<models::Panel>, RestApiError> {
    Ok(Json(state.panels.get(id).await?))
}

async fn update_panel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PanelUpdate>,
) -> Result<Json<models::Panel>, RestApiError> {
    Ok(Json(state.panels.update(id, payload).await?))
}

async fn delete_panel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, RestApiError> {
    state.panels.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_panel_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UploadDocumentRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), RestApiError> {
    let bytes = BASE64
        .decode(payload.content_base64.as_bytes())
        .map_err(|e| RestApiError::InvalidInput(format!("content is not valid base64: {e}")))?;
    let url = state
        .panels
        .upload_document(id, payload.document_type, &payload.file_name, bytes)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "url": url }))))
}

async fn panel_document_url(
    State(state): State<AppState>,
    Path((id, doc_type)): Path<(Uuid, String)>,
) -> Result<Json<serde_json::Value>, RestApiError> {
    let doc_type: PanelDocumentType = doc_type.parse().map_err(RestApiError::Hospital)?;
    let url = state.panels.document_url(id, doc_type).await?;
    Ok(Json(json!({ "url": url })))
}

// --- doctors -----------------------------------------------------------------

async fn list_doctors(
    State(state): State<AppState>,
) -> Result<Json<Vec<models::Doctor>>, RestApiError> {
    Ok(Json(state.doctors.list().await?))
}

async fn create_doctor(
    State(state): State<AppState>,
    Json(payload): Json<NewDoctor>,
) -> Result<(StatusCode, Json<models::Doctor>), RestApiError> {
    let doctor = state.doctors.create(payload).await?;
    Ok((StatusCode::CREATED, Json(doctor)))
}

async fn update_doctor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DoctorUpdate>,
) -> Result<Json<models::Doctor>, RestApiError> {
    Ok(Json(state.doctors.update(id, payload).await?))
}

async fn delete_doctor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, RestApiError> {
    state.doctors.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- expenses ----------------------------------------------------------------

async fn list_expenses(
    State(state): State<AppState>,
) -> Result<Json<Vec<models::Expense>>, RestApiError> {
    Ok(Json(state.expenses.list().await?))
}

async fn create_expense(
    State(state): State<AppState>,
    Json(payload): Json<NewExpense>,
) -> Result<(StatusCode, Json<models::Expense>), RestApiError> {
    let expense = state.expenses.create(payload).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

async fn update_expense(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ExpenseUpdate>,
) -> Result<Json<models::Expense>, RestApiError> {
    Ok(Json(state.expenses.update(id, payload).await?))
}

async fn delete_expense(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, RestApiError> {
    state.expenses.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- permissions -------------------------------------------------------------

/// Which permission a request needs, from its route group and method.
/// `None` means the route is open (health/version).
fn required_permission(method: &Method, path: &str) -> Option<Permission> {
    let rest = path.strip_prefix("/api/v1/")?;
    let group = rest.split('/').next().unwrap_or("");
    let mutating = *method != Method::GET;
    match group {
        "health" | "version" => None,
        "beds" => Some(if mutating {
            Permission::ManageBeds
        } else {
            Permission::ViewBeds
        }),
        "wards" => Some(Permission::ViewReports),
        "admissions" => Some(if mutating {
            Permission::ManageAdmissions
        } else {
            Permission::ViewAdmissions
        }),
        "patients" => Some(if mutating {
            Permission::ManagePatients
        } else {
            Permission::ViewPatients
        }),
        "panels" => Some(if mutating {
            Permission::ManagePanels
        } else {
            Permission::ViewPanels
        }),
        "doctors" => Some(if mutating {
            Permission::ManageDoctors
        } else {
            Permission::ViewDoctors
        }),
        "expenses" => Some(if mutating {
            Permission::ManageExpenses
        } else {
            Permission::ViewExpenses
        }),
        _ => None,
    }
}

async fn permission_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(permission) = required_permission(req.method(), req.uri().path()) else {
        return next.run(req).await;
    };
    let role_id = req
        .headers()
        .get(ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u32>().ok());
    match role_id {
        Some(id) if state.roles.has_permission(id, permission) => next.run(req).await,
        _ => RestApiError::Hospital(HospitalError::PermissionDenied(format!(
            "{} {}",
            req.method(),
            req.uri().path()
        )))
        .into_response(),
    }
}

// --- router / server -----------------------------------------------------------

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/version", get(version_handler))
        .route("/api/v1/beds", get(list_beds).post(create_bed))
        .route("/api/v1/beds/counts", get(bed_counts))
        .route("/api/v1/beds/:id", axum::routing::put(update_bed).delete(delete_bed))
        .route("/api/v1/wards", get(available_wards))
        .route("/api/v1/wards/stats", get(ward_stats))
        .route("/api/v1/admissions", get(list_admissions).post(create_admission))
        .route("/api/v1/admissions/next-number", get(next_admission_no))
        .route(
            "/api/v1/admissions/:id",
            get(get_admission).put(edit_admission).delete(delete_admission),
        )
        .route("/api/v1/admissions/:id/discharge", axum::routing::post(discharge_admission))
        .route("/api/v1/admissions/:id/shift-bed", axum::routing::post(shift_bed))
        .route("/api/v1/admissions/:id/bed-history", get(bed_history))
        .route("/api/v1/patients", get(list_patients).post(create_patient))
        .route(
            "/api/v1/patients/:id",
            get(get_patient).put(update_patient).delete(delete_patient),
        )
        .route("/api/v1/panels", get(list_panels).post(create_panel))
        .route(
            "/api/v1/panels/:id",
            get(get_panel).put(update_panel).delete(delete_panel),
        )
        .route("/api/v1/panels/:id/documents", axum::routing::post(upload_panel_document))
        .route("/api/v1/panels/:id/documents/:doc_type", get(panel_document_url))
        .route("/api/v1/doctors", get(list_doctors).post(create_doctor))
        .route(
            "/api/v1/doctors/:id",
            axum::routing::put(update_doctor).delete(delete_doctor),
        )
        .route("/api/v1/expenses", get(list_expenses).post(create_expense))
        .route(
            "/api/v1/expenses/:id",
            axum::routing::put(update_expense).delete(delete_expense),
        )
        .layer(middleware::from_fn_with_state(state.clone(), permission_middleware))
        .with_state(state)
}

/// Binds and serves until `shutdown_rx` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: AppState,
    shutdown_rx: oneshot::Receiver<()>,
) -> Result<(), anyhow::Error> {
    use anyhow::Context;

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
        .allow_origin(Any);

    let router = app(state).layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!("IPD admin API listening on {addr}");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
            info!("shutdown signal received");
        })
        .await
        .context("server failed")?;

    info!("server stopped");
    Ok(())
}
