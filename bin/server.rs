// Center Collections - Web Server
// REST API over the collection ledger (Axum)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use center_collections::schedule::parse_date;
use center_collections::{
    CenterFilter, CollectionLedger, DenominationBreakdown, LedgerConfig, LedgerError,
    PaymentInput, ScheduleEntry,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    ledger: Arc<Mutex<CollectionLedger>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }
}

/// Error leaving a handler; business errors carry their own status
enum ApiError {
    Ledger(LedgerError),
    Internal(String),
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError::Ledger(e)
    }
}

fn status_for(e: &LedgerError) -> StatusCode {
    match e {
        LedgerError::ReconciliationMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::InvalidInput(_)
        | LedgerError::EmptyBatch
        | LedgerError::UnknownScheduleEntry { .. } => StatusCode::BAD_REQUEST,
        LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
        LedgerError::ActivationPrecondition { .. } | LedgerError::DuplicatePayment { .. } => {
            StatusCode::CONFLICT
        }
        LedgerError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        LedgerError::Storage(_) | LedgerError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Ledger(LedgerError::ActivationPrecondition { center_id, missing }) => {
                // Field staff need the names, not just a count
                let message = format!("{} members have no saved schedule", missing.len());
                let body = ApiResponse {
                    success: false,
                    data: Some(serde_json::json!({ "center_id": center_id, "missing": missing })),
                    error: Some(message),
                    code: Some("activation_precondition"),
                };
                (StatusCode::CONFLICT, Json(body)).into_response()
            }
            ApiError::Ledger(e) => {
                let status = status_for(&e);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(error = %e, "ledger failure");
                }
                let body = ApiResponse::<()> {
                    success: false,
                    data: None,
                    error: Some(e.to_string()),
                    code: Some(e.code()),
                };
                (status, Json(body)).into_response()
            }
            ApiError::Internal(message) => {
                error!(%message, "internal error");
                let body = ApiResponse::<()> {
                    success: false,
                    data: None,
                    error: Some(message),
                    code: Some("internal"),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Run ledger work off the async runtime, holding the ledger lock
async fn with_ledger<T, F>(state: &AppState, work: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut CollectionLedger) -> Result<T, LedgerError> + Send + 'static,
{
    let ledger = state.ledger.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut guard = ledger
            .lock()
            .map_err(|_| ApiError::Internal("ledger lock poisoned".to_string()))?;
        work(&mut *guard).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("worker failed: {}", e)))?;

    result.map(|data| Json(ApiResponse::ok(data)))
}

#[derive(Deserialize)]
struct DateQuery {
    date: Option<String>,
}

impl DateQuery {
    fn day(&self) -> Result<NaiveDate, LedgerError> {
        match self.date.as_deref() {
            Some(text) => parse_date(text),
            None => Ok(Utc::now().date_naive()),
        }
    }
}

#[derive(Deserialize)]
struct FirstDateBody {
    first_collection_date: String,
}

/// Body of POST /api/collections/schedule: the flat rows of a drafted schedule
#[derive(Deserialize)]
struct SaveScheduleBody {
    rows: Vec<ScheduleEntry>,
    /// When present, the center is activated after the rows are saved
    center_id: Option<i64>,
}

#[derive(Serialize)]
struct SaveScheduleResponse {
    saved: usize,
    activated: Option<bool>,
}

#[derive(Deserialize)]
struct PayBatchBody {
    collection: Vec<PaymentInput>,
    denomination: DenominationBreakdown,
    date: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Serialize)]
struct DailyResponse {
    date: NaiveDate,
    total: i64,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/centers
async fn get_centers(State(state): State<AppState>) -> impl IntoResponse {
    with_ledger(&state, |l| l.list_centers(CenterFilter::All)).await
}

/// GET /api/centers/active - centers field staff can collect at
async fn get_active_centers(State(state): State<AppState>) -> impl IntoResponse {
    with_ledger(&state, |l| l.list_centers(CenterFilter::Active)).await
}

/// GET /api/centers/inactive - centers still waiting for schedules
async fn get_inactive_centers(State(state): State<AppState>) -> impl IntoResponse {
    with_ledger(&state, |l| l.list_centers(CenterFilter::Inactive)).await
}

/// PUT /api/centers/:id/activate
async fn activate_center(
    State(state): State<AppState>,
    Path(center_id): Path<i64>,
) -> impl IntoResponse {
    with_ledger(&state, move |l| l.activate_center(center_id)).await
}

/// POST /api/centers/:id/schedule - generate, save and activate in one call
async fn schedule_center(
    State(state): State<AppState>,
    Path(center_id): Path<i64>,
    Json(body): Json<FirstDateBody>,
) -> impl IntoResponse {
    with_ledger(&state, move |l| {
        l.schedule_and_activate(center_id, &body.first_collection_date)
    })
    .await
}

/// GET /api/members/:center_id - members with their current CREDITED loan
async fn get_center_members(
    State(state): State<AppState>,
    Path(center_id): Path<i64>,
) -> impl IntoResponse {
    with_ledger(&state, move |l| l.active_loans(center_id)).await
}

/// GET /api/member/:id
async fn get_member(State(state): State<AppState>, Path(member_id): Path<i64>) -> impl IntoResponse {
    with_ledger(&state, move |l| l.member_details(member_id)).await
}

/// GET /api/collections/:member_id - a member's loans
async fn get_member_loans(
    State(state): State<AppState>,
    Path(member_id): Path<i64>,
) -> impl IntoResponse {
    with_ledger(&state, move |l| l.member_loans(member_id)).await
}

/// GET /api/loans/:id/schedule
async fn get_loan_schedule(
    State(state): State<AppState>,
    Path(loan_id): Path<i64>,
) -> impl IntoResponse {
    with_ledger(&state, move |l| l.loan_schedule(loan_id)).await
}

/// GET /api/collections/sheet/:center_id?date=YYYY-MM-DD
async fn get_collection_sheet(
    State(state): State<AppState>,
    Path(center_id): Path<i64>,
    Query(query): Query<DateQuery>,
) -> impl IntoResponse {
    with_ledger(&state, move |l| {
        let day = query.day()?;
        l.collection_sheet(center_id, day)
    })
    .await
}

/// POST /api/collections/schedule - persist drafted rows, grouped per loan
async fn save_schedule(
    State(state): State<AppState>,
    Json(body): Json<SaveScheduleBody>,
) -> impl IntoResponse {
    with_ledger(&state, move |l| {
        let mut by_loan: BTreeMap<i64, Vec<ScheduleEntry>> = BTreeMap::new();
        for row in body.rows {
            by_loan.entry(row.loan_id).or_default().push(row);
        }
        let schedules: Vec<Vec<ScheduleEntry>> = by_loan.into_values().collect();

        let saved = l.save_schedules(&schedules)?;
        let activated = match body.center_id {
            Some(center_id) => Some(l.activate_center(center_id)?.activated),
            None => None,
        };
        Ok(SaveScheduleResponse { saved, activated })
    })
    .await
}

/// POST /api/collections/pay-batch
async fn pay_batch(
    State(state): State<AppState>,
    Json(body): Json<PayBatchBody>,
) -> impl IntoResponse {
    with_ledger(&state, move |l| {
        let day = match body.date.as_deref() {
            Some(text) => parse_date(text)?,
            None => Utc::now().date_naive(),
        };
        l.submit_collection_batch(
            &body.collection,
            &body.denomination,
            day,
            body.timeout_ms.map(std::time::Duration::from_millis),
        )
    })
    .await
}

/// GET /api/collections/daily?date=YYYY-MM-DD
async fn get_daily(State(state): State<AppState>, Query(query): Query<DateQuery>) -> impl IntoResponse {
    with_ledger(&state, move |l| {
        let date = query.day()?;
        let total = l.daily_total(date)?;
        Ok(DailyResponse { date, total })
    })
    .await
}

/// GET /api/collections/unpaid-mobile?date=YYYY-MM-DD
async fn get_unpaid(State(state): State<AppState>, Query(query): Query<DateQuery>) -> impl IntoResponse {
    with_ledger(&state, move |l| {
        let day = query.day()?;
        l.unpaid_today(day)
    })
    .await
}

// ============================================================================
// Main Server
// ============================================================================

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/centers", get(get_centers))
        .route("/centers/active", get(get_active_centers))
        .route("/centers/inactive", get(get_inactive_centers))
        .route("/centers/:id/activate", put(activate_center))
        .route("/centers/:id/schedule", post(schedule_center))
        .route("/members/:center_id", get(get_center_members))
        .route("/member/:id", get(get_member))
        .route("/loans/:id/schedule", get(get_loan_schedule))
        .route("/collections/schedule", post(save_schedule))
        .route("/collections/pay-batch", post(pay_batch))
        .route("/collections/daily", get(get_daily))
        .route("/collections/unpaid-mobile", get(get_unpaid))
        .route("/collections/sheet/:center_id", get(get_collection_sheet))
        .route("/collections/:member_id", get(get_member_loans))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = LedgerConfig::load(config_path.as_deref())?;
    let addr = config.bind_addr.clone();

    let ledger = CollectionLedger::open(config)?;
    info!(db = %ledger.config().database_path.display(), "database opened");

    let state = AppState {
        ledger: Arc::new(Mutex::new(ledger)),
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "collections server listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
