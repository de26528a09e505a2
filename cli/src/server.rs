use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

use heft_core::goals::GoalProfile;
use heft_core::macro_cycle::{PlannedDay, ResolvedTargets};
use heft_core::models::{
    DatedTargets, DayTargets, DayType, MacroCycleConfig, MacroOverride, PatternType, WeightEntry,
    parse_date, validate_cycle_config, validate_day_of_week, validate_day_targets, validate_weight_kg,
};
use heft_core::service::{self, HeftService};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<HeftService>>,
}

impl AppState {
    fn svc(&self) -> MutexGuard<'_, HeftService> {
        self.svc
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CreateWeightRequest {
    date: String,
    weight_kg: f64,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct WeightHistoryQuery {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Deserialize)]
struct RecomputeRequest {
    from: Option<String>,
}

#[derive(Serialize)]
struct CountResponse {
    count: usize,
}

/// Base targets passed as query parameters. All four or none.
#[derive(Deserialize)]
struct BaseQuery {
    calories: Option<i64>,
    protein: Option<f64>,
    carbs: Option<f64>,
    fat: Option<f64>,
}

#[derive(Serialize)]
struct DateTargetsResponse {
    date: String,
    #[serde(flatten)]
    resolved: ResolvedTargets,
}

#[derive(Serialize)]
struct DayTypeResponse {
    day_of_week: u8,
    day_type: Option<DayType>,
}

#[derive(Deserialize)]
struct OverrideListQuery {
    from: Option<String>,
}

#[derive(Deserialize)]
struct RedistributeRequest {
    date: Option<String>,
    #[serde(default)]
    intake: BTreeMap<NaiveDate, DayTargets>,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Serialize)]
struct RedistributeResponse {
    applied: bool,
    days: Vec<DatedTargets>,
}

#[derive(Serialize)]
struct GoalResponse {
    profile: GoalProfile,
    bmr: f64,
    tdee: f64,
    base_targets: DayTargets,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn bad_request(err: anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err:#}"))
}

fn parse_date_param(s: &str) -> Result<String, ApiError> {
    parse_date(s)
        .map(|d| d.to_string())
        .map_err(bad_request)
}

impl BaseQuery {
    fn targets(&self) -> Result<Option<DayTargets>, ApiError> {
        match (self.calories, self.protein, self.carbs, self.fat) {
            (None, None, None, None) => Ok(None),
            (Some(calories), Some(protein), Some(carbs), Some(fat)) => {
                let t = DayTargets::new(calories, protein, carbs, fat);
                validate_day_targets(&t).map_err(bad_request)?;
                Ok(Some(t))
            }
            _ => Err(ApiError::BadRequest(
                "Base targets need calories, protein, carbs and fat together".to_string(),
            )),
        }
    }

    /// The query's targets, else the stored base targets.
    fn resolve(&self, svc: &HeftService) -> Result<DayTargets, ApiError> {
        if let Some(t) = self.targets()? {
            return Ok(t);
        }
        svc.base_targets()
            .context("failed to load base targets")?
            .ok_or_else(|| {
                ApiError::BadRequest(
                    "No base targets. Pass calories, protein, carbs and fat, or set a goal"
                        .to_string(),
                )
            })
    }
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Weight handlers ---

async fn create_weight(
    State(state): State<AppState>,
    Json(req): Json<CreateWeightRequest>,
) -> Result<(StatusCode, Json<WeightEntry>), ApiError> {
    let date = parse_date_param(&req.date)?;
    validate_weight_kg(req.weight_kg).map_err(bad_request)?;

    let entry = state
        .svc()
        .log_weight(&date, req.weight_kg, req.notes)
        .context("failed to upsert weight")?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn get_weight(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
) -> Result<Json<WeightEntry>, ApiError> {
    let date = parse_date_param(&date_str)?;

    let entry = state
        .svc()
        .get_weight(&date)
        .context("database error")?
        .ok_or_else(|| ApiError::NotFound(format!("No weight entry for {date}")))?;
    Ok(Json(entry))
}

async fn get_weight_history(
    State(state): State<AppState>,
    Query(params): Query<WeightHistoryQuery>,
) -> Result<Json<Vec<WeightEntry>>, ApiError> {
    let start = params
        .start
        .as_deref()
        .map(parse_date)
        .transpose()
        .map_err(bad_request)?;
    let end = params
        .end
        .as_deref()
        .map(parse_date)
        .transpose()
        .map_err(bad_request)?;

    let mut entries = state
        .svc()
        .get_weight_history(None)
        .context("database error")?;

    if let Some(start) = start {
        entries.retain(|e| e.date >= start);
    }
    if let Some(end) = end {
        entries.retain(|e| e.date <= end);
    }

    Ok(Json(entries))
}

async fn delete_weight(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let svc = state.svc();
    if svc.get_weight_by_id(id).context("database error")?.is_none() {
        return Err(ApiError::NotFound(format!("Weight entry {id} not found")));
    }
    svc.delete_weight(id).context("failed to delete weight")?;
    Ok(StatusCode::NO_CONTENT)
}

async fn recompute_trends(
    State(state): State<AppState>,
    Json(req): Json<RecomputeRequest>,
) -> Result<Json<CountResponse>, ApiError> {
    let from = req.from.as_deref().map(parse_date_param).transpose()?;
    let count = state
        .svc()
        .recompute_trends(from.as_deref())
        .context("failed to recompute trends")?;
    Ok(Json(CountResponse { count }))
}

// --- Target handlers ---

async fn get_targets(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
    Query(base): Query<BaseQuery>,
) -> Result<Json<DateTargetsResponse>, ApiError> {
    let date = parse_date_param(&date_str)?;
    let svc = state.svc();
    let base = base.resolve(&svc)?;
    let resolved = svc
        .resolve_targets(&date, &base)
        .context("failed to resolve targets")?;
    Ok(Json(DateTargetsResponse { date, resolved }))
}

async fn get_week_targets(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
    Query(base): Query<BaseQuery>,
) -> Result<Json<Vec<PlannedDay>>, ApiError> {
    let date = parse_date_param(&date_str)?;
    let svc = state.svc();
    let base = base.resolve(&svc)?;
    let plan = svc
        .week_plan(&date, &base)
        .context("failed to plan week")?;
    Ok(Json(plan))
}

async fn get_base_targets(State(state): State<AppState>) -> Result<Json<DayTargets>, ApiError> {
    let targets = state
        .svc()
        .base_targets()
        .context("failed to load base targets")?
        .ok_or_else(|| ApiError::NotFound("No base targets set".to_string()))?;
    Ok(Json(targets))
}

async fn set_base_targets(
    State(state): State<AppState>,
    Json(targets): Json<DayTargets>,
) -> Result<Json<DayTargets>, ApiError> {
    validate_day_targets(&targets).map_err(bad_request)?;
    state
        .svc()
        .set_base_targets(&targets)
        .context("failed to save base targets")?;
    Ok(Json(targets))
}

async fn delete_base_targets(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    if state
        .svc()
        .clear_base_targets()
        .context("failed to clear base targets")?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("No base targets set".to_string()))
    }
}

// --- Cycle handlers ---

async fn get_cycle(State(state): State<AppState>) -> Result<Json<MacroCycleConfig>, ApiError> {
    let config = state
        .svc()
        .get_cycle_config()
        .context("failed to load cycle config")?;
    Ok(Json(config))
}

async fn put_cycle(
    State(state): State<AppState>,
    Json(config): Json<MacroCycleConfig>,
) -> Result<Json<MacroCycleConfig>, ApiError> {
    validate_cycle_config(&config).map_err(bad_request)?;
    let saved = state
        .svc()
        .save_cycle_config(&config)
        .context("failed to save cycle config")?;
    Ok(Json(saved))
}

async fn get_cycle_average(State(state): State<AppState>) -> Result<Json<DayTargets>, ApiError> {
    let avg = state
        .svc()
        .calculate_weekly_average()
        .context("failed to average cycle targets")?;
    Ok(Json(avg))
}

async fn get_day_type(
    State(state): State<AppState>,
    Path(day_of_week): Path<u8>,
) -> Result<Json<DayTypeResponse>, ApiError> {
    validate_day_of_week(day_of_week).map_err(bad_request)?;
    let day_type = state
        .svc()
        .get_day_type(day_of_week)
        .context("failed to load day type")?;
    Ok(Json(DayTypeResponse {
        day_of_week,
        day_type,
    }))
}

// --- Override handlers ---

async fn list_overrides(
    State(state): State<AppState>,
    Query(params): Query<OverrideListQuery>,
) -> Result<Json<Vec<MacroOverride>>, ApiError> {
    let from = params.from.as_deref().map(parse_date_param).transpose()?;
    let overrides = state
        .svc()
        .list_overrides(from.as_deref())
        .context("failed to list overrides")?;
    Ok(Json(overrides))
}

async fn get_override(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
) -> Result<Json<MacroOverride>, ApiError> {
    let date = parse_date_param(&date_str)?;
    let o = state
        .svc()
        .get_override(&date)
        .context("database error")?
        .ok_or_else(|| ApiError::NotFound(format!("No override for {date}")))?;
    Ok(Json(o))
}

async fn set_override(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
    Json(targets): Json<DayTargets>,
) -> Result<Json<MacroOverride>, ApiError> {
    let date = parse_date_param(&date_str)?;
    validate_day_targets(&targets).map_err(bad_request)?;
    let saved = state
        .svc()
        .set_override(&date, &targets)
        .context("failed to save override")?;
    Ok(Json(saved))
}

async fn delete_override(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
) -> Result<StatusCode, ApiError> {
    let date = parse_date_param(&date_str)?;
    if state
        .svc()
        .clear_override(&date)
        .context("failed to clear override")?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No override for {date}")))
    }
}

async fn save_override_batch(
    State(state): State<AppState>,
    Json(items): Json<Vec<DatedTargets>>,
) -> Result<Json<CountResponse>, ApiError> {
    for item in &items {
        validate_day_targets(&item.targets)
            .with_context(|| format!("Invalid targets for {}", item.date))
            .map_err(bad_request)?;
    }
    let count = state
        .svc()
        .save_redistribution_overrides(&items)
        .context("failed to save overrides")?;
    Ok(Json(CountResponse { count }))
}

async fn redistribute(
    State(state): State<AppState>,
    Json(req): Json<RedistributeRequest>,
) -> Result<Json<RedistributeResponse>, ApiError> {
    let today = match req.date {
        Some(ref d) => parse_date_param(d)?,
        None => service::today().to_string(),
    };
    let svc = state.svc();
    if svc
        .base_targets()
        .context("failed to load base targets")?
        .is_none()
    {
        return Err(ApiError::BadRequest(
            "No base targets. Set base targets or a goal first".to_string(),
        ));
    }
    if !req.dry_run {
        let config = svc
            .get_cycle_config()
            .context("failed to load cycle config")?;
        if !config.enabled || config.pattern_type != PatternType::Redistribution {
            return Err(ApiError::BadRequest(
                "Redistribution is not active. Enable the redistribution pattern first"
                    .to_string(),
            ));
        }
    }

    let days = if req.dry_run {
        svc.plan_redistribution(&today, &req.intake)
    } else {
        svc.apply_redistribution(&today, &req.intake)
    }
    .context("failed to redistribute")?;

    Ok(Json(RedistributeResponse {
        applied: !req.dry_run,
        days,
    }))
}

// --- Goal handlers ---

fn goal_response(profile: GoalProfile) -> Result<GoalResponse, ApiError> {
    let base_targets = profile.base_targets().map_err(bad_request)?;
    Ok(GoalResponse {
        bmr: profile.bmr(),
        tdee: profile.tdee(),
        base_targets,
        profile,
    })
}

async fn get_goal(State(state): State<AppState>) -> Result<Json<GoalResponse>, ApiError> {
    let profile = state
        .svc()
        .get_goal_profile()
        .context("failed to load goal profile")?
        .ok_or_else(|| ApiError::NotFound("No goal profile set".to_string()))?;
    Ok(Json(goal_response(profile)?))
}

async fn put_goal(
    State(state): State<AppState>,
    Json(profile): Json<GoalProfile>,
) -> Result<Json<GoalResponse>, ApiError> {
    profile.validate().map_err(bad_request)?;
    state
        .svc()
        .set_goal_profile(&profile)
        .context("failed to save goal profile")?;
    Ok(Json(goal_response(profile)?))
}

async fn delete_goal(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    if state
        .svc()
        .clear_goal_profile()
        .context("failed to clear goal profile")?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("No goal profile set".to_string()))
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/weight", post(create_weight).get(get_weight_history))
        .route("/api/weight/recompute", post(recompute_trends))
        .route("/api/weight/{date}", get(get_weight))
        .route("/api/weight/entry/{id}", delete(delete_weight))
        .route("/api/targets/{date}", get(get_targets))
        .route("/api/targets/week/{date}", get(get_week_targets))
        .route(
            "/api/base-targets",
            get(get_base_targets)
                .put(set_base_targets)
                .delete(delete_base_targets),
        )
        .route("/api/cycle", get(get_cycle).put(put_cycle))
        .route("/api/cycle/average", get(get_cycle_average))
        .route("/api/cycle/day-type/{dow}", get(get_day_type))
        .route("/api/overrides", get(list_overrides))
        .route("/api/overrides/batch", post(save_override_batch))
        .route(
            "/api/overrides/{date}",
            get(get_override).put(set_override).delete(delete_override),
        )
        .route("/api/redistribute", post(redistribute))
        .route("/api/goal", get(get_goal).put(put_goal).delete(delete_goal))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(svc: HeftService, port: u16, bind: &str) -> anyhow::Result<()> {
    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
    };
    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        eprintln!(
            "Warning: Listening on {bind}. Any device on your network can read and change your data."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!(%bind, port, "api listening");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
