//! Self-contained simulation backend for offline play and integration tests.
//!
//! Serves synthetic, deterministic rasters and a toy turn rule: every
//! irrigated cell gains NDVI and soil moisture and draws down water.

use std::{
    collections::{BTreeMap, HashMap},
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    gateway::{
        CellDelta, DeltaSet, Kpis, NewGameRequest, NewGameResponse, PlanPayload, RunSummary,
        TurnRequest, TurnResponse,
    },
    layer::Layer,
    raster::{LayerField, RasterImage},
};

const NDVI_GAIN: f32 = 0.02;
const SOIL_GAIN: f32 = 0.01;
const WATER_DRAW: f32 = -0.02;
const COVER_SOIL_GAIN: f32 = 0.005;
const IRRIGATION_COST: f64 = 15.0;

#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub host: String,
    pub port: u16,
    pub grid_width: u32,
    pub grid_height: u32,
    pub years: Vec<i32>,
    /// Layers answered with 404, to exercise the placeholder path.
    pub missing_layers: Vec<Layer>,
    pub seed: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            grid_width: 10,
            grid_height: 10,
            years: vec![2020, 2021, 2022],
            missing_layers: Vec::new(),
            seed: 7,
        }
    }
}

#[derive(Debug, Clone)]
struct DemoRun {
    region: String,
    year_index: usize,
    turns: u32,
    ndvi_offsets: Vec<f32>,
    aquifer: f64,
    cash: f64,
    soil_mean: f64,
    eco: f64,
    planned_cells: usize,
}

struct AppState {
    config: DemoConfig,
    runs: Mutex<HashMap<String, DemoRun>>,
    next_run: AtomicU64,
}

impl AppState {
    fn cells(&self) -> usize {
        self.config.grid_width as usize * self.config.grid_height as usize
    }

    fn run(&self, id: &str) -> Result<DemoRun, ApiError> {
        self.runs
            .lock()
            .expect("runs lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("unknown run '{id}'")))
    }
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }

    fn unprocessable(message: String) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message,
        }
    }

    fn internal(message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "detail": self.message }))).into_response()
    }
}

pub fn router(config: DemoConfig) -> Router {
    let state = Arc::new(AppState {
        config,
        runs: Mutex::new(HashMap::new()),
        next_run: AtomicU64::new(1),
    });
    Router::new()
        .route("/game/new", post(new_game))
        .route("/game/:id/state", get(run_state))
        .route("/farm/:id/state", get(run_state))
        .route("/game/:id/plan", post(apply_plan))
        .route("/farm/:id/plan", post(apply_plan))
        .route("/region/:region_id/layer", get(region_layer))
        .route("/farm/:id/raster", get(farm_raster))
        .route("/simulate/turn", post(simulate_turn))
        .route("/summary/:id", get(summary))
        .with_state(state)
}

/// Serves until Ctrl+C.
pub async fn run(config: DemoConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid address {}:{}", config.host, config.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, grid = %format!("{}x{}", config.grid_width, config.grid_height), "demo backend listening (Ctrl+C to stop)");
    axum::serve(listener, router(config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Binds an ephemeral local port and serves in the background.
pub async fn spawn(config: DemoConfig) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = router(config);
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!(error = %err, "demo backend stopped");
        }
    });
    Ok((addr, handle))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down demo backend");
}

async fn new_game(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewGameRequest>,
) -> Json<NewGameResponse> {
    let id = format!("run-{}", state.next_run.fetch_add(1, Ordering::SeqCst));
    let region = request.region.unwrap_or_else(|| "california".to_string());
    let run = DemoRun {
        region: region.clone(),
        year_index: 0,
        turns: 0,
        ndvi_offsets: vec![0.0; state.cells()],
        aquifer: 1.0,
        cash: 10_000.0,
        soil_mean: 0.5,
        eco: 0.0,
        planned_cells: 0,
    };
    state
        .runs
        .lock()
        .expect("runs lock poisoned")
        .insert(id.clone(), run);
    info!(%id, %region, scenario = ?request.scenario, "run created");
    Json(NewGameResponse {
        id,
        year: state.config.years.first().copied(),
        season: Some(0),
        years: state.config.years.clone(),
    })
}

async fn run_state(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Kpis>, ApiError> {
    let run = state.run(&id)?;
    let ndvi_mean = {
        let offsets = &run.ndvi_offsets;
        0.5 + offsets.iter().sum::<f32>() as f64 / offsets.len().max(1) as f64
    };
    let values = BTreeMap::from([
        ("ndvi_mean".to_string(), ndvi_mean),
        ("soil_mean".to_string(), run.soil_mean),
        ("aquifer".to_string(), run.aquifer),
        ("cash".to_string(), run.cash),
        ("alpha".to_string(), run.eco),
        ("turns".to_string(), run.turns as f64),
        ("planned_cells".to_string(), run.planned_cells as f64),
    ]);
    Ok(Json(Kpis { values }))
}

async fn apply_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(plan): Json<PlanPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cells = state.cells();
    if let Some(idx) = plan.cells.keys().find(|&&idx| idx >= cells) {
        return Err(ApiError::unprocessable(format!("cell {idx} is outside the grid")));
    }
    let mut runs = state.runs.lock().expect("runs lock poisoned");
    let run = runs
        .get_mut(&id)
        .ok_or_else(|| ApiError::not_found(format!("unknown run '{id}'")))?;
    run.planned_cells = plan.cells.len();
    debug!(%id, cells = run.planned_cells, "plan stored");
    Ok(Json(serde_json::json!({ "ok": true, "cells": run.planned_cells })))
}

#[derive(Debug, Deserialize)]
struct LayerQuery {
    layer: String,
    #[serde(default)]
    season: u32,
    #[serde(default)]
    year: Option<i32>,
}

async fn region_layer(
    State(state): State<Arc<AppState>>,
    Path(region_id): Path<String>,
    Query(query): Query<LayerQuery>,
) -> Result<Response, ApiError> {
    let layer = served_layer(&state, &query)?;
    let year = query.year.or_else(|| state.config.years.first().copied()).unwrap_or_default();
    let raster = synthetic_raster(&state.config, &region_id, layer, year, query.season)?;
    png_response(&raster)
}

async fn farm_raster(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LayerQuery>,
) -> Result<Response, ApiError> {
    let layer = served_layer(&state, &query)?;
    let run = state.run(&id)?;
    let year = query
        .year
        .or_else(|| state.config.years.get(run.year_index).copied())
        .unwrap_or_default();
    let mut raster = synthetic_raster(&state.config, &run.region, layer, year, query.season)?;
    if layer == Layer::Ndvi {
        let offsets: Vec<(usize, f32)> = run.ndvi_offsets.iter().copied().enumerate().collect();
        raster = LayerField::from_raster(&raster, layer.scale())
            .with_deltas(&offsets)
            .map_err(|err| ApiError::internal(err.to_string()))?
            .to_raster();
    }
    png_response(&raster)
}

fn served_layer(state: &AppState, query: &LayerQuery) -> Result<Layer, ApiError> {
    let layer: Layer = query
        .layer
        .parse()
        .map_err(|err: crate::layer::UnknownLayer| ApiError::not_found(err.to_string()))?;
    if state.config.missing_layers.contains(&layer) {
        return Err(ApiError::not_found(format!("layer '{layer}' is not published")));
    }
    Ok(layer)
}

/// Smooth west-to-east gradient with seeded noise, shifted by season.
fn synthetic_raster(
    config: &DemoConfig,
    region: &str,
    layer: Layer,
    year: i32,
    season: u32,
) -> Result<RasterImage, ApiError> {
    let seed = region
        .bytes()
        .chain(layer.as_str().bytes())
        .fold(config.seed ^ ((year as u64) << 8) ^ season as u64, |acc, b| {
            acc.wrapping_mul(0x100_0000_01b3).wrapping_add(b as u64)
        });
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (width, height) = (config.grid_width, config.grid_height);
    RasterImage::from_fn(width, height, |col, row| {
        let base = col as f64 / width as f64 * 0.7 + row as f64 / height as f64 * 0.3;
        let shifted = base + (season % 4) as f64 * 0.05 + rng.gen_range(-0.05..0.05);
        (shifted.clamp(0.0, 1.0) * 255.0).round() as u8
    })
    .map_err(|err| ApiError::internal(err.to_string()))
}

fn png_response(raster: &RasterImage) -> Result<Response, ApiError> {
    let png = raster.to_png().map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn simulate_turn(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    let cells = state.cells();
    let water = &request.decisions.water;
    let cover = &request.decisions.soil.cover_crop_cells;
    if let Some(idx) = water.irrigate_cells.iter().chain(cover).find(|&&idx| idx >= cells) {
        return Err(ApiError::unprocessable(format!("cell {idx} is outside the grid")));
    }

    let mut deltas: BTreeMap<usize, CellDelta> = BTreeMap::new();
    for &idx in &water.irrigate_cells {
        let level = water.irrigation_levels.get(&idx).copied().unwrap_or(1.0) as f32;
        deltas.insert(
            idx,
            CellDelta::new(idx)
                .with("ndvi", NDVI_GAIN * level)
                .with("soil", SOIL_GAIN * level)
                .with("water", WATER_DRAW * level),
        );
    }
    for &idx in cover {
        let delta = deltas.entry(idx).or_insert_with(|| CellDelta::new(idx));
        *delta.channels.entry("soil".to_string()).or_default() += COVER_SOIL_GAIN;
    }

    let mut runs = state.runs.lock().expect("runs lock poisoned");
    let run = runs
        .get_mut(&request.run_id)
        .ok_or_else(|| ApiError::not_found(format!("unknown run '{}'", request.run_id)))?;
    let mut ndvi_gain = 0.0;
    let mut soil_gain = 0.0;
    let mut water_draw = 0.0;
    for delta in deltas.values() {
        let ndvi = delta.channels.get("ndvi").copied().unwrap_or_default();
        run.ndvi_offsets[delta.idx] += ndvi;
        ndvi_gain += ndvi as f64;
        soil_gain += delta.channels.get("soil").copied().unwrap_or_default() as f64;
        water_draw += delta.channels.get("water").copied().unwrap_or_default() as f64;
    }
    run.turns += 1;
    run.year_index = (run.year_index + 1).min(state.config.years.len().saturating_sub(1));
    run.aquifer = (run.aquifer + water_draw / cells as f64 * 10.0).max(0.0);
    run.soil_mean = (run.soil_mean + soil_gain / cells as f64).clamp(0.0, 1.0);
    run.cash -= IRRIGATION_COST * water.irrigate_cells.len() as f64;
    run.eco += ndvi_gain;
    info!(run_id = %request.run_id, year = request.year, cells = deltas.len(), "turn simulated");

    let economy = serde_json::json!({ "cash": run.cash, "aquifer": run.aquifer });
    Ok(Json(TurnResponse {
        deltas: DeltaSet {
            cells: deltas.into_values().collect(),
        },
        t_next: None,
        economy: economy.as_object().cloned(),
    }))
}

async fn summary(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<RunSummary>, ApiError> {
    let run = state.run(&id)?;
    let verdict = if run.aquifer < 0.5 {
        "Vegetation gains came at the cost of a depleted aquifer."
    } else if run.eco > 0.0 {
        "Irrigation lifted vegetation while groundwater held up."
    } else {
        "Little changed: no cells were irrigated."
    };
    Ok(Json(RunSummary {
        score: BTreeMap::from([
            ("eco".to_string(), run.eco),
            ("water".to_string(), run.aquifer),
        ]),
        analysis_text: format!("{verdict} {} turns in {}.", run.turns, run.region),
    }))
}
