//! Contract with the simulation backend.
//!
//! Every response the client consumes has an explicit schema here; payloads
//! that do not match are rejected as [`DecodeError`]s instead of flowing
//! further with missing fields.

mod http;

use std::collections::BTreeMap;
use std::future::Future;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DecodeError, GatewayError};
use crate::grid::CellIndex;
use crate::layer::Layer;
use crate::plan::{Plan, PlanAttribute, PlanEntry};

pub use http::HttpGateway;

/// Which family of endpoints serves layers and run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerScope {
    #[default]
    Region,
    Farm,
}

/// Everything a gateway call needs to address the backend for one session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionContext {
    pub api_base: String,
    pub scope: LayerScope,
    pub region_id: String,
    /// Empty until the backend has created the run.
    pub run_id: String,
}

impl SessionContext {
    pub fn new(api_base: impl Into<String>, scope: LayerScope, region_id: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            scope,
            region_id: region_id.into(),
            run_id: String::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewGameRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGameResponse {
    #[serde(alias = "save_id")]
    pub id: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub years: Vec<i32>,
}

impl NewGameResponse {
    /// A run needs an id and at least one year; a lone `year` stands in for `years`.
    pub fn validate(mut self) -> Result<Self, DecodeError> {
        if self.id.trim().is_empty() {
            return Err(DecodeError::Schema("new game response has an empty id".into()));
        }
        if self.years.is_empty() {
            match self.year {
                Some(year) => self.years.push(year),
                None => return Err(DecodeError::Schema("new game response lists no years".into())),
            }
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRequest {
    pub layer: Layer,
    pub season: u32,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WaterDecisions {
    #[serde(default)]
    pub irrigate_cells: Vec<CellIndex>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub irrigation_levels: BTreeMap<CellIndex, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilDecisions {
    pub cover_crop: String,
    pub fertilizer: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cover_crop_cells: Vec<CellIndex>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mulch_cells: Vec<CellIndex>,
}

impl Default for SoilDecisions {
    fn default() -> Self {
        Self {
            cover_crop: yes_no(false),
            fertilizer: yes_no(false),
            cover_crop_cells: Vec::new(),
            mulch_cells: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CropDecisions {
    #[serde(default)]
    pub cells: BTreeMap<CellIndex, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DrainageDecisions {
    #[serde(default)]
    pub cells: Vec<CellIndex>,
}

/// Plan translated into the per-domain decision groups the turn endpoint takes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TurnDecisions {
    #[serde(default)]
    pub water: WaterDecisions,
    #[serde(default)]
    pub soil: SoilDecisions,
    #[serde(default)]
    pub crops: CropDecisions,
    #[serde(default)]
    pub drainage: DrainageDecisions,
}

impl TurnDecisions {
    pub fn from_plan(plan: &Plan) -> Self {
        let irrigation_levels = plan
            .cells_with(PlanAttribute::Irrigation)
            .into_iter()
            .filter_map(|(cell, value)| value.as_level().map(|level| (cell, level.clamp(0.0, 1.0))))
            .collect();
        let cover_crop_cells = plan.cells_flagged(PlanAttribute::CoverCrop);
        let crops = plan
            .cells_with(PlanAttribute::Crop)
            .into_iter()
            .filter_map(|(cell, value)| value.as_choice().map(|crop| (cell, crop.to_string())))
            .collect();
        Self {
            water: WaterDecisions {
                irrigate_cells: plan.cells_flagged(PlanAttribute::Irrigate),
                irrigation_levels,
            },
            soil: SoilDecisions {
                cover_crop: yes_no(!cover_crop_cells.is_empty()),
                fertilizer: yes_no(false),
                cover_crop_cells,
                mulch_cells: plan.cells_flagged(PlanAttribute::Mulch),
            },
            crops: CropDecisions { cells: crops },
            drainage: DrainageDecisions {
                cells: plan.cells_flagged(PlanAttribute::Drainage),
            },
        }
    }
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub run_id: String,
    pub region_id: String,
    pub year: i32,
    pub decisions: TurnDecisions,
}

/// Raw plan upload body: cell index to attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanPayload {
    pub cells: BTreeMap<CellIndex, PlanEntry>,
}

impl From<&Plan> for PlanPayload {
    fn from(plan: &Plan) -> Self {
        Self {
            cells: plan
                .sorted()
                .into_iter()
                .map(|(cell, entry)| (cell, entry.clone()))
                .collect(),
        }
    }
}

/// One cell's adjustments, keyed by channel (`ndvi`, `soil`, `water`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCellDelta", into = "RawCellDelta")]
pub struct CellDelta {
    pub idx: CellIndex,
    pub channels: BTreeMap<String, f32>,
}

impl CellDelta {
    pub fn new(idx: CellIndex) -> Self {
        Self {
            idx,
            channels: BTreeMap::new(),
        }
    }

    pub fn with(mut self, channel: &str, delta: f32) -> Self {
        self.channels.insert(channel.to_string(), delta);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCellDelta {
    idx: CellIndex,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

impl TryFrom<RawCellDelta> for CellDelta {
    type Error = String;

    fn try_from(raw: RawCellDelta) -> Result<Self, Self::Error> {
        let mut channels = BTreeMap::new();
        for (key, value) in raw.rest {
            let Some(channel) = key.strip_suffix('Δ').or_else(|| key.strip_suffix("_delta")) else {
                continue;
            };
            let delta = value
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("delta '{key}' of cell {} is not a finite number", raw.idx))?;
            channels.insert(channel.to_string(), delta as f32);
        }
        Ok(Self {
            idx: raw.idx,
            channels,
        })
    }
}

impl From<CellDelta> for RawCellDelta {
    fn from(delta: CellDelta) -> Self {
        Self {
            idx: delta.idx,
            rest: delta
                .channels
                .into_iter()
                .map(|(channel, value)| (format!("{channel}Δ"), Value::from(value as f64)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeltaSet {
    #[serde(default)]
    pub cells: Vec<CellDelta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub deltas: DeltaSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_next: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economy: Option<Map<String, Value>>,
}

impl TurnResponse {
    /// Deltas for one layer as `(idx, delta)` pairs. Several channel names can
    /// feed the same layer (`soil` and `soil_moisture`), so they are summed per cell.
    pub fn deltas_for(&self, layer: Layer) -> Vec<(CellIndex, f32)> {
        self.deltas
            .cells
            .iter()
            .filter_map(|cell| {
                let total: Option<f32> = cell
                    .channels
                    .iter()
                    .filter(|(channel, _)| Layer::from_delta_channel(channel) == Some(layer))
                    .map(|(_, delta)| *delta)
                    .reduce(|a, b| a + b);
                total.map(|delta| (cell.idx, delta))
            })
            .collect()
    }

    pub fn check_cells(&self, cells: usize) -> Result<(), DecodeError> {
        match self.deltas.cells.iter().find(|cell| cell.idx >= cells) {
            Some(cell) => Err(DecodeError::DeltaOutOfGrid {
                idx: cell.idx,
                cells,
            }),
            None => Ok(()),
        }
    }
}

/// Numeric indicators of a run. Non-numeric fields in the payload are dropped.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "BTreeMap<String, f64>")]
pub struct Kpis {
    pub values: BTreeMap<String, f64>,
}

impl From<Map<String, Value>> for Kpis {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            values: map
                .into_iter()
                .filter_map(|(key, value)| value.as_f64().map(|v| (key, v)))
                .collect(),
        }
    }
}

impl From<Kpis> for BTreeMap<String, f64> {
    fn from(kpis: Kpis) -> Self {
        kpis.values
    }
}

impl Kpis {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanAck(pub Value);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub score: BTreeMap<String, f64>,
    #[serde(default)]
    pub analysis_text: String,
}

impl RunSummary {
    pub fn eco(&self) -> Option<f64> {
        self.score.get("eco").copied()
    }
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    serde_json::from_slice(bytes).map_err(|err| DecodeError::Schema(err.to_string()))
}

/// Backend operations the turn loop depends on.
pub trait SimulationGateway: Send + Sync + 'static {
    fn new_game(
        &self,
        ctx: &SessionContext,
        request: &NewGameRequest,
    ) -> impl Future<Output = Result<NewGameResponse, GatewayError>> + Send;

    /// Raw raster bytes for one layer.
    fn fetch_layer(
        &self,
        ctx: &SessionContext,
        request: &LayerRequest,
    ) -> impl Future<Output = Result<Bytes, GatewayError>> + Send;

    fn fetch_state(&self, ctx: &SessionContext) -> impl Future<Output = Result<Kpis, GatewayError>> + Send;

    fn submit_plan(
        &self,
        ctx: &SessionContext,
        plan: &PlanPayload,
    ) -> impl Future<Output = Result<PlanAck, GatewayError>> + Send;

    fn submit_turn(
        &self,
        ctx: &SessionContext,
        request: &TurnRequest,
    ) -> impl Future<Output = Result<TurnResponse, GatewayError>> + Send;

    fn fetch_summary(
        &self,
        ctx: &SessionContext,
    ) -> impl Future<Output = Result<RunSummary, GatewayError>> + Send;
}
