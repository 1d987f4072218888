//! The turn loop of one play session.
//!
//! `TurnController` performs no I/O. User inputs and gateway completions go
//! in; [`Command`]s describing the gateway calls to make come out. Every
//! command carries a [`Ticket`], and a completion is only applied while its
//! ticket is still the one the controller is waiting for. Superseded layer
//! fetches and anything from an ended session are dropped on arrival.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::colorize::{colorize, ColorImage};
use crate::error::{ConfigurationError, DecodeError, GatewayError, StateError, TurnError};
use crate::gateway::{
    Kpis, LayerRequest, NewGameResponse, PlanAck, PlanPayload, RunSummary, SessionContext,
    TurnDecisions, TurnRequest, TurnResponse,
};
use crate::grid::{CellCoordinate, GridMapper, Viewport};
use crate::layer::{Layer, LayerKey};
use crate::palette::PaletteName;
use crate::plan::{AttributeValue, PlanAttribute, PlanStore};
use crate::raster::{decode_raster, LayerField};
use crate::rng::RngManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No session.
    #[default]
    Idle,
    /// Waiting for the layer of the current year.
    Loading,
    Ready,
    /// Ready, but the displayed layer is a placeholder.
    Degraded,
    Submitting,
    Applying,
    Advancing,
    Complete,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Loading => "loading",
            Phase::Ready => "ready",
            Phase::Degraded => "degraded",
            Phase::Submitting => "submitting",
            Phase::Applying => "applying",
            Phase::Advancing => "advancing",
            Phase::Complete => "complete",
        }
    }

    /// Plan edits and turn actions are only taken while the session rests.
    pub fn accepts_edits(self) -> bool {
        matches!(self, Phase::Ready | Phase::Degraded)
    }

    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (_, Idle)
                | (Idle, Loading)
                | (Loading, Ready)
                | (Loading, Degraded)
                | (Ready, Degraded)
                | (Degraded, Ready)
                | (Ready, Submitting)
                | (Degraded, Submitting)
                | (Submitting, Ready)
                | (Submitting, Degraded)
                | (Submitting, Applying)
                | (Applying, Advancing)
                | (Advancing, Loading)
                | (Advancing, Complete)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnState {
    pub run_id: String,
    pub region_id: String,
    pub years: Vec<i32>,
    pub year_index: usize,
    pub active_layer: Layer,
    pub season: u32,
}

impl TurnState {
    pub fn current_year(&self) -> i32 {
        self.years[self.year_index]
    }

    pub fn is_final_year(&self) -> bool {
        self.year_index + 1 >= self.years.len()
    }

    pub fn layer_key(&self) -> LayerKey {
        LayerKey {
            layer: self.active_layer,
            year: self.current_year(),
            season: self.season,
        }
    }
}

/// What the backend reported when the run was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub run_id: String,
    pub region_id: String,
    pub years: Vec<i32>,
    pub season: u32,
}

impl SessionStart {
    pub fn from_new_game(response: NewGameResponse, region_id: impl Into<String>) -> Self {
        Self {
            run_id: response.id,
            region_id: region_id.into(),
            years: response.years,
            season: response.season.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    pub viewport: Viewport,
    pub grid_width: u32,
    pub grid_height: u32,
    pub palette: PaletteName,
    pub initial_layer: Layer,
    pub random_selection_count: usize,
    pub seed: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            viewport: Viewport {
                width: 500,
                height: 548,
                header_offset: 48,
            },
            grid_width: 10,
            grid_height: 10,
            palette: PaletteName::Viridis,
            initial_layer: Layer::Ndvi,
            random_selection_count: 50,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket {
    pub epoch: u64,
    pub serial: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    FetchLayer(LayerRequest),
    SubmitTurn(TurnRequest),
    UploadPlan(PlanPayload),
    FetchKpis,
    FetchSummary,
}

/// A gateway call the driver has to perform.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub ticket: Ticket,
    pub context: SessionContext,
    pub request: Request,
}

#[derive(Debug, Clone)]
pub enum Response {
    Layer(Result<Bytes, GatewayError>),
    Turn(Result<TurnResponse, GatewayError>),
    PlanAck(Result<PlanAck, GatewayError>),
    Kpis(Result<Kpis, GatewayError>),
    Summary(Result<RunSummary, GatewayError>),
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub ticket: Ticket,
    pub response: Response,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Pointer press in viewport pixels.
    Pointer { x: f32, y: f32 },
    ToggleCell(CellCoordinate),
    ToggleFlag {
        cell: CellCoordinate,
        attribute: PlanAttribute,
    },
    SetAttribute {
        cell: CellCoordinate,
        attribute: PlanAttribute,
        value: AttributeValue,
    },
    RandomSelection,
    SwitchLayer(Layer),
    ChangePalette(PaletteName),
    StepSeason(i32),
    ApplyPlan,
    AdvanceTurn,
}

impl Input {
    fn action(&self) -> &'static str {
        match self {
            Input::Pointer { .. } | Input::ToggleCell(_) | Input::RandomSelection => "select cells",
            Input::ToggleFlag { .. } | Input::SetAttribute { .. } => "edit the plan",
            Input::SwitchLayer(_) => "switch layers",
            Input::ChangePalette(_) => "change palette",
            Input::StepSeason(_) => "change season",
            Input::ApplyPlan => "apply the plan",
            Input::AdvanceTurn => "advance the turn",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum LayerStatus {
    Live,
    Degraded(String),
}

/// The image currently on screen and what it shows.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerView {
    pub key: LayerKey,
    pub palette: PaletteName,
    pub status: LayerStatus,
    pub image: ColorImage,
}

impl LayerView {
    fn live(key: LayerKey, palette: PaletteName, field: &LayerField) -> Self {
        Self {
            key,
            palette,
            status: LayerStatus::Live,
            image: colorize(&field.to_raster(), palette),
        }
    }

    fn placeholder(key: LayerKey, palette: PaletteName, grid: &GridMapper, reason: String) -> Self {
        let (width, height) = grid.extent();
        Self {
            key,
            palette,
            status: LayerStatus::Degraded(reason),
            image: ColorImage::placeholder(width, height - grid.header_offset()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, LayerStatus::Degraded(_))
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingTurn {
    ticket: Ticket,
    year: i32,
    season: u32,
}

pub struct TurnController {
    settings: ControllerSettings,
    grid: GridMapper,
    phase: Phase,
    state: Option<TurnState>,
    context: SessionContext,
    plan: PlanStore,
    palette: PaletteName,
    layers: HashMap<LayerKey, LayerField>,
    view: Option<Arc<LayerView>>,
    kpis: Option<Kpis>,
    summary: Option<RunSummary>,
    epoch: u64,
    serial: u64,
    pending_layer: Option<(Ticket, LayerKey)>,
    pending_turn: Option<PendingTurn>,
    pending_plan: Option<Ticket>,
    pending_kpis: Option<Ticket>,
    pending_summary: Option<Ticket>,
    rng: RngManager,
}

impl TurnController {
    pub fn new(settings: ControllerSettings) -> Result<Self, ConfigurationError> {
        let grid = GridMapper::new(settings.viewport, settings.grid_width, settings.grid_height)?;
        Ok(Self {
            grid,
            phase: Phase::Idle,
            state: None,
            context: SessionContext::default(),
            plan: PlanStore::new(),
            palette: settings.palette,
            layers: HashMap::new(),
            view: None,
            kpis: None,
            summary: None,
            epoch: 0,
            serial: 0,
            pending_layer: None,
            pending_turn: None,
            pending_plan: None,
            pending_kpis: None,
            pending_summary: None,
            rng: RngManager::new(settings.seed),
            settings,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> Option<&TurnState> {
        self.state.as_ref()
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn grid(&self) -> &GridMapper {
        &self.grid
    }

    pub fn plan(&self) -> &PlanStore {
        &self.plan
    }

    pub fn palette(&self) -> PaletteName {
        self.palette
    }

    pub fn view(&self) -> Option<&Arc<LayerView>> {
        self.view.as_ref()
    }

    pub fn layer(&self, key: &LayerKey) -> Option<&LayerField> {
        self.layers.get(key)
    }

    pub fn kpis(&self) -> Option<&Kpis> {
        self.kpis.as_ref()
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    /// Whether a turn submission is awaiting its response.
    pub fn is_submitting(&self) -> bool {
        self.pending_turn.is_some()
    }

    /// Begins a session, ending any active one first.
    pub fn start_session(
        &mut self,
        context: SessionContext,
        start: SessionStart,
    ) -> Result<Vec<Command>, TurnError> {
        if start.years.is_empty() {
            return Err(ConfigurationError::NoYears.into());
        }
        if self.phase != Phase::Idle {
            self.end_session();
        }
        info!(run_id = %start.run_id, region = %start.region_id, years = start.years.len(), "session started");
        self.context = context.with_run_id(start.run_id.clone());
        self.state = Some(TurnState {
            run_id: start.run_id,
            region_id: start.region_id,
            years: start.years,
            year_index: 0,
            active_layer: self.settings.initial_layer,
            season: start.season,
        });
        self.rng = RngManager::new(self.settings.seed);
        self.transition(Phase::Loading);
        let mut commands = self.request_view();
        commands.push(self.fetch_kpis());
        Ok(commands)
    }

    /// Drops all session state. Completions still in flight are discarded when they arrive.
    pub fn end_session(&mut self) {
        if self.phase == Phase::Idle {
            return;
        }
        self.epoch += 1;
        self.state = None;
        self.view = None;
        self.layers.clear();
        self.plan.clear();
        self.kpis = None;
        self.summary = None;
        self.pending_layer = None;
        self.pending_turn = None;
        self.pending_plan = None;
        self.pending_kpis = None;
        self.pending_summary = None;
        self.transition(Phase::Idle);
        info!(epoch = self.epoch, "session ended");
    }

    pub fn handle_input(&mut self, input: Input) -> Result<Vec<Command>, TurnError> {
        if self.state.is_none() {
            return Err(self.refuse(&input).into());
        }
        match input {
            Input::Pointer { x, y } => {
                self.require_edits(&input)?;
                match self.grid.index_at(x, y) {
                    Some(cell) => self.toggle_cell(cell),
                    None => debug!(x, y, "pointer outside the grid"),
                }
                Ok(Vec::new())
            }
            Input::ToggleCell(cell) => {
                self.require_edits(&input)?;
                if let Some(idx) = self.grid.index_of(cell) {
                    self.toggle_cell(idx);
                }
                Ok(Vec::new())
            }
            Input::ToggleFlag { cell, attribute } => {
                self.require_edits(&input)?;
                if let Some(idx) = self.grid.index_of(cell) {
                    let on = self.plan.toggle_flag(idx, attribute);
                    debug!(cell = idx, %attribute, on, "flag toggled");
                }
                Ok(Vec::new())
            }
            Input::SetAttribute {
                cell,
                attribute,
                ref value,
            } => {
                self.require_edits(&input)?;
                if let Some(idx) = self.grid.index_of(cell) {
                    self.plan.set_attribute(idx, attribute, value.clone());
                }
                Ok(Vec::new())
            }
            Input::RandomSelection => {
                self.require_edits(&input)?;
                let selected = self.plan.bulk_random_select(
                    self.settings.random_selection_count,
                    self.grid.grid_width(),
                    self.grid.grid_height(),
                    &mut self.rng.stream("plan"),
                );
                debug!(selected, "random selection");
                Ok(Vec::new())
            }
            Input::SwitchLayer(layer) => {
                let Some(state) = self.state.as_mut() else {
                    return Ok(Vec::new());
                };
                if state.active_layer == layer {
                    return Ok(Vec::new());
                }
                state.active_layer = layer;
                Ok(self.request_view())
            }
            Input::ChangePalette(palette) => {
                self.palette = palette;
                self.recolor();
                Ok(Vec::new())
            }
            Input::StepSeason(step) => {
                let Some(state) = self.state.as_mut() else {
                    return Ok(Vec::new());
                };
                let season = state.season.saturating_add_signed(step);
                if season == state.season {
                    return Ok(Vec::new());
                }
                state.season = season;
                Ok(self.request_view())
            }
            Input::ApplyPlan => {
                self.require_edits(&input)?;
                let ticket = self.next_ticket();
                self.pending_plan = Some(ticket);
                let payload = PlanPayload::from(&self.plan.diff());
                Ok(vec![self.command(ticket, Request::UploadPlan(payload))])
            }
            Input::AdvanceTurn => {
                self.require_edits(&input)?;
                let Some(state) = self.state.as_ref() else {
                    return Ok(Vec::new());
                };
                let request = TurnRequest {
                    run_id: state.run_id.clone(),
                    region_id: state.region_id.clone(),
                    year: state.current_year(),
                    decisions: TurnDecisions::from_plan(&self.plan.diff()),
                };
                let season = state.season;
                let ticket = self.next_ticket();
                self.pending_turn = Some(PendingTurn {
                    ticket,
                    year: request.year,
                    season,
                });
                info!(year = request.year, cells = self.plan.len(), "submitting turn");
                self.transition(Phase::Submitting);
                Ok(vec![self.command(ticket, Request::SubmitTurn(request))])
            }
        }
    }

    pub fn complete(&mut self, completion: Completion) -> Result<Vec<Command>, TurnError> {
        let Completion { ticket, response } = completion;
        if ticket.epoch != self.epoch {
            debug!(epoch = ticket.epoch, serial = ticket.serial, "dropping completion from an ended session");
            return Ok(Vec::new());
        }
        match response {
            Response::Layer(result) => Ok(self.on_layer(ticket, result)),
            Response::Turn(result) => self.on_turn(ticket, result),
            Response::PlanAck(result) => self.on_plan_ack(ticket, result),
            Response::Kpis(result) => self.on_kpis(ticket, result),
            Response::Summary(result) => self.on_summary(ticket, result),
        }
    }

    fn on_layer(&mut self, ticket: Ticket, result: Result<Bytes, GatewayError>) -> Vec<Command> {
        let key = match self.pending_layer {
            Some((pending, key)) if pending == ticket => key,
            _ => {
                debug!(serial = ticket.serial, "dropping superseded layer");
                return Vec::new();
            }
        };
        self.pending_layer = None;
        let field = result
            .map_err(|err| err.to_string())
            .and_then(|bytes| self.decode_field(key.layer, &bytes).map_err(|err| err.to_string()));
        match field {
            Ok(field) => {
                debug!(%key, mean = field.mean(), "layer loaded");
                let view = LayerView::live(key, self.palette, &field);
                self.layers.insert(key, field);
                self.show(view);
            }
            Err(reason) => {
                warn!(%key, %reason, "layer unavailable, showing placeholder");
                let view = LayerView::placeholder(key, self.palette, &self.grid, reason);
                self.show(view);
            }
        }
        self.sync_phase_with_view();
        Vec::new()
    }

    fn decode_field(&self, layer: Layer, bytes: &[u8]) -> Result<LayerField, DecodeError> {
        let raster = decode_raster(bytes)?;
        if raster.width() != self.grid.grid_width() || raster.height() != self.grid.grid_height() {
            return Err(DecodeError::GridMismatch {
                width: raster.width(),
                height: raster.height(),
                expected_width: self.grid.grid_width(),
                expected_height: self.grid.grid_height(),
            });
        }
        Ok(LayerField::from_raster(&raster, layer.scale()))
    }

    fn on_turn(
        &mut self,
        ticket: Ticket,
        result: Result<TurnResponse, GatewayError>,
    ) -> Result<Vec<Command>, TurnError> {
        let pending = match self.pending_turn {
            Some(pending) if pending.ticket == ticket => pending,
            _ => {
                debug!(serial = ticket.serial, "dropping stale turn response");
                return Ok(Vec::new());
            }
        };
        self.pending_turn = None;
        let cells = self.grid.cell_count();
        let response = result.and_then(|response| {
            response.check_cells(cells)?;
            Ok(response)
        });
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, retryable = err.is_transport(), kept = self.plan.len(), "turn submission failed, plan kept");
                let resting = self.resting_phase();
                self.transition(resting);
                return Err(TurnError::Submission(err));
            }
        };

        self.transition(Phase::Applying);
        self.apply_deltas(pending, &response);
        self.plan.clear();

        self.transition(Phase::Advancing);
        let Some(state) = self.state.as_mut() else {
            return Ok(Vec::new());
        };
        if state.is_final_year() {
            info!(run_id = %state.run_id, year = state.current_year(), "run complete");
            self.transition(Phase::Complete);
            let mut commands = vec![self.fetch_kpis()];
            commands.push(self.fetch_summary());
            return Ok(commands);
        }
        state.year_index += 1;
        if let Some(season) = response.t_next {
            state.season = season;
        }
        info!(year = state.current_year(), season = state.season, "advanced");
        self.transition(Phase::Loading);
        let mut commands = self.request_view();
        commands.push(self.fetch_kpis());
        Ok(commands)
    }

    /// Adds the response's deltas to every cached layer of the submitted year and season.
    fn apply_deltas(&mut self, pending: PendingTurn, response: &TurnResponse) {
        for layer in Layer::ALL {
            let deltas = response.deltas_for(layer);
            if deltas.is_empty() {
                continue;
            }
            let key = LayerKey {
                layer,
                year: pending.year,
                season: pending.season,
            };
            let Some(field) = self.layers.get(&key) else {
                debug!(%key, cells = deltas.len(), "deltas for an unloaded layer skipped");
                continue;
            };
            match field.with_deltas(&deltas) {
                Ok(updated) => {
                    debug!(%key, cells = deltas.len(), "deltas applied");
                    self.layers.insert(key, updated);
                }
                Err(err) => warn!(%key, error = %err, "deltas rejected"),
            }
        }
        self.recolor();
    }

    fn on_plan_ack(
        &mut self,
        ticket: Ticket,
        result: Result<PlanAck, GatewayError>,
    ) -> Result<Vec<Command>, TurnError> {
        if self.pending_plan != Some(ticket) {
            return Ok(Vec::new());
        }
        self.pending_plan = None;
        match result {
            Ok(_) => {
                info!(cells = self.plan.len(), "plan applied");
                Ok(vec![self.fetch_kpis()])
            }
            Err(source) => {
                warn!(error = %source, "plan upload failed");
                Err(TurnError::Fetch {
                    what: "plan upload",
                    source,
                })
            }
        }
    }

    fn on_kpis(&mut self, ticket: Ticket, result: Result<Kpis, GatewayError>) -> Result<Vec<Command>, TurnError> {
        if self.pending_kpis != Some(ticket) {
            return Ok(Vec::new());
        }
        self.pending_kpis = None;
        match result {
            Ok(kpis) => {
                debug!(fields = kpis.values.len(), "kpis updated");
                self.kpis = Some(kpis);
                Ok(Vec::new())
            }
            Err(source) => {
                warn!(error = %source, "kpi refresh failed");
                Err(TurnError::Fetch { what: "kpi", source })
            }
        }
    }

    fn on_summary(
        &mut self,
        ticket: Ticket,
        result: Result<RunSummary, GatewayError>,
    ) -> Result<Vec<Command>, TurnError> {
        if self.pending_summary != Some(ticket) {
            return Ok(Vec::new());
        }
        self.pending_summary = None;
        match result {
            Ok(summary) => {
                info!(eco = ?summary.eco(), "run summary received");
                self.summary = Some(summary);
                Ok(Vec::new())
            }
            Err(source) => {
                warn!(error = %source, "summary fetch failed");
                Err(TurnError::Fetch {
                    what: "summary",
                    source,
                })
            }
        }
    }

    /// Shows the active layer from cache, or asks for it. Issuing a new fetch
    /// supersedes whatever fetch was outstanding.
    fn request_view(&mut self) -> Vec<Command> {
        let Some(state) = self.state.as_ref() else {
            return Vec::new();
        };
        let key = state.layer_key();
        if let Some(field) = self.layers.get(&key) {
            let view = LayerView::live(key, self.palette, field);
            self.pending_layer = None;
            self.show(view);
            self.sync_phase_with_view();
            return Vec::new();
        }
        if matches!(self.pending_layer, Some((_, pending)) if pending == key) {
            return Vec::new();
        }
        let ticket = self.next_ticket();
        self.pending_layer = Some((ticket, key));
        debug!(%key, serial = ticket.serial, "requesting layer");
        let request = LayerRequest {
            layer: key.layer,
            season: key.season,
            year: key.year,
        };
        vec![self.command(ticket, Request::FetchLayer(request))]
    }

    /// Re-renders the current view from its cached field with the active palette.
    fn recolor(&mut self) {
        let Some(view) = self.view.as_ref() else {
            return;
        };
        let key = view.key;
        if let Some(field) = self.layers.get(&key) {
            let view = LayerView::live(key, self.palette, field);
            self.show(view);
        }
    }

    fn show(&mut self, view: LayerView) {
        self.view = Some(Arc::new(view));
    }

    fn toggle_cell(&mut self, cell: usize) {
        let selected = self.plan.toggle(cell);
        debug!(cell, selected, "cell toggled");
    }

    fn fetch_kpis(&mut self) -> Command {
        let ticket = self.next_ticket();
        self.pending_kpis = Some(ticket);
        self.command(ticket, Request::FetchKpis)
    }

    fn fetch_summary(&mut self) -> Command {
        let ticket = self.next_ticket();
        self.pending_summary = Some(ticket);
        self.command(ticket, Request::FetchSummary)
    }

    fn next_ticket(&mut self) -> Ticket {
        self.serial += 1;
        Ticket {
            epoch: self.epoch,
            serial: self.serial,
        }
    }

    fn command(&self, ticket: Ticket, request: Request) -> Command {
        Command {
            ticket,
            context: self.context.clone(),
            request,
        }
    }

    fn refuse(&self, input: &Input) -> StateError {
        StateError {
            action: input.action(),
            phase: self.phase,
        }
    }

    fn require_edits(&self, input: &Input) -> Result<(), StateError> {
        if self.phase.accepts_edits() {
            Ok(())
        } else {
            Err(self.refuse(input))
        }
    }

    fn resting_phase(&self) -> Phase {
        if self.view.as_ref().is_some_and(|view| view.is_degraded()) {
            Phase::Degraded
        } else {
            Phase::Ready
        }
    }

    /// Keeps `Loading`, `Ready` and `Degraded` in line with what is on screen.
    fn sync_phase_with_view(&mut self) {
        let next = match self.phase {
            Phase::Loading | Phase::Ready | Phase::Degraded => self.resting_phase(),
            _ => return,
        };
        if next != self.phase {
            self.transition(next);
        }
    }

    fn transition(&mut self, next: Phase) {
        if !self.phase.can_transition_to(next) {
            warn!(from = %self.phase, to = %next, "unexpected phase transition");
        }
        debug!(from = %self.phase, to = %next, "phase");
        self.phase = next;
    }
}
