//! Async driver around [`TurnController`].
//!
//! Inputs and gateway completions share one queue and are handled strictly
//! in the order they are received. Each command becomes its own task, so
//! responses can come back in any order; the controller's tickets decide
//! which of them still count.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::TurnError;
use crate::frames::FrameWriter;
use crate::gateway::{Kpis, NewGameRequest, RunSummary, SessionContext, SimulationGateway};
use crate::turn::{
    Command, Completion, Input, LayerStatus, LayerView, Phase, Request, Response, SessionStart,
    TurnController,
};

#[derive(Debug)]
pub enum Message {
    Input(Input),
    Completion(Completion),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub run_id: Option<String>,
    pub phase: Phase,
    pub year: Option<i32>,
    pub years: Vec<i32>,
    pub season: Option<u32>,
    pub layer_status: Option<LayerStatus>,
    pub selected_cells: usize,
    pub kpis: Option<Kpis>,
    pub summary: Option<RunSummary>,
    pub frames: Vec<String>,
    pub errors: Vec<String>,
}

pub struct Session<G> {
    gateway: Arc<G>,
    controller: TurnController,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    in_flight: usize,
    frames: Option<FrameWriter>,
    last_framed: Option<Arc<LayerView>>,
    errors: Vec<TurnError>,
}

impl<G: SimulationGateway> Session<G> {
    pub fn new(gateway: G, controller: TurnController) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            gateway: Arc::new(gateway),
            controller,
            tx,
            rx,
            in_flight: 0,
            frames: None,
            last_framed: None,
            errors: Vec::new(),
        }
    }

    pub fn with_frames(mut self, writer: FrameWriter) -> Self {
        self.frames = Some(writer);
        self
    }

    pub fn controller(&self) -> &TurnController {
        &self.controller
    }

    /// Handle for feeding inputs from elsewhere, e.g. a UI thread.
    pub fn sender(&self) -> mpsc::UnboundedSender<Message> {
        self.tx.clone()
    }

    pub fn errors(&self) -> &[TurnError] {
        &self.errors
    }

    /// Creates a run on the backend and starts the turn loop on it.
    pub async fn start(
        &mut self,
        context: SessionContext,
        request: &NewGameRequest,
        years: Option<Vec<i32>>,
    ) -> Result<(), TurnError> {
        let response = self
            .gateway
            .new_game(&context, request)
            .await
            .map_err(TurnError::Start)?;
        let mut start = SessionStart::from_new_game(response, context.region_id.clone());
        if let Some(years) = years {
            start.years = years;
        }
        let commands = self.controller.start_session(context, start)?;
        self.dispatch(commands);
        Ok(())
    }

    pub fn end(&mut self) {
        self.controller.end_session();
        self.last_framed = None;
    }

    /// Queues one input behind everything already received. It is handled
    /// on the next [`Session::settle`].
    pub fn input(&self, input: Input) {
        // The receiver lives as long as `self`.
        let _ = self.tx.send(Message::Input(input));
    }

    /// Processes queued messages until no gateway call is outstanding.
    pub async fn settle(&mut self) -> Vec<TurnError> {
        let mut errors = Vec::new();
        loop {
            let message = if self.in_flight == 0 {
                match self.rx.try_recv() {
                    Ok(message) => message,
                    Err(_) => break,
                }
            } else {
                match self.rx.recv().await {
                    Some(message) => message,
                    None => break,
                }
            };
            if let Err(err) = self.process(message) {
                warn!(error = %err, "message rejected");
                errors.push(err);
            }
        }
        errors
    }

    /// Feeds inputs one at a time, letting each settle before the next.
    pub async fn run_script(&mut self, inputs: Vec<Input>) -> SessionReport {
        let leftover = self.settle().await;
        self.errors.extend(leftover);
        for input in inputs {
            debug!(?input, "script input");
            self.input(input);
            let errors = self.settle().await;
            self.errors.extend(errors);
        }
        self.report()
    }

    pub fn report(&self) -> SessionReport {
        let state = self.controller.state();
        SessionReport {
            run_id: state.map(|s| s.run_id.clone()),
            phase: self.controller.phase(),
            year: state.map(|s| s.current_year()),
            years: state.map(|s| s.years.clone()).unwrap_or_default(),
            season: state.map(|s| s.season),
            layer_status: self.controller.view().map(|view| view.status.clone()),
            selected_cells: self.controller.plan().selected().len(),
            kpis: self.controller.kpis().cloned(),
            summary: self.controller.summary().cloned(),
            frames: self
                .frames
                .as_ref()
                .map(|writer| writer.records().iter().map(|r| r.file.clone()).collect())
                .unwrap_or_default(),
            errors: self.errors.iter().map(ToString::to_string).collect(),
        }
    }

    fn process(&mut self, message: Message) -> Result<(), TurnError> {
        let result = match message {
            Message::Input(input) => self.controller.handle_input(input),
            Message::Completion(completion) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                self.controller.complete(completion)
            }
        };
        self.after(result)
    }

    fn after(&mut self, result: Result<Vec<Command>, TurnError>) -> Result<(), TurnError> {
        let commands = result?;
        self.dispatch(commands);
        self.capture_frame();
        Ok(())
    }

    fn dispatch(&mut self, commands: Vec<Command>) {
        for command in commands {
            self.in_flight += 1;
            let gateway = Arc::clone(&self.gateway);
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let completion = execute(gateway.as_ref(), command).await;
                // The receiver only goes away with the session itself.
                let _ = tx.send(Message::Completion(completion));
            });
        }
    }

    fn capture_frame(&mut self) {
        let Some(writer) = self.frames.as_mut() else {
            return;
        };
        let Some(view) = self.controller.view() else {
            return;
        };
        if self.last_framed.as_ref().is_some_and(|last| Arc::ptr_eq(last, view)) {
            return;
        }
        match writer.write(view, self.controller.grid(), self.controller.plan()) {
            Ok(path) => debug!(path = %path.display(), "frame written"),
            Err(err) => warn!(error = %err, "frame not written"),
        }
        self.last_framed = Some(Arc::clone(view));
    }
}

async fn execute<G: SimulationGateway>(gateway: &G, command: Command) -> Completion {
    let Command {
        ticket,
        context,
        request,
    } = command;
    let response = match request {
        Request::FetchLayer(request) => Response::Layer(gateway.fetch_layer(&context, &request).await),
        Request::SubmitTurn(request) => Response::Turn(gateway.submit_turn(&context, &request).await),
        Request::UploadPlan(plan) => Response::PlanAck(gateway.submit_plan(&context, &plan).await),
        Request::FetchKpis => Response::Kpis(gateway.fetch_state(&context).await),
        Request::FetchSummary => Response::Summary(gateway.fetch_summary(&context).await),
    };
    Completion { ticket, response }
}
