use bytes::Bytes;
use farmnav::{
    error::{GatewayError, StateError, TurnError},
    gateway::{CellDelta, DeltaSet, Kpis, LayerScope, RunSummary, SessionContext, TurnResponse},
    grid::CellCoordinate,
    layer::{Layer, LayerKey},
    palette::PaletteName,
    plan::{AttributeValue, PlanAttribute},
    raster::RasterImage,
    turn::{
        Command, Completion, ControllerSettings, Input, Phase, Request, Response, SessionStart,
        TurnController,
    },
};

const SAMPLE_040: u8 = 102;

fn controller() -> TurnController {
    TurnController::new(ControllerSettings::default()).unwrap()
}

fn start(controller: &mut TurnController, years: Vec<i32>) -> Vec<Command> {
    let context = SessionContext::new("http://backend", LayerScope::Region, "california");
    let start = SessionStart {
        run_id: "run-1".into(),
        region_id: "california".into(),
        years,
        season: 0,
    };
    controller.start_session(context, start).unwrap()
}

fn png(value: u8) -> Bytes {
    let raster = RasterImage::from_fn(10, 10, |_, _| value).unwrap();
    Bytes::from(raster.to_png().unwrap())
}

fn layer_command(commands: &[Command]) -> Command {
    commands
        .iter()
        .find(|c| matches!(c.request, Request::FetchLayer(_)))
        .cloned()
        .expect("no layer fetch issued")
}

fn command_for(commands: &[Command], wanted: fn(&Request) -> bool) -> Command {
    commands
        .iter()
        .find(|c| wanted(&c.request))
        .cloned()
        .expect("command not issued")
}

fn layer_done(command: &Command, bytes: Bytes) -> Completion {
    Completion {
        ticket: command.ticket,
        response: Response::Layer(Ok(bytes)),
    }
}

fn turn_done(command: &Command, result: Result<TurnResponse, GatewayError>) -> Completion {
    Completion {
        ticket: command.ticket,
        response: Response::Turn(result),
    }
}

fn deltas(cells: Vec<CellDelta>, t_next: Option<u32>) -> TurnResponse {
    TurnResponse {
        deltas: DeltaSet { cells },
        t_next,
        economy: None,
    }
}

/// Starts a session and loads the first layer with every sample at 0.40.
fn ready(years: Vec<i32>) -> TurnController {
    let mut controller = controller();
    let commands = start(&mut controller, years);
    controller
        .complete(layer_done(&layer_command(&commands), png(SAMPLE_040)))
        .unwrap();
    assert_eq!(controller.phase(), Phase::Ready);
    controller
}

#[test]
fn pointer_toggles_the_cell_under_it() {
    let mut controller = ready(vec![2020, 2021]);
    controller.handle_input(Input::Pointer { x: 125.0, y: 148.0 }).unwrap();
    assert!(controller.plan().contains(22));
    controller.handle_input(Input::Pointer { x: 125.0, y: 148.0 }).unwrap();
    assert!(controller.plan().is_empty());

    controller.handle_input(Input::Pointer { x: 125.0, y: 20.0 }).unwrap();
    controller.handle_input(Input::Pointer { x: 900.0, y: 148.0 }).unwrap();
    assert!(controller.plan().is_empty());
}

#[test]
fn edits_are_refused_while_loading() {
    let mut controller = controller();
    start(&mut controller, vec![2020]);
    let err = controller
        .handle_input(Input::ToggleCell(CellCoordinate::new(1, 1)))
        .unwrap_err();
    assert_eq!(
        err,
        TurnError::State(StateError {
            action: "select cells",
            phase: Phase::Loading,
        })
    );
}

#[test]
fn latest_layer_request_wins_regardless_of_completion_order() {
    for newest_first in [true, false] {
        let mut controller = ready(vec![2020, 2021]);
        let temp = layer_command(&controller.handle_input(Input::SwitchLayer(Layer::Temp)).unwrap());
        let rain = layer_command(&controller.handle_input(Input::SwitchLayer(Layer::Rain)).unwrap());

        let (first, second) = if newest_first { (&rain, &temp) } else { (&temp, &rain) };
        controller.complete(layer_done(first, png(10))).unwrap();
        controller.complete(layer_done(second, png(250))).unwrap();

        let view = controller.view().unwrap();
        assert_eq!(view.key.layer, Layer::Rain);
        let expected_sample = if newest_first { 10 } else { 250 };
        let key = LayerKey {
            layer: Layer::Rain,
            year: 2020,
            season: 0,
        };
        assert_eq!(
            controller.layer(&key).unwrap().to_raster().sample(0, 0),
            Some(expected_sample)
        );
        assert!(controller
            .layer(&LayerKey {
                layer: Layer::Temp,
                ..key
            })
            .is_none());
    }
}

#[test]
fn cached_layers_and_palette_changes_need_no_fetch() {
    let mut controller = ready(vec![2020]);
    let temp = layer_command(&controller.handle_input(Input::SwitchLayer(Layer::Temp)).unwrap());
    controller.complete(layer_done(&temp, png(40))).unwrap();

    assert!(controller.handle_input(Input::SwitchLayer(Layer::Ndvi)).unwrap().is_empty());
    assert_eq!(controller.view().unwrap().key.layer, Layer::Ndvi);

    let before = controller.view().unwrap().image.pixel(0, 0);
    assert!(controller
        .handle_input(Input::ChangePalette(PaletteName::Magma))
        .unwrap()
        .is_empty());
    let view = controller.view().unwrap();
    assert_eq!(view.palette, PaletteName::Magma);
    assert_ne!(view.image.pixel(0, 0), before);
}

#[test]
fn season_steps_never_go_below_zero() {
    let mut controller = ready(vec![2020]);
    assert!(controller.handle_input(Input::StepSeason(-1)).unwrap().is_empty());
    assert_eq!(controller.state().unwrap().season, 0);

    let next = layer_command(&controller.handle_input(Input::StepSeason(1)).unwrap());
    match &next.request {
        Request::FetchLayer(request) => assert_eq!(request.season, 1),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn season_steps_saturate_at_the_top() {
    let mut controller = ready(vec![2020]);
    for _ in 0..3 {
        controller.handle_input(Input::StepSeason(i32::MAX)).unwrap();
    }
    assert_eq!(controller.state().unwrap().season, u32::MAX);
    assert!(controller.handle_input(Input::StepSeason(1)).unwrap().is_empty());

    controller.handle_input(Input::StepSeason(i32::MIN)).unwrap();
    assert_eq!(controller.state().unwrap().season, u32::MAX - (1 << 31));
}

#[test]
fn completions_from_an_ended_session_are_dropped() {
    let mut controller = controller();
    let old = start(&mut controller, vec![2020]);
    controller.end_session();
    assert_eq!(controller.phase(), Phase::Idle);

    controller.complete(layer_done(&layer_command(&old), png(1))).unwrap();
    assert_eq!(controller.phase(), Phase::Idle);
    assert!(controller.view().is_none());

    start(&mut controller, vec![2030]);
    controller.complete(layer_done(&layer_command(&old), png(1))).unwrap();
    assert_eq!(controller.phase(), Phase::Loading);
    assert!(controller.view().is_none());
}

#[test]
fn second_advance_while_submitting_is_rejected() {
    let mut controller = ready(vec![2020, 2021]);
    controller.handle_input(Input::Pointer { x: 125.0, y: 148.0 }).unwrap();
    let submit = controller.handle_input(Input::AdvanceTurn).unwrap();
    assert_eq!(submit.len(), 1);
    assert_eq!(controller.phase(), Phase::Submitting);

    let err = controller.handle_input(Input::AdvanceTurn).unwrap_err();
    assert!(matches!(
        err,
        TurnError::State(StateError {
            phase: Phase::Submitting,
            ..
        })
    ));
    assert_eq!(controller.phase(), Phase::Submitting);
    assert!(controller.is_submitting());
    assert!(controller.handle_input(Input::RandomSelection).is_err());
}

#[test]
fn failed_submission_keeps_the_plan() {
    let mut controller = ready(vec![2020, 2021]);
    for col in 0..3 {
        controller
            .handle_input(Input::ToggleCell(CellCoordinate::new(col, 0)))
            .unwrap();
    }
    let submit = controller.handle_input(Input::AdvanceTurn).unwrap();
    let result = controller.complete(turn_done(
        &submit[0],
        Err(GatewayError::Transport("connection refused".into())),
    ));

    assert!(matches!(result, Err(TurnError::Submission(GatewayError::Transport(_)))));
    assert_eq!(controller.phase(), Phase::Ready);
    assert_eq!(controller.plan().len(), 3);
    assert_eq!(controller.state().unwrap().year_index, 0);
}

#[test]
fn out_of_grid_deltas_fail_the_submission_without_applying() {
    let mut controller = ready(vec![2020, 2021]);
    controller.handle_input(Input::Pointer { x: 125.0, y: 148.0 }).unwrap();
    let submit = controller.handle_input(Input::AdvanceTurn).unwrap();
    let response = deltas(
        vec![
            CellDelta::new(22).with("ndvi", 0.05),
            CellDelta::new(100).with("ndvi", 0.05),
        ],
        None,
    );
    let result = controller.complete(turn_done(&submit[0], Ok(response)));
    assert!(matches!(result, Err(TurnError::Submission(GatewayError::Decode(_)))));

    let key = LayerKey {
        layer: Layer::Ndvi,
        year: 2020,
        season: 0,
    };
    let value = controller.layer(&key).unwrap().value(22).unwrap();
    assert!((value - 0.40).abs() < 1e-4);
    assert!(controller.plan().contains(22));
}

#[test]
fn deltas_are_added_and_the_next_year_loads() {
    let mut controller = ready(vec![2020, 2021]);
    controller.handle_input(Input::Pointer { x: 125.0, y: 148.0 }).unwrap();
    let submit = controller.handle_input(Input::AdvanceTurn).unwrap();
    match &submit[0].request {
        Request::SubmitTurn(request) => {
            assert_eq!(request.year, 2020);
            assert_eq!(request.run_id, "run-1");
            assert_eq!(request.decisions.water.irrigate_cells, vec![22]);
        }
        other => panic!("unexpected {other:?}"),
    }

    let response = deltas(vec![CellDelta::new(22).with("ndvi", 0.05).with("water", -0.02)], Some(2));
    let follow_up = controller.complete(turn_done(&submit[0], Ok(response))).unwrap();

    let key = LayerKey {
        layer: Layer::Ndvi,
        year: 2020,
        season: 0,
    };
    let field = controller.layer(&key).unwrap();
    assert!((field.value(22).unwrap() - 0.45).abs() < 1e-4);
    assert!((field.value(21).unwrap() - 0.40).abs() < 1e-4);

    assert_eq!(controller.phase(), Phase::Loading);
    assert!(controller.plan().is_empty());
    let state = controller.state().unwrap();
    assert_eq!(state.current_year(), 2021);
    assert_eq!(state.season, 2);

    let next = layer_command(&follow_up);
    match &next.request {
        Request::FetchLayer(request) => {
            assert_eq!((request.year, request.season), (2021, 2));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(follow_up.iter().any(|c| c.request == Request::FetchKpis));

    controller.complete(layer_done(&next, png(200))).unwrap();
    assert_eq!(controller.phase(), Phase::Ready);
}

#[test]
fn final_year_completes_with_a_summary() {
    let mut controller = ready(vec![2020]);
    let submit = controller.handle_input(Input::AdvanceTurn).unwrap();
    let follow_up = controller
        .complete(turn_done(&submit[0], Ok(deltas(Vec::new(), None))))
        .unwrap();
    assert_eq!(controller.phase(), Phase::Complete);

    let summary = command_for(&follow_up, |r| *r == Request::FetchSummary);
    controller
        .complete(Completion {
            ticket: summary.ticket,
            response: Response::Summary(Ok(RunSummary {
                score: [("eco".to_string(), 0.7)].into_iter().collect(),
                analysis_text: "fine".into(),
            })),
        })
        .unwrap();
    assert_eq!(controller.summary().unwrap().eco(), Some(0.7));

    let kpis = command_for(&follow_up, |r| *r == Request::FetchKpis);
    controller
        .complete(Completion {
            ticket: kpis.ticket,
            response: Response::Kpis(Ok(Kpis {
                values: [("cash".to_string(), 9_000.0)].into_iter().collect(),
            })),
        })
        .unwrap();
    assert_eq!(controller.kpis().unwrap().get("cash"), Some(9_000.0));

    assert!(controller.handle_input(Input::AdvanceTurn).is_err());
    assert!(controller
        .handle_input(Input::ToggleCell(CellCoordinate::new(0, 0)))
        .is_err());
}

#[test]
fn unavailable_layer_degrades_but_stays_playable() {
    let mut controller = controller();
    let commands = start(&mut controller, vec![2020, 2021]);
    controller
        .complete(Completion {
            ticket: layer_command(&commands).ticket,
            response: Response::Layer(Err(GatewayError::Status {
                status: 404,
                url: "http://backend/region/california/layer".into(),
            })),
        })
        .unwrap();
    assert_eq!(controller.phase(), Phase::Degraded);
    let view = controller.view().unwrap();
    assert!(view.is_degraded());
    assert_eq!((view.image.width(), view.image.height()), (500, 500));

    controller.handle_input(Input::Pointer { x: 10.0, y: 60.0 }).unwrap();
    assert!(controller.plan().contains(0));

    let temp = layer_command(&controller.handle_input(Input::SwitchLayer(Layer::Temp)).unwrap());
    controller.complete(layer_done(&temp, png(128))).unwrap();
    assert_eq!(controller.phase(), Phase::Ready);
    assert!(!controller.view().unwrap().is_degraded());
}

#[test]
fn undecodable_or_mis_sized_rasters_degrade() {
    let mut controller = controller();
    let commands = start(&mut controller, vec![2020]);
    controller
        .complete(layer_done(&layer_command(&commands), Bytes::from_static(b"not a png")))
        .unwrap();
    assert_eq!(controller.phase(), Phase::Degraded);

    let wrong_size = RasterImage::from_fn(3, 3, |_, _| 5).unwrap().to_png().unwrap();
    let temp = layer_command(&controller.handle_input(Input::SwitchLayer(Layer::Temp)).unwrap());
    controller.complete(layer_done(&temp, Bytes::from(wrong_size))).unwrap();
    assert_eq!(controller.phase(), Phase::Degraded);
}

#[test]
fn random_selection_is_seeded() {
    let mut a = ready(vec![2020]);
    let mut b = ready(vec![2020]);
    a.handle_input(Input::RandomSelection).unwrap();
    b.handle_input(Input::RandomSelection).unwrap();
    assert_eq!(a.plan().len(), 50);

    let mut cells_a: Vec<_> = a.plan().diff().iter().map(|(cell, _)| cell).collect();
    let mut cells_b: Vec<_> = b.plan().diff().iter().map(|(cell, _)| cell).collect();
    cells_a.sort_unstable();
    cells_b.sort_unstable();
    assert_eq!(cells_a, cells_b);
}

#[test]
fn apply_plan_uploads_without_advancing() {
    let mut controller = ready(vec![2020, 2021]);
    controller.handle_input(Input::Pointer { x: 125.0, y: 148.0 }).unwrap();
    let upload = controller.handle_input(Input::ApplyPlan).unwrap();
    match &upload[0].request {
        Request::UploadPlan(payload) => assert!(payload.cells.contains_key(&22)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(controller.phase(), Phase::Ready);

    let follow_up = controller
        .complete(Completion {
            ticket: upload[0].ticket,
            response: Response::PlanAck(Ok(farmnav::gateway::PlanAck(serde_json::json!({"ok": true})))),
        })
        .unwrap();
    assert_eq!(follow_up.len(), 1);
    assert_eq!(follow_up[0].request, Request::FetchKpis);
    assert_eq!(controller.plan().len(), 1);
    assert_eq!(controller.state().unwrap().year_index, 0);
}

#[test]
fn selecting_cells_keeps_other_plan_edits() {
    let mut controller = ready(vec![2020, 2021]);
    controller
        .handle_input(Input::SetAttribute {
            cell: CellCoordinate::new(2, 2),
            attribute: PlanAttribute::Crop,
            value: AttributeValue::Choice("wheat".into()),
        })
        .unwrap();
    controller
        .handle_input(Input::ToggleFlag {
            cell: CellCoordinate::new(1, 9),
            attribute: PlanAttribute::Drainage,
        })
        .unwrap();

    controller.handle_input(Input::Pointer { x: 125.0, y: 148.0 }).unwrap();
    let entry = controller.plan().entry(22).unwrap();
    assert!(entry.flag(PlanAttribute::Irrigate));
    assert_eq!(
        entry.get(PlanAttribute::Crop).and_then(AttributeValue::as_choice),
        Some("wheat")
    );

    controller.handle_input(Input::RandomSelection).unwrap();
    assert_eq!(controller.plan().selected().len(), 50);
    let plan = controller.plan().diff();
    assert_eq!(plan.cells_with(PlanAttribute::Crop).len(), 1);
    assert_eq!(plan.cells_flagged(PlanAttribute::Drainage), vec![91]);
}

#[test]
fn year_index_never_moves_backwards() {
    let mut controller = ready(vec![2020, 2021, 2022]);
    let mut seen = vec![controller.state().unwrap().year_index];
    let mut replayed: Vec<Completion> = Vec::new();

    let failed = controller.handle_input(Input::AdvanceTurn).unwrap();
    let failure = turn_done(&failed[0], Err(GatewayError::Transport("reset".into())));
    assert!(controller.complete(failure.clone()).is_err());
    replayed.push(failure);
    seen.push(controller.state().unwrap().year_index);

    while controller.phase() != Phase::Complete {
        let submit = controller.handle_input(Input::AdvanceTurn).unwrap();
        let success = turn_done(&submit[0], Ok(deltas(Vec::new(), None)));
        let follow_up = controller.complete(success.clone()).unwrap();
        seen.push(controller.state().unwrap().year_index);

        if controller.phase() == Phase::Loading {
            controller
                .complete(layer_done(&layer_command(&follow_up), png(SAMPLE_040)))
                .unwrap();
        }
        for stale in replayed.iter().cloned() {
            assert!(controller.complete(stale).unwrap().is_empty());
            seen.push(controller.state().unwrap().year_index);
        }
        replayed.push(success);
    }

    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "{seen:?}");
    let mut distinct = seen.clone();
    distinct.dedup();
    assert_eq!(distinct, vec![0, 1, 2]);
    assert_eq!(controller.phase(), Phase::Complete);

    start(&mut controller, vec![2030, 2031]);
    for stale in replayed {
        assert!(controller.complete(stale).unwrap().is_empty());
        assert_eq!(controller.state().unwrap().year_index, 0);
    }
    assert_eq!(controller.phase(), Phase::Loading);
}
