use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::after_mutation;
use crate::ipc::types::{AppState, Request};
use crate::session::Phase;
use crate::timer::TimerData;

fn parse_phase(req: &Request) -> Result<Phase, serde_json::Value> {
    match req.params.get("phase").and_then(|v| v.as_str()) {
        Some("expose") => Ok(Phase::Expose),
        Some("entretien") => Ok(Phase::Entretien),
        Some(other) => Err(err(
            &req.id,
            "bad_params",
            "phase must be one of: expose, entretien",
            Some(json!({ "phase": other })),
        )),
        None => Err(err(&req.id, "bad_params", "missing phase", None)),
    }
}

fn timer_json(state: &AppState, phase: Phase) -> serde_json::Value {
    let timer = state.timer(phase);
    json!({
        "phase": phase.as_str(),
        "running": timer.is_running(),
        "initialSeconds": timer.initial_seconds(),
        "remainingSeconds": timer.remaining_seconds(),
        "elapsedSeconds": timer.elapsed_seconds(),
        "overtime": timer.is_overtime(),
        "alert": timer.is_alert(),
        "timeString": timer.time_string(),
    })
}

fn handle_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let phase = match parse_phase(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(&req.id, timer_json(state, phase))
}

fn handle_start(state: &mut AppState, req: &Request) -> serde_json::Value {
    let phase = match parse_phase(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    state.timer_mut(phase).start();
    ok(&req.id, timer_json(state, phase))
}

fn handle_pause(state: &mut AppState, req: &Request) -> serde_json::Value {
    let phase = match parse_phase(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    state.timer_mut(phase).pause();
    ok(&req.id, timer_json(state, phase))
}

fn handle_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let phase = match parse_phase(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    state.timer_mut(phase).reset();
    ok(&req.id, timer_json(state, phase))
}

fn handle_set_duration(state: &mut AppState, req: &Request) -> serde_json::Value {
    let phase = match parse_phase(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(minutes) = req.params.get("minutes").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing minutes", None);
    };
    if minutes <= 0 {
        return err(&req.id, "bad_params", "minutes must be positive", None);
    }
    state.timer_mut(phase).set_duration(minutes);
    ok(&req.id, timer_json(state, phase))
}

fn handle_tick(state: &mut AppState, req: &Request) -> serde_json::Value {
    let phase = match parse_phase(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let seconds = req
        .params
        .get("seconds")
        .and_then(|v| v.as_i64())
        .unwrap_or(1);
    if seconds < 0 {
        return err(&req.id, "bad_params", "seconds must not be negative", None);
    }
    state.timer_mut(phase).tick(seconds);
    ok(&req.id, timer_json(state, phase))
}

/// Stops the phase clock and stores its expected/actual durations on the
/// evaluation.
fn handle_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let phase = match parse_phase(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let timer = state.timer_mut(phase);
    timer.pause();
    let data = TimerData {
        expected_seconds: timer.initial_seconds(),
        actual_seconds: timer.elapsed_seconds(),
    };
    state.session.set_timer(phase, data);
    after_mutation(state);
    ok(
        &req.id,
        json!({ "timer": timer_json(state, phase), "recorded": data }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timer.status" => Some(handle_status(state, req)),
        "timer.start" => Some(handle_start(state, req)),
        "timer.pause" => Some(handle_pause(state, req)),
        "timer.reset" => Some(handle_reset(state, req)),
        "timer.setDuration" => Some(handle_set_duration(state, req)),
        "timer.tick" => Some(handle_tick(state, req)),
        "timer.record" => Some(handle_record(state, req)),
        _ => None,
    }
}
