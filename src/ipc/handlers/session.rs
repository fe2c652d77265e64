use serde_json::json;

use crate::cache;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    after_mutation, cache_ref, local_history, persist_draft, required_str, session_view,
    write_through, FlushOutcome,
};
use crate::ipc::types::{AppState, Request};
use crate::session::{CandidatePatch, JuryPatch, Phase, SectionAdvance, WriteTarget};
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

fn view_ok(state: &AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, session_view(state))
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    view_ok(state, req)
}

fn handle_set_jury(state: &mut AppState, req: &Request) -> serde_json::Value {
    let patch: JuryPatch = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    state.session.set_jury(patch);

    // Cross-session default: the next session pre-fills from this snapshot.
    if let Some(cache) = state.cache.as_ref() {
        if let Err(e) = cache.set_json(cache::JURY_KEY, &state.session.state.jury) {
            tracing::warn!(error = %e, "failed to cache jury defaults");
        }
    }
    after_mutation(state);
    view_ok(state, req)
}

fn handle_set_candidate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let patch: CandidatePatch = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    state.session.set_candidate(patch);
    after_mutation(state);
    view_ok(state, req)
}

fn handle_set_score(state: &mut AppState, req: &Request) -> serde_json::Value {
    let criterion_id = match required_str(req, "criterionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(points) = req.params.get("points").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "missing points", None);
    };
    let Some(criterion) = state.grille.find_criterion(&criterion_id) else {
        return err(
            &req.id,
            "not_found",
            format!("unknown criterion {}", criterion_id),
            None,
        );
    };
    let valid = points == 0.0 || criterion.levels.iter().any(|l| l.points == points);
    if !valid {
        return err(
            &req.id,
            "bad_params",
            "points must be 0 or one of the criterion's level values",
            Some(json!({
                "criterionId": criterion_id,
                "points": points,
                "levels": criterion.levels.iter().map(|l| l.points).collect::<Vec<_>>(),
            })),
        );
    }
    state.session.set_score(&criterion_id, points);
    after_mutation(state);
    view_ok(state, req)
}

fn handle_set_comments(state: &mut AppState, req: &Request) -> serde_json::Value {
    let comments = match required_str(req, "comments") {
        Ok(v) => v,
        Err(e) => return e,
    };
    state.session.set_comments(comments);
    after_mutation(state);
    view_ok(state, req)
}

fn handle_set_timer(state: &mut AppState, req: &Request) -> serde_json::Value {
    let phase = match parse_phase(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let expected = req
        .params
        .get("expectedSeconds")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    let Some(actual) = req.params.get("actualSeconds").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing actualSeconds", None);
    };
    state.session.set_timer(
        phase,
        TimerData {
            expected_seconds: expected,
            actual_seconds: actual,
        },
    );
    after_mutation(state);
    view_ok(state, req)
}

fn handle_next_step(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session.next_step();
    after_mutation(state);
    view_ok(state, req)
}

fn handle_prev_step(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session.prev_step();
    after_mutation(state);
    view_ok(state, req)
}

fn handle_go_to_step(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(step) = req.params.get("step").and_then(|v| v.as_u64()) else {
        return err(&req.id, "bad_params", "missing step", None);
    };
    state.session.go_to_step(step.min(u8::MAX as u64) as u8);
    after_mutation(state);
    view_ok(state, req)
}

fn handle_next_section(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.session.advance_section(&state.grille) {
        SectionAdvance::Blocked => err(
            &req.id,
            "section_incomplete",
            "every criterion in the current section needs a score",
            Some(json!({ "sectionIndex": state.session.section_index })),
        ),
        SectionAdvance::Advanced | SectionAdvance::Finished => {
            after_mutation(state);
            view_ok(state, req)
        }
    }
}

fn handle_prev_section(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session.prev_section();
    after_mutation(state);
    view_ok(state, req)
}

fn handle_next_candidate(state: &mut AppState, req: &Request) -> serde_json::Value {
    // Pending debounced write lands immediately before the reset.
    state.session.autosave.fire_now();
    let saved = write_through(state);
    state.session.next_candidate();
    persist_draft(state);
    ok(
        &req.id,
        json!({ "saved": saved.as_json(), "session": session_view(state) }),
    )
}

fn handle_flush_autosave(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session.autosave.cancel();
    let outcome = write_through(state);
    ok(&req.id, outcome.as_json())
}

fn handle_load_history_entry(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(id) = req.params.get("id").and_then(|v| v.as_str()) {
        let Some(profile) = state.auth.clone() else {
            return err(&req.id, "unauthorized", "sign in first", None);
        };
        let Some(conn) = state.db.as_ref() else {
            return err(&req.id, "no_workspace", "select a workspace first", None);
        };
        let entry = match db::get_evaluation(conn, id) {
            Ok(Some(e)) => e,
            Ok(None) => return err(&req.id, "not_found", "evaluation not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if entry.user_id != profile.id && !profile.role.can_read_all() {
            return err(&req.id, "forbidden", "evaluation belongs to another jury", None);
        }
        state
            .session
            .load_history_entry(entry.state, WriteTarget::Store(entry.id));
        persist_draft(state);
        return view_ok(state, req);
    }

    if let Some(index) = req.params.get("index").and_then(|v| v.as_u64()) {
        let cache = match cache_ref(state, req) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let history = local_history(cache);
        let Some(entry) = history.get(index as usize).cloned() else {
            return err(&req.id, "not_found", "history index out of range", None);
        };
        state
            .session
            .load_history_entry(entry, WriteTarget::Local(index as usize));
        persist_draft(state);
        return view_ok(state, req);
    }

    err(&req.id, "bad_params", "missing id or index", None)
}

fn handle_save_history_edit(state: &mut AppState, req: &Request) -> serde_json::Value {
    if !state.session.viewing_history() {
        return err(&req.id, "bad_state", "not viewing a history entry", None);
    }
    state.session.autosave.cancel();
    let outcome = write_through(state);
    if outcome == FlushOutcome::Skipped {
        return err(
            &req.id,
            "save_failed",
            "history entry could not be written back",
            None,
        );
    }
    state.session.return_to_current();
    persist_draft(state);
    ok(
        &req.id,
        json!({ "saved": outcome.as_json(), "session": session_view(state) }),
    )
}

fn handle_return_to_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    if !state.session.return_to_current() {
        return err(&req.id, "bad_state", "not viewing a history entry", None);
    }
    persist_draft(state);
    view_ok(state, req)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.get" => Some(handle_get(state, req)),
        "session.setJury" => Some(handle_set_jury(state, req)),
        "session.setCandidate" => Some(handle_set_candidate(state, req)),
        "session.setScore" => Some(handle_set_score(state, req)),
        "session.setComments" => Some(handle_set_comments(state, req)),
        "session.setTimer" => Some(handle_set_timer(state, req)),
        "session.nextStep" => Some(handle_next_step(state, req)),
        "session.prevStep" => Some(handle_prev_step(state, req)),
        "session.goToStep" => Some(handle_go_to_step(state, req)),
        "session.nextSection" => Some(handle_next_section(state, req)),
        "session.prevSection" => Some(handle_prev_section(state, req)),
        "session.nextCandidate" => Some(handle_next_candidate(state, req)),
        "session.flushAutosave" => Some(handle_flush_autosave(state, req)),
        "session.loadHistoryEntry" => Some(handle_load_history_entry(state, req)),
        "session.saveHistoryEdit" => Some(handle_save_history_edit(state, req)),
        "session.returnToCurrent" => Some(handle_return_to_current(state, req)),
        _ => None,
    }
}
