use serde_json::json;

use crate::cache;
use crate::calc;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{cache_ref, db_conn, local_history};
use crate::ipc::types::{AppState, Request};
use crate::session::EvaluationState;

fn entry_json(state: &EvaluationState) -> serde_json::Value {
    json!({
        "state": state,
        "total": calc::grand_total(&state.scores),
    })
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let (Some(profile), Some(conn)) = (state.auth.as_ref(), state.db.as_ref()) {
        let entries = match db::list_for_owner(conn, &profile.id) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let rows = entries
            .iter()
            .map(|e| {
                let mut row = entry_json(&e.state);
                row["id"] = json!(e.id);
                row["juryNumber"] = json!(e.jury_number);
                row["createdAt"] = json!(e.created_at);
                row["updatedAt"] = json!(e.updated_at);
                row
            })
            .collect::<Vec<_>>();
        return ok(&req.id, json!({ "tier": "store", "entries": rows }));
    }

    let cache = match cache_ref(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rows = local_history(cache)
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let mut row = entry_json(e);
            row["index"] = json!(i);
            row
        })
        .collect::<Vec<_>>();
    ok(&req.id, json!({ "tier": "local", "entries": rows }))
}

/// Admin/principal view over every jury's rows, optionally sliced by jury
/// number.
fn handle_list_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(profile) = state.auth.as_ref() else {
        return err(&req.id, "unauthorized", "sign in first", None);
    };
    if !profile.role.can_read_all() {
        return err(
            &req.id,
            "forbidden",
            "listing all juries requires an admin or principal profile",
            None,
        );
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let jury_filter = req.params.get("juryNumber").and_then(|v| v.as_str());
    let entries = match jury_filter {
        Some(jury) => db::list_by_jury(conn, jury),
        None => db::list_all(conn),
    };
    let entries = match entries {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let jury_numbers = match db::jury_numbers(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = entries
        .iter()
        .map(|e| {
            let mut row = entry_json(&e.state);
            row["id"] = json!(e.id);
            row["juryNumber"] = json!(e.jury_number);
            row["createdAt"] = json!(e.created_at);
            row
        })
        .collect::<Vec<_>>();
    ok(
        &req.id,
        json!({ "entries": rows, "juryNumbers": jury_numbers }),
    )
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(id) = req.params.get("id").and_then(|v| v.as_str()) {
        let Some(profile) = state.auth.clone() else {
            return err(&req.id, "unauthorized", "sign in first", None);
        };
        let conn = match db_conn(state, req) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let entry = match db::get_evaluation(conn, id) {
            Ok(Some(e)) => e,
            Ok(None) => return err(&req.id, "not_found", "evaluation not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if entry.user_id != profile.id && !profile.role.can_read_all() {
            return err(&req.id, "forbidden", "evaluation belongs to another jury", None);
        }
        return match db::delete_evaluation(conn, id) {
            Ok(deleted) => ok(&req.id, json!({ "deleted": deleted })),
            Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
        };
    }

    if let Some(index) = req.params.get("index").and_then(|v| v.as_u64()) {
        let cache = match cache_ref(state, req) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let mut history = local_history(cache);
        let index = index as usize;
        if index >= history.len() {
            return err(&req.id, "not_found", "history index out of range", None);
        }
        history.remove(index);
        if let Err(e) = cache.set_json(cache::HISTORY_KEY, &history) {
            return err(&req.id, "io_failed", e.to_string(), None);
        }
        return ok(&req.id, json!({ "deleted": true }));
    }

    err(&req.id, "bad_params", "missing id or index", None)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "history.list" => Some(handle_list(state, req)),
        "history.listAll" => Some(handle_list_all(state, req)),
        "history.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
