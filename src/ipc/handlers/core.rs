use std::path::PathBuf;

use serde_json::json;

use crate::cache::{self, LocalCache};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{persist_draft, required_str};
use crate::ipc::types::{AppState, Request};
use crate::rubric;
use crate::session::{EvaluationState, JuryInfo, Session};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspace": state.workspace.as_ref().map(|p| p.to_string_lossy()),
            "signedIn": state.auth.is_some(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = PathBuf::from(&path);

    // Drop the previous handle before reopening elsewhere.
    state.db = None;
    state.auth = None;

    let conn = match db::open_db(&workspace) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_open_failed", e.to_string(), None),
    };
    let cache = LocalCache::open(&workspace);

    // Page-reload continuity: resume the cached draft if one exists,
    // otherwise pre-fill jury info from the last-used snapshot.
    let draft = cache.get_json::<EvaluationState>(cache::CURRENT_KEY);
    let resumed = draft.is_some();
    let session = match draft {
        Some(draft) => Session::from_draft(draft),
        None => match cache.get_json::<JuryInfo>(cache::JURY_KEY) {
            Some(jury) => {
                let mut fresh = Session::new();
                fresh.state.jury = jury;
                fresh
            }
            None => Session::new(),
        },
    };

    state.workspace = Some(workspace.clone());
    state.db = Some(conn);
    state.cache = Some(cache);
    state.session = session;
    persist_draft(state);

    ok(
        &req.id,
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "resumedDraft": resumed,
        }),
    )
}

/// Wipes the four cache keys and restarts the session from scratch. The
/// store is untouched.
fn handle_workspace_clear_cache(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(cache) = state.cache.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    for key in [
        cache::CURRENT_KEY,
        cache::HISTORY_KEY,
        cache::JURY_KEY,
        cache::IMPORTED_KEY,
    ] {
        if let Err(e) = cache.remove(key) {
            return err(&req.id, "io_failed", e.to_string(), Some(json!({ "key": key })));
        }
    }
    state.session = Session::new();
    ok(&req.id, json!({ "cleared": true }))
}

fn handle_rubric_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    match req.params.get("session").and_then(|v| v.as_str()) {
        None => ok(&req.id, json!(state.grille)),
        Some(session) => match rubric::for_session(session) {
            Some(grille) => ok(&req.id, json!(grille)),
            None => err(
                &req.id,
                "not_found",
                format!("no rubric for session {}", session),
                None,
            ),
        },
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "workspace.clearCache" => Some(handle_workspace_clear_cache(state, req)),
        "rubric.get" => Some(handle_rubric_get(state, req)),
        _ => None,
    }
}
