use std::time::Instant;

use rusqlite::Connection;
use serde_json::json;

use crate::cache::{self, LocalCache};
use crate::calc;
use crate::db;
use crate::export::interchange::ImportedJury;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::session::{EvaluationState, TaggedEvaluation, WriteTarget};

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn cache_ref<'a>(state: &'a AppState, req: &Request) -> Result<&'a LocalCache, serde_json::Value> {
    state
        .cache
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Mirrors the live draft to the cache (and to the store's cross-device
/// draft row when signed in). Failures are logged, never surfaced: the
/// in-memory state stays authoritative.
pub fn persist_draft(state: &AppState) {
    if let Some(cache) = state.cache.as_ref() {
        if let Err(e) = cache.set_json(cache::CURRENT_KEY, &state.session.state) {
            tracing::warn!(error = %e, "failed to cache current draft");
        }
    }
    if let (Some(profile), Some(conn)) = (state.auth.as_ref(), state.db.as_ref()) {
        if let Err(e) = db::save_current(conn, &profile.id, &state.session.state) {
            tracing::warn!(error = %e, "failed to save cross-device draft");
        }
    }
}

/// Runs after every session mutation: draft mirror plus autosave re-arm.
pub fn after_mutation(state: &mut AppState) {
    state.session.maybe_arm_autosave();
    persist_draft(state);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Created(String),
    Updated,
    LocalSaved(usize),
    Skipped,
}

impl FlushOutcome {
    pub fn as_json(&self) -> serde_json::Value {
        match self {
            FlushOutcome::Created(id) => json!({ "flushed": true, "created": id }),
            FlushOutcome::Updated => json!({ "flushed": true, "updated": true }),
            FlushOutcome::LocalSaved(index) => json!({ "flushed": true, "localIndex": index }),
            FlushOutcome::Skipped => json!({ "flushed": false }),
        }
    }
}

/// Fires the debounced save if due (or forced) and writes the evaluation
/// through to its tier: a store row when signed in, the cache-backed local
/// history otherwise. The first store write learns the row id; later ones
/// update it (last-write-wins on the same id).
pub fn flush_autosave(state: &mut AppState, force: bool) -> FlushOutcome {
    let due = if force {
        state.session.autosave.fire_now()
    } else {
        state.session.autosave.fire_if_due(Instant::now())
    };
    if !due {
        return FlushOutcome::Skipped;
    }
    write_through(state)
}

pub fn write_through(state: &mut AppState) -> FlushOutcome {
    let snapshot = state.session.state.clone();
    if snapshot.candidate.nom.trim().is_empty() || snapshot.scores.is_empty() {
        return FlushOutcome::Skipped;
    }

    let profile = state.auth.clone();
    if let (Some(profile), Some(conn)) = (profile, state.db.as_ref()) {
        match state.session.write_target.clone() {
            Some(WriteTarget::Store(id)) => match db::update_evaluation(conn, &id, &snapshot) {
                Ok(true) => FlushOutcome::Updated,
                Ok(false) => {
                    tracing::warn!(%id, "store row vanished; keeping draft in cache");
                    FlushOutcome::Skipped
                }
                Err(e) => {
                    tracing::warn!(error = %e, "store update failed; draft remains cached");
                    FlushOutcome::Skipped
                }
            },
            Some(WriteTarget::Local(index)) => local_save(state, Some(index), &snapshot),
            None => {
                let jury_number = if profile.jury_number.trim().is_empty() {
                    snapshot.jury.jury_number.clone()
                } else {
                    profile.jury_number.clone()
                };
                match db::create_evaluation(conn, &profile.id, &jury_number, &snapshot) {
                    Ok(id) => {
                        state.session.write_target = Some(WriteTarget::Store(id.clone()));
                        FlushOutcome::Created(id)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "store create failed; draft remains cached");
                        FlushOutcome::Skipped
                    }
                }
            }
        }
    } else {
        let target = match state.session.write_target.clone() {
            Some(WriteTarget::Local(index)) => Some(index),
            Some(WriteTarget::Store(_)) => {
                tracing::warn!("store write target without a signed-in profile; skipping flush");
                return FlushOutcome::Skipped;
            }
            None => None,
        };
        local_save(state, target, &snapshot)
    }
}

fn local_save(state: &mut AppState, index: Option<usize>, snapshot: &EvaluationState) -> FlushOutcome {
    let Some(cache) = state.cache.as_ref() else {
        return FlushOutcome::Skipped;
    };
    let mut history = local_history(cache);
    let outcome = match index {
        Some(i) if i < history.len() => {
            history[i] = snapshot.clone();
            FlushOutcome::LocalSaved(i)
        }
        _ => {
            history.push(snapshot.clone());
            let i = history.len() - 1;
            state.session.write_target = Some(WriteTarget::Local(i));
            FlushOutcome::LocalSaved(i)
        }
    };
    if let Err(e) = cache.set_json(cache::HISTORY_KEY, &history) {
        tracing::warn!(error = %e, "failed to write local history");
        return FlushOutcome::Skipped;
    }
    outcome
}

pub fn local_history(cache: &LocalCache) -> Vec<EvaluationState> {
    cache
        .get_json::<Vec<EvaluationState>>(cache::HISTORY_KEY)
        .unwrap_or_default()
}

pub fn imported_juries(cache: &LocalCache) -> Vec<ImportedJury> {
    cache
        .get_json::<Vec<ImportedJury>>(cache::IMPORTED_KEY)
        .unwrap_or_default()
}

/// Which slice of the evaluation table an analytics/export view reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Own,
    All,
}

pub fn parse_scope(req: &Request) -> Result<Scope, serde_json::Value> {
    match req
        .params
        .get("scope")
        .and_then(|v| v.as_str())
        .map(|s| s.to_ascii_lowercase())
        .as_deref()
    {
        None | Some("own") => Ok(Scope::Own),
        Some("all") => Ok(Scope::All),
        Some(other) => Err(err(
            &req.id,
            "bad_params",
            "scope must be one of: own, all",
            Some(json!({ "scope": other })),
        )),
    }
}

/// Completed evaluations visible to the caller, before imported juries are
/// merged in.
pub fn owned_entries(state: &AppState, req: &Request, scope: Scope) -> Result<Vec<TaggedEvaluation>, serde_json::Value> {
    match scope {
        Scope::All => {
            let Some(profile) = state.auth.as_ref() else {
                return Err(err(&req.id, "unauthorized", "sign in first", None));
            };
            if !profile.role.can_read_all() {
                return Err(err(
                    &req.id,
                    "forbidden",
                    "scope 'all' requires an admin or principal profile",
                    None,
                ));
            }
            let conn = db_conn(state, req)?;
            let entries = db::list_all(conn)
                .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
            Ok(entries
                .into_iter()
                .map(|e| TaggedEvaluation {
                    jury_number: e.jury_number.clone(),
                    state: e.state,
                })
                .collect())
        }
        Scope::Own => {
            if let (Some(profile), Some(conn)) = (state.auth.as_ref(), state.db.as_ref()) {
                let entries = db::list_for_owner(conn, &profile.id)
                    .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
                return Ok(entries
                    .into_iter()
                    .map(|e| TaggedEvaluation {
                        jury_number: e.jury_number.clone(),
                        state: e.state,
                    })
                    .collect());
            }
            let cache = cache_ref(state, req)?;
            let default_jury = cache
                .get_json::<crate::session::JuryInfo>(cache::JURY_KEY)
                .map(|j| j.jury_number)
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Local".to_string());
            Ok(local_history(cache)
                .into_iter()
                .map(|entry| {
                    let jury_number = if entry.jury.jury_number.trim().is_empty() {
                        default_jury.clone()
                    } else {
                        entry.jury.jury_number.clone()
                    };
                    TaggedEvaluation {
                        state: entry,
                        jury_number,
                    }
                })
                .collect())
        }
    }
}

/// The full comparison collection: the caller's slice of the store plus
/// every locally imported jury.
pub fn tagged_collection(
    state: &AppState,
    req: &Request,
    scope: Scope,
) -> Result<Vec<TaggedEvaluation>, serde_json::Value> {
    let mut out = owned_entries(state, req, scope)?;
    if let Some(cache) = state.cache.as_ref() {
        for imported in imported_juries(cache) {
            let jury_number = imported.payload.jury.jury_number.clone();
            for candidate in imported.payload.candidates {
                out.push(TaggedEvaluation {
                    state: candidate,
                    jury_number: jury_number.clone(),
                });
            }
        }
    }
    Ok(out)
}

/// The step/section/totals view returned by every session mutation.
pub fn session_view(state: &AppState) -> serde_json::Value {
    let session = &state.session;
    let scores = &session.state.scores;
    let sections: Vec<serde_json::Value> = state
        .grille
        .sections
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "title": s.title,
                "maxPoints": s.max_points,
                "total": calc::section_total(scores, s.id),
                "complete": calc::section_complete(s, scores),
            })
        })
        .collect();
    let write_target = match &session.write_target {
        Some(WriteTarget::Store(id)) => json!({ "kind": "store", "id": id }),
        Some(WriteTarget::Local(index)) => json!({ "kind": "local", "index": index }),
        None => serde_json::Value::Null,
    };
    json!({
        "state": session.state,
        "sectionIndex": session.section_index,
        "sections": sections,
        "grandTotal": calc::grand_total(scores),
        "viewingHistory": session.viewing_history(),
        "writeTarget": write_target,
        "autosavePending": session.autosave.is_armed(),
    })
}
