use std::path::PathBuf;

use chrono::{Local, Utc};
use serde_json::json;

use crate::archive;
use crate::cache;
use crate::db;
use crate::export::{csv, interchange, pdf};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{cache_ref, local_history, owned_entries, parse_scope, required_str, tagged_collection, Scope};
use crate::ipc::types::{AppState, Request};
use crate::session::{EvaluationState, JuryInfo};

fn out_dir(req: &Request) -> Result<PathBuf, serde_json::Value> {
    let dir = required_str(req, "outDir")?;
    let path = PathBuf::from(dir);
    std::fs::create_dir_all(&path).map_err(|e| {
        err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": path.to_string_lossy() })),
        )
    })?;
    Ok(path)
}

fn write_file(req: &Request, path: &PathBuf, bytes: &[u8]) -> Result<(), serde_json::Value> {
    std::fs::write(path, bytes).map_err(|e| {
        err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": path.to_string_lossy() })),
        )
    })
}

/// The evaluation a single-candidate export targets: an explicit store row,
/// a local history slot, or the live session state.
fn resolve_single(state: &AppState, req: &Request) -> Result<EvaluationState, serde_json::Value> {
    if let Some(id) = req.params.get("id").and_then(|v| v.as_str()) {
        let Some(conn) = state.db.as_ref() else {
            return Err(err(&req.id, "no_workspace", "select a workspace first", None));
        };
        return match db::get_evaluation(conn, id) {
            Ok(Some(entry)) => Ok(entry.state),
            Ok(None) => Err(err(&req.id, "not_found", "evaluation not found", None)),
            Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
        };
    }
    if let Some(index) = req.params.get("index").and_then(|v| v.as_u64()) {
        let cache = cache_ref(state, req)?;
        return local_history(cache)
            .get(index as usize)
            .cloned()
            .ok_or_else(|| err(&req.id, "not_found", "history index out of range", None));
    }
    Ok(state.session.state.clone())
}

/// The jury identity stamped on collection exports: the live session's jury
/// if set, else the cached defaults.
fn export_jury(state: &AppState) -> JuryInfo {
    if !state.session.state.jury.jury_number.trim().is_empty() {
        return state.session.state.jury.clone();
    }
    state
        .cache
        .as_ref()
        .and_then(|c| c.get_json::<JuryInfo>(cache::JURY_KEY))
        .unwrap_or_else(|| state.session.state.jury.clone())
}

fn handle_evaluation_pdf(state: &mut AppState, req: &Request) -> serde_json::Value {
    let dir = match out_dir(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let evaluation = match resolve_single(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let bytes = pdf::evaluation_document(&state.grille, std::slice::from_ref(&evaluation));
    let path = dir.join(pdf::single_filename(&evaluation.candidate));
    if let Err(e) = write_file(req, &path, &bytes) {
        return e;
    }
    ok(
        &req.id,
        json!({ "path": path.to_string_lossy(), "pages": state.grille.sections.len() }),
    )
}

fn handle_session_pdf(state: &mut AppState, req: &Request) -> serde_json::Value {
    let dir = match out_dir(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scope = match parse_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let entries = match owned_entries(state, req, scope) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if entries.is_empty() {
        return err(&req.id, "not_found", "no completed evaluations to export", None);
    }
    let states: Vec<EvaluationState> = entries.into_iter().map(|t| t.state).collect();
    let bytes = pdf::evaluation_document(&state.grille, &states);
    let path = dir.join(pdf::bulk_filename(Local::now().date_naive()));
    if let Err(e) = write_file(req, &path, &bytes) {
        return e;
    }
    ok(
        &req.id,
        json!({ "path": path.to_string_lossy(), "candidates": states.len() }),
    )
}

fn handle_evaluations_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let dir = match out_dir(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scope = match parse_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let entries = match owned_entries(state, req, scope) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let states: Vec<EvaluationState> = entries.into_iter().map(|t| t.state).collect();
    let text = csv::evaluations_csv(&state.grille, &states);
    let path = dir.join(csv::evaluations_filename(Local::now().date_naive()));
    if let Err(e) = write_file(req, &path, text.as_bytes()) {
        return e;
    }
    ok(
        &req.id,
        json!({ "path": path.to_string_lossy(), "rows": states.len() }),
    )
}

fn handle_ranking_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let dir = match out_dir(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scope = match parse_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let collection = match tagged_collection(state, req, scope) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let text = csv::ranking_csv(&state.grille, &collection);
    let path = dir.join(csv::ranking_filename(Local::now().date_naive()));
    if let Err(e) = write_file(req, &path, text.as_bytes()) {
        return e;
    }
    ok(
        &req.id,
        json!({ "path": path.to_string_lossy(), "rows": collection.len() }),
    )
}

fn handle_jury_json(state: &mut AppState, req: &Request) -> serde_json::Value {
    let dir = match out_dir(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let entries = match owned_entries(state, req, Scope::Own) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let jury = export_jury(state);
    let payload = interchange::build_payload(
        jury,
        entries.into_iter().map(|t| t.state).collect(),
        Utc::now().to_rfc3339(),
    );
    let text = match serde_json::to_string_pretty(&payload) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "io_failed", e.to_string(), None),
    };
    let path = dir.join(interchange::json_filename(
        &payload.jury.jury_number,
        Local::now().date_naive(),
    ));
    if let Err(e) = write_file(req, &path, text.as_bytes()) {
        return e;
    }
    ok(
        &req.id,
        json!({ "path": path.to_string_lossy(), "candidates": payload.candidates.len() }),
    )
}

/// Bundles the interchange JSON and both CSVs into one zip for offline
/// hand-off to the harmonization meeting.
fn handle_archive(state: &mut AppState, req: &Request) -> serde_json::Value {
    let dir = match out_dir(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let entries = match owned_entries(state, req, Scope::Own) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if entries.is_empty() {
        return err(&req.id, "not_found", "no completed evaluations to archive", None);
    }
    let collection = match tagged_collection(state, req, Scope::Own) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let jury = export_jury(state);
    let exported_at = Utc::now().to_rfc3339();
    let date = Local::now().date_naive();
    let states: Vec<EvaluationState> = entries.into_iter().map(|t| t.state).collect();

    let payload =
        interchange::build_payload(jury.clone(), states.clone(), exported_at.clone());
    let payload_text = match serde_json::to_string_pretty(&payload) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "io_failed", e.to_string(), None),
    };

    let files = vec![
        (
            interchange::json_filename(&jury.jury_number, date),
            payload_text.into_bytes(),
        ),
        (
            csv::evaluations_filename(date),
            csv::evaluations_csv(&state.grille, &states).into_bytes(),
        ),
        (
            csv::ranking_filename(date),
            csv::ranking_csv(&state.grille, &collection).into_bytes(),
        ),
    ];

    let jury_tag = if jury.jury_number.trim().is_empty() {
        "x".to_string()
    } else {
        jury.jury_number.trim().to_string()
    };
    let path = dir.join(format!(
        "oral_dnb_session_{}_{}.zip",
        jury_tag,
        date.format("%Y-%m-%d")
    ));
    match archive::export_session_archive(&path, &jury.jury_number, &exported_at, &files) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "path": path.to_string_lossy(),
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
            }),
        ),
        Err(e) => err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": path.to_string_lossy() })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "export.evaluationPdf" => Some(handle_evaluation_pdf(state, req)),
        "export.sessionPdf" => Some(handle_session_pdf(state, req)),
        "export.evaluationsCsv" => Some(handle_evaluations_csv(state, req)),
        "export.rankingCsv" => Some(handle_ranking_csv(state, req)),
        "export.juryJson" => Some(handle_jury_json(state, req)),
        "export.archive" => Some(handle_archive(state, req)),
        _ => None,
    }
}
