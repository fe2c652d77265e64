use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::cache;
use crate::db::{self, Role};
use crate::export::interchange::{self, ImportedJury, JuryExportPayload};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{cache_ref, imported_juries, required_str};
use crate::ipc::types::{AppState, Request};

/// Reads and validates a payload file; nothing is applied on failure.
fn read_payload(req: &Request) -> Result<JuryExportPayload, serde_json::Value> {
    let in_path = required_str(req, "inPath")?;
    let text = std::fs::read_to_string(&in_path).map_err(|e| {
        err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": in_path })),
        )
    })?;
    let value: serde_json::Value = serde_json::from_str(&text).map_err(|_| {
        err(
            &req.id,
            "invalid_payload",
            "file does not contain valid JSON",
            Some(json!({ "path": in_path })),
        )
    })?;
    interchange::validate_payload(&value)
        .map_err(|e| err(&req.id, e.code(), e.to_string(), Some(json!({ "path": in_path }))))
}

fn payload_summary(payload: &JuryExportPayload) -> serde_json::Value {
    json!({
        "juryNumber": payload.jury.jury_number,
        "exportDate": payload.export_date,
        "candidateCount": payload.candidates.len(),
    })
}

fn handle_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let payload = match read_payload(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let duplicate = state
        .cache
        .as_ref()
        .map(|cache| {
            imported_juries(cache)
                .iter()
                .any(|j| j.payload.jury.jury_number == payload.jury.jury_number)
        })
        .unwrap_or(false);
    let mut summary = payload_summary(&payload);
    summary["duplicate"] = json!(duplicate);
    ok(&req.id, summary)
}

fn handle_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let payload = match read_payload(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cache = match cache_ref(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut juries = imported_juries(cache);
    if juries
        .iter()
        .any(|j| j.payload.jury.jury_number == payload.jury.jury_number)
    {
        return err(
            &req.id,
            "duplicate_jury",
            format!("jury {} has already been imported", payload.jury.jury_number),
            None,
        );
    }

    let entry = ImportedJury {
        id: Uuid::new_v4().to_string(),
        import_date: Utc::now().to_rfc3339(),
        payload,
    };
    let mut summary = payload_summary(&entry.payload);
    summary["id"] = json!(entry.id);
    juries.push(entry);
    if let Err(e) = cache.set_json(cache::IMPORTED_KEY, &juries) {
        return err(&req.id, "io_failed", e.to_string(), None);
    }
    ok(&req.id, summary)
}

fn handle_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cache = match cache_ref(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut juries = imported_juries(cache);
    let before = juries.len();
    juries.retain(|j| j.id != id);
    if juries.len() == before {
        return err(&req.id, "not_found", "imported jury not found", None);
    }
    if let Err(e) = cache.set_json(cache::IMPORTED_KEY, &juries) {
        return err(&req.id, "io_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "removed": true }))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let cache = match cache_ref(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rows = imported_juries(cache)
        .iter()
        .map(|j| {
            let mut summary = payload_summary(&j.payload);
            summary["id"] = json!(j.id);
            summary["importDate"] = json!(j.import_date);
            summary
        })
        .collect::<Vec<_>>();
    ok(&req.id, json!({ "juries": rows }))
}

/// Explicit admin action: the one path where an imported payload is written
/// through to the authoritative store.
fn handle_admin_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(profile) = state.auth.clone() else {
        return err(&req.id, "unauthorized", "sign in first", None);
    };
    match profile.role {
        Role::Admin => {}
        Role::Jury | Role::Principal => {
            return err(
                &req.id,
                "forbidden",
                "importing into the store requires an admin profile",
                None,
            )
        }
    }
    let payload = match read_payload(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let jury_number = payload.jury.jury_number.clone();
    let mut created = Vec::new();
    for candidate in &payload.candidates {
        match db::create_evaluation(conn, &profile.id, &jury_number, candidate) {
            Ok(id) => created.push(id),
            Err(e) => {
                return err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "createdSoFar": created })),
                )
            }
        }
    }
    ok(
        &req.id,
        json!({ "juryNumber": jury_number, "created": created.len() }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.preview" => Some(handle_preview(state, req)),
        "import.apply" => Some(handle_apply(state, req)),
        "import.remove" => Some(handle_remove(state, req)),
        "import.list" => Some(handle_list(state, req)),
        "import.adminApply" => Some(handle_admin_apply(state, req)),
        _ => None,
    }
}
