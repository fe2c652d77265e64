use serde_json::json;

use crate::db::{self, Role};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, flush_autosave, persist_draft, required_str};
use crate::ipc::types::{AppState, Request};
use crate::session::{EvaluationState, Session};

fn profile_json(profile: &db::Profile) -> serde_json::Value {
    json!({
        "id": profile.id,
        "email": profile.email,
        "role": profile.role,
        "juryNumber": profile.jury_number,
        "displayName": profile.display_name,
        "createdAt": profile.created_at,
    })
}

fn handle_sign_in(state: &mut AppState, req: &Request) -> serde_json::Value {
    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let profile = match db::authenticate(conn, &email, &password) {
        Ok(Some(p)) => p,
        Ok(None) => return err(&req.id, "invalid_credentials", "unknown email or wrong password", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Cross-device draft resume: only adopt the store draft when nothing is
    // in progress locally.
    if state.session.state == EvaluationState::default() {
        if let Ok(Some(draft)) = db::load_current(conn, &profile.id) {
            state.session = Session::from_draft(draft);
        }
    }

    let view = profile_json(&profile);
    state.auth = Some(profile);
    persist_draft(state);
    ok(&req.id, json!({ "profile": view }))
}

fn handle_sign_out(state: &mut AppState, req: &Request) -> serde_json::Value {
    // A pending save must not be lost with the auth context.
    let outcome = flush_autosave(state, true);
    if state.session.state == EvaluationState::default() {
        // Nothing in progress; drop the empty cross-device draft.
        if let (Some(profile), Some(conn)) = (state.auth.as_ref(), state.db.as_ref()) {
            if let Err(e) = db::clear_current(conn, &profile.id) {
                tracing::warn!(error = %e, "failed to clear cross-device draft");
            }
        }
    }
    state.auth = None;
    ok(&req.id, json!({ "signedOut": true, "finalSave": outcome.as_json() }))
}

fn handle_profile(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.auth.as_ref() {
        Some(profile) => ok(&req.id, json!({ "profile": profile_json(profile) })),
        None => ok(&req.id, json!({ "profile": serde_json::Value::Null })),
    }
}

/// One-time workspace setup: the first profile must be an admin and can
/// only be created while the profiles table is empty.
fn handle_bootstrap_admin(state: &mut AppState, req: &Request) -> serde_json::Value {
    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let display_name = req
        .params
        .get("displayName")
        .and_then(|v| v.as_str())
        .unwrap_or("Administrateur")
        .to_string();
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match db::profiles_count(conn) {
        Ok(0) => {}
        Ok(_) => {
            return err(
                &req.id,
                "already_initialized",
                "workspace already has profiles",
                None,
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    match db::create_profile(conn, &email, &password, Role::Admin, "", &display_name) {
        Ok(profile) => ok(&req.id, json!({ "profile": profile_json(&profile) })),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

/// Privileged account provisioning: creates a pre-confirmed jury-role
/// profile. Mirrors the HTTP contract: missing auth maps to
/// `unauthorized`, a non-admin caller to `forbidden`, missing fields to
/// `bad_params`.
fn handle_provision(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(profile) = state.auth.as_ref() else {
        return err(&req.id, "unauthorized", "sign in first", None);
    };
    match profile.role {
        Role::Admin => {}
        Role::Jury | Role::Principal => {
            return err(
                &req.id,
                "forbidden",
                "account provisioning requires an admin profile",
                None,
            )
        }
    }

    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let jury_number = match required_str(req, "juryNumber") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let display_name = req
        .params
        .get("displayName")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("Jury {}", jury_number));
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match db::create_profile(conn, &email, &password, Role::Jury, &jury_number, &display_name) {
        Ok(created) => ok(&req.id, json!({ "profile": profile_json(&created) })),
        Err(e) if e.to_string().contains("already registered") => {
            err(&req.id, "email_taken", e.to_string(), None)
        }
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(profile) = state.auth.as_ref() else {
        return err(&req.id, "unauthorized", "sign in first", None);
    };
    match profile.role {
        Role::Admin => {}
        Role::Jury | Role::Principal => {
            return err(&req.id, "forbidden", "listing accounts requires an admin profile", None)
        }
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::list_profiles(conn) {
        Ok(profiles) => ok(
            &req.id,
            json!({ "profiles": profiles.iter().map(profile_json).collect::<Vec<_>>() }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.signIn" => Some(handle_sign_in(state, req)),
        "auth.signOut" => Some(handle_sign_out(state, req)),
        "auth.profile" => Some(handle_profile(state, req)),
        "accounts.bootstrapAdmin" => Some(handle_bootstrap_admin(state, req)),
        "accounts.provision" => Some(handle_provision(state, req)),
        "accounts.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
