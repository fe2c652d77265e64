use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::session::EvaluationState;

/// Closed role set; handled exhaustively at the composition root instead of
/// string comparisons scattered through handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Jury,
    Admin,
    Principal,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Jury => "jury",
            Role::Admin => "admin",
            Role::Principal => "principal",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "jury" => Some(Role::Jury),
            "admin" => Some(Role::Admin),
            "principal" => Some(Role::Principal),
            _ => None,
        }
    }

    /// Roles allowed to read every jury's rows.
    pub fn can_read_all(self) -> bool {
        match self {
            Role::Admin | Role::Principal => true,
            Role::Jury => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub jury_number: String,
    pub display_name: String,
    pub created_at: String,
}

/// A persisted evaluation row, reassembled from its embedded JSON columns.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: String,
    pub user_id: String,
    pub jury_number: String,
    pub state: EvaluationState,
    pub created_at: String,
    pub updated_at: String,
}

pub fn open_db(workspace: &Path) -> Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("oraljury.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS profiles(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            salt TEXT NOT NULL,
            role TEXT NOT NULL,
            jury_number TEXT NOT NULL,
            display_name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluations(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            jury_number TEXT NOT NULL,
            jury_info TEXT NOT NULL,
            candidate_info TEXT NOT NULL,
            scores TEXT NOT NULL,
            comments TEXT NOT NULL,
            timers TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES profiles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_evaluations_user ON evaluations(user_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_evaluations_jury ON evaluations(jury_number)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS current_evaluations(
            user_id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES profiles(id)
        )",
        [],
    )?;

    Ok(())
}

fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn password_hash(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex(&hasher.finalize())
}

fn profile_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Profile, String, String)> {
    let role_raw: String = row.get(4)?;
    let role = Role::parse(&role_raw).unwrap_or(Role::Jury);
    Ok((
        Profile {
            id: row.get(0)?,
            email: row.get(1)?,
            role,
            jury_number: row.get(5)?,
            display_name: row.get(6)?,
            created_at: row.get(7)?,
        },
        row.get(2)?,
        row.get(3)?,
    ))
}

const PROFILE_COLUMNS: &str =
    "id, email, password_hash, salt, role, jury_number, display_name, created_at";

pub fn profiles_count(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM profiles", [], |r| r.get(0))
        .context("failed to count profiles")
}

pub fn create_profile(
    conn: &Connection,
    email: &str,
    password: &str,
    role: Role,
    jury_number: &str,
    display_name: &str,
) -> Result<Profile> {
    let id = Uuid::new_v4().to_string();
    let salt = Uuid::new_v4().to_string();
    let created_at = now_iso();
    conn.execute(
        "INSERT INTO profiles(id, email, password_hash, salt, role, jury_number, display_name, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            email,
            password_hash(&salt, password),
            &salt,
            role.as_str(),
            jury_number,
            display_name,
            &created_at,
        ),
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            anyhow!("email already registered")
        }
        other => anyhow!(other),
    })?;
    Ok(Profile {
        id,
        email: email.to_string(),
        role,
        jury_number: jury_number.to_string(),
        display_name: display_name.to_string(),
        created_at,
    })
}

/// Convenience login: looks the profile up by email and checks the salted
/// password hash. Returns None on unknown email or wrong password.
pub fn authenticate(conn: &Connection, email: &str, password: &str) -> Result<Option<Profile>> {
    let sql = format!("SELECT {} FROM profiles WHERE email = ?", PROFILE_COLUMNS);
    let found = conn
        .query_row(&sql, [email], profile_from_row)
        .optional()
        .context("failed to query profile")?;
    let Some((profile, hash, salt)) = found else {
        return Ok(None);
    };
    if password_hash(&salt, password) == hash {
        Ok(Some(profile))
    } else {
        Ok(None)
    }
}

pub fn list_profiles(conn: &Connection) -> Result<Vec<Profile>> {
    let sql = format!(
        "SELECT {} FROM profiles ORDER BY created_at",
        PROFILE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |r| profile_from_row(r).map(|(p, _, _)| p))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn timers_column(state: &EvaluationState) -> Result<Option<String>> {
    if state.timers.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(&state.timers)?))
    }
}

pub fn create_evaluation(
    conn: &Connection,
    user_id: &str,
    jury_number: &str,
    state: &EvaluationState,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let now = now_iso();
    conn.execute(
        "INSERT INTO evaluations(id, user_id, jury_number, jury_info, candidate_info, scores, comments, timers, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            user_id,
            jury_number,
            serde_json::to_string(&state.jury)?,
            serde_json::to_string(&state.candidate)?,
            serde_json::to_string(&state.scores)?,
            &state.comments,
            timers_column(state)?,
            &now,
            &now,
        ),
    )
    .context("failed to insert evaluation")?;
    Ok(id)
}

/// Idempotent last-write-wins update on the row id; returns false when the
/// row no longer exists.
pub fn update_evaluation(conn: &Connection, id: &str, state: &EvaluationState) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE evaluations
             SET jury_info = ?, candidate_info = ?, scores = ?, comments = ?, timers = ?, updated_at = ?
             WHERE id = ?",
            (
                serde_json::to_string(&state.jury)?,
                serde_json::to_string(&state.candidate)?,
                serde_json::to_string(&state.scores)?,
                &state.comments,
                timers_column(state)?,
                now_iso(),
                id,
            ),
        )
        .context("failed to update evaluation")?;
    Ok(changed > 0)
}

pub fn delete_evaluation(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn
        .execute("DELETE FROM evaluations WHERE id = ?", [id])
        .context("failed to delete evaluation")?;
    Ok(changed > 0)
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let jury_info: String = row.get(3)?;
    let candidate_info: String = row.get(4)?;
    let scores: String = row.get(5)?;
    let comments: String = row.get(6)?;
    let timers: Option<String> = row.get(7)?;

    let mut state = EvaluationState::default();
    // History rows are read-only summaries; they always reopen at the
    // summary step unless explicitly loaded into the grid.
    state.current_step = crate::session::STEP_SUMMARY;
    state.jury = serde_json::from_str(&jury_info).unwrap_or_default();
    state.candidate = serde_json::from_str(&candidate_info).unwrap_or_default();
    state.scores = serde_json::from_str(&scores).unwrap_or_default();
    state.comments = comments;
    state.timers = timers
        .as_deref()
        .and_then(|t| serde_json::from_str(t).ok())
        .unwrap_or_default();

    Ok(HistoryEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        jury_number: row.get(2)?,
        state,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

const EVALUATION_COLUMNS: &str =
    "id, user_id, jury_number, jury_info, candidate_info, scores, comments, timers, created_at, updated_at";

pub fn get_evaluation(conn: &Connection, id: &str) -> Result<Option<HistoryEntry>> {
    let sql = format!(
        "SELECT {} FROM evaluations WHERE id = ?",
        EVALUATION_COLUMNS
    );
    conn.query_row(&sql, [id], entry_from_row)
        .optional()
        .context("failed to load evaluation")
}

pub fn list_for_owner(conn: &Connection, user_id: &str) -> Result<Vec<HistoryEntry>> {
    let sql = format!(
        "SELECT {} FROM evaluations WHERE user_id = ? ORDER BY created_at",
        EVALUATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([user_id], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn list_all(conn: &Connection) -> Result<Vec<HistoryEntry>> {
    let sql = format!(
        "SELECT {} FROM evaluations ORDER BY created_at",
        EVALUATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn list_by_jury(conn: &Connection, jury_number: &str) -> Result<Vec<HistoryEntry>> {
    let sql = format!(
        "SELECT {} FROM evaluations WHERE jury_number = ? ORDER BY created_at",
        EVALUATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([jury_number], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn jury_numbers(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT jury_number FROM evaluations ORDER BY jury_number")?;
    let rows = stmt
        .query_map([], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn save_current(conn: &Connection, user_id: &str, state: &EvaluationState) -> Result<()> {
    conn.execute(
        "INSERT INTO current_evaluations(user_id, state, updated_at)
         VALUES(?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
           state = excluded.state,
           updated_at = excluded.updated_at",
        (user_id, serde_json::to_string(state)?, now_iso()),
    )
    .context("failed to save current evaluation")?;
    Ok(())
}

pub fn load_current(conn: &Connection, user_id: &str) -> Result<Option<EvaluationState>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT state FROM current_evaluations WHERE user_id = ?",
            [user_id],
            |r| r.get(0),
        )
        .optional()
        .context("failed to load current evaluation")?;
    Ok(raw.and_then(|t| serde_json::from_str(&t).ok()))
}

pub fn clear_current(conn: &Connection, user_id: &str) -> Result<()> {
    conn.execute("DELETE FROM current_evaluations WHERE user_id = ?", [user_id])
        .context("failed to clear current evaluation")?;
    Ok(())
}
