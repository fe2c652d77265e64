use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::cache::LocalCache;
use crate::db::Profile;
use crate::rubric::{self, Grille};
use crate::session::{Phase, Session};
use crate::timer::{Countdown, ENTRETIEN_MINUTES, EXPOSE_MINUTES};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// All sidecar state, passed explicitly into every handler. Installed on
/// `workspace.select` / `auth.signIn` and torn down on `auth.signOut`;
/// nothing lives in globals.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub cache: Option<LocalCache>,
    pub grille: Grille,
    pub session: Session,
    pub auth: Option<Profile>,
    pub expose_timer: Countdown,
    pub entretien_timer: Countdown,
}

impl AppState {
    pub fn new() -> AppState {
        let grille = rubric::builtin();
        debug_assert!(rubric::validate(&grille).is_ok());
        AppState {
            workspace: None,
            db: None,
            cache: None,
            grille,
            session: Session::new(),
            auth: None,
            expose_timer: Countdown::new(EXPOSE_MINUTES),
            entretien_timer: Countdown::new(ENTRETIEN_MINUTES),
        }
    }

    pub fn timer(&self, phase: Phase) -> &Countdown {
        match phase {
            Phase::Expose => &self.expose_timer,
            Phase::Entretien => &self.entretien_timer,
        }
    }

    pub fn timer_mut(&mut self, phase: Phase) -> &mut Countdown {
        match phase {
            Phase::Expose => &mut self.expose_timer,
            Phase::Entretien => &mut self.entretien_timer,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        AppState::new()
    }
}
