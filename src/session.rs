use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::calc::{self, ScoreMap};
use crate::rubric::Grille;
use crate::timer::TimerData;

// Steps 3 and 4 are the exposé and entretien timer screens; only the steps
// with machine behavior get named constants.
pub const STEP_JURY: u8 = 1;
pub const STEP_CANDIDATE: u8 = 2;
pub const STEP_SCORING: u8 = 5;
pub const STEP_SUMMARY: u8 = 6;

/// Quiet period before a summary-step mutation is written to the store.
pub const AUTOSAVE_QUIET: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JuryInfo {
    pub prof1_nom: String,
    pub prof1_prenom: String,
    pub prof2_nom: String,
    pub prof2_prenom: String,
    pub jury_number: String,
    pub date: String,
    pub salle: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CandidateInfo {
    pub nom: String,
    pub prenom: String,
    pub classe: String,
    pub horaire: String,
    pub sujet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Expose,
    Entretien,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Expose => "expose",
            Phase::Entretien => "entretien",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expose: Option<TimerData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entretien: Option<TimerData>,
}

impl Timers {
    pub fn is_empty(&self) -> bool {
        self.expose.is_none() && self.entretien.is_none()
    }

    pub fn set(&mut self, phase: Phase, data: TimerData) {
        match phase {
            Phase::Expose => self.expose = Some(data),
            Phase::Entretien => self.entretien = Some(data),
        }
    }
}

/// One candidate's evaluation, in progress or completed. This is the value
/// persisted to the draft cache, the store rows, and the interchange files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluationState {
    pub current_step: u8,
    pub jury: JuryInfo,
    pub candidate: CandidateInfo,
    pub scores: ScoreMap,
    pub comments: String,
    #[serde(skip_serializing_if = "Timers::is_empty")]
    pub timers: Timers,
}

impl Default for EvaluationState {
    fn default() -> Self {
        EvaluationState {
            current_step: STEP_JURY,
            jury: JuryInfo::default(),
            candidate: CandidateInfo::default(),
            scores: ScoreMap::new(),
            comments: String::new(),
            timers: Timers::default(),
        }
    }
}

/// An evaluation paired with the jury number that produced it; the unit of
/// the comparison/harmonization views.
#[derive(Debug, Clone)]
pub struct TaggedEvaluation {
    pub state: EvaluationState,
    pub jury_number: String,
}

/// Field-wise patches as sent by the form steps. Absent fields keep their
/// current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JuryPatch {
    pub prof1_nom: Option<String>,
    pub prof1_prenom: Option<String>,
    pub prof2_nom: Option<String>,
    pub prof2_prenom: Option<String>,
    pub jury_number: Option<String>,
    pub date: Option<String>,
    pub salle: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CandidatePatch {
    pub nom: Option<String>,
    pub prenom: Option<String>,
    pub classe: Option<String>,
    pub horaire: Option<String>,
    pub sujet: Option<String>,
}

/// Where a flushed save lands: a store row (id learned on first create) or a
/// slot in the cache-backed local history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    Store(String),
    Local(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionAdvance {
    /// Current section still has unscored criteria.
    Blocked,
    Advanced,
    /// Last section completed; the session moved to the summary step.
    Finished,
}

/// Cancellable single-slot delayed task. Arming supersedes any pending
/// deadline, so at most one flush is ever outstanding.
#[derive(Debug, Default)]
pub struct DelaySlot {
    deadline: Option<Instant>,
}

impl DelaySlot {
    pub fn arm(&mut self, quiet: Duration) {
        self.deadline = Some(Instant::now() + quiet);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Fires (and clears) if the deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(d) if now >= d => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Fires immediately if armed.
    pub fn fire_now(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

/// The linear six-step evaluation session. Exactly one is live per sidecar
/// process; completed candidates become history entries.
#[derive(Debug, Default)]
pub struct Session {
    pub state: EvaluationState,
    pub section_index: usize,
    pub write_target: Option<WriteTarget>,
    pub autosave: DelaySlot,
    saved_snapshot: Option<EvaluationState>,
}

impl Session {
    pub fn new() -> Session {
        Session::default()
    }

    /// Resumes from a cached draft; out-of-range steps are clamped.
    pub fn from_draft(mut state: EvaluationState) -> Session {
        state.current_step = state.current_step.clamp(STEP_JURY, STEP_SUMMARY);
        Session {
            state,
            ..Session::default()
        }
    }

    pub fn viewing_history(&self) -> bool {
        self.saved_snapshot.is_some()
    }

    pub fn set_jury(&mut self, patch: JuryPatch) {
        let jury = &mut self.state.jury;
        if let Some(v) = patch.prof1_nom {
            jury.prof1_nom = v;
        }
        if let Some(v) = patch.prof1_prenom {
            jury.prof1_prenom = v;
        }
        if let Some(v) = patch.prof2_nom {
            jury.prof2_nom = v;
        }
        if let Some(v) = patch.prof2_prenom {
            jury.prof2_prenom = v;
        }
        if let Some(v) = patch.jury_number {
            jury.jury_number = v;
        }
        if let Some(v) = patch.date {
            jury.date = v;
        }
        if let Some(v) = patch.salle {
            jury.salle = v;
        }
    }

    pub fn set_candidate(&mut self, patch: CandidatePatch) {
        let candidate = &mut self.state.candidate;
        if let Some(v) = patch.nom {
            candidate.nom = v;
        }
        if let Some(v) = patch.prenom {
            candidate.prenom = v;
        }
        if let Some(v) = patch.classe {
            candidate.classe = v;
        }
        if let Some(v) = patch.horaire {
            candidate.horaire = v;
        }
        if let Some(v) = patch.sujet {
            candidate.sujet = v;
        }
    }

    pub fn set_score(&mut self, criterion_id: &str, points: f64) {
        self.state.scores.insert(criterion_id.to_string(), points);
    }

    pub fn set_comments(&mut self, comments: String) {
        self.state.comments = comments;
    }

    pub fn set_timer(&mut self, phase: Phase, data: TimerData) {
        self.state.timers.set(phase, data);
    }

    fn set_step(&mut self, step: u8) {
        let clamped = step.clamp(STEP_JURY, STEP_SUMMARY);
        if clamped == STEP_SCORING && self.state.current_step != STEP_SCORING {
            self.section_index = 0;
        }
        self.state.current_step = clamped;
    }

    pub fn next_step(&mut self) {
        self.set_step(self.state.current_step.saturating_add(1));
    }

    pub fn prev_step(&mut self) {
        self.set_step(self.state.current_step.saturating_sub(1).max(STEP_JURY));
    }

    pub fn go_to_step(&mut self, step: u8) {
        self.set_step(step);
    }

    /// Moves to the next section of the scoring grid, gated on the current
    /// section being fully scored. Completing the last section transitions
    /// to the summary step.
    pub fn advance_section(&mut self, grille: &Grille) -> SectionAdvance {
        let Some(section) = grille.sections.get(self.section_index) else {
            return SectionAdvance::Blocked;
        };
        if !calc::section_complete(section, &self.state.scores) {
            return SectionAdvance::Blocked;
        }
        if self.section_index + 1 < grille.sections.len() {
            self.section_index += 1;
            SectionAdvance::Advanced
        } else {
            self.set_step(STEP_SUMMARY);
            SectionAdvance::Finished
        }
    }

    pub fn prev_section(&mut self) {
        self.section_index = self.section_index.saturating_sub(1);
    }

    /// Arms the debounced store write when the summary step holds something
    /// worth saving. Called after every mutation; re-arming supersedes any
    /// pending deadline.
    pub fn maybe_arm_autosave(&mut self) {
        if self.state.current_step == STEP_SUMMARY
            && !self.state.candidate.nom.trim().is_empty()
            && !self.state.scores.is_empty()
        {
            self.autosave.arm(AUTOSAVE_QUIET);
        }
    }

    /// Clears candidate-specific fields and returns to the candidate step.
    /// Jury info survives; the write target is discarded so the next
    /// candidate creates a fresh store row. The caller flushes any pending
    /// save first.
    pub fn next_candidate(&mut self) {
        self.state.candidate = CandidateInfo::default();
        self.state.scores.clear();
        self.state.comments.clear();
        self.state.timers = Timers::default();
        self.state.current_step = STEP_CANDIDATE;
        self.section_index = 0;
        self.write_target = None;
        self.saved_snapshot = None;
        self.autosave.cancel();
    }

    /// Opens a history entry for view/edit: snapshots the live state on
    /// first entry, adopts the entry's write target, and forces the scoring
    /// step regardless of the entry's recorded step.
    pub fn load_history_entry(&mut self, entry: EvaluationState, target: WriteTarget) {
        if self.saved_snapshot.is_none() {
            self.saved_snapshot = Some(self.state.clone());
        }
        self.write_target = Some(target);
        self.state = entry;
        self.state.current_step = STEP_SCORING;
        self.section_index = 0;
        self.autosave.cancel();
    }

    /// Discards history-view edits and restores the snapshotted live state.
    /// The write target reverts to none: the live candidate, if later
    /// completed, is treated as new.
    pub fn return_to_current(&mut self) -> bool {
        let Some(saved) = self.saved_snapshot.take() else {
            return false;
        };
        self.state = saved;
        self.write_target = None;
        self.section_index = 0;
        self.autosave.cancel();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric;

    fn score_section(session: &mut Session, grille: &Grille, section_index: usize) {
        for c in &grille.sections[section_index].criteria {
            session.set_score(&c.id, c.levels[3].points);
        }
    }

    #[test]
    fn steps_clamp_to_bounds() {
        let mut s = Session::new();
        s.prev_step();
        assert_eq!(s.state.current_step, STEP_JURY);
        s.go_to_step(99);
        assert_eq!(s.state.current_step, STEP_SUMMARY);
        s.go_to_step(0);
        assert_eq!(s.state.current_step, STEP_JURY);
    }

    #[test]
    fn entering_scoring_resets_section_index() {
        let mut s = Session::new();
        s.go_to_step(STEP_SCORING);
        s.section_index = 1;
        s.go_to_step(STEP_SUMMARY);
        s.go_to_step(STEP_SCORING);
        assert_eq!(s.section_index, 0);
    }

    #[test]
    fn section_advance_is_gated_on_completion() {
        let grille = rubric::builtin_2026();
        let mut s = Session::new();
        s.go_to_step(STEP_SCORING);

        assert_eq!(s.advance_section(&grille), SectionAdvance::Blocked);
        score_section(&mut s, &grille, 0);
        assert_eq!(s.advance_section(&grille), SectionAdvance::Advanced);
        assert_eq!(s.section_index, 1);

        assert_eq!(s.advance_section(&grille), SectionAdvance::Blocked);
        score_section(&mut s, &grille, 1);
        assert_eq!(s.advance_section(&grille), SectionAdvance::Finished);
        assert_eq!(s.state.current_step, STEP_SUMMARY);
    }

    #[test]
    fn next_candidate_keeps_jury_and_discards_target() {
        let grille = rubric::builtin_2026();
        let mut s = Session::new();
        s.set_jury(JuryPatch {
            jury_number: Some("3".to_string()),
            salle: Some("B12".to_string()),
            ..JuryPatch::default()
        });
        s.set_candidate(CandidatePatch {
            nom: Some("Durand".to_string()),
            ..CandidatePatch::default()
        });
        score_section(&mut s, &grille, 0);
        s.set_comments("bien".to_string());
        s.write_target = Some(WriteTarget::Store("abc".to_string()));

        s.next_candidate();
        assert_eq!(s.state.jury.jury_number, "3");
        assert_eq!(s.state.candidate, CandidateInfo::default());
        assert!(s.state.scores.is_empty());
        assert!(s.state.comments.is_empty());
        assert_eq!(s.state.current_step, STEP_CANDIDATE);
        assert!(s.write_target.is_none());
    }

    #[test]
    fn history_view_snapshots_and_restores() {
        let mut s = Session::new();
        s.set_candidate(CandidatePatch {
            nom: Some("Martin".to_string()),
            ..CandidatePatch::default()
        });
        s.go_to_step(STEP_CANDIDATE);

        let mut entry = EvaluationState::default();
        entry.candidate.nom = "Petit".to_string();
        entry.current_step = STEP_SUMMARY;
        s.load_history_entry(entry, WriteTarget::Store("row-1".to_string()));

        assert!(s.viewing_history());
        assert_eq!(s.state.current_step, STEP_SCORING);
        assert_eq!(s.state.candidate.nom, "Petit");
        assert_eq!(
            s.write_target,
            Some(WriteTarget::Store("row-1".to_string()))
        );

        assert!(s.return_to_current());
        assert!(!s.viewing_history());
        assert_eq!(s.state.candidate.nom, "Martin");
        assert!(s.write_target.is_none());
        assert!(!s.return_to_current());
    }

    #[test]
    fn autosave_arms_only_with_name_and_scores_on_summary() {
        let mut s = Session::new();
        s.go_to_step(STEP_SUMMARY);
        s.maybe_arm_autosave();
        assert!(!s.autosave.is_armed());

        s.set_candidate(CandidatePatch {
            nom: Some("Durand".to_string()),
            ..CandidatePatch::default()
        });
        s.set_score("1-1", 3.0);
        s.maybe_arm_autosave();
        assert!(s.autosave.is_armed());
    }

    #[test]
    fn delay_slot_supersedes_and_fires_once() {
        let mut slot = DelaySlot::default();
        assert!(!slot.fire_now());
        slot.arm(Duration::from_secs(60));
        slot.arm(Duration::from_millis(0));
        assert!(slot.fire_if_due(Instant::now()));
        assert!(!slot.is_armed());
        assert!(!slot.fire_if_due(Instant::now()));

        slot.arm(Duration::from_secs(60));
        assert!(!slot.fire_if_due(Instant::now()));
        assert!(slot.fire_now());
        assert!(!slot.is_armed());
    }
}
