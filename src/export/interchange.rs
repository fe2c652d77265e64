use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::session::{EvaluationState, JuryInfo};

/// Envelope version understood by this build. Anything else is rejected.
pub const INTERCHANGE_VERSION: u64 = 1;

/// The authoritative jury-to-jury exchange format and the admin bulk-import
/// input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JuryExportPayload {
    pub version: u64,
    #[serde(default)]
    pub export_date: String,
    pub jury: JuryInfo,
    pub candidates: Vec<EvaluationState>,
}

/// A payload accepted into the local comparison collection. Never merged
/// into the store except through the explicit admin import.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedJury {
    pub id: String,
    pub import_date: String,
    pub payload: JuryExportPayload,
}

/// Why a payload was rejected. Each variant carries its own user-facing
/// reason; validation never partially applies an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    NotAnObject,
    UnsupportedVersion,
    MissingJury,
    NoCandidates,
    MalformedCandidate,
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::NotAnObject => "invalid_payload",
            ImportError::UnsupportedVersion => "unsupported_version",
            ImportError::MissingJury => "missing_jury",
            ImportError::NoCandidates => "no_candidates",
            ImportError::MalformedCandidate => "malformed_candidate",
        }
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ImportError::NotAnObject => "file does not contain a valid payload object",
            ImportError::UnsupportedVersion => "unsupported payload version",
            ImportError::MissingJury => "jury information is missing",
            ImportError::NoCandidates => "no candidates found in the payload",
            ImportError::MalformedCandidate => "malformed candidate entry",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ImportError {}

pub fn build_payload(
    jury: JuryInfo,
    candidates: Vec<EvaluationState>,
    export_date: String,
) -> JuryExportPayload {
    JuryExportPayload {
        version: INTERCHANGE_VERSION,
        export_date,
        jury,
        candidates,
    }
}

/// Validates a raw JSON value against the envelope contract before anything
/// is deserialized or applied.
pub fn validate_payload(value: &serde_json::Value) -> Result<JuryExportPayload, ImportError> {
    let obj = value.as_object().ok_or(ImportError::NotAnObject)?;

    if obj.get("version").and_then(|v| v.as_u64()) != Some(INTERCHANGE_VERSION) {
        return Err(ImportError::UnsupportedVersion);
    }
    if !obj.get("jury").map(|v| v.is_object()).unwrap_or(false) {
        return Err(ImportError::MissingJury);
    }
    let candidates = obj
        .get("candidates")
        .and_then(|v| v.as_array())
        .ok_or(ImportError::NoCandidates)?;
    if candidates.is_empty() {
        return Err(ImportError::NoCandidates);
    }
    for candidate in candidates {
        let ok = candidate
            .get("candidate")
            .map(|v| v.is_object())
            .unwrap_or(false)
            && candidate.get("scores").map(|v| v.is_object()).unwrap_or(false);
        if !ok {
            return Err(ImportError::MalformedCandidate);
        }
    }

    serde_json::from_value(value.clone()).map_err(|_| ImportError::MalformedCandidate)
}

pub fn json_filename(jury_number: &str, date: NaiveDate) -> String {
    let number = if jury_number.trim().is_empty() {
        "x"
    } else {
        jury_number.trim()
    };
    format!("jury_{}_{}.json", number, date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc;
    use crate::rubric;

    fn sample_payload() -> JuryExportPayload {
        let grille = rubric::builtin_2026();
        let mut jury = JuryInfo::default();
        jury.jury_number = "4".to_string();
        let mut candidate = EvaluationState::default();
        candidate.jury = jury.clone();
        candidate.candidate.nom = "Durand".to_string();
        for c in grille.criteria() {
            candidate.scores.insert(c.id.clone(), c.levels[1].points);
        }
        build_payload(jury, vec![candidate], "2026-06-12T08:30:00Z".to_string())
    }

    #[test]
    fn round_trip_preserves_scores_and_totals() {
        let payload = sample_payload();
        let original_total = calc::grand_total(&payload.candidates[0].scores);

        let text = serde_json::to_string_pretty(&payload).expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&text).expect("parse");
        let imported = validate_payload(&value).expect("validate");

        assert_eq!(imported.jury.jury_number, "4");
        assert_eq!(imported.candidates.len(), 1);
        assert_eq!(imported.candidates[0].scores, payload.candidates[0].scores);
        assert_eq!(
            calc::grand_total(&imported.candidates[0].scores),
            original_total
        );
    }

    #[test]
    fn wrong_version_is_rejected_with_version_reason() {
        let mut value = serde_json::to_value(sample_payload()).expect("value");
        value["version"] = serde_json::json!(2);
        assert_eq!(
            validate_payload(&value),
            Err(ImportError::UnsupportedVersion)
        );
        value.as_object_mut().unwrap().remove("version");
        assert_eq!(
            validate_payload(&value),
            Err(ImportError::UnsupportedVersion)
        );
    }

    #[test]
    fn missing_jury_and_empty_candidates_are_distinct_failures() {
        let mut value = serde_json::to_value(sample_payload()).expect("value");
        value.as_object_mut().unwrap().remove("jury");
        assert_eq!(validate_payload(&value), Err(ImportError::MissingJury));

        let mut value = serde_json::to_value(sample_payload()).expect("value");
        value["candidates"] = serde_json::json!([]);
        assert_eq!(validate_payload(&value), Err(ImportError::NoCandidates));
    }

    #[test]
    fn candidate_without_scores_object_is_malformed() {
        let mut value = serde_json::to_value(sample_payload()).expect("value");
        value["candidates"][0]
            .as_object_mut()
            .unwrap()
            .remove("scores");
        assert_eq!(
            validate_payload(&value),
            Err(ImportError::MalformedCandidate)
        );
    }

    #[test]
    fn filename_falls_back_when_jury_number_is_blank() {
        let date = NaiveDate::from_ymd_opt(2026, 6, 12).expect("date");
        assert_eq!(json_filename("4", date), "jury_4_2026-06-12.json");
        assert_eq!(json_filename("  ", date), "jury_x_2026-06-12.json");
    }
}
