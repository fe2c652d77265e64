use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::rubric::{Grille, Mastery, MasteryLevel, Section};

/// Sparse per-criterion score map. An absent key means "not yet scored",
/// which is distinct from an explicit 0 entry.
pub type ScoreMap = BTreeMap<String, f64>;

/// Score-range histogram bands for the 20-point scale. Must be re-derived if
/// a rubric with a different total is ever introduced.
pub const SCORE_BANDS: [(f64, f64); 5] = [
    (0.0, 4.0),
    (5.0, 8.0),
    (9.0, 12.0),
    (13.0, 16.0),
    (17.0, 20.0),
];

pub const SCORE_BAND_LABELS: [&str; 5] = ["0-4", "5-8", "9-12", "13-16", "17-20"];

/// A jury whose mean deviates from the global mean by strictly more than
/// this many points is flagged during harmonization. Tunable; the strict
/// comparison is pinned by tests.
pub const HARMONIZATION_DEVIATION_THRESHOLD: f64 = 2.0;

/// 1-decimal round-half-up used everywhere a mean is displayed.
pub fn round_half_up_1dp(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Display convention shared by screen payloads, PDF and CSV: integers
/// render without decimals, anything else with exactly one decimal and a
/// comma separator.
pub fn fmt_pt(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{:.1}", v).replace('.', ",")
    }
}

pub fn section_total(scores: &ScoreMap, section_id: u32) -> f64 {
    let prefix = format!("{}-", section_id);
    scores
        .iter()
        .filter(|(id, _)| id.starts_with(&prefix))
        .map(|(_, pts)| *pts)
        .sum()
}

pub fn grand_total(scores: &ScoreMap) -> f64 {
    scores.values().sum()
}

/// A section is complete once every criterion has an entry, regardless of
/// the value awarded.
pub fn section_complete(section: &Section, scores: &ScoreMap) -> bool {
    section.criteria.iter().all(|c| scores.contains_key(&c.id))
}

/// Maps an awarded score back to its mastery level. A score of 0 falls into
/// the first (insufficient) band by convention; any other value must match
/// one of the level point values exactly.
pub fn level_for_score(levels: &[MasteryLevel], score: f64) -> Option<&MasteryLevel> {
    if score == 0.0 {
        return levels.first();
    }
    levels.iter().find(|l| l.points == score)
}

pub fn mastery_for_criterion(grille: &Grille, criterion_id: &str, score: f64) -> Option<Mastery> {
    let criterion = grille.find_criterion(criterion_id)?;
    level_for_score(&criterion.levels, score).map(|l| l.mastery)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / (values.len() as f64)
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[(n / 2) - 1] + sorted[n / 2]) / 2.0
    }
}

pub fn min_value(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

pub fn max_value(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Population standard deviation; 0 for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() as f64);
    var.sqrt()
}

/// Counts totals falling in each inclusive `[min, max]` range. Ranges are
/// caller-defined and may be non-contiguous; no normalization is performed.
pub fn distribution(totals: &[f64], ranges: &[(f64, f64)]) -> Vec<usize> {
    ranges
        .iter()
        .map(|(min, max)| totals.iter().filter(|t| **t >= *min && **t <= *max).count())
        .collect()
}
