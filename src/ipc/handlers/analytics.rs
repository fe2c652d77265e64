use serde_json::json;

use crate::calc;
use crate::ipc::error::ok;
use crate::ipc::helpers::{parse_scope, tagged_collection};
use crate::ipc::types::{AppState, Request};
use crate::rubric::Mastery;
use crate::session::TaggedEvaluation;

fn jury_numbers_in_order(collection: &[TaggedEvaluation]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tagged in collection {
        if !out.contains(&tagged.jury_number) {
            out.push(tagged.jury_number.clone());
        }
    }
    out
}

fn totals(collection: &[TaggedEvaluation]) -> Vec<f64> {
    collection
        .iter()
        .map(|t| calc::grand_total(&t.state.scores))
        .collect()
}

/// Per-criterion and total statistics plus the fixed 5-band histogram.
fn handle_overview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match parse_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let collection = match tagged_collection(state, req, scope) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let per_criterion = state
        .grille
        .criteria()
        .map(|criterion| {
            let scores: Vec<f64> = collection
                .iter()
                .map(|t| t.state.scores.get(&criterion.id).copied().unwrap_or(0.0))
                .collect();
            json!({
                "id": criterion.id,
                "title": criterion.title,
                "maxPoints": criterion.max_points,
                "mean": calc::round_half_up_1dp(calc::mean(&scores)),
                "median": calc::median(&scores),
                "min": calc::min_value(&scores),
                "max": calc::max_value(&scores),
            })
        })
        .collect::<Vec<_>>();

    let all_totals = totals(&collection);
    let counts = calc::distribution(&all_totals, &calc::SCORE_BANDS);
    let bands = calc::SCORE_BANDS
        .iter()
        .zip(calc::SCORE_BAND_LABELS)
        .zip(counts)
        .map(|(((min, max), label), count)| {
            json!({ "label": label, "min": min, "max": max, "count": count })
        })
        .collect::<Vec<_>>();

    ok(
        &req.id,
        json!({
            "candidateCount": collection.len(),
            "perCriterion": per_criterion,
            "total": {
                "mean": calc::round_half_up_1dp(calc::mean(&all_totals)),
                "median": calc::median(&all_totals),
                "min": calc::min_value(&all_totals),
                "max": calc::max_value(&all_totals),
                "stdDev": calc::round_half_up_1dp(calc::std_dev(&all_totals)),
            },
            "histogram": { "bands": bands },
        }),
    )
}

/// Cross-jury comparison: per-jury spread plus the significance flag on the
/// deviation from the global mean.
fn handle_harmonization(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match parse_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let collection = match tagged_collection(state, req, scope) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let jury_numbers = jury_numbers_in_order(&collection);
    let global_mean = calc::mean(&totals(&collection));

    let juries = jury_numbers
        .iter()
        .map(|jury| {
            let jury_totals: Vec<f64> = collection
                .iter()
                .filter(|t| &t.jury_number == jury)
                .map(|t| calc::grand_total(&t.state.scores))
                .collect();
            let mean = calc::mean(&jury_totals);
            let deviation = mean - global_mean;
            json!({
                "juryNumber": jury,
                "count": jury_totals.len(),
                "mean": calc::round_half_up_1dp(mean),
                "min": calc::min_value(&jury_totals),
                "max": calc::max_value(&jury_totals),
                "stdDev": calc::round_half_up_1dp(calc::std_dev(&jury_totals)),
                "deviation": calc::round_half_up_1dp(deviation),
                "significant": deviation.abs() > calc::HARMONIZATION_DEVIATION_THRESHOLD,
            })
        })
        .collect::<Vec<_>>();

    let per_criterion = state
        .grille
        .criteria()
        .map(|criterion| {
            let jury_means = jury_numbers
                .iter()
                .map(|jury| {
                    let scores: Vec<f64> = collection
                        .iter()
                        .filter(|t| &t.jury_number == jury)
                        .map(|t| t.state.scores.get(&criterion.id).copied().unwrap_or(0.0))
                        .collect();
                    json!({
                        "juryNumber": jury,
                        "mean": calc::round_half_up_1dp(calc::mean(&scores)),
                    })
                })
                .collect::<Vec<_>>();
            json!({
                "id": criterion.id,
                "title": criterion.title,
                "maxPoints": criterion.max_points,
                "juryMeans": jury_means,
            })
        })
        .collect::<Vec<_>>();

    ok(
        &req.id,
        json!({
            "juryCount": jury_numbers.len(),
            "candidateCount": collection.len(),
            "globalMean": calc::round_half_up_1dp(global_mean),
            "threshold": calc::HARMONIZATION_DEVIATION_THRESHOLD,
            "juries": juries,
            "perCriterion": per_criterion,
        }),
    )
}

/// How many candidates land in each mastery band, per criterion and
/// globally. Unscored criteria classify as 0 and therefore fall in the
/// first band.
fn handle_mastery_distribution(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match parse_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let collection = match tagged_collection(state, req, scope) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let counts_json = |counts: [usize; 4]| {
        let mut obj = serde_json::Map::new();
        for (mastery, count) in Mastery::ALL.iter().zip(counts) {
            obj.insert(mastery.as_str().to_string(), json!(count));
        }
        serde_json::Value::Object(obj)
    };

    let mut global = [0usize; 4];
    let per_criterion = state
        .grille
        .criteria()
        .map(|criterion| {
            let mut counts = [0usize; 4];
            for tagged in &collection {
                let score = tagged.state.scores.get(&criterion.id).copied().unwrap_or(0.0);
                if let Some(mastery) =
                    calc::mastery_for_criterion(&state.grille, &criterion.id, score)
                {
                    let band = Mastery::ALL.iter().position(|m| *m == mastery).unwrap_or(0);
                    counts[band] += 1;
                    global[band] += 1;
                }
            }
            json!({
                "id": criterion.id,
                "title": criterion.title,
                "counts": counts_json(counts),
            })
        })
        .collect::<Vec<_>>();

    ok(
        &req.id,
        json!({
            "candidateCount": collection.len(),
            "perCriterion": per_criterion,
            "global": counts_json(global),
        }),
    )
}

/// Candidates ordered by descending grand total, with section subtotals.
fn handle_ranking(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match parse_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let collection = match tagged_collection(state, req, scope) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut sorted: Vec<&TaggedEvaluation> = collection.iter().collect();
    sorted.sort_by(|a, b| {
        calc::grand_total(&b.state.scores)
            .partial_cmp(&calc::grand_total(&a.state.scores))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let rows = sorted
        .iter()
        .enumerate()
        .map(|(i, tagged)| {
            let section_totals = state
                .grille
                .sections
                .iter()
                .map(|s| {
                    json!({
                        "sectionId": s.id,
                        "total": calc::section_total(&tagged.state.scores, s.id),
                    })
                })
                .collect::<Vec<_>>();
            json!({
                "rank": i + 1,
                "nom": tagged.state.candidate.nom,
                "prenom": tagged.state.candidate.prenom,
                "classe": tagged.state.candidate.classe,
                "sujet": tagged.state.candidate.sujet,
                "juryNumber": tagged.jury_number,
                "sectionTotals": section_totals,
                "total": calc::grand_total(&tagged.state.scores),
            })
        })
        .collect::<Vec<_>>();

    ok(&req.id, json!({ "rows": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.overview" => Some(handle_overview(state, req)),
        "analytics.harmonization" => Some(handle_harmonization(state, req)),
        "analytics.masteryDistribution" => Some(handle_mastery_distribution(state, req)),
        "analytics.ranking" => Some(handle_ranking(state, req)),
        _ => None,
    }
}
