
use serde_json::json;
use std::fs;
use test_support::{request_ok, spawn_sidecar, temp_dir};

fn jury_payload(jury_number: &str, totals: &[f64]) -> serde_json::Value {
    let candidates: Vec<serde_json::Value> = totals
        .iter()
        .enumerate()
        .map(|(i, total)| {
            json!({
                "currentStep": 6,
                "jury": { "juryNumber": jury_number },
                "candidate": { "nom": format!("Candidat{}", i), "prenom": "X" },
                "scores": { "1-1": total },
                "comments": "",
            })
        })
        .collect();
    json!({
        "version": 1,
        "exportDate": "2026-06-12T09:00:00Z",
        "jury": { "juryNumber": jury_number },
        "candidates": candidates,
    })
}

fn import_juries(juries: &[(&str, Vec<f64>)]) -> serde_json::Value {
    let workspace = temp_dir("oraljuryd-harmonization");
    let files = temp_dir("oraljuryd-harmonization-files");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    for (i, (jury, totals)) in juries.iter().enumerate() {
        let path = files.join(format!("jury_{}.json", jury));
        fs::write(
            &path,
            serde_json::to_string_pretty(&jury_payload(jury, totals)).unwrap(),
        )
        .expect("write payload");
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("import-{}", i),
            "import.apply",
            json!({ "inPath": path.to_string_lossy() }),
        );
    }
    request_ok(
        &mut stdin,
        &mut reader,
        "h",
        "analytics.harmonization",
        json!({}),
    )
}

fn jury_flag(result: &serde_json::Value, jury: &str) -> (f64, bool) {
    let entry = result
        .get("juries")
        .and_then(|v| v.as_array())
        .expect("juries")
        .iter()
        .find(|j| j.get("juryNumber").and_then(|v| v.as_str()) == Some(jury))
        .cloned()
        .expect("jury entry");
    (
        entry.get("mean").and_then(|v| v.as_f64()).expect("mean"),
        entry
            .get("significant")
            .and_then(|v| v.as_bool())
            .expect("significant"),
    )
}

#[test]
fn deviation_of_exactly_two_points_is_not_flagged() {
    // Jury means 10 and 14 against a combined mean of 12: the deviation sits
    // exactly on the threshold and the comparison is strict.
    let result = import_juries(&[("1", vec![10.0]), ("2", vec![14.0])]);
    assert_eq!(result.get("globalMean").and_then(|v| v.as_f64()), Some(12.0));
    assert_eq!(result.get("threshold").and_then(|v| v.as_f64()), Some(2.0));

    let (mean1, flag1) = jury_flag(&result, "1");
    let (mean2, flag2) = jury_flag(&result, "2");
    assert_eq!(mean1, 10.0);
    assert_eq!(mean2, 14.0);
    assert!(!flag1);
    assert!(!flag2);
}

#[test]
fn deviation_beyond_two_points_is_flagged_both_ways() {
    let result = import_juries(&[("1", vec![9.0]), ("2", vec![14.0])]);
    assert_eq!(result.get("globalMean").and_then(|v| v.as_f64()), Some(11.5));

    let (_, flag1) = jury_flag(&result, "1");
    let (_, flag2) = jury_flag(&result, "2");
    assert!(flag1);
    assert!(flag2);
}

#[test]
fn per_jury_spread_reports_min_max_and_population_stddev() {
    let result = import_juries(&[("1", vec![8.0, 12.0, 16.0]), ("2", vec![12.0])]);
    let entry = result
        .get("juries")
        .and_then(|v| v.as_array())
        .expect("juries")
        .iter()
        .find(|j| j.get("juryNumber").and_then(|v| v.as_str()) == Some("1"))
        .cloned()
        .expect("jury 1");
    assert_eq!(entry.get("count").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(entry.get("mean").and_then(|v| v.as_f64()), Some(12.0));
    assert_eq!(entry.get("min").and_then(|v| v.as_f64()), Some(8.0));
    assert_eq!(entry.get("max").and_then(|v| v.as_f64()), Some(16.0));
    // Population std-dev of [8, 12, 16] is sqrt(32/3) ~= 3.266 -> 3.3 at 1dp.
    assert_eq!(entry.get("stdDev").and_then(|v| v.as_f64()), Some(3.3));

    let single = result
        .get("juries")
        .and_then(|v| v.as_array())
        .expect("juries")
        .iter()
        .find(|j| j.get("juryNumber").and_then(|v| v.as_str()) == Some("2"))
        .cloned()
        .expect("jury 2");
    assert_eq!(single.get("stdDev").and_then(|v| v.as_f64()), Some(0.0));
}
