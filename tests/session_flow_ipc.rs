
use serde_json::json;
use test_support::{request_err, request_ok, score_all_criteria, spawn_sidecar, temp_dir};

#[test]
fn full_juror_flow_from_setup_to_saved_history() {
    let workspace = temp_dir("oraljuryd-session-flow");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "accounts.bootstrapAdmin",
        json!({ "email": "admin@college.fr", "password": "adminpw" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.signIn",
        json!({ "email": "admin@college.fr", "password": "adminpw" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "accounts.provision",
        json!({
            "email": "jury2@college.fr",
            "password": "jurypw",
            "juryNumber": "2"
        }),
    );
    let signin = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "auth.signIn",
        json!({ "email": "jury2@college.fr", "password": "jurypw" }),
    );
    assert_eq!(
        signin.pointer("/profile/role").and_then(|v| v.as_str()),
        Some("jury")
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "session.setJury",
        json!({
            "prof1Nom": "Martin",
            "prof1Prenom": "Claire",
            "prof2Nom": "Bernard",
            "prof2Prenom": "Luc",
            "juryNumber": "2",
            "salle": "B12",
            "date": "2026-06-12"
        }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "session.setCandidate",
        json!({ "nom": "Durand", "prenom": "Alice", "classe": "3eB", "sujet": "Stage" }),
    );

    // Expose phase: 5 minutes expected, 290 seconds spoken.
    request_ok(&mut stdin, &mut reader, "8", "timer.start", json!({ "phase": "expose" }));
    request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "timer.tick",
        json!({ "phase": "expose", "seconds": 290 }),
    );
    let recorded = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "timer.record",
        json!({ "phase": "expose" }),
    );
    assert_eq!(
        recorded.pointer("/recorded/actualSeconds").and_then(|v| v.as_i64()),
        Some(290)
    );
    assert_eq!(
        recorded.pointer("/recorded/expectedSeconds").and_then(|v| v.as_i64()),
        Some(300)
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "session.goToStep",
        json!({ "step": 5 }),
    );

    // The grid gates on completeness: no scores yet, no section advance.
    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "12",
        "session.nextSection",
        json!({}),
    );
    assert_eq!(code, "section_incomplete");

    // Points must match a mastery level of the criterion.
    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "13",
        "session.setScore",
        json!({ "criterionId": "1-1", "points": 2.5 }),
    );
    assert_eq!(code, "bad_params");

    score_all_criteria(&mut stdin, &mut reader, 2);

    let advanced = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "session.nextSection",
        json!({}),
    );
    assert_eq!(
        advanced.get("sectionIndex").and_then(|v| v.as_u64()),
        Some(1)
    );
    let finished = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "session.nextSection",
        json!({}),
    );
    assert_eq!(
        finished.pointer("/state/currentStep").and_then(|v| v.as_u64()),
        Some(6)
    );
    // Satisfactory everywhere on the 2026 grille: 9 + 6 = 15 points.
    assert_eq!(finished.get("grandTotal").and_then(|v| v.as_f64()), Some(15.0));
    let section_totals: Vec<f64> = finished
        .get("sections")
        .and_then(|v| v.as_array())
        .expect("sections")
        .iter()
        .map(|s| s.get("total").and_then(|v| v.as_f64()).expect("total"))
        .collect();
    assert_eq!(section_totals, vec![9.0, 6.0]);

    // Summary-step save: first flush creates the row, later ones update it.
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "session.flushAutosave",
        json!({}),
    );
    assert_eq!(first.get("flushed").and_then(|v| v.as_bool()), Some(true));

    request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "session.setComments",
        json!({ "comments": "Expose clair et structure." }),
    );
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "session.flushAutosave",
        json!({}),
    );
    assert_eq!(second.get("updated").and_then(|v| v.as_bool()), Some(true));

    // Next candidate: jury info survives, candidate fields reset, a fresh
    // target will be learned for the next row.
    let next = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "session.nextCandidate",
        json!({}),
    );
    assert_eq!(
        next.pointer("/session/state/currentStep").and_then(|v| v.as_u64()),
        Some(2)
    );
    assert_eq!(
        next.pointer("/session/state/jury/juryNumber").and_then(|v| v.as_str()),
        Some("2")
    );
    assert_eq!(
        next.pointer("/session/state/candidate/nom").and_then(|v| v.as_str()),
        Some("")
    );
    assert_eq!(
        next.pointer("/session/grandTotal").and_then(|v| v.as_f64()),
        Some(0.0)
    );
    assert!(next.pointer("/session/writeTarget").map(|v| v.is_null()).unwrap_or(false));

    let history = request_ok(&mut stdin, &mut reader, "20", "history.list", json!({}));
    let entries = history.get("entries").and_then(|v| v.as_array()).expect("entries");
    assert_eq!(entries.len(), 1);
    assert!(entries[0]
        .get("id")
        .and_then(|v| v.as_str())
        .map(|id| !id.is_empty())
        .unwrap_or(false));
    assert_eq!(
        entries[0].get("total").and_then(|v| v.as_f64()),
        Some(15.0)
    );
    assert_eq!(
        entries[0]
            .pointer("/state/comments")
            .and_then(|v| v.as_str()),
        Some("Expose clair et structure.")
    );
    assert_eq!(
        entries[0]
            .pointer("/state/timers/expose/actualSeconds")
            .and_then(|v| v.as_i64()),
        Some(290)
    );
}
