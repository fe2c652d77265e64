
use serde_json::json;
use std::fs;
use test_support::{request_ok, score_all_criteria, spawn_sidecar, temp_dir};

#[test]
fn all_export_formats_land_on_disk_with_their_conventions() {
    let workspace = temp_dir("oraljuryd-exports");
    let out_dir = temp_dir("oraljuryd-exports-out");
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
        "session.setJury",
        json!({
            "juryNumber": "5",
            "prof1Nom": "Martin",
            "prof1Prenom": "Claire",
            "prof2Nom": "Bernard",
            "prof2Prenom": "Luc",
            "salle": "C3"
        }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "session.setCandidate",
        json!({ "nom": "Durand", "prenom": "Alice", "classe": "3eA" }),
    );
    score_all_criteria(&mut stdin, &mut reader, 3);
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "session.setComments",
        json!({ "comments": "Excellente prestation; jury unanime." }),
    );
    request_ok(&mut stdin, &mut reader, "5", "session.nextCandidate", json!({}));

    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "session.setCandidate",
        json!({ "nom": "Petit", "prenom": "Bruno", "classe": "3eB" }),
    );
    score_all_criteria(&mut stdin, &mut reader, 0);

    // Single-candidate PDF for the live evaluation.
    let single = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "export.evaluationPdf",
        json!({ "outDir": out_dir.to_string_lossy() }),
    );
    let single_path = single.get("path").and_then(|v| v.as_str()).expect("path");
    assert!(single_path.ends_with("evaluation_Petit_Bruno.pdf"));
    let pdf_bytes = fs::read(single_path).expect("read pdf");
    assert!(pdf_bytes.starts_with(b"%PDF-1.4"));

    request_ok(&mut stdin, &mut reader, "8", "session.nextCandidate", json!({}));

    let csv_result = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "export.evaluationsCsv",
        json!({ "outDir": out_dir.to_string_lossy() }),
    );
    assert_eq!(csv_result.get("rows").and_then(|v| v.as_u64()), Some(2));
    let csv_path = csv_result.get("path").and_then(|v| v.as_str()).expect("path");
    assert!(csv_path.contains("evaluations_oral_dnb_"));
    let csv_text = fs::read_to_string(csv_path).expect("read csv");
    assert!(csv_text.starts_with('\u{feff}'));
    assert!(csv_text.contains("Nom;Prenom;Classe"));
    assert!(csv_text.contains("Durand"));
    assert!(csv_text.contains("\"Excellente prestation; jury unanime.\""));

    let ranking = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "export.rankingCsv",
        json!({ "outDir": out_dir.to_string_lossy() }),
    );
    let ranking_path = ranking.get("path").and_then(|v| v.as_str()).expect("path");
    assert!(ranking_path.contains("classement_oral_dnb_"));
    let ranking_text = fs::read_to_string(ranking_path).expect("read ranking");
    // Excellent grid beats insufficient grid: Durand ranks first.
    let durand_line = ranking_text.lines().nth(1).expect("first ranked row");
    assert!(durand_line.starts_with("1;Durand"));

    let bulk = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "export.sessionPdf",
        json!({ "outDir": out_dir.to_string_lossy() }),
    );
    assert_eq!(bulk.get("candidates").and_then(|v| v.as_u64()), Some(2));
    let bulk_path = bulk.get("path").and_then(|v| v.as_str()).expect("path");
    assert!(bulk_path.contains("evaluations_oral_dnb_"));
    assert!(fs::read(bulk_path).expect("read bulk pdf").starts_with(b"%PDF-1.4"));

    let archive = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "export.archive",
        json!({ "outDir": out_dir.to_string_lossy() }),
    );
    assert_eq!(archive.get("entryCount").and_then(|v| v.as_u64()), Some(4));
    let archive_path = archive.get("path").and_then(|v| v.as_str()).expect("path");
    assert!(archive_path.contains("oral_dnb_session_5_"));
    let zip_bytes = fs::read(archive_path).expect("read zip");
    assert_eq!(&zip_bytes[..4], &[0x50, 0x4B, 0x03, 0x04]);
}
