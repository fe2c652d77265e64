use chrono::NaiveDate;

use crate::calc;
use crate::rubric::Grille;
use crate::session::{EvaluationState, TaggedEvaluation};

/// Byte-order mark expected by spreadsheet tools opening UTF-8 CSV.
pub const BOM: &str = "\u{feff}";

const DELIMITER: char = ';';

pub fn csv_quote(s: &str) -> String {
    if s.contains(DELIMITER) || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn join(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| csv_quote(f))
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string())
}

/// Flat export: one row per evaluation with identity fields, every
/// criterion score, section subtotals, grand total, timer durations and
/// comments.
pub fn evaluations_csv(grille: &Grille, entries: &[EvaluationState]) -> String {
    let mut headers: Vec<String> = ["Nom", "Prenom", "Classe", "Horaire", "Sujet"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    headers.extend(grille.criteria().map(|c| c.title.clone()));
    headers.extend(grille.sections.iter().map(|s| format!("Total {}", s.title)));
    headers.push("Total".to_string());
    headers.push("Expose (s)".to_string());
    headers.push("Entretien (s)".to_string());
    headers.push("Commentaires".to_string());

    let mut lines = vec![join(&headers)];
    for entry in entries {
        let mut fields = vec![
            entry.candidate.nom.clone(),
            entry.candidate.prenom.clone(),
            entry.candidate.classe.clone(),
            entry.candidate.horaire.clone(),
            entry.candidate.sujet.clone(),
        ];
        fields.extend(
            grille
                .criteria()
                .map(|c| calc::fmt_pt(entry.scores.get(&c.id).copied().unwrap_or(0.0))),
        );
        fields.extend(
            grille
                .sections
                .iter()
                .map(|s| calc::fmt_pt(calc::section_total(&entry.scores, s.id))),
        );
        fields.push(calc::fmt_pt(calc::grand_total(&entry.scores)));
        fields.push(
            entry
                .timers
                .expose
                .map(|t| t.actual_seconds.to_string())
                .unwrap_or_default(),
        );
        fields.push(
            entry
                .timers
                .entretien
                .map(|t| t.actual_seconds.to_string())
                .unwrap_or_default(),
        );
        fields.push(entry.comments.clone());
        lines.push(join(&fields));
    }
    format!("{}{}", BOM, lines.join("\n"))
}

/// Ranking export across juries, sorted by descending grand total.
pub fn ranking_csv(grille: &Grille, candidates: &[TaggedEvaluation]) -> String {
    let mut headers: Vec<String> = ["Rang", "Nom", "Prenom", "Classe", "Sujet", "Jury"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    headers.extend(grille.sections.iter().map(|s| format!("Total {}", s.title)));
    headers.push("Total".to_string());

    let mut sorted: Vec<&TaggedEvaluation> = candidates.iter().collect();
    sorted.sort_by(|a, b| {
        calc::grand_total(&b.state.scores)
            .partial_cmp(&calc::grand_total(&a.state.scores))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut lines = vec![join(&headers)];
    for (i, tagged) in sorted.iter().enumerate() {
        let mut fields = vec![
            (i + 1).to_string(),
            tagged.state.candidate.nom.clone(),
            tagged.state.candidate.prenom.clone(),
            tagged.state.candidate.classe.clone(),
            tagged.state.candidate.sujet.clone(),
            tagged.jury_number.clone(),
        ];
        fields.extend(
            grille
                .sections
                .iter()
                .map(|s| calc::fmt_pt(calc::section_total(&tagged.state.scores, s.id))),
        );
        fields.push(calc::fmt_pt(calc::grand_total(&tagged.state.scores)));
        lines.push(join(&fields));
    }
    format!("{}{}", BOM, lines.join("\n"))
}

pub fn evaluations_filename(date: NaiveDate) -> String {
    format!("evaluations_oral_dnb_{}.csv", date.format("%Y-%m-%d"))
}

pub fn ranking_filename(date: NaiveDate) -> String {
    format!("classement_oral_dnb_{}.csv", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric;
    use crate::timer::TimerData;

    /// Semicolon-aware record parser matching the quoting rules above.
    fn parse_record(line: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut buf = String::new();
        let mut in_quotes = false;
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0usize;
        while i < chars.len() {
            let ch = chars[i];
            if ch == '"' {
                if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                    buf.push('"');
                    i += 2;
                    continue;
                }
                in_quotes = !in_quotes;
                i += 1;
                continue;
            }
            if ch == ';' && !in_quotes {
                out.push(std::mem::take(&mut buf));
                i += 1;
                continue;
            }
            buf.push(ch);
            i += 1;
        }
        out.push(buf);
        out
    }

    fn sample_entry(grille: &Grille) -> EvaluationState {
        let mut entry = EvaluationState::default();
        entry.candidate.nom = "Durand".to_string();
        entry.candidate.prenom = "Alice".to_string();
        entry.candidate.classe = "3eB".to_string();
        for c in grille.criteria() {
            entry.scores.insert(c.id.clone(), c.levels[2].points);
        }
        entry.timers.expose = Some(TimerData {
            expected_seconds: 300,
            actual_seconds: 287,
        });
        entry
    }

    #[test]
    fn row_carries_every_criterion_and_totals() {
        let grille = rubric::builtin_2026();
        let entry = sample_entry(&grille);
        let csv = evaluations_csv(&grille, std::slice::from_ref(&entry));

        let text = csv.strip_prefix(BOM).expect("BOM prefix");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let headers = parse_record(lines[0]);
        let fields = parse_record(lines[1]);
        // 5 identity + 9 criteria + 2 section totals + total + 2 timers + comments
        assert_eq!(headers.len(), 20);
        assert_eq!(fields.len(), headers.len());
        assert_eq!(fields[0], "Durand");
        // Satisfactory everywhere: 3 + 4×1.5 in section 1, 4×1.5 in section 2.
        assert_eq!(fields[14], "9");
        assert_eq!(fields[15], "6");
        assert_eq!(fields[16], "15");
        assert_eq!(fields[17], "287");
        assert_eq!(fields[18], "");
    }

    #[test]
    fn comment_with_delimiter_and_quote_survives_a_parse_round_trip() {
        let grille = rubric::builtin_2026();
        let mut entry = sample_entry(&grille);
        entry.comments = "tres bien; a dit \"super\"\nligne 2".to_string();
        let csv = evaluations_csv(&grille, std::slice::from_ref(&entry));

        // The embedded newline is inside quotes, so logical rows = header +
        // one record spanning two physical lines.
        let text = csv.strip_prefix(BOM).expect("BOM prefix");
        let record_text = text.splitn(2, '\n').nth(1).expect("record line");
        let fields = parse_record(record_text);
        assert_eq!(fields.last().map(String::as_str), Some("tres bien; a dit \"super\"\nligne 2"));
    }

    #[test]
    fn ranking_sorts_by_descending_total() {
        let grille = rubric::builtin_2026();
        let strong = sample_entry(&grille);
        let mut weak = sample_entry(&grille);
        weak.candidate.nom = "Petit".to_string();
        for c in grille.criteria() {
            weak.scores.insert(c.id.clone(), c.levels[0].points);
        }
        let tagged = vec![
            TaggedEvaluation {
                state: weak,
                jury_number: "1".to_string(),
            },
            TaggedEvaluation {
                state: strong,
                jury_number: "2".to_string(),
            },
        ];

        let csv = ranking_csv(&grille, &tagged);
        let text = csv.strip_prefix(BOM).expect("BOM prefix");
        let lines: Vec<Vec<String>> = text.lines().map(parse_record).collect();
        assert_eq!(lines[1][0], "1");
        assert_eq!(lines[1][1], "Durand");
        assert_eq!(lines[2][0], "2");
        assert_eq!(lines[2][1], "Petit");
    }

    #[test]
    fn filenames_follow_the_dated_convention() {
        let date = NaiveDate::from_ymd_opt(2026, 6, 12).expect("date");
        assert_eq!(evaluations_filename(date), "evaluations_oral_dnb_2026-06-12.csv");
        assert_eq!(ranking_filename(date), "classement_oral_dnb_2026-06-12.csv");
    }
}
