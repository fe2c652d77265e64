use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// The four qualitative mastery bands. Every criterion carries exactly one
/// level per band, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mastery {
    Insufficient,
    Fragile,
    Satisfactory,
    Excellent,
}

impl Mastery {
    pub const ALL: [Mastery; 4] = [
        Mastery::Insufficient,
        Mastery::Fragile,
        Mastery::Satisfactory,
        Mastery::Excellent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mastery::Insufficient => "insufficient",
            Mastery::Fragile => "fragile",
            Mastery::Satisfactory => "satisfactory",
            Mastery::Excellent => "excellent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryLevel {
    pub name: String,
    pub description: String,
    pub points: f64,
    pub mastery: Mastery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    /// Stable id, `"{section}-{position}"` (e.g. "1-1"). Section membership
    /// is derived from this prefix everywhere scores are aggregated.
    pub id: String,
    pub title: String,
    pub max_points: f64,
    pub levels: Vec<MasteryLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: u32,
    pub title: String,
    pub max_points: f64,
    pub criteria: Vec<Criterion>,
}

impl Section {
    /// Criterion-id prefix owned by this section.
    pub fn prefix(&self) -> String {
        format!("{}-", self.id)
    }
}

/// One session year's scoring schema. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grille {
    pub session: String,
    pub total_points: f64,
    pub sections: Vec<Section>,
}

impl Grille {
    pub fn criteria(&self) -> impl Iterator<Item = &Criterion> {
        self.sections.iter().flat_map(|s| s.criteria.iter())
    }

    pub fn find_criterion(&self, id: &str) -> Option<&Criterion> {
        self.criteria().find(|c| c.id == id)
    }
}

/// Checks the structural invariants of a rubric: four strictly increasing
/// levels per criterion, criterion sums matching the section budget, and
/// section sums matching the grand total.
pub fn validate(grille: &Grille) -> Result<()> {
    let mut sections_sum = 0.0;
    for section in &grille.sections {
        let mut criteria_sum = 0.0;
        for criterion in &section.criteria {
            if criterion.levels.len() != 4 {
                return Err(anyhow!(
                    "criterion {} must have exactly 4 mastery levels",
                    criterion.id
                ));
            }
            for (level, expected) in criterion.levels.iter().zip(Mastery::ALL) {
                if level.mastery != expected {
                    return Err(anyhow!(
                        "criterion {} levels out of band order",
                        criterion.id
                    ));
                }
            }
            for pair in criterion.levels.windows(2) {
                if pair[1].points <= pair[0].points {
                    return Err(anyhow!(
                        "criterion {} level points must be strictly increasing",
                        criterion.id
                    ));
                }
            }
            let top = criterion.levels.last().map(|l| l.points).unwrap_or(0.0);
            if (top - criterion.max_points).abs() > f64::EPSILON {
                return Err(anyhow!(
                    "criterion {} top level must be worth its max points",
                    criterion.id
                ));
            }
            if !criterion.id.starts_with(&section.prefix()) {
                return Err(anyhow!(
                    "criterion {} does not belong to section {}",
                    criterion.id,
                    section.id
                ));
            }
            criteria_sum += criterion.max_points;
        }
        if (criteria_sum - section.max_points).abs() > f64::EPSILON {
            return Err(anyhow!(
                "section {} criteria sum {} != section max {}",
                section.id,
                criteria_sum,
                section.max_points
            ));
        }
        sections_sum += section.max_points;
    }
    if (sections_sum - grille.total_points).abs() > f64::EPSILON {
        return Err(anyhow!(
            "section sum {} != rubric total {}",
            sections_sum,
            grille.total_points
        ));
    }
    Ok(())
}

/// Looks up the built-in rubric for a session year.
pub fn for_session(session: &str) -> Option<Grille> {
    match session {
        "2026" => Some(builtin_2026()),
        _ => None,
    }
}

pub fn builtin() -> Grille {
    builtin_2026()
}

const LEVEL_NAMES: [&str; 4] = [
    "Maîtrise insuffisante",
    "Maîtrise fragile",
    "Maîtrise satisfaisante",
    "Très bonne maîtrise",
];

fn criterion(id: &str, title: &str, max_points: f64, levels: [(&str, f64); 4]) -> Criterion {
    Criterion {
        id: id.to_string(),
        title: title.to_string(),
        max_points,
        levels: levels
            .iter()
            .zip(LEVEL_NAMES)
            .zip(Mastery::ALL)
            .map(|(((description, points), name), mastery)| MasteryLevel {
                name: name.to_string(),
                description: description.to_string(),
                points: *points,
                mastery,
            })
            .collect(),
    }
}

/// Session-2026 grille for the oral examination: 12 + 8 = 20 points.
pub fn builtin_2026() -> Grille {
    Grille {
        session: "2026".to_string(),
        total_points: 20.0,
        sections: vec![
            Section {
                id: 1,
                title: "Maîtrise du sujet présenté".to_string(),
                max_points: 12.0,
                criteria: vec![
                    criterion(
                        "1-1",
                        "Construire un exposé de manière développée et organisée",
                        4.0,
                        [
                            (
                                "Développe insuffisamment son exposé : il n'est pas clair et/ou désorganisé.",
                                1.0,
                            ),
                            (
                                "Développe un exposé parfois désorganisé qui manque aussi de clarté.",
                                2.0,
                            ),
                            ("Développe un exposé clair et assez bien structuré.", 3.0),
                            (
                                "Développe un exposé bien structuré, clair et qui respecte la durée minimum impartie (entre 4'30 et 5').",
                                4.0,
                            ),
                        ],
                    ),
                    criterion(
                        "1-2",
                        "Justifier son choix d'objet d'étude (ou de stage) et sa démarche",
                        2.0,
                        [
                            ("Justifie insuffisamment ses choix.", 0.5),
                            ("Justifie parfois ses choix.", 1.0),
                            ("Justifie globalement ses choix.", 1.5),
                            ("Justifie ses choix de manière cohérente et argumentée.", 2.0),
                        ],
                    ),
                    criterion(
                        "1-3",
                        "Mettre en évidence les connaissances acquises au cours du projet",
                        2.0,
                        [
                            ("Peu de connaissances acquises sont présentées.", 0.5),
                            ("Quelques connaissances acquises sont présentées.", 1.0),
                            (
                                "Les connaissances acquises sont globalement bien formulées et développées.",
                                1.5,
                            ),
                            (
                                "Les connaissances acquises sont clairement formulées et développées.",
                                2.0,
                            ),
                        ],
                    ),
                    criterion(
                        "1-4",
                        "Mettre en évidence les compétences du socle commun acquises",
                        2.0,
                        [
                            ("Peu de compétences du socle sont présentées.", 0.5),
                            ("Quelques compétences du socle sont présentées.", 1.0),
                            (
                                "Les compétences du socle sont globalement présentées et expliquées.",
                                1.5,
                            ),
                            (
                                "Les compétences du socle sont clairement présentées et expliquées.",
                                2.0,
                            ),
                        ],
                    ),
                    criterion(
                        "1-5",
                        "Porter un regard critique sur son projet",
                        2.0,
                        [
                            ("Formule un avis personnel superficiel.", 0.5),
                            ("Formule un avis personnel mais sans le justifier.", 1.0),
                            ("Formule un avis personnel justifié en partie.", 1.5),
                            (
                                "Formule un avis personnel justifié qui prend en compte ses sensations et ses sentiments.",
                                2.0,
                            ),
                        ],
                    ),
                ],
            },
            Section {
                id: 2,
                title: "Maîtrise de l'expression orale".to_string(),
                max_points: 8.0,
                criteria: vec![
                    criterion(
                        "2-1",
                        "S'exprimer de façon maîtrisée",
                        2.0,
                        [
                            (
                                "S'exprime avec difficulté, pas assez audible pour que le jury puisse entendre. Gestuelle inadaptée. Ne regarde pas le jury.",
                                0.5,
                            ),
                            (
                                "S'exprime brièvement en réussissant parfois à se faire entendre. Regarde l'auditoire de temps en temps. Gestuelle mal maîtrisée.",
                                1.0,
                            ),
                            (
                                "S'exprime de façon audible et claire en regardant son auditoire mais avec quelques hésitations. Utilise son corps à bon escient.",
                                1.5,
                            ),
                            (
                                "S'exprime de façon audible et claire, sans hésitation et en regardant son auditoire. Bonne gestuelle.",
                                2.0,
                            ),
                        ],
                    ),
                    criterion(
                        "2-2",
                        "Utiliser un vocabulaire adapté et varié",
                        2.0,
                        [
                            ("Utilise un vocabulaire limité, imprécis et familier.", 0.5),
                            ("Utilise un vocabulaire partiellement adapté.", 1.0),
                            ("Utilise un vocabulaire adapté et relativement varié.", 1.5),
                            ("Utilise un vocabulaire précis, riche et soutenu.", 2.0),
                        ],
                    ),
                    criterion(
                        "2-3",
                        "Maîtriser la langue orale",
                        2.0,
                        [
                            (
                                "Les phrases sont trop souvent boiteuses : la compréhension est vraiment gênée.",
                                0.5,
                            ),
                            (
                                "Les phrases présentent plusieurs erreurs syntaxiques, et/ou le propos manque de clarté dans son ensemble.",
                                1.0,
                            ),
                            (
                                "Les phrases sont correctes, le discours reste clair dans l'ensemble.",
                                1.5,
                            ),
                            (
                                "Les phrases sont syntaxiquement correctes, le discours est clair et organisé à l'aide de connecteurs appropriés et variés.",
                                2.0,
                            ),
                        ],
                    ),
                    criterion(
                        "2-4",
                        "Participer de façon constructive à des échanges oraux",
                        2.0,
                        [
                            (
                                "Ne répond pas aux questions ou y répond de manière erronée.",
                                0.5,
                            ),
                            (
                                "Répond à quelques questions même si ses réponses sont parfois erronées.",
                                1.0,
                            ),
                            (
                                "Répond à la plupart des questions et essaie de développer ses réponses.",
                                1.5,
                            ),
                            (
                                "Répond aux questions de façon convaincante et avec des exemples.",
                                2.0,
                            ),
                        ],
                    ),
                ],
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_2026_satisfies_invariants() {
        let grille = builtin_2026();
        validate(&grille).expect("built-in rubric must validate");
        assert_eq!(grille.total_points, 20.0);
        assert_eq!(grille.sections.len(), 2);
        assert_eq!(grille.sections[0].max_points, 12.0);
        assert_eq!(grille.sections[1].max_points, 8.0);
        assert_eq!(grille.criteria().count(), 9);
    }

    #[test]
    fn validate_rejects_broken_section_budget() {
        let mut grille = builtin_2026();
        grille.sections[0].max_points = 11.0;
        assert!(validate(&grille).is_err());
    }

    #[test]
    fn validate_rejects_non_increasing_levels() {
        let mut grille = builtin_2026();
        grille.sections[0].criteria[0].levels[2].points = 1.0;
        assert!(validate(&grille).is_err());
    }

    #[test]
    fn unknown_session_is_absent() {
        assert!(for_session("2026").is_some());
        assert!(for_session("1999").is_none());
    }
}
