//! Medical topic detection and the image generation gate.

/// Keywords indicating the answer benefits from step-by-step visuals.
const VISUAL_KEYWORDS: &[&str] = &[
    "cpr",
    "cardiopulmonary",
    "chest compression",
    "heimlich",
    "bandage",
    "wrap",
    "splint",
    "immobilize",
    "position",
    "wound",
    "cut",
    "bleeding",
    "burn",
    "fracture",
    "sprain",
    "treat",
    "treatment",
    "first aid",
    "apply",
    "clean",
    "dress",
    "choking",
    "fainting",
    "unconscious",
    "recovery position",
    "how to",
    "steps",
    "procedure",
];

/// Topic keyword table; first match wins.
const TOPICS: &[(&str, &[&str])] = &[
    ("cpr", &["cpr", "cardiopulmonary", "chest compression", "cardiac arrest"]),
    ("choking", &["choking", "heimlich", "can't breathe", "airway blocked"]),
    ("bleeding", &["bleeding", "wound", "cut", "blood", "laceration"]),
    ("burn", &["burn", "burned", "scalded"]),
    ("fracture", &["fracture", "broken bone", "broken arm", "broken leg"]),
    ("fainting", &["fainting", "fainted", "unconscious", "passed out"]),
    ("sprain", &["sprain", "twisted", "ankle", "wrist injury"]),
];

/// Whether step-by-step images should be generated for this turn.
#[must_use]
pub fn should_generate_images(query: &str, response: &str) -> bool {
    let combined = format!("{} {}", query, response).to_lowercase();
    VISUAL_KEYWORDS.iter().any(|kw| combined.contains(kw))
}

/// Detects the primary medical topic of a query, if any.
#[must_use]
pub fn detect_medical_topic(query: &str) -> Option<&'static str> {
    let lowered = query.to_lowercase();
    TOPICS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| lowered.contains(kw)))
        .map(|(topic, _)| *topic)
}
