//! Step prioritization under a shrinking image budget.
//!
//! When fewer images can be generated than steps exist, the first and last
//! steps are always kept: they anchor what to do first and what the end
//! state looks like. Remaining slots go to the steps whose text carries the
//! most safety-relevant language.

use tracing::info;

use crate::steps::TreatmentStep;

/// Safety vocabulary; occurrences in a step's title and description raise
/// its priority.
pub const SAFETY_KEYWORDS: &[&str] = &[
    "danger",
    "warning",
    "caution",
    "emergency",
    "avoid",
    "do not",
    "critical",
    "immediately",
    "stop",
];

/// Selects at most `budget` steps, preserving original order.
///
/// Everything is kept when the budget covers the list; nothing when the
/// budget is zero. Otherwise the first and last steps are anchored (with a
/// budget of exactly 1 only the first fits; the first wins deterministically)
/// and remaining slots are filled by descending safety-keyword count, ties
/// broken by original position.
#[must_use]
pub fn prioritize_steps(steps: &[TreatmentStep], budget: usize) -> Vec<TreatmentStep> {
    if budget >= steps.len() {
        return steps.to_vec();
    }
    if budget == 0 {
        return Vec::new();
    }

    let mut selected: Vec<usize> = vec![0];
    if budget >= 2 {
        selected.push(steps.len() - 1);
    }

    // Score non-anchor steps by safety keyword occurrences.
    let mut scored: Vec<(usize, usize)> = steps
        .iter()
        .enumerate()
        .filter(|(i, _)| !selected.contains(i))
        .map(|(i, step)| (safety_score(step), i))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0)); // stable: ties keep original order

    for (_, idx) in scored {
        if selected.len() >= budget {
            break;
        }
        selected.push(idx);
    }

    selected.sort_unstable();
    info!(original = steps.len(), selected = selected.len(), indices = ?selected, "Prioritized steps");
    selected.into_iter().map(|i| steps[i].clone()).collect()
}

/// Total occurrences of safety keywords in the step's title + description.
fn safety_score(step: &TreatmentStep) -> usize {
    let text = format!("{} {}", step.title, step.description).to_lowercase();
    SAFETY_KEYWORDS.iter().map(|kw| text.matches(kw).count()).sum()
}
