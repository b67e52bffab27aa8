//! Plain-text decision inference
//!
//! Used when no structured decision can be recovered from an evaluation
//! response. The text is upper-cased and scanned for the earliest occurrence
//! of each keyword family:
//!
//! 1. ACCEPT token present and (no REJECT token, or ACCEPT occurs before
//!    REJECT position + [`PROXIMITY_WINDOW`]) => Accept
//! 2. MUTATE token present => Mutate
//! 3. REJECT token present => Reject
//! 4. positive sentiment word present => Accept
//! 5. otherwise => Reject
//!
//! Rule 1 leans toward acceptance when signals conflict. The resulting accept
//! rate under ambiguous output depends on it, so it is kept as is.

use super::request::{Decision, DecisionKind};

/// Characters after a REJECT token within which an ACCEPT token still wins
pub const PROXIMITY_WINDOW: usize = 20;

const ACCEPT_FAMILY: &[&str] = &["ACCEPT", "APPROVE", "ADOPT", "INTEGRATE"];
const REJECT_FAMILY: &[&str] = &["REJECT", "DECLINE", "DENY", "REFUSE"];
const MUTATE_FAMILY: &[&str] = &["MUTATE", "MODIFY", "ADAPT", "PARTIAL"];
const POSITIVE_WORDS: &[&str] = &[
    "GOOD",
    "GREAT",
    "BENEFICIAL",
    "USEFUL",
    "VALUABLE",
    "EXCELLENT",
    "AGREE",
    "HELPFUL",
    "YES",
];

fn earliest(haystack: &str, family: &[&str]) -> Option<usize> {
    family.iter().filter_map(|token| haystack.find(token)).min()
}

/// Infer a single verdict kind from free text
pub fn infer_kind(text: &str) -> DecisionKind {
    let upper = text.to_uppercase();

    let accept = earliest(&upper, ACCEPT_FAMILY);
    let reject = earliest(&upper, REJECT_FAMILY);
    let mutate = earliest(&upper, MUTATE_FAMILY);

    if let Some(accept_pos) = accept {
        let accept_wins = match reject {
            None => true,
            Some(reject_pos) => accept_pos < reject_pos + PROXIMITY_WINDOW,
        };
        if accept_wins {
            return DecisionKind::Accept;
        }
    }
    if mutate.is_some() {
        return DecisionKind::Mutate;
    }
    if reject.is_some() {
        return DecisionKind::Reject;
    }
    if earliest(&upper, POSITIVE_WORDS).is_some() {
        return DecisionKind::Accept;
    }
    DecisionKind::Reject
}

/// Infer a verdict and carry a trimmed excerpt of the text as its reason
pub fn infer_decision(text: &str) -> Decision {
    let kind = infer_kind(text);
    let excerpt: String = text.trim().chars().take(200).collect();
    let reason = if excerpt.is_empty() {
        "No recognizable decision in response".to_string()
    } else {
        format!("Inferred from text: {excerpt}")
    };
    Decision::new(kind, reason)
}
