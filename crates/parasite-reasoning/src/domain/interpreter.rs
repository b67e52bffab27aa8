//! Response Interpreter
//!
//! Turns raw provider text into an [`InferenceResult`] keyed by mode. It never
//! fails: malformed output degrades through progressively cruder recovery
//! strategies down to an empty or neutral result.
//!
//! Structured recovery order:
//! 1. fenced block tagged `json`, then any other fenced block
//! 2. largest `[...]` or `{...}` span, as-is then quote-repaired
//! 3. the trimmed full text, as-is then quote-repaired

use lazy_static::lazy_static;
use parasite_common::{InfectionKind, DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::repair::repair_quotes;
use super::request::{Decision, DecisionKind, InferenceMode, InferenceResult, ProposedInfection};
use super::verdict;

lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)```[^\n`]*\n(.*?)\n?```").expect("code fence pattern is valid");
    static ref JSON_FENCE: Regex =
        Regex::new(r"(?is)```\s*json[^\n`]*\n(.*?)\n?```").expect("json fence pattern is valid");
}

/// Interpret `raw_text` for `mode`
pub fn interpret(mode: InferenceMode, raw_text: &str) -> InferenceResult {
    let mut result = InferenceResult::narrative_only(mode, raw_text);

    match mode {
        InferenceMode::GenerateCode => {
            result.code_output = Some(extract_code(raw_text));
        }
        InferenceMode::ProposeInfections => match recover_structured(raw_text) {
            Some(value) => {
                result.proposals = proposals_from(&value);
                if result.proposals.is_empty() {
                    debug!("Structured output held no usable proposals");
                }
            }
            None => {
                warn!(
                    excerpt = %excerpt(raw_text),
                    "Failed to recover proposals from response"
                );
            }
        },
        InferenceMode::EvaluateInfection => {
            if let Some(value) = recover_structured(raw_text) {
                if value.get("decision").map_or(false, Value::is_string) {
                    // one verdict for the whole batch
                    result.fallback_decision = decision_from(&value);
                } else {
                    result.decisions = decisions_from(&value);
                }
            }
            if result.decisions.is_empty() && result.fallback_decision.is_none() {
                debug!("No structured decisions, inferring from plain text");
                result.fallback_decision = Some(verdict::infer_decision(raw_text));
            }
        }
        InferenceMode::Plan | InferenceMode::Reflect => {}
    }

    result
}

/// Concatenate every fenced block in document order, or return the text verbatim
pub fn extract_code(text: &str) -> String {
    let blocks: Vec<&str> = CODE_FENCE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    if blocks.is_empty() {
        text.to_string()
    } else {
        blocks.join("\n\n")
    }
}

/// Recover a JSON value from free text
pub fn recover_structured(text: &str) -> Option<Value> {
    // 1. fenced blocks, json-tagged first
    let tagged = JSON_FENCE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()));
    let any = CODE_FENCE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()));
    for block in tagged.chain(any) {
        if let Some(value) = parse_lenient(block) {
            return Some(value);
        }
    }

    // 2. largest bracketed span
    for span in bracket_spans(text) {
        if let Some(value) = parse_lenient(span) {
            return Some(value);
        }
    }

    // 3. whole text
    parse_lenient(text.trim())
}

fn parse_lenient(candidate: &str) -> Option<Value> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    serde_json::from_str::<Value>(candidate)
        .ok()
        .or_else(|| serde_json::from_str::<Value>(&repair_quotes(candidate)).ok())
        .filter(|v| v.is_array() || v.is_object())
}

/// `[...]` and `{...}` spans from first opener to last closer, longest first
fn bracket_spans(text: &str) -> Vec<&str> {
    let mut spans: Vec<&str> = [('[', ']'), ('{', '}')]
        .iter()
        .filter_map(|&(open, close)| {
            let start = text.find(open)?;
            let end = text.rfind(close)?;
            (end > start).then(|| &text[start..=end])
        })
        .collect();
    spans.sort_by_key(|s| std::cmp::Reverse(s.chars().count()));
    spans
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProposal {
    #[serde(alias = "targetAgentId", alias = "target_id", alias = "target")]
    target_agent_id: Option<String>,
    #[serde(alias = "infectionType", alias = "type", alias = "kind")]
    infection_type: Option<String>,
    #[serde(alias = "suggestion", alias = "content")]
    message: Option<String>,
    #[serde(alias = "codeSnippet", alias = "code")]
    code_snippet: Option<String>,
    priority: Option<Value>,
}

fn proposals_from(value: &Value) -> Vec<ProposedInfection> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match ["infections", "proposals"].iter().find_map(|k| map.get(*k)) {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => vec![value],
        },
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter(|item| item.is_object())
        .filter_map(|item| serde_json::from_value::<RawProposal>(item.clone()).ok())
        .map(|raw| ProposedInfection {
            target_id: raw.target_agent_id.unwrap_or_default().trim().to_string(),
            kind: raw
                .infection_type
                .as_deref()
                .map(InfectionKind::parse_lenient)
                .unwrap_or(InfectionKind::Suggestion),
            message: raw
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "Consider this suggestion".to_string()),
            code_snippet: raw.code_snippet.filter(|c| !c.trim().is_empty()),
            priority: priority_from(raw.priority.as_ref()),
        })
        .collect()
}

fn priority_from(value: Option<&Value>) -> u8 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    raw.map(|p| p.round().clamp(MIN_PRIORITY as f64, MAX_PRIORITY as f64) as u8)
        .unwrap_or(DEFAULT_PRIORITY)
}

fn decisions_from(value: &Value) -> HashMap<String, Decision> {
    let mut decisions = HashMap::new();

    match value {
        Value::Object(map) => {
            if let Some(nested) = map.get("decisions") {
                return decisions_from(nested);
            }
            for (id, entry) in map {
                if let Some(decision) = decision_from(entry) {
                    decisions.insert(id.clone(), decision);
                }
            }
        }
        Value::Array(items) => {
            for entry in items {
                let id = entry
                    .as_object()
                    .and_then(|o| ["infection_id", "id", "infectionId"].iter().find_map(|k| o.get(*k)))
                    .and_then(id_string);
                if let (Some(id), Some(decision)) = (id, decision_from(entry)) {
                    decisions.insert(id, decision);
                }
            }
        }
        _ => {}
    }

    decisions
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decision_from(entry: &Value) -> Option<Decision> {
    match entry {
        Value::String(s) => Some(Decision::new(parse_kind(s), s.clone())),
        Value::Object(obj) => {
            let raw = obj
                .get("decision")
                .or_else(|| obj.get("action"))
                .and_then(Value::as_str)?;
            let reason = obj
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("No reason given")
                .to_string();
            let mut decision = Decision::new(parse_kind(raw), reason);
            if let Some(hints) = mutation_hints(obj) {
                decision = decision.with_hints(hints);
            }
            Some(decision)
        }
        _ => None,
    }
}

fn mutation_hints(obj: &Map<String, Value>) -> Option<Value> {
    ["mutations", "mutation_hints", "mutationHints", "modifications"]
        .iter()
        .find_map(|k| obj.get(*k))
        .filter(|v| !v.is_null())
        .cloned()
}

fn parse_kind(raw: &str) -> DecisionKind {
    match raw.trim().to_ascii_lowercase().as_str() {
        "accept" | "accepted" => DecisionKind::Accept,
        "reject" | "rejected" => DecisionKind::Reject,
        "mutate" | "mutated" => DecisionKind::Mutate,
        other => verdict::infer_kind(other),
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(200).collect()
}
