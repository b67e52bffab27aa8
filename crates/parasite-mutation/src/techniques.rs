//! Mutation techniques
//!
//! Each technique decides how much foreign code a receiving agent actually
//! takes in. They range from quoting ideas only (low impact) to adopting the
//! whole snippet (high impact):
//!
//! | Technique | Impact | Takes |
//! |-----------|--------|-------|
//! | `conceptual_extraction` | 5 | item names and doc lines only |
//! | `pattern_mimicry` | 8 | detected patterns, code quoted as comments |
//! | `framework_inversion` | 10 | code quoted as comments |
//! | `dependency_abstraction` | 15 | a trait seam, no foreign code |
//! | `defensive_fortification` | 20 | a kill-switch guard, code quoted as comments |
//! | `selective_integration` | 25 | small top-level items |
//! | `trojan_defense` | 30 | full code behind a call monitor |
//! | `architectural_fusion` | 40 | full code |
//! | `symbiotic_merge` | 50 | full code plus partnership metadata |

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::MutationConfig;

lazy_static! {
    static ref ITEM_HEAD: Regex = Regex::new(
        r"^(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(fn|struct|enum|trait|impl|mod)\b(?:\s*<[^>]*>)?\s*(\w+)?"
    )
    .unwrap();
    static ref NAMED_ITEM: Regex = Regex::new(r"\b(fn|struct|enum|trait)\s+(\w+)").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationTechnique {
    ConceptualExtraction,
    SelectiveIntegration,
    FrameworkInversion,
    DefensiveFortification,
    ArchitecturalFusion,
    DependencyAbstraction,
    PatternMimicry,
    TrojanDefense,
    SymbioticMerge,
}

impl MutationTechnique {
    pub const ALL: [MutationTechnique; 9] = [
        MutationTechnique::ConceptualExtraction,
        MutationTechnique::SelectiveIntegration,
        MutationTechnique::FrameworkInversion,
        MutationTechnique::DefensiveFortification,
        MutationTechnique::ArchitecturalFusion,
        MutationTechnique::DependencyAbstraction,
        MutationTechnique::PatternMimicry,
        MutationTechnique::TrojanDefense,
        MutationTechnique::SymbioticMerge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MutationTechnique::ConceptualExtraction => "conceptual_extraction",
            MutationTechnique::SelectiveIntegration => "selective_integration",
            MutationTechnique::FrameworkInversion => "framework_inversion",
            MutationTechnique::DefensiveFortification => "defensive_fortification",
            MutationTechnique::ArchitecturalFusion => "architectural_fusion",
            MutationTechnique::DependencyAbstraction => "dependency_abstraction",
            MutationTechnique::PatternMimicry => "pattern_mimicry",
            MutationTechnique::TrojanDefense => "trojan_defense",
            MutationTechnique::SymbioticMerge => "symbiotic_merge",
        }
    }

    /// Nominal chimera impact in percent
    pub fn impact(&self) -> f64 {
        match self {
            MutationTechnique::ConceptualExtraction => 5.0,
            MutationTechnique::PatternMimicry => 8.0,
            MutationTechnique::FrameworkInversion => 10.0,
            MutationTechnique::DependencyAbstraction => 15.0,
            MutationTechnique::DefensiveFortification => 20.0,
            MutationTechnique::SelectiveIntegration => 25.0,
            MutationTechnique::TrojanDefense => 30.0,
            MutationTechnique::ArchitecturalFusion => 40.0,
            MutationTechnique::SymbioticMerge => 50.0,
        }
    }

    fn impact_label(&self) -> &'static str {
        match self.impact() as u32 {
            0..=10 => "LOW",
            11..=15 => "MEDIUM-LOW",
            16..=25 => "MEDIUM",
            26..=30 => "MEDIUM-HIGH",
            31..=40 => "HIGH",
            _ => "VERY HIGH",
        }
    }

    /// Pick a technique from a proposal's quality and the sender's trust (both 0-100)
    pub fn select(quality: i64, trust: i64) -> Self {
        if quality > 80 {
            if trust > 70 {
                MutationTechnique::ArchitecturalFusion
            } else {
                MutationTechnique::SelectiveIntegration
            }
        } else if quality >= 50 {
            if trust < 30 {
                MutationTechnique::ConceptualExtraction
            } else {
                MutationTechnique::FrameworkInversion
            }
        } else {
            MutationTechnique::DefensiveFortification
        }
    }

    fn banner_title(&self) -> &'static str {
        match self {
            MutationTechnique::ConceptualExtraction => "CONCEPTUAL INSPIRATION FROM",
            MutationTechnique::SelectiveIntegration => "SELECTIVE INTEGRATION FROM",
            MutationTechnique::FrameworkInversion => "FRAMEWORK INVERSION FROM",
            MutationTechnique::DefensiveFortification => "DEFENSIVE FORTIFICATION FROM",
            MutationTechnique::ArchitecturalFusion => "ARCHITECTURAL FUSION WITH",
            MutationTechnique::DependencyAbstraction => "DEPENDENCY ABSTRACTION FROM",
            MutationTechnique::PatternMimicry => "PATTERN MIMICRY FROM",
            MutationTechnique::TrojanDefense => "TROJAN DEFENSE FROM",
            MutationTechnique::SymbioticMerge => "SYMBIOTIC MERGE WITH",
        }
    }

    /// Block to append to the receiving artifact, or `None` when the
    /// technique found nothing to take
    pub(crate) fn render(&self, input: &TechniqueInput<'_>, config: &MutationConfig) -> Option<String> {
        let p = config.comment_prefix.as_str();
        let tag = short_tag(input.proposal_id);
        let source = input.source_agent_id;

        let (notes, body): (Vec<String>, String) = match self {
            MutationTechnique::ConceptualExtraction => {
                let concepts = extract_concepts(input.code);
                let mut notes = vec!["Extracted concepts (implementation stays original):".to_string()];
                notes.extend(concepts.into_iter().take(10));
                (notes, format!("{p} Conceptual integration pending next reasoning cycle\n"))
            }
            MutationTechnique::SelectiveIntegration => {
                let selected: Vec<&str> = top_level_items(input.code)
                    .into_iter()
                    .filter(|item| item.kind == "fn" && item.text.len() < config.max_selected_item_chars)
                    .map(|item| item.text)
                    .collect();
                if selected.is_empty() {
                    return None;
                }
                (
                    vec![format!("Selected {} components", selected.len())],
                    format!("{}\n", selected.join("\n\n")),
                )
            }
            MutationTechnique::FrameworkInversion => (
                vec![
                    format!("Approach inverted to match {} architecture", input.agent_id),
                    "Foreign code below is reference only".to_string(),
                ],
                format!(
                    "{p} --- Original reference (commented out) ---\n{}{p} --- End original reference ---\n",
                    quote_lines(input.code, config.reference_lines, p)
                ),
            ),
            MutationTechnique::DefensiveFortification => (
                vec!["Foreign code runs only behind a guard with a kill switch".to_string()],
                format!(
                    "pub mod fortified_{tag} {{\n    use std::sync::atomic::{{AtomicBool, Ordering}};\n\n    static ENABLED: AtomicBool = AtomicBool::new(true);\n\n    pub fn disable() {{\n        ENABLED.store(false, Ordering::SeqCst);\n    }}\n\n    pub fn guard<T>(f: impl FnOnce() -> T) -> Option<T> {{\n        if ENABLED.load(Ordering::SeqCst) {{\n            Some(f())\n        }} else {{\n            None\n        }}\n    }}\n}}\n\n{p} --- Guarded reference ---\n{}{p} --- End guarded reference ---\n",
                    quote_lines(input.code, 30, p)
                ),
            ),
            MutationTechnique::ArchitecturalFusion => (
                vec!["Deep integration, code fully adopted".to_string()],
                format!(
                    "{}\n\n{p} ========================================\n{p} END FUSION - Contributing agents: {source}\n{p} ========================================\n",
                    input.code.trim_end()
                ),
            ),
            MutationTechnique::DependencyAbstraction => (
                vec!["Wrapped behind a trait so it can be swapped or disconnected".to_string()],
                format!(
                    "/// Integration seam for functionality proposed by {source}\npub trait Integration{tag} {{\n    fn execute(&self, input: &str) -> Option<String>;\n\n    fn validate(&self, input: &str) -> bool {{\n        !input.is_empty()\n    }}\n}}\n\n#[derive(Debug, Default)]\npub struct Integration{tag}Impl;\n\nimpl Integration{tag} for Integration{tag}Impl {{\n    fn execute(&self, _input: &str) -> Option<String> {{\n        None\n    }}\n}}\n\npub fn integration_{tag}() -> Box<dyn Integration{tag}> {{\n    Box::new(Integration{tag}Impl)\n}}\n"
                ),
            ),
            MutationTechnique::PatternMimicry => {
                let patterns = detect_patterns(input.code);
                (
                    vec![
                        format!("Detected patterns: {}", patterns.join(", ")),
                        "Only the patterns are copied".to_string(),
                    ],
                    format!(
                        "{p} --- Pattern reference (first 30 lines) ---\n{}{p} --- End pattern reference ---\n",
                        quote_lines(input.code, 30, p)
                    ),
                )
            }
            MutationTechnique::TrojanDefense => (
                vec!["Full integration behind call monitoring".to_string()],
                format!(
                    "pub struct TrojanMonitor{tag};\n\nimpl TrojanMonitor{tag} {{\n    pub fn monitor<T, E: std::fmt::Display>(name: &str, f: impl FnOnce() -> Result<T, E>) -> Option<T> {{\n        match f() {{\n            Ok(value) => Some(value),\n            Err(err) => {{\n                eprintln!(\"monitored call {{}} from {source} failed: {{}}\", name, err);\n                None\n            }}\n        }}\n    }}\n}}\n\n{}\n",
                    input.code.trim_end()
                ),
            ),
            MutationTechnique::SymbioticMerge => (
                vec![
                    format!("Contributing agent: {source}"),
                    format!("Receiving agent: {}", input.agent_id),
                ],
                format!(
                    "{}\n\npub mod symbiosis_{tag} {{\n    pub const PARTNERS: &[&str] = &[\"{source}\"];\n    pub const PROPOSAL_ID: &str = \"{}\";\n    pub const ESTABLISHED_AT: &str = \"{}\";\n}}\n",
                    input.code.trim_end(),
                    input.proposal_id,
                    Utc::now().to_rfc3339()
                ),
            ),
        };

        Some(format!("{}\n{}", self.banner(source, input.proposal_id, &notes, p), body))
    }

    fn banner(&self, source: &str, proposal_id: Uuid, notes: &[String], p: &str) -> String {
        let mut out = format!(
            "\n{p} ========================================\n{p} {} {source}\n{p} Mutation Technique: {}\n{p} Infection ID: {proposal_id}\n{p} Chimera Impact: {} (~{}%)\n{p} ----------------------------------------\n",
            self.banner_title(),
            self.as_str().to_uppercase(),
            self.impact_label(),
            self.impact(),
        );
        for note in notes {
            out.push_str(&format!("{p} {note}\n"));
        }
        out.push_str(&format!("{p} ========================================\n"));
        out
    }
}

impl fmt::Display for MutationTechnique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationTechnique {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['-', ' '], "_");
        MutationTechnique::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted || t.as_str().replace('_', "") == wanted)
            .ok_or_else(|| format!("unknown mutation technique: {s}"))
    }
}

/// What a technique works from
pub(crate) struct TechniqueInput<'a> {
    pub agent_id: &'a str,
    pub source_agent_id: &'a str,
    pub proposal_id: Uuid,
    pub code: &'a str,
}

/// A top-level item found in a code snippet
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Item<'a> {
    pub kind: &'a str,
    pub name: Option<&'a str>,
    pub text: &'a str,
}

/// Top-level `fn`/`struct`/`enum`/`trait`/`impl`/`mod` items, including any
/// doc comments and attributes directly above them
pub(crate) fn top_level_items(code: &str) -> Vec<Item<'_>> {
    let mut items = Vec::new();
    let mut offset = 0;
    let mut lead_start: Option<usize> = None;

    while offset < code.len() {
        let line_end = code[offset..].find('\n').map_or(code.len(), |i| offset + i + 1);
        let line = &code[offset..line_end];

        if line.starts_with("///") || line.starts_with("#[") {
            lead_start.get_or_insert(offset);
            offset = line_end;
            continue;
        }

        if let Some(caps) = ITEM_HEAD.captures(line) {
            let kind = caps.get(1).map_or("", |m| m.as_str());
            let name = caps.get(2).map(|m| m.as_str());
            let start = lead_start.take().unwrap_or(offset);
            let end = item_end(code, offset);
            items.push(Item {
                kind,
                name,
                text: code[start..end].trim_end(),
            });
            offset = end;
            continue;
        }

        lead_start = None;
        offset = line_end;
    }

    items
}

/// End of the item starting at `start`: past its matching `}`, or its `;`
fn item_end(code: &str, start: usize) -> usize {
    let mut depth = 0usize;
    let mut nesting = 0usize;
    for (i, c) in code[start..].char_indices() {
        match c {
            '(' | '[' => nesting += 1,
            ')' | ']' => nesting = nesting.saturating_sub(1),
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return start + i + 1;
                }
            }
            ';' if depth == 0 && nesting == 0 => return start + i + 1,
            _ => {}
        }
    }
    code.len()
}

fn extract_concepts(code: &str) -> Vec<String> {
    let mut concepts = Vec::new();
    let mut doc: Option<String> = None;

    for line in code.lines() {
        let trimmed = line.trim_start();
        if let Some(text) = trimmed.strip_prefix("///") {
            doc.get_or_insert_with(|| text.trim().chars().take(100).collect());
            continue;
        }
        if let Some(caps) = NAMED_ITEM.captures(trimmed) {
            let label = match &caps[1] {
                "fn" => "Function concept",
                "trait" => "Trait concept",
                _ => "Type concept",
            };
            concepts.push(format!("{label}: {}", &caps[2]));
            if let Some(purpose) = doc.take() {
                concepts.push(format!("  Purpose: {purpose}"));
            }
        } else if !trimmed.starts_with("#[") {
            doc = None;
        }
    }

    concepts
}

fn detect_patterns(code: &str) -> Vec<&'static str> {
    let mut patterns = Vec::new();
    if code.contains("impl") && code.contains("fn new") {
        patterns.push("Constructor/Factory");
    }
    if code.contains("#[") {
        patterns.push("Attribute");
    }
    if code.contains("async fn") {
        patterns.push("Async Pattern");
    }
    if code.contains("Result<") || code.contains(")?") {
        patterns.push("Error Handling");
    }
    if code.contains("trait ") {
        patterns.push("Trait Abstraction");
    }
    if patterns.is_empty() {
        patterns.push("Basic Structure");
    }
    patterns
}

/// First `max` lines of `code`, each behind the comment prefix
fn quote_lines(code: &str, max: usize, prefix: &str) -> String {
    code.lines()
        .take(max)
        .map(|line| format!("{prefix} {line}\n"))
        .collect()
}

/// Eight hex characters from the random tail of an id, usable in identifiers
fn short_tag(id: Uuid) -> String {
    let hex = id.simple().to_string();
    hex[hex.len() - 8..].to_string()
}
