//! Mutation Engine
//!
//! Converts accepted or mutated proposals into new artifacts and keeps one
//! [`Genealogy`] per agent.
//!
//! ```text
//! proposal ──► integrate / technique ──► validate ──► Mutation ──► Genealogy
//!                                           │
//!                                           └─ broken ──► comment-only note
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use parasite_common::Infection;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::genealogy::{ChimeraStats, Genealogy};
use crate::record::Mutation;
use crate::techniques::{top_level_items, MutationTechnique, TechniqueInput};
use crate::validator::{ArtifactValidator, DelimiterBalance};
use crate::MutationConfig;

/// Mutation type of a fully accepted proposal
pub const FEATURE_ADDITION: &str = "feature_addition";

/// Mutation type of a proposal adopted with modifications
pub const PARTIAL_ADOPTION: &str = "partial_adoption";

/// Mutation type of a snippet folded in by a [`MergeStrategy`]
pub const CODEBASE_MERGE: &str = "codebase_merge";

/// Impact recorded for plain appends
const APPEND_IMPACT: f64 = 10.0;

/// How another agent's whole codebase is folded into a base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Attribution header, then the other code
    #[default]
    Append,
    /// Only the other code's top-level items
    Extract,
    /// Base and other code joined by a newline
    Interleave,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Append => "append",
            MergeStrategy::Extract => "extract",
            MergeStrategy::Interleave => "interleave",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "append" => Ok(MergeStrategy::Append),
            "extract" => Ok(MergeStrategy::Extract),
            "interleave" => Ok(MergeStrategy::Interleave),
            other => Err(format!("unknown merge strategy: {other}")),
        }
    }
}

pub struct MutationEngine {
    config: MutationConfig,
    validator: Box<dyn ArtifactValidator>,
    genealogies: HashMap<String, Genealogy>,
}

impl Default for MutationEngine {
    fn default() -> Self {
        Self::new(MutationConfig::default())
    }
}

impl fmt::Debug for MutationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationEngine")
            .field("config", &self.config)
            .field("agents", &self.genealogies.len())
            .finish()
    }
}

impl MutationEngine {
    /// Engine validating artifacts with [`DelimiterBalance`]
    pub fn new(config: MutationConfig) -> Self {
        Self {
            config,
            validator: Box::new(DelimiterBalance),
            genealogies: HashMap::new(),
        }
    }

    pub fn with_validator(mut self, validator: impl ArtifactValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn config(&self) -> &MutationConfig {
        &self.config
    }

    /// Append the proposal's snippet under an attribution header, or a note
    /// when it carries no code
    pub fn apply_mutation(&mut self, agent_id: &str, current: &str, infection: &Infection) -> Mutation {
        let message = infection.payload().message.clone();
        self.integrate(agent_id, current, infection, FEATURE_ADDITION, &message)
    }

    /// Adopt the proposal with the evaluator's modifications noted in the
    /// attribution
    pub fn apply_partial(
        &mut self,
        agent_id: &str,
        current: &str,
        infection: &Infection,
        modifications: &str,
    ) -> Mutation {
        let message = format!("{} [MUTATED: {}]", infection.payload().message, modifications);
        self.integrate(agent_id, current, infection, PARTIAL_ADOPTION, &message)
    }

    /// Apply a Mutate decision
    ///
    /// Hints naming a `technique` use it; hints naming a `merge` strategy fold
    /// the proposal's code in with [`MutationEngine::apply_merge`]; hints
    /// carrying `quality_score` or `trust_score` pick a technique by
    /// [`MutationTechnique::select`]; anything else is a partial adoption
    /// noting the hints.
    pub fn apply_hinted(
        &mut self,
        agent_id: &str,
        current: &str,
        infection: &Infection,
        hints: Option<&Value>,
    ) -> Mutation {
        let hints = hints.filter(|h| !h.is_null());

        if let Some(technique) = hints
            .and_then(|h| h.get("technique"))
            .and_then(Value::as_str)
            .and_then(|t| t.parse::<MutationTechnique>().ok())
        {
            return self.apply_technique(technique, agent_id, current, infection);
        }

        if let Some(strategy) = hints
            .and_then(|h| h.get("merge"))
            .and_then(Value::as_str)
            .and_then(|m| m.parse::<MergeStrategy>().ok())
        {
            if infection.payload().code_snippet.is_some() {
                return self.apply_merge(agent_id, current, infection, strategy);
            }
            debug!(agent_id = %agent_id, strategy = %strategy, "Merge hint without code, adopting partially");
        }

        let score = |keys: [&str; 2]| {
            hints.and_then(|h| keys.iter().find_map(|k| h.get(*k).and_then(Value::as_i64)))
        };
        let quality = score(["quality_score", "quality"]);
        let trust = score(["trust_score", "trust"]);
        if quality.is_some() || trust.is_some() {
            return self.advanced_mutation(agent_id, current, infection, quality.unwrap_or(50), trust.unwrap_or(50));
        }

        let modifications = match hints {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        self.apply_partial(agent_id, current, infection, &modifications)
    }

    /// Fold the proposal's code into `current` with `strategy`
    ///
    /// An extract that finds no top-level items leaves the artifact unchanged
    /// with zero impact. A merge that breaks the artifact degrades to a
    /// comment-only note.
    pub fn apply_merge(
        &mut self,
        agent_id: &str,
        current: &str,
        infection: &Infection,
        strategy: MergeStrategy,
    ) -> Mutation {
        let source = infection.source_agent_id();
        let other = infection.payload().code_snippet.as_deref().unwrap_or("");

        let mut mutated = self.merge_codebases(current, other, source, strategy);
        if let Err(err) = self.check(current, &mutated) {
            warn!(agent_id = %agent_id, strategy = %strategy, error = %err, "Merged artifact is invalid");
            let p = self.config.comment_prefix.as_str();
            mutated = format!("{current}\n{p} [FAILED MERGE FROM {source}]: {err}\n");
        }

        let impact = if mutated == current { 0.0 } else { APPEND_IMPACT };
        let mutation = Mutation::record(
            agent_id,
            infection.id(),
            source,
            current.to_string(),
            mutated,
            CODEBASE_MERGE,
            format!("[merge:{}] {}", strategy, infection.payload().message),
            impact,
        );

        info!(
            agent_id = %agent_id,
            source = %source,
            strategy = %strategy,
            mutation_hash = %mutation.content_hash(),
            "Merged proposal code"
        );
        self.store(agent_id, mutation)
    }

    /// Pick a technique from quality and trust, then apply it
    pub fn advanced_mutation(
        &mut self,
        agent_id: &str,
        current: &str,
        infection: &Infection,
        quality: i64,
        trust: i64,
    ) -> Mutation {
        let technique = MutationTechnique::select(quality, trust);
        info!(
            agent_id = %agent_id,
            source = %infection.source_agent_id(),
            technique = %technique,
            quality,
            trust,
            "Selected mutation technique"
        );
        self.apply_technique(technique, agent_id, current, infection)
    }

    /// Apply one technique, falling back to conceptual extraction when the
    /// result fails validation
    pub fn apply_technique(
        &mut self,
        technique: MutationTechnique,
        agent_id: &str,
        current: &str,
        infection: &Infection,
    ) -> Mutation {
        let input = TechniqueInput {
            agent_id,
            source_agent_id: infection.source_agent_id(),
            proposal_id: infection.id(),
            code: infection.payload().code_snippet.as_deref().unwrap_or(""),
        };

        let mut applied = technique;
        let mut mutated = match technique.render(&input, &self.config) {
            Some(block) => format!("{current}{block}"),
            None => current.to_string(),
        };

        if mutated != current {
            if let Err(err) = self.check(current, &mutated) {
                warn!(
                    agent_id = %agent_id,
                    technique = %technique,
                    error = %err,
                    "Technique produced an invalid artifact, falling back"
                );
                applied = MutationTechnique::ConceptualExtraction;
                mutated = match applied.render(&input, &self.config) {
                    Some(block) => format!("{current}{block}"),
                    None => current.to_string(),
                };
            }
        }

        let impact = if mutated == current { 0.0 } else { applied.impact() };
        let mutation = Mutation::record(
            agent_id,
            infection.id(),
            infection.source_agent_id(),
            current.to_string(),
            mutated,
            applied.as_str(),
            format!("[{}] {}", applied, infection.payload().message),
            impact,
        );

        info!(
            agent_id = %agent_id,
            technique = %applied,
            chimera_impact = impact,
            mutation_hash = %mutation.content_hash(),
            "Advanced mutation complete"
        );
        self.store(agent_id, mutation)
    }

    fn integrate(
        &mut self,
        agent_id: &str,
        current: &str,
        infection: &Infection,
        mutation_type: &str,
        message: &str,
    ) -> Mutation {
        let p = self.config.comment_prefix.as_str();
        let source = infection.source_agent_id();

        let mut mutated = match infection.payload().code_snippet.as_deref() {
            Some(code) => {
                let header = format!(
                    "{p} ========================================\n{p} INFECTION FROM: {source}\n{p} Infection ID: {}\n{p} Message: {}...\n{p} ========================================\n",
                    infection.id(),
                    one_line(message, self.config.header_message_chars),
                );
                format!("{current}\n\n{header}{code}")
            }
            None => format!(
                "{current}\n{p} [INFLUENCED BY {source}]: {}\n",
                one_line(message, self.config.note_message_chars)
            ),
        };

        if let Err(err) = self.check(current, &mutated) {
            warn!(agent_id = %agent_id, error = %err, "Mutated artifact is invalid");
            mutated = format!("{current}\n{p} [FAILED MUTATION FROM {source}]: {err}\n");
        }

        let mutation = Mutation::record(
            agent_id,
            infection.id(),
            source,
            current.to_string(),
            mutated,
            mutation_type,
            message,
            APPEND_IMPACT,
        );

        info!(
            agent_id = %agent_id,
            infection_id = %infection.id(),
            source = %source,
            mutation_hash = %mutation.content_hash(),
            "Applied mutation"
        );
        self.store(agent_id, mutation)
    }

    /// Only blame the mutation for breakage it introduced
    fn check(&self, current: &str, mutated: &str) -> Result<(), crate::ValidationError> {
        match self.validator.validate(mutated) {
            Ok(()) => Ok(()),
            Err(err) if self.validator.validate(current).is_ok() => Err(err),
            Err(err) => {
                debug!(error = %err, "Artifact was already invalid before mutation");
                Ok(())
            }
        }
    }

    fn store(&mut self, agent_id: &str, mutation: Mutation) -> Mutation {
        self.genealogies
            .entry(agent_id.to_string())
            .or_insert_with(|| Genealogy::new(agent_id))
            .append(mutation.clone());
        mutation
    }

    pub fn genealogy(&self, agent_id: &str) -> Option<&Genealogy> {
        self.genealogies.get(agent_id)
    }

    /// `min(100, 10 × mutations)`; 0 for agents never mutated
    pub fn chimera_percentage(&self, agent_id: &str) -> f64 {
        self.genealogies
            .get(agent_id)
            .map_or(0.0, Genealogy::chimera_percentage)
    }

    pub fn stats(&self, agent_id: &str) -> ChimeraStats {
        self.genealogies
            .get(agent_id)
            .map_or_else(|| ChimeraStats::empty(agent_id), Genealogy::stats)
    }

    /// Fold another agent's codebase into `base`
    pub fn merge_codebases(&self, base: &str, other: &str, other_agent_id: &str, strategy: MergeStrategy) -> String {
        let p = self.config.comment_prefix.as_str();
        match strategy {
            MergeStrategy::Append => format!(
                "{base}\n\n{p} ========================================\n{p} SYMBIOTIC MERGE FROM: {other_agent_id}\n{p} Merge Strategy: {strategy}\n{p} ========================================\n{other}"
            ),
            MergeStrategy::Extract => {
                let items = top_level_items(other);
                if items.is_empty() {
                    return base.to_string();
                }
                debug!(
                    source = %other_agent_id,
                    items = ?items.iter().filter_map(|i| i.name).collect::<Vec<_>>(),
                    "Extracting items"
                );
                let texts: Vec<&str> = items.iter().map(|i| i.text).collect();
                format!("{base}\n\n{p} Extracted from {other_agent_id}\n{}", texts.join("\n\n"))
            }
            MergeStrategy::Interleave => format!("{base}\n{other}"),
        }
    }
}

/// First `max` characters of `text` on a single line
fn one_line(text: &str, max: usize) -> String {
    text.chars()
        .take(max)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::AcceptAll;
    use parasite_common::{InfectionKind, InfectionPayload};
    use serde_json::json;

    const BASE: &str = "fn main() {\n    println!(\"dex\");\n}\n";

    fn proposal(code: Option<&str>) -> Infection {
        let mut payload = InfectionPayload::new("Add slippage protection to every swap");
        if let Some(code) = code {
            payload = payload.with_code(code);
        }
        Infection::create("agent_b", "agent_a", InfectionKind::Suggestion, payload)
    }

    #[test]
    fn test_snippet_appended_under_attribution() {
        let mut engine = MutationEngine::default();
        let infection = proposal(Some("fn guard() -> bool { true }"));
        let mutation = engine.apply_mutation("agent_a", BASE, &infection);

        assert!(mutation.mutated().starts_with(BASE));
        assert!(mutation.mutated().contains("// INFECTION FROM: agent_b"));
        assert!(mutation.mutated().contains(&format!("// Infection ID: {}", infection.id())));
        assert!(mutation.mutated().ends_with("fn guard() -> bool { true }"));
        assert_eq!(mutation.mutation_type(), FEATURE_ADDITION);
        assert_eq!(mutation.proposal_id(), infection.id());
    }

    #[test]
    fn test_no_snippet_leaves_note() {
        let mut engine = MutationEngine::default();
        let mutation = engine.apply_mutation("agent_a", BASE, &proposal(None));
        assert_eq!(
            mutation.mutated(),
            format!("{BASE}\n// [INFLUENCED BY agent_b]: Add slippage protection to every swap\n")
        );
    }

    #[test]
    fn test_broken_snippet_degrades_to_comment() {
        let mut engine = MutationEngine::default();
        let mutation = engine.apply_mutation("agent_a", BASE, &proposal(Some("fn broken() {")));
        assert!(mutation.mutated().starts_with(BASE));
        assert!(mutation.mutated().contains("// [FAILED MUTATION FROM agent_b]: unclosed '{'"));
        assert!(!mutation.mutated().contains("fn broken"));

        let mut permissive = MutationEngine::default().with_validator(AcceptAll);
        let mutation = permissive.apply_mutation("agent_a", BASE, &proposal(Some("fn broken() {")));
        assert!(mutation.mutated().ends_with("fn broken() {"));
    }

    #[test]
    fn test_partial_adoption_notes_modifications() {
        let mut engine = MutationEngine::default();
        let infection = proposal(Some("fn guard() {}"));
        let mutation = engine.apply_hinted("agent_a", BASE, &infection, Some(&json!("cap slippage at 1%")));
        assert_eq!(mutation.mutation_type(), PARTIAL_ADOPTION);
        assert!(mutation.description().ends_with("[MUTATED: cap slippage at 1%]"));
    }

    #[test]
    fn test_hints_choose_technique() {
        let mut engine = MutationEngine::default();
        let infection = proposal(Some("fn guard() {}"));

        let named = engine.apply_hinted("agent_a", BASE, &infection, Some(&json!({"technique": "trojan_defense"})));
        assert_eq!(named.mutation_type(), "trojan_defense");
        assert_eq!(named.impact(), 30.0);

        let scored = engine.apply_hinted("agent_a", BASE, &infection, Some(&json!({"quality_score": 95, "trust_score": 90})));
        assert_eq!(scored.mutation_type(), "architectural_fusion");
        assert!(scored.description().starts_with("[architectural_fusion]"));
    }

    #[test]
    fn test_invalid_technique_falls_back_to_conceptual() {
        let mut engine = MutationEngine::default();
        let mutation = engine.apply_technique(
            MutationTechnique::ArchitecturalFusion,
            "agent_a",
            BASE,
            &proposal(Some("fn half_done() {\n    let x = (1 + 2;\n")),
        );
        assert_eq!(mutation.mutation_type(), "conceptual_extraction");
        assert_eq!(mutation.impact(), 5.0);
        assert!(mutation.mutated().contains("// Function concept: half_done"));
    }

    #[test]
    fn test_selective_without_items_is_unchanged() {
        let mut engine = MutationEngine::default();
        let mutation = engine.apply_technique(
            MutationTechnique::SelectiveIntegration,
            "agent_a",
            BASE,
            &proposal(Some("let x = 1;")),
        );
        assert!(!mutation.changed());
        assert_eq!(mutation.impact(), 0.0);
    }

    #[test]
    fn test_chimera_percentage_steps_and_caps() {
        let mut engine = MutationEngine::default();
        assert_eq!(engine.chimera_percentage("agent_a"), 0.0);

        let infection = proposal(None);
        let mut code = BASE.to_string();
        for _ in 0..5 {
            code = engine.apply_mutation("agent_a", &code, &infection).mutated().to_string();
        }
        assert_eq!(engine.chimera_percentage("agent_a"), 50.0);

        for _ in 0..6 {
            code = engine.apply_mutation("agent_a", &code, &infection).mutated().to_string();
        }
        assert_eq!(engine.chimera_percentage("agent_a"), 100.0);

        let stats = engine.stats("agent_a");
        assert_eq!(stats.mutation_count, 11);
        assert_eq!(stats.contributors, vec!["agent_b".to_string()]);
        assert_eq!(engine.stats("agent_z"), ChimeraStats::empty("agent_z"));
    }

    #[test]
    fn test_genealogies_are_per_agent() {
        let mut engine = MutationEngine::default();
        engine.apply_mutation("agent_a", BASE, &proposal(None));
        assert!(engine.genealogy("agent_a").is_some());
        assert!(engine.genealogy("agent_c").is_none());
        assert_eq!(engine.chimera_percentage("agent_c"), 0.0);
    }

    #[test]
    fn test_merge_strategies() {
        let engine = MutationEngine::default();
        let other = "use std::fmt;\n\npub fn lend() -> u64 {\n    7\n}\n";

        let appended = engine.merge_codebases(BASE, other, "agent_c", MergeStrategy::Append);
        assert!(appended.contains("// SYMBIOTIC MERGE FROM: agent_c"));
        assert!(appended.contains("// Merge Strategy: append"));
        assert!(appended.ends_with(other));

        let extracted = engine.merge_codebases(BASE, other, "agent_c", MergeStrategy::Extract);
        assert!(extracted.contains("// Extracted from agent_c\npub fn lend() -> u64 {"));
        assert!(!extracted.contains("use std::fmt"));
        assert_eq!(engine.merge_codebases(BASE, "let x = 1;", "agent_c", MergeStrategy::Extract), BASE);

        assert_eq!(
            engine.merge_codebases(BASE, other, "agent_c", MergeStrategy::Interleave),
            format!("{BASE}\n{other}")
        );
        assert_eq!("EXTRACT".parse::<MergeStrategy>(), Ok(MergeStrategy::Extract));
    }

    #[test]
    fn test_merge_hint_folds_in_proposal_code() {
        let mut engine = MutationEngine::default();
        let infection = proposal(Some("use std::fmt;\n\npub fn lend() -> u64 {\n    7\n}\n"));

        let merged = engine.apply_hinted("agent_a", BASE, &infection, Some(&json!({"merge": "extract"})));
        assert_eq!(merged.mutation_type(), CODEBASE_MERGE);
        assert!(merged.description().starts_with("[merge:extract]"));
        assert!(merged.mutated().contains("// Extracted from agent_b\npub fn lend() -> u64 {"));
        assert!(!merged.mutated().contains("use std::fmt"));
        assert_eq!(merged.impact(), 10.0);
        assert_eq!(engine.chimera_percentage("agent_a"), 10.0);

        let nothing = engine.apply_merge("agent_a", BASE, &proposal(Some("let x = 1;")), MergeStrategy::Extract);
        assert_eq!(nothing.mutated(), BASE);
        assert_eq!(nothing.impact(), 0.0);
    }

    #[test]
    fn test_merge_hint_without_code_is_partial() {
        let mut engine = MutationEngine::default();
        let mutation = engine.apply_hinted("agent_a", BASE, &proposal(None), Some(&json!({"merge": "append"})));
        assert_eq!(mutation.mutation_type(), PARTIAL_ADOPTION);
    }

    #[test]
    fn test_broken_merge_degrades_to_note() {
        let mut engine = MutationEngine::default();
        let mutation = engine.apply_merge("agent_a", BASE, &proposal(Some("fn broken() {")), MergeStrategy::Interleave);
        assert!(mutation.mutated().starts_with(BASE));
        assert!(mutation.mutated().contains("// [FAILED MERGE FROM agent_b]: unclosed '{'"));
        assert!(!mutation.mutated().contains("fn broken"));
    }
}
