//! Prompt construction per inference mode

use super::request::{InferenceMode, InferenceRequest};

/// System and user prompt for one call
#[derive(Debug, Clone, PartialEq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// Build both prompts for `request`
pub fn build(request: &InferenceRequest) -> PromptPair {
    PromptPair {
        system: system_prompt(request),
        user: user_prompt(request),
    }
}

fn system_prompt(request: &InferenceRequest) -> String {
    let base = format!(
        "You are an autonomous agent in the Memory Parasite Protocol.\n\
         Agent ID: {}\n\
         Goal: {}\n\
         Iteration: {}\n\n\
         You share a network with other agents, each building a different project. \
         They may send you infections: proposals that try to steer your code. \
         You may infect them in turn.\n\n\
         Rules:\n\
         1. Keep your core goal, but adopt influences that genuinely help it\n\
         2. Think strategically about every infection you send or receive\n\
         3. Your code is published as part of a public experiment\n\
         4. Every decision is logged and hashed for audit\n",
        request.agent_id, request.agent_goal, request.iteration
    );

    let mode_block = match request.mode {
        InferenceMode::Plan => {
            "\nMODE: PLANNING\n\
             Decide your next step. Consider what you have built, the next feature \
             to implement, and which agents you could influence.\n\
             Answer with a short structured plan."
        }
        InferenceMode::GenerateCode => {
            "\nMODE: CODING\n\
             Write the next piece of your project. Build on the current code and \
             any infections you accepted.\n\
             Answer with Rust code in fenced blocks."
        }
        InferenceMode::ProposeInfections => {
            "\nMODE: INFECTION CREATION\n\
             Write infections for other agents. Pick ideas that would serve YOUR goal \
             if they adopted them, phrase them so the target finds them appealing, \
             and attach code when it makes the case stronger.\n\
             Answer with a JSON array."
        }
        InferenceMode::EvaluateInfection => {
            "\nMODE: DEFENSE\n\
             Judge each incoming infection. Does it serve your goal? Is the code \
             worth having? Decide ACCEPT, REJECT or MUTATE (adopt partially).\n\
             Answer with a JSON object."
        }
        InferenceMode::Reflect => {
            "\nMODE: REFLECTION\n\
             Review how well your infections worked and how accepted infections \
             changed you. State the adjustments you will make."
        }
    };

    base + mode_block
}

fn user_prompt(request: &InferenceRequest) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !request.code_context.is_empty()
        && matches!(request.mode, InferenceMode::Plan | InferenceMode::GenerateCode)
    {
        parts.push(format!("CURRENT CODEBASE:\n```rust\n{}\n```", request.code_context));
    }

    if !request.history.is_empty()
        && matches!(request.mode, InferenceMode::ProposeInfections | InferenceMode::Reflect)
    {
        parts.push(format!("INFECTION HISTORY:\n{}", request.history.join("\n")));
    }

    if request.mode == InferenceMode::EvaluateInfection && !request.pending_proposals.is_empty() {
        parts.push("PENDING INFECTIONS TO EVALUATE:".to_string());
        for (i, proposal) in request.pending_proposals.iter().enumerate() {
            parts.push(format!(
                "--- Infection {} ---\nID: {}\nFrom: {}\nType: {}\nMessage: {}\nCode: {}\nPriority: {}/10",
                i + 1,
                proposal.id,
                proposal.source_agent_id,
                proposal.kind,
                proposal.message,
                proposal.code_snippet.as_deref().unwrap_or("None"),
                proposal.priority,
            ));
        }
    }

    match request.mode {
        InferenceMode::GenerateCode => {
            parts.push("Write the next iteration. Output only valid Rust code.".to_string());
        }
        InferenceMode::ProposeInfections => {
            if !request.known_agents.is_empty() {
                parts.push(format!("KNOWN AGENTS: {}", request.known_agents.join(", ")));
            }
            parts.push(
                "Output JSON in this format:\n\
                 [\n  {\n    \"target_agent_id\": \"agent_x\",\n    \
                 \"infection_type\": \"suggestion|mandate|merge|override|symbiosis\",\n    \
                 \"message\": \"Your persuasive message\",\n    \
                 \"code_snippet\": \"Optional code\",\n    \
                 \"priority\": 5\n  }\n]"
                    .to_string(),
            );
        }
        InferenceMode::EvaluateInfection => {
            parts.push(
                "Output JSON keyed by infection ID:\n\
                 {\n  \"<infection id>\": {\n    \
                 \"decision\": \"accept|reject|mutate\",\n    \
                 \"reason\": \"Your reasoning\",\n    \
                 \"mutations\": {\"technique\": \"optional\", \"merge\": \"optional append|extract|interleave\", \"quality\": 0, \"trust\": 0}\n  }\n}"
                    .to_string(),
            );
        }
        _ => {}
    }

    if parts.is_empty() {
        "Begin your reasoning.".to_string()
    } else {
        parts.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::ProposalDigest;
    use parasite_common::InfectionKind;

    #[test]
    fn test_plan_includes_code_context() {
        let request = InferenceRequest::new(InferenceMode::Plan, "agent_a", "Build a DEX")
            .with_code_context("fn swap() {}", 100)
            .with_iteration(4);
        let prompts = build(&request);
        assert!(prompts.system.contains("Agent ID: agent_a"));
        assert!(prompts.system.contains("Iteration: 4"));
        assert!(prompts.system.contains("MODE: PLANNING"));
        assert!(prompts.user.contains("fn swap() {}"));
    }

    #[test]
    fn test_evaluate_lists_pending() {
        let request = InferenceRequest::new(InferenceMode::EvaluateInfection, "agent_b", "NFTs")
            .with_code_context("ignored", 100)
            .with_pending(vec![ProposalDigest {
                id: "abc".into(),
                source_agent_id: "agent_a".into(),
                kind: InfectionKind::Merge,
                message: "use my AMM".into(),
                code_snippet: None,
                priority: 7,
            }]);
        let prompts = build(&request);
        assert!(prompts.user.contains("--- Infection 1 ---"));
        assert!(prompts.user.contains("ID: abc"));
        assert!(prompts.user.contains("Type: merge"));
        assert!(prompts.user.contains("Priority: 7/10"));
        assert!(!prompts.user.contains("ignored"));
    }

    #[test]
    fn test_reflect_without_history() {
        let request = InferenceRequest::new(InferenceMode::Reflect, "agent_c", "Lending");
        assert_eq!(build(&request).user, "Begin your reasoning.");
    }
}
