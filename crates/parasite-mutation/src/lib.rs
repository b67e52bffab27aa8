//! # Parasite Mutation
//!
//! Turns accepted proposals into artifact mutations and tracks where every
//! agent's code came from.
//!
//! ## Chimera Percentage
//!
//! ```text
//! chimera = min(100, 10 × mutation_count)
//! ```
//!
//! A linear placeholder: it counts mutations and ignores how much code each
//! one merged. Technique impacts are reported alongside but do not feed it.

pub mod engine;
pub mod genealogy;
pub mod record;
pub mod techniques;
pub mod validator;

pub use engine::{MergeStrategy, MutationEngine, CODEBASE_MERGE, FEATURE_ADDITION, PARTIAL_ADOPTION};
pub use genealogy::{ChimeraStats, Genealogy, LineageEntry};
pub use record::Mutation;
pub use techniques::MutationTechnique;
pub use validator::{AcceptAll, ArtifactValidator, DelimiterBalance, ValidationError};

/// Chimera percentage added per recorded mutation
pub const CHIMERA_STEP: f64 = 10.0;

/// Upper bound of the chimera percentage
pub const CHIMERA_CAP: f64 = 100.0;

/// Mutation engine configuration
#[derive(Debug, Clone)]
pub struct MutationConfig {
    /// Line comment marker of the artifact language
    pub comment_prefix: String,
    /// Characters of the proposal message kept in attribution headers
    pub header_message_chars: usize,
    /// Characters of the message kept in a no-code influence note
    pub note_message_chars: usize,
    /// Lines of foreign code quoted in reference-only techniques
    pub reference_lines: usize,
    /// Longest item (in characters) selective integration will take
    pub max_selected_item_chars: usize,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            comment_prefix: "//".to_string(),
            header_message_chars: 100,
            note_message_chars: 200,
            reference_lines: 50,
            max_selected_item_chars: 500,
        }
    }
}
