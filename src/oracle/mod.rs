//! External oracles consumed by the reasoning core.
//!
//! Three collaborators sit behind traits so the controller never knows
//! whether it is talking to a language model or a recorded script:
//!
//! - [`Translator`]: sentence → [`Translation`]
//! - [`RelationOracle`]: two type declarations → proposed linking rules
//! - [`ProofOracle`]: failed proof → [`RepairAction`]

pub mod llm;
pub mod ollama;
pub mod replay;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exemplar::Exemplar;

pub use llm::{LlmProofOracle, LlmRelationOracle, LlmTranslator};
pub use ollama::{OllamaClient, OllamaConfig};
pub use replay::{GiveUp, NoRelations, ReplayTranslator, ScriptedRepairs};

/// Errors from external oracles.
#[derive(Debug, Error, Diagnostic)]
pub enum OracleError {
    #[error("oracle service is not available at {url}")]
    #[diagnostic(
        code(pln::oracle::unavailable),
        help("Start Ollama with `ollama serve`, or run with recorded translations (`--translations`).")
    )]
    Unavailable { url: String },

    #[error("oracle request failed: {message}")]
    #[diagnostic(
        code(pln::oracle::request_failed),
        help("Check that the service is running and the model is pulled.")
    )]
    RequestFailed { message: String },

    #[error("failed to parse oracle response: {message}")]
    #[diagnostic(
        code(pln::oracle::parse_error),
        help("The oracle returned an unexpected response format.")
    )]
    ParseError { message: String },

    #[error("no recorded translation for sentence: {sentence}")]
    #[diagnostic(
        code(pln::oracle::no_recording),
        help("Add the sentence to the translations file, or translate it with a live model.")
    )]
    NoRecording { sentence: String },
}

pub type OracleResult<T> = std::result::Result<T, OracleError>;

// ---------------------------------------------------------------------------
// Translation
// ---------------------------------------------------------------------------

/// Logical content extracted from one sentence.
///
/// Every entry is statement text in `(: proof type)` form, except
/// `from_context` (names the sentence refers back to) and `questions`, which
/// may also be a bare type expression to be proven.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub from_context: Vec<String>,
    #[serde(default)]
    pub type_definitions: Vec<String>,
    #[serde(default)]
    pub statements: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
}

impl Prediction {
    pub fn is_empty(&self) -> bool {
        self.type_definitions.is_empty() && self.statements.is_empty() && self.questions.is_empty()
    }
}

/// Outcome of translating one sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// No logical content (greeting, exclamation); skipped entirely.
    Performative,
    Logic(Prediction),
}

/// Sentence → logic.
pub trait Translator {
    /// `previous` is the rolling window of earlier sentences, oldest first;
    /// `similar` are committed exemplars close to `sentence`.
    fn translate(
        &self,
        sentence: &str,
        previous: &[String],
        similar: &[Exemplar],
    ) -> OracleResult<Translation>;
}

// ---------------------------------------------------------------------------
// Type relations
// ---------------------------------------------------------------------------

/// Proposes implication/exclusion rules between two type declarations.
pub trait RelationOracle {
    /// Candidate linking statements (as text) between `new_type` and
    /// `similar_type`. An empty list means no relationship.
    fn propose_links(&self, new_type: &str, similar_type: &str) -> OracleResult<Vec<String>>;
}

// ---------------------------------------------------------------------------
// Proof repair
// ---------------------------------------------------------------------------

/// A sentence with the statements it was translated into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceLogic {
    pub sentence: String,
    pub statements: Vec<String>,
}

/// Everything the proof oracle sees about a failed proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofProblem {
    pub premises: Vec<SentenceLogic>,
    /// The conclusion sentence.
    pub conclusion: String,
    /// The goal statement that could not be proven.
    pub goal: String,
    /// Rules currently in the knowledge store.
    pub rules: Vec<String>,
}

/// What the proof oracle suggests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum RepairAction {
    /// Replace statements: remove these, add those.
    Fix {
        #[serde(default)]
        remove: Vec<String>,
        #[serde(default)]
        add: Vec<String>,
    },
    /// Prove an intermediate lemma, after adding supporting statements.
    Combine {
        lemma: String,
        #[serde(default)]
        add: Vec<String>,
    },
    Impossible,
}

/// Failed proof → repair suggestion.
pub trait ProofOracle {
    fn analyze(&self, problem: &ProofProblem) -> OracleResult<RepairAction>;
}
