//! Offline oracles: recorded translations and fixed answers.
//!
//! These let a puzzle run reproducibly without a language model, and they
//! are what the integration tests drive the controller with.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::Path;

use serde::Deserialize;

use crate::exemplar::Exemplar;
use crate::index::TextEncoder;

use super::{
    OracleError, OracleResult, Prediction, ProofOracle, ProofProblem, RelationOracle,
    RepairAction, Translation, Translator,
};

/// Marker value recording a performative sentence.
const PERFORMATIVE: &str = "performative";

#[derive(Deserialize)]
#[serde(untagged)]
enum Recorded {
    Marker(String),
    Logic(Prediction),
}

/// [`Translator`] that replays recorded predictions.
///
/// The recording is a JSON object from sentence to either a prediction
/// object or the string `"performative"`. Sentences are matched after
/// case and whitespace normalization.
#[derive(Debug, Clone, Default)]
pub struct ReplayTranslator {
    recordings: HashMap<String, Translation>,
}

impl ReplayTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> OracleResult<Self> {
        let raw: HashMap<String, Recorded> =
            serde_json::from_str(json).map_err(|e| OracleError::ParseError {
                message: format!("translations file: {e}"),
            })?;
        let mut replay = Self::new();
        for (sentence, recorded) in raw {
            let translation = match recorded {
                Recorded::Logic(prediction) => Translation::Logic(prediction),
                Recorded::Marker(marker) if marker == PERFORMATIVE => Translation::Performative,
                Recorded::Marker(other) => {
                    return Err(OracleError::ParseError {
                        message: format!("unknown marker {other:?} for sentence {sentence:?}"),
                    });
                }
            };
            replay.record(&sentence, translation);
        }
        Ok(replay)
    }

    pub fn from_file(path: &Path) -> OracleResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| OracleError::RequestFailed {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_json(&json)
    }

    pub fn record(&mut self, sentence: &str, translation: Translation) {
        self.recordings
            .insert(TextEncoder::canonical(sentence), translation);
    }

    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }
}

impl Translator for ReplayTranslator {
    fn translate(
        &self,
        sentence: &str,
        _previous: &[String],
        _similar: &[Exemplar],
    ) -> OracleResult<Translation> {
        self.recordings
            .get(&TextEncoder::canonical(sentence))
            .cloned()
            .ok_or_else(|| OracleError::NoRecording {
                sentence: sentence.to_string(),
            })
    }
}

/// [`RelationOracle`] that never finds a relationship.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRelations;

impl RelationOracle for NoRelations {
    fn propose_links(&self, _new_type: &str, _similar_type: &str) -> OracleResult<Vec<String>> {
        Ok(Vec::new())
    }
}

/// [`ProofOracle`] that always answers `Impossible`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GiveUp;

impl ProofOracle for GiveUp {
    fn analyze(&self, _problem: &ProofProblem) -> OracleResult<RepairAction> {
        Ok(RepairAction::Impossible)
    }
}

/// [`ProofOracle`] answering from a queue; `Impossible` once it runs dry.
#[derive(Debug, Default)]
pub struct ScriptedRepairs {
    actions: RefCell<VecDeque<RepairAction>>,
    seen: RefCell<Vec<ProofProblem>>,
}

impl ScriptedRepairs {
    pub fn new(actions: impl IntoIterator<Item = RepairAction>) -> Self {
        Self {
            actions: RefCell::new(actions.into_iter().collect()),
            seen: RefCell::new(Vec::new()),
        }
    }

    /// Parse a JSON array of repair actions.
    pub fn from_json(json: &str) -> OracleResult<Self> {
        let actions: Vec<RepairAction> =
            serde_json::from_str(json).map_err(|e| OracleError::ParseError {
                message: format!("repairs file: {e}"),
            })?;
        Ok(Self::new(actions))
    }

    /// Problems submitted so far, oldest first.
    pub fn problems(&self) -> Vec<ProofProblem> {
        self.seen.borrow().clone()
    }
}

impl ProofOracle for ScriptedRepairs {
    fn analyze(&self, problem: &ProofProblem) -> OracleResult<RepairAction> {
        self.seen.borrow_mut().push(problem.clone());
        Ok(self
            .actions
            .borrow_mut()
            .pop_front()
            .unwrap_or(RepairAction::Impossible))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDING: &str = r#"{
        "John left his umbrella.": {"statements": ["(: left (Not (Carries John Umbrella)))"]},
        "Hello there!": "performative"
    }"#;

    #[test]
    fn replays_recorded_translations() {
        let replay = ReplayTranslator::from_json(RECORDING).unwrap();
        assert_eq!(replay.len(), 2);

        let t = replay.translate("john  left his umbrella.", &[], &[]).unwrap();
        let Translation::Logic(prediction) = t else {
            panic!("expected logic");
        };
        assert_eq!(prediction.statements.len(), 1);

        assert_eq!(
            replay.translate("Hello there!", &[], &[]).unwrap(),
            Translation::Performative
        );
    }

    #[test]
    fn unknown_sentence_is_an_error() {
        let replay = ReplayTranslator::from_json(RECORDING).unwrap();
        assert!(matches!(
            replay.translate("It rains.", &[], &[]),
            Err(OracleError::NoRecording { .. })
        ));
    }

    #[test]
    fn unknown_marker_is_rejected() {
        assert!(matches!(
            ReplayTranslator::from_json(r#"{"Hi": "greeting"}"#),
            Err(OracleError::ParseError { .. })
        ));
    }

    #[test]
    fn scripted_repairs_fall_back_to_impossible() {
        let oracle = ScriptedRepairs::from_json(
            r#"[{"action": "fix", "remove": [], "add": ["(: a (P A))"]}]"#,
        )
        .unwrap();
        let problem = ProofProblem {
            premises: Vec::new(),
            conclusion: "B holds.".into(),
            goal: "(: $p (P B))".into(),
            rules: Vec::new(),
        };
        assert!(matches!(oracle.analyze(&problem).unwrap(), RepairAction::Fix { .. }));
        assert_eq!(oracle.analyze(&problem).unwrap(), RepairAction::Impossible);
        assert_eq!(oracle.problems().len(), 2);
    }

    #[test]
    fn fixed_oracles() {
        assert!(NoRelations.propose_links("(: A Type)", "(: B Type)").unwrap().is_empty());
        let problem = ProofProblem {
            premises: Vec::new(),
            conclusion: String::new(),
            goal: String::new(),
            rules: Vec::new(),
        };
        assert_eq!(GiveUp.analyze(&problem).unwrap(), RepairAction::Impossible);
    }
}
