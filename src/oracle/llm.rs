//! LLM-backed oracles over [`OllamaClient`].
//!
//! Each oracle builds a prompt, asks for a JSON object and deserializes it
//! into the oracle's response type. Models like to wrap JSON in prose or
//! code fences; [`extract_json`] digs the object out.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::exemplar::Exemplar;

use super::{
    OllamaClient, OracleError, OracleResult, Prediction, ProofOracle, ProofProblem,
    RelationOracle, RepairAction, Translation, Translator,
};

const TRANSLATE_SYSTEM: &str = "Translate the sentence into typed logical statements of the \
    form (: proof type). Declare new predicates as (: Name (-> Domain... Type)). Rules are \
    (: name (-> (: binder Premise) Conclusion)); negation is (Not X); variables start with $. \
    Reply with a JSON object with fields performative (bool), from_context, type_definitions, \
    statements and questions (arrays of strings).";

const RELATE_SYSTEM: &str = "Given two type declarations, propose rules linking them: \
    implication (-> (: $x (A ...)) (B ...)) or exclusion (-> (: $x (A ...)) (Not (B ...))). \
    Every variable in a conclusion must appear in a premise. Only negate relations with two or \
    more arguments. Reply with a JSON object {\"links\": [statement strings]}; use an empty \
    array when the types are unrelated.";

const REPAIR_SYSTEM: &str = "A proof failed. Given the premises, the goal and the rules, reply \
    with a JSON object with field action: \"fix\" (with remove and add arrays of statements), \
    \"combine\" (with lemma, a statement to prove first, and add) or \"impossible\".";

static RE_FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").unwrap());

/// Pull the first JSON object out of a model response.
pub fn extract_json(response: &str) -> Option<&str> {
    if let Some(inner) = RE_FENCED_JSON.captures(response).and_then(|c| c.get(1)) {
        return Some(inner.as_str());
    }
    let trimmed = response.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn parse_response<T: for<'de> Deserialize<'de>>(response: &str) -> OracleResult<T> {
    let json = extract_json(response).ok_or_else(|| OracleError::ParseError {
        message: "no JSON object found in response".into(),
    })?;
    serde_json::from_str(json).map_err(|e| OracleError::ParseError {
        message: format!("JSON parse error: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Translator
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TranslationReply {
    #[serde(default)]
    performative: bool,
    #[serde(flatten)]
    prediction: Prediction,
}

/// [`Translator`] backed by an LLM.
#[derive(Debug)]
pub struct LlmTranslator {
    client: OllamaClient,
}

impl LlmTranslator {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }

    fn prompt(sentence: &str, previous: &[String], similar: &[Exemplar]) -> String {
        let mut prompt = String::new();
        for exemplar in similar {
            let answer = serde_json::to_string(&exemplar.prediction).unwrap_or_default();
            prompt.push_str(&format!("Example: {}\nAnswer: {answer}\n\n", exemplar.sentence));
        }
        if !previous.is_empty() {
            prompt.push_str("Previous sentences:\n");
            for p in previous {
                prompt.push_str(&format!("- {p}\n"));
            }
            prompt.push('\n');
        }
        prompt.push_str(&format!("Sentence: {sentence}\nAnswer:"));
        prompt
    }
}

impl Translator for LlmTranslator {
    fn translate(
        &self,
        sentence: &str,
        previous: &[String],
        similar: &[Exemplar],
    ) -> OracleResult<Translation> {
        let prompt = Self::prompt(sentence, previous, similar);
        let response = self.client.generate(&prompt, Some(TRANSLATE_SYSTEM))?;
        let reply: TranslationReply = parse_response(&response)?;
        if reply.performative {
            return Ok(Translation::Performative);
        }
        Ok(Translation::Logic(reply.prediction))
    }
}

// ---------------------------------------------------------------------------
// Relation oracle
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LinksReply {
    #[serde(default)]
    links: Vec<String>,
}

/// [`RelationOracle`] backed by an LLM.
#[derive(Debug)]
pub struct LlmRelationOracle {
    client: OllamaClient,
}

impl LlmRelationOracle {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

impl RelationOracle for LlmRelationOracle {
    fn propose_links(&self, new_type: &str, similar_type: &str) -> OracleResult<Vec<String>> {
        let prompt = format!("Type A: {new_type}\nType B: {similar_type}\nLinks:");
        let response = self.client.generate(&prompt, Some(RELATE_SYSTEM))?;
        let reply: LinksReply = parse_response(&response)?;
        Ok(reply.links)
    }
}

// ---------------------------------------------------------------------------
// Proof oracle
// ---------------------------------------------------------------------------

/// [`ProofOracle`] backed by an LLM.
#[derive(Debug)]
pub struct LlmProofOracle {
    client: OllamaClient,
}

impl LlmProofOracle {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

impl ProofOracle for LlmProofOracle {
    fn analyze(&self, problem: &ProofProblem) -> OracleResult<RepairAction> {
        let prompt = serde_json::to_string_pretty(problem).map_err(|e| OracleError::RequestFailed {
            message: format!("JSON serialize error: {e}"),
        })?;
        let response = self.client.generate(&prompt, Some(REPAIR_SYSTEM))?;
        parse_response(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let response = "Sure!\n```json\n{\"links\": []}\n```\nHope that helps.";
        assert_eq!(extract_json(response), Some("{\"links\": []}"));
    }

    #[test]
    fn extracts_bare_json_inside_prose() {
        let response = "Here you go: {\"action\": \"impossible\"} done";
        assert_eq!(extract_json(response), Some("{\"action\": \"impossible\"}"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn translation_reply_handles_performative_flag() {
        let reply: TranslationReply = parse_response(r#"{"performative": true}"#).unwrap();
        assert!(reply.performative);

        let reply: TranslationReply =
            parse_response(r#"{"statements": ["(: a (P A))"], "questions": []}"#).unwrap();
        assert!(!reply.performative);
        assert_eq!(reply.prediction.statements, vec!["(: a (P A))".to_string()]);
    }

    #[test]
    fn prompt_lists_exemplars_and_previous_sentences() {
        let similar = vec![Exemplar {
            sentence: "It rains.".into(),
            prediction: Prediction {
                statements: vec!["(: r Raining)".into()],
                ..Prediction::default()
            },
        }];
        let prompt = LlmTranslator::prompt("It pours.", &["Hello.".to_string()], &similar);
        assert!(prompt.contains("Example: It rains."));
        assert!(prompt.contains("- Hello."));
        assert!(prompt.ends_with("Sentence: It pours.\nAnswer:"));
    }

    #[test]
    fn unparsable_reply_is_a_parse_error() {
        let err = parse_response::<LinksReply>("{not json}").unwrap_err();
        assert!(matches!(err, OracleError::ParseError { .. }));
    }
}
