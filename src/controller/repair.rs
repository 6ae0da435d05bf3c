//! Bounded proof repair.
//!
//! When a goal is not provable, the proof oracle sees the unit's premises
//! (English and logic), the failed goal and the store's rules, and answers
//! with a [`RepairAction`]. Fixes and supporting statements are applied to
//! the knowledge store before the goal is retried. A `Combine` names a lemma;
//! once the lemma is proven it is folded into the store and the goal is tried
//! again one level deeper.
//!
//! Two caps keep the loop finite: `max_attempts` oracle calls in total and
//! `max_depth` folded lemmas. Running out of either is a definitive failure,
//! as is `Impossible`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chain::{ChainAdapter, ProofSearch};
use crate::error::PlnResult;
use crate::oracle::{ProofOracle, ProofProblem, RepairAction, SentenceLogic};
use crate::statement::TypedStatement;
use crate::store::Admission;

use super::parse_goal;

/// `[repair]` settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Oracle calls per goal (default: 3).
    pub max_attempts: usize,
    /// Lemmas folded per goal (default: 3).
    pub max_depth: usize,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_depth: 3,
        }
    }
}

/// Why repair gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairFailure {
    /// The oracle answered `Impossible`.
    Impossible,
    AttemptsExhausted,
    DepthExhausted,
}

impl fmt::Display for RepairFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairFailure::Impossible => f.write_str("oracle judged the goal impossible"),
            RepairFailure::AttemptsExhausted => f.write_str("repair attempts exhausted"),
            RepairFailure::DepthExhausted => f.write_str("lemma depth exhausted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    Proven(ProofSearch),
    Failed {
        attempts: usize,
        reason: RepairFailure,
    },
}

/// What the unit looked like when its goal failed.
#[derive(Debug, Clone, Copy)]
pub struct RepairContext<'a> {
    pub premises: &'a [SentenceLogic],
    pub conclusion: &'a str,
}

/// One repair run for one goal.
pub struct ProofRepair<'a> {
    config: &'a RepairConfig,
    oracle: &'a dyn ProofOracle,
}

impl<'a> ProofRepair<'a> {
    pub fn new(config: &'a RepairConfig, oracle: &'a dyn ProofOracle) -> Self {
        Self { config, oracle }
    }

    /// Try to make `goal` provable by applying oracle suggestions to the store.
    pub fn run(
        &self,
        adapter: &mut ChainAdapter,
        context: RepairContext<'_>,
        goal: &TypedStatement,
    ) -> PlnResult<RepairOutcome> {
        let mut attempts = 0;
        let mut depth = 0;

        while attempts < self.config.max_attempts {
            let problem = ProofProblem {
                premises: context.premises.to_vec(),
                conclusion: context.conclusion.to_string(),
                goal: goal.to_string(),
                rules: adapter.store().rules().map(|r| r.to_string()).collect(),
            };
            attempts += 1;
            let action = self.oracle.analyze(&problem)?;
            tracing::info!(
                goal = %goal,
                attempt = attempts,
                depth,
                action = action_name(&action),
                "repair attempt"
            );

            match action {
                RepairAction::Impossible => {
                    return Ok(RepairOutcome::Failed {
                        attempts,
                        reason: RepairFailure::Impossible,
                    });
                }
                RepairAction::Fix { remove, add } => {
                    remove_all(adapter, &remove)?;
                    add_all(adapter, &add)?;
                }
                RepairAction::Combine { lemma, add } => {
                    add_all(adapter, &add)?;
                    let lemma = match parse_goal(&lemma) {
                        Ok(lemma) => lemma,
                        Err(e) => {
                            tracing::warn!(lemma = %lemma, error = %e, "unparsable lemma ignored");
                            continue;
                        }
                    };
                    if !lemma.alpha_eq(goal) {
                        let search = adapter.backward_chain(&lemma)?;
                        if !search.proven {
                            tracing::debug!(lemma = %lemma, "lemma not provable yet");
                            continue;
                        }
                        if depth == self.config.max_depth {
                            return Ok(RepairOutcome::Failed {
                                attempts,
                                reason: RepairFailure::DepthExhausted,
                            });
                        }
                        depth += 1;
                        for proof in search.proofs {
                            let outcome = adapter.add_and_forward_chain(proof)?;
                            if let Admission::Conflict(conflict) = &outcome.admission {
                                tracing::warn!(%conflict, "lemma proof conflicts with the store; not folded");
                            }
                        }
                    }
                }
            }

            let search = adapter.backward_chain(goal)?;
            if search.proven {
                return Ok(RepairOutcome::Proven(search));
            }
        }

        Ok(RepairOutcome::Failed {
            attempts,
            reason: RepairFailure::AttemptsExhausted,
        })
    }
}

fn action_name(action: &RepairAction) -> &'static str {
    match action {
        RepairAction::Fix { .. } => "fix",
        RepairAction::Combine { .. } => "combine",
        RepairAction::Impossible => "impossible",
    }
}

fn remove_all(adapter: &mut ChainAdapter, texts: &[String]) -> PlnResult<()> {
    for text in texts {
        match TypedStatement::parse(text) {
            Ok(statement) => {
                if !adapter.remove(&statement)? {
                    tracing::debug!(statement = %statement, "repair removal: not in store");
                }
            }
            Err(e) => tracing::warn!(statement = %text, error = %e, "unparsable removal ignored"),
        }
    }
    Ok(())
}

fn add_all(adapter: &mut ChainAdapter, texts: &[String]) -> PlnResult<()> {
    for text in texts {
        let statement = match TypedStatement::parse(text) {
            Ok(statement) => statement,
            Err(e) => {
                tracing::warn!(statement = %text, error = %e, "unparsable addition ignored");
                continue;
            }
        };
        let outcome = adapter.add_and_forward_chain(statement)?;
        if let Admission::Conflict(conflict) = &outcome.admission {
            tracing::warn!(%conflict, "repair addition conflicts with the store; dropped");
        }
    }
    Ok(())
}
