//! Chaining engine adapter.
//!
//! [`ChainAdapter`] owns the [`KnowledgeStore`] together with a
//! [`ChainingRuntime`] and keeps the two in step: every statement admitted to
//! the store enters the runtime's working set, and every statement the runtime
//! derives is admitted back through the store's conflict check. Depth limits,
//! schema spaces and engine term syntax stay behind the runtime trait.

pub mod local;
pub mod normalize;

use std::fmt;

use crate::atom::Atom;
use crate::error::{ChainError, PlnResult};
use crate::store::{Admission, Conflict, KnowledgeStore};
use crate::statement::TypedStatement;

pub use local::{ChainConfig, LocalRuntime};

/// Result type for runtime operations.
pub type ChainResult<T> = std::result::Result<T, ChainError>;

// ---------------------------------------------------------------------------
// Runtime contract
// ---------------------------------------------------------------------------

/// Inference schema that produced a derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schema {
    /// A rule applied to proofs of all its premises.
    ModusPonens,
    /// `P → Q` and `¬Q` give `¬P`.
    ModusTollens,
    /// `¬¬P` gives `P`.
    DoubleNegElim,
}

impl Schema {
    pub fn as_str(&self) -> &'static str {
        match self {
            Schema::ModusPonens => "modus-ponens",
            Schema::ModusTollens => "modus-tollens",
            Schema::DoubleNegElim => "double-neg-elim",
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A statement derived by forward chaining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivation {
    pub statement: TypedStatement,
    pub schema: Schema,
    /// Witnesses of the statements the derivation used.
    pub antecedents: Vec<Atom>,
    /// Fixpoint round the derivation was produced in (1-based).
    pub iteration: usize,
}

/// Result of one forward-chaining run.
#[derive(Debug, Clone, Default)]
pub struct ForwardRun {
    /// New statements in derivation order.
    pub derived: Vec<Derivation>,
    pub iterations: usize,
    pub reached_fixpoint: bool,
}

/// One step of a backward search trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofStep {
    pub depth: usize,
    /// The (sub)goal type being proven.
    pub goal: Atom,
    /// Witness of the statement that closed or expanded the goal.
    pub via: Atom,
}

impl fmt::Display for ProofStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:indent$}{} <= {}", "", self.goal, self.via, indent = self.depth * 2)
    }
}

/// Result of a backward proof attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofSearch {
    pub goal: TypedStatement,
    pub steps: Vec<ProofStep>,
    /// Instances of the goal with a concrete proof term.
    pub proofs: Vec<TypedStatement>,
    pub proven: bool,
}

impl ProofSearch {
    pub fn unproven(goal: TypedStatement) -> Self {
        Self {
            goal,
            steps: Vec::new(),
            proofs: Vec::new(),
            proven: false,
        }
    }
}

/// The narrow contract of a reasoning runtime.
///
/// Runtimes never see conflicts: the adapter admits statements to the store
/// first and only forwards those the store accepted.
pub trait ChainingRuntime {
    /// Short identifier used in log events.
    fn name(&self) -> &str;

    /// Add a statement to the asserted knowledge space.
    fn add_atom(&mut self, statement: &TypedStatement) -> ChainResult<()>;

    /// Remove an exact statement. Returns whether it was present.
    fn remove_atom(&mut self, statement: &TypedStatement) -> ChainResult<bool>;

    /// Derive consequences of the working set to a fixpoint or the runtime's
    /// caps. Derived statements are returned, not added.
    fn forward_chain(&self) -> ChainResult<ForwardRun>;

    /// Search for proofs of `goal`. The goal's proof term may be a variable.
    fn backward_chain(&self, goal: &TypedStatement) -> ChainResult<ProofSearch>;

    /// Statements currently asserted.
    fn working_set(&self) -> Vec<TypedStatement>;
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// What [`ChainAdapter::add_and_forward_chain`] did.
#[derive(Debug, Clone)]
pub struct ForwardOutcome {
    /// Admission result of the seed statement.
    pub admission: Admission,
    /// Derived statements that were admitted.
    pub derived: Vec<Derivation>,
    /// Derived statements the store refused.
    pub conflicts: Vec<Conflict>,
}

impl ForwardOutcome {
    pub fn derived_statements(&self) -> impl Iterator<Item = &TypedStatement> {
        self.derived.iter().map(|d| &d.statement)
    }
}

/// Knowledge store plus reasoning runtime, kept in sync.
pub struct ChainAdapter {
    store: KnowledgeStore,
    runtime: Box<dyn ChainingRuntime>,
    /// Loaded statements the runtime would not take.
    refused: Vec<TypedStatement>,
}

impl fmt::Debug for ChainAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainAdapter")
            .field("store", &self.store)
            .field("runtime", &self.runtime.name())
            .field("refused", &self.refused.len())
            .finish()
    }
}

impl ChainAdapter {
    /// Wrap `store`, seeding the runtime with everything already admitted.
    ///
    /// A statement the runtime refuses is dropped from the store and listed
    /// in [`Self::refused`]; the rest of the store is still usable.
    pub fn new(mut store: KnowledgeStore, mut runtime: Box<dyn ChainingRuntime>) -> ChainResult<Self> {
        let mut refused = Vec::new();
        for statement in store.iter() {
            if let Err(error) = runtime.add_atom(statement) {
                tracing::warn!(statement = %statement, %error, "runtime refused stored statement; skipped");
                refused.push(statement.clone());
            }
        }
        for statement in &refused {
            store.remove(statement);
        }
        tracing::debug!(
            runtime = runtime.name(),
            statements = store.len(),
            refused = refused.len(),
            "chaining runtime seeded"
        );
        Ok(Self {
            store,
            runtime,
            refused,
        })
    }

    /// Adapter over the in-process [`LocalRuntime`].
    pub fn local(store: KnowledgeStore, config: ChainConfig) -> ChainResult<Self> {
        Self::new(store, Box::new(LocalRuntime::new(config)))
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    /// Statements dropped while seeding the runtime.
    pub fn refused(&self) -> &[TypedStatement] {
        &self.refused
    }

    pub fn working_set(&self) -> Vec<TypedStatement> {
        self.runtime.working_set()
    }

    /// Conflict-checked admission without chaining.
    ///
    /// The statement reaches the backing file only once both the store and
    /// the runtime have taken it.
    pub fn admit(&mut self, statement: TypedStatement) -> PlnResult<Admission> {
        let admission = self.store.admit_unlogged(statement.clone())?;
        if admission == Admission::Inserted {
            if let Err(e) = self.runtime.add_atom(&statement) {
                self.store.remove(&statement);
                return Err(e.into());
            }
            if let Err(e) = self.store.log_statement(&statement) {
                self.store.remove(&statement);
                self.runtime.remove_atom(&statement)?;
                return Err(e.into());
            }
        }
        Ok(admission)
    }

    /// Admit `statement` and exhaustively derive its consequences.
    ///
    /// A conflicting seed is not chained. Derived statements go through the
    /// same admission check; a refused derivation also blocks every later
    /// derivation whose proof was built from it.
    pub fn add_and_forward_chain(&mut self, statement: TypedStatement) -> PlnResult<ForwardOutcome> {
        let admission = self.admit(statement.clone())?;
        let mut outcome = ForwardOutcome {
            admission,
            derived: Vec::new(),
            conflicts: Vec::new(),
        };
        if !outcome.admission.is_ok() {
            return Ok(outcome);
        }

        let run = self.runtime.forward_chain()?;
        let mut refused: Vec<Atom> = Vec::new();
        for derivation in run.derived {
            let proof = derivation.statement.proof();
            if refused.iter().any(|r| proof.contains(r)) {
                continue;
            }
            match self.admit(derivation.statement.clone())? {
                Admission::Inserted => outcome.derived.push(derivation),
                Admission::AlreadyPresent => {}
                Admission::Conflict(conflict) => {
                    tracing::warn!(%conflict, "derived statement conflicts with the store");
                    refused.push(proof.clone());
                    outcome.conflicts.push(conflict);
                }
            }
        }

        tracing::debug!(
            seed = %statement,
            derived = outcome.derived.len(),
            iterations = run.iterations,
            fixpoint = run.reached_fixpoint,
            "forward chaining complete"
        );
        Ok(outcome)
    }

    /// Attempt to prove `goal` from the current working set.
    pub fn backward_chain(&self, goal: &TypedStatement) -> PlnResult<ProofSearch> {
        let search = self.runtime.backward_chain(goal)?;
        tracing::debug!(
            goal = %goal,
            proven = search.proven,
            proofs = search.proofs.len(),
            steps = search.steps.len(),
            "backward chaining complete"
        );
        Ok(search)
    }

    /// Remove an exact statement from store and runtime.
    pub fn remove(&mut self, statement: &TypedStatement) -> PlnResult<bool> {
        let removed = self.store.remove(statement);
        if removed {
            self.runtime.remove_atom(statement)?;
        }
        Ok(removed)
    }

    /// Remove `statement` and every statement whose proof term was built from
    /// its witness. Returns all removed statements, the original first.
    pub fn retract(&mut self, statement: &TypedStatement) -> PlnResult<Vec<TypedStatement>> {
        if !self.remove(statement)? {
            return Ok(Vec::new());
        }
        let witness = statement.proof();
        let dependents: Vec<TypedStatement> = self
            .store
            .iter()
            .filter(|s| s.proof() != witness && s.proof().contains(witness))
            .cloned()
            .collect();
        let mut removed = vec![statement.clone()];
        for dependent in dependents {
            if self.remove(&dependent)? {
                removed.push(dependent);
            }
        }
        if removed.len() > 1 {
            tracing::info!(
                witness = %witness,
                cascade = removed.len() - 1,
                "retraction removed dependent statements"
            );
        }
        Ok(removed)
    }

    /// Rewrite the store's backing file.
    pub fn persist(&self) -> PlnResult<()> {
        Ok(self.store.persist()?)
    }

    /// Persist when the store has a writable file. Returns whether it wrote.
    pub fn flush(&self) -> PlnResult<bool> {
        if !self.store.is_writable() {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }
}
