//! Staged transaction controller.
//!
//! A *reasoning unit* is a run of premise sentences closed by a conclusion.
//! The controller drives each unit through
//!
//! ```text
//! Idle ──premise──▶ Accumulating ──conclusion──▶ Proving ──▶ Committed
//!                        │                          │
//!                        └──────────────────────────┴──────▶ RolledBack
//! ```
//!
//! While accumulating, each sentence is translated with the rolling
//! [`SentenceWindow`] and similar committed exemplars. Type definitions are
//! admitted at once and handed to the [`TypeResolver`](crate::resolver::TypeResolver),
//! whose links are admitted too; ordinary statements wait in the
//! [`PendingBatch`]. At the conclusion the batch is forward-chained into the
//! store and every goal is backward-chained, with [`repair`] as the fallback.
//!
//! Only a committed unit reaches exemplar storage. The knowledge store is
//! eager: what a rolled-back unit admitted stays admitted.

pub mod repair;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::atom::{Atom, parse_atom};
use crate::chain::{ChainAdapter, ProofSearch};
use crate::confirm::{Confirmer, Review, Unattended};
use crate::error::{ParseError, PlnError, PlnResult};
use crate::exemplar::Exemplar;
use crate::oracle::{GiveUp, Prediction, ProofOracle, SentenceLogic, Translation, Translator};
use crate::session::Session;
use crate::statement::TypedStatement;
use crate::store::{Admission, Conflict};
use crate::window::{DEFAULT_CAPACITY, SentenceWindow};

use repair::{ProofRepair, RepairConfig, RepairContext, RepairOutcome};

/// Proof variable of goals built from bare types or plain statements.
pub const GOAL_PROOF: &str = "proof";

/// `[controller]` settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Sentences kept as translation context (default: 10).
    pub window_capacity: usize,
    /// Committed exemplars passed to each translation (default: 3).
    pub similar_examples: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_CAPACITY,
            similar_examples: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Idle,
    Accumulating,
    Proving,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackReason {
    /// An admission conflict was rejected.
    Conflict,
    /// A type definition did not parse or was not a declaration.
    InvalidTypeDefinition,
    /// The conclusion yielded nothing to prove.
    NoGoal,
    /// A goal stayed unproven after repair and review.
    ProofFailed,
    /// An oracle, runtime or storage call failed.
    ExternalFailure,
}

impl fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RollbackReason::Conflict => "conflict",
            RollbackReason::InvalidTypeDefinition => "invalid type definition",
            RollbackReason::NoGoal => "no goal",
            RollbackReason::ProofFailed => "proof failed",
            RollbackReason::ExternalFailure => "external failure",
        };
        f.write_str(text)
    }
}

/// One translated sentence waiting for the unit to finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub sentence: String,
    pub prediction: Prediction,
    /// Parsed statements not yet admitted.
    pub statements: Vec<TypedStatement>,
}

impl PendingEntry {
    /// Put a reviewer's replacement in place of the machine's statement, in
    /// the parsed statements and in the prediction that will be recorded.
    fn replace_statement(&mut self, original: &TypedStatement, edited: TypedStatement) {
        replace_text(&mut self.prediction.statements, original, &edited);
        if let Some(slot) = self.statements.iter_mut().find(|s| **s == *original) {
            *slot = edited;
        }
    }
}

/// Rewrite the text that parses to `original`.
fn replace_text(texts: &mut [String], original: &TypedStatement, edited: &TypedStatement) {
    if let Some(text) = texts
        .iter_mut()
        .find(|t| TypedStatement::parse(t).is_ok_and(|s| s == *original))
    {
        *text = edited.to_string();
    }
}

/// Everything a unit has accumulated since its first premise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingBatch {
    pub premises: Vec<PendingEntry>,
    pub conclusion: Option<PendingEntry>,
    /// Links admitted on behalf of this unit.
    pub links: Vec<TypedStatement>,
}

impl PendingBatch {
    /// Sentences of the unit, in order.
    pub fn sentences(&self) -> Vec<String> {
        self.entries().map(|e| e.sentence.clone()).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &PendingEntry> {
        self.premises.iter().chain(self.conclusion.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.premises.is_empty() && self.conclusion.is_none() && self.links.is_empty()
    }

    fn entry_mut(&mut self, index: usize) -> Option<&mut PendingEntry> {
        self.premises.iter_mut().chain(self.conclusion.as_mut()).nth(index)
    }

    pub fn clear(&mut self) {
        self.premises.clear();
        self.conclusion = None;
        self.links.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PremiseOutcome {
    Staged { statements: usize, links: usize },
    /// No logical content; the sentence was skipped.
    Performative,
    RolledBack {
        reason: RollbackReason,
        discarded: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Committed {
        sentences: Vec<String>,
        /// One search per goal, in question order.
        proofs: Vec<ProofSearch>,
        /// Statements derived while chaining the batch.
        derived: usize,
    },
    RolledBack {
        reason: RollbackReason,
        /// Sentences whose work was discarded, for manual replay.
        discarded: Vec<String>,
    },
}

impl UnitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, UnitOutcome::Committed { .. })
    }
}

/// Premises and conclusion of one unit, as read from a puzzle file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningUnit {
    #[serde(default)]
    pub premises: Vec<String>,
    pub conclusion: String,
}

impl ReasoningUnit {
    /// Parse a JSON array of units.
    pub fn parse_all(json: &str) -> serde_json::Result<Vec<Self>> {
        serde_json::from_str(json)
    }
}

/// Parse a goal: a statement (whose proof may be a variable) or a bare type,
/// which is proven with the proof variable `$proof`.
pub fn parse_goal(text: &str) -> Result<TypedStatement, ParseError> {
    let atom = parse_atom(text)?;
    Ok(TypedStatement::from_atom(&atom)
        .unwrap_or_else(|| TypedStatement::new(Atom::var(GOAL_PROOF), atom)))
}

/// Why a unit stopped early.
enum Halt {
    Rollback(RollbackReason),
    Error(PlnError),
}

impl From<PlnError> for Halt {
    fn from(e: PlnError) -> Self {
        Halt::Error(e)
    }
}

/// Output of staging one sentence.
struct Staged {
    statements: usize,
    links: usize,
    goals: Vec<TypedStatement>,
}

/// Serializes all reasoning units of one session.
pub struct StagedController {
    config: ControllerConfig,
    repair: RepairConfig,
    session: Session,
    translator: Box<dyn Translator>,
    proof_oracle: Box<dyn ProofOracle>,
    confirmer: Box<dyn Confirmer>,
    window: SentenceWindow,
    state: UnitState,
    batch: PendingBatch,
}

impl fmt::Debug for StagedController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedController")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("window", &self.window.len())
            .field("pending", &self.batch.sentences())
            .finish()
    }
}

impl StagedController {
    /// A controller that gives up on unproven goals and rejects every review.
    pub fn new(session: Session, translator: Box<dyn Translator>) -> Self {
        let config = ControllerConfig::default();
        Self {
            window: SentenceWindow::new(config.window_capacity),
            config,
            repair: RepairConfig::default(),
            session,
            translator,
            proof_oracle: Box::new(GiveUp),
            confirmer: Box::new(Unattended),
            state: UnitState::Idle,
            batch: PendingBatch::default(),
        }
    }

    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.window = SentenceWindow::new(config.window_capacity);
        self.config = config;
        self
    }

    pub fn with_repair(mut self, repair: RepairConfig, oracle: Box<dyn ProofOracle>) -> Self {
        self.repair = repair;
        self.proof_oracle = oracle;
        self
    }

    pub fn with_confirmer(mut self, confirmer: Box<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    /// End the session: flush the knowledge store to its file and hand the
    /// session back.
    pub fn finish(self) -> PlnResult<Session> {
        if self.session.adapter.flush()? {
            tracing::info!(state = ?self.state, "session closed");
        }
        Ok(self.into_session())
    }

    pub fn window(&self) -> &SentenceWindow {
        &self.window
    }

    pub fn batch(&self) -> &PendingBatch {
        &self.batch
    }

    /// Run a whole unit. A premise that rolls the unit back ends it; the
    /// remaining sentences are reported as discarded.
    pub fn run_unit(&mut self, unit: &ReasoningUnit) -> PlnResult<UnitOutcome> {
        for (i, premise) in unit.premises.iter().enumerate() {
            if let PremiseOutcome::RolledBack { reason, mut discarded } = self.process_premise(premise)? {
                discarded.extend(unit.premises[i + 1..].iter().cloned());
                discarded.push(unit.conclusion.clone());
                return Ok(UnitOutcome::RolledBack { reason, discarded });
            }
        }
        self.conclude(&unit.conclusion)
    }

    /// Translate and stage one premise, opening a unit if none is open.
    pub fn process_premise(&mut self, sentence: &str) -> PlnResult<PremiseOutcome> {
        self.begin_unit();
        match self.stage_sentence(sentence, false) {
            Ok(Some(staged)) => Ok(PremiseOutcome::Staged {
                statements: staged.statements,
                links: staged.links,
            }),
            Ok(None) => Ok(PremiseOutcome::Performative),
            Err(Halt::Rollback(reason)) => {
                let discarded = self.rollback(reason, sentence);
                Ok(PremiseOutcome::RolledBack { reason, discarded })
            }
            Err(Halt::Error(e)) => {
                self.rollback(RollbackReason::ExternalFailure, sentence);
                Err(e)
            }
        }
    }

    /// Close the unit with its conclusion: chain the batch, prove every goal,
    /// then commit or roll back.
    pub fn conclude(&mut self, sentence: &str) -> PlnResult<UnitOutcome> {
        self.begin_unit();
        match self.prove_unit(sentence) {
            Ok(outcome) => Ok(outcome),
            Err(Halt::Rollback(reason)) => {
                let discarded = self.rollback(reason, sentence);
                Ok(UnitOutcome::RolledBack { reason, discarded })
            }
            Err(Halt::Error(e)) => {
                self.rollback(RollbackReason::ExternalFailure, sentence);
                Err(e)
            }
        }
    }

    fn begin_unit(&mut self) {
        if matches!(
            self.state,
            UnitState::Idle | UnitState::Committed | UnitState::RolledBack
        ) {
            self.batch.clear();
            self.state = UnitState::Accumulating;
            tracing::debug!("unit opened");
        }
    }

    fn prove_unit(&mut self, sentence: &str) -> Result<UnitOutcome, Halt> {
        let Some(staged) = self.stage_sentence(sentence, true)? else {
            tracing::warn!(conclusion = sentence, "conclusion has no logical content");
            return Err(Halt::Rollback(RollbackReason::NoGoal));
        };
        if staged.goals.is_empty() {
            tracing::warn!(conclusion = sentence, "conclusion yielded no goal");
            return Err(Halt::Rollback(RollbackReason::NoGoal));
        }

        self.state = UnitState::Proving;
        let derived = self.chain_batch()?;

        let mut proofs = Vec::with_capacity(staged.goals.len());
        for goal in &staged.goals {
            proofs.push(self.prove_goal(goal, sentence)?);
        }
        Ok(self.commit(proofs, derived)?)
    }

    /// Translate a sentence and stage its content. `None` for performatives.
    fn stage_sentence(&mut self, sentence: &str, conclusion: bool) -> Result<Option<Staged>, Halt> {
        let similar = self
            .session
            .exemplars
            .similar(sentence, self.config.similar_examples)
            .map_err(PlnError::from)?;
        let translation = self
            .translator
            .translate(sentence, &self.window.snapshot(), &similar)
            .map_err(PlnError::from)?;
        let mut prediction = match translation {
            Translation::Performative => {
                tracing::debug!(sentence, "performative sentence skipped");
                return Ok(None);
            }
            Translation::Logic(prediction) => prediction,
        };
        if !prediction.from_context.is_empty() {
            tracing::debug!(sentence, context = ?prediction.from_context, "context references");
        }

        let links = self.admit_type_definitions(&mut prediction.type_definitions)?;

        let mut statements: Vec<TypedStatement> = Vec::new();
        for text in &prediction.statements {
            match TypedStatement::parse(text) {
                Ok(statement) => statements.push(statement),
                Err(e) => tracing::warn!(sentence, statement = %text, error = %e, "unparsable statement dropped"),
            }
        }

        let mut goals: Vec<TypedStatement> = Vec::new();
        if conclusion {
            for text in &prediction.questions {
                match parse_goal(text) {
                    Ok(goal) => goals.push(goal),
                    Err(e) => tracing::warn!(sentence, question = %text, error = %e, "unparsable question dropped"),
                }
            }
            // A conclusion without questions asserts what is to be proven.
            if prediction.questions.is_empty() {
                goals = statements
                    .drain(..)
                    .map(|s| TypedStatement::new(Atom::var(GOAL_PROOF), s.ty().clone()))
                    .collect();
            }
        }

        let staged = Staged {
            statements: statements.len(),
            links: links.len(),
            goals,
        };
        let entry = PendingEntry {
            sentence: sentence.to_string(),
            prediction,
            statements,
        };
        if conclusion {
            self.batch.conclusion = Some(entry);
        } else {
            self.batch.premises.push(entry);
        }
        self.batch.links.extend(links);
        self.window.push(sentence);
        Ok(Some(staged))
    }

    /// Admit type definitions, then the links the resolver proposes for them.
    /// Reviewed edits are written back into `texts`.
    fn admit_type_definitions(&mut self, texts: &mut [String]) -> Result<Vec<TypedStatement>, Halt> {
        let mut definitions = Vec::with_capacity(texts.len());
        for text in texts.iter_mut() {
            let definition = match TypedStatement::parse(text) {
                Ok(d) if d.is_type_declaration() => d,
                Ok(d) => {
                    tracing::warn!(definition = %d, "type definition is not a declaration");
                    return Err(Halt::Rollback(RollbackReason::InvalidTypeDefinition));
                }
                Err(e) => {
                    tracing::warn!(definition = %text, error = %e, "unparsable type definition");
                    return Err(Halt::Rollback(RollbackReason::InvalidTypeDefinition));
                }
            };
            if let Some(admitted) = self.admit_reviewed(definition.clone(), |adapter, s| adapter.admit(s))? {
                if admitted != definition {
                    *text = admitted.to_string();
                }
                definitions.push(admitted);
            }
        }
        if definitions.is_empty() {
            return Ok(Vec::new());
        }

        let proposed = self.session.resolver.stage_new_typedefs(&definitions)?;
        let mut links = Vec::with_capacity(proposed.len());
        for link in proposed {
            if let Some(admitted) = self.admit_reviewed(link, |adapter, s| adapter.admit(s))? {
                tracing::debug!(link = %admitted, "link admitted");
                links.push(admitted);
            }
        }
        Ok(links)
    }

    /// Push every pending statement through forward chaining.
    fn chain_batch(&mut self) -> Result<usize, Halt> {
        let staged: Vec<(usize, TypedStatement)> = self
            .batch
            .entries()
            .enumerate()
            .flat_map(|(i, e)| e.statements.iter().cloned().map(move |s| (i, s)))
            .collect();
        let mut derived = 0;
        for (entry, statement) in staged {
            let admitted = self.admit_reviewed(statement.clone(), |adapter, s| {
                let outcome = adapter.add_and_forward_chain(s)?;
                derived += outcome.derived.len();
                Ok(outcome.admission)
            })?;
            if let Some(edited) = admitted.filter(|a| *a != statement) {
                if let Some(entry) = self.batch.entry_mut(entry) {
                    entry.replace_statement(&statement, edited);
                }
            }
        }
        Ok(derived)
    }

    /// Admit through `admit`, sending a conflict to the confirmer.
    ///
    /// `Approve` keeps the existing binding and returns `None`. An edited
    /// replacement gets one admission attempt; a second conflict rolls back.
    fn admit_reviewed<F>(&mut self, statement: TypedStatement, mut admit: F) -> Result<Option<TypedStatement>, Halt>
    where
        F: FnMut(&mut ChainAdapter, TypedStatement) -> PlnResult<Admission>,
    {
        let mut candidate = statement;
        let mut edited = false;
        loop {
            let conflict: Conflict = match admit(&mut self.session.adapter, candidate.clone())? {
                Admission::Inserted | Admission::AlreadyPresent => return Ok(Some(candidate)),
                Admission::Conflict(conflict) => conflict,
            };
            tracing::warn!(
                witness = %conflict.witness,
                existing = %conflict.existing_statement(),
                incoming = %conflict.incoming_statement(),
                "admission conflict"
            );
            if edited {
                return Err(Halt::Rollback(RollbackReason::Conflict));
            }
            match self.confirmer.review_conflict(&conflict) {
                Review::Approve => {
                    tracing::info!(statement = %candidate, "conflict approved; incoming statement dropped");
                    return Ok(None);
                }
                Review::Edit(replacement) => {
                    tracing::info!(replacement = %replacement, "conflict edited");
                    candidate = replacement;
                    edited = true;
                }
                Review::Reject => return Err(Halt::Rollback(RollbackReason::Conflict)),
            }
        }
    }

    fn prove_goal(&mut self, goal: &TypedStatement, conclusion: &str) -> Result<ProofSearch, Halt> {
        let search = self.session.adapter.backward_chain(goal)?;
        if search.proven {
            return Ok(search);
        }
        tracing::info!(goal = %goal, "goal not proven; starting repair");

        let premises: Vec<SentenceLogic> = self
            .batch
            .premises
            .iter()
            .map(|e| SentenceLogic {
                sentence: e.sentence.clone(),
                statements: e.prediction.statements.clone(),
            })
            .collect();
        let context = RepairContext {
            premises: &premises,
            conclusion,
        };
        let outcome = ProofRepair::new(&self.repair, self.proof_oracle.as_ref()).run(
            &mut self.session.adapter,
            context,
            goal,
        )?;

        match outcome {
            RepairOutcome::Proven(repaired) => {
                tracing::info!(goal = %goal, "goal proven after repair");
                Ok(repaired)
            }
            RepairOutcome::Failed { attempts, reason } => {
                tracing::warn!(goal = %goal, attempts, %reason, "proof failed");
                match self.confirmer.review_failed_proof(&search) {
                    Review::Approve => {
                        tracing::info!(goal = %goal, "unproven goal accepted on review");
                        Ok(search)
                    }
                    Review::Edit(edited) => {
                        let retry = self.session.adapter.backward_chain(&edited)?;
                        if retry.proven {
                            Ok(retry)
                        } else {
                            tracing::warn!(goal = %edited, "edited goal is not provable either");
                            Err(Halt::Rollback(RollbackReason::ProofFailed))
                        }
                    }
                    Review::Reject => Err(Halt::Rollback(RollbackReason::ProofFailed)),
                }
            }
        }
    }

    /// Flush the store, then record the unit's exemplars in one batch. A unit
    /// whose goals were accepted unproven teaches nothing and records none.
    fn commit(&mut self, proofs: Vec<ProofSearch>, derived: usize) -> PlnResult<UnitOutcome> {
        self.session.adapter.flush()?;
        if proofs.iter().all(|p| p.proven) {
            let exemplars: Vec<Exemplar> = self
                .batch
                .entries()
                .map(|entry| Exemplar {
                    sentence: entry.sentence.clone(),
                    prediction: entry.prediction.clone(),
                })
                .collect();
            self.session.exemplars.record_all(exemplars)?;
        } else {
            tracing::info!(sentences = ?self.batch.sentences(), "unproven goal accepted; exemplars not recorded");
        }
        self.session.resolver.commit_pending_types();

        let sentences = self.batch.sentences();
        tracing::info!(
            sentences = sentences.len(),
            goals = proofs.len(),
            links = self.batch.links.len(),
            derived,
            "unit committed"
        );
        self.batch.clear();
        self.state = UnitState::Committed;
        Ok(UnitOutcome::Committed {
            sentences,
            proofs,
            derived,
        })
    }

    /// Discard the unit. Returns the discarded sentences.
    fn rollback(&mut self, reason: RollbackReason, current: &str) -> Vec<String> {
        let mut discarded = self.batch.sentences();
        if !discarded.iter().any(|s| s == current) {
            discarded.push(current.to_string());
        }
        tracing::warn!(%reason, discarded = ?discarded, "unit rolled back");

        self.session.resolver.clear_pending_types();
        self.batch.clear();
        self.state = UnitState::RolledBack;
        discarded
    }
}
