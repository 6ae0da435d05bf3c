//! In-process chaining runtime.
//!
//! Two spaces, mirroring the runtime contract:
//!
//! - **kb**: asserted statements (facts, rules, type declarations)
//! - **rb**: built-in inference schemas, enabled by [`ChainConfig`]
//!
//! Forward chaining joins rule premises against the kb's facts and runs to a
//! fixpoint or the iteration cap, producing [`Derivation`]s with full proof
//! terms. Backward chaining is a depth-bounded search that tries facts, then
//! rules (renamed apart), then contraposition for `(Not X)` goals.
//!
//! Proof terms:
//!
//! | schema          | proof                      |
//! |-----------------|----------------------------|
//! | modus ponens    | `(rule p1 ... pn)`         |
//! | modus tollens   | `(ModusTollens rule q)`    |
//! | double negation | `(DoubleNegElim p)`        |

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::atom::{Atom, Bindings, unify};
use crate::error::ChainError;
use crate::statement::{StatementKind, TypedStatement};

use super::normalize::{has_double_negation, normalize};
use super::{ChainResult, ChainingRuntime, Derivation, ForwardRun, ProofSearch, ProofStep, Schema};

/// Head symbol of modus tollens proofs.
pub const MODUS_TOLLENS: &str = "ModusTollens";
/// Head symbol of double-negation elimination proofs.
pub const DOUBLE_NEG_ELIM: &str = "DoubleNegElim";

/// Trace entries kept per backward search.
const MAX_TRACE_STEPS: usize = 512;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Limits and schema switches for [`LocalRuntime`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Maximum forward-chaining rounds (default: 10).
    pub max_forward_iterations: usize,
    /// Hard cap on statements derived by one forward run (default: 1000).
    pub max_derived: usize,
    /// Maximum backward-chaining depth (default: 6).
    pub max_backward_depth: usize,
    /// Proofs collected before a backward search stops (default: 16).
    pub max_solutions: usize,
    /// Enable the modus tollens schema (default: true).
    pub contraposition: bool,
    /// Enable double-negation elimination (default: true).
    pub double_negation: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_forward_iterations: 10,
            max_derived: 1000,
            max_backward_depth: 6,
            max_solutions: 16,
            contraposition: true,
            double_negation: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// A rule with variables renamed apart and symbol binders turned into
/// variables, ready for unification.
#[derive(Debug, Clone)]
struct PreparedRule {
    witness: Atom,
    premises: Vec<Atom>,
    /// Per premise, the variable its proof is bound to.
    binders: Vec<Option<Atom>>,
    conclusion: Atom,
}

impl PreparedRule {
    fn new(rule: &TypedStatement, suffix: usize) -> Option<Self> {
        let renamed = TypedStatement::new(rule.proof().clone(), rule.ty().rename_apart(suffix));
        let premises = renamed.premises();

        // Symbol binders become variables so the conclusion and later
        // premises can refer to the premise proof.
        let mut substitutions: Vec<(Atom, Atom)> = Vec::new();
        let binders: Vec<Option<Atom>> = premises
            .iter()
            .enumerate()
            .map(|(i, premise)| match &premise.binder {
                Some(var @ Atom::Variable(_)) => Some(var.clone()),
                Some(symbol @ Atom::Symbol(name)) => {
                    let fresh = Atom::var(format!("{name}#{suffix}.{i}"));
                    substitutions.push((symbol.clone(), fresh.clone()));
                    Some(fresh)
                }
                _ => None,
            })
            .collect();
        let rewrite = |atom: &Atom| {
            substitutions
                .iter()
                .fold(atom.clone(), |acc, (from, to)| acc.replace(from, to))
        };

        Some(Self {
            witness: renamed.proof().clone(),
            premises: premises.iter().map(|p| rewrite(&p.ty)).collect(),
            binders,
            conclusion: rewrite(renamed.conclusion()?),
        })
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// The in-process [`ChainingRuntime`].
#[derive(Debug, Clone)]
pub struct LocalRuntime {
    config: ChainConfig,
    kb: Vec<TypedStatement>,
    rb: Vec<Schema>,
}

impl LocalRuntime {
    pub fn new(config: ChainConfig) -> Self {
        let mut rb = vec![Schema::ModusPonens];
        if config.contraposition {
            rb.push(Schema::ModusTollens);
        }
        if config.double_negation {
            rb.push(Schema::DoubleNegElim);
        }
        Self {
            config,
            kb: Vec::new(),
            rb,
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Enabled inference schemas.
    pub fn schemas(&self) -> &[Schema] {
        &self.rb
    }

    fn enabled(&self, schema: Schema) -> bool {
        self.rb.contains(&schema)
    }

    fn of_kind(&self, kind: StatementKind) -> impl Iterator<Item = &TypedStatement> {
        self.kb.iter().filter(move |s| s.kind() == kind)
    }
}

impl Default for LocalRuntime {
    fn default() -> Self {
        Self::new(ChainConfig::default())
    }
}

impl ChainingRuntime for LocalRuntime {
    fn name(&self) -> &str {
        "local"
    }

    fn add_atom(&mut self, statement: &TypedStatement) -> ChainResult<()> {
        if statement.proof().is_variable() {
            return Err(ChainError::Malformed {
                statement: statement.to_string(),
            });
        }
        if !self.kb.contains(statement) {
            self.kb.push(statement.clone());
        }
        Ok(())
    }

    fn remove_atom(&mut self, statement: &TypedStatement) -> ChainResult<bool> {
        match self.kb.iter().position(|s| s == statement) {
            Some(pos) => {
                self.kb.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn forward_chain(&self) -> ChainResult<ForwardRun> {
        let rules: Vec<PreparedRule> = self
            .of_kind(StatementKind::Rule)
            .enumerate()
            .filter_map(|(i, r)| PreparedRule::new(r, i))
            .collect();

        let mut facts: Vec<TypedStatement> = self.of_kind(StatementKind::Fact).cloned().collect();
        let mut seen_types: HashSet<Atom> = facts.iter().map(|f| f.ty().clone()).collect();
        let mut seen_witnesses: HashSet<Atom> = self.kb.iter().map(|s| s.proof().clone()).collect();
        let mut run = ForwardRun::default();

        for iteration in 1..=self.config.max_forward_iterations {
            run.iterations = iteration;
            let mut round: Vec<Derivation> = Vec::new();
            let mut accept = |statement: TypedStatement, schema: Schema, antecedents: Vec<Atom>| {
                if !statement.ty().is_ground()
                    || seen_types.contains(statement.ty())
                    || seen_witnesses.contains(statement.proof())
                {
                    return;
                }
                seen_types.insert(statement.ty().clone());
                seen_witnesses.insert(statement.proof().clone());
                round.push(Derivation {
                    statement,
                    schema,
                    antecedents,
                    iteration,
                });
            };

            for rule in &rules {
                for (bindings, proofs) in join_premises(rule, &facts, self.config.max_derived) {
                    let conclusion = rule.conclusion.substitute(&bindings);
                    let proof = Atom::expr(std::iter::once(rule.witness.clone()).chain(proofs.iter().cloned()));
                    accept(TypedStatement::new(proof, conclusion), Schema::ModusPonens, proofs);
                }
            }

            if self.enabled(Schema::ModusTollens) {
                for rule in rules.iter().filter(|r| r.premises.len() == 1) {
                    for fact in &facts {
                        let Some(negated) = fact.ty().negated() else {
                            continue;
                        };
                        let Some(bindings) = unify(&rule.conclusion, negated, &Bindings::new()) else {
                            continue;
                        };
                        let ty = Atom::not(rule.premises[0].substitute(&bindings));
                        let proof = Atom::expr([
                            Atom::sym(MODUS_TOLLENS),
                            rule.witness.clone(),
                            fact.proof().clone(),
                        ]);
                        accept(
                            TypedStatement::new(proof, ty),
                            Schema::ModusTollens,
                            vec![rule.witness.clone(), fact.proof().clone()],
                        );
                    }
                }
            }

            if self.enabled(Schema::DoubleNegElim) {
                for fact in facts.iter().filter(|f| has_double_negation(f.ty())) {
                    let ty = normalize(fact.ty());
                    let proof = Atom::expr([Atom::sym(DOUBLE_NEG_ELIM), fact.proof().clone()]);
                    accept(
                        TypedStatement::new(proof, ty),
                        Schema::DoubleNegElim,
                        vec![fact.proof().clone()],
                    );
                }
            }

            if round.is_empty() {
                run.reached_fixpoint = true;
                break;
            }
            facts.extend(round.iter().map(|d| d.statement.clone()));
            run.derived.extend(round);
            if run.derived.len() >= self.config.max_derived {
                run.derived.truncate(self.config.max_derived);
                tracing::warn!(cap = self.config.max_derived, "forward chaining hit derivation cap");
                break;
            }
        }
        Ok(run)
    }

    fn backward_chain(&self, goal: &TypedStatement) -> ChainResult<ProofSearch> {
        let mut search = Search {
            runtime: self,
            steps: Vec::new(),
            fresh: 0,
        };
        let solutions = search.solve(goal.ty(), &Bindings::new(), 0);
        // Proofs are about the normal form of the goal.
        let goal_ty = search.normal_form(goal.ty());

        let mut proofs: Vec<TypedStatement> = Vec::new();
        for (proof, bindings) in solutions {
            let Some(bindings) = unify(goal.proof(), &proof, &bindings) else {
                continue;
            };
            let instance = TypedStatement::new(proof.substitute(&bindings), goal_ty.substitute(&bindings));
            if !proofs.contains(&instance) {
                proofs.push(instance);
            }
        }
        Ok(ProofSearch {
            goal: goal.clone(),
            steps: search.steps,
            proven: !proofs.is_empty(),
            proofs,
        })
    }

    fn working_set(&self) -> Vec<TypedStatement> {
        self.kb.clone()
    }
}

/// Every way to satisfy all premises of `rule` from `facts`, as
/// `(bindings, premise proofs)`.
fn join_premises(rule: &PreparedRule, facts: &[TypedStatement], cap: usize) -> Vec<(Bindings, Vec<Atom>)> {
    let mut out = Vec::new();
    join_from(rule, 0, facts, Bindings::new(), Vec::new(), cap, &mut out);
    out
}

fn join_from(
    rule: &PreparedRule,
    index: usize,
    facts: &[TypedStatement],
    bindings: Bindings,
    proofs: Vec<Atom>,
    cap: usize,
    out: &mut Vec<(Bindings, Vec<Atom>)>,
) {
    if out.len() >= cap {
        return;
    }
    if index == rule.premises.len() {
        out.push((bindings, proofs));
        return;
    }
    for fact in facts {
        let Some(b) = unify(&rule.premises[index], fact.ty(), &bindings) else {
            continue;
        };
        let b = match &rule.binders[index] {
            Some(binder) => match unify(binder, fact.proof(), &b) {
                Some(b) => b,
                None => continue,
            },
            None => b,
        };
        let mut next = proofs.clone();
        next.push(fact.proof().clone());
        join_from(rule, index + 1, facts, b, next, cap, out);
    }
}

/// State of one backward search.
struct Search<'a> {
    runtime: &'a LocalRuntime,
    steps: Vec<ProofStep>,
    fresh: usize,
}

impl Search<'_> {
    fn next_suffix(&mut self) -> usize {
        self.fresh += 1;
        self.fresh
    }

    fn trace(&mut self, depth: usize, goal: &Atom, via: &Atom) {
        if self.steps.len() < MAX_TRACE_STEPS {
            self.steps.push(ProofStep {
                depth,
                goal: goal.clone(),
                via: via.clone(),
            });
        }
    }

    fn cap(&self) -> usize {
        self.runtime.config.max_solutions
    }

    fn normal_form(&self, atom: &Atom) -> Atom {
        if self.runtime.enabled(Schema::DoubleNegElim) {
            normalize(atom)
        } else {
            atom.clone()
        }
    }

    /// Proofs of `goal` under `bindings`, each with its extended bindings.
    fn solve(&mut self, goal: &Atom, bindings: &Bindings, depth: usize) -> Vec<(Atom, Bindings)> {
        let mut out = Vec::new();
        if depth > self.runtime.config.max_backward_depth {
            return out;
        }
        let goal = self.normal_form(&goal.substitute(bindings));
        let runtime = self.runtime;

        for fact in runtime.of_kind(StatementKind::Fact) {
            let ty = if fact.ty().is_ground() {
                fact.ty().clone()
            } else {
                fact.ty().rename_apart(self.next_suffix())
            };
            let normal = self.normal_form(&ty);
            if let Some(b) = unify(&goal, &normal, bindings) {
                self.trace(depth, &goal, fact.proof());
                let proof = if normal == ty {
                    fact.proof().clone()
                } else {
                    Atom::expr([Atom::sym(DOUBLE_NEG_ELIM), fact.proof().clone()])
                };
                out.push((proof, b));
                if out.len() >= self.cap() {
                    return out;
                }
            }
        }

        for rule in runtime.of_kind(StatementKind::Rule) {
            let Some(prepared) = PreparedRule::new(rule, self.next_suffix()) else {
                continue;
            };
            let Some(b) = unify(&prepared.conclusion, &goal, bindings) else {
                continue;
            };
            self.trace(depth, &goal, &prepared.witness);
            for (proofs, b) in self.solve_premises(&prepared, 0, b, Vec::new(), depth + 1) {
                let proof = Atom::expr(std::iter::once(prepared.witness.clone()).chain(proofs));
                out.push((proof, b));
                if out.len() >= self.cap() {
                    return out;
                }
            }
        }

        if runtime.enabled(Schema::ModusTollens) {
            if let Some(inner) = goal.negated() {
                for rule in runtime.of_kind(StatementKind::Rule) {
                    let Some(prepared) = PreparedRule::new(rule, self.next_suffix()) else {
                        continue;
                    };
                    if prepared.premises.len() != 1 {
                        continue;
                    }
                    let Some(b) = unify(&prepared.premises[0], inner, bindings) else {
                        continue;
                    };
                    self.trace(depth, &goal, &prepared.witness);
                    let negated_conclusion = Atom::not(prepared.conclusion.clone());
                    for (q, b) in self.solve(&negated_conclusion, &b, depth + 1) {
                        let proof = Atom::expr([Atom::sym(MODUS_TOLLENS), prepared.witness.clone(), q]);
                        out.push((proof, b));
                        if out.len() >= self.cap() {
                            return out;
                        }
                    }
                }
            }
        }
        out
    }

    fn solve_premises(
        &mut self,
        rule: &PreparedRule,
        index: usize,
        bindings: Bindings,
        proofs: Vec<Atom>,
        depth: usize,
    ) -> Vec<(Vec<Atom>, Bindings)> {
        if index == rule.premises.len() {
            return vec![(proofs, bindings)];
        }
        let mut out = Vec::new();
        for (proof, b) in self.solve(&rule.premises[index], &bindings, depth) {
            let b = match &rule.binders[index] {
                Some(binder) => match unify(binder, &proof, &b) {
                    Some(b) => b,
                    None => continue,
                },
                None => b,
            };
            let mut next = proofs.clone();
            next.push(proof);
            out.extend(self.solve_premises(rule, index + 1, b, next, depth));
            if out.len() >= self.cap() {
                break;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn st(s: &str) -> TypedStatement {
        s.parse().unwrap()
    }

    fn runtime(statements: &[&str]) -> LocalRuntime {
        let mut rt = LocalRuntime::default();
        for s in statements {
            rt.add_atom(&st(s)).unwrap();
        }
        rt
    }

    fn derived(rt: &LocalRuntime) -> Vec<String> {
        rt.forward_chain()
            .unwrap()
            .derived
            .into_iter()
            .map(|d| d.statement.to_string())
            .collect()
    }

    #[test]
    fn modus_ponens_with_named_binder() {
        let rt = runtime(&["(: ab (-> (: a (P A)) (P B)))", "(: a (P A))"]);
        assert_eq!(derived(&rt), vec!["(: (ab a) (P B))"]);
    }

    #[test]
    fn modus_ponens_binds_variables_across_premises() {
        let rt = runtime(&[
            "(: grand (-> (Parent $x $y) (Parent $y $z) (Grandparent $x $z)))",
            "(: p1 (Parent Ann Bob))",
            "(: p2 (Parent Bob Cid))",
        ]);
        assert_eq!(derived(&rt), vec!["(: (grand p1 p2) (Grandparent Ann Cid))"]);
    }

    #[test]
    fn dependent_conclusion_mentions_premise_proof() {
        let rt = runtime(&[
            "(: witnessed (-> (: $e (Saw $who Crime)) (Witness $who $e)))",
            "(: s1 (Saw Ann Crime))",
        ]);
        assert_eq!(derived(&rt), vec!["(: (witnessed s1) (Witness Ann s1))"]);
    }

    #[test]
    fn chains_across_iterations_to_fixpoint() {
        let rt = runtime(&[
            "(: r1 (-> (A $x) (B $x)))",
            "(: r2 (-> (B $x) (C $x)))",
            "(: f (A K))",
        ]);
        let run = rt.forward_chain().unwrap();
        assert!(run.reached_fixpoint);
        let got: Vec<String> = run.derived.iter().map(|d| d.statement.to_string()).collect();
        assert_eq!(got, vec!["(: (r1 f) (B K))", "(: (r2 (r1 f)) (C K))"]);
        assert_eq!(run.derived[1].iteration, 2);
    }

    #[test]
    fn modus_tollens_forward() {
        let rt = runtime(&[
            "(: rain-umbrella (-> (: $r Raining) (Carries John Umbrella)))",
            "(: left (Not (Carries John Umbrella)))",
        ]);
        assert_eq!(
            derived(&rt),
            vec!["(: (ModusTollens rain-umbrella left) (Not Raining))"]
        );
    }

    #[test]
    fn double_negation_forward() {
        let rt = runtime(&["(: p (Not (Not (Open Door))))"]);
        assert_eq!(derived(&rt), vec!["(: (DoubleNegElim p) (Open Door))"]);
    }

    #[test]
    fn disabled_schemas_derive_nothing() {
        let config = ChainConfig {
            contraposition: false,
            double_negation: false,
            ..ChainConfig::default()
        };
        let mut rt = LocalRuntime::new(config);
        rt.add_atom(&st("(: r (-> (: $r Raining) (Wet Street)))")).unwrap();
        rt.add_atom(&st("(: d (Not (Wet Street)))")).unwrap();
        rt.add_atom(&st("(: p (Not (Not (Open Door))))")).unwrap();
        assert!(rt.forward_chain().unwrap().derived.is_empty());
        assert_eq!(rt.schemas(), &[Schema::ModusPonens]);
    }

    #[test]
    fn iteration_cap_stops_chaining() {
        let config = ChainConfig {
            max_forward_iterations: 1,
            ..ChainConfig::default()
        };
        let mut rt = LocalRuntime::new(config);
        for s in ["(: r1 (-> (A $x) (B $x)))", "(: r2 (-> (B $x) (C $x)))", "(: f (A K))"] {
            rt.add_atom(&st(s)).unwrap();
        }
        let run = rt.forward_chain().unwrap();
        assert_eq!(run.derived.len(), 1);
        assert!(!run.reached_fixpoint);
    }

    #[test]
    fn backward_proves_through_rules() {
        let rt = runtime(&[
            "(: r1 (-> (A $x) (B $x)))",
            "(: r2 (-> (B $x) (C $x)))",
            "(: f (A K))",
        ]);
        let search = rt.backward_chain(&st("(: $p (C K))")).unwrap();
        assert!(search.proven);
        assert_eq!(search.proofs[0].to_string(), "(: (r2 (r1 f)) (C K))");
        assert!(!search.steps.is_empty());
    }

    #[test]
    fn backward_answers_open_questions() {
        let rt = runtime(&["(: c1 (Carries John Umbrella))"]);
        let search = rt.backward_chain(&st("(: $p (Carries John $what))")).unwrap();
        assert!(search.proven);
        assert_eq!(search.proofs[0].to_string(), "(: c1 (Carries John Umbrella))");
    }

    #[test]
    fn backward_respects_ground_goal_proof() {
        let rt = runtime(&["(: c1 (Carries John Umbrella))"]);
        assert!(rt.backward_chain(&st("(: c1 (Carries John Umbrella))")).unwrap().proven);
        assert!(!rt.backward_chain(&st("(: c2 (Carries John Umbrella))")).unwrap().proven);
    }

    #[test]
    fn backward_double_negation_names_its_schema() {
        let rt = runtime(&["(: p (Not (Not (Open Door))))"]);
        let search = rt.backward_chain(&st("(: $x (Open Door))")).unwrap();
        assert!(search.proven);
        assert_eq!(search.proofs, vec![st("(: (DoubleNegElim p) (Open Door))")]);
        assert!(!rt.backward_chain(&st("(: p (Open Door))")).unwrap().proven);
    }

    #[test]
    fn double_negated_goal_is_proven_in_normal_form() {
        let rt = runtime(&["(: o (Open Door))"]);
        let search = rt.backward_chain(&st("(: $x (Not (Not (Open Door))))")).unwrap();
        assert_eq!(search.proofs, vec![st("(: o (Open Door))")]);
    }

    #[test]
    fn backward_depth_bound_terminates_on_cycles() {
        let rt = runtime(&["(: loop (-> (A $x) (A $x)))"]);
        let search = rt.backward_chain(&st("(: $p (A K))")).unwrap();
        assert!(!search.proven);
    }

    #[test]
    fn variable_witness_is_malformed() {
        let mut rt = LocalRuntime::default();
        assert!(matches!(
            rt.add_atom(&st("(: $p (A K))")),
            Err(ChainError::Malformed { .. })
        ));
    }
}
