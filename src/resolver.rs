//! Type relationship resolver.
//!
//! When new type declarations arrive, the resolver looks up similar,
//! previously seen declarations by name and asks a [`RelationOracle`] to
//! propose linking rules (implication or exclusion) between each pair.
//! Proposals are validated structurally before they are returned:
//!
//! - a link must be a rule
//! - every variable in the conclusion must be bound by a premise
//! - `(Not X)` may only wrap relation-shaped predicates (arity ≥ 2)
//!
//! Links are returned, never admitted; the controller owns admission. The
//! resolver does own its index bookkeeping, which it stages per batch so a
//! rolled-back unit leaves no type records behind.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::atom::Atom;
use crate::error::PlnResult;
use crate::index::{HnswIndex, RecordId, SimilarityIndex};
use crate::oracle::RelationOracle;
use crate::statement::TypedStatement;
use crate::store::KnowledgeStore;

/// `[resolver]` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Similar declarations fetched per new type (default: 3).
    pub neighbours: usize,
    /// Minimum name similarity for a declaration to count as similar (default: 0.0).
    pub min_similarity: f32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            neighbours: 3,
            min_similarity: 0.0,
        }
    }
}

/// A type name with the declaration that introduced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRecord {
    pub name: String,
    pub declaration: TypedStatement,
}

/// Why a proposed link was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRejection {
    NotARule,
    UnboundVariable(String),
    NegatedNonRelation(Atom),
}

impl fmt::Display for LinkRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkRejection::NotARule => f.write_str("not a rule"),
            LinkRejection::UnboundVariable(v) => {
                write!(f, "conclusion variable ${v} is not bound by any premise")
            }
            LinkRejection::NegatedNonRelation(atom) => {
                write!(f, "negation of {atom}, which is not a relation of arity >= 2")
            }
        }
    }
}

/// Check a proposed link against the linking policy.
pub fn validate_link(link: &TypedStatement) -> Result<(), LinkRejection> {
    let Some(conclusion) = link.conclusion() else {
        return Err(LinkRejection::NotARule);
    };

    let mut bound: Vec<String> = Vec::new();
    for premise in link.premises() {
        let binder_vars = premise.binder.iter().flat_map(|b| b.variables());
        for v in premise.ty.variables().into_iter().chain(binder_vars) {
            if !bound.iter().any(|b| b == v) {
                bound.push(v.to_string());
            }
        }
    }
    if let Some(unbound) = conclusion
        .variables()
        .into_iter()
        .find(|v| !bound.iter().any(|b| b == v))
    {
        return Err(LinkRejection::UnboundVariable(unbound.to_string()));
    }

    match find_bad_negation(link.ty()) {
        Some(inner) => Err(LinkRejection::NegatedNonRelation(inner.clone())),
        None => Ok(()),
    }
}

fn find_bad_negation(atom: &Atom) -> Option<&Atom> {
    if let Some(inner) = atom.negated() {
        if inner.arity() < 2 {
            return Some(inner);
        }
    }
    atom.children().iter().find_map(find_bad_negation)
}

struct PendingType {
    name: String,
    id: RecordId,
    superseded: Option<RecordId>,
}

/// Finds related types and proposes links between them.
pub struct TypeResolver {
    config: ResolverConfig,
    index: HnswIndex<TypeRecord>,
    oracle: Box<dyn RelationOracle>,
    /// Type name → live record.
    current: HashMap<String, RecordId>,
    /// Records staged by the current batch, in insertion order.
    pending: Vec<PendingType>,
}

impl fmt::Debug for TypeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeResolver")
            .field("config", &self.config)
            .field("types", &self.current.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl TypeResolver {
    pub fn new(config: ResolverConfig, oracle: Box<dyn RelationOracle>) -> Self {
        Self {
            config,
            index: HnswIndex::with_defaults(),
            oracle,
            current: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Index every type declaration already in `store`, without oracle calls.
    pub fn seed(&mut self, store: &KnowledgeStore) -> PlnResult<usize> {
        let mut seeded = 0;
        for declaration in store.type_declarations() {
            if let Some(name) = declaration.declared_name() {
                let id = self.index.store(name, TypeRecord {
                    name: name.to_string(),
                    declaration: declaration.clone(),
                })?;
                if let Some(old) = self.current.insert(name.to_string(), id) {
                    self.index.set_active(old, false);
                }
                seeded += 1;
            }
        }
        Ok(seeded)
    }

    /// The live record for a type name.
    pub fn record(&self, name: &str) -> Option<&TypeRecord> {
        self.current.get(name).and_then(|id| self.index.get(*id))
    }

    pub fn known_types(&self) -> usize {
        self.current.len()
    }

    pub fn pending_types(&self) -> usize {
        self.pending.len()
    }

    /// Propose links for newly introduced type declarations.
    ///
    /// Each new declaration is compared against its nearest previously seen
    /// declarations, then indexed itself so later declarations in the same
    /// batch can find it. Declarations identical to the live record for their
    /// name are not new and are skipped.
    pub fn stage_new_typedefs(&mut self, definitions: &[TypedStatement]) -> PlnResult<Vec<TypedStatement>> {
        let mut links: Vec<TypedStatement> = Vec::new();

        for definition in definitions {
            let Some(name) = definition.declared_name() else {
                tracing::warn!(statement = %definition, "not a type declaration; skipped");
                continue;
            };
            if self.record(name).is_some_and(|r| r.declaration.alpha_eq(definition)) {
                continue;
            }

            let similar: Vec<TypeRecord> = self
                .index
                .search(name, self.config.neighbours + 1)?
                .into_iter()
                .filter(|hit| hit.record.name != name && hit.similarity >= self.config.min_similarity)
                .take(self.config.neighbours)
                .map(|hit| hit.record)
                .collect();

            let new_text = definition.to_string();
            for other in &similar {
                let proposals = self
                    .oracle
                    .propose_links(&new_text, &other.declaration.to_string())?;
                for text in proposals {
                    let link = match TypedStatement::parse(&text) {
                        Ok(link) => link,
                        Err(e) => {
                            tracing::warn!(link = %text, error = %e, "unparsable link proposal dropped");
                            continue;
                        }
                    };
                    if let Err(reason) = validate_link(&link) {
                        tracing::warn!(link = %link, %reason, "link proposal rejected");
                        continue;
                    }
                    if !links.iter().any(|l| l.alpha_eq(&link)) {
                        links.push(link);
                    }
                }
            }

            let id = self.index.store(name, TypeRecord {
                name: name.to_string(),
                declaration: definition.clone(),
            })?;
            let superseded = self.current.insert(name.to_string(), id);
            if let Some(old) = superseded {
                self.index.set_active(old, false);
            }
            self.pending.push(PendingType {
                name: name.to_string(),
                id,
                superseded,
            });
            tracing::debug!(name, similar = similar.len(), "type staged");
        }

        Ok(links)
    }

    /// Keep the batch's type records.
    pub fn commit_pending_types(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(types = self.pending.len(), "pending types committed");
        }
        self.pending.clear();
    }

    /// Hide the batch's type records and restore whatever they superseded.
    pub fn clear_pending_types(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            tracing::debug!(types = pending.len(), "pending types cleared");
        }
        for staged in pending.into_iter().rev() {
            self.index.set_active(staged.id, false);
            match staged.superseded {
                Some(old) => {
                    self.index.set_active(old, true);
                    self.current.insert(staged.name, old);
                }
                None => {
                    self.current.remove(&staged.name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{NoRelations, OracleResult};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn st(s: &str) -> TypedStatement {
        s.parse().unwrap()
    }

    /// Proposes fixed links and records every pair it was asked about.
    struct Scripted {
        links: Vec<&'static str>,
        asked: Rc<RefCell<Vec<(String, String)>>>,
    }

    impl RelationOracle for Scripted {
        fn propose_links(&self, new_type: &str, similar_type: &str) -> OracleResult<Vec<String>> {
            self.asked
                .borrow_mut()
                .push((new_type.to_string(), similar_type.to_string()));
            Ok(self.links.iter().map(|s| s.to_string()).collect())
        }
    }

    fn scripted(links: Vec<&'static str>) -> (TypeResolver, Rc<RefCell<Vec<(String, String)>>>) {
        let asked = Rc::new(RefCell::new(Vec::new()));
        let oracle = Scripted {
            links,
            asked: Rc::clone(&asked),
        };
        (TypeResolver::new(ResolverConfig::default(), Box::new(oracle)), asked)
    }

    #[test]
    fn link_policy() {
        assert!(validate_link(&st("(: l (-> (: $x (Carries $a $b)) (Holds $a $b)))")).is_ok());
        assert_eq!(
            validate_link(&st("(: l (Carries John Umbrella))")),
            Err(LinkRejection::NotARule)
        );
        assert_eq!(
            validate_link(&st("(: l (-> (: $x (Wet $a)) (Rained $a $when)))")),
            Err(LinkRejection::UnboundVariable("when".into()))
        );
        assert!(matches!(
            validate_link(&st("(: l (-> (: $x (Wet $a)) (Not (Dry $a))))")),
            Err(LinkRejection::NegatedNonRelation(_))
        ));
        assert!(validate_link(&st("(: l (-> (: $x (Holds $a $b)) (Not (Drops $a $b))))")).is_ok());
    }

    #[test]
    fn binder_variables_count_as_bound() {
        assert!(validate_link(&st("(: l (-> (: $p (Wet $a)) (Because $a $p)))")).is_ok());
    }

    #[test]
    fn first_type_has_nothing_to_relate_to() {
        let (mut resolver, asked) = scripted(vec!["(: l (-> (: $x (Carries $a $b)) (Holds $a $b)))"]);
        let links = resolver
            .stage_new_typedefs(&[st("(: Carries (-> Object Object Type))")])
            .unwrap();
        assert!(links.is_empty());
        assert!(asked.borrow().is_empty());
        assert_eq!(resolver.known_types(), 1);
    }

    #[test]
    fn later_types_in_a_batch_see_earlier_ones() {
        let (mut resolver, asked) = scripted(vec![
            "(: l (-> (: $x (Carries $a $b)) (Holds $a $b)))",
            "(: bad (-> (: $x (Carries $a $b)) (Holds $a $c)))",
            "not even an atom (",
        ]);
        let links = resolver
            .stage_new_typedefs(&[
                st("(: Carries (-> Object Object Type))"),
                st("(: Holds (-> Object Object Type))"),
            ])
            .unwrap();
        assert_eq!(links, vec![st("(: l (-> (: $x (Carries $a $b)) (Holds $a $b)))")]);
        assert_eq!(asked.borrow().len(), 1);
        assert!(asked.borrow()[0].1.contains("Carries"));
    }

    #[test]
    fn clear_restores_superseded_records() {
        let (mut resolver, _) = scripted(Vec::new());
        resolver
            .stage_new_typedefs(&[st("(: Carries (-> Object Object Type))")])
            .unwrap();
        resolver.commit_pending_types();

        resolver
            .stage_new_typedefs(&[
                st("(: Carries (-> Person Object Type))"),
                st("(: Raining Type)"),
            ])
            .unwrap();
        assert_eq!(resolver.pending_types(), 2);
        assert_eq!(
            resolver.record("Carries").unwrap().declaration,
            st("(: Carries (-> Person Object Type))")
        );

        resolver.clear_pending_types();
        assert_eq!(resolver.pending_types(), 0);
        assert!(resolver.record("Raining").is_none());
        assert_eq!(
            resolver.record("Carries").unwrap().declaration,
            st("(: Carries (-> Object Object Type))")
        );
    }

    #[test]
    fn unchanged_declaration_is_not_restaged() {
        let mut resolver = TypeResolver::new(ResolverConfig::default(), Box::new(NoRelations));
        let decl = st("(: Raining Type)");
        resolver.stage_new_typedefs(std::slice::from_ref(&decl)).unwrap();
        resolver.commit_pending_types();
        resolver.stage_new_typedefs(&[decl]).unwrap();
        assert_eq!(resolver.pending_types(), 0);
    }

    #[test]
    fn seed_indexes_store_declarations() {
        let mut store = KnowledgeStore::new();
        store.admit(st("(: Raining Type)")).unwrap();
        store.admit(st("(: r Raining)")).unwrap();
        let mut resolver = TypeResolver::new(ResolverConfig::default(), Box::new(NoRelations));
        assert_eq!(resolver.seed(&store).unwrap(), 1);
        assert!(resolver.record("Raining").is_some());
    }
}
