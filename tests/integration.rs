//! End-to-end tests for pln-reasoner.
//!
//! These drive the staged controller with recorded translations over real
//! sessions, checking what reaches the knowledge store and exemplar storage
//! when units commit or roll back.

use std::cell::RefCell;
use std::rc::Rc;

use pln_reasoner::chain::{ChainAdapter, ChainConfig};
use pln_reasoner::confirm::{Review, Scripted};
use pln_reasoner::controller::repair::RepairConfig;
use pln_reasoner::controller::{ReasoningUnit, RollbackReason, StagedController, UnitOutcome, UnitState};
use pln_reasoner::exemplar::Exemplar;
use pln_reasoner::oracle::{
    NoRelations, OracleResult, RelationOracle, RepairAction, ReplayTranslator, ScriptedRepairs,
    Translation, Translator,
};
use pln_reasoner::paths::PlnPaths;
use pln_reasoner::config::SessionConfig;
use pln_reasoner::resolver::ResolverConfig;
use pln_reasoner::session::Session;
use pln_reasoner::statement::TypedStatement;
use pln_reasoner::store::{Admission, KnowledgeStore};

const RECORDING: &str = r#"{
    "It is raining.": {
        "type_definitions": ["(: Raining Type)"],
        "statements": ["(: r Raining)"]
    },
    "When it rains, John carries his umbrella.": {
        "type_definitions": ["(: Carries (-> Object Object Type))"],
        "statements": ["(: umbrella-rule (-> (: $r Raining) (Carries John Umbrella)))"]
    },
    "Whoever carries an umbrella stays dry.": {
        "type_definitions": ["(: Dry (-> Object Type))"],
        "statements": ["(: dry-rule (-> (: $c (Carries $x Umbrella)) (Dry $x)))"]
    },
    "Is John dry?": {"questions": ["(Dry John)"]},
    "The sky is clear.": {"statements": ["(: t1 (Sky Clear))"]},
    "The sky is grey.": {"statements": ["(: t1 (Sky Grey))"]},
    "Is the sky clear?": {"questions": ["(Sky Clear)"]},
    "John carries a bag.": {
        "type_definitions": ["(: Carries (-> Object Object Type))"],
        "statements": ["(: c1 (Carries John Bag))"]
    },
    "Does John hold a bag?": {
        "type_definitions": ["(: Holds (-> Object Object Type))"],
        "questions": ["(Holds John Bag)"]
    }
}"#;

fn umbrella() -> ReasoningUnit {
    ReasoningUnit {
        premises: vec![
            "It is raining.".into(),
            "When it rains, John carries his umbrella.".into(),
            "Whoever carries an umbrella stays dry.".into(),
        ],
        conclusion: "Is John dry?".into(),
    }
}

fn st(s: &str) -> TypedStatement {
    s.parse().unwrap()
}

fn memory_session(relations: Box<dyn RelationOracle>) -> Session {
    Session::in_memory(
        KnowledgeStore::new(),
        ChainConfig::default(),
        ResolverConfig::default(),
        relations,
    )
    .unwrap()
}

fn replay() -> Box<ReplayTranslator> {
    Box::new(ReplayTranslator::from_json(RECORDING).unwrap())
}

#[test]
fn forward_scenario_derives_rule_application() {
    let mut adapter = ChainAdapter::local(KnowledgeStore::new(), ChainConfig::default()).unwrap();
    adapter.add_and_forward_chain(st("(: ab (-> (: $a (P A)) (P B)))")).unwrap();
    let outcome = adapter.add_and_forward_chain(st("(: a (P A))")).unwrap();

    assert_eq!(outcome.admission, Admission::Inserted);
    let derived: Vec<String> = outcome.derived_statements().map(|s| s.to_string()).collect();
    assert_eq!(derived, vec!["(: (ab a) (P B))".to_string()]);
    assert!(adapter.store().contains(&st("(: (ab a) (P B))")));
}

#[test]
fn conflicting_witness_is_refused() {
    let mut store = KnowledgeStore::new();
    assert_eq!(store.admit(st("(: t1 (R X Y))")).unwrap(), Admission::Inserted);
    let admission = store.admit(st("(: t1 (R X Z))")).unwrap();

    let conflict = admission.conflict().unwrap();
    assert_eq!(conflict.existing_statement(), st("(: t1 (R X Y))"));
    assert_eq!(conflict.incoming_statement(), st("(: t1 (R X Z))"));
    assert_eq!(store.len(), 1);
    assert_eq!(store.admit(st("(: t1 (R X Y))")).unwrap(), Admission::AlreadyPresent);
}

#[test]
fn committed_unit_is_retrievable_after_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = PlnPaths::rooted(dir.path()).session("umbrella");
    let config = SessionConfig::default();

    {
        let (session, _) = Session::open(&config, &paths, Box::new(NoRelations)).unwrap();
        let mut controller = StagedController::new(session, replay());
        assert!(controller.run_unit(&umbrella()).unwrap().is_committed());
    }

    let (session, report) = Session::open(&config, &paths, Box::new(NoRelations)).unwrap();
    assert!(report.is_clean());
    assert_eq!(session.exemplars.len(), 4);
    let similar = session.exemplars.similar("It is raining.", 1).unwrap();
    assert_eq!(similar[0].sentence, "It is raining.");
    assert!(session.store().contains(&st("(: (dry-rule (umbrella-rule r)) (Dry John))")));
}

#[test]
fn failed_unit_leaves_no_exemplars() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = PlnPaths::rooted(dir.path()).session("umbrella");
    let config = SessionConfig::default();

    {
        let (session, _) = Session::open(&config, &paths, Box::new(NoRelations)).unwrap();
        let mut controller = StagedController::new(session, replay());
        let unit = ReasoningUnit {
            premises: vec!["Whoever carries an umbrella stays dry.".into()],
            conclusion: "Is John dry?".into(),
        };
        let outcome = controller.run_unit(&unit).unwrap();
        assert!(matches!(
            outcome,
            UnitOutcome::RolledBack {
                reason: RollbackReason::ProofFailed,
                ..
            }
        ));
    }

    let (session, _) = Session::open(&config, &paths, Box::new(NoRelations)).unwrap();
    assert!(session.exemplars.is_empty());
}

#[test]
fn conflicting_batch_rolls_back_as_a_whole() {
    let mut controller = StagedController::new(memory_session(Box::new(NoRelations)), replay());
    let unit = ReasoningUnit {
        premises: vec!["The sky is clear.".into(), "The sky is grey.".into()],
        conclusion: "Is the sky clear?".into(),
    };
    let outcome = controller.run_unit(&unit).unwrap();

    assert_eq!(
        outcome,
        UnitOutcome::RolledBack {
            reason: RollbackReason::Conflict,
            discarded: vec![
                "The sky is clear.".into(),
                "The sky is grey.".into(),
                "Is the sky clear?".into(),
            ],
        }
    );
    assert_eq!(controller.state(), UnitState::RolledBack);
    assert!(controller.session().exemplars.is_empty());
}

#[test]
fn reviewed_conflict_keeps_existing_binding() {
    let mut controller = StagedController::new(memory_session(Box::new(NoRelations)), replay())
        .with_confirmer(Box::new(Scripted::new([Review::Approve])));
    let unit = ReasoningUnit {
        premises: vec!["The sky is clear.".into(), "The sky is grey.".into()],
        conclusion: "Is the sky clear?".into(),
    };
    assert!(controller.run_unit(&unit).unwrap().is_committed());
    let store = controller.session().store();
    assert!(store.contains(&st("(: t1 (Sky Clear))")));
    assert!(!store.contains(&st("(: t1 (Sky Grey))")));
}

#[test]
fn edited_conflict_admits_replacement() {
    let mut controller = StagedController::new(memory_session(Box::new(NoRelations)), replay())
        .with_confirmer(Box::new(Scripted::new([Review::Edit(st("(: t2 (Sky Grey))"))])));
    let unit = ReasoningUnit {
        premises: vec!["The sky is clear.".into(), "The sky is grey.".into()],
        conclusion: "Is the sky clear?".into(),
    };
    assert!(controller.run_unit(&unit).unwrap().is_committed());
    assert!(controller.session().store().contains(&st("(: t2 (Sky Grey))")));

    let similar = controller.session().exemplars.similar("The sky is grey.", 1).unwrap();
    assert_eq!(similar[0].sentence, "The sky is grey.");
    assert_eq!(similar[0].prediction.statements, vec!["(: t2 (Sky Grey))".to_string()]);
}

/// Proposes the same links for every pair.
struct FixedLinks(Vec<&'static str>);

impl RelationOracle for FixedLinks {
    fn propose_links(&self, _new_type: &str, _similar_type: &str) -> OracleResult<Vec<String>> {
        Ok(self.0.iter().map(|s| s.to_string()).collect())
    }
}

#[test]
fn resolver_links_are_admitted_and_used() {
    let relations = FixedLinks(vec![
        "(: carry-hold (-> (: $c (Carries $a $b)) (Holds $a $b)))",
        "(: unbound (-> (: $c (Carries $a $b)) (Holds $a $z)))",
    ]);
    let mut controller = StagedController::new(memory_session(Box::new(relations)), replay());
    let unit = ReasoningUnit {
        premises: vec!["John carries a bag.".into()],
        conclusion: "Does John hold a bag?".into(),
    };
    let outcome = controller.run_unit(&unit).unwrap();

    let UnitOutcome::Committed { proofs, .. } = outcome else {
        panic!("expected commit, got {outcome:?}");
    };
    assert_eq!(proofs[0].proofs[0], st("(: (carry-hold c1) (Holds John Bag))"));
    let store = controller.session().store();
    assert!(store.contains(&st("(: carry-hold (-> (: $c (Carries $a $b)) (Holds $a $b)))")));
    assert_eq!(store.rules().count(), 1);
    assert_eq!(controller.session().resolver.known_types(), 2);
}

#[test]
fn repair_fix_rescues_the_unit() {
    let repairs = ScriptedRepairs::new([RepairAction::Fix {
        remove: Vec::new(),
        add: vec!["(: r Raining)".into()],
    }]);
    let mut controller = StagedController::new(memory_session(Box::new(NoRelations)), replay())
        .with_repair(RepairConfig::default(), Box::new(repairs));
    let unit = ReasoningUnit {
        premises: vec![
            "When it rains, John carries his umbrella.".into(),
            "Whoever carries an umbrella stays dry.".into(),
        ],
        conclusion: "Is John dry?".into(),
    };
    let outcome = controller.run_unit(&unit).unwrap();
    let UnitOutcome::Committed { proofs, .. } = outcome else {
        panic!("expected commit, got {outcome:?}");
    };
    assert!(proofs[0].proven);
    assert_eq!(controller.session().exemplars.len(), 3);
}

/// Records what each translation call was given.
struct Watching {
    inner: ReplayTranslator,
    calls: Rc<RefCell<Vec<(String, Vec<String>, Vec<String>)>>>,
}

impl Translator for Watching {
    fn translate(&self, sentence: &str, previous: &[String], similar: &[Exemplar]) -> OracleResult<Translation> {
        self.calls.borrow_mut().push((
            sentence.to_string(),
            previous.to_vec(),
            similar.iter().map(|e| e.sentence.clone()).collect(),
        ));
        self.inner.translate(sentence, previous, similar)
    }
}

#[test]
fn translations_see_window_and_committed_exemplars() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let translator = Watching {
        inner: ReplayTranslator::from_json(RECORDING).unwrap(),
        calls: Rc::clone(&calls),
    };
    let mut controller = StagedController::new(memory_session(Box::new(NoRelations)), Box::new(translator));

    assert!(controller.run_unit(&umbrella()).unwrap().is_committed());
    controller.process_premise("It is raining.").unwrap();

    let calls = calls.borrow();
    let (first, first_previous, first_similar) = &calls[0];
    assert_eq!(first, "It is raining.");
    assert!(first_previous.is_empty());
    assert!(first_similar.is_empty());

    assert_eq!(calls[2].1, vec![
        "It is raining.".to_string(),
        "When it rains, John carries his umbrella.".to_string(),
    ]);

    let (_, previous, similar) = calls.last().unwrap();
    assert_eq!(previous.len(), 4);
    assert_eq!(similar[0], "It is raining.");
}

const LEFT_UMBRELLA: &str = r#"{
    "John always carries an umbrella when it rains.": {
        "type_definitions": ["(: Raining Type)", "(: Carries (-> Object Object Type))"],
        "statements": ["(: rain-umbrella (-> (: $r Raining) (Carries John Umbrella)))"]
    },
    "John left his umbrella.": {"statements": ["(: left (Not (Carries John Umbrella)))"]},
    "It wasn't raining.": {"questions": ["(Not Raining)"]}
}"#;

const LEFT_UMBRELLA_UNLINKED: &str = r#"{
    "John always carries an umbrella when it rains.": {
        "type_definitions": ["(: Raining Type)", "(: Carries (-> Object Object Type))"],
        "statements": ["(: rain-umbrella (-> (: $r Raining) (Carries John Umbrella)))"]
    },
    "John left his umbrella.": {
        "type_definitions": ["(: Left (-> Object Object Type))"],
        "statements": ["(: left (Left John Umbrella))"]
    },
    "It wasn't raining.": {"questions": ["(Not Raining)"]}
}"#;

fn left_umbrella() -> ReasoningUnit {
    ReasoningUnit {
        premises: vec![
            "John always carries an umbrella when it rains.".into(),
            "John left his umbrella.".into(),
        ],
        conclusion: "It wasn't raining.".into(),
    }
}

#[test]
fn contrapositive_unit_persists_its_premises() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = PlnPaths::rooted(dir.path()).session("umbrella");
    let config = SessionConfig::default();

    {
        let (session, _) = Session::open(&config, &paths, Box::new(NoRelations)).unwrap();
        let translator = Box::new(ReplayTranslator::from_json(LEFT_UMBRELLA).unwrap());
        let mut controller = StagedController::new(session, translator);
        let outcome = controller.run_unit(&left_umbrella()).unwrap();
        let UnitOutcome::Committed { proofs, .. } = outcome else {
            panic!("expected commit, got {outcome:?}");
        };
        assert!(proofs[0].proven);
        controller.finish().unwrap();
    }

    let (session, report) = Session::open(&config, &paths, Box::new(NoRelations)).unwrap();
    assert!(report.is_clean());
    assert!(session.exemplars.contains("John always carries an umbrella when it rains."));
    assert!(session.exemplars.contains("John left his umbrella."));
    let similar = session.exemplars.similar("John left his umbrella.", 1).unwrap();
    assert_eq!(similar[0].prediction.statements, vec!["(: left (Not (Carries John Umbrella)))".to_string()]);
    assert!(session.store().contains(&st("(: left (Not (Carries John Umbrella)))")));
}

#[test]
fn unlinked_premise_rolls_back_and_records_nothing() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = PlnPaths::rooted(dir.path()).session("umbrella");
    let config = SessionConfig::default();

    {
        let (session, _) = Session::open(&config, &paths, Box::new(NoRelations)).unwrap();
        let translator = Box::new(ReplayTranslator::from_json(LEFT_UMBRELLA_UNLINKED).unwrap());
        let mut controller = StagedController::new(session, translator);
        let outcome = controller.run_unit(&left_umbrella()).unwrap();
        assert!(matches!(
            outcome,
            UnitOutcome::RolledBack {
                reason: RollbackReason::ProofFailed,
                ..
            }
        ));
        controller.finish().unwrap();
    }

    let (session, _) = Session::open(&config, &paths, Box::new(NoRelations)).unwrap();
    assert!(!session.exemplars.contains("John always carries an umbrella when it rains."));
    assert!(!session.exemplars.contains("John left his umbrella."));
    assert!(session.exemplars.is_empty());
}

const SUNNY: &str = r#"{
    "It is sunny.": {
        "type_definitions": ["(: Sunny Type)", "(: Raining Type)"],
        "statements": ["(: s Sunny)"]
    },
    "When it rains, John carries his umbrella.": {
        "type_definitions": ["(: Carries (-> Object Object Type))"],
        "statements": ["(: umbrella-rule (-> (: $r Raining) (Carries John Umbrella)))"]
    },
    "Whoever carries an umbrella stays dry.": {
        "type_definitions": ["(: Dry (-> Object Type))"],
        "statements": ["(: dry-rule (-> (: $c (Carries $x Umbrella)) (Dry $x)))"]
    },
    "Is John dry?": {"questions": ["(Dry John)"]}
}"#;

#[test]
fn repair_removals_reach_the_file_on_commit() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = PlnPaths::rooted(dir.path()).session("sunny");
    let config = SessionConfig::default();

    {
        let (session, _) = Session::open(&config, &paths, Box::new(NoRelations)).unwrap();
        let repairs = ScriptedRepairs::new([RepairAction::Fix {
            remove: vec!["(: s Sunny)".into()],
            add: vec!["(: s Raining)".into()],
        }]);
        let translator = Box::new(ReplayTranslator::from_json(SUNNY).unwrap());
        let mut controller =
            StagedController::new(session, translator).with_repair(RepairConfig::default(), Box::new(repairs));
        let unit = ReasoningUnit {
            premises: vec![
                "It is sunny.".into(),
                "When it rains, John carries his umbrella.".into(),
                "Whoever carries an umbrella stays dry.".into(),
            ],
            conclusion: "Is John dry?".into(),
        };
        assert!(controller.run_unit(&unit).unwrap().is_committed());
        controller.finish().unwrap();
    }

    let (session, report) = Session::open(&config, &paths, Box::new(NoRelations)).unwrap();
    assert!(report.is_clean());
    assert!(session.store().contains(&st("(: s Raining)")));
    assert!(!session.store().contains(&st("(: s Sunny)")));
}
