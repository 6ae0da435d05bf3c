// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # pln-reasoner
//!
//! A knowledge base of dependently typed statements `(: proof type)` with
//! conflict-checked admission, forward and backward chaining, and a staged
//! controller that turns natural-language reasoning units into committed
//! knowledge or rolls them back.
//!
//! ## Architecture
//!
//! - **Terms** (`atom`, `statement`): atoms, parser, unification, typed statements
//! - **Knowledge store** (`store`): witness → type as a function, newline-delimited log
//! - **Chaining** (`chain`): adapter over a runtime trait; in-process runtime with
//!   modus ponens, modus tollens and `egg`-based double-negation elimination
//! - **Type resolver** (`resolver`, `index`): HNSW similarity over type names,
//!   link proposals from a relation oracle
//! - **Controller** (`controller`, `window`, `session`): staged units, commit/rollback,
//!   bounded proof repair
//! - **Oracles** (`oracle`, `exemplar`, `confirm`): translation, relation and proof
//!   oracles over Ollama or recorded answers; exemplar storage in redb; human review
//!
//! ## Library usage
//!
//! ```no_run
//! use pln_reasoner::chain::{ChainAdapter, ChainConfig};
//! use pln_reasoner::store::KnowledgeStore;
//!
//! let mut adapter = ChainAdapter::local(KnowledgeStore::new(), ChainConfig::default()).unwrap();
//! adapter.add_and_forward_chain("(: ab (-> (: $a (P A)) (P B)))".parse().unwrap()).unwrap();
//! let outcome = adapter.add_and_forward_chain("(: a (P A))".parse().unwrap()).unwrap();
//! assert_eq!(outcome.derived[0].statement.to_string(), "(: (ab a) (P B))");
//! ```

pub mod atom;
pub mod chain;
pub mod config;
pub mod confirm;
pub mod controller;
pub mod error;
pub mod exemplar;
pub mod index;
pub mod oracle;
pub mod paths;
pub mod resolver;
pub mod session;
pub mod statement;
pub mod store;
pub mod window;
