//! The Knowledge Store: the admitted typed statements of one session.
//!
//! The store enforces one invariant: the mapping *witness → type* is a
//! function. [`KnowledgeStore::admit`] is the only way in, and it refuses any
//! statement whose witness is already bound to a different type, reporting
//! the collision as an [`Admission::Conflict`] value rather than an error.
//! The caller decides whether to abort or ask a human.
//!
//! Statements keep insertion order, which is also the order they are written
//! to the backing [`StatementLog`].

pub mod log;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::atom::{Atom, match_pattern};
use crate::error::{ParseError, PlnResult, StoreError};
use crate::statement::{StatementKind, TypedStatement};

pub use log::StatementLog;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A witness that would be bound to two different types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub witness: Atom,
    /// Type already admitted for the witness.
    pub existing: Atom,
    /// Type the rejected statement tried to bind.
    pub incoming: Atom,
}

impl Conflict {
    /// The statement that is already in the store.
    pub fn existing_statement(&self) -> TypedStatement {
        TypedStatement::new(self.witness.clone(), self.existing.clone())
    }

    /// The statement that was refused.
    pub fn incoming_statement(&self) -> TypedStatement {
        TypedStatement::new(self.witness.clone(), self.incoming.clone())
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is already bound to {}, cannot also be {}",
            self.witness, self.existing, self.incoming
        )
    }
}

/// Outcome of an admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// New statement stored.
    Inserted,
    /// An identical statement was already stored; nothing changed.
    AlreadyPresent,
    /// The witness is bound to a different type; nothing changed.
    Conflict(Conflict),
}

impl Admission {
    /// `Inserted` and `AlreadyPresent` are both "ok".
    pub fn is_ok(&self) -> bool {
        !matches!(self, Admission::Conflict(_))
    }

    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            Admission::Conflict(c) => Some(c),
            _ => None,
        }
    }
}

/// What happened while loading a statement file.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub conflicts: Vec<(usize, Conflict)>,
    /// `(line number, error)` for unparsable lines.
    pub parse_errors: Vec<(usize, ParseError)>,
    /// Lines whose statement has a variable witness.
    pub refused: Vec<(usize, TypedStatement)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.parse_errors.is_empty() && self.refused.is_empty()
    }
}

/// The admitted statements of one reasoning session.
#[derive(Debug, Default)]
pub struct KnowledgeStore {
    statements: Vec<TypedStatement>,
    /// Witness → type of every admitted statement.
    witnesses: HashMap<Atom, Atom>,
    log: Option<StatementLog>,
}

impl KnowledgeStore {
    /// An empty, memory-only store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load statements from `path` through the conflict-checked path and keep
    /// the file attached as the store's log. A missing file yields an empty store.
    pub fn load(path: impl AsRef<Path>, read_only: bool) -> StoreResult<(Self, LoadReport)> {
        let log = StatementLog::new(path.as_ref(), read_only);
        let text = log.read()?;
        let mut store = Self::new();
        let report = store.admit_lines(&text)?;
        store.log = Some(log);
        if !report.is_clean() {
            tracing::warn!(
                path = %path.as_ref().display(),
                conflicts = report.conflicts.len(),
                parse_errors = report.parse_errors.len(),
                refused = report.refused.len(),
                "knowledge-base file has problems"
            );
        }
        Ok((store, report))
    }

    /// Attach a log without reading it. Future admissions are appended.
    pub fn attach_log(&mut self, log: StatementLog) {
        self.log = Some(log);
    }

    pub fn log(&self) -> Option<&StatementLog> {
        self.log.as_ref()
    }

    /// Admit every non-blank, non-comment line of `text`.
    ///
    /// The attached log (if any) is *not* appended to, so loading never
    /// duplicates lines in the file being read.
    pub fn admit_lines(&mut self, text: &str) -> StoreResult<LoadReport> {
        let mut report = LoadReport::default();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let line_no = idx + 1;
            match TypedStatement::parse(line) {
                Ok(statement) if statement.proof().is_variable() => {
                    report.refused.push((line_no, statement));
                }
                Ok(statement) => match self.insert(statement, false)? {
                    Admission::Inserted => report.inserted += 1,
                    Admission::AlreadyPresent => report.duplicates += 1,
                    Admission::Conflict(c) => report.conflicts.push((line_no, c)),
                },
                Err(e) => report.parse_errors.push((line_no, e)),
            }
        }
        Ok(report)
    }

    /// Conflict-checked admission. Inserted statements are appended to the log.
    pub fn admit(&mut self, statement: TypedStatement) -> StoreResult<Admission> {
        self.insert(statement, true)
    }

    /// Conflict-checked admission that leaves the log alone. The caller
    /// appends with [`Self::log_statement`] once the statement is accepted
    /// everywhere else.
    pub(crate) fn admit_unlogged(&mut self, statement: TypedStatement) -> StoreResult<Admission> {
        self.insert(statement, false)
    }

    /// Append an admitted statement to the backing file, if there is one.
    pub(crate) fn log_statement(&self, statement: &TypedStatement) -> StoreResult<()> {
        match &self.log {
            Some(log) => log.append([statement]),
            None => Ok(()),
        }
    }

    fn insert(&mut self, statement: TypedStatement, write_log: bool) -> StoreResult<Admission> {
        if statement.proof().is_variable() {
            return Err(StoreError::VariableWitness {
                statement: statement.to_string(),
            });
        }
        if let Some(existing) = self.type_of(statement.proof()) {
            if existing == statement.ty() || existing.alpha_eq(statement.ty()) {
                return Ok(Admission::AlreadyPresent);
            }
            let conflict = Conflict {
                witness: statement.proof().clone(),
                existing: existing.clone(),
                incoming: statement.ty().clone(),
            };
            tracing::debug!(%conflict, "admission refused");
            return Ok(Admission::Conflict(conflict));
        }

        if let (true, Some(log)) = (write_log, &self.log) {
            log.append([&statement])?;
        }
        self.witnesses
            .insert(statement.proof().clone(), statement.ty().clone());
        self.statements.push(statement);
        Ok(Admission::Inserted)
    }

    /// Parse and admit. A parse failure affects only this statement.
    pub fn admit_text(&mut self, text: &str) -> PlnResult<Admission> {
        let statement = TypedStatement::parse(text)?;
        Ok(self.admit(statement)?)
    }

    /// Remove an exact statement. Returns whether it was present.
    pub fn remove(&mut self, statement: &TypedStatement) -> bool {
        let Some(pos) = self.statements.iter().position(|s| s == statement) else {
            return false;
        };
        self.statements.remove(pos);
        self.witnesses.remove(statement.proof());
        true
    }

    /// All statements matching a pattern with free variables, e.g. `(: t1 $t)`.
    pub fn query_exact(&self, pattern: &Atom) -> Vec<&TypedStatement> {
        self.statements
            .iter()
            .filter(|s| match_pattern(pattern, &s.to_atom()).is_some())
            .collect()
    }

    /// The type currently bound to `witness`.
    pub fn type_of(&self, witness: &Atom) -> Option<&Atom> {
        self.witnesses.get(witness)
    }

    pub fn contains(&self, statement: &TypedStatement) -> bool {
        self.type_of(statement.proof()) == Some(statement.ty())
    }

    /// Whether [`Self::persist`] can write: a file is attached and not read-only.
    pub fn is_writable(&self) -> bool {
        self.log.as_ref().is_some_and(|log| !log.is_read_only())
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Statements in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &TypedStatement> {
        self.statements.iter()
    }

    pub fn of_kind(&self, kind: StatementKind) -> impl Iterator<Item = &TypedStatement> {
        self.statements.iter().filter(move |s| s.kind() == kind)
    }

    pub fn rules(&self) -> impl Iterator<Item = &TypedStatement> {
        self.of_kind(StatementKind::Rule)
    }

    pub fn type_declarations(&self) -> impl Iterator<Item = &TypedStatement> {
        self.of_kind(StatementKind::TypeDeclaration)
    }

    /// Rewrite the backing file with the current statements.
    pub fn persist(&self) -> StoreResult<()> {
        let log = self.log.as_ref().ok_or(StoreError::NoBackingFile)?;
        log.rewrite(self.statements.iter())?;
        tracing::info!(
            path = %log.path().display(),
            statements = self.statements.len(),
            "knowledge base flushed"
        );
        Ok(())
    }

    /// Serialize as newline-delimited statements in insertion order.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for statement in &self.statements {
            out.push_str(&statement.to_string());
            out.push('\n');
        }
        out
    }
}
