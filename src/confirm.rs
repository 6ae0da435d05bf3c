//! Human review of conflicts and failed proofs.

use std::collections::VecDeque;
use std::io::{BufRead, StdinLock, Stdout, Write};

use crate::chain::ProofSearch;
use crate::statement::TypedStatement;
use crate::store::Conflict;

/// A reviewer's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Review<T> {
    /// Accept the machine's outcome as it stands.
    Approve,
    /// Replace the machine output with this value, then continue.
    Edit(T),
    Reject,
}

/// Reviews outcomes the controller cannot resolve on its own.
///
/// For a conflict, `Approve` keeps the existing binding and drops the
/// incoming statement; `Edit` admits a replacement. For a failed proof,
/// `Approve` accepts the conclusion unproven; `Edit` retries with a
/// replacement goal. `Reject` rolls the unit back in both cases.
pub trait Confirmer {
    fn review_conflict(&mut self, conflict: &Conflict) -> Review<TypedStatement>;

    fn review_failed_proof(&mut self, search: &ProofSearch) -> Review<TypedStatement>;
}

/// Rejects everything. Used for batch runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unattended;

impl Confirmer for Unattended {
    fn review_conflict(&mut self, _conflict: &Conflict) -> Review<TypedStatement> {
        Review::Reject
    }

    fn review_failed_proof(&mut self, _search: &ProofSearch) -> Review<TypedStatement> {
        Review::Reject
    }
}

/// Answers from a fixed queue of reviews; `Reject` once it runs dry.
#[derive(Debug, Clone, Default)]
pub struct Scripted {
    reviews: VecDeque<Review<TypedStatement>>,
}

impl Scripted {
    pub fn new(reviews: impl IntoIterator<Item = Review<TypedStatement>>) -> Self {
        Self {
            reviews: reviews.into_iter().collect(),
        }
    }
}

impl Confirmer for Scripted {
    fn review_conflict(&mut self, _conflict: &Conflict) -> Review<TypedStatement> {
        self.reviews.pop_front().unwrap_or(Review::Reject)
    }

    fn review_failed_proof(&mut self, _search: &ProofSearch) -> Review<TypedStatement> {
        self.reviews.pop_front().unwrap_or(Review::Reject)
    }
}

/// Interactive prompt on a terminal (or any reader/writer pair).
///
/// Answers: `a` approve, `r` reject, or `e <statement>` to edit. Read
/// failures and end of input count as `Reject`.
pub struct StdinConfirmer<R = StdinLock<'static>, W = Stdout> {
    input: R,
    output: W,
}

impl StdinConfirmer {
    pub fn new() -> Self {
        Self {
            input: std::io::stdin().lock(),
            output: std::io::stdout(),
        }
    }
}

impl Default for StdinConfirmer {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: BufRead, W: Write> StdinConfirmer<R, W> {
    pub fn with_io(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, report: &str) -> Review<TypedStatement> {
        loop {
            let shown = writeln!(self.output, "{report}")
                .and_then(|_| write!(self.output, "[a]pprove / [r]eject / e <statement>: "))
                .and_then(|_| self.output.flush());
            if let Err(e) = shown {
                tracing::warn!(error = %e, "cannot write review prompt; rejecting");
                return Review::Reject;
            }

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) => return Review::Reject,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "cannot read review answer; rejecting");
                    return Review::Reject;
                }
            }

            let answer = line.trim();
            match answer {
                "a" | "approve" => return Review::Approve,
                "r" | "reject" => return Review::Reject,
                _ => {}
            }
            let edited = answer
                .strip_prefix("e ")
                .or_else(|| answer.strip_prefix("edit "));
            match edited.map(TypedStatement::parse) {
                Some(Ok(statement)) => return Review::Edit(statement),
                Some(Err(e)) => {
                    let _ = writeln!(self.output, "cannot parse edit: {e}");
                }
                None => {
                    let _ = writeln!(self.output, "unrecognized answer: {answer}");
                }
            }
        }
    }
}

impl<R: BufRead, W: Write> Confirmer for StdinConfirmer<R, W> {
    fn review_conflict(&mut self, conflict: &Conflict) -> Review<TypedStatement> {
        let report = format!(
            "conflict on {}\n  existing: {}\n  incoming: {}",
            conflict.witness,
            conflict.existing_statement(),
            conflict.incoming_statement()
        );
        self.ask(&report)
    }

    fn review_failed_proof(&mut self, search: &ProofSearch) -> Review<TypedStatement> {
        let mut report = format!("could not prove {}", search.goal);
        for step in &search.steps {
            report.push_str(&format!("\n  {step}"));
        }
        self.ask(&report)
    }
}

impl<R, W> std::fmt::Debug for StdinConfirmer<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdinConfirmer").finish_non_exhaustive()
    }
}
