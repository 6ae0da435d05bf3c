//! Typed statements: `(: proof type)`.
//!
//! A statement pairs a proof term (the *witness*) with a type expression. The
//! shape of the type decides what the statement is:
//!
//! - `Type` or `(-> Domain... Type)`: a **type declaration**
//! - `(-> premise... conclusion)`: a **rule**; each premise is either a proof
//!   obligation `(: binder T)` or a plain type `T` (anonymous binder)
//! - anything else: a **fact**

use std::fmt;

use crate::atom::{ARROW, Atom, COLON, TYPE, parse_atom};
use crate::error::ParseError;

/// What a statement declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    TypeDeclaration,
    Fact,
    Rule,
}

/// One premise of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Premise {
    /// Name the premise's proof is bound to, if the premise was written `(: binder T)`.
    pub binder: Option<Atom>,
    pub ty: Atom,
}

/// A `(: proof type)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedStatement {
    proof: Atom,
    ty: Atom,
}

impl TypedStatement {
    pub fn new(proof: Atom, ty: Atom) -> Self {
        Self { proof, ty }
    }

    /// Parse statement text such as `(: t1 (R X Y))`.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let atom = parse_atom(text)?;
        Self::from_atom(&atom).ok_or_else(|| ParseError::NotAStatement {
            text: text.trim().to_string(),
        })
    }

    /// Interpret an atom as a statement. `None` unless it has the shape `(: p t)`.
    pub fn from_atom(atom: &Atom) -> Option<Self> {
        match atom.children() {
            [head, proof, ty] if head.is_symbol(COLON) => Some(Self::new(proof.clone(), ty.clone())),
            _ => None,
        }
    }

    pub fn to_atom(&self) -> Atom {
        Atom::expr([Atom::sym(COLON), self.proof.clone(), self.ty.clone()])
    }

    /// The witness identifier (proof term).
    pub fn proof(&self) -> &Atom {
        &self.proof
    }

    /// The type expression.
    pub fn ty(&self) -> &Atom {
        &self.ty
    }

    pub fn kind(&self) -> StatementKind {
        if self.ty.is_symbol(TYPE) {
            return StatementKind::TypeDeclaration;
        }
        match self.ty.children() {
            [head, .., last] if head.is_symbol(ARROW) => {
                if last.is_symbol(TYPE) {
                    StatementKind::TypeDeclaration
                } else {
                    StatementKind::Rule
                }
            }
            _ => StatementKind::Fact,
        }
    }

    pub fn is_type_declaration(&self) -> bool {
        self.kind() == StatementKind::TypeDeclaration
    }

    pub fn is_rule(&self) -> bool {
        self.kind() == StatementKind::Rule
    }

    pub fn is_fact(&self) -> bool {
        self.kind() == StatementKind::Fact
    }

    /// Name declared by a type declaration whose proof is a symbol.
    pub fn declared_name(&self) -> Option<&str> {
        match (&self.proof, self.is_type_declaration()) {
            (Atom::Symbol(name), true) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Premises of a rule; empty for other statement kinds.
    pub fn premises(&self) -> Vec<Premise> {
        if !self.is_rule() {
            return Vec::new();
        }
        let parts = self.ty.args();
        parts[..parts.len() - 1]
            .iter()
            .map(|domain| match TypedStatement::from_atom(domain) {
                Some(obligation) => Premise {
                    binder: Some(obligation.proof),
                    ty: obligation.ty,
                },
                None => Premise {
                    binder: None,
                    ty: domain.clone(),
                },
            })
            .collect()
    }

    /// Conclusion type of a rule.
    pub fn conclusion(&self) -> Option<&Atom> {
        if self.is_rule() {
            self.ty.args().last()
        } else {
            None
        }
    }

    /// Distinct variables across proof and type.
    pub fn variables(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for v in self.proof.variables().into_iter().chain(self.ty.variables()) {
            if !out.iter().any(|o| o == v) {
                out.push(v.to_string());
            }
        }
        out
    }

    /// Same witness and alpha-equivalent type.
    pub fn alpha_eq(&self, other: &TypedStatement) -> bool {
        self.to_atom().alpha_eq(&other.to_atom())
    }
}

impl fmt::Display for TypedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(: {} {})", self.proof, self.ty)
    }
}

impl std::str::FromStr for TypedStatement {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
