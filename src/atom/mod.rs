//! Atoms: the immutable term trees every statement is built from.
//!
//! An atom is one of:
//!
//! - **Symbol**: an opaque identifier (`John`, `Type`, `->`, `"a string"`)
//! - **Variable**: a free variable written `$name`, scoped to one statement
//! - **Expr**: an application `(op arg...)` of its first element to the rest
//!
//! Equality and hashing are structural. [`Atom::alpha_eq`] additionally
//! identifies atoms that differ only by a consistent renaming of variables.

pub mod parser;
pub mod unify;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

pub use parser::{parse_atom, parse_atoms};
pub use unify::{Bindings, match_pattern, unify};

/// Symbol naming the type of all types.
pub const TYPE: &str = "Type";
/// Head of typed statements: `(: proof type)`.
pub const COLON: &str = ":";
/// Head of function types: `(-> domain... codomain)`.
pub const ARROW: &str = "->";
/// Head of negated types: `(Not X)`.
pub const NOT: &str = "Not";

/// An immutable logical term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Atom {
    Symbol(String),
    Variable(String),
    Expr(Vec<Atom>),
}

impl Atom {
    pub fn sym(name: impl Into<String>) -> Self {
        Atom::Symbol(name.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Atom::Variable(name.into())
    }

    pub fn expr(children: impl IntoIterator<Item = Atom>) -> Self {
        Atom::Expr(children.into_iter().collect())
    }

    /// `(Not inner)`.
    pub fn not(inner: Atom) -> Self {
        Atom::expr([Atom::sym(NOT), inner])
    }

    pub fn is_symbol(&self, name: &str) -> bool {
        matches!(self, Atom::Symbol(s) if s == name)
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Atom::Variable(_))
    }

    /// Children of an expression; empty for symbols and variables.
    pub fn children(&self) -> &[Atom] {
        match self {
            Atom::Expr(children) => children,
            _ => &[],
        }
    }

    /// The operator symbol of an expression whose head is a symbol.
    pub fn head_symbol(&self) -> Option<&str> {
        match self.children().first() {
            Some(Atom::Symbol(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Arguments of an expression (everything after the head).
    pub fn args(&self) -> &[Atom] {
        match self.children() {
            [] => &[],
            [_, rest @ ..] => rest,
        }
    }

    /// Number of arguments of a predicate application. Bare symbols have arity 0.
    pub fn arity(&self) -> usize {
        self.args().len()
    }

    /// If this is `(Not X)`, returns `X`.
    pub fn negated(&self) -> Option<&Atom> {
        match self.children() {
            [Atom::Symbol(head), inner] if head == NOT => Some(inner),
            _ => None,
        }
    }

    /// Whether the atom contains no variables.
    pub fn is_ground(&self) -> bool {
        match self {
            Atom::Symbol(_) => true,
            Atom::Variable(_) => false,
            Atom::Expr(children) => children.iter().all(Atom::is_ground),
        }
    }

    /// Distinct variable names in first-occurrence order.
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Atom::Symbol(_) => {}
            Atom::Variable(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name.as_str());
                }
            }
            Atom::Expr(children) => {
                for child in children {
                    child.collect_variables(out);
                }
            }
        }
    }

    /// Whether `needle` occurs anywhere inside this atom (including itself).
    pub fn contains(&self, needle: &Atom) -> bool {
        self == needle || self.children().iter().any(|c| c.contains(needle))
    }

    /// Replace every occurrence of `from` with `to`.
    pub fn replace(&self, from: &Atom, to: &Atom) -> Atom {
        if self == from {
            return to.clone();
        }
        match self {
            Atom::Expr(children) => Atom::Expr(children.iter().map(|c| c.replace(from, to)).collect()),
            other => other.clone(),
        }
    }

    /// Apply a substitution, resolving chains of bound variables.
    pub fn substitute(&self, bindings: &Bindings) -> Atom {
        match self {
            Atom::Symbol(_) => self.clone(),
            Atom::Variable(name) => match bindings.get(name) {
                Some(bound) => bound.substitute(bindings),
                None => self.clone(),
            },
            Atom::Expr(children) => {
                Atom::Expr(children.iter().map(|c| c.substitute(bindings)).collect())
            }
        }
    }

    /// Rename every variable `$x` to `$x#suffix`, keeping scopes apart.
    pub fn rename_apart(&self, suffix: usize) -> Atom {
        match self {
            Atom::Symbol(_) => self.clone(),
            Atom::Variable(name) => {
                let base = name.split('#').next().unwrap_or(name);
                Atom::Variable(format!("{base}#{suffix}"))
            }
            Atom::Expr(children) => {
                Atom::Expr(children.iter().map(|c| c.rename_apart(suffix)).collect())
            }
        }
    }

    /// Structural equality modulo a consistent, one-to-one renaming of variables.
    pub fn alpha_eq(&self, other: &Atom) -> bool {
        let mut forward = HashMap::new();
        let mut backward = HashMap::new();
        alpha_walk(self, other, &mut forward, &mut backward)
    }
}

fn alpha_walk<'a>(
    a: &'a Atom,
    b: &'a Atom,
    forward: &mut HashMap<&'a str, &'a str>,
    backward: &mut HashMap<&'a str, &'a str>,
) -> bool {
    match (a, b) {
        (Atom::Symbol(x), Atom::Symbol(y)) => x == y,
        (Atom::Variable(x), Atom::Variable(y)) => {
            let fwd = *forward.entry(x.as_str()).or_insert(y.as_str());
            let bwd = *backward.entry(y.as_str()).or_insert(x.as_str());
            fwd == y.as_str() && bwd == x.as_str()
        }
        (Atom::Expr(xs), Atom::Expr(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys)
                    .all(|(x, y)| alpha_walk(x, y, forward, backward))
        }
        _ => false,
    }
}

/// Replace raw line breaks with their `\n` / `\r` escapes.
///
/// Statements are stored one per line, so no printed atom may span lines.
pub fn escape_line_breaks(text: &str) -> Cow<'_, str> {
    if !text.contains(['\n', '\r']) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace('\n', "\\n").replace('\r', "\\r"))
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Symbol(name) => f.write_str(&escape_line_breaks(name)),
            Atom::Variable(name) => write!(f, "${name}"),
            Atom::Expr(children) => {
                f.write_str("(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl std::str::FromStr for Atom {
    type Err = crate::error::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_atom(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(s: &str) -> Atom {
        s.parse().unwrap()
    }

    #[test]
    fn display_round_trips_through_parser() {
        let text = "(: (ab a) (-> (: $x (P A)) (Not (R $x B))))";
        assert_eq!(a(text).to_string(), text);
    }

    #[test]
    fn built_symbols_print_on_one_line() {
        let atom = Atom::expr([Atom::sym("Name"), Atom::sym("\"a\nb\"")]);
        assert_eq!(atom.to_string(), r#"(Name "a\nb")"#);
        assert!(matches!(escape_line_breaks("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn structural_equality_ignores_whitespace() {
        assert_eq!(a("(R  X\n Y)"), a("(R X Y)"));
        assert_ne!(a("(R X Y)"), a("(R Y X)"));
    }

    #[test]
    fn variables_in_first_occurrence_order() {
        let atom = a("(R $y (S $x $y) $z)");
        assert_eq!(atom.variables(), vec!["y", "x", "z"]);
        assert!(!atom.is_ground());
        assert!(a("(R X Y)").is_ground());
    }

    #[test]
    fn alpha_equivalence_requires_consistent_renaming() {
        assert!(a("(R $x $y)").alpha_eq(&a("(R $a $b)")));
        assert!(!a("(R $x $x)").alpha_eq(&a("(R $a $b)")));
        assert!(!a("(R $x $y)").alpha_eq(&a("(R $a $a)")));
        assert!(!a("(R $x Y)").alpha_eq(&a("(R $a $b)")));
    }

    #[test]
    fn arity_and_negation() {
        assert_eq!(a("(Carries John Umbrella)").arity(), 2);
        assert_eq!(a("(Dog $x)").arity(), 1);
        assert_eq!(a("Raining").arity(), 0);
        assert_eq!(a("(Not Raining)").negated(), Some(&Atom::sym("Raining")));
        assert_eq!(a("(Not A B)").negated(), None);
    }

    #[test]
    fn rename_apart_is_idempotent_on_base_name() {
        let renamed = a("(R $x)").rename_apart(3).rename_apart(4);
        assert_eq!(renamed, a("(R $x#4)"));
    }

    #[test]
    fn replace_and_contains() {
        let atom = a("(f a (g a))");
        assert!(atom.contains(&Atom::sym("a")));
        assert_eq!(atom.replace(&Atom::sym("a"), &Atom::sym("b")), a("(f b (g b))"));
    }
}
