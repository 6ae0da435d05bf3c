//! Type normalization via e-graphs (egg).
//!
//! Atoms are encoded into [`PlnLang`]: `(Not X)` becomes a dedicated unary
//! node so the rewrite rules can talk about it, every other expression is an
//! n-ary `app` node, and symbols and variables are leaves (variables keep
//! their `$` prefix). The only rule today is double-negation elimination.

use egg::{AstSize, Extractor, Id, RecExpr, Runner, define_language};

use crate::atom::Atom;

define_language! {
    /// E-graph language for normalizing type expressions.
    pub enum PlnLang {
        "Not" = Not([Id; 1]),
        "app" = App(Box<[Id]>),
        Leaf(egg::Symbol),
    }
}

/// Rewrite rules applied by [`normalize`].
pub fn normalization_rules() -> Vec<egg::Rewrite<PlnLang, ()>> {
    vec![egg::rewrite!("double-neg"; "(Not (Not ?a))" => "?a")]
}

/// Whether `atom` contains a `(Not (Not _))` somewhere.
pub fn has_double_negation(atom: &Atom) -> bool {
    match atom.negated() {
        Some(inner) if inner.negated().is_some() => true,
        _ => atom.children().iter().any(has_double_negation),
    }
}

/// Smallest equivalent form of `atom` under [`normalization_rules`].
///
/// Atoms without a double negation are returned unchanged without touching
/// the e-graph.
pub fn normalize(atom: &Atom) -> Atom {
    if !has_double_negation(atom) {
        return atom.clone();
    }
    let mut expr = RecExpr::default();
    encode(atom, &mut expr);
    let rules = normalization_rules();
    let runner = Runner::default().with_expr(&expr).run(&rules);
    let extractor = Extractor::new(&runner.egraph, AstSize);
    let (_, best) = extractor.find_best(runner.roots[0]);
    match best.as_ref().len().checked_sub(1) {
        Some(root) => decode(&best, Id::from(root)),
        None => atom.clone(),
    }
}

fn encode(atom: &Atom, expr: &mut RecExpr<PlnLang>) -> Id {
    match atom {
        Atom::Symbol(name) => expr.add(PlnLang::Leaf(egg::Symbol::from(name.as_str()))),
        Atom::Variable(name) => expr.add(PlnLang::Leaf(egg::Symbol::from(format!("${name}")))),
        Atom::Expr(children) => match atom.negated() {
            Some(inner) => {
                let inner = encode(inner, expr);
                expr.add(PlnLang::Not([inner]))
            }
            None => {
                let ids: Vec<Id> = children.iter().map(|c| encode(c, expr)).collect();
                expr.add(PlnLang::App(ids.into_boxed_slice()))
            }
        },
    }
}

fn decode(expr: &RecExpr<PlnLang>, id: Id) -> Atom {
    match &expr[id] {
        PlnLang::Not([inner]) => Atom::not(decode(expr, *inner)),
        PlnLang::App(ids) => Atom::Expr(ids.iter().map(|i| decode(expr, *i)).collect()),
        PlnLang::Leaf(sym) => {
            let name = sym.as_str();
            match name.strip_prefix('$') {
                Some(var) if !var.is_empty() => Atom::var(var),
                _ => Atom::sym(name),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(s: &str) -> Atom {
        s.parse().unwrap()
    }

    #[test]
    fn double_negation_is_eliminated() {
        assert_eq!(normalize(&a("(Not (Not (Raining)))")), a("(Raining)"));
        assert_eq!(normalize(&a("(Not (Not Raining))")), a("Raining"));
    }

    #[test]
    fn nested_double_negation_inside_arguments() {
        let atom = a("(-> (: $x (Not (Not (P $x)))) (Q $x))");
        assert_eq!(normalize(&atom), a("(-> (: $x (P $x)) (Q $x))"));
    }

    #[test]
    fn single_negation_is_kept() {
        let atom = a("(Not (Not (Not (R X Y))))");
        assert_eq!(normalize(&atom), a("(Not (R X Y))"));
        assert_eq!(normalize(&a("(Not (R X Y))")), a("(Not (R X Y))"));
    }

    #[test]
    fn detects_double_negation() {
        assert!(has_double_negation(&a("(: p (Not (Not A)))")));
        assert!(!has_double_negation(&a("(: p (Not A))")));
    }
}
