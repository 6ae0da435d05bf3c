//! Unification and one-way matching over atoms.

use std::collections::HashMap;

use super::Atom;

/// Variable name → bound atom.
pub type Bindings = HashMap<String, Atom>;

/// Most general unifier of `a` and `b`, extending `bindings`.
///
/// Variables on both sides may bind. Includes the occurs check, so the
/// result never contains cyclic bindings.
pub fn unify(a: &Atom, b: &Atom, bindings: &Bindings) -> Option<Bindings> {
    let mut out = bindings.clone();
    if unify_into(a, b, &mut out) {
        Some(out)
    } else {
        None
    }
}

fn unify_into(a: &Atom, b: &Atom, bindings: &mut Bindings) -> bool {
    let a = walk(a, bindings);
    let b = walk(b, bindings);
    match (&a, &b) {
        (Atom::Variable(x), Atom::Variable(y)) if x == y => true,
        (Atom::Variable(x), other) | (other, Atom::Variable(x)) => {
            if occurs(x, other, bindings) {
                return false;
            }
            bindings.insert(x.clone(), other.clone());
            true
        }
        (Atom::Symbol(x), Atom::Symbol(y)) => x == y,
        (Atom::Expr(xs), Atom::Expr(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| unify_into(x, y, bindings))
        }
        _ => false,
    }
}

/// Follow variable bindings until reaching an unbound variable or a non-variable.
fn walk(atom: &Atom, bindings: &Bindings) -> Atom {
    let mut current = atom;
    while let Atom::Variable(name) = current {
        match bindings.get(name) {
            Some(next) => current = next,
            None => break,
        }
    }
    current.clone()
}

fn occurs(var: &str, atom: &Atom, bindings: &Bindings) -> bool {
    match atom {
        Atom::Variable(name) if name == var => true,
        Atom::Variable(name) => bindings
            .get(name)
            .is_some_and(|bound| occurs(var, bound, bindings)),
        Atom::Symbol(_) => false,
        Atom::Expr(children) => children.iter().any(|c| occurs(var, c, bindings)),
    }
}

/// One-way match: binds variables of `pattern` only. Variables inside `term`
/// are treated as opaque constants.
pub fn match_pattern(pattern: &Atom, term: &Atom) -> Option<Bindings> {
    let mut bindings = Bindings::new();
    if match_into(pattern, term, &mut bindings) {
        Some(bindings)
    } else {
        None
    }
}

fn match_into(pattern: &Atom, term: &Atom, bindings: &mut Bindings) -> bool {
    match pattern {
        Atom::Variable(name) => match bindings.get(name) {
            Some(bound) => bound == term,
            None => {
                bindings.insert(name.clone(), term.clone());
                true
            }
        },
        Atom::Symbol(s) => matches!(term, Atom::Symbol(t) if t == s),
        Atom::Expr(ps) => match term {
            Atom::Expr(ts) => {
                ps.len() == ts.len() && ps.iter().zip(ts).all(|(p, t)| match_into(p, t, bindings))
            }
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(s: &str) -> Atom {
        s.parse().unwrap()
    }

    #[test]
    fn unify_binds_both_sides() {
        let b = unify(&a("(R $x B)"), &a("(R A $y)"), &Bindings::new()).unwrap();
        assert_eq!(a("(R $x $y)").substitute(&b), a("(R A B)"));
    }

    #[test]
    fn unify_respects_existing_bindings() {
        let mut start = Bindings::new();
        start.insert("x".into(), a("C"));
        assert!(unify(&a("(R $x)"), &a("(R A)"), &start).is_none());
        assert!(unify(&a("(R $x)"), &a("(R C)"), &start).is_some());
    }

    #[test]
    fn occurs_check_rejects_cycles() {
        assert!(unify(&a("$x"), &a("(f $x)"), &Bindings::new()).is_none());
    }

    #[test]
    fn repeated_variable_must_agree() {
        assert!(unify(&a("(R $x $x)"), &a("(R A B)"), &Bindings::new()).is_none());
        assert!(unify(&a("(R $x $x)"), &a("(R A A)"), &Bindings::new()).is_some());
    }

    #[test]
    fn match_is_one_way() {
        assert!(match_pattern(&a("(: $w (R X $t))"), &a("(: t1 (R X Y))")).is_some());
        // A variable in the term does not bind to the pattern's constant.
        assert!(match_pattern(&a("(R X Y)"), &a("(R X $t)")).is_none());
        let b = match_pattern(&a("(: t1 $ty)"), &a("(: t1 (R X Y))")).unwrap();
        assert_eq!(b["ty"], a("(R X Y)"));
    }
}
