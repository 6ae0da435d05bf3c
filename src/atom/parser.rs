//! Recursive-descent parser for the atom grammar.
//!
//! ```text
//! atom     := symbol | variable | string | "(" atom* ")"
//! variable := "$" name
//! string   := '"' ... '"'        (kept verbatim, quotes included, as a symbol;
//!                                 raw line breaks become `\n` and `\r` escapes)
//! comment  := ";" ... end-of-line
//! ```
//!
//! The parser never looks at what atoms *mean*; statement shape is checked by
//! [`crate::statement::TypedStatement`].

use crate::error::ParseError;

use super::{Atom, escape_line_breaks};

/// Parse exactly one atom. Leading/trailing whitespace and comments are allowed.
pub fn parse_atom(input: &str) -> Result<Atom, ParseError> {
    let mut parser = Parser::new(input);
    parser.skip_trivia();
    if parser.at_end() {
        return Err(ParseError::Empty);
    }
    let atom = parser.atom()?;
    parser.skip_trivia();
    if !parser.at_end() {
        return Err(ParseError::TrailingInput { offset: parser.pos });
    }
    Ok(atom)
}

/// Parse a sequence of atoms (e.g. a whole file of statements).
pub fn parse_atoms(input: &str) -> Result<Vec<Atom>, ParseError> {
    let mut parser = Parser::new(input);
    let mut atoms = Vec::new();
    loop {
        parser.skip_trivia();
        if parser.at_end() {
            return Ok(atoms);
        }
        atoms.push(parser.atom()?);
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == ';' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn atom(&mut self) -> Result<Atom, ParseError> {
        match self.peek() {
            Some('(') => self.expr(),
            Some(')') => Err(ParseError::UnbalancedClose { offset: self.pos }),
            Some('"') => self.string(),
            Some('$') => {
                let start = self.pos;
                self.bump();
                let name = self.word();
                if name.is_empty() {
                    return Err(ParseError::EmptyVariable { offset: start });
                }
                Ok(Atom::Variable(name.to_string()))
            }
            Some(_) => Ok(Atom::Symbol(self.word().to_string())),
            None => Err(ParseError::UnexpectedEof {
                offset: self.pos,
                open: 0,
            }),
        }
    }

    fn expr(&mut self) -> Result<Atom, ParseError> {
        // Iterative over nesting so deeply nested input cannot blow the stack.
        let mut stack: Vec<Vec<Atom>> = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some('(') => {
                    self.bump();
                    stack.push(Vec::new());
                }
                Some(')') => {
                    self.bump();
                    let Some(done) = stack.pop() else {
                        return Err(ParseError::UnbalancedClose {
                            offset: self.pos - 1,
                        });
                    };
                    let atom = Atom::Expr(done);
                    match stack.last_mut() {
                        Some(parent) => parent.push(atom),
                        None => return Ok(atom),
                    }
                }
                Some(_) => {
                    let leaf = self.atom()?;
                    match stack.last_mut() {
                        Some(parent) => parent.push(leaf),
                        None => return Ok(leaf),
                    }
                }
                None => {
                    return Err(ParseError::UnexpectedEof {
                        offset: self.pos,
                        open: stack.len(),
                    });
                }
            }
        }
    }

    fn string(&mut self) -> Result<Atom, ParseError> {
        let start = self.pos;
        self.bump();
        let mut escaped = false;
        while let Some(c) = self.bump() {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => {
                    let text = escape_line_breaks(&self.src[start..self.pos]);
                    return Ok(Atom::Symbol(text.into_owned()));
                }
                _ => escaped = false,
            }
        }
        Err(ParseError::UnterminatedString { offset: start })
    }

    fn word(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';') {
                break;
            }
            self.bump();
        }
        &self.src[start..self.pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_symbols_variables_and_expressions() {
        let atom = parse_atom("(: $p (Carries John Umbrella))").unwrap();
        assert_eq!(
            atom,
            Atom::expr([
                Atom::sym(":"),
                Atom::var("p"),
                Atom::expr([
                    Atom::sym("Carries"),
                    Atom::sym("John"),
                    Atom::sym("Umbrella"),
                ]),
            ])
        );
    }

    #[test]
    fn strings_keep_their_quotes_and_spaces() {
        let atom = parse_atom(r#"(Name "John Smith")"#).unwrap();
        assert_eq!(atom.args(), &[Atom::sym("\"John Smith\"")]);
    }

    #[test]
    fn raw_line_breaks_in_strings_are_escaped() {
        let atom = parse_atom("(Name \"John\nSmith\r\")").unwrap();
        assert_eq!(atom.args(), &[Atom::sym(r#""John\nSmith\r""#)]);
        assert!(!atom.to_string().contains('\n'));
        assert_eq!(parse_atom(&atom.to_string()).unwrap(), atom);
    }

    #[test]
    fn comments_and_whitespace_are_skipped() {
        let atoms = parse_atoms("; header\n(P A) ; trailing\n\n  (P B)\n").unwrap();
        assert_eq!(atoms.len(), 2);
        assert_eq!(atoms[1].to_string(), "(P B)");
    }

    #[test]
    fn empty_expression_is_allowed() {
        assert_eq!(parse_atom("()").unwrap(), Atom::Expr(vec![]));
    }

    #[test]
    fn reports_unbalanced_input() {
        assert!(matches!(
            parse_atom("(P (A)"),
            Err(ParseError::UnexpectedEof { open: 1, .. })
        ));
        assert!(matches!(
            parse_atom(")"),
            Err(ParseError::UnbalancedClose { offset: 0 })
        ));
        assert!(matches!(
            parse_atom("(P A))"),
            Err(ParseError::TrailingInput { offset: 5 })
        ));
    }

    #[test]
    fn reports_bad_variables_and_strings() {
        assert!(matches!(
            parse_atom("(P $ A)"),
            Err(ParseError::EmptyVariable { offset: 3 })
        ));
        assert!(matches!(
            parse_atom("(P \"open)"),
            Err(ParseError::UnterminatedString { offset: 3 })
        ));
        assert_eq!(parse_atom("   ; nothing\n"), Err(ParseError::Empty));
    }

    #[test]
    fn deep_nesting_does_not_recurse() {
        let depth = 2_000;
        let text = format!("{}x{}", "(".repeat(depth), ")".repeat(depth));
        assert!(parse_atom(&text).is_ok());
    }
}
