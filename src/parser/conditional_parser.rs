//! Conditional expression parser for `[[ ... ]]`.
//!
//! Consumes the word/operator items collected between `[[` and `]]` and
//! builds a [`TestExpr`] tree: `||` over `&&` over `!`/grouping over
//! unary and binary primaries.

use crate::ast::types::{TestExpr, TestOp, Word};
use crate::parser::types::{ParseError, ParseErrorKind};

/// One item between `[[` and `]]`.
pub(crate) enum CondItem<'a> {
    /// A word plus its raw source text (operators are matched on the raw).
    Word { word: Word<'a>, raw: &'a str },
    AndAnd,
    OrOr,
}

/// Parse the item sequence into a conditional expression tree.
pub(crate) fn parse_conditional<'a>(
    items: Vec<CondItem<'a>>,
    offset: usize,
) -> Result<TestExpr<'a>, ParseError> {
    let mut p = CondParser { items, pos: 0, offset };
    let expr = p.or_expr()?;
    if !p.is_eof() {
        return Err(p.err("trailing tokens in conditional expression"));
    }
    Ok(expr)
}

struct CondParser<'a> {
    items: Vec<CondItem<'a>>,
    pos: usize,
    offset: usize,
}

impl<'a> CondParser<'a> {
    fn is_eof(&self) -> bool {
        self.pos >= self.items.len()
    }

    fn err(&self, message: &'static str) -> ParseError {
        ParseError::new(ParseErrorKind::Unexpected, self.offset, message)
    }

    fn peek_raw(&self) -> Option<&'a str> {
        match self.items.get(self.pos) {
            Some(CondItem::Word { raw, .. }) => Some(raw),
            _ => None,
        }
    }

    fn take_word(&mut self) -> Result<(Word<'a>, &'a str), ParseError> {
        match self.items.get_mut(self.pos) {
            Some(CondItem::Word { word, raw }) => {
                let raw = *raw;
                let word = std::mem::replace(word, Word::new(Vec::new()));
                self.pos += 1;
                Ok((word, raw))
            }
            _ => Err(self.err("expected word in conditional expression")),
        }
    }

    fn or_expr(&mut self) -> Result<TestExpr<'a>, ParseError> {
        let mut left = self.and_expr()?;
        while matches!(self.items.get(self.pos), Some(CondItem::OrOr)) {
            self.pos += 1;
            let right = self.and_expr()?;
            left = TestExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<TestExpr<'a>, ParseError> {
        let mut left = self.unary_expr()?;
        while matches!(self.items.get(self.pos), Some(CondItem::AndAnd)) {
            self.pos += 1;
            let right = self.unary_expr()?;
            left = TestExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary_expr(&mut self) -> Result<TestExpr<'a>, ParseError> {
        match self.peek_raw() {
            Some("!") => {
                self.pos += 1;
                let inner = self.unary_expr()?;
                Ok(TestExpr::Not(Box::new(inner)))
            }
            Some("(") => {
                self.pos += 1;
                let inner = self.or_expr()?;
                if self.peek_raw() != Some(")") {
                    return Err(self.err("expected ')' in conditional expression"));
                }
                self.pos += 1;
                Ok(TestExpr::Group(Box::new(inner)))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<TestExpr<'a>, ParseError> {
        let (first, first_raw) = self.take_word()?;

        // Unary operator followed by its operand.
        if let Some(flag) = unary_flag(first_raw) {
            let (operand, _) = self.take_word()?;
            return Ok(TestExpr::Unary(flag, operand));
        }

        // Binary operator between two words.
        if let Some(op_raw) = self.peek_raw() {
            if let Some(op) = binary_op(op_raw) {
                self.pos += 1;
                let (rhs, _) = self.take_word()?;
                return Ok(TestExpr::Binary(op, first, rhs));
            }
        }

        // Bare word: non-empty test.
        Ok(TestExpr::Word(first))
    }
}

fn unary_flag(raw: &str) -> Option<u8> {
    let b = raw.as_bytes();
    if b.len() == 2 && b[0] == b'-' {
        match b[1] {
            // File tests, string tests, and -v (variable set).
            b'a' | b'b' | b'c' | b'd' | b'e' | b'f' | b'g' | b'h' | b'k' | b'p' | b'r'
            | b's' | b't' | b'u' | b'w' | b'x' | b'G' | b'L' | b'N' | b'O' | b'S' | b'z'
            | b'n' | b'v' | b'o' => Some(b[1]),
            _ => None,
        }
    } else {
        None
    }
}

fn binary_op(raw: &str) -> Option<TestOp> {
    match raw {
        "=" | "==" => Some(TestOp::Eq),
        "!=" => Some(TestOp::Ne),
        "<" => Some(TestOp::Lt),
        ">" => Some(TestOp::Gt),
        "=~" => Some(TestOp::Match),
        "-eq" => Some(TestOp::NumEq),
        "-ne" => Some(TestOp::NumNe),
        "-lt" => Some(TestOp::NumLt),
        "-le" => Some(TestOp::NumLe),
        "-gt" => Some(TestOp::NumGt),
        "-ge" => Some(TestOp::NumGe),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::word_parser::parse_word;

    fn items(raws: &[&'static str]) -> Vec<CondItem<'static>> {
        raws.iter()
            .map(|&raw| match raw {
                "&&" => CondItem::AndAnd,
                "||" => CondItem::OrOr,
                _ => CondItem::Word { word: parse_word(raw, 0).unwrap(), raw },
            })
            .collect()
    }

    #[test]
    fn unary_file_test() {
        let e = parse_conditional(items(&["-f", "/etc/hosts"]), 0).unwrap();
        assert!(matches!(e, TestExpr::Unary(b'f', _)));
    }

    #[test]
    fn binary_string_eq() {
        let e = parse_conditional(items(&["$x", "==", "foo*"]), 0).unwrap();
        assert!(matches!(e, TestExpr::Binary(TestOp::Eq, _, _)));
    }

    #[test]
    fn regex_match() {
        let e = parse_conditional(items(&["$x", "=~", "^[0-9]+$"]), 0).unwrap();
        assert!(matches!(e, TestExpr::Binary(TestOp::Match, _, _)));
    }

    #[test]
    fn numeric_comparison() {
        let e = parse_conditional(items(&["$n", "-ge", "3"]), 0).unwrap();
        assert!(matches!(e, TestExpr::Binary(TestOp::NumGe, _, _)));
    }

    #[test]
    fn and_or_precedence() {
        // a && b || c  parses as  (a && b) || c
        let e = parse_conditional(items(&["-n", "$a", "&&", "-n", "$b", "||", "-n", "$c"]), 0)
            .unwrap();
        let TestExpr::Or(l, _) = e else { panic!() };
        assert!(matches!(*l, TestExpr::And(_, _)));
    }

    #[test]
    fn negation() {
        let e = parse_conditional(items(&["!", "-f", "x"]), 0).unwrap();
        assert!(matches!(e, TestExpr::Not(_)));
    }

    #[test]
    fn grouping() {
        let e = parse_conditional(items(&["(", "-n", "$a", ")"]), 0).unwrap();
        assert!(matches!(e, TestExpr::Group(_)));
    }

    #[test]
    fn bare_word() {
        let e = parse_conditional(items(&["$x"]), 0).unwrap();
        assert!(matches!(e, TestExpr::Word(_)));
    }

    #[test]
    fn trailing_junk_rejected() {
        assert!(parse_conditional(items(&["-f", "x", "y"]), 0).is_err());
    }
}
