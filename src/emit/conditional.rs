//! `[[ ... ]]` emission.
//!
//! Unary and numeric operators map onto fish `test`. `==`/`!=` are
//! pattern matches and go through `string match -q`. `=~` captures into
//! the `__bash_rematch` list so `${BASH_REMATCH[n]}` keeps working.
//! String ordering (`<`/`>`) has no fish `test` equivalent and refuses.

use crate::ast::types::{Param, TestExpr, TestOp, Word};
use crate::emit::word::{param_name, push_single_quoted, word_as_str};
use crate::emit::{unsupported, EmitResult, Emitter};

pub(crate) fn test_expr(
    emitter: &mut Emitter,
    expr: &TestExpr<'_>,
    out: &mut String,
) -> EmitResult {
    emit(emitter, expr, false, out)
}

fn emit(
    emitter: &mut Emitter,
    expr: &TestExpr<'_>,
    negated: bool,
    out: &mut String,
) -> EmitResult {
    match expr {
        TestExpr::Not(inner) => emit(emitter, inner, !negated, out),

        TestExpr::And(l, r) => {
            if negated {
                // not (a && b) needs the whole group negated.
                out.push_str("not begin; ");
                emit(emitter, l, false, out)?;
                out.push_str("; and ");
                emit(emitter, r, false, out)?;
                out.push_str("; end");
                return Ok(());
            }
            emit(emitter, l, false, out)?;
            out.push_str("; and ");
            emit(emitter, r, false, out)
        }

        TestExpr::Or(l, r) => {
            if negated {
                out.push_str("not begin; ");
                emit(emitter, l, false, out)?;
                out.push_str("; or ");
                emit(emitter, r, false, out)?;
                out.push_str("; end");
                return Ok(());
            }
            emit(emitter, l, false, out)?;
            out.push_str("; or ");
            emit(emitter, r, false, out)
        }

        TestExpr::Group(inner) => {
            if negated {
                out.push_str("not ");
            }
            out.push_str("begin; ");
            emit(emitter, inner, false, out)?;
            out.push_str("; end");
            Ok(())
        }

        TestExpr::Unary(flag, operand) => {
            match flag {
                b'v' => {
                    // [[ -v var ]] -> set -q var
                    if negated {
                        out.push_str("not ");
                    }
                    out.push_str("set -q ");
                    if let Some(name) = word_as_str(operand) {
                        out.push_str(&name);
                    } else {
                        emitter.word(operand, out)?;
                    }
                    Ok(())
                }
                b'o' => unsupported("test -o shell option"),
                _ => {
                    if negated {
                        out.push_str("not ");
                    }
                    out.push_str("test -");
                    out.push(*flag as char);
                    out.push(' ');
                    test_operand(emitter, operand, out)?;
                    Ok(())
                }
            }
        }

        TestExpr::Binary(op, lhs, rhs) => emit_binary(emitter, *op, lhs, rhs, negated, out),

        TestExpr::Word(word) => {
            // Bare word: true when the string is non-empty.
            if negated {
                out.push_str("not ");
            }
            out.push_str("test -n \"");
            emitter.word_unquoted_for_test(word, out)?;
            out.push('"');
            Ok(())
        }
    }
}

fn emit_binary(
    emitter: &mut Emitter,
    op: TestOp,
    lhs: &Word<'_>,
    rhs: &Word<'_>,
    negated: bool,
    out: &mut String,
) -> EmitResult {
    match op {
        TestOp::NumEq | TestOp::NumNe | TestOp::NumLt | TestOp::NumLe | TestOp::NumGt
        | TestOp::NumGe => {
            if negated {
                out.push_str("not ");
            }
            out.push_str("test ");
            emitter.word(lhs, out)?;
            out.push_str(match op {
                TestOp::NumEq => " -eq ",
                TestOp::NumNe => " -ne ",
                TestOp::NumLt => " -lt ",
                TestOp::NumLe => " -le ",
                TestOp::NumGt => " -gt ",
                _ => " -ge ",
            });
            emitter.word(rhs, out)?;
            Ok(())
        }

        TestOp::Eq | TestOp::Ne => {
            let flip = matches!(op, TestOp::Ne) ^ negated;
            if flip {
                out.push_str("not ");
            }
            out.push_str("string match -q -- ");
            let mut pattern = String::with_capacity(32);
            emitter.word_unquoted(rhs, &mut pattern)?;
            push_single_quoted(out, &pattern);
            out.push(' ');
            emitter.word(lhs, out)?;
            Ok(())
        }

        TestOp::Match => {
            if negated {
                out.push_str("not ");
            }
            out.push_str("set __bash_rematch (string match -r -- ");
            let mut pattern = String::with_capacity(32);
            emitter.word_unquoted(rhs, &mut pattern)?;
            push_single_quoted(out, &pattern);
            out.push(' ');
            emitter.word(lhs, out)?;
            out.push(')');
            Ok(())
        }

        TestOp::Lt | TestOp::Gt => unsupported("string ordering comparison"),
    }
}

/// A single `test` operand. Bare variables get double-quoted: an unset
/// variable must become an empty argument, not a missing one (fish
/// `test -n` with no operand is true).
fn test_operand(emitter: &mut Emitter, word: &Word<'_>, out: &mut String) -> EmitResult {
    use crate::ast::types::Fragment;
    let bare_var = matches!(
        word.fragments.as_slice(),
        [Fragment::VarSimple(Param::Var(_))]
    );
    if bare_var {
        out.push('"');
        emitter.word(word, out)?;
        out.push('"');
        Ok(())
    } else {
        emitter.word(word, out)
    }
}

impl Emitter {
    /// Emit a word for interpolation inside an already-open double quote.
    fn word_unquoted_for_test(&mut self, word: &Word<'_>, out: &mut String) -> EmitResult {
        use crate::ast::types::Fragment;
        for fragment in &word.fragments {
            match fragment {
                Fragment::VarSimple(param) => {
                    crate::emit::word::check_untranslatable(param)?;
                    if matches!(param, Param::Var(_)) {
                        out.push('$');
                        param_name(param, out);
                    } else {
                        self.fragment(fragment, out)?;
                    }
                }
                Fragment::SingleQuoted(s) | Fragment::Literal(s) => out.push_str(s),
                other => self.fragment(other, out)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::emit::translate;

    fn t(input: &str) -> String {
        translate(input).unwrap()
    }

    #[test]
    fn file_tests() {
        assert_eq!(t("[[ -f foo ]]"), "test -f foo");
        assert_eq!(t("[[ -d /tmp ]]"), "test -d /tmp");
        assert_eq!(t("[[ -x script.sh ]]"), "test -x script.sh");
    }

    #[test]
    fn string_tests() {
        assert_eq!(t("[[ -n \"$x\" ]]"), "test -n \"$x\"");
        assert_eq!(t("[[ -z \"$x\" ]]"), "test -z \"$x\"");
    }

    #[test]
    fn var_set_test() {
        assert_eq!(t("[[ -v HOME ]]"), "set -q HOME");
    }

    #[test]
    fn numeric_comparisons() {
        assert_eq!(t("[[ $n -ge 3 ]]"), "test $n -ge 3");
        assert_eq!(t("[[ 2 -lt 10 ]]"), "test 2 -lt 10");
    }

    #[test]
    fn pattern_equality() {
        assert_eq!(t("[[ $x == foo ]]"), "string match -q -- 'foo' $x");
        assert_eq!(t("[[ $x != foo ]]"), "not string match -q -- 'foo' $x");
        assert_eq!(t("[[ $x = foo ]]"), "string match -q -- 'foo' $x");
    }

    #[test]
    fn glob_pattern() {
        assert_eq!(t("[[ $f == *.txt ]]"), "string match -q -- '*.txt' $f");
    }

    #[test]
    fn regex_match_captures() {
        assert_eq!(
            t("[[ $x =~ ^v([0-9]+) ]]"),
            "set __bash_rematch (string match -r -- '^v([0-9]+)' $x)"
        );
    }

    #[test]
    fn negation() {
        assert_eq!(t("[[ ! -f foo ]]"), "not test -f foo");
        assert_eq!(t("[[ ! $x == y ]]"), "not string match -q -- 'y' $x");
    }

    #[test]
    fn double_negation_cancels() {
        assert_eq!(t("[[ ! $x != y ]]"), "string match -q -- 'y' $x");
    }

    #[test]
    fn and_or_chains() {
        assert_eq!(t("[[ -f a && -f b ]]"), "test -f a; and test -f b");
        assert_eq!(t("[[ -f a || -f b ]]"), "test -f a; or test -f b");
    }

    #[test]
    fn grouping() {
        assert_eq!(
            t("[[ ( -f a || -f b ) && -n $c ]]"),
            "begin; test -f a; or test -f b; end; and test -n \"$c\""
        );
    }

    #[test]
    fn bare_word_test() {
        assert_eq!(t("[[ $x ]]"), "test -n \"$x\"");
    }

    #[test]
    fn string_ordering_refused() {
        assert!(translate("[[ a < b ]]").is_err());
        assert!(translate("[[ a > b ]]").is_err());
    }

    #[test]
    fn in_if_condition() {
        assert_eq!(
            t("if [[ -n $x ]]; then echo yes; fi"),
            "if test -n \"$x\"\necho yes\nend"
        );
    }
}
