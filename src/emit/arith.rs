//! Arithmetic emission.
//!
//! Value contexts go through fish `math`; comparison and logic go
//! through `test`, which fish evaluates as an exit status the way bash
//! evaluates arithmetic truth. Increment, decrement, and assignment are
//! only meaningful as standalone `(( ))` commands.

use crate::ast::types::{ArithExpr, AssignOp, BinaryOp, UnaryOp};
use crate::emit::{unsupported, EmitResult, Emitter};

/// Emit a standalone `(( expr ))` command.
pub(crate) fn standalone(
    emitter: &mut Emitter,
    arith: &ArithExpr<'_>,
    out: &mut String,
) -> EmitResult {
    match arith {
        ArithExpr::PreIncr(name) | ArithExpr::PostIncr(name) => {
            out.push_str(emitter.set_keyword());
            out.push_str(name);
            out.push_str(" (math \"$");
            out.push_str(name);
            out.push_str(" + 1\")");
            Ok(())
        }
        ArithExpr::PreDecr(name) | ArithExpr::PostDecr(name) => {
            out.push_str(emitter.set_keyword());
            out.push_str(name);
            out.push_str(" (math \"$");
            out.push_str(name);
            out.push_str(" - 1\")");
            Ok(())
        }
        ArithExpr::Assign(op, name, rhs) => {
            if contains_mutation(rhs) {
                return unsupported("nested arithmetic assignment");
            }
            out.push_str(emitter.set_keyword());
            out.push_str(name);
            out.push_str(" (math \"");
            match op {
                AssignOp::Set => expr(rhs, out),
                _ => {
                    // Desugar `x op= e` into `$x op (e)`.
                    out.push('$');
                    out.push_str(name);
                    out.push_str(match op {
                        AssignOp::Add => " + ",
                        AssignOp::Sub => " - ",
                        AssignOp::Mul => " * ",
                        AssignOp::Div => " / ",
                        AssignOp::Rem => " % ",
                        AssignOp::Xor => return unsupported("^= assignment"),
                        AssignOp::And => return unsupported("&= assignment"),
                        AssignOp::Or => return unsupported("|= assignment"),
                        AssignOp::Shl => " * 2 ^ ",
                        AssignOp::Shr => " / 2 ^ ",
                        AssignOp::Set => unreachable!(),
                    });
                    out.push('(');
                    expr(rhs, out);
                    out.push(')');
                }
            }
            out.push_str("\")");
            Ok(())
        }
        ArithExpr::Group(inner) => standalone(emitter, inner, out),
        _ if is_condition(arith) => condition(arith, out),
        _ => unsupported("standalone arithmetic expression"),
    }
}

/// Emit `$((expr))` in a word context.
impl Emitter {
    pub(crate) fn arith_subst(
        &mut self,
        arith: Option<&ArithExpr<'_>>,
        out: &mut String,
    ) -> EmitResult {
        let Some(arith) = arith else {
            out.push_str("(math 0)");
            return Ok(());
        };
        if contains_mutation(arith) {
            return unsupported("increment or assignment inside arithmetic expansion");
        }
        if is_condition(arith) {
            return as_value_command(arith, out);
        }
        out.push_str("(math \"");
        expr(arith, out);
        out.push_str("\")");
        Ok(())
    }
}

/// Render an arithmetic value expression for fish `math`.
pub(crate) fn expr(arith: &ArithExpr<'_>, out: &mut String) {
    match arith {
        ArithExpr::Literal(n) => out.push_str(&n.to_string()),
        ArithExpr::Var(name) => {
            if name.as_bytes().first().map(u8::is_ascii_digit).unwrap_or(false) {
                out.push_str("$argv[");
                out.push_str(name);
                out.push(']');
            } else {
                out.push('$');
                out.push_str(name);
            }
        }
        ArithExpr::Group(inner) => {
            out.push('(');
            expr(inner, out);
            out.push(')');
        }
        ArithExpr::Unary(op, operand) => {
            match op {
                UnaryOp::Plus => out.push('+'),
                UnaryOp::Minus => out.push('-'),
                UnaryOp::LogNot => out.push('!'),
                UnaryOp::BitNot => {
                    // No ~ in fish math; flip bits with xor -1.
                    out.push_str("bitxor(");
                    expr(operand, out);
                    out.push_str(", -1)");
                    return;
                }
            }
            expr(operand, out);
        }
        ArithExpr::Binary(op, l, r) => binary(*op, l, r, out),
        ArithExpr::Ternary(c, t, f) => {
            out.push('(');
            expr(c, out);
            out.push_str(" ? ");
            expr(t, out);
            out.push_str(" : ");
            expr(f, out);
            out.push(')');
        }
        // Mutations are screened out by the callers; render the value.
        ArithExpr::PreIncr(name) | ArithExpr::PostIncr(name) => {
            out.push_str("($");
            out.push_str(name);
            out.push_str(" + 1)");
        }
        ArithExpr::PreDecr(name) | ArithExpr::PostDecr(name) => {
            out.push_str("($");
            out.push_str(name);
            out.push_str(" - 1)");
        }
        ArithExpr::Assign(_, name, _) => {
            out.push('$');
            out.push_str(name);
        }
    }
}

fn binary(op: BinaryOp, l: &ArithExpr<'_>, r: &ArithExpr<'_>, out: &mut String) {
    match op {
        BinaryOp::Div => {
            // Bash truncates integer division; fish math returns floats.
            // floor() matches for the non-negative quotients that occur
            // in interactive use.
            out.push_str("floor(");
            expr(l, out);
            out.push_str(" / ");
            expr(r, out);
            out.push(')');
            return;
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            out.push_str(match op {
                BinaryOp::BitAnd => "bitand(",
                BinaryOp::BitOr => "bitor(",
                _ => "bitxor(",
            });
            expr(l, out);
            out.push_str(", ");
            expr(r, out);
            out.push(')');
            return;
        }
        BinaryOp::Shl => {
            out.push('(');
            expr(l, out);
            out.push_str(" * 2 ^ ");
            expr(r, out);
            out.push(')');
            return;
        }
        BinaryOp::Shr => {
            out.push_str("floor(");
            expr(l, out);
            out.push_str(" / 2 ^ ");
            expr(r, out);
            out.push(')');
            return;
        }
        _ => {}
    }

    let infix = match op {
        BinaryOp::Add => " + ",
        BinaryOp::Sub => " - ",
        BinaryOp::Mul => " * ",
        BinaryOp::Rem => " % ",
        BinaryOp::Pow => " ^ ",
        BinaryOp::Lt => " < ",
        BinaryOp::Le => " <= ",
        BinaryOp::Gt => " > ",
        BinaryOp::Ge => " >= ",
        BinaryOp::Eq => " == ",
        BinaryOp::Ne => " != ",
        BinaryOp::LogAnd => " && ",
        BinaryOp::LogOr => " || ",
        _ => unreachable!("handled above"),
    };
    wrap_operand(op, l, out);
    out.push_str(infix);
    wrap_operand(op, r, out);
}

/// Parenthesize a binary operand when its operator binds looser than the
/// parent's, preserving the tree's evaluation order in the math string.
fn wrap_operand(parent: BinaryOp, arith: &ArithExpr<'_>, out: &mut String) {
    let needs_parens = match arith {
        ArithExpr::Binary(child, _, _) => print_prec(*child) < print_prec(parent),
        _ => false,
    };
    if needs_parens {
        out.push('(');
    }
    expr(arith, out);
    if needs_parens {
        out.push(')');
    }
}

fn print_prec(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::LogOr => 1,
        BinaryOp::LogAnd => 2,
        BinaryOp::BitOr => 3,
        BinaryOp::BitXor => 4,
        BinaryOp::BitAnd => 5,
        BinaryOp::Eq | BinaryOp::Ne => 7,
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 8,
        BinaryOp::Shl | BinaryOp::Shr => 9,
        BinaryOp::Add | BinaryOp::Sub => 10,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 11,
        BinaryOp::Pow => 13,
    }
}

/// Comparison or logic at the top: the expression is a truth value.
pub(crate) fn is_condition(arith: &ArithExpr<'_>) -> bool {
    matches!(
        arith,
        ArithExpr::Binary(
            BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::LogAnd
                | BinaryOp::LogOr,
            _,
            _
        ) | ArithExpr::Unary(UnaryOp::LogNot, _)
            | ArithExpr::Ternary(_, _, _)
    )
}

fn contains_mutation(arith: &ArithExpr<'_>) -> bool {
    match arith {
        ArithExpr::PreIncr(_)
        | ArithExpr::PostIncr(_)
        | ArithExpr::PreDecr(_)
        | ArithExpr::PostDecr(_)
        | ArithExpr::Assign(_, _, _) => true,
        ArithExpr::Binary(_, l, r) => contains_mutation(l) || contains_mutation(r),
        ArithExpr::Unary(_, e) | ArithExpr::Group(e) => contains_mutation(e),
        ArithExpr::Ternary(c, t, f) => {
            contains_mutation(c) || contains_mutation(t) || contains_mutation(f)
        }
        ArithExpr::Literal(_) | ArithExpr::Var(_) => false,
    }
}

/// Emit a truth-valued expression as a fish condition command.
pub(crate) fn condition(arith: &ArithExpr<'_>, out: &mut String) -> EmitResult {
    match arith {
        ArithExpr::Binary(BinaryOp::Lt, l, r) => compare(l, "-lt", r, out),
        ArithExpr::Binary(BinaryOp::Le, l, r) => compare(l, "-le", r, out),
        ArithExpr::Binary(BinaryOp::Gt, l, r) => compare(l, "-gt", r, out),
        ArithExpr::Binary(BinaryOp::Ge, l, r) => compare(l, "-ge", r, out),
        ArithExpr::Binary(BinaryOp::Eq, l, r) => compare(l, "-eq", r, out),
        ArithExpr::Binary(BinaryOp::Ne, l, r) => compare(l, "-ne", r, out),
        ArithExpr::Binary(BinaryOp::LogAnd, l, r) => {
            condition(l, out)?;
            out.push_str("; and ");
            condition(r, out)
        }
        ArithExpr::Binary(BinaryOp::LogOr, l, r) => {
            condition(l, out)?;
            out.push_str("; or ");
            condition(r, out)
        }
        ArithExpr::Unary(UnaryOp::LogNot, e) => {
            out.push_str("not ");
            condition(e, out)
        }
        ArithExpr::Group(inner) => condition(inner, out),
        _ => {
            out.push_str("test ");
            value(arith, out)?;
            out.push_str(" -ne 0");
            Ok(())
        }
    }
}

fn compare(l: &ArithExpr<'_>, op: &str, r: &ArithExpr<'_>, out: &mut String) -> EmitResult {
    out.push_str("test ");
    value(l, out)?;
    out.push(' ');
    out.push_str(op);
    out.push(' ');
    value(r, out)
}

/// A single value operand: plain for variables and literals, `(math ...)`
/// otherwise.
fn value(arith: &ArithExpr<'_>, out: &mut String) -> EmitResult {
    match arith {
        ArithExpr::Var(name) => {
            out.push('$');
            out.push_str(name);
            Ok(())
        }
        ArithExpr::Literal(n) => {
            out.push_str(&n.to_string());
            Ok(())
        }
        _ if is_condition(arith) => as_value_command(arith, out),
        _ => {
            out.push_str("(math \"");
            expr(arith, out);
            out.push_str("\")");
            Ok(())
        }
    }
}

/// A truth-valued expression used where a value is needed: echo 1/0.
fn as_value_command(arith: &ArithExpr<'_>, out: &mut String) -> EmitResult {
    if let ArithExpr::Ternary(c, t, f) = arith {
        out.push_str("(if ");
        condition(c, out)?;
        out.push_str("; echo ");
        value(t, out)?;
        out.push_str("; else; echo ");
        value(f, out)?;
        out.push_str("; end)");
        return Ok(());
    }
    out.push('(');
    condition(arith, out)?;
    out.push_str("; and echo 1; or echo 0)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::emit::translate;

    fn t(input: &str) -> String {
        translate(input).unwrap()
    }

    #[test]
    fn simple_math() {
        assert_eq!(t("echo $((2 + 3 * 4))"), "echo (math \"2 + 3 * 4\")");
    }

    #[test]
    fn division_floors() {
        assert_eq!(t("echo $((7 / 2))"), "echo (math \"floor(7 / 2)\")");
    }

    #[test]
    fn power_operator() {
        assert_eq!(t("echo $((2 ** 8))"), "echo (math \"2 ^ 8\")");
    }

    #[test]
    fn shifts() {
        assert_eq!(t("echo $((1 << 4))"), "echo (math \"(1 * 2 ^ 4)\")");
        assert_eq!(t("echo $((16 >> 2))"), "echo (math \"floor(16 / 2 ^ 2)\")");
    }

    #[test]
    fn bitwise_functions() {
        assert_eq!(t("echo $((5 & 3))"), "echo (math \"bitand(5, 3)\")");
        assert_eq!(t("echo $((5 | 3))"), "echo (math \"bitor(5, 3)\")");
        assert_eq!(t("echo $((5 ^ 3))"), "echo (math \"bitxor(5, 3)\")");
    }

    #[test]
    fn variables_in_math() {
        assert_eq!(t("echo $((x + 1))"), "echo (math \"$x + 1\")");
        assert_eq!(t("echo $(($x + 1))"), "echo (math \"$x + 1\")");
    }

    #[test]
    fn standalone_increment() {
        assert_eq!(t("(( i++ ))"), "set i (math \"$i + 1\")");
        assert_eq!(t("(( --n ))"), "set n (math \"$n - 1\")");
    }

    #[test]
    fn standalone_assignment() {
        assert_eq!(t("(( x = 5 + 3 ))"), "set x (math \"5 + 3\")");
        assert_eq!(t("(( x += 2 ))"), "set x (math \"$x + (2)\")");
    }

    #[test]
    fn standalone_comparison() {
        assert_eq!(t("(( x > 3 ))"), "test $x -gt 3");
        assert_eq!(t("(( x && y ))"), "test $x -ne 0; and test $y -ne 0");
    }

    #[test]
    fn comparison_in_expansion() {
        assert_eq!(
            t("echo $((x > 3))"),
            "echo (test $x -gt 3; and echo 1; or echo 0)"
        );
    }

    #[test]
    fn ternary_in_expansion() {
        assert_eq!(
            t("echo $((x > 0 ? 1 : 2))"),
            "echo (if test $x -gt 0; echo 1; else; echo 2; end)"
        );
    }

    #[test]
    fn increment_in_expansion_refused() {
        assert!(translate("echo $((i++))").is_err());
    }

    #[test]
    fn grouping_preserved() {
        assert_eq!(t("echo $(((2 + 3) * 4))"), "echo (math \"(2 + 3) * 4\")");
    }

    #[test]
    fn empty_arith() {
        assert_eq!(t("echo $(( ))"), "echo (math 0)");
    }
}
