//! Parameter expansion emission.
//!
//! Maps each `${...}` operator onto fish `set -q` tests, `string`
//! builtins, and `math`. Pattern operators convert bash globs to the
//! regex flavor `string replace -r` expects.

use crate::ast::types::*;
use crate::emit::word::{
    emit_word_as_regex, param_name, param_value, word_as_str, word_has_glob,
};
use crate::emit::{unsupported, EmitResult, Emitter};

impl Emitter {
    pub(crate) fn expansion(&mut self, pe: &ParamExpansion<'_>, out: &mut String) -> EmitResult {
        let param = &pe.param;
        match &pe.op {
            ParamOp::Plain => {
                crate::emit::word::check_untranslatable(param)?;
                param_value(param, out);
                Ok(())
            }

            ParamOp::Length => {
                out.push_str("(string length -- \"");
                param_value(param, out);
                out.push_str("\")");
                Ok(())
            }

            ParamOp::Default(word, _colon) => {
                out.push_str("(set -q ");
                param_name(param, out);
                out.push_str("; and echo $");
                param_name(param, out);
                out.push_str("; or echo ");
                if let Some(w) = word {
                    self.word(w, out)?;
                }
                out.push(')');
                Ok(())
            }

            ParamOp::AssignDefault(word, _colon) => {
                out.push_str("(set -q ");
                param_name(param, out);
                out.push_str("; or set ");
                param_name(param, out);
                out.push(' ');
                if let Some(w) = word {
                    self.word(w, out)?;
                }
                out.push_str("; echo $");
                param_name(param, out);
                out.push(')');
                Ok(())
            }

            ParamOp::ErrorIfUnset(word, _colon) => {
                out.push_str("(set -q ");
                param_name(param, out);
                out.push_str("; and echo $");
                param_name(param, out);
                out.push_str("; or begin; echo ");
                if let Some(w) = word {
                    self.word(w, out)?;
                } else {
                    out.push_str("'parameter ");
                    param_name(param, out);
                    out.push_str(" not set'");
                }
                out.push_str(" >&2; return 1; end)");
                Ok(())
            }

            ParamOp::AlternateValue(word, _colon) => {
                out.push_str("(set -q ");
                param_name(param, out);
                out.push_str("; and echo ");
                if let Some(w) = word {
                    self.word(w, out)?;
                }
                out.push(')');
                Ok(())
            }

            ParamOp::StripPrefixShort(pattern) => {
                self.strip_op(param, pattern.as_ref(), false, false, out)
            }
            ParamOp::StripPrefixLong(pattern) => {
                self.strip_op(param, pattern.as_ref(), false, true, out)
            }
            ParamOp::StripSuffixShort(pattern) => {
                self.strip_op(param, pattern.as_ref(), true, false, out)
            }
            ParamOp::StripSuffixLong(pattern) => {
                self.strip_op(param, pattern.as_ref(), true, true, out)
            }

            ParamOp::SubstituteFirst(pattern, replacement) => {
                self.replace_op(param, pattern.as_ref(), replacement.as_ref(), false, false, false, out)
            }
            ParamOp::SubstituteAll(pattern, replacement) => {
                self.replace_op(param, pattern.as_ref(), replacement.as_ref(), true, false, false, out)
            }
            ParamOp::SubstitutePrefix(pattern, replacement) => {
                self.replace_op(param, pattern.as_ref(), replacement.as_ref(), false, true, false, out)
            }
            ParamOp::SubstituteSuffix(pattern, replacement) => {
                self.replace_op(param, pattern.as_ref(), replacement.as_ref(), false, false, true, out)
            }

            ParamOp::UpperAll => {
                out.push_str("(string upper -- \"");
                param_value(param, out);
                out.push_str("\")");
                Ok(())
            }
            ParamOp::LowerAll => {
                out.push_str("(string lower -- \"");
                param_value(param, out);
                out.push_str("\")");
                Ok(())
            }
            ParamOp::UpperFirst => self.case_first(param, "upper", out),
            ParamOp::LowerFirst => self.case_first(param, "lower", out),

            ParamOp::Substring(offset, length) => {
                // fish string sub is 1-based; negative offsets count from
                // the end in both shells and pass through unchanged.
                out.push_str("(string sub -s ");
                match offset.trim().parse::<i64>() {
                    Ok(n) if n < 0 => out.push_str(&n.to_string()),
                    Ok(n) => out.push_str(&(n + 1).to_string()),
                    Err(_) => {
                        out.push_str("(math \"");
                        out.push_str(offset.trim());
                        out.push_str(" + 1\")");
                    }
                }
                if let Some(length) = length {
                    out.push_str(" -l ");
                    match length.trim().parse::<i64>() {
                        Ok(n) => out.push_str(&n.to_string()),
                        Err(_) => {
                            out.push_str("(math \"");
                            out.push_str(length.trim());
                            out.push_str("\")");
                        }
                    }
                }
                out.push_str(" -- \"");
                param_value(param, out);
                out.push_str("\")");
                Ok(())
            }

            ParamOp::Indirect => {
                let Param::Var(name) = param else {
                    return unsupported("indirect expansion of special parameter");
                };
                out.push_str("$$");
                out.push_str(name);
                Ok(())
            }

            ParamOp::NamesWithPrefix => {
                let Param::Var(prefix) = param else {
                    return unsupported("prefix listing of special parameter");
                };
                out.push_str("(set -n | string match '");
                out.push_str(prefix);
                out.push_str("*')");
                Ok(())
            }

            ParamOp::QuotedExpansion => {
                out.push_str("(string escape -- $");
                param_name(param, out);
                out.push(')');
                Ok(())
            }

            ParamOp::ArrayLength => {
                out.push_str("(count $");
                param_name(param, out);
                out.push(')');
                Ok(())
            }

            ParamOp::ArrayAll => {
                match param {
                    Param::Var("PIPESTATUS") => out.push_str("$pipestatus"),
                    Param::Var("BASH_REMATCH") => out.push_str("$__bash_rematch"),
                    _ => {
                        out.push('$');
                        param_name(param, out);
                    }
                }
                Ok(())
            }

            ParamOp::ArrayElement(index) => {
                match param {
                    Param::Var("BASH_REMATCH") => out.push_str("$__bash_rematch"),
                    Param::Var("PIPESTATUS") => out.push_str("$pipestatus"),
                    _ => {
                        out.push('$');
                        param_name(param, out);
                    }
                }
                out.push('[');
                array_index(self, index, out)?;
                out.push(']');
                Ok(())
            }

            ParamOp::ArraySlice(offset, length) => {
                // ${a[@]:o:l} -> $a[(math "o + 1")..(math "o + l")]
                out.push('$');
                param_name(param, out);
                out.push_str("[(math \"");
                out.push_str(offset.trim());
                out.push_str(" + 1\")..(math \"");
                match length {
                    Some(length) => {
                        out.push_str(offset.trim());
                        out.push_str(" + ");
                        out.push_str(length.trim());
                    }
                    None => {
                        out.push_str("(count $");
                        param_name(param, out);
                        out.push(')');
                    }
                }
                out.push_str("\")]");
                Ok(())
            }
        }
    }

    /// `${var^}` / `${var,}`: fold the first character only.
    fn case_first(&mut self, param: &Param<'_>, dir: &str, out: &mut String) -> EmitResult {
        out.push_str("(string sub -l 1 -- $");
        param_name(param, out);
        out.push_str(" | string ");
        out.push_str(dir);
        out.push_str(")(string sub -s 2 -- $");
        param_name(param, out);
        out.push(')');
        Ok(())
    }

    /// `${var#pat}` family via `string replace -r`.
    ///
    /// Shortest-suffix uses `^(.*)pat$` -> `$1`: the greedy capture keeps
    /// the longest prefix, which leaves the shortest suffix removed.
    fn strip_op(
        &mut self,
        param: &Param<'_>,
        pattern: Option<&Word<'_>>,
        suffix: bool,
        longest: bool,
        out: &mut String,
    ) -> EmitResult {
        let suffix_shortest = suffix && !longest;

        out.push_str("(string replace -r -- '");
        if suffix_shortest {
            out.push_str("^(.*)");
        } else if !suffix {
            out.push('^');
        }
        if let Some(pattern) = pattern {
            let star_greedy = if suffix_shortest { true } else { longest };
            emit_word_as_regex(self, pattern, star_greedy, out)?;
        }
        if suffix {
            out.push('$');
        }
        if suffix_shortest {
            out.push_str("' '$1' $");
        } else {
            out.push_str("' '' $");
        }
        param_name(param, out);
        out.push(')');
        Ok(())
    }

    /// `${var/pat/rep}` family via `string replace`.
    #[allow(clippy::too_many_arguments)]
    fn replace_op(
        &mut self,
        param: &Param<'_>,
        pattern: Option<&Word<'_>>,
        replacement: Option<&Word<'_>>,
        all: bool,
        prefix: bool,
        suffix: bool,
        out: &mut String,
    ) -> EmitResult {
        let needs_regex = prefix || suffix || pattern.map(word_has_glob).unwrap_or(false);

        out.push_str("(string replace ");
        if needs_regex {
            out.push_str("-r ");
        }
        if all {
            out.push_str("-a ");
        }
        out.push_str("-- '");
        if prefix {
            out.push('^');
        }
        if let Some(pattern) = pattern {
            if needs_regex {
                emit_word_as_regex(self, pattern, true, out)?;
            } else {
                self.word_unquoted(pattern, out)?;
            }
        }
        if suffix {
            out.push('$');
        }
        out.push_str("' '");
        if let Some(replacement) = replacement {
            self.word_unquoted(replacement, out)?;
        }
        out.push_str("' \"$");
        param_name(param, out);
        out.push_str("\")");
        Ok(())
    }
}

/// A bash 0-based array index as a fish 1-based index: literals shift at
/// translation time, everything else goes through `math`.
pub(crate) fn array_index(
    emitter: &mut Emitter,
    index: &Word<'_>,
    out: &mut String,
) -> EmitResult {
    if let Some(text) = word_as_str(index) {
        if let Ok(n) = text.trim().parse::<i64>() {
            out.push_str(&(n + 1).to_string());
            return Ok(());
        }
    }
    if let [crate::ast::types::Fragment::ArithSubst(Some(expr))] = index.fragments.as_slice() {
        out.push_str("(math \"");
        crate::emit::arith::expr(expr, out);
        out.push_str(" + 1\")");
        return Ok(());
    }
    out.push_str("(math \"");
    emitter.word(index, out)?;
    out.push_str(" + 1\")");
    Ok(())
}
