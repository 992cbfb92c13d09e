//! Alias and variable expansion of command words.

use crate::context::ExecutionContext;
use crate::lexer::{self, WORD_DELIMITERS};
use crate::list::OrderedList;
use regex::Regex;
use std::process;
use std::sync::OnceLock;

/// Upper bound on alias rewrites of one command, so self-referencing aliases terminate.
const MAX_ALIAS_ROUNDS: usize = 10;

/// Rewrites the words of a populated command.
pub trait Expand {
    fn expand(&self, ctx: &ExecutionContext, argv: &mut Vec<String>);
}

/// Replaces a leading alias name with the words of its definition.
#[derive(Debug, Default, Clone, Copy)]
pub struct AliasExpander;

impl Expand for AliasExpander {
    fn expand(&self, ctx: &ExecutionContext, argv: &mut Vec<String>) {
        for _ in 0..MAX_ALIAS_ROUNDS {
            let Some(name) = argv.first() else {
                return;
            };
            let Some(value) = alias_value(&ctx.alias, name) else {
                return;
            };
            let rest = argv.split_off(1);
            *argv = lexer::tokenize(value, WORD_DELIMITERS).unwrap_or_default();
            argv.extend(rest);
        }
    }
}

/// Definition of alias `name`, without the quotes it was stored with.
pub fn alias_value<'a>(aliases: &'a OrderedList, name: &str) -> Option<&'a str> {
    let text = aliases.find_prefixed(name, Some('='))?.text()?;
    let value = &text[name.len() + 1..];
    Some(
        value
            .strip_prefix('\'')
            .and_then(|v| v.strip_suffix('\''))
            .unwrap_or(value),
    )
}

/// Substitutes `$?`, `$$` and `$NAME` words.
///
/// Only words made of exactly one reference are rewritten; an unset variable expands
/// to the empty string.
#[derive(Debug, Default, Clone, Copy)]
pub struct VarExpander;

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\$([A-Za-z_][A-Za-z0-9_]*)$").expect("variable pattern is valid")
    })
}

impl Expand for VarExpander {
    fn expand(&self, ctx: &ExecutionContext, argv: &mut Vec<String>) {
        for word in argv.iter_mut() {
            let replacement = match word.as_str() {
                "$?" => ctx.status().to_string(),
                "$$" => process::id().to_string(),
                other => match variable_pattern().captures(other) {
                    Some(caps) => ctx.getenv(&caps[1]).unwrap_or_default().to_string(),
                    None => continue,
                },
            };
            *word = replacement;
        }
    }
}
