//! Ingestion adapters
//!
//! Users and automated peers both type command lines, but they are tokenized
//! by different rules: users get the interactive splitter (quote grouping
//! only), peers get full POSIX shell quoting. Both produce an [`Invocation`]
//! so the handlers cannot tell the two apart.

use thiserror::Error;

/// A command name and its positional arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub name: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Command \"{0}\" is not found")]
    UnknownCommand(String),

    #[error("Unbalanced quotes in command")]
    UnbalancedQuotes,

    #[error("{0} is a required argument that is missing.")]
    MissingArgument(&'static str),
}

/// Text after the prefix, when the line invokes a command
///
/// The command name must follow the prefix directly: `$ ssa` and a bare `$`
/// are not commands.
fn command_body<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let body = text.trim_start().strip_prefix(prefix)?;
    match body.chars().next() {
        Some(c) if !c.is_whitespace() => Some(body),
        _ => None,
    }
}

/// Interactive path: `None` when the text is not a command at all
pub fn parse_interactive(text: &str, prefix: &str) -> Option<Result<Invocation, ParseError>> {
    let body = command_body(text, prefix)?;

    let mut words = match split_words(body) {
        Ok(words) => words,
        Err(e) => return Some(Err(e)),
    };
    if words.is_empty() {
        return None;
    }

    let name = words.remove(0);
    Some(Ok(Invocation::new(name, words)))
}

/// Raw-text path: `None` when the text is not a command at all
pub fn parse_raw(text: &str, prefix: &str) -> Option<Result<Invocation, ParseError>> {
    command_body(text, prefix)?;

    let mut tokens = match shlex::split(text) {
        Some(tokens) => tokens,
        None => return Some(Err(ParseError::UnbalancedQuotes)),
    };
    if tokens.is_empty() {
        return None;
    }

    let first = tokens.remove(0);
    let name = first.strip_prefix(prefix).unwrap_or(&first).to_string();
    Some(Ok(Invocation::new(name, tokens)))
}

/// Whitespace split with single/double quote grouping and no escapes
fn split_words(text: &str) -> Result<Vec<String>, ParseError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in text.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err(ParseError::UnbalancedQuotes);
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
