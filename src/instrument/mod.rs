#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Rewrites grading calls in submitted code.
//!
//! A unit of source is scanned token by token. Calls of the form
//! `<instance>.check(<question>, ...)` become the capture form
//! `(grading_capture <instance> (<question>))`, which the engine evaluates
//! against the live scope and records. Administrative calls (`check_all`,
//! `export`, `to_pdf`) become `()`. The names involved are tracked in a
//! [`CheckCallState`] that the caller threads from one unit to the next.

/// Tokenizer for script source.
pub mod lexer;

use lexer::{Token, TokenKind, tokenize};

use crate::constants::{ADMIN_METHODS, CAPTURE_KEYWORD, CHECK_METHOD, GRADER_MODULE, GRADER_TYPE};

/// Names recognised so far in one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckCallState {
    /// Alias the grading module was imported under.
    pub grader_alias: Option<String>,
    /// Variable most recently bound to a grader instance.
    pub instance:     Option<String>,
}

/// Output of [`instrument`] for one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instrumented {
    /// Rewritten source.
    pub source:   String,
    /// Every import statement of the unit, terminated with `;`.
    pub imports:  Vec<String>,
    /// Number of check calls rewritten into captures.
    pub captured: usize,
    /// Number of administrative calls removed.
    pub removed:  usize,
}

/// Rewrites one unit of source, updating `state` as imports and grader
/// constructions are seen.
///
/// * `source`: the unit's source text
/// * `state`: recognition state carried over from earlier units
pub fn instrument(source: &str, state: &mut CheckCallState) -> Instrumented {
    let tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::warn!("Could not tokenize unit, leaving it unchanged: {e}");
            return Instrumented {
                source: source.to_string(),
                ..Instrumented::default()
            };
        }
    };

    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    let mut imports = Vec::new();
    let mut captured = 0;
    let mut removed = 0;

    let mut i = 0;
    while i < tokens.len() {
        if let Some(import) = import_at(source, &tokens, i) {
            if import.module == Some(GRADER_MODULE)
                && let Some(alias) = import.alias
            {
                state.grader_alias = Some(alias.to_string());
            }
            imports.push(import.statement);
            i += 1;
            continue;
        }

        if let Some(name) = grader_binding_at(&tokens, i, state) {
            tracing::debug!("Grader instance bound to `{name}`");
            state.instance = Some(name.to_string());
            i += 1;
            continue;
        }

        if let Some(call) = instance_call_at(&tokens, i, state) {
            if call.method == CHECK_METHOD {
                if let Some((first, last)) = call.first_argument {
                    let question = &source[tokens[first].start..tokens[last].end()];
                    edits.push((
                        tokens[i].start,
                        tokens[call.close].end(),
                        format!("({CAPTURE_KEYWORD} {} ({question}))", tokens[i].text),
                    ));
                    captured += 1;
                    i = call.close + 1;
                    continue;
                }
            } else if ADMIN_METHODS.contains(&call.method) {
                edits.push((tokens[i].start, tokens[call.close].end(), "()".to_string()));
                removed += 1;
                i = call.close + 1;
                continue;
            }
        }

        i += 1;
    }

    Instrumented {
        source: apply_edits(source, &edits),
        imports,
        captured,
        removed,
    }
}

/// Returns every import statement in `source`, in order. Source that cannot
/// be tokenized has none.
pub fn collect_imports(source: &str) -> Vec<String> {
    let Ok(tokens) = tokenize(source) else {
        return Vec::new();
    };
    (0..tokens.len())
        .filter_map(|i| import_at(source, &tokens, i))
        .map(|import| import.statement)
        .collect()
}

/// An import statement found in a unit.
struct Import<'a> {
    /// Full statement text, always ending in `;`.
    statement: String,
    /// Module path when it is a plain string literal.
    module:    Option<&'a str>,
    /// Alias after `as`, if any.
    alias:     Option<&'a str>,
}

/// Recognises `import <expr> [as <alias>] ;` starting at token `i`.
fn import_at<'a>(source: &'a str, tokens: &[Token<'a>], i: usize) -> Option<Import<'a>> {
    if !tokens[i].is_ident("import") {
        return None;
    }
    if i > 0 && (tokens[i - 1].is_punct(".") || tokens[i - 1].is_punct("::")) {
        return None;
    }

    let module = tokens.get(i + 1).and_then(Token::string_value);
    let terminator = tokens[i + 1..].iter().position(|t| t.is_punct(";"));
    let end_index = terminator.map_or(tokens.len() - 1, |offset| i + 1 + offset);

    let alias = tokens[i + 1..=end_index]
        .windows(2)
        .find(|pair| pair[0].is_ident("as") && pair[1].kind == TokenKind::Ident)
        .map(|pair| pair[1].text);

    let mut statement = source[tokens[i].start..tokens[end_index].end()].to_string();
    if terminator.is_none() {
        statement.push(';');
    }

    Some(Import {
        statement,
        module,
        alias,
    })
}

/// Recognises `let N = A::Notebook(`, `const N = A::Notebook(` or
/// `N = A::Notebook(` at token `i`, where `A` is the tracked alias.
fn grader_binding_at<'a>(
    tokens: &[Token<'a>],
    i: usize,
    state: &CheckCallState,
) -> Option<&'a str> {
    let alias = state.grader_alias.as_deref()?;

    let (name_index, declared) = if tokens[i].is_ident("let") || tokens[i].is_ident("const") {
        (i + 1, true)
    } else {
        (i, false)
    };

    let name = tokens.get(name_index)?;
    if name.kind != TokenKind::Ident {
        return None;
    }
    if !declared
        && i > 0
        && (tokens[i - 1].is_punct(".")
            || tokens[i - 1].is_punct("::")
            || tokens[i - 1].is_ident("let")
            || tokens[i - 1].is_ident("const"))
    {
        return None;
    }

    let rest = tokens.get(name_index + 1..name_index + 6)?;
    let constructs = rest[0].is_punct("=")
        && rest[1].is_ident(alias)
        && rest[2].is_punct("::")
        && rest[3].is_ident(GRADER_TYPE)
        && rest[4].is_punct("(");

    constructs.then_some(name.text)
}

/// A method call on the tracked grader instance.
struct InstanceCall<'a> {
    /// Method name.
    method:         &'a str,
    /// Token range of the first argument, if there is one.
    first_argument: Option<(usize, usize)>,
    /// Index of the closing parenthesis.
    close:          usize,
}

/// Recognises `<instance>.<method>(...)` at token `i`.
fn instance_call_at<'a>(
    tokens: &[Token<'a>],
    i: usize,
    state: &CheckCallState,
) -> Option<InstanceCall<'a>> {
    let instance = state.instance.as_deref()?;
    if !tokens[i].is_ident(instance) {
        return None;
    }
    if i > 0 && (tokens[i - 1].is_punct(".") || tokens[i - 1].is_punct("::")) {
        return None;
    }

    let [dot, method, open] = tokens.get(i + 1..i + 4)? else {
        return None;
    };
    if !dot.is_punct(".") || method.kind != TokenKind::Ident || !open.is_punct("(") {
        return None;
    }

    let open_index = i + 3;
    let mut depth = 0usize;
    let mut first_end = None;
    let mut close = None;
    for (offset, token) in tokens[open_index..].iter().enumerate() {
        let index = open_index + offset;
        match token.text {
            "(" | "[" | "{" if token.kind == TokenKind::Punct => depth += 1,
            ")" | "]" | "}" if token.kind == TokenKind::Punct => {
                depth -= 1;
                if depth == 0 {
                    close = Some(index);
                    break;
                }
            }
            "," if token.kind == TokenKind::Punct && depth == 1 && first_end.is_none() => {
                first_end = Some(index - 1);
            }
            _ => {}
        }
    }
    let close = close?;

    let first_start = open_index + 1;
    let first_end = first_end.unwrap_or(close - 1);
    let first_argument = (first_start <= first_end).then_some((first_start, first_end));

    Some(InstanceCall {
        method: method.text,
        first_argument,
        close,
    })
}

/// Replaces the given non-overlapping, ordered byte ranges.
fn apply_edits(source: &str, edits: &[(usize, usize, String)]) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for (start, end, replacement) in edits {
        out.push_str(&source[cursor..*start]);
        out.push_str(replacement);
        cursor = *end;
    }
    out.push_str(&source[cursor..]);
    out
}
