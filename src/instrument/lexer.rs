#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! A token-level view of script source. Comments are dropped and every
//! literal is a single token, so nothing inside a string or comment is ever
//! mistaken for code.

/// Broad token classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifiers and keywords.
    Ident,
    /// String, character and backtick literals.
    Literal,
    /// Numeric literals.
    Number,
    /// Operators and delimiters.
    Punct,
}

/// One token with its position in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// Token class.
    pub kind:  TokenKind,
    /// Exact source text.
    pub text:  &'a str,
    /// Byte offset of the first character.
    pub start: usize,
}

impl<'a> Token<'a> {
    /// Byte offset just past the last character.
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    /// Returns true if this is the punctuation `p`.
    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }

    /// Returns true if this is the identifier or keyword `name`.
    pub fn is_ident(&self, name: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == name
    }

    /// Contents of a double-quoted string literal without its quotes.
    pub fn string_value(&self) -> Option<&'a str> {
        if self.kind == TokenKind::Literal && self.text.len() >= 2 && self.text.starts_with('"') {
            Some(&self.text[1..self.text.len() - 1])
        } else {
            None
        }
    }
}

peg::parser! {
    /// Tokenizer for script source.
    grammar lexer() for str {
        /// whitespace characters
        rule whitespace() = quiet!{[' ' | '\n' | '\t' | '\r']+}

        /// `//` comments, including doc comments
        rule line_comment() = "//" (!['\n'] [_])*

        /// `/* */` comments, which nest
        rule block_comment() = "/*" (block_comment() / !"*/" [_])* "*/"

        /// anything between tokens
        rule trivia() = quiet!{(whitespace() / line_comment() / block_comment())*}

        /// characters after a backslash are taken literally
        rule escaped() = "\\" [_]

        /// double-quoted strings
        rule string() = "\"" (escaped() / !['"'] [_])* "\""

        /// character literals
        rule character() = "'" (escaped() / !['\''] [_])* "'"

        /// backtick strings, possibly multi-line
        rule backtick() = "`" (escaped() / !['`'] [_])* "`"

        /// literals of all kinds
        rule literal() -> Token<'input>
            = start:position!() text:$(string() / character() / backtick())
            { Token { kind: TokenKind::Literal, text, start } }

        /// identifiers and keywords
        rule ident() -> Token<'input>
            = start:position!()
              text:$(['a'..='z' | 'A'..='Z' | '_'] ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']*)
            { Token { kind: TokenKind::Ident, text, start } }

        /// integers, floats, hex and binary literals
        rule number() -> Token<'input>
            = start:position!()
              text:$(['0'..='9'] ['0'..='9' | 'a'..='z' | 'A'..='Z' | '_']*
                     ("." ['0'..='9'] ['0'..='9' | 'e' | 'E' | '_']*)?)
            { Token { kind: TokenKind::Number, text, start } }

        /// operators; an unterminated literal or comment is an error, not
        /// punctuation
        rule punct() -> Token<'input>
            = start:position!()
              text:$("::" / "==" / "!=" / "<=" / ">=" / "=>" / "+=" / "-=" / "*=" / "/="
                     / "..=" / ".." / "?." / "??"
                     / !(['"' | '\'' | '`'] / "/*") [_])
            { Token { kind: TokenKind::Punct, text, start } }

        /// one token with its position
        rule token() -> Token<'input>
            = literal() / ident() / number() / punct()

        /// every token in the source
        pub rule tokens() -> Vec<Token<'input>>
            = trivia() t:(token() ** trivia()) trivia() { t }
    }
}

/// Splits `source` into tokens, failing on unterminated literals and
/// comments.
pub fn tokenize(
    source: &str,
) -> Result<Vec<Token<'_>>, peg::error::ParseError<peg::str::LineCol>> {
    lexer::tokens(source)
}
