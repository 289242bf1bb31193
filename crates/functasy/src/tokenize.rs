//! Tokenizer.
//!
//! Splits source text into parentheses and identifier tokens. The width of an
//! identifier token depends on the current nesting depth (see [`crate::idents`]),
//! so tokenizing is stateful: the same digit sequence is one token at depth 5
//! and two at depth 70. Digits of one identifier may be separated by
//! whitespace but not by any other character.

use std::fmt;

use crate::idents;

/// Characters skipped between tokens. NEL/NBSP included for parity with the
/// historical implementation.
const WHITESPACE: [char; 7] = [
    '\u{09}', '\u{0A}', '\u{0B}', '\u{0C}', '\u{0D}', '\u{20}', '\u{A0}',
];

/// A single source token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Open,
    Close,
    /// Identifier `id`, read at nesting depth `depth`. `id < depth` always.
    Ident { id: u32, depth: u32 },
}

/// A fatal scanning or parsing error with caret framing.
///
/// `line` is the source line containing the error and `column` the 0-based
/// offset of the caret within it. The caret points at the last character
/// consumed before the failure was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub line: String,
    pub column: usize,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.line)?;
        writeln!(f, "{}^", " ".repeat(self.column))?;
        writeln!(f)?;
        write!(f, "SyntaxError: {}", self.message)
    }
}

impl std::error::Error for SyntaxError {}

fn is_whitespace(c: char) -> bool {
    WHITESPACE.contains(&c)
}

fn is_line_break(c: char) -> bool {
    c == '\n' || c == '\r'
}

/// Scanner state. Tracks the current line and the position within it so
/// errors can be reported with a caret.
struct Scanner {
    chars: Vec<char>,
    pos: usize,
    depth: u32,
    line: String,
    column: usize,
}

impl Scanner {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            depth: 0,
            line: String::new(),
            column: 0,
        }
    }

    /// Consumes one character, updating the line buffer.
    fn advance(&mut self) -> char {
        let c = self.chars[self.pos];
        self.pos += 1;
        if is_line_break(c) {
            self.line.clear();
            self.column = 0;
        } else {
            self.line.push(c);
            self.column += 1;
        }
        c
    }

    /// Builds a `SyntaxError` at the current position. The caret is moved back
    /// onto the last consumed character and the line buffer is extended to the
    /// next line break so the whole offending line is shown.
    fn error(&mut self, message: &str) -> SyntaxError {
        let mut column = self.column;
        if column != 0 {
            column -= 1;
            for &c in &self.chars[self.pos..] {
                if is_line_break(c) {
                    break;
                }
                self.line.push(c);
            }
        }
        SyntaxError {
            message: message.to_owned(),
            line: self.line.clone(),
            column,
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, SyntaxError> {
        while self.pos != self.chars.len() {
            let c = self.advance();

            if is_whitespace(c) {
                continue;
            }

            if c == '(' {
                self.depth += 1;
                return Ok(Some(Token::Open));
            }

            if c == ')' {
                if self.depth == 0 {
                    return Err(self.error("Unmatched parenthese"));
                }
                self.depth -= 1;
                return Ok(Some(Token::Close));
            }

            if idents::digit(c as u8).is_some() && c.is_ascii() {
                return self.ident_token(c).map(Some);
            }

            return Err(self.error("Illegal token"));
        }

        if self.depth != 0 {
            return Err(self.error("Unexpected end of input"));
        }

        Ok(None)
    }

    /// Scans the remaining digits of an identifier whose first digit has
    /// already been consumed. The token is exactly `width_for_depth(depth)`
    /// digits wide, fewer if a non-digit or end of input cuts it short.
    ///
    /// Lookahead state is committed only on success, so an out-of-range error
    /// puts the caret on the first digit of the identifier.
    fn ident_token(&mut self, first: char) -> Result<Token, SyntaxError> {
        let width = idents::width_for_depth(self.depth);
        let mut digits = vec![first as u8];

        let saved = (self.pos, self.column, self.line.clone());

        while digits.len() < width && self.pos != self.chars.len() {
            let c = self.chars[self.pos];
            if !is_whitespace(c) && !(c.is_ascii() && idents::digit(c as u8).is_some()) {
                break;
            }
            self.advance();
            if is_whitespace(c) {
                continue;
            }
            digits.push(c as u8);
        }

        let id = idents::decode(&digits);
        if id >= self.depth {
            (self.pos, self.column, self.line) = saved;
            return Err(self.error("This identifier cannot be used here"));
        }

        Ok(Token::Ident {
            id,
            depth: self.depth,
        })
    }
}

/// Tokenizes a whole source string.
pub fn tokenize(src: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut scanner = Scanner::new(src);
    let mut tokens = Vec::new();
    while let Some(token) = scanner.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(src: &str) -> SyntaxError {
        match tokenize(src) {
            Err(e) => e,
            Ok(tokens) => panic!("expected error for {src:?}, got {tokens:?}"),
        }
    }

    #[test]
    fn empty_source() {
        assert_eq!(tokenize("").unwrap(), vec![]);
        assert_eq!(tokenize(" \t\n").unwrap(), vec![]);
    }

    #[test]
    fn parens_and_idents() {
        assert_eq!(
            tokenize("(0)").unwrap(),
            vec![Token::Open, Token::Ident { id: 0, depth: 1 }, Token::Close],
        );
        assert_eq!(
            tokenize("((10))").unwrap(),
            vec![
                Token::Open,
                Token::Open,
                Token::Ident { id: 1, depth: 2 },
                Token::Ident { id: 0, depth: 2 },
                Token::Close,
                Token::Close,
            ],
        );
    }

    #[test]
    fn ident_width_follows_depth() {
        // 63 nested functions: identifiers become two digits wide.
        let mut src = "(".repeat(63);
        src.push_str("10");
        src.push_str(&")".repeat(63));
        let tokens = tokenize(&src).unwrap();
        assert_eq!(tokens[63], Token::Ident { id: 62, depth: 63 });
    }

    #[test]
    fn digits_may_be_split_by_whitespace() {
        let mut src = "(".repeat(63);
        src.push_str("1 \n 0");
        src.push_str(&")".repeat(63));
        let tokens = tokenize(&src).unwrap();
        assert_eq!(tokens[63], Token::Ident { id: 62, depth: 63 });
    }

    // === Error positions ===

    #[test]
    fn unterminated_open() {
        let e = err("(");
        assert_eq!(e.message, "Unexpected end of input");
        assert_eq!((e.line.as_str(), e.column), ("(", 0));
    }

    #[test]
    fn unmatched_close() {
        let e = err(")");
        assert_eq!(e.message, "Unmatched parenthese");
        assert_eq!((e.line.as_str(), e.column), (")", 0));

        let e = err(")(");
        assert_eq!(e.message, "Unmatched parenthese");
        assert_eq!((e.line.as_str(), e.column), (")(", 0));
    }

    #[test]
    fn ident_out_of_range() {
        let e = err("(1)");
        assert_eq!(e.message, "This identifier cannot be used here");
        assert_eq!((e.line.as_str(), e.column), ("(1)", 1));

        // Depth 0 admits no identifiers at all.
        let e = err("0");
        assert_eq!(e.message, "This identifier cannot be used here");
        assert_eq!((e.line.as_str(), e.column), ("0", 0));
    }

    #[test]
    fn illegal_character() {
        let e = err("~");
        assert_eq!(e.message, "Illegal token");
        assert_eq!((e.line.as_str(), e.column), ("~", 0));
    }

    #[test]
    fn caret_on_correct_line() {
        let e = err("()\n(2)\n()");
        assert_eq!(e.line, "(2)");
        assert_eq!(e.column, 1);
    }

    #[test]
    fn display_framing() {
        let e = err("(1)");
        assert_eq!(
            e.to_string(),
            "(1)\n ^\n\nSyntaxError: This identifier cannot be used here",
        );
    }
}
