//! Tokenizing AVR assembly.
//!
//! This module holds the tokens that characterize AVR assembly ([`Token`]).
//! This module is used by [`crate::parse::tokenize`] to split each line
//! of source code into tokens.
//!
//! Lexical rules are tried as one `logos` automaton.
//! A strictly longer match always wins, and matches of equal length
//! are decided by each rule's priority. In order of priority, this means:
//! - `lo8`/`hi8` beat references,
//! - register, pointer, and mnemonic-shaped words beat references,
//! - and references are the fallback for any other identifier.
//!
//! Mnemonic-shaped words are only classified provisionally.
//! See [`crate::parse::repair_line`] for how they are reclassified.

use std::borrow::Cow;
use std::num::IntErrorKind;

use logos::{Lexer, Logos};

use crate::ast::Pointer;

/// A unit of information in AVR assembly source code.
#[derive(Debug, Logos, PartialEq, Eq, Clone)]
#[logos(skip r"[ \t\r\f]+|;[^\n]*", error = LexErrKind)]
pub enum Token {
    /// A label definition (e.g., `main:`). The colon is not included in the value.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*:", |lx| lx.slice().trim_end_matches(':').to_string())]
    Label(String),

    /// The `lo8` pseudo-operator (as in `lo8(table)`).
    #[token("lo8", priority = 10)]
    #[token("LO8", priority = 10)]
    Lo8,

    /// The `hi8` pseudo-operator (as in `hi8(table)`).
    #[token("hi8", priority = 10)]
    #[token("HI8", priority = 10)]
    Hi8,

    /// A register, holding its index (e.g., `R16` is `Reg(16)`).
    ///
    /// This is not range checked by the lexer.
    /// Registers past `R31` are rejected by the assembler.
    #[regex(r"[Rr][0-9]+", lex_reg, priority = 5)]
    Reg(u32),

    /// An integer literal (e.g., `12`, `-3`, `0x1F`, `$1F`, `0b101`).
    #[regex(r"-?[0-9]+", lex_dec)]
    #[regex(r"-?0[xX][0-9A-Fa-f]+", lex_hex)]
    #[regex(r"-?\$[0-9A-Fa-f]+", lex_hex)]
    #[regex(r"-?0[bB][01]+", lex_bin)]
    Int(i64),

    /// A word that could be an instruction (e.g., `LDI`, `rjmp`).
    ///
    /// Words in operand position which are shaped like mnemonics
    /// (e.g., the `loop` in `RJMP loop`) are reclassified as [`Token::Ref`]
    /// after the line is lexed.
    #[regex(r"[A-Za-z]{2,6}", |lx| lx.slice().to_string(), priority = 3)]
    Mnemonic(String),

    /// A string literal (e.g., `"Hello!"` or `'Hello!'`). The quotes are not included.
    #[token("\"", lex_str_literal)]
    #[regex(r"'[^'\n]*'", |lx| { let s = lx.slice(); s[1..(s.len() - 1)].to_string() })]
    Str(String),

    /// A directive (e.g., `.section`, `.byte`). The leading `.` is not included.
    #[regex(r"\.[A-Za-z_][A-Za-z0-9_]*", |lx| lx.slice()[1..].to_string())]
    Directive(String),

    /// A pointer register with a constant displacement (e.g., `Y+4`, `Z+63`).
    #[regex(r"[YZ]\+[0-9][0-9]?", lex_displacement)]
    WordPlusQ(Displacement),

    /// A post-incremented pointer register (e.g., `X+`).
    #[regex(r"[XYZ]\+", |lx| lex_pointer(lx, 0))]
    WordPlus(Pointer),

    /// A pre-decremented pointer register (e.g., `-X`).
    #[regex(r"-[XYZ]", |lx| lex_pointer(lx, 1))]
    MinusWord(Pointer),

    /// A plain pointer register (e.g., `X`).
    #[regex(r"[XYZ]", |lx| lex_pointer(lx, 0), priority = 5)]
    Word(Pointer),

    /// A comma, which delineates operands.
    #[token(",")]
    Comma,

    /// A single punctuation character (e.g., the `(` and `)` of `lo8(x)` or the `=` of `.def`).
    #[regex(r"[!#$%&()*+/:<=>?@^{|}~\[\]\\-]", |lx| lx.slice().chars().next())]
    Symbol(char),

    /// A reference to a label or register alias (e.g., `loop`, `my_table`).
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lx| lx.slice().to_string(), priority = 1)]
    Ref(String),
}

/// A pointer register with a constant displacement (e.g., `Y+4`).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Displacement {
    /// The pointer register (`Y` or `Z`).
    pub pointer: Pointer,
    /// The displacement.
    pub q: u8,
}
impl std::fmt::Display for Displacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{}", self.pointer, self.q)
    }
}

/// The lexical category of a [`Token`], without its value.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum TokenKind {
    #[allow(missing_docs)]
    Label,
    #[allow(missing_docs)]
    Lo8,
    #[allow(missing_docs)]
    Hi8,
    #[allow(missing_docs)]
    Reg,
    #[allow(missing_docs)]
    Int,
    #[allow(missing_docs)]
    Mnemonic,
    #[allow(missing_docs)]
    Str,
    #[allow(missing_docs)]
    Directive,
    #[allow(missing_docs)]
    WordPlusQ,
    #[allow(missing_docs)]
    WordPlus,
    #[allow(missing_docs)]
    MinusWord,
    #[allow(missing_docs)]
    Word,
    #[allow(missing_docs)]
    Comma,
    #[allow(missing_docs)]
    Symbol,
    #[allow(missing_docs)]
    Ref,
}
impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Label     => f.write_str("label"),
            TokenKind::Lo8       => f.write_str("lo8"),
            TokenKind::Hi8       => f.write_str("hi8"),
            TokenKind::Reg       => f.write_str("register"),
            TokenKind::Int       => f.write_str("integer"),
            TokenKind::Mnemonic  => f.write_str("instruction"),
            TokenKind::Str       => f.write_str("string"),
            TokenKind::Directive => f.write_str("directive"),
            TokenKind::WordPlusQ => f.write_str("displaced pointer"),
            TokenKind::WordPlus  => f.write_str("post-increment pointer"),
            TokenKind::MinusWord => f.write_str("pre-decrement pointer"),
            TokenKind::Word      => f.write_str("pointer"),
            TokenKind::Comma     => f.write_str("comma"),
            TokenKind::Symbol    => f.write_str("symbol"),
            TokenKind::Ref       => f.write_str("reference"),
        }
    }
}

impl Token {
    /// The lexical category of this token.
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Label(_)     => TokenKind::Label,
            Token::Lo8          => TokenKind::Lo8,
            Token::Hi8          => TokenKind::Hi8,
            Token::Reg(_)       => TokenKind::Reg,
            Token::Int(_)       => TokenKind::Int,
            Token::Mnemonic(_)  => TokenKind::Mnemonic,
            Token::Str(_)       => TokenKind::Str,
            Token::Directive(_) => TokenKind::Directive,
            Token::WordPlusQ(_) => TokenKind::WordPlusQ,
            Token::WordPlus(_)  => TokenKind::WordPlus,
            Token::MinusWord(_) => TokenKind::MinusWord,
            Token::Word(_)      => TokenKind::Word,
            Token::Comma        => TokenKind::Comma,
            Token::Symbol(_)    => TokenKind::Symbol,
            Token::Ref(_)       => TokenKind::Ref,
        }
    }

    /// The numeric value of this token, if it has one.
    ///
    /// This is the index of a register, the value of an integer,
    /// or the displacement of a displaced pointer (so `Y+12` is 12).
    pub fn numeric(&self) -> Option<i64> {
        match self {
            Token::Reg(r)       => Some(i64::from(*r)),
            Token::Int(n)       => Some(*n),
            Token::WordPlusQ(d) => Some(i64::from(d.q)),
            _ => None
        }
    }

    /// Whether this token is the given directive (e.g., `is_directive("end")` for `.end`).
    pub fn is_directive(&self, name: &str) -> bool {
        matches!(self, Token::Directive(d) if d == name)
    }
}
impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Label(l)     => write!(f, "{l}:"),
            Token::Lo8          => f.write_str("lo8"),
            Token::Hi8          => f.write_str("hi8"),
            Token::Reg(r)       => write!(f, "R{r}"),
            Token::Int(n)       => n.fmt(f),
            Token::Mnemonic(m)  => f.write_str(m),
            Token::Str(s)       => write!(f, "{s:?}"),
            Token::Directive(d) => write!(f, ".{d}"),
            Token::WordPlusQ(d) => d.fmt(f),
            Token::WordPlus(p)  => write!(f, "{p}+"),
            Token::MinusWord(p) => write!(f, "-{p}"),
            Token::Word(p)      => p.fmt(f),
            Token::Comma        => f.write_str(","),
            Token::Symbol(c)    => write!(f, "{c}"),
            Token::Ref(r)       => f.write_str(r),
        }
    }
}

/// Kinds of errors that can be raised by a lexical rule.
///
/// See [`LexErr`] for this error type with position information included.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum LexErrKind {
    /// Numeric literal cannot fit within the range of an i64.
    DoesNotFitI64,
    /// Register index cannot fit within the range of a u32.
    InvalidReg,
    /// String literal is missing an end quotation mark.
    UnclosedStrLit,
    /// No lexical rule matches at this position.
    #[default]
    InvalidSymbol
}
impl std::fmt::Display for LexErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErrKind::DoesNotFitI64  => f.write_str("numeric literal is too large"),
            LexErrKind::InvalidReg     => f.write_str("invalid register"),
            LexErrKind::UnclosedStrLit => f.write_str("unclosed string literal"),
            LexErrKind::InvalidSymbol  => f.write_str("invalid syntax"),
        }
    }
}

/// Error from attempting to tokenize source code.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LexErr {
    /// The kind of error.
    pub kind: LexErrKind,
    /// The 1-based line number where the error occurred.
    pub line: usize,
    /// The byte offset into the line where the offending text starts.
    pub offset: usize,
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on line {} starting at position {}", self.kind, self.line, self.offset)
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn line(&self) -> Option<usize> {
        Some(self.line)
    }

    fn category(&self) -> crate::err::ErrCategory {
        crate::err::ErrCategory::Lex
    }

    fn help(&self) -> Option<Cow<str>> {
        match self.kind {
            LexErrKind::DoesNotFitI64  => Some(format!("integer literals must be within [{}, {}]", i64::MIN, i64::MAX).into()),
            LexErrKind::InvalidReg     => Some("registers are R0-R31".into()),
            LexErrKind::UnclosedStrLit => Some("add a quote to the end of the string literal".into()),
            LexErrKind::InvalidSymbol  => Some("this text does not begin any token in AVR assembly".into()),
        }
    }
}

/// Helper that converts an int error kind to its corresponding [`LexErrKind`].
fn convert_int_error(e: &IntErrorKind) -> LexErrKind {
    match e {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => LexErrKind::DoesNotFitI64,
        // The regexes only let through well-formed digit strings,
        // so any other failure means the literal is malformed.
        _ => LexErrKind::InvalidSymbol,
    }
}
/// Parses a literal (with its prefix already removed) in the given radix,
/// applying the sign if `negative` is set.
fn parse_int(digits: &str, radix: u32, negative: bool) -> Result<i64, LexErrKind> {
    // Parse with the sign attached so that i64::MIN is representable.
    let result = match negative {
        true  => i64::from_str_radix(&format!("-{digits}"), radix),
        false => i64::from_str_radix(digits, radix),
    };
    result.map_err(|e| convert_int_error(e.kind()))
}
fn lex_dec(lx: &Lexer<'_, Token>) -> Result<i64, LexErrKind> {
    let slice = lx.slice();
    match slice.strip_prefix('-') {
        Some(digits) => parse_int(digits, 10, true),
        None => parse_int(slice, 10, false),
    }
}
fn lex_hex(lx: &Lexer<'_, Token>) -> Result<i64, LexErrKind> {
    let (negative, rest) = match lx.slice().strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, lx.slice()),
    };
    let Some(digits) = rest.strip_prefix("0x")
        .or_else(|| rest.strip_prefix("0X"))
        .or_else(|| rest.strip_prefix('$'))
    else {
        unreachable!("Lexer slice should have contained a hex prefix");
    };

    parse_int(digits, 16, negative)
}
fn lex_bin(lx: &Lexer<'_, Token>) -> Result<i64, LexErrKind> {
    let (negative, rest) = match lx.slice().strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, lx.slice()),
    };
    let Some(digits) = rest.strip_prefix("0b").or_else(|| rest.strip_prefix("0B")) else {
        unreachable!("Lexer slice should have contained a binary prefix");
    };

    parse_int(digits, 2, negative)
}
fn lex_reg(lx: &Lexer<'_, Token>) -> Result<u32, LexErrKind> {
    lx.slice()[1..].parse::<u32>()
        .map_err(|_| LexErrKind::InvalidReg)
}
fn lex_pointer(lx: &Lexer<'_, Token>, index: usize) -> Result<Pointer, LexErrKind> {
    lx.slice()[index..].chars()
        .next()
        .and_then(Pointer::from_char)
        .ok_or(LexErrKind::InvalidSymbol)
}
fn lex_displacement(lx: &Lexer<'_, Token>) -> Result<Displacement, LexErrKind> {
    let pointer = lex_pointer(lx, 0)?;
    // Regex only allows 1-2 digits, so this always fits in a u8.
    let q = lx.slice()[2..].parse::<u8>()
        .map_err(|e| convert_int_error(e.kind()))?;

    Ok(Displacement { pointer, q })
}
fn lex_str_literal(lx: &mut Lexer<'_, Token>) -> Result<String, LexErrKind> {
    let rem = lx.remainder()
        .lines()
        .next()
        .unwrap_or("");

    // calculate the length of the string literal ignoring the quotes
    // consume tokens up to the end of the literal and including the unescaped quote
    let mlen = rem.match_indices('"')
        .map(|(n, _)| n)
        .find(|&n| !is_escaped(rem, n));

    match mlen {
        Some(len) => lx.bump(len + 1),
        None => {
            lx.bump(rem.len());
            return Err(LexErrKind::UnclosedStrLit);
        }
    }

    // get the string inside quotes:
    let mut remaining = &lx.slice()[1..(lx.slice().len() - 1)];
    let mut buf = String::with_capacity(remaining.len());

    // Look for escapes. Only a simple group of escapes are implemented.
    while let Some((left, right)) = remaining.split_once('\\') {
        buf.push_str(left);

        let mut chars = right.chars();
        match chars.next() {
            Some('n')  => buf.push('\n'),
            Some('r')  => buf.push('\r'),
            Some('t')  => buf.push('\t'),
            Some('\\') => buf.push('\\'),
            Some('0')  => buf.push('\0'),
            Some('"')  => buf.push('"'),
            Some(c) => {
                buf.push('\\');
                buf.push(c);
            },
            // a string can't end with an unescaped backslash (it'd escape the quote)
            None => unreachable!("expected character after escape"),
        }

        remaining = chars.as_str();
    }
    buf.push_str(remaining);

    Ok(buf)
}
/// Checks whether the quote at index `n` is escaped by an odd number of backslashes.
fn is_escaped(s: &str, n: usize) -> bool {
    let slashes = s[..n].bytes()
        .rev()
        .take_while(|&b| b == b'\\')
        .count();

    slashes % 2 == 1
}
