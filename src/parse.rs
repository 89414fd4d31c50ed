//! Splitting assembly source into lines of tokens.
//!
//! This module is used to convert source code into token lines
//! ([`Vec`]`<`[`TokenLine`]`>`) which can be assembled by [`crate::asm::assemble`].
//!
//! Tokenizing occurs in two steps:
//! 1. Each line is lexed into [`Token`]s (see [`lex`] for the lexical rules).
//! 2. Each line's tokens are repaired ([`repair_line`]), which reclassifies
//!    tokens that could not be classified without context.
//!
//! Lines without any tokens are dropped.
pub mod lex;

use logos::Logos;

use self::lex::{LexErr, Token};

/// A nonempty line of tokens, alongside the line of source it came from.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TokenLine {
    /// The tokens of this line.
    pub tokens: Vec<Token>,
    /// The 1-based source line number.
    pub line: usize,
}

/// Tokenizes source code into lines of tokens.
///
/// # Example
/// ```
/// use avr_ensemble::parse::tokenize;
/// use avr_ensemble::parse::lex::Token;
///
/// let lines = tokenize("
///     .section .text
///     ; comment-only lines are dropped
///     main: LDI R16, 5
/// ").unwrap();
///
/// assert_eq!(lines.len(), 2);
/// assert_eq!(lines[1].line, 4);
/// assert_eq!(lines[1].tokens, [
///     Token::Label("main".to_string()),
///     Token::Mnemonic("LDI".to_string()),
///     Token::Reg(16),
///     Token::Comma,
///     Token::Int(5),
/// ]);
/// ```
pub fn tokenize(src: &str) -> Result<Vec<TokenLine>, LexErr> {
    let mut lines = vec![];

    for (i, text) in src.split('\n').enumerate() {
        let line = i + 1;

        let tokens = Token::lexer(text)
            .spanned()
            .map(|(result, span)| result.map_err(|kind| LexErr { kind, line, offset: span.start }))
            .collect::<Result<Vec<_>, _>>()?;

        let tokens = repair_line(tokens);
        if !tokens.is_empty() {
            log::trace!("line {line}: {} tokens", tokens.len());
            lines.push(TokenLine { tokens, line });
        }
    }

    log::debug!("tokenized {} nonempty lines", lines.len());
    Ok(lines)
}

/// Reclassifies tokens of a line which could not be classified in isolation.
///
/// This applies the following rules in order:
/// 1. [`reclassify_mnemonics`]: mnemonic-shaped words in operand position become references.
/// 2. [`merge_refs`]: adjacent references are joined into one reference.
///
/// Register indices are already extracted by the lexer, so `R7` is lexed directly as `Reg(7)`.
pub fn repair_line(tokens: Vec<Token>) -> Vec<Token> {
    merge_refs(reclassify_mnemonics(tokens))
}

/// Converts every [`Token::Mnemonic`] which cannot be an instruction into a [`Token::Ref`].
///
/// An instruction is either the first token of its line,
/// or the second token if the first token is a label.
///
/// ```
/// use avr_ensemble::parse::reclassify_mnemonics;
/// use avr_ensemble::parse::lex::Token;
///
/// let line = vec![Token::Mnemonic("RJMP".to_string()), Token::Mnemonic("loop".to_string())];
/// assert_eq!(reclassify_mnemonics(line), [
///     Token::Mnemonic("RJMP".to_string()),
///     Token::Ref("loop".to_string()),
/// ]);
/// ```
pub fn reclassify_mnemonics(tokens: Vec<Token>) -> Vec<Token> {
    let after_label = matches!(tokens.first(), Some(Token::Label(_)));

    tokens.into_iter()
        .enumerate()
        .map(|(i, t)| match t {
            Token::Mnemonic(m) if i != 0 && !(i == 1 && after_label) => Token::Ref(m),
            t => t
        })
        .collect()
}

/// Joins each run of adjacent [`Token::Ref`]s into a single reference.
///
/// ```
/// use avr_ensemble::parse::merge_refs;
/// use avr_ensemble::parse::lex::Token;
///
/// let line = vec![Token::Ref("my".to_string()), Token::Ref("_table".to_string()), Token::Comma];
/// assert_eq!(merge_refs(line), [Token::Ref("my_table".to_string()), Token::Comma]);
/// ```
pub fn merge_refs(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());

    for t in tokens {
        match (out.last_mut(), t) {
            (Some(Token::Ref(prev)), Token::Ref(next)) => prev.push_str(&next),
            (_, t) => out.push(t),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use crate::ast::Pointer;
    use super::lex::{LexErrKind, Token};
    use super::{merge_refs, reclassify_mnemonics, repair_line, tokenize, LexErr};

    fn mnemonic(s: &str) -> Token {
        Token::Mnemonic(s.to_string())
    }
    fn reference(s: &str) -> Token {
        Token::Ref(s.to_string())
    }
    fn label(s: &str) -> Token {
        Token::Label(s.to_string())
    }

    #[test]
    fn test_reclassify_operand_position() {
        assert_eq!(
            reclassify_mnemonics(vec![mnemonic("BRNE"), mnemonic("loop")]),
            [mnemonic("BRNE"), reference("loop")]
        );
        // mnemonic after a label stays a mnemonic
        assert_eq!(
            reclassify_mnemonics(vec![label("main"), mnemonic("NOP")]),
            [label("main"), mnemonic("NOP")]
        );
        // ...but only in the second position
        assert_eq!(
            reclassify_mnemonics(vec![label("main"), mnemonic("RJMP"), mnemonic("main")]),
            [label("main"), mnemonic("RJMP"), reference("main")]
        );
        // second position without a preceding label is an operand
        assert_eq!(
            reclassify_mnemonics(vec![Token::Directive("global".to_string()), mnemonic("main")]),
            [Token::Directive("global".to_string()), reference("main")]
        );
    }

    #[test]
    fn test_merge_refs() {
        assert_eq!(
            merge_refs(vec![reference("a"), reference("b"), reference("c")]),
            [reference("abc")]
        );
        assert_eq!(
            merge_refs(vec![reference("a"), Token::Comma, reference("b")]),
            [reference("a"), Token::Comma, reference("b")]
        );
        assert!(merge_refs(vec![]).is_empty());
    }

    #[test]
    fn test_repair_order() {
        // The reclassified mnemonic is merged with its neighboring reference.
        assert_eq!(
            repair_line(vec![mnemonic("RCALL"), mnemonic("do"), reference("_work")]),
            [mnemonic("RCALL"), reference("do_work")]
        );
    }

    #[test]
    fn test_tokenize_lines() {
        let src = "
            .section .data
        msg: .asciz \"hi\" ; greeting

            .section .text
            .global main
        main:
            LD R0, X+
            RJMP main
            .end
        ";
        let lines = tokenize(src).unwrap();
        let numbers: Vec<_> = lines.iter().map(|l| l.line).collect();
        assert_eq!(numbers, [2, 3, 5, 6, 7, 8, 9, 10]);

        assert_eq!(lines[1].tokens, [
            label("msg"),
            Token::Directive("asciz".to_string()),
            Token::Str("hi".to_string()),
        ]);
        assert_eq!(lines[5].tokens, [
            mnemonic("LD"),
            Token::Reg(0),
            Token::Comma,
            Token::WordPlus(Pointer::X),
        ]);
        assert_eq!(lines[6].tokens, [mnemonic("RJMP"), reference("main")]);
    }

    #[test]
    fn test_tokenize_byte_select() {
        let lines = tokenize("LDI R16, lo8(tbl)").unwrap();
        assert_eq!(lines[0].tokens, [
            mnemonic("LDI"),
            Token::Reg(16),
            Token::Comma,
            Token::Lo8,
            Token::Symbol('('),
            reference("tbl"),
            Token::Symbol(')'),
        ]);
    }

    #[test]
    fn test_tokenize_error_position() {
        let src = ".section .text\n  LDI R16, `5`";
        assert_eq!(tokenize(src), Err(LexErr { kind: LexErrKind::InvalidSymbol, line: 2, offset: 11 }));
    }
}
