//! Error interface for this crate.
//!
//! Every error raised by the lexer ([`LexErr`]), the assembler ([`AsmErr`]),
//! and the memory image loader ([`SimErr`]) implements [`Error`],
//! which exposes the source line the error occurred on,
//! which [`ErrCategory`] the error belongs to,
//! and an optional help message.
//!
//! Assembly is fail-fast: the first error found is the only one reported.
//!
//! [`AsmErr`]: crate::asm::AsmErr
//! [`SimErr`]: crate::sim::SimErr
use std::borrow::Cow;

pub use crate::parse::lex::LexErr;
use crate::asm::AsmErr;

/// Unified error interface for all errors in this crate.
pub trait Error: std::error::Error {
    /// The 1-based source line associated with this error, if there is one.
    fn line(&self) -> Option<usize> {
        None
    }

    /// The broad category of this error.
    fn category(&self) -> ErrCategory;

    /// A help message for this error, if there is one.
    fn help(&self) -> Option<Cow<str>>;
}

/// The categories an error can fall under.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ErrCategory {
    /// No lexical rule matched at some position in a line.
    Lex,
    /// A section directive or the `.end` terminator is missing, misordered, or duplicated.
    Structural,
    /// An invalid mnemonic, register, or directive.
    Token,
    /// A data directive had the wrong arity, operand types, or comma placement,
    /// or a string contained an illegal character.
    DataLayout,
    /// An undefined reference, or an invalid or duplicate label binding.
    Label,
    /// An instruction had the wrong number of operands, or an operand was of the
    /// wrong kind, out of range, not in its allowed set, or not the required literal.
    Operand,
    /// The assembled images do not fit in the target's memories.
    Load,
}
impl std::fmt::Display for ErrCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrCategory::Lex        => f.write_str("lex error"),
            ErrCategory::Structural => f.write_str("structural error"),
            ErrCategory::Token      => f.write_str("token error"),
            ErrCategory::DataLayout => f.write_str("data layout error"),
            ErrCategory::Label      => f.write_str("label error"),
            ErrCategory::Operand    => f.write_str("operand error"),
            ErrCategory::Load       => f.write_str("load error"),
        }
    }
}

/// An error from either stage of assembling source text.
///
/// This is returned by [`assemble_src`], which lexes and assembles in one step.
///
/// [`assemble_src`]: crate::asm::assemble_src
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AssembleErr {
    #[allow(missing_docs)]
    Lex(LexErr),
    #[allow(missing_docs)]
    Asm(AsmErr),
}
impl AssembleErr {
    /// Gets the inner error as a `&dyn Error`.
    pub fn as_dyn(&self) -> &dyn Error {
        match self {
            AssembleErr::Lex(e) => e,
            AssembleErr::Asm(e) => e,
        }
    }
}
impl From<LexErr> for AssembleErr {
    fn from(value: LexErr) -> Self {
        AssembleErr::Lex(value)
    }
}
impl From<AsmErr> for AssembleErr {
    fn from(value: AsmErr) -> Self {
        AssembleErr::Asm(value)
    }
}
impl std::fmt::Display for AssembleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssembleErr::Lex(e) => e.fmt(f),
            AssembleErr::Asm(e) => e.fmt(f),
        }
    }
}
impl std::error::Error for AssembleErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AssembleErr::Lex(e) => Some(e),
            AssembleErr::Asm(e) => Some(e),
        }
    }
}
impl Error for AssembleErr {
    fn line(&self) -> Option<usize> {
        self.as_dyn().line()
    }

    fn category(&self) -> ErrCategory {
        self.as_dyn().category()
    }

    fn help(&self) -> Option<Cow<str>> {
        match self {
            AssembleErr::Lex(e) => e.help(),
            AssembleErr::Asm(e) => e.help(),
        }
    }
}
