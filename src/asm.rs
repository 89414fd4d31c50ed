//! Assembling token lines into memory images.
//!
//! This module is used to convert token lines (`Vec<`[`TokenLine`]`>`) into an [`Assembly`],
//! which holds a data memory image and a program memory image.
//!
//! The assembler module notably consists of:
//! - [`assemble`] and [`assemble_src`]: The main functions which assemble a program.
//! - [`SymbolTable`]: a struct holding the labels and register aliases found during assembly.
//! - [`Assembly`]: a struct holding the assembled memory images.
//!
//! Assembly occurs in several ordered phases, each of which depends on the ones before it:
//! 0. The section layout is checked (`.section .data`, `.section .text`, `.end`).
//! 1. Mnemonics, registers, and directives are checked against the known sets.
//! 2. The data section is laid out into data memory, binding data labels and register aliases.
//! 3. The entry point is read from the `.global` directive.
//! 4. The text section is laid out into program memory, binding program labels
//!    and resolving data labels, register aliases, and `lo8`/`hi8`.
//! 5. Labels used by control flow instructions are resolved.
//! 6. Every instruction's operands are validated and the instruction is encoded.
//!
//! The first error found in any phase stops assembly.
//!
//! [`TokenLine`]: crate::parse::TokenLine

pub mod encoding;
pub mod operand;

use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::Range;

use crate::ast::{DirectiveKind, Mnemonic};
use crate::err::AssembleErr;
use crate::parse::lex::Token;
use crate::parse::{tokenize, TokenLine};

use self::encoding::{encode, EncodeErr, Opcode};
use self::operand::{operand_specs, OperandErr};

/// The first data memory address after the register file and I/O space.
///
/// Data section layout starts at this address.
pub const SRAM_START: u16 = 0x0100;

/// Assembles token lines into memory images.
///
/// # Example
/// ```
/// use avr_ensemble::parse::tokenize;
/// use avr_ensemble::asm::assemble;
///
/// let src = "
///     .section .text
///     .global main
///     main: LDI R16, 5
///     .end
/// ";
/// let lines = tokenize(src).unwrap();
/// let asm = assemble(lines).unwrap();
///
/// let instrs: Vec<_> = asm.instructions().collect();
/// assert_eq!(instrs.len(), 1);
/// assert_eq!(instrs[0].to_string(), "LDI R16, 5");
/// assert_eq!(instrs[0].opcode().as_str(), "1110000000000101");
/// ```
pub fn assemble(lines: Vec<TokenLine>) -> Result<Assembly, AsmErr> {
    let sections = check_structure(&lines)?;
    log::debug!("phase 0: {} lines, data section: {}", lines.len(), sections.data.is_some());

    let lines = normalize(lines)?;
    log::debug!("phase 1: tokens normalized");

    let mut symbols = SymbolTable::new();
    let data = match sections.data.clone() {
        Some(range) => lay_out_data(&lines[range], &mut symbols)?,
        None => vec![0; usize::from(SRAM_START)],
    };
    log::debug!("phase 2: {} data bytes, {} symbols", data.len() - usize::from(SRAM_START), symbols.len());

    let entry = read_entry(&lines, &sections)?;
    log::debug!("phase 3: entry is {entry:?}");

    let body = &lines[sections.body.clone()];
    let program = lay_out_program(body, &entry, &lines[sections.global], &mut symbols)?;
    log::debug!("phase 4: {} program words", program.len());

    let program = resolve_control_flow(program, &symbols)?;
    log::debug!("phase 5: control flow resolved");

    let program = finalize(program)?;
    log::debug!("phase 6: {} instructions encoded", program.iter().filter(|s| s.instruction().is_some()).count());

    Ok(Assembly { data, program, symbols, entry })
}

/// Tokenizes and assembles source code.
///
/// # Example
/// ```
/// use avr_ensemble::asm::assemble_src;
///
/// let src = "
///     .section .data
///     msg: .asciz \"AB\"
///     .section .text
///     .global main
///     main: RJMP main
///     .end
/// ";
/// let asm = assemble_src(src).unwrap();
/// assert_eq!(&asm.data()[0x100..], [b'A', b'B', 0]);
/// assert_eq!(asm.symbols().lookup_data("msg"), Some(0x100));
/// ```
pub fn assemble_src(src: &str) -> Result<Assembly, AssembleErr> {
    let lines = tokenize(src)?;
    Ok(assemble(lines)?)
}

/// Kinds of errors that can occur from assembling given assembly code.
///
/// See [`AsmErr`] for this error type with line information included.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum AsmErrKind {
    /// The program does not begin with a `.section` directive (phase 0).
    MissingSection,
    /// The program does not end with a `.end` directive (phase 0).
    MissingEnd,
    /// There is no `.section .text` (phase 0).
    MissingText,
    /// A `.section` directive is not followed by exactly one of `.data` or `.text` (phase 0).
    MalformedSection,
    /// A section was declared more than once (phase 0).
    DuplicateSection,
    /// A `.section .data` was declared after the `.section .text` (phase 0).
    DataAfterText,
    /// An `.end` directive appeared before the last line (phase 0).
    EarlyEnd,
    /// Not a known mnemonic (phase 1).
    UnknownMnemonic(String),
    /// Register index is not within R0-R31 (phase 1).
    InvalidReg(u32),
    /// Not a known directive (phase 1).
    UnknownDirective(String),
    /// Data section line is not a data directive (phase 2).
    ExpectedDataDirective,
    /// Directive is missing a value, or has a trailing comma (phase 2).
    ExpectedValue,
    /// Two values of a directive were not separated by a comma (phase 2).
    ExpectedValueComma,
    /// Directive's value is the wrong kind of token (phase 2).
    WrongValueKind(DirectiveKind),
    /// Directive received the wrong number of values (phase 2).
    WrongValueCount(DirectiveKind),
    /// Value of `.byte` or the fill value of `.space` does not fit in a byte (phase 2).
    ByteOutOfRange(i64),
    /// Count of `.space` is negative or too large (phase 2).
    SpaceOutOfRange(i64),
    /// String contains a character which is not 7-bit ASCII (phase 2).
    NonAsciiChar(char),
    /// `.def` was not of the form `.def name = Rn` (phase 2).
    MalformedDef,
    /// Data section grew past the end of the address space (phase 2).
    DataOverflow,
    /// A name was bound more than once (phases 2, 4).
    DuplicateLabel(String),
    /// The text section does not begin with `.global name` (phase 3).
    MissingGlobal,
    /// A label other than the entry label was bound before the first instruction (phase 4).
    EntryMismatch {
        /// The entry name declared in `.global`.
        expected: String,
        /// The label that was found.
        found: String
    },
    /// The entry label was not bound to the first instruction (phase 4).
    EntryNotFirst(String),
    /// A label was found after the first token of a line (phase 4).
    LabelNotFirst(String),
    /// A text section line does not begin with an instruction (phase 4).
    ExpectedInstruction,
    /// `lo8`/`hi8` was not followed by `(name)` at the end of the line (phase 4).
    MalformedByteSelect,
    /// `lo8`/`hi8` was applied to a register alias, which has no address (phase 4).
    AliasByteSelect(String),
    /// A reference does not match any label (phases 4, 5).
    UndefinedLabel(String),
    /// Two operands were not separated by a comma (phase 6).
    ExpectedComma,
    /// Instruction received the wrong number of operands (phase 6).
    WrongOperandCount {
        /// The mnemonic of the instruction.
        mnemonic: Mnemonic,
        /// The number of operands the mnemonic requires.
        expected: usize,
        /// The number of operands found.
        found: usize
    },
    /// Operand is not legal in its position (phase 6).
    InvalidOperand {
        /// The index of the operand.
        index: usize,
        /// The reason the operand is illegal.
        err: OperandErr
    },
    /// Instruction could not be encoded (phase 6).
    Encode(EncodeErr),
}
impl std::fmt::Display for AsmErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSection        => f.write_str("expected .section .data or .section .text"),
            Self::MissingEnd            => f.write_str("program must end with .end"),
            Self::MissingText           => f.write_str("program has no .section .text"),
            Self::MalformedSection      => f.write_str(".section must be followed by .data or .text"),
            Self::DuplicateSection      => f.write_str("section was declared more than once"),
            Self::DataAfterText         => f.write_str(".section .data cannot come after .section .text"),
            Self::EarlyEnd              => f.write_str(".end must be the last line of the program"),
            Self::UnknownMnemonic(m)    => write!(f, "unknown instruction {m}"),
            Self::InvalidReg(r)         => write!(f, "invalid register R{r}"),
            Self::UnknownDirective(d)   => write!(f, "unknown directive .{d}"),
            Self::ExpectedDataDirective => f.write_str("expected data directive"),
            Self::ExpectedValue         => f.write_str("expected value"),
            Self::ExpectedValueComma    => f.write_str("expected comma between values"),
            Self::WrongValueKind(d)     => write!(f, "wrong kind of value for {d}"),
            Self::WrongValueCount(d)    => write!(f, "wrong number of values for {d}"),
            Self::ByteOutOfRange(v)     => write!(f, "value {v} does not fit in a byte"),
            Self::SpaceOutOfRange(n)    => write!(f, "cannot reserve {n} bytes"),
            Self::NonAsciiChar(c)       => write!(f, "character {c:?} is not ASCII"),
            Self::MalformedDef          => f.write_str("malformed register alias"),
            Self::DataOverflow          => f.write_str("data section does not fit in data memory"),
            Self::DuplicateLabel(l)     => write!(f, "{l} was defined multiple times"),
            Self::MissingGlobal         => f.write_str("expected .global directive"),
            Self::EntryMismatch { expected, found } => write!(f, "expected first label to be {expected}, found {found}"),
            Self::EntryNotFirst(e)      => write!(f, "entry label {e} is not on the first instruction"),
            Self::LabelNotFirst(l)      => write!(f, "label {l} must be at the start of the line"),
            Self::ExpectedInstruction   => f.write_str("expected instruction"),
            Self::MalformedByteSelect   => f.write_str("expected (name) after lo8/hi8"),
            Self::AliasByteSelect(a)    => write!(f, "{a} is a register alias and has no address"),
            Self::UndefinedLabel(l)     => write!(f, "label {l} is not defined"),
            Self::ExpectedComma         => f.write_str("expected comma between operands"),
            Self::WrongOperandCount { mnemonic, expected, found } => write!(f, "{mnemonic} expects {expected} operands, found {found}"),
            Self::InvalidOperand { index, err } => write!(f, "operand {}: {err}", index + 1),
            Self::Encode(e)             => e.fmt(f),
        }
    }
}

/// Error from assembling given assembly code.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct AsmErr {
    /// The kind of error.
    pub kind: AsmErrKind,
    /// The 1-based source line associated with this error.
    pub line: usize
}
impl AsmErr {
    /// Creates a new [`AsmErr`].
    pub fn new(kind: AsmErrKind, line: usize) -> Self {
        AsmErr { kind, line }
    }
}
impl std::fmt::Display for AsmErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on line {}", self.kind, self.line)
    }
}
impl std::error::Error for AsmErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            AsmErrKind::InvalidOperand { err, .. } => Some(err),
            AsmErrKind::Encode(e) => Some(e),
            _ => None
        }
    }
}
impl crate::err::Error for AsmErr {
    fn line(&self) -> Option<usize> {
        Some(self.line)
    }

    fn category(&self) -> crate::err::ErrCategory {
        use crate::err::ErrCategory;

        match &self.kind {
            AsmErrKind::MissingSection
            | AsmErrKind::MissingEnd
            | AsmErrKind::MissingText
            | AsmErrKind::MalformedSection
            | AsmErrKind::DuplicateSection
            | AsmErrKind::DataAfterText
            | AsmErrKind::EarlyEnd => ErrCategory::Structural,

            AsmErrKind::UnknownMnemonic(_)
            | AsmErrKind::InvalidReg(_)
            | AsmErrKind::UnknownDirective(_)
            | AsmErrKind::ExpectedInstruction => ErrCategory::Token,

            AsmErrKind::ExpectedDataDirective
            | AsmErrKind::ExpectedValue
            | AsmErrKind::ExpectedValueComma
            | AsmErrKind::WrongValueKind(_)
            | AsmErrKind::WrongValueCount(_)
            | AsmErrKind::ByteOutOfRange(_)
            | AsmErrKind::SpaceOutOfRange(_)
            | AsmErrKind::NonAsciiChar(_)
            | AsmErrKind::MalformedDef
            | AsmErrKind::DataOverflow => ErrCategory::DataLayout,

            AsmErrKind::DuplicateLabel(_)
            | AsmErrKind::MissingGlobal
            | AsmErrKind::EntryMismatch { .. }
            | AsmErrKind::EntryNotFirst(_)
            | AsmErrKind::LabelNotFirst(_)
            | AsmErrKind::UndefinedLabel(_) => ErrCategory::Label,

            AsmErrKind::MalformedByteSelect
            | AsmErrKind::AliasByteSelect(_)
            | AsmErrKind::ExpectedComma
            | AsmErrKind::WrongOperandCount { .. }
            | AsmErrKind::InvalidOperand { .. }
            | AsmErrKind::Encode(_) => ErrCategory::Operand,
        }
    }

    fn help(&self) -> Option<Cow<str>> {
        match &self.kind {
            AsmErrKind::MissingSection        => Some("the first line must be .section .data or .section .text".into()),
            AsmErrKind::MissingEnd            => Some("try adding .end as the last line of the program".into()),
            AsmErrKind::MissingText           => Some("try adding .section .text before the program's instructions".into()),
            AsmErrKind::MalformedSection      => None,
            AsmErrKind::DuplicateSection      => Some("a program has at most one .data section and exactly one .text section".into()),
            AsmErrKind::DataAfterText         => Some("try moving the data section above the text section".into()),
            AsmErrKind::EarlyEnd              => Some("everything after .end would be ignored; try removing this .end".into()),
            AsmErrKind::UnknownMnemonic(_)    => None,
            AsmErrKind::InvalidReg(_)         => Some("registers are R0-R31".into()),
            AsmErrKind::UnknownDirective(_)   => Some("known directives are .section, .data, .text, .global, .byte, .string, .ascii, .asciz, .space, .def, and .end".into()),
            AsmErrKind::ExpectedDataDirective => Some("the data section may only contain .byte, .string, .ascii, .asciz, .space, and .def".into()),
            AsmErrKind::ExpectedValue         => None,
            AsmErrKind::ExpectedValueComma    => None,
            AsmErrKind::WrongValueKind(d)     => Some(match d {
                DirectiveKind::String | DirectiveKind::Ascii | DirectiveKind::Asciz => "this directive accepts string literals".into(),
                _ => format!("{d} accepts integer literals").into(),
            }),
            AsmErrKind::WrongValueCount(_)    => Some(".space accepts a count and an optional fill value".into()),
            AsmErrKind::ByteOutOfRange(_)     => Some("byte values must be within [-128, 255]".into()),
            AsmErrKind::SpaceOutOfRange(_)    => Some("the count of .space must be within [0, 65535]".into()),
            AsmErrKind::NonAsciiChar(_)       => Some("strings may only contain 7-bit ASCII characters".into()),
            AsmErrKind::MalformedDef          => Some("try .def name = R16".into()),
            AsmErrKind::DataOverflow          => Some("data memory addresses end at 0xFFFF".into()),
            AsmErrKind::DuplicateLabel(_)     => Some("labels and aliases must be unique within a file, try renaming one of them".into()),
            AsmErrKind::MissingGlobal         => Some("the line after .section .text must be .global followed by the entry label".into()),
            AsmErrKind::EntryMismatch { .. }  => Some("the first label in the text section must be the label named by .global".into()),
            AsmErrKind::EntryNotFirst(_)      => Some("try adding the entry label to the first instruction".into()),
            AsmErrKind::LabelNotFirst(_)      => None,
            AsmErrKind::ExpectedInstruction   => None,
            AsmErrKind::MalformedByteSelect   => Some("lo8 and hi8 must be the last operand, as in lo8(name)".into()),
            AsmErrKind::AliasByteSelect(_)    => Some("lo8 and hi8 accept data and program labels".into()),
            AsmErrKind::UndefinedLabel(_)     => Some("try adding this label before an instruction or data directive".into()),
            AsmErrKind::ExpectedComma         => None,
            AsmErrKind::WrongOperandCount { .. } => None,
            AsmErrKind::InvalidOperand { err, .. } => err.help(),
            AsmErrKind::Encode(_)             => None,
        }
    }
}

/// A value bound to a name in the [`SymbolTable`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Symbol {
    /// A label in the data section, bound to its data memory address.
    Data(u16),
    /// A label in the text section, bound to its program memory index.
    Program(usize),
    /// A register alias (from `.def`), bound to its register index.
    Register(u8),
}

/// The symbol table created while assembling a program.
///
/// This maps each label to its address and each register alias to its register.
/// Names are case-sensitive and can only be bound once.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SymbolTable {
    label_map: HashMap<String, Symbol>,
}
impl SymbolTable {
    /// Creates a new, empty symbol table.
    pub fn new() -> Self {
        Default::default()
    }

    /// Binds a name, failing if it was already bound.
    fn bind(&mut self, name: &str, symbol: Symbol, line: usize) -> Result<(), AsmErr> {
        match self.label_map.entry(name.to_string()) {
            Entry::Occupied(e) => Err(AsmErr::new(AsmErrKind::DuplicateLabel(e.key().clone()), line)),
            Entry::Vacant(e) => {
                e.insert(symbol);
                Ok(())
            }
        }
    }

    /// Gets the value bound to a name (if it exists).
    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.label_map.get(name).copied()
    }

    /// Gets the data memory address of a data label (if it exists).
    pub fn lookup_data(&self, name: &str) -> Option<u16> {
        match self.get(name)? {
            Symbol::Data(addr) => Some(addr),
            _ => None
        }
    }

    /// Gets the program memory index of a program label (if it exists).
    ///
    /// ## Example
    /// ```
    /// use avr_ensemble::asm::assemble_src;
    ///
    /// let src = "
    ///     .section .text
    ///     .global main
    ///     main: CALL sub
    ///     loop: RJMP loop
    ///     sub:  RET
    ///     .end
    /// ";
    /// let asm = assemble_src(src).unwrap();
    /// let sym = asm.symbols();
    /// assert_eq!(sym.lookup_program("main"), Some(0));
    /// // CALL occupies two words
    /// assert_eq!(sym.lookup_program("loop"), Some(2));
    /// assert_eq!(sym.lookup_program("sub"), Some(3));
    /// assert_eq!(sym.lookup_program("nowhere"), None);
    /// ```
    pub fn lookup_program(&self, name: &str) -> Option<usize> {
        match self.get(name)? {
            Symbol::Program(index) => Some(index),
            _ => None
        }
    }

    /// Gets the register index of a register alias (if it exists).
    pub fn lookup_register(&self, name: &str) -> Option<u8> {
        match self.get(name)? {
            Symbol::Register(r) => Some(r),
            _ => None
        }
    }

    /// The number of bound names.
    pub fn len(&self) -> usize {
        self.label_map.len()
    }

    /// Whether no names are bound.
    pub fn is_empty(&self) -> bool {
        self.label_map.is_empty()
    }

    /// Gets an iterable of the bound names and their values.
    pub fn iter(&self) -> impl Iterator<Item=(&str, Symbol)> + '_ {
        self.label_map.iter()
            .map(|(name, &sym)| (&**name, sym))
    }
}

/// A finalized instruction in program memory.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Instruction {
    mnemonic: Mnemonic,
    operands: Vec<Token>,
    opcode: Opcode,
    line: Option<usize>,
}
impl Instruction {
    /// A `NOP` instruction which did not come from source code.
    ///
    /// This is used to pad program memory.
    pub fn nop() -> Self {
        Instruction { mnemonic: Mnemonic::NOP, operands: vec![], opcode: Opcode::nop(), line: None }
    }

    /// The mnemonic of this instruction.
    pub fn mnemonic(&self) -> Mnemonic {
        self.mnemonic
    }

    /// The resolved operands of this instruction.
    pub fn operands(&self) -> &[Token] {
        &self.operands
    }

    /// The encoded opcode of this instruction.
    pub fn opcode(&self) -> &Opcode {
        &self.opcode
    }

    /// The source line this instruction came from, if it came from source code.
    pub fn line(&self) -> Option<usize> {
        self.line
    }
}
impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        for (i, op) in self.operands.iter().enumerate() {
            match i {
                0 => write!(f, " {op}")?,
                _ => write!(f, ", {op}")?,
            }
        }
        Ok(())
    }
}

/// One word of program memory.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ProgramSlot {
    /// The start of an instruction.
    Instr(Instruction),
    /// The second word of a double-word instruction (`CALL`, `JMP`, `LDS`, `STS`).
    ///
    /// This holds no instruction of its own.
    Continuation,
}
impl ProgramSlot {
    /// The instruction starting at this slot, if there is one.
    pub fn instruction(&self) -> Option<&Instruction> {
        match self {
            ProgramSlot::Instr(i) => Some(i),
            ProgramSlot::Continuation => None,
        }
    }
}

/// An assembled program.
///
/// This can be loaded into memory with [`crate::sim::MemoryImage::load`].
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Assembly {
    data: Vec<u8>,
    program: Vec<ProgramSlot>,
    symbols: SymbolTable,
    entry: String,
}
impl Assembly {
    /// The data memory image, indexed by address.
    ///
    /// Addresses below [`SRAM_START`] (the register file and I/O space) are all zero.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The program memory image, indexed by word.
    pub fn program(&self) -> &[ProgramSlot] {
        &self.program
    }

    /// The instructions of the program, in program memory order.
    pub fn instructions(&self) -> impl Iterator<Item=&Instruction> + '_ {
        self.program.iter().filter_map(ProgramSlot::instruction)
    }

    /// The symbol table of the program.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// The entry label (named by `.global`).
    pub fn entry(&self) -> &str {
        &self.entry
    }
}

// Phase 0

/// Indices into the token lines of each part of the program.
struct Sections {
    /// Lines of the data section, excluding its `.section` line.
    data: Option<Range<usize>>,
    /// Index of the `.global` line.
    global: usize,
    /// Lines of the text section after `.global`, excluding `.end`.
    body: Range<usize>,
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum Section { Data, Text }

/// Reads a `.section` line, returning `None` if this is not a `.section` line.
fn section_of(line: &TokenLine) -> Result<Option<Section>, AsmErr> {
    if !line.tokens.first().is_some_and(|t| t.is_directive("section")) {
        return Ok(None);
    }

    match &line.tokens[1..] {
        [t] if t.is_directive("data") => Ok(Some(Section::Data)),
        [t] if t.is_directive("text") => Ok(Some(Section::Text)),
        _ => Err(AsmErr::new(AsmErrKind::MalformedSection, line.line))
    }
}

fn check_structure(lines: &[TokenLine]) -> Result<Sections, AsmErr> {
    let (Some(first), Some(last)) = (lines.first(), lines.last()) else {
        return Err(AsmErr::new(AsmErrKind::MissingSection, 1));
    };
    if section_of(first)?.is_none() {
        return Err(AsmErr::new(AsmErrKind::MissingSection, first.line));
    }
    if !matches!(&*last.tokens, [t] if t.is_directive("end")) {
        return Err(AsmErr::new(AsmErrKind::MissingEnd, last.line));
    }

    let end = lines.len() - 1;
    let mut data = None;
    let mut text = None;
    for (i, line) in lines.iter().enumerate() {
        if i != end && line.tokens.first().is_some_and(|t| t.is_directive("end")) {
            return Err(AsmErr::new(AsmErrKind::EarlyEnd, line.line));
        }

        match section_of(line)? {
            Some(Section::Data) if text.is_some() => return Err(AsmErr::new(AsmErrKind::DataAfterText, line.line)),
            Some(Section::Data) if data.is_some() => return Err(AsmErr::new(AsmErrKind::DuplicateSection, line.line)),
            Some(Section::Text) if text.is_some() => return Err(AsmErr::new(AsmErrKind::DuplicateSection, line.line)),
            Some(Section::Data) => data = Some(i),
            Some(Section::Text) => text = Some(i),
            None => {}
        }
    }

    let Some(text) = text else {
        return Err(AsmErr::new(AsmErrKind::MissingText, last.line));
    };

    Ok(Sections {
        data: data.map(|d| (d + 1)..text),
        global: text + 1,
        body: (text + 2).min(end)..end,
    })
}

// Phase 1

fn normalize(lines: Vec<TokenLine>) -> Result<Vec<TokenLine>, AsmErr> {
    lines.into_iter()
        .map(|TokenLine { tokens, line }| {
            let tokens = tokens.into_iter()
                .map(|t| match t {
                    Token::Mnemonic(m) => match m.parse::<Mnemonic>() {
                        Ok(mn) => Ok(Token::Mnemonic(mn.to_string())),
                        Err(_) => Err(AsmErr::new(AsmErrKind::UnknownMnemonic(m), line)),
                    },
                    Token::Reg(r) if r > 31 => Err(AsmErr::new(AsmErrKind::InvalidReg(r), line)),
                    Token::Directive(d) => match d.parse::<DirectiveKind>() {
                        Ok(_)  => Ok(Token::Directive(d)),
                        Err(_) => Err(AsmErr::new(AsmErrKind::UnknownDirective(d), line)),
                    },
                    t => Ok(t)
                })
                .collect::<Result<_, _>>()?;

            Ok(TokenLine { tokens, line })
        })
        .collect()
}

// Phase 2

/// Splits comma-separated values, checking that values and commas alternate.
fn split_values(args: &[Token], line: usize) -> Result<Vec<&Token>, AsmErr> {
    // A value must follow the directive and every comma.
    if args.is_empty() || matches!(args.last(), Some(Token::Comma)) {
        return Err(AsmErr::new(AsmErrKind::ExpectedValue, line));
    }

    args.iter()
        .enumerate()
        .filter_map(|(i, t)| match (i % 2, t) {
            (0, Token::Comma) => Some(Err(AsmErr::new(AsmErrKind::ExpectedValue, line))),
            (0, t) => Some(Ok(t)),
            (_, Token::Comma) => None,
            (_, _) => Some(Err(AsmErr::new(AsmErrKind::ExpectedValueComma, line))),
        })
        .collect()
}

fn byte_value(t: &Token, d: DirectiveKind, line: usize) -> Result<u8, AsmErr> {
    match *t {
        Token::Int(v @ -128..=255) => Ok(v.rem_euclid(256) as u8),
        Token::Int(v) => Err(AsmErr::new(AsmErrKind::ByteOutOfRange(v), line)),
        _ => Err(AsmErr::new(AsmErrKind::WrongValueKind(d), line)),
    }
}

fn lay_out_data(lines: &[TokenLine], symbols: &mut SymbolTable) -> Result<Vec<u8>, AsmErr> {
    let mut data = vec![0; usize::from(SRAM_START)];

    for TokenLine { tokens, line } in lines {
        let line = *line;
        log::trace!("data line {line}: {} bytes so far", data.len());

        let rest = match &tokens[..] {
            [Token::Label(name), rest @ ..] => {
                let addr = u16::try_from(data.len())
                    .map_err(|_| AsmErr::new(AsmErrKind::DataOverflow, line))?;
                symbols.bind(name, Symbol::Data(addr), line)?;
                rest
            },
            rest => rest
        };

        let Some((directive, args)) = rest.split_first() else { continue };
        let kind = match directive {
            Token::Directive(d) => d.parse::<DirectiveKind>()
                .map_err(|_| AsmErr::new(AsmErrKind::UnknownDirective(d.clone()), line))?,
            _ => return Err(AsmErr::new(AsmErrKind::ExpectedDataDirective, line)),
        };

        match kind {
            DirectiveKind::Byte => {
                for v in split_values(args, line)? {
                    data.push(byte_value(v, kind, line)?);
                }
            },
            DirectiveKind::String | DirectiveKind::Ascii | DirectiveKind::Asciz => {
                for v in split_values(args, line)? {
                    let Token::Str(s) = v else {
                        return Err(AsmErr::new(AsmErrKind::WrongValueKind(kind), line));
                    };
                    if let Some(c) = s.chars().find(|c| !c.is_ascii()) {
                        return Err(AsmErr::new(AsmErrKind::NonAsciiChar(c), line));
                    }

                    data.extend_from_slice(s.as_bytes());
                    if kind != DirectiveKind::Ascii {
                        data.push(0);
                    }
                }
            },
            DirectiveKind::Space => {
                let (count, fill) = match split_values(args, line)?[..] {
                    [count] => (count, 0),
                    [count, fill] => (count, byte_value(fill, kind, line)?),
                    _ => return Err(AsmErr::new(AsmErrKind::WrongValueCount(kind), line)),
                };
                let count = match *count {
                    Token::Int(n @ 0..=65535) => n as usize,
                    Token::Int(n) => return Err(AsmErr::new(AsmErrKind::SpaceOutOfRange(n), line)),
                    _ => return Err(AsmErr::new(AsmErrKind::WrongValueKind(kind), line)),
                };

                data.resize(data.len() + count, fill);
            },
            DirectiveKind::Def => {
                let [Token::Ref(name), Token::Symbol('='), Token::Reg(r)] = args else {
                    return Err(AsmErr::new(AsmErrKind::MalformedDef, line));
                };
                let r = u8::try_from(*r)
                    .map_err(|_| AsmErr::new(AsmErrKind::InvalidReg(*r), line))?;

                symbols.bind(name, Symbol::Register(r), line)?;
            },
            _ => return Err(AsmErr::new(AsmErrKind::ExpectedDataDirective, line)),
        }

        if data.len() > 0x10000 {
            return Err(AsmErr::new(AsmErrKind::DataOverflow, line));
        }
    }

    Ok(data)
}

// Phase 3

fn read_entry(lines: &[TokenLine], sections: &Sections) -> Result<String, AsmErr> {
    let global = &lines[sections.global];

    match &global.tokens[..] {
        [d, Token::Ref(name)] if d.is_directive("global") => Ok(name.clone()),
        _ => Err(AsmErr::new(AsmErrKind::MissingGlobal, global.line))
    }
}

// Phase 4

/// An instruction which has not been validated or encoded.
struct Stmt {
    mnemonic: Mnemonic,
    /// Operand tokens, including commas.
    operands: Vec<Token>,
    line: usize,
}
enum PendingSlot {
    Stmt(Stmt),
    Continuation,
}

fn lay_out_program(
    lines: &[TokenLine],
    entry: &str,
    global: &TokenLine,
    symbols: &mut SymbolTable
) -> Result<Vec<PendingSlot>, AsmErr> {
    let mut program = vec![];

    for TokenLine { tokens, line } in lines {
        let line = *line;

        let rest = match &tokens[..] {
            [Token::Label(name), rest @ ..] => {
                if program.is_empty() && name != entry {
                    return Err(AsmErr::new(AsmErrKind::EntryMismatch { expected: entry.to_string(), found: name.clone() }, line));
                }
                symbols.bind(name, Symbol::Program(program.len()), line)?;
                rest
            },
            rest => rest
        };

        let Some((first, operands)) = rest.split_first() else { continue };
        let mnemonic = match first {
            Token::Mnemonic(m) => m.parse::<Mnemonic>()
                .map_err(|_| AsmErr::new(AsmErrKind::UnknownMnemonic(m.clone()), line))?,
            Token::Label(name) => return Err(AsmErr::new(AsmErrKind::LabelNotFirst(name.clone()), line)),
            _ => return Err(AsmErr::new(AsmErrKind::ExpectedInstruction, line)),
        };
        let operands = resolve_operands(operands, symbols, line)?;

        log::trace!("program word {}: {mnemonic} (line {line})", program.len());
        program.push(PendingSlot::Stmt(Stmt { mnemonic, operands, line }));
        if mnemonic.is_double_word() {
            program.push(PendingSlot::Continuation);
        }
    }

    if !program.is_empty() && symbols.get(entry) != Some(Symbol::Program(0)) {
        return Err(AsmErr::new(AsmErrKind::EntryNotFirst(entry.to_string()), global.line));
    }

    Ok(program)
}

/// Resolves `lo8`/`hi8`, data labels, and register aliases in an instruction's operands.
///
/// Program labels are left as references for [`resolve_control_flow`].
fn resolve_operands(tokens: &[Token], symbols: &SymbolTable, line: usize) -> Result<Vec<Token>, AsmErr> {
    let mut out = Vec::with_capacity(tokens.len());

    for (i, t) in tokens.iter().enumerate() {
        match t {
            Token::Lo8 | Token::Hi8 => {
                let [Token::Symbol('('), Token::Ref(name), Token::Symbol(')')] = &tokens[(i + 1)..] else {
                    return Err(AsmErr::new(AsmErrKind::MalformedByteSelect, line));
                };
                let addr = match symbols.get(name) {
                    Some(Symbol::Data(addr)) => usize::from(addr),
                    Some(Symbol::Program(index)) => index,
                    Some(Symbol::Register(_)) => return Err(AsmErr::new(AsmErrKind::AliasByteSelect(name.clone()), line)),
                    None => return Err(AsmErr::new(AsmErrKind::UndefinedLabel(name.clone()), line)),
                };
                let byte = match t {
                    Token::Hi8 => (addr >> 8) & 0xFF,
                    _ => addr & 0xFF,
                };

                out.push(Token::Int(byte as i64));
                break;
            },
            Token::Ref(name) => match symbols.get(name) {
                Some(Symbol::Data(addr)) => out.push(Token::Int(i64::from(addr))),
                Some(Symbol::Register(r)) => out.push(Token::Reg(u32::from(r))),
                _ => out.push(t.clone()),
            },
            Token::Label(name) => return Err(AsmErr::new(AsmErrKind::LabelNotFirst(name.clone()), line)),
            t => out.push(t.clone()),
        }
    }

    Ok(out)
}

// Phase 5

fn resolve_control_flow(program: Vec<PendingSlot>, symbols: &SymbolTable) -> Result<Vec<PendingSlot>, AsmErr> {
    program.into_iter()
        .enumerate()
        .map(|(current, slot)| {
            let Stmt { mnemonic, operands, line } = match slot {
                PendingSlot::Stmt(stmt) => stmt,
                PendingSlot::Continuation => return Ok(PendingSlot::Continuation),
            };

            let operands = operands.into_iter()
                .map(|t| {
                    let Token::Ref(name) = t else { return Ok(t) };

                    match symbols.get(&name) {
                        Some(Symbol::Program(target)) if mnemonic.is_absolute() => Ok(Token::Int(target as i64)),
                        Some(Symbol::Program(target)) if mnemonic.is_relative() => Ok(Token::Int(target as i64 - 1 - current as i64)),
                        // Left for operand validation to reject.
                        Some(_) => Ok(Token::Ref(name)),
                        None => Err(AsmErr::new(AsmErrKind::UndefinedLabel(name), line)),
                    }
                })
                .collect::<Result<_, _>>()?;

            Ok(PendingSlot::Stmt(Stmt { mnemonic, operands, line }))
        })
        .collect()
}

// Phase 6

fn finalize(program: Vec<PendingSlot>) -> Result<Vec<ProgramSlot>, AsmErr> {
    program.into_iter()
        .map(|slot| match slot {
            PendingSlot::Stmt(stmt) => finalize_stmt(stmt).map(ProgramSlot::Instr),
            PendingSlot::Continuation => Ok(ProgramSlot::Continuation),
        })
        .collect()
}

fn finalize_stmt(Stmt { mnemonic, operands, line }: Stmt) -> Result<Instruction, AsmErr> {
    // Operands and commas alternate. A trailing comma is kept so that it is counted.
    let len = operands.len();
    let operands = operands.into_iter()
        .enumerate()
        .filter_map(|(i, t)| match (i % 2, t) {
            (1, Token::Comma) if i + 1 < len => None,
            (1, Token::Comma) => Some(Ok(Token::Comma)),
            (1, _) => Some(Err(AsmErr::new(AsmErrKind::ExpectedComma, line))),
            (_, t) => Some(Ok(t)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let specs = operand_specs(mnemonic);
    if operands.len() != specs.len() {
        return Err(AsmErr::new(AsmErrKind::WrongOperandCount { mnemonic, expected: specs.len(), found: operands.len() }, line));
    }
    for (index, (spec, op)) in std::iter::zip(specs, &operands).enumerate() {
        spec.check(op)
            .map_err(|err| AsmErr::new(AsmErrKind::InvalidOperand { index, err }, line))?;
    }

    let opcode = encode(mnemonic, &operands)
        .map_err(|e| AsmErr::new(AsmErrKind::Encode(e), line))?;
    log::trace!("line {line}: {mnemonic} => {opcode}");

    Ok(Instruction { mnemonic, operands, opcode, line: Some(line) })
}

#[cfg(test)]
mod tests {
    use crate::asm::operand::OperandErr;
    use crate::ast::{DirectiveKind, Mnemonic};
    use crate::err::{AssembleErr, ErrCategory, Error};
    use crate::parse::lex::Token;

    use super::{assemble_src, AsmErrKind, Assembly, ProgramSlot, Symbol, SRAM_START};

    fn assert_asm_fail<T: std::fmt::Debug>(r: Result<T, AssembleErr>, kind: AsmErrKind, line: usize) {
        match r.unwrap_err() {
            AssembleErr::Asm(e) => {
                assert_eq!(e.kind, kind);
                assert_eq!(e.line, line, "error {kind} was on the wrong line");
            },
            AssembleErr::Lex(e) => panic!("expected assembly error, got lex error {e}"),
        }
    }
    fn assert_category<T: std::fmt::Debug>(r: Result<T, AssembleErr>, category: ErrCategory) {
        assert_eq!(r.unwrap_err().category(), category);
    }
    /// Joins lines of source code, so that `lines[0]` is line 1.
    fn src(lines: &[&str]) -> String {
        lines.join("\n")
    }
    /// Wraps instructions into a program with `main` labeling the first line.
    /// The instructions start at line 3.
    fn program(instrs: &[&str]) -> String {
        let mut lines = vec![".section .text", ".global main"];
        lines.extend_from_slice(instrs);
        lines.push(".end");
        src(&lines)
    }
    fn opcodes(asm: &Assembly) -> Vec<&str> {
        asm.instructions().map(|i| i.opcode().as_str()).collect()
    }

    #[test]
    fn test_minimal_program() {
        let asm = assemble_src(&program(&["main: LDI R16, 5"])).unwrap();

        assert_eq!(asm.entry(), "main");
        assert_eq!(asm.program().len(), 1);
        let instr = asm.program()[0].instruction().unwrap();
        assert_eq!(instr.mnemonic(), Mnemonic::LDI);
        assert_eq!(instr.operands(), [Token::Reg(16), Token::Int(5)]);
        assert_eq!(instr.line(), Some(3));
        // 1110 KKKK dddd KKKK with K = 5, d = 16 - 16
        assert_eq!(instr.opcode().as_str(), "1110000000000101");
        // data memory is only the register file and I/O space
        assert_eq!(asm.data().len(), usize::from(SRAM_START));
    }

    #[test]
    fn test_fixed_encodings() {
        let asm = assemble_src(&program(&[
            "main: NOP",
            "RET",
            "loop: NOP",
            "CLC",
            "SEI",
            "CLZ",
        ])).unwrap();

        assert_eq!(opcodes(&asm), [
            "0000000000000000",
            "1001010100001000",
            "0000000000000000",
            "1001010010001000",
            "1001010001111000",
            "1001010010011000",
        ]);
    }

    #[test]
    fn test_add() {
        let asm = assemble_src(&program(&["main: ADD R5, R6"])).unwrap();
        // 000011 r ddddd rrrr
        assert_eq!(opcodes(&asm), ["0000110001010110"]);
        assert_eq!(asm.instructions().next().unwrap().to_string(), "ADD R5, R6");
    }

    #[test]
    fn test_two_register_ops() {
        let asm = assemble_src(&program(&[
            "main: OR R1, R2",
            "AND R1, R2",
            "EOR R31, R0",
        ])).unwrap();
        // 0010 10 r ddddd rrrr
        assert_eq!(opcodes(&asm), [
            "0010100000010010",
            "0010000000010010",
            "0010011111110000",
        ]);
        assert_eq!(asm.instructions().next().unwrap().to_string(), "OR R1, R2");
    }

    #[test]
    fn test_case_insensitive_mnemonics() {
        let asm = assemble_src(&program(&["main: ldi r16, 5", "Rjmp main"])).unwrap();
        let names: Vec<_> = asm.instructions().map(|i| i.to_string()).collect();
        assert_eq!(names, ["LDI R16, 5", "RJMP -2"]);
    }

    #[test]
    fn test_relative_branches() {
        let asm = assemble_src(&program(&[
            "main: LDI R16, 3", // 0
            "loop: DEC R16",    // 1
            "BRNE loop",        // 2
            "RJMP done",        // 3
            "NOP",              // 4
            "done: RJMP done",  // 5
        ])).unwrap();

        let operands: Vec<_> = asm.instructions()
            .filter(|i| i.mnemonic().is_relative())
            .map(|i| i.operands()[0].clone())
            .collect();
        // backward: 1 - 1 - 2, forward: 5 - 1 - 3, self: 5 - 1 - 5
        assert_eq!(operands, [Token::Int(-2), Token::Int(1), Token::Int(-1)]);

        let ops = opcodes(&asm);
        assert_eq!(ops[2], "1111011111110001");
        assert_eq!(ops[3], "1100000000000001");
        assert_eq!(ops[5], "1100111111111111");
    }

    #[test]
    fn test_double_word() {
        let asm = assemble_src(&program(&[
            "main: CALL sub",
            "RJMP main",
            "sub: LDS R0, 0x100",
            "STS 0x101, R0",
            "RET",
        ])).unwrap();

        assert!(matches!(asm.program(), [
            ProgramSlot::Instr(_),
            ProgramSlot::Continuation,
            ProgramSlot::Instr(_),
            ProgramSlot::Instr(_),
            ProgramSlot::Continuation,
            ProgramSlot::Instr(_),
            ProgramSlot::Continuation,
            ProgramSlot::Instr(_),
        ]));
        assert_eq!(asm.symbols().lookup_program("sub"), Some(3));

        let instrs: Vec<_> = asm.instructions().collect();
        assert_eq!(instrs[0].operands(), [Token::Int(3)]);
        assert_eq!(instrs[0].opcode().len(), 32);
        // RJMP at index 2 back to 0
        assert_eq!(instrs[1].operands(), [Token::Int(-3)]);
        assert_eq!(instrs[1].opcode().len(), 16);
    }

    #[test]
    fn test_data_layout() {
        let asm = assemble_src(&src(&[
            ".section .data",
            "msg:   .asciz \"AB\"",
            "raw:   .ascii \"AB\"",
            "buf:   .space 4",
            "nines: .space 4, 9",
            "bytes: .byte 1, -1, 0xFF",
            "strs:  .string \"a\", 'b'",
            "empty:",
            ".section .text",
            ".global main",
            "main: NOP",
            ".end",
        ])).unwrap();

        let sym = asm.symbols();
        assert_eq!(sym.lookup_data("msg"), Some(0x100));
        assert_eq!(sym.lookup_data("raw"), Some(0x103));
        assert_eq!(sym.lookup_data("buf"), Some(0x105));
        assert_eq!(sym.lookup_data("nines"), Some(0x109));
        assert_eq!(sym.lookup_data("bytes"), Some(0x10D));
        assert_eq!(sym.lookup_data("strs"), Some(0x110));
        assert_eq!(sym.lookup_data("empty"), Some(0x114));

        assert_eq!(&asm.data()[0x100..], [
            65, 66, 0,
            65, 66,
            0, 0, 0, 0,
            9, 9, 9, 9,
            1, 255, 255,
            b'a', 0, b'b', 0,
        ]);
        assert!(asm.data()[..0x100].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_space_count_per_line() {
        // each .space reserves its own count
        let asm = assemble_src(&src(&[
            ".section .data",
            ".space 3",
            ".space 1, 7",
            ".space 0",
            ".section .text",
            ".global main",
            ".end",
        ])).unwrap();
        assert_eq!(&asm.data()[0x100..], [0, 0, 0, 7]);

        let r = assemble_src(&src(&[
            ".section .data",
            ".space 3",
            ".space",
            ".section .text",
            ".global main",
            ".end",
        ]));
        assert_asm_fail(r, AsmErrKind::ExpectedValue, 3);
    }

    #[test]
    fn test_operand_resolution() {
        let asm = assemble_src(&src(&[
            ".section .data",
            ".space 0x10",
            "table: .byte 1, 2, 3",
            ".def temp = R20",
            ".section .text",
            ".global main",
            "main: LDI temp, lo8(table)",
            "LDI R17, hi8(table)",
            "LDS R0, table",
            "LDI ZL, lo8(main)",
            ".end",
        ]));
        // ZL is not defined
        assert_asm_fail(asm, AsmErrKind::UndefinedLabel("ZL".to_string()), 10);

        let asm = assemble_src(&src(&[
            ".section .data",
            ".space 0x10",
            "table: .byte 1, 2, 3",
            ".def temp = R20",
            ".section .text",
            ".global main",
            "main: LDI temp, lo8(table)",
            "LDI R17, hi8(table)",
            "LDS R0, table",
            "LDI R30, lo8(main)",
            ".end",
        ])).unwrap();

        assert_eq!(asm.symbols().get("temp"), Some(Symbol::Register(20)));
        let instrs: Vec<_> = asm.instructions().map(|i| i.to_string()).collect();
        assert_eq!(instrs, [
            "LDI R20, 16",
            "LDI R17, 1",
            "LDS R0, 272",
            "LDI R30, 0",
        ]);
    }

    #[test]
    fn test_byte_select_errors() {
        let r = assemble_src(&program(&["main: LDI R16, lo8 table"]));
        assert_asm_fail(r, AsmErrKind::MalformedByteSelect, 3);

        let r = assemble_src(&program(&["main: LDI R16, lo8(main), 1"]));
        assert_asm_fail(r, AsmErrKind::MalformedByteSelect, 3);

        let r = assemble_src(&src(&[
            ".section .data",
            ".def tmp = R16",
            ".section .text",
            ".global main",
            "main: LDI R17, lo8(tmp)",
            ".end",
        ]));
        assert_asm_fail(r, AsmErrKind::AliasByteSelect("tmp".to_string()), 5);

        // forward references are not allowed in lo8/hi8
        let r = assemble_src(&program(&["main: LDI R16, hi8(later)", "later: NOP"]));
        assert_asm_fail(r, AsmErrKind::UndefinedLabel("later".to_string()), 3);
    }

    #[test]
    fn test_undefined_label() {
        let r = assemble_src(&program(&["main: NOP", "NOP", "RJMP nowhere"]));
        assert_asm_fail(r, AsmErrKind::UndefinedLabel("nowhere".to_string()), 5);

        let r = assemble_src(&program(&["main: CALL nowhere"]));
        assert_asm_fail(r, AsmErrKind::UndefinedLabel("nowhere".to_string()), 3);

        // Not a control flow instruction, but still must be defined
        let r = assemble_src(&program(&["main: LDI R16, nowhere"]));
        assert_asm_fail(r, AsmErrKind::UndefinedLabel("nowhere".to_string()), 3);
    }

    #[test]
    fn test_label_operand_wrong_kind() {
        // A program label is not an integer for LDI
        let r = assemble_src(&program(&["main: LDI R16, main"]));
        assert_category(r, ErrCategory::Operand);
    }

    #[test]
    fn test_out_of_range() {
        let r = assemble_src(&program(&["main: LDI R16, 256"]));
        assert_asm_fail(r, AsmErrKind::InvalidOperand {
            index: 1,
            err: OperandErr::OutOfRange { value: 256, min: 0, max: 255 }
        }, 3);

        let r = assemble_src(&program(&["main: LDI R15, 0"]));
        assert_asm_fail(r, AsmErrKind::InvalidOperand {
            index: 0,
            err: OperandErr::OutOfRange { value: 15, min: 16, max: 31 }
        }, 3);

        // branch displacement too large
        let mut lines = vec!["main: BREQ far"];
        lines.extend(std::iter::repeat("NOP").take(64));
        lines.push("far: NOP");
        let r = assemble_src(&program(&lines));
        assert_category(r, ErrCategory::Operand);
    }

    #[test]
    fn test_operand_shape() {
        let r = assemble_src(&program(&["main: LDI R16 5"]));
        assert_asm_fail(r, AsmErrKind::ExpectedComma, 3);

        let r = assemble_src(&program(&["main: LDI R16"]));
        assert_asm_fail(r, AsmErrKind::WrongOperandCount { mnemonic: Mnemonic::LDI, expected: 2, found: 1 }, 3);

        let r = assemble_src(&program(&["main: LDI R16, 1, 2"]));
        assert_asm_fail(r, AsmErrKind::WrongOperandCount { mnemonic: Mnemonic::LDI, expected: 2, found: 3 }, 3);

        let r = assemble_src(&program(&["main: LDI R16, 5,"]));
        assert_asm_fail(r, AsmErrKind::WrongOperandCount { mnemonic: Mnemonic::LDI, expected: 2, found: 3 }, 3);

        let r = assemble_src(&program(&["main: NOP R0"]));
        assert_asm_fail(r, AsmErrKind::WrongOperandCount { mnemonic: Mnemonic::NOP, expected: 0, found: 1 }, 3);

        let r = assemble_src(&program(&["main: XCH X, R0"]));
        assert_category(r, ErrCategory::Operand);

        let r = assemble_src(&program(&["main: XCH Z, R0", "LD R1, -Y", "STD Z+5, R2"])).unwrap();
        assert_eq!(r.instructions().count(), 3);
    }

    #[test]
    fn test_structure() {
        // no text section at all
        let r = assemble_src(&src(&[".section .data", "x: .byte 1", ".end"]));
        assert_asm_fail(r, AsmErrKind::MissingText, 3);

        let r = assemble_src(&src(&["NOP", ".section .text", ".global main", ".end"]));
        assert_asm_fail(r, AsmErrKind::MissingSection, 1);

        let r = assemble_src(&src(&[".section .text", ".global main", "main: NOP"]));
        assert_asm_fail(r, AsmErrKind::MissingEnd, 3);

        let r = assemble_src(&src(&[".section .text", ".global main", ".section .data", ".end"]));
        assert_asm_fail(r, AsmErrKind::DataAfterText, 3);

        let r = assemble_src(&src(&[".section .text", ".global main", ".section .text", ".end"]));
        assert_asm_fail(r, AsmErrKind::DuplicateSection, 3);

        let r = assemble_src(&src(&[".section .text", ".global main", ".end", "main: NOP", ".end"]));
        assert_asm_fail(r, AsmErrKind::EarlyEnd, 3);

        let r = assemble_src(&src(&[".section", ".global main", ".end"]));
        assert_asm_fail(r, AsmErrKind::MalformedSection, 1);

        let r = assemble_src("");
        assert_asm_fail(r, AsmErrKind::MissingSection, 1);

        // structure is checked before anything else
        let r = assemble_src(&src(&[".section .data", "x: .byte 1000", "FOO R99", ".end"]));
        assert_category(r, ErrCategory::Structural);
    }

    #[test]
    fn test_token_errors() {
        let r = assemble_src(&program(&["main: LDI R32, 0"]));
        assert_asm_fail(r, AsmErrKind::InvalidReg(32), 3);

        let r = assemble_src(&program(&["main: FOO R0"]));
        assert_asm_fail(r, AsmErrKind::UnknownMnemonic("FOO".to_string()), 3);

        let r = assemble_src(&src(&[".section .data", ".word 1", ".section .text", ".global main", ".end"]));
        assert_asm_fail(r, AsmErrKind::UnknownDirective("word".to_string()), 2);

        let r = assemble_src(&program(&["main: 5"]));
        assert_asm_fail(r, AsmErrKind::ExpectedInstruction, 3);
    }

    #[test]
    fn test_data_errors() {
        fn data(line: &str) -> String {
            src(&[".section .data", line, ".section .text", ".global main", ".end"])
        }

        assert_asm_fail(assemble_src(&data(".byte 256")), AsmErrKind::ByteOutOfRange(256), 2);
        assert_asm_fail(assemble_src(&data(".byte -129")), AsmErrKind::ByteOutOfRange(-129), 2);
        assert_asm_fail(assemble_src(&data(".byte 1 2")), AsmErrKind::ExpectedValueComma, 2);
        assert_asm_fail(assemble_src(&data(".byte 1,")), AsmErrKind::ExpectedValue, 2);
        assert_asm_fail(assemble_src(&data(".byte , 1")), AsmErrKind::ExpectedValue, 2);
        assert_asm_fail(assemble_src(&data(".byte 1,, 2")), AsmErrKind::ExpectedValue, 2);
        assert_asm_fail(assemble_src(&data(".byte \"a\"")), AsmErrKind::WrongValueKind(DirectiveKind::Byte), 2);
        assert_asm_fail(assemble_src(&data(".ascii 5")), AsmErrKind::WrongValueKind(DirectiveKind::Ascii), 2);
        assert_asm_fail(assemble_src(&data(".asciz \"caf\u{e9}\"")), AsmErrKind::NonAsciiChar('\u{e9}'), 2);
        assert_asm_fail(assemble_src(&data(".space -1")), AsmErrKind::SpaceOutOfRange(-1), 2);
        assert_asm_fail(assemble_src(&data(".space 1, 2, 3")), AsmErrKind::WrongValueCount(DirectiveKind::Space), 2);
        assert_asm_fail(assemble_src(&data(".def temp R16")), AsmErrKind::MalformedDef, 2);
        assert_asm_fail(assemble_src(&data("LDI R16, 0")), AsmErrKind::ExpectedDataDirective, 2);
        assert_asm_fail(assemble_src(&data(".global main")), AsmErrKind::ExpectedDataDirective, 2);

        // 0xFF00 bytes fill data memory up to 0xFFFF exactly
        assemble_src(&data(".space 0xFF00")).unwrap();
        assert_asm_fail(assemble_src(&data(".space 0xFF01")), AsmErrKind::DataOverflow, 2);
    }

    #[test]
    fn test_labels() {
        let r = assemble_src(&program(&["main: NOP", "main: NOP"]));
        assert_asm_fail(r, AsmErrKind::DuplicateLabel("main".to_string()), 4);

        // aliases share the namespace with labels
        let r = assemble_src(&src(&[
            ".section .data",
            ".def main = R16",
            ".section .text",
            ".global main",
            "main: NOP",
            ".end",
        ]));
        assert_asm_fail(r, AsmErrKind::DuplicateLabel("main".to_string()), 5);

        // labels are case-sensitive
        let r = assemble_src(&program(&["main: NOP", "Main: RJMP main"]));
        assert!(r.is_ok());

        let r = assemble_src(&program(&["main: NOP", "NOP loop:"]));
        assert_asm_fail(r, AsmErrKind::LabelNotFirst("loop".to_string()), 4);
    }

    #[test]
    fn test_entry() {
        let r = assemble_src(&src(&[".section .text", "main: NOP", ".end"]));
        assert_asm_fail(r, AsmErrKind::MissingGlobal, 2);

        let r = assemble_src(&src(&[".section .text", ".global", ".end"]));
        assert_asm_fail(r, AsmErrKind::MissingGlobal, 2);

        let r = assemble_src(&program(&["start: NOP"]));
        assert_asm_fail(r, AsmErrKind::EntryMismatch { expected: "main".to_string(), found: "start".to_string() }, 3);

        let r = assemble_src(&program(&["NOP", "main: NOP"]));
        assert_asm_fail(r, AsmErrKind::EntryNotFirst("main".to_string()), 2);

        // entry label on a line of its own
        let asm = assemble_src(&program(&["main:", "NOP"])).unwrap();
        assert_eq!(asm.symbols().lookup_program("main"), Some(0));

        // no instructions at all
        let asm = assemble_src(&program(&[])).unwrap();
        assert!(asm.program().is_empty());
    }

    #[test]
    fn test_error_categories() {
        assert_category(assemble_src(&program(&["main: RJMP nowhere"])), ErrCategory::Label);
        assert_category(assemble_src(&program(&["main: LDI R16, 256"])), ErrCategory::Operand);
        assert_category(assemble_src(&program(&["main: LDI R99, 0"])), ErrCategory::Token);
        assert_category(assemble_src(".section .text\n.global main\nmain: LDI R16, `"), ErrCategory::Lex);

        let e = assemble_src(&program(&["main: RJMP nowhere"])).unwrap_err();
        assert_eq!(e.line(), Some(3));
        assert!(e.help().is_some());
    }
}
