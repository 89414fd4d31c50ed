//! Names used throughout assembly source.
//!
//! This module holds the closed sets of names the assembler recognizes:
//! - [`Mnemonic`]: the fixed instruction table,
//! - [`DirectiveKind`]: the known directives,
//! - [`Pointer`]: the `X`, `Y`, `Z` pointer registers used by the indirect addressing modes.

/// Error raised when a name is not one of a closed set of names.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct UnknownName;

macro_rules! mnemonic_enum {
    ($($instr:ident),+ $(,)?) => {
        /// An instruction mnemonic.
        ///
        /// Mnemonics are case-insensitive in source
        /// and are always displayed in upper case.
        #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
        pub enum Mnemonic {
            $(
                #[allow(missing_docs)]
                $instr
            ),+
        }

        impl Mnemonic {
            /// Every mnemonic in the instruction table.
            pub const ALL: &'static [Mnemonic] = &[$(Mnemonic::$instr),+];
        }

        impl std::str::FromStr for Mnemonic {
            type Err = UnknownName;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match &*s.to_uppercase() {
                    $(stringify!($instr) => Ok(Self::$instr)),*,
                    _ => Err(UnknownName)
                }
            }
        }

        impl std::fmt::Display for Mnemonic {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$instr => f.write_str(stringify!($instr))),*
                }
            }
        }
    };
}
mnemonic_enum! {
    ADC, ADD, ADIW, AND, ANDI, ASR, BCLR,
    BRBC, BRBS, BRCC, BRCS, BREQ, BRGE, BRHC, BRHS, BRID, BRIE,
    BRLO, BRLT, BRMI, BRNE, BRPL, BRSH, BRTC, BRTS, BRVC, BRVS,
    BSET, CALL, CBI, CBR, CLC, CLH, CLI, CLN, CLR, CLS, CLT, CLV, CLZ,
    COM, CP, CPC, CPI, DEC, EOR, IN, INC, JMP, LD, LDD, LDI, LDS,
    LSL, LSR, MOV, MOVW, MUL, MULS, MULSU, NEG, NOP, OR, ORI, OUT,
    POP, PUSH, RJMP, RET, ROL, ROR, SBC, SBI, SBIW, SBR, SBRC, SBRS,
    SEC, SEH, SEI, SEN, SER, SES, SET, SEV, SEZ, ST, STD, STS,
    SUB, SUBI, SWAP, TST, XCH
}

impl Mnemonic {
    /// Whether this is a relative control-flow instruction
    /// (every conditional branch and `RJMP`).
    ///
    /// Label operands of these instructions resolve to a signed displacement
    /// from the next instruction, and their operands encode as two's complement.
    pub fn is_relative(self) -> bool {
        use Mnemonic::*;
        matches!(self,
            BRBC | BRBS | BRCC | BRCS | BREQ | BRGE | BRHC | BRHS | BRID | BRIE |
            BRLO | BRLT | BRMI | BRNE | BRPL | BRSH | BRTC | BRTS | BRVC | BRVS |
            RJMP
        )
    }

    /// Whether this is an absolute control-flow instruction (`CALL`, `JMP`).
    ///
    /// Label operands of these instructions resolve to the label's program memory index.
    pub fn is_absolute(self) -> bool {
        matches!(self, Mnemonic::CALL | Mnemonic::JMP)
    }

    /// Whether this instruction has a 32-bit opcode and occupies two program memory words.
    pub fn is_double_word(self) -> bool {
        matches!(self, Mnemonic::CALL | Mnemonic::JMP | Mnemonic::LDS | Mnemonic::STS)
    }

    /// How many 16-bit words this instruction occupies in program memory.
    pub fn word_len(self) -> usize {
        match self.is_double_word() {
            true  => 2,
            false => 1,
        }
    }
}

/// A directive (e.g., `.section`, `.byte`).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum DirectiveKind {
    /// `.section`, followed by `.data` or `.text`
    Section,
    /// `.end`, the final line of a program
    End,
    /// `.text`, the operand of `.section`
    Text,
    /// `.data`, the operand of `.section`
    Data,
    /// `.global`, names the entry function
    Global,
    /// `.byte v, v, ...`
    Byte,
    /// `.string "..."`, NUL-terminated
    String,
    /// `.ascii "..."`
    Ascii,
    /// `.asciz "..."`, NUL-terminated
    Asciz,
    /// `.space n` or `.space n, v`
    Space,
    /// `.def name = Rn`, a register alias
    Def,
}
impl std::str::FromStr for DirectiveKind {
    type Err = UnknownName;

    /// Parses a directive name (without its leading `.`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "section" => Ok(Self::Section),
            "end"     => Ok(Self::End),
            "text"    => Ok(Self::Text),
            "data"    => Ok(Self::Data),
            "global"  => Ok(Self::Global),
            "byte"    => Ok(Self::Byte),
            "string"  => Ok(Self::String),
            "ascii"   => Ok(Self::Ascii),
            "asciz"   => Ok(Self::Asciz),
            "space"   => Ok(Self::Space),
            "def"     => Ok(Self::Def),
            _ => Err(UnknownName)
        }
    }
}
impl std::fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Section => "section",
            Self::End     => "end",
            Self::Text    => "text",
            Self::Data    => "data",
            Self::Global  => "global",
            Self::Byte    => "byte",
            Self::String  => "string",
            Self::Ascii   => "ascii",
            Self::Asciz   => "asciz",
            Self::Space   => "space",
            Self::Def     => "def",
        };
        write!(f, ".{name}")
    }
}

/// One of the 16-bit pointer registers (`X` = R27:R26, `Y` = R29:R28, `Z` = R31:R30).
///
/// These appear in the indirect addressing modes of `LD`, `LDD`, `ST`, `STD`, and `XCH`:
/// ```text
/// LD R0, X
///        ~
/// ST -Y, R1
///     ~
/// LDD R2, Z+4
///         ~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Pointer {
    #[allow(missing_docs)]
    X,
    #[allow(missing_docs)]
    Y,
    #[allow(missing_docs)]
    Z,
}
impl Pointer {
    /// Parses a pointer register from its letter.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'X' => Some(Pointer::X),
            'Y' => Some(Pointer::Y),
            'Z' => Some(Pointer::Z),
            _ => None
        }
    }
}
impl std::fmt::Display for Pointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pointer::X => f.write_str("X"),
            Pointer::Y => f.write_str("Y"),
            Pointer::Z => f.write_str("Z"),
        }
    }
}
