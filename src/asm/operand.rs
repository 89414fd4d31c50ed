//! Operand legality for every instruction.
//!
//! Each mnemonic has a fixed list of [`ArgumentSpec`]s (see [`operand_specs`]),
//! one per operand position.
//! An [`ArgumentSpec`] names which kinds of tokens are accepted in its position
//! and at most one [`Constraint`] on the token's value.
//!
//! For example, `LDI` accepts a register from R16-R31, then an integer from 0-255:
//! ```
//! use avr_ensemble::asm::operand::operand_specs;
//! use avr_ensemble::ast::Mnemonic;
//! use avr_ensemble::parse::lex::Token;
//!
//! let [reg, imm] = operand_specs(Mnemonic::LDI) else { panic!("LDI has two operands") };
//! assert!(reg.check(&Token::Reg(16)).is_ok());
//! assert!(reg.check(&Token::Reg(15)).is_err());
//! assert!(imm.check(&Token::Int(255)).is_ok());
//! assert!(imm.check(&Token::Int(256)).is_err());
//! ```

use std::borrow::Cow;

use crate::ast::Mnemonic;
use crate::parse::lex::{Token, TokenKind};

/// A restriction on an operand's value.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Constraint {
    /// Any value of an accepted kind.
    None,
    /// The numeric value must be within this inclusive range.
    Range(i64, i64),
    /// The numeric value must be one of these values.
    OneOf(&'static [i64]),
    /// The token must render exactly as this text.
    Exact(&'static str),
}

/// The legality descriptor for one operand position.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct ArgumentSpec {
    /// Token kinds accepted in this position.
    pub kinds: &'static [TokenKind],
    /// Restriction on the accepted token's value.
    pub constraint: Constraint,
}

/// Reasons an operand can fail its [`ArgumentSpec`].
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum OperandErr {
    /// Token is not one of the accepted kinds.
    WrongKind {
        /// The accepted kinds.
        expected: &'static [TokenKind],
        /// The kind of the token that was found.
        found: TokenKind
    },
    /// Numeric value was outside of the accepted range.
    OutOfRange {
        /// The value found.
        value: i64,
        /// The minimum accepted value.
        min: i64,
        /// The maximum accepted value.
        max: i64
    },
    /// Numeric value was not one of the accepted values.
    NotInSet {
        /// The value found.
        value: i64,
        /// The accepted values.
        set: &'static [i64]
    },
    /// Token did not match the one literal allowed.
    NotExact {
        /// The literal expected.
        expected: &'static str,
        /// The rendering of the token found.
        found: String
    },
}
impl std::fmt::Display for OperandErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperandErr::WrongKind { expected, found } => {
                f.write_str("expected ")?;
                for (i, kind) in expected.iter().enumerate() {
                    if i != 0 { f.write_str(" or ")?; }
                    kind.fmt(f)?;
                }
                write!(f, ", found {found}")
            },
            OperandErr::OutOfRange { value, min, max } => write!(f, "value {value} is not within [{min}, {max}]"),
            OperandErr::NotInSet { value, set } => write!(f, "value {value} is not one of {set:?}"),
            OperandErr::NotExact { expected, found } => write!(f, "expected {expected}, found {found}"),
        }
    }
}
impl std::error::Error for OperandErr {}
impl OperandErr {
    pub(crate) fn help(&self) -> Option<Cow<str>> {
        match self {
            OperandErr::WrongKind { expected, .. } if expected.contains(&TokenKind::Int) => {
                Some("labels are only accepted by CALL, JMP, RJMP, and branches; data labels and lo8/hi8 resolve to integers".into())
            },
            OperandErr::WrongKind { .. } => None,
            OperandErr::OutOfRange { .. } => None,
            OperandErr::NotInSet { set, .. } if set.iter().all(|&n| n % 2 == 0) => Some("this operand must be an even register".into()),
            OperandErr::NotInSet { .. } => None,
            OperandErr::NotExact { expected, .. } => Some(format!("only {expected} is accepted here").into()),
        }
    }
}

impl ArgumentSpec {
    const fn new(kinds: &'static [TokenKind], constraint: Constraint) -> Self {
        Self { kinds, constraint }
    }

    /// Checks whether the token is legal in this operand position.
    ///
    /// The numeric value used for range and set checks is a register's index,
    /// an integer's value, or the displacement of a `Y+q`/`Z+q` operand.
    pub fn check(&self, token: &Token) -> Result<(), OperandErr> {
        let found = token.kind();
        if !self.kinds.contains(&found) {
            return Err(OperandErr::WrongKind { expected: self.kinds, found });
        }

        match self.constraint {
            Constraint::None => Ok(()),
            Constraint::Range(min, max) => {
                let value = self.numeric(token)?;
                match (min..=max).contains(&value) {
                    true  => Ok(()),
                    false => Err(OperandErr::OutOfRange { value, min, max }),
                }
            },
            Constraint::OneOf(set) => {
                let value = self.numeric(token)?;
                match set.contains(&value) {
                    true  => Ok(()),
                    false => Err(OperandErr::NotInSet { value, set }),
                }
            },
            Constraint::Exact(expected) => {
                let found = token.to_string();
                match found == expected {
                    true  => Ok(()),
                    false => Err(OperandErr::NotExact { expected, found }),
                }
            },
        }
    }

    fn numeric(&self, token: &Token) -> Result<i64, OperandErr> {
        token.numeric()
            .ok_or(OperandErr::WrongKind { expected: self.kinds, found: token.kind() })
    }
}

const REG: &[TokenKind] = &[TokenKind::Reg];
const INT: &[TokenKind] = &[TokenKind::Int];

const REG_0_31: ArgumentSpec = ArgumentSpec::new(REG, Constraint::Range(0, 31));
const REG_16_31: ArgumentSpec = ArgumentSpec::new(REG, Constraint::Range(16, 31));
const REG_16_23: ArgumentSpec = ArgumentSpec::new(REG, Constraint::Range(16, 23));
const REG_EVEN: ArgumentSpec = ArgumentSpec::new(REG, Constraint::OneOf(&[0, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30]));
const REG_WORD: ArgumentSpec = ArgumentSpec::new(REG, Constraint::OneOf(&[24, 26, 28, 30]));
const INT_0_7: ArgumentSpec = ArgumentSpec::new(INT, Constraint::Range(0, 7));
const INT_0_31: ArgumentSpec = ArgumentSpec::new(INT, Constraint::Range(0, 31));
const INT_0_63: ArgumentSpec = ArgumentSpec::new(INT, Constraint::Range(0, 63));
const INT_0_255: ArgumentSpec = ArgumentSpec::new(INT, Constraint::Range(0, 255));
const INT_N64_63: ArgumentSpec = ArgumentSpec::new(INT, Constraint::Range(-64, 63));
const INT_N2048_2047: ArgumentSpec = ArgumentSpec::new(INT, Constraint::Range(-2048, 2047));
const INT_FAR: ArgumentSpec = ArgumentSpec::new(INT, Constraint::Range(0, 4194303));
const INT_SRAM: ArgumentSpec = ArgumentSpec::new(INT, Constraint::Range(256, 65535));
const POINTER: ArgumentSpec = ArgumentSpec::new(&[TokenKind::Word, TokenKind::MinusWord, TokenKind::WordPlus], Constraint::None);
const DISPLACED: ArgumentSpec = ArgumentSpec::new(&[TokenKind::WordPlusQ], Constraint::Range(0, 63));
const EXACTLY_Z: ArgumentSpec = ArgumentSpec::new(&[TokenKind::Word], Constraint::Exact("Z"));

const NONE: &[ArgumentSpec] = &[];
const ONE_REG: &[ArgumentSpec] = &[REG_0_31];
const TWO_REGS: &[ArgumentSpec] = &[REG_0_31, REG_0_31];
const HIGH_REG_IMM: &[ArgumentSpec] = &[REG_16_31, INT_0_255];
const WORD_IMM: &[ArgumentSpec] = &[REG_WORD, INT_0_63];
const FLAG: &[ArgumentSpec] = &[INT_0_7];
const FLAG_BRANCH: &[ArgumentSpec] = &[INT_0_7, INT_N64_63];
const BRANCH: &[ArgumentSpec] = &[INT_N64_63];
const FAR: &[ArgumentSpec] = &[INT_FAR];
const IO_BIT: &[ArgumentSpec] = &[INT_0_31, INT_0_7];
const REG_BIT: &[ArgumentSpec] = &[REG_0_31, INT_0_7];

/// The operand specs of a mnemonic, one per operand position.
///
/// An empty slice means the mnemonic takes no operands.
pub fn operand_specs(m: Mnemonic) -> &'static [ArgumentSpec] {
    use Mnemonic::*;

    match m {
        ADC | ADD | AND | CP | CPC | EOR | MOV | MUL | OR | SBC | SUB => TWO_REGS,
        ASR | CLR | COM | DEC | INC | LSL | LSR | NEG | POP | PUSH | ROL | ROR | SWAP | TST => ONE_REG,
        ANDI | CBR | CPI | LDI | ORI | SBR | SUBI => HIGH_REG_IMM,
        ADIW | SBIW => WORD_IMM,
        BCLR | BSET => FLAG,
        BRBC | BRBS => FLAG_BRANCH,
        BRCC | BRCS | BREQ | BRGE | BRHC | BRHS | BRID | BRIE | BRLO | BRLT |
        BRMI | BRNE | BRPL | BRSH | BRTC | BRTS | BRVC | BRVS => BRANCH,
        CALL | JMP => FAR,
        CBI | SBI => IO_BIT,
        SBRC | SBRS => REG_BIT,
        CLC | CLH | CLI | CLN | CLS | CLT | CLV | CLZ | NOP | RET |
        SEC | SEH | SEI | SEN | SES | SET | SEV | SEZ => NONE,
        IN    => &[REG_0_31, INT_0_63],
        OUT   => &[INT_0_63, REG_0_31],
        LD    => &[REG_0_31, POINTER],
        ST    => &[POINTER, REG_0_31],
        LDD   => &[REG_0_31, DISPLACED],
        STD   => &[DISPLACED, REG_0_31],
        LDS   => &[REG_0_31, INT_SRAM],
        STS   => &[INT_SRAM, REG_0_31],
        MOVW  => &[REG_EVEN, REG_EVEN],
        MULS  => &[REG_16_31, REG_16_31],
        MULSU => &[REG_16_23, REG_16_23],
        RJMP  => &[INT_N2048_2047],
        SER   => &[REG_16_31],
        XCH   => &[EXACTLY_Z, REG_0_31],
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Mnemonic, Pointer};
    use crate::parse::lex::{Displacement, Token, TokenKind};

    use super::{operand_specs, OperandErr};

    #[test]
    fn test_range() {
        let [spec] = operand_specs(Mnemonic::RJMP) else { panic!("RJMP should have one operand") };
        assert_eq!(spec.check(&Token::Int(-2048)), Ok(()));
        assert_eq!(spec.check(&Token::Int(2047)), Ok(()));
        assert_eq!(
            spec.check(&Token::Int(2048)),
            Err(OperandErr::OutOfRange { value: 2048, min: -2048, max: 2047 })
        );
    }

    #[test]
    fn test_wrong_kind() {
        let [spec] = operand_specs(Mnemonic::BREQ) else { panic!("BREQ should have one operand") };
        assert_eq!(
            spec.check(&Token::Reg(3)),
            Err(OperandErr::WrongKind { expected: &[TokenKind::Int], found: TokenKind::Reg })
        );
        assert!(matches!(spec.check(&Token::Ref("loop".to_string())), Err(OperandErr::WrongKind { .. })));
    }

    #[test]
    fn test_set() {
        let [dst, imm] = operand_specs(Mnemonic::ADIW) else { panic!("ADIW should have two operands") };
        assert_eq!(dst.check(&Token::Reg(26)), Ok(()));
        assert!(matches!(dst.check(&Token::Reg(25)), Err(OperandErr::NotInSet { value: 25, .. })));
        assert_eq!(imm.check(&Token::Int(63)), Ok(()));

        let [a, b] = operand_specs(Mnemonic::MOVW) else { panic!("MOVW should have two operands") };
        assert_eq!(a.check(&Token::Reg(30)), Ok(()));
        assert!(b.check(&Token::Reg(31)).is_err());
    }

    #[test]
    fn test_exact() {
        let [z, reg] = operand_specs(Mnemonic::XCH) else { panic!("XCH should have two operands") };
        assert_eq!(z.check(&Token::Word(Pointer::Z)), Ok(()));
        assert_eq!(
            z.check(&Token::Word(Pointer::X)),
            Err(OperandErr::NotExact { expected: "Z", found: "X".to_string() })
        );
        assert_eq!(reg.check(&Token::Reg(0)), Ok(()));
    }

    #[test]
    fn test_displacement_range() {
        let [_, q] = operand_specs(Mnemonic::LDD) else { panic!("LDD should have two operands") };
        let displaced = |q| Token::WordPlusQ(Displacement { pointer: Pointer::Y, q });
        assert_eq!(q.check(&displaced(63)), Ok(()));
        assert!(matches!(q.check(&displaced(64)), Err(OperandErr::OutOfRange { value: 64, .. })));
        assert!(q.check(&Token::Word(Pointer::Y)).is_err());
    }

    #[test]
    fn test_no_operands() {
        for m in [Mnemonic::NOP, Mnemonic::RET, Mnemonic::SEI, Mnemonic::CLZ] {
            assert!(operand_specs(m).is_empty(), "{m} should take no operands");
        }
        assert_eq!(operand_specs(Mnemonic::BRBS).len(), 2);
        assert_eq!(operand_specs(Mnemonic::LD).len(), 2);
    }
}
