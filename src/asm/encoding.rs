//! Bit templates for every instruction, and the encoder which fills them in.
//!
//! Each mnemonic has an opcode [`Template`]: either a fixed bit string
//! (for instructions which take no operands) or a bit string with placeholder symbols,
//! alongside [`Slot`]s describing which operand fills each placeholder.
//!
//! The width of each operand's field is the number of times its symbol occurs in the template.
//! For example, in `ADD`'s template `000011rdddddrrrr`, `d` is 5 bits wide and `r` is 5 bits wide,
//! with the top bit of `r` split off from the rest.
//! Fields are filled in left to right, most significant bit first.
//!
//! ```
//! use avr_ensemble::asm::encoding::encode;
//! use avr_ensemble::ast::Mnemonic;
//! use avr_ensemble::parse::lex::Token;
//!
//! let opcode = encode(Mnemonic::ADD, &[Token::Reg(5), Token::Reg(6)]).unwrap();
//! assert_eq!(opcode.to_string(), "0000110001010110");
//! ```
//!
//! Operands of relative control flow instructions (branches and `RJMP`)
//! are encoded as two's complement. All other operands are encoded as unsigned integers.

use crate::ast::{Mnemonic, Pointer};
use crate::parse::lex::{Displacement, Token};

/// A transformation applied to an operand's value before it is written into its field.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Field {
    /// The value as is.
    Plain,
    /// A register from R16-R31, encoded as its offset from R16.
    High,
    /// An even register, encoded as half its index (as in `MOVW`).
    Even,
    /// A register from {R24, R26, R28, R30}, encoded as its index in that set (as in `ADIW`).
    Pair,
    /// The bitwise complement of an 8-bit value (as in `CBR`).
    Invert,
}
impl Field {
    fn apply(self, value: i64) -> i64 {
        match self {
            Field::Plain  => value,
            Field::High   => value - 16,
            Field::Even   => value / 2,
            Field::Pair   => (value - 24) / 2,
            Field::Invert => 255 - value,
        }
    }
}

/// A placeholder in a [`Template`] and the operand it is filled with.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Slot {
    /// The placeholder character in the template's bit string.
    pub symbol: char,
    /// The index of the operand which fills this placeholder.
    pub operand: usize,
    /// How the operand is transformed before being written.
    pub field: Field,
}
const fn slot(symbol: char, operand: usize) -> Slot {
    Slot { symbol, operand, field: Field::Plain }
}
const fn slot_as(symbol: char, operand: usize, field: Field) -> Slot {
    Slot { symbol, operand, field }
}

/// An opcode template.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Template {
    /// An opcode which never changes.
    Fixed(&'static str),
    /// An opcode with placeholders to substitute operands into.
    Bits {
        /// The operands to substitute.
        slots: &'static [Slot],
        /// The bit string (16 or 32 characters), with placeholders.
        bits: &'static str
    },
}

const D: &[Slot] = &[slot('d', 0)];
const R: &[Slot] = &[slot('r', 0)];
const K: &[Slot] = &[slot('k', 0)];
const S: &[Slot] = &[slot('s', 0)];
const DR: &[Slot] = &[slot('d', 0), slot('r', 1)];
const DD: &[Slot] = &[slot('d', 0), slot('r', 0)];
const SK: &[Slot] = &[slot('s', 0), slot('k', 1)];
const AB: &[Slot] = &[slot('A', 0), slot('b', 1)];
const RB: &[Slot] = &[slot('r', 0), slot('b', 1)];
const DA: &[Slot] = &[slot('d', 0), slot('A', 1)];
const AR: &[Slot] = &[slot('A', 0), slot('r', 1)];
const DK: &[Slot] = &[slot('d', 0), slot('k', 1)];
const KR: &[Slot] = &[slot('k', 0), slot('r', 1)];
const HIGH_D: &[Slot] = &[slot_as('d', 0, Field::High)];
const HIGH_DK: &[Slot] = &[slot_as('d', 0, Field::High), slot('K', 1)];
const HIGH_D_INVERT_K: &[Slot] = &[slot_as('d', 0, Field::High), slot_as('K', 1, Field::Invert)];
const EVEN_DR: &[Slot] = &[slot_as('d', 0, Field::Even), slot_as('r', 1, Field::Even)];
const HIGH_DR: &[Slot] = &[slot_as('d', 0, Field::High), slot_as('r', 1, Field::High)];
const PAIR_DK: &[Slot] = &[slot_as('d', 0, Field::Pair), slot('K', 1)];
const LOAD: &[Slot] = &[slot('d', 0)];
const STORE: &[Slot] = &[slot('r', 1)];
const LOAD_Q: &[Slot] = &[slot('d', 0), slot('q', 1)];
const STORE_Q: &[Slot] = &[slot('q', 0), slot('r', 1)];
// XCH's first operand is always Z, which is not encoded.
const LOAD_EXCHANGE: &[Slot] = &[slot('d', 1)];

const fn bits(slots: &'static [Slot], bits: &'static str) -> Template {
    Template::Bits { slots, bits }
}

/// Gets the template of a mnemonic.
///
/// The indirect loads and stores (`LD`, `ST`, `LDD`, `STD`) have a different template
/// for each addressing mode, so the template is chosen by the kind of the pointer operand.
/// If the pointer operand is missing or is not a pointer, this returns `None`.
pub fn template(m: Mnemonic, operands: &[Token]) -> Option<Template> {
    use Mnemonic::*;

    let t = match m {
        ADC   => bits(DR, "000111rdddddrrrr"),
        ADD   => bits(DR, "000011rdddddrrrr"),
        ADIW  => bits(PAIR_DK, "10010110KKddKKKK"),
        AND   => bits(DR, "001000rdddddrrrr"),
        ANDI  => bits(HIGH_DK, "0111KKKKddddKKKK"),
        ASR   => bits(D, "1001010ddddd0101"),
        BCLR  => bits(S, "100101001sss1000"),
        BRBC  => bits(SK, "111101kkkkkkksss"),
        BRBS  => bits(SK, "111100kkkkkkksss"),
        BRCC  => bits(K, "111101kkkkkkk000"),
        BRCS  => bits(K, "111100kkkkkkk000"),
        BREQ  => bits(K, "111100kkkkkkk001"),
        BRGE  => bits(K, "111101kkkkkkk100"),
        BRHC  => bits(K, "111101kkkkkkk101"),
        BRHS  => bits(K, "111100kkkkkkk101"),
        BRID  => bits(K, "111101kkkkkkk111"),
        BRIE  => bits(K, "111100kkkkkkk111"),
        BRLO  => bits(K, "111100kkkkkkk000"),
        BRLT  => bits(K, "111100kkkkkkk100"),
        BRMI  => bits(K, "111100kkkkkkk010"),
        BRNE  => bits(K, "111101kkkkkkk001"),
        BRPL  => bits(K, "111101kkkkkkk010"),
        BRSH  => bits(K, "111101kkkkkkk000"),
        BRTC  => bits(K, "111101kkkkkkk110"),
        BRTS  => bits(K, "111100kkkkkkk110"),
        BRVC  => bits(K, "111101kkkkkkk011"),
        BRVS  => bits(K, "111100kkkkkkk011"),
        BSET  => bits(S, "100101000sss1000"),
        CALL  => bits(K, "1001010kkkkk111kkkkkkkkkkkkkkkkk"),
        CBI   => bits(AB, "10011000AAAAAbbb"),
        CBR   => bits(HIGH_D_INVERT_K, "0111KKKKddddKKKK"),
        CLC   => Template::Fixed("1001010010001000"),
        CLH   => Template::Fixed("1001010011011000"),
        CLI   => Template::Fixed("1001010011111000"),
        CLN   => Template::Fixed("1001010010101000"),
        CLR   => bits(DD, "001001rdddddrrrr"),
        CLS   => Template::Fixed("1001010011001000"),
        CLT   => Template::Fixed("1001010011101000"),
        CLV   => Template::Fixed("1001010010111000"),
        CLZ   => Template::Fixed("1001010010011000"),
        COM   => bits(D, "1001010ddddd0000"),
        CP    => bits(DR, "000101rdddddrrrr"),
        CPC   => bits(DR, "000001rdddddrrrr"),
        CPI   => bits(HIGH_DK, "0011KKKKddddKKKK"),
        DEC   => bits(D, "1001010ddddd1010"),
        EOR   => bits(DR, "001001rdddddrrrr"),
        IN    => bits(DA, "10110AAdddddAAAA"),
        INC   => bits(D, "1001010ddddd0011"),
        JMP   => bits(K, "1001010kkkkk110kkkkkkkkkkkkkkkkk"),
        LD    => bits(LOAD, match operands.get(1)? {
            Token::Word(Pointer::X)      => "1001000ddddd1100",
            Token::WordPlus(Pointer::X)  => "1001000ddddd1101",
            Token::MinusWord(Pointer::X) => "1001000ddddd1110",
            Token::Word(Pointer::Y)      => "1000000ddddd1000",
            Token::WordPlus(Pointer::Y)  => "1001000ddddd1001",
            Token::MinusWord(Pointer::Y) => "1001000ddddd1010",
            Token::Word(Pointer::Z)      => "1000000ddddd0000",
            Token::WordPlus(Pointer::Z)  => "1001000ddddd0001",
            Token::MinusWord(Pointer::Z) => "1001000ddddd0010",
            _ => return None
        }),
        LDD   => bits(LOAD_Q, match operands.get(1)? {
            Token::WordPlusQ(Displacement { pointer: Pointer::Y, .. }) => "10q0qq0ddddd1qqq",
            Token::WordPlusQ(Displacement { pointer: Pointer::Z, .. }) => "10q0qq0ddddd0qqq",
            _ => return None
        }),
        LDI   => bits(HIGH_DK, "1110KKKKddddKKKK"),
        LDS   => bits(DK, "1001000ddddd0000kkkkkkkkkkkkkkkk"),
        LSL   => bits(DD, "000011rdddddrrrr"),
        LSR   => bits(D, "1001010ddddd0110"),
        MOV   => bits(DR, "001011rdddddrrrr"),
        MOVW  => bits(EVEN_DR, "00000001ddddrrrr"),
        MUL   => bits(DR, "100111rdddddrrrr"),
        MULS  => bits(HIGH_DR, "00000010ddddrrrr"),
        MULSU => bits(HIGH_DR, "000000110ddd0rrr"),
        NEG   => bits(D, "1001010ddddd0001"),
        NOP   => Template::Fixed("0000000000000000"),
        OR    => bits(DR, "001010rdddddrrrr"),
        ORI   => bits(HIGH_DK, "0110KKKKddddKKKK"),
        OUT   => bits(AR, "10111AArrrrrAAAA"),
        POP   => bits(D, "1001000ddddd1111"),
        PUSH  => bits(R, "1001001rrrrr1111"),
        RET   => Template::Fixed("1001010100001000"),
        RJMP  => bits(K, "1100kkkkkkkkkkkk"),
        ROL   => bits(DD, "000111rdddddrrrr"),
        ROR   => bits(D, "1001010ddddd0111"),
        SBC   => bits(DR, "000010rdddddrrrr"),
        SBI   => bits(AB, "10011010AAAAAbbb"),
        SBIW  => bits(PAIR_DK, "10010111KKddKKKK"),
        SBR   => bits(HIGH_DK, "0110KKKKddddKKKK"),
        SBRC  => bits(RB, "1111110rrrrr0bbb"),
        SBRS  => bits(RB, "1111111rrrrr0bbb"),
        SEC   => Template::Fixed("1001010000001000"),
        SEH   => Template::Fixed("1001010001011000"),
        SEI   => Template::Fixed("1001010001111000"),
        SEN   => Template::Fixed("1001010000101000"),
        SER   => bits(HIGH_D, "11101111dddd1111"),
        SES   => Template::Fixed("1001010001001000"),
        SET   => Template::Fixed("1001010001101000"),
        SEV   => Template::Fixed("1001010000111000"),
        SEZ   => Template::Fixed("1001010000011000"),
        ST    => bits(STORE, match operands.first()? {
            Token::Word(Pointer::X)      => "1001001rrrrr1100",
            Token::WordPlus(Pointer::X)  => "1001001rrrrr1101",
            Token::MinusWord(Pointer::X) => "1001001rrrrr1110",
            Token::Word(Pointer::Y)      => "1000001rrrrr1000",
            Token::WordPlus(Pointer::Y)  => "1001001rrrrr1001",
            Token::MinusWord(Pointer::Y) => "1001001rrrrr1010",
            Token::Word(Pointer::Z)      => "1000001rrrrr0000",
            Token::WordPlus(Pointer::Z)  => "1001001rrrrr0001",
            Token::MinusWord(Pointer::Z) => "1001001rrrrr0010",
            _ => return None
        }),
        STD   => bits(STORE_Q, match operands.first()? {
            Token::WordPlusQ(Displacement { pointer: Pointer::Y, .. }) => "10q0qq1rrrrr1qqq",
            Token::WordPlusQ(Displacement { pointer: Pointer::Z, .. }) => "10q0qq1rrrrr0qqq",
            _ => return None
        }),
        STS   => bits(KR, "1001001rrrrr0000kkkkkkkkkkkkkkkk"),
        SUB   => bits(DR, "000110rdddddrrrr"),
        SUBI  => bits(HIGH_DK, "0101KKKKddddKKKK"),
        SWAP  => bits(D, "1001010ddddd0010"),
        TST   => bits(DD, "001000rdddddrrrr"),
        XCH   => bits(LOAD_EXCHANGE, "1001001ddddd0100"),
    };

    Some(t)
}

/// Errors which can occur when filling in a [`Template`].
///
/// These cannot occur for operands which passed their [`crate::asm::operand::ArgumentSpec`]s.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum EncodeErr {
    /// The mnemonic has no template for the given addressing mode.
    NoTemplate(Mnemonic),
    /// A slot referred to an operand which wasn't provided.
    MissingOperand(usize),
    /// A slot referred to an operand which has no numeric value.
    NotNumeric(usize),
    /// The value could not fit in its field.
    DoesNotFit {
        /// The value after its field transformation.
        value: i64,
        /// The width of the field.
        width: usize
    },
}
impl std::fmt::Display for EncodeErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeErr::NoTemplate(m)        => write!(f, "{m} has no encoding for these operands"),
            EncodeErr::MissingOperand(i)    => write!(f, "missing operand {}", i + 1),
            EncodeErr::NotNumeric(i)        => write!(f, "operand {} has no numeric value", i + 1),
            EncodeErr::DoesNotFit { value, width } => write!(f, "value {value} cannot fit in {width} bits"),
        }
    }
}
impl std::error::Error for EncodeErr {}

/// An opcode: a bit string of exactly 16 or 32 characters, each `0` or `1`.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Opcode(String);
impl Opcode {
    /// The opcode of `NOP`.
    pub fn nop() -> Self {
        Opcode("0".repeat(16))
    }

    /// The bit string of this opcode.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The number of bits in this opcode (16 or 32).
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The opcode as 16-bit words, most significant word first.
    ///
    /// ```
    /// use avr_ensemble::asm::encoding::encode;
    /// use avr_ensemble::ast::Mnemonic;
    /// use avr_ensemble::parse::lex::Token;
    ///
    /// let opcode = encode(Mnemonic::JMP, &[Token::Int(0x1234)]).unwrap();
    /// assert_eq!(opcode.words(), [0x940C, 0x1234]);
    /// ```
    pub fn words(&self) -> Vec<u16> {
        self.0.as_bytes()
            .chunks(16)
            .map(|chunk| chunk.iter().fold(0, |acc, &b| (acc << 1) | u16::from(b == b'1')))
            .collect()
    }
}
impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encodes an instruction with its operands.
///
/// The operands are expected to have been resolved (labels replaced with integers).
/// This does not check operand legality beyond what is needed to fill in the template.
pub fn encode(m: Mnemonic, operands: &[Token]) -> Result<Opcode, EncodeErr> {
    let (slots, template) = match template(m, operands).ok_or(EncodeErr::NoTemplate(m))? {
        Template::Fixed(bits) => return Ok(Opcode(bits.to_string())),
        Template::Bits { slots, bits } => (slots, bits),
    };
    let signed = m.is_relative();

    let mut fields = Vec::with_capacity(slots.len());
    for slot in slots {
        let width = template.chars().filter(|&c| c == slot.symbol).count();
        // Operand is required, but not encoded.
        if width == 0 { continue; }

        let value = operands.get(slot.operand)
            .ok_or(EncodeErr::MissingOperand(slot.operand))?
            .numeric()
            .ok_or(EncodeErr::NotNumeric(slot.operand))?;
        let value = slot.field.apply(value);

        let rendered = render(value, width, signed)
            .ok_or(EncodeErr::DoesNotFit { value, width })?;
        fields.push((slot.symbol, rendered));
    }

    let mut cursors: Vec<_> = fields.iter()
        .map(|(symbol, rendered)| (*symbol, rendered.chars()))
        .collect();

    let mut out = String::with_capacity(template.len());
    for c in template.chars() {
        match cursors.iter_mut().find(|(symbol, _)| *symbol == c) {
            Some((_, bits)) => out.extend(bits.next()),
            None => out.push(c),
        }
    }

    Ok(Opcode(out))
}

/// Renders a value as a zero-padded binary string of the given width.
///
/// If `signed` is set, negative values are rendered in two's complement.
/// Returns `None` if the value does not fit.
fn render(value: i64, width: usize, signed: bool) -> Option<String> {
    let max = (1i64 << width) - 1;
    let min = match signed {
        true  => -(1i64 << (width - 1)),
        false => 0,
    };
    if !(min..=max).contains(&value) {
        return None;
    }

    let masked = (value as u64) & (max as u64);
    Some(format!("{masked:0width$b}"))
}
