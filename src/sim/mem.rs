//! Memory cells for the data memory image.
//!
//! This module consists of:
//! - [`Cell`]: A mutable byte of data memory or a register.
//! - [`FillStrategy`]: How padding cells are created when an image is loaded.

use rand::rngs::StdRng;
use rand::Rng;

/// A byte of memory that can be read and written to.
///
/// Every write marks the cell as changed.
/// The changed flag is only cleared by [`Cell::clear_changed`],
/// which is called at the start of every instruction to track what the instruction wrote.
///
/// All arithmetic on a cell wraps.
///
/// ```
/// use avr_ensemble::sim::mem::Cell;
///
/// let mut cell = Cell::new(0);
/// cell.set(300);
/// assert_eq!(cell.get(), 44);
/// cell.set(-1);
/// assert_eq!(cell.get(), 255);
/// assert_eq!(cell.bits(), "11111111");
/// assert!(cell.changed());
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct Cell {
    value: u8,
    changed: bool,
}
impl Cell {
    /// Creates a cell holding a value, which is not marked as changed.
    pub fn new(value: u8) -> Self {
        Cell { value, changed: false }
    }

    /// Creates a cell whose value comes from a filler.
    pub fn new_filled(fill: &mut impl CellFiller) -> Self {
        Cell::new(fill.generate())
    }

    /// Gets the value of this cell.
    pub fn get(&self) -> u8 {
        self.value
    }

    /// Sets the value of this cell to `value` mod 256.
    ///
    /// The modulus is Euclidean, so negative values wrap into `[0, 255]`.
    pub fn set(&mut self, value: i64) {
        self.value = value.rem_euclid(256) as u8;
        self.changed = true;
    }

    /// The value of this cell as an 8-character binary string (most significant bit first).
    pub fn bits(&self) -> String {
        format!("{:08b}", self.value)
    }

    /// Whether this cell has been written to since the last [`Cell::clear_changed`].
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Clears the changed flag.
    pub fn clear_changed(&mut self) {
        self.changed = false;
    }

    /// Sets this cell to 0.
    pub fn clr(&mut self) {
        self.set(0);
    }

    /// Sets this cell to 0xFF.
    pub fn ser(&mut self) {
        self.set(0xFF);
    }

    /// Replaces this cell with its one's complement.
    pub fn com(&mut self) {
        self.set(i64::from(!self.value));
    }

    /// Replaces this cell with its two's complement.
    pub fn neg(&mut self) {
        self.set(-i64::from(self.value));
    }

    /// Increments this cell.
    pub fn inc(&mut self) {
        self.set(i64::from(self.value) + 1);
    }

    /// Decrements this cell.
    pub fn dec(&mut self) {
        self.set(i64::from(self.value) - 1);
    }

    /// Gets bit `n` (0 is least significant).
    ///
    /// # Panics
    /// This panics if `n` is not within 0-7.
    pub fn bit(&self, n: u8) -> bool {
        assert!(n < 8, "bit index {n} out of range");
        (self.value >> n) & 1 == 1
    }

    /// Sets bit `n` (0 is least significant).
    ///
    /// # Panics
    /// This panics if `n` is not within 0-7.
    pub fn set_bit(&mut self, n: u8) {
        assert!(n < 8, "bit index {n} out of range");
        self.set(i64::from(self.value | (1 << n)));
    }

    /// Clears bit `n` (0 is least significant).
    ///
    /// # Panics
    /// This panics if `n` is not within 0-7.
    pub fn clear_bit(&mut self, n: u8) {
        assert!(n < 8, "bit index {n} out of range");
        self.set(i64::from(self.value & !(1 << n)));
    }
}
impl From<u8> for Cell {
    fn from(value: u8) -> Self {
        Cell::new(value)
    }
}

/// Types that can create the values of padding [`Cell`]s.
pub trait CellFiller {
    /// Generate a value.
    fn generate(&mut self) -> u8;
}
impl CellFiller for () {
    /// This creates unseeded, non-deterministic values.
    fn generate(&mut self) -> u8 {
        rand::random()
    }
}
impl CellFiller for u8 {
    /// Sets each cell to the given value.
    fn generate(&mut self) -> u8 {
        *self
    }
}
impl CellFiller for StdRng {
    /// This creates deterministic values from a seeded generator.
    fn generate(&mut self) -> u8 {
        self.gen()
    }
}

/// Strategy used to create the cells that pad the data memory image.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FillStrategy {
    /// Sets each cell to a known value.
    Known {
        /// The value of each cell.
        value: u8
    },

    /// Sets each cell randomly and deterministically.
    Seeded {
        /// The seed the RNG is initialized with.
        seed: u64
    },

    /// Sets each cell randomly and non-deterministically.
    Unseeded,
}
impl Default for FillStrategy {
    fn default() -> Self {
        FillStrategy::Known { value: 0 }
    }
}
impl FillStrategy {
    pub(super) fn generator(&self) -> impl CellFiller {
        use rand::SeedableRng;

        match *self {
            FillStrategy::Known { value } => Filler::Known(value),
            FillStrategy::Seeded { seed } => Filler::Seeded(Box::new(StdRng::seed_from_u64(seed))),
            FillStrategy::Unseeded => Filler::Unseeded,
        }
    }
}

enum Filler {
    Known(u8),
    Seeded(Box<StdRng>),
    Unseeded,
}
impl CellFiller for Filler {
    fn generate(&mut self) -> u8 {
        match self {
            Filler::Known(k)  => k.generate(),
            Filler::Seeded(r) => r.generate(),
            Filler::Unseeded  => ().generate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cell, CellFiller, FillStrategy};

    #[test]
    fn test_set_wraps() {
        let mut cell = Cell::default();
        assert!(!cell.changed());

        cell.set(300);
        assert_eq!(cell.get(), 44);
        cell.set(-1);
        assert_eq!(cell.get(), 255);
        cell.set(-256);
        assert_eq!(cell.get(), 0);
        cell.set(i64::MIN);
        assert_eq!(cell.get(), 0);
        assert!(cell.changed());

        cell.clear_changed();
        assert!(!cell.changed());
    }

    #[test]
    fn test_unary_ops() {
        let mut cell = Cell::new(0);
        cell.dec();
        assert_eq!(cell.get(), 0xFF);
        cell.inc();
        assert_eq!(cell.get(), 0);

        cell.set(0b1010_0101);
        cell.com();
        assert_eq!(cell.bits(), "01011010");

        cell.set(1);
        cell.neg();
        assert_eq!(cell.get(), 0xFF);
        cell.set(0x80);
        cell.neg();
        assert_eq!(cell.get(), 0x80);

        cell.ser();
        assert_eq!(cell.get(), 0xFF);
        cell.clr();
        assert_eq!(cell.get(), 0);
    }

    #[test]
    fn test_bits() {
        let mut cell = Cell::new(0);
        cell.set_bit(7);
        cell.set_bit(0);
        assert_eq!(cell.bits(), "10000001");
        assert!(cell.bit(7));
        assert!(!cell.bit(6));

        cell.clear_bit(7);
        assert_eq!(cell.get(), 1);
        assert!(cell.changed());
    }

    #[test]
    #[should_panic]
    fn test_bit_out_of_range() {
        Cell::new(0).bit(8);
    }

    #[test]
    fn test_fill_strategy() {
        let mut known = FillStrategy::default().generator();
        assert!((0..16).all(|_| known.generate() == 0));

        let mut known = FillStrategy::Known { value: 0xA5 }.generator();
        assert_eq!(Cell::new_filled(&mut known).get(), 0xA5);

        let mut a = FillStrategy::Seeded { seed: 2110 }.generator();
        let mut b = FillStrategy::Seeded { seed: 2110 }.generator();
        let a: Vec<_> = (0..32).map(|_| a.generate()).collect();
        let b: Vec<_> = (0..32).map(|_| b.generate()).collect();
        assert_eq!(a, b);
    }
}
