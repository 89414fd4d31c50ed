//! Memory images for the execution stage.
//!
//! This module is focused on handing a fully assembled program ([`Assembly`])
//! to whatever executes it. It does not execute anything.
//!
//! This module consists of:
//! - [`MemoryImage`]: The data and program memories, padded to the target's size.
//! - [`MemFlags`]: The configuration for building a [`MemoryImage`].
//! - [`mem`]: The module handling individual memory cells.
//!
//! # Usage
//!
//! ```
//! use avr_ensemble::asm::assemble_src;
//! use avr_ensemble::sim::{MemoryImage, MemFlags};
//!
//! let src = "
//!     .section .data
//!     count: .byte 3
//!     .section .text
//!     .global main
//!     main: LDS R16, count
//!     .end
//! ";
//! let asm = assemble_src(src).unwrap();
//! let image = MemoryImage::load(&asm, MemFlags::default()).unwrap();
//!
//! assert_eq!(image.data().len(), 0x900);
//! assert_eq!(image.program().len(), 0x4000);
//! assert_eq!(image.cell(0x100).map(|c| c.get()), Some(3));
//! ```
//!
//! ## Flags
//!
//! The size of each memory and the contents of padding cells can be configured:
//!
//! ```
//! # use avr_ensemble::asm::assemble_src;
//! use avr_ensemble::sim::{MemoryImage, MemFlags};
//! use avr_ensemble::sim::mem::FillStrategy;
//!
//! # let asm = assemble_src(".section .text\n.global main\n.end").unwrap();
//! let flags = MemFlags { ramend: 0x1FF, fill: FillStrategy::Known { value: 0xFF }, ..Default::default() };
//! let image = MemoryImage::load(&asm, flags).unwrap();
//! assert_eq!(image.data().len(), 0x200);
//! assert_eq!(image.cell(0x1FF).map(|c| c.get()), Some(0xFF));
//! ```
pub mod mem;

use std::borrow::Cow;

use crate::asm::{Assembly, Instruction, ProgramSlot, SRAM_START};

use self::mem::{Cell, FillStrategy};

/// The last data memory address of the default target.
pub const RAMEND: u16 = 0x08FF;
/// The last program memory word of the default target.
pub const FLASHEND: u16 = 0x3FFF;

/// Configuration flags for [`MemoryImage::load`].
///
/// These can be modified after the [`MemFlags::default`] construction of the struct.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct MemFlags {
    /// The last data memory address.
    ///
    /// Data memory is padded to `ramend + 1` cells.
    ///
    /// By default, this is [`RAMEND`].
    pub ramend: u16,

    /// The last program memory word.
    ///
    /// Program memory is padded to `flashend + 1` slots.
    ///
    /// By default, this is [`FLASHEND`].
    pub flashend: u16,

    /// How the cells padding data memory are created.
    ///
    /// Cells that come from the assembled data image are never affected by this.
    ///
    /// By default, this is [`FillStrategy::default`] (all zeroes).
    pub fill: FillStrategy,
}
impl Default for MemFlags {
    fn default() -> Self {
        Self {
            ramend: RAMEND,
            flashend: FLASHEND,
            fill: Default::default(),
        }
    }
}

/// Errors that can occur while loading an [`Assembly`] into memory.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum SimErr {
    /// Data image does not fit in data memory.
    DataTooLarge {
        /// Size of the data image, in bytes.
        len: usize,
        /// Size of data memory, in bytes.
        capacity: usize
    },
    /// Program does not fit in program memory.
    ProgramTooLarge {
        /// Size of the program, in words.
        len: usize,
        /// Size of program memory, in words.
        capacity: usize
    },
}
impl std::fmt::Display for SimErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimErr::DataTooLarge { len, capacity }    => write!(f, "data image ({len} bytes) does not fit in data memory ({capacity} bytes)"),
            SimErr::ProgramTooLarge { len, capacity } => write!(f, "program ({len} words) does not fit in program memory ({capacity} words)"),
        }
    }
}
impl std::error::Error for SimErr {}
impl crate::err::Error for SimErr {
    fn category(&self) -> crate::err::ErrCategory {
        crate::err::ErrCategory::Load
    }

    fn help(&self) -> Option<Cow<str>> {
        match self {
            SimErr::DataTooLarge { .. }    => Some("try shrinking the data section or raising ramend".into()),
            SimErr::ProgramTooLarge { .. } => Some("try shrinking the program or raising flashend".into()),
        }
    }
}

/// Data and program memory, ready for execution.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MemoryImage {
    data: Vec<Cell>,
    program: Vec<ProgramSlot>,
}
impl MemoryImage {
    /// Loads an assembled program into memory.
    ///
    /// Data memory is padded to `flags.ramend + 1` cells (see [`MemFlags::fill`])
    /// and program memory is padded with `NOP`s to `flags.flashend + 1` slots.
    pub fn load(asm: &Assembly, flags: MemFlags) -> Result<Self, SimErr> {
        let data_cap = usize::from(flags.ramend) + 1;
        let program_cap = usize::from(flags.flashend) + 1;

        let data_len = asm.data().len();
        if data_len > data_cap {
            return Err(SimErr::DataTooLarge { len: data_len, capacity: data_cap });
        }
        let program_len = asm.program().len();
        if program_len > program_cap {
            return Err(SimErr::ProgramTooLarge { len: program_len, capacity: program_cap });
        }

        let mut filler = flags.fill.generator();
        let data = asm.data().iter()
            .map(|&b| Cell::new(b))
            .chain(std::iter::repeat_with(|| Cell::new_filled(&mut filler)))
            .take(data_cap)
            .collect();

        let mut program = asm.program().to_vec();
        program.resize(program_cap, ProgramSlot::Instr(Instruction::nop()));

        log::debug!(
            "loaded {data_len} of {data_cap} data bytes and {program_len} of {program_cap} program words"
        );
        Ok(MemoryImage { data, program })
    }

    /// The data memory cells, indexed by address.
    pub fn data(&self) -> &[Cell] {
        &self.data
    }

    /// The program memory slots, indexed by word.
    pub fn program(&self) -> &[ProgramSlot] {
        &self.program
    }

    /// Gets the cell at a data memory address (if it is within data memory).
    pub fn cell(&self, addr: u16) -> Option<&Cell> {
        self.data.get(usize::from(addr))
    }

    /// Gets a mutable reference to the cell at a data memory address (if it is within data memory).
    pub fn cell_mut(&mut self, addr: u16) -> Option<&mut Cell> {
        self.data.get_mut(usize::from(addr))
    }

    /// The cells of SRAM (after the register file and I/O space).
    pub fn sram(&self) -> &[Cell] {
        self.data.get(usize::from(SRAM_START)..).unwrap_or_default()
    }

    /// Clears the changed flag of every cell.
    ///
    /// This is done at the start of every instruction.
    pub fn clear_changed(&mut self) {
        self.data.iter_mut().for_each(Cell::clear_changed);
    }
}
