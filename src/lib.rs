//! An AVR assembler for an 8-bit teaching simulator.
//!
//! This translates AVR assembly source into a data memory image and a program memory image,
//! which can then be handed to an execution stage.
//!
//! # Usage
//!
//! To assemble source code, it must be tokenized and then assembled:
//! ```
//! use avr_ensemble::parse::tokenize;
//! use avr_ensemble::asm::{assemble, Assembly};
//!
//! let code = "
//!     .section .data
//!     count: .byte 10
//!     .section .text
//!     .global main
//!     main: LDS R16, count
//!     loop: DEC R16
//!           BRNE loop
//!     done: RJMP done
//!     .end
//! ";
//! let lines = tokenize(code).unwrap();
//! let asm: Assembly = assemble(lines).unwrap();
//!
//! for instr in asm.instructions() {
//!     println!("{instr:<16} {}", instr.opcode());
//! }
//! ```
//!
//! [`asm::assemble_src`] does both steps at once.
//!
//! Once a program has been assembled, it can be loaded into memory:
//! ```
//! # use avr_ensemble::asm::assemble_src;
//! # let asm = assemble_src(".section .text\n.global main\nmain: NOP\n.end").unwrap();
//! use avr_ensemble::sim::MemoryImage;
//!
//! let image = MemoryImage::load(&asm, Default::default()).unwrap();
//! assert_eq!(image.program().len(), 0x4000);
//! ```
//!
//! Every error raised implements [`err::Error`], which provides the line it occurred on
//! and a help message (if there is one).
//!
//! Assembly logs its progress through the [`log`] facade.
//! No logger is installed by this crate.
#![warn(missing_docs)]

pub mod parse;
pub mod ast;
pub mod asm;
pub mod sim;
pub mod err;
