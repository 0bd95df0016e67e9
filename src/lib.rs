//! A LC-3 virtual machine.
//!
//! This simulates the 16-bit LC-3 educational computer:
//! 65,536 words of memory, eight general purpose registers, a condition flag,
//! and the console trap routines (`GETC`, `OUT`, `PUTS`, `IN`, `PUTSP`, `HALT`).
//!
//! # Usage
//!
//! Programs are loaded from object images (see [`image`] for the file format):
//! ```
//! use lc3_vm::image::ObjectImage;
//!
//! // .orig x3000
//! // LEA R0, HELLO
//! // PUTS
//! // HALT
//! // HELLO .stringz "Hi"
//! let bytes = [
//!     0x30, 0x00,
//!     0xE0, 0x02, 0xF0, 0x22, 0xF0, 0x25,
//!     0x00, 0x48, 0x00, 0x69, 0x00, 0x00,
//! ];
//! let image = ObjectImage::from_bytes(&bytes).unwrap();
//! ```
//!
//! Once an image has been loaded, it can be executed with the simulator:
//! ```
//! # use lc3_vm::image::ObjectImage;
//! # let bytes = [0x30, 0x00, 0xE0, 0x02, 0xF0, 0x22, 0xF0, 0x25, 0x00, 0x48, 0x00, 0x69, 0x00, 0x00];
//! # let image = ObjectImage::from_bytes(&bytes).unwrap();
//! use lc3_vm::sim::Simulator;
//! use lc3_vm::sim::io::BufferedIO;
//!
//! let mut simulator = Simulator::new(Default::default());
//! simulator.load_image(&image);
//!
//! let io = BufferedIO::new();
//! simulator.open_io(io.clone());
//! simulator.run().unwrap(); // <-- Result can be handled accordingly
//!
//! assert_eq!(&*io.get_output().read().unwrap(), b"HiHALT\n");
//! ```
//!
//! If more granularity is needed for simulation, there is also a step-in function.
//! See the [`sim`] module for more details.
#![warn(missing_docs)]

pub mod ast;
pub mod image;
pub mod sim;
