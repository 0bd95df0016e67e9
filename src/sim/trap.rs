//! Trap routines.
//!
//! The machine has no operating system image, so the `TRAP` instruction
//! is serviced directly by the simulator. Each recognized vector runs
//! one of the console routines below to completion before the next instruction is fetched.
//!
//! | vector | name    | effect |
//! |--------|---------|--------|
//! | `x20`  | `GETC`  | reads a key into `R0` (no echo) |
//! | `x21`  | `OUT`   | writes the low byte of `R0` |
//! | `x22`  | `PUTS`  | writes the string at `R0`, one character per word |
//! | `x23`  | `IN`    | prompts, reads a key into `R0`, echoes it |
//! | `x24`  | `PUTSP` | writes the string at `R0`, two characters per word |
//! | `x25`  | `HALT`  | prints a notice and halts the machine |
//!
//! Any other vector does nothing.

use crate::ast::reg_consts::R0;
use crate::ast::TrapVect8;

use super::io::IODevice;
use super::{RunState, SimErr, Simulator};

macro_rules! trap_vect {
    ($Type:ident, {$($(#[$m:meta])* $name:ident = $value:literal), +}) => {
        /// The trap vectors the simulator services.
        #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
        pub enum $Type {
            $($(#[$m])* $name = $value),+
        }
        impl TryFrom<u16> for $Type {
            type Error = ();

            fn try_from(value: u16) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$name)),+,
                    _ => Err(())
                }
            }
        }
    }
}
trap_vect!(TrapVect, {
    /// Read a single character, without echo.
    Getc = 0x20,
    /// Write a character.
    Out = 0x21,
    /// Write a string of one character per word.
    Puts = 0x22,
    /// Prompt for and read a single character, with echo.
    In = 0x23,
    /// Write a string of two characters per word.
    Putsp = 0x24,
    /// Halt the machine.
    Halt = 0x25
});

const IN_PROMPT: &[u8] = b"Enter a character: ";
const HALT_NOTICE: &[u8] = b"HALT\n";

impl Simulator {
    /// Runs the trap routine for the given vector.
    ///
    /// `R7` has already been set to the return address by the `TRAP` instruction.
    pub(super) fn execute_trap(&mut self, vect: TrapVect8) -> Result<(), SimErr> {
        let Ok(trap) = TrapVect::try_from(vect.get()) else {
            log::warn!("ignoring unknown trap vector {vect:02X}");
            return Ok(());
        };

        match trap {
            TrapVect::Getc => {
                let key = self.console_read()?;
                self.reg_file[R0] = u16::from(key);
                self.reg_file.update_flags(R0);
            },
            TrapVect::Out => {
                let ch = self.reg_file[R0] as u8;
                self.console_write(&[ch])?;
            },
            TrapVect::Puts => {
                let string: Vec<u8> = self.string_at(self.reg_file[R0])
                    .map(|cell| cell as u8)
                    .collect();
                self.console_write(&string)?;
            },
            TrapVect::In => {
                self.console_write(IN_PROMPT)?;
                let key = self.console_read()?;
                self.console_write(&[key])?;
                self.reg_file[R0] = u16::from(key);
                self.reg_file.update_flags(R0);
            },
            TrapVect::Putsp => {
                let cells: Vec<u16> = self.string_at(self.reg_file[R0]).collect();
                for cell in cells {
                    let [lo, hi] = cell.to_le_bytes();
                    match hi {
                        0 => self.console_write(&[lo])?,
                        _ => self.console_write(&[lo, hi])?,
                    }
                }
            },
            TrapVect::Halt => {
                self.console_write(HALT_NOTICE)?;
                self.state = RunState::Halted;
                log::debug!("halted at {:#06X} after {} instructions", self.prefetch_pc(), self.instructions_run + 1);
            },
        }

        Ok(())
    }

    /// The words of a zero-terminated string starting at `addr` (terminator excluded).
    ///
    /// The walk wraps at the end of memory and stops after visiting every address once.
    fn string_at(&self, addr: u16) -> impl Iterator<Item = u16> + '_ {
        (0..=u16::MAX)
            .map(move |i| self.mem.get_raw(addr.wrapping_add(i)))
            .take_while(|&cell| cell != 0)
    }

    fn console_read(&mut self) -> Result<u8, SimErr> {
        self.mem.io().read_input().ok_or(SimErr::InputClosed)
    }

    fn console_write(&mut self, data: &[u8]) -> Result<(), SimErr> {
        match self.mem.io().write_output(data) {
            true  => Ok(()),
            false => Err(SimErr::OutputClosed),
        }
    }
}
