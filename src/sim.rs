//! Simulating and execution for LC-3 programs.
//!
//! This module is focused on executing assembled object images (i.e., [`ObjectImage`]).
//!
//! This module consists of:
//! - [`Simulator`]: The struct that simulates assembled code.
//! - [`mem`]: The module handling memory and the register file.
//! - [`io`]: The module handling the console the trap routines talk to.
//! - [`trap`]: The module handling the trap routines.
//!
//! # Usage
//!
//! To simulate some code, you need to instantiate a Simulator and load an object image into it:
//!
//! ```no_run
//! use lc3_vm::sim::Simulator;
//!
//! let mut simulator = Simulator::new(Default::default());
//! simulator.load_image_file("hello.obj").unwrap();
//! simulator.run().unwrap();
//! ```
//!
//! ## Execution
//!
//! Beyond the basic [`Simulator::run`] (which runs until halting),
//! there are also:
//! - [`Simulator::step_in`]: manual step-by-step simulation
//! - [`Simulator::run_while`], [`Simulator::run_with_limit`]: more advanced programmatic execution
//!
//! ```
//! use lc3_vm::image::ObjectImage;
//! use lc3_vm::sim::Simulator;
//! use lc3_vm::ast::reg_consts::R0;
//!
//! // AND R0, R0, #0
//! // ADD R0, R0, #1
//! // ADD R0, R0, #1
//! // HALT
//! let image = ObjectImage::new(0x3000, vec![0x5020, 0x1021, 0x1021, 0xF025]);
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.load_image(&image);
//!
//! sim.step_in().unwrap();
//! assert_eq!(sim.reg_file[R0], 0);
//! sim.step_in().unwrap();
//! assert_eq!(sim.reg_file[R0], 1);
//! sim.step_in().unwrap();
//! assert_eq!(sim.reg_file[R0], 2);
//! assert_eq!(sim.reg_file.pc, 0x3003);
//! ```
//!
//! ## IO
//!
//! The trap routines read from and write to the console attached with [`Simulator::open_io`].
//! The best IO for programmatic uses is [`io::BufferedIO`],
//! which exposes the IO to memory buffers that can be modified.
//!
//! ```
//! use lc3_vm::image::ObjectImage;
//! use lc3_vm::sim::{RunState, Simulator};
//! use lc3_vm::sim::io::BufferedIO;
//!
//! // GETC
//! // OUT
//! // HALT
//! let image = ObjectImage::new(0x3000, vec![0xF020, 0xF021, 0xF025]);
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.load_image(&image);
//!
//! let io = BufferedIO::new();
//! io.get_input().write().unwrap().push_back(b'!');
//! sim.open_io(io.clone());
//!
//! sim.run().unwrap();
//! assert_eq!(sim.state(), RunState::Halted);
//! assert_eq!(&*io.get_output().read().unwrap(), b"!HALT\n");
//! ```
//!
//! [`ObjectImage`]: crate::image::ObjectImage
pub mod mem;
pub mod io;
pub mod trap;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ast::reg_consts::R7;
use crate::ast::sim::SimInstr;
use crate::ast::ImmOrReg;
use crate::image::{LoadErr, ObjectImage};

use self::io::{IODevice, SimIO};
use self::mem::{MachineInitStrategy, Mem, RegFile};

/// Errors that can occur during simulation.
///
/// Nothing the program itself does is an error:
/// reserved opcodes and unknown trap vectors do nothing.
/// These only come from the console going away under a trap routine.
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
pub enum SimErr {
    /// An input trap needed a key, but the console input was closed (or cancelled).
    #[error("console input was closed while waiting for a key")]
    InputClosed,
    /// An output trap could not write to the console.
    #[error("console output is no longer accepting data")]
    OutputClosed,
}

/// Whether the machine can still execute instructions.
#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Copy)]
pub enum RunState {
    /// The machine fetches and executes instructions.
    #[default]
    Running,
    /// The machine executed `HALT`. Nothing runs until [`Simulator::reset`].
    Halted,
}

/// Machine control.
///
/// While this is true, [`Simulator::run_while`] (and adjacent) keep executing.
/// Anything holding a clone of it can stop a running simulator from another thread.
pub type MCR = Arc<AtomicBool>;

/// Configuration flags for [`Simulator`].
///
/// These can be modified after the `Simulator` is created with [`Simulator::new`].
/// They take effect at the next [`Simulator::reset`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SimFlags {
    /// The creation strategy for the initial contents of memory and registers.
    ///
    /// By default, this flag is [`MachineInitStrategy::default`] (everything zeroed).
    pub machine_init: MachineInitStrategy,

    /// The address execution starts at.
    ///
    /// This is independent of the origin of any loaded image.
    ///
    /// By default, this is `x3000`.
    pub pc_start: u16,
}

impl Default for SimFlags {
    fn default() -> Self {
        Self {
            machine_init: Default::default(),
            pc_start: USER_START,
        }
    }
}

const USER_START: u16 = 0x3000;

/// Executes assembled code.
#[derive(Debug)]
pub struct Simulator {
    // ------------------ SIMULATION STATE ------------------
    // Calling [`Simulator::reset`] resets these values.

    /// The simulator's memory.
    ///
    /// Note that this is held in the heap, as it is too large for the stack.
    pub mem: Mem,

    /// The simulator's register file (including the PC and condition flag).
    pub reg_file: RegFile,

    /// Whether the machine has halted.
    state: RunState,

    /// The number of instructions successfully run since this `Simulator` was initialized.
    ///
    /// This can be set to 0 to reset the counter.
    pub instructions_run: u64,

    // ------------------ CONFIG STATE ------------------
    // Calling [`Simulator::reset`] does not reset these values.

    /// Machine control.
    /// If unset, the program stops.
    ///
    /// This is publicly accessible via a reference through [`Simulator::mcr`].
    mcr: MCR,

    /// Configuration settings for the simulator.
    ///
    /// These are preserved between resets.
    pub flags: SimFlags,
}
impl Simulator where Simulator: Send + Sync {}

impl Simulator {
    /// Creates a new simulator with the provided flags and no IO.
    pub fn new(flags: SimFlags) -> Self {
        let mut filler = flags.machine_init.generator();

        let mut reg_file = RegFile::new(&mut filler);
        reg_file.pc = flags.pc_start;

        Self {
            mem: Mem::new(&mut filler),
            reg_file,
            state: RunState::Running,
            instructions_run: 0,

            mcr: Arc::default(),
            flags,
        }
    }

    /// Resets the simulator.
    ///
    /// This resets the state of the `Simulator` back to before any execution calls
    /// (memory and registers are refilled according to [`SimFlags::machine_init`]),
    /// while preserving configuration, the MCR reference, and the attached IO.
    ///
    /// This does not reload images. Any image data has to be reloaded into the Simulator.
    pub fn reset(&mut self) {
        let mut filler = self.flags.machine_init.generator();

        self.reg_file = RegFile::new(&mut filler);
        self.reg_file.pc = self.flags.pc_start;
        self.mem.refill(&mut filler);
        self.state = RunState::Running;
        self.instructions_run = 0;

        log::debug!("simulator reset, PC = {:#06X}", self.reg_file.pc);
    }

    /// Attaches a console to the simulator, closing any previously attached one.
    pub fn open_io<IO: Into<SimIO>>(&mut self, io: IO) {
        self.mem.set_io(io.into()).close();
    }

    /// Detaches and closes the attached console.
    ///
    /// For threaded IO, this waits for all pending output to be written.
    pub fn close_io(&mut self) {
        self.mem.set_io(SimIO::Empty).close();
    }

    /// Loads an object image into memory at its origin.
    ///
    /// This does not move the PC.
    pub fn load_image(&mut self, image: &ObjectImage) {
        self.mem.copy_block(image.origin(), image.words());
        log::debug!("loaded {} words at {:#06X}", image.words().len(), image.origin());
    }

    /// Reads an object image file and loads it into memory at its origin.
    pub fn load_image_file(&mut self, path: impl AsRef<Path>) -> Result<(), LoadErr> {
        let image = ObjectImage::read_file(path)?;
        self.load_image(&image);
        Ok(())
    }

    /// Gets whether the machine is still running or has halted.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Gets a reference to the MCR.
    pub fn mcr(&self) -> &MCR {
        // The mcr field is not exposed because that allows someone to swap the MCR
        // with another AtomicBool, which would cause the simulator's MCR
        // to be inconsistent with any other component's
        &self.mcr
    }

    /// Gets the value of the prefetch PC.
    ///
    /// The PC is incremented as soon as an instruction is fetched,
    /// so while an instruction executes (or after it fails with a [`SimErr`]),
    /// this is that instruction's address.
    pub fn prefetch_pc(&self) -> u16 {
        self.reg_file.pc.wrapping_sub(1)
    }

    /// Runs until the tripwire condition returns false (or any of the typical breaks occur).
    ///
    /// The typical break conditions are:
    /// - `HALT` is executed
    /// - the MCR is set to false
    ///
    /// If the machine has already halted, this does nothing.
    pub fn run_while(&mut self, mut tripwire: impl FnMut(&mut Simulator) -> bool) -> Result<(), SimErr> {
        self.mcr.store(true, Ordering::Relaxed);

        // event loop
        // run until:
        // 1. the machine halts
        // 2. the MCR is set to false
        // 3. the tripwire condition returns false
        let result = loop {
            if self.state == RunState::Halted {
                break Ok(());
            }
            if !self.mcr.load(Ordering::Relaxed) {
                log::debug!("MCR cleared, pausing at {:#06X}", self.reg_file.pc);
                break Ok(());
            }
            if !tripwire(self) {
                break Ok(());
            }

            if let Err(e) = self.step() {
                break Err(e);
            }
        };

        self.mcr.store(false, Ordering::Relaxed);
        result
    }

    /// Execute the program.
    ///
    /// This blocks until the program halts (or the MCR is cleared).
    /// If you would like to limit the maximum number of steps to execute, consider [`Simulator::run_with_limit`].
    pub fn run(&mut self) -> Result<(), SimErr> {
        self.run_while(|_| true)
    }

    /// Execute the program with a limit on how many steps to execute.
    ///
    /// This blocks until the program halts or until the number of steps to execute has been hit.
    pub fn run_with_limit(&mut self, max_steps: u64) -> Result<(), SimErr> {
        let i = self.instructions_run;
        self.run_while(|sim| sim.instructions_run.wrapping_sub(i) < max_steps)
    }

    /// Simulate one step, executing one instruction.
    ///
    /// If the machine has already halted, this does nothing.
    pub fn step_in(&mut self) -> Result<(), SimErr> {
        match self.state {
            RunState::Running => self.step(),
            RunState::Halted  => Ok(()),
        }
    }

    /// Fetch, decode, and execute one instruction.
    fn step(&mut self) -> Result<(), SimErr> {
        let pc = self.reg_file.pc;
        let instr = SimInstr::decode(self.mem.read(pc));
        self.reg_file.pc = pc.wrapping_add(1);

        log::trace!("{pc:#06X}: {instr}");
        self.execute(instr)?;

        self.instructions_run = self.instructions_run.wrapping_add(1);
        Ok(())
    }

    /// Executes a decoded instruction.
    ///
    /// The PC has already been incremented past the instruction.
    fn execute(&mut self, instr: SimInstr) -> Result<(), SimErr> {
        let pc = self.reg_file.pc;

        match instr {
            SimInstr::BR(cc, off) => {
                if cc & self.reg_file.cond().bits() != 0 {
                    self.reg_file.pc = pc.wrapping_add_signed(off.get());
                }
            },
            SimInstr::ADD(dr, sr1, sr2) => {
                let val2 = self.imm_or_reg(sr2);
                self.reg_file[dr] = self.reg_file[sr1].wrapping_add(val2);
                self.reg_file.update_flags(dr);
            },
            SimInstr::LD(dr, off) => {
                let ea = pc.wrapping_add_signed(off.get());
                self.reg_file[dr] = self.mem.read(ea);
                self.reg_file.update_flags(dr);
            },
            SimInstr::ST(sr, off) => {
                let ea = pc.wrapping_add_signed(off.get());
                self.mem.write(ea, self.reg_file[sr]);
            },
            SimInstr::JSR(op) => {
                // The target is read before R7 is written, so JSRR R7 jumps to the old R7.
                let addr = match op {
                    ImmOrReg::Imm(off) => pc.wrapping_add_signed(off.get()),
                    ImmOrReg::Reg(br)  => self.reg_file[br],
                };
                self.reg_file[R7] = pc;
                self.reg_file.pc = addr;
            },
            SimInstr::AND(dr, sr1, sr2) => {
                let val2 = self.imm_or_reg(sr2);
                self.reg_file[dr] = self.reg_file[sr1] & val2;
                self.reg_file.update_flags(dr);
            },
            SimInstr::LDR(dr, br, off) => {
                let ea = self.reg_file[br].wrapping_add_signed(off.get());
                self.reg_file[dr] = self.mem.read(ea);
                self.reg_file.update_flags(dr);
            },
            SimInstr::STR(sr, br, off) => {
                let ea = self.reg_file[br].wrapping_add_signed(off.get());
                self.mem.write(ea, self.reg_file[sr]);
            },
            SimInstr::NOT(dr, sr) => {
                self.reg_file[dr] = !self.reg_file[sr];
                self.reg_file.update_flags(dr);
            },
            SimInstr::LDI(dr, off) => {
                let ptr = pc.wrapping_add_signed(off.get());
                let ea = self.mem.read(ptr);
                self.reg_file[dr] = self.mem.read(ea);
                self.reg_file.update_flags(dr);
            },
            SimInstr::STI(sr, off) => {
                let ptr = pc.wrapping_add_signed(off.get());
                let ea = self.mem.read(ptr);
                self.mem.write(ea, self.reg_file[sr]);
            },
            SimInstr::JMP(br) => {
                self.reg_file.pc = self.reg_file[br];
            },
            SimInstr::LEA(dr, off) => {
                self.reg_file[dr] = pc.wrapping_add_signed(off.get());
                self.reg_file.update_flags(dr);
            },
            SimInstr::TRAP(vect) => {
                self.reg_file[R7] = pc;
                self.execute_trap(vect)?;
            },
            SimInstr::RTI | SimInstr::RES => {
                // Unsupported, so these do nothing.
                log::warn!("ignoring {instr} at {:#06X}", self.prefetch_pc());
            },
        }

        Ok(())
    }

    fn imm_or_reg(&self, operand: ImmOrReg<5>) -> u16 {
        match operand {
            ImmOrReg::Imm(imm) => imm.get() as u16,
            ImmOrReg::Reg(r)   => self.reg_file[r],
        }
    }
}
impl Default for Simulator {
    fn default() -> Self {
        Self::new(Default::default())
    }
}
