//! Memory handling for the LC-3 simulator.
//!
//! This module consists of:
//! - [`Mem`]: The memory (with the keyboard's memory-mapped registers).
//! - [`RegFile`]: The register file (general purpose registers, PC, and condition flag).
//! - [`CondFlag`]: The condition flag.
//! - [`MachineInitStrategy`]: How memory and registers are filled before a program writes to them.

use rand::rngs::StdRng;
use rand::Rng;

use crate::ast::Reg;

use super::io::{IODevice, SimIO};

/// Keyboard status register. Bit 15 is set when a key is available.
pub const KBSR: u16 = 0xFE00;
/// Keyboard data register. Holds the last key polled through [`KBSR`].
pub const KBDR: u16 = 0xFE02;

const N: usize = 1 << 16;

/// Trait that describes types that can be used to create the initial data
/// of memory and registers.
pub trait WordFiller {
    /// Generate the data.
    fn generate(&mut self) -> u16;
}
impl WordFiller for () {
    /// This creates unseeded, non-deterministic values.
    fn generate(&mut self) -> u16 {
        rand::random()
    }
}
impl WordFiller for u16 {
    /// Sets each word to the given value.
    fn generate(&mut self) -> u16 {
        *self
    }
}
impl WordFiller for StdRng {
    /// This creates values from the standard random number generator.
    ///
    /// This can be used to create deterministic, seeded values.
    fn generate(&mut self) -> u16 {
        self.gen()
    }
}

/// Strategy used to initialize the `reg_file` and `mem` of the [`Simulator`].
///
/// Real hardware powers on with whatever happens to be in memory,
/// so programs should not rely on the initial state. The default
/// zero-fills everything, which is what most reference machines do.
///
/// [`Simulator`]: super::Simulator
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MachineInitStrategy {
    /// Initializes each word randomly and non-deterministically.
    Unseeded,

    /// Initializes each word randomly and deterministically.
    Seeded {
        /// The seed the RNG was initialized with.
        seed: u64
    },

    /// Initializes each word to a known value.
    Known {
        /// The value to initialize each value to.
        value: u16
    }
}
impl Default for MachineInitStrategy {
    fn default() -> Self {
        MachineInitStrategy::Known { value: 0 }
    }
}

impl MachineInitStrategy {
    pub(super) fn generator(&self) -> impl WordFiller {
        use rand::SeedableRng;

        match self {
            MachineInitStrategy::Unseeded => WCGenerator::Unseeded,
            MachineInitStrategy::Seeded { seed } => WCGenerator::Seeded(Box::new(StdRng::seed_from_u64(*seed))),
            MachineInitStrategy::Known { value } => WCGenerator::Known(*value),
        }
    }
}

enum WCGenerator {
    Unseeded,
    Seeded(Box<StdRng>),
    Known(u16)
}
impl WordFiller for WCGenerator {
    fn generate(&mut self) -> u16 {
        match self {
            WCGenerator::Unseeded  => ().generate(),
            WCGenerator::Seeded(r) => r.generate(),
            WCGenerator::Known(k)  => k.generate(),
        }
    }
}

/// Memory.
///
/// This can be addressed with any `u16` (16-bit address), so no access can be out of range.
///
/// Note that this struct provides two methods of accessing memory:
/// - [`Mem::get_raw`] and [`Mem::get_raw_mut`]: direct access to memory values
/// - [`Mem::read`] and [`Mem::write`]: memory access as the running program sees it
///
/// The only difference between the two is the keyboard status register ([`KBSR`]).
/// Reading it with [`Mem::read`] polls the console: if a key is waiting,
/// `KBSR` gets its high bit set and the key is stored in [`KBDR`]; otherwise `KBSR` is cleared.
/// Writes are always plain stores, even to the keyboard registers.
///
/// ```
/// use lc3_vm::sim::mem::{Mem, KBSR, KBDR};
/// use lc3_vm::sim::io::BufferedIO;
///
/// let mut mem = Mem::new(&mut 0u16);
/// *mem.get_raw_mut(0x3000) = 11;
/// assert_eq!(mem.get_raw(0x3000), 11);
///
/// // no IO attached, so no key is ever available
/// assert_eq!(mem.read(KBSR), 0x0000);
///
/// let io = BufferedIO::new();
/// io.get_input().write().unwrap().push_back(b'k');
/// mem.set_io(io.into());
/// assert_eq!(mem.read(KBSR), 0x8000);
/// assert_eq!(mem.read(KBDR), u16::from(b'k'));
/// ```
pub struct Mem {
    data: Box<[u16; N]>,
    io: SimIO
}
impl Mem {
    /// Creates a new memory with a provided word creation strategy.
    pub fn new(filler: &mut impl WordFiller) -> Self {
        Self {
            data: std::iter::repeat_with(|| filler.generate())
                .take(N)
                .collect::<Box<_>>()
                .try_into()
                .unwrap_or_else(|_| unreachable!("iterator should have had {N} elements")),
            io: Default::default()
        }
    }

    /// Copies a block of words into memory, starting at `start`.
    ///
    /// A block that runs past `xFFFF` wraps around to `x0000`.
    pub fn copy_block(&mut self, start: u16, words: &[u16]) {
        let si = usize::from(start);
        match words.len() <= N - si {
            true => self.data[si..(si + words.len())].copy_from_slice(words),
            false => {
                let (left, right) = words.split_at(N - si);
                self.data[si..].copy_from_slice(left);
                // Anything longer than the entire memory just keeps wrapping.
                for chunk in right.chunks(N) {
                    self.data[..chunk.len()].copy_from_slice(chunk);
                }
            }
        }
    }

    /// Gets a word from the memory's current state.
    ///
    /// This is **only** meant to be used to query the state of the memory,
    /// not to simulate a read from memory. It does not poll the keyboard.
    pub fn get_raw(&self, addr: u16) -> u16 {
        // Mem could implement Index<u16>, but it doesn't as a lint against using this function incorrectly.
        self.data[usize::from(addr)]
    }

    /// Gets a mutable reference to a word from the memory's current state.
    ///
    /// This is **only** meant to be used to query/edit the state of the memory,
    /// not to simulate a write to memory.
    pub fn get_raw_mut(&mut self, addr: u16) -> &mut u16 {
        &mut self.data[usize::from(addr)]
    }

    /// Reads the word at the provided address, as the running program would.
    ///
    /// This polls the console if `addr` is [`KBSR`].
    pub fn read(&mut self, addr: u16) -> u16 {
        if addr == KBSR {
            match self.io.poll_input() {
                Some(key) => {
                    self.data[usize::from(KBSR)] = 0x8000;
                    self.data[usize::from(KBDR)] = u16::from(key);
                },
                None => self.data[usize::from(KBSR)] = 0x0000,
            }
        }
        self.data[usize::from(addr)]
    }

    /// Writes the word at the provided address.
    pub fn write(&mut self, addr: u16, data: u16) {
        self.data[usize::from(addr)] = data;
    }

    /// Gets the entire memory as a slice.
    pub fn as_slice(&self) -> &[u16] {
        &*self.data
    }

    /// Gets the console attached to this memory.
    pub fn io(&self) -> &SimIO {
        &self.io
    }

    /// Attaches a console to this memory, returning the one that was attached before.
    pub fn set_io(&mut self, io: SimIO) -> SimIO {
        std::mem::replace(&mut self.io, io)
    }

    /// Refills every word using the provided filler, keeping the attached console.
    pub(super) fn refill(&mut self, filler: &mut impl WordFiller) {
        self.data.fill_with(|| filler.generate());
    }
}
impl std::fmt::Debug for Mem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mem")
            .field("io", &self.io)
            .finish_non_exhaustive()
    }
}

/// The condition flag.
///
/// The discriminants match the bit positions used by `BR`'s `nzp` mask,
/// so a branch is taken when `mask & flag.bits() != 0`.
#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Copy)]
pub enum CondFlag {
    /// The last value written to a register was negative (bit 15 set).
    Negative = 0b100,
    /// The last value written to a register was zero.
    #[default]
    Zero = 0b010,
    /// The last value written to a register was positive.
    Positive = 0b001,
}
impl CondFlag {
    /// Computes the flag a written value would produce.
    pub fn of(value: u16) -> Self {
        match (value as i16).cmp(&0) {
            std::cmp::Ordering::Less    => CondFlag::Negative,
            std::cmp::Ordering::Equal   => CondFlag::Zero,
            std::cmp::Ordering::Greater => CondFlag::Positive,
        }
    }

    /// The flag as an `nzp` mask.
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// The register file.
///
/// This struct can be indexed with a [`Reg`]
/// (which can be constructed using the [`crate::ast::reg_consts`] module or via [`Reg::try_from`]).
/// It also holds the program counter (`pc`) and the condition flag.
///
/// # Example
///
/// ```
/// use lc3_vm::sim::mem::{CondFlag, RegFile};
/// use lc3_vm::ast::reg_consts::R0;
///
/// let mut reg = RegFile::new(&mut 0u16);
/// reg[R0] = 0xFFFF;
/// reg.update_flags(R0);
/// assert_eq!(reg.cond(), CondFlag::Negative);
/// ```
#[derive(Debug, Clone)]
pub struct RegFile {
    gprs: [u16; 8],
    /// The program counter.
    pub pc: u16,
    cond: CondFlag
}
impl RegFile {
    /// Creates a register file with its general purpose registers filled by the filler.
    ///
    /// The PC starts at 0 and the condition flag starts as [`CondFlag::Zero`].
    pub fn new(filler: &mut impl WordFiller) -> Self {
        Self {
            gprs: std::array::from_fn(|_| filler.generate()),
            pc: 0,
            cond: CondFlag::default()
        }
    }

    /// Gets the condition flag.
    pub fn cond(&self) -> CondFlag {
        self.cond
    }
    /// Sets the condition flag.
    pub fn set_cond(&mut self, cond: CondFlag) {
        self.cond = cond;
    }
    /// Sets the condition flag from the current value of the given register.
    pub fn update_flags(&mut self, reg: Reg) {
        self.cond = CondFlag::of(self[reg]);
    }
}
impl std::ops::Index<Reg> for RegFile {
    type Output = u16;

    fn index(&self, index: Reg) -> &Self::Output {
        &self.gprs[usize::from(index)]
    }
}
impl std::ops::IndexMut<Reg> for RegFile {
    fn index_mut(&mut self, index: Reg) -> &mut Self::Output {
        &mut self.gprs[usize::from(index)]
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::reg_consts::{R0, R3};
    use crate::sim::io::BufferedIO;

    use super::*;

    #[test]
    fn test_cond_flag_of() {
        assert_eq!(CondFlag::of(0), CondFlag::Zero);
        assert_eq!(CondFlag::of(1), CondFlag::Positive);
        assert_eq!(CondFlag::of(0x7FFF), CondFlag::Positive);
        assert_eq!(CondFlag::of(0x8000), CondFlag::Negative);
        assert_eq!(CondFlag::of(0xFFFF), CondFlag::Negative);
    }

    #[test]
    fn test_update_flags_uses_register_value() {
        let mut reg = RegFile::new(&mut 0u16);
        assert_eq!(reg.cond(), CondFlag::Zero);

        reg[R3] = 42;
        reg.update_flags(R3);
        assert_eq!(reg.cond(), CondFlag::Positive);

        // R0 is still 0
        reg.update_flags(R0);
        assert_eq!(reg.cond(), CondFlag::Zero);
    }

    #[test]
    fn test_kbsr_poll() {
        let mut mem = Mem::new(&mut 0u16);
        let io = BufferedIO::new();
        io.get_input().write().unwrap().extend(b"ab");
        mem.set_io(io.clone().into());

        // a plain read of KBDR does not consume input
        assert_eq!(mem.read(KBDR), 0);
        assert_eq!(io.get_input().read().unwrap().len(), 2);

        assert_eq!(mem.read(KBSR), 0x8000);
        assert_eq!(mem.get_raw(KBDR), u16::from(b'a'));
        assert_eq!(mem.read(KBSR), 0x8000);
        assert_eq!(mem.get_raw(KBDR), u16::from(b'b'));

        // input ran out: status clears, data keeps the last key
        assert_eq!(mem.read(KBSR), 0x0000);
        assert_eq!(mem.get_raw(KBDR), u16::from(b'b'));
    }

    #[test]
    fn test_io_addresses_are_plain_on_write() {
        let mut mem = Mem::new(&mut 0u16);
        mem.write(KBDR, 0x1234);
        assert_eq!(mem.read(KBDR), 0x1234);

        // writing the status register is a plain store, but the next read polls
        mem.write(KBSR, 0x8000);
        assert_eq!(mem.get_raw(KBSR), 0x8000);
        assert_eq!(mem.read(KBSR), 0x0000);
    }

    #[test]
    fn test_copy_block_wraps() {
        let mut mem = Mem::new(&mut 0u16);
        mem.copy_block(0xFFFE, &[1, 2, 3, 4]);
        assert_eq!(mem.get_raw(0xFFFE), 1);
        assert_eq!(mem.get_raw(0xFFFF), 2);
        assert_eq!(mem.get_raw(0x0000), 3);
        assert_eq!(mem.get_raw(0x0001), 4);

        mem.copy_block(0x3000, &[0xAAAA, 0xBBBB]);
        assert_eq!(&mem.as_slice()[0x3000..0x3003], &[0xAAAA, 0xBBBB, 0]);
    }

    #[test]
    fn test_seeded_init_is_deterministic() {
        let strat = MachineInitStrategy::Seeded { seed: 2110 };
        let a = Mem::new(&mut strat.generator());
        let b = Mem::new(&mut strat.generator());
        assert_eq!(a.as_slice(), b.as_slice());

        let zeroed = Mem::new(&mut MachineInitStrategy::default().generator());
        assert!(zeroed.as_slice().iter().all(|&w| w == 0));
    }
}
