//! Components relating to the operands of LC-3 instructions.
//!
//! These components together are used to construct [`sim::SimInstr`]
//! (a data structure holding a decoded bytecode instruction).
//!
//! This module also holds [`sign_extend`], which is how every
//! immediate and offset field of an instruction is widened to a full word.

pub mod sim;

use std::fmt::Write as _;
use std::num::TryFromIntError;
use offset_base::OffsetBacking;

/// A register. Must be between 0 and 7.
///
/// This `Reg` struct can either be constructed by selecting a register from [`reg_consts`],
/// or by using [`Reg::try_from`].
///
/// ## Examples
///
/// ```text
/// AND R0, R0, #0
///     ~~  ~~
/// ADD R1, R1, R0
///     ~~  ~~  ~~
/// NOT R1, R2
///     ~~  ~~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Reg(pub(crate) u8);

/// Register constants!
pub mod reg_consts {
    use super::Reg;

    /// General purpose register 0.
    pub const R0: Reg = Reg(0);
    /// General purpose register 1.
    pub const R1: Reg = Reg(1);
    /// General purpose register 2.
    pub const R2: Reg = Reg(2);
    /// General purpose register 3.
    pub const R3: Reg = Reg(3);
    /// General purpose register 4.
    pub const R4: Reg = Reg(4);
    /// General purpose register 5.
    pub const R5: Reg = Reg(5);
    /// General purpose register 6.
    pub const R6: Reg = Reg(6);
    /// General purpose register 7, which `JSR` and `TRAP` write their return address to.
    pub const R7: Reg = Reg(7);
}
impl Reg {
    /// Gets the register number of this [`Reg`]. This is always between 0 and 7.
    pub fn reg_no(self) -> u8 {
        self.0
    }

    /// Reads a 3-bit register field out of an instruction word,
    /// where `shift` is the position of the field's lowest bit.
    pub(crate) fn from_field(word: u16, shift: u32) -> Self {
        Reg(((word >> shift) & 0b111) as u8)
    }
}
impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}", self.0)
    }
}
impl From<Reg> for usize {
    // Used for indexing the reg file.
    fn from(value: Reg) -> Self {
        usize::from(value.0)
    }
}
impl TryFrom<u8> for Reg {
    type Error = TryFromIntError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0..=7 => Ok(Reg(value)),
            // There's no public constructor for this error, so borrow one from a failing conversion.
            _     => u8::try_from(256).map(|_| unreachable!("should've been TryFromIntError")),
        }
    }
}

/// The `nzp` mask of a `BR` instruction (bits 11 to 9), from 0 to 7.
///
/// The branch is taken if any of the mask's bits is set in the current [`CondFlag`].
///
/// [`CondFlag`]: crate::sim::mem::CondFlag
///
/// | instruction   | code (bin) |
/// |---------------|------------|
/// | `NOP`         | `000`      |
/// | `BRn`         | `100`      |
/// | `BRz`         | `010`      |
/// | `BRnz`        | `110`      |
/// | `BRp`         | `001`      |
/// | `BRnp`        | `101`      |
/// | `BRzp`        | `011`      |
/// | `BR`, `BRnzp` | `111`      |
///
pub type CondCode = u8;

/// Sign-extends a `bit_count`-bit value to a full word.
///
/// If bit `bit_count - 1` is set, every bit above it is set as well.
/// Otherwise, the value is returned unchanged.
/// Bits above `bit_count` are never cleared, so callers pass already-masked fields.
///
/// # Examples
///
/// ```
/// use lc3_vm::ast::sign_extend;
///
/// assert_eq!(sign_extend(0b11111, 5), 0xFFFF);
/// assert_eq!(sign_extend(0b01111, 5), 0x000F);
/// assert_eq!(sign_extend(0x1FF, 9), 0xFFFF);
/// assert_eq!(sign_extend(0x0FF, 9), 0x00FF);
/// assert_eq!(sign_extend(0b10_0001, 5), 0b10_0001);
/// ```
///
/// # Panics
///
/// This panics if `bit_count` is not in `1..=16`.
pub fn sign_extend(value: u16, bit_count: u32) -> u16 {
    assert!((1..=16).contains(&bit_count), "cannot sign-extend a {bit_count}-bit field");
    match (value >> (bit_count - 1)) & 1 != 0 {
        true  => value | !field_mask(bit_count),
        false => value,
    }
}

/// A signed field of an instruction, already sign-extended.
///
/// `N` indicates the maximum bit size of this offset/immediate value.
///
/// ## Examples
///
/// `IOffset<5>` is used to represent `ADD`/`AND`'s imm5 operand:
///
/// ```text
/// AND R0, R0, #0
///             ~~
/// ADD R1, R1, #1
///             ~~
/// ```
///
/// They are also used for register or PC offset values:
/// ```text
/// BR #-16
///    ~~~~
/// LD R0, #10
///        ~~~
/// LDR R0, R0, #9
///             ~~
/// ```
pub type IOffset<const N: u32> = Offset<i16, N>;
/// The zero-extended 8-bit vector of a `TRAP` instruction.
///
/// ## Examples
///
/// ```text
/// TRAP x25
///      ~~~
/// ```
pub type TrapVect8 = Offset<u16, 8>;

/// The second source operand of `ADD`/`AND` (selected by bit 5),
/// or the target of `JSR`/`JSRR` (selected by bit 11).
///
/// ## Examples
/// ```text
/// AND R0, R0, #0
/// AND R1, R1, R1
/// ADD R2, R2, #2
/// ADD R3, R3, R3
///             ^^
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ImmOrReg<const N: u32> {
    #[allow(missing_docs)]
    Imm(IOffset<N>),
    #[allow(missing_docs)]
    Reg(Reg)
}
impl<const N: u32> std::fmt::Display for ImmOrReg<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImmOrReg::Imm(imm) => imm.fmt(f),
            ImmOrReg::Reg(reg) => reg.fmt(f),
        }
    }
}

/// A value representing an offset or an immediate value.
///
/// The `OFF` type represents the backing type of this offset.
/// The signedness of this offset type is dependent on the signedness of the `OFF` type:
/// - `Offset<i16, _>`: signed offset (also aliased as [`IOffset`])
/// - `Offset<u16, _>`: unsigned offset
///
/// `N` indicates the maximum bit size of this offset/immediate value.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Offset<OFF, const N: u32>(OFF);

impl<OFF: std::fmt::Display, const N: u32> std::fmt::Display for Offset<OFF, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_char('#')?;
        self.0.fmt(f)
    }
}
impl<OFF: std::fmt::UpperHex, const N: u32> std::fmt::UpperHex for Offset<OFF, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_char('x')?;
        self.0.fmt(f)
    }
}

/// The errors that can result from calling [`Offset::new`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, thiserror::Error)]
pub enum OffsetNewErr {
    /// The provided offset cannot fit an unsigned integer of the given bitsize.
    #[error("value is too big for unsigned {0}-bit integer")]
    CannotFitUnsigned(u32),
    /// The provided offset cannot fit a signed integer of the given bitsize.
    #[error("value is too big for signed {0}-bit integer")]
    CannotFitSigned(u32)
}

mod offset_base {
    use super::OffsetNewErr;

    /// Any type that could store a value for [`Offset`].
    ///
    /// [`Offset`]: super::Offset
    pub trait OffsetBacking: Copy + Eq {
        /// How many bits are contained within this backing.
        const BITS: u32;

        /// Truncates the given value to the provided `bit_size`.
        ///
        /// This bit size is always known to be at most BITS.
        fn truncate(self, bit_size: u32) -> Self;

        /// The error to raise if a given value doesn't match
        /// its provided value when truncated to a given `bit_size`.
        fn does_not_fit_error(bit_size: u32) -> OffsetNewErr;
    }

    macro_rules! impl_offset_backing_for_ints {
        ($($Int:ty: $Err:ident),*) => {
            $(
                impl OffsetBacking for $Int {
                    const BITS: u32 = Self::BITS;

                    fn truncate(self, bit_size: u32) -> Self {
                        // checked_shl so that bit_size == BITS is the identity
                        let shift = Self::BITS - bit_size;
                        self.checked_shl(shift)
                            .and_then(|n| n.checked_shr(shift))
                            .unwrap_or(self)
                    }

                    fn does_not_fit_error(bit_size: u32) -> OffsetNewErr {
                        OffsetNewErr::$Err(bit_size)
                    }
                }
            )*
        }
    }
    impl_offset_backing_for_ints! {
        u16: CannotFitUnsigned,
        i16: CannotFitSigned
    }
}

impl<OFF: OffsetBacking, const N: u32> Offset<OFF, N> {
    /// Creates a new offset value.
    /// This must fit within `N` bits of the representation, otherwise an error is raised.
    ///
    /// # Examples
    ///
    /// ```
    /// # use lc3_vm::ast::Offset;
    /// #
    /// // Signed:
    /// assert!(Offset::<i16, 5>::new(-5).is_ok());
    /// assert!(Offset::<i16, 5>::new(15).is_ok());
    /// assert!(Offset::<i16, 5>::new(16).is_err());
    ///
    /// // Unsigned:
    /// assert!(Offset::<u16, 5>::new(31).is_ok());
    /// assert!(Offset::<u16, 5>::new(32).is_err());
    /// ```
    ///
    /// # Panics
    ///
    /// This will panic if `N` is larger than the offset backing (e.g., for backing `u16`, larger than 16).
    pub fn new(n: OFF) -> Result<Self, OffsetNewErr> {
        assert!(N <= OFF::BITS, "bit size {N} exceeds size of backing ({})", OFF::BITS);
        match n == n.truncate(N) {
            true  => Ok(Offset(n)),
            false => Err(OFF::does_not_fit_error(N)),
        }
    }

    /// Creates a new offset by extending the first N bits of the integer,
    /// and discarding the rest.
    ///
    /// The extension is considered sign-extended if the offset's backing is signed,
    /// and zero-extended if the offset's backing is unsigned.
    ///
    /// # Examples
    ///
    /// ```
    /// # use lc3_vm::ast::Offset;
    /// #
    /// assert_eq!(Offset::<i16, 5>::new_trunc(-5).get(),  -5); // 0b11011
    /// assert_eq!(Offset::<i16, 5>::new_trunc(16).get(), -16); // 0b10000
    /// assert_eq!(Offset::<u16, 5>::new_trunc(32).get(),   0); // 0b00000
    /// ```
    pub fn new_trunc(n: OFF) -> Self {
        assert!(N <= OFF::BITS, "bit size {N} exceeds size of backing ({})", OFF::BITS);
        Self(n.truncate(N))
    }

    /// Gets the value of the offset.
    pub fn get(&self) -> OFF {
        self.0
    }
}

impl<const N: u32> IOffset<N> {
    /// Reads an `N`-bit signed field from the bottom of an instruction word.
    pub(crate) fn from_field(word: u16) -> Self {
        Self(sign_extend(word & field_mask(N), N) as i16)
    }

    /// The offset as it sits in the bottom `N` bits of an instruction word.
    pub(crate) fn field(&self) -> u16 {
        (self.0 as u16) & field_mask(N)
    }
}

/// Mask of the bottom `n` bits of a word.
pub(crate) fn field_mask(n: u32) -> u16 {
    match n {
        16 => u16::MAX,
        n  => (1 << n) - 1
    }
}
