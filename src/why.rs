//! Constants and lookups describing the Why architecture's register file.
//!
//! Why has 128 registers split into fixed-purpose bands. Only the temporary
//! and saved bands ("general purpose") are available to the allocator; every
//! other band is either a hardwired special register (`$0`, `$sp`, ...) or
//! reserved for a specific producer (kernel, assembler, floating point,
//! exception handling).

/// Size of a machine word, in bytes.
pub const WORD_SIZE: i64 = 8;

/// Total number of architectural registers.
pub const TOTAL_REGISTERS: u8 = 128;

pub const ZERO_OFFSET: u8 = 0;
pub const GLOBAL_AREA_POINTER_OFFSET: u8 = 1;
pub const STACK_POINTER_OFFSET: u8 = 2;
pub const FRAME_POINTER_OFFSET: u8 = 3;
pub const RETURN_ADDRESS_OFFSET: u8 = 4;
pub const LO_OFFSET: u8 = 5;
pub const HI_OFFSET: u8 = 6;
pub const STATUS_OFFSET: u8 = 101;

pub const RETURN_VALUE_OFFSET: u8 = 7;
pub const RETURN_VALUE_COUNT: u8 = 16;

pub const ARGUMENT_OFFSET: u8 = 23;
pub const ARGUMENT_COUNT: u8 = 16;

pub const TEMPORARY_OFFSET: u8 = 39;
pub const TEMPORARY_COUNT: u8 = 23;

pub const SAVED_OFFSET: u8 = 62;
pub const SAVED_COUNT: u8 = 23;

pub const KERNEL_OFFSET: u8 = 85;
pub const KERNEL_COUNT: u8 = 16;

pub const ASSEMBLER_OFFSET: u8 = 102;
pub const ASSEMBLER_COUNT: u8 = 16;

pub const FLOATING_OFFSET: u8 = 118;
pub const FLOATING_COUNT: u8 = 4;

pub const EXCEPTION_OFFSET: u8 = 122;
pub const EXCEPTION_COUNT: u8 = 6;

/// Number of general-purpose (allocatable) registers: temporaries + saved.
pub const GENERAL_PURPOSE_COUNT: u8 = TEMPORARY_COUNT + SAVED_COUNT;

/// The functional band a register offset belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegisterClass {
    Zero,
    GlobalAreaPointer,
    StackPointer,
    FramePointer,
    ReturnAddress,
    Lo,
    Hi,
    Status,
    ReturnValue,
    Argument,
    Temporary,
    Saved,
    Kernel,
    Assembler,
    Floating,
    Exception,
}

impl RegisterClass {
    /// Classifies an architectural register offset. Panics on an offset
    /// outside `[0, TOTAL_REGISTERS)`; there is no such thing as an invalid
    /// physical register in a well-formed program, so this is a logic error.
    pub fn of(offset: u8) -> Self {
        match offset {
            ZERO_OFFSET => Self::Zero,
            GLOBAL_AREA_POINTER_OFFSET => Self::GlobalAreaPointer,
            STACK_POINTER_OFFSET => Self::StackPointer,
            FRAME_POINTER_OFFSET => Self::FramePointer,
            RETURN_ADDRESS_OFFSET => Self::ReturnAddress,
            LO_OFFSET => Self::Lo,
            HI_OFFSET => Self::Hi,
            STATUS_OFFSET => Self::Status,
            o if in_band(o, RETURN_VALUE_OFFSET, RETURN_VALUE_COUNT) => Self::ReturnValue,
            o if in_band(o, ARGUMENT_OFFSET, ARGUMENT_COUNT) => Self::Argument,
            o if in_band(o, TEMPORARY_OFFSET, TEMPORARY_COUNT) => Self::Temporary,
            o if in_band(o, SAVED_OFFSET, SAVED_COUNT) => Self::Saved,
            o if in_band(o, KERNEL_OFFSET, KERNEL_COUNT) => Self::Kernel,
            o if in_band(o, ASSEMBLER_OFFSET, ASSEMBLER_COUNT) => Self::Assembler,
            o if in_band(o, FLOATING_OFFSET, FLOATING_COUNT) => Self::Floating,
            o if in_band(o, EXCEPTION_OFFSET, EXCEPTION_COUNT) => Self::Exception,
            o => panic!("register offset {} does not belong to any known band", o),
        }
    }
}

fn in_band(offset: u8, band_offset: u8, band_count: u8) -> bool {
    band_offset <= offset && offset < band_offset + band_count
}

/// Whether `offset` is a general-purpose (allocatable) register.
pub fn is_general_purpose(offset: u8) -> bool {
    matches!(RegisterClass::of(offset), RegisterClass::Temporary | RegisterClass::Saved)
}

/// Whether `offset` is an architectural argument register.
pub fn is_argument_register(offset: u8) -> bool {
    matches!(RegisterClass::of(offset), RegisterClass::Argument)
}

/// The inclusive `[lo, hi]` range the allocator is allowed to assign colors
/// from.
pub fn allocatable_range() -> (u8, u8) {
    (TEMPORARY_OFFSET, SAVED_OFFSET + SAVED_COUNT - 1)
}

/// Renders the canonical assembly name for an architectural register, e.g.
/// `$0`, `$fp`, `$a3`, `$t1c` (hex digit for offsets past 9).
pub fn register_name(offset: u8) -> String {
    match offset {
        ZERO_OFFSET => "$0".to_string(),
        GLOBAL_AREA_POINTER_OFFSET => "$g".to_string(),
        STACK_POINTER_OFFSET => "$sp".to_string(),
        FRAME_POINTER_OFFSET => "$fp".to_string(),
        RETURN_ADDRESS_OFFSET => "$rt".to_string(),
        LO_OFFSET => "$lo".to_string(),
        HI_OFFSET => "$hi".to_string(),
        STATUS_OFFSET => "$st".to_string(),
        o => {
            let (letter, band_offset) = match RegisterClass::of(o) {
                RegisterClass::ReturnValue => ('r', RETURN_VALUE_OFFSET),
                RegisterClass::Argument => ('a', ARGUMENT_OFFSET),
                RegisterClass::Temporary => ('t', TEMPORARY_OFFSET),
                RegisterClass::Saved => ('s', SAVED_OFFSET),
                RegisterClass::Kernel => ('k', KERNEL_OFFSET),
                RegisterClass::Assembler => ('m', ASSEMBLER_OFFSET),
                RegisterClass::Floating => ('f', FLOATING_OFFSET),
                RegisterClass::Exception => ('e', EXCEPTION_OFFSET),
                _ => unreachable!("single-register classes handled above"),
            };
            format!("${}{:x}", letter, o - band_offset)
        }
    }
}
