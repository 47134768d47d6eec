// number of virtual pages per address space
pub const PAGE_TABLE_SIZE: usize = 64;

// frame index lives in a 7-bit field of the PTE word
pub const FRAME_BITS: u32 = 7;
pub const MAX_FRAMES: usize = 1 << FRAME_BITS;

// PTE word layout: flag bits in the low byte, frame index above them
pub const FRAME_SHIFT: u32 = 8;
pub const FRAME_MASK: u32 = (1 << FRAME_BITS) - 1;

// aging counter is 32 bits wide; a reference sets the top bit
pub const AGE_MSB: u32 = 0x8000_0000;

// working-set recency threshold, in instruction ticks
pub const WORKING_SET_TAU: u64 = 49;

// NRU clears every referenced bit once this many instructions have passed
pub const NRU_RESET_INTERVAL: u64 = 48;
