pub mod constants;
pub mod cost;
pub mod error;
pub mod io;
pub mod logging;
pub mod memory;
pub mod pager;
pub mod report;
pub mod vm_manager;

// Re-export commonly used items for convenience
pub use constants::*;
pub use cost::{CostTable, RunCounters, Summary};
pub use error::{AccessFault, SimError};
pub use io::InputData;
pub use memory::{AddressSpace, Frame, FrameTable, Occupant, ProcessStats, Pte, PteFlags, Vma};
pub use pager::{Algorithm, Pager, RandomSequence};
pub use report::OutputOptions;
pub use vm_manager::{Event, Instruction, Simulator};
