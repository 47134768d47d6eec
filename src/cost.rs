//! Cycle cost accounting.
//!
//! Instructions carry a base cost and every event they trigger adds its own.
//! The table is plain configuration; `Default` gives the standard costs.

use crate::memory::{AddressSpace, ProcessStats};
use crate::vm_manager::{Event, Instruction};

/// Cycles charged per instruction kind and per event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostTable {
    pub map: u64,
    pub unmap: u64,
    pub page_in: u64,
    pub page_out: u64,
    pub file_in: u64,
    pub file_out: u64,
    pub zero: u64,
    pub segv: u64,
    pub segprot: u64,
    pub context_switch: u64,
    pub exit: u64,
    pub read: u64,
    pub write: u64,
}

impl Default for CostTable {
    fn default() -> Self {
        CostTable {
            map: 350,
            unmap: 410,
            page_in: 3200,
            page_out: 2750,
            file_in: 2350,
            file_out: 2800,
            zero: 150,
            segv: 440,
            segprot: 410,
            context_switch: 130,
            exit: 1230,
            read: 1,
            write: 1,
        }
    }
}

impl CostTable {
    pub fn instruction_cost(&self, instr: &Instruction) -> u64 {
        match instr {
            Instruction::ContextSwitch(_) => self.context_switch,
            Instruction::Exit(_) => self.exit,
            Instruction::Read(_) => self.read,
            Instruction::Write(_) => self.write,
        }
    }

    pub fn event_cost(&self, event: &Event) -> u64 {
        match event {
            // charged through the exit instruction
            Event::Exit { .. } => 0,
            Event::Unmap { .. } => self.unmap,
            Event::Out => self.page_out,
            Event::Fout => self.file_out,
            Event::In => self.page_in,
            Event::Fin => self.file_in,
            Event::Zero => self.zero,
            Event::Map { .. } => self.map,
            Event::Segv => self.segv,
            Event::Segprot => self.segprot,
        }
    }

    /// Total cycles for a run with the given event totals and instruction counts
    pub fn total(&self, stats: &ProcessStats, counters: &RunCounters) -> u64 {
        stats.maps * self.map
            + stats.unmaps * self.unmap
            + stats.ins * self.page_in
            + stats.outs * self.page_out
            + stats.fins * self.file_in
            + stats.fouts * self.file_out
            + stats.zeros * self.zero
            + stats.segv * self.segv
            + stats.segprot * self.segprot
            + counters.context_switches * self.context_switch
            + counters.exits * self.exit
            + counters.reads * self.read
            + counters.writes * self.write
    }
}

/// Run-wide instruction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub instructions: u64,
    pub context_switches: u64,
    pub exits: u64,
    pub reads: u64,
    pub writes: u64,
}

/// Per-process and aggregate statistics plus the total cost of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub per_process: Vec<(usize, ProcessStats)>,
    pub totals: ProcessStats,
    pub counters: RunCounters,
    pub cost: u64,
}

impl Summary {
    pub fn new(processes: &[AddressSpace], counters: &RunCounters, costs: &CostTable) -> Self {
        let per_process: Vec<(usize, ProcessStats)> = processes.iter().map(|p| (p.id, p.stats)).collect();
        let totals: ProcessStats = per_process.iter().map(|&(_, stats)| stats).sum();
        Summary {
            cost: costs.total(&totals, counters),
            per_process,
            totals,
            counters: *counters,
        }
    }
}
