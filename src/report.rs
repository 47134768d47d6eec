//! Text renderings of the simulator state.
//!
//! Each function returns a `String` so the caller decides where it goes.

use std::fmt::Write;
use std::str::FromStr;

use log::warn;

use crate::constants::*;
use crate::cost::Summary;
use crate::memory::{AddressSpace, FrameTable, Pte, PteFlags};
use crate::vm_manager::{Event, Instruction};

/// Which reports to print, from the `-o` letters `OPFS`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputOptions {
    /// O: per-instruction trace
    pub trace: bool,
    /// P: final page tables
    pub page_table: bool,
    /// F: final frame table
    pub frame_table: bool,
    /// S: per-process statistics and total cost
    pub summary: bool,
}

impl FromStr for OutputOptions {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut options = OutputOptions::default();
        for c in s.chars() {
            match c {
                'O' => options.trace = true,
                'P' => options.page_table = true,
                'F' => options.frame_table = true,
                'S' => options.summary = true,
                other => warn!("Invalid option character: {}", other),
            }
        }
        Ok(options)
    }
}

/// Trace block for one instruction: the header line and one line per event
pub fn format_trace(idx: usize, instr: &Instruction, events: &[Event]) -> String {
    let mut out = format!("{}: ==> {}\n", idx, instr);
    for event in events {
        let _ = writeln!(out, "{}", event);
    }
    out
}

/// Output for one instruction. Exit lines are printed even when the trace is off.
pub fn format_events(idx: usize, instr: &Instruction, events: &[Event], trace: bool) -> String {
    if trace {
        return format_trace(idx, instr, events);
    }
    let mut out = String::new();
    for event in events.iter().filter(|e| matches!(e, Event::Exit { .. })) {
        let _ = writeln!(out, "{}", event);
    }
    out
}

fn format_pte(page: usize, pte: &Pte, show_pre_referenced: bool) -> String {
    if !pte.is_present() {
        return if pte.is_paged_out() { "#" } else { "*" }.to_string();
    }
    let referenced = if show_pre_referenced {
        pte.contains(PteFlags::PRE_REFERENCED)
    } else {
        pte.is_referenced()
    };
    format!(
        "{}:{}{}{}",
        page,
        if referenced { 'R' } else { '-' },
        if pte.is_modified() { 'M' } else { '-' },
        if pte.is_paged_out() { 'S' } else { '-' },
    )
}

/// `PT[p]: ` followed by all 64 entries.
///
/// The working-set pager clears referenced bits on every scan, so it reports
/// the last known state instead (`show_pre_referenced`).
pub fn format_page_table(space: &AddressSpace, show_pre_referenced: bool) -> String {
    let entries: Vec<String> = (0..PAGE_TABLE_SIZE)
        .map(|page| format_pte(page, space.pte(page), show_pre_referenced))
        .collect();
    format!("PT[{}]: {}", space.id, entries.join(" "))
}

pub fn format_frame_table(frames: &FrameTable, processes: &[AddressSpace]) -> String {
    let mut out = String::from("FT:");
    for frame in frames.iter() {
        match frame.occupant {
            Some(occ) => {
                let _ = write!(out, " {}:{}", processes[occ.process].id, occ.page);
            }
            None => out.push_str(" *"),
        }
    }
    out
}

/// `PROC[p]` lines for every process followed by the `TOTALCOST` line
pub fn format_summary(summary: &Summary) -> String {
    let mut out = String::new();
    for (id, s) in &summary.per_process {
        let _ = writeln!(
            out,
            "PROC[{}]: U={} M={} I={} O={} FI={} FO={} Z={} SV={} SP={}",
            id, s.unmaps, s.maps, s.ins, s.outs, s.fins, s.fouts, s.zeros, s.segv, s.segprot
        );
    }
    let _ = write!(
        out,
        "TOTALCOST {} {} {} {} {}",
        summary.counters.instructions,
        summary.counters.context_switches,
        summary.counters.exits,
        summary.cost,
        std::mem::size_of::<Pte>()
    );
    out
}
