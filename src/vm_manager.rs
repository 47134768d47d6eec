use std::fmt;

use log::{debug, trace, warn};

use crate::constants::*;
use crate::cost::{CostTable, RunCounters, Summary};
use crate::error::AccessFault;
use crate::memory::{AddressSpace, FrameTable, MemoryState, Occupant, Pte, PteFlags};
use crate::pager::{Algorithm, Pager, VirtualTime};

/// One entry of the instruction stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    ContextSwitch(usize),
    Exit(usize),
    Read(usize),
    Write(usize),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::ContextSwitch(p) => write!(f, "c {}", p),
            Instruction::Exit(p) => write!(f, "e {}", p),
            Instruction::Read(page) => write!(f, "r {}", page),
            Instruction::Write(page) => write!(f, "w {}", page),
        }
    }
}

/// What an instruction did, in the order it happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Exit { process: usize },
    Unmap { process: usize, page: usize },
    Out,
    Fout,
    In,
    Fin,
    Zero,
    Map { frame: usize },
    Segv,
    Segprot,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Exit { process } => write!(f, "EXIT current process {}", process),
            Event::Unmap { process, page } => write!(f, " UNMAP {}:{}", process, page),
            Event::Out => write!(f, " OUT"),
            Event::Fout => write!(f, " FOUT"),
            Event::In => write!(f, " IN"),
            Event::Fin => write!(f, " FIN"),
            Event::Zero => write!(f, " ZERO"),
            Event::Map { frame } => write!(f, " MAP {}", frame),
            Event::Segv => write!(f, " SEGV"),
            Event::Segprot => write!(f, " SEGPROT"),
        }
    }
}

/// The memory manager: address spaces, frames, the active pager and the clock.
///
/// Single writer. Every mutation goes through `execute`.
pub struct Simulator {
    mem: MemoryState,
    pager: Pager,
    time: VirtualTime,
    current: Option<usize>,
    counters: RunCounters,
}

impl Simulator {
    pub fn new(processes: Vec<AddressSpace>, frame_count: usize, pager: Pager) -> Self {
        Simulator {
            mem: MemoryState::new(processes, frame_count),
            pager,
            time: VirtualTime::default(),
            current: None,
            counters: RunCounters::default(),
        }
    }

    pub fn processes(&self) -> &[AddressSpace] {
        &self.mem.processes
    }

    pub fn process(&self, id: usize) -> &AddressSpace {
        &self.mem.processes[id]
    }

    pub fn frames(&self) -> &FrameTable {
        &self.mem.frames
    }

    pub fn pte(&self, process: usize, page: usize) -> Pte {
        *self.mem.processes[process].pte(page)
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    pub fn policy(&self) -> Algorithm {
        self.pager.algorithm()
    }

    pub fn current_process(&self) -> Option<usize> {
        self.current
    }

    pub fn time(&self) -> VirtualTime {
        self.time
    }

    pub fn summary(&self, costs: &CostTable) -> Summary {
        Summary::new(&self.mem.processes, &self.counters, costs)
    }

    /// Run a whole instruction stream, handing each instruction's events to `observer`
    pub fn run<I, F>(&mut self, instructions: I, mut observer: F)
    where
        I: IntoIterator<Item = Instruction>,
        F: FnMut(usize, &Instruction, &[Event]),
    {
        for (idx, instr) in instructions.into_iter().enumerate() {
            let events = self.execute(instr);
            observer(idx, &instr, &events);
        }
    }

    /// Execute one instruction and report what happened
    pub fn execute(&mut self, instr: Instruction) -> Vec<Event> {
        let mut events = Vec::new();
        self.time.advance();
        self.counters.instructions += 1;
        trace!("tick {}: {}", self.time.tick, instr);

        match instr {
            Instruction::ContextSwitch(process) => {
                self.counters.context_switches += 1;
                self.current = Some(process);
            }
            Instruction::Exit(process) => {
                self.counters.exits += 1;
                self.current = Some(process);
                self.exit_process(process, &mut events);
            }
            Instruction::Read(page) | Instruction::Write(page) => {
                let write = matches!(instr, Instruction::Write(_));
                if write {
                    self.counters.writes += 1;
                } else {
                    self.counters.reads += 1;
                }
                let Some(process) = self.current else {
                    warn!("{} issued before any context switch, ignored", instr);
                    return events;
                };
                match self.access(process, page, write, &mut events) {
                    Ok(()) => {}
                    Err(fault @ AccessFault::Segmentation { .. }) => {
                        debug!("{}", fault);
                        self.mem.processes[process].stats.segv += 1;
                        events.push(Event::Segv);
                    }
                    Err(fault @ AccessFault::Protection { .. }) => {
                        debug!("{}", fault);
                        self.mem.processes[process].stats.segprot += 1;
                        events.push(Event::Segprot);
                    }
                }
            }
        }
        events
    }

    /// Touch `page` of `process`, faulting it in first if needed
    fn access(&mut self, process: usize, page: usize, write: bool, events: &mut Vec<Event>) -> Result<(), AccessFault> {
        if !self.mem.processes[process].pte(page).is_present() {
            self.handle_page_fault(process, page, events)?;
        }

        let pte = self.mem.processes[process].pte_mut(page);
        pte.set(PteFlags::REFERENCED, true);
        if write {
            if pte.is_write_protected() {
                return Err(AccessFault::Protection { process, page });
            }
            pte.set(PteFlags::MODIFIED, true);
        }
        Ok(())
    }

    fn handle_page_fault(&mut self, process: usize, page: usize, events: &mut Vec<Event>) -> Result<(), AccessFault> {
        let space = &mut self.mem.processes[process];
        if !space.pte(page).contains(PteFlags::VALID_VMA) {
            let Some(vma) = space.find_vma(page).copied() else {
                return Err(AccessFault::Segmentation { process, page });
            };
            let pte = space.pte_mut(page);
            pte.set(PteFlags::VALID_VMA, true);
            pte.set(PteFlags::WRITE_PROTECT, vma.write_protected);
            pte.set(PteFlags::FILE_MAPPED, vma.file_mapped);
        }

        let frame = self.allocate_frame();
        if self.mem.frames.frame(frame).in_use() {
            self.unmap_frame(frame, events);
        }
        self.map_frame(frame, process, page, events);
        Ok(())
    }

    /// Free pool first, the pager only when the pool is empty
    fn allocate_frame(&mut self) -> usize {
        match self.mem.frames.take_free() {
            Some(frame) => frame,
            None => self.pager.select_victim(&mut self.mem, &mut self.time),
        }
    }

    /// Evict the occupant of `frame`, writing it back if dirty
    fn unmap_frame(&mut self, frame: usize, events: &mut Vec<Event>) {
        let Some(occ) = self.mem.frames.frame(frame).occupant else {
            return;
        };
        let space = &mut self.mem.processes[occ.process];
        events.push(Event::Unmap { process: occ.process, page: occ.page });
        space.stats.unmaps += 1;

        let pte = space.pte_mut(occ.page);
        if pte.is_modified() {
            if pte.is_file_mapped() {
                events.push(Event::Fout);
                space.stats.fouts += 1;
            } else {
                pte.set(PteFlags::PAGED_OUT, true);
                events.push(Event::Out);
                space.stats.outs += 1;
            }
            space.pte_mut(occ.page).set(PteFlags::MODIFIED, false);
        }
        space.pte_mut(occ.page).set(PteFlags::PRESENT, false);

        // pool was empty, so the victim is its only entry
        self.mem.frames.release(frame);
        let reclaimed = self.mem.frames.take_free();
        debug_assert_eq!(reclaimed, Some(frame));
        debug!("evicted {}:{} from frame {}", occ.process, occ.page, frame);
    }

    fn map_frame(&mut self, frame: usize, process: usize, page: usize, events: &mut Vec<Event>) {
        let space = &mut self.mem.processes[process];
        let pte = *space.pte(page);

        let load = if pte.is_file_mapped() {
            space.stats.fins += 1;
            Event::Fin
        } else if pte.is_paged_out() {
            space.stats.ins += 1;
            Event::In
        } else {
            space.stats.zeros += 1;
            Event::Zero
        };
        events.push(load);

        let pte = space.pte_mut(page);
        pte.set(PteFlags::PRESENT, true);
        pte.set(PteFlags::REFERENCED, false);
        pte.set(PteFlags::MODIFIED, false);
        pte.set_frame(frame);

        self.mem.frames.bind(frame, Occupant { process, page }, self.time.tick);
        events.push(Event::Map { frame });
        space.stats.maps += 1;
    }

    /// Unmap every page of an exiting process; dirty file pages still go back to their file
    fn exit_process(&mut self, process: usize, events: &mut Vec<Event>) {
        events.push(Event::Exit { process });
        debug!("process {} exiting", process);

        for page in 0..PAGE_TABLE_SIZE {
            let space = &mut self.mem.processes[process];
            let pte = space.pte_mut(page);
            pte.set(PteFlags::PAGED_OUT, false);
            if !pte.is_present() {
                continue;
            }
            pte.set(PteFlags::PRESENT, false);
            let frame = pte.frame();
            let write_back = pte.is_modified() && pte.is_file_mapped();

            events.push(Event::Unmap { process, page });
            space.stats.unmaps += 1;
            if write_back {
                events.push(Event::Fout);
                space.stats.fouts += 1;
            }
            self.mem.frames.release(frame);
        }
        self.mem.processes[process].exited = true;
    }
}
