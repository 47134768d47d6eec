//! Page replacement policies.
//!
//! Every policy answers one question: which in-use frame gives way when the
//! free pool is empty. Each variant owns its own scan state; the frames, page
//! tables and virtual clock are lent to it for the duration of one selection.

use std::fmt;
use std::str::FromStr;

use log::debug;

use crate::constants::*;
use crate::error::{Result, SimError};
use crate::memory::{MemoryState, PteFlags};

/// Instruction-driven clock shared by the dispatch loop and the pagers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VirtualTime {
    /// Instructions executed so far, including the current one
    pub tick: u64,
    /// Instructions since the NRU reference sweep last ran
    pub since_sweep: u64,
}

impl VirtualTime {
    pub fn advance(&mut self) {
        self.tick += 1;
        self.since_sweep += 1;
    }
}

/// Selectable replacement algorithm, named by its command-line letter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Fifo,
    Random,
    Clock,
    Nru,
    Aging,
    WorkingSet,
}

impl Algorithm {
    pub fn letter(&self) -> char {
        match self {
            Algorithm::Fifo => 'f',
            Algorithm::Random => 'r',
            Algorithm::Clock => 'c',
            Algorithm::Nru => 'e',
            Algorithm::Aging => 'a',
            Algorithm::WorkingSet => 'w',
        }
    }
}

impl FromStr for Algorithm {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "f" => Ok(Algorithm::Fifo),
            "r" => Ok(Algorithm::Random),
            "c" => Ok(Algorithm::Clock),
            "e" => Ok(Algorithm::Nru),
            "a" => Ok(Algorithm::Aging),
            "w" => Ok(Algorithm::WorkingSet),
            other => Err(SimError::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Fifo => "FIFO",
            Algorithm::Random => "Random",
            Algorithm::Clock => "Clock",
            Algorithm::Nru => "NRU",
            Algorithm::Aging => "Aging",
            Algorithm::WorkingSet => "Working-Set",
        };
        write!(f, "{}", name)
    }
}

/// Pre-loaded random numbers, consumed in order and wrapped at the end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomSequence {
    values: Vec<u32>,
    offset: usize,
}

impl RandomSequence {
    pub fn new(values: Vec<u32>) -> Result<Self> {
        if values.is_empty() {
            return Err(SimError::MissingRandomNumbers);
        }
        Ok(RandomSequence { values, offset: 0 })
    }

    /// Next value reduced modulo `modulus`
    pub fn next(&mut self, modulus: usize) -> usize {
        let value = self.values[self.offset] as usize % modulus;
        self.offset = (self.offset + 1) % self.values.len();
        value
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A replacement policy and its private state
#[derive(Debug, Clone)]
pub enum Pager {
    Fifo { hand: usize },
    Clock { hand: usize },
    Random { numbers: RandomSequence },
    Nru { hand: usize },
    Aging { hand: usize },
    WorkingSet { hand: usize },
}

impl Pager {
    /// Build the pager for `algorithm`. Only Random consumes `numbers`.
    pub fn new(algorithm: Algorithm, numbers: Option<RandomSequence>) -> Result<Self> {
        Ok(match algorithm {
            Algorithm::Fifo => Pager::Fifo { hand: 0 },
            Algorithm::Clock => Pager::Clock { hand: 0 },
            Algorithm::Random => Pager::Random {
                numbers: numbers.ok_or(SimError::MissingRandomNumbers)?,
            },
            Algorithm::Nru => Pager::Nru { hand: 0 },
            Algorithm::Aging => Pager::Aging { hand: 0 },
            Algorithm::WorkingSet => Pager::WorkingSet { hand: 0 },
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Pager::Fifo { .. } => Algorithm::Fifo,
            Pager::Clock { .. } => Algorithm::Clock,
            Pager::Random { .. } => Algorithm::Random,
            Pager::Nru { .. } => Algorithm::Nru,
            Pager::Aging { .. } => Algorithm::Aging,
            Pager::WorkingSet { .. } => Algorithm::WorkingSet,
        }
    }

    /// Choose the frame to reclaim.
    ///
    /// Only called when the free pool is empty, so every frame is in use. The
    /// caller must unmap the returned frame before binding it again.
    pub fn select_victim(&mut self, mem: &mut MemoryState, time: &mut VirtualTime) -> usize {
        let victim = match self {
            Pager::Fifo { hand } => select_fifo(hand, mem.frames.len()),
            Pager::Clock { hand } => select_clock(hand, mem),
            Pager::Random { numbers } => numbers.next(mem.frames.len()),
            Pager::Nru { hand } => select_nru(hand, mem, time),
            Pager::Aging { hand } => select_aging(hand, mem),
            Pager::WorkingSet { hand } => select_working_set(hand, mem, time.tick),
        };
        debug!("{} pager selected frame {}", self.algorithm(), victim);
        victim
    }
}

fn select_fifo(hand: &mut usize, len: usize) -> usize {
    let victim = *hand;
    *hand = (*hand + 1) % len;
    victim
}

/// Second chance: referenced frames lose their bit and are passed over
fn select_clock(hand: &mut usize, mem: &mut MemoryState) -> usize {
    let len = mem.frames.len();
    // a full pass clears every bit, so the second pass always finds a victim
    for _ in 0..2 * len {
        let idx = *hand;
        *hand = (*hand + 1) % len;
        match mem.occupant_pte_mut(idx) {
            Some(pte) if pte.is_referenced() => pte.set(PteFlags::REFERENCED, false),
            Some(_) => return idx,
            None => {}
        }
    }
    *hand
}

fn select_nru(hand: &mut usize, mem: &mut MemoryState, time: &mut VirtualTime) -> usize {
    let len = mem.frames.len();
    let mut victim: Option<(usize, u8)> = None;

    for i in 0..len {
        let idx = (*hand + i) % len;
        let Some(pte) = mem.occupant_pte(idx) else {
            continue;
        };
        let class = 2 * pte.is_referenced() as u8 + pte.is_modified() as u8;
        if victim.is_none_or(|(_, lowest)| class < lowest) {
            victim = Some((idx, class));
            if class == 0 {
                break;
            }
        }
    }

    sweep_referenced_bits(mem, time);

    match victim {
        Some((idx, _)) => {
            *hand = (idx + 1) % len;
            idx
        }
        None => *hand,
    }
}

/// Clear every referenced bit once `NRU_RESET_INTERVAL` instructions have passed.
// Only the NRU pager runs this sweep, and only when it is asked for a victim.
fn sweep_referenced_bits(mem: &mut MemoryState, time: &mut VirtualTime) {
    if time.since_sweep < NRU_RESET_INTERVAL {
        return;
    }
    for idx in 0..mem.frames.len() {
        if let Some(pte) = mem.occupant_pte_mut(idx) {
            pte.set(PteFlags::REFERENCED, false);
        }
    }
    debug!("reference sweep at tick {}", time.tick);
    time.since_sweep = 0;
}

fn select_aging(hand: &mut usize, mem: &mut MemoryState) -> usize {
    let len = mem.frames.len();

    for i in 0..len {
        let idx = (*hand + i) % len;
        let Some(occ) = mem.frames.frame(idx).occupant else {
            continue;
        };
        let pte = mem.processes[occ.process].pte_mut(occ.page);
        let referenced = pte.is_referenced();
        pte.set(PteFlags::REFERENCED, false);

        let frame = mem.frames.frame_mut(idx);
        frame.age >>= 1;
        if referenced {
            frame.age |= AGE_MSB;
        }
    }

    // strict comparison keeps the first frame met on ties
    let mut victim: Option<(usize, u32)> = None;
    for i in 0..len {
        let idx = (*hand + i) % len;
        let frame = mem.frames.frame(idx);
        if frame.in_use() && victim.is_none_or(|(_, youngest)| frame.age < youngest) {
            victim = Some((idx, frame.age));
        }
    }

    let idx = victim.map_or(*hand, |(idx, _)| idx);
    *hand = (idx + 1) % len;
    idx
}

fn select_working_set(hand: &mut usize, mem: &mut MemoryState, tick: u64) -> usize {
    let len = mem.frames.len();
    let mut oldest: Option<(usize, u64)> = None;
    let mut victim = None;

    for i in 0..len {
        let idx = (*hand + i) % len;
        let Some(occ) = mem.frames.frame(idx).occupant else {
            continue;
        };
        let pte = mem.processes[occ.process].pte_mut(occ.page);
        if pte.is_referenced() {
            pte.set(PteFlags::PRE_REFERENCED, true);
            pte.set(PteFlags::REFERENCED, false);
            mem.frames.frame_mut(idx).last_used = tick;
        }
        let referenced = pte.is_referenced();

        let last_used = mem.frames.frame(idx).last_used;
        if !referenced && tick.saturating_sub(last_used) > WORKING_SET_TAU {
            victim = Some(idx);
            break;
        }
        if oldest.is_none_or(|(_, time)| last_used < time) {
            oldest = Some((idx, last_used));
        }
    }

    let idx = victim
        .or(oldest.map(|(idx, _)| idx))
        .unwrap_or(*hand);
    *hand = (idx + 1) % len;
    idx
}
