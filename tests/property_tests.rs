//! Property-based tests for the memory manager.
//!
//! Random instruction streams are run under every replacement policy and the
//! frame/page-table bookkeeping is checked after each instruction.

use mmu_sim::{
    AddressSpace, Algorithm, CostTable, Event, Instruction, Occupant, Pager, RandomSequence, Simulator, Vma,
};
use proptest::prelude::*;

// ============================================================================
// Generation Strategies
// ============================================================================

const PROCESSES: usize = 3;

/// Fixed layout with holes, protected ranges and file mappings
fn address_spaces() -> Vec<AddressSpace> {
    vec![
        AddressSpace::new(0, vec![Vma::new(0, 15, false, false), Vma::new(32, 47, false, true)]),
        AddressSpace::new(1, vec![Vma::new(0, 31, true, false), Vma::new(40, 63, false, false)]),
        AddressSpace::new(2, vec![Vma::new(8, 23, false, true), Vma::new(24, 30, true, true)]),
    ]
}

fn instruction() -> impl Strategy<Value = Instruction> {
    prop_oneof![
        2 => (0..PROCESSES).prop_map(Instruction::ContextSwitch),
        1 => (0..PROCESSES).prop_map(Instruction::Exit),
        10 => (0usize..64).prop_map(Instruction::Read),
        7 => (0usize..64).prop_map(Instruction::Write),
    ]
}

fn stream() -> impl Strategy<Value = Vec<Instruction>> {
    prop::collection::vec(instruction(), 1..300).prop_map(|mut instrs| {
        instrs.insert(0, Instruction::ContextSwitch(0));
        instrs
    })
}

fn algorithm() -> impl Strategy<Value = Algorithm> {
    prop_oneof![
        Just(Algorithm::Fifo),
        Just(Algorithm::Random),
        Just(Algorithm::Clock),
        Just(Algorithm::Nru),
        Just(Algorithm::Aging),
        Just(Algorithm::WorkingSet),
    ]
}

fn simulator(algorithm: Algorithm, frames: usize, numbers: Vec<u32>) -> Simulator {
    let numbers = RandomSequence::new(numbers).unwrap();
    let pager = Pager::new(algorithm, Some(numbers)).unwrap();
    Simulator::new(address_spaces(), frames, pager)
}

fn check_invariants(sim: &Simulator) -> Result<(), TestCaseError> {
    let frames = sim.frames();
    prop_assert_eq!(frames.free_count() + frames.in_use_count(), frames.len());

    for frame in frames.iter() {
        if let Some(occ) = frame.occupant {
            let pte = sim.pte(occ.process, occ.page);
            prop_assert!(pte.is_present());
            prop_assert_eq!(pte.frame(), frame.id);
        }
    }
    for frame in frames.free_frames() {
        prop_assert!(!frames.frame(frame).in_use());
    }

    for space in sim.processes() {
        let mut present = 0;
        for (page, pte) in space.page_table.iter().enumerate() {
            if pte.is_present() {
                present += 1;
                let occ = frames.frame(pte.frame()).occupant;
                prop_assert_eq!(occ, Some(Occupant { process: space.id, page }));
                prop_assert!(space.find_vma(page).is_some());
            }
            if pte.is_paged_out() {
                prop_assert!(!pte.is_file_mapped());
            }
        }
        prop_assert_eq!(space.stats.maps - space.stats.unmaps, present);
    }
    Ok(())
}

// ============================================================================
// Bookkeeping Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_frames_and_ptes_agree(
        algorithm in algorithm(),
        frames in 1usize..9,
        numbers in prop::collection::vec(0u32..1000, 1..20),
        instrs in stream()
    ) {
        let mut sim = simulator(algorithm, frames, numbers);
        for instr in instrs {
            sim.execute(instr);
            check_invariants(&sim)?;
        }
    }

    #[test]
    fn prop_every_fault_loads_exactly_once(
        algorithm in algorithm(),
        frames in 1usize..9,
        numbers in prop::collection::vec(0u32..1000, 1..20),
        instrs in stream()
    ) {
        let mut sim = simulator(algorithm, frames, numbers);
        for instr in instrs {
            let events = sim.execute(instr);
            let maps = events.iter().filter(|e| matches!(e, Event::Map { .. })).count();
            let loads = events
                .iter()
                .filter(|e| matches!(e, Event::Zero | Event::In | Event::Fin))
                .count();
            prop_assert_eq!(maps, loads);
            prop_assert!(maps <= 1);
            if events.contains(&Event::Segv) {
                prop_assert_eq!(events.as_slice(), &[Event::Segv]);
            }
            if matches!(instr, Instruction::Exit(_)) {
                prop_assert!(!events.contains(&Event::Out));
            }
        }
    }

    #[test]
    fn prop_cost_matches_event_stream(
        algorithm in algorithm(),
        frames in 1usize..9,
        numbers in prop::collection::vec(0u32..1000, 1..20),
        instrs in stream()
    ) {
        let costs = CostTable::default();
        let mut sim = simulator(algorithm, frames, numbers);
        let mut observed = 0u64;
        let count = instrs.len() as u64;
        sim.run(instrs, |_, instr, events| {
            observed += costs.instruction_cost(instr);
            observed += events.iter().map(|e| costs.event_cost(e)).sum::<u64>();
        });
        let summary = sim.summary(&costs);
        prop_assert_eq!(summary.cost, observed);
        prop_assert_eq!(summary.counters.instructions, count);
    }

    #[test]
    fn prop_untouched_pages_stay_clean(
        algorithm in algorithm(),
        frames in 1usize..9,
        instrs in stream()
    ) {
        let mut sim = simulator(algorithm, frames, vec![7, 3, 11]);
        let touched: Vec<usize> = instrs
            .iter()
            .filter_map(|i| match i {
                Instruction::Read(p) | Instruction::Write(p) => Some(*p),
                _ => None,
            })
            .collect();
        for instr in instrs {
            sim.execute(instr);
        }
        for page in (0..64).filter(|p| !touched.contains(p)) {
            for space in sim.processes() {
                prop_assert!(space.pte(page).flags().is_empty());
            }
        }
    }
}

// ============================================================================
// Policy Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_fifo_evicts_in_binding_order(frames in 1usize..9, extra in 1usize..16) {
        let mut sim = simulator(Algorithm::Fifo, frames, vec![0]);
        sim.execute(Instruction::ContextSwitch(1));
        // process 1 maps pages 40..=63 writable and anonymous
        let pages: Vec<usize> = (40..40 + frames + extra).collect();
        let mut evicted = Vec::new();
        for &page in &pages {
            for event in sim.execute(Instruction::Read(page)) {
                if let Event::Unmap { page, .. } = event {
                    evicted.push(page);
                }
            }
        }
        prop_assert_eq!(evicted, pages[..extra].to_vec());
    }
}
