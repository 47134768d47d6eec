use std::collections::VecDeque;

use bitflags::bitflags;

use crate::constants::*;

bitflags! {
    /// Status bits kept in the low byte of a PTE word
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PteFlags: u32 {
        const PRESENT = 1 << 0;
        const REFERENCED = 1 << 1;
        const MODIFIED = 1 << 2;
        const WRITE_PROTECT = 1 << 3;
        const FILE_MAPPED = 1 << 4;
        const PAGED_OUT = 1 << 5;
        /// The page was already found inside one of the process's VMAs
        const VALID_VMA = 1 << 6;
        /// Last known reference state, kept for reporting under the working-set pager
        const PRE_REFERENCED = 1 << 7;
    }
}

/// Page table entry packed into a single 32-bit word.
///
/// Flags occupy bits 0-7, the frame index bits 8-14. The frame index is only
/// meaningful while `PRESENT` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pte(u32);

impl Pte {
    #[inline]
    pub fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    #[inline]
    pub fn contains(&self, flag: PteFlags) -> bool {
        self.flags().contains(flag)
    }

    /// Set or clear `flag`, leaving the frame index untouched
    pub fn set(&mut self, flag: PteFlags, value: bool) {
        let mut flags = self.flags();
        flags.set(flag, value);
        self.0 = (self.0 & !PteFlags::all().bits()) | flags.bits();
    }

    #[inline]
    pub fn frame(&self) -> usize {
        ((self.0 >> FRAME_SHIFT) & FRAME_MASK) as usize
    }

    pub fn set_frame(&mut self, frame: usize) {
        self.0 = (self.0 & !(FRAME_MASK << FRAME_SHIFT)) | ((frame as u32 & FRAME_MASK) << FRAME_SHIFT);
    }

    #[inline]
    pub fn is_present(&self) -> bool {
        self.contains(PteFlags::PRESENT)
    }

    #[inline]
    pub fn is_referenced(&self) -> bool {
        self.contains(PteFlags::REFERENCED)
    }

    #[inline]
    pub fn is_modified(&self) -> bool {
        self.contains(PteFlags::MODIFIED)
    }

    #[inline]
    pub fn is_write_protected(&self) -> bool {
        self.contains(PteFlags::WRITE_PROTECT)
    }

    #[inline]
    pub fn is_file_mapped(&self) -> bool {
        self.contains(PteFlags::FILE_MAPPED)
    }

    #[inline]
    pub fn is_paged_out(&self) -> bool {
        self.contains(PteFlags::PAGED_OUT)
    }
}

/// Virtual memory area: an inclusive range of pages sharing the same attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vma {
    pub start_page: usize,
    pub end_page: usize,
    pub write_protected: bool,
    pub file_mapped: bool,
}

impl Vma {
    pub fn new(start_page: usize, end_page: usize, write_protected: bool, file_mapped: bool) -> Self {
        Vma {
            start_page,
            end_page,
            write_protected,
            file_mapped,
        }
    }

    #[inline]
    pub fn contains(&self, page: usize) -> bool {
        page >= self.start_page && page <= self.end_page
    }

    pub fn page_count(&self) -> usize {
        self.end_page - self.start_page + 1
    }
}

/// Per-process event counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    pub maps: u64,
    pub unmaps: u64,
    pub ins: u64,
    pub outs: u64,
    pub fins: u64,
    pub fouts: u64,
    pub zeros: u64,
    pub segv: u64,
    pub segprot: u64,
}

impl std::ops::AddAssign for ProcessStats {
    fn add_assign(&mut self, other: Self) {
        self.maps += other.maps;
        self.unmaps += other.unmaps;
        self.ins += other.ins;
        self.outs += other.outs;
        self.fins += other.fins;
        self.fouts += other.fouts;
        self.zeros += other.zeros;
        self.segv += other.segv;
        self.segprot += other.segprot;
    }
}

impl std::iter::Sum for ProcessStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(ProcessStats::default(), |mut acc, stats| {
            acc += stats;
            acc
        })
    }
}

/// A process: its VMAs, its page table and its statistics.
///
/// Created once at load time and kept after exit so it can still be reported.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    pub id: usize,
    pub vmas: Vec<Vma>,
    pub page_table: [Pte; PAGE_TABLE_SIZE],
    pub exited: bool,
    pub stats: ProcessStats,
}

impl AddressSpace {
    pub fn new(id: usize, vmas: Vec<Vma>) -> Self {
        AddressSpace {
            id,
            vmas,
            page_table: [Pte::default(); PAGE_TABLE_SIZE],
            exited: false,
            stats: ProcessStats::default(),
        }
    }

    /// Sum of the VMA sizes
    pub fn mapped_pages(&self) -> usize {
        self.vmas.iter().map(Vma::page_count).sum()
    }

    /// First VMA covering `page`, in declaration order
    pub fn find_vma(&self, page: usize) -> Option<&Vma> {
        self.vmas.iter().find(|vma| vma.contains(page))
    }

    #[inline]
    pub fn pte(&self, page: usize) -> &Pte {
        &self.page_table[page]
    }

    #[inline]
    pub fn pte_mut(&mut self, page: usize) -> &mut Pte {
        &mut self.page_table[page]
    }
}

/// Back-reference from a frame to the (process, page) pair it holds.
///
/// Plain indices: the process list owns the page tables, the frame only names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupant {
    pub process: usize,
    pub page: usize,
}

/// A physical frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: usize,
    pub occupant: Option<Occupant>,
    /// Aging pager only
    pub age: u32,
    /// Working-set pager only
    pub last_used: u64,
}

impl Frame {
    fn new(id: usize) -> Self {
        Frame {
            id,
            occupant: None,
            age: 0,
            last_used: 0,
        }
    }

    #[inline]
    pub fn in_use(&self) -> bool {
        self.occupant.is_some()
    }
}

/// The frame table together with the pool of free frames.
///
/// Frames are handed out from the head of the pool and returned to its tail.
pub struct FrameTable {
    frames: Vec<Frame>,
    free: VecDeque<usize>,
}

impl FrameTable {
    /// Create `count` frames, all free, pooled in id order
    pub fn new(count: usize) -> Self {
        FrameTable {
            frames: (0..count).map(Frame::new).collect(),
            free: (0..count).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn frame(&self, id: usize) -> &Frame {
        &self.frames[id]
    }

    #[inline]
    pub fn frame_mut(&mut self, id: usize) -> &mut Frame {
        &mut self.frames[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Pop the head of the free pool
    pub fn take_free(&mut self) -> Option<usize> {
        self.free.pop_front()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.frames.iter().filter(|f| f.in_use()).count()
    }

    /// Ids currently waiting in the free pool, head first
    pub fn free_frames(&self) -> impl Iterator<Item = usize> + '_ {
        self.free.iter().copied()
    }

    /// Bind a frame to a new occupant and reset its pager metadata
    pub fn bind(&mut self, id: usize, occupant: Occupant, tick: u64) {
        let frame = &mut self.frames[id];
        frame.occupant = Some(occupant);
        frame.age = 0;
        frame.last_used = tick;
    }

    /// Detach the occupant and put the frame back at the tail of the pool
    pub fn release(&mut self, id: usize) -> Option<Occupant> {
        let occupant = self.frames[id].occupant.take();
        self.free.push_back(id);
        occupant
    }
}

/// Everything the pagers and the dispatch loop mutate: processes and frames.
pub struct MemoryState {
    pub processes: Vec<AddressSpace>,
    pub frames: FrameTable,
}

impl MemoryState {
    pub fn new(processes: Vec<AddressSpace>, frame_count: usize) -> Self {
        MemoryState {
            processes,
            frames: FrameTable::new(frame_count),
        }
    }

    /// PTE of whoever occupies `frame`, if anyone
    pub fn occupant_pte(&self, frame: usize) -> Option<&Pte> {
        let occ = self.frames.frame(frame).occupant?;
        Some(self.processes[occ.process].pte(occ.page))
    }

    pub fn occupant_pte_mut(&mut self, frame: usize) -> Option<&mut Pte> {
        let occ = self.frames.frame(frame).occupant?;
        Some(self.processes[occ.process].pte_mut(occ.page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // PTE
    // =========================================================================

    #[test]
    fn test_pte_initialization() {
        let pte = Pte::default();
        assert!(pte.flags().is_empty());
        assert_eq!(pte.frame(), 0);
    }

    #[test]
    fn test_pte_is_one_word() {
        assert_eq!(std::mem::size_of::<Pte>(), 4);
    }

    #[test]
    fn test_pte_flags_and_frame_are_independent() {
        let mut pte = Pte::default();
        pte.set(PteFlags::PRESENT, true);
        pte.set(PteFlags::MODIFIED, true);
        pte.set_frame(127);

        assert!(pte.is_present());
        assert!(pte.is_modified());
        assert!(!pte.is_referenced());
        assert_eq!(pte.frame(), 127);

        pte.set(PteFlags::MODIFIED, false);
        assert!(!pte.is_modified());
        assert_eq!(pte.frame(), 127);

        pte.set_frame(5);
        assert!(pte.is_present());
        assert_eq!(pte.frame(), 5);
    }

    // =========================================================================
    // VMA / address space
    // =========================================================================

    #[test]
    fn test_vma_bounds_are_inclusive() {
        let vma = Vma::new(10, 19, false, false);
        assert!(!vma.contains(9));
        assert!(vma.contains(10));
        assert!(vma.contains(19));
        assert!(!vma.contains(20));
        assert_eq!(vma.page_count(), 10);
    }

    #[test]
    fn test_find_vma() {
        let space = AddressSpace::new(
            0,
            vec![Vma::new(0, 7, false, false), Vma::new(20, 25, true, true)],
        );
        assert_eq!(space.find_vma(3), Some(&space.vmas[0]));
        assert_eq!(space.find_vma(22), Some(&space.vmas[1]));
        assert_eq!(space.find_vma(10), None);
        assert_eq!(space.find_vma(63), None);
        assert_eq!(space.mapped_pages(), 14);
        assert_eq!(AddressSpace::new(1, vec![]).mapped_pages(), 0);
    }

    #[test]
    fn test_stats_sum() {
        let a = ProcessStats { maps: 2, zeros: 1, ..Default::default() };
        let b = ProcessStats { maps: 3, segv: 4, ..Default::default() };
        let total: ProcessStats = [a, b].into_iter().sum();
        assert_eq!(total.maps, 5);
        assert_eq!(total.zeros, 1);
        assert_eq!(total.segv, 4);
    }

    // =========================================================================
    // Frame table / free pool
    // =========================================================================

    #[test]
    fn test_frame_table_starts_free() {
        let ft = FrameTable::new(4);
        assert_eq!(ft.len(), 4);
        assert_eq!(ft.free_count(), 4);
        assert_eq!(ft.in_use_count(), 0);
        assert_eq!(ft.free_frames().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_take_from_head_release_to_tail() {
        let mut ft = FrameTable::new(3);
        assert_eq!(ft.take_free(), Some(0));
        assert_eq!(ft.take_free(), Some(1));
        ft.bind(0, Occupant { process: 0, page: 4 }, 7);
        ft.release(0);
        assert_eq!(ft.free_frames().collect::<Vec<_>>(), vec![2, 0]);
        assert_eq!(ft.take_free(), Some(2));
        assert_eq!(ft.take_free(), Some(0));
        assert_eq!(ft.take_free(), None);
    }

    #[test]
    fn test_bind_resets_metadata() {
        let mut ft = FrameTable::new(1);
        ft.frame_mut(0).age = 0xFFFF;
        ft.bind(0, Occupant { process: 1, page: 2 }, 12);
        let frame = ft.frame(0);
        assert!(frame.in_use());
        assert_eq!(frame.age, 0);
        assert_eq!(frame.last_used, 12);
        assert_eq!(frame.occupant, Some(Occupant { process: 1, page: 2 }));
    }

    #[test]
    fn test_release_detaches_occupant() {
        let mut ft = FrameTable::new(2);
        ft.take_free();
        ft.bind(0, Occupant { process: 0, page: 1 }, 0);
        let previous = ft.release(0);
        assert_eq!(previous, Some(Occupant { process: 0, page: 1 }));
        assert!(!ft.frame(0).in_use());
        assert_eq!(ft.free_count() + ft.in_use_count(), ft.len());
    }

    #[test]
    fn test_occupant_pte_lookup() {
        let mut mem = MemoryState::new(vec![AddressSpace::new(0, vec![Vma::new(0, 9, false, false)])], 2);
        assert!(mem.occupant_pte(0).is_none());

        let frame = mem.frames.take_free().unwrap();
        mem.frames.bind(frame, Occupant { process: 0, page: 3 }, 0);
        mem.occupant_pte_mut(frame).unwrap().set(PteFlags::REFERENCED, true);
        assert!(mem.processes[0].pte(3).is_referenced());
        assert!(mem.occupant_pte(frame).unwrap().is_referenced());
    }
}
