use kernel_alloc::vmm::{Vmm, VmmError, map_frame};
use kernel_alloc::{
    AllocError, FrameAllocator, FrameRun, InitError, MAX_ZONES, MemZone, ZoneCatalog, ZoneType, memory_init_in,
    metadata_words,
};
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size2M, Size4K};
use kernel_vmem::{KernelPageTables, PageEntry, PhysMapper, Pmd, PmdIndex, Pud, kernel_offset};
use std::cell::UnsafeCell;

fn zone(start: u64, length: u64, ty: ZoneType) -> MemZone {
    MemZone { start, length, ty }
}

/// Frame pool with leaked bitmap storage.
fn init(catalog: &ZoneCatalog, first: u64) -> Result<FrameAllocator<'static>, InitError> {
    let first = PhysicalAddress::new(first);
    let words = metadata_words(catalog, first)?;
    memory_init_in(catalog, first, Vec::leak(vec![0; words]))
}

/// Raw multiboot2 entry (24-byte stride).
fn raw(base: u64, len: u64, ty: u32) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&base.to_le_bytes());
    v.extend_from_slice(&len.to_le_bytes());
    v.extend_from_slice(&ty.to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes());
    v
}

#[test]
fn pool_starts_at_first_frame_and_ends_at_zone_end() {
    let catalog = ZoneCatalog::from_zones(&[
        zone(0, 0x10_0000, ZoneType::Reserved),
        zone(0x10_0000, 0x100_0000, ZoneType::Usable),
    ]);

    let alloc = init(&catalog, 0x20_0000).unwrap();

    let start = PhysicalAddress::new(0x20_0000).pfn();
    let end = PhysicalAddress::new(0x110_0000).pfn();
    assert_eq!(alloc.free_runs().collect::<Vec<_>>(), [FrameRun { pfn: start, count: end - start }]);
    assert_eq!(alloc.total_frames(), end - start);
}

#[test]
fn only_usable_zones_from_a_raw_map_contribute() {
    let mut map = raw(0, 0x9_fc00, 1);
    map.extend(raw(0x9_fc00, 0x400, 2));
    map.extend(raw(0xf_0000, 0x1_0000, 2));
    map.extend(raw(0x10_0000, 0x7ee_0000, 1));
    map.extend(raw(0x7fe_0000, 0x2_0000, 3));

    let catalog = ZoneCatalog::from_bytes(&map, 24).unwrap();
    catalog.log_zones();
    assert_eq!(catalog.zones()[0].ty, ZoneType::LowMem);

    let alloc = init(&catalog, 0x40_0000).unwrap();
    let runs: Vec<FrameRun> = alloc.free_runs().collect();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].pfn, 0x400);
    assert_eq!(runs[0].end(), 0x7fe0);
}

#[test]
fn alloc_then_release_restores_the_free_list() {
    let catalog = ZoneCatalog::from_zones(&[
        zone(0x10_0000, 0x40_0000, ZoneType::Usable),
        zone(0x80_0000, 0x80_0000, ZoneType::Usable),
    ]);
    let mut alloc = init(&catalog, 0x10_0000).unwrap();
    let before: Vec<FrameRun> = alloc.free_runs().collect();

    let a = alloc.alloc_frames(3).unwrap();
    let b = alloc.alloc_frames(0x400).unwrap();
    let c = alloc.alloc_large_frames(1).unwrap();
    assert!(c.phys().is_aligned::<Size2M>());
    assert_ne!(alloc.free_runs().collect::<Vec<_>>(), before);

    alloc.release_frames(b);
    alloc.release_frames(c);
    alloc.release_frames(a);
    assert_eq!(alloc.free_runs().collect::<Vec<_>>(), before);
    assert_eq!(alloc.free_frames(), alloc.total_frames());
}

#[test]
fn failed_allocation_does_not_modify_the_pool() {
    let catalog = ZoneCatalog::from_zones(&[zone(0x10_0000, 0x10_0000, ZoneType::Usable)]);
    let mut alloc = init(&catalog, 0x10_0000).unwrap();
    let before: Vec<FrameRun> = alloc.free_runs().collect();

    assert_eq!(
        alloc.alloc_frames(0x101).err(),
        Some(AllocError::OutOfMemory { frames: 0x101 })
    );
    assert!(alloc.alloc_large_frames(1).is_err());
    assert_eq!(alloc.free_runs().collect::<Vec<_>>(), before);
}

#[test]
fn first_fit_prefers_lower_addresses() {
    let catalog = ZoneCatalog::from_zones(&[
        zone(0x100_0000, 0x10_0000, ZoneType::Usable),
        zone(0x10_0000, 0x1_0000, ZoneType::Usable),
    ]);
    let mut alloc = init(&catalog, 0x10_0000).unwrap();

    let small = alloc.alloc_frames(4).unwrap();
    assert_eq!(small.phys().as_u64(), 0x10_0000);
    let big = alloc.alloc_frames(0x20).unwrap();
    assert_eq!(big.phys().as_u64(), 0x100_0000);
    alloc.release_frames(small);
    alloc.release_frames(big);
}

#[test]
fn init_errors() {
    let empty = ZoneCatalog::from_zones(&[zone(0x10_0000, 0x10_0000, ZoneType::Reserved)]);
    assert_eq!(init(&empty, 0x20_0000).err(), Some(InitError::NoUsableFrames));

    let low = ZoneCatalog::from_zones(&[zone(0, 0x9_f000, ZoneType::Usable)]);
    assert_eq!(
        init(&low, 0x1000).err(),
        Some(InitError::KernelBelowLowMemory(PhysicalAddress::new(0x1000)))
    );

    // Non-touching slivers, more than the catalog keeps.
    let many: Vec<MemZone> = (0..MAX_ZONES as u64 + 1)
        .map(|i| zone(0x100_0000 + i * 0x2000, 0x1000, ZoneType::Usable))
        .collect();
    let catalog = ZoneCatalog::from_zones(&many);
    assert_eq!(catalog.len(), MAX_ZONES);
    let alloc = init(&catalog, 0x10_0000).unwrap();
    assert_eq!(alloc.free_runs().count(), MAX_ZONES);
}

#[repr(align(4096))]
struct Frame(#[allow(dead_code)] [u8; 4096]);

/// Page-table frames for the tests; physical address `n * 4096` is `frames[n]`.
struct TestRam {
    frames: Vec<UnsafeCell<Frame>>,
}

impl TestRam {
    fn new(n: usize) -> Self {
        Self {
            frames: (0..n).map(|_| UnsafeCell::new(Frame([0; 4096]))).collect(),
        }
    }
}

impl PhysMapper for TestRam {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let idx = usize::try_from(pa.pfn()).unwrap();
        unsafe { &mut *self.frames[idx].get().cast::<T>() }
    }
}

fn page(n: u64) -> PhysicalPage<Size4K> {
    PhysicalPage::from_addr(PhysicalAddress::from_pfn(n))
}

/// PGD in frame 0 -> PUD in frame 1 -> kernel PMD in frame 2.
fn link_kernel_tables(ram: &TestRam) {
    let k = kernel_offset();
    let mut tables = KernelPageTables::from_root(ram, page(0));
    tables
        .pgd()
        .set(kernel_vmem::Pgd::index_of(k), PageEntry::table(page(1), PageEntry::kernel_table()));
    let pud = tables.pud().unwrap();
    pud.set(Pud::index_of(k), PageEntry::table(page(2), PageEntry::kernel_table()));
}

#[test]
fn map_frame_writes_phys_or_flags() {
    let catalog = ZoneCatalog::from_zones(&[zone(0x10_0000, 0x100_0000, ZoneType::Usable)]);
    let mut alloc = init(&catalog, 0x10_0000).unwrap();
    let frames = alloc.alloc_large_frames(1).unwrap();

    let mut pmd = Pmd::zeroed();
    let flags = PageEntry::kernel_large_rw();
    map_frame(&mut pmd, PmdIndex::new(7).unwrap(), &frames, flags);

    let e = pmd.get(PmdIndex::new(7).unwrap());
    assert_eq!(e.into_bits(), frames.phys().as_u64() | flags.into_bits());
    alloc.release_frames(frames);
}

#[test]
fn vmm_backs_kernel_pmd_slots() {
    let ram = TestRam::new(4);
    link_kernel_tables(&ram);

    let catalog = ZoneCatalog::from_zones(&[zone(0x10_0000, 0x100_0000, ZoneType::Usable)]);
    let mut alloc = init(&catalog, 0x10_0000).unwrap();
    let total = alloc.total_frames();

    let frames = {
        let mut vmm = Vmm::new(KernelPageTables::from_root(&ram, page(0)), &mut alloc);
        let frames = vmm
            .map_new_frames(PmdIndex::new(2).unwrap(), 3, PageEntry::kernel_large_rw())
            .unwrap();

        let pmd = vmm.tables().pmd().unwrap();
        for i in 0..3 {
            let e = pmd.get(PmdIndex::new(2 + i).unwrap());
            let want = PhysicalPage::<Size2M>::from_addr(frames.phys() + i as u64 * Size2M::SIZE);
            assert_eq!(e.large_page_base(), Some(want));
        }
        assert!(!pmd.get(PmdIndex::new(5).unwrap()).present());
        frames
    };

    assert_eq!(alloc.free_frames(), total - 3 * 512);
    alloc.release_frames(frames);
    assert_eq!(alloc.free_frames(), total);
}

#[test]
fn vmm_returns_frames_when_pmd_is_missing() {
    let ram = TestRam::new(1);
    let catalog = ZoneCatalog::from_zones(&[zone(0x10_0000, 0x100_0000, ZoneType::Usable)]);
    let mut alloc = init(&catalog, 0x10_0000).unwrap();
    let total = alloc.total_frames();

    let mut vmm = Vmm::new(KernelPageTables::from_root(&ram, page(0)), &mut alloc);
    let err = vmm
        .map_new_frames(PmdIndex::new(0).unwrap(), 1, PageEntry::kernel_large_rw())
        .unwrap_err();
    assert!(matches!(err, VmmError::Walk(_)));

    let err = vmm
        .map_new_frames(PmdIndex::new(511).unwrap(), 2, PageEntry::kernel_large_rw())
        .unwrap_err();
    assert_eq!(err, VmmError::OutOfRange { start: 511, pages: 2 });

    drop(vmm);
    assert_eq!(alloc.free_frames(), total);
}
