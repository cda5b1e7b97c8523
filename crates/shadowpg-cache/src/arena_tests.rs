use shadowpg_arch_amd64::{Amd64, PageTableEntry, PageTableFlags};
use shadowpg_bridge_sim::SimulatedPlatform;
use shadowpg_core::{Pa, ShadowError};

use super::{ROOT_TABLE, TableArena, is_addressable, tables_for_capacity};

const BASE: Pa = Pa(0x1000_0000);

#[test]
fn capacity_formula() {
    assert_eq!(tables_for_capacity(0), Some(1));
    assert_eq!(tables_for_capacity(1), Some(4));
    assert_eq!(tables_for_capacity(64), Some(193));
    assert_eq!(tables_for_capacity(usize::MAX), None);
}

#[test]
fn create_binds_whole_block() -> Result<(), ShadowError> {
    let mut platform = SimulatedPlatform::new();
    let arena = TableArena::create(&mut platform, BASE, 7)?;

    let bindings = platform.bindings().copied().collect::<Vec<_>>();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].pa, BASE);
    assert_eq!(bindings[0].size, 7 * Amd64::PAGE_SIZE);
    assert_eq!(Some(bindings[0].host), arena.host_address(ROOT_TABLE));

    assert!(arena.is_allocated());
    assert_eq!(arena.base(), BASE);
    assert_eq!(arena.end(), BASE + 7 * Amd64::PAGE_SIZE);
    assert_eq!(arena.total_capacity(), 7);
    assert_eq!(arena.tables_in_use(), 1);
    assert_eq!(arena.table(ROOT_TABLE)?.present_entries(), 0);

    Ok(())
}

#[test]
fn create_releases_reservation_on_bind_failure() {
    let mut platform = SimulatedPlatform::new();
    platform.fail_next_map();

    let result = TableArena::create(&mut platform, BASE, 7);

    assert!(matches!(
        result,
        Err(ShadowError::HostMappingFailure { pa, .. }) if pa == BASE
    ));
    assert_eq!(platform.bindings().count(), 0);
}

#[test]
fn create_rejects_unaligned_base() {
    let mut platform = SimulatedPlatform::new();

    let result = TableArena::create(&mut platform, BASE + 0x10, 7);

    assert!(matches!(result, Err(ShadowError::Other(_))));
    assert_eq!(platform.map_count(), 0);
}

#[test]
fn addressable_range() {
    // 2^52 is the first physical address a page table entry cannot hold.
    let top = Pa(1 << 52);

    assert!(is_addressable(top - 4 * Amd64::PAGE_SIZE, 4));
    assert!(!is_addressable(top - 3 * Amd64::PAGE_SIZE, 4));
    assert!(!is_addressable(top, 1));
    assert!(!is_addressable(Pa(0xffff_ffff_ffff_f000), 2));
    assert!(!is_addressable(BASE, usize::MAX));
}

#[test]
fn create_rejects_unaddressable_range() {
    let mut platform = SimulatedPlatform::new();

    let result = TableArena::create(&mut platform, Pa(1 << 52), 4);
    assert!(matches!(result, Err(ShadowError::Other(_))));

    let result = TableArena::create(&mut platform, Pa(0xffff_ffff_ffff_f000), 4);
    assert!(matches!(result, Err(ShadowError::Other(_))));

    assert_eq!(platform.map_count(), 0);
}

#[test]
fn allocate_until_exhausted() -> Result<(), ShadowError> {
    let mut platform = SimulatedPlatform::new();
    let mut arena = TableArena::create(&mut platform, BASE, 4)?;

    assert_eq!(arena.allocate()?, 1);
    assert_eq!(arena.allocate()?, 2);
    assert_eq!(arena.allocate()?, 3);
    assert!(matches!(
        arena.allocate(),
        Err(ShadowError::AllocationExhausted)
    ));
    assert_eq!(arena.tables_in_use(), 4);

    arena.reset()?;
    assert_eq!(arena.tables_in_use(), 1);
    assert_eq!(arena.allocate()?, 1);

    Ok(())
}

#[test]
fn reset_and_allocate_zero_tables() -> Result<(), ShadowError> {
    let mut platform = SimulatedPlatform::new();
    let mut arena = TableArena::create(&mut platform, BASE, 4)?;

    let stale = PageTableEntry::new(Pa(0xdead_0000), PageTableFlags::SHADOW);
    let table = arena.allocate()?;
    arena.table_mut(ROOT_TABLE)?.entries[5] = stale;
    arena.table_mut(table)?.entries[7] = stale;

    arena.reset()?;
    assert_eq!(arena.table(ROOT_TABLE)?.present_entries(), 0);

    let table = arena.allocate()?;
    assert_eq!(arena.table(table)?.present_entries(), 0);

    Ok(())
}

#[test]
fn offset_translation() -> Result<(), ShadowError> {
    let mut platform = SimulatedPlatform::new();
    let mut arena = TableArena::create(&mut platform, BASE, 4)?;

    let table = arena.allocate()?;
    let pa = arena.table_pa(table);

    assert_eq!(pa, BASE + Amd64::PAGE_SIZE);
    assert_eq!(arena.table_index(pa), Some(table));
    assert_eq!(arena.table_index(BASE), Some(ROOT_TABLE));

    // Not the base of a table.
    assert_eq!(arena.table_index(pa + 8), None);
    // Below the arena.
    assert_eq!(arena.table_index(BASE - Amd64::PAGE_SIZE), None);
    // Inside the arena, but not handed out since the last reset.
    assert_eq!(arena.table_index(arena.table_pa(2)), None);

    let root = arena.host_address(ROOT_TABLE).expect("arena is allocated");
    assert_eq!(arena.host_address(table), Some(root + Amd64::PAGE_SIZE));
    assert_eq!(arena.host_address(4), None);

    Ok(())
}

#[test]
fn destroy_is_idempotent() -> Result<(), ShadowError> {
    let mut platform = SimulatedPlatform::new();
    let mut arena = TableArena::create(&mut platform, BASE, 4)?;

    arena.destroy(&mut platform);

    assert!(!arena.is_allocated());
    assert_eq!(platform.bindings().count(), 0);
    assert_eq!(platform.unmap_count(), 1);
    assert!(matches!(
        arena.table(ROOT_TABLE),
        Err(ShadowError::NotInitialized)
    ));
    assert!(matches!(arena.reset(), Err(ShadowError::NotInitialized)));

    arena.destroy(&mut platform);
    assert_eq!(platform.unmap_count(), 1);

    Ok(())
}
