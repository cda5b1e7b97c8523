use shadowpg_arch_amd64::{Amd64, PageTableEntry, PageTableFlags, PageTableLevel, VaIndexes};
use shadowpg_bridge_sim::SimulatedPlatform;
use shadowpg_core::{Pa, ShadowError, Va};

use super::{descend, descend_to_leaf, translate, translation};
use crate::arena::{ROOT_TABLE, TableArena};

///////////////////////////////////////////////////////////////////////////////
// Test Helpers
///////////////////////////////////////////////////////////////////////////////

const BASE: Pa = Pa(0x2000_0000);
const DATA_PA: Pa = Pa(0x3000_0000);

/// VA = 0x7ff6_1234_5000: PML4[0xff] -> PDPT[0x1d8] -> PD[0x91] -> PT[0x145]
const TEST_VA: Va = Va(0x0000_7ff6_1234_5000);

fn make_arena(platform: &mut SimulatedPlatform, tables: usize) -> Result<TableArena, ShadowError> {
    TableArena::create(platform, BASE, tables)
}

///////////////////////////////////////////////////////////////////////////////
// Descend
///////////////////////////////////////////////////////////////////////////////

#[test]
fn descend_creates_missing_level() -> Result<(), ShadowError> {
    let mut platform = SimulatedPlatform::new();
    let mut arena = make_arena(&mut platform, 4)?;

    let child = descend(&mut arena, ROOT_TABLE, 0xff)?;
    let entry = arena.table(ROOT_TABLE)?.entries[0xff];

    assert_eq!(child, 1);
    assert_eq!(entry.pa(), arena.table_pa(child));
    assert_eq!(entry.flags(), PageTableFlags::SHADOW);
    assert_eq!(arena.table(ROOT_TABLE)?.present_entries(), 1);
    assert_eq!(arena.table(child)?.present_entries(), 0);

    Ok(())
}

#[test]
fn descend_reuses_existing_level() -> Result<(), ShadowError> {
    let mut platform = SimulatedPlatform::new();
    let mut arena = make_arena(&mut platform, 4)?;

    let first = descend(&mut arena, ROOT_TABLE, 3)?;
    let second = descend(&mut arena, ROOT_TABLE, 3)?;

    assert_eq!(first, second);
    assert_eq!(arena.tables_in_use(), 2);

    Ok(())
}

#[test]
fn descend_propagates_exhaustion() -> Result<(), ShadowError> {
    let mut platform = SimulatedPlatform::new();
    let mut arena = make_arena(&mut platform, 2)?;

    descend(&mut arena, ROOT_TABLE, 0)?;

    assert!(matches!(
        descend(&mut arena, ROOT_TABLE, 1),
        Err(ShadowError::AllocationExhausted)
    ));
    assert!(arena.table(ROOT_TABLE)?.entries[1].is_empty());

    Ok(())
}

#[test]
fn descend_rejects_foreign_entry() -> Result<(), ShadowError> {
    let mut platform = SimulatedPlatform::new();
    let mut arena = make_arena(&mut platform, 4)?;

    arena.table_mut(ROOT_TABLE)?.entries[9] =
        PageTableEntry::new(DATA_PA, PageTableFlags::SHADOW);

    assert!(matches!(
        descend(&mut arena, ROOT_TABLE, 9),
        Err(ShadowError::CorruptHierarchy(pa)) if pa == DATA_PA
    ));

    Ok(())
}

#[test]
fn descend_rejects_entry_index_out_of_range() -> Result<(), ShadowError> {
    let mut platform = SimulatedPlatform::new();
    let mut arena = make_arena(&mut platform, 4)?;

    assert!(matches!(
        descend(&mut arena, ROOT_TABLE, Amd64::ENTRIES_PER_TABLE),
        Err(ShadowError::Other(_))
    ));
    assert_eq!(arena.tables_in_use(), 1);

    Ok(())
}

#[test]
fn descend_to_leaf_shares_levels() -> Result<(), ShadowError> {
    let mut platform = SimulatedPlatform::new();
    let mut arena = make_arena(&mut platform, 7)?;

    let first = descend_to_leaf(&mut arena, &VaIndexes::new(TEST_VA)?)?;
    let neighbour = descend_to_leaf(&mut arena, &VaIndexes::new(TEST_VA + 0x1000)?)?;

    assert_eq!(first, neighbour);
    assert_eq!(arena.tables_in_use(), 4);

    let far = descend_to_leaf(&mut arena, &VaIndexes::new(Va(0xffff_8000_0000_0000))?)?;

    assert_ne!(first, far);
    assert_eq!(arena.tables_in_use(), 7);

    Ok(())
}

///////////////////////////////////////////////////////////////////////////////
// Translation
///////////////////////////////////////////////////////////////////////////////

#[test]
fn translation_reaches_leaf() -> Result<(), ShadowError> {
    let mut platform = SimulatedPlatform::new();
    let mut arena = make_arena(&mut platform, 4)?;

    let indexes = VaIndexes::new(TEST_VA)?;
    let pt = descend_to_leaf(&mut arena, &indexes)?;
    arena.table_mut(pt)?.entries[indexes.index(PageTableLevel::Pt)] =
        PageTableEntry::new(DATA_PA, PageTableFlags::SHADOW);

    let result = translation(&arena, TEST_VA + 0x42);

    assert_eq!(result.pa(), Some(DATA_PA + 0x42));
    assert!(result.present());
    assert!(result.write());
    assert!(result.user());

    let levels = result
        .entries()
        .iter()
        .map(|entry| entry.level)
        .collect::<Vec<_>>();
    assert_eq!(levels, PageTableLevel::WALK_ORDER);

    let pml4e = result.entries()[0];
    assert_eq!(
        pml4e.entry_address,
        BASE + Amd64::va_index_for(TEST_VA, PageTableLevel::Pml4) * 8
    );

    Ok(())
}

#[test]
fn translation_stops_at_missing_entry() -> Result<(), ShadowError> {
    let mut platform = SimulatedPlatform::new();
    let mut arena = make_arena(&mut platform, 4)?;

    descend_to_leaf(&mut arena, &VaIndexes::new(TEST_VA)?)?;

    let result = translation(&arena, TEST_VA);
    assert_eq!(result.pa(), None);
    assert_eq!(result.entries().len(), 4);
    assert!(!result.present());

    let result = translation(&arena, Va(0x1000));
    assert_eq!(result.pa(), None);
    assert_eq!(result.entries().len(), 1);

    assert_eq!(translate(&arena, Va(0x0000_8000_0000_0000)), None);

    Ok(())
}
