use shadowpg::{
    PagingConfig, Va, arch::amd64::Amd64, bridge::sim::SimulatedPlatform, cache::ShadowPager,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    let mut platform = SimulatedPlatform::new();

    // Three resident pages. Everything else faults.
    let config = PagingConfig::new(3);
    let mut pager = ShadowPager::initialize(&mut platform, config)?;
    tracing::info!(root = %pager.root(), "guest CR3");

    // Simulate a guest touching five pages in a row; the first two are
    // evicted on the way.
    let faults = [
        Va(0x0000_5555_5555_4000),
        Va(0x0000_5555_5555_5010),
        Va(0x0000_7ffd_dead_b000),
        Va(0xffff_f800_0000_0000),
        Va(0x0000_5555_5555_6000),
    ];

    for va in faults {
        pager.add_paged_virtual_address(va)?;

        let translation = pager.translation(va);
        tracing::info!(
            %va,
            pa = ?translation.pa(),
            levels = translation.entries().len(),
            "fault handled"
        );
    }

    pager.dump();

    for va in faults {
        let page = Amd64::va_align_down(va);

        // SAFETY: The pager, and therefore its page tables, is still alive.
        let guest = unsafe { pager.bridge().translate(pager.root(), va) };
        println!("{page}: resident={} guest={guest:?}", pager.is_resident(va));
    }

    pager.shutdown();
    Ok(())
}
