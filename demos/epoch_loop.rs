//! Epoch Loop Demo
//!
//! Walks a small tenant population through several allocation epochs and
//! shows how credits reward under-consumption and buy priority later.
//!
//! # Run
//!
//! ```bash
//! cargo run --example epoch_loop
//! ```

use karma_alloc::{KarmaAllocator, KarmaConfig, PUBLIC_ID};

fn main() {
    println!("=== Karma Epoch Loop Demo ===\n");

    let config = KarmaConfig::with_blocks(60).alpha(0.2).init_credits(10);
    println!("Pool configuration:");
    println!("  Total blocks:   {}", config.num_blocks);
    println!("  Public share:   {}", config.alpha);
    println!("  Initial credit: {}", config.init_credits);
    println!();

    let mut karma = KarmaAllocator::new(config).expect("valid config");

    let tenants = [1u32, 2, 3];
    for &id in &tenants {
        karma.add_tenant(id).expect("fresh id");
    }
    println!(
        "Added {} tenants; fair share is {} blocks each ({} public).\n",
        karma.num_tenants(),
        karma.fair_share(),
        karma.public_blocks()
    );

    // Tenant 1 runs a steady light load, tenant 2 bursts every third epoch,
    // tenant 3 always asks for everything.
    let epochs = 6u32;
    for epoch in 0..epochs {
        let burst = epoch % 3 == 2;
        karma.set_demand(1, 4, false).expect("known id");
        karma
            .set_demand(2, if burst { 40 } else { 6 }, false)
            .expect("known id");
        karma.set_demand(3, 60, false).expect("known id");

        karma.allocate();

        println!("Epoch {epoch}{}:", if burst { " (tenant 2 bursts)" } else { "" });
        for &id in &tenants {
            println!(
                "  tenant {id}: allocated {:>2}  credits {:>3}",
                karma.get_allocation(id).expect("known id"),
                karma.get_credits(id).expect("known id"),
            );
        }

        let stats = karma.stats();
        println!(
            "  pool: {}/{} blocks granted ({:.0}% utilization)\n",
            stats.total_allocated,
            stats.num_blocks,
            stats.utilization() * 100.0
        );
    }

    println!(
        "Public pool credits after the run: {}",
        karma.get_credits(PUBLIC_ID).expect("public entry")
    );
    println!("Done.");
}
