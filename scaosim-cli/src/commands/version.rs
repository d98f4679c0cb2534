//! Version command - show version information.

use anyhow::Result;
use scaosim_core::segment::SEGMENT_VERSION;

/// Version information.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the version command.
pub fn run() -> Result<()> {
    println!("scaosim - simulated adaptive-optics loop over shared memory");
    println!();
    println!("Version:        {}", VERSION);
    println!("Segment format: {}", SEGMENT_VERSION);
    println!(
        "Platform:       {} / {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    println!();
    println!("Components:");
    println!("  scaosim-core     Segments, exchange, reconstruction, aggregation");
    println!("  scaosim-runtime  Role loops, synthetic optics, logging");
    println!("  scaosim-cli      Command-line launcher");

    Ok(())
}
