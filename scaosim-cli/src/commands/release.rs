//! Release command - remove segment backing files.

use anyhow::{Context, Result};
use scaosim_core::config::ScaoConfig;
use scaosim_core::error::ScaoError;
use scaosim_core::segment::Segment;

/// Run the release command.
///
/// With `all`, channels that were never created are skipped; naming a
/// missing channel explicitly is an error.
pub fn run(config: &ScaoConfig, channel: Option<&str>, all: bool) -> Result<()> {
    let segments = config.segment_config();
    let selected = if all { None } else { channel };

    let mut released = 0;
    for channel in super::channels(selected)? {
        let name = channel.name();
        match Segment::release(name, &segments) {
            Ok(()) => {
                println!("Released {name}");
                released += 1;
            }
            Err(ScaoError::SegmentNotFound { .. }) if all => {}
            Err(e) => return Err(e).with_context(|| format!("Failed to release '{name}'")),
        }
    }

    if released == 0 {
        println!("Nothing to release in {}", segments.directory.display());
    }
    Ok(())
}
