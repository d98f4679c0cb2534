//! Inspect command - show segment headers and control blocks.

use anyhow::{Context, Result};
use scaosim_core::config::ScaoConfig;
use scaosim_core::error::ScaoError;
use scaosim_core::segment::Segment;

/// Run the inspect command.
pub fn run(config: &ScaoConfig, channel: Option<&str>) -> Result<()> {
    let segments = config.segment_config();
    tracing::info!(directory = %segments.directory.display(), "Inspecting segments");

    println!("Segments in {}", segments.directory.display());
    println!("============{}", "=".repeat(segments.directory.display().to_string().len()));
    println!();

    for channel in super::channels(channel)? {
        let name = channel.name();
        match Segment::inspect(name, &segments) {
            Ok(status) => {
                let header = &status.header;
                println!("{name}");
                println!("  Writer:      {}", channel.writer_role());
                println!("  Path:        {}", status.path.display());
                println!("  Segment:     {}", header.name);
                println!("  Incarnation: {}", header.segment_id);
                println!("  Created:     {} (unix)", header.created_at);
                println!("  Dtype:       {}", header.dtype);
                println!("  Shape:       {}", header.shape);
                println!("  Payload:     {} bytes", header.payload_len);
                println!("  File:        {} bytes", status.file_len);
                if status.generation.is_unwritten() {
                    println!("  Generation:  unwritten");
                } else {
                    println!("  Generation:  {}", status.generation);
                    println!("  Timestamp:   {}", status.timestamp);
                }
                if status.publishing {
                    println!("  Publishing:  in progress");
                }
            }
            Err(ScaoError::SegmentNotFound { path, .. }) => {
                println!("{name}");
                println!("  Not created ({})", path.display());
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to inspect '{name}'")),
        }
        println!();
    }

    Ok(())
}
