//! CLI command implementations.

pub mod config;
pub mod inspect;
pub mod release;
pub mod roles;
pub mod version;

use anyhow::{Result, bail};
use scaosim_core::exchange::Channel;

/// Resolve a channel argument, or every channel when absent.
pub fn channels(name: Option<&str>) -> Result<Vec<Channel>> {
    match name {
        None => Ok(Channel::ALL.to_vec()),
        Some(name) => match Channel::from_name(name) {
            Some(channel) => Ok(vec![channel]),
            None => {
                let known: Vec<&str> = Channel::ALL.iter().map(|c| c.name()).collect();
                bail!("Unknown channel '{}' (expected one of: {})", name, known.join(", "))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_selection() {
        assert_eq!(channels(None).unwrap().len(), 4);
        assert_eq!(channels(Some("slopes")).unwrap(), vec![Channel::Slopes]);
        let err = channels(Some("pixels")).unwrap_err().to_string();
        assert!(err.contains("valid_subaps"), "{err}");
    }
}
