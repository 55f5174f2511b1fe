//! Log subscriber setup for the binary. The library only emits events.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,lead_courier=info",
        1 => "warn,lead_courier=debug",
        _ => "info,lead_courier=trace",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `-v` flags.
pub fn init_logging(verbosity: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(default_directive(0), "warn,lead_courier=info");
        assert!(default_directive(1).contains("lead_courier=debug"));
        assert!(default_directive(5).contains("lead_courier=trace"));
        for level in 0..3 {
            assert!(default_directive(level).parse::<EnvFilter>().is_ok());
        }
    }
}
