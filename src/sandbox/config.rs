//! Sandbox configuration
//!
//! Box id allocation for the isolate backend. Each worker owns a range of
//! 1000 box ids so several workers can share one host.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use tracing::warn;

/// Sandbox configuration
#[derive(Debug, Clone, Default)]
pub struct SandboxConfig {
    /// Worker ID for box ID allocation (0-9)
    pub worker_id: u32,
}

/// Global sandbox configuration
static SANDBOX_CONFIG: OnceLock<SandboxConfig> = OnceLock::new();

/// Global counter for box ID allocation within the worker's range
static BOX_ID_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Initialize sandbox configuration with the worker's id
pub fn init_config(worker_id: u32) -> anyhow::Result<()> {
    SANDBOX_CONFIG
        .set(SandboxConfig { worker_id })
        .map_err(|_| anyhow::anyhow!("Sandbox configuration already initialized"))?;

    Ok(())
}

/// Get sandbox configuration
pub fn get_config() -> &'static SandboxConfig {
    SANDBOX_CONFIG.get().unwrap_or_else(|| {
        static DEFAULT: OnceLock<SandboxConfig> = OnceLock::new();

        warn!("Sandbox configuration not initialized, using default");
        DEFAULT.get_or_init(SandboxConfig::default)
    })
}

/// Map a counter value into the worker's box id range.
/// Isolate only supports box IDs 0-9999.
pub fn calculate_box_id(worker_id: u32, counter: u32) -> u32 {
    (worker_id % 10) * 1000 + counter % 1000
}

/// Next box id for this worker; concurrent runs never share a box
pub fn next_box_id() -> u32 {
    let counter = BOX_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    calculate_box_id(get_config().worker_id, counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_id_ranges() {
        assert_eq!(calculate_box_id(0, 0), 0);
        assert_eq!(calculate_box_id(3, 7), 3007);
        assert_eq!(calculate_box_id(3, 1007), 3007);
        assert_eq!(calculate_box_id(12, 5), 2005);
    }

    #[test]
    fn test_next_box_id_advances() {
        let first = next_box_id();
        let second = next_box_id();
        assert_ne!(first, second);
        assert!(first < 10_000 && second < 10_000);
    }
}
