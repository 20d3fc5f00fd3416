//! Process-scope configuration (§6).
//!
//! Mirrors the shape of the teacher codebase's `BufferPoolBuilder`: a plain
//! config struct plus a validating builder, rather than a loose bag of
//! function arguments.

use crate::error::{Result, StorageError};

/// Smallest page size we allow. Anything smaller can't hold a leaf header,
/// fences, and a single slot.
const MIN_PAGE_SIZE: usize = 512;

/// Largest page size we allow (§6: "must be pow2 and ≤ 64 KiB").
const MAX_PAGE_SIZE: usize = 64 * 1024;

/// Engine configuration, validated once at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Page size in bytes. Must be a power of two, `512..=65536`.
    pub page_size: usize,

    /// RAM budget in bytes; `num_frames = ram_budget_bytes / page_size`.
    pub ram_budget_bytes: usize,

    /// Directory holding the backing file and the two registry files.
    pub ssd_path: String,

    /// Number of background page-provider threads.
    pub pp_threads: usize,

    /// Enable the contention-split probe on cursor accesses.
    pub contention_split_enable: bool,

    /// `1 in 2^n` cursor accesses probe for contention (power-of-two rate).
    pub contention_split_sample_rate: u32,

    /// Restart-rate percentage (0-100) over which a contention split fires.
    pub contention_split_threshold_pct: u8,

    /// While `true`, merges and contention-split probing are suppressed —
    /// intended for bulk loads where underfull nodes are expected
    /// transiently and splits alone should drive structure.
    pub bulk_insert_mode: bool,
}

impl Config {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.page_size < MIN_PAGE_SIZE
            || self.page_size > MAX_PAGE_SIZE
            || !self.page_size.is_power_of_two()
        {
            return Err(StorageError::InvalidConfig(format!(
                "page_size must be a power of two in [{MIN_PAGE_SIZE}, {MAX_PAGE_SIZE}], got {}",
                self.page_size
            )));
        }
        if self.ram_budget_bytes < self.page_size {
            return Err(StorageError::InvalidConfig(
                "ram_budget_bytes must hold at least one frame".into(),
            ));
        }
        if self.pp_threads == 0 {
            return Err(StorageError::InvalidConfig(
                "pp_threads must be at least 1".into(),
            ));
        }
        if !self.contention_split_sample_rate.is_power_of_two() {
            return Err(StorageError::InvalidConfig(
                "contention_split_sample_rate must be a power of two".into(),
            ));
        }
        if self.contention_split_threshold_pct > 100 {
            return Err(StorageError::InvalidConfig(
                "contention_split_threshold_pct must be 0..=100".into(),
            ));
        }
        Ok(())
    }

    /// Number of frames the buffer pool should allocate.
    pub fn num_frames(&self) -> usize {
        (self.ram_budget_bytes / self.page_size).max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: 4096,
            ram_budget_bytes: 4096 * 1000,
            ssd_path: "./data".to_string(),
            pp_threads: 1,
            contention_split_enable: true,
            contention_split_sample_rate: 64,
            contention_split_threshold_pct: 50,
            bulk_insert_mode: false,
        }
    }
}

/// Validating builder over [`Config`], in the shape of the teacher
/// codebase's `BufferPoolBuilder`.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size;
        self
    }

    pub fn ram_budget_bytes(mut self, bytes: usize) -> Self {
        self.config.ram_budget_bytes = bytes;
        self
    }

    pub fn ssd_path(mut self, path: impl Into<String>) -> Self {
        self.config.ssd_path = path.into();
        self
    }

    pub fn pp_threads(mut self, threads: usize) -> Self {
        self.config.pp_threads = threads;
        self
    }

    pub fn contention_split_enable(mut self, enable: bool) -> Self {
        self.config.contention_split_enable = enable;
        self
    }

    pub fn contention_split_sample_rate(mut self, rate: u32) -> Self {
        self.config.contention_split_sample_rate = rate;
        self
    }

    pub fn contention_split_threshold_pct(mut self, pct: u8) -> Self {
        self.config.contention_split_threshold_pct = pct;
        self
    }

    pub fn bulk_insert_mode(mut self, enable: bool) -> Self {
        self.config.bulk_insert_mode = enable;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_non_power_of_two_page_size() {
        let err = ConfigBuilder::new().page_size(3000).build();
        assert!(err.is_err());
    }

    #[test]
    fn rejects_oversized_page() {
        let err = ConfigBuilder::new().page_size(128 * 1024).build();
        assert!(err.is_err());
    }

    #[test]
    fn num_frames_divides_budget() {
        let cfg = ConfigBuilder::new()
            .page_size(4096)
            .ram_budget_bytes(40960)
            .build()
            .unwrap();
        assert_eq!(cfg.num_frames(), 10);
    }
}
