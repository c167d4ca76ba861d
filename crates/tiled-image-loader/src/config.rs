use std::path::PathBuf;

/// Settings of a [`CoalescingImageSource`](crate::CoalescingImageSource)
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    /// Number of decoded tiles kept in memory
    pub memory_cache_capacity: usize,
    /// Upper bound on fetches running at the same time
    pub max_concurrent_fetches: usize,
    /// Directory of the persisted byte cache, disabled when `None`
    pub cache_dir: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            memory_cache_capacity: 256,
            max_concurrent_fetches: 8,
            cache_dir: None,
        }
    }
}
