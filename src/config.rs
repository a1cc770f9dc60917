/// Upper bound on the native stack one level of evaluation uses in a debug build.
const STACK_PER_LEVEL: usize = 8 * 1024;

/// Stack left over for the caller, the reader and the printer.
const STACK_RESERVE: usize = 256 * 1024;

/// Tunables for one interpreter instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cells per heap segment.
    pub segment_cells: usize,
    /// Upper bound on linked segments; `None` grows until the allocator refuses.
    pub max_segments: Option<usize>,
    /// Nesting limit for `eval` and the reader, reported as "Stack overflow"
    /// and "Bad input". The default fits the 2 MB stack of a spawned thread;
    /// a larger limit needs a thread of [`Config::stack_size`] bytes.
    pub max_depth: usize,
    /// Seed for `rand`; drawn from entropy when absent.
    pub seed: Option<u64>,
}

impl Config {
    /// Native stack a thread needs to reach `max_depth` without overflowing.
    pub fn stack_size(&self) -> usize {
        self.max_depth.saturating_mul(STACK_PER_LEVEL).saturating_add(STACK_RESERVE)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            segment_cells: 8192,
            max_segments: None,
            max_depth: 200,
            seed: None,
        }
    }
}
