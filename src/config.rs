//! Sorter configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default split chunk size (2 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024 * 1024;
/// Default number of sorted chunks merged together in one merge operation.
pub const DEFAULT_MERGE_FAN_IN: usize = 10;
/// Default read/write buffer size of the sort and merge stages.
pub const DEFAULT_BUF_SIZE: usize = 64 * 1024;

/// External line sorter configuration.
///
/// Every field has a default, so partially specified configurations can be deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    /// Input will be split into chunks of this size (in bytes), extended up to the next line boundary.
    pub chunk_size: usize,
    /// Byte terminating every line.
    pub line_separator: u8,
    /// Maximum number of sorted chunks merged in a single merge operation.
    pub merge_fan_in: usize,
    /// Read buffer size used when loading a chunk for sorting.
    pub sort_input_buf_size: usize,
    /// Write buffer size used when saving a sorted chunk.
    pub sort_output_buf_size: usize,
    /// Read buffer size of every chunk reader opened by a merge.
    pub merge_input_buf_size: usize,
    /// Write buffer size of a merge output.
    pub merge_output_buf_size: usize,
    /// Directory the workspace is created in. [`None`] means the directory of the running executable.
    pub tmp_dir: Option<PathBuf>,
    /// Workspace directory name prefix.
    pub tmp_dir_name: String,
    /// Extension of split, not yet sorted, chunk files.
    pub unsorted_extension: String,
    /// Extension of sorted chunk files.
    pub sorted_extension: String,
    /// Number of worker threads. [`None`] means one per CPU core.
    pub threads_number: Option<usize>,
}

impl SortConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk size must be positive".to_string());
        }
        if self.merge_fan_in < 2 {
            return Err(format!("merge fan-in must be at least 2, got {}", self.merge_fan_in));
        }
        let buf_sizes = [
            self.sort_input_buf_size,
            self.sort_output_buf_size,
            self.merge_input_buf_size,
            self.merge_output_buf_size,
        ];
        if buf_sizes.iter().any(|&size| size == 0) {
            return Err("buffer sizes must be positive".to_string());
        }
        if self.threads_number == Some(0) {
            return Err("threads number must be positive".to_string());
        }
        if self.unsorted_extension.is_empty() || self.sorted_extension.is_empty() {
            return Err("chunk file extensions must not be empty".to_string());
        }
        if self.unsorted_extension == self.sorted_extension {
            return Err("sorted and unsorted extensions must differ".to_string());
        }
        if self.tmp_dir_name.is_empty() {
            return Err("temporary directory name must not be empty".to_string());
        }

        return Ok(());
    }
}

impl Default for SortConfig {
    fn default() -> Self {
        SortConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            line_separator: b'\n',
            merge_fan_in: DEFAULT_MERGE_FAN_IN,
            sort_input_buf_size: DEFAULT_BUF_SIZE,
            sort_output_buf_size: DEFAULT_BUF_SIZE,
            merge_input_buf_size: DEFAULT_BUF_SIZE,
            merge_output_buf_size: DEFAULT_BUF_SIZE,
            tmp_dir: None,
            tmp_dir_name: "temp".to_string(),
            unsorted_extension: ".unsorted".to_string(),
            sorted_extension: ".sorted".to_string(),
            threads_number: None,
        }
    }
}
