//! `line-sort` sorts newline-delimited text files that do not fit into memory.
//!
//! The input is split into bounded, line-aligned chunk files, every chunk is sorted in memory, and the sorted
//! chunks are k-way merged in rounds until a single sorted output remains. For more information see
//! [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Line aware splitting:**
//!   chunks are cut by size and extended to the next line separator, so a line never spans two chunks.
//! * **Pluggable ordering:**
//!   lines shaped as `<id>.<text>` are ordered by text first, then numerically by id
//!   ([`IdTextOrdering`]); any [`LineOrdering`] implementation or comparison closure can replace it.
//! * **Multithreading support:**
//!   chunks are sorted and merge groups are merged in parallel on a dedicated thread pool.
//! * **Bounded merges:**
//!   at most `merge_fan_in` chunks are open in a single merge; larger inputs are merged in several rounds.
//! * **Scratch space cleanup:**
//!   all intermediate files live in a per-run workspace directory which is removed after a successful run.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use line_sort::LineSorterBuilder;
//!
//! fn main() {
//!     let sorter = LineSorterBuilder::new()
//!         .with_tmp_dir(Path::new("./"))
//!         .with_chunk_size(50 * 1024 * 1024)
//!         .with_merge_fan_in(16)
//!         .build()
//!         .unwrap();
//!
//!     sorter.sort_file(Path::new("input.txt"), Path::new("output.txt")).unwrap();
//! }
//! ```

pub mod buffer;
pub mod cancel;
pub mod chunk;
pub mod config;
pub mod generator;
pub mod merger;
pub mod ordering;
pub mod sort;
pub mod split;
pub mod workspace;

pub use buffer::LineBuffer;
pub use cancel::CancellationToken;
pub use chunk::{ChunkReader, ChunkSorter, SortedChunk, UnsortedChunk};
pub use config::SortConfig;
pub use merger::{BinaryHeapMerger, MergeEngine};
pub use ordering::{IdTextOrdering, LineOrdering};
pub use sort::{LineSorter, LineSorterBuilder, SortError};
pub use split::Splitter;
pub use workspace::Workspace;
