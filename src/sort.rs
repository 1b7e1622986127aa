//! External line sorter.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};

use crate::cancel::CancellationToken;
use crate::chunk::ChunkSorter;
use crate::config::SortConfig;
use crate::merger::MergeEngine;
use crate::ordering::{IdTextOrdering, LineOrdering};
use crate::split::Splitter;
use crate::workspace::Workspace;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Temporary directory creation or removal error.
    TempDir(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Common I/O error.
    IO(io::Error),
    /// Sorter configuration is not usable.
    InvalidConfig(String),
    /// Sorting was cancelled by the caller.
    Cancelled,
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::TempDir(err) => Some(err),
            SortError::ThreadPoolBuildError(err) => Some(err),
            SortError::IO(err) => Some(err),
            SortError::InvalidConfig(_) => None,
            SortError::Cancelled => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::TempDir(err) => write!(f, "temporary directory not created: {}", err),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::InvalidConfig(reason) => write!(f, "invalid configuration: {}", reason),
            SortError::Cancelled => write!(f, "sorting cancelled"),
        }
    }
}

/// Line sorter builder. Provides methods for [`LineSorter`] initialization.
#[derive(Clone)]
pub struct LineSorterBuilder<O = IdTextOrdering>
where
    O: LineOrdering,
{
    config: SortConfig,
    ordering: O,
}

impl LineSorterBuilder<IdTextOrdering> {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        LineSorterBuilder::default()
    }
}

impl<O: LineOrdering> LineSorterBuilder<O> {
    /// Builds a [`LineSorter`] instance using provided configuration.
    pub fn build(self) -> Result<LineSorter<O>, SortError> {
        LineSorter::new(self.config, self.ordering)
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: SortConfig) -> LineSorterBuilder<O> {
        self.config = config;
        return self;
    }

    /// Sets the ordering lines are sorted by.
    pub fn with_ordering<P: LineOrdering>(self, ordering: P) -> LineSorterBuilder<P> {
        LineSorterBuilder {
            config: self.config,
            ordering,
        }
    }

    /// Sets number of threads to be used to sort and merge chunks in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> LineSorterBuilder<O> {
        self.config.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory the temporary workspace is created in.
    pub fn with_tmp_dir(mut self, path: &Path) -> LineSorterBuilder<O> {
        self.config.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets split chunk size in bytes.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> LineSorterBuilder<O> {
        self.config.chunk_size = chunk_size;
        return self;
    }

    /// Sets the byte lines are terminated with.
    pub fn with_line_separator(mut self, separator: u8) -> LineSorterBuilder<O> {
        self.config.line_separator = separator;
        return self;
    }

    /// Sets maximum number of chunks merged together.
    pub fn with_merge_fan_in(mut self, merge_fan_in: usize) -> LineSorterBuilder<O> {
        self.config.merge_fan_in = merge_fan_in;
        return self;
    }

    /// Sets read/write buffer size of both the sort and the merge stages.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> LineSorterBuilder<O> {
        self.config.sort_input_buf_size = buf_size;
        self.config.sort_output_buf_size = buf_size;
        self.config.merge_input_buf_size = buf_size;
        self.config.merge_output_buf_size = buf_size;
        return self;
    }
}

impl Default for LineSorterBuilder<IdTextOrdering> {
    fn default() -> Self {
        LineSorterBuilder {
            config: SortConfig::default(),
            ordering: IdTextOrdering::default(),
        }
    }
}

/// External line sorter.
///
/// Sorting a stream goes through the following stages:
/// * the input is split into line-aligned chunk files in a fresh workspace directory,
/// * if the input fits a single chunk, that chunk is sorted straight into the output,
/// * otherwise every chunk is sorted in parallel and sorted chunks are merged in rounds of at most
///   `merge_fan_in` chunks until the last round writes the output,
/// * the workspace is removed.
///
/// A failed or cancelled sort leaves the workspace on disk.
pub struct LineSorter<O = IdTextOrdering>
where
    O: LineOrdering,
{
    /// Sorting thread pool.
    thread_pool: rayon::ThreadPool,
    config: SortConfig,
    ordering: O,
}

impl<O: LineOrdering> LineSorter<O> {
    /// Creates a new line sorter instance.
    ///
    /// # Arguments
    /// * `config` - Sorter configuration, validated before use.
    /// * `ordering` - Ordering lines are sorted by.
    pub fn new(config: SortConfig, ordering: O) -> Result<Self, SortError> {
        config.validate().map_err(SortError::InvalidConfig)?;

        return Ok(LineSorter {
            thread_pool: Self::init_thread_pool(config.threads_number)?,
            config,
            ordering,
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        let thread_pool = thread_pool_builder
            .build()
            .map_err(|err| SortError::ThreadPoolBuildError(err))?;

        return Ok(thread_pool);
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Sorts the `source` file into the `target` file.
    ///
    /// The result is written to a temporary file next to `target` which replaces `target` only once sorting
    /// succeeded, so a failed sort leaves `target` untouched and `source` may be the same file as `target`.
    pub fn sort_file(&self, source: &Path, target: &Path) -> Result<(), SortError> {
        let source = fs::File::open(source).map_err(SortError::IO)?;

        let target_dir = match target.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut output = tempfile::NamedTempFile::new_in(target_dir).map_err(SortError::IO)?;

        self.sort(source, output.as_file_mut())?;

        output.persist(target).map_err(|err| SortError::IO(err.error))?;

        return Ok(());
    }

    /// Sorts lines from `source` writing them to `target`.
    /// Every line written to `target` is terminated by the separator, including the last one.
    pub fn sort<R: Read, W: Write>(&self, source: R, target: W) -> Result<(), SortError> {
        self.sort_with_cancellation(source, target, &CancellationToken::new())
    }

    /// Sorts lines from `source` writing them to `target`, stopping early if `token` gets cancelled.
    pub fn sort_with_cancellation<R: Read, W: Write>(
        &self,
        source: R,
        target: W,
        token: &CancellationToken,
    ) -> Result<(), SortError> {
        let base = self.tmp_base_dir()?;
        let workspace = Workspace::unique_in(&base, &self.config.tmp_dir_name).map_err(SortError::TempDir)?;
        workspace.ensure().map_err(SortError::TempDir)?;

        log::info!("using {} as a temporary directory", workspace.root().display());

        if let Err(err) = self.sort_in(&workspace, source, target, token) {
            log::warn!(
                "sorting failed, temporary data kept in {}",
                workspace.root().display()
            );
            return Err(err);
        }

        if let Err(err) = workspace.destroy() {
            log::warn!(
                "temporary directory {} not removed: {}",
                workspace.root().display(),
                err
            );
        }

        log::info!("sorting done");

        return Ok(());
    }

    fn sort_in<R: Read, W: Write>(
        &self,
        workspace: &Workspace,
        source: R,
        target: W,
        token: &CancellationToken,
    ) -> Result<(), SortError> {
        let chunks = Splitter::new(&self.config, workspace).split(source, token)?;
        let chunk_sorter = ChunkSorter::new(&self.config, workspace, &self.ordering, &self.thread_pool);

        if let [chunk] = chunks.as_slice() {
            if token.is_cancelled() {
                return Err(SortError::Cancelled);
            }
            log::debug!("input fits a single chunk, merging skipped");
            return chunk_sorter.sort_into(chunk, target);
        }

        let sorted = chunk_sorter.sort_chunks(&chunks, token)?;

        let merge_engine = MergeEngine::new(
            &self.config,
            workspace,
            &self.ordering,
            &self.thread_pool,
            chunks.len() + 1,
        );
        merge_engine.merge(sorted, target, token)?;

        log::debug!("external sort merging done");

        return Ok(());
    }

    fn tmp_base_dir(&self) -> Result<PathBuf, SortError> {
        if let Some(tmp_dir) = &self.config.tmp_dir {
            return Ok(tmp_dir.clone());
        }

        let exe = std::env::current_exe().map_err(SortError::TempDir)?;
        let base = exe.parent().map(Path::to_path_buf).ok_or_else(|| {
            SortError::TempDir(io::Error::new(
                io::ErrorKind::NotFound,
                "executable has no parent directory",
            ))
        })?;

        return Ok(base);
    }
}
