//! Chunk files and chunk sorting.

use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use rayon::prelude::*;

use crate::buffer::LineBuffer;
use crate::cancel::CancellationToken;
use crate::config::SortConfig;
use crate::ordering::LineOrdering;
use crate::sort::SortError;
use crate::workspace::Workspace;

/// Line-aligned slice of the input stored in the workspace, not sorted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsortedChunk {
    /// Chunk number, assigned in split order starting from 1.
    pub id: usize,
    /// File name relative to the workspace.
    pub name: String,
    /// Number of lines seen while splitting. Used to size the in-memory line buffer.
    pub lines: usize,
}

/// Chunk file whose lines are in sorted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedChunk {
    pub id: usize,
    /// File name relative to the workspace.
    pub name: String,
}

impl SortedChunk {
    pub fn new(id: usize, extension: &str) -> Self {
        SortedChunk {
            id,
            name: format!("{}{}", id, extension),
        }
    }
}

/// Sequential line reader over a chunk file.
/// Yields lines without their separator.
pub struct ChunkReader {
    reader: io::BufReader<fs::File>,
    separator: u8,
}

impl ChunkReader {
    /// Opens a chunk file for reading.
    pub fn open(path: &Path, separator: u8, buf_size: usize) -> io::Result<Self> {
        let file = fs::File::open(path)?;

        return Ok(ChunkReader {
            reader: io::BufReader::with_capacity(buf_size, file),
            separator,
        });
    }
}

impl Iterator for ChunkReader {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = Vec::new();
        match self.reader.read_until(self.separator, &mut line) {
            Ok(0) => None,
            Ok(_) => {
                if line.last() == Some(&self.separator) {
                    line.pop();
                }
                Some(Ok(line))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// Sorts split chunks in memory.
pub struct ChunkSorter<'a, O: LineOrdering> {
    config: &'a SortConfig,
    workspace: &'a Workspace,
    ordering: &'a O,
    thread_pool: &'a rayon::ThreadPool,
}

impl<'a, O: LineOrdering> ChunkSorter<'a, O> {
    pub fn new(
        config: &'a SortConfig,
        workspace: &'a Workspace,
        ordering: &'a O,
        thread_pool: &'a rayon::ThreadPool,
    ) -> Self {
        ChunkSorter {
            config,
            workspace,
            ordering,
            thread_pool,
        }
    }

    /// Sorts all chunks in parallel. Returns sorted chunks in the order of the input chunks.
    /// Each unsorted chunk file is removed once its sorted counterpart is fully written.
    pub fn sort_chunks(
        &self,
        chunks: &[UnsortedChunk],
        token: &CancellationToken,
    ) -> Result<Vec<SortedChunk>, SortError> {
        log::debug!("sorting {} chunks ...", chunks.len());

        self.thread_pool.install(|| {
            chunks
                .par_iter()
                .map(|chunk| {
                    if token.is_cancelled() {
                        return Err(SortError::Cancelled);
                    }
                    self.sort_chunk(chunk)
                })
                .collect()
        })
    }

    /// Sorts a single chunk into a sorted chunk file with the same id.
    pub fn sort_chunk(&self, chunk: &UnsortedChunk) -> Result<SortedChunk, SortError> {
        let sorted = SortedChunk::new(chunk.id, &self.config.sorted_extension);
        let sorted_path = self.workspace.path_for(&sorted.name);

        let file = fs::File::create(&sorted_path).map_err(SortError::IO)?;
        self.sort_into(chunk, file)?;

        let unsorted_path = self.workspace.path_for(&chunk.name);
        fs::remove_file(&unsorted_path).map_err(SortError::IO)?;

        log::debug!("chunk {} sorted ({} lines)", sorted.name, chunk.lines);

        return Ok(sorted);
    }

    /// Sorts a single chunk writing its lines to `output`. The unsorted chunk file is left in place.
    pub fn sort_into<W: Write>(&self, chunk: &UnsortedChunk, output: W) -> Result<(), SortError> {
        let path = self.workspace.path_for(&chunk.name);
        let mut buffer = self.load(&path, chunk.lines).map_err(SortError::IO)?;

        buffer.sort_by(self.ordering);

        let mut writer = io::BufWriter::with_capacity(self.config.sort_output_buf_size, output);
        let separator = [self.config.line_separator];
        for line in buffer.iter() {
            writer.write_all(line).map_err(SortError::IO)?;
            writer.write_all(&separator).map_err(SortError::IO)?;
        }
        writer.flush().map_err(SortError::IO)?;

        return Ok(());
    }

    fn load(&self, path: &Path, expected_lines: usize) -> io::Result<LineBuffer> {
        let file = fs::File::open(path)?;
        let file_len = file.metadata()?.len() as usize;

        let mut data = Vec::with_capacity(file_len);
        io::BufReader::with_capacity(self.config.sort_input_buf_size, file).read_to_end(&mut data)?;

        return Ok(LineBuffer::new(data, self.config.line_separator, expected_lines));
    }
}
