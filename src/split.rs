//! Input splitting.

use std::fs;
use std::io::{self, prelude::*};

use crate::cancel::CancellationToken;
use crate::chunk::UnsortedChunk;
use crate::config::SortConfig;
use crate::sort::SortError;
use crate::workspace::Workspace;

/// Splits an input stream into line-aligned chunk files.
///
/// Every chunk holds `chunk_size` bytes of input plus the bytes up to and including the next separator, so a line
/// never spans two chunks. Chunks are written in input order and, concatenated, reproduce the input exactly.
pub struct Splitter<'a> {
    config: &'a SortConfig,
    workspace: &'a Workspace,
}

impl<'a> Splitter<'a> {
    pub fn new(config: &'a SortConfig, workspace: &'a Workspace) -> Self {
        Splitter { config, workspace }
    }

    /// Reads `source` once and writes it out as unsorted chunks.
    /// An empty source produces a single empty chunk.
    pub fn split<R: Read>(&self, source: R, token: &CancellationToken) -> Result<Vec<UnsortedChunk>, SortError> {
        let separator = self.config.line_separator;
        let chunk_size = self.config.chunk_size;

        let mut reader = io::BufReader::with_capacity(self.config.sort_input_buf_size, source);
        let mut buffer = Vec::with_capacity(chunk_size);
        let mut chunks = Vec::new();
        let mut max_lines = 0;

        loop {
            if token.is_cancelled() {
                return Err(SortError::Cancelled);
            }

            buffer.clear();
            (&mut reader)
                .take(chunk_size as u64)
                .read_to_end(&mut buffer)
                .map_err(SortError::IO)?;
            let mut lines = count_lines(&buffer, separator);

            if buffer.len() == chunk_size && buffer.last() != Some(&separator) {
                let overrun = reader.read_until(separator, &mut buffer).map_err(SortError::IO)?;
                if overrun > 0 && buffer.last() == Some(&separator) {
                    lines += 1;
                }
            }

            let chunk = self.write_chunk(chunks.len() + 1, &buffer, lines)?;
            max_lines = max_lines.max(chunk.lines);
            chunks.push(chunk);

            if reader.fill_buf().map_err(SortError::IO)?.is_empty() {
                break;
            }
        }

        log::debug!(
            "input split into {} chunks (max {} lines per chunk)",
            chunks.len(),
            max_lines
        );

        return Ok(chunks);
    }

    fn write_chunk(&self, id: usize, data: &[u8], lines: usize) -> Result<UnsortedChunk, SortError> {
        let name = format!("{}{}", id, self.config.unsorted_extension);

        let mut file = fs::File::create(self.workspace.path_for(&name)).map_err(SortError::IO)?;
        file.write_all(data).map_err(SortError::IO)?;

        return Ok(UnsortedChunk { id, name, lines });
    }
}

fn count_lines(data: &[u8], separator: u8) -> usize {
    data.iter().filter(|&&byte| byte == separator).count()
}
