//! K-way merging of sorted chunks.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ffi::OsString;
use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};
use std::sync::atomic::{self, AtomicUsize};

use rayon::prelude::*;

use crate::cancel::CancellationToken;
use crate::chunk::{ChunkReader, SortedChunk};
use crate::config::SortConfig;
use crate::ordering::LineOrdering;
use crate::sort::SortError;
use crate::workspace::Workspace;

struct HeapItem<'a, O> {
    line: Vec<u8>,
    idx: usize,
    ordering: &'a O,
}

impl<'a, O: LineOrdering> PartialEq for HeapItem<'a, O> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<'a, O: LineOrdering> Eq for HeapItem<'a, O> {}

impl<'a, O: LineOrdering> PartialOrd for HeapItem<'a, O> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'a, O: LineOrdering> Ord for HeapItem<'a, O> {
    // binary heap is max-heap, so the order is reversed to pop the smallest line first;
    // equal lines are taken from the earlier input first
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordering
            .compare_lines(&self.line, &other.line)
            .then(self.idx.cmp(&other.idx))
            .reverse()
    }
}

/// Binary heap merger implementation.
/// Merges multiple sorted line inputs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of lines,
/// *n* is the number of inputs.
pub struct BinaryHeapMerger<'a, C, O>
where
    C: Iterator<Item = io::Result<Vec<u8>>>,
    O: LineOrdering,
{
    items: BinaryHeap<HeapItem<'a, O>>,
    chunks: Vec<C>,
    ordering: &'a O,
    initiated: bool,
}

impl<'a, C, O> BinaryHeapMerger<'a, C, O>
where
    C: Iterator<Item = io::Result<Vec<u8>>>,
    O: LineOrdering,
{
    /// Creates an instance of a binary heap merger using chunks as inputs.
    /// Chunk lines should be sorted by `ordering` otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `chunks` - Chunks to be merged in a single sorted one
    /// * `ordering` - Ordering the chunks are sorted by
    pub fn new<I>(chunks: I, ordering: &'a O) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        let chunks = Vec::from_iter(chunks);
        let items = BinaryHeap::with_capacity(chunks.len());

        return BinaryHeapMerger {
            chunks,
            items,
            ordering,
            initiated: false,
        };
    }

    fn pull(&mut self, idx: usize) -> Option<io::Error> {
        match self.chunks[idx].next() {
            Some(Ok(line)) => {
                self.items.push(HeapItem {
                    line,
                    idx,
                    ordering: self.ordering,
                });
                None
            }
            Some(Err(err)) => Some(err),
            None => None,
        }
    }
}

impl<'a, C, O> Iterator for BinaryHeapMerger<'a, C, O>
where
    C: Iterator<Item = io::Result<Vec<u8>>>,
    O: LineOrdering,
{
    type Item = io::Result<Vec<u8>>;

    /// Returns the next line from the inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if !self.initiated {
            for idx in 0..self.chunks.len() {
                if let Some(err) = self.pull(idx) {
                    return Some(Err(err));
                }
            }
            self.initiated = true;
        }

        let item = self.items.pop()?;
        if let Some(err) = self.pull(item.idx) {
            return Some(Err(err));
        }

        return Some(Ok(item.line));
    }
}

/// Readers of one merge operation.
///
/// Dropping the guard closes every reader. Input files are retired afterwards, and only if the merge was
/// committed, so a failed merge keeps its inputs on disk.
struct MergeInputs {
    readers: Vec<ChunkReader>,
    paths: Vec<PathBuf>,
    committed: bool,
}

impl MergeInputs {
    fn open(paths: Vec<PathBuf>, separator: u8, buf_size: usize) -> io::Result<Self> {
        let readers = paths
            .iter()
            .map(|path| ChunkReader::open(path, separator, buf_size))
            .collect::<io::Result<Vec<_>>>()?;

        return Ok(MergeInputs {
            readers,
            paths,
            committed: false,
        });
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for MergeInputs {
    fn drop(&mut self) {
        self.readers.clear();

        if self.committed {
            for path in &self.paths {
                retire(path);
            }
        }
    }
}

/// Removes a merged chunk file: renames it first, then deletes the renamed file.
/// Failures are logged and otherwise ignored since the merge result is already complete.
fn retire(path: &Path) {
    let mut removal = OsString::from(path.as_os_str());
    removal.push(".removal");
    let removal = PathBuf::from(removal);

    if let Err(err) = fs::rename(path, &removal) {
        log::warn!("chunk {} not renamed for removal: {}", path.display(), err);
        return;
    }
    if let Err(err) = fs::remove_file(&removal) {
        log::warn!("chunk {} not removed: {}", removal.display(), err);
    }
}

/// Merges sorted chunks in rounds until a single sorted output remains.
pub struct MergeEngine<'a, O: LineOrdering> {
    config: &'a SortConfig,
    workspace: &'a Workspace,
    ordering: &'a O,
    thread_pool: &'a rayon::ThreadPool,
    next_id: AtomicUsize,
}

impl<'a, O: LineOrdering> MergeEngine<'a, O> {
    /// Creates a merge engine. Chunks created by intermediate rounds are numbered starting from `first_id`,
    /// which must not clash with the ids of the chunks being merged.
    pub fn new(
        config: &'a SortConfig,
        workspace: &'a Workspace,
        ordering: &'a O,
        thread_pool: &'a rayon::ThreadPool,
        first_id: usize,
    ) -> Self {
        MergeEngine {
            config,
            workspace,
            ordering,
            thread_pool,
            next_id: AtomicUsize::new(first_id),
        }
    }

    /// Merges all sorted chunks into `output`.
    /// Intermediate rounds run while there are more chunks than the fan-in allows; the last round writes to `output`.
    pub fn merge<W: Write>(
        &self,
        mut chunks: Vec<SortedChunk>,
        output: W,
        token: &CancellationToken,
    ) -> Result<(), SortError> {
        let mut round = 1;
        while chunks.len() > self.config.merge_fan_in {
            log::debug!("merge round {}: {} chunks", round, chunks.len());
            chunks = self.merge_round(&chunks, token)?;
            round += 1;
        }

        log::debug!("final merge round {}: {} chunks", round, chunks.len());

        return self.merge_group(&chunks, output, token);
    }

    /// Runs one intermediate round: merges every group of at most fan-in chunks into a new chunk, in parallel.
    /// A group of a single chunk is kept as is. Returns the chunks of the next round in group order.
    pub fn merge_round(&self, chunks: &[SortedChunk], token: &CancellationToken) -> Result<Vec<SortedChunk>, SortError> {
        self.thread_pool.install(|| {
            chunks
                .par_chunks(self.config.merge_fan_in)
                .map(|group| self.merge_to_chunk(group, token))
                .collect()
        })
    }

    fn merge_to_chunk(&self, group: &[SortedChunk], token: &CancellationToken) -> Result<SortedChunk, SortError> {
        if let [single] = group {
            return Ok(single.clone());
        }

        let id = self.next_id.fetch_add(1, atomic::Ordering::Relaxed);
        let merged = SortedChunk::new(id, &self.config.sorted_extension);

        let file = fs::File::create(self.workspace.path_for(&merged.name)).map_err(SortError::IO)?;
        self.merge_group(group, file, token)?;

        log::debug!("{} chunks merged into {}", group.len(), merged.name);

        return Ok(merged);
    }

    /// Merges a group of sorted chunks into `output` and retires the merged chunk files.
    pub fn merge_group<W: Write>(
        &self,
        group: &[SortedChunk],
        output: W,
        token: &CancellationToken,
    ) -> Result<(), SortError> {
        let paths = group
            .iter()
            .map(|chunk| self.workspace.path_for(&chunk.name))
            .collect();
        let mut inputs = MergeInputs::open(
            paths,
            self.config.line_separator,
            self.config.merge_input_buf_size,
        )
        .map_err(SortError::IO)?;

        let mut writer = io::BufWriter::with_capacity(self.config.merge_output_buf_size, output);
        let separator = [self.config.line_separator];

        for line in BinaryHeapMerger::new(inputs.readers.iter_mut(), self.ordering) {
            if token.is_cancelled() {
                return Err(SortError::Cancelled);
            }
            let line = line.map_err(SortError::IO)?;
            writer.write_all(&line).map_err(SortError::IO)?;
            writer.write_all(&separator).map_err(SortError::IO)?;
        }
        writer.flush().map_err(SortError::IO)?;

        inputs.commit();

        return Ok(());
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;
    use std::fs;
    use std::io::{self, ErrorKind};

    use rstest::*;

    use super::{BinaryHeapMerger, MergeEngine};
    use crate::cancel::CancellationToken;
    use crate::chunk::SortedChunk;
    use crate::config::SortConfig;
    use crate::ordering::IdTextOrdering;
    use crate::sort::SortError;
    use crate::workspace::Workspace;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    fn thread_pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn config(merge_fan_in: usize) -> SortConfig {
        SortConfig {
            merge_fan_in,
            ..SortConfig::default()
        }
    }

    fn write_sorted(workspace: &Workspace, id: usize, data: &str) -> SortedChunk {
        let chunk = SortedChunk::new(id, ".sorted");
        fs::write(workspace.path_for(&chunk.name), data).unwrap();
        chunk
    }

    fn lines(items: &[&str]) -> Vec<io::Result<Vec<u8>>> {
        items.iter().map(|item| Ok(item.as_bytes().to_vec())).collect()
    }

    fn by_bytes(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    #[rstest]
    #[case(vec![], vec![])]
    #[case(vec![vec![], vec![]], vec![])]
    #[case(
        vec![
            vec!["4", "5", "7"],
            vec!["1", "6"],
            vec!["3"],
            vec![],
        ],
        vec!["1", "3", "4", "5", "6", "7"],
    )]
    #[case(
        vec![
            vec!["1", "", ""],
            vec!["2", ""],
        ],
        vec!["1", "2", "", "", ""],
    )]
    fn test_merger(#[case] chunks: Vec<Vec<&str>>, #[case] expected: Vec<&str>) {
        let ordering = by_bytes;
        let chunks = chunks.iter().map(|chunk| lines(chunk).into_iter());

        let actual: Vec<Vec<u8>> = BinaryHeapMerger::new(chunks, &ordering)
            .collect::<io::Result<_>>()
            .unwrap();

        let expected: Vec<Vec<u8>> = expected.iter().map(|item| item.as_bytes().to_vec()).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_merger_equal_lines_keep_input_order() {
        let ordering = IdTextOrdering::default();
        let chunks = vec![lines(&["x. a", "1. b"]).into_iter(), lines(&["y. a"]).into_iter()];

        let actual: Vec<Vec<u8>> = BinaryHeapMerger::new(chunks, &ordering)
            .collect::<io::Result<_>>()
            .unwrap();

        assert_eq!(actual, vec![b"x. a".to_vec(), b"y. a".to_vec(), b"1. b".to_vec()]);
    }

    #[test]
    fn test_merger_error() {
        let ordering = by_bytes;
        let chunks = vec![
            vec![Ok(b"3".to_vec()), Err(io::Error::new(ErrorKind::Other, "test error"))].into_iter(),
            lines(&["1", "2"]).into_iter(),
        ];

        let actual: Vec<io::Result<Vec<u8>>> = BinaryHeapMerger::new(chunks, &ordering).collect();

        assert_eq!(actual[0].as_ref().unwrap(), b"1");
        assert_eq!(actual[1].as_ref().unwrap(), b"2");
        assert_eq!(actual[2].as_ref().unwrap_err().to_string(), "test error");
    }

    #[rstest]
    fn test_merge_group_retires_inputs(tmp_dir: tempfile::TempDir) {
        let workspace = Workspace::new(tmp_dir.path());
        let config = config(10);
        let ordering = IdTextOrdering::default();
        let pool = thread_pool();
        let engine = MergeEngine::new(&config, &workspace, &ordering, &pool, 3);

        let group = vec![
            write_sorted(&workspace, 1, "5. a\n3. b\n"),
            write_sorted(&workspace, 2, "1. a\n2. z\n"),
        ];
        let mut output = Vec::new();
        engine.merge_group(&group, &mut output, &CancellationToken::new()).unwrap();

        assert_eq!(output, b"1. a\n5. a\n3. b\n2. z\n");
        let remaining = fs::read_dir(workspace.root()).unwrap().count();
        assert_eq!(remaining, 0);
    }

    #[rstest]
    fn test_retire_failure_is_not_fatal(tmp_dir: tempfile::TempDir) {
        let workspace = Workspace::new(tmp_dir.path());
        let config = config(10);
        let pool = thread_pool();

        let vanishing = workspace.path_for("2.sorted");
        let ordering = move |a: &[u8], b: &[u8]| {
            let _ = fs::remove_file(&vanishing);
            a.cmp(b)
        };
        let engine = MergeEngine::new(&config, &workspace, &ordering, &pool, 3);

        let group = vec![
            write_sorted(&workspace, 1, "a\nc\n"),
            write_sorted(&workspace, 2, "b\nd\n"),
        ];
        let mut output = Vec::new();
        let result = engine.merge_group(&group, &mut output, &CancellationToken::new());

        assert!(result.is_ok());
        assert_eq!(output, b"a\nb\nc\nd\n");
        assert_eq!(fs::read_dir(workspace.root()).unwrap().count(), 0);
    }

    #[rstest]
    fn test_cancelled_merge_keeps_inputs(tmp_dir: tempfile::TempDir) {
        let workspace = Workspace::new(tmp_dir.path());
        let config = config(10);
        let ordering = IdTextOrdering::default();
        let pool = thread_pool();
        let engine = MergeEngine::new(&config, &workspace, &ordering, &pool, 3);

        let group = vec![
            write_sorted(&workspace, 1, "1. a\n"),
            write_sorted(&workspace, 2, "2. b\n"),
        ];
        let token = CancellationToken::new();
        token.cancel();

        let result = engine.merge_group(&group, io::sink(), &token);

        assert!(matches!(result, Err(SortError::Cancelled)));
        assert!(workspace.path_for("1.sorted").exists());
        assert!(workspace.path_for("2.sorted").exists());
    }

    #[rstest]
    fn test_merge_round_keeps_single_chunk_group(tmp_dir: tempfile::TempDir) {
        let workspace = Workspace::new(tmp_dir.path());
        let config = config(2);
        let ordering = IdTextOrdering::default();
        let pool = thread_pool();
        let engine = MergeEngine::new(&config, &workspace, &ordering, &pool, 4);

        let chunks = vec![
            write_sorted(&workspace, 1, "1. c\n"),
            write_sorted(&workspace, 2, "2. a\n"),
            write_sorted(&workspace, 3, "3. b\n"),
        ];

        let next = engine.merge_round(&chunks, &CancellationToken::new()).unwrap();

        assert_eq!(next, vec![SortedChunk::new(4, ".sorted"), SortedChunk::new(3, ".sorted")]);
        assert_eq!(fs::read_to_string(workspace.path_for("4.sorted")).unwrap(), "2. a\n1. c\n");
        assert_eq!(fs::read_to_string(workspace.path_for("3.sorted")).unwrap(), "3. b\n");
        assert!(!workspace.path_for("1.sorted").exists());
        assert!(!workspace.path_for("2.sorted").exists());
    }

    #[rstest]
    #[case(2)]
    #[case(3)]
    #[case(10)]
    fn test_merge_rounds(tmp_dir: tempfile::TempDir, #[case] merge_fan_in: usize) {
        let workspace = Workspace::new(tmp_dir.path());
        let config = config(merge_fan_in);
        let ordering = IdTextOrdering::default();
        let pool = thread_pool();

        let chunks: Vec<SortedChunk> = (1..=12)
            .map(|id| write_sorted(&workspace, id, &format!("{}. a\n{}. b\n", id, id)))
            .collect();
        let engine = MergeEngine::new(&config, &workspace, &ordering, &pool, chunks.len() + 1);

        let mut output = Vec::new();
        engine.merge(chunks, &mut output, &CancellationToken::new()).unwrap();

        let expected: String = (1..=12)
            .map(|id| format!("{}. a\n", id))
            .chain((1..=12).map(|id| format!("{}. b\n", id)))
            .collect();
        assert_eq!(String::from_utf8(output).unwrap(), expected);
        assert_eq!(fs::read_dir(workspace.root()).unwrap().count(), 0);
    }

    #[rstest]
    fn test_merge_single_chunk(tmp_dir: tempfile::TempDir) {
        let workspace = Workspace::new(tmp_dir.path());
        let config = config(2);
        let ordering = IdTextOrdering::default();
        let pool = thread_pool();
        let engine = MergeEngine::new(&config, &workspace, &ordering, &pool, 2);

        let chunks = vec![write_sorted(&workspace, 1, "2. a\n1. b\n1. c\n")];
        let mut output = Vec::new();
        engine.merge(chunks, &mut output, &CancellationToken::new()).unwrap();

        assert_eq!(output, b"2. a\n1. b\n1. c\n");
    }
}
