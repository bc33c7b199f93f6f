use std::io::SeekFrom;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::TransferError;

// ---------------------------------------------------------------------------
// ChunkPlan
// ---------------------------------------------------------------------------

/// A contiguous byte range of the source file: the atomic unit of upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    /// Zero-based chunk index.
    pub index: u32,
    /// Byte offset within the file.
    pub offset: u64,
    /// Length in bytes.
    pub len: u64,
}

impl ChunkRange {
    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Deterministic partition of `total_size` bytes into `chunk_size` pieces.
///
/// The same inputs always yield the same ranges, so a chunk index computed
/// after a restart refers to the same bytes the server already acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
    count: u32,
}

impl ChunkPlan {
    /// Creates a plan. Fails if `chunk_size` is zero.
    pub fn new(total_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::ZeroChunkSize);
        }
        let chunks = total_size.div_ceil(chunk_size);
        let count = u32::try_from(chunks).map_err(|_| TransferError::TooManyChunks { chunks })?;
        Ok(Self {
            total_size,
            chunk_size,
            count,
        })
    }

    /// Number of chunks: `ceil(total_size / chunk_size)`, zero for an empty file.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Returns the range of chunk `index`, or `None` past the end.
    pub fn range(&self, index: u32) -> Option<ChunkRange> {
        if index >= self.count {
            return None;
        }
        let offset = u64::from(index) * self.chunk_size;
        let len = self.chunk_size.min(self.total_size - offset);
        Some(ChunkRange { index, offset, len })
    }

    /// Iterates all ranges in increasing index order.
    pub fn iter(&self) -> impl Iterator<Item = ChunkRange> + '_ {
        (0..self.count).filter_map(|i| self.range(i))
    }

    /// Sums the lengths of the given chunk indices, ignoring out-of-range ones.
    pub fn bytes_in<'a>(&self, indices: impl IntoIterator<Item = &'a u32>) -> u64 {
        indices
            .into_iter()
            .filter_map(|&i| self.range(i))
            .map(|r| r.len)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads single chunk ranges from a file.
pub struct ChunkReader {
    file: tokio::fs::File,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` and checks that its size still equals `expected_size`.
    ///
    /// A size change between selection and upload would shift chunk
    /// boundaries, so it is rejected rather than silently re-planned.
    pub async fn open(path: &Path, expected_size: u64) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        if file_size != expected_size {
            tracing::warn!(
                path = %path.display(),
                expected = expected_size,
                actual = file_size,
                "source file size changed since selection"
            );
            return Err(TransferError::SourceChanged {
                expected: expected_size,
                actual: file_size,
            });
        }
        Ok(Self { file, file_size })
    }

    /// Reads exactly the bytes of `range`.
    pub async fn read_chunk(&mut self, range: ChunkRange) -> Result<Vec<u8>, TransferError> {
        if range.end() > self.file_size {
            return Err(TransferError::SourceChanged {
                expected: range.end(),
                actual: self.file_size,
            });
        }
        self.file.seek(SeekFrom::Start(range.offset)).await?;
        let mut buf = vec![0u8; range.len as usize];
        self.file.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const MIB: u64 = 1024 * 1024;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn zero_chunk_size_rejected() {
        assert!(matches!(
            ChunkPlan::new(10, 0),
            Err(TransferError::ZeroChunkSize)
        ));
    }

    #[test]
    fn empty_file_has_no_chunks() {
        let plan = ChunkPlan::new(0, 5 * MIB).unwrap();
        assert_eq!(plan.count(), 0);
        assert!(plan.iter().next().is_none());
        assert!(plan.range(0).is_none());
    }

    #[test]
    fn twelve_mib_in_five_mib_chunks() {
        let plan = ChunkPlan::new(12 * MIB, 5 * MIB).unwrap();
        assert_eq!(plan.count(), 3);
        let ranges: Vec<_> = plan.iter().collect();
        assert_eq!(ranges[0], ChunkRange { index: 0, offset: 0, len: 5 * MIB });
        assert_eq!(ranges[1], ChunkRange { index: 1, offset: 5 * MIB, len: 5 * MIB });
        assert_eq!(ranges[2], ChunkRange { index: 2, offset: 10 * MIB, len: 2 * MIB });
    }

    #[test]
    fn exact_multiple_last_chunk_is_full() {
        let plan = ChunkPlan::new(10 * MIB, 5 * MIB).unwrap();
        assert_eq!(plan.count(), 2);
        assert_eq!(plan.range(1).unwrap().len, 5 * MIB);
    }

    #[test]
    fn ranges_partition_without_gaps_or_overlaps() {
        for total in [0u64, 1, 2, 7, 63, 64, 65, 1000, 4096, 4097] {
            for chunk in [1u64, 2, 3, 64, 1000, 5000] {
                let plan = ChunkPlan::new(total, chunk).unwrap();
                assert_eq!(u64::from(plan.count()), total.div_ceil(chunk));

                let mut expected_offset = 0;
                for (i, r) in plan.iter().enumerate() {
                    assert_eq!(r.index as usize, i);
                    assert_eq!(r.offset, expected_offset, "gap at {total}/{chunk}");
                    assert!(r.len > 0 && r.len <= chunk);
                    if (r.index + 1) < plan.count() {
                        assert_eq!(r.len, chunk);
                    }
                    expected_offset = r.end();
                }
                assert_eq!(expected_offset, total, "coverage at {total}/{chunk}");
            }
        }
    }

    #[test]
    fn plan_is_deterministic() {
        let a: Vec<_> = ChunkPlan::new(12_345, 100).unwrap().iter().collect();
        let b: Vec<_> = ChunkPlan::new(12_345, 100).unwrap().iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn bytes_in_sums_selected_chunks() {
        let plan = ChunkPlan::new(12, 5).unwrap();
        assert_eq!(plan.bytes_in(&[0, 2]), 7);
        assert_eq!(plan.bytes_in(&[9]), 0);
    }

    #[tokio::test]
    async fn reader_reads_each_range() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "clip.mp4", b"AABBCCDDEE");
        let plan = ChunkPlan::new(10, 4).unwrap();
        let mut reader = ChunkReader::open(&path, 10).await.unwrap();
        assert_eq!(reader.file_size(), 10);

        let mut chunks = Vec::new();
        for r in plan.iter() {
            chunks.push(reader.read_chunk(r).await.unwrap());
        }
        assert_eq!(chunks, vec![b"AABB".to_vec(), b"CCDD".to_vec(), b"EE".to_vec()]);
    }

    #[tokio::test]
    async fn reader_reads_out_of_order() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "clip.mp4", b"0123456789");
        let plan = ChunkPlan::new(10, 4).unwrap();
        let mut reader = ChunkReader::open(&path, 10).await.unwrap();

        let last = reader.read_chunk(plan.range(2).unwrap()).await.unwrap();
        let first = reader.read_chunk(plan.range(0).unwrap()).await.unwrap();
        assert_eq!(last, b"89");
        assert_eq!(first, b"0123");
    }

    #[tokio::test]
    async fn reader_rejects_changed_size() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "clip.mp4", b"short");
        let result = ChunkReader::open(&path, 100).await;
        assert!(matches!(
            result,
            Err(TransferError::SourceChanged { expected: 100, actual: 5 })
        ));
    }
}
