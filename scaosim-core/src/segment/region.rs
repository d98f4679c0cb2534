//! Segment creation, publish and snapshot.

use super::header::{
    HEADER_SIZE, MAX_NAME_LEN, PAYLOAD_OFFSET, SEQUENCE_OFFSET, SegmentHeader, TIMESTAMP_OFFSET,
};
use crate::clock::{ClockProvider, MonotonicClock};
use crate::error::{Result, ScaoError};
use crate::types::{DType, Generation, SegmentId, Shape, Timestamp};
use fs2::FileExt;
use memmap2::{MmapOptions, MmapRaw};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering, fence};

/// Bytes of the leading magic number.
const MAGIC_LEN: usize = 8;

/// Default number of snapshot attempts before reporting a stale read.
pub const DEFAULT_SNAPSHOT_RETRIES: u32 = 64;

/// Where segments live and how they are read.
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// Directory holding the segment files.
    pub directory: PathBuf,
    /// Suffix appended to every channel name.
    pub suffix: String,
    /// Snapshot attempts before giving up with `StaleRead`.
    pub snapshot_retries: u32,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            suffix: String::new(),
            snapshot_retries: DEFAULT_SNAPSHOT_RETRIES,
        }
    }
}

/// `/dev/shm/scaosim` where a tmpfs is available, else the temp dir.
pub fn default_directory() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if shm.is_dir() {
        shm.join("scaosim")
    } else {
        std::env::temp_dir().join("scaosim")
    }
}

impl SegmentConfig {
    /// Create an isolated configuration for testing.
    ///
    /// Uses a temporary directory with a unique name per invocation.
    pub fn in_memory() -> Self {
        Self {
            directory: std::env::temp_dir().join(format!("scaosim_{}", uuid::Uuid::new_v4())),
            suffix: String::new(),
            snapshot_retries: DEFAULT_SNAPSHOT_RETRIES,
        }
    }

    /// Set the segment directory.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Set the channel name suffix.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Set the snapshot retry budget.
    pub fn with_snapshot_retries(mut self, retries: u32) -> Self {
        self.snapshot_retries = retries.max(1);
        self
    }

    /// Full segment name for a channel.
    pub fn segment_name(&self, channel: &str) -> String {
        format!("{channel}{}", self.suffix)
    }

    /// Path of the backing file for a channel.
    pub fn path_for(&self, channel: &str) -> PathBuf {
        self.directory
            .join(format!("{}.shm", self.segment_name(channel)))
    }
}

/// Requested schema of a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSpec {
    /// Channel name (without suffix).
    pub channel: String,
    /// Payload shape.
    pub shape: Shape,
    /// Payload element type.
    pub dtype: DType,
}

impl SegmentSpec {
    /// Create a spec.
    pub fn new(channel: impl Into<String>, shape: Shape, dtype: DType) -> Self {
        Self {
            channel: channel.into(),
            shape,
            dtype,
        }
    }
}

/// Generation and timestamp of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleMeta {
    /// Generation the copied payload belongs to.
    pub generation: Generation,
    /// When the writer published it.
    pub timestamp: Timestamp,
    /// Attempts needed to get a consistent copy.
    pub attempts: u32,
}

/// Point-in-time view of a segment, read without attaching.
#[derive(Debug, Clone)]
pub struct SegmentStatus {
    /// Backing file.
    pub path: PathBuf,
    /// Header as written at creation.
    pub header: SegmentHeader,
    /// Latest stable generation.
    pub generation: Generation,
    /// Whether a publish was in flight at the time of reading.
    pub publishing: bool,
    /// Timestamp of the latest sample (zero if unwritten).
    pub timestamp: Timestamp,
    /// Size of the backing file.
    pub file_len: u64,
}

/// Shared mapping state.
struct SegmentInner {
    /// The shared mapping. Raw because the payload is written through
    /// a shared reference while other processes read it.
    map: MmapRaw,
    /// Keeps the descriptor open for the lifetime of the mapping.
    _file: File,
    /// Path to the segment file.
    path: PathBuf,
    /// Header information.
    header: SegmentHeader,
    /// Channel name (without suffix).
    channel: String,
}

impl SegmentInner {
    fn sequence(&self) -> &AtomicU64 {
        // SAFETY: the mapping is page aligned and at least PAYLOAD_OFFSET
        // bytes long; SEQUENCE_OFFSET is 8-byte aligned and the word is only
        // ever accessed atomically by every process.
        unsafe { &*(self.map.as_ptr().add(SEQUENCE_OFFSET) as *const AtomicU64) }
    }

    fn timestamp(&self) -> &AtomicU64 {
        // SAFETY: as for `sequence`.
        unsafe { &*(self.map.as_ptr().add(TIMESTAMP_OFFSET) as *const AtomicU64) }
    }

    fn payload_len(&self) -> usize {
        self.header.payload_len as usize
    }
}

/// A named, fixed-shape shared memory segment holding one sample.
///
/// The backing file outlives every process that maps it; it is only
/// removed by [`Segment::release`].
#[derive(Clone)]
pub struct Segment {
    inner: Arc<SegmentInner>,
    retries: u32,
}

impl Segment {
    /// Attach to a segment, creating and zero-initializing it if absent.
    ///
    /// Creation and header checks are serialized across processes with an
    /// exclusive advisory lock on the file. A segment that already exists
    /// with a different shape or dtype is never modified; the call fails
    /// with `SchemaMismatch`.
    pub fn create_or_attach(spec: &SegmentSpec, config: &SegmentConfig) -> Result<Self> {
        let name = config.segment_name(&spec.channel);
        let path = config.path_for(&spec.channel);

        if name.len() > MAX_NAME_LEN {
            return Err(ScaoError::SegmentCreate {
                path,
                cause: format!("Segment name '{name}' exceeds {MAX_NAME_LEN} bytes"),
            });
        }

        std::fs::create_dir_all(&config.directory).map_err(|e| ScaoError::SegmentCreate {
            path: config.directory.clone(),
            cause: e.to_string(),
        })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ScaoError::SegmentCreate {
                path: path.clone(),
                cause: e.to_string(),
            })?;

        file.lock_exclusive().map_err(|e| ScaoError::SegmentCreate {
            path: path.clone(),
            cause: format!("Failed to lock file: {}", e),
        })?;

        let result = Self::init_locked(&file, &path, &name, spec);

        if let Err(e) = fs2::FileExt::unlock(&file) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to unlock segment file");
        }

        let (map, header, created) = result?;

        if created {
            tracing::info!(
                channel = %spec.channel,
                path = %path.display(),
                shape = %header.shape,
                dtype = %header.dtype,
                segment_id = %header.segment_id,
                "Created segment"
            );
        } else {
            tracing::debug!(
                channel = %spec.channel,
                path = %path.display(),
                segment_id = %header.segment_id,
                "Attached to existing segment"
            );
        }

        Ok(Self {
            inner: Arc::new(SegmentInner {
                map,
                _file: file,
                path,
                header,
                channel: spec.channel.clone(),
            }),
            retries: config.snapshot_retries.max(1),
        })
    }

    /// Whether the file has never received a complete header: empty, or
    /// sized by a creator that died before writing the magic.
    fn is_uninitialized(file: &File, path: &Path, len: u64) -> Result<bool> {
        if len == 0 {
            return Ok(true);
        }
        if len < MAGIC_LEN as u64 {
            return Ok(false);
        }
        let mut magic = [0u8; MAGIC_LEN];
        file.read_exact_at(&mut magic, 0)
            .map_err(|e| ScaoError::SegmentCreate {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })?;
        Ok(magic == [0u8; MAGIC_LEN])
    }

    /// Initialize or validate the segment while holding the file lock.
    fn init_locked(
        file: &File,
        path: &Path,
        name: &str,
        spec: &SegmentSpec,
    ) -> Result<(MmapRaw, SegmentHeader, bool)> {
        let len = file
            .metadata()
            .map_err(|e| ScaoError::SegmentCreate {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })?
            .len();

        if Self::is_uninitialized(file, path, len)? {
            if len > 0 {
                tracing::warn!(
                    path = %path.display(),
                    len,
                    "Reinitializing segment left without a header by an earlier creator"
                );
            }
            let header = SegmentHeader::new(name, spec.shape, spec.dtype);
            let header_bytes = header.to_bytes().map_err(|e| ScaoError::SegmentCreate {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })?;

            // Truncating then extending zero-fills: sequence 0 means unwritten.
            let resize = |size: u64| {
                file.set_len(size).map_err(|e| ScaoError::SegmentCreate {
                    path: path.to_path_buf(),
                    cause: e.to_string(),
                })
            };
            resize(0)?;
            resize(header.total_size())?;

            let map = map_raw(file, path, header.total_size())?;

            // The magic goes in last so a creator that dies part way leaves
            // a zero magic, which the next attach reinitializes.
            // SAFETY: the mapping is at least HEADER_SIZE bytes and nobody
            // else can observe it until we release the file lock.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    header_bytes.as_ptr().add(MAGIC_LEN),
                    map.as_mut_ptr().add(MAGIC_LEN),
                    HEADER_SIZE - MAGIC_LEN,
                );
                std::ptr::copy_nonoverlapping(header_bytes.as_ptr(), map.as_mut_ptr(), MAGIC_LEN);
            }

            return Ok((map, header, true));
        }

        if len < PAYLOAD_OFFSET as u64 {
            return Err(ScaoError::SegmentCorruption {
                path: path.to_path_buf(),
                cause: format!("File is {len} bytes, shorter than the segment header"),
            });
        }

        let map = map_raw(file, path, len)?;
        // SAFETY: the header is immutable after creation and the mapping is
        // at least HEADER_SIZE bytes long.
        let header_bytes = unsafe { std::slice::from_raw_parts(map.as_ptr(), HEADER_SIZE) };
        let header =
            SegmentHeader::from_bytes(header_bytes).map_err(|e| ScaoError::SegmentCorruption {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })?;

        header
            .validate()
            .map_err(|e| ScaoError::SegmentCorruption {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })?;

        if !header.matches(spec.shape, spec.dtype) {
            return Err(ScaoError::SchemaMismatch {
                channel: spec.channel.clone(),
                path: path.to_path_buf(),
                expected_shape: spec.shape,
                expected_dtype: spec.dtype,
                found_shape: header.shape,
                found_dtype: header.dtype,
            });
        }

        if len < header.total_size() {
            return Err(ScaoError::SegmentCorruption {
                path: path.to_path_buf(),
                cause: format!(
                    "File is {len} bytes, header requires {}",
                    header.total_size()
                ),
            });
        }

        Ok((map, header, false))
    }

    /// Read a segment's header and control block without attaching.
    pub fn inspect(channel: &str, config: &SegmentConfig) -> Result<SegmentStatus> {
        let path = config.path_for(channel);
        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ScaoError::SegmentNotFound {
                channel: channel.to_string(),
                path: path.clone(),
            },
            _ => ScaoError::SegmentCreate {
                path: path.clone(),
                cause: e.to_string(),
            },
        })?;

        let file_len = file
            .metadata()
            .map_err(|e| ScaoError::SegmentCreate {
                path: path.clone(),
                cause: e.to_string(),
            })?
            .len();

        if file_len < PAYLOAD_OFFSET as u64 {
            return Err(ScaoError::SegmentCorruption {
                path,
                cause: format!("File is {file_len} bytes, shorter than the segment header"),
            });
        }

        // SAFETY: read-only mapping of a file we only inspect; concurrent
        // writers only touch the control block and payload, which we read
        // atomically or not at all.
        let map = unsafe {
            MmapOptions::new()
                .len(PAYLOAD_OFFSET)
                .map(&file)
                .map_err(|e| ScaoError::SegmentMmap {
                    path: path.clone(),
                    cause: e.to_string(),
                })?
        };

        let header =
            SegmentHeader::from_bytes(&map[..HEADER_SIZE]).map_err(|e| {
                ScaoError::SegmentCorruption {
                    path: path.clone(),
                    cause: e.to_string(),
                }
            })?;
        header
            .validate()
            .map_err(|e| ScaoError::SegmentCorruption {
                path: path.clone(),
                cause: e.to_string(),
            })?;

        // SAFETY: offsets are 8-byte aligned within a page-aligned mapping.
        let (seq, ts) = unsafe {
            let base = map.as_ptr();
            let seq = &*(base.add(SEQUENCE_OFFSET) as *const AtomicU64);
            let ts = &*(base.add(TIMESTAMP_OFFSET) as *const AtomicU64);
            (seq.load(Ordering::Acquire), ts.load(Ordering::Relaxed))
        };

        Ok(SegmentStatus {
            path,
            header,
            generation: Generation::from_sequence(seq),
            publishing: seq & 1 == 1,
            timestamp: Timestamp::from_nanos(ts),
            file_len,
        })
    }

    /// Remove a segment's backing file.
    ///
    /// Processes that still map the segment keep their mapping; the next
    /// `create_or_attach` creates a fresh incarnation.
    pub fn release(channel: &str, config: &SegmentConfig) -> Result<()> {
        let path = config.path_for(channel);
        std::fs::remove_file(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ScaoError::SegmentNotFound {
                channel: channel.to_string(),
                path: path.clone(),
            },
            _ => ScaoError::SegmentRelease {
                path: path.clone(),
                cause: e.to_string(),
            },
        })?;
        tracing::info!(channel = %channel, path = %path.display(), "Released segment");
        Ok(())
    }

    /// Channel name (without suffix).
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    /// Header written at creation.
    pub fn header(&self) -> &SegmentHeader {
        &self.inner.header
    }

    /// Payload shape.
    pub fn shape(&self) -> Shape {
        self.inner.header.shape
    }

    /// Payload element type.
    pub fn dtype(&self) -> DType {
        self.inner.header.dtype
    }

    /// Incarnation id.
    pub fn id(&self) -> SegmentId {
        self.inner.header.segment_id
    }

    /// Path to the backing file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Payload size in bytes.
    pub fn payload_len(&self) -> usize {
        self.inner.payload_len()
    }

    /// Latest stable generation.
    pub fn generation(&self) -> Generation {
        Generation::from_sequence(self.inner.sequence().load(Ordering::Acquire))
    }

    /// Create a reader handle.
    pub fn reader(&self) -> SegmentReader {
        SegmentReader {
            inner: Arc::clone(&self.inner),
            retries: self.retries,
        }
    }

    /// Create a writer handle stamping samples with the host monotonic clock.
    ///
    /// Exactly one writer may exist per channel across all processes.
    /// That is a precondition of the run configuration; it is not checked.
    pub fn writer(&self) -> SegmentWriter {
        self.writer_with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Create a writer handle with a custom clock.
    pub fn writer_with_clock(&self, clock: Arc<dyn ClockProvider>) -> SegmentWriter {
        SegmentWriter {
            inner: Arc::clone(&self.inner),
            clock,
        }
    }
}

fn map_raw(file: &File, path: &Path, len: u64) -> Result<MmapRaw> {
    MmapOptions::new()
        .len(len as usize)
        .map_raw(file)
        .map_err(|e| ScaoError::SegmentMmap {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })
}

/// A read handle to a segment.
///
/// Readers never block the writer: a snapshot that races with a publish
/// is discarded and retried.
#[derive(Clone)]
pub struct SegmentReader {
    inner: Arc<SegmentInner>,
    retries: u32,
}

impl SegmentReader {
    /// Copy the latest sample into `dst`.
    ///
    /// The sequence counter is read before and after the copy; the copy is
    /// only accepted if both reads agree and no publish was in flight.
    /// Returns `NotYetWritten` before the first publish and `StaleRead`
    /// once the retry budget is spent.
    pub fn snapshot_into(&self, dst: &mut [u8]) -> Result<SampleMeta> {
        let inner = &*self.inner;
        let len = inner.payload_len();
        if dst.len() != len {
            return Err(ScaoError::PayloadSize {
                channel: inner.channel.clone(),
                expected: len,
                actual: dst.len(),
            });
        }

        let seq = inner.sequence();
        let ts = inner.timestamp();

        for attempt in 1..=self.retries {
            let before = seq.load(Ordering::Acquire);
            if Generation::from_sequence(before).is_unwritten() {
                return Err(ScaoError::NotYetWritten {
                    channel: inner.channel.clone(),
                });
            }
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            // SAFETY: the payload region is `len` bytes past PAYLOAD_OFFSET
            // inside the mapping. The copy may race with a publish; such a
            // copy is detected below and discarded.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    inner.map.as_ptr().add(PAYLOAD_OFFSET),
                    dst.as_mut_ptr(),
                    len,
                );
            }
            let stamp = ts.load(Ordering::Relaxed);

            fence(Ordering::Acquire);
            let after = seq.load(Ordering::Relaxed);

            if before == after {
                return Ok(SampleMeta {
                    generation: Generation::from_sequence(before),
                    timestamp: Timestamp::from_nanos(stamp),
                    attempts: attempt,
                });
            }

            tracing::trace!(
                channel = %inner.channel,
                attempt,
                before,
                after,
                "Snapshot raced with publish, retrying"
            );
            std::hint::spin_loop();
        }

        Err(ScaoError::StaleRead {
            channel: inner.channel.clone(),
            attempts: self.retries,
        })
    }

    /// Latest stable generation, without copying the payload.
    pub fn generation(&self) -> Generation {
        Generation::from_sequence(self.inner.sequence().load(Ordering::Acquire))
    }

    /// Channel name (without suffix).
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    /// Payload shape.
    pub fn shape(&self) -> Shape {
        self.inner.header.shape
    }

    /// Payload element type.
    pub fn dtype(&self) -> DType {
        self.inner.header.dtype
    }

    /// Payload size in bytes.
    pub fn payload_len(&self) -> usize {
        self.inner.payload_len()
    }
}

/// A write handle to a segment.
///
/// `publish` takes `&mut self`, so a handle cannot publish from two
/// threads at once. Not `Clone`.
pub struct SegmentWriter {
    inner: Arc<SegmentInner>,
    clock: Arc<dyn ClockProvider>,
}

impl SegmentWriter {
    /// Publish a payload and return its generation.
    ///
    /// The sequence counter is made odd before the payload is written and
    /// even again, one generation higher, only after the payload and the
    /// timestamp are in place. A segment left odd by a writer that died
    /// mid-publish is repaired by the next publish.
    pub fn publish(&mut self, payload: &[u8]) -> Result<Generation> {
        let inner = &*self.inner;
        let len = inner.payload_len();
        if payload.len() != len {
            return Err(ScaoError::PayloadSize {
                channel: inner.channel.clone(),
                expected: len,
                actual: payload.len(),
            });
        }

        let seq = inner.sequence();
        let start = seq.load(Ordering::Relaxed) | 1;

        seq.store(start, Ordering::Relaxed);
        fence(Ordering::Release);

        // SAFETY: the payload region is `len` bytes past PAYLOAD_OFFSET and
        // this is the only writer; concurrent readers validate their copy
        // against the sequence counter.
        unsafe {
            std::ptr::copy_nonoverlapping(
                payload.as_ptr(),
                inner.map.as_mut_ptr().add(PAYLOAD_OFFSET),
                len,
            );
        }
        inner
            .timestamp()
            .store(self.clock.now().as_nanos(), Ordering::Relaxed);

        let end = start + 1;
        seq.store(end, Ordering::Release);

        Ok(Generation::from_sequence(end))
    }

    /// Latest stable generation.
    pub fn generation(&self) -> Generation {
        Generation::from_sequence(self.inner.sequence().load(Ordering::Acquire))
    }

    /// Channel name (without suffix).
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    /// Payload shape.
    pub fn shape(&self) -> Shape {
        self.inner.header.shape
    }

    /// Payload element type.
    pub fn dtype(&self) -> DType {
        self.inner.header.dtype
    }

    /// Payload size in bytes.
    pub fn payload_len(&self) -> usize {
        self.inner.payload_len()
    }

    /// A reader over the same mapping.
    pub fn reader(&self) -> SegmentReader {
        SegmentReader {
            inner: Arc::clone(&self.inner),
            retries: DEFAULT_SNAPSHOT_RETRIES,
        }
    }
}
