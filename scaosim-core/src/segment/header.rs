//! Segment header structure.

use crate::types::{DType, ElementOrder, MAX_DIMS, SegmentId, Shape};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Magic number for scaosim segment files ("SCAOSEG\0" little-endian).
pub const SEGMENT_MAGIC: u64 = 0x0047_4553_4F41_4353;

/// Current segment format version.
pub const SEGMENT_VERSION: u32 = 1;

/// Fixed size of the segment header in bytes.
pub const HEADER_SIZE: usize = 128;

/// Longest channel name (with suffix) that fits in the header.
pub const MAX_NAME_LEN: usize = 32;

/// Offset of the atomic sequence counter.
pub const SEQUENCE_OFFSET: usize = HEADER_SIZE;

/// Offset of the atomic sample timestamp.
pub const TIMESTAMP_OFFSET: usize = HEADER_SIZE + 8;

/// Offset of the payload. The control block gets its own cache line.
pub const PAYLOAD_OFFSET: usize = HEADER_SIZE + 64;

/// Segment file header.
///
/// Written once when the segment is created and never modified after.
/// It carries enough of the array schema (dtype, shape, element order)
/// for an attaching process to refuse memory it would misinterpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Magic number for file identification.
    pub magic: u64,
    /// Segment format version.
    pub version: u32,
    /// Element type of the payload.
    pub dtype: DType,
    /// Memory order of the payload.
    pub order: ElementOrder,
    /// Payload shape.
    pub shape: Shape,
    /// Payload size in bytes.
    pub payload_len: u64,
    /// Incarnation of this segment.
    pub segment_id: SegmentId,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
    /// Channel name, including any configured suffix.
    pub name: String,
}

impl SegmentHeader {
    /// Create a header for a fresh segment.
    pub fn new(name: &str, shape: Shape, dtype: DType) -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            magic: SEGMENT_MAGIC,
            version: SEGMENT_VERSION,
            dtype,
            order: ElementOrder::RowMajor,
            shape,
            payload_len: shape.byte_len(dtype) as u64,
            segment_id: SegmentId::new(),
            created_at: now,
            name: name.to_string(),
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.magic != SEGMENT_MAGIC {
            return Err("Invalid magic number");
        }
        if self.version != SEGMENT_VERSION {
            return Err("Unsupported segment version");
        }
        if self.payload_len != self.shape.byte_len(self.dtype) as u64 {
            return Err("Payload length does not match shape and dtype");
        }
        Ok(())
    }

    /// Total file size needed for this header's payload.
    pub fn total_size(&self) -> u64 {
        PAYLOAD_OFFSET as u64 + self.payload_len
    }

    /// Check whether this segment stores the given schema.
    pub fn matches(&self, shape: Shape, dtype: DType) -> bool {
        self.shape == shape && self.dtype == dtype && self.order == ElementOrder::RowMajor
    }

    /// Read header from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Buffer too small for header",
            ));
        }

        let mut cursor = io::Cursor::new(bytes);

        let magic = cursor.read_u64::<LittleEndian>()?;
        let version = cursor.read_u32::<LittleEndian>()?;
        let dtype_code = cursor.read_u32::<LittleEndian>()?;
        let order_code = cursor.read_u32::<LittleEndian>()?;
        let ndim = cursor.read_u32::<LittleEndian>()? as usize;

        let mut dims = [0u64; MAX_DIMS];
        cursor.read_u64_into::<LittleEndian>(&mut dims)?;

        let payload_len = cursor.read_u64::<LittleEndian>()?;

        let mut id_bytes = [0u8; 16];
        cursor.read_exact(&mut id_bytes)?;

        let created_at = cursor.read_u64::<LittleEndian>()?;
        let name_len = cursor.read_u32::<LittleEndian>()? as usize;
        let _reserved = cursor.read_u32::<LittleEndian>()?;

        let mut name_bytes = [0u8; MAX_NAME_LEN];
        cursor.read_exact(&mut name_bytes)?;

        let invalid = |msg: String| io::Error::new(io::ErrorKind::InvalidData, msg);

        let dtype = DType::from_code(dtype_code)
            .ok_or_else(|| invalid(format!("Unknown dtype code {dtype_code}")))?;
        let order = ElementOrder::from_code(order_code)
            .ok_or_else(|| invalid(format!("Unknown element order {order_code}")))?;
        if ndim == 0 || ndim > MAX_DIMS {
            return Err(invalid(format!("Unsupported rank {ndim}")));
        }
        let shape = Shape::new(&dims[..ndim]);
        if name_len > MAX_NAME_LEN {
            return Err(invalid(format!("Name length {name_len} exceeds {MAX_NAME_LEN}")));
        }
        let name = std::str::from_utf8(&name_bytes[..name_len])
            .map_err(|e| invalid(e.to_string()))?
            .to_string();

        Ok(Self {
            magic,
            version,
            dtype,
            order,
            shape,
            payload_len,
            segment_id: SegmentId::from_bytes(id_bytes),
            created_at,
            name,
        })
    }

    /// Write header to a byte buffer.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        if self.name.len() > MAX_NAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Segment name '{}' exceeds {MAX_NAME_LEN} bytes", self.name),
            ));
        }

        let mut buf = Vec::with_capacity(HEADER_SIZE);

        buf.write_u64::<LittleEndian>(self.magic)?;
        buf.write_u32::<LittleEndian>(self.version)?;
        buf.write_u32::<LittleEndian>(self.dtype.code())?;
        buf.write_u32::<LittleEndian>(self.order.code())?;
        buf.write_u32::<LittleEndian>(self.shape.ndim() as u32)?;
        for i in 0..MAX_DIMS {
            buf.write_u64::<LittleEndian>(self.shape.dims().get(i).copied().unwrap_or(0))?;
        }
        buf.write_u64::<LittleEndian>(self.payload_len)?;
        buf.write_all(self.segment_id.as_bytes())?;
        buf.write_u64::<LittleEndian>(self.created_at)?;
        buf.write_u32::<LittleEndian>(self.name.len() as u32)?;
        buf.write_u32::<LittleEndian>(0)?; // reserved

        let mut name_bytes = [0u8; MAX_NAME_LEN];
        name_bytes[..self.name.len()].copy_from_slice(self.name.as_bytes());
        buf.write_all(&name_bytes)?;

        debug_assert_eq!(buf.len(), HEADER_SIZE);

        Ok(buf)
    }
}
