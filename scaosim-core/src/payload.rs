//! Typed payloads exchanged through segments.
//!
//! Payloads are fixed-shape arrays encoded little-endian, row-major. The
//! `Payload` trait ties each Rust type to the dtype recorded in the
//! segment header, so a channel cannot be read back as the wrong type
//! without tripping the schema check.

use crate::types::{DType, Shape};
use byteorder::{ByteOrder, LittleEndian};

/// A value that can be published into a segment.
pub trait Payload: Sized {
    /// Element type stored in the segment.
    const DTYPE: DType;

    /// Shape of this value.
    fn shape(&self) -> Shape;

    /// Encode into `dst`, which is exactly `shape().byte_len(DTYPE)` long.
    fn encode_into(&self, dst: &mut [u8]);

    /// Decode a value of the given shape from `src`.
    fn decode(shape: Shape, src: &[u8]) -> Result<Self, String>;
}

/// Per-sub-aperture wavefront gradients, `(n_valid, 2)` as (x, y) pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct SlopeVector {
    values: Vec<f32>,
}

impl SlopeVector {
    /// All-zero slopes for `n` sub-apertures.
    pub fn zeros(n: usize) -> Self {
        Self {
            values: vec![0.0; n * 2],
        }
    }

    /// Build from (x, y) pairs.
    pub fn from_pairs(pairs: &[[f32; 2]]) -> Self {
        Self {
            values: pairs.iter().flatten().copied().collect(),
        }
    }

    /// Build from separate x and y slices of equal length.
    ///
    /// # Panics
    /// Panics if the lengths differ.
    pub fn from_xy(x: &[f32], y: &[f32]) -> Self {
        assert_eq!(x.len(), y.len(), "x and y slope counts differ");
        let values = x.iter().zip(y).flat_map(|(&sx, &sy)| [sx, sy]).collect();
        Self { values }
    }

    /// Number of sub-apertures.
    pub fn len(&self) -> usize {
        self.values.len() / 2
    }

    /// Check if there are no sub-apertures.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Slope pair of sub-aperture `i`.
    pub fn pair(&self, i: usize) -> [f32; 2] {
        [self.values[2 * i], self.values[2 * i + 1]]
    }

    /// Iterate over (x, y) pairs.
    pub fn pairs(&self) -> impl Iterator<Item = [f32; 2]> + '_ {
        self.values.chunks_exact(2).map(|c| [c[0], c[1]])
    }

    /// Interleaved x, y values.
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Mutable interleaved x, y values.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.values
    }

    /// Population standard deviation of all slope values.
    pub fn std(&self) -> f64 {
        population_std(&self.values)
    }
}

impl Payload for SlopeVector {
    const DTYPE: DType = DType::F32;

    fn shape(&self) -> Shape {
        Shape::matrix(self.len(), 2)
    }

    fn encode_into(&self, dst: &mut [u8]) {
        LittleEndian::write_f32_into(&self.values, dst);
    }

    fn decode(shape: Shape, src: &[u8]) -> Result<Self, String> {
        if shape.ndim() != 2 || shape.dims()[1] != 2 {
            return Err(format!("slope vector must have shape (n, 2), got {shape}"));
        }
        let mut values = vec![0.0f32; shape.len()];
        check_len(src, values.len() * 4)?;
        LittleEndian::read_f32_into(src, &mut values);
        Ok(Self { values })
    }
}

/// A 2-D grid of phase values, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseMap {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl PhaseMap {
    /// All-zero map.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Wrap row-major data; `None` if the length does not match.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { rows, cols, data })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Value at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    /// Set the value at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col] = value;
    }

    /// Row-major values.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable row-major values.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Zero every element outside `mask` (row-major, same length).
    pub fn apply_mask(&mut self, mask: &[bool]) {
        for (v, &m) in self.data.iter_mut().zip(mask) {
            if !m {
                *v = 0.0;
            }
        }
    }

    /// Population standard deviation of the values inside `mask`.
    pub fn masked_std(&self, mask: &[bool]) -> f64 {
        let inside: Vec<f32> = self
            .data
            .iter()
            .zip(mask)
            .filter_map(|(&v, &m)| m.then_some(v))
            .collect();
        population_std(&inside)
    }
}

impl Payload for PhaseMap {
    const DTYPE: DType = DType::F32;

    fn shape(&self) -> Shape {
        Shape::matrix(self.rows, self.cols)
    }

    fn encode_into(&self, dst: &mut [u8]) {
        LittleEndian::write_f32_into(&self.data, dst);
    }

    fn decode(shape: Shape, src: &[u8]) -> Result<Self, String> {
        if shape.ndim() != 2 {
            return Err(format!("phase map must be 2-D, got {shape}"));
        }
        let (rows, cols) = (shape.dims()[0] as usize, shape.dims()[1] as usize);
        let mut data = vec![0.0f32; rows * cols];
        check_len(src, data.len() * 4)?;
        LittleEndian::read_f32_into(src, &mut data);
        Ok(Self { rows, cols, data })
    }
}

/// Valid sub-aperture map, `(nsubx, nsubx)` with 1 = valid.
///
/// Valid sub-apertures are ordered row-major; that order is the order of
/// pairs in the slope vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubapertureMask {
    nsubx: usize,
    valid: Vec<bool>,
}

impl SubapertureMask {
    /// Build from a row-major validity grid.
    ///
    /// # Panics
    /// Panics if `valid.len() != nsubx * nsubx`.
    pub fn new(nsubx: usize, valid: Vec<bool>) -> Self {
        assert_eq!(valid.len(), nsubx * nsubx, "mask must be nsubx × nsubx");
        Self { nsubx, valid }
    }

    /// Sub-apertures across the diameter.
    pub fn nsubx(&self) -> usize {
        self.nsubx
    }

    /// Whether sub-aperture (row, col) is valid.
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid[row * self.nsubx + col]
    }

    /// Number of valid sub-apertures.
    pub fn count_valid(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// (row, col) of each valid sub-aperture in slope order.
    pub fn valid_indices(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let n = self.nsubx;
        self.valid
            .iter()
            .enumerate()
            .filter(|(_, v)| **v)
            .map(move |(i, _)| (i / n, i % n))
    }

    /// Row-major validity grid.
    pub fn as_slice(&self) -> &[bool] {
        &self.valid
    }
}

impl Payload for SubapertureMask {
    const DTYPE: DType = DType::U8;

    fn shape(&self) -> Shape {
        Shape::matrix(self.nsubx, self.nsubx)
    }

    fn encode_into(&self, dst: &mut [u8]) {
        for (d, &v) in dst.iter_mut().zip(&self.valid) {
            *d = u8::from(v);
        }
    }

    fn decode(shape: Shape, src: &[u8]) -> Result<Self, String> {
        if shape.ndim() != 2 || shape.dims()[0] != shape.dims()[1] {
            return Err(format!("sub-aperture mask must be square, got {shape}"));
        }
        check_len(src, shape.len())?;
        Ok(Self {
            nsubx: shape.dims()[0] as usize,
            valid: src.iter().map(|&b| b != 0).collect(),
        })
    }
}

fn check_len(src: &[u8], expected: usize) -> Result<(), String> {
    if src.len() != expected {
        return Err(format!("expected {expected} bytes, got {}", src.len()));
    }
    Ok(())
}

pub(crate) fn population_std(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt()
}
