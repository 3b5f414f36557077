//! Tensor statistics
//!
//! Decodes a raw little-endian tensor buffer into the summary values watch
//! conditions are checked against.

use half::f16;
use tensorwatch_shared::DataType;

/// Min / max / mean over the finite elements of a tensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiniteRange {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Summary of a tensor's values
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TensorStatistics {
    /// Number of decoded elements
    pub count: usize,
    pub has_nan: bool,
    pub has_inf: bool,
    /// `None` when no element is finite (or the tensor is empty)
    pub finite: Option<FiniteRange>,
}

impl TensorStatistics {
    /// Compute statistics for a buffer of the given element type
    ///
    /// Trailing bytes that do not form a whole element are ignored. Types
    /// without a numeric interpretation produce empty statistics.
    pub fn from_bytes(data: &[u8], data_type: DataType) -> Self {
        let mut acc = Accumulator::default();
        match data_type {
            DataType::Bool => data.iter().for_each(|&b| acc.push(f64::from(u8::from(b != 0)))),
            DataType::Int8 => data.iter().for_each(|&b| acc.push(f64::from(b as i8))),
            DataType::UInt8 => data.iter().for_each(|&b| acc.push(f64::from(b))),
            DataType::Int16 => {
                decode::<2>(data, |b| f64::from(i16::from_le_bytes(b)), &mut acc)
            }
            DataType::UInt16 => {
                decode::<2>(data, |b| f64::from(u16::from_le_bytes(b)), &mut acc)
            }
            DataType::Float16 => {
                decode::<2>(data, |b| f64::from(f16::from_le_bytes(b)), &mut acc)
            }
            DataType::Int32 => {
                decode::<4>(data, |b| f64::from(i32::from_le_bytes(b)), &mut acc)
            }
            DataType::UInt32 => {
                decode::<4>(data, |b| f64::from(u32::from_le_bytes(b)), &mut acc)
            }
            DataType::Float32 => {
                decode::<4>(data, |b| f64::from(f32::from_le_bytes(b)), &mut acc)
            }
            DataType::Int64 => decode::<8>(data, |b| i64::from_le_bytes(b) as f64, &mut acc),
            DataType::UInt64 => decode::<8>(data, |b| u64::from_le_bytes(b) as f64, &mut acc),
            DataType::Float64 => decode::<8>(data, f64::from_le_bytes, &mut acc),
            DataType::Unknown | DataType::Opaque => {}
        }
        acc.finish()
    }
}

fn decode<const N: usize>(data: &[u8], convert: impl Fn([u8; N]) -> f64, acc: &mut Accumulator) {
    for chunk in data.chunks_exact(N) {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(chunk);
        acc.push(convert(bytes));
    }
}

#[derive(Default)]
struct Accumulator {
    count: usize,
    has_nan: bool,
    has_inf: bool,
    finite_count: usize,
    sum: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        self.count += 1;
        if value.is_nan() {
            self.has_nan = true;
            return;
        }
        if value.is_infinite() {
            self.has_inf = true;
            return;
        }
        if self.finite_count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.finite_count += 1;
        self.sum += value;
    }

    fn finish(self) -> TensorStatistics {
        let finite = (self.finite_count > 0).then(|| FiniteRange {
            min: self.min,
            max: self.max,
            mean: self.sum / self.finite_count as f64,
        });
        TensorStatistics {
            count: self.count,
            has_nan: self.has_nan,
            has_inf: self.has_inf,
            finite,
        }
    }
}
