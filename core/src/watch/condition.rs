//! Watch condition definitions
//!
//! A condition is a kind plus its parameter. Each kind has a pure check
//! against [`TensorStatistics`]; overflow is decided by the evaluator from the
//! platform's overflow artifacts instead.

use tensorwatch_shared::ConditionSpec;

use super::stats::TensorStatistics;

/// Condition a watched tensor is checked against
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WatchCondition {
    /// Any element is NaN
    Nan,
    /// Any element is +/- infinity
    Inf,
    /// The owning operator overflowed on the device
    Overflow,
    MaxGt(f32),
    MaxLt(f32),
    MinGt(f32),
    MinLt(f32),
    /// `max - min` greater than the parameter
    MaxMinGt(f32),
    /// `max - min` less than the parameter
    MaxMinLt(f32),
    MeanGt(f32),
    MeanLt(f32),
}

/// Condition kind code not known to this debugger
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("unknown watch condition kind {0}")]
pub struct ConditionError(pub i32);

impl WatchCondition {
    /// Wire code of this condition kind
    pub fn kind_code(&self) -> i32 {
        match self {
            Self::Nan => 0,
            Self::Inf => 1,
            Self::Overflow => 2,
            Self::MaxGt(_) => 3,
            Self::MaxLt(_) => 4,
            Self::MinGt(_) => 5,
            Self::MinLt(_) => 6,
            Self::MaxMinGt(_) => 7,
            Self::MaxMinLt(_) => 8,
            Self::MeanGt(_) => 9,
            Self::MeanLt(_) => 10,
        }
    }

    /// Threshold parameter (0.0 for kinds without one)
    pub fn parameter(&self) -> f32 {
        match *self {
            Self::Nan | Self::Inf | Self::Overflow => 0.0,
            Self::MaxGt(v)
            | Self::MaxLt(v)
            | Self::MinGt(v)
            | Self::MinLt(v)
            | Self::MaxMinGt(v)
            | Self::MaxMinLt(v)
            | Self::MeanGt(v)
            | Self::MeanLt(v) => v,
        }
    }

    /// Whether this kind is decided from overflow artifacts
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow)
    }

    /// Human-readable kind name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nan => "nan",
            Self::Inf => "inf",
            Self::Overflow => "overflow",
            Self::MaxGt(_) => "max_gt",
            Self::MaxLt(_) => "max_lt",
            Self::MinGt(_) => "min_gt",
            Self::MinLt(_) => "min_lt",
            Self::MaxMinGt(_) => "max_min_gt",
            Self::MaxMinLt(_) => "max_min_lt",
            Self::MeanGt(_) => "mean_gt",
            Self::MeanLt(_) => "mean_lt",
        }
    }

    /// Check the condition against materialized tensor statistics
    ///
    /// Threshold kinds need at least one finite element. `Overflow` never
    /// matches here.
    pub fn check(&self, stats: &TensorStatistics) -> bool {
        if let Self::Nan = self {
            return stats.has_nan;
        }
        if let Self::Inf = self {
            return stats.has_inf;
        }
        let Some(range) = stats.finite else {
            return false;
        };
        match *self {
            Self::Nan | Self::Inf | Self::Overflow => false,
            Self::MaxGt(v) => range.max > f64::from(v),
            Self::MaxLt(v) => range.max < f64::from(v),
            Self::MinGt(v) => range.min > f64::from(v),
            Self::MinLt(v) => range.min < f64::from(v),
            Self::MaxMinGt(v) => range.max - range.min > f64::from(v),
            Self::MaxMinLt(v) => range.max - range.min < f64::from(v),
            Self::MeanGt(v) => range.mean > f64::from(v),
            Self::MeanLt(v) => range.mean < f64::from(v),
        }
    }
}

impl TryFrom<ConditionSpec> for WatchCondition {
    type Error = ConditionError;

    fn try_from(spec: ConditionSpec) -> Result<Self, Self::Error> {
        let v = spec.value;
        Ok(match spec.kind {
            0 => Self::Nan,
            1 => Self::Inf,
            2 => Self::Overflow,
            3 => Self::MaxGt(v),
            4 => Self::MaxLt(v),
            5 => Self::MinGt(v),
            6 => Self::MinLt(v),
            7 => Self::MaxMinGt(v),
            8 => Self::MaxMinLt(v),
            9 => Self::MeanGt(v),
            10 => Self::MeanLt(v),
            other => return Err(ConditionError(other)),
        })
    }
}

impl From<WatchCondition> for ConditionSpec {
    fn from(condition: WatchCondition) -> Self {
        ConditionSpec {
            kind: condition.kind_code(),
            value: condition.parameter(),
        }
    }
}

impl std::fmt::Display for WatchCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nan | Self::Inf | Self::Overflow => f.write_str(self.name()),
            _ => write!(f, "{}({})", self.name(), self.parameter()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::stats::TensorStatistics;
    use tensorwatch_shared::DataType;

    fn f32_stats(values: &[f32]) -> TensorStatistics {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        TensorStatistics::from_bytes(&bytes, DataType::Float32)
    }

    #[test]
    fn test_decode_all_kinds() {
        for kind in 0..=10 {
            let spec = ConditionSpec { kind, value: 1.5 };
            let condition = WatchCondition::try_from(spec).unwrap();
            assert_eq!(condition.kind_code(), kind);
            let back = ConditionSpec::from(condition);
            assert_eq!(back.kind, kind);
        }
    }

    #[test]
    fn test_decode_unknown_kind() {
        let spec = ConditionSpec { kind: 42, value: 0.0 };
        assert_eq!(WatchCondition::try_from(spec), Err(ConditionError(42)));
    }

    #[test]
    fn test_nan_and_inf() {
        let stats = f32_stats(&[1.0, f32::NAN, 2.0]);
        assert!(WatchCondition::Nan.check(&stats));
        assert!(!WatchCondition::Inf.check(&stats));

        let stats = f32_stats(&[f32::NEG_INFINITY, 0.0]);
        assert!(WatchCondition::Inf.check(&stats));
        assert!(!WatchCondition::Nan.check(&stats));
    }

    #[test]
    fn test_thresholds() {
        let stats = f32_stats(&[-2.0, 0.0, 5.0]);
        assert!(WatchCondition::MaxGt(4.0).check(&stats));
        assert!(!WatchCondition::MaxLt(4.0).check(&stats));
        assert!(WatchCondition::MinLt(-1.0).check(&stats));
        assert!(!WatchCondition::MinGt(-1.0).check(&stats));
        assert!(WatchCondition::MaxMinGt(6.5).check(&stats));
        assert!(WatchCondition::MaxMinLt(7.5).check(&stats));
        assert!(WatchCondition::MeanGt(0.5).check(&stats));
        assert!(WatchCondition::MeanLt(1.5).check(&stats));
    }

    #[test]
    fn test_thresholds_ignore_non_finite() {
        let stats = f32_stats(&[f32::NAN, f32::INFINITY]);
        assert!(!WatchCondition::MaxGt(-1000.0).check(&stats));
        assert!(!WatchCondition::MeanLt(1000.0).check(&stats));
    }

    #[test]
    fn test_overflow_never_checked_by_stats() {
        let stats = f32_stats(&[f32::INFINITY]);
        assert!(!WatchCondition::Overflow.check(&stats));
        assert!(WatchCondition::Overflow.is_overflow());
    }

    #[test]
    fn test_display() {
        assert_eq!(WatchCondition::Nan.to_string(), "nan");
        assert_eq!(WatchCondition::MaxGt(2.5).to_string(), "max_gt(2.5)");
    }
}
