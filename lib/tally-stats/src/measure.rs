//! Measures.
use std::{fmt, sync::Arc};

use snafu::ensure;

use crate::error::{InvalidName, ViewDefinitionError};

/// Maximum length of a measure or view name, in characters.
pub const NAME_MAX_LENGTH: usize = 255;

pub(crate) fn validate_name(kind: &'static str, name: &str) -> Result<(), ViewDefinitionError> {
    ensure!(
        !name.is_empty() && name.len() <= NAME_MAX_LENGTH && name.bytes().all(|b| (b' '..=b'~').contains(&b)),
        InvalidName {
            kind,
            name,
            max_len: NAME_MAX_LENGTH,
        }
    );
    Ok(())
}

/// The kind of values a measure records.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MeasureKind {
    /// Integer values.
    ///
    /// Sums and last values over integer measures are reported as integers.
    Int64,

    /// Floating-point values.
    Float64,
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct Inner {
    name: String,
    description: String,
    unit: String,
    kind: MeasureKind,
}

/// A named, typed quantity that values can be recorded against.
///
/// Two measures are equal when every part of their definition is equal.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Measure {
    inner: Arc<Inner>,
}

impl Measure {
    /// Creates a new integer-valued measure.
    ///
    /// # Errors
    ///
    /// If the name is empty, longer than [`NAME_MAX_LENGTH`], or contains characters which are not printable ASCII,
    /// an error is returned.
    pub fn int64<N, D, U>(name: N, description: D, unit: U) -> Result<Self, ViewDefinitionError>
    where
        N: Into<String>,
        D: Into<String>,
        U: Into<String>,
    {
        Self::new(name.into(), description.into(), unit.into(), MeasureKind::Int64)
    }

    /// Creates a new floating-point-valued measure.
    ///
    /// # Errors
    ///
    /// If the name is empty, longer than [`NAME_MAX_LENGTH`], or contains characters which are not printable ASCII,
    /// an error is returned.
    pub fn float64<N, D, U>(name: N, description: D, unit: U) -> Result<Self, ViewDefinitionError>
    where
        N: Into<String>,
        D: Into<String>,
        U: Into<String>,
    {
        Self::new(name.into(), description.into(), unit.into(), MeasureKind::Float64)
    }

    fn new(name: String, description: String, unit: String, kind: MeasureKind) -> Result<Self, ViewDefinitionError> {
        validate_name("measure", &name)?;
        Ok(Self {
            inner: Arc::new(Inner {
                name,
                description,
                unit,
                kind,
            }),
        })
    }

    /// Returns the name of the measure.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the description of the measure.
    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// Returns the unit of the measure, such as `ms` or `By`.
    pub fn unit(&self) -> &str {
        &self.inner.unit
    }

    /// Returns the kind of values this measure records.
    pub fn kind(&self) -> MeasureKind {
        self.inner.kind
    }
}

impl fmt::Debug for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Measure")
            .field("name", &self.inner.name)
            .field("unit", &self.inner.unit)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

/// A single recorded value for a measure.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    measure: Measure,
    value: f64,
}

impl Measurement {
    pub(crate) fn new(measure: Measure, value: f64) -> Self {
        Self { measure, value }
    }

    /// Returns the measure this value was recorded for.
    pub fn measure(&self) -> &Measure {
        &self.measure
    }

    /// Returns the recorded value.
    pub fn value(&self) -> f64 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        let cases = [
            ("", false),
            ("latency", true),
            ("grpc.io/client/roundtrip_latency", true),
            ("with space", true),
            ("tab\there", false),
            ("caf\u{e9}", false),
        ];

        for (name, valid) in cases {
            assert_eq!(
                Measure::float64(name, "", "ms").is_ok(),
                valid,
                "unexpected validation result for {:?}",
                name
            );
        }

        let longest = "a".repeat(NAME_MAX_LENGTH);
        assert!(Measure::int64(longest.as_str(), "", "1").is_ok());
        let too_long = "a".repeat(NAME_MAX_LENGTH + 1);
        assert!(matches!(
            Measure::int64(too_long, "", "1"),
            Err(ViewDefinitionError::InvalidName { kind: "measure", .. })
        ));
    }

    #[test]
    fn equality_is_by_definition() {
        let a = Measure::int64("requests", "Requests served", "1").unwrap();
        let b = Measure::int64("requests", "Requests served", "1").unwrap();
        let c = Measure::float64("requests", "Requests served", "1").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.kind(), MeasureKind::Int64);
        assert_eq!(c.kind(), MeasureKind::Float64);
    }
}
