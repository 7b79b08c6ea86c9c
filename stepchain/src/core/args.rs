//! Untyped argument bundles passed between pipeline steps.

use crate::errors::StepError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use serde_json::Value;

/// An ordered bundle of untyped values threaded from one step to the next.
///
/// Each value is a [`serde_json::Value`]. Steps read positional arguments
/// with [`Args::get`], which reports a [`StepError`] instead of panicking
/// when the bundle does not have the shape the step expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args {
    values: Vec<Value>,
}

impl Args {
    /// Creates an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bundle from already-converted values.
    #[must_use]
    pub fn from_values(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Appends a value.
    #[must_use]
    pub fn with(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Appends a value.
    pub fn push(&mut self, value: impl Into<Value>) {
        self.values.push(value.into());
    }

    /// Serializes and appends any `Serialize` value.
    pub fn push_serialized<S: Serialize>(&mut self, value: &S) -> Result<(), StepError> {
        let index = self.values.len();
        let value = serde_json::to_value(value).map_err(|e| StepError::ArgumentMismatch {
            index,
            expected: std::any::type_name::<S>(),
            reason: e.to_string(),
        })?;
        self.values.push(value);
        Ok(())
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the bundle holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the raw value at `index`.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Reads the value at `index` as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::MissingArgument`] when the bundle is too short and
    /// [`StepError::ArgumentMismatch`] when the value cannot be read as `T`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, StepError> {
        let value = self.values.get(index).ok_or(StepError::MissingArgument {
            index,
            len: self.values.len(),
        })?;

        T::deserialize(value).map_err(|e| StepError::ArgumentMismatch {
            index,
            expected: std::any::type_name::<T>(),
            reason: e.to_string(),
        })
    }

    /// Iterates over the raw values.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    /// Consumes the bundle, returning the raw values.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self::from_values(values)
    }
}

impl FromIterator<Value> for Args {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Args {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a Args {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Builds an [`Args`] bundle from a list of values convertible into
/// [`Value`](serde_json::Value).
///
/// ```rust
/// use stepchain::args;
///
/// let args = args![5, "five", true];
/// assert_eq!(args.len(), 3);
/// assert_eq!(args.get::<i64>(0).unwrap(), 5);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::core::Args::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::core::Args::from_values(::std::vec![$($crate::core::Value::from($value)),+])
    };
}
