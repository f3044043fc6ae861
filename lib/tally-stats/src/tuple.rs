use std::fmt;

use tally_context::{TagContext, TagKey, TagValue};

/// The values of a view's columns, in column order.
///
/// A tag tuple is the key that aggregated data is broken down by. A column with no matching tag in the recorded tag
/// context is represented by `None`.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TagTuple(Vec<Option<TagValue>>);

impl TagTuple {
    /// Creates a tag tuple from the given column values.
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<V>>,
        V: Into<TagValue>,
    {
        Self(values.into_iter().map(|v| v.map(Into::into)).collect())
    }

    /// Projects a tag context onto the given columns.
    pub fn project(context: &TagContext, columns: &[TagKey]) -> Self {
        Self(columns.iter().map(|key| context.get(key).cloned()).collect())
    }

    /// Returns the column values.
    pub fn values(&self) -> &[Option<TagValue>] {
        &self.0
    }

    /// Returns the number of columns in the tuple.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the tuple has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TagTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match value {
                Some(value) => write!(f, "{}", value)?,
                None => f.write_str("-")?,
            }
        }
        f.write_str("]")
    }
}
