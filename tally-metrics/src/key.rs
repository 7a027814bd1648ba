use std::fmt;

use crate::protocol::Dimensions;

/// Rendered in place of an empty dimension value.
pub const NO_VALUE_PLACEHOLDER: &str = "n/a";

/// Joins the metric name and its tags in the rendered form of a [`MetricKey`].
const KEY_SEPARATOR: &str = "}{";

/// Renders dimensions as sorted `key:value` tags.
///
/// Empty values are rendered as [`NO_VALUE_PLACEHOLDER`] instead of being dropped, so that a
/// dimension that is present without a value still shows up in the tags.
///
/// # Example
///
/// ```
/// use tally_metrics::{Dimensions, dimension_tags};
///
/// let dimensions = Dimensions::from([
///     ("key2".to_owned(), "val2".to_owned()),
///     ("key1".to_owned(), String::new()),
/// ]);
///
/// assert_eq!(dimension_tags(&dimensions), ["key1:n/a", "key2:val2"]);
/// ```
pub fn dimension_tags(dimensions: &Dimensions) -> Vec<String> {
    let mut tags: Vec<String> = dimensions
        .iter()
        .map(|(key, value)| match value.as_str() {
            "" => format!("{key}:{NO_VALUE_PLACEHOLDER}"),
            value => format!("{key}:{value}"),
        })
        .collect();

    tags.sort_unstable();
    tags
}

/// The identity of a time series: the metric name plus its full set of dimensions.
///
/// Keys are independent of the order in which dimensions are given. Two keys are equal if and only
/// if their names are equal and their dimensions are equal. Names, dimension keys and values are
/// compared as they are, so no choice of characters can make two different series collide.
///
/// The [`Display`](fmt::Display) form renders the dimensions as [`dimension_tags`] and is meant
/// for logs only. It is not unique.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MetricKey {
    name: String,
    dimensions: Dimensions,
}

impl MetricKey {
    /// Creates a key from a metric name and dimension pairs in arbitrary order.
    ///
    /// If a dimension key is given more than once, the last value wins.
    pub fn new<K, V>(name: impl Into<String>, dimensions: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            dimensions: dimensions
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Creates a key from a metric name and its dimensions.
    pub fn from_dimensions(name: &str, dimensions: &Dimensions) -> Self {
        Self {
            name: name.to_owned(),
            dimensions: dimensions.clone(),
        }
    }

    /// Returns the metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the dimensions identifying the series within the metric.
    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for tag in dimension_tags(&self.dimensions) {
            write!(f, "{KEY_SEPARATOR}{tag}")?;
        }
        Ok(())
    }
}
