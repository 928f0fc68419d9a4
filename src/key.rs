//! Metric keys and their canonical names.
//!
//! Every metric is recorded under a [`MetricKey`].  Plain keys (integers,
//! strings and sequences) format to exactly one dot separated name.  A tag
//! mapping expands to one name per combination of its tags, where every tag is
//! either rendered with its value or replaced by a wildcard:
//!
//! ```
//! use statsum::{expand_key, MetricKey};
//!
//! let key = MetricKey::tags([("method", "GET"), ("status", "200")]);
//! let names: Vec<_> = expand_key(&key).unwrap().collect();
//! assert_eq!(
//!     names,
//!     [
//!         "method:GET.status:200",
//!         "method:GET.all-status",
//!         "all-method.status:200",
//!         "all-method.all-status",
//!     ]
//! );
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use thiserror::Error;

/// Separator between the segments of a metric name.
pub const SEPARATOR: char = '.';

/// The maximum number of tags in a tag mapping.
///
/// Each tag doubles the number of names a key expands to, so five tags already
/// produce 32 series per recorded value.
pub const MAX_TAGS: usize = 5;

const WILDCARD_PREFIX: &str = "all-";

/// Raised if a key cannot be turned into metric names.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The key has a shape that cannot appear at this position.
    #[error("key type: {shape} is not supported here")]
    Unsupported {
        /// The offending shape.
        shape: &'static str,
    },
    /// The tag mapping has more than [`MAX_TAGS`] tags.
    #[error(
        "key {key} may not have more than {max} tags (got {tags:?}), as this would give more \
         than {combinations} combinations; identify combinations you do not care about and \
         simplify the tags accordingly",
        max = MAX_TAGS,
        combinations = 1usize << MAX_TAGS
    )]
    TooManyTags {
        /// A rendering of the offending key.
        key: String,
        /// The tags of the offending key, sorted.
        tags: Vec<String>,
    },
}

/// A key that metrics are recorded under.
///
/// Keys are usually created through the `From` conversions:
///
/// ```
/// use statsum::MetricKey;
///
/// let _ = MetricKey::from("requests");
/// let _ = MetricKey::from(404);
/// let _ = MetricKey::from(vec!["api", "users"]);
/// let _: MetricKey = [None, Some(3), Some(4), None].into_iter().collect();
/// let _ = MetricKey::tags([("region", "eu")]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricKey {
    /// Rendered in decimal.
    Int(i64),
    /// Rendered with leading and trailing separators removed.
    Str(String),
    /// Elements rendered and joined with the separator; absent elements are skipped.
    Seq(Vec<Option<MetricKey>>),
    /// Expanded into every tag/wildcard combination.
    Tags(BTreeMap<String, MetricKey>),
}

impl MetricKey {
    /// Creates a tag mapping from `(tag, value)` pairs.
    pub fn tags<I, K, V>(tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<MetricKey>,
    {
        MetricKey::Tags(
            tags.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    fn shape(&self) -> &'static str {
        match self {
            MetricKey::Int(_) => "integer",
            MetricKey::Str(_) => "string",
            MetricKey::Seq(_) => "sequence",
            MetricKey::Tags(_) => "tag mapping",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKey::Int(value) => write!(f, "{}", value),
            MetricKey::Str(value) => write!(f, "{:?}", value),
            MetricKey::Seq(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    match item {
                        Some(item) => write!(f, "{}", item)?,
                        None => f.write_str("null")?,
                    }
                }
                f.write_str("]")
            }
            MetricKey::Tags(tags) => {
                f.write_str("{")?;
                for (idx, (tag, value)) in tags.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: {}", tag, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for MetricKey {
                #[inline]
                fn from(value: $ty) -> Self {
                    MetricKey::Int(value.into())
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<&str> for MetricKey {
    fn from(value: &str) -> Self {
        MetricKey::Str(value.to_owned())
    }
}

impl From<String> for MetricKey {
    fn from(value: String) -> Self {
        MetricKey::Str(value)
    }
}

impl From<&String> for MetricKey {
    fn from(value: &String) -> Self {
        MetricKey::Str(value.clone())
    }
}

impl From<&MetricKey> for MetricKey {
    fn from(value: &MetricKey) -> Self {
        value.clone()
    }
}

impl<T: Into<MetricKey>> From<Vec<T>> for MetricKey {
    fn from(items: Vec<T>) -> Self {
        MetricKey::Seq(items.into_iter().map(|item| Some(item.into())).collect())
    }
}

impl<T: Into<MetricKey>, const N: usize> From<[T; N]> for MetricKey {
    fn from(items: [T; N]) -> Self {
        MetricKey::Seq(items.into_iter().map(|item| Some(item.into())).collect())
    }
}

impl<K: Into<String>, V: Into<MetricKey>> From<BTreeMap<K, V>> for MetricKey {
    fn from(tags: BTreeMap<K, V>) -> Self {
        MetricKey::tags(tags)
    }
}

impl<K: Into<String>, V: Into<MetricKey>, S> From<HashMap<K, V, S>> for MetricKey {
    fn from(tags: HashMap<K, V, S>) -> Self {
        MetricKey::tags(tags)
    }
}

impl<T: Into<MetricKey>> FromIterator<Option<T>> for MetricKey {
    fn from_iter<I: IntoIterator<Item = Option<T>>>(iter: I) -> Self {
        MetricKey::Seq(iter.into_iter().map(|item| item.map(Into::into)).collect())
    }
}

/// Joins two names with the separator unless one of them is empty.
pub fn join_keys(first: &str, second: &str) -> String {
    match (first.is_empty(), second.is_empty()) {
        (false, false) => {
            let mut joined = String::with_capacity(first.len() + second.len() + 1);
            joined.push_str(first);
            joined.push(SEPARATOR);
            joined.push_str(second);
            joined
        }
        (true, _) => second.to_owned(),
        (false, true) => first.to_owned(),
    }
}

fn trim_separators(value: &str) -> &str {
    value.trim_matches(SEPARATOR)
}

/// Formats a plain key into its canonical name.
///
/// Tag mappings have no single name and are rejected; use [`expand_key`] for
/// keys that may carry tags.
pub fn format_key(key: &MetricKey) -> Result<String, KeyError> {
    match key {
        MetricKey::Int(value) => Ok(value.to_string()),
        MetricKey::Str(value) => Ok(trim_separators(value).to_owned()),
        MetricKey::Seq(items) => {
            let mut name = String::new();
            for item in items.iter().flatten() {
                let formatted = format_key(item)?;
                name = join_keys(&name, &formatted);
            }
            Ok(name)
        }
        MetricKey::Tags(_) => Err(KeyError::Unsupported { shape: key.shape() }),
    }
}

/// Expands a key into every name it is recorded under.
///
/// The key is fully validated before this returns, so consuming the expansion
/// cannot fail halfway through.
pub fn expand_key(key: &MetricKey) -> Result<KeyExpansion, KeyError> {
    let tags = match key {
        MetricKey::Tags(tags) => tags,
        _ => return Ok(KeyExpansion::single(format_key(key)?)),
    };

    if tags.len() > MAX_TAGS {
        return Err(KeyError::TooManyTags {
            key: key.to_string(),
            tags: tags.keys().cloned().collect(),
        });
    }

    let rendered = tags
        .iter()
        .map(|(tag, value)| {
            let tag = trim_separators(tag);
            Ok(TagSegments {
                value: format!("{}:{}", tag, format_key(value)?),
                wildcard: format!("{}{}", WILDCARD_PREFIX, tag),
            })
        })
        .collect::<Result<Vec<_>, KeyError>>()?;

    Ok(KeyExpansion {
        combinations: 1 << rendered.len(),
        tags: rendered,
        next: 0,
    })
}

/// Expands `key` and calls `f` once per name.
pub fn iterate_key<F: FnMut(String)>(key: &MetricKey, f: F) -> Result<(), KeyError> {
    expand_key(key)?.for_each(f);
    Ok(())
}

#[derive(Debug)]
struct TagSegments {
    value: String,
    wildcard: String,
}

/// The names a key expands to.
///
/// Names are produced lazily.  For tag mappings the first tag varies slowest
/// and the valued rendering of a tag comes before its wildcard.
#[derive(Debug)]
pub struct KeyExpansion {
    tags: Vec<TagSegments>,
    combinations: usize,
    next: usize,
}

impl KeyExpansion {
    fn single(name: String) -> Self {
        KeyExpansion {
            tags: vec![TagSegments {
                value: name,
                wildcard: String::new(),
            }],
            combinations: 1,
            next: 0,
        }
    }
}

impl Iterator for KeyExpansion {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.next >= self.combinations {
            return None;
        }
        let mask = self.next;
        self.next += 1;

        let count = self.tags.len();
        let mut name = String::new();
        for (idx, tag) in self.tags.iter().enumerate() {
            // a set bit selects the wildcard; the first tag owns the highest bit
            let segment = if mask & (1 << (count - 1 - idx)) == 0 {
                &tag.value
            } else {
                &tag.wildcard
            };
            name = join_keys(&name, segment);
        }
        Some(name)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.combinations - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for KeyExpansion {}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("", "")]
    #[case("a", "a")]
    #[case("..a.b..", "a.b")]
    #[case(".a..b.", "a..b")]
    #[case("...", "")]
    fn test_format_string(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(format_key(&input.into()).unwrap(), expected);
    }

    #[test]
    fn test_format_numbers() {
        assert_eq!(format_key(&42.into()).unwrap(), "42");
        assert_eq!(format_key(&(-7).into()).unwrap(), "-7");
    }

    #[test]
    fn test_format_sequence() {
        assert_eq!(format_key(&vec!["a", "b"].into()).unwrap(), "a.b");
        assert_eq!(format_key(&vec![".a.", "", "b."].into()).unwrap(), "a.b");

        let key: MetricKey = [None, Some(3), Some(4), None].into_iter().collect();
        assert_eq!(format_key(&key).unwrap(), "3.4");

        let nested = MetricKey::from(vec![MetricKey::from("x"), MetricKey::from([1, 2])]);
        assert_eq!(format_key(&nested).unwrap(), "x.1.2");
    }

    #[test]
    fn test_format_rejects_tags() {
        let key = MetricKey::from(vec![MetricKey::tags([("a", "b")])]);
        assert_eq!(
            format_key(&key),
            Err(KeyError::Unsupported {
                shape: "tag mapping"
            })
        );
        assert!(expand_key(&key).is_err());
    }

    #[rstest]
    #[case("a", "b", "a.b")]
    #[case("", "b", "b")]
    #[case("a", "", "a")]
    #[case("", "", "")]
    fn test_join_keys(#[case] first: &str, #[case] second: &str, #[case] expected: &str) {
        assert_eq!(join_keys(first, second), expected);
    }

    #[test]
    fn test_expand_plain_keys() {
        let names: Vec<_> = expand_key(&"..my-counter".into()).unwrap().collect();
        assert_eq!(names, ["my-counter"]);

        let key: MetricKey = [None, Some(3), Some(4), None].into_iter().collect();
        let names: Vec<_> = expand_key(&key).unwrap().collect();
        assert_eq!(names, ["3.4"]);
    }

    #[test]
    fn test_expand_two_tags() {
        let key = MetricKey::tags([("tag2", "v2"), ("tag1", "v1")]);
        let names: Vec<_> = expand_key(&key).unwrap().collect();
        assert_eq!(
            names,
            [
                "tag1:v1.tag2:v2",
                "tag1:v1.all-tag2",
                "all-tag1.tag2:v2",
                "all-tag1.all-tag2",
            ]
        );
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(3)]
    #[case(5)]
    fn test_expand_yields_every_combination(#[case] count: usize) {
        let key = MetricKey::tags((0..count).map(|i| (format!("t{i}"), i as i64)));
        let expansion = expand_key(&key).unwrap();
        assert_eq!(expansion.len(), 1 << count);

        let names: Vec<_> = expansion.collect();
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), 1 << count);

        for name in &names {
            let segments: Vec<_> = name.split(SEPARATOR).filter(|s| !s.is_empty()).collect();
            assert_eq!(segments.len(), count);
            for (i, segment) in segments.iter().enumerate() {
                assert!(
                    *segment == format!("t{i}:{i}") || *segment == format!("all-t{i}"),
                    "unexpected segment {segment} in {name}"
                );
            }
        }
    }

    #[test]
    fn test_expand_empty_tags() {
        let names: Vec<_> = expand_key(&MetricKey::Tags(BTreeMap::new()))
            .unwrap()
            .collect();
        assert_eq!(names, [""]);
    }

    #[test]
    fn test_expand_formats_tag_values() {
        let key = MetricKey::tags([
            ("region.", MetricKey::from(vec!["eu", "west"])),
            ("code", MetricKey::from(404)),
        ]);
        let names: Vec<_> = expand_key(&key).unwrap().collect();
        assert_eq!(names[0], "code:404.region:eu.west");
        assert_eq!(names[3], "all-code.all-region");
    }

    #[test]
    fn test_expand_rejects_nested_tags() {
        let key = MetricKey::tags([("outer", MetricKey::tags([("inner", 1)]))]);
        assert_eq!(
            expand_key(&key).unwrap_err(),
            KeyError::Unsupported {
                shape: "tag mapping"
            }
        );
    }

    #[test]
    fn test_expand_rejects_too_many_tags() {
        let key = MetricKey::tags((0..6).map(|i| (format!("t{i}"), "v")));
        let err = expand_key(&key).unwrap_err();
        match &err {
            KeyError::TooManyTags { tags, key } => {
                assert_eq!(tags, &["t0", "t1", "t2", "t3", "t4", "t5"]);
                assert!(key.contains("\"t5\": \"v\""));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("more than 5 tags"));
    }

    #[test]
    fn test_iterate_key() {
        let mut seen = vec![];
        iterate_key(&MetricKey::tags([("a", 1)]), |name| seen.push(name)).unwrap();
        assert_eq!(seen, ["a:1", "all-a"]);
    }
}
