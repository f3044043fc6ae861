use std::{borrow::Borrow, fmt, sync::Arc};

use serde::Serialize;

/// A tag key.
///
/// Keys are cheap to clone, and compare by their string contents.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TagKey(Arc<str>);

impl TagKey {
    /// Creates a new `TagKey` from the given name.
    pub fn new<S: AsRef<str>>(name: S) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Returns the name of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TagKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TagKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TagKey {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl Serialize for TagKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

/// A tag value.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TagValue(Arc<str>);

impl TagValue {
    /// Creates a new `TagValue`.
    pub fn new<S: AsRef<str>>(value: S) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    /// Returns the value as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl Serialize for TagValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

/// A single key/value tag.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct Tag {
    key: TagKey,
    value: TagValue,
}

impl Tag {
    /// Creates a new `Tag`.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<TagKey>,
        V: Into<TagValue>,
    {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Returns the key of the tag.
    pub fn key(&self) -> &TagKey {
        &self.key
    }

    /// Returns the value of the tag.
    pub fn value(&self) -> &TagValue {
        &self.value
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value)
    }
}

/// An immutable, ordered collection of tags.
///
/// Each key appears at most once. Contexts are reference counted, so cloning a context to hand it to another thread is
/// cheap.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TagContext {
    tags: Arc<[Tag]>,
}

impl Default for TagContext {
    fn default() -> Self {
        Self {
            tags: Arc::from(Vec::new()),
        }
    }
}

impl TagContext {
    /// Creates an empty tag context.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a builder for a new tag context.
    pub fn builder() -> TagContextBuilder {
        TagContextBuilder::default()
    }

    /// Returns `true` if the context holds no tags.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Returns the number of tags in the context.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Gets the value of the tag with the given key, if present.
    pub fn get<K>(&self, key: &K) -> Option<&TagValue>
    where
        K: AsRef<str> + ?Sized,
    {
        let key = key.as_ref();
        self.tags.iter().find(|tag| tag.key.as_str() == key).map(|tag| &tag.value)
    }

    /// Returns an iterator over the tags in the context, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }
}

impl Serialize for TagContext {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq(self.tags.iter())
    }
}

impl AsRef<str> for TagKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'a> IntoIterator for &'a TagContext {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for TagContext
where
    K: Into<TagKey>,
    V: Into<TagValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut builder = TagContextBuilder::default();
        for (key, value) in iter {
            builder = builder.put(key, value);
        }
        builder.build()
    }
}

/// Builder for [`TagContext`].
#[derive(Clone, Debug, Default)]
pub struct TagContextBuilder {
    tags: Vec<Tag>,
}

impl TagContextBuilder {
    /// Sets the tag with the given key.
    ///
    /// If the key is already present, its value is replaced in place, keeping the key's original position.
    pub fn put<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<TagKey>,
        V: Into<TagValue>,
    {
        let tag = Tag::new(key, value);
        match self.tags.iter_mut().find(|existing| existing.key == tag.key) {
            Some(existing) => existing.value = tag.value,
            None => self.tags.push(tag),
        }
        self
    }

    /// Removes the tag with the given key, if present.
    pub fn remove<K>(mut self, key: &K) -> Self
    where
        K: AsRef<str> + ?Sized,
    {
        let key = key.as_ref();
        self.tags.retain(|tag| tag.key.as_str() != key);
        self
    }

    /// Builds the tag context.
    pub fn build(self) -> TagContext {
        TagContext {
            tags: self.tags.into(),
        }
    }
}

impl From<TagContext> for TagContextBuilder {
    fn from(context: TagContext) -> Self {
        Self {
            tags: context.tags.to_vec(),
        }
    }
}
