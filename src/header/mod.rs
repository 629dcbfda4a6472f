//! HTTP header name-value fields.
//!
//! A [HeaderCollection] is an ordered list of fields. Names are compared
//! case-insensitively but stored as given. Fields keep their insertion order,
//! including when the same name appears more than once, so a collection read
//! from the wire formats back to the same bytes.
//!
//! Collections are immutable. Use [HeaderCollectionBuilder] to build or modify
//! one.
mod format;

use std::fmt::Display;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    error::HeaderError,
    stringutil::{index_of_not_allowed_in_header_value, index_of_not_allowed_in_tokens},
};

/// Character set used for header names and values on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderCharset {
    /// ISO-8859-1. Each octet is one character.
    #[default]
    Latin1,
    /// UTF-8.
    Utf8,
}

impl HeaderCharset {
    /// Decodes wire octets into text.
    pub fn decode(&self, data: &[u8]) -> String {
        match self {
            HeaderCharset::Latin1 => data.iter().map(|&byte| byte as char).collect(),
            HeaderCharset::Utf8 => String::from_utf8_lossy(data).into_owned(),
        }
    }

    /// Encodes text into wire octets.
    ///
    /// Characters that cannot be represented are replaced with `?`.
    pub fn encode(&self, text: &str, dest: &mut Vec<u8>) {
        match self {
            HeaderCharset::Latin1 => dest.extend(text.chars().map(|c| {
                if (c as u32) <= 0xff {
                    c as u8
                } else {
                    b'?'
                }
            })),
            HeaderCharset::Utf8 => dest.extend_from_slice(text.as_bytes()),
        }
    }
}

/// Represents a single name-value field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPair {
    name: String,
    value: String,
}

impl FieldPair {
    /// Name as it was inserted.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of the field.
    pub fn value(&self) -> &str {
        &self.value
    }

    fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl Display for FieldPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        f.write_str(": ")?;
        f.write_str(&self.value)?;
        f.write_str("\r\n")
    }
}

/// Ordered, case-insensitive, multi-valued collection of header fields.
///
/// Equality compares the fields and the charset, not the validation mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderCollection {
    pairs: Vec<FieldPair>,
    charset: HeaderCharset,
    #[serde(default)]
    unvalidated: bool,
}

impl HeaderCollection {
    /// Returns an empty collection.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns a builder that validates fields against the Latin-1 charset.
    pub fn builder() -> HeaderCollectionBuilder {
        HeaderCollectionBuilder::new(HeaderCharset::Latin1, true)
    }

    /// Returns a builder that validates fields against the given charset.
    pub fn builder_with_charset(charset: HeaderCharset) -> HeaderCollectionBuilder {
        HeaderCollectionBuilder::new(charset, true)
    }

    /// Returns a builder that accepts any name and value.
    ///
    /// Intended for talking to non-conformant peers. Fields built this way may
    /// not format back to valid HTTP.
    pub fn builder_unvalidated() -> HeaderCollectionBuilder {
        HeaderCollectionBuilder::new(HeaderCharset::Latin1, false)
    }

    /// Returns a builder that accepts any name and value and encodes them
    /// with the given charset.
    pub fn builder_unvalidated_with_charset(charset: HeaderCharset) -> HeaderCollectionBuilder {
        HeaderCollectionBuilder::new(charset, false)
    }

    /// Returns a builder initialized with the fields of this collection.
    ///
    /// The builder keeps the charset and validation mode of this collection.
    pub fn to_builder(&self) -> HeaderCollectionBuilder {
        HeaderCollectionBuilder {
            pairs: self.pairs.clone(),
            charset: self.charset,
            validate: !self.unvalidated,
        }
    }

    /// Returns whether fields added to a builder of this collection are validated.
    pub fn is_validated(&self) -> bool {
        !self.unvalidated
    }

    /// Character set for the values.
    pub fn charset(&self) -> HeaderCharset {
        self.charset
    }

    /// Number of fields, counting repeated names.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Returns an iterator of all fields in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, FieldPair> {
        self.pairs.iter()
    }

    /// Returns whether a field with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.pairs.iter().any(|pair| pair.has_name(name))
    }

    /// Returns all the values for the given name in insertion order.
    pub fn get(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|pair| pair.has_name(name))
            .map(|pair| pair.value.as_str())
            .collect()
    }

    /// Returns all the values for the given name, each split by `separator`.
    pub fn get_split(&self, name: &str, separator: &Regex) -> Vec<String> {
        self.get(name)
            .into_iter()
            .flat_map(|value| separator.split(value))
            .map(String::from)
            .collect()
    }

    /// Returns the first value for the given name.
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|pair| pair.has_name(name))
            .map(|pair| pair.value.as_str())
    }

    /// Returns the name of every field, one per field, as inserted.
    pub fn header_names(&self) -> Vec<&str> {
        self.pairs.iter().map(|pair| pair.name.as_str()).collect()
    }

    /// Returns each distinct name once, using the spelling of its first occurrence.
    pub fn unique_header_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();

        for pair in &self.pairs {
            if !names.iter().any(|name| pair.has_name(name)) {
                names.push(&pair.name);
            }
        }

        names
    }

    /// Returns a collection where the fields of `other` replace fields of the
    /// same name in this collection.
    ///
    /// See [HeaderCollectionBuilder::and].
    pub fn and(&self, other: &HeaderCollection) -> HeaderCollection {
        self.to_builder().and(other).build()
    }
}

impl<'a> IntoIterator for &'a HeaderCollection {
    type Item = &'a FieldPair;
    type IntoIter = std::slice::Iter<'a, FieldPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Display for HeaderCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for pair in &self.pairs {
            pair.fmt(f)?;
        }

        f.write_str("\r\n")
    }
}

/// Builds a [HeaderCollection].
///
/// ```
/// use rawhttp::header::HeaderCollection;
///
/// let headers = HeaderCollection::builder()
///     .with("Accept", "text/html")?
///     .with("Accept", "text/plain")?
///     .build();
///
/// assert_eq!(headers.get("accept"), vec!["text/html", "text/plain"]);
/// # Ok::<(), rawhttp::error::HeaderError>(())
/// ```
#[derive(Debug, Clone)]
pub struct HeaderCollectionBuilder {
    pairs: Vec<FieldPair>,
    charset: HeaderCharset,
    validate: bool,
}

impl HeaderCollectionBuilder {
    fn new(charset: HeaderCharset, validate: bool) -> Self {
        Self {
            pairs: Vec::new(),
            charset,
            validate,
        }
    }

    fn check(&self, name: &str, value: &str) -> Result<(), HeaderError> {
        if !self.validate {
            return Ok(());
        }

        if let Some(index) = index_of_not_allowed_in_tokens(name) {
            return Err(HeaderError::InvalidName {
                index,
                name: name.to_string(),
            });
        }

        if let Some(index) = index_of_not_allowed_in_header_value(value, self.charset) {
            return Err(HeaderError::InvalidValue {
                index,
                value: value.to_string(),
            });
        }

        Ok(())
    }

    /// Appends a field, keeping any existing fields with the same name.
    pub fn with<N, V>(mut self, name: N, value: V) -> Result<Self, HeaderError>
    where
        N: Into<String>,
        V: Into<String>,
    {
        let name = name.into();
        let value = value.into();

        self.check(&name, &value)?;
        self.pairs.push(FieldPair { name, value });

        Ok(self)
    }

    /// Replaces every field with the given name with a single field.
    ///
    /// The new field takes the position of the first replaced field, or is
    /// appended if there was none.
    pub fn overwrite<N, V>(mut self, name: N, value: V) -> Result<Self, HeaderError>
    where
        N: Into<String>,
        V: Into<String>,
    {
        let name = name.into();
        let value = value.into();

        self.check(&name, &value)?;

        let position = self.pairs.iter().position(|pair| pair.has_name(&name));
        self.pairs.retain(|pair| !pair.has_name(&name));

        match position {
            Some(position) => self.pairs.insert(position, FieldPair { name, value }),
            None => self.pairs.push(FieldPair { name, value }),
        }

        Ok(self)
    }

    /// Removes every field with the given name.
    pub fn remove(mut self, name: &str) -> Self {
        self.pairs.retain(|pair| !pair.has_name(name));
        self
    }

    /// Removes every field matching any of the given names.
    pub fn remove_all<'n, I>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = &'n str>,
    {
        let names: Vec<&str> = names.into_iter().collect();
        self.pairs
            .retain(|pair| !names.iter().any(|name| pair.has_name(name)));
        self
    }

    /// Removes one field for each field of `other` with the same name and
    /// value, searching from the last field.
    pub fn remove_fields(mut self, other: &HeaderCollection) -> Self {
        for field in other.pairs.iter() {
            if let Some(position) = self
                .pairs
                .iter()
                .rposition(|pair| pair.has_name(&field.name) && pair.value == field.value)
            {
                self.pairs.remove(position);
            }
        }
        self
    }

    /// Appends all the fields of `other`.
    pub fn merge(mut self, other: &HeaderCollection) -> Self {
        self.pairs.extend(other.pairs.iter().cloned());
        self
    }

    /// Replaces fields with the fields of `other`.
    ///
    /// For each name in `other`, all of its values are placed at the position
    /// of the first field with that name in this builder and the other fields
    /// with that name are dropped. Names only present in `other` are appended
    /// in their order.
    pub fn and(mut self, other: &HeaderCollection) -> Self {
        let mut pairs = Vec::with_capacity(self.pairs.len() + other.len());
        let mut replaced: Vec<&str> = Vec::new();

        for pair in self.pairs.drain(..) {
            if other.contains(&pair.name) {
                if !replaced.iter().any(|name| pair.has_name(name)) {
                    let name = other
                        .iter()
                        .find(|other_pair| other_pair.has_name(&pair.name))
                        .map(|other_pair| other_pair.name.as_str())
                        .unwrap_or_default();

                    replaced.push(name);
                    pairs.extend(
                        other
                            .iter()
                            .filter(|other_pair| other_pair.has_name(&pair.name))
                            .cloned(),
                    );
                }
            } else {
                pairs.push(pair);
            }
        }

        pairs.extend(
            other
                .iter()
                .filter(|other_pair| !replaced.iter().any(|name| other_pair.has_name(name)))
                .cloned(),
        );

        self.pairs = pairs;
        self
    }

    /// Returns whether a field with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.pairs.iter().any(|pair| pair.has_name(name))
    }

    /// Returns all the values for the given name in insertion order.
    pub fn get(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|pair| pair.has_name(name))
            .map(|pair| pair.value.as_str())
            .collect()
    }

    /// Finishes building the collection.
    pub fn build(self) -> HeaderCollection {
        HeaderCollection {
            pairs: self.pairs,
            charset: self.charset,
            unvalidated: !self.validate,
        }
    }
}

impl PartialEq for HeaderCollection {
    fn eq(&self, other: &Self) -> bool {
        self.pairs == other.pairs && self.charset == other.charset
    }
}

impl Eq for HeaderCollection {}

impl Default for HeaderCollectionBuilder {
    fn default() -> Self {
        HeaderCollection::builder()
    }
}
