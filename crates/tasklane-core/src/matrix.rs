//! Matrix model: entries, expansion specs and filters
//!
//! A matrix spec declares axes with candidate values. Expansion produces the
//! cartesian product of all non-empty axes in lexical axis order, so identical
//! declarations always enumerate entries in the same sequence. A filter
//! narrows the product to the entries whose values are allowed on every axis
//! it names.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ParseError, Result};

/// One concrete combination of axis values
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatrixEntry(BTreeMap<String, String>);

impl MatrixEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, axis: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(axis, value);
        self
    }

    pub fn insert(&mut self, axis: impl Into<String>, value: impl Into<String>) {
        self.0.insert(axis.into(), value.into());
    }

    pub fn get(&self, axis: &str) -> Option<&str> {
        self.0.get(axis).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Short human-readable form, e.g. `arch: amd64, os: linux`
    pub fn brief(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Environment variables describing this entry (`MATRIX_<AXIS>=<value>`)
    pub fn env_vars(&self) -> BTreeMap<String, String> {
        self.iter()
            .map(|(k, v)| {
                let name = k.to_uppercase().replace(['-', '.'], "_");
                (format!("MATRIX_{name}"), v.to_string())
            })
            .collect()
    }
}

impl fmt::Display for MatrixEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.brief())
    }
}

impl FromIterator<(String, String)> for MatrixEntry {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Per-axis allow-list restricting which entries run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MatrixFilter(BTreeMap<String, Vec<String>>);

impl<'de> Deserialize<'de> for MatrixFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<String, OneOrMany>::deserialize(deserializer)?;
        Ok(Self(raw.into_iter().map(|(k, v)| (k, v.into())).collect()))
    }
}

impl MatrixFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `value` on `axis` in addition to already allowed values
    pub fn add(&mut self, axis: impl Into<String>, value: impl Into<String>) {
        self.0.entry(axis.into()).or_default().push(value.into());
    }

    pub fn with(mut self, axis: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(axis, value);
        self
    }

    /// Restrict this filter by `other`: an entry must pass both.
    ///
    /// Axes present in both keep only their common values; an axis left with
    /// no values matches nothing.
    pub fn narrow(&mut self, other: MatrixFilter) {
        for (axis, values) in other.0 {
            match self.0.get_mut(&axis) {
                Some(allowed) => allowed.retain(|value| values.contains(value)),
                None => {
                    self.0.insert(axis, values);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn allowed(&self, axis: &str) -> Option<&[String]> {
        self.0.get(axis).map(Vec::as_slice)
    }

    /// Whether the entry passes this filter
    pub fn matches(&self, entry: &MatrixEntry) -> bool {
        self.0.iter().all(|(axis, allowed)| {
            entry
                .get(axis)
                .is_some_and(|value| allowed.iter().any(|a| a == value))
        })
    }

    /// Build a filter from repeated `axis=value` arguments
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut filter = Self::new();
        for arg in args {
            let arg = arg.as_ref();
            let (axis, value) = arg
                .split_once('=')
                .ok_or_else(|| ParseError::InvalidMatrixArg(arg.to_string()))?;
            let axis = axis.trim();
            if axis.is_empty() {
                return Err(ParseError::InvalidMatrixArg(arg.to_string()).into());
            }
            filter.add(axis, value.trim());
        }
        Ok(filter)
    }

    /// Parse a YAML mapping of axis to allowed values (`{os: [linux]}`)
    pub fn from_yaml(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_yaml::from_str::<Option<Self>>(input)
            .map(Option::unwrap_or_default)
            .map_err(|e| {
                ParseError::InvalidMatrixFilter {
                    input: input.to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
    }

    /// Render as a YAML flow mapping, e.g. `{arch: [amd64], os: [linux]}`
    pub fn to_flow_yaml(&self) -> String {
        let body = self
            .0
            .iter()
            .map(|(k, v)| format!("{}: [{}]", k, v.join(", ")))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{{{body}}}")
    }

    /// Keep the entries that pass this filter, preserving order
    pub fn apply(&self, entries: Vec<MatrixEntry>) -> Vec<MatrixEntry> {
        if self.is_empty() {
            return entries;
        }
        entries.into_iter().filter(|e| self.matches(e)).collect()
    }
}

/// Declared matrix of a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixSpec {
    /// Extra entries appended after expansion
    pub include: Vec<MatrixEntry>,

    /// Entries matching any of these filters are removed
    pub exclude: Vec<MatrixFilter>,

    /// Axis name to candidate values
    #[serde(flatten)]
    pub axes: BTreeMap<String, Vec<String>>,
}

impl MatrixSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_axis<I, S>(mut self, axis: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.axes
            .insert(axis.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_exclude(mut self, filter: MatrixFilter) -> Self {
        self.exclude.push(filter);
        self
    }

    pub fn with_include(mut self, entry: MatrixEntry) -> Self {
        self.include.push(entry);
        self
    }

    /// Expand into concrete entries in deterministic order
    pub fn expand(&self) -> Vec<MatrixEntry> {
        let mut entries = vec![MatrixEntry::new()];

        for (axis, values) in self.axes.iter().filter(|(_, v)| !v.is_empty()) {
            let mut next = Vec::with_capacity(entries.len() * values.len());
            for entry in &entries {
                for value in values {
                    let mut e = entry.clone();
                    e.insert(axis.clone(), value.clone());
                    next.push(e);
                }
            }
            entries = next;
        }

        if !self.exclude.is_empty() {
            entries.retain(|e| !self.exclude.iter().any(|f| f.matches(e)));
        }

        if !self.include.is_empty() {
            // an axis-less spec with includes runs only the included entries
            if entries.len() == 1 && entries[0].is_empty() {
                entries.clear();
            }
            for entry in &self.include {
                if !entries.contains(entry) {
                    entries.push(entry.clone());
                }
            }
        }

        entries
    }
}
