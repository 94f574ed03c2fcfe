use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const METRIC_NAME: &str = "__name__";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Identity of a series: label pairs with unique names, kept sorted by name so
/// that insertion order does not matter. Labels with an empty value are
/// equivalent to absent ones and are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabelSet(Vec<Label>);

impl LabelSet {
    pub fn new(labels: impl IntoIterator<Item = Label>) -> Result<Self> {
        let mut labels: Vec<Label> = labels
            .into_iter()
            .filter(|l| !l.value.is_empty())
            .collect();
        labels.sort();

        for l in labels.iter() {
            if l.name.is_empty() {
                return Err(Error::invalid_argument("label name must not be empty"));
            }
        }
        for w in labels.windows(2) {
            if w[0].name == w[1].name {
                return Err(Error::invalid_argument(format!(
                    "Duplicate label {} in series",
                    w[0].name
                )));
            }
        }

        Ok(Self(labels))
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        Self::new(pairs.into_iter().map(|(n, v)| Label::new(n, v)))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|i| self.0[i].value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, l) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={:?}", l.name, l.value)?;
        }
        f.write_str("}")
    }
}

#[derive(Debug, Clone)]
pub enum MatcherKind {
    Equal(String),
    NotEqual(String),
    Regex(Regex),
    NotRegex(Regex),
    In(BTreeSet<String>),
}

/// A predicate on the value of one label. An absent label has the value "".
#[derive(Debug, Clone)]
pub struct Matcher {
    name: String,
    kind: MatcherKind,
}

impl Matcher {
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MatcherKind::Equal(value.into()),
        }
    }

    pub fn not_equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MatcherKind::NotEqual(value.into()),
        }
    }

    /// The pattern must match the whole value.
    pub fn regex(name: impl Into<String>, pattern: &str) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            kind: MatcherKind::Regex(anchored(pattern)?),
        })
    }

    pub fn not_regex(name: impl Into<String>, pattern: &str) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            kind: MatcherKind::NotRegex(anchored(pattern)?),
        })
    }

    pub fn one_of<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: MatcherKind::In(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &MatcherKind {
        &self.kind
    }

    pub fn matches(&self, value: &str) -> bool {
        match &self.kind {
            MatcherKind::Equal(v) => v == value,
            MatcherKind::NotEqual(v) => v != value,
            MatcherKind::Regex(re) => re.is_match(value),
            MatcherKind::NotRegex(re) => !re.is_match(value),
            MatcherKind::In(values) => values.contains(value),
        }
    }

    pub fn matches_labels(&self, labels: &LabelSet) -> bool {
        self.matches(labels.get(&self.name).unwrap_or(""))
    }
}

fn anchored(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|e| Error::invalid_argument(format!("invalid regex {:?}: {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_set_is_order_independent() {
        let a = LabelSet::from_pairs([("b", "2"), ("a", "1")]).unwrap();
        let b = LabelSet::from_pairs([("a", "1"), ("b", "2")]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.get("a"), Some("1"));
        assert_eq!(a.get("c"), None);
        assert_eq!(a.to_string(), r#"{a="1", b="2"}"#);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = LabelSet::from_pairs([("a", "1"), ("a", "2")]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn empty_values_are_dropped() {
        let ls = LabelSet::from_pairs([("a", "1"), ("b", "")]).unwrap();
        assert_eq!(ls.len(), 1);
    }

    #[test]
    fn matchers() {
        let ls = LabelSet::from_pairs([(METRIC_NAME, "allocs"), ("pod", "api-7")]).unwrap();

        assert!(Matcher::equal(METRIC_NAME, "allocs").matches_labels(&ls));
        assert!(!Matcher::not_equal(METRIC_NAME, "allocs").matches_labels(&ls));
        assert!(Matcher::regex("pod", "api-.*").unwrap().matches_labels(&ls));
        assert!(!Matcher::regex("pod", "api").unwrap().matches_labels(&ls));
        assert!(Matcher::not_regex("pod", "web-.*").unwrap().matches_labels(&ls));
        assert!(Matcher::one_of("pod", ["api-7", "api-8"]).matches_labels(&ls));
        assert!(Matcher::equal("missing", "").matches_labels(&ls));
        assert!(Matcher::regex("pod", "(").is_err());
    }
}
