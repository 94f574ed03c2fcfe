use super::labels::{LabelSet, Matcher, MatcherKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Series reference, assigned in creation order.
pub type SeriesRef = u64;

/// Inverted index from label name/value pairs to series.
#[derive(Debug, Default)]
pub struct LabelIndex {
    postings: HashMap<String, BTreeMap<String, BTreeSet<SeriesRef>>>,
    all: BTreeSet<SeriesRef>,
}

impl LabelIndex {
    pub fn add(&mut self, r: SeriesRef, labels: &LabelSet) {
        for l in labels.iter() {
            self.postings
                .entry(l.name.clone())
                .or_default()
                .entry(l.value.clone())
                .or_default()
                .insert(r);
        }
        self.all.insert(r);
    }

    pub fn remove(&mut self, r: SeriesRef, labels: &LabelSet) {
        for l in labels.iter() {
            if let Some(values) = self.postings.get_mut(&l.name) {
                if let Some(refs) = values.get_mut(&l.value) {
                    refs.remove(&r);
                    if refs.is_empty() {
                        values.remove(&l.value);
                    }
                }
                if values.is_empty() {
                    self.postings.remove(&l.name);
                }
            }
        }
        self.all.remove(&r);
    }

    /// Series matching every matcher, ascending. No matchers select everything.
    pub fn select(&self, matchers: &[Matcher]) -> Vec<SeriesRef> {
        let mut result: Option<BTreeSet<SeriesRef>> = None;

        // Cheap, narrowing matchers first.
        let mut ordered: Vec<&Matcher> = matchers.iter().collect();
        ordered.sort_by_key(|m| match m.kind() {
            MatcherKind::Equal(_) | MatcherKind::In(_) if !m.matches("") => 0,
            MatcherKind::Regex(_) if !m.matches("") => 1,
            _ => 2,
        });

        for m in ordered {
            let refs = self.postings_for(m);
            result = Some(match result {
                None => refs,
                Some(acc) => acc.intersection(&refs).copied().collect(),
            });
            if result.as_ref().map_or(false, |r| r.is_empty()) {
                break;
            }
        }

        result
            .unwrap_or_else(|| self.all.clone())
            .into_iter()
            .collect()
    }

    fn postings_for(&self, m: &Matcher) -> BTreeSet<SeriesRef> {
        let values = self.postings.get(m.name());

        if m.matches("") {
            // Also selects series without the label: everything except the
            // series whose value for it does not match.
            let mut excluded = BTreeSet::new();
            if let Some(values) = values {
                for (value, refs) in values.iter() {
                    if !m.matches(value) {
                        excluded.extend(refs.iter().copied());
                    }
                }
            }
            return self.all.difference(&excluded).copied().collect();
        }

        let values = match values {
            Some(values) => values,
            None => return BTreeSet::new(),
        };

        match m.kind() {
            MatcherKind::Equal(v) => values.get(v).cloned().unwrap_or_default(),
            MatcherKind::In(set) => set
                .iter()
                .filter_map(|v| values.get(v))
                .flat_map(|refs| refs.iter().copied())
                .collect(),
            _ => values
                .iter()
                .filter(|(value, _)| m.matches(value))
                .flat_map(|(_, refs)| refs.iter().copied())
                .collect(),
        }
    }

    pub fn label_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.postings.keys().cloned().collect();
        names.sort();
        names
    }

    /// Values of label `name` with the series carrying each, ascending by
    /// value.
    pub fn postings(&self, name: &str) -> impl Iterator<Item = (&str, &BTreeSet<SeriesRef>)> {
        self.postings
            .get(name)
            .into_iter()
            .flat_map(|values| values.iter().map(|(v, refs)| (v.as_str(), refs)))
    }
}
