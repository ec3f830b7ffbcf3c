/// Character classes, weighted token tables, and the named class environment.

use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EnvironmentError {
    #[error("class #{0} referenced before definition")]
    Undefined(String),
    #[error("invalid weight {weight} for token '{token}'")]
    InvalidWeight { token: String, weight: f64 },
}

/// An insertion-ordered token → weight table.
///
/// Used for class literals, phonotactic table entries, and candidate sets
/// during generation. Order is preserved so that a seeded generator walks
/// candidates the same way on every run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Distribution {
    entries: Vec<(String, f64)>,
    index: FxHashMap<String, usize>,
}

impl Distribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `weight` to `token`, inserting it at the end if absent.
    pub fn add(&mut self, token: &str, weight: f64) {
        if let Some(&i) = self.index.get(token) {
            self.entries[i].1 += weight;
        } else {
            self.index.insert(token.to_string(), self.entries.len());
            self.entries.push((token.to_string(), weight));
        }
    }

    /// Insert `token` only if it is not already present.
    pub fn insert_absent(&mut self, token: &str, weight: f64) {
        if !self.index.contains_key(token) {
            self.index.insert(token.to_string(), self.entries.len());
            self.entries.push((token.to_string(), weight));
        }
    }

    pub fn get(&self, token: &str) -> Option<f64> {
        self.index.get(token).map(|&i| self.entries[i].1)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    /// Keep only the entries for which `keep` returns true. The closure may
    /// rescale the weight in place.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str, &mut f64) -> bool,
    {
        self.entries.retain_mut(|(token, weight)| keep(token.as_str(), weight));
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, (token, _)) in self.entries.iter().enumerate() {
            self.index.insert(token.clone(), i);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(t, w)| (t.as_str(), *w))
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<(String, f64)> {
        self.entries
    }
}

/// A named set of tokens with per-token weights. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharClass {
    weights: Distribution,
}

impl CharClass {
    /// Build a class from a literal list of `(token, weight)` pairs.
    /// Duplicate tokens accumulate additively; first occurrence fixes order.
    pub fn from_pairs<I, S>(pairs: I) -> Result<CharClass, EnvironmentError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut weights = Distribution::new();
        for (token, weight) in pairs {
            let token = token.as_ref();
            if !weight.is_finite() || weight < 0.0 {
                return Err(EnvironmentError::InvalidWeight {
                    token: token.to_string(),
                    weight,
                });
            }
            weights.add(token, weight);
        }
        Ok(CharClass { weights })
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.weights.tokens()
    }

    pub fn weight(&self, token: &str) -> Option<f64> {
        self.weights.get(token)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.weights.contains(token)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn distribution(&self) -> &Distribution {
        &self.weights
    }

    /// Sum `other`'s weights into this class.
    pub(crate) fn merge_sum(&mut self, other: &CharClass) {
        for (token, weight) in other.weights.iter() {
            self.weights.add(token, weight);
        }
    }

    /// Union `other`'s token set into this class; weights are left alone.
    pub(crate) fn merge_union(&mut self, other: &CharClass) {
        for token in other.weights.tokens() {
            self.weights.insert_absent(token, 0.0);
        }
    }
}

/// Named character classes, including the anonymous ones created for
/// inline class literals in syntax rules.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    classes: FxHashMap<String, Arc<CharClass>>,
    next_generated: usize,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `class`, replacing any previous binding.
    pub fn define(&mut self, name: impl Into<String>, class: Arc<CharClass>) {
        self.classes.insert(name.into(), class);
    }

    /// Bind `class` under a fresh generated name and return that name.
    pub fn assign_generated(&mut self, class: Arc<CharClass>) -> String {
        let name = loop {
            self.next_generated += 1;
            let candidate = self.next_generated.to_string();
            if !self.classes.contains_key(&candidate) {
                break candidate;
            }
        };
        self.classes.insert(name.clone(), class);
        name
    }

    pub fn lookup(&self, name: &str) -> Result<&Arc<CharClass>, EnvironmentError> {
        self.classes
            .get(name)
            .ok_or_else(|| EnvironmentError::Undefined(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&CharClass> {
        self.classes.get(name).map(|c| c.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn class_weights_sum_per_token(
            pairs in prop::collection::vec(("[a-e]", 0u32..100), 0..30)
        ) {
            let literal: Vec<(String, f64)> =
                pairs.iter().map(|(t, w)| (t.clone(), *w as f64)).collect();
            let class = CharClass::from_pairs(literal.iter().map(|(t, w)| (t.as_str(), *w))).unwrap();
            for token in class.tokens() {
                let expected: f64 = literal.iter().filter(|(t, _)| t == token).map(|(_, w)| w).sum();
                prop_assert_eq!(class.weight(token), Some(expected));
            }
            let distinct: rustc_hash::FxHashSet<&str> = literal.iter().map(|(t, _)| t.as_str()).collect();
            prop_assert_eq!(class.len(), distinct.len());
        }
    }
}
