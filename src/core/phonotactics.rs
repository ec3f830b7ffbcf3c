/// Positional sound conditioning: n-gram conditioning and exclusion tables.

use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use thiserror::Error;

use crate::core::environment::{CharClass, Distribution, EnvironmentError};

/// Marker prepended to every word-in-progress; anchors word-initial contexts.
pub const DEFAULT_BOUNDARY: &str = "_";

#[derive(Debug, Error, PartialEq)]
pub enum PhonotacticError {
    #[error("boundary marker may only open a context, found at position {0}")]
    MisplacedBoundary(usize),
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

/// One resolved position of a context pattern.
#[derive(Debug, Clone)]
pub enum ContextSlot {
    Boundary,
    Class(Arc<CharClass>),
}

/// Expand a context pattern into concrete context strings: the cartesian
/// product of the class tokens at each position, optionally anchored by
/// `boundary`.
pub fn expand_context(
    slots: &[ContextSlot],
    boundary: &str,
) -> Result<Vec<String>, PhonotacticError> {
    let mut contexts = vec![String::new()];
    for (i, slot) in slots.iter().enumerate() {
        match slot {
            ContextSlot::Boundary if i == 0 => contexts[0].push_str(boundary),
            ContextSlot::Boundary => return Err(PhonotacticError::MisplacedBoundary(i)),
            ContextSlot::Class(class) => {
                let mut next = Vec::with_capacity(contexts.len() * class.len());
                for prefix in &contexts {
                    for token in class.tokens() {
                        next.push(format!("{prefix}{token}"));
                    }
                }
                contexts = next;
            }
        }
    }
    Ok(contexts)
}

/// Conditioning and exclusion tables keyed by context string.
///
/// Entries start out as shared references to the class that created them;
/// a second merge at the same key works on a private copy, so the shared
/// class and every other key pointing at it stay untouched.
#[derive(Debug, Clone, Default)]
pub struct PhonotacticModel {
    conditions: FxHashMap<String, Arc<CharClass>>,
    exclusions: FxHashMap<String, Arc<CharClass>>,
}

impl PhonotacticModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `class` into the conditioning entry for `context`, summing
    /// weights of overlapping tokens.
    pub fn add_condition(&mut self, context: &str, class: &Arc<CharClass>) {
        match self.conditions.entry(context.to_string()) {
            Entry::Occupied(mut e) => Arc::make_mut(e.get_mut()).merge_sum(class),
            Entry::Vacant(e) => {
                e.insert(Arc::clone(class));
            }
        }
    }

    /// Merge `class` into the exclusion entry for `context` (set union).
    pub fn add_exclusion(&mut self, context: &str, class: &Arc<CharClass>) {
        match self.exclusions.entry(context.to_string()) {
            Entry::Occupied(mut e) => Arc::make_mut(e.get_mut()).merge_union(class),
            Entry::Vacant(e) => {
                e.insert(Arc::clone(class));
            }
        }
    }

    pub fn condition(&self, context: &str) -> Option<&Arc<CharClass>> {
        self.conditions.get(context)
    }

    pub fn exclusion(&self, context: &str) -> Option<&Arc<CharClass>> {
        self.exclusions.get(context)
    }

    pub fn condition_count(&self) -> usize {
        self.conditions.len()
    }

    pub fn exclusion_count(&self) -> usize {
        self.exclusions.len()
    }

    /// Narrow `base` by every context that is a suffix of `trailing`,
    /// longest suffix first.
    ///
    /// At each suffix, excluded tokens are removed, then if a conditioning
    /// entry exists the survivors are rescaled by its weights and anything
    /// it does not mention is dropped. The result never holds a token that
    /// `base` lacks.
    pub fn calc_distribution(&self, base: &Distribution, trailing: &[String]) -> Distribution {
        let mut dist = base.clone();
        let order = trailing.len();

        for j in (1..=order).rev() {
            let context = trailing[order - j..].concat();

            if let Some(excluded) = self.exclusions.get(&context) {
                dist.retain(|token, _| !excluded.contains(token));
            }

            if let Some(cond) = self.conditions.get(&context) {
                dist.retain(|token, weight| match cond.weight(token) {
                    Some(c) => {
                        *weight *= c;
                        true
                    }
                    None => false,
                });
            }
        }

        dist
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(pairs: &[(&str, f64)]) -> Arc<CharClass> {
        Arc::new(CharClass::from_pairs(pairs.iter().copied()).unwrap())
    }

    fn ctx(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn expand_plain_context() {
        let c = class(&[("p", 1.0), ("t", 1.0)]);
        let v = class(&[("a", 1.0), ("i", 1.0)]);
        let contexts =
            expand_context(&[ContextSlot::Class(c), ContextSlot::Class(v)], DEFAULT_BOUNDARY).unwrap();
        assert_eq!(contexts, vec!["pa", "pi", "ta", "ti"]);
    }

    #[test]
    fn expand_boundary_context() {
        let v = class(&[("a", 1.0), ("i", 1.0)]);
        let contexts =
            expand_context(&[ContextSlot::Boundary, ContextSlot::Class(v)], DEFAULT_BOUNDARY).unwrap();
        assert_eq!(contexts, vec!["_a", "_i"]);
    }

    #[test]
    fn expand_lone_boundary() {
        let contexts = expand_context(&[ContextSlot::Boundary], "#").unwrap();
        assert_eq!(contexts, vec!["#"]);
    }

    #[test]
    fn boundary_after_class_rejected() {
        let v = class(&[("a", 1.0)]);
        let err = expand_context(&[ContextSlot::Class(v), ContextSlot::Boundary], DEFAULT_BOUNDARY)
            .unwrap_err();
        assert_eq!(err, PhonotacticError::MisplacedBoundary(1));
    }

    #[test]
    fn merge_does_not_touch_shared_distribution() {
        let shared = class(&[("a", 1.0), ("e", 2.0)]);
        let extra = class(&[("a", 3.0), ("o", 1.0)]);
        let mut model = PhonotacticModel::new();

        model.add_condition("k", &shared);
        model.add_condition("t", &shared);
        model.add_condition("k", &extra);

        let t = model.condition("t").unwrap();
        assert!(Arc::ptr_eq(t, &shared));
        assert_eq!(t.weight("a"), Some(1.0));
        assert!(!t.contains("o"));
        assert_eq!(shared.weight("a"), Some(1.0));

        let k = model.condition("k").unwrap();
        assert!(!Arc::ptr_eq(k, &shared));
        assert_eq!(k.weight("a"), Some(4.0));
        assert_eq!(k.weight("e"), Some(2.0));
        assert_eq!(k.weight("o"), Some(1.0));
    }

    #[test]
    fn first_insertion_shares_reference() {
        let shared = class(&[("a", 1.0)]);
        let mut model = PhonotacticModel::new();
        model.add_exclusion("_", &shared);
        assert!(Arc::ptr_eq(model.exclusion("_").unwrap(), &shared));
    }

    #[test]
    fn exclusion_merge_unions_sets() {
        let first = class(&[("y", 1.0)]);
        let second = class(&[("w", 1.0)]);
        let mut model = PhonotacticModel::new();
        model.add_exclusion("_", &first);
        model.add_exclusion("_", &second);
        let e = model.exclusion("_").unwrap();
        assert!(e.contains("y") && e.contains("w"));
        assert!(!second.contains("y"));
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn exclusion_removes_tokens() {
        let base = class(&[("x", 1.0), ("y", 1.0)]);
        let mut model = PhonotacticModel::new();
        model.add_exclusion("_", &class(&[("y", 1.0)]));
        let dist = model.calc_distribution(base.distribution(), &ctx(&["_"]));
        assert_eq!(dist.tokens().collect::<Vec<_>>(), vec!["x"]);
    }

    #[test]
    fn condition_intersects_and_rescales() {
        let base = class(&[("a", 2.0), ("e", 1.0), ("o", 1.0)]);
        let mut model = PhonotacticModel::new();
        model.add_condition("k", &class(&[("a", 3.0), ("e", 0.5), ("u", 9.0)]));
        let dist = model.calc_distribution(base.distribution(), &ctx(&["_", "k"]));
        assert_eq!(dist.get("a"), Some(6.0));
        assert_eq!(dist.get("e"), Some(0.5));
        assert!(!dist.contains("o"));
        assert!(!dist.contains("u"));
    }

    #[test]
    fn shorter_context_applies_after_longer() {
        let base = class(&[("a", 1.0), ("i", 1.0)]);
        let mut model = PhonotacticModel::new();
        model.add_condition("ka", &class(&[("i", 2.0), ("a", 1.0)]));
        model.add_exclusion("a", &class(&[("i", 1.0)]));
        let dist = model.calc_distribution(base.distribution(), &ctx(&["_", "k", "a"]));
        assert_eq!(dist.tokens().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn unmatched_contexts_leave_base_alone() {
        let base = class(&[("a", 1.0), ("i", 2.0)]);
        let model = PhonotacticModel::new();
        let dist = model.calc_distribution(base.distribution(), &ctx(&["_", "p"]));
        assert_eq!(&dist, base.distribution());
    }
}
