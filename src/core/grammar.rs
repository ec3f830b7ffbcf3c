/// Weighted syntax grammar: production rules per nonterminal, validation,
/// and top-down stochastic expansion.

use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::environment::Environment;

/// Upper bound on nonterminal expansions per emitted slot in [`Grammar::expand`].
const EXPANSIONS_PER_SLOT: usize = 16;

#[derive(Debug, Error, PartialEq)]
pub enum GrammarError {
    #[error("invalid weight {weight} in rule for ${nonterminal}")]
    InvalidWeight { nonterminal: String, weight: f64 },
    #[error("rule for ${nonterminal} references undefined class #{class}")]
    UndefinedClass { nonterminal: String, class: String },
    #[error("no rules defined for root nonterminal ${0}")]
    NoRules(String),
}

/// One symbol on the right-hand side of a production rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleSymbol {
    /// Reference to another nonterminal: `$name`.
    Nonterminal(String),
    /// Reference to a named character class: `#name`.
    Class(String),
}

/// A weighted right-hand side for one nonterminal.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub symbols: Vec<RuleSymbol>,
    pub weight: f64,
}

/// All rules for one nonterminal. `total` always equals the sum of the
/// member weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    total: f64,
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn push(&mut self, rule: Rule) {
        self.total += rule.weight;
        self.rules.push(rule);
    }
}

/// The syntax model: a rule set per nonterminal.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    rule_sets: FxHashMap<String, RuleSet>,
}

impl Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule to `nonterminal`'s rule set.
    pub fn add_rule(
        &mut self,
        nonterminal: &str,
        symbols: Vec<RuleSymbol>,
        weight: f64,
    ) -> Result<(), GrammarError> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(GrammarError::InvalidWeight {
                nonterminal: nonterminal.to_string(),
                weight,
            });
        }
        self.rule_sets
            .entry(nonterminal.to_string())
            .or_default()
            .push(Rule { symbols, weight });
        Ok(())
    }

    pub fn rule_set(&self, nonterminal: &str) -> Option<&RuleSet> {
        self.rule_sets.get(nonterminal)
    }

    /// The rules for `nonterminal`, or an empty slice if it has none.
    pub fn rules(&self, nonterminal: &str) -> &[Rule] {
        self.rule_sets
            .get(nonterminal)
            .map(|rs| rs.rules())
            .unwrap_or(&[])
    }

    pub fn contains(&self, nonterminal: &str) -> bool {
        self.rule_sets.contains_key(nonterminal)
    }

    pub fn len(&self) -> usize {
        self.rule_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rule_sets.is_empty()
    }

    /// Check that `root` has rules and that every class a rule names is
    /// bound in `env`.
    pub fn validate(&self, root: &str, env: &Environment) -> Result<(), GrammarError> {
        if self.rules(root).is_empty() {
            return Err(GrammarError::NoRules(root.to_string()));
        }
        let mut names: Vec<&String> = self.rule_sets.keys().collect();
        names.sort();
        for nonterminal in names {
            for rule in self.rules(nonterminal) {
                for symbol in &rule.symbols {
                    if let RuleSymbol::Class(class) = symbol {
                        if !env.contains(class) {
                            return Err(GrammarError::UndefinedClass {
                                nonterminal: nonterminal.clone(),
                                class: class.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Nonterminals referenced on some right-hand side but never given rules.
    pub fn undefined_nonterminals(&self) -> Vec<String> {
        let mut missing: FxHashSet<&str> = FxHashSet::default();
        for rule_set in self.rule_sets.values() {
            for rule in rule_set.rules() {
                for symbol in &rule.symbols {
                    if let RuleSymbol::Nonterminal(name) = symbol {
                        if !self.rule_sets.contains_key(name) {
                            missing.insert(name);
                        }
                    }
                }
            }
        }
        let mut missing: Vec<String> = missing.into_iter().map(str::to_string).collect();
        missing.sort();
        missing
    }

    /// Pick one of `nonterminal`'s rules with probability proportional to
    /// its weight. `None` if it has no rules or they all weigh zero.
    pub fn choose<R: Rng + ?Sized>(&self, nonterminal: &str, rng: &mut R) -> Option<&Rule> {
        let rules = self.rules(nonterminal);
        let dist = WeightedIndex::new(rules.iter().map(|r| r.weight)).ok()?;
        Some(&rules[dist.sample(rng)])
    }

    /// Expand `root` top-down into a sequence of class names, choosing each
    /// nonterminal's rule at random.
    ///
    /// Returns `None` if a nonterminal cannot be expanded, the expansion
    /// yields more than `max_slots` classes, or it runs too long without
    /// producing slots (a self-recursive grammar).
    pub fn expand<R: Rng + ?Sized>(
        &self,
        root: &str,
        rng: &mut R,
        max_slots: usize,
    ) -> Option<Vec<String>> {
        let budget = EXPANSIONS_PER_SLOT * (max_slots + 1);
        let mut expansions = 0;
        let mut slots = Vec::new();
        // Pending symbols, last element is the next one to expand.
        let mut pending = vec![RuleSymbol::Nonterminal(root.to_string())];

        while let Some(symbol) = pending.pop() {
            match symbol {
                RuleSymbol::Class(name) => {
                    if slots.len() == max_slots {
                        return None;
                    }
                    slots.push(name);
                }
                RuleSymbol::Nonterminal(name) => {
                    expansions += 1;
                    if expansions > budget {
                        return None;
                    }
                    let rule = self.choose(&name, rng)?;
                    pending.extend(rule.symbols.iter().rev().cloned());
                }
            }
        }

        Some(slots)
    }
}
