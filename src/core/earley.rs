/// Incremental weighted Earley recognizer.
///
/// The recognizer accepts one token at a time and answers two questions
/// about the word-in-progress: which tokens may come next (and how likely
/// each is), and how likely it is that a complete word ends here. It never
/// builds a parse forest.
///
/// Columns live in an owned vector, one per accepted token plus the
/// initial column; backtracking is truncation.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::environment::{Distribution, Environment};
use crate::core::grammar::{Grammar, RuleSymbol};

/// One partial or complete derivation anchored at column `start`.
///
/// Terminal states record a scanned character class: `lhs` is the class
/// name and `rhs` is empty.
#[derive(Debug, Clone, Copy)]
pub struct State<'g> {
    pub lhs: &'g str,
    pub rhs: &'g [RuleSymbol],
    pub dot: usize,
    pub start: usize,
    pub terminal: bool,
    pub weight: f64,
}

/// Structural identity of a state; weight is deliberately not part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct StateKey<'g> {
    lhs: &'g str,
    rhs: &'g [RuleSymbol],
    dot: usize,
    start: usize,
    terminal: bool,
}

impl<'g> State<'g> {
    pub fn is_complete(&self) -> bool {
        self.dot >= self.rhs.len()
    }

    /// The symbol after the dot, if any.
    pub fn next_symbol(&self) -> Option<&'g RuleSymbol> {
        self.rhs.get(self.dot)
    }

    fn key(&self) -> StateKey<'g> {
        StateKey {
            lhs: self.lhs,
            rhs: self.rhs,
            dot: self.dot,
            start: self.start,
            terminal: self.terminal,
        }
    }

    /// This state with the dot moved past its next symbol.
    fn advanced(&self, weight: f64) -> State<'g> {
        State {
            dot: self.dot + 1,
            terminal: false,
            weight,
            ..*self
        }
    }

    /// Whether this incomplete state is waiting for `child` to complete.
    fn awaits(&self, child: &State<'g>) -> bool {
        match self.next_symbol() {
            Some(RuleSymbol::Class(name)) => child.terminal && name == child.lhs,
            Some(RuleSymbol::Nonterminal(name)) => !child.terminal && name == child.lhs,
            None => false,
        }
    }
}

/// The chart states at one word position, in insertion order, with
/// duplicates merged by summing their weight.
#[derive(Debug, Default)]
pub struct Column<'g> {
    states: Vec<State<'g>>,
    index: FxHashMap<StateKey<'g>, usize>,
    finished: bool,
}

impl<'g> Column<'g> {
    /// Add `state`, or fold its weight into an identical existing state.
    /// Returns true if the state was new.
    fn add(&mut self, state: State<'g>) -> bool {
        let key = state.key();
        if let Some(&i) = self.index.get(&key) {
            self.states[i].weight += state.weight;
            false
        } else {
            self.index.insert(key, self.states.len());
            self.states.push(state);
            true
        }
    }

    pub fn states(&self) -> &[State<'g>] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// True if a complete derivation of the root spans the whole input.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// A chart over a frozen grammar and class environment.
#[derive(Debug)]
pub struct Recognizer<'g> {
    grammar: &'g Grammar,
    env: &'g Environment,
    root: &'g str,
    columns: Vec<Column<'g>>,
}

impl<'g> Recognizer<'g> {
    /// Seed column 0 with every rule of `root` and close it.
    pub fn new(grammar: &'g Grammar, env: &'g Environment, root: &'g str) -> Self {
        let mut first = Column::default();
        for rule in grammar.rules(root) {
            first.add(State {
                lhs: root,
                rhs: &rule.symbols,
                dot: 0,
                start: 0,
                terminal: false,
                weight: rule.weight,
            });
        }

        let mut recognizer = Recognizer {
            grammar,
            env,
            root,
            columns: vec![first],
        };
        recognizer.process(0);
        recognizer
    }

    /// Number of tokens accepted so far.
    pub fn position(&self) -> usize {
        self.columns.len() - 1
    }

    pub fn current(&self) -> &Column<'g> {
        &self.columns[self.columns.len() - 1]
    }

    pub fn is_finished(&self) -> bool {
        self.current().is_finished()
    }

    /// Close column `col` under prediction and completion. States appended
    /// while scanning are themselves processed.
    ///
    /// A nonterminal that derives nothing completes in the column where it
    /// was predicted, possibly before some of the states waiting on it are
    /// added. Those late waiters are advanced when they are processed.
    fn process(&mut self, col: usize) {
        // (parent, child) index pairs already combined for children
        // spanning no input.
        let mut combined: FxHashSet<(usize, usize)> = FxHashSet::default();
        let mut i = 0;
        while i < self.columns[col].states.len() {
            let state = self.columns[col].states[i];
            if state.is_complete() {
                if !state.terminal && state.start == 0 && state.lhs == self.root {
                    self.columns[col].finished = true;
                }
                self.complete(col, i, &mut combined);
            } else if let Some(RuleSymbol::Nonterminal(name)) = state.next_symbol() {
                self.predict(col, name, state.weight);
                self.complete_nulled(col, i, &mut combined);
            }
            i += 1;
        }
    }

    fn predict(&mut self, col: usize, nonterminal: &'g str, parent_weight: f64) {
        let grammar = self.grammar;
        for rule in grammar.rules(nonterminal) {
            self.columns[col].add(State {
                lhs: nonterminal,
                rhs: &rule.symbols,
                dot: 0,
                start: col,
                terminal: false,
                weight: parent_weight * rule.weight,
            });
        }
    }

    /// Advance every state in the child's start column that was waiting for
    /// it. The advanced state carries the child's weight; the waiting
    /// parent's own weight is not multiplied in.
    fn complete(
        &mut self,
        col: usize,
        child_index: usize,
        combined: &mut FxHashSet<(usize, usize)>,
    ) {
        let child = self.columns[col].states[child_index];
        let advanced: Vec<State<'g>> = self.columns[child.start]
            .states
            .iter()
            .enumerate()
            .filter(|(p, parent)| {
                parent.awaits(&child)
                    && (child.start != col || combined.insert((*p, child_index)))
            })
            .map(|(_, parent)| parent.advanced(child.weight))
            .collect();

        for state in advanced {
            self.columns[col].add(state);
        }
    }

    /// Advance the waiting state at `parent_index` past any nonterminal that
    /// already completed in this column without consuming input.
    fn complete_nulled(
        &mut self,
        col: usize,
        parent_index: usize,
        combined: &mut FxHashSet<(usize, usize)>,
    ) {
        let parent = self.columns[col].states[parent_index];
        let advanced: Vec<State<'g>> = self.columns[col]
            .states
            .iter()
            .enumerate()
            .filter(|(c, child)| {
                child.is_complete()
                    && child.start == col
                    && parent.awaits(child)
                    && combined.insert((parent_index, *c))
            })
            .map(|(_, child)| parent.advanced(child.weight))
            .collect();

        for state in advanced {
            self.columns[col].add(state);
        }
    }

    /// Accept `token` as the next character.
    ///
    /// Returns false, leaving the chart untouched, if no state in the
    /// current column expects a class containing `token`.
    pub fn advance(&mut self, token: &str) -> bool {
        let current = self.position();
        let mut next = Column::default();

        for state in &self.columns[current].states {
            if let Some(RuleSymbol::Class(name)) = state.next_symbol() {
                let accepts = self.env.get(name).is_some_and(|c| c.contains(token));
                if accepts {
                    next.add(State {
                        lhs: name,
                        rhs: &[],
                        dot: 0,
                        start: current,
                        terminal: true,
                        weight: state.weight,
                    });
                }
            }
        }

        if next.is_empty() {
            log::trace!("token '{}' rejected at position {}", token, current);
            return false;
        }

        self.columns.push(next);
        self.process(current + 1);
        log::trace!(
            "token '{}' accepted at position {} ({} states)",
            token,
            current,
            self.current().len()
        );
        true
    }

    /// Drop the most recently accepted token. Column 0 is never removed.
    pub fn retreat(&mut self) {
        if self.columns.len() > 1 {
            self.columns.pop();
        }
    }

    /// Weight of finished root derivations over the weight of states that
    /// could still continue. 1.0 when nothing can continue.
    pub fn termination_probability(&self) -> f64 {
        let mut done = 0.0;
        let mut cont = 0.0;
        for state in self.current().states() {
            if !state.is_complete() {
                cont += state.weight;
            } else if !state.terminal && state.start == 0 && state.lhs == self.root {
                done += state.weight;
            }
        }
        if cont > 0.0 {
            done / cont
        } else {
            1.0
        }
    }

    /// Candidate next tokens: each waiting class's weights scaled by the
    /// waiting state's weight, summed across states.
    pub fn allowed_tokens(&self) -> Distribution {
        let mut dist = Distribution::new();
        for state in self.current().states() {
            if let Some(RuleSymbol::Class(name)) = state.next_symbol() {
                if let Some(class) = self.env.get(name) {
                    for (token, weight) in class.distribution().iter() {
                        dist.add(token, weight * state.weight);
                    }
                }
            }
        }
        dist
    }
}
