/// The word generator: builds a frozen language model from description
/// commands and searches it for new words.
///
/// Each call to [`WordGenerator::generate`] runs one backtracking search.
/// The recognizer keeps the word-in-progress grammatical, the phonotactic
/// model narrows each position's candidates, and the session's set of
/// emitted words keeps results unique.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::core::config::{ConfigError, GeneratorConfig};
use crate::core::earley::Recognizer;
use crate::core::environment::{CharClass, Environment, EnvironmentError};
use crate::core::grammar::{Grammar, GrammarError, RuleSymbol};
use crate::core::phonotactics::{expand_context, ContextSlot, PhonotacticError, PhonotacticModel};
use crate::schema::command::{
    ClassSpec, Command, ContextItem, Description, DescriptionError, Symbol,
};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("environment error: {0}")]
    Environment(#[from] EnvironmentError),
    #[error("grammar error: {0}")]
    Grammar(#[from] GrammarError),
    #[error("phonotactic error: {0}")]
    Phonotactic(#[from] PhonotacticError),
    #[error("description error: {0}")]
    Description(#[from] DescriptionError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("description defines no productions")]
    NoProductions,
}

#[derive(Debug, Error, PartialEq)]
pub enum GenerationError {
    #[error("minimum length {min} exceeds maximum length {max}")]
    InvalidBounds { min: usize, max: usize },
}

/// A generated word as its sequence of tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Word {
    tokens: Vec<String>,
}

impl Word {
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Number of tokens (not bytes or chars).
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            f.write_str(token)?;
        }
        Ok(())
    }
}

/// Grammar, classes and phonotactic tables after every command has run.
/// Read-only from here on.
#[derive(Debug, Clone)]
pub struct LanguageModel {
    grammar: Grammar,
    env: Environment,
    phonotactics: PhonotacticModel,
    root: String,
}

impl LanguageModel {
    /// Execute `description`'s commands in order and freeze the result.
    pub fn from_description(
        description: Description,
        config: &GeneratorConfig,
    ) -> Result<LanguageModel, ModelError> {
        let mut draft = ModelDraft::default();
        for command in description {
            draft.execute(command, &config.boundary)?;
        }
        draft.freeze(config.root.clone())
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn phonotactics(&self) -> &PhonotacticModel {
        &self.phonotactics
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// A fresh recognizer positioned at the start of a word.
    pub fn recognizer(&self) -> Recognizer<'_> {
        Recognizer::new(&self.grammar, &self.env, &self.root)
    }
}

/// Model tables while commands are still being executed.
#[derive(Debug, Default)]
struct ModelDraft {
    grammar: Grammar,
    env: Environment,
    phonotactics: PhonotacticModel,
    first_nonterminal: Option<String>,
}

impl ModelDraft {
    fn execute(&mut self, command: Command, boundary: &str) -> Result<(), ModelError> {
        match command {
            Command::Production {
                nonterminal,
                symbols,
                weight,
            } => {
                let mut rule = Vec::with_capacity(symbols.len());
                for symbol in symbols {
                    rule.push(match symbol {
                        Symbol::Nonterminal(name) => RuleSymbol::Nonterminal(name),
                        // Resolved lazily; checked when the model is frozen.
                        Symbol::ClassRef(name) => RuleSymbol::Class(name),
                        Symbol::InlineClass(literal) => {
                            let class = Arc::new(CharClass::from_pairs(literal)?);
                            RuleSymbol::Class(self.env.assign_generated(class))
                        }
                    });
                }
                self.grammar.add_rule(&nonterminal, rule, weight)?;
                if self.first_nonterminal.is_none() {
                    self.first_nonterminal = Some(nonterminal);
                }
            }
            Command::Definition { name, class } => {
                let class = self.class(class)?;
                self.env.define(name, class);
            }
            Command::Condition { context, class } => {
                let class = self.class(class)?;
                for ngram in self.contexts(context, boundary)? {
                    self.phonotactics.add_condition(&ngram, &class);
                }
            }
            Command::Exclusion { context, class } => {
                let class = self.class(class)?;
                for ngram in self.contexts(context, boundary)? {
                    self.phonotactics.add_exclusion(&ngram, &class);
                }
            }
        }
        Ok(())
    }

    fn class(&self, spec: ClassSpec) -> Result<Arc<CharClass>, ModelError> {
        match spec {
            ClassSpec::Ref(name) => Ok(Arc::clone(self.env.lookup(&name)?)),
            ClassSpec::Inline(literal) => Ok(Arc::new(CharClass::from_pairs(literal)?)),
        }
    }

    fn contexts(&self, items: Vec<ContextItem>, boundary: &str) -> Result<Vec<String>, ModelError> {
        let mut slots = Vec::with_capacity(items.len());
        for item in items {
            slots.push(match item {
                ContextItem::Boundary => ContextSlot::Boundary,
                ContextItem::Class(spec) => ContextSlot::Class(self.class(spec)?),
            });
        }
        Ok(expand_context(&slots, boundary)?)
    }

    fn freeze(self, root: Option<String>) -> Result<LanguageModel, ModelError> {
        let root = root
            .or(self.first_nonterminal)
            .ok_or(ModelError::NoProductions)?;
        self.grammar.validate(&root, &self.env)?;

        for name in self.grammar.undefined_nonterminals() {
            log::warn!("nonterminal ${} is referenced but has no rules", name);
        }
        log::debug!(
            "language model ready: root ${}, {} nonterminals, {} classes, {} conditions, {} exclusions",
            root,
            self.grammar.len(),
            self.env.len(),
            self.phonotactics.condition_count(),
            self.phonotactics.exclusion_count()
        );

        Ok(LanguageModel {
            grammar: self.grammar,
            env: self.env,
            phonotactics: self.phonotactics,
            root,
        })
    }
}

/// Where the builder's commands come from, in arrival order.
enum Source {
    Commands(Vec<Command>),
    File(PathBuf),
}

/// Builder for a [`WordGenerator`]. Commands run in the order they were
/// supplied when [`build`](Self::build) is called.
pub struct WordGeneratorBuilder {
    sources: Vec<Source>,
    config: GeneratorConfig,
}

impl WordGeneratorBuilder {
    pub fn description(mut self, description: Description) -> Self {
        self.sources.push(Source::Commands(description.commands));
        self
    }

    pub fn command(mut self, command: Command) -> Self {
        self.sources.push(Source::Commands(vec![command]));
        self
    }

    /// Read a RON description file at build time.
    pub fn description_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(Source::File(path.into()));
        self
    }

    pub fn config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the configuration with one read from a RON file.
    pub fn config_file(mut self, path: &Path) -> Result<Self, ModelError> {
        self.config = GeneratorConfig::load_from_ron(path)?;
        Ok(self)
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn root(mut self, root: &str) -> Self {
        self.config.root = Some(root.to_string());
        self
    }

    pub fn depth_limit(mut self, limit: usize) -> Self {
        self.config.depth_limit = limit;
        self
    }

    pub fn boundary(mut self, marker: &str) -> Self {
        self.config.boundary = marker.to_string();
        self
    }

    /// Build with a `StdRng` seeded from the configured seed, or from
    /// entropy if none is set.
    pub fn build(self) -> Result<WordGenerator<StdRng>, ModelError> {
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.build_with_rng(rng)
    }

    /// Build with an explicit random source.
    pub fn build_with_rng<R: Rng>(self, rng: R) -> Result<WordGenerator<R>, ModelError> {
        let mut description = Description::default();
        for source in self.sources {
            match source {
                Source::Commands(commands) => description.commands.extend(commands),
                Source::File(path) => {
                    let loaded = Description::load_from_ron(&path)?;
                    log::debug!("loaded {} commands from {}", loaded.len(), path.display());
                    description.commands.extend(loaded.commands);
                }
            }
        }
        let model = LanguageModel::from_description(description, &self.config)?;
        Ok(WordGenerator::new(model, self.config, rng))
    }
}

/// Generates unique words from a frozen [`LanguageModel`].
pub struct WordGenerator<R = StdRng> {
    model: LanguageModel,
    config: GeneratorConfig,
    rng: R,
    emitted: FxHashSet<String>,
}

impl WordGenerator<StdRng> {
    pub fn builder() -> WordGeneratorBuilder {
        WordGeneratorBuilder {
            sources: Vec::new(),
            config: GeneratorConfig::default(),
        }
    }
}

impl<R: Rng> WordGenerator<R> {
    pub fn new(model: LanguageModel, config: GeneratorConfig, rng: R) -> Self {
        Self {
            model,
            config,
            rng,
            emitted: FxHashSet::default(),
        }
    }

    pub fn model(&self) -> &LanguageModel {
        &self.model
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Every word this generator has returned so far.
    pub fn emitted(&self) -> &FxHashSet<String> {
        &self.emitted
    }

    pub fn has_emitted(&self, word: &str) -> bool {
        self.emitted.contains(word)
    }

    /// Search for one word of `min..=max` tokens that has not been emitted
    /// before. A bound of 0 leaves that side open; with no upper bound the
    /// configured depth limit caps the search.
    ///
    /// `Ok(None)` means the search was exhausted without finding a new word.
    pub fn generate(&mut self, min: usize, max: usize) -> Result<Option<Word>, GenerationError> {
        if min > 0 && max > 0 && min > max {
            return Err(GenerationError::InvalidBounds { min, max });
        }
        let cap = if max > 0 { max } else { self.config.depth_limit };

        let mut recognizer =
            Recognizer::new(&self.model.grammar, &self.model.env, &self.model.root);
        let mut sequence = vec![self.config.boundary.clone()];
        let mut search = Search {
            phonotactics: &self.model.phonotactics,
            rng: &mut self.rng,
            emitted: &mut self.emitted,
            min,
            cap,
        };

        if search.step(&mut recognizer, &mut sequence) {
            sequence.remove(0);
            log::debug!("generated word of {} tokens", sequence.len());
            Ok(Some(Word { tokens: sequence }))
        } else {
            log::debug!("no new word within bounds {}..{}", min, max);
            Ok(None)
        }
    }

    /// Generate up to `count` words, stopping early at the first exhausted
    /// search.
    pub fn generate_batch(
        &mut self,
        count: usize,
        min: usize,
        max: usize,
    ) -> Result<Vec<Word>, GenerationError> {
        let mut words = Vec::with_capacity(count);
        while words.len() < count {
            match self.generate(min, max)? {
                Some(word) => words.push(word),
                None => break,
            }
        }
        Ok(words)
    }

    /// Generate up to `count` words within the configured
    /// `min_length..=max_length`.
    pub fn generate_configured(&mut self, count: usize) -> Result<Vec<Word>, GenerationError> {
        let (min, max) = (self.config.min_length, self.config.max_length);
        self.generate_batch(count, min, max)
    }

    /// One-pass generation without backtracking or uniqueness: expand the
    /// grammar top-down into class slots, then fill each slot from its
    /// class narrowed by the phonotactic model.
    ///
    /// Returns `None` if the expansion runs past the length limit or a slot
    /// has no admissible token of positive weight left.
    pub fn sketch(&mut self) -> Option<Word> {
        let limit = if self.config.max_length > 0 {
            self.config.max_length
        } else {
            self.config.depth_limit
        };
        let slots = self
            .model
            .grammar
            .expand(&self.model.root, &mut self.rng, limit)?;

        let mut sequence = vec![self.config.boundary.clone()];
        for slot in slots {
            let class = self.model.env.get(&slot)?;
            let candidates = self
                .model
                .phonotactics
                .calc_distribution(class.distribution(), &sequence)
                .into_entries();
            let dist = WeightedIndex::new(candidates.iter().map(|(_, w)| *w)).ok()?;
            let i = dist.sample(&mut self.rng);
            sequence.push(candidates[i].0.clone());
        }

        sequence.remove(0);
        Some(Word { tokens: sequence })
    }
}

/// State shared by one backtracking search.
struct Search<'a, R> {
    phonotactics: &'a PhonotacticModel,
    rng: &'a mut R,
    emitted: &'a mut FxHashSet<String>,
    min: usize,
    cap: usize,
}

impl<R: Rng> Search<'_, R> {
    /// Try to complete `sequence` (boundary marker first) into a new word.
    /// On success `sequence` holds the word; on failure it and the
    /// recognizer are back where they started.
    fn step(&mut self, recognizer: &mut Recognizer<'_>, sequence: &mut Vec<String>) -> bool {
        let chosen = sequence.len() - 1;
        if recognizer.is_finished() && chosen >= self.min {
            let stop = self.rng.gen::<f64>() < recognizer.termination_probability();
            if stop {
                self.finalize(sequence) || self.extend(recognizer, sequence)
            } else {
                self.extend(recognizer, sequence) || self.finalize(sequence)
            }
        } else {
            self.extend(recognizer, sequence)
        }
    }

    fn finalize(&mut self, sequence: &[String]) -> bool {
        let word = sequence[1..].concat();
        self.emitted.insert(word)
    }

    /// Sample the next token without replacement until one leads to a word.
    fn extend(&mut self, recognizer: &mut Recognizer<'_>, sequence: &mut Vec<String>) -> bool {
        if sequence.len() - 1 >= self.cap {
            return false;
        }

        let allowed = recognizer.allowed_tokens();
        let narrowed = self.phonotactics.calc_distribution(&allowed, sequence);
        let mut candidates = narrowed.into_entries();
        let mut total: f64 = candidates.iter().map(|(_, w)| w).sum();

        // Zero-weight candidates stay in the pool and come up once the
        // weighted ones are spent.
        while !candidates.is_empty() {
            let i = draw(&candidates, total, &mut *self.rng);
            let (token, weight) = candidates.remove(i);
            total = (total - weight).max(0.0);

            if recognizer.advance(&token) {
                sequence.push(token);
                if self.step(recognizer, sequence) {
                    return true;
                }
                sequence.pop();
                recognizer.retreat();
            }
        }
        false
    }
}

/// Pick an index with probability proportional to its weight. With a zero
/// total the first candidate is taken; when rounding leaves a remainder
/// the last one is.
fn draw<R: Rng + ?Sized>(candidates: &[(String, f64)], total: f64, rng: &mut R) -> usize {
    let mut r = rng.gen::<f64>() * total;
    for (i, (_, weight)) in candidates.iter().enumerate() {
        r -= weight;
        if r <= 0.0 {
            return i;
        }
    }
    candidates.len() - 1
}
