//! Glossopoeia: word generation for invented languages.
//!
//! Produces novel, phonologically plausible words from a description that
//! combines a weighted syntax grammar with positional sound-conditioning
//! rules. An incremental weighted Earley recognizer keeps each
//! word-in-progress grammatical while a phonotactic model narrows the
//! characters allowed at every position.

pub mod core;
pub mod schema;

pub use crate::core::config::GeneratorConfig;
pub use crate::core::generator::{
    GenerationError, LanguageModel, ModelError, Word, WordGenerator, WordGeneratorBuilder,
};
pub use crate::schema::command::{ClassSpec, Command, ContextItem, Description, Symbol};
