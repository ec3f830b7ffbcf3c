use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// A class literal: `(token, weight)` pairs in source order. Duplicate
/// tokens are summed when the literal is interpreted.
pub type ClassLiteral = Vec<(String, f64)>;

fn default_weight() -> f64 {
    1.0
}

/// A character class as written in a command: a reference to a named
/// class or an inline literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassSpec {
    Ref(String),
    Inline(ClassLiteral),
}

/// One symbol on the right-hand side of a production.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Symbol {
    Nonterminal(String),
    ClassRef(String),
    InlineClass(ClassLiteral),
}

/// One position of a phonotactic context pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContextItem {
    /// Word boundary; only valid as the first item.
    Boundary,
    Class(ClassSpec),
}

/// A single instruction from a language description. Commands are executed
/// in order to build the generator's model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// `$nonterminal -> symbols *weight`
    Production {
        nonterminal: String,
        symbols: Vec<Symbol>,
        #[serde(default = "default_weight")]
        weight: f64,
    },
    /// `#name = class`
    Definition { name: String, class: ClassSpec },
    /// `context -> class`
    Condition {
        context: Vec<ContextItem>,
        class: ClassSpec,
    },
    /// `context !> class`
    Exclusion {
        context: Vec<ContextItem>,
        class: ClassSpec,
    },
}

/// An ordered list of commands describing one language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Description {
    pub commands: Vec<Command>,
}

impl Description {
    /// Load a description from a RON file holding a list of commands.
    pub fn load_from_ron(path: &Path) -> Result<Description, DescriptionError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a description from a RON string.
    pub fn parse_ron(input: &str) -> Result<Description, DescriptionError> {
        Ok(ron::from_str(input)?)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl From<Vec<Command>> for Description {
    fn from(commands: Vec<Command>) -> Self {
        Description { commands }
    }
}

impl IntoIterator for Description {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_production_with_default_weight() {
        let d = Description::parse_ron(
            r#"[Production(nonterminal: "S", symbols: [ClassRef("a")])]"#,
        )
        .unwrap();
        assert_eq!(
            d.commands,
            vec![Command::Production {
                nonterminal: "S".to_string(),
                symbols: vec![Symbol::ClassRef("a".to_string())],
                weight: 1.0,
            }]
        );
    }

    #[test]
    fn parse_inline_class_and_context() {
        let d = Description::parse_ron(
            r#"[
                Definition(name: "a", class: Inline([("x", 1.0), ("y", 2.5)])),
                Exclusion(context: [Boundary, Class(Ref("a"))], class: Inline([("y", 1.0)])),
            ]"#,
        )
        .unwrap();
        assert_eq!(d.len(), 2);
        match &d.commands[1] {
            Command::Exclusion { context, class } => {
                assert_eq!(context[0], ContextItem::Boundary);
                assert_eq!(context[1], ContextItem::Class(ClassSpec::Ref("a".to_string())));
                assert_eq!(class, &ClassSpec::Inline(vec![("y".to_string(), 1.0)]));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn malformed_description_is_an_error() {
        assert!(Description::parse_ron("[Production(nonterminal: 3)]").is_err());
    }

    #[test]
    fn ron_round_trip() {
        let d = Description::from(vec![Command::Condition {
            context: vec![ContextItem::Class(ClassSpec::Inline(vec![("k".to_string(), 1.0)]))],
            class: ClassSpec::Ref("V".to_string()),
        }]);
        let serialized = ron::to_string(&d).unwrap();
        let deserialized = Description::parse_ron(&serialized).unwrap();
        assert_eq!(deserialized, d);
    }

    #[test]
    fn load_fixture_description() {
        let path = std::path::PathBuf::from("tests/fixtures/cv_language.ron");
        let d = Description::load_from_ron(&path).unwrap();
        assert!(!d.is_empty());
        assert!(matches!(d.commands[0], Command::Definition { .. }));
    }
}
