use serde::Deserialize;

use crate::constants::DEFAULT_EXAMPLES;

/// One few-shot pair shown to the model before the user's query.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Example {
    pub query: String,
    pub command: String,
}

impl Example {
    pub fn new(query: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            command: command.into(),
        }
    }
}

/// Ordered, read-only collection of examples. Built once at startup; there is
/// no way to add or remove entries afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExampleBank {
    examples: Vec<Example>,
}

impl ExampleBank {
    pub fn new(examples: Vec<Example>) -> Self {
        Self { examples }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Example> {
        self.examples.iter()
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

impl Default for ExampleBank {
    fn default() -> Self {
        Self::new(
            DEFAULT_EXAMPLES
                .iter()
                .map(|(query, command)| Example::new(*query, *command))
                .collect(),
        )
    }
}
