//! The subject-predicate-object triple shared by every stage of the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One extracted factual relation: `subject --predicate--> object`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    /// Build a triple, trimming surrounding whitespace from every part.
    pub fn new(
        subject: impl AsRef<str>,
        predicate: impl AsRef<str>,
        object: impl AsRef<str>,
    ) -> Self {
        Self {
            subject: subject.as_ref().trim().to_string(),
            predicate: predicate.as_ref().trim().to_string(),
            object: object.as_ref().trim().to_string(),
        }
    }

    /// True when subject, predicate and object are all non-empty.
    pub fn is_complete(&self) -> bool {
        !self.subject.is_empty() && !self.predicate.is_empty() && !self.object.is_empty()
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.subject, self.predicate, self.object)
    }
}
