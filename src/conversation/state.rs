use std::slice::Iter;

use crate::error::{BotError, Result};

/// Results accepted so far, in step order. Steps get a snapshot taken when
/// they are called; the finalizer gets all of them.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState<V> {
    results: Vec<V>,
}

impl<V> ConversationState<V> {
    pub fn new(results: Vec<V>) -> Self {
        Self { results }
    }

    /// Result of the step at `index`, or an error when that step has not
    /// accepted yet.
    pub fn get(&self, index: usize) -> Result<&V> {
        self.results.get(index).ok_or_else(|| {
            BotError::conversation_error(format!(
                "no result for step {index}, only {} step(s) accepted",
                self.results.len()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, V> {
        self.results.iter()
    }

    pub fn into_inner(self) -> Vec<V> {
        self.results
    }
}

impl<'a, V> IntoIterator for &'a ConversationState<V> {
    type Item = &'a V;
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// What a step made of the update it was given.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<V> {
    /// Input accepted; the value is appended and the next step runs on the
    /// following update.
    Accept(V),
    /// Input refused; the same step runs again on the following update. The
    /// step tells the user what went wrong.
    Reject,
}
