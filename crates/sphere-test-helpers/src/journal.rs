//! Cross-fake call ordering.

use std::cell::RefCell;
use std::rc::Rc;

/// Shared, ordered log of calls made on several fakes.
///
/// Hand the same journal to each fake with `with_journal` to check the order
/// in which the code under test releases resources.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Rc<RefCell<Vec<&'static str>>>,
}

impl Journal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn record(&self, entry: &'static str) {
        self.entries.borrow_mut().push(entry);
    }

    /// Every entry so far.
    pub fn entries(&self) -> Vec<&'static str> {
        self.entries.borrow().clone()
    }

    /// Index of the last occurrence of `entry`.
    pub fn last_position(&self, entry: &str) -> Option<usize> {
        self.entries.borrow().iter().rposition(|e| *e == entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_position() {
        let journal = Journal::new();
        journal.record("a");
        journal.record("b");
        journal.record("a");
        assert_eq!(journal.last_position("a"), Some(2));
        assert_eq!(journal.last_position("c"), None);
        assert_eq!(journal.entries(), ["a", "b", "a"]);
    }
}
