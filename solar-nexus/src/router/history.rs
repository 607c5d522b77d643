//! Session history for the router.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub path: String,
    pub data: Option<Value>,
}

/// Navigation history with a cursor, so back and forward both work.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<HistoryEntry>,
    cursor: usize,
}

impl History {
    /// Create a history whose only entry is `initial`.
    pub fn new(initial: &str) -> Self {
        Self {
            entries: vec![HistoryEntry {
                path: initial.to_string(),
                data: None,
            }],
            cursor: 0,
        }
    }

    pub fn current(&self) -> &HistoryEntry {
        &self.entries[self.cursor]
    }

    /// Push a new entry, discarding anything forward of the cursor.
    pub fn push(&mut self, path: &str, data: Option<Value>) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(HistoryEntry {
            path: path.to_string(),
            data,
        });
        self.cursor = self.entries.len() - 1;
    }

    pub fn replace(&mut self, path: &str, data: Option<Value>) {
        self.entries[self.cursor] = HistoryEntry {
            path: path.to_string(),
            data,
        };
    }

    pub fn back(&mut self) -> Option<&HistoryEntry> {
        if !self.can_go_back() {
            return None;
        }
        self.cursor -= 1;
        Some(self.current())
    }

    pub fn forward(&mut self) -> Option<&HistoryEntry> {
        if !self.can_go_forward() {
            return None;
        }
        self.cursor += 1;
        Some(self.current())
    }

    pub fn can_go_back(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_and_forward() {
        let mut history = History::new("/");
        assert!(!history.can_go_back());

        history.push("/oldham", None);
        history.push("/quote", Some(serde_json::json!({ "from": "cta" })));
        assert_eq!(history.len(), 3);
        assert_eq!(history.current().path, "/quote");

        assert_eq!(history.back().map(|e| e.path.as_str()), Some("/oldham"));
        assert_eq!(history.back().map(|e| e.path.as_str()), Some("/"));
        assert!(history.back().is_none());

        let entry = history.forward().cloned().unwrap();
        assert_eq!(entry.path, "/oldham");
        assert!(history.can_go_forward());
    }

    #[test]
    fn push_discards_forward_entries() {
        let mut history = History::new("/");
        history.push("/oldham", None);
        history.push("/quote", None);
        history.back();
        history.push("/calculator", None);
        assert_eq!(history.len(), 3);
        assert!(!history.can_go_forward());
        assert_eq!(history.back().map(|e| e.path.as_str()), Some("/oldham"));
    }

    #[test]
    fn replace_keeps_length() {
        let mut history = History::new("/");
        history.replace("/uppermill", None);
        assert_eq!(history.len(), 1);
        assert_eq!(history.current().path, "/uppermill");
    }
}
