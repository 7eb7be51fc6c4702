use std::collections::{HashSet, VecDeque};

/// FIFO queue of discovered-but-not-yet-visited URLs
///
/// A URL is queued at most once at a time; the membership set is derived
/// from the queue and rebuilt on restore.
#[derive(Debug, Clone, Default)]
pub struct Frontier {
    queue: VecDeque<String>,
    queued: HashSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a frontier from its persisted queue, keeping order
    pub fn from_queue(queue: VecDeque<String>) -> Self {
        let mut frontier = Self::new();
        for url in queue {
            frontier.push(url);
        }
        frontier
    }

    /// Appends `url` unless it is already queued
    pub fn push(&mut self, url: String) -> bool {
        if self.queued.contains(&url) {
            return false;
        }
        self.queued.insert(url.clone());
        self.queue.push_back(url);
        true
    }

    pub fn pop(&mut self) -> Option<String> {
        let url = self.queue.pop_front()?;
        self.queued.remove(&url);
        Some(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.queued.contains(url)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// The queue in pop order, for checkpointing
    pub fn queue(&self) -> &VecDeque<String> {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_without_duplicates() {
        let mut frontier = Frontier::new();
        assert!(frontier.push("a".to_string()));
        assert!(frontier.push("b".to_string()));
        assert!(!frontier.push("a".to_string()));
        assert_eq!(frontier.len(), 2);
        assert_eq!(frontier.pop().as_deref(), Some("a"));
        assert!(!frontier.contains("a"));
        assert!(frontier.push("a".to_string()));
        assert_eq!(frontier.pop().as_deref(), Some("b"));
        assert_eq!(frontier.pop().as_deref(), Some("a"));
        assert!(frontier.is_empty());
    }

    #[test]
    fn test_restore_keeps_order() {
        let queue: VecDeque<String> = ["x", "y", "x", "z"].iter().map(|s| s.to_string()).collect();
        let frontier = Frontier::from_queue(queue);
        let restored: Vec<&str> = frontier.queue().iter().map(String::as_str).collect();
        assert_eq!(restored, vec!["x", "y", "z"]);
    }
}
