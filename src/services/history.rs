use crate::models::classify_types::ClassificationResult;
use std::collections::VecDeque;

/// Result sets produced during this run, newest first. Never written to disk.
#[derive(Debug, Default, Clone)]
pub struct SessionHistory {
    entries: VecDeque<ClassificationResult>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: ClassificationResult) {
        self.entries.push_front(result);
    }

    pub fn latest(&self) -> Option<&ClassificationResult> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassificationResult> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
