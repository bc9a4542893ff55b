//! Puffer für Remote Candidates vor der Remote Description

use crate::signaling::IceCandidate;
use std::collections::VecDeque;

/// Candidates in Empfangsreihenfolge
#[derive(Debug, Default)]
pub struct PendingCandidateQueue {
    candidates: VecDeque<IceCandidate>,
}

impl PendingCandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: IceCandidate) {
        self.candidates.push_back(candidate);
    }

    /// Ältester gepufferter Candidate
    pub fn pop(&mut self) -> Option<IceCandidate> {
        self.candidates.pop_front()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_in_receipt_order() {
        let mut queue = PendingCandidateQueue::new();
        queue.push(IceCandidate::new("a"));
        queue.push(IceCandidate::new("b"));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().candidate, "a");
        assert_eq!(queue.pop().unwrap().candidate, "b");
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }
}
