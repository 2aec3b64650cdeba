use sha2::{Digest, Sha256};
use std::collections::VecDeque;

type FrameDigest = [u8; 32];

/// Bounded history of screenshot content hashes for duplicate suppression.
///
/// Policy: window dedup — a frame counts as duplicate if its digest appears
/// anywhere in the last `capacity` frames, not just the most recent one. This
/// catches the client oscillating between two screens (A, B, A, ...), which
/// last-frame comparison would keep re-processing.
#[derive(Clone, Debug)]
pub struct FrameHistory {
    hashes: VecDeque<FrameDigest>,
    capacity: usize,
}

impl FrameHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            hashes: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Records the frame and reports whether it was already in the window.
    /// The digest is always appended, evicting the oldest entry once the
    /// window is full, duplicate or not.
    pub fn observe(&mut self, frame: &[u8]) -> bool {
        let digest: FrameDigest = Sha256::digest(frame).into();
        let duplicate = self.hashes.contains(&digest);
        self.hashes.push_back(digest);
        while self.hashes.len() > self.capacity {
            self.hashes.pop_front();
        }
        duplicate
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_frame_twice_is_duplicate() {
        let mut h = FrameHistory::new(3);
        assert!(!h.observe(b"frame-a"));
        assert!(h.observe(b"frame-a"));
    }

    #[test]
    fn distinct_frames_pass_through() {
        let mut h = FrameHistory::new(3);
        assert!(!h.observe(b"frame-a"));
        assert!(!h.observe(b"frame-b"));
        assert!(!h.observe(b"frame-c"));
    }

    #[test]
    fn window_catches_oscillation() {
        let mut h = FrameHistory::new(3);
        assert!(!h.observe(b"screen-a"));
        assert!(!h.observe(b"screen-b"));
        // back to A: still inside the 3-frame window
        assert!(h.observe(b"screen-a"));
    }

    #[test]
    fn old_frames_fall_out_of_the_window() {
        let mut h = FrameHistory::new(2);
        assert!(!h.observe(b"one"));
        assert!(!h.observe(b"two"));
        assert!(!h.observe(b"three"));
        // "one" was evicted, so it is fresh again
        assert!(!h.observe(b"one"));
        assert_eq!(h.len(), 2);
    }
}
