//! Deferred resource deletion for frames in flight.
//!
//! A resource referenced by a submitted frame cannot be freed until that
//! frame's fence has been waited. Resources are queued with the frame
//! number at which they were retired and released once every frame that
//! could still reference them has completed.

use std::collections::VecDeque;

/// FIFO of resources waiting for in-flight frames to retire.
#[derive(Debug)]
pub struct DeferredQueue<T> {
    pending: VecDeque<(u64, T)>,
    frames_in_flight: u64,
}

impl<T> DeferredQueue<T> {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            frames_in_flight: frames_in_flight as u64,
        }
    }

    /// Queue `item`, retired during frame `frame_number`.
    pub fn push(&mut self, item: T, frame_number: u64) {
        debug_assert!(self
            .pending
            .back()
            .map_or(true, |(queued, _)| *queued <= frame_number));
        self.pending.push_back((frame_number, item));
    }

    /// Remove and return every item that is safe to free at `frame_number`.
    ///
    /// Items queued at frame `n` are released once `frame_number >= n +
    /// frames_in_flight`, which is when frame `n`'s slot fence has been
    /// waited again.
    pub fn drain_ready(&mut self, frame_number: u64) -> Vec<T> {
        let mut ready = Vec::new();
        while let Some((queued, _)) = self.pending.front() {
            if queued + self.frames_in_flight > frame_number {
                break;
            }
            if let Some((_, item)) = self.pending.pop_front() {
                ready.push(item);
            }
        }
        ready
    }

    /// Remove everything, regardless of age. Use after `device_wait_idle`.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.pending.drain(..).map(|(_, item)| item).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_wait_for_frames_in_flight() {
        let mut queue = DeferredQueue::new(2);
        queue.push("a", 10);
        queue.push("b", 11);

        assert!(queue.drain_ready(10).is_empty());
        assert!(queue.drain_ready(11).is_empty());
        assert_eq!(queue.drain_ready(12), vec!["a"]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain_ready(13), vec!["b"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_ready_releases_all_mature_items_at_once() {
        let mut queue = DeferredQueue::new(2);
        for frame in 0..5 {
            queue.push(frame, frame);
        }
        assert_eq!(queue.drain_ready(100), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn drain_all_ignores_age() {
        let mut queue = DeferredQueue::new(2);
        queue.push(1u32, 50);
        queue.push(2u32, 51);
        assert_eq!(queue.drain_all(), vec![1, 2]);
        assert!(queue.is_empty());
    }
}
