use std::collections::VecDeque;

use crate::domain::Fetchable;

/// Distance from a seed. Seeds are at depth 1.
pub type Depth = u32;

/// Pending work. Items pushed while the queue is being drained are yielded
/// by the same drain.
#[derive(Debug, Default)]
pub struct FetchableQueue {
    items: VecDeque<(Fetchable, Depth)>,
}

impl FetchableQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: Fetchable, depth: Depth) {
        self.items.push_back((item, depth));
    }

    pub fn add_all<I>(&mut self, items: I, depth: Depth)
    where
        I: IntoIterator<Item = Fetchable>,
    {
        self.items
            .extend(items.into_iter().map(|item| (item, depth)));
    }

    pub fn pop(&mut self) -> Option<(Fetchable, Depth)> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Iterator for FetchableQueue {
    type Item = (Fetchable, Depth);

    fn next(&mut self) -> Option<Self::Item> {
        self.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_with_depths() {
        let mut queue = FetchableQueue::new();
        queue.add(Fetchable::unknown("http://a/"), 1);
        queue.add_all(
            vec![Fetchable::unknown("http://b/"), Fetchable::unknown("http://c/")],
            2,
        );
        assert_eq!(queue.len(), 3);

        let (first, depth) = queue.pop().unwrap();
        assert_eq!(first.to_string(), "unknown http://a/");
        assert_eq!(depth, 1);
        let (_, depth) = queue.pop().unwrap();
        assert_eq!(depth, 2);
    }

    #[test]
    fn test_items_added_while_draining_are_yielded() {
        let mut queue = FetchableQueue::new();
        queue.add(Fetchable::unknown("http://seed/"), 1);

        let mut seen = Vec::new();
        while let Some((item, depth)) = queue.pop() {
            seen.push((item.to_string(), depth));
            if depth < 3 {
                queue.add(Fetchable::unknown(format!("http://d{}/", depth + 1)), depth + 1);
            }
        }

        assert_eq!(
            seen,
            vec![
                ("unknown http://seed/".to_string(), 1),
                ("unknown http://d2/".to_string(), 2),
                ("unknown http://d3/".to_string(), 3),
            ]
        );
        assert!(queue.is_empty());
    }
}
