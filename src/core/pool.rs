//! Purpose: Per-table queues of outstanding batch work.
//! Exports: `RequestPool`.
//! Role: Work pool drained page by page by the batch pagers.
//! Invariants: Tables are visited in name order; queues are FIFO.
//! Invariants: A page never exceeds the requested limit and never includes empty tables.
use std::collections::{BTreeMap, VecDeque};

#[derive(Clone, Debug)]
pub struct RequestPool<T> {
    queues: BTreeMap<String, VecDeque<T>>,
}

impl<T> RequestPool<T> {
    pub fn new() -> Self {
        Self {
            queues: BTreeMap::new(),
        }
    }

    /// Put work back at the end of a table's queue for a later page.
    pub fn requeue<I>(&mut self, table: &str, requests: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.queue_mut(table).extend(requests);
    }

    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.values().all(VecDeque::is_empty)
    }

    /// Remove up to `limit` requests, filling from each table in order until
    /// the table runs dry or the page is full.
    pub fn take_page(&mut self, limit: usize) -> BTreeMap<String, Vec<T>> {
        let mut page = BTreeMap::new();
        let mut remaining = limit;
        for (table, queue) in self.queues.iter_mut() {
            if remaining == 0 {
                break;
            }
            if queue.is_empty() {
                continue;
            }
            let take = remaining.min(queue.len());
            let slice: Vec<T> = queue.drain(..take).collect();
            remaining -= slice.len();
            page.insert(table.clone(), slice);
        }
        page
    }

    fn queue_mut(&mut self, table: &str) -> &mut VecDeque<T> {
        self.queues.entry(table.to_string()).or_default()
    }
}

impl<T> Default for RequestPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<(String, Vec<T>)> for RequestPool<T> {
    fn from_iter<I: IntoIterator<Item = (String, Vec<T>)>>(iter: I) -> Self {
        let mut pool = Self::new();
        for (table, requests) in iter {
            pool.requeue(&table, requests);
        }
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::RequestPool;

    #[test]
    fn take_page_fills_tables_in_order() {
        let mut pool: RequestPool<u32> = [
            ("beta".to_string(), (0..4).collect::<Vec<_>>()),
            ("alpha".to_string(), (10..13).collect::<Vec<_>>()),
        ]
        .into_iter()
        .collect();
        assert_eq!(pool.len(), 7);

        let page = pool.take_page(5);
        assert_eq!(page["alpha"], vec![10, 11, 12]);
        assert_eq!(page["beta"], vec![0, 1]);

        let page = pool.take_page(5);
        assert!(!page.contains_key("alpha"));
        assert_eq!(page["beta"], vec![2, 3]);
        assert!(pool.is_empty());
        assert!(pool.take_page(5).is_empty());
    }

    #[test]
    fn requeued_work_goes_to_the_back() {
        let mut pool = RequestPool::new();
        pool.requeue("t", [1, 2]);
        let page = pool.take_page(1);
        pool.requeue("t", page["t"].clone());
        assert_eq!(pool.take_page(10)["t"], vec![2, 1]);
    }

    #[test]
    fn exhausted_tables_are_skipped() {
        let mut pool = RequestPool::new();
        pool.requeue("empty", Vec::<u8>::new());
        pool.requeue("full", [7]);
        let page = pool.take_page(25);
        assert_eq!(page.len(), 1);
        assert_eq!(page["full"], vec![7]);
        assert!(pool.is_empty());
    }
}
