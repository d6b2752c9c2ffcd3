//! Round-robin batching of market ids

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Cursor {
    ids: Vec<String>,
    next: usize,
}

/// Hands out contiguous batches of at most `batch_size` ids per call
///
/// When every id fits in one batch the whole set is returned each time.
/// Otherwise batches walk the list from a cursor; the batch that reaches the
/// end is returned short and the cursor wraps to zero.
#[derive(Debug)]
pub struct RoundRobin {
    batch_size: usize,
    cursor: Mutex<Cursor>,
}

impl RoundRobin {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            cursor: Mutex::new(Cursor::default()),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Replace the id list and restart from the first id
    pub fn set_market_ids(&self, ids: Vec<String>) {
        let mut cursor = self.cursor.lock();
        cursor.ids = ids;
        cursor.next = 0;
    }

    pub fn len(&self) -> usize {
        self.cursor.lock().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.lock().ids.is_empty()
    }

    /// Next batch; empty when there are no ids
    pub fn next_batch(&self) -> Vec<String> {
        let mut cursor = self.cursor.lock();
        let total = cursor.ids.len();

        if total <= self.batch_size {
            return cursor.ids.clone();
        }

        let start = cursor.next;
        let end = start + self.batch_size;
        if end >= total {
            cursor.next = 0;
            cursor.ids[start..].to_vec()
        } else {
            cursor.next = end;
            cursor.ids[start..end].to_vec()
        }
    }
}
