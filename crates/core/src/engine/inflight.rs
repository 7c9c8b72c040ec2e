//! Coalescing table: at most one computation in flight per artifact key.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::error::EngineResult;
use crate::model::Artifact;
use crate::store::StoreKey;

type Outcome = EngineResult<Option<Artifact>>;

#[derive(Default)]
pub(crate) struct InflightTable {
    cells: Mutex<HashMap<StoreKey, Arc<OnceCell<Outcome>>>>,
}

impl InflightTable {
    /// Run `compute` for `key` unless another thread already is; late callers
    /// block on the shared cell and receive a clone of the same outcome.
    pub(crate) fn run(&self, key: &StoreKey, compute: impl FnOnce() -> Outcome) -> Outcome {
        let cell = {
            let mut cells = self.cells.lock();
            cells.entry(key.clone()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        let outcome = cell.get_or_init(compute).clone();

        let mut cells = self.cells.lock();
        if cells.get(key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
            cells.remove(key);
        }
        outcome
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.cells.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::oid::Oid;

    #[test]
    fn concurrent_callers_share_one_computation() {
        let table = Arc::new(InflightTable::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = StoreKey::new("slow", Oid::from_bytes(b"k"), "");
        let barrier = Arc::new(std::sync::Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (table, calls, key, barrier) =
                    (table.clone(), calls.clone(), key.clone(), barrier.clone());
                std::thread::spawn(move || {
                    barrier.wait();
                    table.run(&key, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(200));
                        Ok(Some(Artifact::Count(7)))
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().expect("join"), Ok(Some(Artifact::Count(7))));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(table.len(), 0);
    }
}
