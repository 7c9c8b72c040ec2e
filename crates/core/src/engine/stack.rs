//! Per-thread stack of artifact keys under construction, for cycle detection.

use std::cell::RefCell;

use crate::error::{EngineError, EngineResult};
use crate::store::StoreKey;

thread_local! {
    static CALL_STACK: RefCell<Vec<StoreKey>> = const { RefCell::new(Vec::new()) };
}

/// Pops its key when dropped.
#[derive(Debug)]
pub(crate) struct CallFrame {
    _private: (),
}

impl Drop for CallFrame {
    fn drop(&mut self) {
        CALL_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Push `key`, failing with `DependencyCycle` if this thread is already computing it.
pub(crate) fn enter(key: &StoreKey) -> EngineResult<CallFrame> {
    CALL_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(pos) = stack.iter().position(|k| k == key) {
            let chain: Vec<String> =
                stack[pos..].iter().chain(std::iter::once(key)).map(|k| k.module.clone()).collect();
            return Err(EngineError::DependencyCycle { chain: chain.join(" -> ") });
        }
        stack.push(key.clone());
        Ok(CallFrame { _private: () })
    })
}

/// Depth of the current thread's stack.
#[cfg(test)]
pub(crate) fn depth() -> usize {
    CALL_STACK.with(|stack| stack.borrow().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid::Oid;

    #[test]
    fn reentry_is_a_cycle() {
        let a = StoreKey::new("a", Oid::from_bytes(b"1"), "");
        let b = StoreKey::new("b", Oid::from_bytes(b"1"), "");
        let fa = enter(&a).expect("enter a");
        let fb = enter(&b).expect("enter b");
        let err = enter(&a).expect_err("cycle");
        assert_eq!(err, EngineError::DependencyCycle { chain: "a -> b -> a".into() });
        drop(fb);
        drop(fa);
        assert_eq!(depth(), 0);
    }
}
