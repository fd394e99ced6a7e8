//! One-shot completion handles for commit and trim waiters.
//!
//! A [`Completion`] owns its continuation: ownership transfers into the
//! ledger on registration and back out on delivery, so a handle is fired
//! exactly once or never. A handle that is dropped without either being
//! fired or explicitly cancelled warns on stderr; that path means some
//! collaborator lost track of a waiter it promised to deliver.

/// An owned, move-only, one-shot continuation.
pub struct Completion {
    inner: Option<Box<dyn FnOnce()>>,
}

impl Completion {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Completion {
            inner: Some(Box::new(f)),
        }
    }

    /// Invoke the continuation, consuming the handle.
    pub fn fire(mut self) {
        if let Some(f) = self.inner.take() {
            f();
        }
    }

    /// Discard the continuation without firing and without the drop
    /// warning. For deliberate displacement (e.g. a waiter re-registered
    /// under the same key).
    pub fn cancel(mut self) {
        self.inner.take();
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.inner.is_some())
            .finish()
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.inner.is_some() {
            eprintln!("WARNING: completion dropped without firing");
        }
    }
}

/// Fire a drained waiter list in order.
pub fn fire_completions(ls: Vec<Completion>) {
    for c in ls {
        c.fire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_fire_consumes() {
        let hits = Rc::new(RefCell::new(0));
        let h = hits.clone();
        let c = Completion::new(move || *h.borrow_mut() += 1);
        c.fire();
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn test_cancel_never_fires() {
        let hits = Rc::new(RefCell::new(0));
        let h = hits.clone();
        let c = Completion::new(move || *h.borrow_mut() += 1);
        c.cancel();
        assert_eq!(*hits.borrow(), 0);
    }

    #[test]
    fn test_fire_completions_in_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let ls: Vec<Completion> = (0..4)
            .map(|i| {
                let o = order.clone();
                Completion::new(move || o.borrow_mut().push(i))
            })
            .collect();
        fire_completions(ls);
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
    }
}
