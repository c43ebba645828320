//! Listener lists safe to mutate during emission.
//!
//! Emitting iterates by index and removal during an emit only marks the
//! entry dead; compaction happens when the outermost emit finishes.

use core::cell::{Cell, RefCell};

use std::sync::Arc;

/// An owned list of subscribers.
pub struct Hooks<T>
where
    T: ?Sized,
{
    entries: RefCell<Vec<Entry<T>>>,
    emitting: Cell<u32>,
}

struct Entry<T>
where
    T: ?Sized,
{
    cookie: u64,
    dead: bool,
    hook: Arc<T>,
}

impl<T> Hooks<T>
where
    T: ?Sized,
{
    /// Construct a new empty list.
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            emitting: Cell::new(0),
        }
    }

    /// Add a subscriber, returning its removal cookie.
    pub fn add(&self, hook: Arc<T>, cookie: u64) {
        self.entries.borrow_mut().push(Entry {
            cookie,
            dead: false,
            hook,
        });
    }

    /// Remove a subscriber by cookie.
    ///
    /// During an emit the entry is only marked dead and skipped.
    pub fn remove(&self, cookie: u64) {
        let mut entries = self.entries.borrow_mut();

        if self.emitting.get() > 0 {
            for e in entries.iter_mut() {
                if e.cookie == cookie {
                    e.dead = true;
                }
            }
        } else {
            entries.retain(|e| e.cookie != cookie);
        }
    }

    /// The number of live subscribers.
    pub fn len(&self) -> usize {
        self.entries.borrow().iter().filter(|e| !e.dead).count()
    }

    /// Test if there are no live subscribers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Emit to every live subscriber.
    pub fn emit(&self, mut f: impl FnMut(&T)) {
        self.emitting.set(self.emitting.get() + 1);

        let mut index = 0;

        loop {
            // Clone the entry out so the list can be mutated re-entrantly.
            let hook = {
                let entries = self.entries.borrow();

                let Some(entry) = entries.get(index) else {
                    break;
                };

                if entry.dead {
                    index += 1;
                    continue;
                }

                entry.hook.clone()
            };

            f(&hook);
            index += 1;
        }

        let nested = self.emitting.get() - 1;
        self.emitting.set(nested);

        if nested == 0 {
            self.entries.borrow_mut().retain(|e| !e.dead);
        }
    }
}

impl<T> Default for Hooks<T>
where
    T: ?Sized,
{
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell as StdRefCell;

    #[test]
    fn remove_during_emit_is_deferred() {
        let hooks: Hooks<StdRefCell<Vec<u32>>> = Hooks::new();

        hooks.add(Arc::new(StdRefCell::new(Vec::new())), 1);
        hooks.add(Arc::new(StdRefCell::new(Vec::new())), 2);

        let mut first = true;
        hooks.emit(|h| {
            if first {
                hooks.remove(2);
                first = false;
            }

            h.borrow_mut().push(0);
        });

        // The second subscriber was marked dead before it was reached.
        assert_eq!(hooks.len(), 1);
    }

    #[test]
    fn remove_outside_emit_compacts() {
        let hooks: Hooks<StdRefCell<Vec<u32>>> = Hooks::new();

        hooks.add(Arc::new(StdRefCell::new(Vec::new())), 1);
        hooks.remove(1);
        assert!(hooks.is_empty());
    }
}
