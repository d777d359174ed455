use std::ops::Deref;

/// Owned collection that drops its elements newest first.
///
/// Device objects held here are released in reverse creation order.
pub(crate) struct ReleaseStack<T>(Vec<T>);

impl<T> ReleaseStack<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub(crate) fn push(&mut self, item: T) {
        self.0.push(item);
    }
}

impl<T> Deref for ReleaseStack<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0
    }
}

impl<T> Drop for ReleaseStack<T> {
    fn drop(&mut self) {
        while let Some(item) = self.0.pop() {
            drop(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Noisy(u32, Rc<RefCell<Vec<u32>>>);

    impl Drop for Noisy {
        fn drop(&mut self) {
            self.1.borrow_mut().push(self.0);
        }
    }

    #[test]
    fn drops_newest_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let mut stack = ReleaseStack::with_capacity(3);
            for i in 0..3 {
                stack.push(Noisy(i, log.clone()));
            }
            assert_eq!(stack.len(), 3);
        }
        assert_eq!(*log.borrow(), vec![2, 1, 0]);
    }
}
