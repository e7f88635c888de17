use crossbeam::epoch::{self, Atomic, Owned};
use std::mem::ManuallyDrop;
use std::sync::atomic::Ordering;

struct Node<T> {
    value: ManuallyDrop<T>,
    next: Atomic<Node<T>>,
}

/// Lock-free LIFO stack. Memory reclamation uses `crossbeam::epoch`: a
/// popped node is deferred for destruction until no guard observing it
/// remains pinned, so a concurrent reader can never see a freed node.
pub struct TreiberStack<T> {
    head: Atomic<Node<T>>,
}

impl<T> Default for TreiberStack<T> {
    fn default() -> Self {
        TreiberStack { head: Atomic::null() }
    }
}

impl<T> TreiberStack<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, value: T) {
        let guard = epoch::pin();
        let mut new_node = Owned::new(Node { value: ManuallyDrop::new(value), next: Atomic::null() });
        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            new_node.next.store(head, Ordering::Relaxed);
            match self.head.compare_exchange(head, new_node, Ordering::Release, Ordering::Relaxed, &guard) {
                Ok(_) => break,
                Err(e) => new_node = e.new,
            }
        }
    }

    pub fn pop(&self) -> Option<T> {
        let guard = epoch::pin();
        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            match unsafe { head.as_ref() } {
                None => return None,
                Some(node) => {
                    let next = node.next.load(Ordering::Acquire, &guard);
                    if self
                        .head
                        .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed, &guard)
                        .is_ok()
                    {
                        unsafe {
                            let value = ManuallyDrop::into_inner(std::ptr::read(&node.value));
                            guard.defer_destroy(head);
                            return Some(value);
                        }
                    }
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        self.head.load(Ordering::Acquire, &guard).is_null()
    }

    /// Approximate count from a single traversal of the list; concurrent
    /// pushes/pops during the walk make this a snapshot, not a guarantee.
    pub fn size(&self) -> usize {
        let guard = epoch::pin();
        let mut count = 0;
        let mut current = self.head.load(Ordering::Acquire, &guard);
        while let Some(node) = unsafe { current.as_ref() } {
            count += 1;
            current = node.next.load(Ordering::Acquire, &guard);
        }
        count
    }
}

unsafe impl<T: Send> Send for TreiberStack<T> {}
unsafe impl<T: Send> Sync for TreiberStack<T> {}

impl<T> Drop for TreiberStack<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_pop_is_lifo() {
        let stack = TreiberStack::new();
        stack.push(1);
        stack.push(2);
        stack.push(3);
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn size_counts_pushed_elements() {
        let stack = TreiberStack::new();
        assert_eq!(stack.size(), 0);
        stack.push("a".to_string());
        stack.push("b".to_string());
        assert_eq!(stack.size(), 2);
        stack.pop();
        assert_eq!(stack.size(), 1);
    }

    #[test]
    fn concurrent_push_pop_loses_no_elements() {
        let stack = Arc::new(TreiberStack::new());
        let producers: Vec<_> = (0..4)
            .map(|base| {
                let s = stack.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        s.push(base * 250 + i);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        let mut count = 0;
        while stack.pop().is_some() {
            count += 1;
        }
        assert_eq!(count, 1000);
    }
}
