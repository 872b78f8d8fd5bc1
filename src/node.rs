use crate::atomic::Atomic;

/// A queue cell: a write-once value and an atomic link to the next cell.
///
/// Both queues in the crate are singly linked lists of `Node`s with a
/// sentinel at the front. The sentinel's value is never handed out.
#[derive(Debug)]
pub struct Node<T> {
    value: T,
    pub(crate) next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            next: Default::default(),
        }
    }

    /// The node that sits in front of the first real element.
    pub fn sentinel() -> Self
    where
        T: Default,
    {
        Self::new(T::default())
    }
}

impl<T: Copy> Node<T> {
    pub fn value(&self) -> T {
        self.value
    }
}
