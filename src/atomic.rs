//! Atomic pointers to heap-allocated nodes.
//!
//! There is no reclamation scheme behind these types: an `Owned` frees its
//! pointee when dropped, and a `Ptr` is just a copyable address that is
//! valid for as long as the caller can prove the pointee is not freed. The
//! queues in this crate provide that proof by never freeing a node while a
//! shared reference to the queue may still exist.
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

/// Panics if the pointer is not properly aligned.
#[inline]
fn ensure_aligned<T>(raw: *const T) {
    assert_eq!(raw as usize % mem::align_of::<T>(), 0, "unaligned pointer");
}

/// An atomic pointer that can be safely shared between threads.
#[derive(Debug)]
pub struct Atomic<T> {
    data: AtomicUsize,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send + Sync> Send for Atomic<T> {}
unsafe impl<T: Send + Sync> Sync for Atomic<T> {}

impl<T> Atomic<T> {
    fn from_data(data: usize) -> Self {
        Atomic {
            data: AtomicUsize::new(data),
            _marker: PhantomData,
        }
    }

    /// Returns a new null atomic pointer.
    ///
    /// # Examples
    ///
    /// ```
    /// use casq::atomic::Atomic;
    /// use std::sync::atomic::Ordering::SeqCst;
    ///
    /// let a = Atomic::<i32>::null();
    /// assert!(a.load(SeqCst).is_null());
    /// ```
    pub const fn null() -> Self {
        Atomic {
            data: AtomicUsize::new(0),
            _marker: PhantomData,
        }
    }

    /// Returns a new atomic pointer pointing to `owned`.
    ///
    /// The pointee is no longer freed automatically; whoever loads it must
    /// eventually turn it back into an `Owned` with [`Ptr::into_owned`].
    pub fn from_owned(owned: Owned<T>) -> Self {
        let data = owned.data;
        mem::forget(owned);
        Self::from_data(data)
    }

    /// Loads a `Ptr` from the atomic pointer.
    pub fn load<'scope>(&self, ord: Ordering) -> Ptr<'scope, T> {
        Ptr::from_data(self.data.load(ord))
    }

    /// Stores a `Ptr` into the atomic pointer.
    pub fn store(&self, new: Ptr<T>, ord: Ordering) {
        self.data.store(new.data, ord);
    }

    /// Stores `new` into the atomic pointer if the current value is the same as `current`.
    ///
    /// The return value is a result indicating whether the new pointer was written. On failure the
    /// actual current value is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use casq::atomic::{Atomic, Owned, Ptr};
    /// use std::sync::atomic::Ordering::SeqCst;
    ///
    /// let a = Atomic::from_owned(Owned::new(1234));
    /// let curr = a.load(SeqCst);
    /// assert!(a.compare_and_set(Ptr::null(), curr, SeqCst).is_err());
    /// assert!(a.compare_and_set(curr, Ptr::null(), SeqCst).is_ok());
    /// drop(unsafe { curr.into_owned() });
    /// ```
    pub fn compare_and_set<'scope>(
        &self,
        current: Ptr<T>,
        new: Ptr<T>,
        ord: Ordering,
    ) -> Result<(), Ptr<'scope, T>> {
        match self.data.compare_exchange(
            current.data,
            new.data,
            ord,
            Ordering::Relaxed,
        ) {
            Ok(_) => Ok(()),
            Err(previous) => Err(Ptr::from_data(previous)),
        }
    }
}

impl<T> Default for Atomic<T> {
    fn default() -> Self {
        Atomic::null()
    }
}

/// An owned heap-allocated object.
///
/// This type is very similar to `Box<T>`, and is the handle a node travels
/// in whenever exactly one party is responsible for freeing it: moving an
/// `Owned` moves that responsibility.
#[derive(Debug)]
pub struct Owned<T> {
    data: usize,
    _marker: PhantomData<Box<T>>,
}

impl<T> Owned<T> {
    unsafe fn from_data(data: usize) -> Self {
        Owned {
            data,
            _marker: PhantomData,
        }
    }

    /// Allocates `value` on the heap and returns a new owned pointer pointing to it.
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// Returns a new owned pointer pointing to `b`.
    pub fn from_box(b: Box<T>) -> Self {
        unsafe { Self::from_raw(Box::into_raw(b)) }
    }

    /// Returns a new owned pointer pointing to `raw`.
    ///
    /// # Safety
    ///
    /// `raw` must come from `Box::into_raw`, and must not be owned by anyone else.
    pub unsafe fn from_raw(raw: *mut T) -> Self {
        ensure_aligned(raw);
        Self::from_data(raw as usize)
    }

    /// Converts the owned pointer to a [`Ptr`], giving up ownership.
    pub fn into_ptr<'scope>(self) -> Ptr<'scope, T> {
        let data = self.data;
        mem::forget(self);
        Ptr::from_data(data)
    }

    /// Converts the owned pointer back into a `Box`.
    pub fn into_box(self) -> Box<T> {
        let data = self.data;
        mem::forget(self);
        unsafe { Box::from_raw(data as *mut T) }
    }
}

impl<T> Drop for Owned<T> {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(self.data as *mut T));
        }
    }
}

impl<T> Deref for Owned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*(self.data as *const T) }
    }
}

/// A shared pointer to a node.
///
/// The pointer is valid for use only within `'scope`, and only while the
/// pointee has not been freed.
#[derive(Debug)]
pub struct Ptr<'scope, T: 'scope> {
    data: usize,
    _marker: PhantomData<(&'scope (), *const T)>,
}

impl<'scope, T> PartialEq for Ptr<'scope, T> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<'scope, T> Eq for Ptr<'scope, T> {}

unsafe impl<'scope, T: Send> Send for Ptr<'scope, T> {}

impl<'scope, T> Clone for Ptr<'scope, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'scope, T> Copy for Ptr<'scope, T> {}

impl<'scope, T> Ptr<'scope, T> {
    fn from_data(data: usize) -> Self {
        Ptr {
            data,
            _marker: PhantomData,
        }
    }

    /// Returns a new null pointer.
    ///
    /// # Examples
    ///
    /// ```
    /// use casq::atomic::Ptr;
    ///
    /// let p = Ptr::<i32>::null();
    /// assert!(p.is_null());
    /// ```
    pub fn null() -> Self {
        Self::from_data(0)
    }

    /// Returns `true` if the pointer is null.
    pub fn is_null(&self) -> bool {
        self.data == 0
    }

    /// Converts the pointer to a raw pointer.
    pub fn as_raw(&self) -> *const T {
        self.data as *const T
    }

    /// Dereferences the pointer.
    ///
    /// # Safety
    ///
    /// The pointer must be non-null and the pointee must not have been freed.
    /// Loads that observe the pointer must synchronize with the store that
    /// published it (`Acquire` against `Release`).
    pub unsafe fn deref(&self) -> &'scope T {
        &*self.as_raw()
    }

    /// Converts the pointer to a reference, or `None` if it is null.
    ///
    /// # Safety
    ///
    /// Same as [`Ptr::deref`], apart from the null check.
    pub unsafe fn as_ref(&self) -> Option<&'scope T> {
        self.as_raw().as_ref()
    }

    /// Takes ownership of the pointee.
    ///
    /// # Safety
    ///
    /// This method may be called only if the pointer is valid and nobody else is holding a
    /// reference to the same object, or will take ownership of it again.
    pub unsafe fn into_owned(self) -> Owned<T> {
        Owned::from_data(self.data)
    }
}
