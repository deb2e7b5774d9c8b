//! Single-owner raw handles
//!
//! [`Scoped`] owns at most one raw pointer and hands it to its [`Disposer`]
//! exactly once: on drop, on [`Scoped::reset`], or never if ownership was
//! given back with [`Scoped::release`]. It is not `Clone`; moving it moves the
//! ownership.

use std::fmt;
use std::mem;
use std::ptr::{self, NonNull};

/// Releases one kind of raw handle
pub trait Disposer {
    type Target;

    /// Release `raw`. Must not panic.
    fn dispose(&mut self, raw: NonNull<Self::Target>);
}

pub struct Scoped<D: Disposer> {
    raw: Option<NonNull<D::Target>>,
    disposer: D,
}

impl<D: Disposer> Scoped<D> {
    /// An empty owner; dropping it disposes nothing
    pub fn empty(disposer: D) -> Self {
        Self {
            raw: None,
            disposer,
        }
    }

    /// Take ownership of `raw`; a null pointer gives an empty owner
    ///
    /// # Safety
    ///
    /// `raw` must be null or a live handle nobody else will dispose.
    pub unsafe fn from_raw(raw: *mut D::Target, disposer: D) -> Self {
        Self {
            raw: NonNull::new(raw),
            disposer,
        }
    }

    pub fn get(&self) -> Option<NonNull<D::Target>> {
        self.raw
    }

    /// The owned pointer, or null when empty
    pub fn as_ptr(&self) -> *mut D::Target {
        self.raw.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
    }

    pub fn disposer(&self) -> &D {
        &self.disposer
    }

    /// Start owning `raw`, then dispose the previously owned handle
    ///
    /// # Safety
    ///
    /// Same contract as [`Scoped::from_raw`]. Passing the currently owned
    /// pointer disposes it while keeping it, unless the disposer is a
    /// reference count the caller incremented beforehand.
    pub unsafe fn reset(&mut self, raw: *mut D::Target) {
        let old = mem::replace(&mut self.raw, NonNull::new(raw));
        if let Some(old) = old {
            self.disposer.dispose(old);
        }
    }

    /// Dispose the owned handle, leaving the owner empty
    pub fn clear(&mut self) {
        if let Some(old) = self.raw.take() {
            self.disposer.dispose(old);
        }
    }

    /// Give up ownership without disposing; the caller now releases the handle
    #[must_use = "the released handle leaks unless it is disposed"]
    pub fn release(&mut self) -> Option<NonNull<D::Target>> {
        self.raw.take()
    }
}

impl<D: Disposer + Clone> Scoped<D> {
    /// Move ownership out, leaving `self` empty
    pub fn take(&mut self) -> Self {
        Self {
            raw: self.raw.take(),
            disposer: self.disposer.clone(),
        }
    }
}

impl<D: Disposer + Default> Default for Scoped<D> {
    fn default() -> Self {
        Self::empty(D::default())
    }
}

impl<D: Disposer> Drop for Scoped<D> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<D: Disposer> fmt::Debug for Scoped<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scoped").field("raw", &self.as_ptr()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<usize>>>);

    impl Disposer for Recorder {
        type Target = u8;

        fn dispose(&mut self, raw: NonNull<u8>) {
            self.0.borrow_mut().push(raw.as_ptr().addr());
        }
    }

    fn fake(addr: usize) -> *mut u8 {
        ptr::without_provenance_mut(addr)
    }

    #[test]
    fn test_drop_disposes_once() {
        let recorder = Recorder::default();
        drop(unsafe { Scoped::from_raw(fake(0x10), recorder.clone()) });
        assert_eq!(*recorder.0.borrow(), vec![0x10]);
    }

    #[test]
    fn test_empty_never_disposes() {
        let recorder = Recorder::default();
        drop(Scoped::empty(recorder.clone()));
        drop(unsafe { Scoped::from_raw(ptr::null_mut(), recorder.clone()) });
        drop(Scoped::<Recorder>::default());
        assert!(recorder.0.borrow().is_empty());
    }

    #[test]
    fn test_release_skips_disposal() {
        let recorder = Recorder::default();
        let mut owner = unsafe { Scoped::from_raw(fake(0x20), recorder.clone()) };
        let raw = owner.release();
        assert_eq!(raw.map(|p| p.as_ptr().addr()), Some(0x20));
        assert!(owner.is_empty());
        drop(owner);
        assert!(recorder.0.borrow().is_empty());
    }

    #[test]
    fn test_reset_disposes_previous() {
        let recorder = Recorder::default();
        let mut owner = unsafe { Scoped::from_raw(fake(0x30), recorder.clone()) };
        unsafe { owner.reset(fake(0x40)) };
        assert_eq!(*recorder.0.borrow(), vec![0x30]);
        assert_eq!(owner.as_ptr().addr(), 0x40);
        drop(owner);
        assert_eq!(*recorder.0.borrow(), vec![0x30, 0x40]);
    }

    #[test]
    fn test_take_moves_ownership() {
        let recorder = Recorder::default();
        let mut source = unsafe { Scoped::from_raw(fake(0x50), recorder.clone()) };
        let target = source.take();
        assert!(source.is_empty());
        drop(source);
        assert!(recorder.0.borrow().is_empty());
        drop(target);
        assert_eq!(*recorder.0.borrow(), vec![0x50]);
    }
}
