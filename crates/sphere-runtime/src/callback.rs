//! Single-slot, type-erased callbacks.
//!
//! A [`CallbackSlot`] holds at most one bound target and a dispatch stub chosen
//! when the target is bound. Binding never extends the target's lifetime: methods
//! and closures are held through a [`Weak`] reference, so the owner stays in
//! charge of when the target goes away.
//!
//! Invoking an unbound slot, or a slot whose target has been dropped, is an
//! invariant violation and terminates the process.

use std::fmt;
use std::rc::{Rc, Weak};

use sphere_errors::{InvariantViolation, fatal};

/// How the current target was bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    /// A method on a shared object.
    Method,
    /// A free function.
    Function,
    /// A shared closure.
    Closure,
}

/// Dispatch stub. Returns `false` when the target no longer exists.
type Stub<A> = Rc<dyn Fn(A) -> bool>;

/// Single-slot callback invoked with an argument of type `A`.
///
/// Cloning a slot shares the bound stub, which lets owners copy the stub out
/// of a `RefCell` before invoking it, so the target may rebind the slot from
/// inside its own invocation.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use sphere_runtime::CallbackSlot;
///
/// struct Counter(Cell<u32>);
/// impl Counter {
///     fn bump(&self, by: u32) {
///         self.0.set(self.0.get() + by);
///     }
/// }
///
/// let counter = Rc::new(Counter(Cell::new(0)));
/// let mut slot = CallbackSlot::new();
/// slot.bind_method(&counter, Counter::bump);
/// slot.invoke(2);
/// slot.invoke(3);
/// assert_eq!(counter.0.get(), 5);
/// ```
pub struct CallbackSlot<A = ()> {
    stub: Option<Stub<A>>,
    kind: Option<CallbackKind>,
}

impl<A: 'static> CallbackSlot<A> {
    /// Create an unbound slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stub: None,
            kind: None,
        }
    }

    /// Bind a method on a shared object. Replaces any previous binding.
    pub fn bind_method<T: 'static>(&mut self, target: &Rc<T>, method: fn(&T, A)) {
        let weak: Weak<T> = Rc::downgrade(target);
        self.stub = Some(Rc::new(move |arg| match weak.upgrade() {
            Some(target) => {
                method(&target, arg);
                true
            }
            None => false,
        }));
        self.kind = Some(CallbackKind::Method);
    }

    /// Bind a free function. Replaces any previous binding.
    pub fn bind_fn(&mut self, function: fn(A)) {
        self.stub = Some(Rc::new(move |arg| {
            function(arg);
            true
        }));
        self.kind = Some(CallbackKind::Function);
    }

    /// Bind a shared closure. Replaces any previous binding.
    ///
    /// The slot keeps only a weak reference; the caller owns the closure.
    pub fn bind_closure<F: Fn(A) + 'static>(&mut self, closure: &Rc<F>) {
        let weak: Weak<F> = Rc::downgrade(closure);
        self.stub = Some(Rc::new(move |arg| match weak.upgrade() {
            Some(closure) => {
                closure(arg);
                true
            }
            None => false,
        }));
        self.kind = Some(CallbackKind::Closure);
    }

    /// Remove the current binding.
    pub fn clear(&mut self) {
        self.stub = None;
        self.kind = None;
    }

    /// Check whether a target is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.stub.is_some()
    }

    /// How the current target was bound, if any.
    #[must_use]
    pub fn kind(&self) -> Option<CallbackKind> {
        self.kind
    }

    /// Invoke the bound target.
    ///
    /// # Panics
    ///
    /// Terminates through [`fatal`] when the slot is unbound or its target has
    /// been dropped.
    #[track_caller]
    pub fn invoke(&self, arg: A) {
        match &self.stub {
            None => fatal(InvariantViolation::UnboundCallback),
            Some(stub) => {
                if !stub(arg) {
                    fatal(InvariantViolation::DanglingCallback);
                }
            }
        }
    }
}

impl CallbackSlot<()> {
    /// Invoke a no-argument slot.
    #[track_caller]
    pub fn call(&self) {
        self.invoke(());
    }
}

impl<A: 'static> Default for CallbackSlot<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for CallbackSlot<A> {
    fn clone(&self) -> Self {
        Self {
            stub: self.stub.clone(),
            kind: self.kind,
        }
    }
}

impl<A> fmt::Debug for CallbackSlot<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("bound", &self.stub.is_some())
            .field("kind", &self.kind)
            .finish()
    }
}
