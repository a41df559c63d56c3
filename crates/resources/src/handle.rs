use std::{
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
};

use uuid::Uuid;

/// Tag identifying a kind of resource ("json", "image", ...).
///
/// Two tags are equal when their names are equal, so every resource kind
/// should pick a name nobody else uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceType(pub &'static str);

impl ResourceType {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Opaque token minted by the registry for each registration.
///
/// Carries no meaning beyond its identity: two handles are equal only when
/// they come from the same `Registry::register` call.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UntypedHandle(Uuid);

impl UntypedHandle {
    pub(crate) fn new() -> Self {
        UntypedHandle(Uuid::new_v4())
    }
}

impl fmt::Debug for UntypedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.0.simple())
    }
}

impl fmt::Display for UntypedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl From<UntypedHandle> for Uuid {
    fn from(handle: UntypedHandle) -> Self {
        handle.0
    }
}

/// An [`UntypedHandle`] that also remembers the type of data its resource
/// produces once loaded.
pub struct Handle<T> {
    untyped: UntypedHandle,
    marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Reinterprets an untyped handle. Nothing checks that the registered
    /// resource actually produces `T`; a mismatch shows up later as
    /// `ResourceError::WrongType`.
    pub fn from_untyped(untyped: UntypedHandle) -> Self {
        Self {
            untyped,
            marker: PhantomData,
        }
    }

    pub fn untyped(&self) -> UntypedHandle {
        self.untyped
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.untyped == other.untyped
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.untyped.hash(state)
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.untyped, f)
    }
}

impl<T> From<Handle<T>> for UntypedHandle {
    fn from(handle: Handle<T>) -> Self {
        handle.untyped
    }
}

impl<T> PartialEq<UntypedHandle> for Handle<T> {
    fn eq(&self, other: &UntypedHandle) -> bool {
        self.untyped == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique_tokens() {
        let a = UntypedHandle::new();
        let b = UntypedHandle::new();
        assert_ne!(a, b);
        let copy = a;
        assert_eq!(a, copy);
    }

    #[test]
    fn typed_handle_keeps_identity() {
        let raw = UntypedHandle::new();
        let typed: Handle<String> = Handle::from_untyped(raw);
        assert_eq!(typed.untyped(), raw);
        assert_eq!(typed, raw);
        assert_eq!(UntypedHandle::from(typed), raw);
    }
}
