use std::{
    any::Any,
    fmt,
    future::Future,
    marker::PhantomData,
    ops::Deref,
    pin::Pin,
    sync::Arc,
};

use crate::{
    Handle, LoadError, ResourceError, ResourceType, UntypedHandle,
    manager::{Entry, SharedState, lock_state},
};

/// Type-erased resource data, as stored by the manager.
pub type DynData = Arc<dyn Any + Send + Sync>;

/// Boxed future returned by load routines.
pub type LoadFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<LoadResult<T>>> + Send>>;

/// Loading state of a resource.
///
/// `Pending -> InProgress -> Done | Error`, with `InProgress -> Pending` when
/// the routine defers. `Done` and `Error` never change again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadStatus {
    Pending,
    InProgress,
    Done,
    Error,
}

impl LoadStatus {
    /// `true` for the terminal states.
    pub fn is_finished(self) -> bool {
        matches!(self, LoadStatus::Done | LoadStatus::Error)
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadStatus::Pending => "pending",
            LoadStatus::InProgress => "in progress",
            LoadStatus::Done => "done",
            LoadStatus::Error => "error",
        })
    }
}

/// Outcome of one invocation of a load routine.
#[derive(Debug)]
pub enum LoadResult<T> {
    /// The resource is loaded.
    Success(T),
    /// The resource failed to load; the error is kept on the resource.
    Error(LoadError),
    /// Not yet: run the routine again once these handles are done.
    Deferred(Vec<UntypedHandle>),
}

impl<T> LoadResult<T> {
    pub fn error(error: impl Into<anyhow::Error>) -> Self {
        LoadResult::Error(LoadError::new(error))
    }

    pub fn deferred<H>(dependencies: impl IntoIterator<Item = H>) -> Self
    where
        H: Into<UntypedHandle>,
    {
        LoadResult::Deferred(dependencies.into_iter().map(Into::into).collect())
    }

    pub(crate) fn into_dyn(self) -> LoadResult<DynData>
    where
        T: Send + Sync + 'static,
    {
        match self {
            LoadResult::Success(data) => LoadResult::Success(Arc::new(data) as DynData),
            LoadResult::Error(error) => LoadResult::Error(error),
            LoadResult::Deferred(dependencies) => LoadResult::Deferred(dependencies),
        }
    }
}

/// Live view on a resource tracked by a `ResourceManager`.
///
/// Reading it always reflects the current state held by the manager.
#[derive(Clone)]
pub struct UntypedResource {
    handle: UntypedHandle,
    index: usize,
    state: SharedState,
}

impl UntypedResource {
    pub(crate) fn new(handle: UntypedHandle, index: usize, state: SharedState) -> Self {
        Self {
            handle,
            index,
            state,
        }
    }

    fn with_entry<R>(&self, f: impl FnOnce(&Entry) -> R) -> R {
        let state = lock_state(&self.state);
        f(&state.entries[self.index])
    }

    pub fn handle(&self) -> UntypedHandle {
        self.handle
    }

    pub fn status(&self) -> LoadStatus {
        self.with_entry(|entry| entry.status)
    }

    pub fn resource_type(&self) -> ResourceType {
        self.with_entry(|entry| entry.resource_type)
    }

    pub fn dependencies(&self) -> Vec<UntypedHandle> {
        self.with_entry(|entry| entry.dependencies.clone())
    }

    /// The stored error, once the resource is in `Error`.
    pub fn error(&self) -> Option<LoadError> {
        self.with_entry(|entry| entry.error.clone())
    }

    /// How many times the load routine has been started.
    pub fn rounds(&self) -> u32 {
        self.with_entry(|entry| entry.rounds)
    }

    pub fn typed<T>(self) -> Resource<T> {
        Resource {
            untyped: self,
            marker: PhantomData,
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn belongs_to(&self, state: &SharedState) -> bool {
        Arc::ptr_eq(&self.state, state)
    }
}

impl PartialEq for UntypedResource {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle && Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for UntypedResource {}

impl fmt::Debug for UntypedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("handle", &self.handle)
            .field("status", &self.status())
            .finish()
    }
}

/// Typed view on a tracked resource.
pub struct Resource<T> {
    untyped: UntypedResource,
    marker: PhantomData<fn() -> T>,
}

impl<T> Resource<T> {
    pub fn handle(&self) -> Handle<T> {
        Handle::from_untyped(self.untyped.handle)
    }

    pub fn as_untyped(&self) -> &UntypedResource {
        &self.untyped
    }

    pub fn into_untyped(self) -> UntypedResource {
        self.untyped
    }
}

impl<T: Send + Sync + 'static> Resource<T> {
    /// The loaded data, once the resource is `Done`.
    pub fn data(&self) -> Option<Arc<T>> {
        self.untyped
            .with_entry(|entry| entry.data.clone())
            .and_then(|data| data.downcast::<T>().ok())
    }
}

impl<T> Deref for Resource<T> {
    type Target = UntypedResource;

    fn deref(&self) -> &Self::Target {
        &self.untyped
    }
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            untyped: self.untyped.clone(),
            marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Resource<T> {
    fn eq(&self, other: &Self) -> bool {
        self.untyped == other.untyped
    }
}

impl<T> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.untyped, f)
    }
}

/// A resource that finished loading successfully.
pub struct DoneResource<T> {
    pub handle: Handle<T>,
    pub data: Arc<T>,
}

impl<T> Clone for DoneResource<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            data: self.data.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DoneResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoneResource")
            .field("handle", &self.handle)
            .field("data", &self.data)
            .finish()
    }
}

#[derive(Clone)]
pub struct UntypedDoneResource {
    pub handle: UntypedHandle,
    pub data: DynData,
}

impl UntypedDoneResource {
    pub fn downcast<T: Send + Sync + 'static>(self) -> Result<DoneResource<T>, ResourceError> {
        let handle = self.handle;
        let data = self
            .data
            .downcast::<T>()
            .map_err(|_| ResourceError::WrongType(handle))?;
        Ok(DoneResource {
            handle: Handle::from_untyped(handle),
            data,
        })
    }
}

impl fmt::Debug for UntypedDoneResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UntypedDoneResource")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Filters for `ResourceManager::search`. Every filter that is set must match.
#[derive(Default)]
pub struct SearchOptions<'a> {
    pub status: Option<LoadStatus>,
    pub any_status: Option<Vec<LoadStatus>>,
    pub resource_type: Option<ResourceType>,
    pub predicate: Option<&'a (dyn Fn(&UntypedResource) -> bool + 'a)>,
}

impl<'a> SearchOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: LoadStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn any_status(mut self, statuses: impl IntoIterator<Item = LoadStatus>) -> Self {
        self.any_status = Some(statuses.into_iter().collect());
        self
    }

    pub fn resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    pub fn predicate(mut self, predicate: &'a (dyn Fn(&UntypedResource) -> bool + 'a)) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub(crate) fn matches_entry(&self, entry: &Entry) -> bool {
        self.status.is_none_or(|status| entry.status == status)
            && self
                .any_status
                .as_ref()
                .is_none_or(|statuses| statuses.contains(&entry.status))
            && self
                .resource_type
                .is_none_or(|resource_type| entry.resource_type == resource_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!LoadStatus::Pending.is_finished());
        assert!(!LoadStatus::InProgress.is_finished());
        assert!(LoadStatus::Done.is_finished());
        assert!(LoadStatus::Error.is_finished());
        assert_eq!(LoadStatus::InProgress.to_string(), "in progress");
    }

    #[test]
    fn deferred_accepts_typed_handles() {
        let a: Handle<String> = Handle::from_untyped(UntypedHandle::new());
        let b: Handle<u32> = Handle::from_untyped(UntypedHandle::new());
        let result: LoadResult<()> = LoadResult::deferred([a.untyped(), b.untyped()]);
        match result {
            LoadResult::Deferred(deps) => assert_eq!(deps, vec![a.untyped(), b.untyped()]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn done_resource_downcast_checks_type() {
        let done = UntypedDoneResource {
            handle: UntypedHandle::new(),
            data: Arc::new(String::from("value")),
        };
        assert!(matches!(
            done.clone().downcast::<u32>(),
            Err(ResourceError::WrongType(_))
        ));
        let typed = done.downcast::<String>().unwrap();
        assert_eq!(typed.data.as_str(), "value");
    }
}
