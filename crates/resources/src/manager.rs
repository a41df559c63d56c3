//! The scheduler: tracks the resources it was asked to load, admits them
//! according to their dependencies and the `parallel` ceiling, and hands the
//! results to whoever waits for them.

use std::{
    any::type_name,
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use anyhow::anyhow;
use crossbeam_channel::Receiver;
use futures::future::try_join_all;
use tokio::sync::oneshot;

use crate::{
    DoneResource, DynData, Handle, LoadError, LoadFuture, LoadOptions, LoadResult, LoadStatus,
    Registry, Resource, ResourceError, ResourceEvent, ResourceManagerConfig, ResourceType,
    SearchOptions, UntypedDoneResource, UntypedHandle, UntypedResource,
    event::ResourceEventBroadcaster,
};

pub(crate) type SharedState = Arc<Mutex<ManagerState>>;

type Routine = Arc<dyn Fn(LoadOptions) -> LoadFuture<DynData> + Send + Sync>;
type Waiter = oneshot::Sender<Result<DynData, LoadError>>;

pub(crate) struct Entry {
    pub(crate) handle: UntypedHandle,
    pub(crate) resource_type: ResourceType,
    pub(crate) status: LoadStatus,
    pub(crate) dependencies: Vec<UntypedHandle>,
    pub(crate) data: Option<DynData>,
    pub(crate) error: Option<LoadError>,
    pub(crate) rounds: u32,
    options: LoadOptions,
    routine: Routine,
    waiters: Vec<Waiter>,
}

pub(crate) struct ManagerState {
    parallel: usize,
    pub(crate) entries: Vec<Entry>,
    index: HashMap<UntypedHandle, usize>,
    events: ResourceEventBroadcaster,
}

impl ManagerState {
    fn position(&self, handle: UntypedHandle) -> Option<usize> {
        self.index.get(&handle).copied()
    }

    fn in_progress(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status == LoadStatus::InProgress)
            .count()
    }

    fn is_done(&self, handle: UntypedHandle) -> bool {
        self.position(handle)
            .is_some_and(|index| self.entries[index].status == LoadStatus::Done)
    }

    fn is_loadable(&self, index: usize) -> bool {
        let entry = &self.entries[index];
        entry.status == LoadStatus::Pending
            && entry.dependencies.iter().all(|dep| self.is_done(*dep))
    }

    fn next_loadable(&self) -> Option<usize> {
        (0..self.entries.len()).find(|&index| self.is_loadable(index))
    }

    fn log_stall(&self) {
        let blocked: Vec<_> = self
            .entries
            .iter()
            .filter(|entry| entry.status == LoadStatus::Pending)
            .map(|entry| {
                let missing: Vec<_> = entry
                    .dependencies
                    .iter()
                    .filter(|dep| !self.is_done(**dep))
                    .collect();
                format!("{:?} waits for {:?}", entry.handle, missing)
            })
            .collect();

        if blocked.is_empty() {
            return;
        }
        if self.in_progress() == 0 {
            log::warn!(
                "resource loading stalled, nothing can be admitted: {}",
                blocked.join(", ")
            );
        } else {
            log::debug!("{} resources waiting on dependencies", blocked.len());
        }
    }
}

pub(crate) fn lock_state(state: &SharedState) -> MutexGuard<'_, ManagerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Loads registered resources with at most `parallel` routines in flight.
///
/// Cloning is cheap and every clone drives the same set of resources. Must be
/// used from within a Tokio runtime: routines run as spawned tasks.
#[derive(Clone)]
pub struct ResourceManager {
    state: SharedState,
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new(ResourceManagerConfig::default())
    }
}

impl ResourceManager {
    pub fn new(config: ResourceManagerConfig) -> Self {
        let state = ManagerState {
            parallel: config.effective_parallel(),
            entries: Vec::new(),
            index: HashMap::new(),
            events: ResourceEventBroadcaster::default(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn with_parallel(parallel: usize) -> Self {
        Self::new(ResourceManagerConfig::with_parallel(parallel))
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        lock_state(&self.state)
    }

    fn view(&self, handle: UntypedHandle, index: usize) -> UntypedResource {
        UntypedResource::new(handle, index, self.state.clone())
    }

    pub fn parallel(&self) -> usize {
        self.state().parallel
    }

    /// Number of routines currently running.
    pub fn in_progress(&self) -> usize {
        self.state().in_progress()
    }

    /// Receives every [`ResourceEvent`] emitted from now on.
    pub fn subscribe(&self) -> Receiver<ResourceEvent> {
        self.state().events.subscribe()
    }

    /// Starts tracking `handle` and schedules `routine` to load it.
    ///
    /// The routine receives the options the handle was registered with and may
    /// be called several times when it answers [`LoadResult::Deferred`].
    /// Returns right away; use [`ResourceManager::wait_for`] to get the data.
    /// Loading a handle that is already tracked returns the existing resource.
    pub fn load<T, O, F, Fut>(
        &self,
        handle: Handle<T>,
        routine: F,
    ) -> Result<Resource<T>, ResourceError>
    where
        T: Send + Sync + 'static,
        O: Send + Sync + 'static,
        F: Fn(Arc<O>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<LoadResult<T>>> + Send + 'static,
    {
        let handle = handle.untyped();
        let descriptor =
            Registry::descriptor(handle).ok_or(ResourceError::UnknownHandle(handle))?;

        let mut guard = self.state();
        let state = &mut *guard;

        if let Some(index) = state.position(handle) {
            log::debug!(
                "{:?} is already tracked ({})",
                handle,
                state.entries[index].status
            );
            return Ok(self.view(handle, index).typed());
        }

        let index = state.entries.len();
        state.entries.push(Entry {
            handle,
            resource_type: descriptor.resource_type,
            status: LoadStatus::Pending,
            dependencies: descriptor.dependencies,
            data: None,
            error: None,
            rounds: 0,
            options: descriptor.options,
            routine: erase_routine::<T, O, F, Fut>(handle, routine),
            waiters: Vec::new(),
        });
        state.index.insert(handle, index);

        log::debug!("tracking {:?} ({})", handle, descriptor.resource_type);
        state
            .events
            .broadcast(ResourceEvent::Added(handle, descriptor.resource_type));

        self.fill_queue(state);

        Ok(self.view(handle, index).typed())
    }

    /// Admission loop: starts loadable resources, in tracking order, until
    /// the `parallel` ceiling is reached.
    fn fill_queue(&self, state: &mut ManagerState) {
        while state.in_progress() < state.parallel {
            let Some(index) = state.next_loadable() else {
                break;
            };

            let entry = &mut state.entries[index];
            entry.status = LoadStatus::InProgress;
            entry.rounds += 1;

            let handle = entry.handle;
            let routine = entry.routine.clone();
            let options = entry.options.clone();
            log::debug!("starting {:?} (round {})", handle, entry.rounds);

            state.events.broadcast(ResourceEvent::Started(handle));
            self.start(handle, routine, options);
        }

        if state.next_loadable().is_none() {
            state.log_stall();
        }
    }

    fn start(&self, handle: UntypedHandle, routine: Routine, options: LoadOptions) {
        let manager = self.clone();
        tokio::spawn(async move {
            // The routine gets its own task so that a panic becomes a load error.
            let outcome = match tokio::spawn(async move { (*routine)(options).await }).await {
                Ok(Ok(result)) => result,
                Ok(Err(error)) => LoadResult::Error(LoadError::from(error)),
                Err(join_error) => LoadResult::Error(LoadError::msg(format!(
                    "load routine of {handle:?} panicked: {join_error}"
                ))),
            };
            manager.settle(handle, outcome);
        });
    }

    fn settle(&self, handle: UntypedHandle, outcome: LoadResult<DynData>) {
        let notification = {
            let mut guard = self.state();
            let state = &mut *guard;

            let Some(index) = state.position(handle) else {
                return;
            };
            let entry = &mut state.entries[index];
            if entry.status != LoadStatus::InProgress {
                log::warn!("ignoring result for {:?} in state {}", handle, entry.status);
                return;
            }

            let notification = match outcome {
                LoadResult::Success(data) => {
                    entry.status = LoadStatus::Done;
                    entry.data = Some(data.clone());
                    log::debug!("{:?} loaded after {} rounds", handle, entry.rounds);
                    state.events.broadcast(ResourceEvent::Loaded(handle));
                    Some((std::mem::take(&mut entry.waiters), Ok(data)))
                }
                LoadResult::Error(error) => {
                    entry.status = LoadStatus::Error;
                    entry.error = Some(error.clone());
                    log::warn!(
                        "{:?} ({}) failed to load: {:#}",
                        handle,
                        entry.resource_type,
                        error.inner()
                    );
                    state.events.broadcast(ResourceEvent::Failed {
                        handle,
                        error: error.clone(),
                    });
                    Some((std::mem::take(&mut entry.waiters), Err(error)))
                }
                LoadResult::Deferred(dependencies) => {
                    let mut added = Vec::new();
                    for dep in dependencies {
                        if !entry.dependencies.contains(&dep) {
                            entry.dependencies.push(dep);
                            added.push(dep);
                        }
                    }
                    entry.status = LoadStatus::Pending;
                    log::debug!(
                        "{:?} deferred, {} new dependencies",
                        handle,
                        added.len()
                    );
                    state.events.broadcast(ResourceEvent::Deferred {
                        handle,
                        dependencies: added,
                    });
                    None
                }
            };

            self.fill_queue(state);
            notification
        };

        if let Some((waiters, result)) = notification {
            for waiter in waiters {
                let _ = waiter.send(result.clone());
            }
        }
    }

    /// Waits until the resource is done, or fails with its load error.
    pub async fn wait_for<T: Send + Sync + 'static>(
        &self,
        resource: &Resource<T>,
    ) -> Result<DoneResource<T>, ResourceError> {
        self.wait_for_untyped(resource.as_untyped())
            .await?
            .downcast::<T>()
    }

    pub async fn wait_for_untyped(
        &self,
        resource: &UntypedResource,
    ) -> Result<UntypedDoneResource, ResourceError> {
        let handle = resource.handle();
        if !resource.belongs_to(&self.state) {
            return Err(ResourceError::ForeignResource(handle));
        }

        let receiver = {
            let mut state = self.state();
            let entry = &mut state.entries[resource.index()];
            match (entry.status, &entry.data, &entry.error) {
                (LoadStatus::Done, Some(data), _) => {
                    return Ok(UntypedDoneResource {
                        handle,
                        data: data.clone(),
                    });
                }
                (LoadStatus::Error, _, Some(error)) => {
                    return Err(ResourceError::LoadFailure(error.clone()));
                }
                _ => {
                    let (sender, receiver) = oneshot::channel();
                    entry.waiters.push(sender);
                    receiver
                }
            }
        };

        match receiver.await {
            Ok(Ok(data)) => Ok(UntypedDoneResource { handle, data }),
            Ok(Err(error)) => Err(ResourceError::LoadFailure(error)),
            Err(_) => Err(ResourceError::Abandoned(handle)),
        }
    }

    /// Waits for every resource tracked at the time of the call, all at once.
    ///
    /// Fails with the first load failure, without waiting for the others.
    /// Results are in tracking order.
    pub async fn wait_until_finished(&self) -> Result<Vec<UntypedDoneResource>, ResourceError> {
        let resources = self.search(&SearchOptions::default());
        try_join_all(resources.iter().map(|resource| self.wait_for_untyped(resource))).await
    }

    /// The data of a `Done` resource.
    pub fn get<T: Send + Sync + 'static>(&self, handle: Handle<T>) -> Result<Arc<T>, ResourceError> {
        let handle = handle.untyped();
        let state = self.state();
        let index = state
            .position(handle)
            .ok_or(ResourceError::NotLoaded(handle))?;

        match (&state.entries[index].status, &state.entries[index].data) {
            (LoadStatus::Done, Some(data)) => data
                .clone()
                .downcast::<T>()
                .map_err(|_| ResourceError::WrongType(handle)),
            _ => Err(ResourceError::NotDone(handle)),
        }
    }

    pub fn resource<T>(&self, handle: Handle<T>) -> Result<Resource<T>, ResourceError> {
        let handle = handle.untyped();
        match self.state().position(handle) {
            Some(index) => Ok(self.view(handle, index).typed()),
            None if Registry::contains(handle) => Err(ResourceError::NotLoaded(handle)),
            None => Err(ResourceError::UnknownHandle(handle)),
        }
    }

    /// `true` when the handle is tracked here and `Done`.
    pub fn is_resource_done(&self, handle: impl Into<UntypedHandle>) -> bool {
        self.state().is_done(handle.into())
    }

    /// `true` when this manager tracks the handle, whatever the registry says.
    pub fn knows_handle(&self, handle: impl Into<UntypedHandle>) -> bool {
        self.state().position(handle.into()).is_some()
    }

    /// Tracked resources matching `options`, in tracking order.
    pub fn search(&self, options: &SearchOptions<'_>) -> Vec<UntypedResource> {
        let candidates: Vec<UntypedResource> = {
            let state = self.state();
            state
                .entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| options.matches_entry(entry))
                .map(|(index, entry)| self.view(entry.handle, index))
                .collect()
        };

        // The predicate may read the resources, so it runs without the lock.
        match options.predicate {
            Some(predicate) => candidates.into_iter().filter(|r| predicate(r)).collect(),
            None => candidates,
        }
    }

    /// `true` when no tracked resource is pending or in progress.
    pub fn done(&self) -> bool {
        self.state()
            .entries
            .iter()
            .all(|entry| entry.status.is_finished())
    }

    pub fn done_for_type(&self, resource_type: ResourceType) -> bool {
        self.state()
            .entries
            .iter()
            .filter(|entry| entry.resource_type == resource_type)
            .all(|entry| entry.status.is_finished())
    }

    /// `true` when the resource is pending and all its dependencies are done.
    pub fn is_resource_loadable(&self, resource: &UntypedResource) -> bool {
        resource.belongs_to(&self.state) && self.state().is_loadable(resource.index())
    }
}

fn erase_routine<T, O, F, Fut>(handle: UntypedHandle, routine: F) -> Routine
where
    T: Send + Sync + 'static,
    O: Send + Sync + 'static,
    F: Fn(Arc<O>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<LoadResult<T>>> + Send + 'static,
{
    Arc::new(move |options: LoadOptions| -> LoadFuture<DynData> {
        match options.downcast::<O>() {
            Ok(options) => {
                let future = routine(options);
                Box::pin(async move { future.await.map(LoadResult::into_dyn) })
            }
            Err(_) => Box::pin(async move {
                Err(anyhow!(
                    "load options of {:?} are not {}",
                    handle,
                    type_name::<O>()
                ))
            }),
        }
    })
}
