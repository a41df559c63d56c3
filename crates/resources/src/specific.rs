use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::future::try_join_all;

use crate::{
    DoneResource, Handle, LoadFuture, Registry, Resource, ResourceError, ResourceManager,
    ResourceType, SearchOptions, UntypedHandle,
};

/// Typed façade binding one [`ResourceType`] to its load routine.
///
/// Implementors are cheap handles (usually a few `Arc`s) around a shared
/// [`ResourceManager`]; the provided methods clone `self` into the routine
/// handed to the manager.
pub trait SpecificResourceManager: Clone + Send + Sync + 'static {
    /// What gets registered with each handle.
    type Options: Send + Sync + 'static;
    /// What a loaded resource holds.
    type Data: Send + Sync + 'static;

    const RESOURCE_TYPE: ResourceType;

    fn resource_manager(&self) -> &ResourceManager;

    /// Runs one round of loading. May be called again for the same handle
    /// after answering `LoadResult::Deferred`.
    fn loader(&self, handle: Handle<Self::Data>, options: Arc<Self::Options>)
    -> LoadFuture<Self::Data>;

    /// Called by [`SpecificResourceManager::load`] before the resource is
    /// handed to the scheduler, e.g. to load dependencies declared at
    /// registration time.
    fn load_dependencies(&self, _options: &Self::Options) -> Result<(), ResourceError> {
        Ok(())
    }

    fn add(options: Self::Options) -> Handle<Self::Data> {
        Self::add_with_dependencies(options, [])
    }

    fn add_with_dependencies(
        options: Self::Options,
        dependencies: impl IntoIterator<Item = UntypedHandle>,
    ) -> Handle<Self::Data> {
        Registry::register(Self::RESOURCE_TYPE, options, dependencies)
    }

    /// Every handle registered for this type, in registration order.
    fn all_handles() -> Vec<Handle<Self::Data>> {
        Registry::handles_for_type(Self::RESOURCE_TYPE)
            .into_iter()
            .map(Handle::from_untyped)
            .collect()
    }

    fn is_known_handle(&self, handle: impl Into<UntypedHandle>) -> bool {
        let handle = handle.into();
        Registry::descriptor(handle)
            .is_some_and(|descriptor| descriptor.resource_type == Self::RESOURCE_TYPE)
    }

    fn load(&self, handle: Handle<Self::Data>) -> Result<Resource<Self::Data>, ResourceError> {
        let descriptor = Registry::descriptor(handle.untyped())
            .ok_or(ResourceError::UnknownHandle(handle.untyped()))?;
        if let Some(options) = descriptor.options.downcast_ref::<Self::Options>() {
            self.load_dependencies(options)?;
        }

        let this = self.clone();
        self.resource_manager()
            .load(handle, move |options: Arc<Self::Options>| {
                this.loader(handle, options)
            })
    }

    fn load_all(&self) -> Result<Vec<Resource<Self::Data>>, ResourceError> {
        Self::all_handles()
            .into_iter()
            .map(|handle| self.load(handle))
            .collect()
    }

    /// Loads the handles of this type and skips the others.
    fn load_all_known_handles(
        &self,
        handles: &[UntypedHandle],
    ) -> Result<Vec<Resource<Self::Data>>, ResourceError> {
        handles
            .iter()
            .filter(|handle| self.is_known_handle(**handle))
            .map(|handle| self.load(Handle::from_untyped(*handle)))
            .collect()
    }

    fn get(&self, handle: Handle<Self::Data>) -> Result<Arc<Self::Data>, ResourceError> {
        self.resource_manager().get(handle)
    }

    fn resource(&self, handle: Handle<Self::Data>) -> Result<Resource<Self::Data>, ResourceError> {
        self.resource_manager().resource(handle)
    }

    /// Waits for every resource of this type tracked by the manager, all at
    /// once. Fails with the first load failure.
    fn wait_until_finished(
        &self,
    ) -> impl Future<Output = Result<Vec<DoneResource<Self::Data>>, ResourceError>> + Send {
        let manager = self.resource_manager().clone();
        async move {
            let resources: Vec<Resource<Self::Data>> = manager
                .search(&SearchOptions::new().resource_type(Self::RESOURCE_TYPE))
                .into_iter()
                .map(|resource| resource.typed())
                .collect();
            try_join_all(resources.iter().map(|resource| manager.wait_for(resource))).await
        }
    }
}

/// Per-handle state kept by a façade between loading rounds.
pub struct HandleMetadata<M> {
    entries: Arc<Mutex<HashMap<UntypedHandle, M>>>,
}

impl<M> Clone for HandleMetadata<M> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<M> Default for HandleMetadata<M> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<M> HandleMetadata<M> {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<UntypedHandle, M>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, handle: impl Into<UntypedHandle>, metadata: M) -> Option<M> {
        self.entries().insert(handle.into(), metadata)
    }

    pub fn remove(&self, handle: impl Into<UntypedHandle>) -> Option<M> {
        self.entries().remove(&handle.into())
    }

    pub fn contains(&self, handle: impl Into<UntypedHandle>) -> bool {
        self.entries().contains_key(&handle.into())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl<M: Clone> HandleMetadata<M> {
    pub fn get(&self, handle: impl Into<UntypedHandle>) -> Option<M> {
        self.entries().get(&handle.into()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;
    use crate::{LoadResult, LoadStatus};

    const TEXT: ResourceType = ResourceType::new("specific.tests.text");
    const STAGED: ResourceType = ResourceType::new("specific.tests.staged");
    const PART: ResourceType = ResourceType::new("specific.tests.part");
    const SLOW: ResourceType = ResourceType::new("specific.tests.slow");

    /// Uppercases the registered text.
    #[derive(Clone)]
    struct TextManager {
        resource_manager: ResourceManager,
    }

    impl SpecificResourceManager for TextManager {
        type Options = String;
        type Data = String;
        const RESOURCE_TYPE: ResourceType = TEXT;

        fn resource_manager(&self) -> &ResourceManager {
            &self.resource_manager
        }

        fn loader(&self, _handle: Handle<String>, options: Arc<String>) -> LoadFuture<String> {
            Box::pin(async move {
                if options.is_empty() {
                    return Err(anyhow!("nothing to load"));
                }
                Ok(LoadResult::Success(options.to_uppercase()))
            })
        }
    }

    /// Needs a part registered on the fly before it can finish.
    #[derive(Clone)]
    struct StagedManager {
        resource_manager: ResourceManager,
        parts: HandleMetadata<Handle<String>>,
    }

    impl SpecificResourceManager for StagedManager {
        type Options = &'static str;
        type Data = String;
        const RESOURCE_TYPE: ResourceType = STAGED;

        fn resource_manager(&self) -> &ResourceManager {
            &self.resource_manager
        }

        fn loader(&self, handle: Handle<String>, options: Arc<&'static str>) -> LoadFuture<String> {
            let this = self.clone();
            Box::pin(async move {
                match this.parts.get(handle) {
                    None => {
                        let part: Handle<String> = Registry::register(PART, *options, []);
                        this.resource_manager.load(part, |text: Arc<&'static str>| async move {
                            Ok::<_, anyhow::Error>(LoadResult::Success(format!("<{text}>")))
                        })?;
                        this.parts.insert(handle, part);
                        Ok(LoadResult::deferred([part]))
                    }
                    Some(part) => {
                        let text = this.resource_manager.get(part)?;
                        this.parts.remove(handle);
                        Ok(LoadResult::Success(format!("staged {text}")))
                    }
                }
            })
        }
    }

    /// `None` never finishes, `Some(message)` fails with that message.
    #[derive(Clone)]
    struct SlowManager {
        resource_manager: ResourceManager,
    }

    impl SpecificResourceManager for SlowManager {
        type Options = Option<&'static str>;
        type Data = String;
        const RESOURCE_TYPE: ResourceType = SLOW;

        fn resource_manager(&self) -> &ResourceManager {
            &self.resource_manager
        }

        fn loader(
            &self,
            _handle: Handle<String>,
            options: Arc<Option<&'static str>>,
        ) -> LoadFuture<String> {
            Box::pin(async move {
                match *options {
                    None => std::future::pending().await,
                    Some(message) => Err(anyhow!(message)),
                }
            })
        }
    }

    #[tokio::test]
    async fn facade_loads_every_handle_of_its_type() {
        let manager = TextManager {
            resource_manager: ResourceManager::default(),
        };
        let hello = TextManager::add("hello".to_string());
        let world = TextManager::add("world".to_string());
        let foreign: Handle<()> = Registry::register(PART, "x", []);

        assert_eq!(TextManager::all_handles(), vec![hello, world]);
        assert!(manager.is_known_handle(hello));
        assert!(!manager.is_known_handle(foreign));

        let resources = manager.load_all().unwrap();
        assert_eq!(resources.len(), 2);

        let done = manager.wait_until_finished().await.unwrap();
        let texts: Vec<_> = done.iter().map(|d| d.data.as_str().to_owned()).collect();
        assert_eq!(texts, vec!["HELLO", "WORLD"]);
        assert_eq!(manager.get(world).unwrap().as_str(), "WORLD");
        assert_eq!(manager.resource(hello).unwrap().status(), LoadStatus::Done);

        let other = TextManager {
            resource_manager: ResourceManager::default(),
        };
        let loaded = other
            .load_all_known_handles(&[foreign.untyped(), world.untyped()])
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].handle(), world);
        assert!(!other.resource_manager().knows_handle(foreign));
        assert!(!other.resource_manager().knows_handle(hello));
    }

    #[tokio::test]
    async fn metadata_lets_the_routine_resume() {
        let manager = StagedManager {
            resource_manager: ResourceManager::with_parallel(1),
            parts: HandleMetadata::new(),
        };
        let handle = StagedManager::add("part");
        let resource = manager.load(handle).unwrap();

        let done = manager.resource_manager().wait_for(&resource).await.unwrap();
        assert_eq!(done.data.as_str(), "staged <part>");
        assert_eq!(resource.rounds(), 2);
        assert_eq!(resource.dependencies().len(), 1);
        assert!(manager.parts.is_empty());
    }

    #[tokio::test]
    async fn loading_an_unregistered_handle_through_the_facade_fails() {
        let manager = StagedManager {
            resource_manager: ResourceManager::default(),
            parts: HandleMetadata::new(),
        };
        let handle: Handle<String> = Handle::from_untyped(crate::UntypedHandle::new());
        assert!(matches!(
            manager.load(handle),
            Err(ResourceError::UnknownHandle(_))
        ));
    }

    #[test]
    fn metadata_is_shared_between_clones() {
        let metadata: HandleMetadata<u32> = HandleMetadata::new();
        let copy = metadata.clone();
        let handle: Handle<()> = Registry::register(PART, (), []);

        assert!(metadata.insert(handle, 1).is_none());
        assert_eq!(copy.get(handle), Some(1));
        assert_eq!(copy.insert(handle, 2), Some(1));
        assert!(metadata.contains(handle));
        assert_eq!(metadata.remove(handle), Some(2));
        assert!(copy.is_empty());
    }

    #[tokio::test]
    async fn facade_wait_reports_a_failure_without_waiting_for_the_rest() {
        let manager = SlowManager {
            resource_manager: ResourceManager::with_parallel(2),
        };
        let endless = manager.load(SlowManager::add(None)).unwrap();
        let broken = manager.load(SlowManager::add(Some("boom"))).unwrap();

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            manager.wait_until_finished(),
        )
        .await
        .expect("the façade kept waiting on the endless resource");

        let err = result.unwrap_err();
        assert_eq!(err.load_error().unwrap().to_string(), "boom");
        assert_eq!(broken.status(), LoadStatus::Error);
        assert_eq!(endless.status(), LoadStatus::InProgress);
    }
}
