use resources::{Handle, Registry, ResourceError, ResourceManager, ResourceType};

const NOTE: ResourceType = ResourceType::new("note");

// Lives in its own binary: resetting the registry would break tests running beside it.
#[tokio::test]
async fn reset_forgets_every_registration() {
    let first: Handle<String> = Registry::register(NOTE, "first", []);
    let second: Handle<String> = Registry::register(NOTE, "second", [first.untyped()]);
    assert_eq!(
        Registry::handles_for_type(NOTE),
        vec![first.untyped(), second.untyped()]
    );

    Registry::reset();

    assert!(!Registry::contains(first.untyped()));
    assert!(Registry::descriptor(second.untyped()).is_none());
    assert!(Registry::handles_for_type(NOTE).is_empty());

    let manager = ResourceManager::default();
    let result = manager.load(first, |text: std::sync::Arc<&'static str>| async move {
        Ok::<_, anyhow::Error>(resources::LoadResult::Success(text.to_string()))
    });
    assert!(matches!(result, Err(ResourceError::UnknownHandle(_))));

    let fresh: Handle<String> = Registry::register(NOTE, "fresh", []);
    assert_eq!(Registry::handles_for_type(NOTE), vec![fresh.untyped()]);
}
