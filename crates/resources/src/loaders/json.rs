use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;

use crate::{
    AssetLoader, Handle, LoadFuture, LoadResult, ResourceManager, ResourceType,
    SpecificResourceManager,
};

pub const RESOURCE_TYPE_JSON: ResourceType = ResourceType::new("json");

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsonLoadOptions {
    /// VFS path of the document.
    pub path: String,
}

/// Loads JSON documents into `serde_json::Value`s.
#[derive(Clone)]
pub struct JsonManager {
    resource_manager: ResourceManager,
    assets: AssetLoader,
}

impl JsonManager {
    pub fn new(resource_manager: ResourceManager, assets: AssetLoader) -> Self {
        Self {
            resource_manager,
            assets,
        }
    }

    pub fn add_path(path: impl Into<String>) -> Handle<Value> {
        Self::add(JsonLoadOptions { path: path.into() })
    }
}

impl SpecificResourceManager for JsonManager {
    type Options = JsonLoadOptions;
    type Data = Value;
    const RESOURCE_TYPE: ResourceType = RESOURCE_TYPE_JSON;

    fn resource_manager(&self) -> &ResourceManager {
        &self.resource_manager
    }

    fn loader(&self, _handle: Handle<Value>, options: Arc<JsonLoadOptions>) -> LoadFuture<Value> {
        let assets = self.assets.clone();
        Box::pin(async move {
            let text = assets.load_string(&options.path).await?;
            let value: Value = serde_json::from_str(&text)
                .with_context(|| format!("{:?} is not valid JSON", options.path))?;
            Ok(LoadResult::Success(value))
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{LoadStatus, ResourceError, loaders::test_support::loader_with};

    #[tokio::test]
    async fn loads_a_document() {
        let assets = loader_with(&[("level.json", br#"{"width": 12, "tiles": [1, 2]}"#.to_vec())]);
        let manager = JsonManager::new(ResourceManager::default(), assets);
        let handle = JsonManager::add_path("assets/level.json");

        let resource = manager.load(handle).unwrap();
        let done = manager.resource_manager().wait_for(&resource).await.unwrap();

        assert_eq!(*done.data, json!({"width": 12, "tiles": [1, 2]}));
        assert_eq!(manager.get(handle).unwrap()["width"], 12);
    }

    #[tokio::test]
    async fn invalid_or_missing_documents_fail() {
        let assets = loader_with(&[("broken.json", b"{ nope".to_vec())]);
        let manager = JsonManager::new(ResourceManager::default(), assets);
        let broken = manager.load(JsonManager::add_path("assets/broken.json")).unwrap();
        let missing = manager.load(JsonManager::add_path("assets/missing.json")).unwrap();

        let err = manager.resource_manager().wait_for(&broken).await.unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
        assert!(matches!(
            manager.resource_manager().wait_for(&missing).await,
            Err(ResourceError::LoadFailure(_))
        ));
        assert_eq!(missing.status(), LoadStatus::Error);
    }
}
