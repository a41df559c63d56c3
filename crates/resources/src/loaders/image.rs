use std::sync::Arc;

use anyhow::Context;
use image::RgbaImage;

use crate::{
    AssetLoader, Handle, LoadFuture, LoadResult, ResourceManager, ResourceType,
    SpecificResourceManager,
};

pub const RESOURCE_TYPE_IMAGE: ResourceType = ResourceType::new("image");

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageLoadOptions {
    pub path: String,
}

/// Decodes PNG/JPEG/BMP assets into RGBA8 pixel buffers.
#[derive(Clone)]
pub struct ImageManager {
    resource_manager: ResourceManager,
    assets: AssetLoader,
}

impl ImageManager {
    pub fn new(resource_manager: ResourceManager, assets: AssetLoader) -> Self {
        Self {
            resource_manager,
            assets,
        }
    }

    pub fn add_path(path: impl Into<String>) -> Handle<RgbaImage> {
        Self::add(ImageLoadOptions { path: path.into() })
    }
}

impl SpecificResourceManager for ImageManager {
    type Options = ImageLoadOptions;
    type Data = RgbaImage;
    const RESOURCE_TYPE: ResourceType = RESOURCE_TYPE_IMAGE;

    fn resource_manager(&self) -> &ResourceManager {
        &self.resource_manager
    }

    fn loader(
        &self,
        _handle: Handle<RgbaImage>,
        options: Arc<ImageLoadOptions>,
    ) -> LoadFuture<RgbaImage> {
        let assets = self.assets.clone();
        Box::pin(async move {
            let bytes = assets.load_bytes(&options.path).await?;
            let path = options.path.clone();
            // Decoding is CPU bound.
            let image = tokio::task::spawn_blocking(move || {
                image::load_from_memory(&bytes)
                    .map(|image| image.to_rgba8())
                    .with_context(|| format!("failed to decode image {:?}", path))
            })
            .await??;
            log::trace!(
                "decoded {:?} ({}x{})",
                options.path,
                image.width(),
                image.height()
            );
            Ok(LoadResult::Success(image))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::test_support::{loader_with, png};

    #[tokio::test]
    async fn decodes_png_to_rgba() {
        let assets = loader_with(&[("hero.png", png(3, 2))]);
        let manager = ImageManager::new(ResourceManager::default(), assets);
        let handle = ImageManager::add_path("assets/hero.png");

        let resource = manager.load(handle).unwrap();
        let done = manager.resource_manager().wait_for(&resource).await.unwrap();

        assert_eq!(done.data.dimensions(), (3, 2));
        assert_eq!(done.data.get_pixel(1, 1).0, [200, 40, 40, 255]);
    }

    #[tokio::test]
    async fn garbage_bytes_fail_to_decode() {
        let assets = loader_with(&[("bad.png", b"not an image".to_vec())]);
        let manager = ImageManager::new(ResourceManager::default(), assets);
        let resource = manager.load(ImageManager::add_path("assets/bad.png")).unwrap();

        let err = manager.resource_manager().wait_for(&resource).await.unwrap_err();
        let message = format!("{:#}", err.load_error().unwrap().inner());
        assert!(message.contains("failed to decode image"), "{message}");
    }
}
