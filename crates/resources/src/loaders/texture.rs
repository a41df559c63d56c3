use std::{fmt, sync::Arc};

use anyhow::{Result, bail};
use image::RgbaImage;
use uuid::Uuid;

use crate::{
    Handle, ImageLoadOptions, ImageManager, LoadFuture, LoadResult, ResourceError,
    ResourceManager, ResourceType, SpecificResourceManager,
};

pub const RESOURCE_TYPE_TEXTURE: ResourceType = ResourceType::new("texture");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(Uuid);

impl TextureHandle {
    pub fn new() -> Self {
        TextureHandle(Uuid::new_v4())
    }
}

impl Default for TextureHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl From<TextureHandle> for Uuid {
    fn from(handle: TextureHandle) -> Self {
        handle.0
    }
}

/// A texture built from a decoded image.
/// The pixels are shared with the image resource it was created from.
#[derive(Clone)]
pub struct Texture {
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<RgbaImage>,
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("handle", &self.handle)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Turns decoded pixels into a texture. A GPU backend plugs in here.
pub trait TextureFactory: Send + Sync + 'static {
    fn create(&self, image: Arc<RgbaImage>) -> Result<Texture>;
}

/// Keeps the pixels in memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryTextureFactory;

impl TextureFactory for MemoryTextureFactory {
    fn create(&self, image: Arc<RgbaImage>) -> Result<Texture> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            bail!("cannot create a {width}x{height} texture");
        }
        Ok(Texture {
            handle: TextureHandle::new(),
            width,
            height,
            pixels: image,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureLoadOptions {
    /// Image the texture is created from. Also a dependency of the texture.
    pub image: Handle<RgbaImage>,
}

#[derive(Clone)]
pub struct TextureManager {
    resource_manager: ResourceManager,
    images: ImageManager,
    factory: Arc<dyn TextureFactory>,
}

impl TextureManager {
    pub fn new(images: ImageManager) -> Self {
        Self::with_factory(images, Arc::new(MemoryTextureFactory))
    }

    pub fn with_factory(images: ImageManager, factory: Arc<dyn TextureFactory>) -> Self {
        Self {
            resource_manager: images.resource_manager().clone(),
            images,
            factory,
        }
    }

    /// Registers the image at `path` and a texture depending on it.
    pub fn add_path(path: impl Into<String>) -> Handle<Texture> {
        let image = ImageManager::add(ImageLoadOptions { path: path.into() });
        Self::add_with_dependencies(TextureLoadOptions { image }, [image.untyped()])
    }

    pub fn images(&self) -> &ImageManager {
        &self.images
    }
}

impl SpecificResourceManager for TextureManager {
    type Options = TextureLoadOptions;
    type Data = Texture;
    const RESOURCE_TYPE: ResourceType = RESOURCE_TYPE_TEXTURE;

    fn resource_manager(&self) -> &ResourceManager {
        &self.resource_manager
    }

    fn load_dependencies(&self, options: &TextureLoadOptions) -> Result<(), ResourceError> {
        self.images.load(options.image).map(|_| ())
    }

    fn loader(&self, _handle: Handle<Texture>, options: Arc<TextureLoadOptions>) -> LoadFuture<Texture> {
        let this = self.clone();
        Box::pin(async move {
            let image = this.resource_manager.get(options.image)?;
            let texture = this.factory.create(image)?;
            log::debug!(
                "created texture {:?} ({}x{})",
                texture.handle,
                texture.width,
                texture.height
            );
            Ok(LoadResult::Success(texture))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        LoadStatus, Registry,
        loaders::test_support::{loader_with, png},
    };

    struct FailingFactory;

    impl TextureFactory for FailingFactory {
        fn create(&self, _image: Arc<RgbaImage>) -> Result<Texture> {
            bail!("device lost")
        }
    }

    fn images(files: &[(&str, Vec<u8>)]) -> ImageManager {
        ImageManager::new(ResourceManager::with_parallel(2), loader_with(files))
    }

    #[tokio::test]
    async fn texture_waits_for_its_image() {
        let textures = TextureManager::new(images(&[("tiles.png", png(4, 4))]));
        let handle = TextureManager::add_path("assets/tiles.png");

        let descriptor = Registry::descriptor(handle.untyped()).unwrap();
        assert_eq!(descriptor.dependencies.len(), 1);
        let image = descriptor.dependencies[0];

        let resource = textures.load(handle).unwrap();
        assert!(textures.resource_manager().knows_handle(image));

        let done = textures.resource_manager().wait_for(&resource).await.unwrap();
        assert_eq!((done.data.width, done.data.height), (4, 4));
        assert!(textures.resource_manager().is_resource_done(image));

        let pixels = textures
            .resource_manager()
            .get::<RgbaImage>(Handle::from_untyped(image))
            .unwrap();
        assert!(Arc::ptr_eq(&pixels, &done.data.pixels));
    }

    #[tokio::test]
    async fn factory_failure_is_a_load_error() {
        let textures =
            TextureManager::with_factory(images(&[("a.png", png(1, 1))]), Arc::new(FailingFactory));
        let resource = textures.load(TextureManager::add_path("assets/a.png")).unwrap();

        let err = textures.resource_manager().wait_for(&resource).await.unwrap_err();
        assert!(err.to_string().contains("device lost"));
        assert_eq!(resource.status(), LoadStatus::Error);
    }

    #[test]
    fn memory_factory_rejects_empty_images() {
        let factory = MemoryTextureFactory;
        assert!(factory.create(Arc::new(RgbaImage::new(0, 3))).is_err());

        let texture = factory.create(Arc::new(RgbaImage::new(2, 3))).unwrap();
        assert_eq!((texture.width, texture.height), (2, 3));
        assert_ne!(texture.handle, TextureHandle::new());
    }
}
