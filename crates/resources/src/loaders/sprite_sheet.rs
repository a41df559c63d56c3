use std::{collections::BTreeMap, path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use image::{RgbaImage, imageops};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    Handle, HandleMetadata, ImageManager, JsonManager, LoadFuture, LoadResult, ResourceManager,
    ResourceType, SpecificResourceManager,
};

pub const RESOURCE_TYPE_SPRITE_SHEET: ResourceType = ResourceType::new("sprite_sheet");

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpriteSheetLoadOptions {
    pub manifest_path: String,
}

/// Pixel rectangle of one frame inside the sheet image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct FrameRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl FrameRect {
    /// Normalized [u0, v0, u1, v1] inside a `width` x `height` image.
    pub fn uv(&self, width: u32, height: u32) -> [f32; 4] {
        let (width, height) = (width as f32, height as f32);
        [
            self.x as f32 / width,
            self.y as f32 / height,
            (self.x + self.w) as f32 / width,
            (self.y + self.h) as f32 / height,
        ]
    }

    fn fits(&self, width: u32, height: u32) -> bool {
        let right = self.x.checked_add(self.w);
        let bottom = self.y.checked_add(self.h);
        self.w > 0
            && self.h > 0
            && right.is_some_and(|right| right <= width)
            && bottom.is_some_and(|bottom| bottom <= height)
    }
}

/// Manifest document: `{ "image": "sheet.png", "frames": { "idle": { "x": 0, ... } } }`.
/// `image` is relative to the manifest's directory.
#[derive(Clone, Debug, Deserialize)]
pub struct SheetManifest {
    pub image: String,
    #[serde(default)]
    pub frames: BTreeMap<String, FrameRect>,
}

#[derive(Clone, Debug)]
pub struct SpriteSheet {
    pub image: Arc<RgbaImage>,
    pub image_handle: Handle<RgbaImage>,
    pub frames: BTreeMap<String, FrameRect>,
}

impl SpriteSheet {
    pub fn frame(&self, name: &str) -> Option<FrameRect> {
        self.frames.get(name).copied()
    }

    /// Copy of the pixels of one frame.
    pub fn frame_image(&self, name: &str) -> Option<RgbaImage> {
        let rect = self.frame(name)?;
        Some(imageops::crop_imm(&*self.image, rect.x, rect.y, rect.w, rect.h).to_image())
    }
}

/// Where a sheet is between two rounds.
#[derive(Clone, Debug)]
pub enum SheetStage {
    Manifest(Handle<Value>),
    Image {
        frames: BTreeMap<String, FrameRect>,
        image: Handle<RgbaImage>,
    },
}

/// Loads a sheet in three rounds: manifest, then image, then assembly.
#[derive(Clone)]
pub struct SpriteSheetManager {
    resource_manager: ResourceManager,
    json: JsonManager,
    images: ImageManager,
    stages: HandleMetadata<SheetStage>,
}

impl SpriteSheetManager {
    pub fn new(json: JsonManager, images: ImageManager) -> Self {
        Self {
            resource_manager: json.resource_manager().clone(),
            json,
            images,
            stages: HandleMetadata::new(),
        }
    }

    pub fn add_path(manifest_path: impl Into<String>) -> Handle<SpriteSheet> {
        Self::add(SpriteSheetLoadOptions {
            manifest_path: manifest_path.into(),
        })
    }

    async fn advance(
        &self,
        handle: Handle<SpriteSheet>,
        options: &SpriteSheetLoadOptions,
    ) -> Result<LoadResult<SpriteSheet>> {
        match self.stages.get(handle) {
            None => {
                let manifest = JsonManager::add_path(options.manifest_path.clone());
                self.json.load(manifest)?;
                self.stages.insert(handle, SheetStage::Manifest(manifest));
                Ok(LoadResult::deferred([manifest]))
            }
            Some(SheetStage::Manifest(manifest)) => {
                let value = self.resource_manager.get(manifest)?;
                let manifest: SheetManifest = serde_json::from_value((*value).clone())
                    .with_context(|| {
                        format!("{:?} is not a sprite sheet manifest", options.manifest_path)
                    })?;

                let image_path = Path::new(&options.manifest_path)
                    .parent()
                    .unwrap_or(Path::new(""))
                    .join(&manifest.image);
                let image = ImageManager::add_path(image_path.to_string_lossy());
                self.images.load(image)?;
                self.stages.insert(
                    handle,
                    SheetStage::Image {
                        frames: manifest.frames,
                        image,
                    },
                );
                Ok(LoadResult::deferred([image]))
            }
            Some(SheetStage::Image { frames, image }) => {
                let pixels = self.resource_manager.get(image)?;
                let (width, height) = pixels.dimensions();
                if let Some((name, rect)) = frames.iter().find(|(_, rect)| !rect.fits(width, height))
                {
                    bail!(
                        "frame {name:?} {rect:?} is outside the {width}x{height} image of {:?}",
                        options.manifest_path
                    );
                }
                Ok(LoadResult::Success(SpriteSheet {
                    image: pixels,
                    image_handle: image,
                    frames,
                }))
            }
        }
    }
}

impl SpecificResourceManager for SpriteSheetManager {
    type Options = SpriteSheetLoadOptions;
    type Data = SpriteSheet;
    const RESOURCE_TYPE: ResourceType = RESOURCE_TYPE_SPRITE_SHEET;

    fn resource_manager(&self) -> &ResourceManager {
        &self.resource_manager
    }

    fn loader(
        &self,
        handle: Handle<SpriteSheet>,
        options: Arc<SpriteSheetLoadOptions>,
    ) -> LoadFuture<SpriteSheet> {
        let this = self.clone();
        Box::pin(async move {
            let result = this.advance(handle, &options).await;
            if !matches!(result, Ok(LoadResult::Deferred(_))) {
                this.stages.remove(handle);
            }
            result
        })
    }
}
