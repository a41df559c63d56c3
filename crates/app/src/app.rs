use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use resources::{
    AssetLoader, ImageLoadOptions, ImageManager, JsonLoadOptions, JsonManager, LoadStatus,
    Registry, ResourceEvent, ResourceManager, ResourceManagerConfig, SearchOptions,
    SpecificResourceManager, SpriteSheetLoadOptions, SpriteSheetManager, TextureLoadOptions,
    TextureManager, UntypedHandle, Vfs,
};

/// Prefix the asset directory is mounted on.
const ASSETS: &str = "assets";

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Demo: mounts a directory, registers what it finds there and loads it all.
pub struct App {
    root: PathBuf,
    files: Vec<String>,
    vfs: Arc<Vfs>,
    resource_manager: ResourceManager,
    json: JsonManager,
    textures: TextureManager,
    sheets: SpriteSheetManager,
}

impl App {
    /// `<asset dir> [files relative to it...]`. Without files the directory is scanned.
    pub fn from_args(mut args: impl Iterator<Item = String>) -> Self {
        let root = PathBuf::from(args.next().unwrap_or_else(|| ASSETS.to_string()));
        let files: Vec<String> = args.collect();

        let vfs = Arc::new(Vfs::new());
        let assets = AssetLoader::new(vfs.clone());
        let resource_manager = ResourceManager::new(ResourceManagerConfig::from_env());

        let json = JsonManager::new(resource_manager.clone(), assets.clone());
        let images = ImageManager::new(resource_manager.clone(), assets);
        let textures = TextureManager::new(images.clone());
        let sheets = SpriteSheetManager::new(json.clone(), images);

        Self {
            root,
            files,
            vfs,
            resource_manager,
            json,
            textures,
            sheets,
        }
    }

    pub fn init(&mut self) -> Result<()> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

        if !self.root.is_dir() {
            bail!("asset directory {:?} does not exist", self.root);
        }
        self.vfs.mount_dir(ASSETS, self.root.clone(), "Assets");

        if self.files.is_empty() {
            self.files = scan(&self.root)
                .with_context(|| format!("failed to scan {:?}", self.root))?;
        }
        log::info!(
            "{} assets found in {:?}, loading {} at a time",
            self.files.len(),
            self.root,
            self.resource_manager.parallel()
        );

        Ok(())
    }

    pub async fn run(&mut self) -> Result<()> {
        self.spawn_event_logger()?;

        for file in &self.files {
            let path = format!("{ASSETS}/{file}");
            match kind_of(file) {
                Some(AssetKind::SpriteSheet) => {
                    self.sheets.load(SpriteSheetManager::add_path(path))?;
                }
                Some(AssetKind::Json) => {
                    self.json.load(JsonManager::add_path(path))?;
                }
                Some(AssetKind::Image) => {
                    self.textures.load(TextureManager::add_path(path))?;
                }
                None => log::warn!("skipping {file:?}: unknown asset kind"),
            }
        }

        let finished =
            tokio::time::timeout(LOAD_TIMEOUT, self.resource_manager.wait_until_finished()).await;
        match finished {
            Ok(Ok(done)) => log::info!("{} resources loaded", done.len()),
            Ok(Err(error)) => log::error!("loading stopped: {error}"),
            Err(_) => log::error!("loading did not finish within {:?}", LOAD_TIMEOUT),
        }

        self.report()
    }

    fn spawn_event_logger(&self) -> Result<()> {
        let events = self.resource_manager.subscribe();
        std::thread::Builder::new()
            .name("resource-events".into())
            .spawn(move || {
                for event in events.iter() {
                    match event {
                        ResourceEvent::Failed { handle, error } => {
                            log::error!("{handle:?} failed: {error:#}")
                        }
                        event => log::info!("{event:?}"),
                    }
                }
            })?;
        Ok(())
    }

    fn report(&self) -> Result<()> {
        let mut failed = 0;
        for resource in self.resource_manager.search(&SearchOptions::new()) {
            match resource.status() {
                LoadStatus::Done => log::info!(
                    "{} {}: done",
                    resource.resource_type(),
                    describe(resource.handle())
                ),
                LoadStatus::Error => {
                    failed += 1;
                    log::error!(
                        "{} {}: {}",
                        resource.resource_type(),
                        describe(resource.handle()),
                        resource.error().map(|e| format!("{e:#}")).unwrap_or_default()
                    );
                }
                status => log::warn!(
                    "{} {}: still {status}",
                    resource.resource_type(),
                    describe(resource.handle())
                ),
            }
        }

        if failed > 0 {
            bail!("{failed} resources failed to load");
        }
        Ok(())
    }
}

/// Path the resource was registered with, or its handle.
fn describe(handle: UntypedHandle) -> String {
    let Some(descriptor) = Registry::descriptor(handle) else {
        return format!("{handle:?}");
    };
    let options = descriptor.options;
    if let Some(options) = options.downcast_ref::<JsonLoadOptions>() {
        options.path.clone()
    } else if let Some(options) = options.downcast_ref::<ImageLoadOptions>() {
        options.path.clone()
    } else if let Some(options) = options.downcast_ref::<SpriteSheetLoadOptions>() {
        options.manifest_path.clone()
    } else if let Some(options) = options.downcast_ref::<TextureLoadOptions>() {
        describe(options.image.untyped())
    } else {
        format!("{handle:?}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AssetKind {
    Json,
    Image,
    SpriteSheet,
}

fn kind_of(file: &str) -> Option<AssetKind> {
    if file.ends_with(".sheet.json") {
        return Some(AssetKind::SpriteSheet);
    }
    let extension = Path::new(file).extension()?.to_str()?.to_ascii_lowercase();
    if extension == "json" {
        Some(AssetKind::Json)
    } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Some(AssetKind::Image)
    } else {
        None
    }
}

/// Files under `root` with a known kind, relative to `root`, sorted.
/// Images referenced by a sprite sheet are still loaded on their own.
fn scan(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if kind_of(&relative).is_some() {
                files.push(relative);
            }
        }
    }
    files.sort();
    Ok(files)
}
