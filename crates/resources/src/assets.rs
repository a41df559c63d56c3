use std::sync::Arc;

use anyhow::{Context, Result};

use crate::Vfs;

/// AssetLoader : lit les octets des assets via le VFS sans bloquer le runtime.
/// Les lectures passent par `spawn_blocking` ; la transformation bytes -> resource
/// est faite par les managers spécifiques (json, image, ...).
#[derive(Clone)]
pub struct AssetLoader {
    vfs: Arc<Vfs>,
}

impl AssetLoader {
    pub fn new(vfs: Arc<Vfs>) -> Self {
        AssetLoader { vfs }
    }

    pub fn vfs(&self) -> &Arc<Vfs> {
        &self.vfs
    }

    /// Charge les bytes d'un path via le VFS.
    pub async fn load_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let vfs = self.vfs.clone();
        let owned = path.to_string();
        tokio::task::spawn_blocking(move || vfs.read_bytes(&owned))
            .await
            .with_context(|| format!("read task for {:?} did not complete", path))?
    }

    /// Charge un fichier texte UTF-8 via le VFS.
    pub async fn load_string(&self, path: &str) -> Result<String> {
        let bytes = self.load_bytes(path).await?;
        String::from_utf8(bytes).with_context(|| format!("asset {:?} is not UTF-8", path))
    }
}
