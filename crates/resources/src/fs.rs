//! Sources d'assets montées sur des préfixes de chemin.
//!
//! - `AssetSource` est un trait objet (Send + Sync) qui lit des chemins relatifs.
//! - `DirSource` lit depuis un répertoire de l'OS, `MemorySource` depuis une table en mémoire
//!   (assets embarqués, tests).
//! - `Vfs` résout un chemin vers la source montée sur le préfixe le plus récent qui matche.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use anyhow::{Context, Result, anyhow};

/// Source de lecture pouvant être montée dans le `Vfs`.
/// Les chemins reçus sont relatifs à la racine de la source.
pub trait AssetSource: Send + Sync + 'static {
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>>;

    fn exists(&self, path: &Path) -> bool;

    /// Nom (pour debug).
    fn name(&self) -> &str;
}

/// Source adossée à un répertoire du système de fichiers.
pub struct DirSource {
    root: PathBuf,
    name: String,
}

impl DirSource {
    /// Exemple : `DirSource::new("/home/me/game/assets", "game_assets")`
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        DirSource {
            root: root.into(),
            name: name.into(),
        }
    }

    fn resolve_path(&self, rel: &Path) -> PathBuf {
        if rel.is_absolute() {
            rel.to_path_buf()
        } else {
            self.root.join(rel)
        }
    }
}

impl AssetSource for DirSource {
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        let abs = self.resolve_path(path);
        std::fs::read(&abs)
            .with_context(|| format!("DirSource({}) failed to read {:?}", self.name, abs))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve_path(path).is_file()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Source en mémoire : utile pour les assets embarqués dans le binaire et pour les tests.
pub struct MemorySource {
    name: String,
    files: Mutex<HashMap<PathBuf, Arc<[u8]>>>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        MemorySource {
            name: name.into(),
            files: Mutex::new(HashMap::new()),
        }
    }

    fn files(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<[u8]>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ajoute (ou remplace) un fichier.
    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Arc<[u8]>>) {
        self.files().insert(path.into(), data.into());
    }

    /// Variante chaînable de `insert`.
    pub fn with_file(self, path: impl Into<PathBuf>, data: impl Into<Arc<[u8]>>) -> Self {
        self.insert(path, data);
        self
    }
}

impl AssetSource for MemorySource {
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        self.files()
            .get(path)
            .map(|data| data.to_vec())
            .ok_or_else(|| anyhow!("MemorySource({}) has no file {:?}", self.name, path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files().contains_key(path)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct Mount {
    /// Préfixe auquel ce mount répond ("assets", "engine", "" pour catch-all).
    prefix: PathBuf,
    source: Arc<dyn AssetSource>,
}

impl Mount {
    fn matches(&self, path: &Path) -> bool {
        self.prefix.as_os_str().is_empty() || path.starts_with(&self.prefix)
    }

    fn relative_path(&self, path: &Path) -> PathBuf {
        if self.prefix.as_os_str().is_empty() {
            path.to_path_buf()
        } else {
            path.strip_prefix(&self.prefix)
                .unwrap_or(Path::new(""))
                .to_path_buf()
        }
    }
}

/// Virtual File System (collection de mounts).
/// Priorité : le dernier mount ajouté gagne.
#[derive(Clone, Default)]
pub struct Vfs {
    mounts: Arc<Mutex<Vec<Mount>>>,
}

impl Vfs {
    pub fn new() -> Self {
        Self::default()
    }

    fn mounts_guard(&self) -> MutexGuard<'_, Vec<Mount>> {
        self.mounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mount(&self, prefix: impl AsRef<Path>, source: Arc<dyn AssetSource>) {
        log::debug!(
            "mounting {} on {:?}",
            source.name(),
            prefix.as_ref()
        );
        self.mounts_guard().push(Mount {
            prefix: prefix.as_ref().to_path_buf(),
            source,
        });
    }

    /// Raccourci pour monter un répertoire.
    pub fn mount_dir(
        &self,
        prefix: impl AsRef<Path>,
        root: impl Into<PathBuf>,
        name: impl Into<String>,
    ) {
        self.mount(prefix, Arc::new(DirSource::new(root, name)));
    }

    /// Retire tous les mounts de ce préfixe.
    pub fn unmount(&self, prefix: impl AsRef<Path>) {
        self.mounts_guard().retain(|m| m.prefix != prefix.as_ref());
    }

    fn resolve(&self, path: &Path) -> Option<(Arc<dyn AssetSource>, PathBuf)> {
        self.mounts_guard()
            .iter()
            .rev()
            .find(|m| m.matches(path))
            .map(|m| (m.source.clone(), m.relative_path(path)))
    }

    pub fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let (source, rel) = self
            .resolve(Path::new(path))
            .ok_or_else(|| anyhow!("no mount found for path {:?}", path))?;
        // La source est lue sans tenir le verrou des mounts.
        source
            .read_bytes(&rel)
            .with_context(|| format!("failed to read vfs path {:?}", path))
    }

    pub fn read_to_string(&self, path: &str) -> Result<String> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes).with_context(|| format!("vfs path {:?} is not UTF-8", path))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.resolve(Path::new(path))
            .is_some_and(|(source, rel)| source.exists(&rel))
    }

    /// (préfixe, nom de la source), de la plus basse à la plus haute priorité.
    pub fn mounts(&self) -> Vec<(PathBuf, String)> {
        self.mounts_guard()
            .iter()
            .map(|m| (m.prefix.clone(), m.source.name().to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn mount_and_read_dir_source() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir_all(root.join("sprites")).unwrap();
        std::fs::write(root.join("sprites/hello.txt"), "world").unwrap();

        let vfs = Vfs::new();
        vfs.mount_dir("game", root.clone(), "game_assets");

        assert!(vfs.exists("game/sprites/hello.txt"));
        assert!(!vfs.exists("game/sprites/missing.txt"));
        assert_eq!(vfs.read_to_string("game/sprites/hello.txt").unwrap(), "world");
        assert!(vfs.read_bytes("other/hello.txt").is_err());
    }

    #[test]
    fn last_mount_wins() {
        let dir_a = tempdir().unwrap();
        std::fs::write(dir_a.path().join("x.txt"), "from_a").unwrap();

        let vfs = Vfs::new();
        vfs.mount_dir("common", dir_a.path(), "A");
        vfs.mount(
            "common",
            Arc::new(MemorySource::new("B").with_file("x.txt", b"from_b".as_slice())),
        );

        assert_eq!(vfs.read_to_string("common/x.txt").unwrap(), "from_b");

        vfs.unmount("common");
        assert!(vfs.mounts().is_empty());
        assert!(!vfs.exists("common/x.txt"));
    }

    #[test]
    fn catch_all_mount_sees_full_path() {
        let memory = Arc::new(MemorySource::new("embedded"));
        memory.insert("data/config.json", b"{}".as_slice());

        let vfs = Vfs::new();
        vfs.mount("", memory);

        assert_eq!(vfs.read_to_string("data/config.json").unwrap(), "{}");
        assert_eq!(
            vfs.mounts(),
            vec![(PathBuf::new(), "embedded".to_string())]
        );
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let vfs = Vfs::new();
        vfs.mount(
            "bin",
            Arc::new(MemorySource::new("bin").with_file("blob", vec![0xff, 0xfe])),
        );
        assert!(vfs.read_bytes("bin/blob").is_ok());
        assert!(vfs.read_to_string("bin/blob").is_err());
    }
}
