//! Registre global des resources chargeables.
//!
//! Chaque appel à [`Registry::register`] crée un nouveau handle et y associe un
//! [`Descriptor`] immuable (type, options de chargement, dépendances). Le registre
//! est partagé par tout le process ; aucun `ResourceManager` n'est touché lors de
//! l'enregistrement.

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError},
};

use crate::{Handle, ResourceType, UntypedHandle};

/// Options de chargement, interprétées uniquement par le manager qui les a enregistrées.
pub type LoadOptions = Arc<dyn Any + Send + Sync>;

/// Enregistrement immuable associé à un handle.
#[derive(Clone)]
pub struct Descriptor {
    pub resource_type: ResourceType,
    pub options: LoadOptions,
    pub dependencies: Vec<UntypedHandle>,
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("resource_type", &self.resource_type)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Entries {
    order: Vec<UntypedHandle>,
    descriptors: HashMap<UntypedHandle, Descriptor>,
}

static REGISTRY: LazyLock<Mutex<Entries>> = LazyLock::new(|| Mutex::new(Entries::default()));

fn entries() -> MutexGuard<'static, Entries> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Point d'accès au registre global.
pub struct Registry;

impl Registry {
    /// Enregistre un descriptor et retourne un handle tout neuf.
    ///
    /// Deux appels avec des arguments identiques donnent deux handles distincts.
    pub fn register<T, O>(
        resource_type: ResourceType,
        options: O,
        dependencies: impl IntoIterator<Item = UntypedHandle>,
    ) -> Handle<T>
    where
        O: Send + Sync + 'static,
    {
        let handle = UntypedHandle::new();
        let mut deps: Vec<UntypedHandle> = Vec::new();
        for dep in dependencies {
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }

        log::trace!(
            "registering {:?} as {} with {} dependencies",
            handle,
            resource_type,
            deps.len()
        );

        let descriptor = Descriptor {
            resource_type,
            options: Arc::new(options),
            dependencies: deps,
        };

        let mut entries = entries();
        entries.order.push(handle);
        entries.descriptors.insert(handle, descriptor);

        Handle::from_untyped(handle)
    }

    /// Tous les handles enregistrés pour ce type, dans l'ordre d'enregistrement.
    pub fn handles_for_type(resource_type: ResourceType) -> Vec<UntypedHandle> {
        let entries = entries();
        entries
            .order
            .iter()
            .filter(|h| {
                entries
                    .descriptors
                    .get(h)
                    .is_some_and(|d| d.resource_type == resource_type)
            })
            .copied()
            .collect()
    }

    pub fn descriptor(handle: UntypedHandle) -> Option<Descriptor> {
        entries().descriptors.get(&handle).cloned()
    }

    pub fn contains(handle: UntypedHandle) -> bool {
        entries().descriptors.contains_key(&handle)
    }

    /// Vide le registre. Réservé à l'isolation des tests.
    pub fn reset() {
        let mut entries = entries();
        entries.order.clear();
        entries.descriptors.clear();
    }
}
