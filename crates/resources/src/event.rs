use crossbeam_channel::{Receiver, Sender};

use crate::{LoadError, ResourceType, UntypedHandle};

/// Something that happened to a resource tracked by a `ResourceManager`.
#[derive(Clone, Debug)]
pub enum ResourceEvent {
    /// The resource started being tracked.
    Added(UntypedHandle, ResourceType),
    /// The load routine was started (once per round).
    Started(UntypedHandle),
    /// The routine asked to wait for more dependencies.
    Deferred {
        handle: UntypedHandle,
        dependencies: Vec<UntypedHandle>,
    },
    /// The resource is done.
    Loaded(UntypedHandle),
    /// The resource ended in error.
    Failed {
        handle: UntypedHandle,
        error: LoadError,
    },
}

impl ResourceEvent {
    pub fn handle(&self) -> UntypedHandle {
        match self {
            ResourceEvent::Added(handle, _)
            | ResourceEvent::Started(handle)
            | ResourceEvent::Loaded(handle) => *handle,
            ResourceEvent::Deferred { handle, .. } | ResourceEvent::Failed { handle, .. } => {
                *handle
            }
        }
    }
}

/// Delivers resource events to every subscriber. Subscribers whose receiver
/// was dropped are forgotten on the next broadcast.
#[derive(Default)]
pub(crate) struct ResourceEventBroadcaster {
    senders: Vec<Sender<ResourceEvent>>,
}

impl ResourceEventBroadcaster {
    pub(crate) fn subscribe(&mut self) -> Receiver<ResourceEvent> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.senders.push(sender);
        receiver
    }

    pub(crate) fn broadcast(&mut self, event: ResourceEvent) {
        if self.senders.is_empty() {
            return;
        }
        self.senders
            .retain(|sender| sender.send(event.clone()).is_ok());
    }
}
