use std::sync::{Mutex, MutexGuard};

use super::{
    Document, DomEvent, DomEventKind, EventHandler, ListenerId, ListenerOptions, Visibility,
};

struct Listener {
    id: ListenerId,
    kind: DomEventKind,
    handler: EventHandler,
    capture: bool,
}

struct DocumentState {
    fullscreen_enabled: bool,
    fullscreen_active: bool,
    visibility: Visibility,
    reject_fullscreen: Option<String>,
    listeners: Vec<Listener>,
    next_id: u64,
}

/// In-process [`Document`] for headless hosts and tests. State changes made
/// through it dispatch the same events a browser would.
pub struct MemoryDocument {
    state: Mutex<DocumentState>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DocumentState {
                fullscreen_enabled: true,
                fullscreen_active: false,
                visibility: Visibility::Visible,
                reject_fullscreen: None,
                listeners: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// A document whose environment has no fullscreen capability.
    pub fn without_fullscreen() -> Self {
        let document = Self::new();
        document.lock().fullscreen_enabled = false;
        document
    }

    /// Makes every later `request_fullscreen` fail with `reason`.
    pub fn reject_fullscreen_requests(&self, reason: impl Into<String>) {
        self.lock().reject_fullscreen = Some(reason.into());
    }

    pub fn set_fullscreen(&self, active: bool) {
        self.lock().fullscreen_active = active;
        self.dispatch(DomEventKind::FullscreenChange);
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        self.lock().visibility = visibility;
        self.dispatch(DomEventKind::VisibilityChange);
    }

    pub fn listener_count(&self, kind: DomEventKind) -> usize {
        self.lock()
            .listeners
            .iter()
            .filter(|listener| listener.kind == kind)
            .count()
    }

    pub fn total_listeners(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Runs capture listeners, then the rest, and returns the event so the
    /// caller can see whether the default action was prevented.
    pub fn dispatch(&self, kind: DomEventKind) -> DomEvent {
        let handlers: Vec<EventHandler> = {
            let state = self.lock();
            let matching = state.listeners.iter().filter(|l| l.kind == kind);
            let (capture, bubble): (Vec<_>, Vec<_>) = matching.partition(|l| l.capture);
            capture
                .into_iter()
                .chain(bubble)
                .map(|listener| listener.handler.clone())
                .collect()
        };

        let mut event = DomEvent::new(kind);
        for handler in handlers {
            handler(&mut event);
        }
        event
    }

    fn lock(&self) -> MutexGuard<'_, DocumentState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl Document for MemoryDocument {
    fn fullscreen_enabled(&self) -> bool {
        self.lock().fullscreen_enabled
    }

    fn has_fullscreen_element(&self) -> bool {
        let state = self.lock();
        state.fullscreen_enabled && state.fullscreen_active
    }

    fn request_fullscreen(&self) -> anyhow::Result<()> {
        {
            let state = self.lock();
            if !state.fullscreen_enabled {
                anyhow::bail!("fullscreen is not supported");
            }
            if let Some(reason) = &state.reject_fullscreen {
                anyhow::bail!("{reason}");
            }
        }
        self.set_fullscreen(true);
        Ok(())
    }

    fn visibility(&self) -> Visibility {
        self.lock().visibility
    }

    fn add_event_listener(
        &self,
        kind: DomEventKind,
        handler: EventHandler,
        options: ListenerOptions,
    ) -> ListenerId {
        let mut state = self.lock();
        let id = ListenerId(state.next_id);
        state.next_id += 1;
        state.listeners.push(Listener {
            id,
            kind,
            handler,
            capture: options.capture,
        });
        id
    }

    fn remove_event_listener(&self, id: ListenerId) {
        self.lock().listeners.retain(|listener| listener.id != id);
    }
}
