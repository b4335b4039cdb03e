//! Focus resolver and prefix stack (§4.F): selects the active keymap from
//! focus-change notifications and tracks prefix pushes on top of it. The
//! compiled rule table itself is published lock-free via `arc_swap` so the
//! hot path never contends with a focus-change or configuration-reload
//! writer.

use crate::keymap::{KeymapArena, KeymapId};
use arc_swap::{ArcSwap, Guard};
use arrayvec::ArrayVec;
use std::sync::Arc;

pub const PREFIX_STACK_CAPACITY: usize = 64;

/// Per-input-provider-thread prefix history (§4.F, §3). Bounded; pushing past capacity evicts
/// the oldest entry rather than growing, matching the bounded `pressed_keys`-style tracking this
/// engine uses elsewhere on the hot path.
#[derive(Default)]
pub struct PrefixStack {
    stack: ArrayVec<KeymapId, PREFIX_STACK_CAPACITY>,
}

impl PrefixStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: KeymapId) {
        if self.stack.is_full() {
            self.stack.remove(0);
        }
        self.stack.push(id);
    }

    /// Pop the top prefix keymap; used by "parent" and "cancel single level" actions.
    pub fn pop(&mut self) -> Option<KeymapId> {
        self.stack.pop()
    }

    /// Pop to the previous prefix, i.e. drop the top and report the new top if any.
    pub fn pop_to_previous(&mut self) -> Option<KeymapId> {
        self.stack.pop();
        self.stack.last().copied()
    }

    /// Clear the whole stack, falling back to the focus-selected keymap.
    pub fn cancel(&mut self) {
        self.stack.clear();
    }

    pub fn top(&self) -> Option<KeymapId> {
        self.stack.last().copied()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

/// Tracks the currently focused window and the keymap arena, and resolves which keymap is
/// effectively active for a given prefix stack.
pub struct FocusResolver {
    arena: ArcSwap<KeymapArena>,
    current: ArcSwap<KeymapId>,
    default_keymap: KeymapId,
    last_focus: ArcSwap<Option<(String, String, bool)>>,
}

impl FocusResolver {
    pub fn new(arena: KeymapArena, default_keymap: KeymapId) -> Self {
        Self {
            arena: ArcSwap::from_pointee(arena),
            current: ArcSwap::from_pointee(default_keymap),
            default_keymap,
            last_focus: ArcSwap::from_pointee(None),
        }
    }

    /// Replace the whole keymap arena atomically (configuration reload). The previous arena is
    /// reclaimed once no hot-path thread still holds a `Guard` from `load_arena`.
    pub fn install_arena(&self, arena: KeymapArena, default_keymap: KeymapId) {
        self.arena.store(Arc::new(arena));
        self.current.store(Arc::new(default_keymap));
    }

    pub fn load_arena(&self) -> Guard<Arc<KeymapArena>> {
        self.arena.load()
    }

    /// Recompute the active keymap for a focus change. Idempotent: calling this again with the
    /// same `(class, title, is_console)` identity tuple re-selects the same keymap without any
    /// additional observable effect.
    pub fn notify_focus(&self, class: &str, title: &str, is_console: bool) -> KeymapId {
        let identity = (class.to_string(), title.to_string(), is_console);
        if **self.last_focus.load() == Some(identity.clone()) {
            return *self.current.load_full();
        }

        let arena = self.arena.load();
        let selected = arena
            .candidates_for_focus(class, title)
            .next()
            .unwrap_or(self.default_keymap);
        self.current.store(Arc::new(selected));
        self.last_focus.store(Arc::new(Some(identity)));
        tracing::debug!(target: "keymap_resolver", class, title, is_console, keymap = selected.0, "focus_resolved");
        selected
    }

    pub fn current_keymap(&self) -> KeymapId {
        *self.current.load_full()
    }

    pub fn default_keymap(&self) -> KeymapId {
        self.default_keymap
    }

    /// Effective keymap given a prefix stack: the stack's top if non-empty, else the
    /// focus-selected keymap.
    pub fn effective_keymap(&self, prefix: &PrefixStack) -> KeymapId {
        prefix.top().unwrap_or_else(|| self.current_keymap())
    }
}
