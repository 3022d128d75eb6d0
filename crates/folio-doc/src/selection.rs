//! Block selection state machine.
//!
//! ```text
//!            plain click                 toggle click (new id)
//!   None ───────────────▶ Single(id) ─────────────────────────▶ Multi{ids, anchor}
//!    ▲                        │  ▲                                    │
//!    │  toggle off last id    │  │ plain click                        │ range click:
//!    └────────────────────────┘  └────────────────────────────────────┤ anchor..=clicked
//!                                                                     ▼
//!                                                          (anchor unchanged)
//! ```
//!
//! The anchor only changes on a plain click, when a toggle click *adds* an
//! id, or when the selection becomes empty. Removing the anchor id with a
//! toggle click leaves the anchor in place for later range extension.
//!
//! Selection is transient: it is never persisted and holds block ids only.

use folio_types::BlockId;
use indexmap::IndexSet;

/// Modifier keys held during a click.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Add/remove a single id (Ctrl / Cmd).
    pub toggle: bool,
    /// Extend from the anchor (Shift).
    pub range: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        toggle: false,
        range: false,
    };
    pub const TOGGLE: Modifiers = Modifiers {
        toggle: true,
        range: false,
    };
    pub const RANGE: Modifiers = Modifiers {
        toggle: false,
        range: true,
    };

    pub fn any(&self) -> bool {
        self.toggle || self.range
    }
}

/// Current selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SelectionState {
    #[default]
    None,
    /// One block; it is also the anchor.
    Single(BlockId),
    /// Several blocks (or one block that is not the anchor).
    Multi {
        ids: IndexSet<BlockId>,
        anchor: BlockId,
    },
}

/// Selection controller for one open document.
#[derive(Clone, Debug, Default)]
pub struct Selection {
    state: SelectionState,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        match &self.state {
            SelectionState::None => 0,
            SelectionState::Single(_) => 1,
            SelectionState::Multi { ids, .. } => ids.len(),
        }
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        match &self.state {
            SelectionState::None => false,
            SelectionState::Single(s) => s == id,
            SelectionState::Multi { ids, .. } => ids.contains(id),
        }
    }

    pub fn anchor(&self) -> Option<BlockId> {
        match &self.state {
            SelectionState::None => None,
            SelectionState::Single(id) => Some(*id),
            SelectionState::Multi { anchor, .. } => Some(*anchor),
        }
    }

    /// Selected ids in the order they were selected.
    pub fn ids(&self) -> Vec<BlockId> {
        match &self.state {
            SelectionState::None => Vec::new(),
            SelectionState::Single(id) => vec![*id],
            SelectionState::Multi { ids, .. } => ids.iter().copied().collect(),
        }
    }

    /// Selected ids in document order.
    pub fn ids_in_order(&self, order: &[BlockId]) -> Vec<BlockId> {
        order.iter().filter(|id| self.contains(id)).copied().collect()
    }

    /// Whether dragging `dragged` should move the whole selection.
    pub fn is_group_drag(&self, dragged: &BlockId) -> bool {
        self.len() > 1 && self.contains(dragged)
    }

    /// Click on a block's non-editable surface.
    ///
    /// `order` is the current visual order, used for range extension.
    pub fn click(&mut self, id: BlockId, modifiers: Modifiers, order: &[BlockId]) {
        if modifiers.range {
            if let Some(range) = self.range_from_anchor(id, order) {
                self.state = range;
                return;
            }
        }
        if modifiers.toggle {
            self.toggle(id);
            return;
        }
        self.state = SelectionState::Single(id);
    }

    /// Focus moved into an editable content region.
    ///
    /// Without modifiers edit intent wins and the selection is cleared.
    pub fn focus_editable(&mut self, modifiers: Modifiers) {
        if !modifiers.any() {
            self.clear();
        }
    }

    pub fn clear(&mut self) {
        self.state = SelectionState::None;
    }

    /// Global delete key. Returns the ids to delete (document order) and
    /// resets the selection, unless focus is inside an editable region.
    pub fn take_for_delete(&mut self, focus_in_editable: bool, order: &[BlockId]) -> Vec<BlockId> {
        if focus_in_editable || self.is_empty() {
            return Vec::new();
        }
        let ids = self.ids_in_order(order);
        self.clear();
        ids
    }

    /// Follow a block id change (temporary → permanent).
    pub fn remap(&mut self, from: &BlockId, to: BlockId) {
        match &mut self.state {
            SelectionState::None => {}
            SelectionState::Single(id) => {
                if id == from {
                    *id = to;
                }
            }
            SelectionState::Multi { ids, anchor } => {
                if ids.contains(from) {
                    *ids = ids
                        .iter()
                        .map(|id| if id == from { to } else { *id })
                        .collect();
                }
                if anchor == from {
                    *anchor = to;
                }
            }
        }
    }

    /// Drop an id (e.g. the block was deleted).
    pub fn forget(&mut self, id: &BlockId) {
        match &mut self.state {
            SelectionState::None => {}
            SelectionState::Single(s) => {
                if s == id {
                    self.state = SelectionState::None;
                }
            }
            SelectionState::Multi { ids, anchor } => {
                ids.shift_remove(id);
                if ids.is_empty() {
                    self.state = SelectionState::None;
                } else if anchor == id {
                    *anchor = ids[0];
                }
            }
        }
    }

    fn toggle(&mut self, id: BlockId) {
        let state = std::mem::take(&mut self.state);
        self.state = match state {
            SelectionState::None => SelectionState::Single(id),
            SelectionState::Single(current) if current == id => SelectionState::None,
            SelectionState::Single(current) => SelectionState::Multi {
                ids: IndexSet::from([current, id]),
                anchor: id,
            },
            SelectionState::Multi { mut ids, anchor } => {
                if ids.shift_remove(&id) {
                    match ids.len() {
                        0 => SelectionState::None,
                        1 if ids[0] == anchor => SelectionState::Single(anchor),
                        _ => SelectionState::Multi { ids, anchor },
                    }
                } else {
                    ids.insert(id);
                    SelectionState::Multi { ids, anchor: id }
                }
            }
        };
    }

    fn range_from_anchor(&self, clicked: BlockId, order: &[BlockId]) -> Option<SelectionState> {
        let anchor = self.anchor()?;
        let from = order.iter().position(|id| *id == anchor)?;
        let to = order.iter().position(|id| *id == clicked)?;
        let (lo, hi) = if from <= to { (from, to) } else { (to, from) };
        if lo == hi {
            return Some(SelectionState::Single(anchor));
        }
        Some(SelectionState::Multi {
            ids: order[lo..=hi].iter().copied().collect(),
            anchor,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
