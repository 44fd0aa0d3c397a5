use std::collections::VecDeque;

use slab::Slab;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    bitflags_with_display,
    log,
    save::{Load, LoadResult, Save, SaveResult, SaveState, SaveStateImpl},
    utils::{
        Size,
        coords::{Cell, CellRange}
    }
};


// ----------------------------------------------
// TileState
// ----------------------------------------------

bitflags_with_display! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TileState: u8 {
        const Pollution = 1 << 0;
        const Trash     = 1 << 1;
    }
}

impl TileState {
    // The all-zero value means "clean".
    pub const CLEAN: TileState = TileState::empty();

    #[inline]
    pub fn is_clean(self) -> bool {
        self.is_empty()
    }
}

// ----------------------------------------------
// TileChange / TileChangeSubscription
// ----------------------------------------------

// One committed state transition: the cell and its *new* state.
// Published after the grid storage is updated, so a subscriber that
// mutates the grid from its handler always observes committed state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TileChange {
    pub cell: Cell,
    pub state: TileState,
}

// Owned handle to a change event queue. Must be returned to the grid
// via unsubscribe() on teardown.
#[derive(Debug)]
pub struct TileChangeSubscription {
    key: usize,
}

// ----------------------------------------------
// SerializedGridState
// ----------------------------------------------

// Flat persisted layout: dimensions plus row-major integer-encoded
// cell states (`index = x + y * width`), length = width * height.
#[derive(Clone, Default, Serialize, Deserialize)]
struct SerializedGridState {
    width: i32,
    height: i32,
    cells: Vec<u32>,
}

impl SerializedGridState {
    #[inline]
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    #[inline]
    fn is_valid(&self) -> bool {
        self.size().is_valid() && self.cells.len() == self.size().cell_count()
    }
}

// ----------------------------------------------
// TileGrid
// ----------------------------------------------

// 2D grid of bitflag tile states. Created empty; initialize() allocates
// the backing storage. Row-major live storage is rebuilt lazily from the
// serialized form after a load.
#[derive(Default, Serialize, Deserialize)]
pub struct TileGrid {
    #[serde(flatten)]
    serialized: SerializedGridState,

    #[serde(skip)]
    size_in_cells: Size,

    #[serde(skip)]
    states: Vec<TileState>,

    // One pending-change queue per subscriber.
    #[serde(skip)]
    subscribers: Slab<VecDeque<TileChange>>,
}

impl TileGrid {
    pub fn new() -> Self {
        Self::default()
    }

    // Allocates storage with every cell Clean. Rejects invalid sizes.
    pub fn initialize(&mut self, size: Size) {
        if !size.is_valid() {
            log::error!(log::channel!("grid"), "TileGrid initialize failed: invalid size {size}");
            return;
        }

        self.size_in_cells = size;
        self.states = vec![TileState::CLEAN; size.cell_count()];
        self.sync_serialized();
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        !self.states.is_empty()
    }

    #[inline]
    pub fn size_in_cells(&self) -> Size {
        self.size_in_cells
    }

    #[inline]
    pub fn cell_range(&self) -> CellRange {
        CellRange::from_size(self.size_in_cells)
    }

    #[inline]
    pub fn is_cell_within_bounds(&self, cell: Cell) -> bool {
        self.is_initialized() && self.cell_range().contains(cell)
    }

    #[inline]
    fn cell_index(&self, cell: Cell) -> usize {
        debug_assert!(self.is_cell_within_bounds(cell));
        (cell.x as usize) + (cell.y as usize * self.size_in_cells.width as usize)
    }

    // Shared precondition check for mutating operations. Attempts the
    // lazy rebuild from serialized data before giving up.
    fn validate(&mut self, cell: Cell) -> bool {
        if !self.is_initialized() {
            self.rebuild_from_serialized_if_needed();
            if !self.is_initialized() {
                log::warn!(log::channel!("grid"), "TileGrid is not initialized");
                return false;
            }
        }
        self.is_cell_within_bounds(cell)
    }

    // ----------------------
    // State queries:
    // ----------------------

    // Full state of the cell. Out of bounds or uninitialized reads
    // return Clean.
    #[inline]
    pub fn tile_state(&self, cell: Cell) -> TileState {
        if !self.is_cell_within_bounds(cell) {
            return TileState::CLEAN;
        }
        self.states[self.cell_index(cell)]
    }

    #[inline]
    pub fn has_pollution(&self, cell: Cell) -> bool {
        self.tile_state(cell).contains(TileState::Pollution)
    }

    #[inline]
    pub fn has_trash(&self, cell: Cell) -> bool {
        self.tile_state(cell).contains(TileState::Trash)
    }

    // Fraction of cells that are fully Clean, in [0,1].
    // Returns 0 when uninitialized; never divides by zero.
    pub fn clean_ratio(&self) -> f32 {
        if !self.is_initialized() {
            return 0.0;
        }

        let total = self.size_in_cells.cell_count();
        if total == 0 {
            return 0.0;
        }

        let clean = self.states.iter().filter(|state| state.is_clean()).count();
        (clean as f32) / (total as f32)
    }

    // ----------------------
    // State mutators:
    // ----------------------

    // Commits a new state for the cell and notifies subscribers.
    // A write that does not change the stored value is a no-op and
    // fires no notification. Returns true if the cell changed.
    fn set_tile_state_internal(&mut self, cell: Cell, new_state: TileState) -> bool {
        if !self.validate(cell) {
            return false;
        }

        let index = self.cell_index(cell);
        let prev_state = self.states[index];
        if prev_state == new_state {
            return false;
        }

        // Commit first, notify after, so a handler that re-enters the
        // grid observes the latest committed state.
        self.states[index] = new_state;
        self.notify_subscribers(TileChange { cell, state: new_state });
        true
    }

    #[inline]
    pub fn set_flag(&mut self, cell: Cell, flag: TileState, enable: bool) -> bool {
        if !self.validate(cell) {
            return false;
        }
        let current = self.states[self.cell_index(cell)];
        let next = if enable { current | flag } else { current & !flag };
        self.set_tile_state_internal(cell, next)
    }

    #[inline]
    pub fn set_pollution(&mut self, cell: Cell, enable: bool) -> bool {
        self.set_flag(cell, TileState::Pollution, enable)
    }

    #[inline]
    pub fn set_trash(&mut self, cell: Cell, enable: bool) -> bool {
        self.set_flag(cell, TileState::Trash, enable)
    }

    // Forces the cell to the all-zero state, clearing every flag.
    #[inline]
    pub fn clean_tile(&mut self, cell: Cell) -> bool {
        self.set_tile_state_internal(cell, TileState::CLEAN)
    }

    // Applies the flag to every cell. Each changed cell fires its own
    // notification; unchanged cells fire none. Returns the change count.
    pub fn set_all_flag(&mut self, flag: TileState, enable: bool) -> usize {
        if !self.is_initialized() {
            log::warn!(log::channel!("grid"), "TileGrid is not initialized");
            return 0;
        }

        let mut changed_count = 0;
        for cell in self.cell_range().iter() {
            if self.set_flag(cell, flag, enable) {
                changed_count += 1;
            }
        }
        changed_count
    }

    #[inline]
    pub fn set_all_pollution(&mut self, enable: bool) -> usize {
        self.set_all_flag(TileState::Pollution, enable)
    }

    #[inline]
    pub fn set_all_trash(&mut self, enable: bool) -> usize {
        self.set_all_flag(TileState::Trash, enable)
    }

    pub fn set_all_clean(&mut self) -> usize {
        if !self.is_initialized() {
            log::warn!(log::channel!("grid"), "TileGrid is not initialized");
            return 0;
        }

        let mut changed_count = 0;
        for cell in self.cell_range().iter() {
            if self.clean_tile(cell) {
                changed_count += 1;
            }
        }
        changed_count
    }

    // ----------------------
    // Resize:
    // ----------------------

    // Resizes the grid. With preserve_contents the overlapping rectangle
    // anchored at the origin is copied over and any new cells start
    // Clean; without it all state is discarded and reinitialized.
    // Fires no per-cell notifications.
    pub fn resize(&mut self, new_size: Size, preserve_contents: bool) {
        if !new_size.is_valid() {
            log::error!(log::channel!("grid"), "TileGrid resize failed: invalid size {new_size}");
            return;
        }

        if !self.is_initialized() || !preserve_contents {
            self.initialize(new_size);
            return;
        }

        if new_size == self.size_in_cells {
            return;
        }

        let mut new_states = vec![TileState::CLEAN; new_size.cell_count()];

        let min_width  = new_size.width.min(self.size_in_cells.width);
        let min_height = new_size.height.min(self.size_in_cells.height);

        for y in 0..min_height {
            for x in 0..min_width {
                let old_index = (x as usize) + (y as usize * self.size_in_cells.width as usize);
                let new_index = (x as usize) + (y as usize * new_size.width as usize);
                new_states[new_index] = self.states[old_index];
            }
        }

        self.states = new_states;
        self.size_in_cells = new_size;
        self.sync_serialized();
    }

    // ----------------------
    // Change subscriptions:
    // ----------------------

    pub fn subscribe(&mut self) -> TileChangeSubscription {
        TileChangeSubscription {
            key: self.subscribers.insert(VecDeque::new()),
        }
    }

    // Releases the subscription. Mandatory on teardown.
    pub fn unsubscribe(&mut self, subscription: TileChangeSubscription) {
        if self.subscribers.try_remove(subscription.key).is_none() {
            log::warn!(log::channel!("grid"), "Unsubscribe of unknown subscription [{}]", subscription.key);
        }
    }

    // Pops the next pending change for this subscriber, oldest first.
    #[inline]
    pub fn poll_change(&mut self, subscription: &TileChangeSubscription) -> Option<TileChange> {
        self.subscribers
            .get_mut(subscription.key)
            .and_then(|queue| queue.pop_front())
    }

    #[inline]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn notify_subscribers(&mut self, change: TileChange) {
        for (_, queue) in self.subscribers.iter_mut() {
            queue.push_back(change);
        }
    }

    // ----------------------
    // Serialization:
    // ----------------------

    #[inline]
    pub fn has_serialized_data(&self) -> bool {
        self.serialized.is_valid()
    }

    // Mirrors the live storage into the flat serialized form.
    pub fn sync_serialized(&mut self) {
        if !self.is_initialized() {
            return;
        }

        self.serialized.width  = self.size_in_cells.width;
        self.serialized.height = self.size_in_cells.height;
        self.serialized.cells  = self.states.iter().map(|state| state.bits() as u32).collect();
    }

    // Rebuilds the live storage from the flat serialized form, if the
    // live storage is absent and serialized data is present.
    pub fn rebuild_from_serialized_if_needed(&mut self) {
        if self.is_initialized() || !self.serialized.is_valid() {
            return;
        }

        self.size_in_cells = self.serialized.size();
        self.states = self.serialized.cells
            .iter()
            .map(|bits| TileState::from_bits_truncate(*bits as u8))
            .collect();
    }
}

impl Save for TileGrid {
    fn pre_save(&mut self) {
        self.sync_serialized();
    }

    fn save(&self, state: &mut SaveStateImpl) -> SaveResult {
        state.save(self)
    }
}

impl Load for TileGrid {
    fn load(&mut self, state: &SaveStateImpl) -> LoadResult {
        state.load(self)
    }

    fn post_load(&mut self) {
        self.rebuild_from_serialized_if_needed();
    }
}
