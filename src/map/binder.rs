use std::collections::HashMap;

use crate::{
    grid::{TileChange, TileGrid, TileState},
    log,
    pool::{
        InstanceHandle,
        Prototype,
        multi::WeightedMultiPool
    },
    utils::coords::{Cell, GridTransform}
};

// ----------------------------------------------
// BoundKind
// ----------------------------------------------

// Which flag a bound instance visualizes.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BoundKind {
    Trash,
    Pollution,
}

impl BoundKind {
    #[inline]
    fn flag(self) -> TileState {
        match self {
            BoundKind::Trash => TileState::Trash,
            BoundKind::Pollution => TileState::Pollution,
        }
    }
}

// ----------------------------------------------
// GridObjectBinder
// ----------------------------------------------

// Keeps spawned instances in sync with grid flags: at most one bound
// instance per (cell, kind). Flag transitions drive spawns/despawns,
// and an instance destroyed from the outside clears its flag back.
#[derive(Default)]
pub struct GridObjectBinder {
    trash_bindings: HashMap<Cell, InstanceHandle>,
    pollution_bindings: HashMap<Cell, InstanceHandle>,

    // Reverse lookup for notify_destroyed().
    bound_cells: HashMap<InstanceHandle, (BoundKind, Cell)>,
}

impl GridObjectBinder {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn bindings(&self, kind: BoundKind) -> &HashMap<Cell, InstanceHandle> {
        match kind {
            BoundKind::Trash => &self.trash_bindings,
            BoundKind::Pollution => &self.pollution_bindings,
        }
    }

    #[inline]
    fn bindings_mut(&mut self, kind: BoundKind) -> &mut HashMap<Cell, InstanceHandle> {
        match kind {
            BoundKind::Trash => &mut self.trash_bindings,
            BoundKind::Pollution => &mut self.pollution_bindings,
        }
    }

    #[inline]
    pub fn binding(&self, kind: BoundKind, cell: Cell) -> Option<InstanceHandle> {
        self.bindings(kind).get(&cell).copied()
    }

    #[inline]
    pub fn bound_count(&self, kind: BoundKind) -> usize {
        self.bindings(kind).len()
    }

    // ----------------------
    // Change handling:
    // ----------------------

    // Reconciles one committed tile change: spawns for flags that are
    // set without a binding, despawns bindings whose flag cleared.
    pub fn handle_tile_changed<P: Prototype>(&mut self,
                                             trash_pool: &mut WeightedMultiPool<P>,
                                             pollution_pool: &mut WeightedMultiPool<P>,
                                             transform: &GridTransform,
                                             change: TileChange) {
        let has_trash = change.state.contains(TileState::Trash);
        let has_pollution = change.state.contains(TileState::Pollution);

        if has_trash {
            self.spawn_bound(BoundKind::Trash, trash_pool, transform, change.cell);
        } else {
            self.despawn_bound(BoundKind::Trash, trash_pool, change.cell);
        }

        if has_pollution {
            self.spawn_bound(BoundKind::Pollution, pollution_pool, transform, change.cell);
        } else {
            self.despawn_bound(BoundKind::Pollution, pollution_pool, change.cell);
        }
    }

    fn spawn_bound<P: Prototype>(&mut self,
                                 kind: BoundKind,
                                 pool: &mut WeightedMultiPool<P>,
                                 transform: &GridTransform,
                                 cell: Cell) {
        if self.bindings(kind).contains_key(&cell) {
            return; // Already visualized.
        }

        let center = transform.cell_to_world_center(cell);
        match pool.try_spawn(center, 0.0) {
            Ok(Some(handle)) => {
                self.bindings_mut(kind).insert(cell, handle);
                self.bound_cells.insert(handle, (kind, cell));
            }
            Ok(None) => {
                // Cell stays unbound; a later change will retry.
                log::warn!(log::channel!("map"), "No instance available for {kind:?} at cell {cell}.");
            }
            Err(err) => {
                log::error!(log::channel!("map"), "Spawn for {kind:?} at cell {cell} failed: {err}");
            }
        }
    }

    fn despawn_bound<P: Prototype>(&mut self,
                                   kind: BoundKind,
                                   pool: &mut WeightedMultiPool<P>,
                                   cell: Cell) {
        let Some(handle) = self.bindings_mut(kind).remove(&cell) else {
            return;
        };

        self.bound_cells.remove(&handle);

        if let Err(err) = pool.despawn(handle) {
            log::error!(log::channel!("map"), "Despawn for {kind:?} at cell {cell} failed: {err}");
        }
    }

    // ----------------------
    // External destruction:
    // ----------------------

    // Closes the loop when a bound instance is destroyed outside the
    // map (e.g. collected by the player): removes the binding, returns
    // the instance, and clears the flag it visualized. Returns false
    // for handles this binder does not track.
    pub fn notify_destroyed<P: Prototype>(&mut self,
                                          grid: &mut TileGrid,
                                          trash_pool: &mut WeightedMultiPool<P>,
                                          pollution_pool: &mut WeightedMultiPool<P>,
                                          handle: InstanceHandle) -> bool {
        let Some((kind, cell)) = self.bound_cells.remove(&handle) else {
            log::warn!(log::channel!("map"), "notify_destroyed: handle {handle} is not bound.");
            return false;
        };

        self.bindings_mut(kind).remove(&cell);

        let pool = match kind {
            BoundKind::Trash => trash_pool,
            BoundKind::Pollution => pollution_pool,
        };
        if let Err(err) = pool.despawn(handle) {
            log::error!(log::channel!("map"), "Despawn for destroyed {kind:?} at cell {cell} failed: {err}");
        }

        // The binding is already gone, so the change this write fires
        // reconciles to a no-op for this cell.
        grid.set_flag(cell, kind.flag(), false);
        true
    }

    // ----------------------
    // Bulk sync:
    // ----------------------

    // Despawns every binding. Used on teardown and before a full resync.
    pub fn despawn_all<P: Prototype>(&mut self,
                                     trash_pool: &mut WeightedMultiPool<P>,
                                     pollution_pool: &mut WeightedMultiPool<P>) {
        for (_, handle) in self.trash_bindings.drain() {
            if let Err(err) = trash_pool.despawn(handle) {
                log::error!(log::channel!("map"), "Teardown despawn failed: {err}");
            }
        }
        for (_, handle) in self.pollution_bindings.drain() {
            if let Err(err) = pollution_pool.despawn(handle) {
                log::error!(log::channel!("map"), "Teardown despawn failed: {err}");
            }
        }
        self.bound_cells.clear();
    }

    // Rebuilds all bindings from the grid's current state. Used after
    // load and after a resize, when per-cell changes were not fired.
    pub fn sync_from_grid<P: Prototype>(&mut self,
                                        grid: &TileGrid,
                                        trash_pool: &mut WeightedMultiPool<P>,
                                        pollution_pool: &mut WeightedMultiPool<P>,
                                        transform: &GridTransform) {
        self.despawn_all(trash_pool, pollution_pool);

        if !grid.is_initialized() {
            return;
        }

        for cell in grid.cell_range().iter() {
            let state = grid.tile_state(cell);
            if state.contains(TileState::Trash) {
                self.spawn_bound(BoundKind::Trash, trash_pool, transform, cell);
            }
            if state.contains(TileState::Pollution) {
                self.spawn_bound(BoundKind::Pollution, pollution_pool, transform, cell);
            }
        }
    }
}
