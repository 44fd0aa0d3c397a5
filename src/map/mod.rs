use rand::Rng;

use crate::{
    grid::{TileChangeSubscription, TileGrid, TileState},
    log,
    pool::{
        InstanceHandle,
        Prototype,
        multi::{RandomGenerator, WeightedMultiPool}
    },
    save::{Load, LoadResult, Save, SaveResult, SaveStateImpl},
    utils::{
        Size,
        Vec2,
        coords::{Cell, GridTransform}
    }
};

pub mod binder;
use binder::{BoundKind, GridObjectBinder};


// ----------------------------------------------
// CleanupMap
// ----------------------------------------------

// Owns the tile grid, the world transform and the two spawn pools, and
// keeps them consistent: every logical flag write flows through the
// grid, and the binder reconciles spawned instances from the committed
// changes. Single-threaded by design.
pub struct CleanupMap<P: Prototype> {
    grid: TileGrid,
    transform: GridTransform,

    trash_pool: WeightedMultiPool<P>,
    pollution_pool: WeightedMultiPool<P>,

    binder: GridObjectBinder,
    subscription: Option<TileChangeSubscription>,

    grid_size: Size,
    is_initialized: bool,
}

impl<P: Prototype> CleanupMap<P> {
    pub fn new(grid_size: Size,
               transform: GridTransform,
               trash_pool: WeightedMultiPool<P>,
               pollution_pool: WeightedMultiPool<P>) -> Self {
        Self {
            grid: TileGrid::new(),
            transform,
            trash_pool,
            pollution_pool,
            binder: GridObjectBinder::new(),
            subscription: None,
            grid_size,
            is_initialized: false,
        }
    }

    // Allocates the grid (unless loaded state already provided one),
    // subscribes to changes and spawns instances for any flags already
    // set. Idempotent.
    pub fn initialize(&mut self) {
        if self.is_initialized {
            log::warn!(log::channel!("map"), "CleanupMap is already initialized.");
            return;
        }

        self.grid.rebuild_from_serialized_if_needed();
        if !self.grid.is_initialized() {
            self.grid.initialize(self.grid_size);
        }

        self.subscription = Some(self.grid.subscribe());
        self.resync_bound_instances();
        self.is_initialized = true;
    }

    // Despawns all bound instances and releases the grid subscription.
    pub fn dispose(&mut self) {
        self.binder.despawn_all(&mut self.trash_pool, &mut self.pollution_pool);
        if let Some(subscription) = self.subscription.take() {
            self.grid.unsubscribe(subscription);
        }
        self.is_initialized = false;
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    // Drains committed grid changes and lets the binder reconcile each
    // one. Binder work can write back to the grid (notify_destroyed),
    // which appends to the same queue, so this loops until quiet.
    fn pump_grid_changes(&mut self) {
        let Some(subscription) = &self.subscription else {
            return;
        };

        while let Some(change) = self.grid.poll_change(subscription) {
            self.binder.handle_tile_changed(
                &mut self.trash_pool,
                &mut self.pollution_pool,
                &self.transform,
                change);
        }
    }

    fn resync_bound_instances(&mut self) {
        self.binder.sync_from_grid(
            &self.grid,
            &mut self.trash_pool,
            &mut self.pollution_pool,
            &self.transform);
    }

    // ----------------------
    // Queries:
    // ----------------------

    #[inline]
    pub fn size_in_cells(&self) -> Size {
        self.grid.size_in_cells()
    }

    #[inline]
    pub fn is_valid_cell(&self, cell: Cell) -> bool {
        self.grid.is_cell_within_bounds(cell)
    }

    #[inline]
    pub fn tile_state(&self, cell: Cell) -> TileState {
        self.grid.tile_state(cell)
    }

    #[inline]
    pub fn has_trash(&self, cell: Cell) -> bool {
        self.grid.has_trash(cell)
    }

    #[inline]
    pub fn has_pollution(&self, cell: Cell) -> bool {
        self.grid.has_pollution(cell)
    }

    #[inline]
    pub fn clean_ratio(&self) -> f32 {
        self.grid.clean_ratio()
    }

    #[inline]
    pub fn bound_instance(&self, kind: BoundKind, cell: Cell) -> Option<InstanceHandle> {
        self.binder.binding(kind, cell)
    }

    #[inline]
    pub fn bound_count(&self, kind: BoundKind) -> usize {
        self.binder.bound_count(kind)
    }

    // ----------------------
    // World space mapping:
    // ----------------------

    // World position to grid cell, None when outside the grid.
    pub fn world_to_cell(&self, world: Vec2) -> Option<Cell> {
        let cell = self.transform.world_to_cell(world);
        if self.grid.is_cell_within_bounds(cell) {
            Some(cell)
        } else {
            None
        }
    }

    #[inline]
    pub fn cell_to_world_center(&self, cell: Cell) -> Vec2 {
        self.transform.cell_to_world_center(cell)
    }

    // ----------------------
    // Flag writes:
    // ----------------------

    pub fn set_trash(&mut self, cell: Cell, enable: bool) -> bool {
        let changed = self.grid.set_trash(cell, enable);
        self.pump_grid_changes();
        changed
    }

    pub fn set_pollution(&mut self, cell: Cell, enable: bool) -> bool {
        let changed = self.grid.set_pollution(cell, enable);
        self.pump_grid_changes();
        changed
    }

    pub fn clean_cell(&mut self, cell: Cell) -> bool {
        let changed = self.grid.clean_tile(cell);
        self.pump_grid_changes();
        changed
    }

    pub fn toggle_trash(&mut self, cell: Cell) -> bool {
        self.set_trash(cell, !self.grid.has_trash(cell))
    }

    pub fn toggle_pollution(&mut self, cell: Cell) -> bool {
        self.set_pollution(cell, !self.grid.has_pollution(cell))
    }

    pub fn set_all_trash(&mut self, enable: bool) -> usize {
        let changed_count = self.grid.set_all_trash(enable);
        self.pump_grid_changes();
        changed_count
    }

    pub fn set_all_pollution(&mut self, enable: bool) -> usize {
        let changed_count = self.grid.set_all_pollution(enable);
        self.pump_grid_changes();
        changed_count
    }

    pub fn set_all_clean(&mut self) -> usize {
        let changed_count = self.grid.set_all_clean();
        self.pump_grid_changes();
        changed_count
    }

    // World-space variants; silently ignore positions off the grid.
    pub fn set_trash_at_world(&mut self, world: Vec2, enable: bool) -> bool {
        match self.world_to_cell(world) {
            Some(cell) => self.set_trash(cell, enable),
            None => false,
        }
    }

    pub fn set_pollution_at_world(&mut self, world: Vec2, enable: bool) -> bool {
        match self.world_to_cell(world) {
            Some(cell) => self.set_pollution(cell, enable),
            None => false,
        }
    }

    pub fn clean_cell_at_world(&mut self, world: Vec2) -> bool {
        match self.world_to_cell(world) {
            Some(cell) => self.clean_cell(cell),
            None => false,
        }
    }

    // ----------------------
    // Resize:
    // ----------------------

    // Resizes the grid and rebuilds all bound instances from scratch.
    // The resize itself fires no per-cell changes.
    pub fn resize(&mut self, new_size: Size, preserve_contents: bool) {
        self.grid.resize(new_size, preserve_contents);
        self.grid_size = self.grid.size_in_cells();

        if self.is_initialized {
            self.resync_bound_instances();
        }
    }

    // ----------------------
    // External destruction:
    // ----------------------

    // Reports that a bound instance was destroyed outside the map.
    // Clears the flag it visualized and returns it to its pool.
    pub fn notify_destroyed(&mut self, handle: InstanceHandle) -> bool {
        let destroyed = self.binder.notify_destroyed(
            &mut self.grid,
            &mut self.trash_pool,
            &mut self.pollution_pool,
            handle);

        self.pump_grid_changes();
        destroyed
    }

    // ----------------------
    // Debug helpers:
    // ----------------------

    // Sets the flag on up to `count` randomly chosen cells.
    pub fn scatter_random_trash(&mut self, count: usize, rng: &mut RandomGenerator) -> usize {
        self.scatter_random_flag(TileState::Trash, count, rng)
    }

    pub fn scatter_random_pollution(&mut self, count: usize, rng: &mut RandomGenerator) -> usize {
        self.scatter_random_flag(TileState::Pollution, count, rng)
    }

    fn scatter_random_flag(&mut self, flag: TileState, count: usize, rng: &mut RandomGenerator) -> usize {
        let size = self.grid.size_in_cells();
        if !size.is_valid() {
            return 0;
        }

        let mut changed_count = 0;
        for _ in 0..count {
            let cell = Cell::new(
                rng.random_range(0..size.width),
                rng.random_range(0..size.height));

            if self.grid.set_flag(cell, flag, true) {
                changed_count += 1;
            }
        }

        self.pump_grid_changes();
        changed_count
    }

    // ----------------------
    // Pool access:
    // ----------------------

    #[inline]
    pub fn trash_pool(&self) -> &WeightedMultiPool<P> {
        &self.trash_pool
    }

    #[inline]
    pub fn trash_pool_mut(&mut self) -> &mut WeightedMultiPool<P> {
        &mut self.trash_pool
    }

    #[inline]
    pub fn pollution_pool(&self) -> &WeightedMultiPool<P> {
        &self.pollution_pool
    }

    #[inline]
    pub fn pollution_pool_mut(&mut self) -> &mut WeightedMultiPool<P> {
        &mut self.pollution_pool
    }
}

// Only the grid's logical state is persisted; bound instances are
// rebuilt from it after load.
impl<P: Prototype> Save for CleanupMap<P> {
    fn pre_save(&mut self) {
        self.grid.pre_save();
    }

    fn save(&self, state: &mut SaveStateImpl) -> SaveResult {
        self.grid.save(state)
    }
}

impl<P: Prototype> Load for CleanupMap<P> {
    fn load(&mut self, state: &SaveStateImpl) -> LoadResult {
        self.grid.load(state)
    }

    fn post_load(&mut self) {
        self.grid.post_load();
        self.grid_size = self.grid.size_in_cells();

        if self.is_initialized {
            // The loaded grid carries no subscriptions; re-subscribe
            // before rebuilding the bound instances.
            self.subscription = Some(self.grid.subscribe());
            self.resync_bound_instances();
        }
    }
}
