// Core systems for a 2D coastal cleanup game: a typed object pool for
// spawnable debris and a persistent grid of per-tile contamination
// flags, kept in sync by the map layer.

#![allow(clippy::collapsible_if)]

pub mod log;
pub mod grid;
pub mod map;
pub mod pool;
pub mod save;
pub mod utils;
