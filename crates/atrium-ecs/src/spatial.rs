//! Uniform spatial hash grid over a bounded plane.
//!
//! The grid covers an axis-aligned rectangle split into a fixed number of
//! cells per axis. Each registered client lives in exactly one cell, chosen
//! from its position by
//!
//! ```text
//! cell = clamp(floor((position - bounds.min) / (bounds.max - bounds.min) * cells), 0, cells - 1)
//! ```
//!
//! per axis. Positions outside the bounds are clamped into the edge cells;
//! the client keeps its true position, so distance filtering stays exact.
//!
//! Moving a client touches only its old and new cell. Proximity queries
//! gather the clients of every cell overlapping the query square and then
//! filter by true Euclidean distance.
//!
//! The grid works in the ground plane. World-space `Vec3` positions map to
//! grid coordinates through [`planar`] (`x`, `z`).

use std::collections::HashSet;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::EcsError;

/// Cells per axis used by the office scenes.
pub const DEFAULT_DIMENSIONS: [usize; 2] = [100, 100];

/// Project a world position onto the grid plane.
#[inline]
pub fn planar(position: Vec3) -> Vec2 {
    Vec2::new(position.x, position.z)
}

// ---------------------------------------------------------------------------
// GridBounds
// ---------------------------------------------------------------------------

/// Axis-aligned rectangle covered by the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridBounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl GridBounds {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Width and height.
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }
}

impl Default for GridBounds {
    /// `[-1000, -1000] .. [1000, 1000]`.
    fn default() -> Self {
        Self {
            min: Vec2::splat(-1000.0),
            max: Vec2::splat(1000.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

/// Generational handle to a registered client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientHandle {
    index: u32,
    generation: u32,
}

/// Registration record: who the client is and where it was last seen.
#[derive(Debug, Clone, PartialEq)]
pub struct GridClient {
    pub entity: EntityId,
    pub position: Vec2,
    pub dimensions: Vec2,
    pub cell: (usize, usize),
}

#[derive(Debug, Default)]
struct ClientSlot {
    generation: u32,
    client: Option<GridClient>,
}

// ---------------------------------------------------------------------------
// SpatialHashGrid
// ---------------------------------------------------------------------------

/// Bucketed index of entity positions.
#[derive(Debug)]
pub struct SpatialHashGrid {
    bounds: GridBounds,
    dimensions: [usize; 2],
    /// Row-major: `cells[y * dimensions[0] + x]`.
    cells: Vec<HashSet<ClientHandle>>,
    clients: Vec<ClientSlot>,
    free: Vec<u32>,
    live: usize,
}

impl SpatialHashGrid {
    /// Create an empty grid.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidGrid`] if the bounds are empty, inverted, not
    /// finite or too wide for their extent to be finite, or if either cell count is zero.
    pub fn new(bounds: GridBounds, dimensions: [usize; 2]) -> Result<Self, EcsError> {
        let size = bounds.size();
        let finite = bounds.min.is_finite() && bounds.max.is_finite() && size.is_finite();
        if !finite || size.x <= 0.0 || size.y <= 0.0 {
            return Err(EcsError::InvalidGrid {
                details: format!("bounds {:?}..{:?} do not span an area", bounds.min, bounds.max),
            });
        }
        if dimensions[0] == 0 || dimensions[1] == 0 {
            return Err(EcsError::InvalidGrid {
                details: format!("cell counts {dimensions:?} must be positive"),
            });
        }
        Ok(Self {
            bounds,
            dimensions,
            cells: vec![HashSet::new(); dimensions[0] * dimensions[1]],
            clients: Vec::new(),
            free: Vec::new(),
            live: 0,
        })
    }

    /// Covered rectangle.
    pub fn bounds(&self) -> GridBounds {
        self.bounds
    }

    /// Cells per axis.
    pub fn dimensions(&self) -> [usize; 2] {
        self.dimensions
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no clients are registered.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Cell that `position` maps to, clamped into the grid.
    pub fn cell_of(&self, position: Vec2) -> (usize, usize) {
        let t = (position - self.bounds.min) / self.bounds.size();
        (
            clamp_index(t.x * self.dimensions[0] as f32, self.dimensions[0]),
            clamp_index(t.y * self.dimensions[1] as f32, self.dimensions[1]),
        )
    }

    /// Register `entity` at `position`.
    pub fn new_client(&mut self, entity: EntityId, position: Vec2, dimensions: Vec2) -> ClientHandle {
        let cell = self.cell_of(position);
        let client = GridClient {
            entity,
            position,
            dimensions,
            cell,
        };
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.clients[index as usize];
                slot.client = Some(client);
                ClientHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.clients.push(ClientSlot {
                    generation: 0,
                    client: Some(client),
                });
                ClientHandle {
                    index: (self.clients.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        let cell_index = self.cell_index(cell);
        self.cells[cell_index].insert(handle);
        self.live += 1;
        handle
    }

    /// Record a new position. Returns `true` if the client changed cell.
    /// Stale handles are ignored.
    pub fn update_position(&mut self, handle: ClientHandle, position: Vec2) -> bool {
        let new_cell = self.cell_of(position);
        let Some(client) = self.client_mut(handle) else {
            return false;
        };
        client.position = position;
        let old_cell = client.cell;
        if old_cell == new_cell {
            return false;
        }
        client.cell = new_cell;
        let (old_index, new_index) = (self.cell_index(old_cell), self.cell_index(new_cell));
        self.cells[old_index].remove(&handle);
        self.cells[new_index].insert(handle);
        true
    }

    /// Unregister a client, returning its last record.
    pub fn remove_client(&mut self, handle: ClientHandle) -> Option<GridClient> {
        let slot = self.clients.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let client = slot.client.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        let cell_index = self.cell_index(client.cell);
        self.cells[cell_index].remove(&handle);
        Some(client)
    }

    /// Unregister every client belonging to `entity`. Returns how many were
    /// removed.
    pub fn remove_entity(&mut self, entity: EntityId) -> usize {
        let handles: Vec<ClientHandle> = self
            .clients
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.client.as_ref().is_some_and(|c| c.entity == entity))
            .map(|(index, slot)| ClientHandle {
                index: index as u32,
                generation: slot.generation,
            })
            .collect();
        for handle in &handles {
            self.remove_client(*handle);
        }
        handles.len()
    }

    /// Registration record for a live handle.
    pub fn client(&self, handle: ClientHandle) -> Option<&GridClient> {
        let slot = self.clients.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.client.as_ref()
    }

    /// Handles currently bucketed in `cell`. Out-of-range cells are empty.
    pub fn cell_members(&self, cell: (usize, usize)) -> Vec<ClientHandle> {
        if cell.0 >= self.dimensions[0] || cell.1 >= self.dimensions[1] {
            return Vec::new();
        }
        let mut members: Vec<ClientHandle> =
            self.cells[self.cell_index(cell)].iter().copied().collect();
        members.sort_unstable();
        members
    }

    /// Entities whose position lies within `radius` of `center`.
    ///
    /// Results are ordered by client registration slot. A negative or
    /// non-finite radius, or a non-finite center, yields no results.
    pub fn find_nearby(&self, center: Vec2, radius: f32) -> Vec<EntityId> {
        if !center.is_finite() || !radius.is_finite() || radius < 0.0 {
            return Vec::new();
        }
        let reach = Vec2::splat(radius);
        let radius_squared = radius * radius;
        self.collect_in_range(center - reach, center + reach, |client| {
            client.position.distance_squared(center) <= radius_squared
        })
    }

    /// Entities whose position lies inside the box `min..=max`.
    ///
    /// An inverted or non-finite box yields no results.
    pub fn find_in_box(&self, min: Vec2, max: Vec2) -> Vec<EntityId> {
        if !min.is_finite() || !max.is_finite() || min.x > max.x || min.y > max.y {
            return Vec::new();
        }
        self.collect_in_range(min, max, |client| {
            client.position.cmpge(min).all() && client.position.cmple(max).all()
        })
    }

    fn collect_in_range<F>(&self, min: Vec2, max: Vec2, keep: F) -> Vec<EntityId>
    where
        F: Fn(&GridClient) -> bool,
    {
        let (x0, y0) = self.cell_of(min);
        let (x1, y1) = self.cell_of(max);
        // One cell of slack on each side absorbs rounding at cell borders.
        let (x0, y0) = (x0.saturating_sub(1), y0.saturating_sub(1));
        let x1 = (x1 + 1).min(self.dimensions[0] - 1);
        let y1 = (y1 + 1).min(self.dimensions[1] - 1);

        let mut hits: Vec<(ClientHandle, EntityId)> = Vec::new();
        for y in y0..=y1 {
            for x in x0..=x1 {
                for handle in &self.cells[self.cell_index((x, y))] {
                    if let Some(client) = self.client(*handle) {
                        if keep(client) {
                            hits.push((*handle, client.entity));
                        }
                    }
                }
            }
        }
        hits.sort_unstable_by_key(|(handle, _)| *handle);
        hits.into_iter().map(|(_, entity)| entity).collect()
    }

    fn client_mut(&mut self, handle: ClientHandle) -> Option<&mut GridClient> {
        let slot = self.clients.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.client.as_mut()
    }

    #[inline]
    fn cell_index(&self, cell: (usize, usize)) -> usize {
        cell.1 * self.dimensions[0] + cell.0
    }
}

/// `floor(scaled)` clamped to `0..count`. NaN maps to 0.
#[inline]
fn clamp_index(scaled: f32, count: usize) -> usize {
    if scaled >= 0.0 {
        (scaled.floor() as usize).min(count - 1)
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
