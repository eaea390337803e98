//! World container for bodies and terrain.
//!
//! The [`World`] owns the simulation configuration, the clock, dynamic bodies
//! and the terrain shapes they collide with. Terrains are shared through
//! [`Arc`] so renderers can query them while the stepper runs.

use std::sync::Arc;

use hashbrown::HashMap;
use nalgebra::Point3;
use sim_terrain::{ShapeState, TerrainShape};
use sim_types::{BodyId, Result, SimError, SimulationConfig};
use tracing::{debug, warn};

use crate::body::{Body, BodyShape};
use crate::iface::{BodyCommand, BodySnapshot, SimIface};

/// A named terrain shape registered in the world.
#[derive(Debug, Clone)]
pub struct TerrainEntry {
    /// Model name.
    pub name: String,
    /// Shared, `Ready` shape.
    pub shape: Arc<TerrainShape>,
}

/// Simulation world.
#[derive(Debug)]
pub struct World {
    config: SimulationConfig,
    bodies: Vec<Body>,
    names: HashMap<String, BodyId>,
    terrains: Vec<TerrainEntry>,
    next_id: u64,
    time: f64,
    step_count: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl World {
    /// Create an empty world.
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            bodies: Vec::new(),
            names: HashMap::new(),
            terrains: Vec::new(),
            next_id: 0,
            time: 0.0,
            step_count: 0,
        }
    }

    /// Simulation configuration.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Timestep in seconds.
    #[must_use]
    pub fn timestep(&self) -> f64 {
        self.config.timestep
    }

    /// Current simulation time.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Steps taken so far.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Add a body. Names must be unique and the shape and mass valid.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a duplicate name, bad shape, non-positive
    /// mass or non-finite position.
    pub fn add_body(
        &mut self,
        name: impl Into<String>,
        shape: BodyShape,
        mass: f64,
        position: Point3<f64>,
    ) -> Result<BodyId> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(SimError::invalid_config(format!(
                "duplicate body name '{name}'"
            )));
        }
        shape.validate()?;
        if !mass.is_finite() || mass <= 0.0 {
            return Err(SimError::invalid_config(format!(
                "body '{name}' mass must be positive, got {mass}"
            )));
        }
        if !position.coords.iter().all(|v| v.is_finite()) {
            return Err(SimError::invalid_config(format!(
                "body '{name}' position must be finite"
            )));
        }

        let id = BodyId::new(self.next_id);
        self.next_id += 1;
        self.names.insert(name.clone(), id);
        self.bodies.push(Body::new(id, name, shape, mass, position));
        Ok(id)
    }

    /// Body by ID.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.iter().find(|b| b.id == id)
    }

    /// Mutable body by ID.
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.iter_mut().find(|b| b.id == id)
    }

    /// Body by name.
    #[must_use]
    pub fn body_by_name(&self, name: &str) -> Option<&Body> {
        self.names.get(name).and_then(|&id| self.body(id))
    }

    fn body_by_name_mut(&mut self, name: &str) -> Result<&mut Body> {
        let id = *self
            .names
            .get(name)
            .ok_or_else(|| SimError::BodyNotFound {
                name: name.to_string(),
            })?;
        self.body_mut(id).ok_or(SimError::InvalidBodyId(id.raw()))
    }

    /// All bodies.
    #[must_use]
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    /// All bodies, mutably.
    pub fn bodies_mut(&mut self) -> &mut [Body] {
        &mut self.bodies
    }

    /// Register a terrain model.
    ///
    /// Only `Ready` shapes are accepted. A failed shape aborts this model's
    /// load and leaves the world untouched.
    ///
    /// # Errors
    ///
    /// Returns `TerrainLoad` naming the failed stage, or the current state if
    /// the shape never finished loading.
    pub fn add_terrain(&mut self, name: impl Into<String>, shape: Arc<TerrainShape>) -> Result<()> {
        let name = name.into();
        if shape.state() != ShapeState::Ready {
            let reason = shape
                .failure()
                .map_or_else(|| format!("shape is {}", shape.state()), ToString::to_string);
            warn!(terrain = %name, %reason, "rejecting terrain model");
            return Err(SimError::terrain_load(name, reason));
        }
        debug!(terrain = %name, backend = %shape.backend(), "terrain added");
        self.terrains.push(TerrainEntry { name, shape });
        Ok(())
    }

    /// Registered terrains.
    #[must_use]
    pub fn terrains(&self) -> &[TerrainEntry] {
        &self.terrains
    }

    /// Terrain by name.
    #[must_use]
    pub fn terrain(&self, name: &str) -> Option<&Arc<TerrainShape>> {
        self.terrains
            .iter()
            .find(|t| t.name == name)
            .map(|t| &t.shape)
    }

    /// Add gravity to every body's accumulated force.
    pub fn apply_gravity(&mut self) {
        let g = self.config.gravity.acceleration;
        for body in &mut self.bodies {
            let weight = g * body.mass;
            body.apply_force(weight);
        }
    }

    /// Clear accumulated forces on every body.
    pub fn clear_forces(&mut self) {
        for body in &mut self.bodies {
            body.clear_forces();
        }
    }

    /// Advance the clock by `dt`.
    pub fn advance_time(&mut self, dt: f64) {
        self.time += dt;
        self.step_count += 1;
    }

    /// Check for non-finite body state.
    ///
    /// # Errors
    ///
    /// Returns `Diverged` naming the first offending body.
    pub fn validate(&self) -> Result<()> {
        match self.bodies.iter().find(|b| !b.is_finite()) {
            Some(body) => Err(SimError::diverged(format!(
                "body '{}' has non-finite state",
                body.name
            ))),
            None => Ok(()),
        }
    }

    /// Whether `max_time` has been reached.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.config.max_time.is_some_and(|max| self.time >= max)
    }

    /// Total kinetic energy.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        self.bodies.iter().map(Body::kinetic_energy).sum()
    }

    /// Write the clock and body state into `iface`.
    pub fn publish(&self, iface: &SimIface) {
        iface.with_locked(|data| {
            data.sim_time = self.time;
            data.step_count = self.step_count;
            data.bodies.clear();
            data.bodies.extend(self.bodies.iter().map(|b| BodySnapshot {
                id: b.id,
                name: b.name.clone(),
                pose: b.pose(),
                velocity: b.velocity,
                in_contact: b.in_contact,
            }));
        });
    }

    /// Apply queued client commands. Returns whether stepping is paused.
    ///
    /// Commands are drained under the lock and applied after it is released.
    ///
    /// # Errors
    ///
    /// Returns `BodyNotFound` for a command naming an unknown body. The
    /// remaining commands are discarded.
    pub fn apply_commands(&mut self, iface: &SimIface) -> Result<bool> {
        let (paused, commands) =
            iface.with_locked(|data| (data.paused, std::mem::take(&mut data.commands)));

        for command in commands {
            let body = self.body_by_name_mut(command.target())?;
            match command {
                BodyCommand::SetPosition { position, .. } => {
                    body.position = position;
                    body.velocity = nalgebra::Vector3::zeros();
                }
                BodyCommand::SetVelocity { velocity, .. } => body.velocity = velocity,
                BodyCommand::ApplyForce { force, .. } => body.apply_force(force),
            }
        }
        Ok(paused)
    }
}
