//! Simulation stepping and control flow.
//!
//! The [`Stepper`] advances a [`World`] by one timestep at a time:
//!
//! 1. Clear forces from the previous step
//! 2. Apply client commands (if an interface is attached)
//! 3. Apply gravity
//! 4. Integrate with semi-implicit Euler
//! 5. Detect and resolve terrain contacts
//! 6. Apply damping and velocity limits
//! 7. Advance time and publish
//!
//! # Example
//!
//! ```
//! use nalgebra::Point3;
//! use sim_core::{BodyShape, Stepper, World};
//! use sim_types::SimulationConfig;
//!
//! let mut world = World::new(SimulationConfig::default());
//! world
//!     .add_body("ball", BodyShape::sphere(0.5), 1.0, Point3::new(0.0, 0.0, 10.0))
//!     .unwrap();
//!
//! let mut stepper = Stepper::new();
//! stepper.run_for(&mut world, 0.5).unwrap();
//! assert!(world.body_by_name("ball").unwrap().position.z < 10.0);
//! ```

use std::sync::Arc;

use sim_types::Result;
use tracing::trace;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::contact::{self, ContactParams, TerrainContact};
use crate::iface::SimIface;
use crate::world::World;

/// Result of a simulation step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Simulation time after the step.
    pub time: f64,
    /// Steps taken so far.
    pub step_count: u64,
    /// Contacts resolved during the step.
    pub contacts: Vec<TerrainContact>,
    /// Whether the step was skipped because the interface is paused.
    pub paused: bool,
    /// Whether the simulation reached `max_time`.
    pub completed: bool,
}

/// Configuration for the stepper.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepperConfig {
    /// Whether to apply gravity each step.
    pub apply_gravity: bool,
    /// Whether to resolve terrain contacts each step.
    pub enable_contacts: bool,
    /// Maximum linear speed (m/s). Faster bodies are clamped.
    pub max_linear_velocity: Option<f64>,
    /// Linear velocity damping coefficient (1/s).
    pub linear_damping: f64,
    /// Terrain contact material.
    pub contact: ContactParams,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            apply_gravity: true,
            enable_contacts: true,
            max_linear_velocity: Some(100.0),
            linear_damping: 0.0,
            contact: ContactParams::default(),
        }
    }
}

impl StepperConfig {
    /// Config with no velocity limit.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_linear_velocity: None,
            ..Default::default()
        }
    }

    /// Config without gravity.
    #[must_use]
    pub fn zero_gravity() -> Self {
        Self {
            apply_gravity: false,
            ..Default::default()
        }
    }

    /// Config without contacts (free fall).
    #[must_use]
    pub fn no_contacts() -> Self {
        Self {
            enable_contacts: false,
            ..Default::default()
        }
    }

    /// Set the linear damping coefficient.
    #[must_use]
    pub fn with_damping(mut self, linear: f64) -> Self {
        self.linear_damping = linear;
        self
    }

    /// Set the contact material.
    #[must_use]
    pub fn with_contact(mut self, contact: ContactParams) -> Self {
        self.contact = contact;
        self
    }
}

/// Orchestrates the physics loop.
#[derive(Debug, Clone, Default)]
pub struct Stepper {
    config: StepperConfig,
    iface: Option<Arc<SimIface>>,
}

impl Stepper {
    /// Stepper with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stepper with custom configuration.
    #[must_use]
    pub fn with_config(config: StepperConfig) -> Self {
        Self {
            config,
            iface: None,
        }
    }

    /// Attach a client interface. Commands are read before each step and
    /// state is published after it.
    #[must_use]
    pub fn with_iface(mut self, iface: Arc<SimIface>) -> Self {
        self.iface = Some(iface);
        self
    }

    /// Stepper configuration.
    #[must_use]
    pub fn config(&self) -> &StepperConfig {
        &self.config
    }

    /// Attached interface, if any.
    #[must_use]
    pub fn iface(&self) -> Option<&Arc<SimIface>> {
        self.iface.as_ref()
    }

    /// Execute one simulation step.
    ///
    /// # Errors
    ///
    /// Returns `Diverged` if the world holds non-finite state before or after
    /// the step, or `BodyNotFound` for a client command naming an unknown body.
    pub fn step(&mut self, world: &mut World) -> Result<StepResult> {
        world.validate()?;
        world.config().validate()?;
        let dt = world.timestep();

        world.clear_forces();

        if let Some(iface) = &self.iface {
            if world.apply_commands(iface)? {
                world.publish(iface);
                return Ok(StepResult {
                    time: world.time(),
                    step_count: world.step_count(),
                    contacts: Vec::new(),
                    paused: true,
                    completed: world.is_complete(),
                });
            }
        }

        if self.config.apply_gravity {
            world.apply_gravity();
        }

        for body in world.bodies_mut() {
            let accel = body.linear_acceleration();
            body.velocity += accel * dt;
            body.position += body.velocity * dt;
        }

        let contacts = if self.config.enable_contacts {
            self.solve_contacts(world)
        } else {
            Vec::new()
        };

        for body in world.bodies_mut() {
            if self.config.linear_damping > 0.0 {
                body.velocity *= (1.0 - self.config.linear_damping * dt).max(0.0);
            }
            if let Some(max) = self.config.max_linear_velocity {
                let speed = body.velocity.norm();
                if speed > max {
                    body.velocity *= max / speed;
                }
            }
        }

        world.advance_time(dt);
        world.validate()?;

        if let Some(iface) = &self.iface {
            world.publish(iface);
        }

        trace!(
            time = world.time(),
            contacts = contacts.len(),
            "step complete"
        );

        Ok(StepResult {
            time: world.time(),
            step_count: world.step_count(),
            contacts,
            paused: false,
            completed: world.is_complete(),
        })
    }

    /// Resolve the deepest terrain contact of each body.
    fn solve_contacts(&self, world: &mut World) -> Vec<TerrainContact> {
        let terrains = world.terrains().to_vec();
        let mut contacts = Vec::new();

        for body in world.bodies_mut() {
            let deepest = terrains
                .iter()
                .filter_map(|t| contact::detect(body, &t.name, &t.shape))
                .max_by(|a, b| a.penetration.total_cmp(&b.penetration));

            body.in_contact = deepest.is_some();
            if let Some(c) = deepest {
                contact::resolve(body, &c, &self.config.contact);
                contacts.push(c);
            }
        }
        contacts
    }

    /// Run until completion or `max_steps`, returning the number of steps.
    ///
    /// # Errors
    ///
    /// Returns the first step error.
    pub fn run(&mut self, world: &mut World, max_steps: Option<u64>) -> Result<u64> {
        let mut steps = 0u64;
        loop {
            let result = self.step(world)?;
            steps += 1;
            if result.completed || max_steps.is_some_and(|max| steps >= max) {
                return Ok(steps);
            }
        }
    }

    /// Run for `duration` seconds of simulation time.
    ///
    /// # Errors
    ///
    /// Returns the first step error.
    pub fn run_for(&mut self, world: &mut World, duration: f64) -> Result<u64> {
        let target = world.time() + duration;
        let dt = world.timestep();
        // duration and dt are positive, so the count is bounded
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let max_steps = (duration / dt).ceil().max(0.0) as u64;

        let mut steps = 0u64;
        while steps < max_steps && world.time() < target - 0.5 * dt {
            let result = self.step(world)?;
            steps += 1;
            if result.completed {
                break;
            }
        }
        Ok(steps)
    }

    /// Step until every body rests on terrain below `speed_tolerance`, or
    /// `max_duration` elapses. Returns whether the world settled.
    ///
    /// # Errors
    ///
    /// Returns the first step error.
    pub fn run_until_settled(
        &mut self,
        world: &mut World,
        max_duration: f64,
        speed_tolerance: f64,
    ) -> Result<bool> {
        let deadline = world.time() + max_duration;
        while world.time() < deadline {
            let result = self.step(world)?;
            let settled = world
                .bodies()
                .iter()
                .all(|b| b.in_contact && b.velocity.norm() <= speed_tolerance);
            if settled {
                return Ok(true);
            }
            if result.completed || result.paused {
                break;
            }
        }
        Ok(false)
    }
}
