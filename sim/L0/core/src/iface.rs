//! Shared-memory style interface for external clients.
//!
//! A [`SimIface`] holds a snapshot of simulation state behind a lock. The world
//! publishes into it after each step; clients read the snapshot and queue
//! commands inside a scoped lock, which are applied before the next step.
//!
//! ```
//! use sim_core::SimIface;
//!
//! let iface = SimIface::new();
//! let time = iface.with_locked(|data| data.sim_time);
//! assert_eq!(time, 0.0);
//! ```

use nalgebra::{Point3, Vector3};
use parking_lot::Mutex;
use sim_types::{BodyId, Pose};

/// State of one body as seen by clients.
#[derive(Debug, Clone, PartialEq)]
pub struct BodySnapshot {
    /// Body identifier.
    pub id: BodyId,
    /// Body name.
    pub name: String,
    /// World pose.
    pub pose: Pose,
    /// Linear velocity.
    pub velocity: Vector3<f64>,
    /// Whether the body touched terrain during the last step.
    pub in_contact: bool,
}

/// Request from a client, applied at the start of the next step.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyCommand {
    /// Teleport a body and zero its velocity.
    SetPosition {
        /// Target body name.
        name: String,
        /// New position.
        position: Point3<f64>,
    },
    /// Overwrite a body's velocity.
    SetVelocity {
        /// Target body name.
        name: String,
        /// New velocity.
        velocity: Vector3<f64>,
    },
    /// Add a force for one step.
    ApplyForce {
        /// Target body name.
        name: String,
        /// Force in newtons.
        force: Vector3<f64>,
    },
}

impl BodyCommand {
    /// Name of the target body.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::SetPosition { name, .. }
            | Self::SetVelocity { name, .. }
            | Self::ApplyForce { name, .. } => name,
        }
    }
}

/// Data guarded by the interface lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimIfaceData {
    /// Simulation time in seconds.
    pub sim_time: f64,
    /// Steps taken.
    pub step_count: u64,
    /// When set, the stepper leaves the world untouched.
    pub paused: bool,
    /// Latest body snapshots.
    pub bodies: Vec<BodySnapshot>,
    /// Commands waiting for the next step.
    pub commands: Vec<BodyCommand>,
}

impl SimIfaceData {
    /// Snapshot of a body by name.
    #[must_use]
    pub fn body(&self, name: &str) -> Option<&BodySnapshot> {
        self.bodies.iter().find(|b| b.name == name)
    }
}

/// Lock-protected simulation interface.
#[derive(Debug, Default)]
pub struct SimIface {
    data: Mutex<SimIfaceData>,
}

impl SimIface {
    /// Create an empty interface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with the data locked. The lock is released when `f` returns.
    pub fn with_locked<R>(&self, f: impl FnOnce(&mut SimIfaceData) -> R) -> R {
        let mut guard = self.data.lock();
        f(&mut guard)
    }

    /// Copy of the current data.
    #[must_use]
    pub fn snapshot(&self) -> SimIfaceData {
        self.with_locked(|data| data.clone())
    }

    /// Queue a command.
    pub fn push_command(&self, command: BodyCommand) {
        self.with_locked(|data| data.commands.push(command));
    }

    /// Remove and return queued commands.
    pub fn take_commands(&self) -> Vec<BodyCommand> {
        self.with_locked(|data| std::mem::take(&mut data.commands))
    }

    /// Pause or resume stepping.
    pub fn set_paused(&self, paused: bool) {
        self.with_locked(|data| data.paused = paused);
    }

    /// Whether stepping is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.with_locked(|data| data.paused)
    }
}
