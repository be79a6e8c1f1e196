//! Actuator collaborator trait and the timed task model.

use crate::error::Result;
use std::time::Duration;

/// One motor of the manipulator, as seen by the orchestration layer.
///
/// Implementations wrap the physical motor transport; any call may fail with
/// a transport error, which the caller answers with a forced stop.
pub trait Actuator: Send {
    fn set_speed(&mut self, speed: f64) -> Result<()>;

    fn forward(&mut self) -> Result<()>;

    fn backward(&mut self) -> Result<()>;

    /// Stop the motor; `immediate` brakes instead of coasting.
    fn stop(&mut self, immediate: bool) -> Result<()>;

    /// Release the underlying transport.
    fn close(&mut self) -> Result<()>;
}

/// The manipulator's motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Motor {
    Rotate,
    Lift,
    Grab,
}

impl Motor {
    pub const ALL: [Motor; 3] = [Motor::Rotate, Motor::Lift, Motor::Grab];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rotate => "rotate",
            Self::Lift => "lift",
            Self::Grab => "grab",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveDirection {
    Forward,
    Backward,
}

/// One timed step of an actuator task.
#[derive(Debug, Clone)]
pub enum TaskStep {
    /// Stop a motor and move on.
    Halt { motor: Motor, immediate: bool },

    /// Run a motor in one direction for a fixed duration, then stop it.
    Drive {
        motor: Motor,
        direction: DriveDirection,
        speed: f64,
        duration: Duration,
    },
}

impl TaskStep {
    pub fn motor(&self) -> Motor {
        match self {
            Self::Halt { motor, .. } | Self::Drive { motor, .. } => *motor,
        }
    }
}

/// An ordered step sequence executed atomically by the worker; at most one
/// task is in flight at any time.
#[derive(Debug, Clone)]
pub struct ActuatorTask {
    pub name: &'static str,
    pub steps: Vec<TaskStep>,
}

impl ActuatorTask {
    /// Distinct motors this task touches, in first-use order. These are the
    /// motors force-stopped when a step fails.
    pub fn motors(&self) -> Vec<Motor> {
        let mut motors = Vec::new();
        for step in &self.steps {
            let motor = step.motor();
            if !motors.contains(&motor) {
                motors.push(motor);
            }
        }
        motors
    }
}
