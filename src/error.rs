use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenEegError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("actuator {0} is closed")]
    ActuatorClosed(String),

    #[error("actuator task \"{task}\" aborted at step {step}: {reason}")]
    TaskAborted {
        task: String,
        step: usize,
        reason: String,
    },

    #[error("orchestrator is shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, OpenEegError>;
