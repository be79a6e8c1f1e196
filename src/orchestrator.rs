//! Gesture-to-actuator orchestration.
//!
//! Consumes gesture events on the decode path and drives the manipulator's
//! three motors. Look events are debounced before committing a rotation;
//! bite events enqueue a grab-or-release task on a single dedicated worker,
//! which is the only place that blocks. The `is_lifting` flag crosses the
//! two activities: the decode path sets it when enqueueing, the worker
//! clears it when the task finishes or aborts.

use crate::actuator::{Actuator, ActuatorTask, DriveDirection, Motor, TaskStep};
use crate::error::{OpenEegError, Result};
use crate::gesture::{GestureEvent, GestureKind, GestureListener, LookDirection};
use crate::reader::{DetectorId, DeviceReader};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Delay between a look event and the rotation commit; a conflicting
    /// gesture inside this window cancels the commit.
    pub look_debounce: Duration,

    pub rotate_speed: f64,
    pub lift_speed: f64,
    pub grab_speed: f64,

    /// How long the lift motor runs in each direction.
    pub lift_duration: Duration,

    /// How long the grab motor runs to close or open.
    pub grab_duration: Duration,

    /// How long shutdown waits for an in-flight task before force-stopping.
    pub shutdown_grace: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            look_debounce: Duration::from_millis(300),
            rotate_speed: 0.25,
            lift_speed: 0.6,
            grab_speed: 0.5,
            lift_duration: Duration::from_millis(1500),
            grab_duration: Duration::from_millis(1200),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

// Debounce states, decided by a single compare-and-swap so a cancel racing
// the deadline resolves to exactly one outcome.
const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Handle to the single outstanding deferred action.
#[derive(Clone)]
pub struct DebounceHandle {
    state: Arc<AtomicU8>,
}

impl DebounceHandle {
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::SeqCst) == PENDING
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CANCELLED
    }

    /// Cancel the action. Returns whether it was still pending; a cancel that
    /// lands after the firing decision still invalidates the in-flight action,
    /// which must check [`DebounceHandle::is_cancelled`] before its effect.
    pub fn cancel(&self) -> bool {
        self.state.swap(CANCELLED, Ordering::SeqCst) == PENDING
    }
}

/// Schedule `action` to run once after `delay` unless cancelled first.
///
/// The action receives the handle and must re-check `is_cancelled` before
/// doing anything observable; a cancel can land between the firing decision
/// and the action body.
fn debounce(
    delay: Duration,
    action: impl FnOnce(&DebounceHandle) + Send + 'static,
) -> DebounceHandle {
    let handle = DebounceHandle {
        state: Arc::new(AtomicU8::new(PENDING)),
    };
    let timer = handle.clone();
    let spawned = thread::Builder::new()
        .name("look-debounce".into())
        .spawn(move || {
            thread::sleep(delay);
            let fired = timer
                .state
                .compare_exchange(PENDING, FIRED, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
            if fired {
                action(&timer);
            }
        });
    if let Err(e) = spawned {
        log::error!("failed to spawn debounce timer: {}", e);
        handle.state.store(CANCELLED, Ordering::SeqCst);
    }
    handle
}

/// Flags owned by the decode path. Only `is_lifting` (separate, atomic) is
/// ever written from the worker side.
#[derive(Default)]
struct ControlFlags {
    prevent_look: bool,
    is_biting: bool,
    should_release_item: bool,
    committed: Option<LookDirection>,
    pending: Option<DebounceHandle>,
}

impl ControlFlags {
    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.cancel();
        }
    }

    fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| h.is_pending())
    }
}

struct Motors {
    rotate: Arc<Mutex<Box<dyn Actuator>>>,
    lift: Arc<Mutex<Box<dyn Actuator>>>,
    grab: Arc<Mutex<Box<dyn Actuator>>>,
}

impl Motors {
    fn get(&self, motor: Motor) -> &Arc<Mutex<Box<dyn Actuator>>> {
        match motor {
            Motor::Rotate => &self.rotate,
            Motor::Lift => &self.lift,
            Motor::Grab => &self.grab,
        }
    }

    /// Best-effort immediate stop; transport errors are logged, not returned.
    fn force_stop(&self, motors: &[Motor]) {
        for &motor in motors {
            if let Err(e) = self.get(motor).lock().stop(true) {
                log::error!("force stop of {} motor failed: {}", motor.as_str(), e);
            }
        }
    }
}

struct Shared {
    config: OrchestratorConfig,
    flags: Mutex<ControlFlags>,
    /// Set by the decode path when a task is enqueued, cleared by the worker
    /// when the task finishes or aborts.
    is_lifting: AtomicBool,
    shut_down: AtomicBool,
    motors: Motors,
}

enum WorkerCommand {
    Run(ActuatorTask),
    Shutdown,
}

pub struct ActuatorOrchestrator {
    shared: Arc<Shared>,
    queue: Sender<WorkerCommand>,
    done: Receiver<()>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ActuatorOrchestrator {
    pub fn new(
        rotate: Box<dyn Actuator>,
        lift: Box<dyn Actuator>,
        grab: Box<dyn Actuator>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        let shared = Arc::new(Shared {
            config,
            flags: Mutex::new(ControlFlags::default()),
            is_lifting: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            motors: Motors {
                rotate: Arc::new(Mutex::new(rotate)),
                lift: Arc::new(Mutex::new(lift)),
                grab: Arc::new(Mutex::new(grab)),
            },
        });

        let (queue, commands) = channel::unbounded();
        let (done_tx, done) = channel::bounded(1);
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("actuator-worker".into())
            .spawn(move || worker_loop(worker_shared, commands, done_tx))
            .expect("failed to spawn actuator worker");

        Arc::new(Self {
            shared,
            queue,
            done,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Subscribe this orchestrator to the detectors it consumes: a look
    /// detector, a prevent-look frequency detector, and a bite frequency
    /// detector.
    pub fn attach(
        self: &Arc<Self>,
        reader: &mut DeviceReader,
        look: DetectorId,
        prevent_look: DetectorId,
        bite: DetectorId,
    ) {
        reader.subscribe(look, GestureKind::Look, Arc::new(LookControl(Arc::clone(self))));

        let prevent: Arc<dyn GestureListener> = Arc::new(PreventLookControl(Arc::clone(self)));
        reader.subscribe(prevent_look, GestureKind::FreqStart, Arc::clone(&prevent));
        reader.subscribe(prevent_look, GestureKind::FreqComplete, prevent);

        let biting: Arc<dyn GestureListener> = Arc::new(BiteControl(Arc::clone(self)));
        reader.subscribe(bite, GestureKind::FreqStart, Arc::clone(&biting));
        reader.subscribe(bite, GestureKind::FreqComplete, biting);
    }

    pub fn is_lifting(&self) -> bool {
        self.shared.is_lifting.load(Ordering::SeqCst)
    }

    /// A look event schedules a debounced rotation commit unless a lift, a
    /// bite, look suppression, or an earlier pending commit forbids it.
    pub fn on_look(&self, direction: LookDirection) {
        let mut flags = self.shared.flags.lock();
        if self.shared.is_lifting.load(Ordering::SeqCst)
            || flags.is_biting
            || flags.prevent_look
            || flags.has_pending()
        {
            return;
        }

        log::debug!(
            "scheduling {} rotation commit in {:?}",
            direction.as_str(),
            self.shared.config.look_debounce
        );
        let shared = Arc::clone(&self.shared);
        flags.pending = Some(debounce(self.shared.config.look_debounce, move |handle| {
            commit_look(&shared, handle, direction);
        }));
    }

    pub fn on_prevent_look_start(&self) {
        let mut flags = self.shared.flags.lock();
        flags.prevent_look = true;
        flags.cancel_pending();
    }

    pub fn on_prevent_look_complete(&self) {
        let mut flags = self.shared.flags.lock();
        flags.prevent_look = false;
        flags.cancel_pending();
    }

    /// A bite start enqueues the grab or release sequence, single-flight.
    pub fn on_bite_start(&self) {
        let mut flags = self.shared.flags.lock();
        flags.is_biting = true;
        flags.cancel_pending();

        if self.shared.shut_down.load(Ordering::SeqCst) {
            return;
        }
        if self.shared.is_lifting.swap(true, Ordering::SeqCst) {
            log::debug!("bite ignored, actuator task already in flight");
            return;
        }

        let task = if flags.should_release_item {
            release_task(&self.shared.config)
        } else {
            grab_task(&self.shared.config)
        };
        log::info!("enqueueing actuator task \"{}\"", task.name);

        if self.queue.send(WorkerCommand::Run(task)).is_ok() {
            // Alternates strictly across successful enqueues.
            flags.should_release_item = !flags.should_release_item;
        } else {
            log::error!("actuator worker queue closed, dropping task");
            self.shared.is_lifting.store(false, Ordering::SeqCst);
        }
    }

    pub fn on_bite_complete(&self) {
        let mut flags = self.shared.flags.lock();
        flags.is_biting = false;
        flags.cancel_pending();
    }

    /// Stop accepting work, wait a bounded interval for the in-flight task,
    /// then force-stop every actuator unconditionally.
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("shutting down actuator orchestrator");
        self.shared.flags.lock().cancel_pending();

        let _ = self.queue.send(WorkerCommand::Shutdown);
        match self.done.recv_timeout(self.shared.config.shutdown_grace) {
            Ok(()) => {
                if let Some(handle) = self.worker.lock().take() {
                    let _ = handle.join();
                }
            }
            Err(_) => log::warn!(
                "actuator worker still busy after {:?}, abandoning it",
                self.shared.config.shutdown_grace
            ),
        }

        self.shared.motors.force_stop(&Motor::ALL);
    }
}

/// Fired end of the look debounce. Runs on the timer thread.
fn commit_look(shared: &Shared, handle: &DebounceHandle, direction: LookDirection) {
    let mut flags = shared.flags.lock();
    // Every canceller holds the flags lock, so once we have it a cancel that
    // beat us here is visible; later cancels ordered themselves after this
    // commit. The same goes for the blocking flags.
    if handle.is_cancelled() {
        return;
    }
    if shared.is_lifting.load(Ordering::SeqCst) || flags.is_biting || flags.prevent_look {
        return;
    }
    match flags.committed {
        None => match start_rotation(shared, direction) {
            Ok(()) => {
                log::info!("rotating {}", direction.as_str());
                flags.committed = Some(direction);
            }
            Err(e) => {
                log::error!("failed to start rotation: {}", e);
                shared.motors.force_stop(&[Motor::Rotate]);
            }
        },
        Some(current) if current != direction => {
            // Opposite look stops the rotation; it does not start the other
            // way, that takes a fresh look event.
            log::info!("stopping rotation");
            if let Err(e) = shared.motors.rotate.lock().stop(false) {
                log::error!("failed to stop rotation: {}", e);
                shared.motors.force_stop(&[Motor::Rotate]);
            }
            flags.committed = None;
        }
        Some(_) => {}
    }
}

fn start_rotation(shared: &Shared, direction: LookDirection) -> Result<()> {
    let mut rotate = shared.motors.rotate.lock();
    rotate.set_speed(shared.config.rotate_speed)?;
    match direction {
        LookDirection::Left => rotate.forward(),
        LookDirection::Right => rotate.backward(),
    }
}

fn grab_task(config: &OrchestratorConfig) -> ActuatorTask {
    ActuatorTask {
        name: "grab item",
        steps: lift_sequence(config, DriveDirection::Forward),
    }
}

fn release_task(config: &OrchestratorConfig) -> ActuatorTask {
    ActuatorTask {
        name: "release item",
        steps: lift_sequence(config, DriveDirection::Backward),
    }
}

/// Shared shape of both sequences: stop rotating, lower the lift, work the
/// grab motor (forward closes, backward opens), raise the lift again.
fn lift_sequence(config: &OrchestratorConfig, grab_direction: DriveDirection) -> Vec<TaskStep> {
    vec![
        TaskStep::Halt {
            motor: Motor::Rotate,
            immediate: false,
        },
        TaskStep::Drive {
            motor: Motor::Lift,
            direction: DriveDirection::Forward,
            speed: config.lift_speed,
            duration: config.lift_duration,
        },
        TaskStep::Drive {
            motor: Motor::Grab,
            direction: grab_direction,
            speed: config.grab_speed,
            duration: config.grab_duration,
        },
        TaskStep::Drive {
            motor: Motor::Lift,
            direction: DriveDirection::Backward,
            speed: config.lift_speed,
            duration: config.lift_duration,
        },
    ]
}

fn worker_loop(shared: Arc<Shared>, commands: Receiver<WorkerCommand>, done: Sender<()>) {
    while let Ok(command) = commands.recv() {
        match command {
            WorkerCommand::Run(task) => {
                if let Err(e) = execute_task(&shared, &task) {
                    log::error!("{}", e);
                }
                shared.is_lifting.store(false, Ordering::SeqCst);
            }
            WorkerCommand::Shutdown => break,
        }
    }
    log::debug!("actuator worker exiting");
    let _ = done.send(());
}

fn execute_task(shared: &Shared, task: &ActuatorTask) -> Result<()> {
    log::info!("executing actuator task \"{}\" ({} steps)", task.name, task.steps.len());
    for (index, step) in task.steps.iter().enumerate() {
        if let Err(e) = run_step(shared, step) {
            // Abort the rest of this task and leave every motor it touches
            // stopped; the flags still return to idle in the worker loop.
            shared.motors.force_stop(&task.motors());
            return Err(OpenEegError::TaskAborted {
                task: task.name.to_string(),
                step: index,
                reason: e.to_string(),
            });
        }
    }
    Ok(())
}

fn run_step(shared: &Shared, step: &TaskStep) -> Result<()> {
    match *step {
        TaskStep::Halt { motor, immediate } => shared.motors.get(motor).lock().stop(immediate),
        TaskStep::Drive {
            motor,
            direction,
            speed,
            duration,
        } => {
            {
                let mut m = shared.motors.get(motor).lock();
                m.set_speed(speed)?;
                match direction {
                    DriveDirection::Forward => m.forward()?,
                    DriveDirection::Backward => m.backward()?,
                }
            }
            thread::sleep(duration);
            shared.motors.get(motor).lock().stop(false)
        }
    }
}

struct LookControl(Arc<ActuatorOrchestrator>);

impl GestureListener for LookControl {
    fn on_gesture(&self, event: &GestureEvent) {
        if let GestureEvent::Look { direction } = event {
            self.0.on_look(*direction);
        }
    }
}

struct PreventLookControl(Arc<ActuatorOrchestrator>);

impl GestureListener for PreventLookControl {
    fn on_gesture(&self, event: &GestureEvent) {
        match event {
            GestureEvent::FreqStart => self.0.on_prevent_look_start(),
            GestureEvent::FreqComplete => self.0.on_prevent_look_complete(),
            _ => {}
        }
    }
}

struct BiteControl(Arc<ActuatorOrchestrator>);

impl GestureListener for BiteControl {
    fn on_gesture(&self, event: &GestureEvent) {
        match event {
            GestureEvent::FreqStart => self.0.on_bite_start(),
            GestureEvent::FreqComplete => self.0.on_bite_complete(),
            _ => {}
        }
    }
}
