use tokio::sync::watch;

use crate::estimation::ObstacleReading;
use crate::interface::{Detection, Telemetry};

/// Producer side of the single-slot input buffers. Publishing overwrites
/// whatever the control loop has not consumed yet.
#[derive(Debug)]
pub struct InputPublishers {
    detection: watch::Sender<Option<Detection>>,
    telemetry: watch::Sender<Option<Telemetry>>,
    obstacles: watch::Sender<Vec<ObstacleReading>>,
    abort: watch::Sender<bool>,
}

impl InputPublishers {
    /// `None` reports a processed frame with no person in it.
    pub fn publish_detection(&self, detection: Option<Detection>) {
        self.detection.send_replace(detection);
    }

    pub fn publish_telemetry(&self, telemetry: Telemetry) {
        self.telemetry.send_replace(Some(telemetry));
    }

    pub fn publish_obstacles(&self, readings: Vec<ObstacleReading>) {
        self.obstacles.send_replace(readings);
    }

    pub fn raise_abort(&self) {
        self.abort.send_replace(true);
    }

    pub fn clear_abort(&self) {
        self.abort.send_replace(false);
    }
}

/// Everything the control loop read at one tick boundary.
#[derive(Debug, Clone, Default)]
pub struct TickInputs {
    pub detection: Option<Detection>,
    pub telemetry: Option<Telemetry>,
    pub obstacles: Vec<ObstacleReading>,
    pub abort: bool,
}

/// Consumer side, owned by the supervisor.
#[derive(Debug)]
pub struct InputSlots {
    detection: watch::Receiver<Option<Detection>>,
    telemetry: watch::Receiver<Option<Telemetry>>,
    obstacles: watch::Receiver<Vec<ObstacleReading>>,
    abort: watch::Receiver<bool>,
}

impl InputSlots {
    /// Takes the latest values. A slot not written since the previous call
    /// reads as absent; the abort flag is level-triggered.
    pub fn take(&mut self) -> TickInputs {
        TickInputs {
            detection: take_fresh(&mut self.detection).flatten(),
            telemetry: take_fresh(&mut self.telemetry).flatten(),
            obstacles: take_fresh(&mut self.obstacles).unwrap_or_default(),
            abort: *self.abort.borrow(),
        }
    }

    /// Marks all pending values as consumed.
    pub fn discard(&mut self) {
        self.detection.borrow_and_update();
        self.telemetry.borrow_and_update();
        self.obstacles.borrow_and_update();
    }
}

fn take_fresh<T: Clone>(slot: &mut watch::Receiver<T>) -> Option<T> {
    match slot.has_changed() {
        Ok(true) => Some(slot.borrow_and_update().clone()),
        _ => None,
    }
}

pub fn channels() -> (InputPublishers, InputSlots) {
    let (detection_tx, detection_rx) = watch::channel(None);
    let (telemetry_tx, telemetry_rx) = watch::channel(None);
    let (obstacles_tx, obstacles_rx) = watch::channel(Vec::new());
    let (abort_tx, abort_rx) = watch::channel(false);
    (
        InputPublishers {
            detection: detection_tx,
            telemetry: telemetry_tx,
            obstacles: obstacles_tx,
            abort: abort_tx,
        },
        InputSlots {
            detection: detection_rx,
            telemetry: telemetry_rx,
            obstacles: obstacles_rx,
            abort: abort_rx,
        },
    )
}
