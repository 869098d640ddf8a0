//! Input source backed by the hardware relay device's recording stream.
//!
//! On install the device is told to start recording; a worker thread then
//! polls the transport for event frames and translates them into
//! [`SourceEvent`]s.  The device reports motion only as relative deltas
//! and timing only as explicit delay frames, so this source keeps a
//! virtual clock (advanced by delay frames) and a tracked cursor position
//! (used to annotate clicks with an absolute move).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::warn;

use macrokit_core::{
    decode_event, encode_command, ClickType, KeyName, RelayCommand, RelayCursorTracker, RelayEvent,
};

use crate::services::RelayConnectivity;

use super::{InputEventSource, SourceError, SourceEvent, SourceEventKind};

const POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub struct RelayDeviceSource {
    connectivity: Arc<dyn RelayConnectivity>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl RelayDeviceSource {
    pub fn new(connectivity: Arc<dyn RelayConnectivity>) -> Self {
        Self {
            connectivity,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl InputEventSource for RelayDeviceSource {
    fn install(&mut self) -> Result<mpsc::Receiver<SourceEvent>, SourceError> {
        if self.worker.is_some() {
            return Err(SourceError::AlreadyInstalled);
        }
        self.connectivity
            .send_frame(&encode_command(&RelayCommand::StartRecording))?;

        let (tx, rx) = mpsc::channel();
        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let connectivity = Arc::clone(&self.connectivity);
        self.worker = Some(std::thread::spawn(move || {
            poll_loop(connectivity, tx, stop);
        }));
        Ok(rx)
    }

    fn uninstall(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Err(e) = self
            .connectivity
            .send_frame(&encode_command(&RelayCommand::StopRecording))
        {
            warn!(%e, "failed to tell relay device to stop recording");
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn poll_loop(
    connectivity: Arc<dyn RelayConnectivity>,
    tx: mpsc::Sender<SourceEvent>,
    stop: Arc<AtomicBool>,
) {
    let mut tracker = RelayCursorTracker::default();
    // Virtual clock: advanced only by the device's delay frames.
    let mut at = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        let frame = match connectivity.recv_frame(POLL_TIMEOUT) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                warn!(%e, "relay recording stream failed");
                return;
            }
        };
        let event = match decode_event(&frame) {
            Ok(event) => event,
            Err(e) => {
                warn!(%e, "dropping undecodable relay frame");
                continue;
            }
        };
        for out in translate(event, &mut tracker, &mut at) {
            if tx.send(out).is_err() {
                return;
            }
        }
    }
}

/// Translates one relay event into zero or more source events.
///
/// Clicks are preceded by an absolute move to the tracked position so a
/// replay lands the click where it happened; delay frames advance the
/// virtual clock and emit nothing themselves.
fn translate(
    event: RelayEvent,
    tracker: &mut RelayCursorTracker,
    at: &mut Instant,
) -> Vec<SourceEvent> {
    let stamp = *at;
    match event {
        RelayEvent::MoveRelative { dx, dy } => {
            tracker.apply(&RelayEvent::MoveRelative { dx, dy });
            vec![SourceEvent {
                at: stamp,
                kind: SourceEventKind::MouseMoveRelative {
                    dx: i32::from(dx),
                    dy: i32::from(dy),
                },
            }]
        }
        RelayEvent::Click { button, click } => {
            let (x, y) = tracker.position();
            vec![
                SourceEvent {
                    at: stamp,
                    kind: SourceEventKind::MouseMove {
                        x: x.max(0) as u32,
                        y: y.max(0) as u32,
                    },
                },
                SourceEvent {
                    at: stamp,
                    kind: SourceEventKind::MouseClick { button, click },
                },
            ]
        }
        RelayEvent::Key { code, is_down } => vec![SourceEvent {
            at: stamp,
            kind: SourceEventKind::Key {
                key: KeyName::from_code(code),
                is_down,
            },
        }],
        RelayEvent::Text(text) => vec![SourceEvent {
            at: stamp,
            kind: SourceEventKind::Text(text),
        }],
        RelayEvent::Delay(millis) => {
            *at += Duration::from_millis(u64::from(millis));
            Vec::new()
        }
    }
}
