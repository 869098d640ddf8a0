//! Scripted input source for tests.

use std::sync::mpsc;
use std::time::Instant;

use macrokit_core::{ClickType, KeyName, MouseButton};

use super::{InputEventSource, SourceError, SourceEvent, SourceEventKind};

/// Test double that lets a test inject events with exact timestamps.
///
/// Construction hands back the source (to give the coordinator) and a
/// [`MockSourceHandle`] (kept by the test) that feeds events into it.
/// Dropping the handle ends the stream, which is how a test simulates
/// the hook going away.
pub struct MockInputSource {
    receiver: Option<mpsc::Receiver<SourceEvent>>,
    cursor: Option<(i32, i32)>,
    fail_install: bool,
}

/// The feeding side of a [`MockInputSource`].
#[derive(Clone)]
pub struct MockSourceHandle {
    sender: mpsc::Sender<SourceEvent>,
}

impl MockInputSource {
    pub fn new() -> (Self, MockSourceHandle) {
        let (tx, rx) = mpsc::channel();
        let source = Self {
            receiver: Some(rx),
            cursor: None,
            fail_install: false,
        };
        (source, MockSourceHandle { sender: tx })
    }

    /// Sets the cursor position reported for relative-motion seeding.
    pub fn with_cursor(mut self, x: i32, y: i32) -> Self {
        self.cursor = Some((x, y));
        self
    }

    /// A source whose installation always fails.
    pub fn failing() -> Self {
        let (mut source, _handle) = Self::new();
        source.fail_install = true;
        source
    }
}

impl InputEventSource for MockInputSource {
    fn install(&mut self) -> Result<mpsc::Receiver<SourceEvent>, SourceError> {
        if self.fail_install {
            return Err(SourceError::Install("mock install failure".to_string()));
        }
        self.receiver.take().ok_or(SourceError::AlreadyInstalled)
    }

    fn uninstall(&mut self) {}

    fn cursor_position(&self) -> Option<(i32, i32)> {
        self.cursor
    }
}

impl MockSourceHandle {
    /// Feeds one event; ignored if the stream has ended.
    pub fn push(&self, at: Instant, kind: SourceEventKind) {
        let _ = self.sender.send(SourceEvent { at, kind });
    }

    pub fn mouse_move(&self, at: Instant, x: u32, y: u32) {
        self.push(at, SourceEventKind::MouseMove { x, y });
    }

    pub fn mouse_move_relative(&self, at: Instant, dx: i32, dy: i32) {
        self.push(at, SourceEventKind::MouseMoveRelative { dx, dy });
    }

    pub fn mouse_click(&self, at: Instant, button: MouseButton, click: ClickType) {
        self.push(at, SourceEventKind::MouseClick { button, click });
    }

    pub fn key(&self, at: Instant, key: KeyName, is_down: bool) {
        self.push(at, SourceEventKind::Key { key, is_down });
    }

    pub fn text(&self, at: Instant, text: &str) {
        self.push(at, SourceEventKind::Text(text.to_string()));
    }
}
