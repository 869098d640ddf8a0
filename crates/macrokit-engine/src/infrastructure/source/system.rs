//! OS-level input source backed by an rdev listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;

use tracing::{error, warn};

use macrokit_core::{ClickType, MouseButton};

use crate::infrastructure::rdev_map::key_name_from_rdev;

use super::{InputEventSource, SourceError, SourceEvent, SourceEventKind};

/// Records host input through the OS hook.
///
/// The rdev listener cannot be torn down once started, so `uninstall`
/// only mutes the callback; the hook thread itself lives until process
/// exit.  Installing a fresh source for the next session registers a new
/// callback and mutes this one for good.
pub struct SystemInputSource {
    active: Option<Arc<AtomicBool>>,
}

impl SystemInputSource {
    pub fn new() -> Self {
        Self { active: None }
    }
}

impl Default for SystemInputSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InputEventSource for SystemInputSource {
    fn install(&mut self) -> Result<mpsc::Receiver<SourceEvent>, SourceError> {
        if self.active.is_some() {
            return Err(SourceError::AlreadyInstalled);
        }
        let active = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel();

        let callback_active = Arc::clone(&active);
        std::thread::spawn(move || {
            let result = rdev::listen(move |event| {
                if !callback_active.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(kind) = translate(&event.event_type) {
                    if tx.send(SourceEvent {
                        at: Instant::now(),
                        kind,
                    })
                    .is_err()
                    {
                        callback_active.store(false, Ordering::SeqCst);
                    }
                }
            });
            if let Err(e) = result {
                error!(?e, "OS input listener failed");
            }
        });

        self.active = Some(active);
        Ok(rx)
    }

    fn uninstall(&mut self) {
        if let Some(active) = self.active.take() {
            active.store(false, Ordering::SeqCst);
        } else {
            warn!("uninstall called on a source that was never installed");
        }
    }
}

fn translate(event_type: &rdev::EventType) -> Option<SourceEventKind> {
    match event_type {
        rdev::EventType::MouseMove { x, y } => Some(SourceEventKind::MouseMove {
            x: x.max(0.0) as u32,
            y: y.max(0.0) as u32,
        }),
        rdev::EventType::ButtonPress(button) => Some(SourceEventKind::MouseClick {
            button: translate_button(button)?,
            click: ClickType::Press,
        }),
        rdev::EventType::ButtonRelease(button) => Some(SourceEventKind::MouseClick {
            button: translate_button(button)?,
            click: ClickType::Release,
        }),
        rdev::EventType::KeyPress(key) => Some(SourceEventKind::Key {
            key: key_name_from_rdev(*key),
            is_down: true,
        }),
        rdev::EventType::KeyRelease(key) => Some(SourceEventKind::Key {
            key: key_name_from_rdev(*key),
            is_down: false,
        }),
        // Scroll capture is not supported.
        rdev::EventType::Wheel { .. } => None,
    }
}

fn translate_button(button: &rdev::Button) -> Option<MouseButton> {
    match button {
        rdev::Button::Left => Some(MouseButton::Left),
        rdev::Button::Right => Some(MouseButton::Right),
        rdev::Button::Middle => Some(MouseButton::Middle),
        rdev::Button::Unknown(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_maps_buttons_and_drops_unknown() {
        assert_eq!(
            translate(&rdev::EventType::ButtonPress(rdev::Button::Left)),
            Some(SourceEventKind::MouseClick {
                button: MouseButton::Left,
                click: ClickType::Press,
            })
        );
        assert_eq!(
            translate(&rdev::EventType::ButtonPress(rdev::Button::Unknown(9))),
            None
        );
    }

    #[test]
    fn test_translate_clamps_negative_coordinates() {
        assert_eq!(
            translate(&rdev::EventType::MouseMove { x: -3.0, y: 7.9 }),
            Some(SourceEventKind::MouseMove { x: 0, y: 7 })
        );
    }

    #[test]
    fn test_translate_ignores_wheel() {
        assert_eq!(
            translate(&rdev::EventType::Wheel {
                delta_x: 0,
                delta_y: 1
            }),
            None
        );
    }
}
