//! Keyboard and mouse state for the fly camera.

use ember_render::MoveInput;
use glam::Vec2;
use hashbrown::HashSet;
use winit::event::{DeviceEvent, ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Keys held, mouse motion since the last frame and cursor lock intent.
#[derive(Debug, Default)]
pub struct InputState {
    held: HashSet<KeyCode>,
    mouse_delta: Vec2,
    cursor_locked: bool,
    /// Lock state changed and the window has not been told yet.
    lock_changed: bool,
    reload_requested: bool,
}

impl InputState {
    pub fn new(cursor_locked: bool) -> Self {
        Self {
            cursor_locked,
            lock_changed: true,
            ..Self::default()
        }
    }

    /// Returns `true` if the event was consumed.
    pub fn process_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return false;
                };
                if !event.repeat {
                    self.set_key(code, event.state == ElementState::Pressed);
                }
                true
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } if !self.cursor_locked => {
                self.set_cursor_locked(true);
                true
            }
            WindowEvent::Focused(false) => {
                self.held.clear();
                self.set_cursor_locked(false);
                false
            }
            _ => false,
        }
    }

    pub fn process_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            if self.cursor_locked {
                self.mouse_delta += Vec2::new(*dx as f32, *dy as f32);
            }
        }
    }

    pub fn set_key(&mut self, code: KeyCode, pressed: bool) {
        if pressed {
            if !self.held.insert(code) {
                return;
            }
            match code {
                KeyCode::Escape => self.set_cursor_locked(!self.cursor_locked),
                KeyCode::KeyR => self.reload_requested = true,
                _ => {}
            }
        } else {
            self.held.remove(&code);
        }
    }

    pub fn is_held(&self, code: KeyCode) -> bool {
        self.held.contains(&code)
    }

    fn any_held(&self, codes: &[KeyCode]) -> bool {
        codes.iter().any(|&code| self.is_held(code))
    }

    fn axis(&self, positive: &[KeyCode], negative: &[KeyCode]) -> f32 {
        f32::from(u8::from(self.any_held(positive))) - f32::from(u8::from(self.any_held(negative)))
    }

    /// Movement intent from WASD, Space/Ctrl and Shift.
    pub fn move_input(&self) -> MoveInput {
        MoveInput {
            forward: self.axis(&[KeyCode::KeyW], &[KeyCode::KeyS]),
            right: self.axis(&[KeyCode::KeyD], &[KeyCode::KeyA]),
            up: self.axis(
                &[KeyCode::Space],
                &[KeyCode::ControlLeft, KeyCode::ControlRight],
            ),
            sprint: self.any_held(&[KeyCode::ShiftLeft, KeyCode::ShiftRight]),
        }
    }

    /// Mouse motion accumulated since the last call.
    pub fn take_mouse_delta(&mut self) -> Vec2 {
        std::mem::take(&mut self.mouse_delta)
    }

    pub fn cursor_locked(&self) -> bool {
        self.cursor_locked
    }

    pub fn set_cursor_locked(&mut self, locked: bool) {
        if self.cursor_locked != locked {
            self.cursor_locked = locked;
            self.lock_changed = true;
            self.mouse_delta = Vec2::ZERO;
        }
    }

    /// Whether `R` was pressed since the last call.
    pub fn take_reload_request(&mut self) -> bool {
        std::mem::take(&mut self.reload_requested)
    }

    /// The lock state to apply to the window, if it changed.
    pub fn take_lock_change(&mut self) -> Option<bool> {
        std::mem::take(&mut self.lock_changed).then_some(self.cursor_locked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposing_keys_cancel() {
        let mut input = InputState::new(true);
        input.set_key(KeyCode::KeyW, true);
        input.set_key(KeyCode::KeyS, true);
        input.set_key(KeyCode::KeyD, true);
        let movement = input.move_input();
        assert_eq!(movement.forward, 0.0);
        assert_eq!(movement.right, 1.0);
        assert!(!movement.sprint);

        input.set_key(KeyCode::KeyS, false);
        assert_eq!(input.move_input().forward, 1.0);
    }

    #[test]
    fn vertical_and_sprint() {
        let mut input = InputState::new(true);
        input.set_key(KeyCode::ControlRight, true);
        input.set_key(KeyCode::ShiftLeft, true);
        let movement = input.move_input();
        assert_eq!(movement.up, -1.0);
        assert!(movement.sprint);
    }

    #[test]
    fn escape_toggles_lock() {
        let mut input = InputState::new(true);
        assert_eq!(input.take_lock_change(), Some(true));
        assert_eq!(input.take_lock_change(), None);

        input.set_key(KeyCode::Escape, true);
        input.set_key(KeyCode::Escape, false);
        assert!(!input.cursor_locked());
        assert_eq!(input.take_lock_change(), Some(false));

        input.set_key(KeyCode::Escape, true);
        assert_eq!(input.take_lock_change(), Some(true));
    }

    #[test]
    fn reload_fires_once_per_press() {
        let mut input = InputState::new(true);
        assert!(!input.take_reload_request());

        input.set_key(KeyCode::KeyR, true);
        input.set_key(KeyCode::KeyR, true);
        assert!(input.take_reload_request());
        assert!(!input.take_reload_request());

        input.set_key(KeyCode::KeyR, false);
        input.set_key(KeyCode::KeyR, true);
        assert!(input.take_reload_request());
    }

    #[test]
    fn mouse_motion_only_counts_while_locked() {
        let mut input = InputState::new(false);
        input.process_device_event(&DeviceEvent::MouseMotion { delta: (4.0, 2.0) });
        assert_eq!(input.take_mouse_delta(), Vec2::ZERO);

        input.set_cursor_locked(true);
        input.process_device_event(&DeviceEvent::MouseMotion { delta: (4.0, 2.0) });
        input.process_device_event(&DeviceEvent::MouseMotion { delta: (1.0, -1.0) });
        assert_eq!(input.take_mouse_delta(), Vec2::new(5.0, 1.0));
        assert_eq!(input.take_mouse_delta(), Vec2::ZERO);
    }
}
