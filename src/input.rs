use enigo::{Enigo, Key, KeyboardControllable, MouseButton, MouseControllable};

use crate::error::InputError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

/// Abstract capability to inject remote input into the host.
pub trait InputInjector: Send {
    fn move_mouse(&mut self, x: i32, y: i32) -> Result<(), InputError>;

    fn toggle_mouse_button(
        &mut self,
        state: ButtonState,
        button: PointerButton,
    ) -> Result<(), InputError>;

    fn tap_key(&mut self, key: &str, modifier: Option<&str>) -> Result<(), InputError>;
}

pub struct EnigoInjector {
    enigo: Enigo,
}

impl EnigoInjector {
    pub fn new() -> Self {
        Self {
            enigo: Enigo::new(),
        }
    }

    fn map_button(&self, button: PointerButton) -> MouseButton {
        match button {
            PointerButton::Left => MouseButton::Left,
            PointerButton::Right => MouseButton::Right,
            PointerButton::Middle => MouseButton::Middle,
        }
    }

    fn map_key(&self, key: &str) -> Result<Key, InputError> {
        match key {
            "Space" => Ok(Key::Space),
            "Enter" => Ok(Key::Return),
            "Backspace" => Ok(Key::Backspace),
            "Delete" => Ok(Key::Delete),
            "Escape" => Ok(Key::Escape),
            "Tab" => Ok(Key::Tab),
            "Home" => Ok(Key::Home),
            "End" => Ok(Key::End),
            "PageUp" => Ok(Key::PageUp),
            "PageDown" => Ok(Key::PageDown),
            "ArrowUp" => Ok(Key::UpArrow),
            "ArrowDown" => Ok(Key::DownArrow),
            "ArrowLeft" => Ok(Key::LeftArrow),
            "ArrowRight" => Ok(Key::RightArrow),
            _ => {
                if key.chars().count() == 1 {
                    let ch = key.chars().next().ok_or_else(|| {
                        InputError::UnsupportedKey(key.to_string())
                    })?;
                    Ok(Key::Layout(ch))
                } else {
                    Err(InputError::UnsupportedKey(key.to_string()))
                }
            }
        }
    }

    fn map_modifier(&self, modifier: &str) -> Result<Key, InputError> {
        match modifier {
            "Control" | "Ctrl" => Ok(Key::Control),
            "Alt" => Ok(Key::Alt),
            "Shift" => Ok(Key::Shift),
            "Meta" | "Command" => Ok(Key::Meta),
            _ => Err(InputError::UnsupportedModifier(modifier.to_string())),
        }
    }
}

impl Default for EnigoInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl InputInjector for EnigoInjector {
    fn move_mouse(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        self.enigo.mouse_move_to(x, y);
        Ok(())
    }

    fn toggle_mouse_button(
        &mut self,
        state: ButtonState,
        button: PointerButton,
    ) -> Result<(), InputError> {
        let button = self.map_button(button);
        match state {
            ButtonState::Down => self.enigo.mouse_down(button),
            ButtonState::Up => self.enigo.mouse_up(button),
        }
        Ok(())
    }

    fn tap_key(&mut self, key: &str, modifier: Option<&str>) -> Result<(), InputError> {
        let key = self.map_key(key)?;
        match modifier {
            Some(modifier) => {
                let modifier = self.map_modifier(modifier)?;
                self.enigo.key_down(modifier);
                self.enigo.key_click(key);
                self.enigo.key_up(modifier);
            }
            None => self.enigo.key_click(key),
        }
        Ok(())
    }
}
