// Win32 message translation for the GUI context.
//
// Copies what the overlay window procedure receives onto imgui's input
// queue. Nothing is swallowed; default handling runs afterwards either way.

use imgui::{Io, Key, MouseButton};
use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    VIRTUAL_KEY, VK_0, VK_9, VK_A, VK_BACK, VK_CONTROL, VK_DELETE, VK_DOWN, VK_END, VK_ESCAPE,
    VK_F1, VK_F12, VK_HOME, VK_INSERT, VK_LCONTROL, VK_LEFT, VK_LMENU, VK_LSHIFT, VK_MENU,
    VK_NEXT, VK_PRIOR, VK_RCONTROL, VK_RETURN, VK_RIGHT, VK_RMENU, VK_RSHIFT, VK_SHIFT,
    VK_SPACE, VK_TAB, VK_UP, VK_Z,
};
use windows::Win32::UI::WindowsAndMessaging::{
    WHEEL_DELTA, WM_CHAR, WM_KEYDOWN, WM_KEYUP, WM_LBUTTONDBLCLK, WM_LBUTTONDOWN, WM_LBUTTONUP,
    WM_MBUTTONDBLCLK, WM_MBUTTONDOWN, WM_MBUTTONUP, WM_MOUSEHWHEEL, WM_MOUSELEAVE,
    WM_MOUSEMOVE, WM_MOUSEWHEEL, WM_RBUTTONDBLCLK, WM_RBUTTONDOWN, WM_RBUTTONUP,
    WM_SYSKEYDOWN, WM_SYSKEYUP,
};

const DIGITS: [Key; 10] = [
    Key::Alpha0,
    Key::Alpha1,
    Key::Alpha2,
    Key::Alpha3,
    Key::Alpha4,
    Key::Alpha5,
    Key::Alpha6,
    Key::Alpha7,
    Key::Alpha8,
    Key::Alpha9,
];

const LETTERS: [Key; 26] = [
    Key::A,
    Key::B,
    Key::C,
    Key::D,
    Key::E,
    Key::F,
    Key::G,
    Key::H,
    Key::I,
    Key::J,
    Key::K,
    Key::L,
    Key::M,
    Key::N,
    Key::O,
    Key::P,
    Key::Q,
    Key::R,
    Key::S,
    Key::T,
    Key::U,
    Key::V,
    Key::W,
    Key::X,
    Key::Y,
    Key::Z,
];

const FUNCTION_KEYS: [Key; 12] = [
    Key::F1,
    Key::F2,
    Key::F3,
    Key::F4,
    Key::F5,
    Key::F6,
    Key::F7,
    Key::F8,
    Key::F9,
    Key::F10,
    Key::F11,
    Key::F12,
];

fn map_key(vk: VIRTUAL_KEY) -> Option<Key> {
    let code = vk.0;
    if (VK_0.0..=VK_9.0).contains(&code) {
        return Some(DIGITS[(code - VK_0.0) as usize]);
    }
    if (VK_A.0..=VK_Z.0).contains(&code) {
        return Some(LETTERS[(code - VK_A.0) as usize]);
    }
    if (VK_F1.0..=VK_F12.0).contains(&code) {
        return Some(FUNCTION_KEYS[(code - VK_F1.0) as usize]);
    }
    let key = match vk {
        VK_TAB => Key::Tab,
        VK_LEFT => Key::LeftArrow,
        VK_RIGHT => Key::RightArrow,
        VK_UP => Key::UpArrow,
        VK_DOWN => Key::DownArrow,
        VK_PRIOR => Key::PageUp,
        VK_NEXT => Key::PageDown,
        VK_HOME => Key::Home,
        VK_END => Key::End,
        VK_INSERT => Key::Insert,
        VK_DELETE => Key::Delete,
        VK_BACK => Key::Backspace,
        VK_SPACE => Key::Space,
        VK_RETURN => Key::Enter,
        VK_ESCAPE => Key::Escape,
        VK_CONTROL | VK_LCONTROL => Key::LeftCtrl,
        VK_RCONTROL => Key::RightCtrl,
        VK_SHIFT | VK_LSHIFT => Key::LeftShift,
        VK_RSHIFT => Key::RightShift,
        VK_MENU | VK_LMENU => Key::LeftAlt,
        VK_RMENU => Key::RightAlt,
        _ => return None,
    };
    Some(key)
}

/// Signed wheel notches from the high word of `wparam`.
fn wheel_notches(wparam: WPARAM) -> f32 {
    let delta = ((wparam.0 >> 16) & 0xFFFF) as u16 as i16;
    delta as f32 / WHEEL_DELTA as f32
}

/// Client coordinates packed into `lparam`, sign-extended.
fn cursor_position(lparam: LPARAM) -> [f32; 2] {
    let x = (lparam.0 & 0xFFFF) as u16 as i16;
    let y = ((lparam.0 >> 16) & 0xFFFF) as u16 as i16;
    [x as f32, y as f32]
}

/// Queue `msg` on `io` if it is an input message. Returns whether it was.
pub fn handle_message(io: &mut Io, msg: u32, wparam: WPARAM, lparam: LPARAM) -> bool {
    match msg {
        WM_MOUSEMOVE => io.add_mouse_pos_event(cursor_position(lparam)),
        WM_MOUSELEAVE => io.add_mouse_pos_event([-f32::MAX, -f32::MAX]),
        WM_LBUTTONDOWN | WM_LBUTTONDBLCLK => io.add_mouse_button_event(MouseButton::Left, true),
        WM_RBUTTONDOWN | WM_RBUTTONDBLCLK => io.add_mouse_button_event(MouseButton::Right, true),
        WM_MBUTTONDOWN | WM_MBUTTONDBLCLK => io.add_mouse_button_event(MouseButton::Middle, true),
        WM_LBUTTONUP => io.add_mouse_button_event(MouseButton::Left, false),
        WM_RBUTTONUP => io.add_mouse_button_event(MouseButton::Right, false),
        WM_MBUTTONUP => io.add_mouse_button_event(MouseButton::Middle, false),
        WM_MOUSEWHEEL => io.add_mouse_wheel_event([0.0, wheel_notches(wparam)]),
        WM_MOUSEHWHEEL => io.add_mouse_wheel_event([-wheel_notches(wparam), 0.0]),
        WM_KEYDOWN | WM_SYSKEYDOWN | WM_KEYUP | WM_SYSKEYUP => {
            let down = matches!(msg, WM_KEYDOWN | WM_SYSKEYDOWN);
            match map_key(VIRTUAL_KEY(wparam.0 as u16)) {
                Some(key) => io.add_key_event(key, down),
                None => return false,
            }
        }
        // Unpaired UTF-16 surrogates are dropped.
        WM_CHAR => match char::from_u32(wparam.0 as u32) {
            Some(c) => io.add_input_character(c),
            None => return false,
        },
        _ => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverlayConfig;
    use crate::gui::{test_lock, Gui};
    use windows::Win32::UI::WindowsAndMessaging::WM_PAINT;

    fn lparam(x: i16, y: i16) -> LPARAM {
        LPARAM(((y as u16 as isize) << 16) | (x as u16 as isize))
    }

    fn send(gui: &mut Gui, msg: u32, wparam: usize, lparam: LPARAM) -> bool {
        handle_message(gui.io_mut(), msg, WPARAM(wparam), lparam)
    }

    #[test]
    fn cursor_and_buttons_reach_the_context() {
        let _lock = test_lock();
        let mut gui = Gui::new(&OverlayConfig::default());

        assert!(send(&mut gui, WM_MOUSEMOVE, 0, lparam(-5, 300)));
        let mut pos = [0.0; 2];
        gui.frame((800, 600), |ui| pos = ui.io().mouse_pos);
        assert_eq!(pos, [-5.0, 300.0]);

        assert!(send(&mut gui, WM_RBUTTONDOWN, 0, LPARAM(0)));
        let mut down = false;
        gui.frame((800, 600), |ui| down = ui.is_mouse_down(MouseButton::Right));
        assert!(down);
    }

    #[test]
    fn wheel_is_reported_in_notches() {
        let _lock = test_lock();
        let mut gui = Gui::new(&OverlayConfig::default());

        let wheel_down = (-240i16 as u16 as usize) << 16;
        assert!(send(&mut gui, WM_MOUSEWHEEL, wheel_down, LPARAM(0)));
        let mut wheel = 0.0;
        gui.frame((800, 600), |ui| wheel = ui.io().mouse_wheel);
        assert_eq!(wheel, -2.0);
    }

    #[test]
    fn keys_are_mapped_to_gui_keys() {
        let _lock = test_lock();
        let mut gui = Gui::new(&OverlayConfig::default());

        assert!(send(&mut gui, WM_KEYDOWN, VK_A.0 as usize, LPARAM(0)));
        let mut down = false;
        gui.frame((800, 600), |ui| down = ui.is_key_down(Key::A));
        assert!(down);

        assert!(send(&mut gui, WM_KEYUP, VK_A.0 as usize, LPARAM(0)));
        gui.frame((800, 600), |ui| down = ui.is_key_down(Key::A));
        assert!(!down);
    }

    #[test]
    fn virtual_key_ranges_map_in_order() {
        assert_eq!(map_key(VK_0), Some(Key::Alpha0));
        assert_eq!(map_key(VK_9), Some(Key::Alpha9));
        assert_eq!(map_key(VK_Z), Some(Key::Z));
        assert_eq!(map_key(VK_F12), Some(Key::F12));
        assert_eq!(map_key(VK_RMENU), Some(Key::RightAlt));
        assert_eq!(map_key(VIRTUAL_KEY(0xFF)), None);
    }

    #[test]
    fn non_input_messages_are_ignored() {
        let _lock = test_lock();
        let mut gui = Gui::new(&OverlayConfig::default());
        assert!(!send(&mut gui, WM_PAINT, 0, LPARAM(0)));
        assert!(!send(&mut gui, WM_CHAR, 0xD800, LPARAM(0)));
        assert!(send(&mut gui, WM_CHAR, 'é' as usize, LPARAM(0)));
    }
}
