use enigo::Key;

/// Map a recorded key name onto an enigo key.
///
/// Names are matched case-insensitively. Single printable characters map
/// to `Key::Unicode`; everything else must be in the named vocabulary
/// below. Returns `None` for unsupported names so the caller can skip
/// the press instead of sending a wrong key.
pub fn lookup(name: &str) -> Option<Key> {
    let lower = name.to_lowercase();

    let mut chars = lower.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if !c.is_whitespace() {
            return Some(Key::Unicode(c));
        }
    }

    let key = match lower.as_str() {
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "esc" | "escape" => Key::Escape,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "pgup" => Key::PageUp,
        "pagedown" | "pgdn" => Key::PageDown,
        "shift" => Key::Shift,
        "ctrl" | "control" => Key::Control,
        "alt" => Key::Alt,
        "win" | "cmd" | "super" | "meta" => Key::Meta,
        "capslock" => Key::CapsLock,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => return None,
    };
    Some(key)
}

/// Whether `name` belongs to the known-key vocabulary.
pub fn is_known(name: &str) -> bool {
    lookup(name).is_some()
}
