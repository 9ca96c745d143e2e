//! Virtual-key codes
//!
//! Values match the Win32 `VK_*` constants delivered by the host's input hook.
//! Letters and digits use their ASCII code.

/// Virtual-key code as delivered by the input hook (`0` = unbound)
pub type Vk = i32;

pub const VK_NONE: Vk = 0x00;
pub const VK_LBUTTON: Vk = 0x01;
pub const VK_RBUTTON: Vk = 0x02;
pub const VK_MBUTTON: Vk = 0x04;
pub const VK_BACK: Vk = 0x08;
pub const VK_TAB: Vk = 0x09;
pub const VK_RETURN: Vk = 0x0D;
pub const VK_SHIFT: Vk = 0x10;
pub const VK_CONTROL: Vk = 0x11;
pub const VK_MENU: Vk = 0x12;
pub const VK_PAUSE: Vk = 0x13;
pub const VK_CAPITAL: Vk = 0x14;
pub const VK_ESCAPE: Vk = 0x1B;
pub const VK_SPACE: Vk = 0x20;
pub const VK_PRIOR: Vk = 0x21;
pub const VK_NEXT: Vk = 0x22;
pub const VK_END: Vk = 0x23;
pub const VK_HOME: Vk = 0x24;
pub const VK_LEFT: Vk = 0x25;
pub const VK_UP: Vk = 0x26;
pub const VK_RIGHT: Vk = 0x27;
pub const VK_DOWN: Vk = 0x28;
pub const VK_SNAPSHOT: Vk = 0x2C;
pub const VK_INSERT: Vk = 0x2D;
pub const VK_DELETE: Vk = 0x2E;
pub const VK_LWIN: Vk = 0x5B;
pub const VK_RWIN: Vk = 0x5C;
pub const VK_APPS: Vk = 0x5D;
pub const VK_NUMPAD0: Vk = 0x60;
pub const VK_MULTIPLY: Vk = 0x6A;
pub const VK_ADD: Vk = 0x6B;
pub const VK_SUBTRACT: Vk = 0x6D;
pub const VK_DECIMAL: Vk = 0x6E;
pub const VK_DIVIDE: Vk = 0x6F;
pub const VK_F1: Vk = 0x70;
pub const VK_NUMLOCK: Vk = 0x90;
pub const VK_SCROLL: Vk = 0x91;
pub const VK_OEM_1: Vk = 0xBA;
pub const VK_OEM_PLUS: Vk = 0xBB;
pub const VK_OEM_COMMA: Vk = 0xBC;
pub const VK_OEM_MINUS: Vk = 0xBD;
pub const VK_OEM_PERIOD: Vk = 0xBE;
pub const VK_OEM_2: Vk = 0xBF;
pub const VK_OEM_4: Vk = 0xDB;
pub const VK_OEM_5: Vk = 0xDC;
pub const VK_OEM_6: Vk = 0xDD;
pub const VK_OEM_7: Vk = 0xDE;

/// Keys that abort a hotkey capture instead of being bound
pub const CAPTURE_CANCEL_KEYS: [Vk; 4] = [VK_ESCAPE, VK_LBUTTON, VK_RBUTTON, VK_MBUTTON];

static KEY_LIST: &[(&str, Vk)] = &[
    ("None", VK_NONE),
    ("F1", VK_F1),
    ("F2", VK_F1 + 1),
    ("F3", VK_F1 + 2),
    ("F4", VK_F1 + 3),
    ("F5", VK_F1 + 4),
    ("F6", VK_F1 + 5),
    ("F7", VK_F1 + 6),
    ("F8", VK_F1 + 7),
    ("F9", VK_F1 + 8),
    ("F10", VK_F1 + 9),
    ("F11", VK_F1 + 10),
    ("F12", VK_F1 + 11),
    ("INSERT", VK_INSERT),
    ("DELETE", VK_DELETE),
    ("HOME", VK_HOME),
    ("END", VK_END),
    ("PAGE UP", VK_PRIOR),
    ("PAGE DOWN", VK_NEXT),
    ("UP", VK_UP),
    ("DOWN", VK_DOWN),
    ("LEFT", VK_LEFT),
    ("RIGHT", VK_RIGHT),
    ("TAB", VK_TAB),
    ("CAPS", VK_CAPITAL),
    ("SHIFT", VK_SHIFT),
    ("CTRL", VK_CONTROL),
    ("ALT", VK_MENU),
    ("SPACE", VK_SPACE),
    ("BACKSPACE", VK_BACK),
    ("ENTER", VK_RETURN),
    ("ESC", VK_ESCAPE),
    ("1", b'1' as Vk),
    ("2", b'2' as Vk),
    ("3", b'3' as Vk),
    ("4", b'4' as Vk),
    ("5", b'5' as Vk),
    ("6", b'6' as Vk),
    ("7", b'7' as Vk),
    ("8", b'8' as Vk),
    ("9", b'9' as Vk),
    ("0", b'0' as Vk),
    ("A", b'A' as Vk),
    ("B", b'B' as Vk),
    ("C", b'C' as Vk),
    ("D", b'D' as Vk),
    ("E", b'E' as Vk),
    ("F", b'F' as Vk),
    ("G", b'G' as Vk),
    ("H", b'H' as Vk),
    ("I", b'I' as Vk),
    ("J", b'J' as Vk),
    ("K", b'K' as Vk),
    ("L", b'L' as Vk),
    ("M", b'M' as Vk),
    ("N", b'N' as Vk),
    ("O", b'O' as Vk),
    ("P", b'P' as Vk),
    ("Q", b'Q' as Vk),
    ("R", b'R' as Vk),
    ("S", b'S' as Vk),
    ("T", b'T' as Vk),
    ("U", b'U' as Vk),
    ("V", b'V' as Vk),
    ("W", b'W' as Vk),
    ("X", b'X' as Vk),
    ("Y", b'Y' as Vk),
    ("Z", b'Z' as Vk),
    ("-", VK_OEM_MINUS),
    ("=", VK_OEM_PLUS),
    ("[", VK_OEM_4),
    ("]", VK_OEM_6),
    ("\\", VK_OEM_5),
    (";", VK_OEM_1),
    ("'", VK_OEM_7),
    (",", VK_OEM_COMMA),
    (".", VK_OEM_PERIOD),
    ("/", VK_OEM_2),
    ("NUM 0", VK_NUMPAD0),
    ("NUM 1", VK_NUMPAD0 + 1),
    ("NUM 2", VK_NUMPAD0 + 2),
    ("NUM 3", VK_NUMPAD0 + 3),
    ("NUM 4", VK_NUMPAD0 + 4),
    ("NUM 5", VK_NUMPAD0 + 5),
    ("NUM 6", VK_NUMPAD0 + 6),
    ("NUM 7", VK_NUMPAD0 + 7),
    ("NUM 8", VK_NUMPAD0 + 8),
    ("NUM 9", VK_NUMPAD0 + 9),
    ("NUM *", VK_MULTIPLY),
    ("NUM /", VK_DIVIDE),
    ("NUM +", VK_ADD),
    ("NUM -", VK_SUBTRACT),
    ("NUM .", VK_DECIMAL),
    ("NUM LOCK", VK_NUMLOCK),
    ("PRINT SCREEN", VK_SNAPSHOT),
    ("SCROLL LOCK", VK_SCROLL),
    ("PAUSE", VK_PAUSE),
    ("MENU", VK_APPS),
    ("LEFT WIN", VK_LWIN),
    ("RIGHT WIN", VK_RWIN),
];

/// All bindable keys with their display names, `None` first
pub fn key_list() -> &'static [(&'static str, Vk)] {
    KEY_LIST
}

/// Display name for a key code, `"Unknown"` if it is not bindable
pub fn key_name(vk: Vk) -> &'static str {
    KEY_LIST
        .iter()
        .find(|(_, code)| *code == vk)
        .map(|(name, _)| *name)
        .unwrap_or("Unknown")
}
