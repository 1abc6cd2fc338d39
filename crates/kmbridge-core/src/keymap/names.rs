//! Symbolic key names for the VK and HID code spaces.
//!
//! Names are looked up after [`normalize_name`] has upper-cased them, turned
//! `-` and spaces into `_`, and stripped a leading `VK_` and then `KEY_`.
//! So `"vk-space"`, `"Key Space"` and `"SPACE"` all reach the same entry.
//!
//! Two alias passes run before the table lookups:
//!
//! - [`alias`] folds common spellings onto the canonical VK name
//!   (`ESC` → `ESCAPE`, `CTRL` → `CONTROL`, `TILDE` → `GRAVE`).
//! - [`hid_alias`] then maps the unsided modifiers onto the left-hand HID
//!   names (`CONTROL` → `LCTRL`, `MENU` → `LALT`), because the HID page has no
//!   unsided modifier usages.

/// Canonicalises a raw key name for table lookup.
///
/// Returns `None` when nothing is left after trimming.
pub fn normalize_name(raw: &str) -> Option<String> {
    let mut token = raw.trim().to_ascii_uppercase().replace(['-', ' '], "_");
    if token.is_empty() {
        return None;
    }
    if let Some(rest) = token.strip_prefix("VK_") {
        token = rest.to_string();
    }
    if let Some(rest) = token.strip_prefix("KEY_") {
        token = rest.to_string();
    }
    Some(token)
}

/// Folds an alternative spelling onto the canonical VK-table name.
pub fn alias(token: &str) -> &str {
    match token {
        "ESC" => "ESCAPE",
        "DEL" => "DELETE",
        "INS" => "INSERT",
        "PGUP" => "PAGEUP",
        "PGDN" => "PAGEDOWN",
        "RETURN" => "ENTER",
        "SPACEBAR" => "SPACE",
        "CTRL" => "CONTROL",
        "ALT" => "MENU",
        "WIN" | "CMD" => "LWIN",
        "OPTION" => "LMENU",
        "LCTRL" => "LCONTROL",
        "RCTRL" => "RCONTROL",
        "LALT" => "LMENU",
        "RALT" => "RMENU",
        "LBRACKET" => "LEFTBRACKET",
        "RBRACKET" => "RIGHTBRACKET",
        "BACKQUOTE" | "TILDE" => "GRAVE",
        "DOT" => "PERIOD",
        "QUOTE" => "APOSTROPHE",
        "PRTSC" | "SNAPSHOT" => "PRINTSCREEN",
        other => other,
    }
}

/// Maps unsided modifier names onto the left-hand HID usages.
pub fn hid_alias(token: &str) -> &str {
    match token {
        "CTRL" | "CONTROL" => "LCTRL",
        "ALT" | "MENU" | "OPTION" => "LALT",
        "WIN" | "CMD" => "LGUI",
        other => other,
    }
}

/// Looks up a canonical name in the Windows VK table.
pub fn vk_by_name(token: &str) -> Option<u32> {
    if let Some(code) = single_char_code(token, 0x41, 0x30) {
        return Some(code);
    }
    if let Some(n) = function_key_number(token) {
        return Some(0x6F + n);
    }
    let vk = match token {
        "BACKSPACE" => 0x08,
        "TAB" => 0x09,
        "ENTER" => 0x0D,
        "SHIFT" => 0x10,
        "CONTROL" => 0x11,
        "MENU" => 0x12,
        "PAUSE" => 0x13,
        "CAPSLOCK" => 0x14,
        "ESCAPE" => 0x1B,
        "SPACE" => 0x20,
        "PAGEUP" => 0x21,
        "PAGEDOWN" => 0x22,
        "END" => 0x23,
        "HOME" => 0x24,
        "LEFT" => 0x25,
        "UP" => 0x26,
        "RIGHT" => 0x27,
        "DOWN" => 0x28,
        "PRINTSCREEN" => 0x2C,
        "INSERT" => 0x2D,
        "DELETE" => 0x2E,
        "LWIN" => 0x5B,
        "RWIN" => 0x5C,
        "APPS" => 0x5D,
        "MULTIPLY" => 0x6A,
        "ADD" => 0x6B,
        "SEPARATOR" => 0x6C,
        "SUBTRACT" => 0x6D,
        "DECIMAL" => 0x6E,
        "DIVIDE" => 0x6F,
        "NUMLOCK" => 0x90,
        "SCROLLLOCK" => 0x91,
        "LSHIFT" => 0xA0,
        "RSHIFT" => 0xA1,
        "LCONTROL" => 0xA2,
        "RCONTROL" => 0xA3,
        "LMENU" => 0xA4,
        "RMENU" => 0xA5,
        "OEM_1" => 0xBA,
        "OEM_PLUS" => 0xBB,
        "OEM_COMMA" => 0xBC,
        "OEM_MINUS" => 0xBD,
        "OEM_PERIOD" => 0xBE,
        "OEM_2" => 0xBF,
        "OEM_3" => 0xC0,
        "OEM_4" => 0xDB,
        "OEM_5" => 0xDC,
        "OEM_6" => 0xDD,
        "OEM_7" => 0xDE,
        other => {
            let digit = other.strip_prefix("NUMPAD")?;
            let n: u32 = digit.parse().ok().filter(|n| *n <= 9 && digit.len() == 1)?;
            0x60 + n
        }
    };
    Some(vk)
}

/// Looks up a canonical name in the HID usage table.
pub fn hid_by_name(token: &str) -> Option<u32> {
    if let Some(code) = single_char_code(token, 4, 0) {
        // HID puts 0 after 9, so the digit row needs its own arithmetic.
        if token.as_bytes()[0].is_ascii_digit() {
            return Some(match code {
                0 => 39,
                d => 29 + d,
            });
        }
        return Some(code);
    }
    if let Some(n) = function_key_number(token) {
        return Some(if n <= 12 { 57 + n } else { 104 + (n - 13) });
    }
    let hid = match token {
        "ENTER" => 40,
        "ESCAPE" => 41,
        "BACKSPACE" => 42,
        "TAB" => 43,
        "SPACE" => 44,
        "MINUS" => 45,
        "EQUAL" => 46,
        "LEFTBRACKET" => 47,
        "RIGHTBRACKET" => 48,
        "BACKSLASH" => 49,
        "SEMICOLON" => 51,
        "APOSTROPHE" => 52,
        "GRAVE" => 53,
        "COMMA" => 54,
        "PERIOD" => 55,
        "SLASH" => 56,
        "CAPSLOCK" => 57,
        "PRINTSCREEN" => 70,
        "SCROLLLOCK" => 71,
        "PAUSE" => 72,
        "INSERT" => 73,
        "HOME" => 74,
        "PAGEUP" => 75,
        "DELETE" => 76,
        "END" => 77,
        "PAGEDOWN" => 78,
        "RIGHT" => 79,
        "LEFT" => 80,
        "DOWN" => 81,
        "UP" => 82,
        "NUMLOCK" => 83,
        "APPLICATION" => 101,
        "LCTRL" => 224,
        "LSHIFT" => 225,
        "LALT" => 226,
        "LGUI" => 227,
        "RCTRL" => 228,
        "RSHIFT" => 229,
        "RALT" => 230,
        "RGUI" => 231,
        _ => return None,
    };
    Some(hid)
}

/// `A`–`Z` map to `letter_base + offset`, `0`–`9` to `digit_base + value`.
fn single_char_code(token: &str, letter_base: u32, digit_base: u32) -> Option<u32> {
    let &[byte] = token.as_bytes() else {
        return None;
    };
    match byte {
        b'A'..=b'Z' => Some(letter_base + u32::from(byte - b'A')),
        b'0'..=b'9' => Some(digit_base + u32::from(byte - b'0')),
        _ => None,
    }
}

/// Parses `F1`..`F24`.
fn function_key_number(token: &str) -> Option<u32> {
    let digits = token.strip_prefix('F')?;
    if digits.is_empty() || digits.starts_with('0') {
        return None;
    }
    digits.parse().ok().filter(|n| (1..=24).contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_vk_then_key_prefix() {
        assert_eq!(normalize_name(" vk-space ").as_deref(), Some("SPACE"));
        assert_eq!(normalize_name("key a").as_deref(), Some("A"));
        assert_eq!(normalize_name("VK_KEY_W").as_deref(), Some("W"));
        assert_eq!(normalize_name("   "), None);
    }

    #[test]
    fn test_alias_then_hid_alias_resolves_unsided_modifiers() {
        // Arrange
        let token = alias("CTRL");

        // Act
        let hid_token = hid_alias(token);

        // Assert
        assert_eq!(token, "CONTROL");
        assert_eq!(hid_token, "LCTRL");
        assert_eq!(hid_by_name(hid_token), Some(224));
    }

    #[test]
    fn test_vk_table_letters_digits_and_function_keys() {
        assert_eq!(vk_by_name("A"), Some(0x41));
        assert_eq!(vk_by_name("Z"), Some(0x5A));
        assert_eq!(vk_by_name("0"), Some(0x30));
        assert_eq!(vk_by_name("9"), Some(0x39));
        assert_eq!(vk_by_name("F1"), Some(0x70));
        assert_eq!(vk_by_name("F24"), Some(0x87));
        assert_eq!(vk_by_name("NUMPAD7"), Some(0x67));
        assert_eq!(vk_by_name("F25"), None);
        assert_eq!(vk_by_name("NUMPAD10"), None);
    }

    #[test]
    fn test_hid_table_digit_row_puts_zero_last() {
        assert_eq!(hid_by_name("1"), Some(30));
        assert_eq!(hid_by_name("9"), Some(38));
        assert_eq!(hid_by_name("0"), Some(39));
    }

    #[test]
    fn test_hid_table_function_keys_split_across_two_ranges() {
        assert_eq!(hid_by_name("F1"), Some(58));
        assert_eq!(hid_by_name("F12"), Some(69));
        assert_eq!(hid_by_name("F13"), Some(104));
        assert_eq!(hid_by_name("F24"), Some(115));
    }

    #[test]
    fn test_unknown_names_resolve_to_none() {
        assert_eq!(vk_by_name("BOGUS"), None);
        assert_eq!(hid_by_name("SHIFT"), None);
        assert_eq!(hid_by_name("F0"), None);
    }
}
