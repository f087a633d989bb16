//! Keyboard layout translation for typed text.
//!
//! The microcontroller emulates a US-layout keyboard. When the game
//! expects Cyrillic input, the host asserts the RU layout and sends the
//! US key that sits on the same physical position (standard ЙЦУКЕН
//! mapping), so the OS produces the intended glyph.

/// The US key producing `c` under the RU layout, or `None` for characters
/// that are identical across layouts (digits, punctuation shared keys).
pub fn ru_to_us(c: char) -> Option<char> {
    let lower = c.to_lowercase().next().unwrap_or(c);
    let mapped = match lower {
        'й' => 'q',
        'ц' => 'w',
        'у' => 'e',
        'к' => 'r',
        'е' => 't',
        'н' => 'y',
        'г' => 'u',
        'ш' => 'i',
        'щ' => 'o',
        'з' => 'p',
        'х' => '[',
        'ъ' => ']',
        'ф' => 'a',
        'ы' => 's',
        'в' => 'd',
        'а' => 'f',
        'п' => 'g',
        'р' => 'h',
        'о' => 'j',
        'л' => 'k',
        'д' => 'l',
        'ж' => ';',
        'э' => '\'',
        'я' => 'z',
        'ч' => 'x',
        'с' => 'c',
        'м' => 'v',
        'и' => 'b',
        'т' => 'n',
        'ь' => 'm',
        'б' => ',',
        'ю' => '.',
        'ё' => '`',
        _ => return None,
    };
    if c.is_uppercase() {
        mapped.to_uppercase().next()
    } else {
        Some(mapped)
    }
}

/// Translate a character for transmission under the given RU-layout
/// assumption; pass-through for anything unmapped.
pub fn key_for(c: char, ru_layout: bool) -> char {
    if ru_layout {
        ru_to_us(c).unwrap_or(c)
    } else {
        c
    }
}
