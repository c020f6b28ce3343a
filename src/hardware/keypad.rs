//! Keypad layout and key actions

use std::collections::BTreeMap;

use super::Key;

/// Keys by row then column, as wired on the handset
pub const KEYPAD_LAYOUT: [[char; 3]; 4] = [
    ['1', '2', '3'],
    ['4', '5', '6'],
    ['7', '8', '9'],
    ['*', '0', '#'],
];

/// Key at a matrix position
#[must_use]
pub fn key_at(row: usize, col: usize) -> Option<Key> {
    KEYPAD_LAYOUT
        .get(row)
        .and_then(|keys| keys.get(col))
        .and_then(|&c| Key::new(c))
}

/// What pressing a key does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeypadAction {
    /// Speak a fixed phrase
    Speak(String),
    /// Key has no action; just note the press
    Unassigned,
}

/// Maps keys to configured prompts
#[derive(Debug, Clone, Default)]
pub struct Keypad {
    prompts: BTreeMap<char, String>,
}

impl Keypad {
    #[must_use]
    pub const fn new(prompts: BTreeMap<char, String>) -> Self {
        Self { prompts }
    }

    #[must_use]
    pub fn action(&self, key: Key) -> KeypadAction {
        self.prompts
            .get(&key.as_char())
            .map_or(KeypadAction::Unassigned, |phrase| {
                KeypadAction::Speak(phrase.clone())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_positions() {
        assert_eq!(key_at(0, 0).map(Key::as_char), Some('1'));
        assert_eq!(key_at(3, 1).map(Key::as_char), Some('0'));
        assert_eq!(key_at(3, 2).map(Key::as_char), Some('#'));
        assert!(key_at(4, 0).is_none());
        assert!(key_at(0, 3).is_none());
    }

    #[test]
    fn test_actions() {
        let keypad = Keypad::new(BTreeMap::from([('1', "Ask away".to_string())]));
        let one = Key::new('1').unwrap();
        let two = Key::new('2').unwrap();

        assert_eq!(keypad.action(one), KeypadAction::Speak("Ask away".to_string()));
        assert_eq!(keypad.action(two), KeypadAction::Unassigned);
    }
}
