// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Known key symbol lookup
//!
//! `KeyPress` actions name X keysyms. Rule files may mention keys the
//! running build does not know: compiling such a rule logs a warning
//! against the default table and keeps the names as written, and the key
//! press refuses to fire when the evaluation's table does not know them.
//!
//! The default table is a whitelist of the keysyms the key-press synthesiser
//! can produce; hosts with a richer keymap extend it with `insert`.

use std::collections::HashSet;
use std::sync::OnceLock;

/// Named keysyms beyond letters, digits and function keys
const NAMED_KEYS: &[&str] = &[
    "space",
    "Return",
    "Tab",
    "ISO_Left_Tab",
    "Escape",
    "BackSpace",
    "Delete",
    "Insert",
    "Home",
    "End",
    "Prior",
    "Next",
    "Page_Up",
    "Page_Down",
    "Left",
    "Right",
    "Up",
    "Down",
    "Shift_L",
    "Shift_R",
    "Control_L",
    "Control_R",
    "Alt_L",
    "Alt_R",
    "Super_L",
    "Super_R",
    "Meta_L",
    "Meta_R",
    "Hyper_L",
    "Hyper_R",
    "ISO_Level3_Shift",
    "Menu",
    "Print",
    "Pause",
    "Scroll_Lock",
    "Num_Lock",
    "Caps_Lock",
    "minus",
    "equal",
    "comma",
    "period",
    "slash",
    "backslash",
    "semicolon",
    "apostrophe",
    "grave",
    "bracketleft",
    "bracketright",
    "plus",
    "asterisk",
    "KP_Add",
    "KP_Subtract",
    "KP_Multiply",
    "KP_Divide",
    "KP_Enter",
    "XF86_MonBrightnessUp",
    "XF86_MonBrightnessDown",
    "XF86_KbdBrightnessUp",
    "XF86_KbdBrightnessDown",
    "XF86_AudioRaiseVolume",
    "XF86_AudioLowerVolume",
    "XF86_AudioMute",
    "XF86_AudioMicMute",
    "XF86_AudioPlay",
    "XF86_AudioPause",
    "XF86_AudioStop",
    "XF86_AudioNext",
    "XF86_AudioPrev",
    "XF86_Calculator",
    "XF86_Mail",
    "XF86_HomePage",
    "XF86_Search",
    "XF86_Back",
    "XF86_Forward",
    "XF86_Refresh",
    "XF86_Explorer",
    "XF86_Favorites",
    "XF86_Launch1",
    "XF86_Launch2",
    "XF86_Copy",
    "XF86_Cut",
    "XF86_Paste",
    "XF86_Open",
    "XF86_Close",
    "XF86_ZoomIn",
    "XF86_ZoomOut",
    "XF86_PowerOff",
    "XF86_Sleep",
];

/// Set of key symbols a `KeyPress` action may synthesise
#[derive(Clone, Debug)]
pub struct KeyTable {
    names: HashSet<String>,
}

impl KeyTable {
    /// Letters, digits, F1-F35 and the common named keysyms
    pub fn new() -> Self {
        let mut names: HashSet<String> = NAMED_KEYS.iter().map(|k| k.to_string()).collect();
        names.extend(('a'..='z').chain('A'..='Z').chain('0'..='9').map(String::from));
        names.extend((1..=35).map(|n| format!("F{}", n)));
        Self { names }
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Names from `keys` the table does not know, in order
    pub fn unknown<'a>(&self, keys: &'a [String]) -> Vec<&'a str> {
        keys.iter()
            .map(String::as_str)
            .filter(|k| !self.contains(k))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// The default table, shared by everything that has no table of its own
pub fn default_keys() -> &'static KeyTable {
    static KEYS: OnceLock<KeyTable> = OnceLock::new();
    KEYS.get_or_init(KeyTable::new)
}

impl Default for KeyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Into<String>> FromIterator<S> for KeyTable {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_knows_common_keys() {
        let table = KeyTable::new();
        assert!(table.contains("space"));
        assert!(table.contains("Control_L"));
        assert!(table.contains("F12"));
        assert!(table.contains("q"));
        assert!(table.contains("XF86_MonBrightnessDown"));
    }

    #[test]
    fn test_unknown_keys_are_reported_in_order() {
        let table = KeyTable::new();
        let keys = vec![
            "Control_L".to_string(),
            "Frobnicate".to_string(),
            "Tab".to_string(),
            "Zap".to_string(),
        ];
        assert_eq!(table.unknown(&keys), vec!["Frobnicate", "Zap"]);
    }

    #[test]
    fn test_key_names_are_case_sensitive() {
        let table = KeyTable::new();
        assert!(table.contains("Return"));
        assert!(!table.contains("RETURN"));
    }

    #[test]
    fn test_custom_table() {
        let mut table: KeyTable = ["Zenkaku_Hankaku"].into_iter().collect();
        assert_eq!(table.len(), 1);
        assert!(!table.contains("space"));
        table.insert("space");
        assert!(table.contains("space"));
    }

    #[test]
    fn test_default_keys_is_built_once() {
        assert!(std::ptr::eq(default_keys(), default_keys()));
        assert_eq!(default_keys().len(), KeyTable::new().len());
    }
}
