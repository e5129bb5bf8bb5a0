//! Mapping of repeated strings to small integer ids.

use std::collections::HashMap;

/// Two-way map between text and integer ids.
///
/// Ids start at 1 and are assigned in order of first storage.
#[derive(Debug, Clone)]
pub struct StringMap {
    text_to_id: HashMap<String, u32>,
    id_to_text: Vec<String>,
}

impl StringMap {
    pub fn new() -> Self {
        Self {
            text_to_id: HashMap::new(),
            id_to_text: Vec::new(),
        }
    }

    /// Store text, returning its id (existing or new).
    pub fn store(&mut self, text: &str) -> u32 {
        if let Some(id) = self.get_id(text) {
            return id;
        }

        self.id_to_text.push(text.to_string());
        let id = self.id_to_text.len() as u32;
        self.text_to_id.insert(text.to_string(), id);
        id
    }

    /// Id of previously stored text.
    pub fn get_id(&self, text: &str) -> Option<u32> {
        self.text_to_id.get(text).copied()
    }

    /// Text for an id.
    pub fn get_text(&self, id: u32) -> Option<&str> {
        let idx = (id as usize).checked_sub(1)?;
        self.id_to_text.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.id_to_text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_text.is_empty()
    }

    /// Forget every stored string.
    pub fn clear(&mut self) {
        self.text_to_id.clear();
        self.id_to_text.clear();
    }
}

impl Default for StringMap {
    fn default() -> Self {
        Self::new()
    }
}
