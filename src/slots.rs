//! Mapping of symbolic frame names to bounded controller register indices.

use std::collections::HashMap;
use tracing::info;

/// Name of the frame used when a motion has no base or tool.
pub const NULL_FRAME: &str = "Null";

/// Assignment of frame names to the slots `1..=capacity` of one register
/// array (`BASE_DATA`, `TOOL_DATA`). Slot 0 is reserved for the null frame.
#[derive(Clone, Debug)]
pub struct SlotMap {
    label: &'static str,
    capacity: u32,
    entries: HashMap<String, u32>,
}

impl SlotMap {
    /// Creates an empty map over slots `1..=capacity`.
    pub fn new(label: &'static str, capacity: u32) -> Self {
        Self {
            label,
            capacity,
            entries: HashMap::new(),
        }
    }

    /// The controller array name, e.g. `BASE_DATA`.
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The slot assigned to `name`, if any.
    pub fn get(&self, name: &str) -> Option<u32> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Whether some name already occupies `slot`.
    pub fn is_used(&self, slot: u32) -> bool {
        self.entries.values().any(|&s| s == slot)
    }

    /// The index a name implies by itself: 0 for the null frame, `n` for
    /// `LABEL[n]`. Names like `Fixture` have no default index.
    pub fn default_index(&self, name: &str) -> Option<u32> {
        if name == NULL_FRAME {
            return Some(0);
        }
        name.strip_prefix(self.label)
            .and_then(|rest| rest.strip_prefix('['))
            .and_then(|rest| rest.strip_suffix(']'))
            .and_then(|n| n.trim().parse::<u32>().ok())
            .filter(|&n| n <= self.capacity)
    }

    /// Binds `name` to `slot` unconditionally.
    pub fn assign(&mut self, name: &str, slot: u32) {
        info!("Mapping {} to {}[{}].", name, self.label, slot);
        self.entries.insert(name.to_string(), slot);
    }

    /// Binds `name` to its default index if it has one and that slot is free.
    ///
    /// Returns the slot the name ends up on, if any.
    pub fn assign_default(&mut self, name: &str) -> Option<u32> {
        if let Some(slot) = self.get(name) {
            return Some(slot);
        }
        let slot = self.default_index(name)?;
        if self.is_used(slot) {
            return None;
        }
        self.entries.insert(name.to_string(), slot);
        Some(slot)
    }

    /// Binds `name` to the lowest free slot.
    ///
    /// Returns `None` when every slot is taken.
    pub fn assign_free(&mut self, name: &str) -> Option<u32> {
        if let Some(slot) = self.get(name) {
            return Some(slot);
        }
        let slot = (1..=self.capacity).find(|&i| !self.is_used(i))?;
        self.assign(name, slot);
        Some(slot)
    }

    /// Entries ordered by slot index.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        let mut entries: Vec<_> = self.entries.iter().map(|(n, &s)| (n.as_str(), s)).collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        entries.into_iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_index_parsing() {
        let map = SlotMap::new("BASE_DATA", 32);
        assert_eq!(map.default_index("Null"), Some(0));
        assert_eq!(map.default_index("BASE_DATA[4]"), Some(4));
        assert_eq!(map.default_index("BASE_DATA[33]"), None);
        assert_eq!(map.default_index("TOOL_DATA[4]"), None);
        assert_eq!(map.default_index("Fixture"), None);
    }

    #[test]
    fn test_defaults_first_then_lowest_free_slot() {
        let mut map = SlotMap::new("TOOL_DATA", 16);
        assert_eq!(map.assign_default("TOOL_DATA[1]"), Some(1));
        assert_eq!(map.assign_default("Gripper"), None);
        assert_eq!(map.assign_free("Gripper"), Some(2));
        assert_eq!(map.assign_free("Gripper"), Some(2));
        assert_eq!(map.assign_free("Torch"), Some(3));
        let order: Vec<_> = map.iter().map(|(n, _)| n).collect();
        assert_eq!(order, ["TOOL_DATA[1]", "Gripper", "Torch"]);
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let mut map = SlotMap::new("TOOL_DATA", 2);
        map.assign_free("A");
        map.assign_free("B");
        assert_eq!(map.assign_free("C"), None);
        assert!(!map.contains("C"));
    }
}
