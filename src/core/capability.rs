//! Runtime capability sets.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Capabilities assumed when the runtime cannot be asked.
pub const DEFAULT_CAPABILITIES: [&str; 3] =
    ["Baseline", "AddDefinitionToExistingType", "NewTypeDefinition"];

/// Unordered set of capability names advertised by a runtime.
///
/// Keeps first-seen order for display; equality ignores order.
#[derive(Debug, Clone, Default, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct CapabilitySet(Vec<String>);

impl CapabilitySet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self(Vec::new());
        for name in names {
            set.insert(name.into());
        }
        set
    }

    /// The baseline set used on negotiation failure.
    pub fn defaults() -> Self {
        Self::new(DEFAULT_CAPABILITIES)
    }

    /// Parse a space-separated capability string as sent by agents.
    pub fn parse(text: &str) -> Self {
        Self::new(text.split_whitespace())
    }

    pub fn insert(&mut self, name: String) {
        let name = name.trim();
        if !name.is_empty() && !self.contains(name) {
            self.0.push(name.to_string());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Capabilities present in both sets, in `self` order.
    pub fn intersect(&self, other: &Self) -> Self {
        Self(self.0.iter().filter(|c| other.contains(c)).cloned().collect())
    }
}

impl PartialEq for CapabilitySet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|c| other.contains(c))
    }
}

impl From<Vec<String>> for CapabilitySet {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

impl From<CapabilitySet> for Vec<String> {
    fn from(set: CapabilitySet) -> Self {
        set.0
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_equality_ignores_order() {
        let a = CapabilitySet::new(["Baseline", "NewTypeDefinition"]);
        let b = CapabilitySet::parse("NewTypeDefinition  Baseline Baseline");
        assert_eq!(a, b);
        assert_eq!(b.len(), 2);
        assert_ne!(a, CapabilitySet::defaults());
    }

    #[test]
    fn test_display_keeps_first_seen_order() {
        assert_eq!(
            CapabilitySet::defaults().to_string(),
            "Baseline AddDefinitionToExistingType NewTypeDefinition"
        );
    }

    #[test]
    fn test_intersect() {
        let a = CapabilitySet::defaults();
        let b = CapabilitySet::parse("NewTypeDefinition Baseline ChangeCustomAttributes");
        assert_eq!(
            a.intersect(&b),
            CapabilitySet::new(["Baseline", "NewTypeDefinition"])
        );
    }

    #[test]
    fn test_deserialize_from_list() {
        let set: CapabilitySet = serde_json::from_str(r#"["Baseline","Baseline",""]"#).unwrap();
        assert_eq!(set, CapabilitySet::new(["Baseline"]));
    }
}
