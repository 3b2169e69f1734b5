//! Material classification used by column scanners

use std::collections::HashSet;

const NAMESPACE: &str = "minecraft:";

/// Decides whether a material belongs to some class (ground, air, ...)
pub trait MaterialPredicate: Send + Sync {
    fn matches(&self, material: &str) -> bool;
}

impl<F> MaterialPredicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn matches(&self, material: &str) -> bool {
        self(material)
    }
}

/// Allow-list of material names; bare names and `minecraft:` names match alike
#[derive(Debug, Clone, Default)]
pub struct MaterialSet {
    names: HashSet<String>,
}

impl MaterialSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names.into_iter().map(|n| normalize(n.as_ref()).to_string()).collect(),
        }
    }

    /// Natural terrain that marks solid ground
    pub fn ground() -> Self {
        Self::new([
            "stone",
            "grass_block",
            "dirt",
            "gravel",
            "sand",
            "sandstone",
            "mycelium",
        ])
    }

    pub fn air() -> Self {
        Self::new(["air", "cave_air", "void_air"])
    }

    pub fn insert(&mut self, name: &str) {
        self.names.insert(normalize(name).to_string());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl MaterialPredicate for MaterialSet {
    fn matches(&self, material: &str) -> bool {
        self.names.contains(normalize(material))
    }
}

fn normalize(name: &str) -> &str {
    name.strip_prefix(NAMESPACE).unwrap_or(name)
}
