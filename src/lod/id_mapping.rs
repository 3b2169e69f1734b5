//! Deduplicated (biome, material) lookup table

use std::collections::HashMap;

/// A distinct biome + material combination referenced by [`DataPoint::mapping_id`]
///
/// [`DataPoint::mapping_id`]: super::DataPoint::mapping_id
#[derive(Debug, Clone, PartialEq, Eq, Hash, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct IdMapping {
    pub biome: String,
    pub material: String,
    /// Extra material state (e.g. block properties), part of the identity
    pub extra: Option<String>,
}

impl IdMapping {
    pub fn new(biome: impl Into<String>, material: impl Into<String>, extra: Option<String>) -> Self {
        Self {
            biome: biome.into(),
            material: material.into(),
            extra,
        }
    }
}

/// Append-only table; ids are dense indices assigned on first use
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMappingTable {
    entries: Vec<IdMapping>,
    ids: HashMap<IdMapping, u32>,
}

impl IdMappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from entries in id order
    pub fn from_entries(entries: Vec<IdMapping>) -> Self {
        let ids = entries
            .iter()
            .enumerate()
            .map(|(id, mapping)| (mapping.clone(), id as u32))
            .collect();
        Self { entries, ids }
    }

    /// Id for a mapping, allocating the next id on first occurrence
    pub fn get_or_insert(&mut self, mapping: IdMapping) -> u32 {
        if let Some(&id) = self.ids.get(&mapping) {
            return id;
        }
        let id = self.entries.len() as u32;
        self.entries.push(mapping.clone());
        self.ids.insert(mapping, id);
        id
    }

    pub fn id_of(&self, mapping: &IdMapping) -> Option<u32> {
        self.ids.get(mapping).copied()
    }

    pub fn get(&self, id: u32) -> Option<&IdMapping> {
        self.entries.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IdMapping] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_and_dense_ids() {
        let mut table = IdMappingTable::new();
        let plains_stone = IdMapping::new("plains", "minecraft:stone", None);
        let plains_air = IdMapping::new("plains", "minecraft:air", None);

        assert_eq!(table.get_or_insert(plains_stone.clone()), 0);
        assert_eq!(table.get_or_insert(plains_air.clone()), 1);
        assert_eq!(table.get_or_insert(plains_stone.clone()), 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some(&plains_air));
    }

    #[test]
    fn test_extra_state_is_distinct() {
        let mut table = IdMappingTable::new();
        let a = table.get_or_insert(IdMapping::new("desert", "minecraft:sandstone", None));
        let b = table.get_or_insert(IdMapping::new("desert", "minecraft:sandstone", Some("type=cut".into())));
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_entries_restores_lookup() {
        let entries = vec![
            IdMapping::new("ocean", "minecraft:water", None),
            IdMapping::new("ocean", "minecraft:sand", None),
        ];
        let mut table = IdMappingTable::from_entries(entries.clone());
        assert_eq!(table.id_of(&entries[1]), Some(1));
        assert_eq!(table.get_or_insert(entries[0].clone()), 0);
        assert_eq!(table.get_or_insert(IdMapping::new("ocean", "minecraft:gravel", None)), 2);
    }
}
