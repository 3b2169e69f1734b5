//! Persistent LOD cache backed by sled
//!
//! Every operation runs on tokio's blocking pool so callers never wait on
//! disk from an async task.

use std::path::Path;

use super::migrations::{self, LOD_TREE};
use super::record::{self, LodModel};
use crate::core::{Error, Result, WorldId, now_millis};
use crate::lod::SectionKey;

/// Async CRUD over encoded LODs keyed by (world, section x, section z)
#[derive(Clone)]
pub struct LodRepository {
    db: sled::Db,
    lods: sled::Tree,
}

impl LodRepository {
    /// Open (or create) the store at `path` and apply pending migrations.
    ///
    /// Failure here is fatal for the server.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .map_err(|e| Error::Storage(format!("failed to open LOD store at {}: {}", path.display(), e)))?;
        let repository = Self::from_db(db)?;
        log::info!("Opened LOD store at {} ({} entries)", path.display(), repository.lods.len());
        Ok(repository)
    }

    /// In-memory store removed on drop, for tests and throwaway servers
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| Error::Storage(format!("failed to open temporary LOD store: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        migrations::run(&db)?;
        let lods = db.open_tree(LOD_TREE)?;
        Ok(Self { db, lods })
    }

    pub async fn load(&self, world_id: WorldId, x: i32, z: i32) -> Result<Option<LodModel>> {
        let key = SectionKey::new(world_id, x, z);
        self.blocking(move |lods| {
            lods.get(record::encode_key(&key))?
                .map(|bytes| record::decode_value(&key, &bytes))
                .transpose()
        })
        .await
    }

    /// Store (or overwrite) a section's encoded LOD, stamped with the current time
    pub async fn save(&self, world_id: WorldId, x: i32, z: i32, data: Vec<u8>, beacons: Vec<u8>) -> Result<LodModel> {
        let model = LodModel {
            world_id,
            x,
            z,
            data,
            beacons,
            timestamp: now_millis(),
        };
        self.blocking(move |lods| {
            let value = record::encode_value(&model)?;
            lods.insert(record::encode_key(&model.key()), value)?;
            Ok(model)
        })
        .await
    }

    pub async fn exists(&self, world_id: WorldId, x: i32, z: i32) -> Result<bool> {
        let key = SectionKey::new(world_id, x, z);
        self.blocking(move |lods| Ok(lods.contains_key(record::encode_key(&key))?))
            .await
    }

    /// Returns whether a row was removed
    pub async fn delete(&self, world_id: WorldId, x: i32, z: i32) -> Result<bool> {
        let key = SectionKey::new(world_id, x, z);
        self.blocking(move |lods| Ok(lods.remove(record::encode_key(&key))?.is_some()))
            .await
    }

    /// Delete every row of `world_id` whose section lies outside the
    /// inclusive box, returning how many were removed
    pub async fn trim(&self, world_id: WorldId, min_x: i32, min_z: i32, max_x: i32, max_z: i32) -> Result<u64> {
        self.blocking(move |lods| {
            let mut doomed = Vec::new();
            for entry in lods.scan_prefix(record::world_prefix(world_id)).keys() {
                let key_bytes = entry?;
                let key = record::decode_key(&key_bytes)?;
                let inside = (min_x..=max_x).contains(&key.x) && (min_z..=max_z).contains(&key.z);
                if !inside {
                    doomed.push(key_bytes);
                }
            }

            let mut deleted = 0;
            for key in doomed {
                if lods.remove(key)?.is_some() {
                    deleted += 1;
                }
            }
            Ok(deleted)
        })
        .await
        .inspect(|deleted| {
            log::info!(
                "Trimmed {} LODs of world {} outside [{}, {}]..[{}, {}]",
                deleted,
                world_id,
                min_x,
                min_z,
                max_x,
                max_z
            )
        })
    }

    /// Rows stored for one world
    pub async fn count(&self, world_id: WorldId) -> Result<usize> {
        self.blocking(move |lods| Ok(lods.scan_prefix(record::world_prefix(world_id)).count()))
            .await
    }

    pub async fn flush(&self) -> Result<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.flush().map(|_| ()))
            .await
            .map_err(|e| Error::Storage(format!("flush task failed: {}", e)))??;
        Ok(())
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&sled::Tree) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let lods = self.lods.clone();
        tokio::task::spawn_blocking(move || f(&lods))
            .await
            .map_err(|e| Error::Storage(format!("storage task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_crud() {
        let repo = LodRepository::temporary().unwrap();
        let world = Uuid::new_v4();

        assert!(repo.load(world, 1, 2).await.unwrap().is_none());
        assert!(!repo.exists(world, 1, 2).await.unwrap());

        let saved = repo.save(world, 1, 2, vec![1, 2, 3], vec![4]).await.unwrap();
        assert!(saved.timestamp > 0);
        assert!(repo.exists(world, 1, 2).await.unwrap());
        assert_eq!(repo.load(world, 1, 2).await.unwrap(), Some(saved));

        assert!(repo.delete(world, 1, 2).await.unwrap());
        assert!(!repo.delete(world, 1, 2).await.unwrap());
        assert!(repo.load(world, 1, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_data() {
        let repo = LodRepository::temporary().unwrap();
        let world = Uuid::new_v4();
        repo.save(world, 0, 0, vec![1], vec![]).await.unwrap();
        repo.save(world, 0, 0, vec![2, 2], vec![]).await.unwrap();
        assert_eq!(repo.load(world, 0, 0).await.unwrap().unwrap().data, vec![2, 2]);
        assert_eq!(repo.count(world).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_trim_outside_box() {
        let repo = LodRepository::temporary().unwrap();
        let world = Uuid::new_v4();
        let other = Uuid::new_v4();
        for (x, z) in [(0, 0), (5, 5), (-5, -5)] {
            repo.save(world, x, z, vec![0], vec![]).await.unwrap();
        }
        repo.save(other, 5, 5, vec![0], vec![]).await.unwrap();

        assert_eq!(repo.trim(world, -2, -2, 2, 2).await.unwrap(), 2);
        assert!(repo.exists(world, 0, 0).await.unwrap());
        assert!(!repo.exists(world, 5, 5).await.unwrap());
        assert!(!repo.exists(world, -5, -5).await.unwrap());
        assert!(repo.exists(other, 5, 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let world = Uuid::new_v4();
        {
            let repo = LodRepository::open(dir.path().join("lods")).unwrap();
            repo.save(world, 3, -3, vec![7; 32], vec![1]).await.unwrap();
            repo.flush().await.unwrap();
        }
        let repo = LodRepository::open(dir.path().join("lods")).unwrap();
        let model = repo.load(world, 3, -3).await.unwrap().unwrap();
        assert_eq!(model.data, vec![7; 32]);
    }
}
