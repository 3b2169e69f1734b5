//! Named, ordered schema migrations
//!
//! Applied names are recorded in the `migrations` tree together with the
//! time they ran; each migration runs at most once per store.

use crate::core::{Error, Result, now_millis};

pub const MIGRATIONS_TREE: &str = "migrations";
pub const LOD_TREE: &str = "lods";
pub const META_TREE: &str = "meta";

const RECORD_FORMAT_KEY: &str = "record_format";

pub struct Migration {
    pub name: &'static str,
    pub apply: fn(&sled::Db) -> sled::Result<()>,
}

/// Every migration, in application order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_create_lod_tree",
        apply: create_lod_tree,
    },
    Migration {
        name: "0002_record_store_format",
        apply: record_store_format,
    },
];

fn create_lod_tree(db: &sled::Db) -> sled::Result<()> {
    db.open_tree(LOD_TREE).map(|_| ())
}

fn record_store_format(db: &sled::Db) -> sled::Result<()> {
    let meta = db.open_tree(META_TREE)?;
    meta.insert(RECORD_FORMAT_KEY, vec![super::record::RECORD_FORMAT_VERSION])?;
    Ok(())
}

/// Apply pending migrations, returning the names applied by this call
pub fn run(db: &sled::Db) -> Result<Vec<&'static str>> {
    let applied_tree = db.open_tree(MIGRATIONS_TREE)?;
    let mut applied_now = Vec::new();

    for migration in MIGRATIONS {
        if applied_tree.contains_key(migration.name)? {
            continue;
        }
        (migration.apply)(db)
            .map_err(|e| Error::Storage(format!("migration {} failed: {}", migration.name, e)))?;
        applied_tree.insert(migration.name, now_millis().to_be_bytes().to_vec())?;
        log::info!("Applied store migration {}", migration.name);
        applied_now.push(migration.name);
    }

    if !applied_now.is_empty() {
        applied_tree.flush()?;
    }
    Ok(applied_now)
}

/// Names of the migrations recorded as applied
pub fn applied(db: &sled::Db) -> Result<Vec<String>> {
    let applied_tree = db.open_tree(MIGRATIONS_TREE)?;
    applied_tree
        .iter()
        .keys()
        .map(|key| -> Result<String> {
            let key = key?;
            Ok(String::from_utf8_lossy(&key).into_owned())
        })
        .collect()
}
