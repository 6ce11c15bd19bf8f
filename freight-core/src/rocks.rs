//! RocksDB backend
//!
//! One column family per [`Collection`]; values are the bincode bytes written
//! by [`crate::Storage`].

use crate::{
    error::{Error, Result},
    storage::{Backend, Collection},
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, DB};
use std::path::Path;

/// RocksDB-backed key-value store
pub struct RocksBackend {
    db: DB,
}

impl RocksBackend {
    /// Open or create the database under `path`
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = Collection::ALL
            .iter()
            .map(|collection| ColumnFamilyDescriptor::new(collection.name(), Self::cf_options()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            "Opened RocksDB at {:?} with {} column families",
            path,
            Collection::ALL.len()
        );

        Ok(Self { db })
    }

    fn cf_options() -> Options {
        let mut opts = Options::default();
        // Documents are read far more often than written
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_handle(&self, collection: Collection) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(collection.name())
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", collection.name())))
    }
}

impl Backend for RocksBackend {
    fn get(&self, collection: Collection, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(collection)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    fn put(&self, collection: Collection, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf_handle(collection)?;
        self.db.put_cf(cf, key, value)?;
        Ok(())
    }

    fn delete(&self, collection: Collection, key: &[u8]) -> Result<bool> {
        let cf = self.cf_handle(collection)?;
        let existed = self.db.get_pinned_cf(cf, key)?.is_some();
        if existed {
            self.db.delete_cf(cf, key)?;
        }
        Ok(existed)
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf_handle(collection)?;
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }
}
