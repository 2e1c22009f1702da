mod kv_store;

pub use kv_store::{
    load_json, save_json, FileKvStore, KeyValueStore, MemoryKvStore, Result, StorageError,
};
