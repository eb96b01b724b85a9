pub mod key_storage;
pub mod listing;
pub mod rotation;
pub mod sync;

pub use key_storage::{create_key_store, KeyStoreBackend, KeyStoreGuard, TokenKeyStore};
pub use listing::{list_unseal_keys, KeyListing, ListedKey};
pub use rotation::{generate_root_token, rotate_root_token, RotationState};
pub use sync::{sync_all, sync_key, LogicalKey, SyncOptions, SyncOutcome, SyncReport};
