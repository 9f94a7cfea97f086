pub mod connection;
pub mod memory;
pub mod repositories;
pub mod stores;

pub use connection::{create_pool, run_migrations, verify_connection};
pub use memory::MemoryStore;
pub use repositories::*;
pub use stores::{
    AuditStore, FolderStore, GenerationStore, ImageStore, LedgerStore, PaymentStore, UserStore,
};
