// Infrastructure adapters for the ports declared in lib.rs
pub mod in_memory_cache;
pub mod in_memory_identity;
pub mod in_memory_secrets;
pub mod in_memory_store;
pub mod in_memory_sync;
pub mod postgres_store;
pub mod postgres_sync;
pub mod redis_cache;
pub mod vault;

pub use in_memory_cache::InMemoryCache;
pub use in_memory_identity::InMemoryIdentityDirectory;
pub use in_memory_secrets::InMemorySecretStore;
pub use in_memory_store::InMemoryDocumentStore;
pub use in_memory_sync::{InMemoryMappingStore, InMemorySyncLog};
pub use postgres_store::{run_migrations, PostgresDocumentStore};
pub use postgres_sync::{PostgresMappingStore, PostgresSyncLog};
pub use redis_cache::RedisCache;
pub use vault::{VaultConfig, VaultTransit};
