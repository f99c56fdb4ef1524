pub mod document;
pub mod local;
pub mod repository;
pub mod traits;

pub use document::DocumentStorage;
pub use local::LocalStorage;
pub use repository::{ArticleRepository, RepositoryFactory};
pub use traits::{HealthStatus, MemoryStorage, StorageProvider, StorageStats};
