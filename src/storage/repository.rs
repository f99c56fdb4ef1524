use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::{Config, ImageProviderKind, StorageBackend};
use crate::error::{Error, Result};
use crate::news::{Article, ArticleDraft, ArticleUpdate, Category, ImageSource};
use crate::storage::document::DocumentStorage;
use crate::storage::local::LocalStorage;
use crate::storage::traits::{record_id, HealthStatus, MemoryStorage, StorageProvider};
use crate::upload::{EmbeddedImageUploader, HostedImageUploader, ImageUploader};

/// Article collection on top of a storage provider and an image uploader.
///
/// Every successful mutation is followed by a full re-fetch, and the
/// snapshot returned by [`ArticleRepository::articles`] is only replaced by
/// a listing that succeeded.
#[derive(Clone)]
pub struct ArticleRepository {
    storage: Arc<dyn StorageProvider>,
    uploader: Arc<dyn ImageUploader>,
    snapshot: Arc<RwLock<Vec<Article>>>,
}

impl ArticleRepository {
    pub fn new(storage: Arc<dyn StorageProvider>, uploader: Arc<dyn ImageUploader>) -> Self {
        Self {
            storage,
            uploader,
            snapshot: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn storage_name(&self) -> &'static str {
        self.storage.name()
    }

    pub fn uploader_name(&self) -> &'static str {
        self.uploader.name()
    }

    /// Last successfully listed collection.
    pub fn articles(&self) -> Vec<Article> {
        self.snapshot.read().clone()
    }

    pub async fn health_check(&self) -> Result<HealthStatus> {
        self.storage.health_check().await
    }

    /// All articles in provider order, newest first. An empty collection is not an error.
    pub async fn list(&self) -> Result<Vec<Article>> {
        let start = Instant::now();
        let records = self.storage.list().await?;

        let articles: Vec<Article> = records
            .iter()
            .filter_map(|record| match Article::from_record(record) {
                Ok(article) => Some(article),
                Err(e) => {
                    warn!(
                        "Skipping unreadable record {}: {}",
                        record_id(record).unwrap_or("<no id>"),
                        e
                    );
                    None
                }
            })
            .collect();

        *self.snapshot.write() = articles.clone();
        debug!(
            "Listed {} articles from {} in {:?}",
            articles.len(),
            self.storage.name(),
            start.elapsed()
        );
        Ok(articles)
    }

    /// Re-fetches the collection into the snapshot.
    pub async fn refresh(&self) -> Result<usize> {
        Ok(self.list().await?.len())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Article>> {
        Ok(self.list().await?.into_iter().find(|a| a.id == id))
    }

    /// `None` selects every category.
    pub async fn by_category(&self, category: Option<Category>) -> Result<Vec<Article>> {
        let articles = self.list().await?;
        Ok(match category {
            Some(category) => articles.into_iter().filter(|a| a.category == category).collect(),
            None => articles,
        })
    }

    /// Stores a new article. The image is uploaded first; nothing is written if that fails.
    pub async fn create(&self, draft: ArticleDraft) -> Result<Article> {
        let image = self.resolve_image(&draft.image).await?;
        let article = Article::from_draft(draft, image);

        self.storage.insert(article.to_record()?).await?;
        info!("Created article {} ({})", article.id, article.category);

        self.refresh_after_mutation().await;
        Ok(self
            .articles()
            .into_iter()
            .find(|a| a.id == article.id)
            .unwrap_or(article))
    }

    /// Shallow-merges the given fields onto the stored record.
    pub async fn update(&self, id: &str, update: ArticleUpdate) -> Result<Article> {
        let records = self.storage.list().await?;
        let mut record = records
            .into_iter()
            .find(|r| record_id(r) == Some(id))
            .ok_or_else(|| Error::NotFound(format!("article {}", id)))?;

        let current = Article::from_record(&record)?;
        if update.views.is_some_and(|v| v < current.views) {
            return Err(Error::Validation("views cannot decrease".to_string()));
        }
        if update.likes.is_some_and(|l| l < current.likes) {
            return Err(Error::Validation("likes cannot decrease".to_string()));
        }

        let image = match &update.image {
            Some(source) => Some(self.resolve_image(source).await?),
            None => None,
        };

        let fields = record
            .as_object_mut()
            .ok_or_else(|| Error::Persistence(format!("article {} is not an object", id)))?;
        for (key, value) in update.to_patch(image) {
            fields.insert(key, value);
        }

        let updated = Article::from_record(&record)?;
        self.storage.replace(id, record).await?;
        info!("Updated article {}", id);

        self.refresh_after_mutation().await;
        Ok(self
            .articles()
            .into_iter()
            .find(|a| a.id == id)
            .unwrap_or(updated))
    }

    /// Untyped variant of [`ArticleRepository::update`]; rejects `id` and `createdAt`.
    pub async fn update_fields(&self, id: &str, fields: &Map<String, Value>) -> Result<Article> {
        let update = ArticleUpdate::from_fields(fields)?;
        self.update(id, update).await
    }

    /// Removes the article. Deleting an unknown id succeeds.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.storage.remove(id).await?;
        info!("Deleted article {}", id);
        self.refresh_after_mutation().await;
        Ok(())
    }

    async fn resolve_image(&self, source: &ImageSource) -> Result<String> {
        match source {
            ImageSource::None => Ok(String::new()),
            ImageSource::Url(url) => Ok(url.clone()),
            ImageSource::Upload { bytes, filename } => self.uploader.upload(bytes, filename).await,
        }
    }

    async fn refresh_after_mutation(&self) {
        if let Err(e) = self.list().await {
            warn!("Refresh after mutation failed, keeping previous list: {}", e);
        }
    }
}

/// Builds repositories with the providers selected in configuration.
pub struct RepositoryFactory;

impl RepositoryFactory {
    pub fn memory() -> ArticleRepository {
        ArticleRepository::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(EmbeddedImageUploader::default()),
        )
    }

    pub fn from_config(config: &Config) -> Result<ArticleRepository> {
        let storage = Self::storage(config)?;
        let uploader = Self::uploader(config)?;
        info!(
            "Using {} storage with {} image uploads",
            storage.name(),
            uploader.name()
        );
        Ok(ArticleRepository::new(storage, uploader))
    }

    pub fn storage(config: &Config) -> Result<Arc<dyn StorageProvider>> {
        let collection = &config.site.collection;
        Ok(match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
            StorageBackend::Local => match &config.storage.path {
                Some(path) => Arc::new(LocalStorage::at_path(path, collection.as_str())?),
                None => Arc::new(LocalStorage::new(Config::data_dir()?, collection.as_str())?),
            },
            StorageBackend::Document => {
                let url = config.storage.document_url.as_deref().ok_or_else(|| {
                    Error::Config("storage.document_url is required for the document backend".to_string())
                })?;
                Arc::new(DocumentStorage::new(url, collection, config.storage.api_key.clone())?)
            }
        })
    }

    pub fn uploader(config: &Config) -> Result<Arc<dyn ImageUploader>> {
        let images = &config.images;
        Ok(match images.provider {
            ImageProviderKind::Embedded => Arc::new(EmbeddedImageUploader::new(images.max_bytes)),
            ImageProviderKind::Hosted => {
                let uploader = match (&images.endpoint, &images.cloud_name) {
                    (Some(endpoint), _) => {
                        HostedImageUploader::with_endpoint(endpoint.as_str(), images.upload_preset.as_str())?
                    }
                    (None, Some(cloud_name)) => {
                        HostedImageUploader::new(cloud_name, images.upload_preset.as_str())?
                    }
                    (None, None) => {
                        return Err(Error::Config(
                            "images.cloud_name or images.endpoint is required for hosted uploads".to_string(),
                        ))
                    }
                };
                Arc::new(
                    uploader
                        .with_folder(images.folder.as_str())
                        .with_max_bytes(images.max_bytes),
                )
            }
        })
    }
}
