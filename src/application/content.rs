//! Cached CRUD services over the document collections.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::repos::DocumentStore;
use crate::cache::{CacheKey, CacheOptions, ServerCache};
use crate::domain::documents::{BlogPost, PersonalInfo, sort_records};
use crate::domain::error::DomainError;
use crate::domain::slug::{SlugError, unique_slug};
use crate::domain::{Document, Record};

/// Read-through cached access to one collection.
///
/// Reads are tagged with the collection name; every successful write drops
/// that tag so the next read sees the change.
pub struct ContentService<T: Document> {
    store: Arc<dyn DocumentStore<T>>,
    cache: Arc<ServerCache>,
}

impl<T: Document> Clone for ContentService<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<T: Document> ContentService<T> {
    pub fn new(store: Arc<dyn DocumentStore<T>>, cache: Arc<ServerCache>) -> Self {
        Self { store, cache }
    }

    pub(crate) fn cache_options(&self) -> CacheOptions {
        CacheOptions::new(self.cache.config().ttl_for(T::COLLECTION)).tag(T::COLLECTION)
    }

    pub(crate) fn cache(&self) -> &ServerCache {
        &self.cache
    }

    /// Every document, in presentation order.
    pub async fn list(&self) -> Result<Vec<Record<T>>, AppError> {
        let store = Arc::clone(&self.store);
        self.cache
            .get_cached(&CacheKey::list(T::COLLECTION), self.cache_options(), || async move {
                let mut records = store.find_all().await?;
                sort_records(&mut records);
                Ok::<_, AppError>(records)
            })
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Record<T>, AppError> {
        let store = Arc::clone(&self.store);
        let found: Option<Record<T>> = self
            .cache
            .get_cached(&CacheKey::item(T::COLLECTION, id), self.cache_options(), || async move {
                Ok::<_, AppError>(store.find_by_id(id).await?)
            })
            .await?;
        found.ok_or_else(|| DomainError::not_found(T::ENTITY).into())
    }

    pub async fn create(&self, mut data: T) -> Result<Record<T>, AppError> {
        data.validate()?;
        let record = self.store.create(data).await?;
        self.written("created", record.id);
        Ok(record)
    }

    pub async fn update(&self, id: Uuid, mut data: T) -> Result<Record<T>, AppError> {
        data.validate()?;
        let record = self
            .store
            .update(id, data)
            .await?
            .ok_or(DomainError::not_found(T::ENTITY))?;
        self.written("updated", id);
        Ok(record)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        if !self.store.delete(id).await? {
            return Err(DomainError::not_found(T::ENTITY).into());
        }
        self.written("deleted", id);
        Ok(())
    }

    fn written(&self, action: &'static str, id: Uuid) {
        let invalidated = self.cache.invalidate_tag(T::COLLECTION);
        info!(
            target = "portfolio::content",
            collection = T::COLLECTION,
            %id,
            action,
            invalidated,
            "document written"
        );
    }
}

/// The single site-owner profile.
#[derive(Clone)]
pub struct PersonalInfoService {
    inner: ContentService<PersonalInfo>,
}

impl PersonalInfoService {
    pub fn new(inner: ContentService<PersonalInfo>) -> Self {
        Self { inner }
    }

    pub async fn get(&self) -> Result<Record<PersonalInfo>, AppError> {
        self.inner
            .list()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::not_found(PersonalInfo::ENTITY).into())
    }

    /// Replace the profile, creating it on first write.
    pub async fn upsert(&self, data: PersonalInfo) -> Result<Record<PersonalInfo>, AppError> {
        let existing = self.inner.list().await?.into_iter().next();
        match existing {
            Some(record) => self.inner.update(record.id, data).await,
            None => self.inner.create(data).await,
        }
    }
}

/// Blog posts: public reads see published posts only, slugs stay unique.
#[derive(Clone)]
pub struct BlogService {
    inner: ContentService<BlogPost>,
}

impl BlogService {
    pub fn new(inner: ContentService<BlogPost>) -> Self {
        Self { inner }
    }

    /// All posts including drafts.
    pub async fn all(&self) -> Result<Vec<Record<BlogPost>>, AppError> {
        self.inner.list().await
    }

    pub async fn published(&self) -> Result<Vec<Record<BlogPost>>, AppError> {
        let inner = self.inner.clone();
        self.inner
            .cache()
            .get_cached(
                &CacheKey::view(BlogPost::COLLECTION, "published"),
                self.inner.cache_options(),
                || async move {
                    let posts: Vec<_> = inner
                        .list()
                        .await?
                        .into_iter()
                        .filter(|post| post.data.published)
                        .collect();
                    Ok::<_, AppError>(posts)
                },
            )
            .await
    }

    pub async fn published_by_slug(&self, slug: &str) -> Result<Record<BlogPost>, AppError> {
        self.published()
            .await?
            .into_iter()
            .find(|post| post.data.slug == slug)
            .ok_or_else(|| DomainError::not_found(BlogPost::ENTITY).into())
    }

    pub async fn get(&self, id: Uuid) -> Result<Record<BlogPost>, AppError> {
        self.inner.get(id).await
    }

    pub async fn create(&self, mut post: BlogPost) -> Result<Record<BlogPost>, AppError> {
        post.validate()?;
        self.assign_slug(&mut post, None).await?;
        self.inner.create(post).await
    }

    pub async fn update(&self, id: Uuid, mut post: BlogPost) -> Result<Record<BlogPost>, AppError> {
        post.validate()?;
        self.assign_slug(&mut post, Some(id)).await?;
        self.inner.update(id, post).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.inner.delete(id).await
    }

    /// Derive a free slug from the title when none was given; reject an
    /// explicit slug that another post already uses.
    async fn assign_slug(&self, post: &mut BlogPost, own_id: Option<Uuid>) -> Result<(), AppError> {
        let taken: Vec<String> = self
            .inner
            .list()
            .await?
            .into_iter()
            .filter(|existing| Some(existing.id) != own_id)
            .map(|existing| existing.data.slug)
            .collect();

        if post.slug.is_empty() {
            post.slug = unique_slug(&post.title, |candidate| {
                taken.iter().any(|slug| slug == candidate)
            })
            .map_err(slug_error)?;
            return Ok(());
        }

        if taken.contains(&post.slug) {
            return Err(DomainError::conflict(
                BlogPost::ENTITY,
                format!("slug `{}` is already in use", post.slug),
            )
            .into());
        }
        Ok(())
    }
}

fn slug_error(err: SlugError) -> AppError {
    match err {
        SlugError::Exhausted { .. } => DomainError::conflict(BlogPost::ENTITY, err.to_string()).into(),
        SlugError::EmptyInput | SlugError::Unrepresentable { .. } => {
            DomainError::validation("slug", err.to_string()).into()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::application::repos::RepoError;
    use crate::cache::CacheConfig;
    use crate::domain::documents::Project;
    use crate::infra::db::InMemoryDocumentStore;

    fn cache() -> Arc<ServerCache> {
        Arc::new(ServerCache::new(CacheConfig::default()))
    }

    fn project(title: &str) -> Project {
        Project {
            title: title.into(),
            description: "desc".into(),
            long_description: None,
            technologies: vec!["Rust".into()],
            image_url: None,
            github_url: None,
            live_url: None,
            featured: false,
            order: 0,
        }
    }

    fn post(title: &str, published: bool) -> BlogPost {
        BlogPost {
            title: title.into(),
            slug: String::new(),
            excerpt: String::new(),
            content: "body".into(),
            tags: vec![],
            cover_image: None,
            published,
            published_at: None,
        }
    }

    /// Counts `find_all` calls on top of the in-memory store.
    struct CountingStore {
        inner: InMemoryDocumentStore,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore<Project> for CountingStore {
        async fn find_all(&self) -> Result<Vec<Record<Project>>, RepoError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            DocumentStore::<Project>::find_all(&self.inner).await
        }
        async fn find_by_id(&self, id: Uuid) -> Result<Option<Record<Project>>, RepoError> {
            DocumentStore::<Project>::find_by_id(&self.inner, id).await
        }
        async fn create(&self, data: Project) -> Result<Record<Project>, RepoError> {
            self.inner.create(data).await
        }
        async fn update(&self, id: Uuid, data: Project) -> Result<Option<Record<Project>>, RepoError> {
            self.inner.update(id, data).await
        }
        async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
            DocumentStore::<Project>::delete(&self.inner, id).await
        }
    }

    #[tokio::test]
    async fn writes_invalidate_cached_lists() {
        let store = Arc::new(CountingStore {
            inner: InMemoryDocumentStore::new(),
            reads: AtomicUsize::new(0),
        });
        let service = ContentService::<Project>::new(store.clone(), cache());

        assert!(service.list().await.expect("list").is_empty());
        assert!(service.list().await.expect("list").is_empty());
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);

        let created = service.create(project("Compiler")).await.expect("create");
        let listed = service.list().await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);

        let updated = service
            .update(created.id, project("Interpreter"))
            .await
            .expect("update");
        assert_eq!(updated.data.title, "Interpreter");
        assert_eq!(
            service.get(created.id).await.expect("get").data.title,
            "Interpreter"
        );

        service.delete(created.id).await.expect("delete");
        assert!(matches!(
            service.get(created.id).await,
            Err(AppError::Domain(DomainError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn invalid_documents_are_not_written() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let service = ContentService::<Project>::new(store, cache());

        let err = service.create(project("  ")).await.expect_err("blank title");
        assert!(matches!(
            err,
            AppError::Domain(DomainError::Validation { field: "title", .. })
        ));
        assert!(service.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let service = ContentService::<Project>::new(Arc::new(InMemoryDocumentStore::new()), cache());
        let id = Uuid::new_v4();
        assert!(matches!(
            service.update(id, project("x")).await,
            Err(AppError::Domain(DomainError::NotFound { .. }))
        ));
        assert!(matches!(
            service.delete(id).await,
            Err(AppError::Domain(DomainError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn personal_info_upsert_keeps_a_single_record() {
        let service = PersonalInfoService::new(ContentService::new(
            Arc::new(InMemoryDocumentStore::new()),
            cache(),
        ));
        assert!(service.get().await.is_err());

        let info = |name: &str| PersonalInfo {
            name: name.into(),
            title: "Engineer".into(),
            bio: "Builds things".into(),
            email: "me@example.com".into(),
            phone: None,
            location: None,
            avatar_url: None,
            resume_url: None,
            social: Default::default(),
        };

        let first = service.upsert(info("Ada")).await.expect("create");
        let second = service.upsert(info("Ada L.")).await.expect("update");
        assert_eq!(first.id, second.id);
        assert_eq!(service.get().await.expect("get").data.name, "Ada L.");
    }

    #[tokio::test]
    async fn blog_hides_drafts_and_dedupes_slugs() {
        let blog = BlogService::new(ContentService::new(
            Arc::new(InMemoryDocumentStore::new()),
            cache(),
        ));

        let first = blog.create(post("Hello World", true)).await.expect("first");
        let second = blog.create(post("Hello World", false)).await.expect("second");
        assert_eq!(first.data.slug, "hello-world");
        assert_eq!(second.data.slug, "hello-world-2");

        let published = blog.published().await.expect("published");
        assert_eq!(published.len(), 1);
        assert_eq!(blog.all().await.expect("all").len(), 2);

        assert!(blog.published_by_slug("hello-world").await.is_ok());
        assert!(blog.published_by_slug("hello-world-2").await.is_err());

        let mut clash = post("Another", true);
        clash.slug = "hello-world".into();
        assert!(matches!(
            blog.create(clash).await,
            Err(AppError::Domain(DomainError::Conflict { .. }))
        ));

        let mut publish = second.data.clone();
        publish.published = true;
        blog.update(second.id, publish).await.expect("publish draft");
        assert_eq!(blog.published().await.expect("published").len(), 2);
    }
}
