use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Mutex;

use crate::error::ApiError;
use crate::ids;
use crate::index::{self, INDEX_KEY};
use crate::models::{CreateTodo, Todo};
use crate::store::KvStore;

/// Keeps todo records and the id index consistent on top of a flat `KvStore`.
///
/// Index updates are read-modify-write cycles, serialized by `index_lock`.
/// The lock only covers this process: several replicas sharing one store
/// can still lose an index update to a concurrent writer.
#[derive(Clone)]
pub struct TodoService {
    store: Arc<dyn KvStore>,
    index_lock: Arc<Mutex<()>>,
}

impl TodoService {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            index_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Store a new todo and append its id to the index.
    ///
    /// If the index cannot be updated the record is deleted again so that no
    /// todo exists that listing cannot reach.
    ///
    /// # Arguments
    /// * `input` - Create request; the title is trimmed before storing
    ///
    /// # Returns
    /// The stored todo with its fresh id and `completed` set to false
    ///
    /// # Errors
    /// * `InvalidInput` if the title is blank after trimming
    /// * `Store` if the record cannot be written
    /// * `IndexRead` / `IndexWrite` if the index update fails (the record is rolled back)
    pub async fn create(&self, input: CreateTodo) -> Result<Todo, ApiError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(ApiError::InvalidInput("Title cannot be empty".to_string()));
        }

        let todo = Todo {
            id: ids::new_id(),
            title: title.to_string(),
            description: input.description.trim().to_string(),
            completed: false,
        };

        let key = index::record_key(&todo.id);
        let bytes = serde_json::to_vec(&todo).context("Failed to serialize todo")?;
        self.store
            .set(&key, bytes)
            .await
            .with_context(|| format!("Failed to store todo {}", todo.id))?;

        if let Err(err) = self.append_to_index(&todo.id).await {
            match self.store.del(&key).await {
                Ok(_) => tracing::warn!("Rolled back todo {} after index update failed", todo.id),
                Err(rollback_err) => tracing::error!(
                    "Todo {} is stored but missing from the index, rollback failed: {:#}",
                    todo.id,
                    rollback_err
                ),
            }
            return Err(err);
        }

        tracing::info!("Created todo with id: {}", todo.id);
        Ok(todo)
    }

    /// All todos in index order, skipping ids with a missing or unreadable record
    ///
    /// # Returns
    /// The decodable todos, possibly empty
    ///
    /// # Errors
    /// * `IndexRead` if the index cannot be read or is not a JSON id array
    /// * `Store` if fetching any record fails
    pub async fn list(&self) -> Result<Vec<Todo>, ApiError> {
        let ids = index::read_index(self.store.as_ref())
            .await
            .map_err(ApiError::IndexRead)?;

        let mut todos = Vec::with_capacity(ids.len());
        for id in &ids {
            let Some(bytes) = self.store.get(&index::record_key(id)).await? else {
                tracing::warn!("Skipping dangling index entry: {}", id);
                continue;
            };

            match serde_json::from_slice::<Todo>(&bytes) {
                Ok(todo) => todos.push(todo),
                Err(err) => tracing::warn!("Skipping undecodable todo {}: {}", id, err),
            }
        }

        tracing::debug!("Listed {} of {} indexed todos", todos.len(), ids.len());
        Ok(todos)
    }

    /// Fetch one todo by id.
    ///
    /// # Arguments
    /// * `id` - Todo id as given in the request path
    ///
    /// # Returns
    /// The stored todo
    ///
    /// # Errors
    /// * `TodoNotFound` if no record exists for the id
    /// * `Decode` if the stored bytes are not a todo
    /// * `Store` if the lookup fails
    pub async fn get(&self, id: &str) -> Result<Todo, ApiError> {
        let Some(bytes) = self.store.get(&index::record_key(id)).await? else {
            tracing::debug!("Todo not found with id: {}", id);
            return Err(ApiError::TodoNotFound(id.to_string()));
        };

        serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode {
            id: id.to_string(),
            source,
        })
    }

    /// Delete a todo, returning whether a record was removed.
    ///
    /// The index is only touched when a record existed. If the index write
    /// fails afterwards the id dangles and the error is returned.
    ///
    /// # Arguments
    /// * `id` - Todo id as given in the request path
    ///
    /// # Returns
    /// `true` if a record was removed, `false` if none existed
    ///
    /// # Errors
    /// * `Store` if the record delete fails
    /// * `IndexRead` / `IndexWrite` if the index cannot be updated afterwards
    pub async fn delete(&self, id: &str) -> Result<bool, ApiError> {
        let removed = self.store.del(&index::record_key(id)).await?;

        if removed {
            let _guard = self.index_lock.lock().await;

            let ids = index::read_index(self.store.as_ref())
                .await
                .map_err(ApiError::IndexRead)?;
            index::write_index(self.store.as_ref(), &index::remove_id(&ids, id))
                .await
                .map_err(ApiError::IndexWrite)?;

            tracing::info!("Deleted todo with id: {}", id);
        } else {
            tracing::debug!("Delete of unknown todo id: {}", id);
        }

        Ok(removed)
    }

    /// Cheap round trip to the store, used by the health endpoint
    pub async fn ping(&self) -> anyhow::Result<()> {
        self.store.exists(INDEX_KEY).await.map(|_| ())
    }

    async fn append_to_index(&self, id: &str) -> Result<(), ApiError> {
        let _guard = self.index_lock.lock().await;

        let mut ids = index::read_index(self.store.as_ref())
            .await
            .map_err(ApiError::IndexRead)?;
        ids.push(id.to_string());

        index::write_index(self.store.as_ref(), &ids)
            .await
            .map_err(ApiError::IndexWrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::{anyhow, bail};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// MemoryStore that can be told to fail specific operations
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_index_writes: AtomicBool,
        fail_record_writes: AtomicBool,
        fail_deletes: AtomicBool,
    }

    #[async_trait]
    impl KvStore for FlakyStore {
        async fn set(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
            if key == INDEX_KEY && self.fail_index_writes.load(Ordering::SeqCst) {
                bail!("index write refused");
            }
            if key != INDEX_KEY && self.fail_record_writes.load(Ordering::SeqCst) {
                bail!("record write refused");
            }
            self.inner.set(key, value).await
        }

        async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn del(&self, key: &str) -> anyhow::Result<bool> {
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(anyhow!("delete refused"));
            }
            self.inner.del(key).await
        }

        async fn exists(&self, key: &str) -> anyhow::Result<bool> {
            self.inner.exists(key).await
        }
    }

    fn new_service() -> (TodoService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (TodoService::new(store.clone()), store)
    }

    fn flaky_service() -> (TodoService, Arc<FlakyStore>) {
        let store = Arc::new(FlakyStore::default());
        (TodoService::new(store.clone()), store)
    }

    fn input(title: &str) -> CreateTodo {
        CreateTodo {
            title: title.to_string(),
            description: String::new(),
        }
    }

    async fn stored_index(store: &dyn KvStore) -> Vec<String> {
        index::read_index(store).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_trims_and_indexes_once() {
        let (service, store) = new_service();

        let todo = service
            .create(CreateTodo {
                title: "  buy milk ".to_string(),
                description: "\n two litres\t".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(todo.id.len(), ids::ID_LEN);
        assert_eq!(todo.title, "buy milk");
        assert_eq!(todo.description, "two litres");
        assert!(!todo.completed);

        let index = stored_index(&*store).await;
        assert_eq!(index.iter().filter(|id| **id == todo.id).count(), 1);
        assert_eq!(service.list().await.unwrap(), vec![todo.clone()]);
        assert_eq!(service.get(&todo.id).await.unwrap(), todo);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_title() {
        let (service, store) = new_service();

        for title in ["", "   ", "\t\n"] {
            let err = service.create(input(title)).await.unwrap_err();
            assert!(matches!(err, ApiError::InvalidInput(_)));
        }
        assert!(!store.exists(INDEX_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_record_failure_leaves_index_untouched() {
        let (service, store) = flaky_service();
        store.fail_record_writes.store(true, Ordering::SeqCst);

        let err = service.create(input("x")).await.unwrap_err();

        assert!(matches!(err, ApiError::Store(_)));
        assert!(!store.exists(INDEX_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_index_failure_rolls_back_record() {
        let (service, store) = flaky_service();
        let kept = service.create(input("kept")).await.unwrap();

        store.fail_index_writes.store(true, Ordering::SeqCst);
        let err = service.create(input("lost")).await.unwrap_err();
        assert!(matches!(err, ApiError::IndexWrite(_)));

        store.fail_index_writes.store(false, Ordering::SeqCst);
        assert_eq!(stored_index(&*store).await, vec![kept.id.clone()]);
        // only the index and the first record remain
        assert_eq!(store.inner.data_len(), 2);
    }

    #[tokio::test]
    async fn test_create_fails_on_corrupt_index() {
        let (service, store) = new_service();
        store.set(INDEX_KEY, b"garbage".to_vec()).await.unwrap();

        let err = service.create(input("x")).await.unwrap_err();

        assert!(matches!(err, ApiError::IndexRead(_)));
        assert_eq!(store.data_len(), 1);
    }

    #[tokio::test]
    async fn test_list_empty() {
        let (service, _) = new_service();
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_preserves_creation_order_across_deletes() {
        let (service, _) = new_service();

        let mut created = Vec::new();
        for title in ["one", "two", "three", "four"] {
            created.push(service.create(input(title)).await.unwrap());
        }

        assert!(service.delete(&created[1].id).await.unwrap());

        let titles: Vec<String> = service
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["one", "three", "four"]);
    }

    #[tokio::test]
    async fn test_list_skips_dangling_and_undecodable_entries() {
        let (service, store) = new_service();
        let good = service.create(input("good")).await.unwrap();
        let broken = service.create(input("broken")).await.unwrap();

        store
            .set(&index::record_key(&broken.id), b"{\"title\":1}".to_vec())
            .await
            .unwrap();
        let mut index = stored_index(&*store).await;
        index.insert(0, "ghost".to_string());
        index::write_index(&*store, &index).await.unwrap();

        assert_eq!(service.list().await.unwrap(), vec![good]);
    }

    #[tokio::test]
    async fn test_list_corrupt_index_is_error() {
        let (service, store) = new_service();
        store.set(INDEX_KEY, b"[1, 2]".to_vec()).await.unwrap();

        assert!(matches!(service.list().await, Err(ApiError::IndexRead(_))));
    }

    #[tokio::test]
    async fn test_get_not_found_and_decode_error() {
        let (service, store) = new_service();

        assert!(matches!(
            service.get("missing").await,
            Err(ApiError::TodoNotFound(id)) if id == "missing"
        ));

        store.set(&index::record_key("bad"), b"not json".to_vec()).await.unwrap();
        assert!(matches!(service.get("bad").await, Err(ApiError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_delete_twice_is_idempotent() {
        let (service, store) = new_service();
        let other = service.create(input("other")).await.unwrap();
        let todo = service.create(input("target")).await.unwrap();

        assert!(service.delete(&todo.id).await.unwrap());
        assert!(matches!(service.get(&todo.id).await, Err(ApiError::TodoNotFound(_))));
        let after_first = stored_index(&*store).await;
        assert_eq!(after_first, vec![other.id.clone()]);

        assert!(!service.delete(&todo.id).await.unwrap());
        assert_eq!(stored_index(&*store).await, after_first);
    }

    #[tokio::test]
    async fn test_delete_unknown_does_not_touch_index() {
        let (service, store) = flaky_service();
        service.create(input("x")).await.unwrap();
        let before = stored_index(&*store).await;

        // a write attempt would fail loudly here
        store.fail_index_writes.store(true, Ordering::SeqCst);
        assert!(!service.delete("unknown-id").await.unwrap());

        assert_eq!(stored_index(&*store).await, before);
    }

    #[tokio::test]
    async fn test_delete_unknown_keeps_unmatched_index_entry() {
        let (service, store) = new_service();
        index::write_index(&*store, &["orphan".to_string()]).await.unwrap();

        assert!(!service.delete("orphan").await.unwrap());
        assert_eq!(stored_index(&*store).await, vec!["orphan".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_index_failure_is_surfaced() {
        let (service, store) = flaky_service();
        let todo = service.create(input("x")).await.unwrap();

        store.fail_index_writes.store(true, Ordering::SeqCst);
        let err = service.delete(&todo.id).await.unwrap_err();

        assert!(matches!(err, ApiError::IndexWrite(_)));
        assert!(!store.exists(&index::record_key(&todo.id)).await.unwrap());
        // the dangling id is skipped by listing
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_store_failure() {
        let (service, store) = flaky_service();
        store.fail_deletes.store(true, Ordering::SeqCst);

        assert!(matches!(service.delete("x").await, Err(ApiError::Store(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_lose_no_index_entries() {
        let (service, store) = new_service();

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move { service.create(input(&format!("todo {}", i))).await })
            })
            .collect();

        let mut created = Vec::new();
        for handle in handles {
            created.push(handle.await.unwrap().unwrap().id);
        }

        let mut index = stored_index(&*store).await;
        index.sort();
        created.sort();
        assert_eq!(index, created);
    }

    #[tokio::test]
    async fn test_ping() {
        let (service, _) = new_service();
        service.ping().await.unwrap();
    }
}
