use crate::auth::AuthProvider;
use crate::storage::LocalStorage;
use crate::store::DataStore;
use std::sync::Arc;

// Shared state
pub struct AppState<S, A> {
    pub store: Arc<S>,
    pub auth: Arc<A>,
    pub storage: Arc<LocalStorage>,
    pub max_upload_bytes: usize,
}

impl<S: DataStore, A: AuthProvider> AppState<S, A> {
    pub fn new(store: S, auth: A, storage: LocalStorage, max_upload_bytes: usize) -> Self {
        Self {
            store: Arc::new(store),
            auth: Arc::new(auth),
            storage: Arc::new(storage),
            max_upload_bytes,
        }
    }
}

// Derived Clone would demand S: Clone and A: Clone
impl<S, A> Clone for AppState<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            auth: self.auth.clone(),
            storage: self.storage.clone(),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}
