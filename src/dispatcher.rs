use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::protocol::{Address, PutTarget, Response, INVALID_COMMAND};
use crate::storage::{FileStorage, IdentifierStore, StorageError};

/// Maps parsed commands onto storage and the identifier map.
///
/// Every storage outcome becomes a response code. Unexpected I/O faults are
/// logged and answered like the nearest expected failure, `403` for PUT and
/// `404` for GET/DELETE.
pub struct Dispatcher<S: FileStorage> {
    storage: Arc<S>,
}

impl<S: FileStorage> Dispatcher<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    fn resolve<'a>(&self, ids: &'a IdentifierStore, addr: &'a Address) -> Option<&'a str> {
        match addr {
            Address::ByName(name) => Some(name.as_str()),
            Address::ById(id) => ids.lookup_by_id(id),
        }
    }

    pub async fn get(
        &self,
        ids: &IdentifierStore,
        addr: &Address,
    ) -> Response {
        let Some(name) = self.resolve(ids, addr) else {
            debug!("GET {}: unknown identifier", addr);
            return Response::NotFound;
        };

        match self.storage.read(name).await {
            Ok(data) => {
                info!("GET {} -> {} ({} bytes)", addr, name, data.len());
                Response::Found(data)
            }
            Err(StorageError::NotFound(_)) | Err(StorageError::InvalidName(_)) => {
                debug!("GET {}: no such file", addr);
                Response::NotFound
            }
            Err(e) => {
                error!("GET {}: storage fault: {}", addr, e);
                Response::NotFound
            }
        }
    }

    pub async fn put(
        &self,
        ids: &mut IdentifierStore,
        target: &PutTarget,
        data: &[u8],
    ) -> Response {
        let id = ids.allocate_id();
        let name = match target {
            PutTarget::Named(name) => name.clone(),
            PutTarget::Wildcard => format!("{}.dat", id),
        };

        match self.storage.create(&name, data).await {
            Ok(()) => {
                ids.insert(id.clone(), name.clone());
                info!("PUT {} ({} bytes) -> id {}", name, data.len(), id);
                Response::Stored(id)
            }
            Err(StorageError::AlreadyExists(_)) => {
                debug!("PUT {}: already exists", name);
                Response::Forbidden
            }
            Err(StorageError::InvalidName(_)) => {
                warn!("PUT {:?}: rejected file name", name);
                Response::Forbidden
            }
            Err(e) => {
                error!("PUT {}: storage fault: {}", name, e);
                Response::Forbidden
            }
        }
    }

    pub async fn delete(
        &self,
        ids: &mut IdentifierStore,
        addr: &Address,
    ) -> Response {
        let name = match addr {
            Address::ById(id) => match ids.lookup_by_id(id) {
                Some(name) => name.to_string(),
                None => {
                    debug!("DELETE {}: unknown identifier", addr);
                    return Response::NotFound;
                }
            },
            Address::ByName(name) => name.clone(),
        };

        match self.storage.delete(&name).await {
            Ok(()) => {
                // Any id still naming this file would dangle
                let pruned = ids.remove_name(&name);
                info!("DELETE {} (ids {:?})", name, pruned);
                Response::Ok
            }
            Err(StorageError::NotFound(_)) | Err(StorageError::InvalidName(_)) => {
                debug!("DELETE {}: no such file", addr);
                Response::NotFound
            }
            Err(e) => {
                error!("DELETE {}: storage fault: {}", addr, e);
                Response::NotFound
            }
        }
    }

    pub fn unknown(&self, verb: &str) -> Response {
        warn!("Unrecognized verb {:?}", verb);
        Response::Invalid(INVALID_COMMAND.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Dispatcher<LocalStorage>, IdentifierStore) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path().join("data")));
        (dir, Dispatcher::new(storage), IdentifierStore::new())
    }

    fn stored_id(resp: Response) -> String {
        match resp {
            Response::Stored(id) => id,
            other => panic!("expected Stored, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn named_put_records_identifier() {
        let (_dir, d, mut ids) = setup();
        let id = stored_id(d.put(&mut ids, &PutTarget::Named("a.txt".into()), &[1, 2, 3]).await);
        assert_eq!(ids.lookup_by_id(&id), Some("a.txt"));

        let by_id = d.get(&ids, &Address::ById(id)).await;
        let by_name = d.get(&ids, &Address::ByName("a.txt".into())).await;
        assert_eq!(by_id, Response::Found(vec![1, 2, 3]));
        assert_eq!(by_id, by_name);
    }

    #[tokio::test]
    async fn wildcard_put_names_file_after_id() {
        let (_dir, d, mut ids) = setup();
        let id = stored_id(d.put(&mut ids, &PutTarget::Wildcard, b"blob").await);
        let name = format!("{}.dat", id);
        assert_eq!(ids.lookup_by_id(&id), Some(name.as_str()));
        assert_eq!(
            d.get(&ids, &Address::ByName(name)).await,
            Response::Found(b"blob".to_vec())
        );
    }

    #[tokio::test]
    async fn rapid_wildcard_puts_get_distinct_ids() {
        let (_dir, d, mut ids) = setup();
        let mut seen = std::collections::HashSet::new();
        for i in 0..20u8 {
            let id = stored_id(d.put(&mut ids, &PutTarget::Wildcard, &[i]).await);
            assert!(seen.insert(id));
        }
        assert_eq!(ids.len(), 20);
    }

    #[tokio::test]
    async fn duplicate_put_is_forbidden_and_keeps_bytes() {
        let (_dir, d, mut ids) = setup();
        d.put(&mut ids, &PutTarget::Named("a.txt".into()), b"old").await;
        let resp = d.put(&mut ids, &PutTarget::Named("a.txt".into()), b"new").await;
        assert_eq!(resp, Response::Forbidden);
        assert_eq!(ids.len(), 1);
        assert_eq!(
            d.get(&ids, &Address::ByName("a.txt".into())).await,
            Response::Found(b"old".to_vec())
        );
    }

    #[tokio::test]
    async fn put_with_escaping_name_is_forbidden() {
        let (_dir, d, mut ids) = setup();
        let resp = d.put(&mut ids, &PutTarget::Named("../x".into()), b"x").await;
        assert_eq!(resp, Response::Forbidden);
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn missing_targets_are_not_found() {
        let (_dir, d, mut ids) = setup();
        assert_eq!(d.get(&ids, &Address::ById("1".into())).await, Response::NotFound);
        assert_eq!(d.get(&ids, &Address::ByName("x".into())).await, Response::NotFound);
        assert_eq!(d.delete(&mut ids, &Address::ById("1".into())).await, Response::NotFound);
        assert_eq!(d.delete(&mut ids, &Address::ByName("x".into())).await, Response::NotFound);
    }

    #[tokio::test]
    async fn delete_by_id_unresolves_identifier() {
        let (_dir, d, mut ids) = setup();
        let id = stored_id(d.put(&mut ids, &PutTarget::Named("a".into()), b"1").await);
        assert_eq!(d.delete(&mut ids, &Address::ById(id.clone())).await, Response::Ok);
        assert_eq!(d.get(&ids, &Address::ById(id)).await, Response::NotFound);
        assert_eq!(d.get(&ids, &Address::ByName("a".into())).await, Response::NotFound);
    }

    #[tokio::test]
    async fn delete_by_name_prunes_identifier() {
        let (_dir, d, mut ids) = setup();
        let id = stored_id(d.put(&mut ids, &PutTarget::Named("a".into()), b"1").await);
        assert_eq!(d.delete(&mut ids, &Address::ByName("a".into())).await, Response::Ok);
        assert_eq!(ids.lookup_by_id(&id), None);
    }

    #[tokio::test]
    async fn delete_by_name_prunes_every_identifier_for_the_file() {
        let (_dir, d, mut ids) = setup();
        d.storage().create("twice.txt", b"t").await.unwrap();
        ids.insert("1", "twice.txt");
        ids.insert("2", "twice.txt");
        ids.insert("3", "other.txt");

        assert_eq!(d.delete(&mut ids, &Address::ByName("twice.txt".into())).await, Response::Ok);
        assert_eq!(ids.lookup_by_id("1"), None);
        assert_eq!(ids.lookup_by_id("2"), None);
        assert_eq!(ids.lookup_by_id("3"), Some("other.txt"));
    }

    #[tokio::test]
    async fn storage_faults_become_response_codes() {
        let dir = TempDir::new().unwrap();
        // Data root is a regular file, so every file operation under it fails
        let root = dir.path().join("data");
        std::fs::write(&root, b"not a directory").unwrap();
        let d = Dispatcher::new(Arc::new(LocalStorage::new(root)));
        let mut ids = IdentifierStore::new();
        ids.insert("7", "x");

        assert_eq!(d.get(&ids, &Address::ByName("x".into())).await, Response::NotFound);
        assert_eq!(d.get(&ids, &Address::ById("7".into())).await, Response::NotFound);
        assert_eq!(d.put(&mut ids, &PutTarget::Named("y".into()), b"y").await, Response::Forbidden);
        assert_eq!(d.delete(&mut ids, &Address::ByName("x".into())).await, Response::NotFound);
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn untracked_file_is_reachable_by_name() {
        let (_dir, d, mut ids) = setup();
        d.storage().create("manual.bin", b"m").await.unwrap();
        assert_eq!(
            d.get(&ids, &Address::ByName("manual.bin".into())).await,
            Response::Found(b"m".to_vec())
        );
        assert_eq!(
            d.delete(&mut ids, &Address::ByName("manual.bin".into())).await,
            Response::Ok
        );
    }

    #[tokio::test]
    async fn dangling_identifier_is_not_found() {
        let (_dir, d, mut ids) = setup();
        ids.insert("42", "gone.txt");
        assert_eq!(d.get(&ids, &Address::ById("42".into())).await, Response::NotFound);
        assert_eq!(d.delete(&mut ids, &Address::ById("42".into())).await, Response::NotFound);
    }

    #[test]
    fn unknown_verb_is_free_text() {
        let (_dir, d, _ids) = setup();
        assert_eq!(d.unknown("LIST"), Response::Invalid("Invalid command!".into()));
    }
}
