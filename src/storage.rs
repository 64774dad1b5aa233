use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::schemas::{generate_id, HostPaymentMethod, Item, Person, PersonId, Session};
use crate::settlement::{BillSummary, Ledger};

pub const PEOPLE_KEY: &str = "billSplitter_people";
pub const ITEMS_KEY: &str = "billSplitter_foods";
pub const HOST_ID_KEY: &str = "billSplitter_hostId";
pub const PAYMENT_METHOD_KEY: &str = "billSplitter_hostPaymentMethod";
pub const FIRST_TIME_KEY: &str = "billSplitter_firstTime";

type Result<T> = std::result::Result<T, StorageError>;

/// One entry of a batch write.
#[derive(Clone, Debug, PartialEq)]
pub enum Change<'a> {
    Set(&'a str, String),
    Remove(&'a str),
}

/// String keys to JSON text, the way browser local storage holds them.
/// A batch passed to `apply` lands completely or not at all.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn apply(&self, changes: Vec<Change<'_>>) -> Result<()>;

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.apply(vec![Change::Set(key, value)])
    }
}

fn apply_changes(entries: &mut HashMap<String, String>, changes: Vec<Change<'_>>) {
    for change in changes {
        match change {
            Change::Set(key, value) => {
                entries.insert(key.to_string(), value);
            }
            Change::Remove(key) => {
                entries.remove(key);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn apply(&self, changes: Vec<Change<'_>>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        apply_changes(&mut entries, changes);
        Ok(())
    }
}

/// All keys live in one JSON object file. Every write replaces the file
/// through a sibling temp file and a rename.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(HashMap::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|source| StorageError::Corrupt {
                key: self.path.display().to_string(),
                source,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_all(&self, entries: &HashMap<String, String>) -> Result<()> {
        let text = serde_json::to_string_pretty(entries)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), keys = entries.len(), "store written");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_all()?.remove(key))
    }

    /// Reads the file once, applies the whole batch and writes it back with a
    /// single rename.
    fn apply(&self, changes: Vec<Change<'_>>) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read_all()?;
        apply_changes(&mut entries, changes);
        self.write_all(&entries)
    }
}

fn read_key<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Reads the whole session. Missing keys fall back to the defaults of a
/// fresh session.
pub fn load_session(store: &dyn KeyValueStore) -> Result<Session> {
    let defaults = Session::default();
    let session = Session {
        people: read_key(store, PEOPLE_KEY)?.unwrap_or(defaults.people),
        items: read_key(store, ITEMS_KEY)?.unwrap_or(defaults.items),
        host_id: read_key::<Option<PersonId>>(store, HOST_ID_KEY)?.flatten(),
        host_payment_method: read_key(store, PAYMENT_METHOD_KEY)?
            .unwrap_or(defaults.host_payment_method),
        first_time: read_key(store, FIRST_TIME_KEY)?.unwrap_or(defaults.first_time),
    };
    if session.items.iter().any(|item| item.participants.is_empty()) {
        warn!("stored session has items without participants");
    }
    Ok(session)
}

/// Writes the whole session as one batch. An absent host drops its key.
pub fn save_session(store: &dyn KeyValueStore, session: &Session) -> Result<()> {
    let host = match &session.host_id {
        Some(id) => Change::Set(HOST_ID_KEY, encode(id)?),
        None => Change::Remove(HOST_ID_KEY),
    };
    store.apply(vec![
        Change::Set(PEOPLE_KEY, encode(&session.people)?),
        Change::Set(ITEMS_KEY, encode(&session.items)?),
        host,
        Change::Set(PAYMENT_METHOD_KEY, encode(&session.host_payment_method)?),
        Change::Set(FIRST_TIME_KEY, encode(&session.first_time)?),
    ])
}

/// A frozen copy of the session handed out through a share link.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub id: String,
    pub people: Vec<Person>,
    pub items: Vec<Item>,
    pub host_id: Option<PersonId>,
    pub bill_summary: BillSummary,
    pub created_at: String,
    #[serde(default)]
    pub host_payment_method: HostPaymentMethod,
}

fn party_key(id: &str) -> String {
    format!("party_{id}")
}

pub fn save_party(store: &dyn KeyValueStore, session: &Session) -> Result<Party> {
    let party = Party {
        id: generate_id(),
        people: session.people.clone(),
        items: session.items.clone(),
        host_id: session.host_id.clone(),
        bill_summary: Ledger::new(&session.people, &session.items).bill_summary(),
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        host_payment_method: session.host_payment_method.clone(),
    };
    store.set(&party_key(&party.id), encode(&party)?)?;
    debug!(party_id = %party.id, "party snapshot stored");
    Ok(party)
}

pub fn load_party(store: &dyn KeyValueStore, id: &str) -> Result<Option<Party>> {
    read_key(store, &party_key(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::PaymentType;

    fn sample_session() -> Session {
        let mut session = Session::default();
        let alice = session.add_person("Alice").unwrap();
        let bob = session.add_person("Bob").unwrap();
        session
            .add_item(&crate::session::ItemInput {
                name: "Coffee".into(),
                price: 90.0,
                participants: vec![alice.id.clone(), bob.id.clone()],
                paid_by: Some(alice.id.clone()),
            })
            .unwrap();
        session.set_host(Some(alice.id.as_str())).unwrap();
        session.set_payment_method(HostPaymentMethod {
            kind: PaymentType::Promptpay,
            image: None,
            details: "081-234-5678".into(),
        });
        session
    }

    #[test]
    fn empty_store_loads_fresh_session() {
        let store = MemoryStore::new();
        assert_eq!(load_session(&store).unwrap(), Session::default());
    }

    #[test]
    fn session_survives_save_and_load() {
        let store = MemoryStore::new();
        let session = sample_session();
        save_session(&store, &session).unwrap();
        assert_eq!(load_session(&store).unwrap(), session);
    }

    #[test]
    fn reads_blobs_written_by_the_browser_app() {
        let store = MemoryStore::new();
        store
            .set(PEOPLE_KEY, r#"[{"id":"lx1","name":"Alice"}]"#.into())
            .unwrap();
        store
            .set(
                ITEMS_KEY,
                r#"[{"id":"f1","name":"Tea","price":40,"participants":["lx1"]}]"#.into(),
            )
            .unwrap();
        store.set(HOST_ID_KEY, "null".into()).unwrap();

        let session = load_session(&store).unwrap();
        assert_eq!(session.people[0].name, "Alice");
        assert_eq!(session.items[0].price, 40.0);
        assert_eq!(session.host_id, None);
        assert_eq!(session.host_payment_method, HostPaymentMethod::default());
        assert!(session.first_time);
    }

    #[test]
    fn corrupt_value_names_the_key() {
        let store = MemoryStore::new();
        store.set(ITEMS_KEY, "{not json".into()).unwrap();
        match load_session(&store) {
            Err(StorageError::Corrupt { key, .. }) => assert_eq!(key, ITEMS_KEY),
            other => panic!("expected corrupt error, got {other:?}"),
        }
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let session = sample_session();

        save_session(&FileStore::new(&path), &session).unwrap();
        let reopened = FileStore::new(&path);
        assert_eq!(load_session(&reopened).unwrap(), session);

        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn clearing_the_host_drops_its_key() {
        let store = MemoryStore::new();
        let mut session = sample_session();
        save_session(&store, &session).unwrap();
        assert!(store.get(HOST_ID_KEY).unwrap().is_some());

        session.set_host(None).unwrap();
        save_session(&store, &session).unwrap();
        assert_eq!(store.get(HOST_ID_KEY).unwrap(), None);
        assert_eq!(load_session(&store).unwrap().host_id, None);
    }

    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        batches: Mutex<Vec<usize>>,
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn apply(&self, changes: Vec<Change<'_>>) -> Result<()> {
            self.batches.lock().unwrap().push(changes.len());
            self.inner.apply(changes)
        }
    }

    #[test]
    fn session_is_saved_in_a_single_batch() {
        let store = CountingStore::default();
        save_session(&store, &sample_session()).unwrap();
        assert_eq!(*store.batches.lock().unwrap(), vec![5]);
    }

    #[test]
    fn failed_file_batch_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{broken").unwrap();

        let result = save_session(&FileStore::new(&path), &sample_session());
        assert!(matches!(result, Err(StorageError::Corrupt { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{broken");
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get(PEOPLE_KEY).unwrap(), None);
    }

    #[test]
    fn party_snapshot_round_trips() {
        let store = MemoryStore::new();
        let session = sample_session();
        let party = save_party(&store, &session).unwrap();
        assert_eq!(party.bill_summary.0.len(), 2);

        let loaded = load_party(&store, &party.id).unwrap().unwrap();
        assert_eq!(loaded, party);
        assert!(load_party(&store, "missing").unwrap().is_none());
    }
}
