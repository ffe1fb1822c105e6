//! Emergency-contact management: the locally owned list persisted as a JSON
//! array under [`CONTACTS_STORAGE_KEY`], read-only imports from the device
//! address book, the recently-used cache, and the selection set an alert is
//! sent to.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use thiserror::Error;
use tracing::warn;

use crate::capabilities::{DeviceContact, KeyValueStore, KvError};
use crate::model::{Contact, ContactId, PhoneNumber, ValidationError};
use crate::{CONTACTS_STORAGE_KEY, RECENT_CONTACTS_CAP};

#[derive(Debug, Error)]
pub enum ContactError {
    #[error("storage failure: {0}")]
    Storage(#[from] KvError),

    #[error("contact list is corrupted: {reason}")]
    Corrupted { reason: String },

    #[error("a contact with this id already exists")]
    DuplicateId(ContactId),

    #[error("contact not found")]
    NotFound(ContactId),

    #[error("{name} has no phone number")]
    NoPhone { name: String },

    #[error("select at least one contact")]
    EmptySelection,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// The app-owned contact list.
///
/// Stored as one JSON array under a fixed key; every mutation is a
/// read-modify-write of the whole list, never a partial update, so a failed
/// save leaves the previously persisted array intact.
pub struct ContactStore {
    kv: Arc<dyn KeyValueStore>,
}

impl ContactStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Load the persisted list. A missing key is an empty list; a payload
    /// that no longer parses is surfaced as corruption rather than silently
    /// replaced.
    pub async fn load(&self) -> Result<Vec<Contact>, ContactError> {
        match self.kv.get(CONTACTS_STORAGE_KEY).await? {
            None => Ok(Vec::new()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| ContactError::Corrupted {
                reason: e.to_string(),
            }),
        }
    }

    /// Rewrite the whole list.
    pub async fn save(&self, contacts: &[Contact]) -> Result<(), ContactError> {
        let bytes = serde_json::to_vec(contacts).map_err(|e| ContactError::Corrupted {
            reason: e.to_string(),
        })?;
        self.kv.set(CONTACTS_STORAGE_KEY, &bytes).await?;
        Ok(())
    }

    pub async fn add(&self, contact: Contact) -> Result<Vec<Contact>, ContactError> {
        let mut contacts = self.load().await?;
        if contacts.iter().any(|c| c.id == contact.id) {
            return Err(ContactError::DuplicateId(contact.id));
        }
        contacts.push(contact);
        self.save(&contacts).await?;
        Ok(contacts)
    }

    pub async fn update(&self, contact: Contact) -> Result<Vec<Contact>, ContactError> {
        let mut contacts = self.load().await?;
        let Some(slot) = contacts.iter_mut().find(|c| c.id == contact.id) else {
            return Err(ContactError::NotFound(contact.id));
        };
        *slot = contact;
        self.save(&contacts).await?;
        Ok(contacts)
    }

    pub async fn remove(&self, id: &ContactId) -> Result<Vec<Contact>, ContactError> {
        let mut contacts = self.load().await?;
        let before = contacts.len();
        contacts.retain(|c| &c.id != id);
        if contacts.len() == before {
            return Err(ContactError::NotFound(id.clone()));
        }
        self.save(&contacts).await?;
        Ok(contacts)
    }
}

/// Convert device address-book entries into contacts. Entries without a
/// usable name or phone number are dropped, matching the import screen.
#[must_use]
pub fn import_device_contacts(entries: Vec<DeviceContact>) -> Vec<Contact> {
    entries
        .into_iter()
        .filter_map(|entry| {
            if entry.name.trim().is_empty() {
                return None;
            }
            let phone = match entry.phone.map(PhoneNumber::new) {
                Some(Ok(phone)) => phone,
                Some(Err(e)) => {
                    warn!(name = %entry.name, error = %e, "skipping imported contact");
                    return None;
                }
                None => return None,
            };
            Some(Contact {
                id: ContactId::new(format!("import_{}", entry.external_id)),
                name: entry.name,
                phones: vec![phone],
                relationship: None,
                email: None,
                avatar: None,
            })
        })
        .collect()
}

/// The last few contacts the user picked, most recent first.
pub struct RecentContacts {
    cache: LruCache<ContactId, Contact>,
}

impl RecentContacts {
    #[must_use]
    pub fn new() -> Self {
        let cap = NonZeroUsize::new(RECENT_CONTACTS_CAP).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(cap),
        }
    }

    pub fn record(&mut self, contact: Contact) {
        self.cache.put(contact.id.clone(), contact);
    }

    #[must_use]
    pub fn list(&self) -> Vec<Contact> {
        self.cache.iter().map(|(_, c)| c.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for RecentContacts {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated, id-unique, non-empty set of contacts to alert.
///
/// Building one is the precondition for arming a session; an empty
/// selection or a contact without a phone number is rejected here, before
/// any side effect starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    contacts: Vec<Contact>,
}

impl Selection {
    pub fn new(contacts: Vec<Contact>) -> Result<Self, ContactError> {
        if contacts.is_empty() {
            return Err(ContactError::EmptySelection);
        }

        let mut unique: Vec<Contact> = Vec::with_capacity(contacts.len());
        for contact in contacts {
            if contact.primary_phone().is_none() {
                return Err(ContactError::NoPhone { name: contact.name });
            }
            if !unique.iter().any(|c| c.id == contact.id) {
                unique.push(contact);
            }
        }
        Ok(Self { contacts: unique })
    }

    #[must_use]
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::MemoryStore;
    use assert_matches::assert_matches;

    fn contact(name: &str, phone: &str) -> Contact {
        Contact::new(name, PhoneNumber::new(phone).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn load_missing_key_is_empty_list() {
        let store = ContactStore::new(Arc::new(MemoryStore::new()));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_update_remove_rewrite_the_whole_list() {
        let store = ContactStore::new(Arc::new(MemoryStore::new()));

        let a = contact("Amira", "5550100001");
        let b = contact("Besim", "5550100002");
        store.add(a.clone()).await.unwrap();
        store.add(b.clone()).await.unwrap();

        let mut edited = a.clone();
        edited.relationship = Some("sister".into());
        let after_update = store.update(edited.clone()).await.unwrap();
        assert_eq!(after_update.len(), 2);

        let after_remove = store.remove(&b.id).await.unwrap();
        assert_eq!(after_remove, vec![edited]);
    }

    #[tokio::test]
    async fn duplicate_id_rejected() {
        let store = ContactStore::new(Arc::new(MemoryStore::new()));
        let a = contact("Amira", "5550100001");
        store.add(a.clone()).await.unwrap();

        assert_matches!(
            store.add(a).await,
            Err(ContactError::DuplicateId(_))
        );
    }

    #[tokio::test]
    async fn corrupted_payload_surfaces_without_clobbering() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(CONTACTS_STORAGE_KEY, b"not json").await.unwrap();

        let store = ContactStore::new(kv.clone());
        assert_matches!(store.load().await, Err(ContactError::Corrupted { .. }));

        // The broken payload is still there for recovery; load did not
        // overwrite it.
        assert_eq!(
            kv.get(CONTACTS_STORAGE_KEY).await.unwrap(),
            Some(b"not json".to_vec())
        );
    }

    #[test]
    fn import_filters_unusable_entries() {
        let imported = import_device_contacts(vec![
            DeviceContact {
                external_id: "1".into(),
                name: "Valid".into(),
                phone: Some("5550100001".into()),
            },
            DeviceContact {
                external_id: "2".into(),
                name: "No Number".into(),
                phone: None,
            },
            DeviceContact {
                external_id: "3".into(),
                name: "".into(),
                phone: Some("5550100003".into()),
            },
            DeviceContact {
                external_id: "4".into(),
                name: "Bad Number".into(),
                phone: Some("12".into()),
            },
        ]);

        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].name, "Valid");
        assert_eq!(imported[0].id.as_str(), "import_1");
    }

    #[test]
    fn recent_contacts_keeps_last_five_most_recent_first() {
        let mut recents = RecentContacts::new();
        let all: Vec<Contact> = (0..7)
            .map(|i| contact(&format!("C{i}"), &format!("55501000{i:02}")))
            .collect();
        for c in &all {
            recents.record(c.clone());
        }

        let listed = recents.list();
        assert_eq!(listed.len(), RECENT_CONTACTS_CAP);
        assert_eq!(listed[0].name, "C6");
        assert!(!listed.iter().any(|c| c.name == "C0" || c.name == "C1"));
    }

    #[test]
    fn selection_rejects_empty() {
        assert_matches!(Selection::new(vec![]), Err(ContactError::EmptySelection));
    }

    #[test]
    fn selection_rejects_contact_without_phone() {
        let mut c = contact("Amira", "5550100001");
        c.phones.clear();
        assert_matches!(
            Selection::new(vec![c]),
            Err(ContactError::NoPhone { .. })
        );
    }

    #[test]
    fn selection_dedupes_by_id() {
        let a = contact("Amira", "5550100001");
        let selection = Selection::new(vec![a.clone(), a]).unwrap();
        assert_eq!(selection.len(), 1);
    }
}
