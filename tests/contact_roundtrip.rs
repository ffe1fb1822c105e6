//! Persistence round-trips for the emergency-contact list, over both the
//! in-memory store and the file-backed store.

use std::sync::Arc;

use proptest::prelude::*;
use tempfile::tempdir;

use sos_core::capabilities::{FileStore, KeyValueStore, MemoryStore};
use sos_core::contacts::{ContactError, ContactStore};
use sos_core::model::{Contact, ContactId, PhoneNumber};
use sos_core::CONTACTS_STORAGE_KEY;

fn contact(name: &str, phone: &str, relationship: Option<&str>) -> Contact {
    let mut c = Contact::new(name, PhoneNumber::new(phone).unwrap()).unwrap();
    c.relationship = relationship.map(str::to_string);
    c
}

#[tokio::test]
async fn saving_then_loading_reproduces_the_list() {
    let store = ContactStore::new(Arc::new(MemoryStore::new()));

    let original = vec![
        contact("Amira", "+1 (555) 010-0001", Some("sister")),
        contact("Besim", "5550100002", None),
        contact("Chidi", "555-010-0003", Some("neighbor")),
    ];

    store.save(&original).await.unwrap();
    let loaded = store.load().await.unwrap();

    assert_eq!(loaded, original);
    for (a, b) in loaded.iter().zip(&original) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.name, b.name);
        assert_eq!(a.phones, b.phones);
        assert_eq!(a.relationship, b.relationship);
    }
}

#[tokio::test]
async fn file_backed_roundtrip_survives_reopen() {
    let dir = tempdir().unwrap();

    let original = vec![contact("Amira", "5550100001", Some("sister"))];
    {
        let kv = Arc::new(FileStore::new(dir.path()).unwrap());
        ContactStore::new(kv).save(&original).await.unwrap();
    }

    // A fresh store over the same directory sees the same list.
    let kv = Arc::new(FileStore::new(dir.path()).unwrap());
    let loaded = ContactStore::new(kv).load().await.unwrap();
    assert_eq!(loaded, original);
}

#[tokio::test]
async fn corrupted_file_surfaces_without_being_replaced() {
    let dir = tempdir().unwrap();
    let kv = Arc::new(FileStore::new(dir.path()).unwrap());

    kv.set(CONTACTS_STORAGE_KEY, b"{ definitely not a contact array")
        .await
        .unwrap();

    let store = ContactStore::new(kv.clone());
    assert!(matches!(
        store.load().await,
        Err(ContactError::Corrupted { .. })
    ));

    // The broken payload is still on disk for recovery.
    assert_eq!(
        kv.get(CONTACTS_STORAGE_KEY).await.unwrap(),
        Some(b"{ definitely not a contact array".to_vec())
    );
}

#[tokio::test]
async fn wholesale_rewrite_removes_deleted_entries() {
    let kv = Arc::new(MemoryStore::new());
    let store = ContactStore::new(kv.clone());

    let a = contact("Amira", "5550100001", None);
    let b = contact("Besim", "5550100002", None);
    store.add(a.clone()).await.unwrap();
    store.add(b.clone()).await.unwrap();
    store.remove(&a.id).await.unwrap();

    // The persisted payload is the whole new array, not a patch.
    let raw = kv.get(CONTACTS_STORAGE_KEY).await.unwrap().unwrap();
    let parsed: Vec<Contact> = serde_json::from_slice(&raw).unwrap();
    assert_eq!(parsed, vec![b]);
}

fn contact_strategy() -> impl Strategy<Value = Contact> {
    (
        "[A-Za-z][A-Za-z ]{0,19}",
        "[0-9]{7,12}",
        proptest::option::of("[a-z]{1,12}"),
        proptest::option::of("[a-z]{1,8}@[a-z]{1,8}\\.com"),
    )
        .prop_map(|(name, phone, relationship, email)| Contact {
            id: ContactId::generate(),
            name,
            phones: vec![PhoneNumber::new(phone).unwrap()],
            relationship,
            email,
            avatar: None,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_contact_list_roundtrips(contacts in proptest::collection::vec(contact_strategy(), 0..8)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let store = ContactStore::new(Arc::new(MemoryStore::new()));
            store.save(&contacts).await.unwrap();
            let loaded = store.load().await.unwrap();
            prop_assert_eq!(loaded, contacts);
            Ok(())
        })?;
    }
}
