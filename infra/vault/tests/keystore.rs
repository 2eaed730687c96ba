pub mod fixtures;

use fixtures::*;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wmp_vault::keystores::{FileKeyStore, KeyStore, RECORD_LEN};
use wmp_vault::prelude::*;

fn open_store(root: &Path) -> FileKeyStore {
    FileKeyStore::builder(root)
        .master_secret("host-master-secret", "install-salt")
        .unwrap()
        .open()
        .unwrap()
}

#[test]
fn keys_survive_a_restart() {
    let temp = TempDir::new().unwrap();
    let identity = PathIdentity::new("/media/holiday.mp4");
    let plaintext = sample(3000);

    let key = KeyManager::new(open_store(temp.path())).get_or_create_key(&identity).unwrap();
    let path = seal(temp.path(), "holiday.wmv", &plaintext, &key);
    drop(key);

    let restarted = KeyManager::new(open_store(temp.path()));
    let key = restarted.get_or_create_key(&identity).unwrap();
    assert_eq!(read_range(&path, &key, 0, None).unwrap(), plaintext);
}

#[test]
fn each_identity_gets_its_own_record() {
    let temp = TempDir::new().unwrap();
    let store = open_store(temp.path());
    let a = PathIdentity::new("/media/a.mp4").alias();
    let b = PathIdentity::new("/media/b.mp4").alias();

    let key_a = store.get_or_create(&a).unwrap();
    let key_b = store.get_or_create(&b).unwrap();

    assert_ne!(key_a.fingerprint(), key_b.fingerprint());
    assert!(store.record_path(&a).ends_with(format!("{a}.key")));
    assert_eq!(std::fs::metadata(store.record_path(&a)).unwrap().len(), RECORD_LEN as u64);
    assert!(store.contains(&b));
}

#[test]
fn corrupt_record_is_unavailable_not_replaced() {
    let temp = TempDir::new().unwrap();
    let store = open_store(temp.path());
    let alias = PathIdentity::new("/media/c.mp4").alias();
    store.get_or_create(&alias).unwrap();

    let record = store.record_path(&alias);
    let mut bytes = std::fs::read(&record).unwrap();
    bytes[20] ^= 0xff;
    std::fs::write(&record, &bytes).unwrap();

    let err = store.get_or_create(&alias).unwrap_err();
    assert!(matches!(err, VaultError::KeyStoreUnavailable { .. }));
    assert_eq!(std::fs::read(&record).unwrap(), bytes);

    std::fs::write(&record, &bytes[..10]).unwrap();
    let err = store.get_or_create(&alias).unwrap_err();
    assert!(matches!(err, VaultError::KeyStoreUnavailable { .. }));
}

#[test]
fn destroyed_key_is_gone_for_good() {
    let temp = TempDir::new().unwrap();
    let keys = KeyManager::new(open_store(temp.path()));
    let identity = PathIdentity::new("/media/d.mp4");
    let plaintext = sample(64);

    let key = keys.get_or_create_key(&identity).unwrap();
    let path = seal(temp.path(), "d.wmv", &plaintext, &key);

    keys.destroy_key(&identity).unwrap();
    keys.destroy_key(&identity).unwrap();

    let replacement = keys.get_or_create_key(&identity).unwrap();
    assert_ne!(replacement.fingerprint(), key.fingerprint());
    let err = read_range(&path, &replacement, 0, None).unwrap_err();
    assert!(matches!(err, VaultError::AuthenticationFailure { .. }));
}

#[test]
fn racing_stores_agree_on_one_key() {
    let temp = TempDir::new().unwrap();
    let stores: Vec<Arc<FileKeyStore>> = (0..4).map(|_| Arc::new(open_store(temp.path()))).collect();
    let alias = PathIdentity::new("/media/race.mp4").alias();
    let alias = &alias;

    let fingerprints: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = stores
            .iter()
            .flat_map(|store| std::iter::repeat_n(store, 4))
            .map(|store| scope.spawn(move || store.get_or_create(alias).unwrap().fingerprint()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(fingerprints.iter().all(|f| f == &fingerprints[0]));
    let leftovers = std::fs::read_dir(temp.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}

#[test]
fn manager_accepts_a_shared_store() {
    let temp = TempDir::new().unwrap();
    let store: Arc<dyn KeyStore> = Arc::new(open_store(temp.path()));
    let first = KeyManager::from_shared(Arc::clone(&store));
    let second = KeyManager::from_shared(store);
    let identity = PathIdentity::new("/media/shared.mp4");

    assert_eq!(
        first.get_or_create_key(&identity).unwrap().fingerprint(),
        second.get_or_create_key(&identity).unwrap().fingerprint()
    );
}
