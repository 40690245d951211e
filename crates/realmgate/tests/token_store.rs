//! Encrypted token store opened from configuration

mod common;

use std::sync::Arc;
use std::thread;

use realmgate::ConfigBuilder;
use realmgate::bootstrap::create_token_store;
use realmgate::store::{TokenEntry, user_id};
use tempfile::TempDir;

fn config(dir: &TempDir) -> realmgate::Config {
    ConfigBuilder::new()
        .token_store_dir(dir.path().join("tokens"))
        .build()
        .unwrap()
}

#[test]
fn test_tokens_survive_reopening_with_same_key() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    let store = create_token_store(&config.token_store).unwrap();
    store
        .create(
            "bob",
            "CSW",
            TokenEntry::new("AT1", "https://idp/meta").with_refresh_token("RT1"),
        )
        .unwrap();
    drop(store);

    let reopened = create_token_store(&config.token_store).unwrap();
    let entry = reopened.read_source("bob", "CSW").unwrap();
    assert_eq!(entry.access_token, "AT1");
    assert_eq!(entry.refresh_token.as_deref(), Some("RT1"));
    assert_eq!(
        reopened.file_path("bob").file_name().unwrap().to_str(),
        Some("81b637d8fcd2c6da6359e6963113a1170de795e4b725b84d1e0b4cfd9ec58ce9")
    );
}

#[test]
fn test_different_key_reports_corruption() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let store = create_token_store(&config.token_store).unwrap();
    store
        .create("bob", "CSW", TokenEntry::new("AT1", "https://idp/meta"))
        .unwrap();

    let other = ConfigBuilder::new()
        .token_store_dir(dir.path().join("tokens"))
        .key_file(dir.path().join("other.key"))
        .build()
        .unwrap();
    let foreign = create_token_store(&other.token_store).unwrap();

    let err = foreign.read("bob").unwrap_err();
    assert!(err.is_corruption());
    // corruption is not the same as having nothing stored
    assert!(foreign.read("alice").unwrap().is_empty());
}

#[test]
fn test_source_lifecycle() {
    let (_dir, store) = common::token_store();
    store
        .create("bob", "CSW", TokenEntry::new("AT1", "https://a/meta"))
        .unwrap();
    store
        .create("bob", "WFS", TokenEntry::new("AT2", "https://b/meta"))
        .unwrap();

    let info = store.read("bob").unwrap();
    assert_eq!(info.id, user_id("bob"));
    assert_eq!(
        info.token_entries.keys().collect::<Vec<_>>(),
        vec!["CSW", "WFS"]
    );

    assert!(store.delete_source("bob", "CSW").unwrap());
    assert!(!store.is_available("bob", "CSW"));
    assert!(store.is_available("bob", "WFS"));
    assert!(store.file_path("bob").exists());

    assert!(store.delete_source("bob", "WFS").unwrap());
    assert!(!store.file_path("bob").exists());
    assert!(!store.delete_source("bob", "WFS").unwrap());
    assert!(store.read_source("bob", "WFS").unwrap_err().is_not_found());
}

#[test]
fn test_concurrent_writers_across_users() {
    let (_dir, store) = common::token_store();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let user = format!("user-{}", i % 2);
                let source = format!("source-{i}");
                store
                    .create(&user, &source, TokenEntry::new(format!("AT{i}"), "https://idp"))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for user in ["user-0", "user-1"] {
        assert_eq!(store.read(user).unwrap().token_entries.len(), 4, "{user}");
    }
    assert_eq!(
        store.read_source("user-1", "source-3").unwrap().access_token,
        "AT3"
    );
}
