use rcutest_cache::ArtifactCache;
use rcutest_structs::CacheKey;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

fn temp_root(tag: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("rcutest-store-{}-{}", tag, std::process::id()));
    let _ = fs::remove_dir_all(&root);
    fs::create_dir_all(&root).unwrap();
    root
}

#[test]
fn test_prepare_creates_entry_and_marker() {
    let root = temp_root("prepare");
    let cache = ArtifactCache::new(&root);
    let key = CacheKey::new("ROSENBR");

    assert!(!cache.exists(&key));
    let dir = cache.prepare(&key).unwrap();
    assert!(dir.is_dir());
    assert!(cache.exists(&key));
    assert!(cache.holder_dir().join(".rcutest_cache").is_file());

    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_prepare_clears_previous_entry() {
    let root = temp_root("clear");
    let cache = ArtifactCache::new(&root);
    let key = CacheKey::new("ROSENBR");

    let dir = cache.prepare(&key).unwrap();
    fs::write(dir.join("stale.o"), "leftover").unwrap();
    let dir = cache.prepare(&key).unwrap();
    assert!(!dir.join("stale.o").exists());

    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_remove_tolerates_missing_entry() {
    let root = temp_root("remove");
    let cache = ArtifactCache::new(&root);
    let key = CacheKey::new("NONEXISTENT");

    cache.remove(&key).unwrap();

    cache.prepare(&key).unwrap();
    cache.remove(&key).unwrap();
    assert!(!cache.exists(&key));

    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_list_parses_entry_names() {
    let root = temp_root("list");
    let cache = ArtifactCache::new(&root);

    let mut params = BTreeMap::new();
    params.insert("N".to_string(), 10.0);
    let with_params = CacheKey::with_params("ARGLALE", params);
    let plain = CacheKey::new("ROSENBR");

    cache.prepare(&with_params).unwrap();
    cache.prepare(&plain).unwrap();

    let keys = cache.list().unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&with_params));
    assert!(keys.contains(&plain));

    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_list_empty_when_no_holder() {
    let root = temp_root("empty");
    let cache = ArtifactCache::new(&root);
    assert_eq!(cache.list().unwrap(), vec![]);
    fs::remove_dir_all(&root).unwrap();
}
