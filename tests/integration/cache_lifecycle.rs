//! Cache reuse, invalidation and recovery from damaged records

use crate::integration::support::write_layer;
use layerfs::cache::{self, CacheOutcome};
use layerfs::layer::merge_layers;
use layerfs::session::{self, OpenOptions, SessionRegistry};
use std::fs;
use tempfile::TempDir;

#[test]
fn cache_is_reused_until_a_layer_changes() {
    let temp = TempDir::new().unwrap();
    let cache_path = temp.path().join("cache/merged.bin");
    let layers = vec![
        write_layer(temp.path(), "a.xml", r#"<folder name="pkg"><file name="foo"/></folder>"#),
        write_layer(temp.path(), "b.xml", r#"<folder name="pkg"><file name="bar"/></folder>"#),
    ];

    let (first, outcome) = cache::load_or_merge(&layers, &cache_path).unwrap();
    assert!(!outcome.is_hit());
    let (second, outcome) = cache::load_or_merge(&layers, &cache_path).unwrap();
    assert_eq!(outcome, CacheOutcome::Hit);
    assert_eq!(first, second);

    write_layer(temp.path(), "b.xml", r#"<folder name="pkg"><file name="baz"/></folder>"#);
    let (third, outcome) = cache::load_or_merge(&layers, &cache_path).unwrap();
    assert_eq!(
        outcome,
        CacheOutcome::Rebuilt {
            reason: "layer fingerprints changed".to_string()
        }
    );
    assert!(third.tree().exists("pkg/baz"));
    assert!(!third.tree().exists("pkg/bar"));
    assert_eq!(third, merge_layers(&layers).unwrap());
}

#[test]
fn damaged_cache_record_is_rebuilt() {
    let temp = TempDir::new().unwrap();
    let cache_path = temp.path().join("merged.bin");
    let layers = vec![write_layer(temp.path(), "a.xml", r#"<folder name="x"/>"#)];

    fs::write(&cache_path, b"garbage").unwrap();
    assert!(cache::load_cache(&cache_path).unwrap_err().is_cache_miss());

    let (merged, outcome) = cache::load_or_merge(&layers, &cache_path).unwrap();
    assert!(matches!(outcome, CacheOutcome::Rebuilt { .. }));
    assert!(merged.tree().is_folder("x"));
    assert_eq!(cache::load_cache(&cache_path).unwrap(), merged);
}

#[test]
fn saving_a_handle_caches_the_working_tree() {
    let temp = TempDir::new().unwrap();
    let base = merge_layers(&[write_layer(temp.path(), "a.xml", r#"<folder name="pkg"/>"#)]).unwrap();
    let working_cache = temp.path().join("merged.working.bin");
    let layer_path = temp.path().join("user.xml");

    let registry = SessionRegistry::new();
    let handle = session::open(
        &registry,
        OpenOptions::new(&layer_path, base.clone()).cache_path(&working_cache),
    )
    .unwrap();
    handle.create_file("pkg/local").unwrap();
    handle.save().unwrap();

    let cached = cache::load_cache(&working_cache).unwrap();
    assert_eq!(cached.tree(), &handle.get().unwrap());
    assert_eq!(cached.sources().len(), base.sources().len() + 1);
    assert_eq!(cached.origin("pkg/local"), handle.layer_id());
    assert_ne!(cached.fingerprint(), base.fingerprint());
}
