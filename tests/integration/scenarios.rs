//! End-to-end behaviour of merging and editing through a handle

use crate::integration::support::write_layer;
use layerfs::layer::merge_layers;
use layerfs::session::{self, OpenOptions, SessionRegistry};
use layerfs::{ApiError, AttrValue, Content, MergedTree, TreeEvent};
use std::fs;
use tempfile::TempDir;

#[test]
fn folders_from_two_layers_list_sorted_children() {
    let temp = TempDir::new().unwrap();
    let first = write_layer(temp.path(), "1.xml", r#"<folder name="pkg"><file name="foo"/></folder>"#);
    let second = write_layer(temp.path(), "2.xml", r#"<folder name="pkg"><file name="bar"/></folder>"#);

    let merged = merge_layers(&[first, second]).unwrap();
    let names: Vec<&str> = merged
        .tree()
        .get_children("pkg")
        .unwrap()
        .iter()
        .map(|n| n.name())
        .collect();
    assert_eq!(names, vec!["bar", "foo"]);
}

#[test]
fn handle_saves_children_in_name_order() {
    let temp = TempDir::new().unwrap();
    let layer_path = temp.path().join("user.xml");
    let registry = SessionRegistry::new();
    let handle = session::open(&registry, OpenOptions::new(&layer_path, MergedTree::empty())).unwrap();

    handle.create_folder("pkg").unwrap();
    handle.create_file("pkg/foo").unwrap();
    handle.create_file("pkg/bar").unwrap();
    handle.save().unwrap();

    let xml = fs::read_to_string(&layer_path).unwrap();
    let bar = xml.find(r#"<file name="bar"/>"#).unwrap();
    let foo = xml.find(r#"<file name="foo"/>"#).unwrap();
    assert!(bar < foo);
}

#[test]
fn autosave_writes_attribute_without_explicit_save() {
    let temp = TempDir::new().unwrap();
    let layer_path = temp.path().join("user.xml");
    let registry = SessionRegistry::new();
    let handle = session::open(
        &registry,
        OpenOptions::new(&layer_path, MergedTree::empty()).autosave(true),
    )
    .unwrap();

    handle.create_folder("node").unwrap();
    handle.set_attribute("node", "a", Some(AttrValue::Bool(true))).unwrap();

    let xml = fs::read_to_string(&layer_path).unwrap();
    assert!(xml.contains(r#"<attr name="a" boolvalue="true"/>"#));
    assert!(!handle.is_modified());
}

#[test]
fn duplicate_name_leaves_tree_untouched() {
    let temp = TempDir::new().unwrap();
    let base = merge_layers(&[write_layer(temp.path(), "base.xml", r#"<folder name="pkg"/>"#)]).unwrap();
    let registry = SessionRegistry::new();
    let handle = session::open(&registry, OpenOptions::new(temp.path().join("user.xml"), base)).unwrap();

    let err = handle.create_file("pkg").unwrap_err();
    assert!(matches!(err, ApiError::DuplicateName { .. }));
    assert!(!handle.is_modified());
    assert!(handle.layer().is_empty());
    assert!(handle.get().unwrap().is_folder("pkg"));
}

#[test]
fn second_handle_on_same_layer_is_refused() {
    let temp = TempDir::new().unwrap();
    let layer_path = temp.path().join("user.xml");
    let registry = SessionRegistry::new();
    let first = session::open(&registry, OpenOptions::new(&layer_path, MergedTree::empty())).unwrap();

    let err = session::open(&registry, OpenOptions::new(&layer_path, MergedTree::empty())).unwrap_err();
    assert!(matches!(err, ApiError::HandleInUse(_)));

    drop(first);
    session::open(&registry, OpenOptions::new(&layer_path, MergedTree::empty())).unwrap();
}

#[test]
fn failed_save_keeps_edits_for_retry() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("sub");
    let layer_path = blocker.join("user.xml");

    let registry = SessionRegistry::new();
    let handle = session::open(&registry, OpenOptions::new(&layer_path, MergedTree::empty())).unwrap();
    handle.create_file("settings").unwrap();

    // A file where the layer's directory should be
    fs::write(&blocker, "not a directory").unwrap();
    let err = handle.save().unwrap_err();
    assert!(err.is_io());
    assert!(handle.is_modified());
    assert!(handle.get().unwrap().exists("settings"));

    fs::remove_file(&blocker).unwrap();
    handle.save().unwrap();
    assert!(!handle.is_modified());
    assert!(fs::read_to_string(&layer_path).unwrap().contains(r#"<file name="settings"/>"#));
}

#[test]
fn overlay_edits_shadow_base_and_reopen_from_disk() {
    let temp = TempDir::new().unwrap();
    let base = merge_layers(&[write_layer(
        temp.path(),
        "base.xml",
        r#"<folder name="pkg"><file name="conf"><attr name="size" intvalue="1"/><![CDATA[base]]></file></folder>"#,
    )])
    .unwrap();
    let layer_path = temp.path().join("user.xml");
    let registry = SessionRegistry::new();

    {
        let handle = session::open(&registry, OpenOptions::new(&layer_path, base.clone())).unwrap();
        let previous = handle
            .set_attribute("pkg/conf", "size", Some(AttrValue::Int(2)))
            .unwrap();
        assert_eq!(previous, Some(AttrValue::Int(1)));
        handle
            .set_content("pkg/conf", Some(Content::inline("local")))
            .unwrap();
        assert!(matches!(handle.delete("pkg/conf"), Err(ApiError::Conflict(_))));
        handle.save().unwrap();
    }

    let handle = session::open(&registry, OpenOptions::new(&layer_path, base)).unwrap();
    let tree = handle.get().unwrap();
    assert_eq!(tree.attribute("pkg/conf", "size").unwrap(), Some(&AttrValue::Int(2)));
    assert_eq!(tree.content("pkg/conf").unwrap(), Some(&Content::inline("local")));

    handle.set_content("pkg/conf", None).unwrap();
    assert_eq!(
        handle.get().unwrap().content("pkg/conf").unwrap(),
        Some(&Content::inline("base"))
    );
}

#[test]
fn edits_publish_events_and_external_changes_reload() {
    let temp = TempDir::new().unwrap();
    let layer_path = temp.path().join("user.xml");
    let registry = SessionRegistry::new();
    let handle = session::open(&registry, OpenOptions::new(&layer_path, MergedTree::empty())).unwrap();
    let events = handle.subscribe();

    handle.create_folder("a").unwrap();
    handle.rename("a", "b").unwrap();
    handle.save().unwrap();
    assert_eq!(events.try_recv().unwrap(), TreeEvent::Created { path: "a".into() });
    assert_eq!(
        events.try_recv().unwrap(),
        TreeEvent::Renamed {
            from: "a".into(),
            to: "b".into()
        }
    );
    assert!(matches!(events.try_recv().unwrap(), TreeEvent::Saved { .. }));

    assert!(!handle.reload_if_changed().unwrap());
    fs::write(&layer_path, r#"<filesystem><folder name="c"/></filesystem>"#).unwrap();
    assert!(handle.reload_if_changed().unwrap());
    assert!(matches!(
        events.try_recv().unwrap(),
        TreeEvent::ExternallyChanged { .. }
    ));
    let tree = handle.get().unwrap();
    assert!(tree.is_folder("c"));
    assert!(!tree.exists("b"));
}

#[test]
fn saving_unchanged_handle_is_byte_identical() {
    let temp = TempDir::new().unwrap();
    let layer_path = temp.path().join("user.xml");
    let registry = SessionRegistry::new();
    let handle = session::open(&registry, OpenOptions::new(&layer_path, MergedTree::empty())).unwrap();
    handle.create_folder("pkg").unwrap();
    handle.create_file("pkg/foo").unwrap();
    handle
        .set_attribute("pkg/foo", "label", Some(AttrValue::String("a & b".into())))
        .unwrap();

    handle.save().unwrap();
    let first = fs::read(&layer_path).unwrap();
    handle.save().unwrap();
    assert_eq!(first, fs::read(&layer_path).unwrap());
}

#[test]
fn saving_unchanged_handle_keeps_cache_bytes() {
    let temp = TempDir::new().unwrap();
    let base = merge_layers(&[write_layer(temp.path(), "base.xml", r#"<folder name="pkg"/>"#)]).unwrap();
    let cache_path = temp.path().join("working.bin");
    let registry = SessionRegistry::new();
    let handle = session::open(
        &registry,
        OpenOptions::new(temp.path().join("user.xml"), base).cache_path(&cache_path),
    )
    .unwrap();
    handle.create_file("pkg/foo").unwrap();

    handle.save().unwrap();
    let first = fs::read(&cache_path).unwrap();
    handle.save().unwrap();
    assert_eq!(first, fs::read(&cache_path).unwrap());

    handle.create_file("pkg/bar").unwrap();
    handle.save().unwrap();
    assert_ne!(first, fs::read(&cache_path).unwrap());
}

#[test]
fn second_handle_on_same_cache_path_is_refused() {
    let temp = TempDir::new().unwrap();
    let cache_path = temp.path().join("shared.bin");
    let registry = SessionRegistry::new();
    let first = session::open(
        &registry,
        OpenOptions::new(temp.path().join("u1.xml"), MergedTree::empty()).cache_path(&cache_path),
    )
    .unwrap();

    let err = session::open(
        &registry,
        OpenOptions::new(temp.path().join("u2.xml"), MergedTree::empty()).cache_path(&cache_path),
    )
    .unwrap_err();
    assert!(matches!(err, ApiError::HandleInUse(_)));
    // the refused open gives back the layer it had claimed
    assert!(!registry.is_open(&temp.path().join("u2.xml")));

    drop(first);
    session::open(
        &registry,
        OpenOptions::new(temp.path().join("u2.xml"), MergedTree::empty()).cache_path(&cache_path),
    )
    .unwrap();
}

#[test]
fn failed_cache_store_keeps_handle_modified() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("cache");
    let cache_path = blocker.join("working.bin");
    let registry = SessionRegistry::new();
    let handle = session::open(
        &registry,
        OpenOptions::new(temp.path().join("user.xml"), MergedTree::empty()).cache_path(&cache_path),
    )
    .unwrap();
    handle.create_file("settings").unwrap();

    // A file where the cache directory should be
    fs::write(&blocker, "not a directory").unwrap();
    let err = handle.save().unwrap_err();
    assert!(err.is_io());
    assert!(handle.is_modified());

    fs::remove_file(&blocker).unwrap();
    handle.save().unwrap();
    assert!(!handle.is_modified());
    assert!(layerfs::cache::load_cache(&cache_path).unwrap().tree().exists("settings"));
}

#[test]
fn dropping_handle_closes_subscriptions() {
    let temp = TempDir::new().unwrap();
    let registry = SessionRegistry::new();
    let handle = session::open(
        &registry,
        OpenOptions::new(temp.path().join("user.xml"), MergedTree::empty()),
    )
    .unwrap();
    let events = handle.subscribe();
    drop(handle);
    assert!(events.recv().is_err());
    assert_eq!(registry.open_count(), 0);
}
