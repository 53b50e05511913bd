//! Property tests over randomly built layers. Folders are named `d*` and
//! files `f*`, so generated layers never disagree on a node's kind. Values
//! cover every attribute kind and both content forms.

use layerfs::layer::{merge_layers, MergedTree};
use layerfs::tree::path;
use layerfs::xml::escape::is_xml_char;
use layerfs::{AttrValue, Content, LayerSource, VirtualTree};
use proptest::prelude::*;

/// Folder chain, optional file in it, optional attribute, optional content
type Entry = (Vec<u8>, Option<u8>, Option<(u8, AttrValue)>, Option<Content>);

/// Text a layer document can carry verbatim, biased towards markup
fn xml_text() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::collection::vec(any::<char>(), 0..12)
            .prop_map(|chars| chars.into_iter().filter(|c| is_xml_char(*c)).collect()),
        Just("a]]>b".to_string()),
        Just("&<>\"' ;&amp;".to_string()),
        Just("tab\tnew\nline\r".to_string()),
        Just("\\u0041 not an escape".to_string()),
        Just("  padded  ".to_string()),
    ]
}

fn finite_f32() -> impl Strategy<Value = f32> {
    any::<f32>().prop_filter("finite", |v| v.is_finite())
}

fn finite_f64() -> impl Strategy<Value = f64> {
    any::<f64>().prop_filter("finite", |v| v.is_finite())
}

fn attr_value() -> impl Strategy<Value = AttrValue> {
    prop_oneof![
        any::<bool>().prop_map(AttrValue::Bool),
        any::<i8>().prop_map(AttrValue::Byte),
        any::<i16>().prop_map(AttrValue::Short),
        any::<i32>().prop_map(AttrValue::Int),
        any::<i64>().prop_map(AttrValue::Long),
        finite_f32().prop_map(AttrValue::Float),
        finite_f64().prop_map(AttrValue::Double),
        any::<char>()
            .prop_filter("xml char", |c| is_xml_char(*c))
            .prop_map(AttrValue::Char),
        // stringvalue escapes whatever XML cannot hold
        prop_oneof![any::<String>(), xml_text()].prop_map(AttrValue::String),
        xml_text().prop_map(AttrValue::Url),
        xml_text().prop_map(AttrValue::Method),
        xml_text().prop_map(AttrValue::New),
        xml_text().prop_map(AttrValue::Bundle),
        xml_text().prop_map(AttrValue::Serial),
    ]
}

fn content() -> impl Strategy<Value = Content> {
    prop_oneof![
        xml_text().prop_map(|text| Content::inline(text)),
        xml_text().prop_map(|url| Content::url(url)),
    ]
}

fn entry() -> impl Strategy<Value = Entry> {
    (
        prop::collection::vec(0u8..3, 0..3),
        prop::option::of(0u8..3),
        prop::option::of((0u8..3, attr_value())),
        prop::option::of(content()),
    )
}

fn build_layer(entries: &[Entry]) -> VirtualTree {
    let mut tree = VirtualTree::new();
    for (folders, file, attr, content) in entries {
        let folder_path = folders
            .iter()
            .map(|i| format!("d{}", i))
            .collect::<Vec<_>>()
            .join("/");
        tree.ensure_folders(&folder_path).unwrap();

        let target = match file {
            Some(i) => {
                let file_path = path::join(&folder_path, &format!("f{}", i));
                if !tree.exists(&file_path) {
                    tree.create_file(&file_path).unwrap();
                }
                if let Some(content) = content {
                    tree.set_content(&file_path, Some(content.clone())).unwrap();
                }
                file_path
            }
            None => folder_path,
        };
        if let (Some((key, value)), false) = (attr, target.is_empty()) {
            tree.set_attribute(&target, &format!("a{}", key), Some(value.clone()))
                .unwrap();
        }
    }
    tree
}

fn layers() -> impl Strategy<Value = Vec<LayerSource>> {
    prop::collection::vec(prop::collection::vec(entry(), 0..6), 1..5).prop_map(|layers| {
        layers
            .iter()
            .enumerate()
            .map(|(i, entries)| {
                LayerSource::memory(format!("layer-{}", i), build_layer(entries).to_xml())
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_merge_is_associative_over_prefixes(layers in layers(), split in 0usize..5) {
        let split = split.min(layers.len());
        let whole = merge_layers(&layers).unwrap();
        let stepwise = merge_layers(&layers[..split])
            .unwrap()
            .extend(&layers[split..])
            .unwrap();
        prop_assert_eq!(whole.tree(), stepwise.tree());
        prop_assert_eq!(whole.fingerprint(), stepwise.fingerprint());
    }

    #[test]
    fn prop_merged_tree_survives_xml(layers in layers()) {
        let merged = merge_layers(&layers).unwrap();
        let reparsed = VirtualTree::from_xml(&merged.tree().to_xml(), "reparsed").unwrap();
        prop_assert_eq!(merged.tree(), &reparsed);
    }

    #[test]
    fn prop_last_layer_wins_attributes(layers in layers()) {
        let merged = merge_layers(&layers).unwrap();
        let last = VirtualTree::from_xml(&layers.last().unwrap().load().unwrap().text, "last").unwrap();
        for (node_path, node) in last.walk() {
            for (key, value) in node.attributes() {
                prop_assert_eq!(merged.tree().attribute(&node_path, key).unwrap(), Some(value));
            }
        }
    }

    #[test]
    fn prop_merging_a_layer_twice_is_stable(layers in layers()) {
        let once = merge_layers(&layers).unwrap();
        let mut twice = layers.clone();
        twice.extend(layers.iter().cloned());
        let twice = merge_layers(&twice).unwrap();
        prop_assert_eq!(once.tree(), twice.tree());
        prop_assert_ne!(once.fingerprint(), twice.fingerprint());
    }
}

#[test]
fn empty_layer_list_is_empty_tree() {
    let merged = merge_layers(&[]).unwrap();
    assert_eq!(merged, MergedTree::empty());
    assert!(merged.tree().is_empty());
}
