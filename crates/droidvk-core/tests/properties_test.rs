//! Integration test: property resolution and implicit layer parsing.

use std::collections::BTreeMap;

use droidvk_core::properties::*;

fn props(entries: &[(&str, &str)]) -> Properties {
    let overrides: BTreeMap<String, String> = entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Properties::new(overrides)
}

#[test]
fn test_layer_list_priorities() {
    let layers = parse_layer_list("VK_LAYER_a::VK_LAYER_b");
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0].name, "VK_LAYER_a");
    assert_eq!(layers[0].priority, -PROPERTY_VALUE_MAX);
    // the empty entry still consumes a priority
    assert_eq!(layers[1].name, "VK_LAYER_b");
    assert_eq!(layers[1].priority, -PROPERTY_VALUE_MAX + 2);
}

#[test]
fn test_layer_list_empty() {
    assert!(parse_layer_list("").is_empty());
    assert!(parse_layer_list(":::").is_empty());
}

#[test]
fn test_indexed_layer_requires_digit() {
    let layer = parse_indexed_layer("debug.vulkan.layer.7", "VK_LAYER_x");
    match layer {
        Some(ImplicitLayer { name, priority }) => {
            assert_eq!(name, "VK_LAYER_x");
            assert_eq!(priority, 7);
        }
        other => panic!("expected layer, got {:?}", other),
    }

    // leading digits are enough, like atoi
    let layer = parse_indexed_layer("debug.vulkan.layer.12abc", "VK_LAYER_y");
    assert_eq!(layer.map(|l| l.priority), Some(12));

    assert_eq!(parse_indexed_layer("debug.vulkan.layer.x1", "VK_LAYER_z"), None);
    assert_eq!(parse_indexed_layer("debug.vulkan.layer.-1", "VK_LAYER_z"), None);
    assert_eq!(parse_indexed_layer("debug.vulkan.layer.3", ""), None);
    assert_eq!(parse_indexed_layer("debug.other.3", "VK_LAYER_z"), None);
}

#[test]
fn test_implicit_layers_sorted_by_priority() {
    let p = props(&[
        ("debug.vulkan.layers", "VK_LAYER_list0:VK_LAYER_list1"),
        ("debug.vulkan.layer.5", "VK_LAYER_five"),
        ("debug.vulkan.layer.0", "VK_LAYER_zero"),
        ("debug.vulkan.layer.bad", "VK_LAYER_bad"),
    ]);

    let names: Vec<String> = implicit_layers(&p).into_iter().map(|l| l.name).collect();
    assert_eq!(
        names,
        vec!["VK_LAYER_list0", "VK_LAYER_list1", "VK_LAYER_zero", "VK_LAYER_five"]
    );
}

#[test]
fn test_bool_properties() {
    let p = props(&[
        ("test.droidvk.on", "true"),
        ("test.droidvk.one", "1"),
        ("test.droidvk.off", "no"),
        ("test.droidvk.junk", "maybe"),
    ]);
    assert!(p.get_bool("test.droidvk.on", false));
    assert!(p.get_bool("test.droidvk.one", false));
    assert!(!p.get_bool("test.droidvk.off", true));
    assert!(p.get_bool("test.droidvk.junk", true));
    assert!(!p.get_bool("test.droidvk.missing", false));
}

#[test]
fn test_env_key() {
    assert_eq!(env_key("debug.vulkan.layers"), "DEBUG_VULKAN_LAYERS");
    assert_eq!(env_key("debug.vulkan.layer.3"), "DEBUG_VULKAN_LAYER_3");
}
