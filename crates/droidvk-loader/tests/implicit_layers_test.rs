//! Integration test: layers and the debug callback forced on by properties.
//!
//! `debug.vulkan.layers` lists beta and a layer that does not exist;
//! `debug.vulkan.layer.1` adds alpha after them.

mod common;

use ash::vk;
use vulkan::dispatch::get_data;

use common::driver::DRIVER_DEVICE_EXTENSION;
use common::layer::{ALPHA, ALPHA_DEVICE_EXTENSION, ALPHA_INSTANCE_EXTENSION, BETA, BETA_INSTANCE_EXTENSION};

const PROPERTIES: &[(&str, &str)] = &[
    ("debug.vulkan.layers", "VK_LAYER_TEST_beta:VK_LAYER_TEST_missing"),
    ("debug.vulkan.layer.1", "VK_LAYER_TEST_alpha"),
    ("debug.vulkan.enable_callback", "true"),
];

fn events(list: &[&str]) -> Vec<String> {
    list.iter().map(|event| event.to_string()).collect()
}

#[test]
fn test_implicit_layers_wrap_every_instance() {
    let _guard = common::setup_with(PROPERTIES);

    let (instance, logs) = common::capture_logs(|| common::create_instance(&[], &[]));
    assert!(logs.contains("Ignored missing implicit layer VK_LAYER_TEST_missing"));
    assert_eq!(
        common::take_events(),
        events(&["beta:vkCreateInstance", "alpha:vkCreateInstance", "driver:vkCreateInstance"])
    );
    assert_eq!(
        unsafe { vulkan::chain::instance_layer_names(instance) },
        vec![BETA.to_owned(), ALPHA.to_owned()]
    );
    let data = unsafe { get_data(instance) };
    assert!(data.active_layers().iter().all(|layer| layer.is_implicit()));

    common::destroy_instance(instance);
}

#[test]
fn test_explicit_request_of_implicit_layer() {
    let _guard = common::setup_with(PROPERTIES);

    let (instance, logs) = common::capture_logs(|| common::create_instance(&[ALPHA], &[]));
    assert!(!logs.contains("Ignored duplicated layer"));
    assert_eq!(
        common::take_events(),
        events(&["beta:vkCreateInstance", "alpha:vkCreateInstance", "driver:vkCreateInstance"])
    );

    common::destroy_instance(instance);
}

#[test]
fn test_logging_debug_callback_installed() {
    let _guard = common::setup_with(PROPERTIES);

    let (instance, logs) = common::capture_logs(|| common::create_instance(&[], &[]));
    assert!(logs.contains("Installed debug report callback"));
    assert_eq!(unsafe { get_data(instance) }.debug_report_callbacks.len(), 1);
    // The application never asked for the extension; the driver never sees it.
    assert!(common::driver::state().instance_extensions.is_empty());

    let message: vk::PFN_vkDebugReportMessageEXT =
        match unsafe { common::instance_proc(instance, c"vkDebugReportMessageEXT") } {
            Some(proc) => proc,
            None => panic!("expected vkDebugReportMessageEXT"),
        };
    let ((), logs) = common::capture_logs(|| unsafe {
        message(
            instance,
            vk::DebugReportFlagsEXT::ERROR,
            vk::DebugReportObjectTypeEXT::UNKNOWN,
            0,
            0,
            7,
            c"test".as_ptr(),
            c"boom".as_ptr(),
        )
    });
    assert!(logs.contains("[test] Code 7 : boom"));

    let ((), logs) = common::capture_logs(|| common::destroy_instance(instance));
    assert!(!logs.contains("debug report callbacks alive"));
}

#[test]
fn test_instance_extensions_include_implicit_layers() {
    let _guard = common::setup_with(PROPERTIES);

    let names = match common::instance_extension_names(None) {
        Ok(names) => names,
        other => panic!("expected extension list, got {:?}", other),
    };
    let tail: Vec<&str> = names[names.len() - 2..].iter().map(String::as_str).collect();
    assert_eq!(
        tail,
        vec![
            BETA_INSTANCE_EXTENSION.to_str().unwrap_or_default(),
            ALPHA_INSTANCE_EXTENSION.to_str().unwrap_or_default()
        ]
    );

    // Forced layers make their extensions requestable without naming them.
    let instance = common::create_instance(&[], &[ALPHA_INSTANCE_EXTENSION]);
    common::destroy_instance(instance);
}

#[test]
fn test_implicit_layers_wrap_every_device() {
    let _guard = common::setup_with(PROPERTIES);
    let instance = common::create_instance(&[], &[]);
    let physical_device = common::physical_devices(instance)[0];
    common::take_events();

    let device = common::create_device(physical_device, &[], &[]);
    assert_eq!(
        common::take_events(),
        events(&["beta:vkCreateDevice", "alpha:vkCreateDevice", "driver:vkCreateDevice"])
    );

    let names = match common::device_extension_names(physical_device, None) {
        Ok(names) => names,
        other => panic!("expected extension list, got {:?}", other),
    };
    assert_eq!(
        names,
        vec![
            "VK_KHR_swapchain".to_string(),
            DRIVER_DEVICE_EXTENSION.to_string_lossy().into_owned(),
            ALPHA_DEVICE_EXTENSION.to_string_lossy().into_owned()
        ]
    );

    common::destroy_device(device);
    assert_eq!(
        common::take_events(),
        events(&["beta:vkDestroyDevice", "alpha:vkDestroyDevice", "driver:vkDestroyDevice"])
    );
    common::destroy_instance(instance);
}
