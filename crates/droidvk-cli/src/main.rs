use std::ffi::CStr;

use anyhow::Context;
use ash::vk;
use clap::{Parser, Subcommand};
use tracing::info;

use droidvk_core::config::{default_config_path, LoaderConfig};
use vulkan::extensions::{enumerate_into_vec, name_of};
use vulkan::LoaderContext;

#[derive(Parser)]
#[command(name = "droidvk")]
#[command(about = "droidvk - inspect what the Vulkan loader sees")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered instance layers and their extensions
    Layers,

    /// List instance extensions offered through the loader
    Extensions {
        /// Only the extensions of this layer
        #[arg(short, long)]
        layer: Option<String>,
    },

    /// Create an instance and list its physical devices
    Devices,

    /// Print the effective loader configuration
    Config,
}

fn check(command: &str, result: Result<Vec<vk::ExtensionProperties>, vk::Result>) -> anyhow::Result<Vec<vk::ExtensionProperties>> {
    result.map_err(|e| anyhow::anyhow!("{} failed: {:?}", command, e))
}

fn version(v: u32) -> String {
    format!(
        "{}.{}.{}",
        vk::api_version_major(v),
        vk::api_version_minor(v),
        vk::api_version_patch(v)
    )
}

fn instance_extensions(layer: Option<&CStr>) -> anyhow::Result<Vec<vk::ExtensionProperties>> {
    let p_layer = layer.map_or(std::ptr::null(), CStr::as_ptr);
    check(
        "vkEnumerateInstanceExtensionProperties",
        enumerate_into_vec(|count, props| unsafe {
            vulkan::entry::vkEnumerateInstanceExtensionProperties(p_layer, count, props)
        }),
    )
}

fn print_extensions(extensions: &[vk::ExtensionProperties], indent: &str) {
    for ext in extensions {
        println!("{}{} (v{})", indent, name_of(&ext.extension_name).to_string_lossy(), ext.spec_version);
    }
}

fn list_layers() -> anyhow::Result<()> {
    let layers = enumerate_into_vec(|count, props| unsafe {
        vulkan::entry::vkEnumerateInstanceLayerProperties(count, props)
    })
    .map_err(|e| anyhow::anyhow!("vkEnumerateInstanceLayerProperties failed: {:?}", e))?;

    if layers.is_empty() {
        println!("No layers found");
        return Ok(());
    }
    for layer in &layers {
        let name = name_of(&layer.layer_name);
        println!(
            "{} (spec {}, impl {})",
            name.to_string_lossy(),
            version(layer.spec_version),
            layer.implementation_version
        );
        println!("    {}", name_of(&layer.description).to_string_lossy());
        print_extensions(&instance_extensions(Some(name))?, "    ");
    }
    Ok(())
}

fn list_extensions(layer: Option<String>) -> anyhow::Result<()> {
    let layer = layer
        .map(std::ffi::CString::new)
        .transpose()
        .context("layer name contains a NUL byte")?;
    print_extensions(&instance_extensions(layer.as_deref())?, "");
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    let app_info = vk::ApplicationInfo::default()
        .application_name(c"droidvk")
        .api_version(vk::API_VERSION_1_0);
    let create_info = vk::InstanceCreateInfo::default().application_info(&app_info);

    let mut instance = vk::Instance::null();
    let result = unsafe { vulkan::vkCreateInstance(&create_info, std::ptr::null(), &mut instance) };
    if result != vk::Result::SUCCESS {
        anyhow::bail!("vkCreateInstance failed: {:?}", result);
    }

    let devices = enumerate_into_vec(|count, devices| unsafe {
        vulkan::api_table::vkEnumeratePhysicalDevices(instance, count, devices)
    });
    let printed = match devices {
        Ok(devices) => {
            if devices.is_empty() {
                println!("No physical devices");
            }
            for (i, device) in devices.iter().enumerate() {
                let mut props = vk::PhysicalDeviceProperties::default();
                unsafe { vulkan::api_table::vkGetPhysicalDeviceProperties(*device, &mut props) };
                println!(
                    "GPU {}: {} ({:?}) {}/{} [{:04x}:{:04x}]",
                    i,
                    name_of(&props.device_name).to_string_lossy(),
                    props.device_type,
                    version(props.api_version),
                    props.driver_version,
                    props.vendor_id,
                    props.device_id
                );
            }
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("vkEnumeratePhysicalDevices failed: {:?}", e)),
    };

    unsafe { vulkan::entry::vkDestroyInstance(instance, std::ptr::null()) };
    printed
}

fn main() -> anyhow::Result<()> {
    droidvk_common::init_logging();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = LoaderConfig::load_or_default(&config_path);
    info!("using loader configuration {}", config_path);

    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    vulkan::configure(LoaderContext::new(config, droidvk_common::platform::is_dumpable()));
    if vulkan::ensure_initialized().is_none() {
        anyhow::bail!("Vulkan loader initialization failed");
    }
    info!("Vulkan HAL: {:?}", vulkan::hal::get().map(|hal| hal.kind()));

    match cli.command {
        Commands::Layers => list_layers()?,
        Commands::Extensions { layer } => list_extensions(layer)?,
        Commands::Devices => list_devices()?,
        Commands::Config => {}
    }

    Ok(())
}
