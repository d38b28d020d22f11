//! Application-facing dispatch tables and the exported trampolines.
//!
//! Both tables are generated by [`dispatch_table!`] from one command list.
//! Each entry is tagged:
//!
//! * `required`: a missing entry fails table initialization;
//! * `core`: an optional core command, stubbed when the chain lacks it;
//! * `ext(E)`: resolved only when `E` is enabled, stubbed otherwise.
//!
//! and `export` (a `#[no_mangle]` trampoline is emitted), `intercept` (the
//! loader exports its own implementation from `entry`) or `hidden` (reachable
//! through the proc-address queries only).

use std::ffi::{c_char, c_void, CStr};

use ash::vk;
use droidvk_core::LoaderError;
use tracing::error;

use crate::extensions::ExtensionSet;

/// Value a disabled stub hands back to the caller.
pub trait StubReturn {
    fn stub_return() -> Self;
}

impl StubReturn for () {
    fn stub_return() -> Self {}
}

impl StubReturn for vk::Result {
    fn stub_return() -> Self {
        vk::Result::SUCCESS
    }
}

macro_rules! entry_extension {
    (ext($ext:ident)) => {
        Some($crate::extensions::Extension::$ext)
    };
    ($kind:ident) => {
        None
    };
}

macro_rules! entry_required {
    (required) => {
        true
    };
    ($kind:ident $($ext:tt)*) => {
        false
    };
}

macro_rules! trampoline_fn {
    (export, $table:ident, $vk_name:ident, $field:ident, ($first:ident: $first_ty:ty $(, $arg:ident: $arg_ty:ty)*) $(-> $ret:ty)?) => {
        #[no_mangle]
        #[allow(non_snake_case, clippy::too_many_arguments)]
        pub unsafe extern "system" fn $vk_name($first: $first_ty $(, $arg: $arg_ty)*) $(-> $ret)? {
            unsafe { ((*$crate::dispatch::table_of::<_, $table>($first)).$field)($first $(, $arg)*) }
        }
    };
    ($other:ident, $($rest:tt)*) => {};
}

macro_rules! trampoline_proc {
    (export, $vk_name:ident) => {
        Some(unsafe { std::mem::transmute($vk_name as *const ()) })
    };
    ($other:ident, $vk_name:ident) => {
        None
    };
}

macro_rules! dispatch_table {
    (
        $(#[$meta:meta])*
        pub struct $table:ident($scope:literal) {
            $(
                [$kind:ident $(($ext:ident))?, $export:ident]
                $vk_name:ident => $field:ident($first:ident: $first_ty:ty $(, $arg:ident: $arg_ty:ty)*) $(-> $ret:ty)?;
            )*
        }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Clone, Copy)]
        pub struct $table {
            $( pub $field: unsafe extern "system" fn($first_ty $(, $arg_ty)*) $(-> $ret)?, )*
        }

        impl $table {
            /// Every command in the table, in field order.
            pub const NAMES: &'static [&'static str] = &[$(stringify!($vk_name)),*];

            fn build(
                resolve: &dyn Fn(&CStr) -> vk::PFN_vkVoidFunction,
                extensions: ExtensionSet,
            ) -> (Self, Vec<&'static str>) {
                let mut missing = Vec::new();
                let table = Self {
                    $(
                        $field: {
                            type Pfn = unsafe extern "system" fn($first_ty $(, $arg_ty)*) $(-> $ret)?;

                            #[allow(unused_variables, clippy::too_many_arguments)]
                            unsafe extern "system" fn stub($first: $first_ty $(, $arg: $arg_ty)*) $(-> $ret)? {
                                unsafe {
                                    $crate::dispatch::report_stub(
                                        $first,
                                        stringify!($vk_name),
                                        entry_extension!($kind $(($ext))?),
                                    )
                                };
                                StubReturn::stub_return()
                            }

                            let enabled = match entry_extension!($kind $(($ext))?) {
                                Some(ext) => extensions.contains(ext),
                                None => true,
                            };
                            let name = concat!(stringify!($vk_name), "\0");
                            let proc = if enabled {
                                resolve(unsafe { CStr::from_bytes_with_nul_unchecked(name.as_bytes()) })
                            } else {
                                None
                            };
                            match proc {
                                Some(proc) => unsafe { $crate::dispatch::cast_proc::<Pfn>(proc) },
                                None => {
                                    if entry_required!($kind $(($ext))?) {
                                        error!("missing {} proc: {}", $scope, stringify!($vk_name));
                                        missing.push(stringify!($vk_name));
                                    }
                                    stub as Pfn
                                }
                            }
                        },
                    )*
                };
                (table, missing)
            }

            /// Fill the table through `resolve`, typically the chain head's
            /// proc-address query.
            pub fn init(
                resolve: impl Fn(&CStr) -> vk::PFN_vkVoidFunction,
                extensions: ExtensionSet,
            ) -> Result<Self, LoaderError> {
                let (table, missing) = Self::build(&resolve, extensions);
                if missing.is_empty() {
                    Ok(table)
                } else {
                    Err(LoaderError::InitializationFailed(format!(
                        "missing {} procs: {}",
                        $scope,
                        missing.join(", ")
                    )))
                }
            }

            /// A table whose every slot is a disabled stub.
            pub fn stubbed() -> Self {
                Self::build(&|_| None, ExtensionSet::empty()).0
            }

            /// The slot for `name`, if the table has one.
            pub fn get(&self, name: &str) -> vk::PFN_vkVoidFunction {
                match name {
                    $( stringify!($vk_name) => Some(unsafe { std::mem::transmute(self.$field) }), )*
                    _ => None,
                }
            }

            /// The exported trampoline for `name`, if the loader exports one.
            pub fn trampoline(name: &str) -> vk::PFN_vkVoidFunction {
                match name {
                    $( stringify!($vk_name) => trampoline_proc!($export, $vk_name), )*
                    _ => None,
                }
            }
        }

        $(
            trampoline_fn!($export, $table, $vk_name, $field, ($first: $first_ty $(, $arg: $arg_ty)*) $(-> $ret)?);
        )*
    };
}

dispatch_table! {
    /// Instance and physical-device commands.
    pub struct InstanceTable("instance") {
        [required, intercept] vkDestroyInstance => destroy_instance(instance: vk::Instance, p_allocator: *const vk::AllocationCallbacks<'_>);
        [required, export] vkEnumeratePhysicalDevices => enumerate_physical_devices(instance: vk::Instance, p_physical_device_count: *mut u32, p_physical_devices: *mut vk::PhysicalDevice) -> vk::Result;
        [core, export] vkGetPhysicalDeviceFeatures => get_physical_device_features(physical_device: vk::PhysicalDevice, p_features: *mut vk::PhysicalDeviceFeatures);
        [core, export] vkGetPhysicalDeviceFormatProperties => get_physical_device_format_properties(physical_device: vk::PhysicalDevice, format: vk::Format, p_format_properties: *mut vk::FormatProperties);
        [core, export] vkGetPhysicalDeviceImageFormatProperties => get_physical_device_image_format_properties(physical_device: vk::PhysicalDevice, format: vk::Format, ty: vk::ImageType, tiling: vk::ImageTiling, usage: vk::ImageUsageFlags, flags: vk::ImageCreateFlags, p_image_format_properties: *mut vk::ImageFormatProperties) -> vk::Result;
        [core, export] vkGetPhysicalDeviceProperties => get_physical_device_properties(physical_device: vk::PhysicalDevice, p_properties: *mut vk::PhysicalDeviceProperties);
        [core, export] vkGetPhysicalDeviceQueueFamilyProperties => get_physical_device_queue_family_properties(physical_device: vk::PhysicalDevice, p_queue_family_property_count: *mut u32, p_queue_family_properties: *mut vk::QueueFamilyProperties);
        [core, export] vkGetPhysicalDeviceMemoryProperties => get_physical_device_memory_properties(physical_device: vk::PhysicalDevice, p_memory_properties: *mut vk::PhysicalDeviceMemoryProperties);
        [required, intercept] vkCreateDevice => create_device(physical_device: vk::PhysicalDevice, p_create_info: *const vk::DeviceCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_device: *mut vk::Device) -> vk::Result;
        [core, intercept] vkEnumerateDeviceExtensionProperties => enumerate_device_extension_properties(physical_device: vk::PhysicalDevice, p_layer_name: *const c_char, p_property_count: *mut u32, p_properties: *mut vk::ExtensionProperties) -> vk::Result;
        [core, export] vkGetPhysicalDeviceSparseImageFormatProperties => get_physical_device_sparse_image_format_properties(physical_device: vk::PhysicalDevice, format: vk::Format, ty: vk::ImageType, samples: vk::SampleCountFlags, usage: vk::ImageUsageFlags, tiling: vk::ImageTiling, p_property_count: *mut u32, p_properties: *mut vk::SparseImageFormatProperties);
        [ext(KhrSurface), export] vkDestroySurfaceKHR => destroy_surface_khr(instance: vk::Instance, surface: vk::SurfaceKHR, p_allocator: *const vk::AllocationCallbacks<'_>);
        [ext(KhrSurface), export] vkGetPhysicalDeviceSurfaceSupportKHR => get_physical_device_surface_support_khr(physical_device: vk::PhysicalDevice, queue_family_index: u32, surface: vk::SurfaceKHR, p_supported: *mut vk::Bool32) -> vk::Result;
        [ext(KhrSurface), export] vkGetPhysicalDeviceSurfaceCapabilitiesKHR => get_physical_device_surface_capabilities_khr(physical_device: vk::PhysicalDevice, surface: vk::SurfaceKHR, p_surface_capabilities: *mut vk::SurfaceCapabilitiesKHR) -> vk::Result;
        [ext(KhrSurface), export] vkGetPhysicalDeviceSurfaceFormatsKHR => get_physical_device_surface_formats_khr(physical_device: vk::PhysicalDevice, surface: vk::SurfaceKHR, p_surface_format_count: *mut u32, p_surface_formats: *mut vk::SurfaceFormatKHR) -> vk::Result;
        [ext(KhrSurface), export] vkGetPhysicalDeviceSurfacePresentModesKHR => get_physical_device_surface_present_modes_khr(physical_device: vk::PhysicalDevice, surface: vk::SurfaceKHR, p_present_mode_count: *mut u32, p_present_modes: *mut vk::PresentModeKHR) -> vk::Result;
        [ext(KhrAndroidSurface), export] vkCreateAndroidSurfaceKHR => create_android_surface_khr(instance: vk::Instance, p_create_info: *const vk::AndroidSurfaceCreateInfoKHR<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_surface: *mut vk::SurfaceKHR) -> vk::Result;
        [ext(ExtDebugReport), hidden] vkCreateDebugReportCallbackEXT => create_debug_report_callback_ext(instance: vk::Instance, p_create_info: *const vk::DebugReportCallbackCreateInfoEXT<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_callback: *mut vk::DebugReportCallbackEXT) -> vk::Result;
        [ext(ExtDebugReport), hidden] vkDestroyDebugReportCallbackEXT => destroy_debug_report_callback_ext(instance: vk::Instance, callback: vk::DebugReportCallbackEXT, p_allocator: *const vk::AllocationCallbacks<'_>);
        [ext(ExtDebugReport), hidden] vkDebugReportMessageEXT => debug_report_message_ext(instance: vk::Instance, flags: vk::DebugReportFlagsEXT, object_type: vk::DebugReportObjectTypeEXT, object: u64, location: usize, message_code: i32, p_layer_prefix: *const c_char, p_message: *const c_char);
    }
}

dispatch_table! {
    /// Device, queue and command-buffer commands.
    pub struct DeviceTable("device") {
        [required, intercept] vkDestroyDevice => destroy_device(device: vk::Device, p_allocator: *const vk::AllocationCallbacks<'_>);
        [required, export] vkGetDeviceQueue => get_device_queue(device: vk::Device, queue_family_index: u32, queue_index: u32, p_queue: *mut vk::Queue);
        [core, export] vkQueueSubmit => queue_submit(queue: vk::Queue, submit_count: u32, p_submits: *const vk::SubmitInfo<'_>, fence: vk::Fence) -> vk::Result;
        [core, export] vkQueueWaitIdle => queue_wait_idle(queue: vk::Queue) -> vk::Result;
        [core, export] vkDeviceWaitIdle => device_wait_idle(device: vk::Device) -> vk::Result;
        [core, export] vkAllocateMemory => allocate_memory(device: vk::Device, p_allocate_info: *const vk::MemoryAllocateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_memory: *mut vk::DeviceMemory) -> vk::Result;
        [core, export] vkFreeMemory => free_memory(device: vk::Device, memory: vk::DeviceMemory, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkMapMemory => map_memory(device: vk::Device, memory: vk::DeviceMemory, offset: vk::DeviceSize, size: vk::DeviceSize, flags: vk::MemoryMapFlags, pp_data: *mut *mut c_void) -> vk::Result;
        [core, export] vkUnmapMemory => unmap_memory(device: vk::Device, memory: vk::DeviceMemory);
        [core, export] vkFlushMappedMemoryRanges => flush_mapped_memory_ranges(device: vk::Device, memory_range_count: u32, p_memory_ranges: *const vk::MappedMemoryRange<'_>) -> vk::Result;
        [core, export] vkInvalidateMappedMemoryRanges => invalidate_mapped_memory_ranges(device: vk::Device, memory_range_count: u32, p_memory_ranges: *const vk::MappedMemoryRange<'_>) -> vk::Result;
        [core, export] vkGetDeviceMemoryCommitment => get_device_memory_commitment(device: vk::Device, memory: vk::DeviceMemory, p_committed_memory_in_bytes: *mut vk::DeviceSize);
        [core, export] vkBindBufferMemory => bind_buffer_memory(device: vk::Device, buffer: vk::Buffer, memory: vk::DeviceMemory, memory_offset: vk::DeviceSize) -> vk::Result;
        [core, export] vkBindImageMemory => bind_image_memory(device: vk::Device, image: vk::Image, memory: vk::DeviceMemory, memory_offset: vk::DeviceSize) -> vk::Result;
        [core, export] vkGetBufferMemoryRequirements => get_buffer_memory_requirements(device: vk::Device, buffer: vk::Buffer, p_memory_requirements: *mut vk::MemoryRequirements);
        [core, export] vkGetImageMemoryRequirements => get_image_memory_requirements(device: vk::Device, image: vk::Image, p_memory_requirements: *mut vk::MemoryRequirements);
        [core, export] vkGetImageSparseMemoryRequirements => get_image_sparse_memory_requirements(device: vk::Device, image: vk::Image, p_sparse_memory_requirement_count: *mut u32, p_sparse_memory_requirements: *mut vk::SparseImageMemoryRequirements);
        [core, export] vkQueueBindSparse => queue_bind_sparse(queue: vk::Queue, bind_info_count: u32, p_bind_info: *const vk::BindSparseInfo<'_>, fence: vk::Fence) -> vk::Result;
        [core, export] vkCreateFence => create_fence(device: vk::Device, p_create_info: *const vk::FenceCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_fence: *mut vk::Fence) -> vk::Result;
        [core, export] vkDestroyFence => destroy_fence(device: vk::Device, fence: vk::Fence, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkResetFences => reset_fences(device: vk::Device, fence_count: u32, p_fences: *const vk::Fence) -> vk::Result;
        [core, export] vkGetFenceStatus => get_fence_status(device: vk::Device, fence: vk::Fence) -> vk::Result;
        [core, export] vkWaitForFences => wait_for_fences(device: vk::Device, fence_count: u32, p_fences: *const vk::Fence, wait_all: vk::Bool32, timeout: u64) -> vk::Result;
        [core, export] vkCreateSemaphore => create_semaphore(device: vk::Device, p_create_info: *const vk::SemaphoreCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_semaphore: *mut vk::Semaphore) -> vk::Result;
        [core, export] vkDestroySemaphore => destroy_semaphore(device: vk::Device, semaphore: vk::Semaphore, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkCreateEvent => create_event(device: vk::Device, p_create_info: *const vk::EventCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_event: *mut vk::Event) -> vk::Result;
        [core, export] vkDestroyEvent => destroy_event(device: vk::Device, event: vk::Event, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkGetEventStatus => get_event_status(device: vk::Device, event: vk::Event) -> vk::Result;
        [core, export] vkSetEvent => set_event(device: vk::Device, event: vk::Event) -> vk::Result;
        [core, export] vkResetEvent => reset_event(device: vk::Device, event: vk::Event) -> vk::Result;
        [core, export] vkCreateQueryPool => create_query_pool(device: vk::Device, p_create_info: *const vk::QueryPoolCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_query_pool: *mut vk::QueryPool) -> vk::Result;
        [core, export] vkDestroyQueryPool => destroy_query_pool(device: vk::Device, query_pool: vk::QueryPool, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkGetQueryPoolResults => get_query_pool_results(device: vk::Device, query_pool: vk::QueryPool, first_query: u32, query_count: u32, data_size: usize, p_data: *mut c_void, stride: vk::DeviceSize, flags: vk::QueryResultFlags) -> vk::Result;
        [core, export] vkCreateBuffer => create_buffer(device: vk::Device, p_create_info: *const vk::BufferCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_buffer: *mut vk::Buffer) -> vk::Result;
        [core, export] vkDestroyBuffer => destroy_buffer(device: vk::Device, buffer: vk::Buffer, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkCreateBufferView => create_buffer_view(device: vk::Device, p_create_info: *const vk::BufferViewCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_view: *mut vk::BufferView) -> vk::Result;
        [core, export] vkDestroyBufferView => destroy_buffer_view(device: vk::Device, buffer_view: vk::BufferView, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkCreateImage => create_image(device: vk::Device, p_create_info: *const vk::ImageCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_image: *mut vk::Image) -> vk::Result;
        [core, export] vkDestroyImage => destroy_image(device: vk::Device, image: vk::Image, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkGetImageSubresourceLayout => get_image_subresource_layout(device: vk::Device, image: vk::Image, p_subresource: *const vk::ImageSubresource, p_layout: *mut vk::SubresourceLayout);
        [core, export] vkCreateImageView => create_image_view(device: vk::Device, p_create_info: *const vk::ImageViewCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_view: *mut vk::ImageView) -> vk::Result;
        [core, export] vkDestroyImageView => destroy_image_view(device: vk::Device, image_view: vk::ImageView, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkCreateShaderModule => create_shader_module(device: vk::Device, p_create_info: *const vk::ShaderModuleCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_shader_module: *mut vk::ShaderModule) -> vk::Result;
        [core, export] vkDestroyShaderModule => destroy_shader_module(device: vk::Device, shader_module: vk::ShaderModule, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkCreatePipelineCache => create_pipeline_cache(device: vk::Device, p_create_info: *const vk::PipelineCacheCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_pipeline_cache: *mut vk::PipelineCache) -> vk::Result;
        [core, export] vkDestroyPipelineCache => destroy_pipeline_cache(device: vk::Device, pipeline_cache: vk::PipelineCache, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkGetPipelineCacheData => get_pipeline_cache_data(device: vk::Device, pipeline_cache: vk::PipelineCache, p_data_size: *mut usize, p_data: *mut c_void) -> vk::Result;
        [core, export] vkMergePipelineCaches => merge_pipeline_caches(device: vk::Device, dst_cache: vk::PipelineCache, src_cache_count: u32, p_src_caches: *const vk::PipelineCache) -> vk::Result;
        [core, export] vkCreateGraphicsPipelines => create_graphics_pipelines(device: vk::Device, pipeline_cache: vk::PipelineCache, create_info_count: u32, p_create_infos: *const vk::GraphicsPipelineCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_pipelines: *mut vk::Pipeline) -> vk::Result;
        [core, export] vkCreateComputePipelines => create_compute_pipelines(device: vk::Device, pipeline_cache: vk::PipelineCache, create_info_count: u32, p_create_infos: *const vk::ComputePipelineCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_pipelines: *mut vk::Pipeline) -> vk::Result;
        [core, export] vkDestroyPipeline => destroy_pipeline(device: vk::Device, pipeline: vk::Pipeline, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkCreatePipelineLayout => create_pipeline_layout(device: vk::Device, p_create_info: *const vk::PipelineLayoutCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_pipeline_layout: *mut vk::PipelineLayout) -> vk::Result;
        [core, export] vkDestroyPipelineLayout => destroy_pipeline_layout(device: vk::Device, pipeline_layout: vk::PipelineLayout, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkCreateSampler => create_sampler(device: vk::Device, p_create_info: *const vk::SamplerCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_sampler: *mut vk::Sampler) -> vk::Result;
        [core, export] vkDestroySampler => destroy_sampler(device: vk::Device, sampler: vk::Sampler, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkCreateDescriptorSetLayout => create_descriptor_set_layout(device: vk::Device, p_create_info: *const vk::DescriptorSetLayoutCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_set_layout: *mut vk::DescriptorSetLayout) -> vk::Result;
        [core, export] vkDestroyDescriptorSetLayout => destroy_descriptor_set_layout(device: vk::Device, descriptor_set_layout: vk::DescriptorSetLayout, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkCreateDescriptorPool => create_descriptor_pool(device: vk::Device, p_create_info: *const vk::DescriptorPoolCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_descriptor_pool: *mut vk::DescriptorPool) -> vk::Result;
        [core, export] vkDestroyDescriptorPool => destroy_descriptor_pool(device: vk::Device, descriptor_pool: vk::DescriptorPool, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkResetDescriptorPool => reset_descriptor_pool(device: vk::Device, descriptor_pool: vk::DescriptorPool, flags: vk::DescriptorPoolResetFlags) -> vk::Result;
        [core, export] vkAllocateDescriptorSets => allocate_descriptor_sets(device: vk::Device, p_allocate_info: *const vk::DescriptorSetAllocateInfo<'_>, p_descriptor_sets: *mut vk::DescriptorSet) -> vk::Result;
        [core, export] vkFreeDescriptorSets => free_descriptor_sets(device: vk::Device, descriptor_pool: vk::DescriptorPool, descriptor_set_count: u32, p_descriptor_sets: *const vk::DescriptorSet) -> vk::Result;
        [core, export] vkUpdateDescriptorSets => update_descriptor_sets(device: vk::Device, descriptor_write_count: u32, p_descriptor_writes: *const vk::WriteDescriptorSet<'_>, descriptor_copy_count: u32, p_descriptor_copies: *const vk::CopyDescriptorSet<'_>);
        [core, export] vkCreateFramebuffer => create_framebuffer(device: vk::Device, p_create_info: *const vk::FramebufferCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_framebuffer: *mut vk::Framebuffer) -> vk::Result;
        [core, export] vkDestroyFramebuffer => destroy_framebuffer(device: vk::Device, framebuffer: vk::Framebuffer, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkCreateRenderPass => create_render_pass(device: vk::Device, p_create_info: *const vk::RenderPassCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_render_pass: *mut vk::RenderPass) -> vk::Result;
        [core, export] vkDestroyRenderPass => destroy_render_pass(device: vk::Device, render_pass: vk::RenderPass, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkGetRenderAreaGranularity => get_render_area_granularity(device: vk::Device, render_pass: vk::RenderPass, p_granularity: *mut vk::Extent2D);
        [core, export] vkCreateCommandPool => create_command_pool(device: vk::Device, p_create_info: *const vk::CommandPoolCreateInfo<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_command_pool: *mut vk::CommandPool) -> vk::Result;
        [core, export] vkDestroyCommandPool => destroy_command_pool(device: vk::Device, command_pool: vk::CommandPool, p_allocator: *const vk::AllocationCallbacks<'_>);
        [core, export] vkResetCommandPool => reset_command_pool(device: vk::Device, command_pool: vk::CommandPool, flags: vk::CommandPoolResetFlags) -> vk::Result;
        [required, export] vkAllocateCommandBuffers => allocate_command_buffers(device: vk::Device, p_allocate_info: *const vk::CommandBufferAllocateInfo<'_>, p_command_buffers: *mut vk::CommandBuffer) -> vk::Result;
        [core, export] vkFreeCommandBuffers => free_command_buffers(device: vk::Device, command_pool: vk::CommandPool, command_buffer_count: u32, p_command_buffers: *const vk::CommandBuffer);
        [core, export] vkBeginCommandBuffer => begin_command_buffer(command_buffer: vk::CommandBuffer, p_begin_info: *const vk::CommandBufferBeginInfo<'_>) -> vk::Result;
        [core, export] vkEndCommandBuffer => end_command_buffer(command_buffer: vk::CommandBuffer) -> vk::Result;
        [core, export] vkResetCommandBuffer => reset_command_buffer(command_buffer: vk::CommandBuffer, flags: vk::CommandBufferResetFlags) -> vk::Result;
        [core, export] vkCmdBindPipeline => cmd_bind_pipeline(command_buffer: vk::CommandBuffer, pipeline_bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);
        [core, export] vkCmdSetViewport => cmd_set_viewport(command_buffer: vk::CommandBuffer, first_viewport: u32, viewport_count: u32, p_viewports: *const vk::Viewport);
        [core, export] vkCmdSetScissor => cmd_set_scissor(command_buffer: vk::CommandBuffer, first_scissor: u32, scissor_count: u32, p_scissors: *const vk::Rect2D);
        [core, export] vkCmdSetLineWidth => cmd_set_line_width(command_buffer: vk::CommandBuffer, line_width: f32);
        [core, export] vkCmdSetDepthBias => cmd_set_depth_bias(command_buffer: vk::CommandBuffer, depth_bias_constant_factor: f32, depth_bias_clamp: f32, depth_bias_slope_factor: f32);
        [core, export] vkCmdSetBlendConstants => cmd_set_blend_constants(command_buffer: vk::CommandBuffer, blend_constants: *const [f32; 4]);
        [core, export] vkCmdSetDepthBounds => cmd_set_depth_bounds(command_buffer: vk::CommandBuffer, min_depth_bounds: f32, max_depth_bounds: f32);
        [core, export] vkCmdSetStencilCompareMask => cmd_set_stencil_compare_mask(command_buffer: vk::CommandBuffer, face_mask: vk::StencilFaceFlags, compare_mask: u32);
        [core, export] vkCmdSetStencilWriteMask => cmd_set_stencil_write_mask(command_buffer: vk::CommandBuffer, face_mask: vk::StencilFaceFlags, write_mask: u32);
        [core, export] vkCmdSetStencilReference => cmd_set_stencil_reference(command_buffer: vk::CommandBuffer, face_mask: vk::StencilFaceFlags, reference: u32);
        [core, export] vkCmdBindDescriptorSets => cmd_bind_descriptor_sets(command_buffer: vk::CommandBuffer, pipeline_bind_point: vk::PipelineBindPoint, layout: vk::PipelineLayout, first_set: u32, descriptor_set_count: u32, p_descriptor_sets: *const vk::DescriptorSet, dynamic_offset_count: u32, p_dynamic_offsets: *const u32);
        [core, export] vkCmdBindIndexBuffer => cmd_bind_index_buffer(command_buffer: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType);
        [core, export] vkCmdBindVertexBuffers => cmd_bind_vertex_buffers(command_buffer: vk::CommandBuffer, first_binding: u32, binding_count: u32, p_buffers: *const vk::Buffer, p_offsets: *const vk::DeviceSize);
        [core, export] vkCmdDraw => cmd_draw(command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
        [core, export] vkCmdDrawIndexed => cmd_draw_indexed(command_buffer: vk::CommandBuffer, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32);
        [core, export] vkCmdDrawIndirect => cmd_draw_indirect(command_buffer: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize, draw_count: u32, stride: u32);
        [core, export] vkCmdDrawIndexedIndirect => cmd_draw_indexed_indirect(command_buffer: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize, draw_count: u32, stride: u32);
        [core, export] vkCmdDispatch => cmd_dispatch(command_buffer: vk::CommandBuffer, group_count_x: u32, group_count_y: u32, group_count_z: u32);
        [core, export] vkCmdDispatchIndirect => cmd_dispatch_indirect(command_buffer: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize);
        [core, export] vkCmdCopyBuffer => cmd_copy_buffer(command_buffer: vk::CommandBuffer, src_buffer: vk::Buffer, dst_buffer: vk::Buffer, region_count: u32, p_regions: *const vk::BufferCopy);
        [core, export] vkCmdCopyImage => cmd_copy_image(command_buffer: vk::CommandBuffer, src_image: vk::Image, src_image_layout: vk::ImageLayout, dst_image: vk::Image, dst_image_layout: vk::ImageLayout, region_count: u32, p_regions: *const vk::ImageCopy);
        [core, export] vkCmdBlitImage => cmd_blit_image(command_buffer: vk::CommandBuffer, src_image: vk::Image, src_image_layout: vk::ImageLayout, dst_image: vk::Image, dst_image_layout: vk::ImageLayout, region_count: u32, p_regions: *const vk::ImageBlit, filter: vk::Filter);
        [core, export] vkCmdCopyBufferToImage => cmd_copy_buffer_to_image(command_buffer: vk::CommandBuffer, src_buffer: vk::Buffer, dst_image: vk::Image, dst_image_layout: vk::ImageLayout, region_count: u32, p_regions: *const vk::BufferImageCopy);
        [core, export] vkCmdCopyImageToBuffer => cmd_copy_image_to_buffer(command_buffer: vk::CommandBuffer, src_image: vk::Image, src_image_layout: vk::ImageLayout, dst_buffer: vk::Buffer, region_count: u32, p_regions: *const vk::BufferImageCopy);
        [core, export] vkCmdUpdateBuffer => cmd_update_buffer(command_buffer: vk::CommandBuffer, dst_buffer: vk::Buffer, dst_offset: vk::DeviceSize, data_size: vk::DeviceSize, p_data: *const c_void);
        [core, export] vkCmdFillBuffer => cmd_fill_buffer(command_buffer: vk::CommandBuffer, dst_buffer: vk::Buffer, dst_offset: vk::DeviceSize, size: vk::DeviceSize, data: u32);
        [core, export] vkCmdClearColorImage => cmd_clear_color_image(command_buffer: vk::CommandBuffer, image: vk::Image, image_layout: vk::ImageLayout, p_color: *const vk::ClearColorValue, range_count: u32, p_ranges: *const vk::ImageSubresourceRange);
        [core, export] vkCmdClearDepthStencilImage => cmd_clear_depth_stencil_image(command_buffer: vk::CommandBuffer, image: vk::Image, image_layout: vk::ImageLayout, p_depth_stencil: *const vk::ClearDepthStencilValue, range_count: u32, p_ranges: *const vk::ImageSubresourceRange);
        [core, export] vkCmdClearAttachments => cmd_clear_attachments(command_buffer: vk::CommandBuffer, attachment_count: u32, p_attachments: *const vk::ClearAttachment, rect_count: u32, p_rects: *const vk::ClearRect);
        [core, export] vkCmdResolveImage => cmd_resolve_image(command_buffer: vk::CommandBuffer, src_image: vk::Image, src_image_layout: vk::ImageLayout, dst_image: vk::Image, dst_image_layout: vk::ImageLayout, region_count: u32, p_regions: *const vk::ImageResolve);
        [core, export] vkCmdSetEvent => cmd_set_event(command_buffer: vk::CommandBuffer, event: vk::Event, stage_mask: vk::PipelineStageFlags);
        [core, export] vkCmdResetEvent => cmd_reset_event(command_buffer: vk::CommandBuffer, event: vk::Event, stage_mask: vk::PipelineStageFlags);
        [core, export] vkCmdWaitEvents => cmd_wait_events(command_buffer: vk::CommandBuffer, event_count: u32, p_events: *const vk::Event, src_stage_mask: vk::PipelineStageFlags, dst_stage_mask: vk::PipelineStageFlags, memory_barrier_count: u32, p_memory_barriers: *const vk::MemoryBarrier<'_>, buffer_memory_barrier_count: u32, p_buffer_memory_barriers: *const vk::BufferMemoryBarrier<'_>, image_memory_barrier_count: u32, p_image_memory_barriers: *const vk::ImageMemoryBarrier<'_>);
        [core, export] vkCmdPipelineBarrier => cmd_pipeline_barrier(command_buffer: vk::CommandBuffer, src_stage_mask: vk::PipelineStageFlags, dst_stage_mask: vk::PipelineStageFlags, dependency_flags: vk::DependencyFlags, memory_barrier_count: u32, p_memory_barriers: *const vk::MemoryBarrier<'_>, buffer_memory_barrier_count: u32, p_buffer_memory_barriers: *const vk::BufferMemoryBarrier<'_>, image_memory_barrier_count: u32, p_image_memory_barriers: *const vk::ImageMemoryBarrier<'_>);
        [core, export] vkCmdBeginQuery => cmd_begin_query(command_buffer: vk::CommandBuffer, query_pool: vk::QueryPool, query: u32, flags: vk::QueryControlFlags);
        [core, export] vkCmdEndQuery => cmd_end_query(command_buffer: vk::CommandBuffer, query_pool: vk::QueryPool, query: u32);
        [core, export] vkCmdResetQueryPool => cmd_reset_query_pool(command_buffer: vk::CommandBuffer, query_pool: vk::QueryPool, first_query: u32, query_count: u32);
        [core, export] vkCmdWriteTimestamp => cmd_write_timestamp(command_buffer: vk::CommandBuffer, pipeline_stage: vk::PipelineStageFlags, query_pool: vk::QueryPool, query: u32);
        [core, export] vkCmdCopyQueryPoolResults => cmd_copy_query_pool_results(command_buffer: vk::CommandBuffer, query_pool: vk::QueryPool, first_query: u32, query_count: u32, dst_buffer: vk::Buffer, dst_offset: vk::DeviceSize, stride: vk::DeviceSize, flags: vk::QueryResultFlags);
        [core, export] vkCmdPushConstants => cmd_push_constants(command_buffer: vk::CommandBuffer, layout: vk::PipelineLayout, stage_flags: vk::ShaderStageFlags, offset: u32, size: u32, p_values: *const c_void);
        [core, export] vkCmdBeginRenderPass => cmd_begin_render_pass(command_buffer: vk::CommandBuffer, p_render_pass_begin: *const vk::RenderPassBeginInfo<'_>, contents: vk::SubpassContents);
        [core, export] vkCmdNextSubpass => cmd_next_subpass(command_buffer: vk::CommandBuffer, contents: vk::SubpassContents);
        [core, export] vkCmdEndRenderPass => cmd_end_render_pass(command_buffer: vk::CommandBuffer);
        [core, export] vkCmdExecuteCommands => cmd_execute_commands(command_buffer: vk::CommandBuffer, command_buffer_count: u32, p_command_buffers: *const vk::CommandBuffer);
        [ext(KhrSwapchain), export] vkCreateSwapchainKHR => create_swapchain_khr(device: vk::Device, p_create_info: *const vk::SwapchainCreateInfoKHR<'_>, p_allocator: *const vk::AllocationCallbacks<'_>, p_swapchain: *mut vk::SwapchainKHR) -> vk::Result;
        [ext(KhrSwapchain), export] vkDestroySwapchainKHR => destroy_swapchain_khr(device: vk::Device, swapchain: vk::SwapchainKHR, p_allocator: *const vk::AllocationCallbacks<'_>);
        [ext(KhrSwapchain), export] vkGetSwapchainImagesKHR => get_swapchain_images_khr(device: vk::Device, swapchain: vk::SwapchainKHR, p_swapchain_image_count: *mut u32, p_swapchain_images: *mut vk::Image) -> vk::Result;
        [ext(KhrSwapchain), export] vkAcquireNextImageKHR => acquire_next_image_khr(device: vk::Device, swapchain: vk::SwapchainKHR, timeout: u64, semaphore: vk::Semaphore, fence: vk::Fence, p_image_index: *mut u32) -> vk::Result;
        [ext(KhrSwapchain), export] vkQueuePresentKHR => queue_present_khr(queue: vk::Queue, p_present_info: *const vk::PresentInfoKHR<'_>) -> vk::Result;
    }
}
