#![cfg(test)]

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(0x1000);

/// Returns a raw handle value that no other test object uses.
pub(crate) fn next_handle() -> u64 {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

/// Creates a device with default limits, optionally with the given features enabled.
macro_rules! test_device {
    () => {
        test_device!($crate::device::DeviceFeatures::default())
    };
    ($features:expr) => {{
        use ash::vk::Handle as _;

        $crate::device::Device::new(
            ash::vk::Device::from_raw($crate::tests::next_handle()),
            $crate::device::DeviceCreateInfo {
                enabled_features: $features,
                ..Default::default()
            },
        )
    }};
}

/// Creates a resource of the given kind with a fresh handle of type `$ty`.
macro_rules! test_resource {
    ($device:expr, $ty:ty, $kind:expr) => {{
        use ash::vk::Handle as _;

        $crate::resource::Resource::new(
            $device.clone(),
            $crate::object::ObjectHandle::new(<$ty>::from_raw($crate::tests::next_handle())),
            $kind,
        )
    }};
}

/// Creates a descriptor set layout from `(binding, type, count)` tuples. Every binding is visible
/// to every stage.
macro_rules! test_set_layout {
    ($device:expr, [$(($binding:expr, $ty:expr, $count:expr)),* $(,)?]) => {{
        use ash::vk::Handle as _;

        $crate::descriptor_set::layout::DescriptorSetLayout::new(
            $device.clone(),
            ash::vk::DescriptorSetLayout::from_raw($crate::tests::next_handle()),
            $crate::descriptor_set::layout::DescriptorSetLayoutCreateInfo {
                bindings: vec![$(
                    $crate::descriptor_set::layout::DescriptorSetLayoutBinding {
                        descriptor_count: $count,
                        stages: $crate::shader::ShaderStages::all(),
                        ..$crate::descriptor_set::layout::DescriptorSetLayoutBinding::new(
                            $binding, $ty,
                        )
                    }
                ),*],
                ..Default::default()
            },
        )
    }};
}

/// Creates a pipeline layout from a list of set layouts, without push constants.
macro_rules! test_pipeline_layout {
    ($device:expr, [$($set_layout:expr),* $(,)?]) => {{
        use ash::vk::Handle as _;

        $crate::pipeline::layout::PipelineLayout::new(
            $device.clone(),
            ash::vk::PipelineLayout::from_raw($crate::tests::next_handle()),
            $crate::pipeline::layout::PipelineLayoutCreateInfo {
                set_layouts: vec![$(Some($set_layout)),*],
                ..Default::default()
            },
        )
    }};
}

/// Allocates a descriptor set with `layout` outside of any pool.
macro_rules! test_descriptor_set {
    ($layout:expr) => {{
        use ash::vk::Handle as _;

        $crate::descriptor_set::DescriptorSet::new(
            ash::vk::DescriptorSet::from_raw($crate::tests::next_handle()),
            ash::vk::DescriptorPool::null(),
            $layout,
            0,
        )
    }};
}
