//! A pool from which descriptor sets can be allocated.

use super::{
    layout::{DescriptorSetLayout, DescriptorSetLayoutCreateFlags},
    DescriptorSet,
};
use crate::{
    device::Device,
    macros::vulkan_bitflags,
    object::{ObjectHandle, ObjectNode, StateObject},
    NonExhaustive, ValidationError,
};
use ash::vk;
use foldhash::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Pool that descriptor sets are allocated from.
///
/// The pool keeps every set allocated from it alive until it is freed, or until the pool is reset
/// or destroyed, at which point the set is released.
#[derive(Debug)]
pub struct DescriptorPool {
    handle: vk::DescriptorPool,
    device: Arc<Device>,
    node: ObjectNode,

    flags: DescriptorPoolCreateFlags,
    sets: Mutex<HashMap<vk::DescriptorSet, Arc<DescriptorSet>>>,
}

impl DescriptorPool {
    /// Creates a new `DescriptorPool`.
    pub fn new(
        device: Arc<Device>,
        handle: vk::DescriptorPool,
        create_info: DescriptorPoolCreateInfo,
    ) -> Arc<Self> {
        let DescriptorPoolCreateInfo { flags, _ne: _ } = create_info;

        Arc::new(DescriptorPool {
            handle,
            device,
            node: ObjectNode::new(),
            flags,
            sets: Mutex::new(HashMap::default()),
        })
    }

    /// Returns the raw handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }

    /// Returns the device that the pool belongs to.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the flags the pool was created with.
    #[inline]
    pub fn flags(&self) -> DescriptorPoolCreateFlags {
        self.flags
    }

    /// Returns the number of sets currently allocated from the pool.
    #[inline]
    pub fn allocated_count(&self) -> usize {
        self.sets.lock().len()
    }

    /// Checks whether a set with the given layout may be allocated from this pool.
    pub fn validate_allocate(
        &self,
        layout: &DescriptorSetLayout,
    ) -> Result<(), Box<ValidationError>> {
        if layout
            .flags()
            .intersects(DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR)
        {
            return Err(Box::new(ValidationError {
                context: "set_layout".into(),
                problem: "was created with `DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR`"
                    .into(),
                vuids: &["VUID-VkDescriptorSetAllocateInfo-pSetLayouts-00308"],
                ..Default::default()
            })
            .with_object(ObjectHandle::new(layout.handle())));
        }

        if layout
            .flags()
            .intersects(DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            && !self
                .flags
                .intersects(DescriptorPoolCreateFlags::UPDATE_AFTER_BIND)
        {
            return Err(Box::new(ValidationError {
                context: "set_layout".into(),
                problem: "was created with \
                    `DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL`, but the pool was \
                    not created with `DescriptorPoolCreateFlags::UPDATE_AFTER_BIND`"
                    .into(),
                vuids: &["VUID-VkDescriptorSetAllocateInfo-pSetLayouts-03044"],
                kind: crate::ViolationKind::Compatibility,
                ..Default::default()
            })
            .with_object(ObjectHandle::new(layout.handle())));
        }

        Ok(())
    }

    /// Records that a set was allocated from the pool, and returns it.
    pub fn allocate(
        &self,
        handle: vk::DescriptorSet,
        layout: Arc<DescriptorSetLayout>,
        variable_descriptor_count: u32,
    ) -> Result<Arc<DescriptorSet>, Box<ValidationError>> {
        self.validate_allocate(&layout)
            .map_err(|err| err.add_context("allocate").with_object(self.object_handle()))?;

        let set = DescriptorSet::new(handle, self.handle, layout, variable_descriptor_count);

        if let Some(previous) = self.sets.lock().insert(handle, set.clone()) {
            previous.release();
        }

        Ok(set)
    }

    /// Frees individual sets, which requires [`DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET`].
    ///
    /// Handles that were not allocated from this pool are ignored.
    pub fn free(&self, handles: &[vk::DescriptorSet]) -> Result<(), Box<ValidationError>> {
        if !self
            .flags
            .intersects(DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        {
            return Err(Box::new(ValidationError {
                context: "free".into(),
                problem: "the pool was not created with \
                    `DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET`"
                    .into(),
                vuids: &["VUID-vkFreeDescriptorSets-descriptorPool-00312"],
                ..Default::default()
            })
            .with_object(self.object_handle()));
        }

        let freed: Vec<_> = {
            let mut sets = self.sets.lock();
            handles
                .iter()
                .filter_map(|handle| sets.remove(handle))
                .collect()
        };

        for set in freed {
            set.release();
        }

        Ok(())
    }

    /// Returns every set to the pool.
    pub fn reset(&self) -> Vec<vk::DescriptorSet> {
        let released: Vec<_> = self.sets.lock().drain().collect();

        debug!(
            pool = %self.object_handle(),
            sets = released.len(),
            "descriptor pool reset",
        );

        released
            .into_iter()
            .map(|(handle, set)| {
                set.release();
                handle
            })
            .collect()
    }

    /// Returns the pool as an `ObjectHandle`.
    #[inline]
    pub fn object_handle(&self) -> ObjectHandle {
        ObjectHandle::new(self.handle)
    }
}

impl StateObject for DescriptorPool {
    #[inline]
    fn handle(&self) -> ObjectHandle {
        self.object_handle()
    }

    #[inline]
    fn node(&self) -> &ObjectNode {
        &self.node
    }
}

/// Parameters to create a new `DescriptorPool`.
#[derive(Clone, Debug)]
pub struct DescriptorPoolCreateInfo {
    /// Additional properties of the descriptor pool.
    ///
    /// The default value is empty.
    pub flags: DescriptorPoolCreateFlags,

    pub _ne: NonExhaustive,
}

impl Default for DescriptorPoolCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            flags: DescriptorPoolCreateFlags::empty(),
            _ne: NonExhaustive(()),
        }
    }
}

vulkan_bitflags! {
    /// Flags that control how a descriptor pool is created.
    DescriptorPoolCreateFlags = DescriptorPoolCreateFlags(u32);

    /// Individual descriptor sets can be freed from the pool.
    FREE_DESCRIPTOR_SET = FREE_DESCRIPTOR_SET,

    /// The pool can allocate sets whose layout has
    /// [`DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL`].
    UPDATE_AFTER_BIND = UPDATE_AFTER_BIND,
}

#[cfg(test)]
mod tests {
    use super::{DescriptorPool, DescriptorPoolCreateFlags, DescriptorPoolCreateInfo};
    use crate::descriptor_set::layout::{
        DescriptorSetLayout, DescriptorSetLayoutBinding, DescriptorSetLayoutCreateFlags,
        DescriptorSetLayoutCreateInfo, DescriptorType,
    };
    use ash::vk::{self, Handle};

    #[test]
    fn free_requires_flag() {
        let device = test_device!();
        let layout = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let pool = DescriptorPool::new(
            device,
            vk::DescriptorPool::from_raw(0x10),
            DescriptorPoolCreateInfo::default(),
        );

        let set = pool
            .allocate(vk::DescriptorSet::from_raw(0x11), layout, 0)
            .unwrap();
        assert!(pool.free(&[set.handle()]).is_err());
        assert!(!set.is_destroyed());

        assert_eq!(pool.reset(), vec![set.handle()]);
        assert!(set.is_destroyed());
        assert_eq!(pool.allocated_count(), 0);
    }

    #[test]
    fn free_releases_sets() {
        let device = test_device!();
        let layout = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let pool = DescriptorPool::new(
            device,
            vk::DescriptorPool::from_raw(0x20),
            DescriptorPoolCreateInfo {
                flags: DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
                ..Default::default()
            },
        );

        let a = pool
            .allocate(vk::DescriptorSet::from_raw(0x21), layout.clone(), 0)
            .unwrap();
        let b = pool
            .allocate(vk::DescriptorSet::from_raw(0x22), layout, 0)
            .unwrap();

        pool.free(&[a.handle()]).unwrap();
        assert!(a.is_destroyed());
        assert!(!b.is_destroyed());
        assert_eq!(pool.allocated_count(), 1);
    }

    #[test]
    fn layout_flags_are_checked() {
        let device = test_device!();
        let pool = DescriptorPool::new(
            device.clone(),
            vk::DescriptorPool::from_raw(0x30),
            DescriptorPoolCreateInfo::default(),
        );

        for (flags, vuid) in [
            (
                DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR,
                "VUID-VkDescriptorSetAllocateInfo-pSetLayouts-00308",
            ),
            (
                DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL,
                "VUID-VkDescriptorSetAllocateInfo-pSetLayouts-03044",
            ),
        ] {
            let layout = DescriptorSetLayout::new(
                device.clone(),
                vk::DescriptorSetLayout::null(),
                DescriptorSetLayoutCreateInfo {
                    flags,
                    bindings: vec![DescriptorSetLayoutBinding::new(
                        0,
                        DescriptorType::StorageBuffer,
                    )],
                    ..Default::default()
                },
            );

            let error = pool
                .allocate(vk::DescriptorSet::from_raw(0x31), layout, 0)
                .unwrap_err();
            assert_eq!(error.vuids, [vuid]);
        }
    }
}
