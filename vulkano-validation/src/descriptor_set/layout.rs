//! Describes the layout of all descriptors within a descriptor set.
//!
//! When creating a new descriptor set, you must provide a *layout* object to create it from.
//! Layouts are canonicalized: the structural content of a layout is interned as a
//! [`DescriptorSetLayoutDef`], so that two layouts created separately with identical bindings
//! share the same definition and compare as compatible in constant time.

use crate::{
    device::Device,
    dictionary::{Canonical, Dictionary},
    macros::{vulkan_bitflags, vulkan_enum},
    object::{ObjectHandle, ObjectNode, StateObject},
    resource::{Resource, ResourceKind},
    shader::ShaderStages,
    NonExhaustive, ValidationError,
};
use ash::vk;
use foldhash::HashMap;
use once_cell::sync::Lazy;
use smallvec::SmallVec;
use std::{ops::Range, sync::Arc};
use tracing::{debug, trace};

static DESCRIPTOR_SET_LAYOUT_DEFS: Lazy<Dictionary<DescriptorSetLayoutDef>> =
    Lazy::new(Dictionary::new);

/// The canonical identity of a descriptor set layout definition.
pub type DescriptorSetLayoutId = Canonical<DescriptorSetLayoutDef>;

/// Describes to the Vulkan implementation the layout of all descriptors within a descriptor set.
#[derive(Debug)]
pub struct DescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
    device: Arc<Device>,
    node: ObjectNode,

    def: DescriptorSetLayoutId,
    immutable_samplers: HashMap<u32, Vec<Arc<Resource>>>,
}

impl DescriptorSetLayout {
    /// Creates a new `DescriptorSetLayout`.
    ///
    /// Bindings are ordered by binding number. If the same binding number appears more than once,
    /// only the first occurrence is kept; [`DescriptorSetLayoutCreateInfo::validate`] reports the
    /// duplicate.
    pub fn new(
        device: Arc<Device>,
        handle: vk::DescriptorSetLayout,
        create_info: DescriptorSetLayoutCreateInfo,
    ) -> Arc<Self> {
        let DescriptorSetLayoutCreateInfo {
            flags,
            mut bindings,
            _ne: _,
        } = create_info;

        bindings.sort_by_key(|binding| binding.binding);

        let mut immutable_samplers: HashMap<u32, Vec<Arc<Resource>>> = HashMap::default();
        let mut binding_defs: Vec<BindingDef> = Vec::with_capacity(bindings.len());

        for binding in bindings {
            if binding_defs
                .last()
                .is_some_and(|last| last.binding == binding.binding)
            {
                debug!(
                    binding = binding.binding,
                    "skipping duplicate descriptor set layout binding",
                );
                continue;
            }

            let samplers: SmallVec<[vk::Sampler; 1]> = binding
                .immutable_samplers
                .iter()
                .filter_map(|sampler| sampler.handle().typed())
                .collect();

            if !binding.immutable_samplers.is_empty() {
                immutable_samplers.insert(binding.binding, binding.immutable_samplers);
            }

            binding_defs.push(BindingDef {
                binding: binding.binding,
                binding_flags: binding.binding_flags,
                descriptor_type: binding.descriptor_type,
                descriptor_count: binding.descriptor_count,
                stages: binding.stages,
                immutable_samplers: samplers,
                mutable_types: binding.mutable_types.into_iter().collect(),
            });
        }

        let def =
            DESCRIPTOR_SET_LAYOUT_DEFS.intern(DescriptorSetLayoutDef::new(flags, binding_defs));
        trace!(layout = ?handle, def = ?def.as_ptr(), "descriptor set layout created");

        Arc::new(DescriptorSetLayout {
            handle,
            device,
            node: ObjectNode::new(),
            def,
            immutable_samplers,
        })
    }

    /// Returns the raw handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    /// Returns the device that the layout belongs to.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the canonical definition of the layout.
    #[inline]
    pub fn def(&self) -> &DescriptorSetLayoutId {
        &self.def
    }

    /// Returns the flags that the layout was created with.
    #[inline]
    pub fn flags(&self) -> DescriptorSetLayoutCreateFlags {
        self.def.flags
    }

    /// Returns the bindings of the layout, ordered by binding number.
    #[inline]
    pub fn bindings(&self) -> &[BindingDef] {
        &self.def.bindings
    }

    /// Returns the binding with the given binding number.
    #[inline]
    pub fn binding(&self, binding: u32) -> Option<&BindingDef> {
        self.def.binding(binding)
    }

    /// Returns the immutable samplers of `binding`.
    #[inline]
    pub fn immutable_samplers(&self, binding: u32) -> &[Arc<Resource>] {
        self.immutable_samplers
            .get(&binding)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the number of descriptors that require a dynamic offset when bound.
    #[inline]
    pub fn dynamic_descriptor_count(&self) -> u32 {
        self.def.dynamic_descriptor_count
    }

    /// Returns the total number of descriptors in the layout.
    #[inline]
    pub fn total_descriptor_count(&self) -> u32 {
        self.def.total_descriptor_count
    }

    /// Returns whether this layout is for push descriptors.
    #[inline]
    pub fn is_push_descriptor(&self) -> bool {
        self.def
            .flags
            .intersects(DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR)
    }

    /// Returns whether `self` and `other` are compatible, meaning they have identical
    /// definitions.
    #[inline]
    pub fn is_compatible_with(&self, other: &DescriptorSetLayout) -> bool {
        self.def == other.def
    }
}

impl StateObject for DescriptorSetLayout {
    #[inline]
    fn handle(&self) -> ObjectHandle {
        ObjectHandle::new(self.handle)
    }

    #[inline]
    fn node(&self) -> &ObjectNode {
        &self.node
    }
}

/// The structural content of a descriptor set layout.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutDef {
    flags: DescriptorSetLayoutCreateFlags,
    bindings: Vec<BindingDef>,

    element_ranges: Vec<Range<u32>>,
    dynamic_descriptor_count: u32,
    total_descriptor_count: u32,
}

impl DescriptorSetLayoutDef {
    fn new(flags: DescriptorSetLayoutCreateFlags, bindings: Vec<BindingDef>) -> Self {
        let mut element_ranges = Vec::with_capacity(bindings.len());
        let mut next_index: u32 = 0;
        let mut dynamic_descriptor_count = 0;

        // Counts past `u32::MAX` are reported at creation; the layout is still tracked.
        for binding in &bindings {
            let end = next_index.saturating_add(binding.element_count());
            element_ranges.push(next_index..end);
            next_index = end;

            if binding.descriptor_type.is_dynamic() {
                dynamic_descriptor_count =
                    u32::saturating_add(dynamic_descriptor_count, binding.descriptor_count);
            }
        }

        Self {
            flags,
            bindings,
            element_ranges,
            dynamic_descriptor_count,
            total_descriptor_count: next_index,
        }
    }

    /// Returns the flags of the definition.
    #[inline]
    pub fn flags(&self) -> DescriptorSetLayoutCreateFlags {
        self.flags
    }

    /// Returns the bindings, ordered by binding number.
    #[inline]
    pub fn bindings(&self) -> &[BindingDef] {
        &self.bindings
    }

    /// Returns the position of `binding` within [`bindings`](Self::bindings).
    #[inline]
    pub fn binding_index(&self, binding: u32) -> Option<usize> {
        self.bindings
            .binary_search_by_key(&binding, |b| b.binding)
            .ok()
    }

    /// Returns the binding with the given binding number.
    #[inline]
    pub fn binding(&self, binding: u32) -> Option<&BindingDef> {
        self.binding_index(binding).map(|index| &self.bindings[index])
    }

    /// Returns the range of global descriptor indices that `binding` occupies.
    #[inline]
    pub fn element_range(&self, binding: u32) -> Option<Range<u32>> {
        self.binding_index(binding)
            .map(|index| self.element_ranges[index].clone())
    }

    /// Returns the total number of descriptors.
    #[inline]
    pub fn total_descriptor_count(&self) -> u32 {
        self.total_descriptor_count
    }

    /// Returns whether descriptor sets with this layout may have descriptors that are updated
    /// after binding, left unwritten or sized at allocation. Such sets cannot be assumed unchanged
    /// between two action commands by looking at the set alone.
    pub fn is_bindless(&self) -> bool {
        self.flags
            .intersects(DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            || self.bindings.iter().any(|binding| {
                binding.binding_flags.intersects(
                    DescriptorBindingFlags::UPDATE_AFTER_BIND
                        | DescriptorBindingFlags::PARTIALLY_BOUND
                        | DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT,
                )
            })
    }
}

/// One binding of a canonical descriptor set layout definition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BindingDef {
    /// The binding number.
    pub binding: u32,

    /// The flags of the binding.
    pub binding_flags: DescriptorBindingFlags,

    /// The type of descriptors in the binding.
    pub descriptor_type: DescriptorType,

    /// The number of descriptors, or the number of bytes for an inline uniform block. For a
    /// binding with a variable descriptor count, this is the upper bound.
    pub descriptor_count: u32,

    /// The stages that may access the binding.
    pub stages: ShaderStages,

    /// The samplers that are baked into the layout.
    pub immutable_samplers: SmallVec<[vk::Sampler; 1]>,

    /// For a [`DescriptorType::Mutable`] binding, the types it may hold.
    pub mutable_types: SmallVec<[DescriptorType; 4]>,
}

impl BindingDef {
    /// Returns the number of descriptor elements that a descriptor set stores for this binding.
    /// An inline uniform block is stored as a single element regardless of its size.
    #[inline]
    pub fn element_count(&self) -> u32 {
        if self.descriptor_type == DescriptorType::InlineUniformBlock {
            1
        } else {
            self.descriptor_count
        }
    }

    /// Returns whether a descriptor of type `ty` may be written to this binding.
    #[inline]
    pub fn accepts(&self, ty: DescriptorType) -> bool {
        if self.descriptor_type == DescriptorType::Mutable {
            self.mutable_types.contains(&ty)
        } else {
            self.descriptor_type == ty
        }
    }
}

/// Parameters to create a new `DescriptorSetLayout`.
#[derive(Clone, Debug)]
pub struct DescriptorSetLayoutCreateInfo {
    /// Specifies how to create the descriptor set layout.
    ///
    /// The default value is empty.
    pub flags: DescriptorSetLayoutCreateFlags,

    /// The bindings of the descriptor set layout, in any order.
    ///
    /// The default value is empty.
    pub bindings: Vec<DescriptorSetLayoutBinding>,

    pub _ne: NonExhaustive,
}

impl Default for DescriptorSetLayoutCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            flags: DescriptorSetLayoutCreateFlags::empty(),
            bindings: Vec::new(),
            _ne: NonExhaustive(()),
        }
    }
}

impl DescriptorSetLayoutCreateInfo {
    /// Checks the create info for violations that the layer reports but tolerates.
    pub fn validate(&self) -> Result<(), Box<ValidationError>> {
        let &Self {
            flags,
            ref bindings,
            _ne: _,
        } = self;

        let mut seen_bindings: SmallVec<[u32; 8]> = SmallVec::new();
        let max_binding = bindings.iter().map(|binding| binding.binding).max();
        let mut total_descriptor_count = 0u64;

        for (index, binding) in bindings.iter().enumerate() {
            if seen_bindings.contains(&binding.binding) {
                return Err(Box::new(ValidationError {
                    context: format!("bindings[{}].binding", index).into(),
                    problem: "the binding number is not unique within `bindings`".into(),
                    vuids: &["VUID-VkDescriptorSetLayoutCreateInfo-binding-00279"],
                    ..Default::default()
                }));
            }

            seen_bindings.push(binding.binding);

            if flags.intersects(DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR)
                && binding.descriptor_type.is_dynamic()
            {
                return Err(Box::new(ValidationError {
                    context: format!("bindings[{}].descriptor_type", index).into(),
                    problem: "`flags` contains `DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR`, \
                        but the binding has a dynamic descriptor type"
                        .into(),
                    vuids: &["VUID-VkDescriptorSetLayoutCreateInfo-flags-00280"],
                    ..Default::default()
                }));
            }

            if binding
                .binding_flags
                .intersects(DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT)
                && Some(binding.binding) != max_binding
            {
                return Err(Box::new(ValidationError {
                    context: format!("bindings[{}].binding_flags", index).into(),
                    problem: "contains `DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT`, but \
                        the binding is not the binding with the highest binding number"
                        .into(),
                    vuids: &[
                        "VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-pBindingFlags-03004",
                    ],
                    ..Default::default()
                }));
            }

            if binding.descriptor_type == DescriptorType::Mutable
                && binding.mutable_types.is_empty()
            {
                return Err(Box::new(ValidationError {
                    context: format!("bindings[{}].mutable_types", index).into(),
                    problem: "is empty, but the descriptor type is `DescriptorType::Mutable`"
                        .into(),
                    vuids: &["VUID-VkDescriptorSetLayoutCreateInfo-descriptorType-04593"],
                    ..Default::default()
                }));
            }

            if binding
                .immutable_samplers
                .iter()
                .any(|sampler| sampler.kind() != ResourceKind::Sampler)
            {
                return Err(Box::new(ValidationError {
                    context: format!("bindings[{}].immutable_samplers", index).into(),
                    problem: "contains an object that is not a sampler".into(),
                    vuids: &["VUID-VkDescriptorSetLayoutBinding-descriptorType-00282"],
                    ..Default::default()
                }));
            }

            let element_count = if binding.descriptor_type == DescriptorType::InlineUniformBlock {
                1
            } else {
                binding.descriptor_count
            };
            total_descriptor_count += u64::from(element_count);

            if total_descriptor_count > u64::from(u32::MAX) {
                return Err(Box::new(ValidationError {
                    context: format!("bindings[{}].descriptor_count", index).into(),
                    problem: "brings the number of descriptors in the layout past `u32::MAX`"
                        .into(),
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }
}

/// A binding in a descriptor set layout.
#[derive(Clone, Debug)]
pub struct DescriptorSetLayoutBinding {
    /// The binding number.
    pub binding: u32,

    /// Specifies how to create the binding.
    ///
    /// The default value is empty.
    pub binding_flags: DescriptorBindingFlags,

    /// The content and layout of each array element of a binding.
    pub descriptor_type: DescriptorType,

    /// How many descriptors (array elements) this binding is made of, or the number of bytes of
    /// an inline uniform block.
    ///
    /// The default value is `1`.
    pub descriptor_count: u32,

    /// Which shader stages are going to access the descriptors in this binding.
    ///
    /// The default value is [`ShaderStages::all_graphics()`].
    pub stages: ShaderStages,

    /// Samplers that are included as a fixed part of the descriptor set layout.
    ///
    /// The default value is empty.
    pub immutable_samplers: Vec<Arc<Resource>>,

    /// For a [`DescriptorType::Mutable`] binding, the types it may hold.
    ///
    /// The default value is empty.
    pub mutable_types: Vec<DescriptorType>,

    pub _ne: NonExhaustive,
}

impl DescriptorSetLayoutBinding {
    /// Returns a `DescriptorSetLayoutBinding` with the given binding number and type.
    #[inline]
    pub fn new(binding: u32, descriptor_type: DescriptorType) -> Self {
        Self {
            binding,
            binding_flags: DescriptorBindingFlags::empty(),
            descriptor_type,
            descriptor_count: 1,
            stages: ShaderStages::all_graphics(),
            immutable_samplers: Vec::new(),
            mutable_types: Vec::new(),
            _ne: NonExhaustive(()),
        }
    }
}

vulkan_bitflags! {
    /// Flags that control how a descriptor set layout is created.
    DescriptorSetLayoutCreateFlags = DescriptorSetLayoutCreateFlags(u32);

    /// Whether descriptor sets using this descriptor set layout must be allocated from a
    /// descriptor pool that allows updating after bind.
    UPDATE_AFTER_BIND_POOL = UPDATE_AFTER_BIND_POOL,

    /// Whether the descriptor set layout should be created for push descriptors.
    PUSH_DESCRIPTOR = PUSH_DESCRIPTOR_KHR,

    /// Whether the descriptor set layout is used with descriptor buffers.
    DESCRIPTOR_BUFFER = DESCRIPTOR_BUFFER_EXT,
}

vulkan_bitflags! {
    /// Flags that control how a binding in a descriptor set layout is created.
    DescriptorBindingFlags = DescriptorBindingFlags(u32);

    /// Allows descriptors in this binding to be updated after a command buffer has already
    /// recorded a bind command containing a descriptor set with this layout.
    UPDATE_AFTER_BIND = UPDATE_AFTER_BIND,

    /// Allows descriptors in this binding to be updated while a command buffer that does not use
    /// them is pending.
    UPDATE_UNUSED_WHILE_PENDING = UPDATE_UNUSED_WHILE_PENDING,

    /// Descriptors in this binding need not be valid unless they are dynamically used.
    PARTIALLY_BOUND = PARTIALLY_BOUND,

    /// The number of descriptors in the binding is specified when allocating a descriptor set.
    /// Only the highest-numbered binding may have this flag.
    VARIABLE_DESCRIPTOR_COUNT = VARIABLE_DESCRIPTOR_COUNT,
}

vulkan_enum! {
    /// Describes what kind of resource may later be bound to a descriptor.
    DescriptorType = DescriptorType(i32);

    /// Describes how a `SampledImage` descriptor should be read.
    Sampler = SAMPLER,

    /// Combines `SampledImage` and `Sampler` in one descriptor.
    CombinedImageSampler = COMBINED_IMAGE_SAMPLER,

    /// Gives read-only access to an image via a sampler.
    SampledImage = SAMPLED_IMAGE,

    /// Gives read and/or write access to individual pixels in an image.
    StorageImage = STORAGE_IMAGE,

    /// Gives read-only access to the content of a buffer, interpreted as an array of texel data.
    UniformTexelBuffer = UNIFORM_TEXEL_BUFFER,

    /// Gives read and/or write access to the content of a buffer, interpreted as an array of texel
    /// data.
    StorageTexelBuffer = STORAGE_TEXEL_BUFFER,

    /// Gives read-only access to the content of a buffer, interpreted as a structure.
    UniformBuffer = UNIFORM_BUFFER,

    /// Gives read and/or write access to the content of a buffer, interpreted as a structure.
    StorageBuffer = STORAGE_BUFFER,

    /// As `UniformBuffer`, but the offset within the buffer is specified at the time the descriptor
    /// set is bound.
    UniformBufferDynamic = UNIFORM_BUFFER_DYNAMIC,

    /// As `StorageBuffer`, but the offset within the buffer is specified at the time the descriptor
    /// set is bound.
    StorageBufferDynamic = STORAGE_BUFFER_DYNAMIC,

    /// Gives access to an image inside a fragment shader via a render pass.
    InputAttachment = INPUT_ATTACHMENT,

    /// Data written directly into the descriptor set. The descriptor count of the binding is the
    /// number of bytes.
    InlineUniformBlock = INLINE_UNIFORM_BLOCK,

    /// Gives access to an acceleration structure.
    AccelerationStructure = ACCELERATION_STRUCTURE_KHR,

    /// A descriptor whose type is chosen, from a list fixed in the layout, each time it is
    /// written.
    Mutable = MUTABLE_EXT,
}

impl DescriptorType {
    /// Returns whether descriptors of this type take a dynamic offset when bound.
    #[inline]
    pub fn is_dynamic(self) -> bool {
        matches!(
            self,
            DescriptorType::UniformBufferDynamic | DescriptorType::StorageBufferDynamic
        )
    }

    /// Returns whether descriptors of this type refer to an image.
    #[inline]
    pub fn is_image(self) -> bool {
        matches!(
            self,
            DescriptorType::CombinedImageSampler
                | DescriptorType::SampledImage
                | DescriptorType::StorageImage
                | DescriptorType::InputAttachment
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DescriptorBindingFlags, DescriptorSetLayoutBinding, DescriptorSetLayoutCreateFlags,
        DescriptorSetLayoutCreateInfo, DescriptorType,
    };
    use crate::shader::ShaderStages;

    #[test]
    fn bindings_in_any_order_are_compatible() {
        let device = test_device!();

        let a = test_set_layout!(
            device,
            [
                (0, DescriptorType::UniformBuffer, 1),
                (1, DescriptorType::CombinedImageSampler, 4),
            ]
        );
        let b = test_set_layout!(
            device,
            [
                (1, DescriptorType::CombinedImageSampler, 4),
                (0, DescriptorType::UniformBuffer, 1),
            ]
        );

        assert!(a.is_compatible_with(&b));
        assert_eq!(a.def(), b.def());
        assert_eq!(a.bindings()[0].binding, 0);
        assert_eq!(a.def().element_range(1), Some(1..5));
        assert_eq!(a.total_descriptor_count(), 5);
    }

    #[test]
    fn differing_bindings_are_incompatible() {
        let device = test_device!();

        let a = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let b = test_set_layout!(device, [(0, DescriptorType::StorageBuffer, 1)]);
        let c = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 2)]);

        assert!(!a.is_compatible_with(&b));
        assert!(!a.is_compatible_with(&c));
    }

    #[test]
    fn dynamic_descriptor_count() {
        let device = test_device!();

        let layout = test_set_layout!(
            device,
            [
                (0, DescriptorType::UniformBufferDynamic, 2),
                (1, DescriptorType::StorageBuffer, 1),
                (2, DescriptorType::StorageBufferDynamic, 1),
                (3, DescriptorType::InlineUniformBlock, 64),
            ]
        );

        assert_eq!(layout.dynamic_descriptor_count(), 3);
        assert_eq!(layout.total_descriptor_count(), 5);
        assert!(!layout.def().is_bindless());
    }

    #[test]
    fn duplicate_bindings() {
        let create_info = DescriptorSetLayoutCreateInfo {
            bindings: vec![
                DescriptorSetLayoutBinding::new(0, DescriptorType::UniformBuffer),
                DescriptorSetLayoutBinding::new(0, DescriptorType::StorageBuffer),
            ],
            ..Default::default()
        };

        let error = create_info.validate().unwrap_err();
        assert_eq!(
            error.vuids,
            ["VUID-VkDescriptorSetLayoutCreateInfo-binding-00279"]
        );

        let device = test_device!();
        let layout = super::DescriptorSetLayout::new(
            device,
            ash::vk::DescriptorSetLayout::null(),
            create_info,
        );
        assert_eq!(layout.bindings().len(), 1);
        assert_eq!(
            layout.bindings()[0].descriptor_type,
            DescriptorType::UniformBuffer
        );
    }

    #[test]
    fn descriptor_count_past_u32_max() {
        let create_info = DescriptorSetLayoutCreateInfo {
            bindings: vec![
                DescriptorSetLayoutBinding {
                    descriptor_count: u32::MAX,
                    ..DescriptorSetLayoutBinding::new(0, DescriptorType::UniformBufferDynamic)
                },
                DescriptorSetLayoutBinding {
                    descriptor_count: 2,
                    ..DescriptorSetLayoutBinding::new(1, DescriptorType::UniformBufferDynamic)
                },
            ],
            ..Default::default()
        };

        let error = create_info.validate().unwrap_err();
        assert_eq!(error.context, "bindings[1].descriptor_count");

        let device = test_device!();
        let layout = super::DescriptorSetLayout::new(
            device,
            ash::vk::DescriptorSetLayout::null(),
            create_info,
        );
        assert_eq!(layout.total_descriptor_count(), u32::MAX);
        assert_eq!(layout.dynamic_descriptor_count(), u32::MAX);
        assert_eq!(layout.def().element_range(1), Some(u32::MAX..u32::MAX));
    }

    #[test]
    fn push_descriptor_rejects_dynamic() {
        let create_info = DescriptorSetLayoutCreateInfo {
            flags: DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR,
            bindings: vec![DescriptorSetLayoutBinding {
                stages: ShaderStages::COMPUTE,
                ..DescriptorSetLayoutBinding::new(0, DescriptorType::UniformBufferDynamic)
            }],
            ..Default::default()
        };

        assert!(create_info.validate().is_err());
    }

    #[test]
    fn bindless_flags() {
        let device = test_device!();
        let layout = super::DescriptorSetLayout::new(
            device,
            ash::vk::DescriptorSetLayout::null(),
            DescriptorSetLayoutCreateInfo {
                bindings: vec![DescriptorSetLayoutBinding {
                    binding_flags: DescriptorBindingFlags::PARTIALLY_BOUND,
                    descriptor_count: 1024,
                    ..DescriptorSetLayoutBinding::new(0, DescriptorType::SampledImage)
                }],
                ..Default::default()
            },
        );

        assert!(layout.def().is_bindless());
    }
}
