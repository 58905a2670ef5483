use super::{
    layout::{BindingDef, DescriptorType},
    DescriptorSet,
};
use crate::{
    object::StateObject,
    resource::{ImageLayout, Resource, ResourceKind},
    DeviceSize, NonExhaustive, ValidationError, ViolationKind,
};
use smallvec::SmallVec;
use std::{ops::Range, sync::Arc};

/// One write into a binding of a descriptor set, as recorded from `VkWriteDescriptorSet` or
/// `vkCmdPushDescriptorSetKHR`.
///
/// Each resource kind has a constructor that writes one element at array index 0, and an
/// `_array` constructor that writes consecutive elements starting at a given index.
///
/// The descriptor type is taken from the layout, except for bindings of type
/// [`DescriptorType::Mutable`], where it must be given with
/// [`with_descriptor_type`](Self::with_descriptor_type).
#[derive(Clone, Debug)]
pub struct WriteDescriptorSet {
    binding: u32,
    first_array_element: u32,
    descriptor_type: Option<DescriptorType>,
    elements: WriteDescriptorSetElements,
}

impl WriteDescriptorSet {
    /// An element with no resource, for sampler bindings whose samplers are immutable.
    #[inline]
    pub fn none(binding: u32) -> Self {
        Self::none_array(binding, 0, 1)
    }

    /// Like [`none`](Self::none), for `num_elements` elements.
    #[inline]
    pub fn none_array(binding: u32, first_array_element: u32, num_elements: u32) -> Self {
        Self::from_elements(
            binding,
            first_array_element,
            WriteDescriptorSetElements::None(num_elements),
        )
    }

    /// A buffer at index 0.
    #[inline]
    pub fn buffer(binding: u32, buffer_info: DescriptorBufferInfo) -> Self {
        Self::buffer_array(binding, 0, [buffer_info])
    }

    /// Buffers starting at `first_array_element`.
    pub fn buffer_array(
        binding: u32,
        first_array_element: u32,
        elements: impl IntoIterator<Item = DescriptorBufferInfo>,
    ) -> Self {
        Self::from_elements(
            binding,
            first_array_element,
            WriteDescriptorSetElements::Buffer(elements.into_iter().collect()),
        )
    }

    /// A texel buffer view at index 0.
    #[inline]
    pub fn buffer_view(binding: u32, buffer_view: Arc<Resource>) -> Self {
        Self::buffer_view_array(binding, 0, [buffer_view])
    }

    /// Texel buffer views starting at `first_array_element`.
    pub fn buffer_view_array(
        binding: u32,
        first_array_element: u32,
        elements: impl IntoIterator<Item = Arc<Resource>>,
    ) -> Self {
        Self::from_elements(
            binding,
            first_array_element,
            WriteDescriptorSetElements::BufferView(elements.into_iter().collect()),
        )
    }

    /// An image view at index 0.
    ///
    /// For a [`DescriptorType::CombinedImageSampler`] binding, this may only be used if the
    /// layout provides immutable samplers.
    #[inline]
    pub fn image_view(binding: u32, image_view_info: DescriptorImageViewInfo) -> Self {
        Self::image_view_array(binding, 0, [image_view_info])
    }

    /// Image views starting at `first_array_element`.
    pub fn image_view_array(
        binding: u32,
        first_array_element: u32,
        elements: impl IntoIterator<Item = DescriptorImageViewInfo>,
    ) -> Self {
        Self::from_elements(
            binding,
            first_array_element,
            WriteDescriptorSetElements::ImageView(elements.into_iter().collect()),
        )
    }

    /// An image view with its sampler at index 0.
    #[inline]
    pub fn image_view_sampler(
        binding: u32,
        image_view_info: DescriptorImageViewInfo,
        sampler: Arc<Resource>,
    ) -> Self {
        Self::image_view_sampler_array(binding, 0, [(image_view_info, sampler)])
    }

    /// Image view and sampler pairs starting at `first_array_element`.
    pub fn image_view_sampler_array(
        binding: u32,
        first_array_element: u32,
        elements: impl IntoIterator<Item = (DescriptorImageViewInfo, Arc<Resource>)>,
    ) -> Self {
        Self::from_elements(
            binding,
            first_array_element,
            WriteDescriptorSetElements::ImageViewSampler(elements.into_iter().collect()),
        )
    }

    /// A sampler at index 0.
    #[inline]
    pub fn sampler(binding: u32, sampler: Arc<Resource>) -> Self {
        Self::sampler_array(binding, 0, [sampler])
    }

    /// Samplers starting at `first_array_element`.
    pub fn sampler_array(
        binding: u32,
        first_array_element: u32,
        elements: impl IntoIterator<Item = Arc<Resource>>,
    ) -> Self {
        Self::from_elements(
            binding,
            first_array_element,
            WriteDescriptorSetElements::Sampler(elements.into_iter().collect()),
        )
    }

    /// Bytes of an inline uniform block, starting at byte `offset`. Both `offset` and the length
    /// of `data` are multiples of 4.
    #[inline]
    pub fn inline_uniform_block(binding: u32, offset: u32, data: Vec<u8>) -> Self {
        Self::from_elements(
            binding,
            offset,
            WriteDescriptorSetElements::InlineUniformBlock(data),
        )
    }

    /// An acceleration structure at index 0.
    #[inline]
    pub fn acceleration_structure(binding: u32, acceleration_structure: Arc<Resource>) -> Self {
        Self::acceleration_structure_array(binding, 0, [acceleration_structure])
    }

    /// Acceleration structures starting at `first_array_element`.
    pub fn acceleration_structure_array(
        binding: u32,
        first_array_element: u32,
        elements: impl IntoIterator<Item = Arc<Resource>>,
    ) -> Self {
        Self::from_elements(
            binding,
            first_array_element,
            WriteDescriptorSetElements::AccelerationStructure(elements.into_iter().collect()),
        )
    }

    fn from_elements(
        binding: u32,
        first_array_element: u32,
        elements: WriteDescriptorSetElements,
    ) -> Self {
        Self {
            binding,
            first_array_element,
            descriptor_type: None,
            elements,
        }
    }

    /// Sets the descriptor type that is written, which is required for mutable bindings.
    #[inline]
    pub fn with_descriptor_type(mut self, descriptor_type: DescriptorType) -> Self {
        self.descriptor_type = Some(descriptor_type);
        self
    }

    /// Returns the written binding.
    #[inline]
    pub fn binding(&self) -> u32 {
        self.binding
    }

    /// Returns the first written array element, or the byte offset for inline uniform blocks.
    #[inline]
    pub fn first_array_element(&self) -> u32 {
        self.first_array_element
    }

    /// Returns the descriptor type that was explicitly given, if any.
    #[inline]
    pub fn descriptor_type(&self) -> Option<DescriptorType> {
        self.descriptor_type
    }

    /// Returns the written elements.
    #[inline]
    pub fn elements(&self) -> &WriteDescriptorSetElements {
        &self.elements
    }

    /// Determines the descriptor type that this write puts into `layout_binding`, and checks that
    /// the elements fit it.
    pub(crate) fn resolve_type(
        &self,
        layout_binding: &BindingDef,
    ) -> Result<DescriptorType, Box<ValidationError>> {
        let descriptor_type = match self.descriptor_type {
            Some(descriptor_type) => {
                if !layout_binding.accepts(descriptor_type) {
                    return Err(Box::new(ValidationError {
                        context: "descriptor_type".into(),
                        problem: format!(
                            "{:?} is not accepted by binding {}, which has type {:?}",
                            descriptor_type, self.binding, layout_binding.descriptor_type,
                        )
                        .into(),
                        vuids: &["VUID-VkWriteDescriptorSet-descriptorType-00319"],
                        kind: ViolationKind::Compatibility,
                        ..Default::default()
                    }));
                }

                descriptor_type
            }
            None if layout_binding.descriptor_type == DescriptorType::Mutable => {
                return Err(Box::new(ValidationError {
                    context: "descriptor_type".into(),
                    problem: format!(
                        "is not specified, but binding {} has type `DescriptorType::Mutable`",
                        self.binding,
                    )
                    .into(),
                    vuids: &["VUID-VkWriteDescriptorSet-dstSet-04611"],
                    ..Default::default()
                }));
            }
            None => layout_binding.descriptor_type,
        };

        let has_immutable_samplers = !layout_binding.immutable_samplers.is_empty();
        let elements_fit = match &self.elements {
            WriteDescriptorSetElements::None(_) => {
                descriptor_type == DescriptorType::Sampler && has_immutable_samplers
            }
            WriteDescriptorSetElements::Buffer(_) => matches!(
                descriptor_type,
                DescriptorType::UniformBuffer
                    | DescriptorType::StorageBuffer
                    | DescriptorType::UniformBufferDynamic
                    | DescriptorType::StorageBufferDynamic
            ),
            WriteDescriptorSetElements::BufferView(_) => matches!(
                descriptor_type,
                DescriptorType::UniformTexelBuffer | DescriptorType::StorageTexelBuffer
            ),
            WriteDescriptorSetElements::ImageView(_) => match descriptor_type {
                DescriptorType::SampledImage
                | DescriptorType::StorageImage
                | DescriptorType::InputAttachment => true,
                DescriptorType::CombinedImageSampler => has_immutable_samplers,
                _ => false,
            },
            WriteDescriptorSetElements::ImageViewSampler(_) => {
                descriptor_type == DescriptorType::CombinedImageSampler && !has_immutable_samplers
            }
            WriteDescriptorSetElements::Sampler(_) => {
                descriptor_type == DescriptorType::Sampler && !has_immutable_samplers
            }
            WriteDescriptorSetElements::InlineUniformBlock(_) => {
                descriptor_type == DescriptorType::InlineUniformBlock
            }
            WriteDescriptorSetElements::AccelerationStructure(_) => {
                descriptor_type == DescriptorType::AccelerationStructure
            }
        };

        if !elements_fit {
            return Err(Box::new(ValidationError {
                context: "elements".into(),
                problem: format!(
                    "the kind of elements provided does not match the descriptor type {:?} of \
                    binding {}{}",
                    descriptor_type,
                    self.binding,
                    if has_immutable_samplers {
                        ", which has immutable samplers"
                    } else {
                        ""
                    },
                )
                .into(),
                vuids: &["VUID-VkWriteDescriptorSet-descriptorType-00319"],
                kind: ViolationKind::Compatibility,
                ..Default::default()
            }));
        }

        Ok(descriptor_type)
    }

    /// Checks that every resource held by the write is still alive and of the right kind.
    pub(crate) fn validate_resources(&self) -> Result<(), Box<ValidationError>> {
        let check = |index: usize, resource: &Arc<Resource>, expected: &[ResourceKindClass]| {
            if resource.is_destroyed() {
                return Err(Box::new(ValidationError {
                    context: format!("elements[{}]", index).into(),
                    problem: "refers to an object that has been destroyed".into(),
                    vuids: &["VUID-VkWriteDescriptorSet-descriptorType-02994"],
                    kind: ViolationKind::Liveness,
                    ..Default::default()
                })
                .with_object(resource.handle()));
            }

            if !expected.contains(&ResourceKindClass::of(resource.kind())) {
                return Err(Box::new(ValidationError {
                    context: format!("elements[{}]", index).into(),
                    problem: format!("{:?} is not the right kind of object", resource.kind())
                        .into(),
                    vuids: &["VUID-VkWriteDescriptorSet-descriptorType-00325"],
                    ..Default::default()
                }));
            }

            Ok(())
        };

        match &self.elements {
            WriteDescriptorSetElements::None(_)
            | WriteDescriptorSetElements::InlineUniformBlock(_) => Ok(()),
            WriteDescriptorSetElements::Buffer(elements) => {
                elements.iter().enumerate().try_for_each(|(index, info)| {
                    check(index, &info.buffer, &[ResourceKindClass::Buffer])
                })
            }
            WriteDescriptorSetElements::BufferView(elements) => {
                elements.iter().enumerate().try_for_each(|(index, view)| {
                    check(index, view, &[ResourceKindClass::BufferView])
                })
            }
            WriteDescriptorSetElements::ImageView(elements) => {
                elements.iter().enumerate().try_for_each(|(index, info)| {
                    check(index, &info.image_view, &[ResourceKindClass::ImageView])
                })
            }
            WriteDescriptorSetElements::ImageViewSampler(elements) => {
                elements
                    .iter()
                    .enumerate()
                    .try_for_each(|(index, (info, sampler))| {
                        check(index, &info.image_view, &[ResourceKindClass::ImageView])?;
                        check(index, sampler, &[ResourceKindClass::Sampler])
                    })
            }
            WriteDescriptorSetElements::Sampler(elements) => {
                elements.iter().enumerate().try_for_each(|(index, sampler)| {
                    check(index, sampler, &[ResourceKindClass::Sampler])
                })
            }
            WriteDescriptorSetElements::AccelerationStructure(elements) => elements
                .iter()
                .enumerate()
                .try_for_each(|(index, acceleration_structure)| {
                    check(
                        index,
                        acceleration_structure,
                        &[ResourceKindClass::AccelerationStructure],
                    )
                }),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ResourceKindClass {
    Buffer,
    BufferView,
    ImageView,
    Sampler,
    AccelerationStructure,
    Other,
}

impl ResourceKindClass {
    fn of(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Buffer => Self::Buffer,
            ResourceKind::BufferView => Self::BufferView,
            ResourceKind::ImageView { .. } => Self::ImageView,
            ResourceKind::Sampler => Self::Sampler,
            ResourceKind::AccelerationStructure => Self::AccelerationStructure,
            ResourceKind::Image => Self::Other,
        }
    }
}

/// The resources of a [`WriteDescriptorSet`], one variant per resource kind.
#[derive(Clone, Debug)]
pub enum WriteDescriptorSetElements {
    None(u32),
    Buffer(SmallVec<[DescriptorBufferInfo; 1]>),
    BufferView(SmallVec<[Arc<Resource>; 1]>),
    ImageView(SmallVec<[DescriptorImageViewInfo; 1]>),
    ImageViewSampler(SmallVec<[(DescriptorImageViewInfo, Arc<Resource>); 1]>),
    Sampler(SmallVec<[Arc<Resource>; 1]>),
    InlineUniformBlock(Vec<u8>),
    AccelerationStructure(SmallVec<[Arc<Resource>; 1]>),
}

impl WriteDescriptorSetElements {
    /// Returns the number of elements. For an inline uniform block, this is the number of bytes.
    #[inline]
    pub fn len(&self) -> u32 {
        match self {
            Self::None(num_elements) => *num_elements,
            Self::Buffer(elements) => elements.len() as u32,
            Self::BufferView(elements) => elements.len() as u32,
            Self::ImageView(elements) => elements.len() as u32,
            Self::ImageViewSampler(elements) => elements.len() as u32,
            Self::Sampler(elements) => elements.len() as u32,
            Self::InlineUniformBlock(data) => data.len() as u32,
            Self::AccelerationStructure(elements) => elements.len() as u32,
        }
    }
}

/// A buffer range written to a buffer descriptor.
#[derive(Clone, Debug)]
pub struct DescriptorBufferInfo {
    pub buffer: Arc<Resource>,

    /// The bytes of `buffer` the shader sees. Dynamic offsets are added to it at bind time.
    pub range: Range<DeviceSize>,
}

/// An image view written to an image descriptor.
#[derive(Clone, Debug)]
pub struct DescriptorImageViewInfo {
    pub image_view: Arc<Resource>,

    /// The layout the image must be in when a shader accesses it.
    ///
    /// `Undefined` stands for `General` in storage image descriptors and for
    /// `ShaderReadOnlyOptimal` otherwise.
    pub image_layout: ImageLayout,
}

impl DescriptorImageViewInfo {
    pub(crate) fn resolved_layout(&self, descriptor_type: DescriptorType) -> ImageLayout {
        match (self.image_layout, descriptor_type) {
            (ImageLayout::Undefined, DescriptorType::StorageImage) => ImageLayout::General,
            (ImageLayout::Undefined, _) => ImageLayout::ShaderReadOnlyOptimal,
            (image_layout, _) => image_layout,
        }
    }
}

/// A copy of descriptors from another set, as recorded from `VkCopyDescriptorSet`.
#[derive(Clone, Debug)]
pub struct CopyDescriptorSet {
    /// The set to copy from.
    ///
    /// There is no default value.
    pub src_set: Arc<DescriptorSet>,

    /// The binding to read in `src_set`.
    ///
    /// The default value is 0.
    pub src_binding: u32,

    /// The first array element to read.
    ///
    /// The default value is 0.
    pub src_first_array_element: u32,

    /// The binding to write in the destination set.
    ///
    /// The default value is 0.
    pub dst_binding: u32,

    /// The first array element to write.
    ///
    /// The default value is 0.
    pub dst_first_array_element: u32,

    /// The number of consecutive descriptors copied.
    ///
    /// The default value is 1.
    pub descriptor_count: u32,

    pub _ne: NonExhaustive,
}

impl CopyDescriptorSet {
    /// Returns a `CopyDescriptorSet` that copies one descriptor from binding 0 of `src_set`.
    #[inline]
    pub fn new(src_set: Arc<DescriptorSet>) -> Self {
        Self {
            src_set,
            src_binding: 0,
            src_first_array_element: 0,
            dst_binding: 0,
            dst_first_array_element: 0,
            descriptor_count: 1,
            _ne: NonExhaustive(()),
        }
    }
}
