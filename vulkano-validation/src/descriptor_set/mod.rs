//! Bindings between shaders and the resources they access.
//!
//! A descriptor set holds one [`Descriptor`] per array element of every binding of its layout.
//! Each successful write or copy update increments the set's *change counter*, which is how a
//! command buffer knows whether a set it already validated needs to be looked at again.
//!
//! Descriptor sets are parents of the resources written into them in the object graph.
//! Destroying such a resource also increments the change counter, and the notification is
//! forwarded to the command buffers that have the set bound.

pub use self::update::{
    CopyDescriptorSet, DescriptorBufferInfo, DescriptorImageViewInfo, WriteDescriptorSet,
    WriteDescriptorSetElements,
};
use self::layout::{DescriptorBindingFlags, DescriptorSetLayout, DescriptorType};
use crate::{
    device::Device,
    macros::impl_id_counter,
    object::{ChildLinks, ObjectHandle, ObjectNode, StateObject},
    resource::{ImageLayout, Resource, ResourceRef},
    DeviceSize, ValidationError,
};
use ash::vk;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use smallvec::SmallVec;
use std::{
    num::NonZero,
    ops::Range,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};
use tracing::{debug, trace};

pub mod layout;
pub mod pool;
mod update;

/// The content of one array element of a descriptor set binding.
#[derive(Clone, Debug, Default)]
pub enum Descriptor {
    /// Nothing has been written.
    #[default]
    Empty,
    Sampler {
        sampler: ResourceRef,
    },
    Image {
        image_view: ResourceRef,
        image_layout: ImageLayout,
    },
    ImageSampler {
        image_view: ResourceRef,
        image_layout: ImageLayout,
        sampler: ResourceRef,
    },
    TexelBuffer {
        buffer_view: ResourceRef,
    },
    Buffer {
        buffer: ResourceRef,
        range: Range<DeviceSize>,
    },
    InlineUniformBlock,
    AccelerationStructure {
        acceleration_structure: ResourceRef,
    },
}

impl Descriptor {
    /// Returns whether something has been written.
    #[inline]
    pub fn is_written(&self) -> bool {
        !matches!(self, Descriptor::Empty)
    }

    /// Returns the resources that the descriptor refers to.
    pub fn resources(&self) -> SmallVec<[&ResourceRef; 2]> {
        let mut resources = SmallVec::new();

        match self {
            Descriptor::Empty | Descriptor::InlineUniformBlock => (),
            Descriptor::Sampler { sampler } => resources.push(sampler),
            Descriptor::Image { image_view, .. } => resources.push(image_view),
            Descriptor::ImageSampler {
                image_view,
                sampler,
                ..
            } => {
                resources.push(image_view);
                resources.push(sampler);
            }
            Descriptor::TexelBuffer { buffer_view } => resources.push(buffer_view),
            Descriptor::Buffer { buffer, .. } => resources.push(buffer),
            Descriptor::AccelerationStructure {
                acceleration_structure,
            } => resources.push(acceleration_structure),
        }

        resources
    }

    /// Returns the first resource referred to that is no longer alive.
    #[inline]
    pub fn invalid_resource(&self) -> Option<ObjectHandle> {
        self.resources()
            .into_iter()
            .find(|resource| !resource.is_alive())
            .map(ResourceRef::handle)
    }

    /// Returns the image view and the layout it is expected to be in, for image descriptors.
    #[inline]
    pub fn image(&self) -> Option<(&ResourceRef, ImageLayout)> {
        match self {
            Descriptor::Image {
                image_view,
                image_layout,
            }
            | Descriptor::ImageSampler {
                image_view,
                image_layout,
                ..
            } => Some((image_view, *image_layout)),
            _ => None,
        }
    }
}

/// One array element of a descriptor set binding.
#[derive(Clone, Debug, Default)]
pub struct DescriptorElement {
    /// The type of descriptor held. For a binding of a fixed type, this is the binding's type. For
    /// a mutable binding, this is the type that was last written, or `None` if nothing was.
    pub descriptor_type: Option<DescriptorType>,

    /// The content of the element.
    pub descriptor: Descriptor,
}

/// The current content of one binding of a descriptor set.
#[derive(Clone, Debug)]
pub struct DescriptorBinding {
    /// The binding number.
    pub binding: u32,

    /// The flags of the binding in the layout.
    pub binding_flags: DescriptorBindingFlags,

    /// The type of the binding in the layout.
    pub descriptor_type: DescriptorType,

    /// The array elements. For an inline uniform block, this holds a single element.
    pub elements: Vec<DescriptorElement>,
}

impl DescriptorBinding {
    /// Returns the number of array elements.
    #[inline]
    pub fn len(&self) -> u32 {
        self.elements.len() as u32
    }
}

#[derive(Debug)]
struct DescriptorSetState {
    bindings: Vec<DescriptorBinding>,
    children: ChildLinks,
}

/// A descriptor set, allocated from a pool or created for push descriptors.
#[derive(Debug)]
pub struct DescriptorSet {
    handle: vk::DescriptorSet,
    device: Arc<Device>,
    node: ObjectNode,
    id: NonZero<u64>,
    weak: Weak<DescriptorSet>,

    layout: Arc<DescriptorSetLayout>,
    pool: vk::DescriptorPool,
    variable_descriptor_count: u32,
    change_count: AtomicU64,
    state: RwLock<DescriptorSetState>,
}

impl DescriptorSet {
    /// Creates a descriptor set allocated from `pool`.
    ///
    /// `variable_descriptor_count` is the number of elements of the binding with
    /// [`DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT`], if the layout has one; it is clamped
    /// to the count in the layout.
    pub fn new(
        handle: vk::DescriptorSet,
        pool: vk::DescriptorPool,
        layout: Arc<DescriptorSetLayout>,
        variable_descriptor_count: u32,
    ) -> Arc<Self> {
        let device = layout.device().clone();

        let bindings = layout
            .bindings()
            .iter()
            .map(|binding| {
                let count = if binding
                    .binding_flags
                    .intersects(DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT)
                {
                    variable_descriptor_count.min(binding.element_count())
                } else {
                    binding.element_count()
                };

                let fixed_type = (binding.descriptor_type != DescriptorType::Mutable)
                    .then_some(binding.descriptor_type);
                let mut elements = vec![
                    DescriptorElement {
                        descriptor_type: fixed_type,
                        descriptor: Descriptor::Empty,
                    };
                    count as usize
                ];

                // Immutable samplers are part of the layout, so plain sampler descriptors start
                // out valid.
                if binding.descriptor_type == DescriptorType::Sampler {
                    for (element, sampler) in elements
                        .iter_mut()
                        .zip(layout.immutable_samplers(binding.binding))
                    {
                        element.descriptor = Descriptor::Sampler {
                            sampler: ResourceRef::new(sampler),
                        };
                    }
                }

                DescriptorBinding {
                    binding: binding.binding,
                    binding_flags: binding.binding_flags,
                    descriptor_type: binding.descriptor_type,
                    elements,
                }
            })
            .collect();

        let id = Self::next_id();

        Arc::new_cyclic(|weak| DescriptorSet {
            handle,
            device,
            node: ObjectNode::new(),
            id,
            weak: weak.clone(),
            layout,
            pool,
            variable_descriptor_count,
            change_count: AtomicU64::new(0),
            state: RwLock::new(DescriptorSetState {
                bindings,
                children: ChildLinks::default(),
            }),
        })
    }

    /// Creates a descriptor set for push descriptors, which has no handle or pool.
    #[inline]
    pub fn new_push(layout: Arc<DescriptorSetLayout>) -> Arc<Self> {
        Self::new(
            vk::DescriptorSet::null(),
            vk::DescriptorPool::null(),
            layout,
            0,
        )
    }

    /// Returns the raw handle. This is null for push descriptor sets.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }

    /// Returns the device that the set belongs to.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the layout of the set.
    #[inline]
    pub fn layout(&self) -> &Arc<DescriptorSetLayout> {
        &self.layout
    }

    /// Returns the pool the set was allocated from. This is null for push descriptor sets.
    #[inline]
    pub fn pool(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Returns whether this is a push descriptor set.
    #[inline]
    pub fn is_push_descriptor(&self) -> bool {
        self.handle == vk::DescriptorSet::null()
    }

    /// Returns the variable descriptor count the set was allocated with.
    #[inline]
    pub fn variable_descriptor_count(&self) -> u32 {
        self.variable_descriptor_count
    }

    /// Returns the change counter, which increases with every update of the set.
    #[inline]
    pub fn change_count(&self) -> u64 {
        self.change_count.load(Ordering::Acquire)
    }

    /// Returns whether the set has been destroyed, freed or released.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.node.is_destroyed()
    }

    /// Returns the current content of every binding, ordered by binding number.
    #[inline]
    pub fn bindings(&self) -> MappedRwLockReadGuard<'_, [DescriptorBinding]> {
        RwLockReadGuard::map(self.state.read(), |state| state.bindings.as_slice())
    }

    /// Applies write and copy updates, in that order.
    ///
    /// Every update that is valid is applied, and increments the change counter. Invalid updates
    /// are skipped and returned.
    pub fn update(
        &self,
        descriptor_writes: &[WriteDescriptorSet],
        descriptor_copies: &[CopyDescriptorSet],
    ) -> Vec<Box<ValidationError>> {
        let mut errors = Vec::new();

        // Read copy sources before locking `self`, so that two sets copying from each other can't
        // deadlock. Copies from `self` are read under the write lock instead.
        let copy_sources: Vec<Option<Result<Vec<DescriptorElement>, Box<ValidationError>>>> =
            descriptor_copies
                .iter()
                .map(|copy| {
                    (!std::ptr::eq(Arc::as_ptr(&copy.src_set), self))
                        .then(|| read_copy_source(&copy.src_set.state.read().bindings, copy))
                })
                .collect();

        let mut state = self.state.write();

        for (index, write) in descriptor_writes.iter().enumerate() {
            match self.apply_write(&mut state, write) {
                Ok(()) => {
                    self.change_count.fetch_add(1, Ordering::AcqRel);
                }
                Err(err) => errors.push(
                    err.add_context(format!("descriptor_writes[{}]", index))
                        .with_object(self.object_handle()),
                ),
            }
        }

        for (index, (copy, source)) in descriptor_copies.iter().zip(copy_sources).enumerate() {
            let source = match source {
                Some(source) => source,
                None => read_copy_source(&state.bindings, copy),
            };

            match source.and_then(|elements| self.apply_copy(&mut state, copy, elements)) {
                Ok(()) => {
                    self.change_count.fetch_add(1, Ordering::AcqRel);
                }
                Err(err) => errors.push(
                    err.add_context(format!("descriptor_copies[{}]", index))
                        .with_object(self.object_handle()),
                ),
            }
        }

        trace!(
            set = %self.object_handle(),
            writes = descriptor_writes.len(),
            copies = descriptor_copies.len(),
            rejected = errors.len(),
            change_count = self.change_count(),
            "descriptor set updated",
        );

        errors
    }

    fn apply_write(
        &self,
        state: &mut DescriptorSetState,
        write: &WriteDescriptorSet,
    ) -> Result<(), Box<ValidationError>> {
        let Some(index) = self.layout.def().binding_index(write.binding()) else {
            return Err(Box::new(ValidationError {
                context: "binding".into(),
                problem: format!(
                    "binding {} does not exist in the descriptor set layout",
                    write.binding(),
                )
                .into(),
                vuids: &["VUID-VkWriteDescriptorSet-dstBinding-00315"],
                ..Default::default()
            }));
        };

        let layout_binding = &self.layout.bindings()[index];
        let descriptor_type = write.resolve_type(layout_binding)?;
        write.validate_resources()?;

        let first = write.first_array_element();
        let elements = write.elements();

        if let WriteDescriptorSetElements::InlineUniformBlock(data) = elements {
            if first % 4 != 0 || data.len() % 4 != 0 {
                return Err(Box::new(ValidationError {
                    problem: "the offset or the size of the inline uniform block data is not a \
                        multiple of 4"
                        .into(),
                    vuids: &["VUID-VkWriteDescriptorSet-descriptorType-02219"],
                    ..Default::default()
                }));
            }

            if first as u64 + data.len() as u64 > layout_binding.descriptor_count as u64 {
                return Err(Box::new(ValidationError {
                    problem: "the inline uniform block data extends past the size of the binding"
                        .into(),
                    vuids: &["VUID-VkWriteDescriptorSet-dstArrayElement-00321"],
                    ..Default::default()
                }));
            }

            state.bindings[index].elements[0] = DescriptorElement {
                descriptor_type: Some(descriptor_type),
                descriptor: Descriptor::InlineUniformBlock,
            };

            return Ok(());
        }

        let binding_len = state.bindings[index].len();

        if first as u64 + elements.len() as u64 > binding_len as u64 {
            return Err(Box::new(ValidationError {
                problem: format!(
                    "`first_array_element` + the number of elements ({}) is greater than the \
                    number of descriptors in binding {} ({})",
                    first as u64 + elements.len() as u64,
                    write.binding(),
                    binding_len,
                )
                .into(),
                vuids: &["VUID-VkWriteDescriptorSet-dstArrayElement-00321"],
                ..Default::default()
            }));
        }

        let immutable_samplers = self.layout.immutable_samplers(write.binding());
        let new_descriptors: SmallVec<[Descriptor; 1]> = match elements {
            WriteDescriptorSetElements::None(count) => (0..*count)
                .map(|offset| {
                    immutable_samplers
                        .get((first + offset) as usize)
                        .map_or(Descriptor::Empty, |sampler| Descriptor::Sampler {
                            sampler: ResourceRef::new(sampler),
                        })
                })
                .collect(),
            WriteDescriptorSetElements::Buffer(infos) => infos
                .iter()
                .map(|info| Descriptor::Buffer {
                    buffer: ResourceRef::new(&info.buffer),
                    range: info.range.clone(),
                })
                .collect(),
            WriteDescriptorSetElements::BufferView(views) => views
                .iter()
                .map(|view| Descriptor::TexelBuffer {
                    buffer_view: ResourceRef::new(view),
                })
                .collect(),
            WriteDescriptorSetElements::ImageView(infos) => infos
                .iter()
                .enumerate()
                .map(|(offset, info)| {
                    let image_view = ResourceRef::new(&info.image_view);
                    let image_layout = info.resolved_layout(descriptor_type);

                    let sampler = immutable_samplers
                        .get(first as usize + offset)
                        .filter(|_| descriptor_type == DescriptorType::CombinedImageSampler);

                    match sampler {
                        Some(sampler) => Descriptor::ImageSampler {
                            image_view,
                            image_layout,
                            sampler: ResourceRef::new(sampler),
                        },
                        _ => Descriptor::Image {
                            image_view,
                            image_layout,
                        },
                    }
                })
                .collect(),
            WriteDescriptorSetElements::ImageViewSampler(pairs) => pairs
                .iter()
                .map(|(info, sampler)| Descriptor::ImageSampler {
                    image_view: ResourceRef::new(&info.image_view),
                    image_layout: info.resolved_layout(descriptor_type),
                    sampler: ResourceRef::new(sampler),
                })
                .collect(),
            WriteDescriptorSetElements::Sampler(samplers) => samplers
                .iter()
                .map(|sampler| Descriptor::Sampler {
                    sampler: ResourceRef::new(sampler),
                })
                .collect(),
            WriteDescriptorSetElements::AccelerationStructure(acceleration_structures) => {
                acceleration_structures
                    .iter()
                    .map(|acceleration_structure| Descriptor::AccelerationStructure {
                        acceleration_structure: ResourceRef::new(acceleration_structure),
                    })
                    .collect()
            }
            WriteDescriptorSetElements::InlineUniformBlock(_) => unreachable!(),
        };

        let new_elements = new_descriptors
            .into_iter()
            .map(|descriptor| DescriptorElement {
                descriptor_type: Some(descriptor_type),
                descriptor,
            })
            .collect();

        self.replace_elements(state, index, first, new_elements);

        Ok(())
    }

    fn apply_copy(
        &self,
        state: &mut DescriptorSetState,
        copy: &CopyDescriptorSet,
        elements: Vec<DescriptorElement>,
    ) -> Result<(), Box<ValidationError>> {
        let Some(index) = self.layout.def().binding_index(copy.dst_binding) else {
            return Err(Box::new(ValidationError {
                context: "dst_binding".into(),
                problem: format!(
                    "binding {} does not exist in the destination descriptor set layout",
                    copy.dst_binding,
                )
                .into(),
                vuids: &["VUID-VkCopyDescriptorSet-dstBinding-00347"],
                ..Default::default()
            }));
        };

        let layout_binding = &self.layout.bindings()[index];
        let binding_len = state.bindings[index].len();

        if copy.dst_first_array_element as u64 + copy.descriptor_count as u64 > binding_len as u64
        {
            return Err(Box::new(ValidationError {
                problem: "`dst_first_array_element` + `descriptor_count` is greater than the \
                    number of descriptors in the destination binding"
                    .into(),
                vuids: &["VUID-VkCopyDescriptorSet-dstArrayElement-00348"],
                ..Default::default()
            }));
        }

        for element in &elements {
            if let Some(descriptor_type) = element.descriptor_type {
                if !layout_binding.accepts(descriptor_type) {
                    return Err(Box::new(ValidationError {
                        problem: format!(
                            "the source descriptors have type {:?}, which the destination \
                            binding of type {:?} does not accept",
                            descriptor_type, layout_binding.descriptor_type,
                        )
                        .into(),
                        vuids: &["VUID-VkCopyDescriptorSet-dstBinding-02632"],
                        kind: crate::ViolationKind::Compatibility,
                        ..Default::default()
                    })
                    .with_object(copy.src_set.object_handle()));
                }
            }
        }

        self.replace_elements(state, index, copy.dst_first_array_element, elements);

        Ok(())
    }

    fn replace_elements(
        &self,
        state: &mut DescriptorSetState,
        index: usize,
        first: u32,
        new_elements: Vec<DescriptorElement>,
    ) {
        let this = self.object_handle();
        let this_ref: Weak<dyn StateObject> = self.weak.clone();
        let DescriptorSetState { bindings, children } = state;

        for (offset, new_element) in new_elements.into_iter().enumerate() {
            let slot = &mut bindings[index].elements[first as usize + offset];

            for resource in slot.descriptor.resources() {
                children.remove(this, resource.handle());
            }

            for resource in new_element.descriptor.resources() {
                if let Some(resource) = resource.upgrade() {
                    let resource: Arc<dyn StateObject> = resource;
                    children.add(this, &this_ref, &resource);
                }
            }

            *slot = new_element;
        }
    }

    /// Returns the set as an `ObjectHandle`.
    ///
    /// Push descriptor sets have no handle, so they are identified by their ID instead, under
    /// [`vk::ObjectType::UNKNOWN`].
    #[inline]
    pub fn object_handle(&self) -> ObjectHandle {
        if self.handle == vk::DescriptorSet::null() {
            ObjectHandle::from_raw(vk::ObjectType::UNKNOWN, self.id.get())
        } else {
            ObjectHandle::new(self.handle)
        }
    }

    /// Drops every link to written resources and marks the set as destroyed, notifying command
    /// buffers that still have it bound. Used when a pool frees the set and when a push
    /// descriptor set is displaced.
    pub fn release(&self) {
        self.state.write().children.clear(self.object_handle());
        self.node.destroy(self.object_handle());
        debug!(set = %self.object_handle(), "descriptor set released");
    }

    /// Returns the resource with the given handle, if the set refers to it and it is alive.
    pub fn find_resource(&self, handle: ObjectHandle) -> Option<Arc<Resource>> {
        self.state
            .read()
            .bindings
            .iter()
            .flat_map(|binding| &binding.elements)
            .flat_map(|element| element.descriptor.resources())
            .find(|resource| resource.handle() == handle)
            .and_then(ResourceRef::upgrade)
    }
}

impl_id_counter!(DescriptorSet);

impl StateObject for DescriptorSet {
    #[inline]
    fn handle(&self) -> ObjectHandle {
        self.object_handle()
    }

    #[inline]
    fn node(&self) -> &ObjectNode {
        &self.node
    }

    fn notify_invalid(&self, chain: &[ObjectHandle], unlink: bool) {
        self.change_count.fetch_add(1, Ordering::AcqRel);

        if unlink {
            if let [child] = chain {
                self.state.write().children.forget(*child);
            }
        }

        debug!(
            set = %self.object_handle(),
            chain = ?chain,
            "descriptor set invalidated by a referenced object",
        );

        self.node.notify_parents(self.object_handle(), chain, unlink);
    }
}

fn read_copy_source(
    bindings: &[DescriptorBinding],
    copy: &CopyDescriptorSet,
) -> Result<Vec<DescriptorElement>, Box<ValidationError>> {
    let Some(binding) = bindings.iter().find(|b| b.binding == copy.src_binding) else {
        return Err(Box::new(ValidationError {
            context: "src_binding".into(),
            problem: format!(
                "binding {} does not exist in the source descriptor set layout",
                copy.src_binding,
            )
            .into(),
            vuids: &["VUID-VkCopyDescriptorSet-srcBinding-00345"],
            ..Default::default()
        }));
    };

    let start = copy.src_first_array_element as usize;
    let end = start + copy.descriptor_count as usize;

    match binding.elements.get(start..end) {
        Some(elements) => Ok(elements.to_vec()),
        None => Err(Box::new(ValidationError {
            problem: "`src_first_array_element` + `descriptor_count` is greater than the number \
                of descriptors in the source binding"
                .into(),
            vuids: &["VUID-VkCopyDescriptorSet-srcArrayElement-00346"],
            ..Default::default()
        })),
    }
}
