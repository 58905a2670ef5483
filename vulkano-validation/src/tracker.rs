//! The registry that maps raw Vulkan handles to tracked objects.
//!
//! The dispatch glue of the layer calls into a [`StateTracker`] with the raw handles it intercepts.
//! Every method reports the violations it finds through the device's
//! [`ValidationReporter`](crate::device::ValidationReporter) and returns how many there were, so
//! that the glue never has to deal with errors itself. Objects that are created are always
//! recorded, even when their creation parameters break a rule, since the driver was called
//! anyway.

use crate::{
    command_buffer::{ActionCommand, CommandBuffer, CommandBufferCreateInfo},
    descriptor_set::{
        layout::{DescriptorSetLayout, DescriptorSetLayoutCreateInfo},
        pool::{DescriptorPool, DescriptorPoolCreateInfo},
        CopyDescriptorSet, DescriptorSet, WriteDescriptorSet,
    },
    device::Device,
    dynamic_state::{DynamicState, DynamicStateValue},
    object::{ObjectHandle, StateObject, TrackedObject},
    pipeline::{
        layout::{PipelineLayout, PipelineLayoutCreateInfo},
        Pipeline, PipelineBindPoint, PipelineCreateInfo,
    },
    render_pass::RenderPassState,
    resource::{ImageLayout, Resource, ResourceKind},
    shader::{ShaderObject, ShaderObjectCreateInfo, ShaderStage, ShaderStages},
    ValidationError, ViolationKind,
};
use ash::vk::{self, Handle};
use foldhash::HashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps raw handles to the objects that are tracked for one device.
#[derive(Debug)]
pub struct StateTracker {
    device: Arc<Device>,
    objects: RwLock<HashMap<ObjectHandle, TrackedObject>>,
}

macro_rules! getter {
    ($(#[doc = $doc:literal])* $name:ident, $handle:ty, $variant:ident, $ty:ty) => {
        $(#[doc = $doc])*
        pub fn $name(&self, handle: $handle) -> Option<Arc<$ty>> {
            match self.objects.read().get(&ObjectHandle::new(handle)) {
                Some(TrackedObject::$variant(object)) => Some(object.clone()),
                _ => None,
            }
        }
    };
}

impl StateTracker {
    /// Creates a new `StateTracker` for `device`.
    pub fn new(device: Arc<Device>) -> Self {
        StateTracker {
            device,
            objects: RwLock::new(HashMap::default()),
        }
    }

    /// Returns the device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the number of tracked objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns whether no objects are tracked.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn report(&self, errors: &[Box<ValidationError>]) -> usize {
        self.device.report(errors)
    }

    fn report_one(&self, error: Box<ValidationError>) -> usize {
        self.report(&[error])
    }

    fn insert(&self, handle: ObjectHandle, object: TrackedObject) {
        if let Some(previous) = self.objects.write().insert(handle, object) {
            warn!(object = %handle, ?previous, "handle reused without being destroyed");
        }
    }

    fn unknown(context: &'static str, handle: ObjectHandle) -> Box<ValidationError> {
        Box::new(ValidationError {
            context: context.into(),
            problem: format!("{} is not a known object", handle).into(),
            kind: ViolationKind::Liveness,
            ..Default::default()
        })
        .with_object(handle)
    }

    /// Returns the tracked resource with the given handle.
    pub fn resource(&self, handle: ObjectHandle) -> Option<Arc<Resource>> {
        match self.objects.read().get(&handle) {
            Some(TrackedObject::Resource(resource)) => Some(resource.clone()),
            _ => None,
        }
    }

    getter!(
        /// Returns the tracked descriptor set layout with the given handle.
        descriptor_set_layout, vk::DescriptorSetLayout, DescriptorSetLayout, DescriptorSetLayout
    );
    getter!(
        /// Returns the tracked descriptor pool with the given handle.
        descriptor_pool, vk::DescriptorPool, DescriptorPool, DescriptorPool
    );
    getter!(
        /// Returns the tracked descriptor set with the given handle.
        descriptor_set, vk::DescriptorSet, DescriptorSet, DescriptorSet
    );
    getter!(
        /// Returns the tracked pipeline layout with the given handle.
        pipeline_layout, vk::PipelineLayout, PipelineLayout, PipelineLayout
    );
    getter!(
        /// Returns the tracked pipeline with the given handle.
        pipeline, vk::Pipeline, Pipeline, Pipeline
    );
    getter!(
        /// Returns the tracked shader object with the given handle.
        shader_object, vk::ShaderEXT, ShaderObject, ShaderObject
    );
    getter!(
        /// Returns the tracked command buffer with the given handle.
        command_buffer, vk::CommandBuffer, CommandBuffer, CommandBuffer
    );

    /// Records the creation of a resource.
    pub fn create_resource(&self, handle: ObjectHandle, kind: ResourceKind) -> Arc<Resource> {
        let resource = Resource::new(self.device.clone(), handle, kind);
        self.insert(handle, TrackedObject::Resource(resource.clone()));

        resource
    }

    /// Records the creation of a descriptor set layout, as with `vkCreateDescriptorSetLayout`.
    pub fn create_descriptor_set_layout(
        &self,
        handle: vk::DescriptorSetLayout,
        create_info: DescriptorSetLayoutCreateInfo,
    ) -> Arc<DescriptorSetLayout> {
        if let Err(err) = create_info.validate() {
            self.report_one(err.add_context("vkCreateDescriptorSetLayout.create_info"));
        }

        let layout = DescriptorSetLayout::new(self.device.clone(), handle, create_info);
        self.insert(
            ObjectHandle::new(handle),
            TrackedObject::DescriptorSetLayout(layout.clone()),
        );

        layout
    }

    /// Records the creation of a pipeline layout, as with `vkCreatePipelineLayout`.
    pub fn create_pipeline_layout(
        &self,
        handle: vk::PipelineLayout,
        create_info: PipelineLayoutCreateInfo,
    ) -> Arc<PipelineLayout> {
        if let Err(err) = create_info.validate(&self.device) {
            self.report_one(err.add_context("vkCreatePipelineLayout.create_info"));
        }

        let layout = PipelineLayout::new(self.device.clone(), handle, create_info);
        self.insert(
            ObjectHandle::new(handle),
            TrackedObject::PipelineLayout(layout.clone()),
        );

        layout
    }

    /// Records the creation of a pipeline, as with `vkCreateGraphicsPipelines`,
    /// `vkCreateComputePipelines` or `vkCreateRayTracingPipelinesKHR`.
    pub fn create_pipeline(
        &self,
        handle: vk::Pipeline,
        create_info: PipelineCreateInfo,
    ) -> Arc<Pipeline> {
        if let Err(err) = create_info.validate(&self.device) {
            self.report_one(err.add_context("vkCreatePipelines.create_info"));
        }

        let pipeline = Pipeline::new(self.device.clone(), handle, create_info);
        self.insert(
            ObjectHandle::new(handle),
            TrackedObject::Pipeline(pipeline.clone()),
        );

        pipeline
    }

    /// Records the creation of a shader object, as with `vkCreateShadersEXT`.
    pub fn create_shader_object(
        &self,
        handle: vk::ShaderEXT,
        create_info: ShaderObjectCreateInfo,
    ) -> Arc<ShaderObject> {
        if !self.device.enabled_features().shader_object {
            self.report_one(Box::new(ValidationError {
                context: "vkCreateShadersEXT".into(),
                problem: "the `shader_object` feature is not enabled".into(),
                vuids: &["VUID-vkCreateShadersEXT-None-08400"],
                ..Default::default()
            }));
        }

        let shader = ShaderObject::new(self.device.clone(), handle, create_info);
        self.insert(
            ObjectHandle::new(handle),
            TrackedObject::ShaderObject(shader.clone()),
        );

        shader
    }

    /// Records the creation of a descriptor pool, as with `vkCreateDescriptorPool`.
    pub fn create_descriptor_pool(
        &self,
        handle: vk::DescriptorPool,
        create_info: DescriptorPoolCreateInfo,
    ) -> Arc<DescriptorPool> {
        let pool = DescriptorPool::new(self.device.clone(), handle, create_info);
        self.insert(
            ObjectHandle::new(handle),
            TrackedObject::DescriptorPool(pool.clone()),
        );

        pool
    }

    /// Records the allocation of descriptor sets, as with `vkAllocateDescriptorSets`.
    ///
    /// Each element of `sets` is the handle of the new set, the handle of its layout and its
    /// variable descriptor count. Returns the sets that could be recorded.
    pub fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        sets: &[(vk::DescriptorSet, vk::DescriptorSetLayout, u32)],
    ) -> Vec<Arc<DescriptorSet>> {
        let Some(pool_object) = self.descriptor_pool(pool) else {
            self.report_one(Self::unknown(
                "vkAllocateDescriptorSets.descriptor_pool",
                ObjectHandle::new(pool),
            ));
            return Vec::new();
        };

        let mut allocated = Vec::with_capacity(sets.len());

        for (index, &(handle, layout, variable_descriptor_count)) in sets.iter().enumerate() {
            let Some(layout) = self.descriptor_set_layout(layout) else {
                self.report_one(Self::unknown(
                    "vkAllocateDescriptorSets.set_layouts",
                    ObjectHandle::new(layout),
                ));
                continue;
            };

            match pool_object.allocate(handle, layout, variable_descriptor_count) {
                Ok(set) => {
                    self.insert(
                        ObjectHandle::new(handle),
                        TrackedObject::DescriptorSet(set.clone()),
                    );
                    allocated.push(set);
                }
                Err(err) => {
                    self.report_one(
                        err.add_context(format!("vkAllocateDescriptorSets.set_layouts[{}]", index)),
                    );
                }
            }
        }

        allocated
    }

    /// Records the freeing of descriptor sets, as with `vkFreeDescriptorSets`.
    pub fn free_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        sets: &[vk::DescriptorSet],
    ) -> usize {
        let Some(pool_object) = self.descriptor_pool(pool) else {
            return self.report_one(Self::unknown(
                "vkFreeDescriptorSets.descriptor_pool",
                ObjectHandle::new(pool),
            ));
        };

        if let Err(err) = pool_object.free(sets) {
            return self.report_one(err.add_context("vkFreeDescriptorSets"));
        }

        let mut objects = self.objects.write();

        for &set in sets {
            objects.remove(&ObjectHandle::new(set));
        }

        0
    }

    /// Records the reset of a descriptor pool, as with `vkResetDescriptorPool`.
    pub fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> usize {
        let Some(pool_object) = self.descriptor_pool(pool) else {
            return self.report_one(Self::unknown(
                "vkResetDescriptorPool.descriptor_pool",
                ObjectHandle::new(pool),
            ));
        };

        self.forget_sets(pool_object.reset());

        0
    }

    fn forget_sets(&self, sets: Vec<vk::DescriptorSet>) {
        let mut objects = self.objects.write();

        for set in sets {
            objects.remove(&ObjectHandle::new(set));
        }
    }

    /// Applies descriptor updates, as with `vkUpdateDescriptorSets`.
    ///
    /// Each write and copy is paired with the handle of its destination set.
    pub fn update_descriptor_sets(
        &self,
        writes: &[(vk::DescriptorSet, WriteDescriptorSet)],
        copies: &[(vk::DescriptorSet, CopyDescriptorSet)],
    ) -> usize {
        let mut errors = Vec::new();
        let mut updates: HashMap<
            vk::DescriptorSet,
            (Arc<DescriptorSet>, Vec<WriteDescriptorSet>, Vec<CopyDescriptorSet>),
        > = HashMap::default();

        for (index, (handle, write)) in writes.iter().enumerate() {
            match self.descriptor_set(*handle) {
                Some(set) => updates
                    .entry(*handle)
                    .or_insert_with(|| (set, Vec::new(), Vec::new()))
                    .1
                    .push(write.clone()),
                None => errors.push(
                    Self::unknown("vkUpdateDescriptorSets", ObjectHandle::new(*handle))
                        .add_context(format!("descriptor_writes[{}].dst_set", index)),
                ),
            }
        }

        for (index, (handle, copy)) in copies.iter().enumerate() {
            match self.descriptor_set(*handle) {
                Some(set) => updates
                    .entry(*handle)
                    .or_insert_with(|| (set, Vec::new(), Vec::new()))
                    .2
                    .push(copy.clone()),
                None => errors.push(
                    Self::unknown("vkUpdateDescriptorSets", ObjectHandle::new(*handle))
                        .add_context(format!("descriptor_copies[{}].dst_set", index)),
                ),
            }
        }

        for (set, writes, copies) in updates.into_values() {
            errors.extend(
                set.update(&writes, &copies)
                    .into_iter()
                    .map(|err| err.add_context("vkUpdateDescriptorSets")),
            );
        }

        self.report(&errors)
    }

    /// Records the allocation of a command buffer, as with `vkAllocateCommandBuffers`.
    pub fn allocate_command_buffer(
        &self,
        handle: vk::CommandBuffer,
        create_info: CommandBufferCreateInfo,
    ) -> Arc<CommandBuffer> {
        if let Err(err) = create_info.validate(&self.device) {
            self.report_one(err.add_context("vkAllocateCommandBuffers"));
        }

        let command_buffer = CommandBuffer::new(self.device.clone(), handle, create_info);
        self.insert(
            ObjectHandle::new(handle),
            TrackedObject::CommandBuffer(command_buffer.clone()),
        );

        command_buffer
    }

    /// Records the destruction of an object.
    ///
    /// Every object that depends on it is notified; command buffers that reference it become
    /// invalid. Destroying a pool releases its sets, and destroying a command buffer resets it.
    /// Returns whether the object was known.
    pub fn destroy(&self, handle: ObjectHandle) -> bool {
        let Some(object) = self.objects.write().remove(&handle) else {
            debug!(object = %handle, "destroying an unknown object");
            return false;
        };

        match &object {
            TrackedObject::DescriptorPool(pool) => {
                self.forget_sets(pool.reset());
                pool.node().destroy(handle);
            }
            TrackedObject::DescriptorSet(set) => set.release(),
            TrackedObject::CommandBuffer(command_buffer) => {
                command_buffer.reset();
                command_buffer.node().destroy(handle);
            }
            object => object.as_state_object().node().destroy(handle),
        }

        true
    }

    fn with_command_buffer(
        &self,
        context: &'static str,
        handle: vk::CommandBuffer,
        f: impl FnOnce(&CommandBuffer) -> Vec<Box<ValidationError>>,
    ) -> usize {
        match self.command_buffer(handle) {
            Some(command_buffer) => self.report(&f(&command_buffer)),
            None => self.report_one(Self::unknown(context, ObjectHandle::new(handle))),
        }
    }

    /// Handles `vkBeginCommandBuffer`.
    pub fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> usize {
        self.with_command_buffer("vkBeginCommandBuffer", command_buffer, |cb| {
            cb.begin().err().into_iter().collect()
        })
    }

    /// Handles `vkEndCommandBuffer`.
    pub fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> usize {
        self.with_command_buffer("vkEndCommandBuffer", command_buffer, |cb| {
            cb.end().err().into_iter().collect()
        })
    }

    /// Handles `vkResetCommandBuffer`.
    pub fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> usize {
        self.with_command_buffer("vkResetCommandBuffer", command_buffer, |cb| {
            cb.reset();
            Vec::new()
        })
    }

    /// Handles `vkCmdBindPipeline`.
    pub fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline: vk::Pipeline,
    ) -> usize {
        let Some(pipeline_object) = self.pipeline(pipeline) else {
            return self.report_one(Self::unknown(
                "vkCmdBindPipeline.pipeline",
                ObjectHandle::new(pipeline),
            ));
        };

        self.with_command_buffer("vkCmdBindPipeline", command_buffer, |cb| {
            cb.bind_pipeline(&pipeline_object)
        })
    }

    /// Handles `vkCmdBindShadersEXT`. A null shader handle unbinds the stage.
    pub fn cmd_bind_shaders(
        &self,
        command_buffer: vk::CommandBuffer,
        stages: &[(ShaderStage, vk::ShaderEXT)],
    ) -> usize {
        let mut errors = Vec::new();
        let shaders: Vec<_> = stages
            .iter()
            .filter_map(|&(stage, shader)| {
                if shader.is_null() {
                    return Some((stage, None));
                }

                match self.shader_object(shader) {
                    Some(shader) => Some((stage, Some(shader))),
                    None => {
                        errors.push(Self::unknown(
                            "vkCmdBindShadersEXT.shaders",
                            ObjectHandle::new(shader),
                        ));
                        None
                    }
                }
            })
            .collect();

        self.report(&errors)
            + self.with_command_buffer("vkCmdBindShadersEXT", command_buffer, |cb| {
                cb.bind_shaders(&shaders)
            })
    }

    /// Handles `vkCmdBindDescriptorSets`. Null set handles bind null descriptor sets.
    pub fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) -> usize {
        let Some(layout_object) = self.pipeline_layout(layout) else {
            return self.report_one(Self::unknown(
                "vkCmdBindDescriptorSets.layout",
                ObjectHandle::new(layout),
            ));
        };

        let mut errors = Vec::new();
        let mut objects = Vec::with_capacity(sets.len());

        for (index, &set) in sets.iter().enumerate() {
            if set.is_null() {
                objects.push(None);
                continue;
            }

            match self.descriptor_set(set) {
                Some(object) => objects.push(Some(object)),
                None => errors.push(
                    Self::unknown("vkCmdBindDescriptorSets", ObjectHandle::new(set))
                        .add_context(format!("descriptor_sets[{}]", index)),
                ),
            }
        }

        // An unknown set leaves the bind point as it was.
        if !errors.is_empty() {
            return self.report(&errors);
        }

        self.with_command_buffer("vkCmdBindDescriptorSets", command_buffer, |cb| {
            cb.bind_descriptor_sets(
                bind_point,
                &layout_object,
                first_set,
                &objects,
                dynamic_offsets,
            )
        })
    }

    /// Handles `vkCmdPushDescriptorSetKHR`.
    pub fn cmd_push_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: u32,
        writes: &[WriteDescriptorSet],
    ) -> usize {
        let Some(layout_object) = self.pipeline_layout(layout) else {
            return self.report_one(Self::unknown(
                "vkCmdPushDescriptorSetKHR.layout",
                ObjectHandle::new(layout),
            ));
        };

        self.with_command_buffer("vkCmdPushDescriptorSetKHR", command_buffer, |cb| {
            cb.push_descriptor_set(bind_point, &layout_object, set, writes)
        })
    }

    /// Handles `vkCmdSetDescriptorBufferOffsetsEXT`.
    pub fn cmd_set_descriptor_buffer_offsets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        bindings: &[(u32, vk::DeviceSize)],
    ) -> usize {
        let Some(layout_object) = self.pipeline_layout(layout) else {
            return self.report_one(Self::unknown(
                "vkCmdSetDescriptorBufferOffsetsEXT.layout",
                ObjectHandle::new(layout),
            ));
        };

        self.with_command_buffer("vkCmdSetDescriptorBufferOffsetsEXT", command_buffer, |cb| {
            cb.bind_descriptor_buffer_offsets(bind_point, &layout_object, first_set, bindings)
        })
    }

    /// Handles the `vkCmdSet*` commands for dynamic state.
    pub fn cmd_set_dynamic_state(
        &self,
        command_buffer: vk::CommandBuffer,
        state: DynamicState,
        value: DynamicStateValue,
    ) -> usize {
        self.with_command_buffer(state.set_command(), command_buffer, |cb| {
            cb.set_dynamic_state(state, value)
        })
    }

    /// Handles `vkCmdPushConstants`.
    pub fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: ShaderStages,
        offset: u32,
        size: u32,
    ) -> usize {
        let Some(layout_object) = self.pipeline_layout(layout) else {
            return self.report_one(Self::unknown(
                "vkCmdPushConstants.layout",
                ObjectHandle::new(layout),
            ));
        };

        self.with_command_buffer("vkCmdPushConstants", command_buffer, |cb| {
            cb.push_constants(&layout_object, stages, offset, size)
        })
    }

    /// Handles `vkCmdBeginRenderPass` and `vkCmdBeginRendering`.
    pub fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        state: RenderPassState,
    ) -> usize {
        self.with_command_buffer("vkCmdBeginRenderPass", command_buffer, |cb| {
            cb.begin_render_pass(state)
        })
    }

    /// Handles `vkCmdNextSubpass`.
    pub fn cmd_next_subpass(
        &self,
        command_buffer: vk::CommandBuffer,
        color_attachment_count: u32,
        has_depth_attachment: bool,
        has_stencil_attachment: bool,
    ) -> usize {
        self.with_command_buffer("vkCmdNextSubpass", command_buffer, |cb| {
            cb.next_subpass(
                color_attachment_count,
                has_depth_attachment,
                has_stencil_attachment,
            )
        })
    }

    /// Handles `vkCmdEndRenderPass` and `vkCmdEndRendering`.
    pub fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) -> usize {
        self.with_command_buffer("vkCmdEndRenderPass", command_buffer, |cb| {
            cb.end_render_pass()
        })
    }

    /// Handles an image layout transition recorded by `vkCmdPipelineBarrier`.
    pub fn cmd_image_layout_transition(
        &self,
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
        layout: ImageLayout,
    ) -> usize {
        self.with_command_buffer("vkCmdPipelineBarrier", command_buffer, |cb| {
            cb.image_layout_transition(image, layout)
        })
    }

    /// Handles the draw, dispatch, trace rays and dispatch graph commands.
    pub fn cmd_action(&self, command_buffer: vk::CommandBuffer, command: ActionCommand) -> usize {
        self.with_command_buffer(command.name(), command_buffer, |cb| {
            cb.validate_action(command)
        })
    }

    /// Handles `vkQueueSubmit` for the given command buffers.
    pub fn queue_submit(&self, command_buffers: &[vk::CommandBuffer]) -> usize {
        command_buffers
            .iter()
            .map(|&command_buffer| {
                self.with_command_buffer("vkQueueSubmit", command_buffer, |cb| {
                    cb.validate_submit()
                })
            })
            .sum()
    }
}
