//! The recording state of command buffers.
//!
//! A [`CommandBuffer`] follows the lifecycle of a Vulkan command buffer: it is begun, commands are
//! recorded into it, it is ended and then submitted. While recording, every binding command
//! updates the [`LastBound`] state of its pipeline bind point, and every action command is checked
//! against that state with [`CommandBuffer::validate_action`].
//!
//! The command buffer is a parent, in the [object graph](crate::object), of every object that a
//! recorded command references. When one of those objects is destroyed, the command buffer moves
//! into an invalid state and remembers which binding was broken, so that the violation can be
//! reported when the command buffer is submitted.

pub use self::{
    last_bound::{
        BindCommand, BoundSet, DescriptorBufferBinding, DescriptorSetSlot, LastBound,
        ShaderBinding, SlotContent,
    },
    validate::ActionCommand,
};
pub(crate) use self::validate::ActionCommand as VUIDType;
use crate::{
    descriptor_set::{
        layout::{DescriptorSetLayoutCreateFlags, DescriptorType},
        DescriptorSet, WriteDescriptorSet,
    },
    device::Device,
    dynamic_state::{DynamicState, DynamicStateStatus, DynamicStateValue},
    macros::vulkan_enum,
    object::{ChildLinks, ObjectHandle, ObjectNode, StateObject},
    pipeline::{
        layout::{PipelineLayout, PushConstantRangesId},
        Pipeline, PipelineBindPoint, PipelineCreateFlags,
    },
    render_pass::RenderPassState,
    resource::ImageLayout,
    shader::{ShaderObject, ShaderStage, ShaderStages},
    DeviceSize, NonExhaustive, ValidationError, ViolationKind,
};
use ash::vk;
use crossbeam_queue::SegQueue;
use foldhash::{HashMap, HashSet};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use rangemap::RangeSet;
use smallvec::SmallVec;
use std::{
    fmt::{Debug, Error as FmtError, Formatter},
    num::NonZero,
    ops::Range,
    sync::{Arc, Weak},
};
use tracing::{debug, trace};

mod last_bound;
mod validate;

vulkan_enum! {
    /// The level of a command buffer.
    CommandBufferLevel = CommandBufferLevel(i32);

    /// Can be submitted to a queue.
    Primary = PRIMARY,

    /// Can only be executed from a primary command buffer.
    Secondary = SECONDARY,
}

/// The lifecycle state of a command buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandBufferState {
    /// Allocated or reset, and not yet begun.
    New,

    /// Between `vkBeginCommandBuffer` and `vkEndCommandBuffer`.
    Recording,

    /// Ended and ready to be submitted.
    Recorded,

    /// An object referenced by the command buffer was destroyed while it was being recorded.
    InvalidIncomplete,

    /// An object referenced by the command buffer was destroyed after it was ended.
    InvalidComplete,
}

impl CommandBufferState {
    /// Returns whether the state is one of the invalid states.
    #[inline]
    pub fn is_invalid(self) -> bool {
        matches!(
            self,
            CommandBufferState::InvalidIncomplete | CommandBufferState::InvalidComplete
        )
    }
}

/// A binding that was broken by the destruction of an object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokenBinding {
    /// The objects from the one that was destroyed up to the direct child of the command buffer.
    pub chain: SmallVec<[ObjectHandle; 4]>,
}

impl BrokenBinding {
    /// Returns the object that was destroyed.
    #[inline]
    pub fn destroyed(&self) -> Option<ObjectHandle> {
        self.chain.first().copied()
    }
}

type DeferredCheck = Box<dyn Fn() -> Vec<Box<ValidationError>> + Send + Sync>;

#[derive(Debug, Default)]
struct PushConstantsState {
    layout: Option<PushConstantRangesId>,
    pushed: RangeSet<u32>,
}

#[derive(Debug)]
struct CommandBufferInner {
    state: CommandBufferState,
    last_bound: [LastBound; PipelineBindPoint::COUNT],
    dynamic_state: DynamicStateStatus,
    push_constants: PushConstantsState,
    render_pass: Option<RenderPassState>,
    image_layouts: HashMap<vk::Image, ImageLayout>,
    image_layout_change_count: u64,
    children: ChildLinks,
    broken_bindings: Vec<BrokenBinding>,
    deferred_keys: HashSet<(NonZero<u64>, u32)>,
    descriptor_walks: u64,
}

impl CommandBufferInner {
    fn new() -> Self {
        Self {
            state: CommandBufferState::New,
            last_bound: PipelineBindPoint::ALL.map(LastBound::new),
            dynamic_state: DynamicStateStatus::default(),
            push_constants: PushConstantsState::default(),
            render_pass: None,
            image_layouts: HashMap::default(),
            image_layout_change_count: 0,
            children: ChildLinks::default(),
            broken_bindings: Vec::new(),
            deferred_keys: HashSet::default(),
            descriptor_walks: 0,
        }
    }

    /// Returns to the state of a new command buffer, returning the push descriptor sets that were
    /// owned so that they can be released once the lock is dropped.
    fn reset(&mut self, this: ObjectHandle) -> SmallVec<[Arc<DescriptorSet>; 2]> {
        let released = self
            .last_bound
            .iter_mut()
            .filter_map(LastBound::reset)
            .collect();

        self.children.clear(this);
        self.state = CommandBufferState::New;
        self.dynamic_state.reset();
        self.push_constants = PushConstantsState::default();
        self.render_pass = None;
        self.image_layouts.clear();
        self.image_layout_change_count = 0;
        self.broken_bindings.clear();
        self.deferred_keys.clear();

        released
    }

    fn link(
        &mut self,
        this: ObjectHandle,
        this_ref: &Weak<dyn StateObject>,
        child: Arc<dyn StateObject>,
    ) {
        if !self.children.contains(child.handle()) {
            self.children.add(this, this_ref, &child);
        }
    }
}

/// A command buffer that is being tracked.
pub struct CommandBuffer {
    handle: vk::CommandBuffer,
    device: Arc<Device>,
    level: CommandBufferLevel,
    protected: bool,
    node: ObjectNode,
    weak: Weak<dyn StateObject>,

    inner: RwLock<CommandBufferInner>,
    deferred: SegQueue<DeferredCheck>,
}

impl CommandBuffer {
    /// Creates a new `CommandBuffer`.
    pub fn new(
        device: Arc<Device>,
        handle: vk::CommandBuffer,
        create_info: CommandBufferCreateInfo,
    ) -> Arc<CommandBuffer> {
        let CommandBufferCreateInfo {
            level,
            protected,
            _ne: _,
        } = create_info;

        Arc::new_cyclic(|weak: &Weak<CommandBuffer>| {
            let weak: Weak<dyn StateObject> = weak.clone();

            CommandBuffer {
                handle,
                device,
                level,
                protected,
                node: ObjectNode::new(),
                weak,
                inner: RwLock::new(CommandBufferInner::new()),
                deferred: SegQueue::new(),
            }
        })
    }

    /// Returns the raw handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    /// Returns the device that the command buffer belongs to.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the level of the command buffer.
    #[inline]
    pub fn level(&self) -> CommandBufferLevel {
        self.level
    }

    /// Returns whether the command buffer is protected.
    #[inline]
    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// Returns the command buffer as an `ObjectHandle`.
    #[inline]
    pub fn object_handle(&self) -> ObjectHandle {
        ObjectHandle::new(self.handle)
    }

    /// Returns the lifecycle state.
    #[inline]
    pub fn state(&self) -> CommandBufferState {
        self.inner.read().state
    }

    /// Returns the bindings that were broken since the command buffer was last reset.
    pub fn broken_bindings(&self) -> Vec<BrokenBinding> {
        self.inner.read().broken_bindings.clone()
    }

    /// Returns the binding state of `bind_point`.
    pub fn last_bound(
        &self,
        bind_point: PipelineBindPoint,
    ) -> MappedRwLockReadGuard<'_, LastBound> {
        RwLockReadGuard::map(self.inner.read(), |inner| {
            &inner.last_bound[bind_point.index()]
        })
    }

    /// Returns the dynamic state that has been set.
    pub fn dynamic_state(&self) -> MappedRwLockReadGuard<'_, DynamicStateStatus> {
        RwLockReadGuard::map(self.inner.read(), |inner| &inner.dynamic_state)
    }

    /// Returns the active render pass instance.
    pub fn render_pass(&self) -> Option<RenderPassState> {
        self.inner.read().render_pass.clone()
    }

    /// Returns the layout that `image` was last transitioned to in this command buffer.
    pub fn image_layout(&self, image: vk::Image) -> Option<ImageLayout> {
        self.inner.read().image_layouts.get(&image).copied()
    }

    /// Returns the number of image layout changes recorded so far.
    pub fn image_layout_change_count(&self) -> u64 {
        self.inner.read().image_layout_change_count
    }

    /// Returns whether every byte of `range` has been pushed since the push constant layout last
    /// changed.
    pub fn are_push_constants_set(&self, range: Range<u32>) -> bool {
        range.is_empty()
            || self
                .inner
                .read()
                .push_constants
                .pushed
                .gaps(&range)
                .next()
                .is_none()
    }

    /// Returns how many times the contents of a descriptor set were examined by
    /// [`validate_action`](Self::validate_action), rather than skipped because nothing changed.
    pub fn descriptor_walk_count(&self) -> u64 {
        self.inner.read().descriptor_walks
    }

    fn recording_error(
        &self,
        state: CommandBufferState,
        vuids: &'static [&'static str],
    ) -> Box<ValidationError> {
        let problem = match state {
            CommandBufferState::InvalidIncomplete | CommandBufferState::InvalidComplete => {
                "the command buffer was invalidated because an object it references was \
                destroyed"
            }
            _ => "the command buffer is not in the recording state",
        };

        Box::new(ValidationError {
            problem: problem.into(),
            vuids,
            ..Default::default()
        })
        .with_object(self.object_handle())
    }

    fn check_recording(
        &self,
        inner: &CommandBufferInner,
        vuids: &'static [&'static str],
    ) -> Result<(), Box<ValidationError>> {
        if inner.state != CommandBufferState::Recording {
            return Err(self.recording_error(inner.state, vuids));
        }

        Ok(())
    }

    /// Begins recording, as with `vkBeginCommandBuffer`. This implicitly resets the command
    /// buffer.
    pub fn begin(&self) -> Result<(), Box<ValidationError>> {
        let released = {
            let mut inner = self.inner.write();

            if inner.state == CommandBufferState::Recording {
                return Err(Box::new(ValidationError {
                    context: "vkBeginCommandBuffer".into(),
                    problem: "the command buffer is already in the recording state".into(),
                    vuids: &["VUID-vkBeginCommandBuffer-commandBuffer-00049"],
                    ..Default::default()
                })
                .with_object(self.object_handle()));
            }

            let released = inner.reset(self.object_handle());
            inner.state = CommandBufferState::Recording;

            released
        };

        self.drain_deferred();
        release_push_sets(released);
        trace!(command_buffer = %self.object_handle(), "recording begun");

        Ok(())
    }

    /// Ends recording, as with `vkEndCommandBuffer`.
    pub fn end(&self) -> Result<(), Box<ValidationError>> {
        let mut inner = self.inner.write();

        self.check_recording(&inner, &["VUID-vkEndCommandBuffer-commandBuffer-00059"])
            .map_err(|err| err.add_context("vkEndCommandBuffer"))?;

        if self.level == CommandBufferLevel::Primary && inner.render_pass.is_some() {
            return Err(Box::new(ValidationError {
                context: "vkEndCommandBuffer".into(),
                problem: "a render pass instance is still active".into(),
                vuids: &["VUID-vkEndCommandBuffer-commandBuffer-00060"],
                ..Default::default()
            })
            .with_object(self.object_handle()));
        }

        inner.state = CommandBufferState::Recorded;
        trace!(command_buffer = %self.object_handle(), "recording ended");

        Ok(())
    }

    /// Resets the command buffer to the initial state, dropping every link to referenced objects.
    pub fn reset(&self) {
        let released = self.inner.write().reset(self.object_handle());

        self.drain_deferred();
        release_push_sets(released);
        debug!(command_buffer = %self.object_handle(), "command buffer reset");
    }

    fn drain_deferred(&self) {
        while self.deferred.pop().is_some() {}
    }

    /// Binds a pipeline, as with `vkCmdBindPipeline`.
    pub fn bind_pipeline(&self, pipeline: &Arc<Pipeline>) -> Vec<Box<ValidationError>> {
        let mut inner = self.inner.write();
        let mut errors = Vec::new();

        if let Err(err) =
            self.check_recording(&inner, &["VUID-vkCmdBindPipeline-commandBuffer-recording"])
        {
            errors.push(err.add_context("vkCmdBindPipeline"));
            return errors;
        }

        if pipeline.is_library() {
            errors.push(Box::new(ValidationError {
                context: "vkCmdBindPipeline".into(),
                problem: "the pipeline is a pipeline library".into(),
                vuids: &["VUID-vkCmdBindPipeline-pipeline-03382"],
                ..Default::default()
            })
            .with_object(pipeline.object_handle()));
        }

        if self.protected
            && pipeline
                .flags()
                .intersects(PipelineCreateFlags::NO_PROTECTED_ACCESS)
        {
            errors.push(Box::new(ValidationError {
                context: "vkCmdBindPipeline".into(),
                problem: "the command buffer is protected, but the pipeline was created with \
                    `PipelineCreateFlags::NO_PROTECTED_ACCESS`"
                    .into(),
                vuids: &["VUID-vkCmdBindPipeline-pipelineProtectedAccess-07408"],
                ..Default::default()
            })
            .with_object(pipeline.object_handle()));
        }

        if !self.protected
            && pipeline
                .flags()
                .intersects(PipelineCreateFlags::PROTECTED_ACCESS_ONLY)
        {
            errors.push(Box::new(ValidationError {
                context: "vkCmdBindPipeline".into(),
                problem: "the command buffer is not protected, but the pipeline was created \
                    with `PipelineCreateFlags::PROTECTED_ACCESS_ONLY`"
                    .into(),
                vuids: &["VUID-vkCmdBindPipeline-pipelineProtectedAccess-07409"],
                ..Default::default()
            })
            .with_object(pipeline.object_handle()));
        }

        let this = self.object_handle();
        inner.link(this, &self.weak, pipeline.clone());

        let bind_point = pipeline.bind_point();
        inner.last_bound[bind_point.index()].bind_pipeline(pipeline.clone());

        if let Some(category) = bind_point.dynamic_state_category() {
            inner.dynamic_state.record_bind_pipeline(
                pipeline.object_handle(),
                category,
                pipeline.dynamic_state(),
            );
        }

        trace!(
            command_buffer = %this,
            pipeline = %pipeline.object_handle(),
            ?bind_point,
            "pipeline bound",
        );

        errors
    }

    /// Binds shader objects, as with `vkCmdBindShadersEXT`. A `None` shader unbinds the stage.
    pub fn bind_shaders(
        &self,
        shaders: &[(ShaderStage, Option<Arc<ShaderObject>>)],
    ) -> Vec<Box<ValidationError>> {
        let mut inner = self.inner.write();
        let mut errors = Vec::new();

        if let Err(err) =
            self.check_recording(&inner, &["VUID-vkCmdBindShadersEXT-commandBuffer-recording"])
        {
            errors.push(err.add_context("vkCmdBindShadersEXT"));
            return errors;
        }

        if !self.device.enabled_features().shader_object {
            errors.push(Box::new(ValidationError {
                context: "vkCmdBindShadersEXT".into(),
                problem: "the `shader_object` feature is not enabled".into(),
                vuids: &["VUID-vkCmdBindShadersEXT-None-08462"],
                ..Default::default()
            }));
            return errors;
        }

        let this = self.object_handle();
        let mut graphics_bound = false;

        for (index, (stage, shader)) in shaders.iter().enumerate() {
            let bind_point = match stage {
                ShaderStage::Compute => PipelineBindPoint::Compute,
                stage if stage.is_graphics() => PipelineBindPoint::Graphics,
                _ => {
                    errors.push(Box::new(ValidationError {
                        context: format!("vkCmdBindShadersEXT.stages[{}]", index).into(),
                        problem: "is not a graphics or compute stage".into(),
                        vuids: &["VUID-vkCmdBindShadersEXT-pStages-08464"],
                        ..Default::default()
                    }));
                    continue;
                }
            };

            if let Some(shader) = shader {
                if shader.stage() != *stage {
                    errors.push(Box::new(ValidationError {
                        context: format!("vkCmdBindShadersEXT.shaders[{}]", index).into(),
                        problem: format!(
                            "the shader was created for stage {:?}, but is bound to stage {:?}",
                            shader.stage(),
                            stage,
                        )
                        .into(),
                        vuids: &["VUID-vkCmdBindShadersEXT-pShaders-08469"],
                        ..Default::default()
                    })
                    .with_object(shader.object_handle()));
                    continue;
                }

                inner.link(this, &self.weak, shader.clone());
            }

            inner.last_bound[bind_point.index()].bind_shader(*stage, shader.clone());
            graphics_bound |= bind_point == PipelineBindPoint::Graphics;
        }

        if graphics_bound {
            inner.dynamic_state.record_bind_shaders();
        }

        errors
    }

    /// Binds descriptor sets, as with `vkCmdBindDescriptorSets`. A `None` set binds a null
    /// descriptor set.
    pub fn bind_descriptor_sets(
        &self,
        bind_point: PipelineBindPoint,
        layout: &Arc<PipelineLayout>,
        first_set: u32,
        sets: &[Option<Arc<DescriptorSet>>],
        dynamic_offsets: &[u32],
    ) -> Vec<Box<ValidationError>> {
        let mut inner = self.inner.write();

        if let Err(err) = self.check_recording(
            &inner,
            &["VUID-vkCmdBindDescriptorSets-commandBuffer-recording"],
        ) {
            return vec![err.add_context("vkCmdBindDescriptorSets")];
        }

        let errors: Vec<_> = self
            .validate_bind_descriptor_sets(layout, first_set, sets, dynamic_offsets)
            .into_iter()
            .map(|err| err.add_context("vkCmdBindDescriptorSets"))
            .collect();

        let this = self.object_handle();

        for set in sets.iter().flatten() {
            inner.link(this, &self.weak, set.clone());
        }

        let contents: SmallVec<[SlotContent; 4]> = sets
            .iter()
            .map(|set| match set {
                Some(set) => SlotContent::Set(set.clone()),
                None => SlotContent::Null,
            })
            .collect();
        inner.last_bound[bind_point.index()].update_descriptor_sets(
            layout,
            BindCommand::BindDescriptorSets,
            first_set,
            &contents,
            dynamic_offsets,
        );

        trace!(
            command_buffer = %this,
            ?bind_point,
            first_set,
            count = sets.len(),
            "descriptor sets bound",
        );

        errors
    }

    fn validate_bind_descriptor_sets(
        &self,
        layout: &PipelineLayout,
        first_set: u32,
        sets: &[Option<Arc<DescriptorSet>>],
        dynamic_offsets: &[u32],
    ) -> Vec<Box<ValidationError>> {
        let mut errors = Vec::new();
        let set_count = layout.set_layouts().len() as u32;

        if first_set as usize + sets.len() > set_count as usize {
            errors.push(Box::new(ValidationError {
                problem: format!(
                    "`first_set` + the number of sets ({}) is greater than the number of set \
                    layouts in the pipeline layout ({})",
                    first_set as usize + sets.len(),
                    set_count,
                )
                .into(),
                vuids: &["VUID-vkCmdBindDescriptorSets-firstSet-00360"],
                ..Default::default()
            }));
        }

        for (index, set) in sets.iter().enumerate() {
            let set_num = first_set + index as u32;

            let Some(set) = set else {
                if !self.device.enabled_features().graphics_pipeline_library {
                    errors.push(Box::new(ValidationError {
                        context: format!("descriptor_sets[{}]", index).into(),
                        problem: "is null, but the `graphics_pipeline_library` feature is not \
                            enabled"
                            .into(),
                        vuids: &["VUID-vkCmdBindDescriptorSets-graphicsPipelineLibrary-06754"],
                        ..Default::default()
                    }));
                }

                continue;
            };

            if set.is_destroyed() {
                errors.push(Box::new(ValidationError {
                    context: format!("descriptor_sets[{}]", index).into(),
                    problem: "has been destroyed".into(),
                    vuids: &["VUID-vkCmdBindDescriptorSets-pDescriptorSets-parameter"],
                    kind: ViolationKind::Liveness,
                    ..Default::default()
                })
                .with_object(set.object_handle()));
                continue;
            }

            if let Some(set_layout) = layout.set_layout(set_num) {
                if !set.layout().is_compatible_with(set_layout) {
                    errors.push(Box::new(ValidationError {
                        context: format!("descriptor_sets[{}]", index).into(),
                        problem: format!(
                            "the layout of the descriptor set is not compatible with the layout \
                            of set {} in the pipeline layout",
                            set_num,
                        )
                        .into(),
                        vuids: &["VUID-vkCmdBindDescriptorSets-pDescriptorSets-00358"],
                        kind: ViolationKind::Compatibility,
                        ..Default::default()
                    })
                    .with_object(set.object_handle()));
                }
            }
        }

        let required_offsets = layout.dynamic_descriptor_count(first_set, sets.len() as u32);

        if dynamic_offsets.len() != required_offsets as usize {
            errors.push(Box::new(ValidationError {
                context: "dynamic_offsets".into(),
                problem: format!(
                    "has {} elements, but the sets being bound have {} dynamic descriptors",
                    dynamic_offsets.len(),
                    required_offsets,
                )
                .into(),
                vuids: &["VUID-vkCmdBindDescriptorSets-dynamicOffsetCount-00359"],
                ..Default::default()
            }));

            return errors;
        }

        let properties = self.device.properties();
        let mut offsets = dynamic_offsets.iter().enumerate();

        for set_num in first_set..first_set + sets.len() as u32 {
            let Some(set_layout) = layout.set_layout(set_num) else {
                continue;
            };

            for binding in set_layout.bindings() {
                let (alignment, vuids): (DeviceSize, &'static [&'static str]) =
                    match binding.descriptor_type {
                        DescriptorType::UniformBufferDynamic => (
                            properties.min_uniform_buffer_offset_alignment,
                            &["VUID-vkCmdBindDescriptorSets-pDynamicOffsets-01971"],
                        ),
                        DescriptorType::StorageBufferDynamic => (
                            properties.min_storage_buffer_offset_alignment,
                            &["VUID-vkCmdBindDescriptorSets-pDynamicOffsets-01972"],
                        ),
                        _ => continue,
                    };

                for (index, &offset) in offsets.by_ref().take(binding.element_count() as usize) {
                    if alignment != 0 && DeviceSize::from(offset) % alignment != 0 {
                        errors.push(Box::new(ValidationError {
                            context: format!("dynamic_offsets[{}]", index).into(),
                            problem: format!(
                                "is not a multiple of the required alignment ({})",
                                alignment,
                            )
                            .into(),
                            vuids,
                            ..Default::default()
                        }));
                    }
                }
            }
        }

        errors
    }

    /// Binds descriptor buffer offsets, as with `vkCmdSetDescriptorBufferOffsetsEXT`. Each
    /// element of `bindings` is the index of a bound descriptor buffer and an offset into it.
    pub fn bind_descriptor_buffer_offsets(
        &self,
        bind_point: PipelineBindPoint,
        layout: &Arc<PipelineLayout>,
        first_set: u32,
        bindings: &[(u32, DeviceSize)],
    ) -> Vec<Box<ValidationError>> {
        let mut inner = self.inner.write();
        let mut errors = Vec::new();

        if let Err(err) = self.check_recording(
            &inner,
            &["VUID-vkCmdSetDescriptorBufferOffsetsEXT-commandBuffer-recording"],
        ) {
            errors.push(err.add_context("vkCmdSetDescriptorBufferOffsetsEXT"));
            return errors;
        }

        if first_set as usize + bindings.len() > layout.set_layouts().len() {
            errors.push(Box::new(ValidationError {
                context: "vkCmdSetDescriptorBufferOffsetsEXT".into(),
                problem: "`first_set` + the number of offsets is greater than the number of set \
                    layouts in the pipeline layout"
                    .into(),
                vuids: &["VUID-vkCmdSetDescriptorBufferOffsetsEXT-firstSet-08066"],
                ..Default::default()
            }));
        }

        for set_num in first_set..first_set + bindings.len() as u32 {
            if let Some(set_layout) = layout.set_layout(set_num) {
                if !set_layout
                    .flags()
                    .intersects(DescriptorSetLayoutCreateFlags::DESCRIPTOR_BUFFER)
                {
                    errors.push(Box::new(ValidationError {
                        context: "vkCmdSetDescriptorBufferOffsetsEXT".into(),
                        problem: format!(
                            "the layout of set {} was not created with \
                            `DescriptorSetLayoutCreateFlags::DESCRIPTOR_BUFFER`",
                            set_num,
                        )
                        .into(),
                        vuids: &["VUID-vkCmdSetDescriptorBufferOffsetsEXT-firstSet-09006"],
                        ..Default::default()
                    }));
                }
            }
        }

        let contents: SmallVec<[SlotContent; 4]> = bindings
            .iter()
            .map(|&(buffer_index, offset)| SlotContent::Buffer {
                buffer_index,
                offset,
            })
            .collect();
        inner.last_bound[bind_point.index()].update_descriptor_sets(
            layout,
            BindCommand::BindDescriptorBufferOffsets,
            first_set,
            &contents,
            &[],
        );

        errors
    }

    /// Pushes descriptors into set `set`, as with `vkCmdPushDescriptorSetKHR`.
    ///
    /// The push descriptor set is owned by the bind point. It is replaced when descriptors are
    /// pushed with a different set layout, and released when the command buffer is reset.
    pub fn push_descriptor_set(
        &self,
        bind_point: PipelineBindPoint,
        layout: &Arc<PipelineLayout>,
        set: u32,
        writes: &[WriteDescriptorSet],
    ) -> Vec<Box<ValidationError>> {
        let mut errors = Vec::new();

        let released = {
            let mut inner = self.inner.write();

            if let Err(err) = self.check_recording(
                &inner,
                &["VUID-vkCmdPushDescriptorSetKHR-commandBuffer-recording"],
            ) {
                errors.push(err.add_context("vkCmdPushDescriptorSetKHR"));
                return errors;
            }

            if set as usize >= layout.set_layouts().len() {
                errors.push(Box::new(ValidationError {
                    context: "vkCmdPushDescriptorSetKHR.set".into(),
                    problem: "is not less than the number of set layouts in the pipeline layout"
                        .into(),
                    vuids: &["VUID-vkCmdPushDescriptorSetKHR-set-00364"],
                    ..Default::default()
                }));
                return errors;
            }

            let set_layout = match layout.set_layout(set) {
                Some(set_layout) if set_layout.is_push_descriptor() => set_layout,
                _ => {
                    errors.push(Box::new(ValidationError {
                        context: "vkCmdPushDescriptorSetKHR.set".into(),
                        problem: "the set layout of this set in the pipeline layout was not \
                            created with `DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR`"
                            .into(),
                        vuids: &["VUID-vkCmdPushDescriptorSetKHR-set-00365"],
                        ..Default::default()
                    }));
                    return errors;
                }
            };

            let this = self.object_handle();
            let current = inner.last_bound[bind_point.index()]
                .push_descriptor_set()
                .filter(|current| Arc::ptr_eq(current.layout(), set_layout))
                .cloned();
            let push_set = match current {
                Some(current) => current,
                None => {
                    let push_set = DescriptorSet::new_push(set_layout.clone());
                    inner.link(this, &self.weak, push_set.clone());
                    push_set
                }
            };

            // Updating the set does not call back into the command buffer.
            errors.extend(
                push_set
                    .update(writes, &[])
                    .into_iter()
                    .map(|err| err.add_context("vkCmdPushDescriptorSetKHR")),
            );

            let last_bound = &mut inner.last_bound[bind_point.index()];
            let released = last_bound.set_push_descriptor_set(push_set.clone());
            last_bound.update_descriptor_sets(
                layout,
                BindCommand::PushDescriptorSet,
                set,
                &[SlotContent::Set(push_set)],
                &[],
            );

            if let Some(released) = &released {
                inner.children.remove(this, released.object_handle());
            }

            released
        };

        release_push_sets(released);

        errors
    }

    /// Sets a dynamic state, as with the `vkCmdSet*` commands.
    pub fn set_dynamic_state(
        &self,
        state: DynamicState,
        value: DynamicStateValue,
    ) -> Vec<Box<ValidationError>> {
        let mut inner = self.inner.write();

        if let Err(err) = self.check_recording(&inner, state.recording_vuids()) {
            return vec![err.add_context(state.set_command())];
        }

        inner.dynamic_state.record_set(state, value);

        Vec::new()
    }

    /// Updates push constant values, as with `vkCmdPushConstants`.
    pub fn push_constants(
        &self,
        layout: &Arc<PipelineLayout>,
        stages: ShaderStages,
        offset: u32,
        size: u32,
    ) -> Vec<Box<ValidationError>> {
        let mut inner = self.inner.write();

        if let Err(err) =
            self.check_recording(&inner, &["VUID-vkCmdPushConstants-commandBuffer-recording"])
        {
            return vec![err.add_context("vkCmdPushConstants")];
        }

        let errors: Vec<_> = self
            .validate_push_constants(layout, stages, offset, size)
            .into_iter()
            .map(|err| err.add_context("vkCmdPushConstants"))
            .collect();

        let push_constants = &mut inner.push_constants;

        if push_constants.layout.as_ref() != Some(layout.push_constant_ranges_id()) {
            push_constants.layout = Some(layout.push_constant_ranges_id().clone());
            push_constants.pushed = RangeSet::new();
        }

        if size != 0 {
            push_constants.pushed.insert(offset..offset.saturating_add(size));
        }

        errors
    }

    fn validate_push_constants(
        &self,
        layout: &PipelineLayout,
        stages: ShaderStages,
        offset: u32,
        size: u32,
    ) -> Vec<Box<ValidationError>> {
        let mut errors = Vec::new();

        if offset % 4 != 0 {
            errors.push(Box::new(ValidationError {
                context: "offset".into(),
                problem: "is not a multiple of 4".into(),
                vuids: &["VUID-vkCmdPushConstants-offset-00368"],
                ..Default::default()
            }));
        }

        if size % 4 != 0 {
            errors.push(Box::new(ValidationError {
                context: "size".into(),
                problem: "is not a multiple of 4".into(),
                vuids: &["VUID-vkCmdPushConstants-size-00369"],
                ..Default::default()
            }));
        }

        let max_size = self.device.properties().max_push_constants_size;

        if offset >= max_size || size > max_size - offset.min(max_size) {
            errors.push(Box::new(ValidationError {
                context: "offset + size".into(),
                problem: format!(
                    "is greater than the `max_push_constants_size` limit ({})",
                    max_size,
                )
                .into(),
                vuids: &[
                    "VUID-vkCmdPushConstants-offset-00370",
                    "VUID-vkCmdPushConstants-size-00371",
                ],
                ..Default::default()
            }));
        }

        let end = offset.saturating_add(size);
        let mut covered = offset;

        for range in layout.push_constant_ranges_disjoint() {
            let range_end = range.end();

            if range_end <= offset || range.offset >= end {
                continue;
            }

            if !stages.contains(range.stages) {
                errors.push(Box::new(ValidationError {
                    context: "stages".into(),
                    problem: format!(
                        "does not contain every stage of the push constant range of the \
                        pipeline layout that overlaps bytes {}..{}",
                        range.offset.max(offset),
                        range_end.min(end),
                    )
                    .into(),
                    vuids: &["VUID-vkCmdPushConstants-offset-01796"],
                    kind: ViolationKind::Compatibility,
                    ..Default::default()
                }));
            }

            if range.stages.contains(stages) && range.offset <= covered {
                covered = covered.max(range_end);
            }
        }

        if covered < end {
            errors.push(Box::new(ValidationError {
                context: "offset + size".into(),
                problem: format!(
                    "bytes {}..{} are not covered by a push constant range of the pipeline \
                    layout that includes every stage in `stages`",
                    covered, end,
                )
                .into(),
                vuids: &["VUID-vkCmdPushConstants-offset-01795"],
                kind: ViolationKind::Compatibility,
                ..Default::default()
            }));
        }

        errors
    }

    /// Begins a render pass instance, as with `vkCmdBeginRenderPass` or `vkCmdBeginRendering`.
    pub fn begin_render_pass(&self, state: RenderPassState) -> Vec<Box<ValidationError>> {
        let mut inner = self.inner.write();

        if let Err(err) =
            self.check_recording(&inner, &["VUID-vkCmdBeginRenderPass-commandBuffer-recording"])
        {
            return vec![err.add_context("vkCmdBeginRenderPass")];
        }

        if inner.render_pass.is_some() {
            return vec![Box::new(ValidationError {
                context: "vkCmdBeginRenderPass".into(),
                problem: "a render pass instance is already active".into(),
                vuids: &["VUID-vkCmdBeginRenderPass-renderpass"],
                ..Default::default()
            })];
        }

        inner.render_pass = Some(state);

        Vec::new()
    }

    /// Moves to the next subpass, as with `vkCmdNextSubpass`.
    pub fn next_subpass(
        &self,
        color_attachment_count: u32,
        has_depth_attachment: bool,
        has_stencil_attachment: bool,
    ) -> Vec<Box<ValidationError>> {
        let mut inner = self.inner.write();

        match &mut inner.render_pass {
            Some(render_pass) if !render_pass.is_dynamic_rendering() => {
                render_pass.next_subpass(
                    color_attachment_count,
                    has_depth_attachment,
                    has_stencil_attachment,
                );

                Vec::new()
            }
            _ => vec![Box::new(ValidationError {
                context: "vkCmdNextSubpass".into(),
                problem: "no render pass object instance is active".into(),
                vuids: &["VUID-vkCmdNextSubpass-renderpass"],
                ..Default::default()
            })],
        }
    }

    /// Ends the active render pass instance, as with `vkCmdEndRenderPass` or
    /// `vkCmdEndRendering`.
    pub fn end_render_pass(&self) -> Vec<Box<ValidationError>> {
        let mut inner = self.inner.write();

        if inner.render_pass.take().is_none() {
            return vec![Box::new(ValidationError {
                context: "vkCmdEndRenderPass".into(),
                problem: "no render pass instance is active".into(),
                vuids: &["VUID-vkCmdEndRenderPass-renderpass"],
                ..Default::default()
            })];
        }

        Vec::new()
    }

    /// Records that `image` was transitioned to `layout` by a barrier or render pass.
    pub fn image_layout_transition(
        &self,
        image: vk::Image,
        layout: ImageLayout,
    ) -> Vec<Box<ValidationError>> {
        let mut inner = self.inner.write();

        if let Err(err) =
            self.check_recording(&inner, &["VUID-vkCmdPipelineBarrier-commandBuffer-recording"])
        {
            return vec![err.add_context("vkCmdPipelineBarrier")];
        }

        if inner.image_layouts.insert(image, layout) != Some(layout) {
            inner.image_layout_change_count += 1;
        }

        Vec::new()
    }

    /// Checks that the command buffer can be submitted, as with `vkQueueSubmit`.
    ///
    /// Checks that were deferred while recording, for descriptors that may still be updated after
    /// they are bound, are run here.
    pub fn validate_submit(&self) -> Vec<Box<ValidationError>> {
        let mut errors = Vec::new();

        {
            let inner = self.inner.read();

            match inner.state {
                CommandBufferState::Recorded => (),
                CommandBufferState::InvalidComplete | CommandBufferState::InvalidIncomplete => {
                    let mut error = Box::new(ValidationError {
                        context: "vkQueueSubmit".into(),
                        problem: "the command buffer is invalid because objects that it \
                            references were destroyed"
                            .into(),
                        vuids: &["VUID-vkQueueSubmit-pCommandBuffers-00070"],
                        kind: ViolationKind::Liveness,
                        ..Default::default()
                    })
                    .with_object(self.object_handle());

                    for destroyed in inner
                        .broken_bindings
                        .iter()
                        .filter_map(BrokenBinding::destroyed)
                    {
                        error = error.with_object(destroyed);
                    }

                    errors.push(error);
                    return errors;
                }
                state => {
                    errors.push(Box::new(ValidationError {
                        context: "vkQueueSubmit".into(),
                        problem: format!(
                            "the command buffer is in the {:?} state, not the executable state",
                            state,
                        )
                        .into(),
                        vuids: &["VUID-vkQueueSubmit-pCommandBuffers-00070"],
                        ..Default::default()
                    })
                    .with_object(self.object_handle()));
                    return errors;
                }
            }
        }

        let mut checks = Vec::with_capacity(self.deferred.len());

        while let Some(check) = self.deferred.pop() {
            errors.extend(check());
            checks.push(check);
        }

        for check in checks {
            self.deferred.push(check);
        }

        errors
    }
}

fn release_push_sets(sets: impl IntoIterator<Item = Arc<DescriptorSet>>) {
    for set in sets {
        set.release();
    }
}

impl StateObject for CommandBuffer {
    #[inline]
    fn handle(&self) -> ObjectHandle {
        self.object_handle()
    }

    #[inline]
    fn node(&self) -> &ObjectNode {
        &self.node
    }

    fn notify_invalid(&self, chain: &[ObjectHandle], unlink: bool) {
        {
            let mut inner = self.inner.write();

            if unlink {
                if let [child] = chain {
                    inner.children.forget(*child);
                }
            }

            inner.state = match inner.state {
                CommandBufferState::Recording => CommandBufferState::InvalidIncomplete,
                CommandBufferState::Recorded => CommandBufferState::InvalidComplete,
                state => state,
            };
            inner.broken_bindings.push(BrokenBinding {
                chain: chain.iter().copied().collect(),
            });

            debug!(
                command_buffer = %self.object_handle(),
                state = ?inner.state,
                chain = ?chain,
                "command buffer invalidated",
            );
        }

        self.node.notify_parents(self.object_handle(), chain, unlink);
    }
}

impl Debug for CommandBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_struct("CommandBuffer")
            .field("handle", &self.handle)
            .field("level", &self.level)
            .field("protected", &self.protected)
            .field("state", &self.inner.try_read().map(|inner| inner.state))
            .finish_non_exhaustive()
    }
}

/// Parameters to create a new `CommandBuffer`.
#[derive(Clone, Debug)]
pub struct CommandBufferCreateInfo {
    /// The level of the command buffer.
    ///
    /// The default value is [`CommandBufferLevel::Primary`].
    pub level: CommandBufferLevel,

    /// Whether the command buffer is allocated from a protected pool.
    ///
    /// The default value is `false`.
    pub protected: bool,

    pub _ne: NonExhaustive,
}

impl Default for CommandBufferCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            level: CommandBufferLevel::Primary,
            protected: false,
            _ne: NonExhaustive(()),
        }
    }
}

impl CommandBufferCreateInfo {
    pub(crate) fn validate(&self, device: &Device) -> Result<(), Box<ValidationError>> {
        if self.protected && !device.enabled_features().protected_memory {
            return Err(Box::new(ValidationError {
                context: "protected".into(),
                problem: "is `true`, but the `protected_memory` feature is not enabled".into(),
                vuids: &["VUID-VkCommandPoolCreateInfo-flags-02860"],
                ..Default::default()
            }));
        }

        Ok(())
    }
}
