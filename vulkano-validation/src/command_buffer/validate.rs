use super::{
    last_bound::{LastBound, RequirementsKey, ShaderBinding},
    CommandBuffer, CommandBufferInner, CommandBufferState, DeferredCheck, VUIDType,
};
use crate::{
    descriptor_set::{
        layout::{DescriptorBindingFlags, DescriptorType},
        DescriptorBinding, DescriptorSet,
    },
    dynamic_state::{DynamicState, DynamicStateCategory, DynamicStateValue, DynamicStates},
    macros::vuids,
    object::ObjectHandle,
    pipeline::{
        layout::{PipelineLayout, PushConstantRange},
        Pipeline, PipelineBindPoint,
    },
    resource::ImageLayout,
    shader::{DescriptorBindingRequirements, ShaderObject, ShaderStage, ShaderStages},
    ValidationError, ViolationKind,
};
use ash::vk;
use foldhash::HashMap;
use smallvec::SmallVec;
use std::{
    collections::BTreeMap,
    ops::Range,
    sync::{Arc, Weak},
};
use tracing::{debug, trace};

/// A command that executes work with the state bound at a pipeline bind point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionCommand {
    Dispatch,
    DispatchIndirect,
    Draw,
    DrawIndirect,
    DrawIndexed,
    DrawIndexedIndirect,
    DrawMeshTasks,
    DrawMeshTasksIndirect,
    TraceRays,
    TraceRaysIndirect,
    DispatchGraph,
}

impl ActionCommand {
    /// Returns the bind point whose state the command uses.
    #[inline]
    pub fn bind_point(self) -> PipelineBindPoint {
        match self {
            ActionCommand::Dispatch | ActionCommand::DispatchIndirect => PipelineBindPoint::Compute,
            ActionCommand::Draw
            | ActionCommand::DrawIndirect
            | ActionCommand::DrawIndexed
            | ActionCommand::DrawIndexedIndirect
            | ActionCommand::DrawMeshTasks
            | ActionCommand::DrawMeshTasksIndirect => PipelineBindPoint::Graphics,
            ActionCommand::TraceRays | ActionCommand::TraceRaysIndirect => {
                PipelineBindPoint::RayTracing
            }
            ActionCommand::DispatchGraph => PipelineBindPoint::ExecutionGraph,
        }
    }

    /// Returns the name of the Vulkan command.
    pub fn name(self) -> &'static str {
        match self {
            ActionCommand::Dispatch => "vkCmdDispatch",
            ActionCommand::DispatchIndirect => "vkCmdDispatchIndirect",
            ActionCommand::Draw => "vkCmdDraw",
            ActionCommand::DrawIndirect => "vkCmdDrawIndirect",
            ActionCommand::DrawIndexed => "vkCmdDrawIndexed",
            ActionCommand::DrawIndexedIndirect => "vkCmdDrawIndexedIndirect",
            ActionCommand::DrawMeshTasks => "vkCmdDrawMeshTasksEXT",
            ActionCommand::DrawMeshTasksIndirect => "vkCmdDrawMeshTasksIndirectEXT",
            ActionCommand::TraceRays => "vkCmdTraceRaysKHR",
            ActionCommand::TraceRaysIndirect => "vkCmdTraceRaysIndirectKHR",
            ActionCommand::DispatchGraph => "vkCmdDispatchGraphAMDX",
        }
    }

    /// Returns whether the command draws with mesh shading.
    #[inline]
    pub fn is_mesh(self) -> bool {
        matches!(
            self,
            ActionCommand::DrawMeshTasks | ActionCommand::DrawMeshTasksIndirect
        )
    }
}

/// The shaders that an action command runs, with the layout that describes their interface.
#[derive(Clone)]
enum Interface {
    Pipeline(Arc<Pipeline>),
    Shader(Arc<ShaderObject>),
}

impl Interface {
    fn object(&self) -> ObjectHandle {
        match self {
            Interface::Pipeline(pipeline) => pipeline.object_handle(),
            Interface::Shader(shader) => shader.object_handle(),
        }
    }

    fn layout(&self) -> &Arc<PipelineLayout> {
        match self {
            Interface::Pipeline(pipeline) => pipeline.layout(),
            Interface::Shader(shader) => shader.layout(),
        }
    }

    fn descriptor_binding_requirements(
        &self,
    ) -> &HashMap<(u32, u32), DescriptorBindingRequirements> {
        match self {
            Interface::Pipeline(pipeline) => pipeline.descriptor_binding_requirements(),
            Interface::Shader(shader) => &shader.entry_point().descriptor_binding_requirements,
        }
    }

    fn push_constant_requirements(&self) -> Option<Range<u32>> {
        let range = match self {
            Interface::Pipeline(pipeline) => pipeline.push_constant_requirements(),
            Interface::Shader(shader) => shader.entry_point().push_constant_requirements.as_ref(),
        };

        range
            .map(PushConstantRange::byte_range)
            .filter(|range| !range.is_empty())
    }

    fn key(&self) -> u64 {
        match self {
            Interface::Pipeline(pipeline) => pipeline.id().get(),
            Interface::Shader(shader) => shader.object_handle().raw(),
        }
    }
}

impl CommandBuffer {
    /// Checks the state bound at the bind point of `command` against what the bound pipeline or
    /// shader objects require, returning every violation found.
    ///
    /// The checks are, in order: the command buffer is recording; a pipeline or a complete set of
    /// shader objects is bound; the rules specific to the bind point; the bound descriptor sets;
    /// the pushed constants; and the dynamic state.
    ///
    /// The contents of a descriptor set are only examined when the set, its contents, the
    /// recorded image layouts or the shaders have changed since they were last examined without
    /// finding a problem. Bindless sets, and sets with more descriptors than the
    /// `many_descriptors_threshold` of the device's [`ValidationSettings`], are examined every
    /// time.
    ///
    /// [`ValidationSettings`]: crate::device::ValidationSettings
    pub fn validate_action(&self, command: ActionCommand) -> Vec<Box<ValidationError>> {
        let mut inner = self.inner.write();
        let mut errors = Vec::new();

        if inner.state != CommandBufferState::Recording {
            errors.push(
                self.recording_error(inner.state, vuids!(command, "commandBuffer-recording"))
                    .add_context(command.name()),
            );
            return errors;
        }

        let bind_point = command.bind_point();

        let Some(interfaces) =
            self.validate_bound_shaders(command, &inner.last_bound[bind_point.index()], &mut errors)
        else {
            return errors
                .into_iter()
                .map(|err| err.add_context(command.name()))
                .collect();
        };

        self.validate_bind_point_rules(command, &inner, &mut errors);
        self.validate_descriptor_sets(command, &mut inner, &interfaces, &mut errors);
        self.validate_pushed_constants(command, &inner, &interfaces, &mut errors);
        self.validate_dynamic_state(command, &inner, &mut errors);

        if !errors.is_empty() {
            trace!(
                command_buffer = %self.object_handle(),
                command = command.name(),
                count = errors.len(),
                "action command has problems",
            );
        }

        errors
            .into_iter()
            .map(|err| err.add_context(command.name()))
            .collect()
    }

    fn validate_bound_shaders(
        &self,
        command: ActionCommand,
        last_bound: &LastBound,
        errors: &mut Vec<Box<ValidationError>>,
    ) -> Option<SmallVec<[Interface; 5]>> {
        let vuid_type = command;

        if let Some(pipeline) = last_bound.pipeline() {
            return Some(SmallVec::from_elem(Interface::Pipeline(pipeline.clone()), 1));
        }

        let features = self.device.enabled_features();

        if !features.shader_object || !last_bound.is_using_shader_objects() {
            errors.push(Box::new(ValidationError {
                problem: if features.shader_object {
                    "no pipeline or shader objects are bound at the pipeline bind point"
                } else {
                    "no pipeline is bound at the pipeline bind point"
                }
                .into(),
                vuids: if features.shader_object {
                    vuids!(vuid_type, "None-08607")
                } else {
                    vuids!(vuid_type, "None-08606")
                },
                kind: ViolationKind::Completeness,
                ..Default::default()
            }));

            return None;
        }

        let mut required: SmallVec<[(ShaderStage, &'static [&'static str]); 7]> =
            SmallVec::new();

        match command.bind_point() {
            PipelineBindPoint::Graphics => {
                if command.is_mesh() {
                    required.push((ShaderStage::Task, vuids!(vuid_type, "None-08689")));
                    required.push((ShaderStage::Mesh, vuids!(vuid_type, "None-08690")));
                } else {
                    required.push((ShaderStage::Vertex, vuids!(vuid_type, "None-08684")));
                }

                if features.tessellation_shader {
                    required.push((
                        ShaderStage::TessellationControl,
                        vuids!(vuid_type, "None-08685"),
                    ));
                    required.push((
                        ShaderStage::TessellationEvaluation,
                        vuids!(vuid_type, "None-08686"),
                    ));
                }

                if features.geometry_shader {
                    required.push((ShaderStage::Geometry, vuids!(vuid_type, "None-08687")));
                }

                required.push((ShaderStage::Fragment, vuids!(vuid_type, "None-08688")));
            }
            _ => required.push((ShaderStage::Compute, vuids!(vuid_type, "None-08607"))),
        }

        let mut complete = true;

        for (stage, vuids) in required {
            if !last_bound.shader_binding(stage).is_explicitly_bound() {
                errors.push(Box::new(ValidationError {
                    problem: format!(
                        "no pipeline is bound, and no shader object or null was bound to the \
                        {:?} stage",
                        stage,
                    )
                    .into(),
                    vuids,
                    kind: ViolationKind::Completeness,
                    ..Default::default()
                }));
                complete = false;
            }
        }

        if !complete {
            return None;
        }

        Some(
            last_bound
                .shader_objects()
                .cloned()
                .map(Interface::Shader)
                .collect(),
        )
    }

    fn validate_bind_point_rules(
        &self,
        command: ActionCommand,
        inner: &CommandBufferInner,
        errors: &mut Vec<Box<ValidationError>>,
    ) {
        let vuid_type = command;
        let last_bound = &inner.last_bound[command.bind_point().index()];

        match command.bind_point() {
            PipelineBindPoint::Graphics => {
                let Some(render_pass) = &inner.render_pass else {
                    errors.push(Box::new(ValidationError {
                        problem: "no render pass instance is active".into(),
                        vuids: vuids!(vuid_type, "renderpass"),
                        ..Default::default()
                    }));
                    return;
                };

                self.validate_primitive_shading(command, last_bound, errors);

                let dynamic_state = &inner.dynamic_state;

                if dynamic_state.is_dynamic(DynamicState::ColorWriteEnable)
                    && dynamic_state.is_set(DynamicState::ColorWriteEnable)
                {
                    if let DynamicStateValue::Count { count, .. } =
                        dynamic_state.value(DynamicState::ColorWriteEnable)
                    {
                        if count < render_pass.color_attachment_count {
                            errors.push(Box::new(ValidationError {
                                problem: format!(
                                    "the `ColorWriteEnable` dynamic state was set for {} \
                                    attachments, but the current subpass has {} color \
                                    attachments",
                                    count, render_pass.color_attachment_count,
                                )
                                .into(),
                                vuids: vuids!(vuid_type, "attachmentCount-07750"),
                                ..Default::default()
                            }));
                        }
                    }
                }

                if let Some(graphics_state) = last_bound
                    .pipeline()
                    .and_then(|pipeline| pipeline.graphics_state())
                {
                    if graphics_state.view_mask != render_pass.view_mask {
                        errors.push(Box::new(ValidationError {
                            problem: format!(
                                "the view mask of the bound pipeline ({:#x}) does not equal the \
                                view mask of the current subpass ({:#x})",
                                graphics_state.view_mask, render_pass.view_mask,
                            )
                            .into(),
                            vuids: vuids!(vuid_type, "viewMask-06178"),
                            kind: ViolationKind::Compatibility,
                            ..Default::default()
                        }));
                    }

                    if render_pass.is_dynamic_rendering()
                        && graphics_state.color_attachment_count
                            != render_pass.color_attachment_count
                    {
                        errors.push(Box::new(ValidationError {
                            problem: format!(
                                "the bound pipeline has {} color attachments, but the current \
                                rendering instance has {}",
                                graphics_state.color_attachment_count,
                                render_pass.color_attachment_count,
                            )
                            .into(),
                            vuids: vuids!(vuid_type, "colorAttachmentCount-06179"),
                            kind: ViolationKind::Compatibility,
                            ..Default::default()
                        }));
                    }
                }
            }
            PipelineBindPoint::Compute => {
                if inner.render_pass.is_some() {
                    errors.push(Box::new(ValidationError {
                        problem: "a render pass instance is active".into(),
                        vuids: vuids!(vuid_type, "renderpass"),
                        ..Default::default()
                    }));
                }
            }
            PipelineBindPoint::RayTracing | PipelineBindPoint::ExecutionGraph => {
                if inner.render_pass.is_some() {
                    errors.push(Box::new(ValidationError {
                        problem: "a render pass instance is active".into(),
                        vuids: vuids!(vuid_type, "renderpass"),
                        ..Default::default()
                    }));
                }

                if self.protected {
                    errors.push(Box::new(ValidationError {
                        problem: "the command buffer is protected".into(),
                        vuids: vuids!(vuid_type, "commandBuffer-02712"),
                        ..Default::default()
                    }));
                }
            }
        }
    }

    fn validate_primitive_shading(
        &self,
        command: ActionCommand,
        last_bound: &LastBound,
        errors: &mut Vec<Box<ValidationError>>,
    ) {
        let vuid_type = command;

        let (stages, object): (ShaderStages, Option<ObjectHandle>) = match last_bound.pipeline() {
            Some(pipeline) => (pipeline.stages(), Some(pipeline.object_handle())),
            None => (
                last_bound
                    .shader_objects()
                    .map(|shader| shader.stage())
                    .collect(),
                None,
            ),
        };

        let primitive_stages = ShaderStages::VERTEX
            | ShaderStages::TESSELLATION_CONTROL
            | ShaderStages::TESSELLATION_EVALUATION
            | ShaderStages::GEOMETRY;

        let error = if command.is_mesh() {
            (stages.intersects(primitive_stages) || !stages.intersects(ShaderStages::MESH)).then(
                || {
                    Box::new(ValidationError {
                        problem: "the command draws mesh tasks, but the bound shaders are not \
                            a mesh shading pipeline"
                            .into(),
                        vuids: vuids!(vuid_type, "stage-06480"),
                        ..Default::default()
                    })
                },
            )
        } else {
            stages.intersects(ShaderStages::mesh_shading()).then(|| {
                Box::new(ValidationError {
                    problem: "the command draws primitives, but the bound shaders include task \
                        or mesh shaders"
                        .into(),
                    vuids: vuids!(vuid_type, "stage-06481"),
                    ..Default::default()
                })
            })
        };

        if let Some(error) = error {
            errors.push(match object {
                Some(object) => error.with_object(object),
                None => error,
            });
        }

        if last_bound.pipeline().is_none()
            && matches!(
                last_bound.shader_binding(ShaderStage::TessellationControl),
                ShaderBinding::Bound(_)
            )
            && !matches!(
                last_bound.shader_binding(ShaderStage::TessellationEvaluation),
                ShaderBinding::Bound(_)
            )
        {
            errors.push(Box::new(ValidationError {
                problem: "a tessellation control shader is bound, but no tessellation \
                    evaluation shader is bound"
                    .into(),
                vuids: vuids!(vuid_type, "None-08686"),
                kind: ViolationKind::Completeness,
                ..Default::default()
            }));
        }
    }

    fn validate_descriptor_sets(
        &self,
        command: ActionCommand,
        inner: &mut CommandBufferInner,
        interfaces: &[Interface],
        errors: &mut Vec<Box<ValidationError>>,
    ) {
        let vuid_type = command;
        let settings = self.device.settings();
        let CommandBufferInner {
            last_bound,
            image_layouts,
            image_layout_change_count,
            deferred_keys,
            descriptor_walks,
            ..
        } = inner;
        let last_bound = &mut last_bound[command.bind_point().index()];

        // Requirements of every shader, merged per set and ordered by binding.
        let mut requirements: BTreeMap<u32, BTreeMap<u32, DescriptorBindingRequirements>> =
            BTreeMap::new();
        let mut incompatible: SmallVec<[u32; 4]> = SmallVec::new();

        for interface in interfaces {
            for (&(set_num, binding), binding_requirements) in
                interface.descriptor_binding_requirements()
            {
                requirements
                    .entry(set_num)
                    .or_default()
                    .entry(binding)
                    .and_modify(|existing| existing.merge(binding_requirements))
                    .or_insert_with(|| binding_requirements.clone());
            }
        }

        for &set_num in requirements.keys() {
            for interface in interfaces {
                if !interface
                    .descriptor_binding_requirements()
                    .keys()
                    .any(|&(set, _)| set == set_num)
                {
                    continue;
                }

                let slot = last_bound.slot(set_num);

                if !slot.is_some_and(|slot| slot.is_bound()) {
                    errors.push(Box::new(ValidationError {
                        problem: format!(
                            "the bound shaders use descriptor set {}, but no descriptor set was \
                            ever bound to it, or it was disturbed by a later binding",
                            set_num,
                        )
                        .into(),
                        vuids: vuids!(vuid_type, "None-08600"),
                        kind: ViolationKind::Completeness,
                        ..Default::default()
                    })
                    .with_object(interface.object()));
                    incompatible.push(set_num);
                    break;
                }

                if !last_bound.is_bound_set_compatible(set_num, interface.layout()) {
                    let mut error = Box::new(ValidationError {
                        problem: format!(
                            "the descriptor set bound to set {} with {} was bound with a \
                            pipeline layout that is not compatible for that set with the layout \
                            of the bound shaders",
                            set_num,
                            last_bound
                                .desc_set_bound_command()
                                .map_or("an unknown command".to_owned(), |c| c.to_string()),
                        )
                        .into(),
                        vuids: vuids!(vuid_type, "None-08600"),
                        kind: ViolationKind::Compatibility,
                        ..Default::default()
                    })
                    .with_object(interface.object());

                    if let Some(layout) = last_bound.desc_set_pipeline_layout() {
                        if layout.handle() != vk::PipelineLayout::null() {
                            error = error.with_object(ObjectHandle::new(layout.handle()));
                        }
                    }

                    errors.push(error);
                    incompatible.push(set_num);
                    break;
                }
            }
        }

        let image_layout_count = settings
            .image_layout_validation
            .then_some(*image_layout_change_count);
        let key = RequirementsKey(interfaces.iter().map(Interface::key).collect());

        for (&set_num, set_requirements) in &requirements {
            if incompatible.contains(&set_num) {
                continue;
            }

            let Some(slot) = last_bound.slot_mut(set_num) else {
                continue;
            };

            // Descriptor buffers are not inspected, and null sets are allowed when no
            // descriptor is accessed through them.
            if slot.descriptor_buffer().is_some() {
                continue;
            }

            if slot.is_null() {
                errors.push(Box::new(ValidationError {
                    problem: format!(
                        "the bound shaders use descriptor set {}, but a null descriptor set \
                        is bound to it",
                        set_num,
                    )
                    .into(),
                    vuids: vuids!(vuid_type, "None-08114"),
                    kind: ViolationKind::Completeness,
                    ..Default::default()
                }));
                continue;
            }

            let Some(bound) = slot.bound_set() else {
                continue;
            };

            let Some(set) = bound.upgrade() else {
                errors.push(Box::new(ValidationError {
                    problem: format!(
                        "the descriptor set bound to set {} has been destroyed",
                        set_num,
                    )
                    .into(),
                    vuids: vuids!(vuid_type, "None-08114"),
                    kind: ViolationKind::Liveness,
                    ..Default::default()
                })
                .with_object(bound.handle()));
                continue;
            };

            let always = set.layout().def().is_bindless()
                || set.layout().total_descriptor_count() > settings.many_descriptors_threshold;

            if !always && !slot.needs_validation(&set, image_layout_count, &key) {
                continue;
            }

            // Read before the walk, so that an update racing with it forces another walk.
            let change_count = set.change_count();
            *descriptor_walks += 1;

            let before = errors.len();
            let deferred = self.validate_set_contents(
                command,
                &set,
                set_num,
                set_requirements,
                settings.image_layout_validation.then_some(&*image_layouts),
                errors,
            );

            for binding in deferred {
                if deferred_keys.insert((set.id(), binding.0)) {
                    self.deferred
                        .push(deferred_check(command, Arc::downgrade(&set), binding));
                }
            }

            if errors.len() == before {
                slot.mark_validated(&set, change_count, *image_layout_change_count, key.clone());
            }
        }
    }

    /// Examines the descriptors of `set` that the shaders may access. Returns the bindings whose
    /// unwritten descriptors can only be judged at submission.
    fn validate_set_contents(
        &self,
        command: ActionCommand,
        set: &DescriptorSet,
        set_num: u32,
        requirements: &BTreeMap<u32, DescriptorBindingRequirements>,
        image_layouts: Option<&HashMap<vk::Image, ImageLayout>>,
        errors: &mut Vec<Box<ValidationError>>,
    ) -> SmallVec<[(u32, u32); 2]> {
        let vuid_type = command;
        let bindings = set.bindings();
        let mut deferred = SmallVec::new();

        for (&binding_num, binding_requirements) in requirements {
            let Some(binding) = bindings.iter().find(|b| b.binding == binding_num) else {
                debug!(
                    set = %set.object_handle(),
                    binding = binding_num,
                    "binding used by the shaders is missing from the set layout",
                );
                continue;
            };

            let accessed = binding_requirements.accessed_count(binding.len());
            let update_after_bind = binding
                .binding_flags
                .intersects(DescriptorBindingFlags::UPDATE_AFTER_BIND);
            let partially_bound = binding
                .binding_flags
                .intersects(DescriptorBindingFlags::PARTIALLY_BOUND);

            for (index, element) in binding.elements[..accessed as usize].iter().enumerate() {
                if binding.descriptor_type == DescriptorType::InlineUniformBlock {
                    break;
                }

                if !element.descriptor.is_written() {
                    if update_after_bind {
                        if !partially_bound {
                            deferred.push((binding_num, accessed));
                        }

                        break;
                    }

                    if !partially_bound {
                        errors.push(Box::new(ValidationError {
                            problem: format!(
                                "descriptor {} of binding {} of the descriptor set bound to set \
                                {} is accessed by the bound shaders, but was never written",
                                index, binding_num, set_num,
                            )
                            .into(),
                            vuids: vuids!(vuid_type, "None-08114"),
                            kind: ViolationKind::Completeness,
                            ..Default::default()
                        })
                        .with_object(set.object_handle()));
                    }

                    continue;
                }

                if let Some(resource) = element.descriptor.invalid_resource() {
                    errors.push(Box::new(ValidationError {
                        problem: format!(
                            "descriptor {} of binding {} of the descriptor set bound to set {} \
                            refers to a resource that has been destroyed",
                            index, binding_num, set_num,
                        )
                        .into(),
                        vuids: vuids!(vuid_type, "None-08114"),
                        kind: ViolationKind::Liveness,
                        ..Default::default()
                    })
                    .with_object(set.object_handle())
                    .with_object(resource));
                    continue;
                }

                if binding.descriptor_type == DescriptorType::Mutable
                    && !binding_requirements.descriptor_types.is_empty()
                    && !element
                        .descriptor_type
                        .is_some_and(|ty| binding_requirements.descriptor_types.contains(&ty))
                {
                    errors.push(Box::new(ValidationError {
                        problem: format!(
                            "descriptor {} of mutable binding {} of the descriptor set bound to \
                            set {} was written as {:?}, which the bound shaders do not accept",
                            index, binding_num, set_num, element.descriptor_type,
                        )
                        .into(),
                        vuids: vuids!(vuid_type, "None-08114"),
                        kind: ViolationKind::Compatibility,
                        ..Default::default()
                    })
                    .with_object(set.object_handle()));
                }

                let Some(image_layouts) = image_layouts else {
                    continue;
                };

                let Some((view, expected)) = element.descriptor.image() else {
                    continue;
                };

                let Some(image) = view.upgrade().and_then(|view| view.image()) else {
                    continue;
                };

                if let Some(&current) = image_layouts.get(&image) {
                    if !current.matches(expected) {
                        errors.push(Box::new(ValidationError {
                            problem: format!(
                                "descriptor {} of binding {} of the descriptor set bound to set \
                                {} expects the image to be in layout {:?}, but it is in layout \
                                {:?}",
                                index, binding_num, set_num, expected, current,
                            )
                            .into(),
                            vuids: vuids!(vuid_type, "None-09600"),
                            ..Default::default()
                        })
                        .with_object(set.object_handle())
                        .with_object(view.handle()));
                    }
                }
            }
        }

        deferred
    }

    fn validate_pushed_constants(
        &self,
        command: ActionCommand,
        inner: &CommandBufferInner,
        interfaces: &[Interface],
        errors: &mut Vec<Box<ValidationError>>,
    ) {
        if self.device.enabled_features().maintenance4 {
            return;
        }

        let vuid_type = command;
        let push_constants = &inner.push_constants;

        for interface in interfaces {
            let Some(range) = interface.push_constant_requirements() else {
                continue;
            };

            let layout_matches = push_constants.layout.as_ref()
                == Some(interface.layout().push_constant_ranges_id());

            if push_constants.layout.is_some() && !layout_matches {
                errors.push(Box::new(ValidationError {
                    problem: "push constants were last updated with a pipeline layout whose push \
                        constant ranges are not compatible with the layout of the bound shaders"
                        .into(),
                    vuids: vuids!(vuid_type, "maintenance4-08602"),
                    kind: ViolationKind::Compatibility,
                    ..Default::default()
                })
                .with_object(interface.object()));
                continue;
            }

            if let Some(gap) = push_constants.pushed.gaps(&range).next() {
                errors.push(Box::new(ValidationError {
                    problem: format!(
                        "the bound shaders read push constant bytes {}..{}, but bytes {}..{} \
                        were never pushed",
                        range.start, range.end, gap.start, gap.end,
                    )
                    .into(),
                    vuids: vuids!(vuid_type, "maintenance4-08602"),
                    kind: ViolationKind::Completeness,
                    ..Default::default()
                })
                .with_object(interface.object()));
            }
        }
    }

    fn validate_dynamic_state(
        &self,
        command: ActionCommand,
        inner: &CommandBufferInner,
        errors: &mut Vec<Box<ValidationError>>,
    ) {
        let vuid_type = command;
        let bind_point = command.bind_point();
        let Some(category) = bind_point.dynamic_state_category() else {
            return;
        };
        let last_bound = &inner.last_bound[bind_point.index()];
        let dynamic_state = &inner.dynamic_state;

        let (required, pipeline) = match last_bound.pipeline() {
            Some(pipeline) => (
                pipeline
                    .dynamic_state()
                    .intersection(DynamicStates::category(category)),
                Some(pipeline),
            ),
            None if category == DynamicStateCategory::Graphics => {
                let mut required = DynamicStates::shader_object_required();

                if last_bound.shader_binding(ShaderStage::Vertex).shader().is_some() {
                    required.insert(DynamicState::VertexInput);
                }

                if last_bound
                    .shader_binding(ShaderStage::TessellationControl)
                    .shader()
                    .is_some()
                {
                    required.insert(DynamicState::PatchControlPoints);
                    required.insert(DynamicState::TessellationDomainOrigin);
                }

                (required, None)
            }
            None => (DynamicStates::empty(), None),
        };

        for state in dynamic_state.missing(required).iter() {
            let problem = match dynamic_state.invalidated_by(state) {
                Some(invalidated_by) if dynamic_state.was_ever_set(state) => format!(
                    "the bound shaders require the {:?} dynamic state to be set; it was set \
                    earlier, but binding {} made it invalid, since that pipeline declares it \
                    static",
                    state, invalidated_by,
                ),
                _ => format!(
                    "the bound shaders require the {:?} dynamic state to be set, but it was never \
                    set",
                    state,
                ),
            };

            let mut error = Box::new(ValidationError {
                problem: problem.into(),
                vuids: state.missing_vuids(vuid_type),
                kind: ViolationKind::Completeness,
                ..Default::default()
            });

            if let Some(pipeline) = pipeline {
                error = error.with_object(pipeline.object_handle());
            }

            errors.push(error);
        }

        if let Some(pipeline) = pipeline {
            let dirty = dynamic_state
                .dirty_static_state()
                .intersection(DynamicStates::category(category));

            if !dirty.is_empty() {
                errors.push(Box::new(ValidationError {
                    problem: format!(
                        "the dynamic states {:?} were set after binding the pipeline, but the \
                        pipeline declares them static",
                        dirty,
                    )
                    .into(),
                    vuids: vuids!(vuid_type, "None-08608"),
                    ..Default::default()
                })
                .with_object(pipeline.object_handle()));
            }
        }
    }
}

/// Builds the check that is run at submission for update-after-bind descriptors of `binding.0`,
/// of which the first `binding.1` may be accessed.
fn deferred_check(
    command: ActionCommand,
    set: Weak<DescriptorSet>,
    (binding_num, accessed): (u32, u32),
) -> DeferredCheck {
    Box::new(move || {
        let vuid_type = command;
        let Some(set) = set.upgrade().filter(|set| !set.is_destroyed()) else {
            return vec![Box::new(ValidationError {
                context: "vkQueueSubmit".into(),
                problem: format!(
                    "a descriptor set used by {} was destroyed before submission",
                    command.name(),
                )
                .into(),
                vuids: vuids!(vuid_type, "None-08114"),
                kind: ViolationKind::Liveness,
                ..Default::default()
            })];
        };

        let bindings = set.bindings();
        let unwritten = bindings
            .iter()
            .find(|binding| binding.binding == binding_num)
            .map_or(0, |binding: &DescriptorBinding| {
                binding
                    .elements
                    .iter()
                    .take(accessed as usize)
                    .filter(|element| !element.descriptor.is_written())
                    .count()
            });

        if unwritten == 0 {
            return Vec::new();
        }

        vec![Box::new(ValidationError {
            context: "vkQueueSubmit".into(),
            problem: format!(
                "{} descriptors of update-after-bind binding {} used by {} were still not \
                written at submission",
                unwritten,
                binding_num,
                command.name(),
            )
            .into(),
            vuids: vuids!(vuid_type, "None-08114"),
            kind: ViolationKind::Completeness,
            ..Default::default()
        })
        .with_object(set.object_handle())]
    })
}

#[cfg(test)]
mod tests {
    use super::ActionCommand;
    use crate::{
        command_buffer::{CommandBuffer, CommandBufferCreateInfo},
        descriptor_set::{
            layout::{
                DescriptorBindingFlags, DescriptorSetLayout, DescriptorSetLayoutBinding,
                DescriptorSetLayoutCreateFlags, DescriptorSetLayoutCreateInfo, DescriptorType,
            },
            DescriptorBufferInfo, DescriptorImageViewInfo, WriteDescriptorSet,
        },
        device::{Device, DeviceFeatures},
        dynamic_state::{DynamicState, DynamicStateValue, DynamicStates},
        object::{ObjectHandle, StateObject},
        pipeline::{
            layout::{PipelineLayout, PipelineLayoutCreateInfo, PushConstantRange},
            GraphicsPipelineState, Pipeline, PipelineBindPoint, PipelineCreateFlags,
            PipelineCreateInfo,
        },
        render_pass::RenderPassState,
        resource::{ImageLayout, ResourceKind},
        shader::{EntryPointInfo, ShaderObject, ShaderObjectCreateInfo, ShaderStage, ShaderStages},
        ValidationError, ViolationKind,
    };
    use ash::vk::{self, Handle};
    use std::sync::Arc;

    fn recording(device: &Arc<Device>) -> Arc<CommandBuffer> {
        let cb = CommandBuffer::new(
            device.clone(),
            vk::CommandBuffer::from_raw(crate::tests::next_handle()),
            CommandBufferCreateInfo::default(),
        );
        cb.begin().unwrap();

        cb
    }

    fn vuids(errors: &[Box<ValidationError>]) -> Vec<&'static str> {
        errors.iter().map(|err| err.vuids[0]).collect()
    }

    fn pipeline(
        device: &Arc<Device>,
        bind_point: PipelineBindPoint,
        layout: &Arc<PipelineLayout>,
        stages: Vec<EntryPointInfo>,
        dynamic_state: Vec<DynamicState>,
    ) -> Arc<Pipeline> {
        Pipeline::new(
            device.clone(),
            vk::Pipeline::from_raw(crate::tests::next_handle()),
            PipelineCreateInfo {
                stages,
                dynamic_state,
                graphics_state: (bind_point == PipelineBindPoint::Graphics)
                    .then(GraphicsPipelineState::default),
                ..PipelineCreateInfo::new(bind_point, layout.clone())
            },
        )
    }

    fn compute_pipeline(
        device: &Arc<Device>,
        layout: &Arc<PipelineLayout>,
        entry_point: EntryPointInfo,
    ) -> Arc<Pipeline> {
        pipeline(
            device,
            PipelineBindPoint::Compute,
            layout,
            vec![entry_point],
            Vec::new(),
        )
    }

    fn uses_binding(ty: DescriptorType) -> EntryPointInfo {
        EntryPointInfo::new(ShaderStage::Compute).with_binding(0, 0, [ty], Some(1))
    }

    fn buffer_write(buffer: &Arc<crate::resource::Resource>) -> WriteDescriptorSet {
        WriteDescriptorSet::buffer(
            0,
            DescriptorBufferInfo {
                buffer: buffer.clone(),
                range: 0..64,
            },
        )
    }

    #[test]
    fn requires_recording_and_bound_shaders() {
        let device = test_device!();
        let cb = CommandBuffer::new(
            device.clone(),
            vk::CommandBuffer::from_raw(crate::tests::next_handle()),
            CommandBufferCreateInfo::default(),
        );
        assert_eq!(
            vuids(&cb.validate_action(ActionCommand::Dispatch)),
            ["VUID-vkCmdDispatch-commandBuffer-recording"]
        );

        cb.begin().unwrap();
        let errors = cb.validate_action(ActionCommand::Dispatch);
        assert_eq!(vuids(&errors), ["VUID-vkCmdDispatch-None-08606"]);
        assert_eq!(errors[0].kind, ViolationKind::Completeness);
        assert_eq!(errors[0].context, "vkCmdDispatch");

        let device = test_device!(DeviceFeatures {
            shader_object: true,
            ..Default::default()
        });
        let cb = recording(&device);
        assert_eq!(
            vuids(&cb.validate_action(ActionCommand::TraceRays)),
            ["VUID-vkCmdTraceRaysKHR-None-08607"]
        );
    }

    #[test]
    fn compute_inside_render_pass() {
        let device = test_device!();
        let layout = test_pipeline_layout!(device, []);
        let cb = recording(&device);

        cb.bind_pipeline(&compute_pipeline(
            &device,
            &layout,
            EntryPointInfo::new(ShaderStage::Compute),
        ));
        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());

        cb.begin_render_pass(RenderPassState::default());
        assert_eq!(
            vuids(&cb.validate_action(ActionCommand::DispatchIndirect)),
            ["VUID-vkCmdDispatchIndirect-renderpass"]
        );
    }

    #[test]
    fn descriptor_contents_are_walked_only_after_changes() {
        let device = test_device!();
        let set_layout = test_set_layout!(device, [(0, DescriptorType::StorageBuffer, 1)]);
        let layout = test_pipeline_layout!(device, [set_layout.clone()]);
        let first = compute_pipeline(&device, &layout, uses_binding(DescriptorType::StorageBuffer));
        let set = test_descriptor_set!(set_layout);
        let buffer = test_resource!(device, vk::Buffer, ResourceKind::Buffer);
        assert!(set.update(&[buffer_write(&buffer)], &[]).is_empty());

        let cb = recording(&device);
        cb.bind_pipeline(&first);
        cb.bind_descriptor_sets(
            PipelineBindPoint::Compute,
            &layout,
            0,
            &[Some(set.clone())],
            &[],
        );

        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());
        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());
        assert_eq!(cb.descriptor_walk_count(), 1);

        // Writing to the set.
        assert!(set.update(&[buffer_write(&buffer)], &[]).is_empty());
        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());
        assert_eq!(cb.descriptor_walk_count(), 2);

        // Any image layout change.
        let image = vk::Image::from_raw(crate::tests::next_handle());
        assert!(cb.image_layout_transition(image, ImageLayout::General).is_empty());
        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());
        assert!(cb.image_layout_transition(image, ImageLayout::General).is_empty());
        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());
        assert_eq!(cb.descriptor_walk_count(), 3);

        // Different shaders, even with the same requirements.
        let second =
            compute_pipeline(&device, &layout, uses_binding(DescriptorType::StorageBuffer));
        cb.bind_pipeline(&second);
        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());
        assert_eq!(cb.descriptor_walk_count(), 4);

        // Binding again starts over.
        cb.bind_descriptor_sets(
            PipelineBindPoint::Compute,
            &layout,
            0,
            &[Some(set.clone())],
            &[],
        );
        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());
        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());
        assert_eq!(cb.descriptor_walk_count(), 5);
    }

    #[test]
    fn many_descriptors_are_always_walked() {
        let device = test_device!();
        let set_layout = test_set_layout!(device, [(0, DescriptorType::StorageBuffer, 65)]);
        let layout = test_pipeline_layout!(device, [set_layout.clone()]);
        let set = test_descriptor_set!(set_layout);
        let buffer = test_resource!(device, vk::Buffer, ResourceKind::Buffer);
        assert!(set.update(&[buffer_write(&buffer)], &[]).is_empty());

        let cb = recording(&device);
        cb.bind_pipeline(&compute_pipeline(
            &device,
            &layout,
            uses_binding(DescriptorType::StorageBuffer),
        ));
        cb.bind_descriptor_sets(
            PipelineBindPoint::Compute,
            &layout,
            0,
            &[Some(set.clone())],
            &[],
        );

        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());
        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());
        assert_eq!(cb.descriptor_walk_count(), 2);
    }

    #[test]
    fn unwritten_and_destroyed_descriptors() {
        let device = test_device!();
        let set_layout = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let layout = test_pipeline_layout!(device, [set_layout.clone()]);
        let pipeline =
            compute_pipeline(&device, &layout, uses_binding(DescriptorType::UniformBuffer));
        let set = test_descriptor_set!(set_layout);

        let cb = recording(&device);
        cb.bind_pipeline(&pipeline);
        cb.bind_descriptor_sets(
            PipelineBindPoint::Compute,
            &layout,
            0,
            &[Some(set.clone())],
            &[],
        );

        for _ in 0..2 {
            assert_eq!(
                vuids(&cb.validate_action(ActionCommand::Dispatch)),
                ["VUID-vkCmdDispatch-None-08114"]
            );
        }
        assert_eq!(cb.descriptor_walk_count(), 2);

        let buffer = test_resource!(device, vk::Buffer, ResourceKind::Buffer);
        assert!(set.update(&[buffer_write(&buffer)], &[]).is_empty());
        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());

        // The set stays bound, but the command buffer is invalidated through it.
        buffer.node().destroy(buffer.handle());
        assert!(cb.state().is_invalid());

        let cb = recording(&device);
        cb.bind_pipeline(&pipeline);
        cb.bind_descriptor_sets(
            PipelineBindPoint::Compute,
            &layout,
            0,
            &[Some(set.clone())],
            &[],
        );
        let errors = cb.validate_action(ActionCommand::Dispatch);
        assert_eq!(vuids(&errors), ["VUID-vkCmdDispatch-None-08114"]);
        assert_eq!(errors[0].kind, ViolationKind::Liveness);
        assert_eq!(
            errors[0].objects.as_slice(),
            [set.object_handle(), buffer.handle()]
        );
    }

    #[test]
    fn sets_must_be_bound_with_compatible_layout() {
        let device = test_device!();
        let uniform = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let storage = test_set_layout!(device, [(0, DescriptorType::StorageBuffer, 1)]);
        let pipeline_layout = test_pipeline_layout!(device, [uniform]);
        let other_layout = test_pipeline_layout!(device, [storage.clone()]);
        let pipeline = compute_pipeline(
            &device,
            &pipeline_layout,
            uses_binding(DescriptorType::UniformBuffer),
        );

        let cb = recording(&device);
        cb.bind_pipeline(&pipeline);

        let errors = cb.validate_action(ActionCommand::Dispatch);
        assert_eq!(vuids(&errors), ["VUID-vkCmdDispatch-None-08600"]);
        assert_eq!(errors[0].kind, ViolationKind::Completeness);

        cb.bind_descriptor_sets(
            PipelineBindPoint::Compute,
            &other_layout,
            0,
            &[Some(test_descriptor_set!(storage))],
            &[],
        );
        let errors = cb.validate_action(ActionCommand::Dispatch);
        assert_eq!(vuids(&errors), ["VUID-vkCmdDispatch-None-08600"]);
        assert_eq!(errors[0].kind, ViolationKind::Compatibility);
        assert!(errors[0].problem.contains("vkCmdBindDescriptorSets"));
        assert_eq!(
            errors[0].objects.as_slice(),
            [
                pipeline.object_handle(),
                ObjectHandle::new(other_layout.handle())
            ]
        );
        assert_eq!(cb.descriptor_walk_count(), 0);
    }

    #[test]
    fn image_layouts_are_compared() {
        let device = test_device!();
        let set_layout = test_set_layout!(device, [(0, DescriptorType::SampledImage, 1)]);
        let layout = test_pipeline_layout!(device, [set_layout.clone()]);
        let set = test_descriptor_set!(set_layout);
        let image = vk::Image::from_raw(crate::tests::next_handle());
        let view = test_resource!(device, vk::ImageView, ResourceKind::ImageView { image });
        assert!(set
            .update(
                &[WriteDescriptorSet::image_view(
                    0,
                    DescriptorImageViewInfo {
                        image_view: view,
                        image_layout: ImageLayout::ShaderReadOnlyOptimal,
                    },
                )],
                &[],
            )
            .is_empty());

        let cb = recording(&device);
        cb.bind_pipeline(&compute_pipeline(
            &device,
            &layout,
            uses_binding(DescriptorType::SampledImage),
        ));
        cb.bind_descriptor_sets(
            PipelineBindPoint::Compute,
            &layout,
            0,
            &[Some(set.clone())],
            &[],
        );

        // Not transitioned in this command buffer.
        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());

        assert!(cb.image_layout_transition(image, ImageLayout::General).is_empty());
        assert_eq!(
            vuids(&cb.validate_action(ActionCommand::Dispatch)),
            ["VUID-vkCmdDispatch-None-09600"]
        );

        assert!(cb.image_layout_transition(image, ImageLayout::ReadOnlyOptimal).is_empty());
        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());
    }

    #[test]
    fn update_after_bind_descriptors_are_checked_at_submit() {
        let device = test_device!();
        let set_layout = DescriptorSetLayout::new(
            device.clone(),
            vk::DescriptorSetLayout::from_raw(crate::tests::next_handle()),
            DescriptorSetLayoutCreateInfo {
                flags: DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL,
                bindings: vec![DescriptorSetLayoutBinding {
                    binding_flags: DescriptorBindingFlags::UPDATE_AFTER_BIND,
                    stages: ShaderStages::COMPUTE,
                    ..DescriptorSetLayoutBinding::new(0, DescriptorType::StorageBuffer)
                }],
                ..Default::default()
            },
        );
        let layout = test_pipeline_layout!(device, [set_layout.clone()]);
        let set = test_descriptor_set!(set_layout);

        let cb = recording(&device);
        cb.bind_pipeline(&compute_pipeline(
            &device,
            &layout,
            uses_binding(DescriptorType::StorageBuffer),
        ));
        cb.bind_descriptor_sets(
            PipelineBindPoint::Compute,
            &layout,
            0,
            &[Some(set.clone())],
            &[],
        );

        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());
        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());
        cb.end().unwrap();

        assert_eq!(
            vuids(&cb.validate_submit()),
            ["VUID-vkCmdDispatch-None-08114"]
        );

        let buffer = test_resource!(device, vk::Buffer, ResourceKind::Buffer);
        assert!(set.update(&[buffer_write(&buffer)], &[]).is_empty());
        assert!(cb.validate_submit().is_empty());
    }

    #[test]
    fn pushed_constants_must_cover_shader_range() {
        let push_layout = |device: &Arc<Device>, size: u32| {
            PipelineLayout::new(
                device.clone(),
                vk::PipelineLayout::from_raw(crate::tests::next_handle()),
                PipelineLayoutCreateInfo {
                    push_constant_ranges: vec![PushConstantRange {
                        stages: ShaderStages::COMPUTE,
                        offset: 0,
                        size,
                    }],
                    ..Default::default()
                },
            )
        };
        let entry_point = EntryPointInfo::new(ShaderStage::Compute).with_push_constants(0, 16);

        let device = test_device!();
        let layout = push_layout(&device, 16);
        let cb = recording(&device);
        cb.bind_pipeline(&compute_pipeline(&device, &layout, entry_point.clone()));

        assert_eq!(
            vuids(&cb.validate_action(ActionCommand::Dispatch)),
            ["VUID-vkCmdDispatch-maintenance4-08602"]
        );
        cb.push_constants(&layout, ShaderStages::COMPUTE, 0, 8);
        assert_eq!(
            vuids(&cb.validate_action(ActionCommand::Dispatch)),
            ["VUID-vkCmdDispatch-maintenance4-08602"]
        );
        cb.push_constants(&layout, ShaderStages::COMPUTE, 8, 8);
        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());

        let other = push_layout(&device, 32);
        cb.push_constants(&other, ShaderStages::COMPUTE, 0, 32);
        let errors = cb.validate_action(ActionCommand::Dispatch);
        assert_eq!(vuids(&errors), ["VUID-vkCmdDispatch-maintenance4-08602"]);
        assert_eq!(errors[0].kind, ViolationKind::Compatibility);

        let device = test_device!(DeviceFeatures {
            maintenance4: true,
            ..Default::default()
        });
        let layout = push_layout(&device, 16);
        let cb = recording(&device);
        cb.bind_pipeline(&compute_pipeline(&device, &layout, entry_point));
        assert!(cb.validate_action(ActionCommand::Dispatch).is_empty());
    }

    #[test]
    fn dynamic_state_must_be_set() {
        let device = test_device!();
        let layout = test_pipeline_layout!(device, []);
        let stages = || {
            vec![
                EntryPointInfo::new(ShaderStage::Vertex),
                EntryPointInfo::new(ShaderStage::Fragment),
            ]
        };
        let dynamic = pipeline(
            &device,
            PipelineBindPoint::Graphics,
            &layout,
            stages(),
            vec![DynamicState::Viewport],
        );
        let fixed = pipeline(
            &device,
            PipelineBindPoint::Graphics,
            &layout,
            stages(),
            Vec::new(),
        );

        let cb = recording(&device);
        cb.bind_pipeline(&dynamic);
        assert_eq!(
            vuids(&cb.validate_action(ActionCommand::Draw)),
            ["VUID-vkCmdDraw-renderpass", "VUID-vkCmdDraw-None-07831"]
        );

        cb.begin_render_pass(RenderPassState::default());
        assert_eq!(
            vuids(&cb.validate_action(ActionCommand::Draw)),
            ["VUID-vkCmdDraw-None-07831"]
        );

        cb.set_dynamic_state(DynamicState::Viewport, DynamicStateValue::Other);
        assert!(cb.validate_action(ActionCommand::Draw).is_empty());

        // A pipeline with static viewports makes the set value invalid.
        cb.bind_pipeline(&fixed);
        assert!(cb.validate_action(ActionCommand::Draw).is_empty());
        cb.bind_pipeline(&dynamic);
        let errors = cb.validate_action(ActionCommand::Draw);
        assert_eq!(vuids(&errors), ["VUID-vkCmdDraw-None-07831"]);
        assert!(errors[0].problem.contains("made it invalid"));

        cb.bind_pipeline(&fixed);
        cb.set_dynamic_state(DynamicState::Scissor, DynamicStateValue::Other);
        assert_eq!(
            vuids(&cb.validate_action(ActionCommand::DrawIndexed)),
            ["VUID-vkCmdDrawIndexed-None-08608"]
        );
    }

    #[test]
    fn mesh_commands_need_mesh_pipeline() {
        let device = test_device!();
        let layout = test_pipeline_layout!(device, []);
        let primitive = pipeline(
            &device,
            PipelineBindPoint::Graphics,
            &layout,
            vec![
                EntryPointInfo::new(ShaderStage::Vertex),
                EntryPointInfo::new(ShaderStage::Fragment),
            ],
            Vec::new(),
        );

        let cb = recording(&device);
        cb.begin_render_pass(RenderPassState::default());
        cb.bind_pipeline(&primitive);
        assert_eq!(
            vuids(&cb.validate_action(ActionCommand::DrawMeshTasks)),
            ["VUID-vkCmdDrawMeshTasksEXT-stage-06480"]
        );
    }

    #[test]
    fn linked_pipeline_keeps_fragment_output_state() {
        let device = test_device!(DeviceFeatures {
            graphics_pipeline_library: true,
            ..Default::default()
        });
        let layout = test_pipeline_layout!(device, []);
        let library = |stage, graphics_state| {
            Pipeline::new(
                device.clone(),
                vk::Pipeline::from_raw(crate::tests::next_handle()),
                PipelineCreateInfo {
                    flags: PipelineCreateFlags::LIBRARY,
                    stages: vec![EntryPointInfo::new(stage)],
                    graphics_state,
                    ..PipelineCreateInfo::new(PipelineBindPoint::Graphics, layout.clone())
                },
            )
        };
        let pre_raster = library(ShaderStage::Vertex, None);
        let fragment_output = library(
            ShaderStage::Fragment,
            Some(GraphicsPipelineState {
                color_attachment_count: 2,
                ..Default::default()
            }),
        );
        let linked = Pipeline::new(
            device.clone(),
            vk::Pipeline::from_raw(crate::tests::next_handle()),
            PipelineCreateInfo::from_libraries(vec![pre_raster, fragment_output]),
        );

        let rendering = |color_attachment_count| {
            let cb = recording(&device);
            cb.begin_render_pass(RenderPassState {
                color_attachment_count,
                ..Default::default()
            });
            cb.bind_pipeline(&linked);
            vuids(&cb.validate_action(ActionCommand::Draw))
        };

        assert!(!rendering(2).contains(&"VUID-vkCmdDraw-colorAttachmentCount-06179"));
        assert!(rendering(3).contains(&"VUID-vkCmdDraw-colorAttachmentCount-06179"));
    }

    #[test]
    fn shader_objects_need_every_stage_and_state() {
        let device = test_device!(DeviceFeatures {
            shader_object: true,
            ..Default::default()
        });
        let shader = |stage| {
            ShaderObject::new(
                device.clone(),
                vk::ShaderEXT::from_raw(crate::tests::next_handle()),
                ShaderObjectCreateInfo::new(EntryPointInfo::new(stage)),
            )
        };
        let vertex = shader(ShaderStage::Vertex);

        let cb = recording(&device);
        cb.begin_render_pass(RenderPassState::default());
        assert_eq!(
            vuids(&cb.bind_shaders(&[(ShaderStage::Fragment, Some(vertex.clone()))])),
            ["VUID-vkCmdBindShadersEXT-pShaders-08469"]
        );
        assert!(cb
            .bind_shaders(&[(ShaderStage::Vertex, Some(vertex))])
            .is_empty());

        assert_eq!(
            vuids(&cb.validate_action(ActionCommand::Draw)),
            ["VUID-vkCmdDraw-None-08688"]
        );

        // Binding null counts as binding the stage.
        assert!(cb.bind_shaders(&[(ShaderStage::Fragment, None)]).is_empty());

        let mut required = DynamicStates::shader_object_required();
        required.insert(DynamicState::VertexInput);
        assert_eq!(
            cb.validate_action(ActionCommand::Draw).len(),
            required.len()
        );

        for state in required.iter() {
            cb.set_dynamic_state(state, DynamicStateValue::Other);
        }
        assert!(cb.validate_action(ActionCommand::Draw).is_empty());

        // With task and mesh bound to null, the bound stages are not a mesh shading pipeline.
        assert!(cb
            .bind_shaders(&[(ShaderStage::Task, None), (ShaderStage::Mesh, None)])
            .is_empty());
        assert!(vuids(&cb.validate_action(ActionCommand::DrawMeshTasks))
            .contains(&"VUID-vkCmdDrawMeshTasksEXT-stage-06480"));

        // A pipeline bound afterwards replaces the shader objects.
        let layout = test_pipeline_layout!(device, []);
        cb.bind_pipeline(&pipeline(
            &device,
            PipelineBindPoint::Graphics,
            &layout,
            vec![
                EntryPointInfo::new(ShaderStage::Vertex),
                EntryPointInfo::new(ShaderStage::Fragment),
            ],
            Vec::new(),
        ));
        assert!(!cb
            .last_bound(PipelineBindPoint::Graphics)
            .is_using_shader_objects());
    }

    #[test]
    fn protected_command_buffers_cannot_trace_rays() {
        let device = test_device!(DeviceFeatures {
            protected_memory: true,
            ..Default::default()
        });
        let layout = test_pipeline_layout!(device, []);
        let cb = CommandBuffer::new(
            device.clone(),
            vk::CommandBuffer::from_raw(crate::tests::next_handle()),
            CommandBufferCreateInfo {
                protected: true,
                ..Default::default()
            },
        );
        cb.begin().unwrap();
        cb.bind_pipeline(&pipeline(
            &device,
            PipelineBindPoint::RayTracing,
            &layout,
            vec![EntryPointInfo::new(ShaderStage::Raygen)],
            Vec::new(),
        ));

        assert_eq!(
            vuids(&cb.validate_action(ActionCommand::TraceRays)),
            ["VUID-vkCmdTraceRaysKHR-commandBuffer-02712"]
        );
    }
}
