//! The binding state of one pipeline bind point of a command buffer.

use crate::{
    descriptor_set::DescriptorSet,
    object::ObjectHandle,
    pipeline::{
        layout::{PipelineLayout, PipelineLayoutCompatId},
        Pipeline, PipelineBindPoint,
    },
    shader::{ShaderObject, ShaderStage},
    DeviceSize,
};
use smallvec::SmallVec;
use std::{
    fmt::{Display, Error as FmtError, Formatter},
    num::NonZero,
    sync::Arc,
};
use tracing::trace;

/// The stages that shader objects can be bound to, in slot order.
const SHADER_SLOTS: [ShaderStage; 8] = [
    ShaderStage::Vertex,
    ShaderStage::TessellationControl,
    ShaderStage::TessellationEvaluation,
    ShaderStage::Geometry,
    ShaderStage::Fragment,
    ShaderStage::Compute,
    ShaderStage::Task,
    ShaderStage::Mesh,
];

fn shader_slot(stage: ShaderStage) -> Option<usize> {
    SHADER_SLOTS.iter().position(|&slot| slot == stage)
}

/// What is bound to one shader stage in shader object mode.
#[derive(Clone, Debug, Default)]
pub enum ShaderBinding {
    /// Nothing was ever bound to the stage.
    #[default]
    NeverBound,

    /// The stage was explicitly bound to null, which disables it.
    Null,

    /// A shader object is bound.
    Bound(Arc<ShaderObject>),
}

impl ShaderBinding {
    /// Returns whether the stage was explicitly bound, to a shader or to null.
    #[inline]
    pub fn is_explicitly_bound(&self) -> bool {
        !matches!(self, ShaderBinding::NeverBound)
    }

    /// Returns the bound shader object, if any.
    #[inline]
    pub fn shader(&self) -> Option<&Arc<ShaderObject>> {
        match self {
            ShaderBinding::Bound(shader) => Some(shader),
            _ => None,
        }
    }
}

/// The command that last bound descriptor sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindCommand {
    BindDescriptorSets,
    PushDescriptorSet,
    BindDescriptorBufferOffsets,
}

impl Display for BindCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(match self {
            BindCommand::BindDescriptorSets => "vkCmdBindDescriptorSets",
            BindCommand::PushDescriptorSet => "vkCmdPushDescriptorSetKHR",
            BindCommand::BindDescriptorBufferOffsets => "vkCmdSetDescriptorBufferOffsetsEXT",
        })
    }
}

/// What is being bound to one set number.
#[derive(Clone, Debug)]
pub enum SlotContent {
    /// A descriptor set.
    Set(Arc<DescriptorSet>),

    /// A null descriptor set, which is allowed for layouts with independent sets.
    Null,

    /// An offset into a bound descriptor buffer.
    Buffer {
        buffer_index: u32,
        offset: DeviceSize,
    },
}

/// A descriptor set bound to a slot. The slot keeps the set alive until it is rebound or the
/// command buffer is reset; only an explicit destroy makes it unusable.
#[derive(Clone, Debug)]
pub struct BoundSet {
    handle: ObjectHandle,
    set: Arc<DescriptorSet>,
}

impl BoundSet {
    /// Returns the handle of the set.
    #[inline]
    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    /// Returns the set, if it has not been destroyed.
    #[inline]
    pub fn upgrade(&self) -> Option<Arc<DescriptorSet>> {
        (!self.set.is_destroyed()).then(|| self.set.clone())
    }
}

/// A descriptor buffer binding of a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorBufferBinding {
    pub buffer_index: u32,
    pub offset: DeviceSize,
}

/// Identifies the shader requirements that a set was last validated against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RequirementsKey(pub(crate) SmallVec<[u64; 2]>);

#[derive(Clone, Debug)]
pub(crate) struct ValidatedState {
    pub(crate) set_id: NonZero<u64>,
    pub(crate) change_count: u64,
    pub(crate) image_layout_change_count: u64,
    pub(crate) requirements: RequirementsKey,
}

/// The state of one set number.
#[derive(Clone, Debug, Default)]
pub struct DescriptorSetSlot {
    bound: Option<BoundSet>,
    null: bool,
    descriptor_buffer: Option<DescriptorBufferBinding>,
    dynamic_offsets: SmallVec<[u32; 4]>,
    compat_id: Option<PipelineLayoutCompatId>,
    validated: Option<ValidatedState>,
}

impl DescriptorSetSlot {
    /// Returns the bound descriptor set, if any.
    #[inline]
    pub fn bound_set(&self) -> Option<&BoundSet> {
        self.bound.as_ref()
    }

    /// Returns whether a null descriptor set was bound.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.null
    }

    /// Returns the descriptor buffer binding, if any.
    #[inline]
    pub fn descriptor_buffer(&self) -> Option<DescriptorBufferBinding> {
        self.descriptor_buffer
    }

    /// Returns the dynamic offsets that were bound with the set.
    #[inline]
    pub fn dynamic_offsets(&self) -> &[u32] {
        &self.dynamic_offsets
    }

    /// Returns the compatibility record of the layout the slot was bound with.
    #[inline]
    pub fn compat_id(&self) -> Option<&PipelineLayoutCompatId> {
        self.compat_id.as_ref()
    }

    /// Returns whether anything occupies the slot.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.bound.is_some() || self.null || self.descriptor_buffer.is_some()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    /// Returns whether the contents of `set` must be examined again, given the counters that it
    /// was last validated with.
    pub(crate) fn needs_validation(
        &self,
        set: &DescriptorSet,
        image_layout_change_count: Option<u64>,
        requirements: &RequirementsKey,
    ) -> bool {
        let Some(validated) = &self.validated else {
            return true;
        };

        validated.set_id != set.id()
            || validated.change_count != set.change_count()
            || image_layout_change_count
                .is_some_and(|count| count != validated.image_layout_change_count)
            || &validated.requirements != requirements
    }

    pub(crate) fn mark_validated(
        &mut self,
        set: &DescriptorSet,
        change_count: u64,
        image_layout_change_count: u64,
        requirements: RequirementsKey,
    ) {
        self.validated = Some(ValidatedState {
            set_id: set.id(),
            change_count,
            image_layout_change_count,
            requirements,
        });
    }
}

/// The binding state of one pipeline bind point.
#[derive(Debug)]
pub struct LastBound {
    bind_point: PipelineBindPoint,
    pipeline: Option<Arc<Pipeline>>,
    shader_objects: [ShaderBinding; SHADER_SLOTS.len()],
    desc_set_pipeline_layout: Option<Arc<PipelineLayout>>,
    desc_set_bound_command: Option<BindCommand>,
    ds_slots: Vec<DescriptorSetSlot>,
    push_descriptor_set: Option<Arc<DescriptorSet>>,
}

impl LastBound {
    pub(crate) fn new(bind_point: PipelineBindPoint) -> Self {
        Self {
            bind_point,
            pipeline: None,
            shader_objects: Default::default(),
            desc_set_pipeline_layout: None,
            desc_set_bound_command: None,
            ds_slots: Vec::new(),
            push_descriptor_set: None,
        }
    }

    /// Returns the bind point.
    #[inline]
    pub fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    /// Returns the bound pipeline.
    #[inline]
    pub fn pipeline(&self) -> Option<&Arc<Pipeline>> {
        self.pipeline.as_ref()
    }

    /// Returns what is bound to `stage` in shader object mode.
    #[inline]
    pub fn shader_binding(&self, stage: ShaderStage) -> &ShaderBinding {
        static NEVER_BOUND: ShaderBinding = ShaderBinding::NeverBound;

        shader_slot(stage).map_or(&NEVER_BOUND, |slot| &self.shader_objects[slot])
    }

    /// Returns the bound shader objects.
    pub fn shader_objects(&self) -> impl Iterator<Item = &Arc<ShaderObject>> {
        self.shader_objects.iter().filter_map(ShaderBinding::shader)
    }

    /// Returns whether shaders are bound as shader objects rather than through a pipeline.
    #[inline]
    pub fn is_using_shader_objects(&self) -> bool {
        self.pipeline.is_none()
            && self
                .shader_objects
                .iter()
                .any(ShaderBinding::is_explicitly_bound)
    }

    /// Returns the pipeline layout that descriptor sets were last bound with.
    #[inline]
    pub fn desc_set_pipeline_layout(&self) -> Option<&Arc<PipelineLayout>> {
        self.desc_set_pipeline_layout.as_ref()
    }

    /// Returns the command that descriptor sets were last bound with.
    #[inline]
    pub fn desc_set_bound_command(&self) -> Option<BindCommand> {
        self.desc_set_bound_command
    }

    /// Returns the descriptor set slots.
    #[inline]
    pub fn slots(&self) -> &[DescriptorSetSlot] {
        &self.ds_slots
    }

    /// Returns the slot of set number `set`, if it exists.
    #[inline]
    pub fn slot(&self, set: u32) -> Option<&DescriptorSetSlot> {
        self.ds_slots.get(set as usize)
    }

    pub(crate) fn slot_mut(&mut self, set: u32) -> Option<&mut DescriptorSetSlot> {
        self.ds_slots.get_mut(set as usize)
    }

    /// Returns the push descriptor set that this bind point owns.
    #[inline]
    pub fn push_descriptor_set(&self) -> Option<&Arc<DescriptorSet>> {
        self.push_descriptor_set.as_ref()
    }

    /// Binds a pipeline, which unbinds every shader object.
    pub(crate) fn bind_pipeline(&mut self, pipeline: Arc<Pipeline>) {
        self.shader_objects = Default::default();
        self.pipeline = Some(pipeline);
    }

    /// Binds a shader object, or null, to `stage`, which unbinds the pipeline.
    pub(crate) fn bind_shader(&mut self, stage: ShaderStage, shader: Option<Arc<ShaderObject>>) {
        let Some(slot) = shader_slot(stage) else {
            return;
        };

        self.pipeline = None;
        self.shader_objects[slot] = match shader {
            Some(shader) => ShaderBinding::Bound(shader),
            None => ShaderBinding::Null,
        };
    }

    /// Binds descriptor sets `first_set..first_set + sets.len()` with `layout`.
    ///
    /// Previously bound sets are disturbed following the rules of pipeline layout compatibility:
    /// - Slots below `first_set` are cleared if `layout` is not compatible with the layout they
    ///   were bound with for their set number.
    /// - Slots after the last set that is bound are cleared if the compatibility record of the
    ///   last set changes.
    ///
    /// `dynamic_offsets` is split between the sets according to the number of dynamic
    /// descriptors in each set layout of `layout`.
    pub(crate) fn update_descriptor_sets(
        &mut self,
        layout: &Arc<PipelineLayout>,
        command: BindCommand,
        first_set: u32,
        sets: &[SlotContent],
        dynamic_offsets: &[u32],
    ) {
        let first = first_set as usize;
        let required_size = first + sets.len();

        for (index, slot) in self.ds_slots.iter_mut().enumerate().take(first) {
            if slot.compat_id.as_ref() != layout.compat_id(index as u32) {
                if slot.is_bound() {
                    trace!(set = index, "descriptor set disturbed");
                }

                slot.clear();
            }
        }

        if !sets.is_empty() {
            let last = required_size - 1;

            if required_size < self.ds_slots.len()
                && self.ds_slots[last].compat_id.as_ref() != layout.compat_id(last as u32)
            {
                self.ds_slots.truncate(required_size);
            }
        }

        if self.ds_slots.len() < required_size {
            self.ds_slots
                .resize_with(required_size, DescriptorSetSlot::default);
        }

        let mut dynamic_offsets = dynamic_offsets;

        for (index, content) in sets.iter().enumerate() {
            let set_num = first_set + index as u32;
            let offset_count = layout
                .set_layout(set_num)
                .map_or(0, |set_layout| set_layout.dynamic_descriptor_count())
                as usize;
            let (offsets, rest) = dynamic_offsets.split_at(offset_count.min(dynamic_offsets.len()));
            dynamic_offsets = rest;

            let slot = &mut self.ds_slots[first + index];
            slot.clear();
            slot.compat_id = layout.compat_id(set_num).cloned();
            slot.dynamic_offsets = offsets.iter().copied().collect();

            match content {
                SlotContent::Set(set) => {
                    slot.bound = Some(BoundSet {
                        handle: set.object_handle(),
                        set: set.clone(),
                    });
                }
                SlotContent::Null => slot.null = true,
                &SlotContent::Buffer {
                    buffer_index,
                    offset,
                } => {
                    slot.descriptor_buffer = Some(DescriptorBufferBinding {
                        buffer_index,
                        offset,
                    });
                }
            }
        }

        self.desc_set_pipeline_layout = Some(layout.clone());
        self.desc_set_bound_command = Some(command);
    }

    /// Makes `set` the push descriptor set of this bind point, returning the one it replaces.
    pub(crate) fn set_push_descriptor_set(
        &mut self,
        set: Arc<DescriptorSet>,
    ) -> Option<Arc<DescriptorSet>> {
        match &self.push_descriptor_set {
            Some(current) if Arc::ptr_eq(current, &set) => None,
            _ => self.push_descriptor_set.replace(set),
        }
    }

    /// Returns whether the set bound to `set` was bound with a layout that is compatible with
    /// `layout` for that set number.
    pub fn is_bound_set_compatible(&self, set: u32, layout: &PipelineLayout) -> bool {
        match (
            self.slot(set).and_then(DescriptorSetSlot::compat_id),
            layout.compat_id(set),
        ) {
            (Some(bound), Some(expected)) => bound == expected,
            _ => false,
        }
    }

    /// Unbinds everything, and returns the push descriptor set that was owned, so that it can be
    /// released.
    pub(crate) fn reset(&mut self) -> Option<Arc<DescriptorSet>> {
        self.pipeline = None;
        self.shader_objects = Default::default();
        self.desc_set_pipeline_layout = None;
        self.desc_set_bound_command = None;
        self.ds_slots.clear();

        self.push_descriptor_set.take()
    }
}

#[cfg(test)]
mod tests {
    use super::{BindCommand, LastBound, SlotContent};
    use crate::{
        descriptor_set::layout::DescriptorType, pipeline::PipelineBindPoint,
    };

    #[test]
    fn incompatible_layout_disturbs_set() {
        let device = test_device!();
        let a = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let b = test_set_layout!(device, [(0, DescriptorType::StorageBuffer, 1)]);
        let l = test_pipeline_layout!(device, [a.clone()]);
        let l2 = test_pipeline_layout!(device, [b.clone(), a]);

        let mut last_bound = LastBound::new(PipelineBindPoint::Graphics);
        let set = test_descriptor_set!(l.set_layout(0).unwrap().clone());
        last_bound.update_descriptor_sets(
            &l,
            BindCommand::BindDescriptorSets,
            0,
            &[SlotContent::Set(set.clone())],
            &[],
        );
        assert!(last_bound.is_bound_set_compatible(0, &l));

        let set2 = test_descriptor_set!(b);
        last_bound.update_descriptor_sets(
            &l2,
            BindCommand::BindDescriptorSets,
            0,
            &[SlotContent::Set(set2.clone())],
            &[],
        );

        assert_eq!(
            last_bound.slot(0).unwrap().bound_set().unwrap().handle(),
            set2.object_handle()
        );
        assert!(last_bound.is_bound_set_compatible(0, &l2));
        assert!(!last_bound.is_bound_set_compatible(0, &l));
        assert!(!last_bound.is_bound_set_compatible(1, &l2));
        assert!(last_bound.slot(1).is_none());
    }

    #[test]
    fn bound_set_outlives_caller_until_destroyed() {
        let device = test_device!();
        let a = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let l = test_pipeline_layout!(device, [a.clone()]);

        let mut last_bound = LastBound::new(PipelineBindPoint::Graphics);
        last_bound.update_descriptor_sets(
            &l,
            BindCommand::BindDescriptorSets,
            0,
            &[SlotContent::Set(test_descriptor_set!(a))],
            &[],
        );

        let bound = last_bound.slot(0).unwrap().bound_set().unwrap().clone();
        let set = bound.upgrade().unwrap();
        assert_eq!(set.object_handle(), bound.handle());

        set.release();
        assert!(bound.upgrade().is_none());
    }

    #[test]
    fn lower_sets_are_disturbed_only_when_incompatible() {
        let device = test_device!();
        let a = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let b = test_set_layout!(device, [(0, DescriptorType::SampledImage, 1)]);
        let c = test_set_layout!(device, [(0, DescriptorType::StorageImage, 1)]);

        let ab = test_pipeline_layout!(device, [a.clone(), b.clone()]);
        let ac = test_pipeline_layout!(device, [a.clone(), c.clone()]);
        let cb = test_pipeline_layout!(device, [c.clone(), b.clone()]);

        let set_a = test_descriptor_set!(a);
        let set_b = test_descriptor_set!(b);
        let set_c = test_descriptor_set!(c);

        let mut last_bound = LastBound::new(PipelineBindPoint::Compute);
        last_bound.update_descriptor_sets(
            &ab,
            BindCommand::BindDescriptorSets,
            0,
            &[SlotContent::Set(set_a), SlotContent::Set(set_b.clone())],
            &[],
        );

        // Set 0 is defined identically in `ac`, so it survives.
        last_bound.update_descriptor_sets(
            &ac,
            BindCommand::BindDescriptorSets,
            1,
            &[SlotContent::Set(set_c.clone())],
            &[],
        );
        assert!(last_bound.slot(0).unwrap().is_bound());
        assert!(last_bound.is_bound_set_compatible(0, &ac));

        // Set 0 differs in `cb`, so it is cleared.
        last_bound.update_descriptor_sets(
            &cb,
            BindCommand::BindDescriptorSets,
            1,
            &[SlotContent::Set(set_b)],
            &[],
        );
        assert!(!last_bound.slot(0).unwrap().is_bound());
        assert!(!last_bound.is_bound_set_compatible(0, &cb));
        assert!(last_bound.is_bound_set_compatible(1, &cb));
    }

    #[test]
    fn tail_is_kept_only_when_last_set_is_unchanged() {
        let device = test_device!();
        let a = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let b = test_set_layout!(device, [(0, DescriptorType::SampledImage, 1)]);
        let c = test_set_layout!(device, [(0, DescriptorType::StorageImage, 1)]);

        let abc = test_pipeline_layout!(device, [a.clone(), b.clone(), c.clone()]);
        let cbc = test_pipeline_layout!(device, [c.clone(), b.clone(), c.clone()]);

        let sets = [
            SlotContent::Set(test_descriptor_set!(a.clone())),
            SlotContent::Set(test_descriptor_set!(b)),
            SlotContent::Set(test_descriptor_set!(c.clone())),
        ];

        let mut last_bound = LastBound::new(PipelineBindPoint::Graphics);
        last_bound.update_descriptor_sets(&abc, BindCommand::BindDescriptorSets, 0, &sets, &[]);

        // Rebinding set 0 with the same layout leaves sets 1 and 2 alone.
        last_bound.update_descriptor_sets(
            &abc,
            BindCommand::BindDescriptorSets,
            0,
            &[SlotContent::Set(test_descriptor_set!(a))],
            &[],
        );
        assert_eq!(last_bound.slots().len(), 3);
        assert!(last_bound.is_bound_set_compatible(2, &abc));

        // Rebinding set 0 with a different layout for set 0 drops the tail.
        last_bound.update_descriptor_sets(
            &cbc,
            BindCommand::BindDescriptorSets,
            0,
            &[SlotContent::Set(test_descriptor_set!(c))],
            &[],
        );
        assert_eq!(last_bound.slots().len(), 1);
        assert!(!last_bound.is_bound_set_compatible(1, &cbc));
    }

    #[test]
    fn dynamic_offsets_are_split_per_set() {
        let device = test_device!();
        let a = test_set_layout!(device, [(0, DescriptorType::UniformBufferDynamic, 2)]);
        let b = test_set_layout!(device, [(0, DescriptorType::SampledImage, 1)]);
        let c = test_set_layout!(device, [(0, DescriptorType::StorageBufferDynamic, 1)]);
        let layout = test_pipeline_layout!(device, [a.clone(), b.clone(), c.clone()]);

        let mut last_bound = LastBound::new(PipelineBindPoint::Graphics);
        last_bound.update_descriptor_sets(
            &layout,
            BindCommand::BindDescriptorSets,
            0,
            &[
                SlotContent::Set(test_descriptor_set!(a)),
                SlotContent::Set(test_descriptor_set!(b)),
                SlotContent::Set(test_descriptor_set!(c)),
            ],
            &[256, 512, 768],
        );

        assert_eq!(last_bound.slot(0).unwrap().dynamic_offsets(), [256, 512]);
        assert!(last_bound.slot(1).unwrap().dynamic_offsets().is_empty());
        assert_eq!(last_bound.slot(2).unwrap().dynamic_offsets(), [768]);
        assert_eq!(
            last_bound.desc_set_bound_command(),
            Some(BindCommand::BindDescriptorSets)
        );
    }

    #[test]
    fn descriptor_buffer_and_null_slots_count_as_bound() {
        let device = test_device!();
        let a = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let layout = test_pipeline_layout!(device, [a.clone(), a]);

        let mut last_bound = LastBound::new(PipelineBindPoint::Compute);
        last_bound.update_descriptor_sets(
            &layout,
            BindCommand::BindDescriptorBufferOffsets,
            0,
            &[
                SlotContent::Buffer {
                    buffer_index: 0,
                    offset: 64,
                },
                SlotContent::Null,
            ],
            &[],
        );

        let slot = last_bound.slot(0).unwrap();
        assert!(slot.is_bound());
        assert_eq!(slot.descriptor_buffer().map(|binding| binding.offset), Some(64));
        assert!(last_bound.slot(1).unwrap().is_null());
        assert!(last_bound.is_bound_set_compatible(1, &layout));

        assert!(last_bound.reset().is_none());
        assert!(last_bound.slots().is_empty());
    }
}
