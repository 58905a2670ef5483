//! Shader stages, the facts reflected from shader entry points, and shader objects.
//!
//! The layer does not parse SPIR-V itself. The dispatch glue hands over, for each entry point,
//! which descriptor bindings it statically uses and which push constant bytes it reads. These
//! facts are what a draw is validated against.

use crate::{
    descriptor_set::layout::{DescriptorSetLayout, DescriptorType},
    device::Device,
    macros::vulkan_bitflags_enum,
    object::{ObjectHandle, ObjectNode, StateObject},
    pipeline::layout::{
        PipelineLayout, PipelineLayoutCreateFlags, PipelineLayoutCreateInfo, PushConstantRange,
    },
    NonExhaustive,
};
use ash::vk;
use foldhash::HashMap;
use std::sync::Arc;

vulkan_bitflags_enum! {
    /// A set of [`ShaderStage`] values.
    ShaderStages impl {
        /// Creates a `ShaderStages` struct with all graphics stages that take part in primitive
        /// shading set.
        #[inline]
        pub const fn all_graphics() -> ShaderStages {
            ShaderStages::VERTEX
                .union(ShaderStages::TESSELLATION_CONTROL)
                .union(ShaderStages::TESSELLATION_EVALUATION)
                .union(ShaderStages::GEOMETRY)
                .union(ShaderStages::FRAGMENT)
        }

        /// Creates a `ShaderStages` struct with the task and mesh stages set.
        #[inline]
        pub const fn mesh_shading() -> ShaderStages {
            ShaderStages::TASK.union(ShaderStages::MESH)
        }

        /// Creates a `ShaderStages` struct with all ray tracing stages set.
        #[inline]
        pub const fn ray_tracing() -> ShaderStages {
            ShaderStages::RAYGEN
                .union(ShaderStages::ANY_HIT)
                .union(ShaderStages::CLOSEST_HIT)
                .union(ShaderStages::MISS)
                .union(ShaderStages::INTERSECTION)
                .union(ShaderStages::CALLABLE)
        }
    },

    /// A shader stage within a pipeline.
    ShaderStage impl {
        /// Returns whether the stage belongs to the graphics bind point.
        #[inline]
        pub fn is_graphics(self) -> bool {
            ShaderStages::all_graphics()
                .union(ShaderStages::mesh_shading())
                .contains_enum(self)
        }
    },

    = ShaderStageFlags(u32);

    /// Processes each vertex.
    VERTEX, Vertex = VERTEX,

    /// Determines how much tessellation is applied to each patch.
    TESSELLATION_CONTROL, TessellationControl = TESSELLATION_CONTROL,

    /// Computes the positions of the vertices generated by tessellation.
    TESSELLATION_EVALUATION, TessellationEvaluation = TESSELLATION_EVALUATION,

    /// Processes whole primitives.
    GEOMETRY, Geometry = GEOMETRY,

    /// Processes each fragment.
    FRAGMENT, Fragment = FRAGMENT,

    /// Compute work, outside the graphics pipeline.
    COMPUTE, Compute = COMPUTE,

    /// Generates the initial rays of a ray tracing dispatch.
    RAYGEN, Raygen = RAYGEN_KHR,

    /// Invoked when a ray may have hit geometry.
    ANY_HIT, AnyHit = ANY_HIT_KHR,

    /// Invoked on the closest hit of a ray.
    CLOSEST_HIT, ClosestHit = CLOSEST_HIT_KHR,

    /// Invoked when a ray hits nothing.
    MISS, Miss = MISS_KHR,

    /// Computes intersections with procedural geometry.
    INTERSECTION, Intersection = INTERSECTION_KHR,

    /// Invoked from other ray tracing shaders.
    CALLABLE, Callable = CALLABLE_KHR,

    /// Generates mesh shader workgroups.
    TASK, Task = TASK_EXT,

    /// Generates primitives in workgroups.
    MESH, Mesh = MESH_EXT,
}

/// The requirements that an entry point imposes on one descriptor binding that it statically
/// uses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DescriptorBindingRequirements {
    /// The descriptor types that are allowed. An empty list allows any type.
    pub descriptor_types: Vec<DescriptorType>,

    /// The number of descriptors (array elements) that the shader requires. The descriptor set
    /// layout can declare more than this, but never less.
    ///
    /// `None` means that the shader declares this as a runtime-sized array, and could potentially
    /// access every array element provided in the descriptor set.
    pub descriptor_count: Option<u32>,

    /// The shader stages that use the binding.
    pub stages: ShaderStages,
}

impl DescriptorBindingRequirements {
    /// Merges the requirements of another stage into `self`.
    pub fn merge(&mut self, other: &Self) {
        if self.descriptor_types.is_empty() {
            self.descriptor_types.clone_from(&other.descriptor_types);
        } else if !other.descriptor_types.is_empty() {
            self.descriptor_types
                .retain(|ty| other.descriptor_types.contains(ty));
        }

        self.descriptor_count = match (self.descriptor_count, other.descriptor_count) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        };
        self.stages |= other.stages;
    }

    /// Returns the number of array elements of a binding with `binding_count` elements that the
    /// shader may access.
    #[inline]
    pub fn accessed_count(&self, binding_count: u32) -> u32 {
        self.descriptor_count
            .map_or(binding_count, |count| count.min(binding_count))
    }
}

/// The facts about a shader entry point that are needed to validate the state it runs with.
#[derive(Clone, Debug)]
pub struct EntryPointInfo {
    /// The stage of the entry point.
    pub stage: ShaderStage,

    /// The descriptor bindings that are statically used, keyed by `(set, binding)`.
    pub descriptor_binding_requirements: HashMap<(u32, u32), DescriptorBindingRequirements>,

    /// The range of push constant bytes that is statically read, if any.
    pub push_constant_requirements: Option<PushConstantRange>,

    pub _ne: NonExhaustive,
}

impl EntryPointInfo {
    /// Returns an `EntryPointInfo` for `stage` that uses no resources.
    #[inline]
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            stage,
            descriptor_binding_requirements: HashMap::default(),
            push_constant_requirements: None,
            _ne: NonExhaustive(()),
        }
    }

    /// Adds a descriptor binding requirement.
    #[inline]
    pub fn with_binding(
        mut self,
        set: u32,
        binding: u32,
        descriptor_types: impl IntoIterator<Item = DescriptorType>,
        descriptor_count: Option<u32>,
    ) -> Self {
        self.descriptor_binding_requirements.insert(
            (set, binding),
            DescriptorBindingRequirements {
                descriptor_types: descriptor_types.into_iter().collect(),
                descriptor_count,
                stages: self.stage.into(),
            },
        );

        self
    }

    /// Sets the push constant requirement.
    #[inline]
    pub fn with_push_constants(mut self, offset: u32, size: u32) -> Self {
        self.push_constant_requirements = Some(PushConstantRange {
            stages: self.stage.into(),
            offset,
            size,
        });

        self
    }
}

/// Merges the descriptor requirements of several entry points.
pub(crate) fn merge_binding_requirements<'a>(
    entry_points: impl IntoIterator<Item = &'a EntryPointInfo>,
) -> HashMap<(u32, u32), DescriptorBindingRequirements> {
    let mut merged: HashMap<(u32, u32), DescriptorBindingRequirements> = HashMap::default();

    for entry_point in entry_points {
        for (&key, requirements) in &entry_point.descriptor_binding_requirements {
            merged
                .entry(key)
                .and_modify(|existing| existing.merge(requirements))
                .or_insert_with(|| requirements.clone());
        }
    }

    merged
}

/// Merges the push constant requirements of several entry points into the smallest range that
/// covers all of them.
pub(crate) fn merge_push_constant_requirements<'a>(
    entry_points: impl IntoIterator<Item = &'a EntryPointInfo>,
) -> Option<PushConstantRange> {
    entry_points
        .into_iter()
        .filter_map(|entry_point| entry_point.push_constant_requirements)
        .reduce(|a, b| {
            let start = a.offset.min(b.offset);
            let end = a.end().max(b.end());

            PushConstantRange {
                stages: a.stages | b.stages,
                offset: start,
                size: end - start,
            }
        })
}

/// A shader that is bound on its own, without a pipeline.
#[derive(Debug)]
pub struct ShaderObject {
    handle: vk::ShaderEXT,
    device: Arc<Device>,
    node: ObjectNode,

    entry_point: EntryPointInfo,
    layout: Arc<PipelineLayout>,
}

impl ShaderObject {
    /// Creates a new `ShaderObject`.
    ///
    /// The descriptor set layouts and push constant ranges of the create info describe the
    /// interface of the shader, the same way a pipeline layout does for a pipeline.
    pub fn new(
        device: Arc<Device>,
        handle: vk::ShaderEXT,
        create_info: ShaderObjectCreateInfo,
    ) -> Arc<Self> {
        let ShaderObjectCreateInfo {
            entry_point,
            set_layouts,
            push_constant_ranges,
            _ne: _,
        } = create_info;

        let layout = PipelineLayout::new(
            device.clone(),
            vk::PipelineLayout::null(),
            PipelineLayoutCreateInfo {
                flags: PipelineLayoutCreateFlags::empty(),
                set_layouts,
                push_constant_ranges,
                ..Default::default()
            },
        );

        Arc::new(ShaderObject {
            handle,
            device,
            node: ObjectNode::new(),
            entry_point,
            layout,
        })
    }

    /// Returns the raw handle.
    #[inline]
    pub fn handle(&self) -> vk::ShaderEXT {
        self.handle
    }

    /// Returns the device that the shader belongs to.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the stage of the shader.
    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.entry_point.stage
    }

    /// Returns the reflected facts of the entry point.
    #[inline]
    pub fn entry_point(&self) -> &EntryPointInfo {
        &self.entry_point
    }

    /// Returns the layout that describes the interface of the shader.
    #[inline]
    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }

    /// Returns the shader as an `ObjectHandle`.
    #[inline]
    pub fn object_handle(&self) -> ObjectHandle {
        ObjectHandle::new(self.handle)
    }
}

impl StateObject for ShaderObject {
    #[inline]
    fn handle(&self) -> ObjectHandle {
        self.object_handle()
    }

    #[inline]
    fn node(&self) -> &ObjectNode {
        &self.node
    }
}

/// Parameters to create a new `ShaderObject`.
#[derive(Clone, Debug)]
pub struct ShaderObjectCreateInfo {
    /// The reflected facts of the entry point.
    pub entry_point: EntryPointInfo,

    /// The descriptor set layouts of the shader interface.
    ///
    /// The default value is empty.
    pub set_layouts: Vec<Option<Arc<DescriptorSetLayout>>>,

    /// The push constant ranges of the shader interface.
    ///
    /// The default value is empty.
    pub push_constant_ranges: Vec<PushConstantRange>,

    pub _ne: NonExhaustive,
}

impl ShaderObjectCreateInfo {
    /// Returns a `ShaderObjectCreateInfo` with the specified `entry_point`.
    #[inline]
    pub fn new(entry_point: EntryPointInfo) -> Self {
        Self {
            entry_point,
            set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
            _ne: NonExhaustive(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        merge_binding_requirements, merge_push_constant_requirements, EntryPointInfo,
        ShaderStage, ShaderStages,
    };
    use crate::descriptor_set::layout::DescriptorType;

    #[test]
    fn stage_iteration() {
        let stages = ShaderStages::VERTEX | ShaderStages::FRAGMENT;
        let collected: Vec<_> = stages.into_iter().collect();

        assert_eq!(collected, [ShaderStage::Vertex, ShaderStage::Fragment]);
        assert!(ShaderStage::Mesh.is_graphics());
        assert!(!ShaderStage::Compute.is_graphics());
    }

    #[test]
    fn merge_requirements_across_stages() {
        let vertex = EntryPointInfo::new(ShaderStage::Vertex)
            .with_binding(
                0,
                0,
                [DescriptorType::UniformBuffer, DescriptorType::UniformBufferDynamic],
                Some(1),
            )
            .with_push_constants(0, 16);
        let fragment = EntryPointInfo::new(ShaderStage::Fragment)
            .with_binding(0, 0, [DescriptorType::UniformBuffer], Some(4))
            .with_binding(0, 1, [DescriptorType::CombinedImageSampler], None)
            .with_push_constants(32, 16);

        let merged = merge_binding_requirements([&vertex, &fragment]);
        let binding0 = &merged[&(0, 0)];

        assert_eq!(binding0.descriptor_types, [DescriptorType::UniformBuffer]);
        assert_eq!(binding0.descriptor_count, Some(4));
        assert_eq!(binding0.stages, ShaderStages::VERTEX | ShaderStages::FRAGMENT);
        assert_eq!(merged[&(0, 1)].accessed_count(8), 8);

        let push = merge_push_constant_requirements([&vertex, &fragment]).unwrap();
        assert_eq!((push.offset, push.size), (0, 48));
    }
}
