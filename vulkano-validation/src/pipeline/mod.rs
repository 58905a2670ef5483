//! Describes a processing operation that will execute on the Vulkan device.
//!
//! A [`Pipeline`] is known to this crate through the facts that matter at draw time: the bind
//! point it is bound to, its layout, the descriptors and push constants its shaders statically
//! use, and which state it leaves dynamic. Pipelines linked from graphics pipeline libraries
//! combine the facts of their libraries.

use self::layout::{PipelineLayout, PushConstantRange};
use crate::{
    device::Device,
    dynamic_state::{DynamicState, DynamicStateCategory, DynamicStates},
    macros::{impl_id_counter, vulkan_bitflags},
    object::{ObjectHandle, ObjectNode, StateObject},
    shader::{
        merge_binding_requirements, merge_push_constant_requirements,
        DescriptorBindingRequirements, EntryPointInfo, ShaderStage, ShaderStages,
    },
    NonExhaustive, ValidationError,
};
use ash::vk;
use foldhash::HashMap;
use std::{num::NonZero, sync::Arc};
use tracing::trace;

pub mod layout;

/// The type of a pipeline.
///
/// When binding a pipeline or descriptor sets in a command buffer, the state for each bind point
/// is independent from the others. This means that it is possible, for example, to bind a graphics
/// pipeline without disturbing any bound compute pipeline. Likewise, binding descriptor sets for
/// the `Compute` bind point does not affect sets that were bound to the `Graphics` bind point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PipelineBindPoint {
    Compute,
    Graphics,
    RayTracing,
    ExecutionGraph,
}

// `VK_PIPELINE_BIND_POINT_EXECUTION_GRAPH_AMDX`.
const EXECUTION_GRAPH_RAW: i32 = 1_000_134_000;

impl PipelineBindPoint {
    /// The number of bind points.
    pub const COUNT: usize = 4;

    /// Every bind point, in index order.
    pub const ALL: [PipelineBindPoint; Self::COUNT] = [
        PipelineBindPoint::Compute,
        PipelineBindPoint::Graphics,
        PipelineBindPoint::RayTracing,
        PipelineBindPoint::ExecutionGraph,
    ];

    /// Returns the index of the bind point, for per-bind-point arrays.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the shader stages that may be used with this bind point.
    pub const fn stages(self) -> ShaderStages {
        match self {
            PipelineBindPoint::Compute | PipelineBindPoint::ExecutionGraph => {
                ShaderStages::COMPUTE
            }
            PipelineBindPoint::Graphics => {
                ShaderStages::all_graphics().union(ShaderStages::mesh_shading())
            }
            PipelineBindPoint::RayTracing => ShaderStages::ray_tracing(),
        }
    }

    /// Returns the category of dynamic state that pipelines of this bind point declare.
    #[inline]
    pub const fn dynamic_state_category(self) -> Option<DynamicStateCategory> {
        match self {
            PipelineBindPoint::Graphics => Some(DynamicStateCategory::Graphics),
            PipelineBindPoint::RayTracing => Some(DynamicStateCategory::RayTracing),
            PipelineBindPoint::Compute | PipelineBindPoint::ExecutionGraph => None,
        }
    }
}

impl From<PipelineBindPoint> for vk::PipelineBindPoint {
    #[inline]
    fn from(val: PipelineBindPoint) -> Self {
        match val {
            PipelineBindPoint::Compute => vk::PipelineBindPoint::COMPUTE,
            PipelineBindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
            PipelineBindPoint::RayTracing => vk::PipelineBindPoint::RAY_TRACING_KHR,
            PipelineBindPoint::ExecutionGraph => {
                vk::PipelineBindPoint::from_raw(EXECUTION_GRAPH_RAW)
            }
        }
    }
}

impl TryFrom<vk::PipelineBindPoint> for PipelineBindPoint {
    type Error = ();

    #[inline]
    fn try_from(val: vk::PipelineBindPoint) -> Result<Self, Self::Error> {
        Ok(match val {
            vk::PipelineBindPoint::COMPUTE => PipelineBindPoint::Compute,
            vk::PipelineBindPoint::GRAPHICS => PipelineBindPoint::Graphics,
            vk::PipelineBindPoint::RAY_TRACING_KHR => PipelineBindPoint::RayTracing,
            _ if val.as_raw() == EXECUTION_GRAPH_RAW => PipelineBindPoint::ExecutionGraph,
            _ => return Err(()),
        })
    }
}

/// A pipeline of any bind point.
#[derive(Debug)]
pub struct Pipeline {
    handle: vk::Pipeline,
    device: Arc<Device>,
    node: ObjectNode,
    id: NonZero<u64>,

    bind_point: PipelineBindPoint,
    flags: PipelineCreateFlags,
    layout: Arc<PipelineLayout>,
    entry_points: Vec<EntryPointInfo>,
    stages: ShaderStages,
    descriptor_binding_requirements: HashMap<(u32, u32), DescriptorBindingRequirements>,
    push_constant_requirements: Option<PushConstantRange>,
    num_used_descriptor_sets: u32,
    dynamic_state: DynamicStates,
    graphics_state: Option<GraphicsPipelineState>,
}

impl Pipeline {
    /// Creates a new `Pipeline`.
    ///
    /// The entry points, dynamic state and graphics state of `create_info.libraries` are combined
    /// with those given directly. If no layout is given, the layouts of the libraries are merged.
    pub fn new(
        device: Arc<Device>,
        handle: vk::Pipeline,
        create_info: PipelineCreateInfo,
    ) -> Arc<Pipeline> {
        let PipelineCreateInfo {
            bind_point,
            flags,
            layout,
            stages: mut entry_points,
            dynamic_state,
            graphics_state,
            libraries,
            _ne: _,
        } = create_info;

        let mut dynamic_state: DynamicStates = dynamic_state.into_iter().collect();
        let mut graphics_state = graphics_state;

        for library in &libraries {
            entry_points.extend(library.entry_points.iter().cloned());
            dynamic_state = dynamic_state.union(library.dynamic_state);

            if let Some(library_state) = &library.graphics_state {
                graphics_state = Some(match graphics_state {
                    Some(state) => state.link(library_state),
                    None => library_state.clone(),
                });
            }
        }

        let layout = layout.unwrap_or_else(|| {
            PipelineLayout::merge(device.clone(), libraries.iter().map(|library| &library.layout))
        });

        let stages: ShaderStages = entry_points
            .iter()
            .map(|entry_point| entry_point.stage)
            .collect();
        let descriptor_binding_requirements = merge_binding_requirements(&entry_points);
        let push_constant_requirements = merge_push_constant_requirements(&entry_points);
        let num_used_descriptor_sets = descriptor_binding_requirements
            .keys()
            .map(|&(set, _)| set + 1)
            .max()
            .unwrap_or(0);

        // Libraries only carry the state of the parts they were created with.
        if bind_point == PipelineBindPoint::Graphics
            && !flags.intersects(PipelineCreateFlags::LIBRARY)
            && graphics_state.is_none()
        {
            graphics_state = Some(GraphicsPipelineState::default());
        }

        trace!(
            pipeline = ?handle,
            ?bind_point,
            ?stages,
            libraries = libraries.len(),
            "pipeline created",
        );

        Arc::new(Pipeline {
            handle,
            device,
            node: ObjectNode::new(),
            id: Self::next_id(),
            bind_point,
            flags,
            layout,
            entry_points,
            stages,
            descriptor_binding_requirements,
            push_constant_requirements,
            num_used_descriptor_sets,
            dynamic_state,
            graphics_state,
        })
    }

    /// Returns the raw handle.
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    /// Returns the device that the pipeline belongs to.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the bind point that the pipeline is bound to.
    #[inline]
    pub fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    /// Returns the flags that the pipeline was created with.
    #[inline]
    pub fn flags(&self) -> PipelineCreateFlags {
        self.flags
    }

    /// Returns whether the pipeline is a library, which can't be bound.
    #[inline]
    pub fn is_library(&self) -> bool {
        self.flags.intersects(PipelineCreateFlags::LIBRARY)
    }

    /// Returns the layout of the pipeline.
    #[inline]
    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }

    /// Returns the entry points of the pipeline, including those of linked libraries.
    #[inline]
    pub fn entry_points(&self) -> &[EntryPointInfo] {
        &self.entry_points
    }

    /// Returns the shader stages that the pipeline has.
    #[inline]
    pub fn stages(&self) -> ShaderStages {
        self.stages
    }

    /// Returns the descriptor bindings that the shaders of the pipeline statically use, merged
    /// across stages.
    #[inline]
    pub fn descriptor_binding_requirements(
        &self,
    ) -> &HashMap<(u32, u32), DescriptorBindingRequirements> {
        &self.descriptor_binding_requirements
    }

    /// Returns the push constant bytes that the shaders of the pipeline statically read.
    #[inline]
    pub fn push_constant_requirements(&self) -> Option<&PushConstantRange> {
        self.push_constant_requirements.as_ref()
    }

    /// Returns one more than the highest set number that the shaders use.
    #[inline]
    pub fn num_used_descriptor_sets(&self) -> u32 {
        self.num_used_descriptor_sets
    }

    /// Returns the states that the pipeline leaves dynamic.
    #[inline]
    pub fn dynamic_state(&self) -> DynamicStates {
        self.dynamic_state
    }

    /// Returns whether `state` is dynamic in the pipeline.
    #[inline]
    pub fn is_dynamic(&self, state: DynamicState) -> bool {
        self.dynamic_state.contains(state)
    }

    /// Returns the fixed-function state of a graphics pipeline.
    #[inline]
    pub fn graphics_state(&self) -> Option<&GraphicsPipelineState> {
        self.graphics_state.as_ref()
    }

    /// Returns the pipeline as an `ObjectHandle`.
    #[inline]
    pub fn object_handle(&self) -> ObjectHandle {
        ObjectHandle::new(self.handle)
    }
}

impl_id_counter!(Pipeline);

impl StateObject for Pipeline {
    #[inline]
    fn handle(&self) -> ObjectHandle {
        self.object_handle()
    }

    #[inline]
    fn node(&self) -> &ObjectNode {
        &self.node
    }
}

/// Parameters to create a new `Pipeline`.
#[derive(Clone, Debug)]
pub struct PipelineCreateInfo {
    /// The bind point of the pipeline.
    ///
    /// There is no default value.
    pub bind_point: PipelineBindPoint,

    /// Additional properties of the pipeline.
    ///
    /// The default value is empty.
    pub flags: PipelineCreateFlags,

    /// The layout of the pipeline. If `None`, the layouts of `libraries` are merged.
    ///
    /// The default value is `None`.
    pub layout: Option<Arc<PipelineLayout>>,

    /// The entry points of the shader stages.
    ///
    /// The default value is empty.
    pub stages: Vec<EntryPointInfo>,

    /// The states that are left dynamic.
    ///
    /// The default value is empty.
    pub dynamic_state: Vec<DynamicState>,

    /// The fixed-function state of a graphics pipeline.
    ///
    /// The default value is `None`.
    pub graphics_state: Option<GraphicsPipelineState>,

    /// Graphics pipeline libraries that are linked into this pipeline.
    ///
    /// The default value is empty.
    pub libraries: Vec<Arc<Pipeline>>,

    pub _ne: NonExhaustive,
}

impl PipelineCreateInfo {
    /// Returns a `PipelineCreateInfo` with the specified `bind_point` and `layout`.
    #[inline]
    pub fn new(bind_point: PipelineBindPoint, layout: Arc<PipelineLayout>) -> Self {
        Self {
            bind_point,
            flags: PipelineCreateFlags::empty(),
            layout: Some(layout),
            stages: Vec::new(),
            dynamic_state: Vec::new(),
            graphics_state: None,
            libraries: Vec::new(),
            _ne: NonExhaustive(()),
        }
    }

    /// Returns a `PipelineCreateInfo` for a graphics pipeline linked from `libraries`, whose
    /// layout is merged from theirs.
    #[inline]
    pub fn from_libraries(libraries: Vec<Arc<Pipeline>>) -> Self {
        Self {
            bind_point: PipelineBindPoint::Graphics,
            flags: PipelineCreateFlags::empty(),
            layout: None,
            stages: Vec::new(),
            dynamic_state: Vec::new(),
            graphics_state: None,
            libraries,
            _ne: NonExhaustive(()),
        }
    }

    pub fn validate(&self, device: &Device) -> Result<(), Box<ValidationError>> {
        let features = device.enabled_features();
        let allowed_stages = self.bind_point.stages();
        let mut stages = ShaderStages::empty();

        for (index, entry_point) in self.stages.iter().enumerate() {
            let stage = entry_point.stage;

            if !allowed_stages.contains_enum(stage) {
                return Err(Box::new(ValidationError {
                    context: format!("stages[{}].stage", index).into(),
                    problem: format!(
                        "{:?} can't be used in a pipeline with bind point {:?}",
                        stage, self.bind_point,
                    )
                    .into(),
                    vuids: &["VUID-VkGraphicsPipelineCreateInfo-stage-06897"],
                    ..Default::default()
                }));
            }

            if stages.contains_enum(stage) {
                return Err(Box::new(ValidationError {
                    context: "stages".into(),
                    problem: format!("contains more than one {:?} stage", stage).into(),
                    vuids: &["VUID-VkGraphicsPipelineCreateInfo-stage-06897"],
                    ..Default::default()
                }));
            }

            let required_feature = match stage {
                ShaderStage::TessellationControl | ShaderStage::TessellationEvaluation => Some((
                    features.tessellation_shader,
                    "tessellation_shader",
                    &["VUID-VkPipelineShaderStageCreateInfo-stage-00705"],
                )),
                ShaderStage::Geometry => Some((
                    features.geometry_shader,
                    "geometry_shader",
                    &["VUID-VkPipelineShaderStageCreateInfo-stage-00704"],
                )),
                ShaderStage::Task | ShaderStage::Mesh => Some((
                    features.mesh_shader,
                    "mesh_shader",
                    &["VUID-VkPipelineShaderStageCreateInfo-stage-02091"],
                )),
                _ => None,
            };

            if let Some((false, feature, vuids)) = required_feature {
                return Err(Box::new(ValidationError {
                    context: format!("stages[{}].stage", index).into(),
                    problem: format!(
                        "is {:?}, but the `{}` feature is not enabled",
                        stage, feature,
                    )
                    .into(),
                    vuids,
                    ..Default::default()
                }));
            }

            stages |= stage.into();
        }

        for library in &self.libraries {
            stages |= library.stages;
        }

        if self.bind_point == PipelineBindPoint::Graphics {
            if stages.intersects(ShaderStages::VERTEX) && stages.intersects(ShaderStages::MESH) {
                return Err(Box::new(ValidationError {
                    context: "stages".into(),
                    problem: "contains both a vertex and a mesh stage".into(),
                    vuids: &["VUID-VkGraphicsPipelineCreateInfo-pStages-02095"],
                    ..Default::default()
                }));
            }

            if stages.intersects(ShaderStages::TESSELLATION_CONTROL)
                != stages.intersects(ShaderStages::TESSELLATION_EVALUATION)
            {
                return Err(Box::new(ValidationError {
                    context: "stages".into(),
                    problem: "contains only one of the two tessellation stages".into(),
                    vuids: &[
                        "VUID-VkGraphicsPipelineCreateInfo-pStages-00729",
                        "VUID-VkGraphicsPipelineCreateInfo-pStages-00730",
                    ],
                    ..Default::default()
                }));
            }
        }

        if (self.flags.intersects(PipelineCreateFlags::LIBRARY) || !self.libraries.is_empty())
            && !features.graphics_pipeline_library
        {
            return Err(Box::new(ValidationError {
                problem: "the pipeline is or uses a graphics pipeline library, but the \
                    `graphics_pipeline_library` feature is not enabled"
                    .into(),
                vuids: &["VUID-VkGraphicsPipelineCreateInfo-graphicsPipelineLibrary-06606"],
                ..Default::default()
            }));
        }

        if !self.libraries.is_empty() && self.bind_point != PipelineBindPoint::Graphics {
            return Err(Box::new(ValidationError {
                context: "libraries".into(),
                problem: "is not empty, but the pipeline is not a graphics pipeline".into(),
                ..Default::default()
            }));
        }

        if let Some(category) = self.bind_point.dynamic_state_category() {
            if let Some(state) = self
                .dynamic_state
                .iter()
                .find(|state| state.category() != category)
            {
                return Err(Box::new(ValidationError {
                    context: "dynamic_state".into(),
                    problem: format!(
                        "contains {:?}, which does not apply to pipelines with bind point {:?}",
                        state, self.bind_point,
                    )
                    .into(),
                    vuids: &["VUID-VkPipelineDynamicStateCreateInfo-pDynamicStates-01442"],
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }
}

/// The fixed-function state of a graphics pipeline that draw-time validation looks at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphicsPipelineState {
    /// Whether rasterization is discarded. Ignored if
    /// [`DynamicState::RasterizerDiscardEnable`] is dynamic.
    ///
    /// The default value is `false`.
    pub rasterizer_discard_enable: bool,

    /// The number of color attachments in the color blend state.
    ///
    /// The default value is 0.
    pub color_attachment_count: u32,

    /// The view mask that the pipeline was created with, for multiview rendering.
    ///
    /// The default value is 0.
    pub view_mask: u32,

    pub _ne: NonExhaustive,
}

impl Default for GraphicsPipelineState {
    #[inline]
    fn default() -> Self {
        Self {
            rasterizer_discard_enable: false,
            color_attachment_count: 0,
            view_mask: 0,
            _ne: NonExhaustive(()),
        }
    }
}

impl GraphicsPipelineState {
    /// Combines the state of two graphics pipeline libraries. Each value is taken from the
    /// library that specifies it.
    fn link(&self, other: &Self) -> Self {
        Self {
            rasterizer_discard_enable: self.rasterizer_discard_enable
                || other.rasterizer_discard_enable,
            color_attachment_count: self.color_attachment_count.max(other.color_attachment_count),
            view_mask: self.view_mask | other.view_mask,
            _ne: NonExhaustive(()),
        }
    }
}

vulkan_bitflags! {
    /// Flags specifying additional properties of a pipeline.
    PipelineCreateFlags = PipelineCreateFlags(u32);

    /// The pipeline is a library, to be linked into other pipelines.
    LIBRARY = LIBRARY_KHR,

    /// The pipeline may be used with descriptor buffers.
    DESCRIPTOR_BUFFER = DESCRIPTOR_BUFFER_EXT,

    /// The pipeline may be bound in protected command buffers.
    PROTECTED_ACCESS_ONLY = PROTECTED_ACCESS_ONLY_EXT,

    /// The pipeline may not be bound in protected command buffers.
    NO_PROTECTED_ACCESS = NO_PROTECTED_ACCESS_EXT,
}

#[cfg(test)]
mod tests {
    use super::{
        GraphicsPipelineState, Pipeline, PipelineBindPoint, PipelineCreateFlags,
        PipelineCreateInfo,
    };
    use crate::{
        descriptor_set::layout::DescriptorType,
        device::DeviceFeatures,
        dynamic_state::DynamicState,
        shader::{EntryPointInfo, ShaderStage, ShaderStages},
    };
    use ash::vk::{self, Handle};

    #[test]
    fn bind_point_conversion() {
        for bind_point in PipelineBindPoint::ALL {
            assert_eq!(
                PipelineBindPoint::try_from(vk::PipelineBindPoint::from(bind_point)),
                Ok(bind_point),
            );
        }
    }

    #[test]
    fn requirements_are_merged() {
        let device = test_device!();
        let set0 = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let set1 = test_set_layout!(device, [(0, DescriptorType::SampledImage, 4)]);
        let layout = test_pipeline_layout!(device, [set0, set1]);

        let pipeline = Pipeline::new(
            device,
            vk::Pipeline::from_raw(1),
            PipelineCreateInfo {
                stages: vec![
                    EntryPointInfo::new(ShaderStage::Vertex).with_binding(
                        0,
                        0,
                        [DescriptorType::UniformBuffer],
                        Some(1),
                    ),
                    EntryPointInfo::new(ShaderStage::Fragment)
                        .with_binding(1, 0, [DescriptorType::SampledImage], None)
                        .with_push_constants(0, 8),
                ],
                dynamic_state: vec![DynamicState::Viewport],
                ..PipelineCreateInfo::new(PipelineBindPoint::Graphics, layout)
            },
        );

        assert_eq!(pipeline.num_used_descriptor_sets(), 2);
        assert_eq!(
            pipeline.stages(),
            ShaderStages::VERTEX | ShaderStages::FRAGMENT
        );
        assert!(pipeline.is_dynamic(DynamicState::Viewport));
        assert_eq!(pipeline.push_constant_requirements().map(|r| r.size), Some(8));
        assert!(pipeline.graphics_state().is_some());
    }

    #[test]
    fn libraries_are_linked() {
        let device = test_device!(DeviceFeatures {
            graphics_pipeline_library: true,
            ..DeviceFeatures::default()
        });
        let set0 = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let set1 = test_set_layout!(device, [(0, DescriptorType::SampledImage, 1)]);
        let pre_raster_layout = test_pipeline_layout!(device, [set0.clone()]);
        let fragment_layout = test_pipeline_layout!(device, [set0, set1]);

        let pre_raster = Pipeline::new(
            device.clone(),
            vk::Pipeline::from_raw(2),
            PipelineCreateInfo {
                flags: PipelineCreateFlags::LIBRARY,
                stages: vec![EntryPointInfo::new(ShaderStage::Vertex)],
                dynamic_state: vec![DynamicState::Viewport],
                ..PipelineCreateInfo::new(PipelineBindPoint::Graphics, pre_raster_layout)
            },
        );
        let fragment = Pipeline::new(
            device.clone(),
            vk::Pipeline::from_raw(3),
            PipelineCreateInfo {
                flags: PipelineCreateFlags::LIBRARY,
                stages: vec![EntryPointInfo::new(ShaderStage::Fragment)],
                dynamic_state: vec![DynamicState::Scissor],
                graphics_state: Some(GraphicsPipelineState {
                    color_attachment_count: 2,
                    ..Default::default()
                }),
                ..PipelineCreateInfo::new(PipelineBindPoint::Graphics, fragment_layout.clone())
            },
        );
        assert!(pre_raster.is_library());
        assert!(pre_raster.graphics_state().is_none());

        let create_info = PipelineCreateInfo::from_libraries(vec![pre_raster, fragment]);
        assert!(create_info.validate(&device).is_ok());
        let linked = Pipeline::new(device, vk::Pipeline::from_raw(4), create_info);

        assert!(!linked.is_library());
        assert_eq!(
            linked.stages(),
            ShaderStages::VERTEX | ShaderStages::FRAGMENT
        );
        assert!(linked.is_dynamic(DynamicState::Viewport));
        assert!(linked.is_dynamic(DynamicState::Scissor));
        assert_eq!(linked.layout().set_layouts().len(), 2);
        assert!(linked.layout().is_compatible_with(&fragment_layout, 1));
        assert_eq!(
            linked.graphics_state().map(|state| state.color_attachment_count),
            Some(2)
        );
    }

    #[test]
    fn invalid_stage_combinations() {
        let device = test_device!(DeviceFeatures {
            tessellation_shader: true,
            ..DeviceFeatures::default()
        });
        let layout = test_pipeline_layout!(device, []);

        let create_info = PipelineCreateInfo {
            stages: vec![
                EntryPointInfo::new(ShaderStage::Vertex),
                EntryPointInfo::new(ShaderStage::TessellationControl),
            ],
            ..PipelineCreateInfo::new(PipelineBindPoint::Graphics, layout.clone())
        };
        assert_eq!(
            create_info.validate(&device).unwrap_err().vuids[0],
            "VUID-VkGraphicsPipelineCreateInfo-pStages-00729"
        );

        let create_info = PipelineCreateInfo {
            stages: vec![EntryPointInfo::new(ShaderStage::Geometry)],
            ..PipelineCreateInfo::new(PipelineBindPoint::Graphics, layout.clone())
        };
        assert!(create_info.validate(&device).is_err());

        let create_info = PipelineCreateInfo {
            stages: vec![EntryPointInfo::new(ShaderStage::Vertex)],
            ..PipelineCreateInfo::new(PipelineBindPoint::Compute, layout)
        };
        assert!(create_info.validate(&device).is_err());
    }
}
