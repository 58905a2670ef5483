//! Tracking of the state that a command buffer sets dynamically.
//!
//! Every piece of pipeline state that can be provided by a command instead of being baked into
//! the pipeline is a [`DynamicState`]. A command buffer records which of these states have been
//! set in a [`DynamicStateStatus`], with three bitsets:
//!
//! - *cb*: states that have been set and are still valid. Binding a pipeline clears the states
//!   that it declares static, and the states that the previously bound pipeline declared static.
//! - *pipeline*: states that have been set since the current pipeline was bound.
//! - *history*: states that have ever been set in the command buffer. This is only used to
//!   explain why a state that is missing at draw time was lost.

use crate::{command_buffer::VUIDType, macros::vuids, object::ObjectHandle};
use ash::vk;
use std::fmt::{Debug, Error as FmtError, Formatter};
use tracing::trace;

macro_rules! dynamic_states {
    {
        $(
            $(#[doc = $doc:literal])*
            $name:ident = $ffi:ident, $category:ident, $command:literal, $missing_vuid:literal;
        )+
    } => {
        /// A particular state value within a pipeline that can be dynamically set by a command
        /// buffer.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum DynamicState {
            $(
                $(#[doc = $doc])*
                $name,
            )+
        }

        impl DynamicState {
            /// Every dynamic state, in index order.
            pub const ALL: &'static [DynamicState] = &[$(DynamicState::$name,)+];

            /// The number of dynamic states.
            pub const COUNT: usize = Self::ALL.len();

            /// Returns the category of commands that the state applies to.
            #[inline]
            pub const fn category(self) -> DynamicStateCategory {
                match self {
                    $(DynamicState::$name => DynamicStateCategory::$category,)+
                }
            }

            /// Returns the name of the command that sets the state.
            #[inline]
            pub const fn set_command(self) -> &'static str {
                match self {
                    $(DynamicState::$name => $command,)+
                }
            }

            /// Returns the VUIDs that are violated when the state is set outside of recording.
            pub(crate) const fn recording_vuids(self) -> &'static [&'static str] {
                match self {
                    $(
                        DynamicState::$name => {
                            &[concat!("VUID-", $command, "-commandBuffer-recording")]
                        }
                    )+
                }
            }

            /// Returns the VUIDs that are violated when the state is required by an action
            /// command but was not set.
            pub(crate) fn missing_vuids(self, vuid_type: VUIDType) -> &'static [&'static str] {
                match self {
                    $(DynamicState::$name => vuids!(vuid_type, $missing_vuid),)+
                }
            }
        }

        impl From<DynamicState> for vk::DynamicState {
            #[inline]
            fn from(val: DynamicState) -> Self {
                match val {
                    $(DynamicState::$name => vk::DynamicState::$ffi,)+
                }
            }
        }

        impl TryFrom<vk::DynamicState> for DynamicState {
            type Error = ();

            #[inline]
            fn try_from(val: vk::DynamicState) -> Result<Self, Self::Error> {
                Ok(match val {
                    $(vk::DynamicState::$ffi => DynamicState::$name,)+
                    _ => return Err(()),
                })
            }
        }
    };
}

dynamic_states! {
    Viewport = VIEWPORT, Graphics,
        "vkCmdSetViewport", "None-07831";
    Scissor = SCISSOR, Graphics,
        "vkCmdSetScissor", "None-07832";
    LineWidth = LINE_WIDTH, Graphics,
        "vkCmdSetLineWidth", "None-07833";
    DepthBias = DEPTH_BIAS, Graphics,
        "vkCmdSetDepthBias", "None-07834";
    BlendConstants = BLEND_CONSTANTS, Graphics,
        "vkCmdSetBlendConstants", "None-07835";
    DepthBounds = DEPTH_BOUNDS, Graphics,
        "vkCmdSetDepthBounds", "None-07836";
    StencilCompareMask = STENCIL_COMPARE_MASK, Graphics,
        "vkCmdSetStencilCompareMask", "None-07837";
    StencilWriteMask = STENCIL_WRITE_MASK, Graphics,
        "vkCmdSetStencilWriteMask", "None-07838";
    StencilReference = STENCIL_REFERENCE, Graphics,
        "vkCmdSetStencilReference", "None-07839";
    CullMode = CULL_MODE, Graphics,
        "vkCmdSetCullMode", "None-07840";
    FrontFace = FRONT_FACE, Graphics,
        "vkCmdSetFrontFace", "None-07841";
    PrimitiveTopology = PRIMITIVE_TOPOLOGY, Graphics,
        "vkCmdSetPrimitiveTopology", "None-07842";
    /// The number of viewports is taken from the set command.
    ViewportWithCount = VIEWPORT_WITH_COUNT, Graphics,
        "vkCmdSetViewportWithCount", "viewportCount-03417";
    /// The number of scissors is taken from the set command.
    ScissorWithCount = SCISSOR_WITH_COUNT, Graphics,
        "vkCmdSetScissorWithCount", "scissorCount-03418";
    VertexInputBindingStride = VERTEX_INPUT_BINDING_STRIDE, Graphics,
        "vkCmdBindVertexBuffers2", "pStrides-04884";
    DepthTestEnable = DEPTH_TEST_ENABLE, Graphics,
        "vkCmdSetDepthTestEnable", "None-07843";
    DepthWriteEnable = DEPTH_WRITE_ENABLE, Graphics,
        "vkCmdSetDepthWriteEnable", "None-07844";
    DepthCompareOp = DEPTH_COMPARE_OP, Graphics,
        "vkCmdSetDepthCompareOp", "None-07845";
    DepthBoundsTestEnable = DEPTH_BOUNDS_TEST_ENABLE, Graphics,
        "vkCmdSetDepthBoundsTestEnable", "None-07846";
    StencilTestEnable = STENCIL_TEST_ENABLE, Graphics,
        "vkCmdSetStencilTestEnable", "None-07847";
    StencilOp = STENCIL_OP, Graphics,
        "vkCmdSetStencilOp", "None-07848";
    RasterizerDiscardEnable = RASTERIZER_DISCARD_ENABLE, Graphics,
        "vkCmdSetRasterizerDiscardEnable", "None-04876";
    DepthBiasEnable = DEPTH_BIAS_ENABLE, Graphics,
        "vkCmdSetDepthBiasEnable", "None-04877";
    PrimitiveRestartEnable = PRIMITIVE_RESTART_ENABLE, Graphics,
        "vkCmdSetPrimitiveRestartEnable", "None-04879";
    DiscardRectangle = DISCARD_RECTANGLE_EXT, Graphics,
        "vkCmdSetDiscardRectangleEXT", "None-07751";
    DiscardRectangleEnable = DISCARD_RECTANGLE_ENABLE_EXT, Graphics,
        "vkCmdSetDiscardRectangleEnableEXT", "None-08648";
    SampleLocations = SAMPLE_LOCATIONS_EXT, Graphics,
        "vkCmdSetSampleLocationsEXT", "None-06666";
    FragmentShadingRate = FRAGMENT_SHADING_RATE_KHR, Graphics,
        "vkCmdSetFragmentShadingRateKHR", "None-09238";
    LineStipple = LINE_STIPPLE_EXT, Graphics,
        "vkCmdSetLineStippleEXT", "None-07849";
    VertexInput = VERTEX_INPUT_EXT, Graphics,
        "vkCmdSetVertexInputEXT", "None-04914";
    PatchControlPoints = PATCH_CONTROL_POINTS_EXT, Graphics,
        "vkCmdSetPatchControlPointsEXT", "None-04875";
    LogicOp = LOGIC_OP_EXT, Graphics,
        "vkCmdSetLogicOpEXT", "logicOp-04878";
    /// The number of enable values is taken from the set command, and must cover every color
    /// attachment.
    ColorWriteEnable = COLOR_WRITE_ENABLE_EXT, Graphics,
        "vkCmdSetColorWriteEnableEXT", "None-07749";
    TessellationDomainOrigin = TESSELLATION_DOMAIN_ORIGIN_EXT, Graphics,
        "vkCmdSetTessellationDomainOriginEXT", "None-07619";
    DepthClampEnable = DEPTH_CLAMP_ENABLE_EXT, Graphics,
        "vkCmdSetDepthClampEnableEXT", "None-07620";
    PolygonMode = POLYGON_MODE_EXT, Graphics,
        "vkCmdSetPolygonModeEXT", "None-07621";
    RasterizationSamples = RASTERIZATION_SAMPLES_EXT, Graphics,
        "vkCmdSetRasterizationSamplesEXT", "None-07622";
    SampleMask = SAMPLE_MASK_EXT, Graphics,
        "vkCmdSetSampleMaskEXT", "None-07623";
    AlphaToCoverageEnable = ALPHA_TO_COVERAGE_ENABLE_EXT, Graphics,
        "vkCmdSetAlphaToCoverageEnableEXT", "None-07624";
    LogicOpEnable = LOGIC_OP_ENABLE_EXT, Graphics,
        "vkCmdSetLogicOpEnableEXT", "None-07626";
    ColorBlendEnable = COLOR_BLEND_ENABLE_EXT, Graphics,
        "vkCmdSetColorBlendEnableEXT", "None-07627";
    ColorBlendEquation = COLOR_BLEND_EQUATION_EXT, Graphics,
        "vkCmdSetColorBlendEquationEXT", "None-07628";
    ColorWriteMask = COLOR_WRITE_MASK_EXT, Graphics,
        "vkCmdSetColorWriteMaskEXT", "None-07629";
    RayTracingPipelineStackSize = RAY_TRACING_PIPELINE_STACK_SIZE_KHR, RayTracing,
        "vkCmdSetRayTracingPipelineStackSizeKHR", "None-09458";
}

/// The kind of pipeline that a dynamic state belongs to. Binding a pipeline only affects the
/// dynamic states of its own category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DynamicStateCategory {
    Graphics,
    RayTracing,
}

impl DynamicState {
    /// Returns the index of the state in a [`DynamicStates`] bitset.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns whether the state applies to graphics pipelines.
    #[inline]
    pub const fn is_graphics(self) -> bool {
        matches!(self.category(), DynamicStateCategory::Graphics)
    }
}

const WORDS: usize = DynamicState::COUNT.div_ceil(64);

/// A fixed-width set of [`DynamicState`] values.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DynamicStates([u64; WORDS]);

impl DynamicStates {
    /// Returns an empty set.
    #[inline]
    pub const fn empty() -> Self {
        Self([0; WORDS])
    }

    /// Returns a set containing every state.
    pub fn all() -> Self {
        DynamicState::ALL.iter().copied().collect()
    }

    /// Returns a set containing every state of the given category.
    pub fn category(category: DynamicStateCategory) -> Self {
        DynamicState::ALL
            .iter()
            .copied()
            .filter(|state| state.category() == category)
            .collect()
    }

    /// Returns the states that must have been set before drawing with shader objects, whatever
    /// stages are bound.
    pub fn shader_object_required() -> Self {
        [
            DynamicState::ViewportWithCount,
            DynamicState::ScissorWithCount,
            DynamicState::RasterizerDiscardEnable,
            DynamicState::PrimitiveTopology,
            DynamicState::PrimitiveRestartEnable,
            DynamicState::CullMode,
            DynamicState::FrontFace,
            DynamicState::DepthTestEnable,
            DynamicState::DepthWriteEnable,
            DynamicState::DepthBiasEnable,
            DynamicState::StencilTestEnable,
            DynamicState::PolygonMode,
            DynamicState::RasterizationSamples,
            DynamicState::SampleMask,
            DynamicState::AlphaToCoverageEnable,
        ]
        .into_iter()
        .collect()
    }

    #[inline]
    pub fn contains(self, state: DynamicState) -> bool {
        let index = state.index();
        self.0[index / 64] & (1 << (index % 64)) != 0
    }

    #[inline]
    pub fn insert(&mut self, state: DynamicState) {
        let index = state.index();
        self.0[index / 64] |= 1 << (index % 64);
    }

    #[inline]
    pub fn remove(&mut self, state: DynamicState) {
        let index = state.index();
        self.0[index / 64] &= !(1 << (index % 64));
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0.iter().all(|&word| word == 0)
    }

    #[inline]
    pub fn len(self) -> usize {
        self.0.iter().map(|word| word.count_ones() as usize).sum()
    }

    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self(std::array::from_fn(|i| self.0[i] | other.0[i]))
    }

    #[inline]
    pub fn intersection(self, other: Self) -> Self {
        Self(std::array::from_fn(|i| self.0[i] & other.0[i]))
    }

    #[inline]
    pub fn difference(self, other: Self) -> Self {
        Self(std::array::from_fn(|i| self.0[i] & !other.0[i]))
    }

    /// Iterates over the states in the set, in index order.
    pub fn iter(self) -> impl Iterator<Item = DynamicState> {
        DynamicState::ALL
            .iter()
            .copied()
            .filter(move |&state| self.contains(state))
    }
}

impl FromIterator<DynamicState> for DynamicStates {
    fn from_iter<T: IntoIterator<Item = DynamicState>>(iter: T) -> Self {
        let mut states = Self::empty();

        for state in iter {
            states.insert(state);
        }

        states
    }
}

impl Debug for DynamicStates {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// The part of a dynamic state's value that draw-time validation looks at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DynamicStateValue {
    /// The value is not inspected.
    #[default]
    Other,

    /// A range of array elements, as set by `ViewportWithCount`, `ScissorWithCount` or
    /// `ColorWriteEnable`.
    Count { first: u32, count: u32 },

    /// A single boolean, as set by the `*Enable` states.
    Enable(bool),
}

/// The dynamic state that has been set in a command buffer.
#[derive(Clone)]
pub struct DynamicStateStatus {
    cb: DynamicStates,
    pipeline: DynamicStates,
    history: DynamicStates,
    static_states: DynamicStates,
    dirty_static_state: DynamicStates,
    invalidated_by: [Option<ObjectHandle>; DynamicState::COUNT],
    values: [DynamicStateValue; DynamicState::COUNT],
}

impl Default for DynamicStateStatus {
    fn default() -> Self {
        Self {
            cb: DynamicStates::empty(),
            pipeline: DynamicStates::empty(),
            history: DynamicStates::empty(),
            static_states: DynamicStates::empty(),
            dirty_static_state: DynamicStates::empty(),
            invalidated_by: [None; DynamicState::COUNT],
            values: [DynamicStateValue::Other; DynamicState::COUNT],
        }
    }
}

impl DynamicStateStatus {
    /// Records that `state` was set by a command.
    ///
    /// If the currently bound pipeline declares the state static, the command has no effect on
    /// drawing, which is remembered and reported at the next action command.
    pub fn record_set(&mut self, state: DynamicState, value: DynamicStateValue) {
        self.cb.insert(state);
        self.pipeline.insert(state);
        self.history.insert(state);
        self.values[state.index()] = value;

        if self.static_states.contains(state) {
            self.dirty_static_state.insert(state);
        }

        trace!(?state, ?value, "dynamic state set");
    }

    /// Records that a pipeline of the given category was bound, which declares `dynamic_states`
    /// dynamic and every other state of the category static.
    pub fn record_bind_pipeline(
        &mut self,
        pipeline: ObjectHandle,
        category: DynamicStateCategory,
        dynamic_states: DynamicStates,
    ) {
        let category_states = DynamicStates::category(category);
        let dynamic_states = dynamic_states.intersection(category_states);
        let previously_dynamic = category_states.difference(self.static_states);

        // A state set for the previous pipeline survives only if both pipelines declare it
        // dynamic.
        let retained = dynamic_states.intersection(previously_dynamic);
        let lost = self
            .cb
            .intersection(category_states)
            .difference(retained);

        for state in lost.iter() {
            self.invalidated_by[state.index()] = Some(pipeline);
        }

        self.cb = self.cb.difference(lost);
        self.pipeline = self.pipeline.difference(category_states);
        self.dirty_static_state = self.dirty_static_state.difference(category_states);
        self.static_states = self
            .static_states
            .difference(category_states)
            .union(category_states.difference(dynamic_states));
    }

    /// Records that graphics shader objects were bound, which makes every graphics state
    /// dynamic.
    pub fn record_bind_shaders(&mut self) {
        let category_states = DynamicStates::category(DynamicStateCategory::Graphics);

        self.static_states = self.static_states.difference(category_states);
        self.dirty_static_state = self.dirty_static_state.difference(category_states);
    }

    /// Returns whether `state` is dynamic for the currently bound pipeline. With no pipeline
    /// bound, every state is dynamic.
    #[inline]
    pub fn is_dynamic(&self, state: DynamicState) -> bool {
        !self.static_states.contains(state)
    }

    /// Returns whether `state` has been set and is still valid.
    #[inline]
    pub fn is_set(&self, state: DynamicState) -> bool {
        self.cb.contains(state)
    }

    /// Returns the states that have been set and are still valid.
    #[inline]
    pub fn set_states(&self) -> DynamicStates {
        self.cb
    }

    /// Returns the states that have been set since the current pipeline was bound.
    #[inline]
    pub fn set_since_bind(&self) -> DynamicStates {
        self.pipeline
    }

    /// Returns whether `state` was set at any point in the command buffer.
    #[inline]
    pub fn was_ever_set(&self, state: DynamicState) -> bool {
        self.history.contains(state)
    }

    /// Returns the pipeline whose binding last made a previously set `state` invalid.
    #[inline]
    pub fn invalidated_by(&self, state: DynamicState) -> Option<ObjectHandle> {
        self.invalidated_by[state.index()]
    }

    /// Returns the value that `state` was last set to.
    #[inline]
    pub fn value(&self, state: DynamicState) -> DynamicStateValue {
        self.values[state.index()]
    }

    /// Returns the states in `required` that have not been set.
    #[inline]
    pub fn missing(&self, required: DynamicStates) -> DynamicStates {
        required.difference(self.cb)
    }

    /// Returns the states that were set although the bound pipeline declares them static.
    #[inline]
    pub fn dirty_static_state(&self) -> DynamicStates {
        self.dirty_static_state
    }

    /// Returns to the state of a newly begun command buffer.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Debug for DynamicStateStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_struct("DynamicStateStatus")
            .field("cb", &self.cb)
            .field("pipeline", &self.pipeline)
            .field("history", &self.history)
            .field("static_states", &self.static_states)
            .field("dirty_static_state", &self.dirty_static_state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DynamicState, DynamicStateCategory, DynamicStateStatus, DynamicStateValue, DynamicStates,
    };
    use crate::object::ObjectHandle;
    use ash::vk::{self, Handle};

    fn pipeline(raw: u64) -> ObjectHandle {
        ObjectHandle::new(vk::Pipeline::from_raw(raw))
    }

    fn states(list: &[DynamicState]) -> DynamicStates {
        list.iter().copied().collect()
    }

    #[test]
    fn bitset_operations() {
        let a = states(&[DynamicState::Viewport, DynamicState::ColorWriteMask]);
        let b = states(&[DynamicState::Viewport, DynamicState::Scissor]);

        assert_eq!(a.len(), 2);
        assert!(a.contains(DynamicState::ColorWriteMask));
        assert_eq!(a.intersection(b), states(&[DynamicState::Viewport]));
        assert_eq!(a.difference(b), states(&[DynamicState::ColorWriteMask]));
        assert_eq!(a.union(b).len(), 3);
        assert_eq!(DynamicStates::all().len(), DynamicState::COUNT);
        assert!(!DynamicStates::category(DynamicStateCategory::Graphics)
            .contains(DynamicState::RayTracingPipelineStackSize));
    }

    #[test]
    fn ffi_conversion() {
        for &state in DynamicState::ALL {
            assert_eq!(DynamicState::try_from(vk::DynamicState::from(state)), Ok(state));
        }

        assert!(DynamicState::try_from(vk::DynamicState::from_raw(i32::MAX)).is_err());
    }

    #[test]
    fn set_commands() {
        assert_eq!(DynamicState::Scissor.set_command(), "vkCmdSetScissor");
        assert_eq!(
            DynamicState::LineWidth.recording_vuids(),
            ["VUID-vkCmdSetLineWidth-commandBuffer-recording"]
        );
        assert_eq!(
            DynamicState::VertexInputBindingStride.recording_vuids(),
            ["VUID-vkCmdBindVertexBuffers2-commandBuffer-recording"]
        );

        for &state in DynamicState::ALL {
            assert!(state.recording_vuids()[0].contains(state.set_command()));
        }
    }

    #[test]
    fn static_pipeline_clears_state() {
        let mut status = DynamicStateStatus::default();
        let dynamic = states(&[DynamicState::Viewport, DynamicState::LineWidth]);

        status.record_bind_pipeline(pipeline(1), DynamicStateCategory::Graphics, dynamic);
        status.record_set(DynamicState::Viewport, DynamicStateValue::Other);
        status.record_set(DynamicState::LineWidth, DynamicStateValue::Other);
        assert!(status.missing(dynamic).is_empty());

        // Viewport is static in the second pipeline, line width stays dynamic.
        status.record_bind_pipeline(
            pipeline(2),
            DynamicStateCategory::Graphics,
            states(&[DynamicState::LineWidth]),
        );
        assert!(!status.is_dynamic(DynamicState::Viewport));
        assert!(!status.is_set(DynamicState::Viewport));
        assert!(status.is_set(DynamicState::LineWidth));
        assert_eq!(
            status.invalidated_by(DynamicState::Viewport),
            Some(pipeline(2))
        );

        // Binding the first pipeline again does not bring back the viewport.
        status.record_bind_pipeline(pipeline(1), DynamicStateCategory::Graphics, dynamic);
        assert_eq!(
            status.missing(dynamic),
            states(&[DynamicState::Viewport])
        );
        assert!(status.was_ever_set(DynamicState::Viewport));
        assert!(status.set_since_bind().is_empty());
    }

    #[test]
    fn state_set_before_first_bind_is_kept() {
        let mut status = DynamicStateStatus::default();
        status.record_set(DynamicState::Scissor, DynamicStateValue::Other);

        status.record_bind_pipeline(
            pipeline(1),
            DynamicStateCategory::Graphics,
            states(&[DynamicState::Scissor]),
        );

        assert!(status.is_set(DynamicState::Scissor));
        assert!(status.dirty_static_state().is_empty());
    }

    #[test]
    fn setting_static_state_is_dirty() {
        let mut status = DynamicStateStatus::default();
        status.record_bind_pipeline(
            pipeline(1),
            DynamicStateCategory::Graphics,
            DynamicStates::empty(),
        );

        status.record_set(DynamicState::CullMode, DynamicStateValue::Other);
        assert_eq!(
            status.dirty_static_state(),
            states(&[DynamicState::CullMode])
        );

        status.record_bind_shaders();
        assert!(status.dirty_static_state().is_empty());
        assert!(status.is_dynamic(DynamicState::CullMode));
    }

    #[test]
    fn categories_are_independent() {
        let mut status = DynamicStateStatus::default();
        status.record_set(DynamicState::Viewport, DynamicStateValue::Other);
        status.record_set(
            DynamicState::RayTracingPipelineStackSize,
            DynamicStateValue::Other,
        );

        status.record_bind_pipeline(
            pipeline(1),
            DynamicStateCategory::RayTracing,
            DynamicStates::empty(),
        );

        assert!(status.is_set(DynamicState::Viewport));
        assert!(!status.is_set(DynamicState::RayTracingPipelineStackSize));
    }

    #[test]
    fn values_are_recorded() {
        let mut status = DynamicStateStatus::default();
        status.record_set(
            DynamicState::ColorWriteEnable,
            DynamicStateValue::Count { first: 0, count: 2 },
        );

        assert_eq!(
            status.value(DynamicState::ColorWriteEnable),
            DynamicStateValue::Count { first: 0, count: 2 }
        );

        status.reset();
        assert!(!status.was_ever_set(DynamicState::ColorWriteEnable));
    }
}
