//! Command buffer binding-state tracking and draw-time validation for Vulkan validation layers.
//!
//! This crate holds the state a validation layer needs in order to decide, at every draw,
//! dispatch, trace-rays or dispatch-graph command, whether what the application bound is
//! consistent with what the bound pipeline (or bound shader objects) will read.
//!
//! # Overview
//!
//! - Descriptor set layouts, push constant ranges and pipeline layout compatibility records are
//!   *canonicalized*: two structurally equal definitions resolve to the same shared value, so that
//!   compatibility between layouts is a pointer comparison. See
//!   [`DescriptorSetLayout`](descriptor_set::layout::DescriptorSetLayout) and
//!   [`PipelineLayout`](pipeline::layout::PipelineLayout).
//!
//! - A [`CommandBuffer`](command_buffer::CommandBuffer) records, per pipeline bind point, the
//!   currently bound pipeline or shader objects, the bound descriptor sets along with the
//!   compatibility record they were bound with, the pushed constant bytes and the dynamic state
//!   that has been set. Binding new descriptor sets with an incompatible layout *disturbs* the
//!   previously bound sets, following the rules of the Vulkan specification.
//!
//! - [`CommandBuffer::validate_action`](command_buffer::CommandBuffer::validate_action) checks
//!   the recorded state against the requirements of the bound pipeline and returns every
//!   violation found as a [`ValidationError`]. Descriptor contents are only re-examined when the
//!   descriptor set or the recorded image layouts have changed since the last check.
//!
//! - Objects form a graph through weak back-references. Destroying an object that a command
//!   buffer depends on moves the command buffer into an invalid state, rather than leaving it
//!   pointing at freed state. See [`object`].
//!
//! - The [`StateTracker`](tracker::StateTracker) maps raw Vulkan handles to tracked objects and
//!   is the entry point for the layer's dispatch glue.

pub use ash::vk::{DeviceSize, Handle};
use object::ObjectHandle;
use smallvec::SmallVec;
use std::{
    borrow::Cow,
    error::Error,
    fmt::{Debug, Display, Error as FmtError, Formatter},
};

#[macro_use]
mod tests;
mod macros;
pub mod command_buffer;
pub mod descriptor_set;
pub mod device;
mod dictionary;
pub mod dynamic_state;
pub mod object;
pub mod pipeline;
pub mod render_pass;
pub mod resource;
pub mod shader;
pub mod tracker;

pub use self::dictionary::{Canonical, Dictionary};

/// A helper type for non-exhaustive structs.
///
/// This type cannot be constructed outside this crate. Structures with a field of this type can
/// only be constructed by calling a constructor function or `Default::default()`. The effect is
/// similar to the standard Rust `#[non_exhaustive]` attribute, except that it does not prevent
/// update syntax from being used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NonExhaustive(pub(crate) ());

/// The class of rule that a [`ValidationError`] reports a violation of.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// What is bound does not match what the pipeline or shader objects expect, for example an
    /// incompatible descriptor set layout or push constant layout.
    Compatibility,

    /// Something that is required was never provided: a descriptor set that was never bound, a
    /// dynamic state that was never set, or push constant bytes that were never pushed.
    Completeness,

    /// An object that is referenced has been destroyed.
    Liveness,

    /// Any other misuse of the API.
    #[default]
    Usage,
}

/// A violation of one of the rules that the layer checks.
///
/// The layer never stops recording because of a violation. Every violation found by a check is
/// returned so that it can be reported to the application.
#[derive(Clone, Default)]
pub struct ValidationError {
    /// The context in which the problem exists, for example the command or the parameter.
    pub context: Cow<'static, str>,

    /// A description of what the problem is.
    pub problem: Cow<'static, str>,

    /// Identifiers of the Valid Usage rules that were violated.
    pub vuids: &'static [&'static str],

    /// The class of rule that was violated.
    pub kind: ViolationKind,

    /// The objects involved in the problem, most relevant first.
    pub objects: SmallVec<[ObjectHandle; 2]>,
}

impl ValidationError {
    fn prepend_context(mut self, context: &str) -> Self {
        if self.context.is_empty() {
            self.context = context.to_owned().into();
        } else {
            self.context = format!("{}.{}", context, self.context).into();
        }

        self
    }

    /// Prepends `context` to the context of `self`, separated by a period.
    pub fn add_context(self: Box<Self>, context: impl Into<Cow<'static, str>>) -> Box<Self> {
        Box::new(self.prepend_context(&context.into()))
    }

    /// Replaces the VUIDs of `self`.
    pub fn set_vuids(self: Box<Self>, vuids: &'static [&'static str]) -> Box<Self> {
        Box::new(Self { vuids, ..*self })
    }

    /// Adds an object to the list of objects involved in the problem.
    pub fn with_object(mut self: Box<Self>, object: ObjectHandle) -> Box<Self> {
        if !self.objects.contains(&object) {
            self.objects.push(object);
        }

        self
    }
}

impl Debug for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        if self.context.is_empty() {
            write!(f, "{}", self.problem)?;
        } else {
            write!(f, "{}: {}", self.context, self.problem)?;
        }

        if !self.objects.is_empty() {
            write!(f, "\n\nObjects:")?;

            for object in &self.objects {
                write!(f, "\n    {}", object)?;
            }
        }

        if !self.vuids.is_empty() {
            write!(f, "\n\nVulkan VUIDs:")?;

            for vuid in self.vuids {
                write!(f, "\n    {}", vuid)?;
            }
        }

        Ok(())
    }
}

impl Display for ValidationError {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        Debug::fmt(self, f)
    }
}

impl Error for ValidationError {}

#[cfg(test)]
mod error_tests {
    use super::{ValidationError, ViolationKind};
    use crate::object::ObjectHandle;
    use ash::vk::{self, Handle};

    #[test]
    fn context_is_prepended() {
        let error = Box::new(ValidationError {
            context: "dynamic_offsets[1]".into(),
            problem: "is not a multiple of the alignment".into(),
            ..Default::default()
        })
        .add_context("bind_descriptor_sets");

        assert_eq!(error.context, "bind_descriptor_sets.dynamic_offsets[1]");
        assert_eq!(error.kind, ViolationKind::Usage);
    }

    #[test]
    fn objects_are_deduplicated() {
        let set = ObjectHandle::new(vk::DescriptorSet::from_raw(7));
        let error = Box::new(ValidationError {
            problem: "destroyed".into(),
            vuids: &["VUID-vkCmdDraw-None-08114"],
            ..Default::default()
        })
        .with_object(set)
        .with_object(set);

        assert_eq!(error.objects.len(), 1);
        assert!(error.to_string().contains("VUID-vkCmdDraw-None-08114"));
    }
}
