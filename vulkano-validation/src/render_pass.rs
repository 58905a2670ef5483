//! Facts about the render pass instance that is active in a command buffer.
//!
//! Render passes and framebuffers are modelled elsewhere in the layer. Command buffers only need
//! a handful of facts about the active instance to validate action commands, which the layer
//! provides when the render pass begins.

use crate::NonExhaustive;
use ash::vk;

/// The state of an active render pass instance, either a render pass object or dynamic
/// rendering.
#[derive(Clone, Debug)]
pub struct RenderPassState {
    /// The render pass object, or `None` for dynamic rendering.
    ///
    /// The default value is `None`.
    pub render_pass: Option<vk::RenderPass>,

    /// The index of the current subpass.
    ///
    /// The default value is 0.
    pub subpass: u32,

    /// The number of color attachments of the current subpass.
    ///
    /// The default value is 0.
    pub color_attachment_count: u32,

    /// Whether the current subpass has a depth attachment.
    ///
    /// The default value is `false`.
    pub has_depth_attachment: bool,

    /// Whether the current subpass has a stencil attachment.
    ///
    /// The default value is `false`.
    pub has_stencil_attachment: bool,

    /// The view mask of the current subpass, for multiview rendering.
    ///
    /// The default value is 0.
    pub view_mask: u32,

    pub _ne: NonExhaustive,
}

impl Default for RenderPassState {
    #[inline]
    fn default() -> Self {
        Self {
            render_pass: None,
            subpass: 0,
            color_attachment_count: 0,
            has_depth_attachment: false,
            has_stencil_attachment: false,
            view_mask: 0,
            _ne: NonExhaustive(()),
        }
    }
}

impl RenderPassState {
    /// Returns whether the instance was begun with dynamic rendering.
    #[inline]
    pub fn is_dynamic_rendering(&self) -> bool {
        self.render_pass.is_none()
    }

    /// Moves to the next subpass, as with `vkCmdNextSubpass`, with the attachment facts of the new
    /// subpass.
    pub fn next_subpass(
        &mut self,
        color_attachment_count: u32,
        has_depth_attachment: bool,
        has_stencil_attachment: bool,
    ) {
        self.subpass += 1;
        self.color_attachment_count = color_attachment_count;
        self.has_depth_attachment = has_depth_attachment;
        self.has_stencil_attachment = has_stencil_attachment;
    }
}
