//! Resources that descriptors refer to.
//!
//! Only what the binding-state rules need is tracked: the kind of resource, the image that a view
//! looks at (to find its current layout), and whether it is still alive.

use crate::{
    device::Device,
    macros::vulkan_enum,
    object::{ObjectHandle, ObjectNode, StateObject},
};
use ash::vk;
use std::sync::{Arc, Weak};

vulkan_enum! {
    /// The layout of the memory of an image subresource.
    ImageLayout = ImageLayout(i32);

    Undefined = UNDEFINED,
    General = GENERAL,
    ColorAttachmentOptimal = COLOR_ATTACHMENT_OPTIMAL,
    DepthStencilAttachmentOptimal = DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    DepthStencilReadOnlyOptimal = DEPTH_STENCIL_READ_ONLY_OPTIMAL,
    ShaderReadOnlyOptimal = SHADER_READ_ONLY_OPTIMAL,
    TransferSrcOptimal = TRANSFER_SRC_OPTIMAL,
    TransferDstOptimal = TRANSFER_DST_OPTIMAL,
    Preinitialized = PREINITIALIZED,
    DepthReadOnlyStencilAttachmentOptimal = DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL,
    DepthAttachmentStencilReadOnlyOptimal = DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL,
    DepthAttachmentOptimal = DEPTH_ATTACHMENT_OPTIMAL,
    DepthReadOnlyOptimal = DEPTH_READ_ONLY_OPTIMAL,
    StencilAttachmentOptimal = STENCIL_ATTACHMENT_OPTIMAL,
    StencilReadOnlyOptimal = STENCIL_READ_ONLY_OPTIMAL,
    ReadOnlyOptimal = READ_ONLY_OPTIMAL,
    AttachmentOptimal = ATTACHMENT_OPTIMAL,
    PresentSrc = PRESENT_SRC_KHR,
}

impl ImageLayout {
    /// Returns whether an image in layout `self` may be accessed through a descriptor that
    /// expects `expected`.
    #[inline]
    pub fn matches(self, expected: ImageLayout) -> bool {
        self == expected
            || matches!(
                (expected, self),
                (ImageLayout::ReadOnlyOptimal, ImageLayout::ShaderReadOnlyOptimal)
                    | (ImageLayout::ShaderReadOnlyOptimal, ImageLayout::ReadOnlyOptimal)
                    | (
                        ImageLayout::DepthStencilReadOnlyOptimal,
                        ImageLayout::ReadOnlyOptimal
                    )
            )
    }
}

/// The kind of a [`Resource`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    BufferView,
    Image,
    ImageView { image: vk::Image },
    Sampler,
    AccelerationStructure,
}

/// A resource that can be referred to by descriptors.
#[derive(Debug)]
pub struct Resource {
    handle: ObjectHandle,
    device: Arc<Device>,
    kind: ResourceKind,
    node: ObjectNode,
}

impl Resource {
    /// Creates a new `Resource`.
    pub fn new(device: Arc<Device>, handle: ObjectHandle, kind: ResourceKind) -> Arc<Self> {
        Arc::new(Resource {
            handle,
            device,
            kind,
            node: ObjectNode::new(),
        })
    }

    /// Returns the device that the resource belongs to.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the kind of the resource.
    #[inline]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns the image whose layout applies when accessing this resource, if any.
    #[inline]
    pub fn image(&self) -> Option<vk::Image> {
        match self.kind {
            ResourceKind::Image => self.handle.typed(),
            ResourceKind::ImageView { image } => Some(image),
            _ => None,
        }
    }

    /// Returns whether the resource has been destroyed.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.node.is_destroyed()
    }
}

impl StateObject for Resource {
    #[inline]
    fn handle(&self) -> ObjectHandle {
        self.handle
    }

    #[inline]
    fn node(&self) -> &ObjectNode {
        &self.node
    }
}

/// A non-owning reference from a descriptor to a resource.
#[derive(Clone, Debug)]
pub struct ResourceRef {
    handle: ObjectHandle,
    resource: Weak<Resource>,
}

impl ResourceRef {
    /// Creates a reference to `resource`.
    #[inline]
    pub fn new(resource: &Arc<Resource>) -> Self {
        Self {
            handle: resource.handle,
            resource: Arc::downgrade(resource),
        }
    }

    /// Returns the handle of the referenced resource.
    #[inline]
    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    /// Returns the resource, if it is still alive.
    #[inline]
    pub fn upgrade(&self) -> Option<Arc<Resource>> {
        self.resource
            .upgrade()
            .filter(|resource| !resource.is_destroyed())
    }

    /// Returns whether the resource is still alive.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.upgrade().is_some()
    }
}
