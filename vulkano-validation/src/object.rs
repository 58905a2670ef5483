//! The object graph that links tracked objects to the objects that depend on them.
//!
//! Every tracked object owns an [`ObjectNode`], which holds *weak* references to its parents: the
//! objects that depend on it. A descriptor set is a parent of the resources written into it, and
//! a command buffer is a parent of every pipeline, shader object, descriptor set and resource it
//! references. Holding only weak references upwards means that the graph never keeps an object
//! alive after the application destroyed it.
//!
//! When an object is destroyed, [`ObjectNode::destroy`] notifies each parent through
//! [`StateObject::notify_invalid`], passing the chain of objects from the destroyed one up to the
//! direct child of the parent. Parents update their own state (a command buffer becomes invalid)
//! and forward the notification to their own parents.

use crate::{
    command_buffer::CommandBuffer,
    descriptor_set::{layout::DescriptorSetLayout, pool::DescriptorPool, DescriptorSet},
    pipeline::{layout::PipelineLayout, Pipeline},
    resource::Resource,
    shader::ShaderObject,
};
use ash::vk::{self, Handle};
use foldhash::HashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::{
    fmt::{Debug, Display, Error as FmtError, Formatter},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};
use tracing::debug;

/// The type-tagged raw handle of a tracked object.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    object_type: vk::ObjectType,
    raw: u64,
}

impl ObjectHandle {
    /// Creates an `ObjectHandle` from a typed Vulkan handle.
    #[inline]
    pub fn new<H: Handle>(handle: H) -> Self {
        Self {
            object_type: H::TYPE,
            raw: handle.as_raw(),
        }
    }

    /// Creates an `ObjectHandle` from its parts.
    #[inline]
    pub const fn from_raw(object_type: vk::ObjectType, raw: u64) -> Self {
        Self { object_type, raw }
    }

    /// Returns the type of the object.
    #[inline]
    pub fn object_type(&self) -> vk::ObjectType {
        self.object_type
    }

    /// Returns the raw handle value.
    #[inline]
    pub fn raw(&self) -> u64 {
        self.raw
    }

    /// Returns whether this is a null handle.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.raw == 0
    }

    /// Converts back into a typed handle, if the type matches.
    #[inline]
    pub fn typed<H: Handle>(&self) -> Option<H> {
        (self.object_type == H::TYPE).then(|| H::from_raw(self.raw))
    }
}

impl Debug for ObjectHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        Display::fmt(self, f)
    }
}

impl Display for ObjectHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        let name = match self.object_type {
            vk::ObjectType::BUFFER => "VkBuffer",
            vk::ObjectType::BUFFER_VIEW => "VkBufferView",
            vk::ObjectType::IMAGE => "VkImage",
            vk::ObjectType::IMAGE_VIEW => "VkImageView",
            vk::ObjectType::SAMPLER => "VkSampler",
            vk::ObjectType::ACCELERATION_STRUCTURE_KHR => "VkAccelerationStructureKHR",
            vk::ObjectType::DESCRIPTOR_SET_LAYOUT => "VkDescriptorSetLayout",
            vk::ObjectType::DESCRIPTOR_POOL => "VkDescriptorPool",
            vk::ObjectType::DESCRIPTOR_SET => "VkDescriptorSet",
            vk::ObjectType::PIPELINE_LAYOUT => "VkPipelineLayout",
            vk::ObjectType::PIPELINE => "VkPipeline",
            vk::ObjectType::SHADER_EXT => "VkShaderEXT",
            vk::ObjectType::COMMAND_BUFFER => "VkCommandBuffer",
            vk::ObjectType::DEVICE => "VkDevice",
            vk::ObjectType::UNKNOWN => "push descriptor set",
            _ => "VkObject",
        };

        write!(f, "{} {:#x}", name, self.raw)
    }
}

/// A tracked object that takes part in the object graph.
pub trait StateObject: Send + Sync {
    /// Returns the handle of the object.
    fn handle(&self) -> ObjectHandle;

    /// Returns the graph node of the object.
    fn node(&self) -> &ObjectNode;

    /// Called when a child of this object, or a descendant of a child, has been destroyed or
    /// otherwise invalidated.
    ///
    /// `chain` starts with the object that was invalidated and ends with the direct child of
    /// `self`. If `unlink` is true, the first object of the chain is going away and references
    /// to it must be dropped.
    ///
    /// The default implementation forwards the notification to the parents of `self`.
    fn notify_invalid(&self, chain: &[ObjectHandle], unlink: bool) {
        self.node().notify_parents(self.handle(), chain, unlink);
    }
}

/// The graph bookkeeping of a tracked object: weak references to its parents, and whether it has
/// been destroyed.
#[derive(Default)]
pub struct ObjectNode {
    parents: Mutex<HashMap<ObjectHandle, Weak<dyn StateObject>>>,
    destroyed: AtomicBool,
}

impl ObjectNode {
    /// Creates a new `ObjectNode` with no parents.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `parent` as depending on this object.
    ///
    /// Returns `false`, without registering, if this object has already been destroyed.
    pub fn add_parent(&self, handle: ObjectHandle, parent: Weak<dyn StateObject>) -> bool {
        if self.is_destroyed() {
            return false;
        }

        self.parents.lock().insert(handle, parent);

        true
    }

    /// Removes `parent` from the objects depending on this object.
    pub fn remove_parent(&self, parent: ObjectHandle) {
        self.parents.lock().remove(&parent);
    }

    /// Returns whether `parent` is registered as depending on this object.
    pub fn has_parent(&self, parent: ObjectHandle) -> bool {
        self.parents.lock().contains_key(&parent)
    }

    /// Returns the parents that are still alive. Parents that have gone away are pruned.
    pub fn parents(&self) -> SmallVec<[Arc<dyn StateObject>; 4]> {
        let mut parents = self.parents.lock();
        let mut alive = SmallVec::new();

        parents.retain(|_, parent| match parent.upgrade() {
            Some(parent) => {
                alive.push(parent);
                true
            }
            None => false,
        });

        alive
    }

    /// Returns whether the object has been destroyed.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Marks the object as destroyed and notifies every parent that it is going away. The parent
    /// list is emptied.
    pub fn destroy(&self, this: ObjectHandle) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!(object = %this, "object destroyed");
        self.invalidate(this, true);
    }

    /// Notifies every parent that the object has been invalidated, without destroying it.
    pub fn invalidate(&self, this: ObjectHandle, unlink: bool) {
        self.notify_parents(this, &[], unlink);

        if unlink {
            self.parents.lock().clear();
        }
    }

    /// Forwards a notification about `chain` to the parents, appending `this` to the chain.
    ///
    /// The parent lock is not held while the parents run, so parents may freely call back into
    /// this node.
    pub fn notify_parents(&self, this: ObjectHandle, chain: &[ObjectHandle], unlink: bool) {
        let parents = self.parents();

        if parents.is_empty() {
            return;
        }

        let mut chain: SmallVec<[ObjectHandle; 4]> = chain.iter().copied().collect();
        chain.push(this);

        for parent in parents {
            parent.notify_invalid(&chain, unlink);
        }
    }
}

impl Debug for ObjectNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_struct("ObjectNode")
            .field("parents", &self.parents.lock().keys().collect::<Vec<_>>())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// The children that a parent object holds links to, with a reference count per child.
///
/// A child is registered with the parent's handle on first insertion and unregistered when its
/// count drops back to zero.
#[derive(Default)]
pub struct ChildLinks {
    children: HashMap<ObjectHandle, (Weak<dyn StateObject>, usize)>,
}

impl ChildLinks {
    /// Adds a reference from `parent` to `child`.
    pub fn add(
        &mut self,
        parent: ObjectHandle,
        parent_ref: &Weak<dyn StateObject>,
        child: &Arc<dyn StateObject>,
    ) {
        let handle = child.handle();
        let entry = self
            .children
            .entry(handle)
            .or_insert_with(|| (Arc::downgrade(child), 0));

        if entry.1 == 0 {
            child.node().add_parent(parent, parent_ref.clone());
        }

        entry.1 += 1;
    }

    /// Removes one reference from `parent` to `child`.
    pub fn remove(&mut self, parent: ObjectHandle, child: ObjectHandle) {
        let Some(entry) = self.children.get_mut(&child) else {
            return;
        };

        entry.1 -= 1;

        if entry.1 == 0 {
            if let Some(child) = entry.0.upgrade() {
                child.node().remove_parent(parent);
            }

            self.children.remove(&child);
        }
    }

    /// Drops every reference to `child` without touching the child, which is going away.
    pub fn forget(&mut self, child: ObjectHandle) {
        self.children.remove(&child);
    }

    /// Removes every reference held by `parent`.
    pub fn clear(&mut self, parent: ObjectHandle) {
        for (_, (child, _)) in self.children.drain() {
            if let Some(child) = child.upgrade() {
                child.node().remove_parent(parent);
            }
        }
    }

    /// Returns whether `child` is referenced.
    pub fn contains(&self, child: ObjectHandle) -> bool {
        self.children.contains_key(&child)
    }

    /// Returns the number of distinct children.
    pub fn len(&self) -> usize {
        self.children.len()
    }
}

impl Debug for ChildLinks {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_set().entries(self.children.keys()).finish()
    }
}

/// Any tracked object, as stored in a registry keyed by handle.
#[derive(Clone, Debug)]
pub enum TrackedObject {
    Resource(Arc<Resource>),
    DescriptorSetLayout(Arc<DescriptorSetLayout>),
    DescriptorPool(Arc<DescriptorPool>),
    DescriptorSet(Arc<DescriptorSet>),
    PipelineLayout(Arc<PipelineLayout>),
    Pipeline(Arc<Pipeline>),
    ShaderObject(Arc<ShaderObject>),
    CommandBuffer(Arc<CommandBuffer>),
}

impl TrackedObject {
    /// Returns the object as a graph member.
    pub fn as_state_object(&self) -> &dyn StateObject {
        match self {
            Self::Resource(object) => object.as_ref(),
            Self::DescriptorSetLayout(object) => object.as_ref(),
            Self::DescriptorPool(object) => object.as_ref(),
            Self::DescriptorSet(object) => object.as_ref(),
            Self::PipelineLayout(object) => object.as_ref(),
            Self::Pipeline(object) => object.as_ref(),
            Self::ShaderObject(object) => object.as_ref(),
            Self::CommandBuffer(object) => object.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChildLinks, ObjectHandle, ObjectNode, StateObject};
    use ash::vk::{self, Handle};
    use parking_lot::Mutex;
    use std::sync::{Arc, Weak};

    struct Recorder {
        handle: ObjectHandle,
        node: ObjectNode,
        received: Mutex<Vec<Vec<ObjectHandle>>>,
    }

    impl StateObject for Recorder {
        fn handle(&self) -> ObjectHandle {
            self.handle
        }

        fn node(&self) -> &ObjectNode {
            &self.node
        }

        fn notify_invalid(&self, chain: &[ObjectHandle], unlink: bool) {
            self.received.lock().push(chain.to_vec());
            self.node.notify_parents(self.handle, chain, unlink);
        }
    }

    fn recorder(handle: ObjectHandle) -> Arc<Recorder> {
        Arc::new(Recorder {
            handle,
            node: ObjectNode::new(),
            received: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn destroy_notifies_through_chain() {
        let buffer = recorder(ObjectHandle::new(vk::Buffer::from_raw(1)));
        let set = recorder(ObjectHandle::new(vk::DescriptorSet::from_raw(2)));
        let command_buffer = recorder(ObjectHandle::new(vk::CommandBuffer::from_raw(3)));

        let set_dyn: Arc<dyn StateObject> = set.clone();
        let command_buffer_dyn: Arc<dyn StateObject> = command_buffer.clone();
        let set_weak: Weak<dyn StateObject> = Arc::downgrade(&set_dyn);
        let command_buffer_weak: Weak<dyn StateObject> = Arc::downgrade(&command_buffer_dyn);

        assert!(buffer.node.add_parent(set.handle, set_weak));
        assert!(set.node.add_parent(command_buffer.handle, command_buffer_weak));

        buffer.node.destroy(buffer.handle);

        assert_eq!(&*set.received.lock(), &[vec![buffer.handle]]);
        assert_eq!(
            &*command_buffer.received.lock(),
            &[vec![buffer.handle, set.handle]],
        );
        assert!(buffer.node.is_destroyed());
        assert!(buffer.node.parents().is_empty());

        // Destroying twice does not notify again.
        buffer.node.destroy(buffer.handle);
        assert_eq!(set.received.lock().len(), 1);
    }

    #[test]
    fn parents_are_weak() {
        let buffer = recorder(ObjectHandle::new(vk::Buffer::from_raw(1)));
        let set = recorder(ObjectHandle::new(vk::DescriptorSet::from_raw(2)));
        let set_dyn: Arc<dyn StateObject> = set.clone();

        buffer
            .node
            .add_parent(set.handle, Arc::downgrade(&set_dyn));
        drop(set_dyn);
        drop(set);

        assert!(buffer.node.parents().is_empty());
        buffer.node.destroy(buffer.handle);
    }

    #[test]
    fn child_links_are_counted() {
        let buffer = recorder(ObjectHandle::new(vk::Buffer::from_raw(1)));
        let set = recorder(ObjectHandle::new(vk::DescriptorSet::from_raw(2)));
        let buffer_dyn: Arc<dyn StateObject> = buffer.clone();
        let set_dyn: Arc<dyn StateObject> = set.clone();
        let set_weak = Arc::downgrade(&set_dyn);

        let mut links = ChildLinks::default();
        links.add(set.handle, &set_weak, &buffer_dyn);
        links.add(set.handle, &set_weak, &buffer_dyn);
        assert!(buffer.node.has_parent(set.handle));

        links.remove(set.handle, buffer.handle);
        assert!(buffer.node.has_parent(set.handle));

        links.remove(set.handle, buffer.handle);
        assert!(!buffer.node.has_parent(set.handle));
        assert!(!links.contains(buffer.handle));
    }
}
