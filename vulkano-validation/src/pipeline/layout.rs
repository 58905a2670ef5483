//! A pipeline layout describes the layout of descriptors and push constants used by a pipeline.
//!
//! # Compatibility
//!
//! Two pipeline layouts are *compatible for set N* when they were created with identically
//! defined push constant ranges and identically defined descriptor set layouts for sets zero
//! through N. For layouts created with [`PipelineLayoutCreateFlags::INDEPENDENT_SETS`], sets are
//! compared one at a time, so compatibility for set N says nothing about the sets before it.
//!
//! At creation, each layout computes one *compatibility record* per set, which is interned. Two
//! layouts are compatible for set N exactly when their records for set N are the same interned
//! value, which makes the check a pointer comparison.

use crate::{
    descriptor_set::layout::{DescriptorSetLayout, DescriptorSetLayoutId},
    device::Device,
    dictionary::{Canonical, Dictionary},
    macros::{impl_id_counter, vulkan_bitflags},
    object::{ObjectHandle, ObjectNode, StateObject},
    shader::ShaderStages,
    NonExhaustive, ValidationError,
};
use ash::vk;
use once_cell::sync::Lazy;
use smallvec::SmallVec;
use std::{num::NonZero, sync::Arc};
use tracing::trace;

static PUSH_CONSTANT_RANGES: Lazy<Dictionary<Vec<PushConstantRange>>> =
    Lazy::new(Dictionary::new);
static SET_LAYOUT_LISTS: Lazy<Dictionary<Vec<Option<DescriptorSetLayoutId>>>> =
    Lazy::new(Dictionary::new);
static COMPAT_RECORDS: Lazy<Dictionary<PipelineLayoutCompatDef>> = Lazy::new(Dictionary::new);

/// The canonical identity of a sorted list of push constant ranges.
pub type PushConstantRangesId = Canonical<Vec<PushConstantRange>>;

/// The canonical identity of an ordered list of descriptor set layout definitions.
pub type SetLayoutListId = Canonical<Vec<Option<DescriptorSetLayoutId>>>;

/// The canonical identity of a compatibility record.
pub type PipelineLayoutCompatId = Canonical<PipelineLayoutCompatDef>;

/// Everything that determines whether a pipeline layout is compatible with another one for a
/// given set number.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct PipelineLayoutCompatDef {
    /// The set number that this record is for.
    pub set: u32,

    /// The push constant ranges of the layout.
    pub push_constant_ranges: PushConstantRangesId,

    /// The set layouts that must match. For a layout with independent sets, this only contains
    /// the layout of `set`, otherwise it contains the layouts of sets `0..=set`.
    pub set_layouts: SetLayoutListId,

    /// Whether the layout was created with independent sets.
    pub independent_sets: bool,
}

/// A tracked `VkPipelineLayout`: its set layouts, its push constant ranges, and the interned
/// compatibility record of each set index.
#[derive(Debug)]
pub struct PipelineLayout {
    handle: vk::PipelineLayout,
    device: Arc<Device>,
    node: ObjectNode,
    id: NonZero<u64>,

    flags: PipelineLayoutCreateFlags,
    set_layouts: Vec<Option<Arc<DescriptorSetLayout>>>,
    push_constant_ranges: PushConstantRangesId,
    push_constant_ranges_disjoint: Vec<PushConstantRange>,
    set_compat_ids: Vec<PipelineLayoutCompatId>,
}

impl PipelineLayout {
    /// Creates a new `PipelineLayout`.
    ///
    /// The push constant ranges are sorted, so the order they are given in does not affect
    /// compatibility.
    pub fn new(
        device: Arc<Device>,
        handle: vk::PipelineLayout,
        create_info: PipelineLayoutCreateInfo,
    ) -> Arc<PipelineLayout> {
        let PipelineLayoutCreateInfo {
            flags,
            set_layouts,
            mut push_constant_ranges,
            _ne: _,
        } = create_info;

        // The stage mask is unique per range, so it completes the sorting key.
        push_constant_ranges.sort_unstable_by_key(|range| {
            (
                range.offset,
                range.size,
                vk::ShaderStageFlags::from(range.stages).as_raw(),
            )
        });

        let push_constant_ranges_disjoint = disjoint_ranges(&push_constant_ranges);
        let push_constant_ranges = PUSH_CONSTANT_RANGES.intern(push_constant_ranges);
        let independent_sets = flags.intersects(PipelineLayoutCreateFlags::INDEPENDENT_SETS);
        let set_compat_ids = compat_records(&set_layouts, &push_constant_ranges, independent_sets);

        trace!(
            layout = ?handle,
            set_count = set_layouts.len(),
            independent_sets,
            "pipeline layout created",
        );

        Arc::new(PipelineLayout {
            handle,
            device,
            node: ObjectNode::new(),
            id: Self::next_id(),
            flags,
            set_layouts,
            push_constant_ranges,
            push_constant_ranges_disjoint,
            set_compat_ids,
        })
    }

    /// Combines the layouts of several pipeline libraries into the layout of the pipeline linked
    /// from them.
    ///
    /// For each set number, the first layout in `layouts` that defines that set provides it. The
    /// push constant ranges are those of the first layout that has any.
    pub fn merge<'a>(
        device: Arc<Device>,
        layouts: impl IntoIterator<Item = &'a Arc<PipelineLayout>>,
    ) -> Arc<PipelineLayout> {
        let layouts: SmallVec<[&Arc<PipelineLayout>; 4]> = layouts.into_iter().collect();
        let set_count = layouts
            .iter()
            .map(|layout| layout.set_layouts.len())
            .max()
            .unwrap_or(0);

        let set_layouts = (0..set_count)
            .map(|set| {
                layouts
                    .iter()
                    .find_map(|layout| layout.set_layouts.get(set).cloned().flatten())
            })
            .collect();
        let flags = layouts
            .iter()
            .fold(PipelineLayoutCreateFlags::empty(), |flags, layout| {
                flags | layout.flags
            });
        let push_constant_ranges = layouts
            .iter()
            .map(|layout| layout.push_constant_ranges())
            .find(|ranges| !ranges.is_empty())
            .map(<[PushConstantRange]>::to_vec)
            .unwrap_or_default();

        PipelineLayout::new(
            device,
            vk::PipelineLayout::null(),
            PipelineLayoutCreateInfo {
                flags,
                set_layouts,
                push_constant_ranges,
                _ne: NonExhaustive(()),
            },
        )
    }

    /// Returns the raw handle. This is null for layouts that were merged from pipeline libraries
    /// or that describe a shader object.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    /// Returns the device that the layout belongs to.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the flags that the pipeline layout was created with.
    #[inline]
    pub fn flags(&self) -> PipelineLayoutCreateFlags {
        self.flags
    }

    /// Returns the descriptor set layouts this pipeline layout was created from. An entry is
    /// `None` if the set was left undefined in a layout with independent sets.
    #[inline]
    pub fn set_layouts(&self) -> &[Option<Arc<DescriptorSetLayout>>] {
        &self.set_layouts
    }

    /// Returns the descriptor set layout of set `set`, if defined.
    #[inline]
    pub fn set_layout(&self, set: u32) -> Option<&Arc<DescriptorSetLayout>> {
        self.set_layouts.get(set as usize).and_then(Option::as_ref)
    }

    /// Returns the push constant ranges this pipeline layout was created from.
    ///
    /// Sorted by offset, then size, then stages.
    #[inline]
    pub fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constant_ranges
    }

    /// Returns the canonical identity of the push constant ranges.
    #[inline]
    pub fn push_constant_ranges_id(&self) -> &PushConstantRangesId {
        &self.push_constant_ranges
    }

    /// Returns the push constant ranges cut at every range boundary, each piece carrying the
    /// stages of every range that covers it. A vertex range `0..4` and a fragment range `0..12`
    /// become `0..4` for both stages and `4..12` for fragment only.
    #[inline]
    pub fn push_constant_ranges_disjoint(&self) -> &[PushConstantRange] {
        &self.push_constant_ranges_disjoint
    }

    /// Returns the compatibility records of every set.
    #[inline]
    pub fn set_compat_ids(&self) -> &[PipelineLayoutCompatId] {
        &self.set_compat_ids
    }

    /// Returns the compatibility record of set `set`.
    #[inline]
    pub fn compat_id(&self, set: u32) -> Option<&PipelineLayoutCompatId> {
        self.set_compat_ids.get(set as usize)
    }

    /// Returns whether `self` is compatible with `other` for set `set`.
    #[inline]
    pub fn is_compatible_with(&self, other: &PipelineLayout, set: u32) -> bool {
        match (self.compat_id(set), other.compat_id(set)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Returns the number of dynamic offsets that binding `sets` starting at `first_set` needs.
    pub fn dynamic_descriptor_count(&self, first_set: u32, set_count: u32) -> u32 {
        let end = first_set
            .saturating_add(set_count)
            .min(self.set_layouts.len() as u32);

        (first_set..end)
            .filter_map(|set| self.set_layout(set))
            .fold(0, |count: u32, layout| {
                count.saturating_add(layout.dynamic_descriptor_count())
            })
    }
}

impl_id_counter!(PipelineLayout);

impl StateObject for PipelineLayout {
    #[inline]
    fn handle(&self) -> ObjectHandle {
        ObjectHandle::new(self.handle)
    }

    #[inline]
    fn node(&self) -> &ObjectNode {
        &self.node
    }
}

fn compat_records(
    set_layouts: &[Option<Arc<DescriptorSetLayout>>],
    push_constant_ranges: &PushConstantRangesId,
    independent_sets: bool,
) -> Vec<PipelineLayoutCompatId> {
    let defs: Vec<Option<DescriptorSetLayoutId>> = set_layouts
        .iter()
        .map(|layout| layout.as_ref().map(|layout| layout.def().clone()))
        .collect();

    (0..defs.len())
        .map(|set| {
            let list = if independent_sets {
                vec![defs[set].clone()]
            } else {
                defs[..=set].to_vec()
            };

            COMPAT_RECORDS.intern(PipelineLayoutCompatDef {
                set: set as u32,
                push_constant_ranges: push_constant_ranges.clone(),
                set_layouts: SET_LAYOUT_LISTS.intern(list),
                independent_sets,
            })
        })
        .collect()
}

fn disjoint_ranges(push_constant_ranges: &[PushConstantRange]) -> Vec<PushConstantRange> {
    let mut disjoint: Vec<PushConstantRange> = Vec::with_capacity(push_constant_ranges.len());

    let Some(first) = push_constant_ranges.first() else {
        return disjoint;
    };

    let mut min_offset = first.offset;

    loop {
        let mut max_offset = u32::MAX;
        let mut stages = ShaderStages::empty();

        for range in push_constant_ranges {
            if range.offset > min_offset {
                max_offset = max_offset.min(range.offset);
                break;
            } else if range.end() > min_offset {
                max_offset = max_offset.min(range.end());
                stages |= range.stages;
            }
        }

        if stages.is_empty() {
            // A gap between ranges: skip ahead to the next range that starts after it.
            match push_constant_ranges
                .iter()
                .map(|range| range.offset)
                .filter(|&offset| offset > min_offset)
                .min()
            {
                Some(next) => {
                    min_offset = next;
                    continue;
                }
                None => break,
            }
        }

        disjoint.push(PushConstantRange {
            stages,
            offset: min_offset,
            size: max_offset - min_offset,
        });
        min_offset = max_offset;
    }

    disjoint
}

/// Parameters to create a new `PipelineLayout`.
#[derive(Clone, Debug)]
pub struct PipelineLayoutCreateInfo {
    /// Specifies how to create the pipeline layout.
    ///
    /// The default value is empty.
    pub flags: PipelineLayoutCreateFlags,

    /// The descriptor set layouts that should be part of the pipeline layout.
    ///
    /// They are provided in order of set number. An entry may be `None` only if `flags` contains
    /// [`PipelineLayoutCreateFlags::INDEPENDENT_SETS`].
    ///
    /// The default value is empty.
    pub set_layouts: Vec<Option<Arc<DescriptorSetLayout>>>,

    /// The ranges of push constants that the pipeline will access.
    ///
    /// The default value is empty.
    pub push_constant_ranges: Vec<PushConstantRange>,

    pub _ne: NonExhaustive,
}

impl Default for PipelineLayoutCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            flags: PipelineLayoutCreateFlags::empty(),
            set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
            _ne: NonExhaustive(()),
        }
    }
}

impl PipelineLayoutCreateInfo {
    /// Checks the create info for violations that the layer reports but tolerates.
    pub fn validate(&self, device: &Device) -> Result<(), Box<ValidationError>> {
        let &Self {
            flags,
            ref set_layouts,
            ref push_constant_ranges,
            _ne: _,
        } = self;

        let properties = device.properties();

        if set_layouts.len() > properties.max_bound_descriptor_sets as usize {
            return Err(Box::new(ValidationError {
                context: "set_layouts".into(),
                problem: "the length exceeds the `max_bound_descriptor_sets` limit".into(),
                vuids: &["VUID-VkPipelineLayoutCreateInfo-setLayoutCount-00286"],
                ..Default::default()
            }));
        }

        let mut seen_push_descriptor = false;

        for (index, set_layout) in set_layouts.iter().enumerate() {
            let Some(set_layout) = set_layout else {
                if !flags.intersects(PipelineLayoutCreateFlags::INDEPENDENT_SETS) {
                    return Err(Box::new(ValidationError {
                        context: format!("set_layouts[{}]", index).into(),
                        problem: "is `None`, but `flags` does not contain \
                            `PipelineLayoutCreateFlags::INDEPENDENT_SETS`"
                            .into(),
                        vuids: &["VUID-VkPipelineLayoutCreateInfo-graphicsPipelineLibrary-06753"],
                        ..Default::default()
                    }));
                }

                continue;
            };

            if set_layout.is_push_descriptor() {
                if seen_push_descriptor {
                    return Err(Box::new(ValidationError {
                        context: "set_layouts".into(),
                        problem: "contains more than one push descriptor set layout".into(),
                        vuids: &["VUID-VkPipelineLayoutCreateInfo-pSetLayouts-00293"],
                        ..Default::default()
                    }));
                }

                seen_push_descriptor = true;
            }
        }

        let mut seen_stages = ShaderStages::empty();

        for (index, range) in push_constant_ranges.iter().enumerate() {
            range
                .validate(device)
                .map_err(|err| err.add_context(format!("push_constant_ranges[{}]", index)))?;

            if seen_stages.intersects(range.stages) {
                return Err(Box::new(ValidationError {
                    context: "push_constant_ranges".into(),
                    problem: "contains more than one range with the same stage".into(),
                    vuids: &["VUID-VkPipelineLayoutCreateInfo-pPushConstantRanges-00292"],
                    ..Default::default()
                }));
            }

            seen_stages |= range.stages;
        }

        Ok(())
    }
}

vulkan_bitflags! {
    /// Flags that control how a pipeline layout is created.
    PipelineLayoutCreateFlags = PipelineLayoutCreateFlags(u32);

    /// Sets are compatible individually, rather than as a prefix. Used with pipeline libraries.
    INDEPENDENT_SETS = INDEPENDENT_SETS_EXT,
}

/// A byte range of push constants and the stages that may read it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    /// Each stage may appear in at most one range of a layout.
    ///
    /// The default value is [`ShaderStages::empty()`], which must be overridden.
    pub stages: ShaderStages,

    /// A multiple of 4.
    ///
    /// The default value is `0`.
    pub offset: u32,

    /// A nonzero multiple of 4.
    ///
    /// The default value is `0`, which must be overridden.
    pub size: u32,
}

impl Default for PushConstantRange {
    #[inline]
    fn default() -> Self {
        Self {
            stages: ShaderStages::empty(),
            offset: 0,
            size: 0,
        }
    }
}

impl PushConstantRange {
    pub(crate) fn validate(&self, device: &Device) -> Result<(), Box<ValidationError>> {
        let &Self {
            stages,
            offset,
            size,
        } = self;

        if stages.is_empty() {
            return Err(Box::new(ValidationError {
                context: "stages".into(),
                problem: "is empty".into(),
                vuids: &["VUID-VkPushConstantRange-stageFlags-requiredbitmask"],
                ..Default::default()
            }));
        }

        let max_push_constants_size = device.properties().max_push_constants_size;

        if offset >= max_push_constants_size {
            return Err(Box::new(ValidationError {
                context: "offset".into(),
                problem: "is not less than the `max_push_constants_size` limit".into(),
                vuids: &["VUID-VkPushConstantRange-offset-00294"],
                ..Default::default()
            }));
        }

        if offset % 4 != 0 {
            return Err(Box::new(ValidationError {
                context: "offset".into(),
                problem: "is not a multiple of 4".into(),
                vuids: &["VUID-VkPushConstantRange-offset-00295"],
                ..Default::default()
            }));
        }

        if size == 0 {
            return Err(Box::new(ValidationError {
                context: "size".into(),
                problem: "is zero".into(),
                vuids: &["VUID-VkPushConstantRange-size-00296"],
                ..Default::default()
            }));
        }

        if size % 4 != 0 {
            return Err(Box::new(ValidationError {
                context: "size".into(),
                problem: "is not a multiple of 4".into(),
                vuids: &["VUID-VkPushConstantRange-size-00297"],
                ..Default::default()
            }));
        }

        if size > max_push_constants_size - offset {
            return Err(Box::new(ValidationError {
                problem: "`size` is greater than `max_push_constants_size` limit minus `offset`"
                    .into(),
                vuids: &["VUID-VkPushConstantRange-size-00298"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    /// Returns the byte range covered by `self`.
    #[inline]
    pub fn byte_range(&self) -> std::ops::Range<u32> {
        self.offset..self.end()
    }

    /// Returns the first byte past the range. Ranges that would reach past `u32::MAX` end there.
    #[inline]
    pub fn end(&self) -> u32 {
        self.offset.saturating_add(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        PipelineLayout, PipelineLayoutCreateFlags, PipelineLayoutCreateInfo, PushConstantRange,
    };
    use crate::{descriptor_set::layout::DescriptorType, shader::ShaderStages};
    use ash::vk;

    #[test]
    fn reflexive_compatibility() {
        let device = test_device!();
        let set0 = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let set1 = test_set_layout!(device, [(0, DescriptorType::SampledImage, 2)]);
        let layout = test_pipeline_layout!(device, [set0, set1]);

        for set in 0..2 {
            assert!(layout.is_compatible_with(&layout, set));
        }
        assert!(!layout.is_compatible_with(&layout, 2));
    }

    #[test]
    fn prefix_compatibility() {
        let device = test_device!();
        let a0 = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let a1 = test_set_layout!(device, [(0, DescriptorType::SampledImage, 2)]);
        let b1 = test_set_layout!(device, [(0, DescriptorType::StorageImage, 1)]);

        let a = test_pipeline_layout!(device, [a0.clone(), a1.clone()]);
        let b = test_pipeline_layout!(device, [a0.clone(), b1]);
        let c = test_pipeline_layout!(device, [a0, a1]);

        assert!(a.is_compatible_with(&b, 0));
        assert!(!a.is_compatible_with(&b, 1));
        assert!(a.is_compatible_with(&c, 1));
        assert_ne!(a, c);
        assert_eq!(a.compat_id(1), c.compat_id(1));

        // Compatibility for a set implies compatibility for every lower set.
        for set in 0..2 {
            if a.is_compatible_with(&c, set) {
                assert!((0..set).all(|lower| a.is_compatible_with(&c, lower)));
            }
        }
    }

    #[test]
    fn push_constant_order_does_not_matter() {
        let device = test_device!();
        let set0 = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);

        let ranges = [
            PushConstantRange {
                stages: ShaderStages::VERTEX,
                offset: 0,
                size: 16,
            },
            PushConstantRange {
                stages: ShaderStages::FRAGMENT,
                offset: 16,
                size: 16,
            },
        ];

        let a = PipelineLayout::new(
            device.clone(),
            vk::PipelineLayout::null(),
            PipelineLayoutCreateInfo {
                set_layouts: vec![Some(set0.clone())],
                push_constant_ranges: ranges.to_vec(),
                ..Default::default()
            },
        );
        let b = PipelineLayout::new(
            device.clone(),
            vk::PipelineLayout::null(),
            PipelineLayoutCreateInfo {
                set_layouts: vec![Some(set0.clone())],
                push_constant_ranges: vec![ranges[1], ranges[0]],
                ..Default::default()
            },
        );
        let c = test_pipeline_layout!(device, [set0]);

        assert!(a.is_compatible_with(&b, 0));
        assert_eq!(a.push_constant_ranges_id(), b.push_constant_ranges_id());
        assert!(!a.is_compatible_with(&c, 0));
    }

    #[test]
    fn push_constant_ranges_disjoint() {
        let device = test_device!();

        let layout = PipelineLayout::new(
            device,
            vk::PipelineLayout::null(),
            PipelineLayoutCreateInfo {
                push_constant_ranges: vec![
                    PushConstantRange {
                        stages: ShaderStages::VERTEX,
                        offset: 0,
                        size: 4,
                    },
                    PushConstantRange {
                        stages: ShaderStages::FRAGMENT,
                        offset: 0,
                        size: 12,
                    },
                    PushConstantRange {
                        stages: ShaderStages::COMPUTE,
                        offset: 32,
                        size: 8,
                    },
                ],
                ..Default::default()
            },
        );

        assert_eq!(
            layout.push_constant_ranges_disjoint(),
            [
                PushConstantRange {
                    stages: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                    offset: 0,
                    size: 4,
                },
                PushConstantRange {
                    stages: ShaderStages::FRAGMENT,
                    offset: 4,
                    size: 8,
                },
                PushConstantRange {
                    stages: ShaderStages::COMPUTE,
                    offset: 32,
                    size: 8,
                },
            ],
        );
    }

    #[test]
    fn independent_sets() {
        let device = test_device!();
        let a0 = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let b0 = test_set_layout!(device, [(0, DescriptorType::StorageBuffer, 1)]);
        let shared1 = test_set_layout!(device, [(0, DescriptorType::SampledImage, 1)]);

        let independent = |set0| {
            PipelineLayout::new(
                device.clone(),
                vk::PipelineLayout::null(),
                PipelineLayoutCreateInfo {
                    flags: PipelineLayoutCreateFlags::INDEPENDENT_SETS,
                    set_layouts: vec![set0, Some(shared1.clone())],
                    ..Default::default()
                },
            )
        };

        let a = independent(Some(a0));
        let b = independent(Some(b0));
        let c = independent(None);

        assert!(!a.is_compatible_with(&b, 0));
        assert!(a.is_compatible_with(&b, 1));
        assert!(a.is_compatible_with(&c, 1));

        // Independent layouts never match layouts without the flag.
        let d0 = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let d = test_pipeline_layout!(device, [d0, shared1]);
        assert!(!a.is_compatible_with(&d, 1));
    }

    #[test]
    fn merge_libraries() {
        let device = test_device!();
        let set0 = test_set_layout!(device, [(0, DescriptorType::UniformBuffer, 1)]);
        let set1 = test_set_layout!(device, [(0, DescriptorType::SampledImage, 1)]);

        let vertex_library = PipelineLayout::new(
            device.clone(),
            vk::PipelineLayout::null(),
            PipelineLayoutCreateInfo {
                flags: PipelineLayoutCreateFlags::INDEPENDENT_SETS,
                set_layouts: vec![Some(set0.clone()), None],
                ..Default::default()
            },
        );
        let fragment_library = PipelineLayout::new(
            device.clone(),
            vk::PipelineLayout::null(),
            PipelineLayoutCreateInfo {
                flags: PipelineLayoutCreateFlags::INDEPENDENT_SETS,
                set_layouts: vec![None, Some(set1.clone())],
                push_constant_ranges: vec![PushConstantRange {
                    stages: ShaderStages::FRAGMENT,
                    offset: 0,
                    size: 8,
                }],
                ..Default::default()
            },
        );

        let merged = PipelineLayout::merge(device.clone(), [&vertex_library, &fragment_library]);
        let full = PipelineLayout::new(
            device.clone(),
            vk::PipelineLayout::null(),
            PipelineLayoutCreateInfo {
                flags: PipelineLayoutCreateFlags::INDEPENDENT_SETS,
                set_layouts: vec![Some(set0), Some(set1)],
                push_constant_ranges: fragment_library.push_constant_ranges().to_vec(),
                ..Default::default()
            },
        );

        assert_eq!(merged.set_layouts().len(), 2);
        assert!(merged.is_compatible_with(&full, 0));
        assert!(merged.is_compatible_with(&full, 1));
    }

    #[test]
    fn validate_create_info() {
        let device = test_device!();

        let null_without_flag = PipelineLayoutCreateInfo {
            set_layouts: vec![None],
            ..Default::default()
        };
        assert!(null_without_flag.validate(&device).is_err());

        let overlapping_stages = PipelineLayoutCreateInfo {
            push_constant_ranges: vec![
                PushConstantRange {
                    stages: ShaderStages::VERTEX,
                    offset: 0,
                    size: 4,
                },
                PushConstantRange {
                    stages: ShaderStages::VERTEX,
                    offset: 4,
                    size: 4,
                },
            ],
            ..Default::default()
        };
        assert_eq!(
            overlapping_stages.validate(&device).unwrap_err().vuids,
            ["VUID-VkPipelineLayoutCreateInfo-pPushConstantRanges-00292"],
        );

        let misaligned = PipelineLayoutCreateInfo {
            push_constant_ranges: vec![PushConstantRange {
                stages: ShaderStages::VERTEX,
                offset: 2,
                size: 4,
            }],
            ..Default::default()
        };
        let error = misaligned.validate(&device).unwrap_err();
        assert_eq!(error.context, "push_constant_ranges[0].offset");
    }

    #[test]
    fn push_constant_range_past_address_space() {
        let device = test_device!();
        let range = PushConstantRange {
            stages: ShaderStages::VERTEX,
            offset: 0xFFFF_FFF0,
            size: 0x20,
        };
        let create_info = PipelineLayoutCreateInfo {
            push_constant_ranges: vec![range],
            ..Default::default()
        };
        assert_eq!(
            create_info.validate(&device).unwrap_err().vuids,
            ["VUID-VkPushConstantRange-offset-00294"],
        );

        // The layout is still tracked, with the range cut off at the end of the address space.
        let layout = PipelineLayout::new(device, vk::PipelineLayout::null(), create_info);
        assert_eq!(range.byte_range(), 0xFFFF_FFF0..u32::MAX);
        assert_eq!(
            layout.push_constant_ranges_disjoint(),
            [PushConstantRange {
                stages: ShaderStages::VERTEX,
                offset: 0xFFFF_FFF0,
                size: 0xF,
            }],
        );
        assert_eq!(layout.dynamic_descriptor_count(0, u32::MAX), 0);
    }
}
