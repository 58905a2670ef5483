//! The device context that tracked objects are created under.
//!
//! A [`Device`] carries the configuration that the rules depend on: the features that were
//! enabled when the device was created, the limits of the physical device, and the settings of
//! the layer itself. It also owns the [`ValidationReporter`] that violations are sent to.

use crate::{object::ObjectHandle, DeviceSize, NonExhaustive, ValidationError, ViolationKind};
use ash::vk;
use std::{
    fmt::{Debug, Error as FmtError, Formatter},
    sync::Arc,
};
use tracing::warn;

/// The device features that change which rules apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceFeatures {
    /// Push constants that a shader statically uses need not have been pushed before a draw.
    pub maintenance4: bool,

    /// Shaders may be bound as shader objects, without a pipeline.
    pub shader_object: bool,

    /// Protected command buffers may be allocated.
    pub protected_memory: bool,

    /// Tessellation stages may be used.
    pub tessellation_shader: bool,

    /// The geometry stage may be used.
    pub geometry_shader: bool,

    /// Task and mesh stages may be used.
    pub mesh_shader: bool,

    /// Pipelines may be created from pipeline libraries.
    pub graphics_pipeline_library: bool,

    pub _ne: NonExhaustive,
}

impl Default for DeviceFeatures {
    #[inline]
    fn default() -> Self {
        Self {
            maintenance4: false,
            shader_object: false,
            protected_memory: false,
            tessellation_shader: false,
            geometry_shader: false,
            mesh_shader: false,
            graphics_pipeline_library: false,
            _ne: NonExhaustive(()),
        }
    }
}

/// The limits of the physical device that the rules depend on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceProperties {
    /// The number of descriptor sets that can be bound at the same time.
    ///
    /// The default value is `32`.
    pub max_bound_descriptor_sets: u32,

    /// The maximum size, in bytes, of the push constants.
    ///
    /// The default value is `256`.
    pub max_push_constants_size: u32,

    /// The alignment of dynamic offsets into uniform buffers.
    ///
    /// The default value is `256`.
    pub min_uniform_buffer_offset_alignment: DeviceSize,

    /// The alignment of dynamic offsets into storage buffers.
    ///
    /// The default value is `256`.
    pub min_storage_buffer_offset_alignment: DeviceSize,

    pub _ne: NonExhaustive,
}

impl Default for DeviceProperties {
    #[inline]
    fn default() -> Self {
        Self {
            max_bound_descriptor_sets: 32,
            max_push_constants_size: 256,
            min_uniform_buffer_offset_alignment: 256,
            min_storage_buffer_offset_alignment: 256,
            _ne: NonExhaustive(()),
        }
    }
}

/// Settings of the layer itself.
#[derive(Clone, Debug)]
pub struct ValidationSettings {
    /// Whether the layouts of images accessed through descriptors are checked against the layouts
    /// recorded in the command buffer. When disabled, image layout changes also do not cause
    /// descriptor sets to be revalidated.
    ///
    /// The default value is `true`.
    pub image_layout_validation: bool,

    /// Descriptor sets with more descriptors than this are revalidated at every action command,
    /// since the cost of tracking which of their descriptors are in use exceeds the cost of
    /// checking them again.
    ///
    /// The default value is `64`.
    pub many_descriptors_threshold: u32,

    /// Where violations are reported.
    ///
    /// The default value is [`TracingReporter`].
    pub reporter: Arc<dyn ValidationReporter>,

    pub _ne: NonExhaustive,
}

impl Default for ValidationSettings {
    #[inline]
    fn default() -> Self {
        Self {
            image_layout_validation: true,
            many_descriptors_threshold: 64,
            reporter: Arc::new(TracingReporter),
            _ne: NonExhaustive(()),
        }
    }
}

/// Receives the violations that the layer finds.
pub trait ValidationReporter: Send + Sync {
    /// Called once for every violation.
    fn report(&self, error: &ValidationError);
}

impl Debug for dyn ValidationReporter {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str("dyn ValidationReporter")
    }
}

/// A [`ValidationReporter`] that emits every violation as a `tracing` warning.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl ValidationReporter for TracingReporter {
    fn report(&self, error: &ValidationError) {
        let vuid = error.vuids.first().copied().unwrap_or("");
        let kind = match error.kind {
            ViolationKind::Compatibility => "compatibility",
            ViolationKind::Completeness => "completeness",
            ViolationKind::Liveness => "liveness",
            ViolationKind::Usage => "usage",
        };

        warn!(vuid, kind, objects = ?error.objects, "{}", error);
    }
}

/// The device that tracked objects belong to.
#[derive(Debug)]
pub struct Device {
    handle: vk::Device,
    enabled_features: DeviceFeatures,
    properties: DeviceProperties,
    settings: ValidationSettings,
}

impl Device {
    /// Creates a new `Device`.
    pub fn new(handle: vk::Device, create_info: DeviceCreateInfo) -> Arc<Self> {
        let DeviceCreateInfo {
            enabled_features,
            properties,
            settings,
            _ne: _,
        } = create_info;

        Arc::new(Device {
            handle,
            enabled_features,
            properties,
            settings,
        })
    }

    /// Returns the raw handle.
    #[inline]
    pub fn handle(&self) -> vk::Device {
        self.handle
    }

    /// Returns the features that were enabled on the device.
    #[inline]
    pub fn enabled_features(&self) -> &DeviceFeatures {
        &self.enabled_features
    }

    /// Returns the limits of the physical device.
    #[inline]
    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Returns the settings of the layer.
    #[inline]
    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// Sends every error to the reporter, returning how many there were.
    pub fn report(&self, errors: &[Box<ValidationError>]) -> usize {
        for error in errors {
            self.settings.reporter.report(error);
        }

        errors.len()
    }

    /// Returns the device as an `ObjectHandle`.
    #[inline]
    pub fn object_handle(&self) -> ObjectHandle {
        ObjectHandle::new(self.handle)
    }
}

/// Parameters to create a new `Device`.
#[derive(Clone, Debug)]
pub struct DeviceCreateInfo {
    /// The features that were enabled on the device.
    ///
    /// The default value is [`DeviceFeatures::default()`].
    pub enabled_features: DeviceFeatures,

    /// The limits of the physical device.
    ///
    /// The default value is [`DeviceProperties::default()`].
    pub properties: DeviceProperties,

    /// The settings of the layer.
    ///
    /// The default value is [`ValidationSettings::default()`].
    pub settings: ValidationSettings,

    pub _ne: NonExhaustive,
}

impl Default for DeviceCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            enabled_features: DeviceFeatures::default(),
            properties: DeviceProperties::default(),
            settings: ValidationSettings::default(),
            _ne: NonExhaustive(()),
        }
    }
}
