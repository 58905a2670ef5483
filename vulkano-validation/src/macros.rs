/// Declares a typed set of flags over an `ash::vk` flags type. Only the listed flags can be set.
macro_rules! vulkan_bitflags {
    {
        $(#[doc = $ty_doc:literal])*
        $ty:ident
        $( impl { $($impls:item)* } )?
        = $ty_ffi:ident($repr:ty);

        $(
            $(#[doc = $flag_doc:literal])*
            $flag_name:ident = $flag_name_ffi:ident,
        )+
    } => {
        $(#[doc = $ty_doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $ty($repr);

        impl $ty {
            $(
                $(#[doc = $flag_doc])*
                pub const $flag_name: Self = Self(ash::vk::$ty_ffi::$flag_name_ffi.as_raw());
            )*

            const KNOWN: $repr = 0 $(| ash::vk::$ty_ffi::$flag_name_ffi.as_raw())*;

            /// The empty set.
            #[inline]
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Every flag this type knows about.
            #[inline]
            pub const fn all() -> Self {
                Self(Self::KNOWN)
            }

            #[inline]
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Returns whether `self` and `other` share at least one flag.
            #[inline]
            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            /// Returns whether every flag of `other` is in `self`.
            #[inline]
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            #[inline]
            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }

            #[inline]
            pub const fn intersection(self, other: Self) -> Self {
                Self(self.0 & other.0)
            }

            /// Removes the flags of `other` from `self`.
            #[inline]
            pub const fn difference(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }

            $( $($impls)* )?
        }

        impl Default for $ty {
            #[inline]
            fn default() -> Self {
                Self::empty()
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let names = [$((Self::$flag_name, stringify!($flag_name))),*];
                let mut set = names.iter().filter(|(flag, _)| self.intersects(*flag));

                match set.next() {
                    Some((_, first)) => {
                        f.write_str(first)?;
                        set.try_for_each(|(_, name)| write!(f, " | {}", name))
                    }
                    None => f.write_str("empty()"),
                }
            }
        }

        impl From<$ty> for ash::vk::$ty_ffi {
            #[inline]
            fn from(val: $ty) -> Self {
                Self::from_raw(val.0)
            }
        }

        impl From<ash::vk::$ty_ffi> for $ty {
            #[inline]
            fn from(val: ash::vk::$ty_ffi) -> Self {
                Self(val.as_raw() & Self::KNOWN)
            }
        }

        crate::macros::impl_set_ops! {
            $ty;
            BitAnd::bitand, BitAndAssign::bitand_assign => intersection;
            BitOr::bitor, BitOrAssign::bitor_assign => union;
            Sub::sub, SubAssign::sub_assign => difference;
        }
    };
}

macro_rules! impl_set_ops {
    {
        $ty:ident;
        $($op:ident::$method:ident, $op_assign:ident::$method_assign:ident => $set_op:ident;)+
    } => {
        $(
            impl std::ops::$op for $ty {
                type Output = Self;

                #[inline]
                fn $method(self, rhs: Self) -> Self {
                    self.$set_op(rhs)
                }
            }

            impl std::ops::$op_assign for $ty {
                #[inline]
                fn $method_assign(&mut self, rhs: Self) {
                    *self = self.$set_op(rhs);
                }
            }
        )+
    };
}

/// Declares a closed enum over a subset of the values of an `ash::vk` enum type.
macro_rules! vulkan_enum {
    {
        $(#[doc = $ty_doc:literal])*
        $ty:ident
        $( impl { $($impls:item)* } )?
        = $ty_ffi:ident($repr:ty);

        $(
            $(#[doc = $flag_doc:literal])*
            $flag_name:ident = $flag_name_ffi:ident,
        )+
    } => {
        $(#[doc = $ty_doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr($repr)]
        pub enum $ty {
            $(
                $(#[doc = $flag_doc])*
                $flag_name = ash::vk::$ty_ffi::$flag_name_ffi.as_raw(),
            )+
        }

        impl $ty {
            /// The number of variants.
            #[allow(dead_code)]
            pub(crate) const COUNT: usize = [$(stringify!($flag_name)),+].len();
        }

        $(
            impl $ty {
                $($impls)*
            }
        )?

        impl From<$ty> for ash::vk::$ty_ffi {
            #[inline]
            fn from(val: $ty) -> Self {
                Self::from_raw(val as $repr)
            }
        }

        impl TryFrom<ash::vk::$ty_ffi> for $ty {
            type Error = ();

            #[inline]
            fn try_from(val: ash::vk::$ty_ffi) -> Result<Self, Self::Error> {
                Ok(match val {
                    $(
                        ash::vk::$ty_ffi::$flag_name_ffi => Self::$flag_name,
                    )+
                    _ => return Err(()),
                })
            }
        }
    };
}

/// Declares a flags type together with an enum of its single flags.
macro_rules! vulkan_bitflags_enum {
    {
        $(#[doc = $ty_bitflags_doc:literal])*
        $ty_bitflags:ident
        $( impl { $($impls_bitflags:item)* } )?
        ,

        $(#[doc = $ty_enum_doc:literal])*
        $ty_enum:ident
        $( impl { $($impls_enum:item)* } )?
        ,

        = $ty_ffi:ident($repr:ty);

        $(
            $(#[doc = $flag_doc:literal])*
            $flag_name_bitflags:ident, $flag_name_enum:ident = $flag_name_ffi:ident,
        )+
    } => {
        crate::macros::vulkan_bitflags! {
            $(#[doc = $ty_bitflags_doc])*
            $ty_bitflags
            impl {
                /// Returns whether `self` contains the flag corresponding to `val`.
                #[inline]
                pub fn contains_enum(self, val: $ty_enum) -> bool {
                    self.intersects(val.into())
                }

                $( $($impls_bitflags)* )?
            }
            = $ty_ffi($repr);

            $(
                $(#[doc = $flag_doc])*
                $flag_name_bitflags = $flag_name_ffi,
            )+
        }

        crate::macros::vulkan_enum! {
            $(#[doc = $ty_enum_doc])*
            $ty_enum
            $( impl { $($impls_enum)* } )?
            = $ty_ffi($repr);

            $(
                $(#[doc = $flag_doc])*
                $flag_name_enum = $flag_name_ffi,
            )+
        }

        impl From<$ty_enum> for $ty_bitflags {
            #[inline]
            fn from(val: $ty_enum) -> Self {
                Self(val as $repr)
            }
        }

        impl FromIterator<$ty_enum> for $ty_bitflags {
            #[inline]
            fn from_iter<T: IntoIterator<Item = $ty_enum>>(iter: T) -> Self {
                iter.into_iter()
                    .fold(Self::empty(), |flags, stage| flags.union(stage.into()))
            }
        }

        impl IntoIterator for $ty_bitflags {
            type Item = $ty_enum;
            type IntoIter = std::iter::Flatten<
                std::array::IntoIter<
                    Option<Self::Item>,
                    { $ty_bitflags::KNOWN.count_ones() as usize },
                >
            >;

            #[inline]
            fn into_iter(self) -> Self::IntoIter {
                [
                    $(
                        self.intersects(Self::$flag_name_bitflags)
                            .then_some($ty_enum::$flag_name_enum),
                    )+
                ].into_iter().flatten()
            }
        }
    }
}

/// Gives `$type` identity semantics through its `id` field, which must be filled from
/// `Self::next_id()`.
macro_rules! impl_id_counter {
    ($type:ident) => {
        impl $type {
            fn next_id() -> std::num::NonZero<u64> {
                static NEXT: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

                let id = NEXT.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

                match std::num::NonZero::new(id) {
                    Some(id) => id,
                    None => {
                        eprintln!("ran out of {} ids", stringify!($type));
                        std::process::abort();
                    }
                }
            }

            /// Returns the process-wide identifier of this object. Identifiers are never reused.
            #[inline]
            pub fn id(&self) -> std::num::NonZero<u64> {
                self.id
            }
        }

        impl PartialEq for $type {
            #[inline]
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl Eq for $type {}

        impl std::hash::Hash for $type {
            #[inline]
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                state.write_u64(self.id.get());
            }
        }
    };
}

/// Expands a list of VUID suffixes into the full identifiers of the action command that is being
/// validated.
macro_rules! vuids {
    ($vuid_type:expr, $($id:literal),+ $(,)?) => {
        match $vuid_type {
            VUIDType::Dispatch => &[$(concat!("VUID-vkCmdDispatch-", $id)),+],
            VUIDType::DispatchIndirect => &[$(concat!("VUID-vkCmdDispatchIndirect-", $id)),+],
            VUIDType::Draw => &[$(concat!("VUID-vkCmdDraw-", $id)),+],
            VUIDType::DrawIndirect => &[$(concat!("VUID-vkCmdDrawIndirect-", $id)),+],
            VUIDType::DrawIndexed => &[$(concat!("VUID-vkCmdDrawIndexed-", $id)),+],
            VUIDType::DrawIndexedIndirect => &[$(concat!("VUID-vkCmdDrawIndexedIndirect-", $id)),+],
            VUIDType::DrawMeshTasks => &[$(concat!("VUID-vkCmdDrawMeshTasksEXT-", $id)),+],
            VUIDType::DrawMeshTasksIndirect => {
                &[$(concat!("VUID-vkCmdDrawMeshTasksIndirectEXT-", $id)),+]
            }
            VUIDType::TraceRays => &[$(concat!("VUID-vkCmdTraceRaysKHR-", $id)),+],
            VUIDType::TraceRaysIndirect => &[$(concat!("VUID-vkCmdTraceRaysIndirectKHR-", $id)),+],
            VUIDType::DispatchGraph => &[$(concat!("VUID-vkCmdDispatchGraphAMDX-", $id)),+],
        }
    };
}

pub(crate) use impl_id_counter;
pub(crate) use impl_set_ops;
pub(crate) use vuids;
pub(crate) use vulkan_bitflags;
pub(crate) use vulkan_bitflags_enum;
pub(crate) use vulkan_enum;
