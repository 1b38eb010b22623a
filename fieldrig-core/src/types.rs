//! Core data types shared across the crate.
//!
//! This module defines:
//! - Geometric aliases (points, vectors)
//! - Opaque IDs for node arrays, element arrays and fields
//! - Field value types, interpolation roles and the derivative mask

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

use nalgebra::Vector3;

/// A point in 3D space.
pub type Point3 = Vector3<f64>;

/// A 3D vector (displacement, force, etc.).
pub type Vec3 = Vector3<f64>;

macro_rules! world_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// ID for the entity stored at `index` in its arena.
            pub(crate) fn from_index(index: usize) -> Self {
                let raw = u32::try_from(index + 1).unwrap_or(u32::MAX);
                Self(NonZeroU32::new(raw).unwrap_or(NonZeroU32::MAX))
            }

            /// Arena slot of this ID.
            pub(crate) fn index(self) -> usize {
                self.0.get() as usize - 1
            }

            /// Raw integer value; never zero.
            pub fn get(self) -> u32 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

world_id!(
    /// ID of a [`NodeArray`](crate::node_array::NodeArray) inside a world.
    NaId,
    "na"
);
world_id!(
    /// ID of an [`ElementArray`](crate::elem_array::ElementArray) inside a world.
    EaId,
    "ea"
);
world_id!(
    /// ID of a [`Field`](crate::field::Field) inside a world.
    FieldId,
    "field"
);

/// Topological location of a degree of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElSegRole {
    /// Element vertices.
    Corner,
    /// Element interior (one node per element).
    Bubble,
    /// Element edges.
    Edge,
}

/// Value type carried by a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FieldType {
    /// Geometry only, no values.
    #[default]
    NoValue,
    Scalar,
    Vector2,
    Vector3,
    /// Symmetric 2D tensor stored as (xx, yy, xy).
    SymTensor2,
    /// Complex scalar stored as (re, im).
    ZScalar,
}

impl FieldType {
    /// Degrees of freedom per node.
    pub fn dof_count(self) -> usize {
        match self {
            FieldType::NoValue => 0,
            FieldType::Scalar => 1,
            FieldType::Vector2 => 2,
            FieldType::Vector3 => 3,
            FieldType::SymTensor2 => 3,
            FieldType::ZScalar => 2,
        }
    }

    /// Segment label for one derivative of this value type.
    pub fn segment_label(self, derivative: Derivatives) -> String {
        let base = match self {
            FieldType::NoValue => "NO",
            FieldType::Scalar => "SCAL",
            FieldType::Vector2 => "VEC2",
            FieldType::Vector3 => "VEC3",
            FieldType::SymTensor2 => "STSR2",
            FieldType::ZScalar => "ZSCAL",
        };
        let suffix = if derivative.contains(Derivatives::VALUE) {
            "VAL"
        } else if derivative.contains(Derivatives::VELOCITY) {
            "VELO"
        } else {
            "ACC"
        };
        format!("{base}_{suffix}")
    }
}

bitflags! {
    /// Time derivatives stored for a field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Derivatives: u8 {
        const VALUE = 0b001;
        const VELOCITY = 0b010;
        const ACCELERATION = 0b100;
    }
}

impl Derivatives {
    /// Value, velocity and acceleration.
    pub const DYNAMIC: Derivatives = Derivatives::VALUE
        .union(Derivatives::VELOCITY)
        .union(Derivatives::ACCELERATION);

    /// Single derivatives in lookup priority order.
    pub const PRIORITY: [Derivatives; 3] = [
        Derivatives::VALUE,
        Derivatives::VELOCITY,
        Derivatives::ACCELERATION,
    ];

    /// Position of a single derivative in the saved-value layout.
    pub(crate) fn slot(self) -> Option<usize> {
        Self::PRIORITY.iter().position(|&d| d == self)
    }
}
