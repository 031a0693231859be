pub mod events;

use bevy::{
    math::{Quat, Vec3},
    reflect::{Reflect, std_traits::ReflectDefault},
};
use bevy_blend_tree_proc_macros::ValueWrapper;
use serde::{Deserialize, Serialize};

/// Type of a node port. Pose ports carry pose buffers, every other kind carries a
/// [`DataValue`].
#[derive(Reflect, Default, Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[reflect(Default)]
pub enum DataSpec {
    #[default]
    F32,
    Bool,
    Vec3,
    Quat,
    Pose,
}

impl DataSpec {
    /// Whether a source of type `source` can feed an input of type `self`.
    /// Float inputs also accept booleans, which read as `0.0` or `1.0`.
    pub fn accepts(&self, source: DataSpec) -> bool {
        *self == source || (*self == DataSpec::F32 && source == DataSpec::Bool)
    }
}

#[derive(Serialize, Deserialize, Reflect, Clone, Copy, Debug, PartialEq, ValueWrapper)]
#[unwrap_error(error(crate::errors::GraphError), variant(MismatchedDataType))]
pub enum DataValue {
    #[trivial_copy]
    F32(f32),
    #[trivial_copy]
    Bool(bool),
    #[trivial_copy]
    Vec3(Vec3),
    #[trivial_copy]
    Quat(Quat),
}

impl DataValue {
    /// Default value for a data port. Pose ports have no value representation.
    pub fn default_from_spec(spec: DataSpec) -> Option<Self> {
        match spec {
            DataSpec::F32 => Some(DataValue::F32(0.)),
            DataSpec::Bool => Some(DataValue::Bool(false)),
            DataSpec::Vec3 => Some(DataValue::Vec3(Vec3::ZERO)),
            DataSpec::Quat => Some(DataValue::Quat(Quat::IDENTITY)),
            DataSpec::Pose => None,
        }
    }

    pub fn spec(&self) -> DataSpec {
        match self {
            DataValue::F32(_) => DataSpec::F32,
            DataValue::Bool(_) => DataSpec::Bool,
            DataValue::Vec3(_) => DataSpec::Vec3,
            DataValue::Quat(_) => DataSpec::Quat,
        }
    }

    /// Reads the value as a number, accepting both floats and booleans.
    pub fn as_number(&self) -> Result<f32, crate::errors::GraphError> {
        match self {
            DataValue::F32(value) => Ok(*value),
            DataValue::Bool(value) => Ok(if *value { 1. } else { 0. }),
            other => Err(crate::errors::GraphError::MismatchedDataType(
                "F32".into(),
                other.type_name().into(),
            )),
        }
    }
}
