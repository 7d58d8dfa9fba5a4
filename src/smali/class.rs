//! This module contains the representation of a class within the executable
//! being analyzed.

use serde::{Deserialize, Serialize};

use crate::smali::method::DexMethod;

/// A static or instance field declared by a class.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DexField {
    /// The name of the field.
    pub name: String,

    /// The type descriptor of the field.
    pub descriptor: String,

    /// Whether the field is static.
    pub is_static: bool,
}

/// A class from the executable being analyzed, with its declared fields and
/// methods.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DexClass {
    /// The type descriptor of the class, such as `Lcom/app/Main;`.
    pub name: String,

    /// The type descriptor of the direct superclass.
    #[serde(default = "object_descriptor")]
    pub super_class: String,

    /// The fields declared by the class.
    #[serde(default)]
    pub fields: Vec<DexField>,

    /// The methods declared by the class.
    #[serde(default)]
    pub methods: Vec<DexMethod>,
}

fn object_descriptor() -> String {
    crate::constant::OBJECT_TYPE_DESCRIPTOR.to_string()
}
