//! This module contains the in-memory model of the executable being analyzed:
//! classes, methods, instructions, and the [`ClassManager`] that owns them.
//!
//! # The Binary-Format Boundary
//!
//! Parsing a binary `.dex` (or the APK that wraps one) into this model, and
//! assembling the model back into one, is the job of a binary-format library
//! and is deliberately outside this crate. The model itself serializes with
//! `serde`, which gives the tool a complete load/rewrite/store path and gives
//! the tests a convenient way to describe inputs.

pub mod builder;
pub mod class;
pub mod instruction;
pub mod method;

use std::{collections::BTreeSet, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::load,
    smali::{builder::MethodBuilder, class::DexClass, method::{DexMethod, MethodSignature}},
};

/// The serialized envelope for a set of classes: what the binary-format
/// collaborator hands over after parsing, and what it receives back for
/// emission.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DexModel {
    /// The Android API level the output should target.
    #[serde(default = "default_api_level")]
    pub api_level: u32,

    /// The classes of the executable.
    pub classes: Vec<DexClass>,
}

fn default_api_level() -> u32 {
    15
}

/// The class manager owns the model of the executable for the lifetime of a
/// run and mediates every access to it.
///
/// Method code is mutated only through [`ClassManager::method_mut`], and each
/// mutation is recorded so that callers holding derived state (such as the
/// virtual machine's class-state cache) can invalidate it.
#[derive(Debug)]
pub struct ClassManager {
    /// The API level of the eventual output.
    api_level: u32,

    /// The classes of the executable, in model order.
    classes: Vec<DexClass>,

    /// The signatures of methods whose code has been rewritten.
    mutated_methods: BTreeSet<MethodSignature>,
}

impl ClassManager {
    /// Constructs a class manager over the provided `model`, validating every
    /// method's registers and branch targets.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] describing the first malformed method found.
    pub fn new(model: DexModel) -> load::Result<Self> {
        for class in &model.classes {
            for method in &class.methods {
                method.validate()?;
            }
        }

        Ok(Self {
            api_level: model.api_level,
            classes: model.classes,
            mutated_methods: BTreeSet::new(),
        })
    }

    /// Loads a class manager from the serialized model at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the file cannot be read or does not contain a valid
    /// model.
    pub fn from_path(path: &Path) -> load::Result<Self> {
        let rendered_path = path.display().to_string();
        let contents = fs::read_to_string(path).map_err(|source| load::Error::UnreadableInput {
            path: rendered_path.clone(),
            source,
        })?;
        let model: DexModel =
            serde_json::from_str(&contents).map_err(|source| load::Error::MalformedModel {
                path: rendered_path,
                source,
            })?;

        Self::new(model)
    }

    /// Writes the current state of the model to `path`, overriding the
    /// model's API level with `api_level` when provided.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the file cannot be written.
    pub fn write_to(&self, path: &Path, api_level: Option<u32>) -> load::Result<()> {
        let model = DexModel {
            api_level: api_level.unwrap_or(self.api_level),
            classes: self.classes.clone(),
        };
        let rendered = serde_json::to_string_pretty(&model)
            .expect("The class model always serializes");
        fs::write(path, rendered).map_err(|source| load::Error::UnwritableOutput {
            path: path.display().to_string(),
            source,
        })
    }

    /// Gets the names of every class in the executable, in model order.
    #[must_use]
    pub fn class_names(&self) -> Vec<String> {
        self.classes.iter().map(|class| class.name.clone()).collect()
    }

    /// Checks whether a class named `name` is present in the executable.
    ///
    /// Classes present here are "local": the engine may execute their code
    /// rather than treating them as opaque framework types.
    #[must_use]
    pub fn is_local_class(&self, name: &str) -> bool {
        self.class(name).is_some()
    }

    /// Gets the class named `name`, if present.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&DexClass> {
        self.classes.iter().find(|class| class.name == name)
    }

    /// Gets the method with the provided `signature`, if present.
    #[must_use]
    pub fn method(&self, signature: &MethodSignature) -> Option<&DexMethod> {
        self.class(&signature.class)?
            .methods
            .iter()
            .find(|method| &method.signature == signature)
    }

    /// Gets a fresh mutable builder view of the method with the provided
    /// `signature`, recording that its code is being rewritten.
    #[must_use]
    pub fn method_mut(&mut self, signature: &MethodSignature) -> Option<MethodBuilder<'_>> {
        self.mutated_methods.insert(signature.clone());
        let class = self
            .classes
            .iter_mut()
            .find(|class| class.name == signature.class)?;
        let method = class
            .methods
            .iter_mut()
            .find(|method| &method.signature == signature)?;

        Some(MethodBuilder::new(method))
    }

    /// Checks whether the method with the provided `signature` has had its
    /// code rewritten during this run.
    #[must_use]
    pub fn is_mutated(&self, signature: &MethodSignature) -> bool {
        self.mutated_methods.contains(signature)
    }

    /// Gets the API level the output will target.
    #[must_use]
    pub fn api_level(&self) -> u32 {
        self.api_level
    }
}

#[cfg(test)]
mod test {
    use crate::smali::{
        class::DexClass,
        instruction::Instruction,
        method::{DexMethod, MethodSignature},
        ClassManager,
        DexModel,
    };

    fn single_method_model(instructions: Vec<Instruction>) -> DexModel {
        DexModel {
            api_level: 15,
            classes: vec![DexClass {
                name: "Lcom/app/A;".into(),
                super_class: "Ljava/lang/Object;".into(),
                fields: vec![],
                methods: vec![DexMethod {
                    signature: MethodSignature::new("Lcom/app/A;", "f", vec![], "V"),
                    registers: 1,
                    is_static: true,
                    instructions,
                    try_blocks: vec![],
                }],
            }],
        }
    }

    #[test]
    fn validates_methods_at_construction() {
        let model = single_method_model(vec![Instruction::Goto { target: 9 }]);
        assert!(ClassManager::new(model).is_err());

        let model = single_method_model(vec![Instruction::ReturnVoid]);
        assert!(ClassManager::new(model).is_ok());
    }

    #[test]
    fn records_method_mutation() -> anyhow::Result<()> {
        let model = single_method_model(vec![Instruction::ReturnVoid]);
        let mut manager = ClassManager::new(model)?;
        let signature = MethodSignature::new("Lcom/app/A;", "f", vec![], "V");

        assert!(!manager.is_mutated(&signature));
        let _ = manager.method_mut(&signature);
        assert!(manager.is_mutated(&signature));

        Ok(())
    }
}
