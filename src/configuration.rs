//! This module contains the safety configuration: which classes belong to the
//! framework, and which framework classes and methods the engine may actually
//! evaluate during abstract interpretation.

use std::collections::BTreeSet;

use crate::{emulate, smali::method::MethodSignature};

/// The namespace prefixes that mark a class as belonging to the framework
/// rather than to the application under analysis.
const FRAMEWORK_PREFIXES: &[&str] = &[
    "Ljava/",
    "Ljavax/",
    "Landroid/",
    "Landroidx/",
    "Ldalvik/",
    "Lorg/apache/",
    "Lorg/json/",
    "Lorg/w3c/",
    "Lorg/xml/",
    "Ljunit/",
    "Lkotlin/",
];

/// The framework classes whose construction and static access carry no
/// observable side effects.
const DEFAULT_SAFE_CLASSES: &[&str] = &[
    "Ljava/lang/Boolean;",
    "Ljava/lang/Byte;",
    "Ljava/lang/Character;",
    "Ljava/lang/Double;",
    "Ljava/lang/Float;",
    "Ljava/lang/Integer;",
    "Ljava/lang/Long;",
    "Ljava/lang/Math;",
    "Ljava/lang/Short;",
    "Ljava/lang/String;",
    "Ljava/lang/StringBuilder;",
];

/// The predicates that decide what the engine may execute for real and what
/// it must treat as opaque.
///
/// "Safe" means the real semantics are pure enough to evaluate during
/// analysis: constructing the class, reading its statics, or calling one of
/// its emulated methods cannot perturb anything observable. The conservative
/// default for everything else is [`crate::vm::side_effect::Level::Strong`].
#[derive(Clone, Debug)]
pub struct Configuration {
    /// The classes declared safe to construct and read.
    safe_classes: BTreeSet<String>,
}

impl Configuration {
    /// Constructs the default configuration.
    #[must_use]
    pub fn new() -> Self {
        let safe_classes = DEFAULT_SAFE_CLASSES.iter().map(|name| (*name).to_string()).collect();
        Self { safe_classes }
    }

    /// Declares an additional class safe to construct and read.
    #[must_use]
    pub fn with_safe_class(mut self, name: impl Into<String>) -> Self {
        self.safe_classes.insert(name.into());
        self
    }

    /// Checks whether the class named `name` belongs to the framework.
    ///
    /// The Android support library is not framework: it ships inside the
    /// application and is therefore analyzable (though skipped by default at
    /// the launcher level).
    #[must_use]
    pub fn is_framework_class(&self, name: &str) -> bool {
        if name.starts_with("Landroid/support/") {
            return false;
        }
        FRAMEWORK_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
    }

    /// Checks whether the class named `name` is safe to construct and read.
    #[must_use]
    pub fn is_safe_class(&self, name: &str) -> bool {
        self.safe_classes.contains(name)
    }

    /// Checks whether the method with the provided `signature` is safe to
    /// evaluate directly, i.e. whether the engine carries an emulation of it.
    #[must_use]
    pub fn is_safe_method(&self, signature: &MethodSignature) -> bool {
        emulate::is_emulated(signature)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use crate::{configuration::Configuration, smali::method::MethodSignature};

    #[test]
    fn framework_prefixes_are_recognised() {
        let configuration = Configuration::new();

        assert!(configuration.is_framework_class("Ljava/lang/String;"));
        assert!(configuration.is_framework_class("Landroid/os/Bundle;"));
        assert!(!configuration.is_framework_class("Lcom/app/Main;"));
    }

    #[test]
    fn emulated_methods_are_safe() {
        let configuration = Configuration::new();
        let length = MethodSignature::parse("Ljava/lang/String;->length()I").unwrap();
        let exit = MethodSignature::parse("Ljava/lang/System;->exit(I)V").unwrap();

        assert!(configuration.is_safe_method(&length));
        assert!(!configuration.is_safe_method(&exit));
    }

    #[test]
    fn additional_safe_classes_can_be_declared() {
        let configuration = Configuration::new().with_safe_class("Lcom/app/Pure;");
        assert!(configuration.is_safe_class("Lcom/app/Pure;"));
    }
}
