//! This module contains the representation of a single Dalvik method: its
//! signature, its register frame, its instruction stream, and its try/catch
//! regions.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{
    error::load,
    smali::instruction::Instruction,
};

/// The fully-qualified signature of a Dalvik method, such as
/// `Lcom/app/Main;->decode(Ljava/lang/String;I)Ljava/lang/String;`.
///
/// Signatures are the identity of a method throughout the engine: the class
/// manager indexes by them, the driver tracks call depth with them, and the
/// launcher's include/exclude filters match against their rendered form.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct MethodSignature {
    /// The descriptor of the class that declares the method.
    pub class: String,

    /// The name of the method within its class.
    pub name: String,

    /// The type descriptors of the declared parameters, in order.
    pub parameters: Vec<String>,

    /// The type descriptor of the return type.
    pub return_type: String,
}

impl MethodSignature {
    /// Constructs a new signature from its parts.
    #[must_use]
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        parameters: Vec<String>,
        return_type: impl Into<String>,
    ) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            parameters,
            return_type: return_type.into(),
        }
    }

    /// Parses a rendered signature of the form
    /// `Lclass;->name(parameters)return`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the input does not follow the rendered signature
    /// grammar.
    pub fn parse(rendered: &str) -> load::Result<Self> {
        let malformed = || load::Error::MalformedSignature {
            signature: rendered.to_string(),
        };

        let (class, rest) = rendered.split_once("->").ok_or_else(malformed)?;
        let open = rest.find('(').ok_or_else(malformed)?;
        let close = rest.find(')').ok_or_else(malformed)?;
        if close < open || close + 1 >= rest.len() {
            return Err(malformed());
        }

        let name = &rest[..open];
        let parameters = parse_parameter_list(&rest[open + 1..close]).ok_or_else(malformed)?;
        let return_type = &rest[close + 1..];
        if name.is_empty() || return_type.is_empty() || class.is_empty() {
            return Err(malformed());
        }

        Ok(Self::new(class, name, parameters, return_type))
    }

    /// Gets the number of register slots the declared parameters occupy.
    ///
    /// Wide primitives (`J` and `D`) occupy a register pair; every other
    /// parameter occupies a single register.
    #[must_use]
    pub fn parameter_slots(&self) -> usize {
        self.parameters.iter().map(|p| descriptor_width(p)).sum()
    }

    /// Checks whether this signature names a class's static initializer.
    #[must_use]
    pub fn is_class_initializer(&self) -> bool {
        self.name == "<clinit>" && self.parameters.is_empty() && self.return_type == "V"
    }
}

/// Renders the signature in the smali form the rest of the toolchain expects.
impl Display for MethodSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}->{}({}){}",
            self.class,
            self.name,
            self.parameters.join(""),
            self.return_type
        )
    }
}

/// Splits a concatenated parameter descriptor list such as
/// `I[Ljava/lang/String;J` into its individual descriptors.
///
/// Returns [`None`] if the list is not a valid sequence of descriptors.
fn parse_parameter_list(mut list: &str) -> Option<Vec<String>> {
    let mut parameters = Vec::new();
    while !list.is_empty() {
        let length = descriptor_length(list)?;
        parameters.push(list[..length].to_string());
        list = &list[length..];
    }

    Some(parameters)
}

/// Gets the length in characters of the first descriptor in `text`, or
/// [`None`] if `text` does not start with a valid descriptor.
fn descriptor_length(text: &str) -> Option<usize> {
    let mut chars = text.char_indices();
    loop {
        let (index, c) = chars.next()?;
        match c {
            'Z' | 'B' | 'S' | 'C' | 'I' | 'J' | 'F' | 'D' => return Some(index + 1),
            '[' => continue,
            'L' => {
                let semicolon = text[index..].find(';')?;
                return Some(index + semicolon + 1);
            }
            _ => return None,
        }
    }
}

/// Gets the number of register slots a value of the described type occupies.
#[must_use]
pub fn descriptor_width(descriptor: &str) -> usize {
    match descriptor {
        "J" | "D" => 2,
        _ => 1,
    }
}

/// A single catch handler within a try region.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CatchHandler {
    /// The descriptor of the exception class this handler catches, or
    /// [`None`] for a catch-all handler.
    pub exception: Option<String>,

    /// The instruction address of the handler's first instruction.
    pub target: usize,
}

/// A try region covering a half-open range of instruction addresses, with the
/// handlers that protect it.
///
/// Handlers are consulted in declaration order; the first whose exception
/// type matches (or which is a catch-all) receives control.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TryBlock {
    /// The first instruction address covered by the region.
    pub start: usize,

    /// The first instruction address past the end of the region.
    pub end: usize,

    /// The handlers protecting the region, in declaration order.
    pub handlers: Vec<CatchHandler>,
}

impl TryBlock {
    /// Checks whether the region covers the instruction at `address`.
    #[must_use]
    pub fn covers(&self, address: usize) -> bool {
        self.start <= address && address < self.end
    }
}

/// A Dalvik method: signature, register frame size, instruction stream, and
/// try/catch regions.
///
/// # Register Layout
///
/// Dalvik places a method's parameters in the _highest_ registers of its
/// frame: a method with `registers = 5` and two single-width parameters
/// receives them in `v3` and `v4`. Instance methods additionally receive the
/// `this` reference immediately before the declared parameters.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DexMethod {
    /// The fully-qualified signature of the method.
    pub signature: MethodSignature,

    /// The total number of registers in the method's frame.
    pub registers: usize,

    /// Whether the method is static (and therefore receives no `this`).
    pub is_static: bool,

    /// The method's instruction stream. Branch targets are indices into this
    /// sequence.
    pub instructions: Vec<Instruction>,

    /// The method's try/catch regions.
    #[serde(default)]
    pub try_blocks: Vec<TryBlock>,
}

impl DexMethod {
    /// Gets the number of register slots occupied by the method's inputs,
    /// including the implicit `this` reference for instance methods.
    #[must_use]
    pub fn input_slots(&self) -> usize {
        let this_slot = usize::from(!self.is_static);
        this_slot + self.signature.parameter_slots()
    }

    /// Gets the first register that holds a method input.
    ///
    /// For a method with no inputs this returns the frame size itself.
    #[must_use]
    pub fn first_input_register(&self) -> usize {
        self.registers - self.input_slots()
    }

    /// Gets the catch target for an exception of class `kind` raised at
    /// `address`, if any handler covers that address and catches that kind.
    ///
    /// The innermost (first declared) covering region wins, and within a
    /// region the first matching handler wins, matching the runtime's
    /// resolution order.
    #[must_use]
    pub fn catch_target(&self, address: usize, kind: &str) -> Option<usize> {
        self.try_blocks
            .iter()
            .filter(|block| block.covers(address))
            .flat_map(|block| block.handlers.iter())
            .find(|handler| match &handler.exception {
                Some(caught) => caught == kind,
                None => true,
            })
            .map(|handler| handler.target)
    }

    /// Gets every handler protecting `address`, as pairs of the caught
    /// exception descriptor ([`None`] for catch-all) and the handler target.
    #[must_use]
    pub fn covering_handlers(&self, address: usize) -> Vec<(Option<&str>, usize)> {
        self.try_blocks
            .iter()
            .filter(|block| block.covers(address))
            .flat_map(|block| block.handlers.iter())
            .map(|handler| (handler.exception.as_deref(), handler.target))
            .collect()
    }

    /// Validates that every register and branch target named by the method's
    /// code is within bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] describing the first violation found.
    pub fn validate(&self) -> load::Result<()> {
        if self.input_slots() > self.registers {
            return Err(load::Error::FrameTooSmall {
                signature: self.signature.to_string(),
                registers: self.registers,
                inputs: self.input_slots(),
            });
        }

        let available = self.instructions.len();
        for instruction in &self.instructions {
            let mut named = instruction.registers_read();
            if let Some((register, wide)) = instruction.register_written() {
                named.push(register);
                if wide {
                    named.push(register + 1);
                }
            }
            for register in named {
                if register as usize >= self.registers {
                    return Err(load::Error::RegisterOutOfRange {
                        signature: self.signature.to_string(),
                        registers: self.registers,
                        register: register as usize,
                    });
                }
            }
        }

        let targets = self
            .instructions
            .iter()
            .flat_map(Instruction::branch_targets)
            .chain(self.try_blocks.iter().flat_map(|block| {
                block.handlers.iter().map(|handler| handler.target)
            }));
        for target in targets {
            if target >= available {
                return Err(load::Error::BranchTargetOutOfRange {
                    signature: self.signature.to_string(),
                    target,
                    available,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::smali::method::MethodSignature;

    #[test]
    fn can_parse_rendered_signature() -> anyhow::Result<()> {
        let signature =
            MethodSignature::parse("Lcom/app/Main;->decode(Ljava/lang/String;I)Ljava/lang/String;")?;

        assert_eq!(signature.class, "Lcom/app/Main;");
        assert_eq!(signature.name, "decode");
        assert_eq!(signature.parameters, vec!["Ljava/lang/String;", "I"]);
        assert_eq!(signature.return_type, "Ljava/lang/String;");

        Ok(())
    }

    #[test]
    fn renders_round_trip() -> anyhow::Result<()> {
        let rendered = "Lcom/app/A;->f([IJ)V";
        let signature = MethodSignature::parse(rendered)?;

        assert_eq!(signature.to_string(), rendered);

        Ok(())
    }

    #[test]
    fn wide_parameters_occupy_two_slots() -> anyhow::Result<()> {
        let signature = MethodSignature::parse("Lcom/app/A;->f(JID)V")?;

        assert_eq!(signature.parameter_slots(), 5);

        Ok(())
    }

    #[test]
    fn rejects_malformed_signatures() {
        assert!(MethodSignature::parse("not a signature").is_err());
        assert!(MethodSignature::parse("Lcom/app/A;->f(Q)V").is_err());
        assert!(MethodSignature::parse("Lcom/app/A;->f(I)").is_err());
    }

    #[test]
    fn recognises_class_initializer() -> anyhow::Result<()> {
        let signature = MethodSignature::parse("Lcom/app/A;-><clinit>()V")?;
        assert!(signature.is_class_initializer());

        Ok(())
    }
}
