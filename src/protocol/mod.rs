//! Experiment protocols.
//!
//! A protocol is an ordered list of instructions for one chamber. The list
//! itself lives in [`InstructionList`]; anything that owns one can expose the
//! `set` / `measure` / `wait` builder methods by implementing
//! [`InstructionBuilder`].
//!
//! ```
//! use chamberlab::protocol::{Experiment, InstructionBuilder};
//!
//! let mut experiment = Experiment::new("wt-demo-ch4lu", "full");
//! experiment.wait(7_000);
//! experiment.measure(80)?;
//! experiment.set("load_in", 1.0)?;
//! experiment.measure(20)?;
//! assert_eq!(experiment.instructions().len(), 4);
//! # Ok::<(), chamberlab::LabError>(())
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::LabError;

/// A single actuation or measurement step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "instruction", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Instruction {
    /// Set an actuator to a value.
    Set { target: String, value: f64 },
    /// Take `n` measurements, `delay` milliseconds apart.
    Measure { n: u32, delay: u64 },
    /// Wait without measuring.
    Wait { milliseconds: u64 },
}

impl Instruction {
    fn validate(&self) -> Result<(), LabError> {
        match self {
            Instruction::Set { target, value } => {
                if target.trim().is_empty() {
                    return Err(LabError::InvalidInstruction(
                        "SET needs a non-empty target".to_string(),
                    ));
                }
                if !value.is_finite() {
                    return Err(LabError::InvalidInstruction(format!(
                        "SET {target}: value must be finite, got {value}"
                    )));
                }
            }
            Instruction::Measure { n, .. } => {
                if *n == 0 {
                    return Err(LabError::InvalidInstruction(
                        "MEASURE needs n > 0".to_string(),
                    ));
                }
            }
            Instruction::Wait { .. } => {}
        }
        Ok(())
    }
}

/// Ordered, validated instructions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstructionList {
    instructions: Vec<Instruction>,
}

impl InstructionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `instruction` after validating it. Invalid instructions are
    /// not added.
    pub fn push(&mut self, instruction: Instruction) -> Result<(), LabError> {
        instruction.validate()?;
        self.instructions.push(instruction);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.instructions.clear();
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn as_slice(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    pub fn to_json(&self) -> Value {
        json!(self.instructions)
    }
}

impl<'a> IntoIterator for &'a InstructionList {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Builder methods for anything that holds an [`InstructionList`].
pub trait InstructionBuilder {
    fn instruction_list(&self) -> &InstructionList;
    fn instruction_list_mut(&mut self) -> &mut InstructionList;

    fn instructions(&self) -> &[Instruction] {
        self.instruction_list().as_slice()
    }

    fn set(&mut self, target: &str, value: f64) -> Result<&mut Self, LabError>
    where
        Self: Sized,
    {
        self.instruction_list_mut().push(Instruction::Set {
            target: target.to_string(),
            value,
        })?;
        Ok(self)
    }

    fn measure(&mut self, n: u32) -> Result<&mut Self, LabError>
    where
        Self: Sized,
    {
        self.measure_with_delay(n, 0)
    }

    fn measure_with_delay(&mut self, n: u32, delay_ms: u64) -> Result<&mut Self, LabError>
    where
        Self: Sized,
    {
        self.instruction_list_mut()
            .push(Instruction::Measure { n, delay: delay_ms })?;
        Ok(self)
    }

    fn wait(&mut self, milliseconds: u64) -> &mut Self
    where
        Self: Sized,
    {
        self.instruction_list_mut()
            .instructions
            .push(Instruction::Wait { milliseconds });
        self
    }

    fn clear(&mut self) {
        self.instruction_list_mut().clear();
    }
}

/// A protocol to be queued on a chamber.
#[derive(Clone, Debug, PartialEq)]
pub struct Experiment {
    chamber_id: String,
    config: String,
    instructions: InstructionList,
}

impl Experiment {
    pub fn new(chamber_id: impl Into<String>, config: impl Into<String>) -> Self {
        Self {
            chamber_id: chamber_id.into(),
            config: config.into(),
            instructions: InstructionList::new(),
        }
    }

    pub fn chamber_id(&self) -> &str {
        &self.chamber_id
    }

    pub fn config(&self) -> &str {
        &self.config
    }

    /// Request body for `POST experiments`.
    pub fn payload(&self, tag: Option<&str>) -> Result<Value, LabError> {
        if self.instructions.is_empty() {
            return Err(LabError::InvalidInstruction(
                "experiment has no instructions".to_string(),
            ));
        }
        Ok(json!({
            "chamber_id": self.chamber_id,
            "chamber_config": self.config,
            "tag": tag,
            "instructions": self.instructions.to_json(),
        }))
    }
}

impl InstructionBuilder for Experiment {
    fn instruction_list(&self) -> &InstructionList {
        &self.instructions
    }

    fn instruction_list_mut(&mut self) -> &mut InstructionList {
        &mut self.instructions
    }
}
