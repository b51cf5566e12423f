//! Enum constants interned through the type registry.

use crate::error::{PdxError, Result};
use crate::serialization::{DataInput, DataOutput, DsCode, ObjectDataInput, ObjectDataOutput};

/// Identifies one constant of an enum class across the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnumInfo {
    enum_class_name: String,
    enum_name: String,
    ordinal: i32,
}

impl EnumInfo {
    /// Creates an enum descriptor.
    pub fn new(enum_class_name: impl Into<String>, enum_name: impl Into<String>, ordinal: i32) -> Self {
        Self {
            enum_class_name: enum_class_name.into(),
            enum_name: enum_name.into(),
            ordinal,
        }
    }

    /// Fully-qualified enum class name.
    pub fn enum_class_name(&self) -> &str {
        &self.enum_class_name
    }

    /// Constant name.
    pub fn enum_name(&self) -> &str {
        &self.enum_name
    }

    /// Constant ordinal.
    pub fn ordinal(&self) -> i32 {
        self.ordinal
    }

    /// Writes the descriptor as a DataSerializable payload.
    pub fn to_data(&self, output: &mut ObjectDataOutput) -> Result<()> {
        output.write_byte(DsCode::DataSerializable.as_byte())?;
        output.write_string(Some(&self.enum_class_name))?;
        output.write_string(Some(&self.enum_name))?;
        output.write_int(self.ordinal)
    }

    /// Reads a descriptor written by [`to_data`](Self::to_data).
    pub fn from_data(input: &mut ObjectDataInput<'_>) -> Result<Self> {
        let code = DsCode::from_u8(input.read_u8()?)?;
        if code != DsCode::DataSerializable {
            return Err(PdxError::ProtocolViolation(format!(
                "expected an enum descriptor, found DSCode {:?}",
                code
            )));
        }
        let class_name = input.read_string()?;
        let name = input.read_string()?;
        let ordinal = input.read_int()?;
        match (class_name, name) {
            (Some(class_name), Some(name)) => Ok(Self::new(class_name, name, ordinal)),
            _ => Err(PdxError::Serialization(
                "enum descriptor with null name".to_string(),
            )),
        }
    }
}
