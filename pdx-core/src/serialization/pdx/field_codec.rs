//! Maps Rust field types onto PDX field kinds.
//!
//! `#[derive(PdxSerializable)]` writes and reads every field through this
//! trait, so supporting a new field type means implementing it here.

use super::reader::PdxReader;
use super::writer::PdxWriter;
use crate::error::Result;
use crate::serialization::cacheable::Cacheable;

/// A Rust type that is stored as one PDX field.
pub trait PdxFieldCodec: Sized {
    /// Writes `self` as field `name`.
    fn write_pdx_field(&self, writer: &mut PdxWriter<'_>, name: &str) -> Result<()>;

    /// Reads field `name`.
    fn read_pdx_field(reader: &mut PdxReader<'_>, name: &str) -> Result<Self>;
}

macro_rules! scalar_codec {
    ($($ty:ty => $write:ident, $read:ident;)*) => {
        $(
            impl PdxFieldCodec for $ty {
                fn write_pdx_field(&self, writer: &mut PdxWriter<'_>, name: &str) -> Result<()> {
                    writer.$write(name, *self)
                }

                fn read_pdx_field(reader: &mut PdxReader<'_>, name: &str) -> Result<Self> {
                    reader.$read(name)
                }
            }
        )*
    };
}

scalar_codec! {
    bool => write_bool, read_bool;
    i8 => write_byte, read_byte;
    u16 => write_char, read_char;
    i16 => write_short, read_short;
    i32 => write_int, read_int;
    i64 => write_long, read_long;
    f32 => write_float, read_float;
    f64 => write_double, read_double;
}

macro_rules! array_codec {
    ($($ty:ty => $write:ident, $read:ident;)*) => {
        $(
            impl PdxFieldCodec for Option<Vec<$ty>> {
                fn write_pdx_field(&self, writer: &mut PdxWriter<'_>, name: &str) -> Result<()> {
                    writer.$write(name, self.as_deref())
                }

                fn read_pdx_field(reader: &mut PdxReader<'_>, name: &str) -> Result<Self> {
                    reader.$read(name)
                }
            }

            /// A null array reads as empty.
            impl PdxFieldCodec for Vec<$ty> {
                fn write_pdx_field(&self, writer: &mut PdxWriter<'_>, name: &str) -> Result<()> {
                    writer.$write(name, Some(self.as_slice()))
                }

                fn read_pdx_field(reader: &mut PdxReader<'_>, name: &str) -> Result<Self> {
                    Ok(reader.$read(name)?.unwrap_or_default())
                }
            }
        )*
    };
}

array_codec! {
    bool => write_bool_array, read_bool_array;
    u16 => write_char_array, read_char_array;
    i8 => write_byte_array, read_byte_array;
    i16 => write_short_array, read_short_array;
    i32 => write_int_array, read_int_array;
    i64 => write_long_array, read_long_array;
    f32 => write_float_array, read_float_array;
    f64 => write_double_array, read_double_array;
    Option<String> => write_string_array, read_string_array;
    Cacheable => write_object_array, read_object_array;
    Option<Vec<i8>> => write_array_of_byte_arrays, read_array_of_byte_arrays;
}

impl PdxFieldCodec for String {
    fn write_pdx_field(&self, writer: &mut PdxWriter<'_>, name: &str) -> Result<()> {
        writer.write_string(name, Some(self.as_str()))
    }

    fn read_pdx_field(reader: &mut PdxReader<'_>, name: &str) -> Result<Self> {
        Ok(reader.read_string(name)?.unwrap_or_default())
    }
}

impl PdxFieldCodec for Option<String> {
    fn write_pdx_field(&self, writer: &mut PdxWriter<'_>, name: &str) -> Result<()> {
        writer.write_string(name, self.as_deref())
    }

    fn read_pdx_field(reader: &mut PdxReader<'_>, name: &str) -> Result<Self> {
        reader.read_string(name)
    }
}

/// Dates are epoch milliseconds.
impl PdxFieldCodec for Option<i64> {
    fn write_pdx_field(&self, writer: &mut PdxWriter<'_>, name: &str) -> Result<()> {
        writer.write_date(name, *self)
    }

    fn read_pdx_field(reader: &mut PdxReader<'_>, name: &str) -> Result<Self> {
        reader.read_date(name)
    }
}

impl PdxFieldCodec for Cacheable {
    fn write_pdx_field(&self, writer: &mut PdxWriter<'_>, name: &str) -> Result<()> {
        writer.write_object(name, self)
    }

    fn read_pdx_field(reader: &mut PdxReader<'_>, name: &str) -> Result<Self> {
        reader.read_object(name)
    }
}
