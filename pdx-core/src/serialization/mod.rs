//! Serialization framework for the Geode data serialization format.

mod buffer_pool;
mod cacheable;
mod data_input;
mod data_output;
mod ds_code;
pub mod java_hash;
pub mod modified_utf8;
pub mod pdx;

pub use buffer_pool::{HIGH_WATER_MARK, INITIAL_BUFFER_SIZE, MAX_BUFFER_SIZE};
pub use cacheable::Cacheable;
pub use data_input::{DataInput, ObjectDataInput};
pub use data_output::{DataOutput, ObjectDataOutput};
pub use ds_code::DsCode;
