//! Core types for the PDX serialization format of Geode-compatible caches.
//!
//! [`PdxSerializer`] turns domain objects implementing [`PdxSerializable`]
//! into PDX bytes and back, registering their schemas through a
//! [`TypeRegistry`] backed by a [`TypeService`].

#![warn(missing_docs)]

extern crate self as pdx_core;

pub mod config;
#[cfg(feature = "config-file")]
pub mod config_file;
pub mod error;
pub mod serialization;
pub mod timer;

pub use config::{ConfigError, PdxConfig, PdxConfigBuilder};
#[cfg(feature = "config-file")]
pub use config_file::{load_config, FileConfig};
pub use error::{CollaboratorError, PdxError, Result};
pub use serialization::pdx::{
    EnumInfo, InMemoryTypeService, Mode, PdxFieldCodec, PdxFieldKind, PdxFieldValue, PdxInstance,
    PdxInstanceFactory, PdxReader, PdxSerializable, PdxSerializer, PdxType, PdxUnreadFields,
    PdxValue, PdxWriter, PreservedData, PreservedHandle, TypeRegistry, TypeService,
    WritablePdxInstance,
};
pub use serialization::{
    Cacheable, DataInput, DataOutput, DsCode, ObjectDataInput, ObjectDataOutput,
};

#[cfg(feature = "derive")]
pub use pdx_derive::PdxSerializable;
