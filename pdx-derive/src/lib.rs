//! Derive macro for PDX serialization.
//!
//! [`PdxSerializable`] generates a `pdx_core::PdxSerializable` implementation
//! that writes every named field through `pdx_core::PdxFieldCodec`, in
//! declaration order.
//!
//! # Example
//!
//! ```ignore
//! use pdx_core::{PdxSerializable, PreservedHandle};
//!
//! #[derive(Default, PdxSerializable)]
//! #[pdx(class_name = "com.example.Person")]
//! struct Person {
//!     #[pdx(identity)]
//!     id: i64,
//!     name: Option<String>,
//!     #[pdx(field_name = "emailAddress")]
//!     email: Option<String>,
//!     #[pdx(preserved)]
//!     unread: Option<PreservedHandle>,
//! }
//! ```

extern crate proc_macro;

mod pdx;

use proc_macro::TokenStream;

/// Derives the `PdxSerializable` trait for a struct.
///
/// # Attributes
///
/// ## Struct-level
/// - `#[pdx(class_name = "...")]` sets the class name JVM peers see
///   (defaults to the Rust struct name).
///
/// ## Field-level
/// - `#[pdx(field_name = "...")]` overrides the wire field name.
/// - `#[pdx(skip)]` leaves the field out of the PDX object.
/// - `#[pdx(identity)]` marks the field as part of the object's identity.
/// - `#[pdx(preserved)]` on an `Option<PreservedHandle>` field keeps fields
///   written by other versions of the class across a read and write.
///
/// # Supported Field Types
///
/// Every type implementing `PdxFieldCodec`: `bool`, `i8`, `u16` (char),
/// `i16`, `i32`, `i64`, `f32`, `f64`, `String`, `Option<String>`,
/// `Option<i64>` (date), `Cacheable`, and `Vec<T>` / `Option<Vec<T>>` of
/// those element types.
#[proc_macro_derive(PdxSerializable, attributes(pdx))]
pub fn derive_pdx(input: TokenStream) -> TokenStream {
    pdx::derive_pdx_impl(input)
}
