//! Derive macro implementation for `PdxSerializable`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, LitStr};

#[derive(Default)]
struct FieldAttrs {
    field_name: Option<String>,
    skip: bool,
    identity: bool,
    preserved: bool,
}

pub fn derive_pdx_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let class_name = parse_class_name(&input.attrs)?.unwrap_or_else(|| name.to_string());

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "PdxSerializable only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "PdxSerializable can only be derived for structs",
            ))
        }
    };

    let mut write_stmts = Vec::new();
    let mut read_stmts = Vec::new();
    let mut identity_fields = Vec::new();
    let mut preserved_field = None;

    for field in fields {
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        let field_ty = &field.ty;
        let attrs = parse_field_attrs(&field.attrs)?;

        if attrs.preserved {
            if preserved_field.is_some() {
                return Err(syn::Error::new_spanned(
                    field_ident,
                    "only one field may be marked #[pdx(preserved)]",
                ));
            }
            preserved_field = Some(field_ident.clone());
            continue;
        }
        if attrs.skip {
            continue;
        }

        let wire_name = attrs
            .field_name
            .unwrap_or_else(|| field_ident.to_string());
        write_stmts.push(quote! {
            ::pdx_core::PdxFieldCodec::write_pdx_field(&self.#field_ident, writer, #wire_name)?;
        });
        read_stmts.push(quote! {
            self.#field_ident =
                <#field_ty as ::pdx_core::PdxFieldCodec>::read_pdx_field(reader, #wire_name)?;
        });
        if attrs.identity {
            identity_fields.push(wire_name);
        }
    }

    let handle_methods = preserved_field.map(|field| {
        quote! {
            fn preserved_handle(&self) -> ::core::option::Option<::pdx_core::PreservedHandle> {
                self.#field
            }

            fn set_preserved_handle(&mut self, handle: ::pdx_core::PreservedHandle) {
                self.#field = ::core::option::Option::Some(handle);
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::pdx_core::PdxSerializable for #name #ty_generics #where_clause {
            fn class_name(&self) -> &str {
                #class_name
            }

            fn to_data(&self, writer: &mut ::pdx_core::PdxWriter<'_>) -> ::pdx_core::Result<()> {
                #(#write_stmts)*
                #(writer.mark_identity_field(#identity_fields)?;)*
                Ok(())
            }

            fn from_data(&mut self, reader: &mut ::pdx_core::PdxReader<'_>) -> ::pdx_core::Result<()> {
                #(#read_stmts)*
                Ok(())
            }

            #handle_methods
        }
    })
}

fn parse_class_name(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut class_name = None;
    for attr in attrs {
        if !attr.path().is_ident("pdx") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("class_name") {
                let lit: LitStr = meta.value()?.parse()?;
                class_name = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unsupported pdx attribute, expected `class_name`"))
            }
        })?;
    }
    Ok(class_name)
}

fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut parsed = FieldAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("pdx") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("field_name") {
                let lit: LitStr = meta.value()?.parse()?;
                parsed.field_name = Some(lit.value());
            } else if meta.path.is_ident("skip") {
                parsed.skip = true;
            } else if meta.path.is_ident("identity") {
                parsed.identity = true;
            } else if meta.path.is_ident("preserved") {
                parsed.preserved = true;
            } else {
                return Err(meta.error(
                    "unsupported pdx attribute, expected `field_name`, `skip`, `identity` or `preserved`",
                ));
            }
            Ok(())
        })?;
    }
    Ok(parsed)
}
