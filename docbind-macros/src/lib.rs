//! Procedural macros for the docbind project.
//!
//! Provides `#[derive(Model)]`, which generates the record-to-document
//! translation impl from `#[model(...)]` field tags:
//!
//! - `#[model(id)]` marks the string identifier field (at most one)
//! - `#[model(rename = "name")]` stores the field under `name`
//! - `#[model(skip)]` explicitly excludes the field
//! - `#[model(collection = "name")]` on the struct overrides the collection
//!
//! Untagged fields are excluded from the stored mapping entirely.

#[allow(unused_extern_crates)]
extern crate self as docbind_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Fields, Ident, LitStr, Type, parse_macro_input, spanned::Spanned,
};

/// Derives the `Model` trait from `#[model(...)]` tags.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, Default, Model)]
/// #[model(collection = "users")]
/// pub struct User {
///     #[model(id)]
///     pub id: String,
///     #[model(rename = "name")]
///     pub name: String,
///     pub scratch: u32, // untagged: never stored
/// }
/// ```
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> Result<TokenStream2, syn::Error> {
    let struct_ident = &input.ident;
    let collection = parse_struct_attrs(input)?;

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "Model can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(
            input.span(),
            "Model requires a struct with named fields",
        ));
    };

    let mut id_field: Option<Ident> = None;
    let mut stored: Vec<(Ident, LitStr)> = Vec::new();

    for field in &fields.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new(field.span(), "expected a named field"))?;

        match parse_field_attrs(field)? {
            FieldTag::Untagged | FieldTag::Skip => {}
            FieldTag::Id => {
                if id_field.is_some() {
                    return Err(syn::Error::new(
                        field.span(),
                        "at most one field may carry #[model(id)]",
                    ));
                }
                if !is_string(&field.ty) {
                    return Err(syn::Error::new(
                        field.ty.span(),
                        "#[model(id)] requires a String field",
                    ));
                }
                id_field = Some(ident);
            }
            FieldTag::Rename(name) => stored.push((ident, name)),
        }
    }

    let id_impl = match &id_field {
        Some(ident) => quote! {
            fn id(&self) -> &str {
                &self.#ident
            }

            fn set_id(&mut self, id: ::std::string::String) {
                self.#ident = id;
            }
        },
        None => quote! {
            fn id(&self) -> &str {
                ""
            }

            fn set_id(&mut self, _id: ::std::string::String) {}
        },
    };

    let inserts = stored.iter().map(|(ident, name)| {
        quote! {
            fields.insert(
                #name,
                ::docbind::bson::ser::serialize_to_bson(&self.#ident)?,
            );
        }
    });

    let applies = stored.iter().map(|(ident, name)| {
        quote! {
            if let ::std::option::Option::Some(value) = fields.get(#name) {
                self.#ident = ::docbind::bson::de::deserialize_from_bson(value.clone())?;
            }
        }
    });

    let collection_impl = collection.map(|name| {
        quote! {
            fn collection_name() -> ::std::string::String {
                #name.to_string()
            }
        }
    });

    Ok(quote! {
        impl ::docbind::Model for #struct_ident {
            #id_impl

            fn field_map(&self) -> ::docbind::DbResult<::docbind::bson::Document> {
                let mut fields = ::docbind::bson::Document::new();
                #(#inserts)*
                ::std::result::Result::Ok(fields)
            }

            fn apply_field_map(
                &mut self,
                fields: &::docbind::bson::Document,
            ) -> ::docbind::DbResult<()> {
                #(#applies)*
                ::std::result::Result::Ok(())
            }

            #collection_impl
        }
    })
}

// A field's resolved #[model(...)] tag.
enum FieldTag {
    Untagged,
    Id,
    Rename(LitStr),
    Skip,
}

// Parse the struct-level #[model(collection = "...")] attribute, if any.
fn parse_struct_attrs(input: &DeriveInput) -> Result<Option<LitStr>, syn::Error> {
    let mut collection = None;

    for attr in &input.attrs {
        if !attr.path().is_ident("model") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                collection = Some(meta.value()?.parse::<LitStr>()?);
                Ok(())
            } else {
                Err(meta.error("unknown struct-level model attribute, expected `collection`"))
            }
        })?;
    }

    Ok(collection)
}

// Parse a field's #[model(...)] attribute into a single tag.
fn parse_field_attrs(field: &syn::Field) -> Result<FieldTag, syn::Error> {
    let mut tag = FieldTag::Untagged;

    for attr in &field.attrs {
        if !attr.path().is_ident("model") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let next = if meta.path.is_ident("id") {
                FieldTag::Id
            } else if meta.path.is_ident("skip") {
                FieldTag::Skip
            } else if meta.path.is_ident("rename") {
                FieldTag::Rename(meta.value()?.parse::<LitStr>()?)
            } else {
                return Err(meta.error(
                    "unknown model attribute, expected `id`, `rename`, or `skip`",
                ));
            };

            if !matches!(tag, FieldTag::Untagged) {
                return Err(meta.error("conflicting model attributes on one field"));
            }
            tag = next;
            Ok(())
        })?;
    }

    Ok(tag)
}

// Recognize String by the last path segment; aliases are on the caller.
fn is_string(ty: &Type) -> bool {
    let Type::Path(type_path) = ty else {
        return false;
    };
    type_path
        .path
        .segments
        .last()
        .is_some_and(|segment| segment.ident == "String")
}
