//! Derive macro for `strata_core::Populate`
//!
//! `#[derive(Populate)]` on a struct with named fields generates a
//! `populate` implementation that decodes each field from the settings under
//! `<key>.<field>`, with the field name normalized to the dotted keyspace.
//! On a unit-only enum it generates `from_value`, matching the normalized
//! variant name.
//!
//! Field behavior is tuned with `#[setting(...)]`:
//!
//! - `#[setting(ignore)]`: skip the field, use `Default::default()`
//! - `#[setting(optional)]`: not-found becomes `Default::default()`
//! - `#[setting(default = "<expr>")]`: not-found resolves the `${...}`
//!   expression against the same source
//! - `#[setting(key = "name")]`: decode from `name` instead of the field
//!   name

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Error, Field, Fields, LitStr, parse_macro_input, spanned::Spanned};

#[proc_macro_derive(Populate, attributes(setting))]
pub fn derive_populate(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => expand_struct(&input, fields),
            _ => Err(Error::new(
                input.span(),
                "Populate can only be derived for structs with named fields",
            )),
        },
        Data::Enum(data) => expand_enum(&input, data),
        Data::Union(_) => Err(Error::new(
            input.span(),
            "Populate cannot be derived for unions",
        )),
    }
}

#[derive(Default)]
struct FieldSettings {
    ignore: bool,
    optional: bool,
    default: Option<LitStr>,
    key: Option<LitStr>,
}

fn field_settings(field: &Field) -> syn::Result<FieldSettings> {
    let mut settings = FieldSettings::default();

    for attr in &field.attrs {
        if !attr.path().is_ident("setting") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("ignore") {
                settings.ignore = true;
                Ok(())
            } else if meta.path.is_ident("optional") {
                settings.optional = true;
                Ok(())
            } else if meta.path.is_ident("default") {
                settings.default = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("key") {
                settings.key = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("Expected ignore, optional, default, or key"))
            }
        })?;
    }

    if settings.ignore && (settings.optional || settings.default.is_some() || settings.key.is_some())
    {
        return Err(Error::new(
            field.span(),
            "ignore cannot be combined with other setting attributes",
        ));
    }
    if settings.optional && settings.default.is_some() {
        return Err(Error::new(
            field.span(),
            "optional and default are mutually exclusive",
        ));
    }

    Ok(settings)
}

/// Normalize an identifier to the dotted keyspace at expansion time,
/// mirroring the runtime normalization rules
fn normalize(name: &str) -> String {
    name.replace(['-', '_'], ".").to_lowercase()
}

fn expand_struct(input: &DeriveInput, fields: &syn::FieldsNamed) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut initializers = Vec::new();
    for field in &fields.named {
        let ident = field
            .ident
            .as_ref()
            .ok_or_else(|| Error::new(field.span(), "Expected a named field"))?;
        let ty = &field.ty;
        let settings = field_settings(field)?;

        if settings.ignore {
            initializers.push(quote! {
                #ident: ::core::default::Default::default()
            });
            continue;
        }

        let child = match &settings.key {
            Some(key) => normalize(&key.value()),
            None => normalize(&ident.to_string()),
        };

        let decode = if let Some(default) = &settings.default {
            quote! {
                let default_expression = ::strata_core::Expression::parse(#default)
                    .map_err(|e| e.at_path(field_key.clone()))?;
                <#ty as ::strata_core::Populate>::populate_with_default(
                    source,
                    &field_key,
                    ::core::option::Option::Some(&default_expression),
                )
                .map_err(|e| e.at_path(field_key))?
            }
        } else if settings.optional {
            quote! {
                match <#ty as ::strata_core::Populate>::populate(source, &field_key) {
                    ::core::result::Result::Ok(value) => value,
                    ::core::result::Result::Err(e) if e.is_not_found() => {
                        ::core::default::Default::default()
                    }
                    ::core::result::Result::Err(e) => {
                        return ::core::result::Result::Err(e.at_path(field_key));
                    }
                }
            }
        } else {
            quote! {
                <#ty as ::strata_core::Populate>::populate(source, &field_key)
                    .map_err(|e| e.at_path(field_key))?
            }
        };

        initializers.push(quote! {
            #ident: {
                let field_key = ::strata_core::entry::prefix_with_name(key, #child);
                #decode
            }
        });
    }

    Ok(quote! {
        impl #impl_generics ::strata_core::Populate for #name #ty_generics #where_clause {
            fn populate(
                source: &dyn ::strata_core::PopulatorSource,
                key: &str,
            ) -> ::strata_core::Result<Self> {
                let key = &::strata_core::normalize_key(key);
                ::core::result::Result::Ok(Self {
                    #(#initializers,)*
                })
            }
        }
    })
}

fn expand_enum(input: &DeriveInput, data: &syn::DataEnum) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut arms = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(Error::new(
                variant.span(),
                "Populate can only be derived for enums with unit variants",
            ));
        }

        let ident = &variant.ident;
        let normalized = normalize(&ident.to_string());
        arms.push(quote! {
            #normalized => ::core::result::Result::Ok(#name::#ident)
        });
    }

    let type_name = name.to_string();

    Ok(quote! {
        impl #impl_generics ::strata_core::Populate for #name #ty_generics #where_clause {
            fn from_value(
                value: &::strata_core::Value,
            ) -> ::strata_core::Result<Self> {
                match ::strata_core::normalize_key(value.as_str()).as_str() {
                    #(#arms,)*
                    other => ::core::result::Result::Err(
                        ::strata_core::ConfigError::invalid_value(::std::format!(
                            "Unknown {} value {:?}",
                            #type_name,
                            other
                        )),
                    ),
                }
            }
        }
    })
}
