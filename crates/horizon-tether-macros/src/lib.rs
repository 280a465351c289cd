//! Procedural macros for Horizon Tether.
//!
//! This crate provides the `#[derive(Bindable)]` macro, which turns a plain
//! struct with [`Property`] fields into a property host that bindings and
//! collection views can read, write and observe by name.
//!
//! # Attributes
//!
//! ## `#[property]`
//!
//! Marks a field as a named property:
//!
//! ```ignore
//! #[derive(Bindable)]
//! struct Node {
//!     #[property(name = "Value")]
//!     value: Property<String>,
//!
//!     #[property(name = "Other")]
//!     other: Property<Option<ObjectRef>>,
//!
//!     #[property(read_only)]
//!     id: Property<i64>,
//!
//!     #[notify]
//!     notifier: PropertyChangedNotifier,
//! }
//! ```
//!
//! Property attributes:
//! - `name = "Name"`: The name used for named access (defaults to the field name)
//! - `read_only`: Named writes are rejected; the generated Rust setter still works
//!
//! Property fields are usually `Property<T>`. A plain field is accepted only
//! together with `read_only`, since named writes need interior mutability.
//!
//! ## `#[notify]`
//!
//! Marks the `PropertyChangedNotifier` field. With it the struct implements
//! `NotifyPropertyChanged` and every generated setter announces changes;
//! without it the host reports no changes.
//!
//! ## `#[bindable]`
//!
//! Struct-level configuration:
//!
//! ```ignore
//! #[derive(Bindable)]
//! #[bindable(type_name = "Customer")]  // Name reported by `PropertyHost::type_name`
//! struct CustomerRecord {
//!     // ...
//! }
//! ```
//!
//! [`Property`]: https://docs.rs/horizon-tether-core

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    Attribute, Data, DeriveInput, Expr, ExprLit, Field, Fields, Ident, Lit, Type,
    parse_macro_input,
};

/// Derive named property access and change notification.
///
/// This macro generates:
/// - A getter and a `set_<field>` setter for every `Property<T>` field
/// - An implementation of `PropertyHost`
/// - An implementation of `NotifyPropertyChanged` when a `#[notify]` field exists
/// - An implementation of `ObservableItem`
///
/// # Example
///
/// ```ignore
/// use horizon_tether::prelude::*;
///
/// #[derive(Bindable, Default)]
/// struct First {
///     #[property(name = "FirstProperty")]
///     first: Property<String>,
///
///     #[notify]
///     notifier: PropertyChangedNotifier,
/// }
/// ```
#[proc_macro_derive(Bindable, attributes(bindable, property, notify))]
pub fn derive_bindable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match impl_derive_bindable(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Parsed property information.
struct PropertyInfo {
    field_name: Ident,
    property_name: String,
    inner_type: Type,
    read_only: bool,
    is_property_wrapper: bool,
}

/// Parsed struct-level attributes.
struct BindableAttrs {
    type_name: Option<String>,
}

fn impl_derive_bindable(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let attrs = parse_bindable_attrs(&input.attrs)?;
    let type_name = attrs.type_name.unwrap_or_else(|| struct_name.to_string());

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Bindable derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Bindable derive only supports structs",
            ));
        }
    };

    let mut properties = Vec::new();
    let mut notify_field = None;

    for field in fields.iter() {
        if field.attrs.iter().any(|attr| attr.path().is_ident("notify")) {
            if notify_field.is_some() {
                return Err(syn::Error::new_spanned(
                    field,
                    "only one field may be marked #[notify]",
                ));
            }
            notify_field = field.ident.clone();
            continue;
        }
        if let Some(prop_info) = parse_property_field(field)? {
            if properties
                .iter()
                .any(|p: &PropertyInfo| p.property_name == prop_info.property_name)
            {
                return Err(syn::Error::new_spanned(
                    field,
                    format!("duplicate property name `{}`", prop_info.property_name),
                ));
            }
            properties.push(prop_info);
        }
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let accessors = generate_accessors(&properties, notify_field.as_ref());
    let property_host = generate_property_host(&type_name, &properties, notify_field.as_ref());

    let notify_impls = match &notify_field {
        Some(notifier) => quote! {
            impl #impl_generics horizon_tether_core::NotifyPropertyChanged for #struct_name #ty_generics #where_clause {
                fn property_changed(&self) -> &horizon_tether_core::Signal<horizon_tether_core::PropertyChanged> {
                    horizon_tether_core::NotifyPropertyChanged::property_changed(&self.#notifier)
                }
            }

            impl #impl_generics horizon_tether_core::ObservableItem for #struct_name #ty_generics #where_clause {
                fn notifier(&self) -> Option<&dyn horizon_tether_core::NotifyPropertyChanged> {
                    Some(self)
                }
            }
        },
        None => quote! {
            impl #impl_generics horizon_tether_core::ObservableItem for #struct_name #ty_generics #where_clause {}
        },
    };

    Ok(quote! {
        impl #impl_generics #struct_name #ty_generics #where_clause {
            #accessors
        }

        impl #impl_generics horizon_tether_core::PropertyHost for #struct_name #ty_generics #where_clause {
            #property_host
        }

        #notify_impls
    })
}

/// Parse struct-level #[bindable(...)] attributes.
fn parse_bindable_attrs(attrs: &[Attribute]) -> syn::Result<BindableAttrs> {
    let mut result = BindableAttrs { type_name: None };

    for attr in attrs {
        if !attr.path().is_ident("bindable") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("type_name") {
                result.type_name = Some(parse_str_value(&meta)?);
                Ok(())
            } else {
                Err(meta.error("unsupported bindable attribute"))
            }
        })?;
    }

    Ok(result)
}

fn parse_str_value(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<String> {
    let value: Expr = meta.value()?.parse()?;
    match value {
        Expr::Lit(ExprLit {
            lit: Lit::Str(lit_str),
            ..
        }) => Ok(lit_str.value()),
        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
    }
}

/// Parse a field with #[property] attribute.
fn parse_property_field(field: &Field) -> syn::Result<Option<PropertyInfo>> {
    let field_name = match &field.ident {
        Some(name) => name.clone(),
        None => return Ok(None),
    };

    let mut property_name = None;
    let mut read_only = false;
    let mut has_property_attr = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("property") {
            continue;
        }
        has_property_attr = true;

        // Bare #[property] has no argument list to parse.
        if matches!(attr.meta, syn::Meta::Path(_)) {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                property_name = Some(parse_str_value(&meta)?);
                Ok(())
            } else if meta.path.is_ident("read_only") {
                read_only = true;
                Ok(())
            } else {
                Err(meta.error("unsupported property attribute"))
            }
        })?;
    }

    if !has_property_attr {
        return Ok(None);
    }

    let (inner_type, is_property_wrapper) = extract_inner_type(&field.ty);
    if !is_property_wrapper && !read_only {
        return Err(syn::Error::new_spanned(
            &field.ty,
            "writable properties must be `Property<T>` fields; mark plain fields `read_only`",
        ));
    }

    Ok(Some(PropertyInfo {
        property_name: property_name.unwrap_or_else(|| field_name.to_string()),
        field_name,
        inner_type,
        read_only,
        is_property_wrapper,
    }))
}

/// Extract inner type from Property<T> or return the original type.
fn extract_inner_type(ty: &Type) -> (Type, bool) {
    if let Type::Path(type_path) = ty
        && let Some(segment) = type_path.path.segments.last()
        && segment.ident == "Property"
        && let syn::PathArguments::AngleBracketed(args) = &segment.arguments
        && let Some(syn::GenericArgument::Type(inner)) = args.args.first()
    {
        return (inner.clone(), true);
    }
    (ty.clone(), false)
}

fn setter_name(prop: &PropertyInfo) -> Ident {
    format_ident!("set_{}", prop.field_name)
}

/// Generate typed getters and change-announcing setters.
fn generate_accessors(properties: &[PropertyInfo], notify_field: Option<&Ident>) -> TokenStream2 {
    let fns: Vec<TokenStream2> = properties
        .iter()
        .map(|prop| {
            let field_name = &prop.field_name;
            let inner_type = &prop.inner_type;
            let property_name = &prop.property_name;

            if !prop.is_property_wrapper {
                return quote! {
                    #[doc = concat!("Current value of `", #property_name, "`.")]
                    pub fn #field_name(&self) -> #inner_type {
                        ::std::clone::Clone::clone(&self.#field_name)
                    }
                };
            }

            let setter = setter_name(prop);
            let announce = match notify_field {
                Some(notifier) => quote! {
                    if changed {
                        self.#notifier.notify(#property_name);
                    }
                },
                None => quote! {},
            };

            quote! {
                #[doc = concat!("Current value of `", #property_name, "`.")]
                pub fn #field_name(&self) -> #inner_type {
                    self.#field_name.get()
                }

                #[doc = concat!("Set `", #property_name, "`, announcing the change. Returns whether the value changed.")]
                pub fn #setter(&self, value: #inner_type) -> bool {
                    let changed = self.#field_name.set(value);
                    #announce
                    changed
                }
            }
        })
        .collect();

    quote! { #(#fns)* }
}

/// Generate the body of the `PropertyHost` impl.
fn generate_property_host(
    type_name: &str,
    properties: &[PropertyInfo],
    notify_field: Option<&Ident>,
) -> TokenStream2 {
    let names: Vec<&String> = properties.iter().map(|p| &p.property_name).collect();

    let access_arms = properties.iter().map(|prop| {
        let property_name = &prop.property_name;
        let writable = !prop.read_only;
        quote! {
            #property_name => Some(horizon_tether_core::PropertyAccess {
                readable: true,
                writable: #writable,
            }),
        }
    });

    let get_arms = properties.iter().map(|prop| {
        let property_name = &prop.property_name;
        let field_name = &prop.field_name;
        quote! {
            #property_name => Ok(::std::convert::Into::<horizon_tether_core::Value>::into(self.#field_name())),
        }
    });

    let set_arms = properties.iter().map(|prop| {
        let property_name = &prop.property_name;
        let inner_type = &prop.inner_type;
        if prop.read_only {
            quote! {
                #property_name => Err(horizon_tether_core::PropertyError::read_only(name)),
            }
        } else {
            let setter = setter_name(prop);
            quote! {
                #property_name => {
                    let value = <#inner_type as horizon_tether_core::FromValue>::from_value(value)?;
                    self.#setter(value);
                    Ok(())
                }
            }
        }
    });

    let as_notify = match notify_field {
        Some(_) => quote! {
            fn as_notify(&self) -> Option<&dyn horizon_tether_core::NotifyPropertyChanged> {
                Some(self)
            }
        },
        None => quote! {},
    };

    quote! {
        fn type_name(&self) -> &'static str {
            #type_name
        }

        fn property_names(&self) -> Vec<String> {
            vec![#(#names.to_string()),*]
        }

        fn property_access(&self, name: &str) -> Option<horizon_tether_core::PropertyAccess> {
            match name {
                #(#access_arms)*
                _ => None,
            }
        }

        fn get_property(&self, name: &str) -> horizon_tether_core::PropertyResult<horizon_tether_core::Value> {
            match name {
                #(#get_arms)*
                _ => Err(horizon_tether_core::PropertyError::not_found(name, #type_name)),
            }
        }

        #[allow(unused_variables)]
        fn set_property(&self, name: &str, value: horizon_tether_core::Value) -> horizon_tether_core::PropertyResult<()> {
            match name {
                #(#set_arms)*
                _ => Err(horizon_tether_core::PropertyError::not_found(name, #type_name)),
            }
        }

        #as_notify
    }
}
