use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    Attribute, Data, DeriveInput, Fields, Ident, LitStr, Type, parse_macro_input,
    spanned::Spanned,
};

#[proc_macro_derive(InlineRecord, attributes(inline_record, inline_field))]
pub fn derive_inline_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_inline_record(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[proc_macro_derive(InlineEnum, attributes(inline_enum))]
pub fn derive_inline_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_inline_enum(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct RecordOptions {
    name: Option<String>,
}

#[derive(Default)]
struct FieldOptions {
    skip: bool,
    version: bool,
    rename: Option<String>,
}

struct EditableField {
    ident: Ident,
    ty: Type,
    name: String,
}

fn expand_inline_record(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "InlineRecord does not support generic structs",
        ));
    }

    let options = parse_record_options(&input.attrs)?;

    let data_struct = match input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "InlineRecord can only be derived for structs",
            ));
        }
    };

    let named_fields = match data_struct.fields {
        Fields::Named(fields) => fields,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "InlineRecord requires named fields",
            ));
        }
    };

    let mut editable = Vec::<EditableField>::new();
    let mut version_field: Option<(Ident, Type)> = None;

    for field in named_fields.named {
        let ident = field.ident.clone().ok_or_else(|| {
            syn::Error::new(field.span(), "InlineRecord requires named fields")
        })?;
        let field_options = parse_field_options(&field.attrs)?;

        if field_options.version {
            if version_field.is_some() {
                return Err(syn::Error::new(
                    ident.span(),
                    "only one field can be marked #[inline_field(version)]",
                ));
            }
            version_field = Some((ident, field.ty));
            continue;
        }
        if field_options.skip {
            continue;
        }

        let name = field_options
            .rename
            .unwrap_or_else(|| ident.to_string());
        if editable.iter().any(|existing| existing.name == name) {
            return Err(syn::Error::new(
                ident.span(),
                format!("duplicate inline field name '{}'", name),
            ));
        }
        editable.push(EditableField {
            ident,
            ty: field.ty,
            name,
        });
    }

    let record_name = options.name.unwrap_or_else(|| struct_name.to_string());

    let mut helpers = Vec::<TokenStream2>::new();
    let mut accessors = Vec::<TokenStream2>::new();
    for field in &editable {
        let ident = &field.ident;
        let ty = &field.ty;
        let name = &field.name;
        let getter = format_ident!("__inline_get_{}", ident);
        let setter = format_ident!("__inline_set_{}", ident);

        helpers.push(quote! {
            #[doc(hidden)]
            fn #getter(record: &#struct_name) -> ::inline_edit::Value {
                ::inline_edit::FieldValue::to_value(&record.#ident)
            }

            #[doc(hidden)]
            fn #setter(
                record: &mut #struct_name,
                value: ::inline_edit::Value,
            ) -> ::std::result::Result<(), ::inline_edit::CoerceError> {
                record.#ident = <#ty as ::inline_edit::FieldValue>::from_value(value)?;
                ::std::result::Result::Ok(())
            }
        });

        accessors.push(quote! {
            ::inline_edit::FieldAccessor::new(
                #name,
                <#ty as ::inline_edit::FieldValue>::field_type,
                #struct_name::#getter,
                #struct_name::#setter,
            )
        });
    }

    let versioned_impl = match &version_field {
        Some((ident, ty)) => {
            let ty_name = quote!(#ty).to_string();
            quote! {
                impl ::inline_edit::Versioned for #struct_name {
                    // Counters past i64::MAX read as saturated so the next bump fails.
                    fn version(&self) -> i64 {
                        <i64 as ::std::convert::TryFrom<#ty>>::try_from(self.#ident)
                            .unwrap_or(i64::MAX)
                    }

                    fn set_version(
                        &mut self,
                        version: i64,
                    ) -> ::std::result::Result<(), ::inline_edit::CoerceError> {
                        self.#ident = <#ty as ::std::convert::TryFrom<i64>>::try_from(version)
                            .map_err(|_| ::inline_edit::CoerceError::OutOfRange {
                                value: version.to_string(),
                                target: #ty_name,
                            })?;
                        ::std::result::Result::Ok(())
                    }
                }
            }
        }
        None => quote! {},
    };

    let versioned_hooks = match &version_field {
        Some(_) => quote! {
            fn as_versioned(&self) -> ::std::option::Option<&dyn ::inline_edit::Versioned> {
                ::std::option::Option::Some(self)
            }

            fn as_versioned_mut(
                &mut self,
            ) -> ::std::option::Option<&mut dyn ::inline_edit::Versioned> {
                ::std::option::Option::Some(self)
            }
        },
        None => quote! {},
    };

    Ok(quote! {
        impl #struct_name {
            #(#helpers)*
        }

        impl ::inline_edit::InlineRecord for #struct_name {
            const RECORD_TYPE: &'static str = #record_name;

            fn fields() -> &'static [::inline_edit::FieldAccessor<Self>] {
                const FIELDS: &[::inline_edit::FieldAccessor<#struct_name>] = &[
                    #(#accessors),*
                ];
                FIELDS
            }

            #versioned_hooks
        }

        #versioned_impl
    })
}

fn expand_inline_enum(input: DeriveInput) -> syn::Result<TokenStream2> {
    let enum_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "InlineEnum does not support generic enums",
        ));
    }

    let options = parse_enum_options(&input.attrs)?;

    let data_enum = match input.data {
        Data::Enum(data) => data,
        _ => {
            return Err(syn::Error::new(
                enum_name.span(),
                "InlineEnum can only be derived for enums",
            ));
        }
    };

    let mut variant_idents = Vec::<Ident>::new();
    let mut variant_names = Vec::<String>::new();
    for variant in data_enum.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new(
                variant.span(),
                "InlineEnum variants cannot carry data",
            ));
        }
        let name = parse_enum_options(&variant.attrs)?
            .name
            .unwrap_or_else(|| variant.ident.to_string());
        variant_idents.push(variant.ident);
        variant_names.push(name);
    }

    if variant_idents.is_empty() {
        return Err(syn::Error::new(
            enum_name.span(),
            "InlineEnum requires at least one variant",
        ));
    }

    let type_name = options.name.unwrap_or_else(|| enum_name.to_string());

    Ok(quote! {
        impl ::inline_edit::FieldValue for #enum_name {
            fn field_type() -> ::inline_edit::FieldType {
                ::inline_edit::FieldType::Enum(::inline_edit::EnumType::new(
                    #type_name,
                    [#(#variant_names),*],
                ))
            }

            fn to_value(&self) -> ::inline_edit::Value {
                let name = match self {
                    #(Self::#variant_idents => #variant_names,)*
                };
                ::inline_edit::Value::Enum(name.to_string())
            }

            fn from_value(
                value: ::inline_edit::Value,
            ) -> ::std::result::Result<Self, ::inline_edit::CoerceError> {
                match value {
                    ::inline_edit::Value::Enum(name) | ::inline_edit::Value::Text(name) => {
                        match name.as_str() {
                            #(#variant_names => ::std::result::Result::Ok(Self::#variant_idents),)*
                            _ => ::std::result::Result::Err(::inline_edit::CoerceError::UnknownVariant {
                                raw: name,
                                enum_name: #type_name.to_string(),
                            }),
                        }
                    }
                    other => ::std::result::Result::Err(::inline_edit::CoerceError::TypeMismatch {
                        expected: <Self as ::inline_edit::FieldValue>::field_type(),
                        found: other.type_name(),
                    }),
                }
            }
        }
    })
}

fn parse_record_options(attrs: &[Attribute]) -> syn::Result<RecordOptions> {
    let mut options = RecordOptions::default();
    for attr in attrs {
        if !attr.path().is_ident("inline_record") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                options.name = Some(lit.value());
                return Ok(());
            }

            Err(meta.error("Unsupported inline_record attribute. Supported: name = \"...\""))
        })?;
    }

    Ok(options)
}

fn parse_field_options(attrs: &[Attribute]) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();
    for attr in attrs {
        if !attr.path().is_ident("inline_field") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                options.skip = true;
                return Ok(());
            }

            if meta.path.is_ident("version") {
                options.version = true;
                return Ok(());
            }

            if meta.path.is_ident("rename") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                options.rename = Some(lit.value());
                return Ok(());
            }

            Err(meta.error(
                "Unsupported #[inline_field(...)] option. Supported: skip, version, rename = \"...\"",
            ))
        })?;
    }

    if options.skip && options.version {
        return Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[inline_field] cannot combine skip and version",
        ));
    }

    Ok(options)
}

fn parse_enum_options(attrs: &[Attribute]) -> syn::Result<RecordOptions> {
    let mut options = RecordOptions::default();
    for attr in attrs {
        if !attr.path().is_ident("inline_enum") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                options.name = Some(lit.value());
                return Ok(());
            }

            Err(meta.error("Unsupported inline_enum attribute. Supported: name = \"...\""))
        })?;
    }

    Ok(options)
}
