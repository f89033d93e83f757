use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::meta::ParseNestedMeta;
use syn::{Attribute, Data, DeriveInput, Field, Fields, LitStr, parse_macro_input};

#[proc_macro_derive(FormModel)]
pub fn derive_form_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.ident,
            "FormModel derive currently supports only non-generic structs",
        )
        .to_compile_error()
        .into();
    }

    let rename_all = match rename_all(&input.attrs) {
        Ok(rule) => rule,
        Err(error) => return error.to_compile_error().into(),
    };
    let model_ident = input.ident;
    let fields_struct_ident = format_ident!("{model_ident}Fields");

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new(
                    Span::call_site(),
                    "FormModel derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(
                Span::call_site(),
                "FormModel derive is only supported on structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let formwright = formwright_path();
    let mut fields_methods = Vec::new();

    for field in named_fields {
        let path = match field_path(&field, rename_all) {
            Ok(Some(path)) => path,
            Ok(None) => continue,
            Err(error) => return error.to_compile_error().into(),
        };
        let Some(field_ident) = field.ident else {
            continue;
        };
        let doc = format!("Form path `{path}`.");

        fields_methods.push(quote! {
            #[doc = #doc]
            pub const fn #field_ident(&self) -> #formwright::form::FieldPath {
                #formwright::form::FieldPath::new(#path)
            }
        });
    }

    quote! {
        #[derive(Clone, Copy, Debug, Default)]
        pub struct #fields_struct_ident;

        impl #fields_struct_ident {
            #(#fields_methods)*
        }

        impl #formwright::form::FormModel for #model_ident {
            type Fields = #fields_struct_ident;

            fn fields() -> Self::Fields {
                #fields_struct_ident
            }
        }
    }
    .into()
}

/// Container-level `#[serde(rename_all = "..")]`, as applied to field names.
#[derive(Clone, Copy)]
enum RenameRule {
    Upper,
    Pascal,
    Camel,
    ScreamingSnake,
    Kebab,
    ScreamingKebab,
}

impl RenameRule {
    fn parse(value: &LitStr) -> syn::Result<Option<Self>> {
        let rule = match value.value().as_str() {
            "lowercase" | "snake_case" => None,
            "UPPERCASE" => Some(Self::Upper),
            "PascalCase" => Some(Self::Pascal),
            "camelCase" => Some(Self::Camel),
            "SCREAMING_SNAKE_CASE" => Some(Self::ScreamingSnake),
            "kebab-case" => Some(Self::Kebab),
            "SCREAMING-KEBAB-CASE" => Some(Self::ScreamingKebab),
            other => {
                return Err(syn::Error::new_spanned(
                    value,
                    format!("unknown serde rename_all rule `{other}`"),
                ));
            }
        };
        Ok(rule)
    }

    /// Renames a snake_case field name.
    fn apply(self, field: &str) -> String {
        match self {
            Self::Upper | Self::ScreamingSnake => field.to_ascii_uppercase(),
            Self::Pascal => {
                let mut pascal = String::with_capacity(field.len());
                let mut capitalize = true;
                for ch in field.chars() {
                    if ch == '_' {
                        capitalize = true;
                    } else if capitalize {
                        pascal.push(ch.to_ascii_uppercase());
                        capitalize = false;
                    } else {
                        pascal.push(ch);
                    }
                }
                pascal
            }
            Self::Camel => {
                let pascal = Self::Pascal.apply(field);
                let mut chars = pascal.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
                    None => pascal,
                }
            }
            Self::Kebab => field.replace('_', "-"),
            Self::ScreamingKebab => field.to_ascii_uppercase().replace('_', "-"),
        }
    }
}

fn rename_all(attrs: &[Attribute]) -> syn::Result<Option<RenameRule>> {
    let mut rule = None;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                if let Some(value) = serialized_name(&meta)? {
                    rule = RenameRule::parse(&value)?;
                }
            } else {
                skip_meta_value(&meta)?;
            }
            Ok(())
        })?;
    }
    Ok(rule)
}

/// Key the field serializes under: `#[serde(rename = "..")]` if present, otherwise the
/// field name after the container's `rename_all`. `None` for fields serde skips.
fn field_path(field: &Field, rename_all: Option<RenameRule>) -> syn::Result<Option<String>> {
    let Some(ident) = &field.ident else {
        return Ok(None);
    };
    let name = ident.to_string().trim_start_matches("r#").to_string();
    let mut renamed = None;
    let mut skipped = false;

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                if let Some(value) = serialized_name(&meta)? {
                    renamed = Some(value.value());
                }
            } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                skipped = true;
            } else {
                skip_meta_value(&meta)?;
            }
            Ok(())
        })?;
    }

    if skipped {
        return Ok(None);
    }
    Ok(Some(renamed.unwrap_or_else(|| match rename_all {
        Some(rule) => rule.apply(&name),
        None => name,
    })))
}

/// Reads `key = ".."` or the `serialize` half of `key(serialize = "..", deserialize = "..")`.
fn serialized_name(meta: &ParseNestedMeta<'_>) -> syn::Result<Option<LitStr>> {
    if meta.input.peek(syn::Token![=]) {
        return Ok(Some(meta.value()?.parse()?));
    }
    let mut serialize = None;
    meta.parse_nested_meta(|nested| {
        if nested.path.is_ident("serialize") {
            serialize = Some(nested.value()?.parse()?);
        } else {
            skip_meta_value(&nested)?;
        }
        Ok(())
    })?;
    Ok(serialize)
}

fn skip_meta_value(meta: &ParseNestedMeta<'_>) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        let _: syn::Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        let content;
        syn::parenthesized!(content in meta.input);
        let _: TokenStream2 = content.parse()?;
    }
    Ok(())
}

fn formwright_path() -> TokenStream2 {
    match crate_name("formwright") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::formwright),
    }
}
