use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, Path, parenthesized, parse_macro_input};

struct UnwrapError {
    error: Path,
    variant: Ident,
}

pub(crate) fn value_wrapper(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let Data::Enum(data_enum) = &input.data else {
        return error(&input, "ValueWrapper only works on enums.");
    };

    let unwrap_error = match parse_unwrap_error(&input) {
        Ok(Some(unwrap_error)) => unwrap_error,
        Ok(None) => {
            return error(
                &input,
                "ValueWrapper requires an #[unwrap_error(error(..), variant(..))] annotation",
            );
        }
        Err(err) => return err.to_compile_error().into(),
    };
    let error_path = &unwrap_error.error;
    let error_variant = &unwrap_error.variant;

    let mut methods = Vec::new();
    let mut from_impls = Vec::new();
    let mut type_names = Vec::new();

    for variant in data_enum.variants.iter() {
        let variant_ident = &variant.ident;
        let variant_name = variant_ident.to_string();
        type_names.push(quote! { #name::#variant_ident(..) => #variant_name, });

        let Fields::Unnamed(fields) = &variant.fields else {
            return error(variant, "ValueWrapper variants must have exactly one unnamed field.");
        };
        if fields.unnamed.len() != 1 {
            return error(variant, "ValueWrapper variants must have exactly one unnamed field.");
        }
        let inner_ty = &fields.unnamed[0].ty;

        let snake = to_snake_case(&variant_name);
        let trivial_copy = variant
            .attrs
            .iter()
            .any(|attr| attr.path().is_ident("trivial_copy"));

        let as_ident = Ident::new(&format!("as_{snake}"), variant_ident.span());
        let into_ident = Ident::new(&format!("into_{snake}"), variant_ident.span());
        let as_ref_ident = Ident::new(&format!("as_{snake}_ref"), variant_ident.span());

        if trivial_copy {
            methods.push(quote! {
                pub fn #as_ident(&self) -> ::core::result::Result<#inner_ty, #error_path> {
                    match self {
                        #name::#variant_ident(value) => Ok(*value),
                        other => Err(#error_path::#error_variant(
                            #variant_name.to_string(),
                            other.type_name().to_string(),
                        )),
                    }
                }
            });
        } else {
            methods.push(quote! {
                pub fn #as_ref_ident(&self) -> ::core::result::Result<&#inner_ty, #error_path> {
                    match self {
                        #name::#variant_ident(value) => Ok(value),
                        other => Err(#error_path::#error_variant(
                            #variant_name.to_string(),
                            other.type_name().to_string(),
                        )),
                    }
                }

                pub fn #into_ident(self) -> ::core::result::Result<#inner_ty, #error_path> {
                    match self {
                        #name::#variant_ident(value) => Ok(value),
                        other => Err(#error_path::#error_variant(
                            #variant_name.to_string(),
                            other.type_name().to_string(),
                        )),
                    }
                }
            });
        }

        from_impls.push(quote! {
            impl From<#inner_ty> for #name {
                fn from(value: #inner_ty) -> Self {
                    #name::#variant_ident(value)
                }
            }
        });
    }

    TokenStream::from(quote! {
        impl #name {
            /// Name of the variant currently held, used in conversion errors.
            pub fn type_name(&self) -> &'static str {
                match self {
                    #(#type_names)*
                }
            }

            #(#methods)*
        }

        #(#from_impls)*
    })
}

fn parse_unwrap_error(input: &DeriveInput) -> syn::Result<Option<UnwrapError>> {
    let Some(attr) = input
        .attrs
        .iter()
        .find(|attr| attr.path().is_ident("unwrap_error"))
    else {
        return Ok(None);
    };

    let mut error_path = None;
    let mut variant = None;

    attr.parse_nested_meta(|meta| {
        let content;
        parenthesized!(content in meta.input);
        if meta.path.is_ident("error") {
            error_path = Some(content.parse::<Path>()?);
            Ok(())
        } else if meta.path.is_ident("variant") {
            variant = Some(content.parse::<Ident>()?);
            Ok(())
        } else {
            Err(meta.error("expected `error` or `variant`"))
        }
    })?;

    match (error_path, variant) {
        (Some(error), Some(variant)) => Ok(Some(UnwrapError { error, variant })),
        _ => Err(syn::Error::new_spanned(
            attr,
            "unwrap_error needs both error(..) and variant(..)",
        )),
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

fn error(tokens: impl quote::ToTokens, msg: impl std::fmt::Display) -> TokenStream {
    syn::Error::new_spanned(tokens, msg)
        .to_compile_error()
        .into()
}
