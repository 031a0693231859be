mod value_wrapper;

use proc_macro::TokenStream;

use crate::value_wrapper::value_wrapper;

/// Generates typed accessors (`as_*`, `as_*_ref`, `into_*`), a `type_name` helper and
/// `From` conversions for an enum whose variants each wrap a single value.
///
/// The enum must be annotated with `#[unwrap_error(error(path::to::Error), variant(Variant))]`,
/// where `Variant(String, String)` is constructed with the expected and actual variant names on
/// a failed conversion. Variants marked `#[trivial_copy]` get a by-value `as_*` accessor.
#[proc_macro_derive(ValueWrapper, attributes(unwrap_error, trivial_copy))]
pub fn derive_value_wrapper(input: TokenStream) -> TokenStream {
    value_wrapper(input)
}
