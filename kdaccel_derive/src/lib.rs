mod bounded;

/// Derive macro generating an implementation of the trait `Bounded`.
///
/// The bounding box is read from the field tagged `#[bbox]`, or else from a field named `bbox` or
/// `bounds`. The field type must implement `Clone` and `Into<BoundingBox<D>>`.
#[proc_macro_derive(Bounded, attributes(bbox))]
pub fn bounded_derive(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let ast = syn::parse(input);

    bounded::impl_bounded(ast).unwrap_or_else(|e| syn::Error::to_compile_error(&e).into())
}

pub(crate) fn get_field<'a>(name: &str, data: &'a syn::DataStruct) -> Option<&'a syn::Field> {
    data.fields
        .iter()
        .find(|field| field.ident.as_ref().is_some_and(|ident| ident == name))
}

pub(crate) fn get_tagged_field<'a>(tag: &str, data: &'a syn::DataStruct) -> Option<&'a syn::Field> {
    data.fields
        .iter()
        .find(|field| field.attrs.iter().any(|attr| attr.path().is_ident(tag)))
}
