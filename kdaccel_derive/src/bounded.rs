pub fn impl_bounded(input: syn::Result<syn::DeriveInput>) -> syn::Result<proc_macro::TokenStream> {
    let input = input?;

    let field = match &input.data {
        syn::Data::Struct(data_struct) => crate::get_tagged_field("bbox", data_struct)
            .or_else(|| crate::get_field("bbox", data_struct))
            .or_else(|| crate::get_field("bounds", data_struct))
            .ok_or_else(|| {
                syn::Error::new_spanned(
                    &data_struct.fields,
                    "no `#[bbox]`, `bbox` or `bounds` field",
                )
            }),
        syn::Data::Enum(data_enum) => Err(syn::Error::new_spanned(
            data_enum.enum_token,
            "the `Bounded` trait can only be derived for struct types",
        )),
        syn::Data::Union(data_union) => Err(syn::Error::new_spanned(
            data_union.union_token,
            "the `Bounded` trait can only be derived for struct types",
        )),
    }?;

    let field_ty = &field.ty;
    let field_ident = field.ident.as_ref().ok_or_else(|| {
        syn::Error::new(
            proc_macro2::Span::call_site(),
            "the `Bounded` trait can only be derived for structs with named fields",
        )
    })?;

    let name = &input.ident;
    let (_, ty_generics, _) = input.generics.split_for_impl();

    let mut generics = input.generics.clone();
    generics.params.push(syn::parse_quote!(const KDACCEL_DIM: usize));
    generics
        .make_where_clause()
        .predicates
        .push(syn::parse_quote! {
            #field_ty: ::core::clone::Clone
                + ::core::convert::Into<::kdaccel::BoundingBox<KDACCEL_DIM>>
        });
    let (impl_generics, _, where_clause) = generics.split_for_impl();

    Ok(quote::quote! {
        impl #impl_generics ::kdaccel::Bounded<KDACCEL_DIM> for #name #ty_generics #where_clause {
            #[inline]
            fn bounding_box(&self) -> ::kdaccel::BoundingBox<KDACCEL_DIM> {
                ::core::convert::Into::into(::core::clone::Clone::clone(&self.#field_ident))
            }
        }
    }
    .into())
}
