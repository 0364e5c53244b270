//! # Setter Derive
//!
//! `#[derive(Setters)]` generates builder-style setters for plain data
//! structs such as the guest register state, so call sites can write
//! `GuestRegisterState::new().with_rip(entry).with_rsp(stack)`.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::token::Comma;
use syn::{Attribute, Data, DeriveInput, Field, Fields, LitBool, parse_macro_input};

/// Generates, for each named field `x: T`:
///
/// - `fn set_x(&mut self, value: T) -> &mut Self`
/// - `const fn with_x(mut self, value: T) -> Self`
///
/// Fields marked `#[setters(skip)]` (or `#[setters(skip = true)]`) get none.
/// `with_*` is `const`, so field types must not need dropping.
///
/// ```
/// use utils_accessors_derive::Setters;
///
/// #[derive(Clone, Copy, Setters)]
/// struct Regs {
///     rip: u64,
///     rsp: u64,
///     #[setters(skip)]
///     generation: u32,
/// }
///
/// let mut r = Regs { rip: 0, rsp: 0, generation: 1 }.with_rip(0x1000);
/// r.set_rsp(0x40_0000).set_rip(0x2000);
/// assert_eq!((r.rip, r.rsp, r.generation), (0x2000, 0x40_0000, 1));
/// ```
///
/// ```compile_fail
/// use utils_accessors_derive::Setters;
///
/// #[derive(Setters)]
/// struct Pair(u32, u32);
/// ```
#[proc_macro_derive(Setters, attributes(setters))]
pub fn derive_setters(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input).unwrap_or_else(|e| e.to_compile_error().into())
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut methods = Vec::new();
    for field in named_fields(input)? {
        if skip_requested(&field.attrs)? {
            continue;
        }
        let Some(name) = &field.ident else { continue };
        let ty = &field.ty;
        let set = format_ident!("set_{}", name);
        let with = format_ident!("with_{}", name);
        let doc = format!("Sets `{name}`.");

        methods.push(quote! {
            #[doc = #doc]
            #[inline]
            pub fn #set(&mut self, value: #ty) -> &mut Self {
                self.#name = value;
                self
            }

            #[doc = #doc]
            #[inline]
            #[must_use]
            pub const fn #with(mut self, value: #ty) -> Self {
                self.#name = value;
                self
            }
        });
    }

    Ok(quote! {
        impl #impl_generics #ident #ty_generics #where_clause {
            #(#methods)*
        }
    }
    .into())
}

fn named_fields(input: &DeriveInput) -> syn::Result<&Punctuated<Field, Comma>> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(input.ident.span(), "Setters can only be derived for structs"));
    };
    match &data.fields {
        Fields::Named(named) => Ok(&named.named),
        Fields::Unnamed(unnamed) => Err(syn::Error::new(unnamed.span(), "Setters needs named fields")),
        Fields::Unit => Err(syn::Error::new(input.ident.span(), "Setters has nothing to set on a unit struct")),
    }
}

/// `true` for `#[setters(skip)]` and `#[setters(skip = true)]`.
fn skip_requested(attrs: &[Attribute]) -> syn::Result<bool> {
    let mut skip = false;
    for attr in attrs.iter().filter(|a| a.path().is_ident("setters")) {
        attr.parse_nested_meta(|meta| {
            if !meta.path.is_ident("skip") {
                return Err(meta.error("expected `skip`"));
            }
            skip = if meta.input.is_empty() {
                true
            } else {
                meta.value()?.parse::<LitBool>()?.value
            };
            Ok(())
        })?;
    }
    Ok(skip)
}
