//! Derive macros for the `lattice` wire codec.
//!
//! `#[derive(Record)]` implements `Serialize`/`Deserialize` by walking the
//! fields of a struct (or the variants of an enum) in declaration order, so
//! composites never have to re-list their fields by hand.
//!
//! `#[derive(Message)]` additionally implements the `Message`/`MessageType`
//! pair for a top-level message: id-prefixed serialization, id verification
//! on deserialization and a cached registry id lookup. It includes the
//! `Record` expansion, so a message type derives one or the other, never
//! both.

extern crate proc_macro;

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Fields, GenericParam, Generics, Index};

#[proc_macro_derive(Record)]
pub fn derive_record(item: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let ast = parse_macro_input!(item as DeriveInput);

    expand_record(&ast)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

#[proc_macro_derive(Message)]
pub fn derive_message(item: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let ast = parse_macro_input!(item as DeriveInput);

    let expanded = expand_record(&ast).and_then(|record| {
        let message = expand_message(&ast)?;
        Ok(quote! {
            #record
            #message
        })
    });

    expanded.unwrap_or_else(|err| err.to_compile_error()).into()
}

/// Emits the `Serialize` and `Deserialize` impls walking fields in source
/// order.
fn expand_record(ast: &DeriveInput) -> syn::Result<TokenStream> {
    let name = &ast.ident;

    let (serialize_body, deserialize_body) = match &ast.data {
        Data::Struct(data) => struct_bodies(&data.fields),
        Data::Enum(data) => enum_bodies(data)?,
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                &ast.ident,
                "Record cannot be derived for unions",
            ));
        }
    };

    let ser_generics = bounded_generics(&ast.generics, quote!(::lattice::serialize::Serialize));
    let (ser_impl, _, ser_where) = ser_generics.split_for_impl();
    let de_generics = bounded_generics(&ast.generics, quote!(::lattice::serialize::Deserialize));
    let (de_impl, _, de_where) = de_generics.split_for_impl();
    let (_, ty_generics, _) = ast.generics.split_for_impl();

    Ok(quote! {
        impl #ser_impl ::lattice::serialize::Serialize for #name #ty_generics #ser_where {
            fn serialize(&self, buf: &mut ::lattice::serialize::ByteBuffer) {
                #serialize_body
            }
        }

        impl #de_impl ::lattice::serialize::Deserialize for #name #ty_generics #de_where {
            fn deserialize(buf: &[u8], pos: &mut usize) -> ::lattice::error::Result<Self> {
                #deserialize_body
            }
        }
    })
}

/// Serialize/deserialize bodies for a struct with the given fields.
fn struct_bodies(fields: &Fields) -> (TokenStream, TokenStream) {
    match fields {
        Fields::Named(named) => {
            let idents: Vec<_> = named.named.iter().map(|f| f.ident.clone().unwrap()).collect();
            let ser = quote! {
                #(::lattice::serialize::Serialize::serialize(&self.#idents, buf);)*
            };
            let de = quote! {
                Ok(Self {
                    #(#idents: ::lattice::serialize::Deserialize::deserialize(buf, pos)?,)*
                })
            };
            (ser, de)
        }
        Fields::Unnamed(unnamed) => {
            let indices: Vec<Index> = (0..unnamed.unnamed.len()).map(Index::from).collect();
            let count = unnamed.unnamed.len();
            let de_fields = (0..count).map(|_| {
                quote!(::lattice::serialize::Deserialize::deserialize(buf, pos)?)
            });
            let ser = quote! {
                #(::lattice::serialize::Serialize::serialize(&self.#indices, buf);)*
            };
            let de = quote! {
                Ok(Self(#(#de_fields),*))
            };
            (ser, de)
        }
        Fields::Unit => (quote!(), quote!(Ok(Self))),
    }
}

/// Serialize/deserialize bodies for an enum: a 0-based usize variant index
/// followed by the fields of the selected variant.
fn enum_bodies(data: &syn::DataEnum) -> syn::Result<(TokenStream, TokenStream)> {
    for variant in &data.variants {
        if variant.discriminant.is_some() {
            return Err(syn::Error::new_spanned(
                &variant.ident,
                "Record enums use positional variant tags; explicit discriminants are not serialized",
            ));
        }
    }

    let mut ser_arms = Vec::new();
    let mut de_arms = Vec::new();

    for (tag, variant) in data.variants.iter().enumerate() {
        let ident = &variant.ident;

        match &variant.fields {
            Fields::Named(named) => {
                let idents: Vec<_> = named.named.iter().map(|f| f.ident.clone().unwrap()).collect();
                ser_arms.push(quote! {
                    Self::#ident { #(#idents),* } => {
                        ::lattice::serialize::Serialize::serialize(&#tag, buf);
                        #(::lattice::serialize::Serialize::serialize(#idents, buf);)*
                    }
                });
                de_arms.push(quote! {
                    #tag => Ok(Self::#ident {
                        #(#idents: ::lattice::serialize::Deserialize::deserialize(buf, pos)?,)*
                    }),
                });
            }
            Fields::Unnamed(unnamed) => {
                let bindings: Vec<_> = (0..unnamed.unnamed.len())
                    .map(|i| format_ident!("field{}", i))
                    .collect();
                let de_fields = (0..unnamed.unnamed.len()).map(|_| {
                    quote!(::lattice::serialize::Deserialize::deserialize(buf, pos)?)
                });
                ser_arms.push(quote! {
                    Self::#ident(#(#bindings),*) => {
                        ::lattice::serialize::Serialize::serialize(&#tag, buf);
                        #(::lattice::serialize::Serialize::serialize(#bindings, buf);)*
                    }
                });
                de_arms.push(quote! {
                    #tag => Ok(Self::#ident(#(#de_fields),*)),
                });
            }
            Fields::Unit => {
                ser_arms.push(quote! {
                    Self::#ident => {
                        ::lattice::serialize::Serialize::serialize(&#tag, buf);
                    }
                });
                de_arms.push(quote! {
                    #tag => Ok(Self::#ident),
                });
            }
        }
    }

    let ser = quote! {
        match self {
            #(#ser_arms)*
        }
    };
    let de = quote! {
        let tag = <usize as ::lattice::serialize::Deserialize>::deserialize(buf, pos)?;
        match tag {
            #(#de_arms)*
            _ => Err(::lattice::error::Error::InvalidVariantTag),
        }
    };

    Ok((ser, de))
}

/// Emits the `Message`/`MessageType` impls for a top-level message struct.
fn expand_message(ast: &DeriveInput) -> syn::Result<TokenStream> {
    let name = &ast.ident;

    match &ast.data {
        Data::Struct(_) => (),
        _ => {
            return Err(syn::Error::new_spanned(
                &ast.ident,
                "Message can only be derived for structs",
            ));
        }
    }

    if !ast.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &ast.ident,
            "Message types must be concrete; generic messages cannot be registered",
        ));
    }

    Ok(quote! {
        impl ::lattice::message::Message for #name {
            fn message_id(&self) -> ::lattice::error::Result<::lattice::message::MessageId> {
                <Self as ::lattice::message::MessageType>::id()
            }

            fn message_name(&self) -> &'static str {
                <Self as ::lattice::message::MessageType>::type_name()
            }

            fn serialize_message(
                &self,
                buf: &mut ::lattice::serialize::ByteBuffer,
            ) -> ::lattice::error::Result<()> {
                let id = <Self as ::lattice::message::MessageType>::id()?;
                ::lattice::serialize::Serialize::serialize(&id, buf);
                ::lattice::serialize::Serialize::serialize(self, buf);
                Ok(())
            }

            fn deserialize_message(
                &mut self,
                buf: &[u8],
                pos: &mut usize,
            ) -> ::lattice::error::Result<()> {
                let expected = <Self as ::lattice::message::MessageType>::id()?;
                let found =
                    <::lattice::message::MessageId as ::lattice::serialize::Deserialize>::deserialize(
                        buf, pos,
                    )?;
                if found != expected {
                    return Err(::lattice::error::Error::IdMismatch);
                }
                *self = <Self as ::lattice::serialize::Deserialize>::deserialize(buf, pos)?;
                Ok(())
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::std::any::Any> {
                self
            }
        }

        impl ::lattice::message::MessageType for #name {
            fn type_name() -> &'static str {
                concat!(module_path!(), "::", stringify!(#name))
            }

            fn id() -> ::lattice::error::Result<::lattice::message::MessageId> {
                static CACHE: ::std::sync::OnceLock<::lattice::message::MessageId> =
                    ::std::sync::OnceLock::new();

                if let Some(id) = CACHE.get() {
                    return Ok(*id);
                }

                let id = ::lattice::registry::message_id_by_name(
                    <Self as ::lattice::message::MessageType>::type_name(),
                )?;
                let _ = CACHE.set(id);
                Ok(id)
            }
        }
    })
}

/// Clones the input generics, adding the given trait bound to every type
/// parameter.
fn bounded_generics(generics: &Generics, bound: TokenStream) -> Generics {
    let mut out = generics.clone();

    let params: Vec<_> = out
        .params
        .iter()
        .filter_map(|param| match param {
            GenericParam::Type(ty) => Some(ty.ident.clone()),
            _ => None,
        })
        .collect();

    if params.is_empty() {
        return out;
    }

    let where_clause = out.make_where_clause();
    for ident in params {
        where_clause
            .predicates
            .push(syn::parse_quote!(#ident: #bound));
    }

    out
}
