use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::{
    parse_quote, DataStruct, DeriveInput, Expr, ExprLit, Field, Fields, GenericParam, Ident, Lit, LitStr, Meta,
    Result, Type,
};

struct FieldInfo<'a> {
    ident: &'a Ident,
    ty: &'a Type,
    name: String,
    tag: Option<String>,
}

impl FieldInfo<'_> {
    fn is_excluded(&self) -> bool {
        self.tag.as_deref() == Some("-")
    }
}

fn field_tag(field: &Field) -> Result<Option<String>> {
    let mut tag: Option<String> = None;
    for attr in &field.attrs {
        if !attr.path().is_ident("bson") {
            continue;
        }
        if tag.is_some() {
            return Err(syn::Error::new_spanned(attr, "Multiple #[bson] attributes are not allowed"));
        }
        let lit: LitStr = match &attr.meta {
            Meta::List(_) => attr.parse_args()?,
            Meta::NameValue(nv) => match &nv.value {
                Expr::Lit(ExprLit { lit: Lit::Str(s), .. }) => s.clone(),
                other => return Err(syn::Error::new_spanned(other, "Expected a string tag, e.g. #[bson = \"key,omitempty\"]")),
            },
            Meta::Path(_) => {
                return Err(syn::Error::new_spanned(attr, "Expected a tag, e.g. #[bson(\"key,omitempty\")]"));
            }
        };
        tag = Some(lit.value());
    }
    Ok(tag)
}

pub(crate) fn generate_bson_struct(ast: &DeriveInput, data: &DataStruct) -> Result<TokenStream> {
    let named = match &data.fields {
        Fields::Named(fields) => &fields.named,
        _ => {
            return Err(syn::Error::new_spanned(
                ast,
                "BsonStruct can only be derived for structs with named fields",
            ))
        }
    };

    let mut fields = Vec::with_capacity(named.len());
    for field in named {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        fields.push(FieldInfo {
            ident,
            ty: &field.ty,
            name: ident.unraw().to_string(),
            tag: field_tag(field)?,
        });
    }

    // Every type parameter must be encodable, decodable and 'static for TypeId.
    let mut generics = ast.generics.clone();
    for param in &ast.generics.params {
        match param {
            GenericParam::Type(ty) => {
                let ident = &ty.ident;
                generics.make_where_clause().predicates.push(parse_quote! {
                    #ident: ::mongo_bsonutils::Encode + ::mongo_bsonutils::Decode + 'static
                });
            }
            GenericParam::Lifetime(lt) => {
                return Err(syn::Error::new_spanned(lt, "BsonStruct does not support lifetime parameters"));
            }
            GenericParam::Const(_) => {}
        }
    }

    let name = &ast.ident;
    let name_str = name.to_string();
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let raw_fields: Vec<TokenStream2> = fields
        .iter()
        .map(|f| {
            let field_name = &f.name;
            let ty = f.ty;
            let tag = match &f.tag {
                Some(tag) => quote! { ::std::option::Option::Some(#tag) },
                None => quote! { ::std::option::Option::None },
            };
            let inline = if f.is_excluded() {
                quote! { ::mongo_bsonutils::InlineKind::None }
            } else {
                quote! { <#ty as ::mongo_bsonutils::Encode>::inline_kind() }
            };
            quote! { ::mongo_bsonutils::RawField::new(#field_name, #tag, #inline) }
        })
        .collect();

    let mut field_arms = Vec::new();
    let mut field_mut_arms = Vec::new();
    let mut zero_inits = Vec::new();
    let mut zero_checks = Vec::new();
    for (index, f) in fields.iter().enumerate() {
        let ident = f.ident;
        let ty = f.ty;
        if f.is_excluded() {
            zero_inits.push(quote! { #ident: ::std::default::Default::default() });
            continue;
        }
        field_arms.push(quote! {
            #index => ::std::option::Option::Some(&self.#ident as &dyn ::mongo_bsonutils::Encode)
        });
        field_mut_arms.push(quote! {
            #index => ::std::option::Option::Some(&mut self.#ident as &mut dyn ::mongo_bsonutils::Decode)
        });
        zero_inits.push(quote! { #ident: <#ty as ::mongo_bsonutils::Decode>::zero() });
        zero_checks.push(quote! { && ::mongo_bsonutils::Encode::is_zero(&self.#ident) });
    }

    let gen = quote! {
        impl #impl_generics ::mongo_bsonutils::BsonStruct for #name #ty_generics #where_clause {
            fn struct_type() -> ::mongo_bsonutils::StructType {
                ::mongo_bsonutils::StructType {
                    type_id: ::std::any::TypeId::of::<Self>,
                    type_name: #name_str,
                    fields: || ::std::vec![#(#raw_fields),*],
                }
            }

            fn descriptor(&self) -> ::mongo_bsonutils::BsonResult<::std::sync::Arc<::mongo_bsonutils::TypeDescriptor>> {
                ::mongo_bsonutils::describe(&<Self as ::mongo_bsonutils::BsonStruct>::struct_type())
            }

            fn field(&self, index: usize) -> ::std::option::Option<&dyn ::mongo_bsonutils::Encode> {
                match index {
                    #(#field_arms,)*
                    _ => ::std::option::Option::None,
                }
            }

            fn field_mut(&mut self, index: usize) -> ::std::option::Option<&mut dyn ::mongo_bsonutils::Decode> {
                match index {
                    #(#field_mut_arms,)*
                    _ => ::std::option::Option::None,
                }
            }

            fn reset(&mut self) {
                *self = <Self as ::mongo_bsonutils::Decode>::zero();
            }
        }

        impl #impl_generics ::mongo_bsonutils::Encode for #name #ty_generics #where_clause {
            fn encode_element(
                &self,
                enc: &mut ::mongo_bsonutils::Encoder<'_>,
                key: &str,
                _min_size: bool,
            ) -> ::mongo_bsonutils::BsonResult<()> {
                ::mongo_bsonutils::ser::encode_struct_element(enc, key, self)
            }

            fn is_zero(&self) -> bool {
                true #(#zero_checks)*
            }

            fn as_inline(&self) -> ::std::option::Option<::mongo_bsonutils::describe::InlineRef<'_>> {
                ::std::option::Option::Some(::mongo_bsonutils::describe::InlineRef::Struct(self))
            }

            fn inline_kind() -> ::mongo_bsonutils::InlineKind {
                ::mongo_bsonutils::InlineKind::Struct(<Self as ::mongo_bsonutils::BsonStruct>::struct_type())
            }
        }

        impl #impl_generics ::mongo_bsonutils::Decode for #name #ty_generics #where_clause {
            fn decode_value(&mut self, value: &::mongo_bsonutils::Value) -> ::mongo_bsonutils::BsonResult<bool> {
                ::mongo_bsonutils::de::decode_struct_value(self, value)
            }

            fn as_inline_mut(&mut self) -> ::std::option::Option<::mongo_bsonutils::describe::InlineMut<'_>> {
                ::std::option::Option::Some(::mongo_bsonutils::describe::InlineMut::Struct(self))
            }

            fn zero() -> Self {
                Self {
                    #(#zero_inits,)*
                }
            }
        }

        impl #impl_generics ::mongo_bsonutils::Marshal for #name #ty_generics #where_clause {
            fn marshal_document(&self, enc: &mut ::mongo_bsonutils::Encoder<'_>) -> ::mongo_bsonutils::BsonResult<()> {
                ::mongo_bsonutils::ser::marshal_struct(enc, self)
            }
        }

        impl #impl_generics ::mongo_bsonutils::Unmarshal for #name #ty_generics #where_clause {
            fn unmarshal_document(&mut self, doc: &::mongo_bsonutils::Document) -> ::mongo_bsonutils::BsonResult<()> {
                ::mongo_bsonutils::de::decode_struct(self, doc)
            }
        }
    };

    Ok(TokenStream::from(gen))
}
