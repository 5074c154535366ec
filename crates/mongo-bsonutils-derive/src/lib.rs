//! # mongo-bsonutils derive macro
//!
//! `#[derive(BsonStruct)]` generates the per-type field table that
//! `mongo_bsonutils` turns into a cached type descriptor, together with the
//! `Encode`, `Decode`, `Marshal` and `Unmarshal` implementations.
//!
//! ## Field attribute
//!
//! `#[bson("[<key>][,<flag>...]")]` or `#[bson = "..."]`. Flags are
//! `omitempty`, `minsize` and `inline`; `#[bson("-")]` excludes the field.
//! The tag text is validated when the descriptor is first built, so a bad
//! flag surfaces as a configuration error from the first marshal/unmarshal.
//!
//! ```rust,ignore
//! use mongo_bsonutils::BsonStruct;
//!
//! #[derive(BsonStruct, Default)]
//! pub struct Product {
//!     #[bson("_id,omitempty")]
//!     pub id: ObjectId,
//!     pub name: String,
//!     #[bson(",inline")]
//!     pub extra: HashMap<String, Value>,
//! }
//! ```
//!
//! Excluded fields must implement `Default`; every other field must
//! implement `Encode` and `Decode`.

extern crate proc_macro;
mod bson_struct;

use crate::bson_struct::generate_bson_struct;
use proc_macro::TokenStream;
use syn::{Data, DeriveInput};

/// Derives `BsonStruct` for a struct with named fields.
///
/// # Errors
///
/// Returns a compile error if:
/// - The type is an enum, a union, a tuple struct or a unit struct
/// - A field carries more than one `#[bson]` attribute or a non-string tag
/// - The struct has lifetime parameters
#[proc_macro_derive(BsonStruct, attributes(bson))]
pub fn derive_bson_struct(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as DeriveInput);

    match ast.data {
        Data::Struct(ref data) => match generate_bson_struct(&ast, data) {
            Ok(token_stream) => token_stream,
            Err(e) => e.to_compile_error().into(),
        },
        Data::Enum(_) => {
            let error = syn::Error::new_spanned(
                &ast,
                "Cannot derive BsonStruct for enums. Only structs with named fields are supported.",
            );
            error.to_compile_error().into()
        }
        Data::Union(_) => {
            let error = syn::Error::new_spanned(
                &ast,
                "Cannot derive BsonStruct for unions. Only structs with named fields are supported.",
            );
            error.to_compile_error().into()
        }
    }
}
