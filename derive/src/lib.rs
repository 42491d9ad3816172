extern crate proc_macro;

mod schema;

use proc_macro::TokenStream;

#[proc_macro_derive(JsvSchema, attributes(jsv))]
pub fn derive_jsv_schema(input: TokenStream) -> TokenStream {
    crate::schema::derive_schema(input)
}
