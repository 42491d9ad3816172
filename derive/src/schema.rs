use proc_macro::{Span, TokenStream};
use quote::{quote, ToTokens};
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Fields, Ident, Lit, Meta, NestedMeta, Type,
};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
enum RenameAll {
    #[default]
    None,
    PascalCase,
    CamelCase,
}

#[derive(Debug, Default)]
struct TypeAttribs {
    name: Option<String>,
    kind: Option<String>,
    bases: Vec<String>,
    allow_runtime: bool,
    on_before_set: Option<Ident>,
    rename_all: RenameAll,
}

#[derive(Debug, Default)]
struct FieldAttribs {
    skip: bool,
    rename: Option<String>,
    nested: bool,
    polymorphic: Option<String>,
    dynamic: bool,
    read_only: bool,
    flatten: bool,
}

pub fn derive_schema(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    let attribs = parse_type_attribs(&ast.attrs);
    let name = &ast.ident;
    let type_name = attribs.name.clone().unwrap_or_else(|| name.to_string());
    let kind = match attribs.kind.as_deref() {
        None | Some("concrete") => quote! { jsv_typeref::SchemaKind::Concrete },
        Some("abstract") => quote! { jsv_typeref::SchemaKind::Abstract },
        Some("interface") => quote! { jsv_typeref::SchemaKind::Interface },
        Some(kind) => panic!("Unknown schema kind: `{}`", kind),
    };
    let bases = attribs
        .bases
        .iter()
        .map(|content| {
            let ty = syn::parse_str::<Type>(content).unwrap();
            quote! { .base::<#ty>() }
        })
        .collect::<Vec<_>>();
    let allow_runtime = if attribs.allow_runtime {
        quote! { .allow_runtime() }
    } else {
        Default::default()
    };
    let on_before_set = match &attribs.on_before_set {
        Some(method) => quote! {
            .on_before_set(|this: &mut Self, name: &str, value: jsv_typeref::FieldValue| {
                this.#method(name, value)
            })
        },
        None => Default::default(),
    };
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();
    let fields = match ast.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields
                .named
                .iter()
                .filter_map(|field| {
                    let field_attribs = parse_field_attribs(&field.attrs);
                    if field_attribs.skip {
                        return None;
                    }
                    let ident = field.ident.as_ref().unwrap();
                    let key = field_attribs
                        .rename
                        .clone()
                        .unwrap_or_else(|| rename(&ident.to_string(), attribs.rename_all));
                    let ty = &field.ty;
                    Some(if field_attribs.read_only {
                        quote! { .read_only(#key) }
                    } else if field_attribs.flatten {
                        quote! { .flatten::<#ty>(|this: &mut Self| &mut this.#ident) }
                    } else if field_attribs.dynamic {
                        quote! { .dynamic(#key, |this: &mut Self| &mut this.#ident) }
                    } else if let Some(base) = &field_attribs.polymorphic {
                        let base = syn::parse_str::<Type>(base).unwrap();
                        quote! { .polymorphic::<#base>(#key, |this: &mut Self| &mut this.#ident) }
                    } else if field_attribs.nested {
                        quote! { .nested::<#ty>(#key, |this: &mut Self| &mut this.#ident) }
                    } else {
                        quote! { .field::<#ty>(#key, |this: &mut Self| &mut this.#ident) }
                    })
                })
                .collect::<Vec<_>>(),
            Fields::Unit => vec![],
            Fields::Unnamed(_) => panic!("JsvSchema requires named fields: `{}`", name),
        },
        _ => panic!("JsvSchema can be derived only for structs: `{}`", name),
    };
    quote! {
        impl #impl_generics jsv_typeref::Schema for #name #ty_generics #where_clause {
            fn schema() -> jsv_typeref::SchemaBuilder<Self> {
                jsv_typeref::SchemaBuilder::new(#type_name)
                    .kind(#kind)
                    #( #bases )*
                    #allow_runtime
                    #( #fields )*
                    #on_before_set
            }
        }
    }
    .into()
}

fn rename(name: &str, rename_all: RenameAll) -> String {
    if rename_all == RenameAll::None {
        return name.to_owned();
    }
    let mut result = String::with_capacity(name.len());
    let mut upper = rename_all == RenameAll::PascalCase;
    for c in name.chars() {
        if c == '_' {
            upper = !result.is_empty();
        } else if upper {
            result.extend(c.to_uppercase());
            upper = false;
        } else {
            result.push(c);
        }
    }
    result
}

fn parse_type_attribs(attrs: &[Attribute]) -> TypeAttribs {
    let mut result = TypeAttribs::default();
    for attrib in attrs {
        match attrib.parse_meta() {
            Err(error) => panic!(
                "Could not parse attribute `{}`: {:?}",
                attrib.to_token_stream(),
                error
            ),
            Ok(Meta::List(meta)) => {
                if meta.path.is_ident("jsv") {
                    for meta in meta.nested {
                        match &meta {
                            NestedMeta::Meta(Meta::Path(path)) => {
                                if path.is_ident("allow_runtime") {
                                    result.allow_runtime = true;
                                }
                            }
                            NestedMeta::Meta(Meta::NameValue(meta)) => {
                                if let Lit::Str(value) = &meta.lit {
                                    if meta.path.is_ident("name") {
                                        result.name = Some(value.value());
                                    } else if meta.path.is_ident("kind") {
                                        result.kind = Some(value.value());
                                    } else if meta.path.is_ident("base") {
                                        result.bases.push(value.value());
                                    } else if meta.path.is_ident("on_before_set") {
                                        result.on_before_set = Some(Ident::new(
                                            &value.value(),
                                            Span::call_site().into(),
                                        ));
                                    } else if meta.path.is_ident("rename_all") {
                                        result.rename_all = match value.value().as_str() {
                                            "PascalCase" => RenameAll::PascalCase,
                                            "camelCase" => RenameAll::CamelCase,
                                            other => panic!("Unknown rename rule: `{}`", other),
                                        };
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            _ => {}
        }
    }
    result
}

fn parse_field_attribs(attrs: &[Attribute]) -> FieldAttribs {
    let mut result = FieldAttribs::default();
    for attrib in attrs {
        match attrib.parse_meta() {
            Err(error) => panic!(
                "Could not parse attribute `{}`: {:?}",
                attrib.to_token_stream(),
                error
            ),
            Ok(Meta::List(meta)) => {
                if meta.path.is_ident("jsv") {
                    for meta in meta.nested {
                        match &meta {
                            NestedMeta::Meta(Meta::Path(path)) => {
                                if path.is_ident("skip") {
                                    result.skip = true;
                                } else if path.is_ident("nested") {
                                    result.nested = true;
                                } else if path.is_ident("dynamic") {
                                    result.dynamic = true;
                                } else if path.is_ident("read_only") {
                                    result.read_only = true;
                                } else if path.is_ident("flatten") {
                                    result.flatten = true;
                                }
                            }
                            NestedMeta::Meta(Meta::NameValue(meta)) => {
                                if let Lit::Str(value) = &meta.lit {
                                    if meta.path.is_ident("rename") {
                                        result.rename = Some(value.value());
                                    } else if meta.path.is_ident("polymorphic") {
                                        result.polymorphic = Some(value.value());
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            _ => {}
        }
    }
    result
}
