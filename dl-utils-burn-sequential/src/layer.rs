use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{spanned::Spanned, Field, GenericArgument, Ident, PathArguments, Type, TypePath};

/// How a field takes part in the forward pass.
pub enum LayerKind {
    /// A module with its own `forward` and a `<Name>Config`.
    Single(Ident),
    /// Skipped when `None`.
    Optional(Box<LayerKind>),
    /// Applied in order.
    Repeated(Box<LayerKind>),
}

fn type_path(ty: &Type) -> syn::Result<&TypePath> {
    match ty {
        Type::Path(path) if path.qself.is_none() => Ok(path),
        _ => Err(syn::Error::new_spanned(ty, "expected a module type")),
    }
}

fn single_type_argument(args: &PathArguments) -> Option<&Type> {
    let PathArguments::AngleBracketed(args) = args else {
        return None;
    };
    match args.args.first() {
        Some(GenericArgument::Type(ty)) if args.args.len() == 1 => Some(ty),
        _ => None,
    }
}

impl LayerKind {
    pub fn from_type(ty: &Type) -> syn::Result<Self> {
        let path = type_path(ty)?;
        let segment = path
            .path
            .segments
            .last()
            .ok_or_else(|| syn::Error::new_spanned(ty, "empty type path"))?;

        let wrapper = |kind: fn(Box<Self>) -> Self| -> syn::Result<Self> {
            let inner = single_type_argument(&segment.arguments).ok_or_else(|| {
                syn::Error::new(segment.span(), "expected a single type argument")
            })?;
            Ok(kind(Box::new(Self::from_type(inner)?)))
        };

        if segment.ident == "Option" {
            wrapper(Self::Optional)
        } else if segment.ident == "Vec" {
            wrapper(Self::Repeated)
        } else {
            Ok(Self::Single(segment.ident.clone()))
        }
    }

    /// Code that forwards the tensor `x` through `layer` and evaluates to the result.
    fn forward(&self) -> TokenStream {
        match self {
            Self::Single(_) => quote! { layer.forward(x) },
            Self::Optional(inner) => {
                let inner = inner.forward();
                quote! {
                    match layer {
                        Some(layer) => { #inner }
                        None => x,
                    }
                }
            }
            Self::Repeated(inner) => {
                let inner = inner.forward();
                quote! {
                    layer.iter().fold(x, |x, layer| { #inner })
                }
            }
        }
    }

    fn config_type(&self) -> TokenStream {
        match self {
            Self::Single(name) => {
                let config = format_ident!("{}Config", name);
                quote! { #config }
            }
            Self::Optional(inner) => {
                let inner = inner.config_type();
                quote! { ::core::option::Option<#inner> }
            }
            Self::Repeated(inner) => {
                let inner = inner.config_type();
                quote! { ::std::vec::Vec<#inner> }
            }
        }
    }

    /// Code that builds the module from the `config` in scope.
    fn init(&self) -> TokenStream {
        match self {
            Self::Single(_) => quote! { config.init(device) },
            Self::Optional(inner) => {
                let inner = inner.init();
                quote! { config.as_ref().map(|config| { #inner }) }
            }
            Self::Repeated(inner) => {
                let inner = inner.init();
                quote! { config.iter().map(|config| { #inner }).collect() }
            }
        }
    }
}

pub struct Layer<'a> {
    pub name: &'a Ident,
    pub kind: LayerKind,
}

impl<'a> Layer<'a> {
    pub fn from_field(field: &'a Field) -> syn::Result<Self> {
        let name = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "fields must be named"))?;
        let kind = LayerKind::from_type(&field.ty)?;
        Ok(Self { name, kind })
    }

    pub fn forward_statement(&self) -> TokenStream {
        let name = self.name;
        let forward = self.kind.forward();
        quote! {
            let x = {
                let layer = &self.#name;
                #forward
            };
        }
    }

    pub fn config_field(&self) -> TokenStream {
        let name = self.name;
        let ty = self.kind.config_type();
        quote! { pub #name: #ty }
    }

    pub fn init_field(&self) -> TokenStream {
        let name = self.name;
        let init = self.kind.init();
        quote! {
            #name: {
                let config = &self.#name;
                #init
            }
        }
    }
}
