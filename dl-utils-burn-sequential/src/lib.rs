use proc_macro::TokenStream;
use proc_macro2::{Literal, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput};

mod attrs;
mod layer;

use attrs::SequentialAttrs;
use layer::Layer;

/// Derives a layer-by-layer `forward` and a `<Name>Config` whose `init`
/// builds every field from its own config on the given device.
///
/// `Vec<_>` fields are applied in order and `Option<_>` fields are skipped when
/// `None`. `#[res]` adds the input to the output, `#[manual_forward]` leaves
/// `forward` to the caller and `#[dims(in, out)]` sets the tensor ranks.
#[proc_macro_derive(SequentialForward, attributes(res, manual_forward, dims))]
pub fn sequential_forward(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let DeriveInput {
        attrs,
        ident: module_name,
        generics,
        data,
        ..
    } = input;
    let attrs = SequentialAttrs::parse(&attrs)?;

    let backend = match generics.type_params().next() {
        Some(param) => &param.ident,
        None => {
            return Err(syn::Error::new_spanned(
                &module_name,
                "expected a backend type parameter",
            ))
        }
    };
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let record_name = format_ident!("{}Record", module_name);
    let config_name = format_ident!("{}Config", module_name);

    let fields = match data {
        Data::Struct(data) => data.fields,
        _ => {
            return Err(syn::Error::new_spanned(
                &module_name,
                "SequentialForward only supports structs",
            ))
        }
    };
    let layers = fields
        .iter()
        .map(Layer::from_field)
        .collect::<syn::Result<Vec<_>>>()?;

    let forward_fn = if attrs.manual_forward {
        quote! {}
    } else {
        let (d_in, d_out) = attrs.dims.ok_or_else(|| {
            syn::Error::new_spanned(&module_name, "missing `#[dims(in, out)]` attribute")
        })?;
        let d_in = Literal::usize_unsuffixed(d_in);
        let d_out = Literal::usize_unsuffixed(d_out);
        let statements = layers.iter().map(Layer::forward_statement);
        let (input, output) = if attrs.residual {
            (quote! { input.clone() }, quote! { x + input })
        } else {
            (quote! { input }, quote! { x })
        };

        quote! {
            pub fn forward(
                &self,
                input: burn::tensor::Tensor<#backend, #d_in>,
            ) -> burn::tensor::Tensor<#backend, #d_out> {
                let x = #input;
                #(#statements)*
                #output
            }
        }
    };

    let config_fields = layers.iter().map(Layer::config_field);
    let init_fields = layers.iter().map(Layer::init_field);

    Ok(quote! {
        impl #impl_generics #module_name #ty_generics #where_clause {
            #forward_fn
        }

        #[derive(burn::config::Config)]
        pub struct #config_name {
            #(#config_fields,)*
        }

        impl #config_name {
            pub fn init #impl_generics (&self, device: &#backend::Device) -> #module_name #ty_generics
            #where_clause
            {
                #module_name {
                    #(#init_fields,)*
                }
            }

            pub fn init_with #impl_generics (
                &self,
                record: #record_name #ty_generics,
                device: &#backend::Device,
            ) -> #module_name #ty_generics
            #where_clause
            {
                burn::module::Module::load_record(self.init(device), record)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn error(input: DeriveInput) -> String {
        match expand(input) {
            Ok(_) => panic!("expected an error"),
            Err(err) => err.to_string(),
        }
    }

    #[test]
    fn expands_forward_and_config() {
        let output = expand(parse_quote! {
            #[dims(2, 3)]
            struct Net<B: Backend> {
                layers: Vec<Linear<B>>,
                norm: Option<LayerNorm<B>>,
            }
        })
        .unwrap()
        .to_string();

        assert!(output.contains("pub struct NetConfig"));
        assert!(output.contains("pub layers : :: std :: vec :: Vec < LinearConfig >"));
        assert!(output.contains("pub norm : :: core :: option :: Option < LayerNormConfig >"));
        assert!(output.contains("Tensor < B , 3 >"));
        assert!(output.contains("record : NetRecord < B >"));
    }

    #[test]
    fn manual_forward_needs_no_dims() {
        let output = expand(parse_quote! {
            #[manual_forward]
            struct Net<B: Backend> {
                linear: Linear<B>,
            }
        })
        .unwrap()
        .to_string();

        assert!(!output.contains("fn forward"));
        assert!(output.contains("pub fn init"));
    }

    #[test]
    fn reports_errors() {
        assert!(error(parse_quote! {
            struct Net<B: Backend> { linear: Linear<B> }
        })
        .contains("missing `#[dims(in, out)]`"));

        assert!(error(parse_quote! {
            #[dims(2)]
            struct Net<B: Backend> { linear: Linear<B> }
        })
        .contains("expected two ranks"));

        assert!(error(parse_quote! {
            #[dims(2, 2)]
            enum Net<B: Backend> { A(Linear<B>) }
        })
        .contains("only supports structs"));

        assert!(error(parse_quote! {
            #[dims(2, 2)]
            struct Net { linear: Linear }
        })
        .contains("backend type parameter"));

        assert!(error(parse_quote! {
            #[dims(2, 2)]
            struct Net<B: Backend>(Linear<B>);
        })
        .contains("fields must be named"));
    }
}
