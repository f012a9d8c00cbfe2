use syn::{punctuated::Punctuated, Attribute, LitInt, Token};

/// Container attributes of a `SequentialForward` struct.
pub struct SequentialAttrs {
    pub residual: bool,
    pub manual_forward: bool,
    /// Tensor ranks of the input and the output.
    pub dims: Option<(usize, usize)>,
}

impl SequentialAttrs {
    pub fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut parsed = Self {
            residual: false,
            manual_forward: false,
            dims: None,
        };

        for attr in attrs {
            if attr.path().is_ident("res") {
                attr.meta.require_path_only()?;
                parsed.residual = true;
            } else if attr.path().is_ident("manual_forward") {
                attr.meta.require_path_only()?;
                parsed.manual_forward = true;
            } else if attr.path().is_ident("dims") {
                parsed.dims = Some(parse_dims(attr)?);
            }
        }

        Ok(parsed)
    }
}

fn parse_dims(attr: &Attribute) -> syn::Result<(usize, usize)> {
    let dims = attr.parse_args_with(Punctuated::<LitInt, Token![,]>::parse_terminated)?;
    match dims.iter().collect::<Vec<_>>()[..] {
        [d_in, d_out] => Ok((d_in.base10_parse()?, d_out.base10_parse()?)),
        _ => Err(syn::Error::new_spanned(
            attr,
            "expected two ranks, for example `#[dims(2, 2)]`",
        )),
    }
}
