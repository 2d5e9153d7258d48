use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields, GenericArgument, Ident, PathArguments, Type};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Slot {
    App,
    Container,
    Config,
    Logger,
}

pub fn derive_assign(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match generate_assign_impl(&input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

fn generate_assign_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => fields.named.iter().collect::<Vec<_>>(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(fields) => {
                return Err(syn::Error::new_spanned(
                    fields,
                    "#[derive(Assign)] only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "#[derive(Assign)] can only be applied to structs",
            ));
        }
    };

    let mut slots: Vec<(Ident, Slot)> = Vec::new();
    for field in fields {
        if let Some(slot) = classify(field)? {
            if let Some(ident) = &field.ident {
                slots.push((ident.clone(), slot));
            }
        }
    }

    let of = |wanted: Slot| -> Vec<&Ident> {
        slots
            .iter()
            .filter(|(_, slot)| *slot == wanted)
            .map(|(ident, _)| ident)
            .collect()
    };
    let apps = of(Slot::App);
    let containers = of(Slot::Container);
    let configs = of(Slot::Config);
    let loggers = of(Slot::Logger);

    let mut probes = Vec::new();
    let mut impls = Vec::new();

    if !apps.is_empty() {
        probes.push(quote! {
            fn as_accepts_app(&mut self) -> ::core::option::Option<&mut dyn ::ensemble::unit::AcceptsApp> {
                ::core::option::Option::Some(self)
            }
        });
        impls.push(quote! {
            impl #impl_generics ::ensemble::unit::AcceptsApp for #struct_name #ty_generics #where_clause {
                fn accept_app(&mut self, app: &::ensemble::unit::App) {
                    #(self.#apps = ::core::clone::Clone::clone(app);)*
                }
            }
        });
    }

    // An embedded App takes the individual resources as well.
    if !apps.is_empty() || !containers.is_empty() {
        probes.push(quote! {
            fn as_accepts_container(&mut self) -> ::core::option::Option<&mut dyn ::ensemble::unit::AcceptsContainer> {
                ::core::option::Option::Some(self)
            }
        });
        impls.push(quote! {
            impl #impl_generics ::ensemble::unit::AcceptsContainer for #struct_name #ty_generics #where_clause {
                fn accept_container(&mut self, container: ::std::sync::Arc<::ensemble::di::Container>) {
                    #(self.#apps.container = ::std::sync::Arc::clone(&container);)*
                    #(self.#containers = ::std::sync::Arc::clone(&container);)*
                }
            }
        });
    }

    if !apps.is_empty() || !configs.is_empty() {
        probes.push(quote! {
            fn as_accepts_config(&mut self) -> ::core::option::Option<&mut dyn ::ensemble::unit::AcceptsConfig> {
                ::core::option::Option::Some(self)
            }
        });
        impls.push(quote! {
            impl #impl_generics ::ensemble::unit::AcceptsConfig for #struct_name #ty_generics #where_clause {
                fn accept_config(&mut self, conf: ::std::sync::Arc<::ensemble::config::Conf>) {
                    #(self.#apps.conf = ::std::sync::Arc::clone(&conf);)*
                    #(self.#configs = ::std::sync::Arc::clone(&conf);)*
                }
            }
        });
    }

    if !apps.is_empty() || !loggers.is_empty() {
        probes.push(quote! {
            fn as_accepts_logger(&mut self) -> ::core::option::Option<&mut dyn ::ensemble::unit::AcceptsLogger> {
                ::core::option::Option::Some(self)
            }
        });
        impls.push(quote! {
            impl #impl_generics ::ensemble::unit::AcceptsLogger for #struct_name #ty_generics #where_clause {
                fn accept_logger(&mut self, log: ::ensemble::logging::Logger) {
                    #(self.#apps.log = ::core::clone::Clone::clone(&log);)*
                    #(self.#loggers = ::core::clone::Clone::clone(&log);)*
                }
            }
        });
    }

    Ok(quote! {
        impl #impl_generics ::ensemble::unit::Assign for #struct_name #ty_generics #where_clause {
            #(#probes)*
        }

        #(#impls)*
    })
}

/// Explicit `#[assign(..)]` wins; otherwise the field type decides.
fn classify(field: &Field) -> syn::Result<Option<Slot>> {
    let mut explicit = None;
    let mut skip = false;

    for attr in field.attrs.iter().filter(|a| a.path().is_ident("assign")) {
        attr.parse_nested_meta(|meta| {
            let slot = if meta.path.is_ident("skip") {
                skip = true;
                return Ok(());
            } else if meta.path.is_ident("app") {
                Slot::App
            } else if meta.path.is_ident("container") {
                Slot::Container
            } else if meta.path.is_ident("config") {
                Slot::Config
            } else if meta.path.is_ident("logger") {
                Slot::Logger
            } else {
                return Err(meta.error("expected one of: skip, app, container, config, logger"));
            };
            explicit = Some(slot);
            Ok(())
        })?;
    }

    if skip {
        return Ok(None);
    }
    if explicit.is_some() {
        return Ok(explicit);
    }

    Ok(match last_ident(&field.ty).as_deref() {
        Some("App") => Some(Slot::App),
        Some("Logger") => Some(Slot::Logger),
        Some("Arc") => match arc_inner(&field.ty).and_then(last_ident).as_deref() {
            Some("Container") => Some(Slot::Container),
            Some("Conf") => Some(Slot::Config),
            _ => None,
        },
        _ => None,
    })
}

fn last_ident(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string()),
        _ => None,
    }
}

/// Extract `T` from `Arc<T>`
fn arc_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Arc" {
        return None;
    }
    match &segment.arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(inner) => Some(inner),
            _ => None,
        }),
        _ => None,
    }
}
