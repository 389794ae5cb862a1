/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */
#![forbid(unsafe_code)]

//! Relaybus Macro Library
//!
//! Procedural macros for the Relaybus message-bus runtime.
//!
//! # Message Macro
//!
//! The [`bus_message`] macro prepares a type for travelling through send,
//! publish and consume pipelines:
//!
//! ```ignore
//! #[bus_message]
//! pub struct OrderSubmitted {
//!     pub order_id: Uuid,
//! }
//!
//! // Values-initialised messages need serde support
//! #[bus_message(serde)]
//! pub struct Reminder {
//!     pub text: String,
//! }
//! ```
//!
//! # Saga Instance Macro
//!
//! The [`saga_instance`] macro implements `SagaInstance` for a persisted saga
//! record that carries `correlation_id` and `current_state` fields:
//!
//! ```ignore
//! #[saga_instance]
//! pub struct OrderState {
//!     correlation_id: Uuid,
//!     current_state: String,
//!     order_total: u64,
//! }
//! ```
//!
//! # Test Macro
//!
//! [`bus_test`] runs an `async fn` test on a multi-threaded Tokio runtime
//! inside a tracing span named after the test:
//!
//! ```ignore
//! #[bus_test]
//! async fn test_publish() -> anyhow::Result<()> {
//!     Ok(())
//! }
//! ```

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, ItemFn};

fn has_derive(input: &DeriveInput, trait_name: &str) -> bool {
    input.attrs.iter().any(|attr| {
        if attr.path().is_ident("derive") {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(trait_name) {
                    found = true;
                }
                Ok(())
            });
            found
        } else {
            false
        }
    })
}

/// Returns `true` when `option` appears in the comma separated attribute list.
fn has_option(attr: &TokenStream, option: &str) -> bool {
    attr.to_string()
        .split(',')
        .any(|part| part.trim() == option)
}

/// Declares a type as a bus message.
///
/// Expands to:
/// - `#[derive(Clone, Debug)]` (only the traits not already derived)
/// - a compile-time assertion that the type is `Send + Sync + 'static`
///
/// With `#[bus_message(serde)]` it also derives `serde::Serialize` and
/// `serde::Deserialize`, which `MessageInitializerRegistry` needs to build the
/// message from a loosely-typed value bag.
#[proc_macro_attribute]
pub fn bus_message(attr: TokenStream, item: TokenStream) -> TokenStream {
    let with_serde = has_option(&attr, "serde");
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let derives = {
        let mut traits = Vec::new();
        if !has_derive(&input, "Clone") {
            traits.push(quote!(Clone));
        }
        if !has_derive(&input, "Debug") {
            traits.push(quote!(Debug));
        }
        if with_serde {
            if !has_derive(&input, "Serialize") {
                traits.push(quote!(serde::Serialize));
            }
            if !has_derive(&input, "Deserialize") {
                traits.push(quote!(serde::Deserialize));
            }
        }
        if traits.is_empty() {
            quote!()
        } else {
            quote!(#[derive(#(#traits),*)])
        }
    };

    let assert_ident = quote::format_ident!("_AssertBusMessage_{}", name);

    let expanded = quote! {
        #derives
        #input

        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case, clippy::needless_lifetimes)]
        const _: () = {
            fn #assert_ident #impl_generics () #where_clause {
                fn assert_bounds<T: Send + Sync + 'static>() {}
                assert_bounds::<#name #ty_generics>();
            }
        };
    };

    TokenStream::from(expanded)
}

/// Implements `SagaInstance` for a struct with `correlation_id` and
/// `current_state` fields.
///
/// Expands to `#[derive(Clone, Debug, Default)]` (only the traits not already
/// derived) and an implementation of `relaybus::saga::SagaInstance`. Use
/// `#[saga_instance(no_default)]` to supply `Default` by hand.
///
/// The current state is stored as the state's stable name, never an ordinal.
#[proc_macro_attribute]
pub fn saga_instance(attr: TokenStream, item: TokenStream) -> TokenStream {
    let no_default = has_option(&attr, "no_default");
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let field_names: Vec<String> = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => fields
                .named
                .iter()
                .filter_map(|field| field.ident.as_ref().map(ToString::to_string))
                .collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    for required in ["correlation_id", "current_state"] {
        if !field_names.iter().any(|field| field == required) {
            return syn::Error::new_spanned(
                name,
                format!("#[saga_instance] requires a named field `{required}`"),
            )
            .to_compile_error()
            .into();
        }
    }

    let derives = {
        let mut traits = Vec::new();
        if !has_derive(&input, "Clone") {
            traits.push(quote!(Clone));
        }
        if !has_derive(&input, "Debug") {
            traits.push(quote!(Debug));
        }
        if !no_default && !has_derive(&input, "Default") {
            traits.push(quote!(Default));
        }
        if traits.is_empty() {
            quote!()
        } else {
            quote!(#[derive(#(#traits),*)])
        }
    };

    let expanded = quote! {
        #derives
        #input

        impl #impl_generics ::relaybus::saga::SagaInstance for #name #ty_generics #where_clause {
            fn new(correlation_id: ::relaybus::uuid::Uuid) -> Self {
                Self {
                    correlation_id,
                    ..::core::default::Default::default()
                }
            }

            fn correlation_id(&self) -> ::relaybus::uuid::Uuid {
                self.correlation_id
            }

            fn current_state(&self) -> &str {
                &self.current_state
            }

            fn set_current_state(&mut self, state: &str) {
                self.current_state = state.to_string();
            }
        }
    };

    TokenStream::from(expanded)
}

/// Runs an `async fn` as a test on a multi-threaded Tokio runtime.
///
/// The body runs inside a `bus_test` tracing span carrying the test name. The
/// test keeps its return type, so `anyhow::Result<()>` tests still fail on `Err`.
#[proc_macro_attribute]
pub fn bus_test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let body = &input.block;
    let name = &sig.ident;
    let output = &sig.output;

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(sig.fn_token, "#[bus_test] requires an async fn")
            .to_compile_error()
            .into();
    }
    if !sig.inputs.is_empty() {
        return syn::Error::new_spanned(&sig.inputs, "#[bus_test] functions take no arguments")
            .to_compile_error()
            .into();
    }

    let async_name = syn::Ident::new(&format!("__{name}_async"), name.span());

    let expanded = quote! {
        #[test]
        #(#attrs)*
        #vis fn #name() #output {
            let runtime = ::tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("test runtime should build");
            runtime.block_on(async {
                let test_span = ::tracing::info_span!("bus_test", name = stringify!(#name));
                ::tracing::Instrument::instrument(#async_name(), test_span).await
            })
        }

        async fn #async_name() #output #body
    };

    expanded.into()
}
