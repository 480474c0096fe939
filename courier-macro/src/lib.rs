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

//! Courier Macro Library
//!
//! Procedural macros for the Courier dispatch core.
//!
//! # Message Macro
//!
//! The [`courier_message`] attribute prepares a type for travelling through
//! actor mailboxes and, optionally, across a transport as JSON:
//!
//! ```ignore
//! // Mailbox-only message
//! #[courier_message]
//! pub struct Tick;
//!
//! // Payload that is published through a transport
//! #[courier_message(json)]
//! pub struct OrderPlaced {
//!     pub order_id: u64,
//! }
//! ```

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, DeriveInput};

fn has_derive(input: &DeriveInput, trait_name: &str) -> bool {
    input.attrs.iter().any(|attr| {
        if !attr.path().is_ident("derive") {
            return false;
        }
        let mut found = false;
        let _ = attr.parse_nested_meta(|meta| {
            let last = meta.path.segments.last().map(|segment| segment.ident.to_string());
            if last.as_deref() == Some(trait_name) {
                found = true;
            }
            Ok(())
        });
        found
    })
}

/// Options accepted by `#[courier_message(...)]`.
#[derive(Default)]
struct MessageOptions {
    /// Derive serde support so the type can be used as a JSON payload.
    json: bool,
}

impl MessageOptions {
    fn parse(attr: &TokenStream) -> Self {
        let mut options = Self::default();
        for part in attr.to_string().split(',') {
            if part.trim() == "json" {
                options.json = true;
            }
        }
        options
    }
}

/// Prepares a type for use as a Courier message.
///
/// Expands to:
/// - `#[derive(Clone, Debug)]` for whichever of the two is not already derived
/// - with `json`, `serde::Serialize` and `serde::Deserialize` as well
/// - for non-generic types, a compile-time check that the type is `Send + 'static`,
///   which every mailbox requires
///
/// ```ignore
/// use courier_macro::courier_message;
///
/// #[courier_message(json)]
/// pub struct InvoiceIssued {
///     pub invoice_id: String,
///     pub amount_cents: i64,
/// }
/// ```
///
/// The `json` option expects `serde` to be a dependency of the calling crate.
#[proc_macro_attribute]
pub fn courier_message(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = MessageOptions::parse(&attr);
    let input = parse_macro_input!(item as DeriveInput);
    let name = &input.ident;

    let mut traits = Vec::new();
    if !has_derive(&input, "Clone") {
        traits.push(quote!(Clone));
    }
    if !has_derive(&input, "Debug") {
        traits.push(quote!(Debug));
    }
    if options.json {
        if !has_derive(&input, "Serialize") {
            traits.push(quote!(serde::Serialize));
        }
        if !has_derive(&input, "Deserialize") {
            traits.push(quote!(serde::Deserialize));
        }
    }
    let derives = if traits.is_empty() {
        quote!()
    } else {
        quote!(#[derive(#(#traits),*)])
    };

    // Generic messages are checked where they are instantiated instead.
    let assertion = if input.generics.params.is_empty() {
        let assert_ident = quote::format_ident!("_AssertCourierMessage_{}", name);
        quote! {
            #[doc(hidden)]
            #[allow(dead_code, non_snake_case)]
            const _: () = {
                fn #assert_ident() {
                    fn assert_bounds<T: Send + 'static>() {}
                    assert_bounds::<#name>();
                }
            };
        }
    } else {
        quote!()
    };

    let expanded = quote! {
        #derives
        #input
        #assertion
    };

    TokenStream::from(expanded)
}
