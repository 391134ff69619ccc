//! Procedural macros shared by the Cauchy coding crates.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Error, ItemFn, LitStr};

/// Run a test with a `tracing` subscriber that writes to the test harness.
///
/// The log level defaults to `DEBUG` and can be overridden with a string literal,
/// for example `#[test_traced("INFO")]`. The annotated crate must depend on
/// `tracing` and `tracing-subscriber`.
///
/// # Example
/// ```rust,ignore
/// use cauchy_macros::test_traced;
/// use tracing::debug;
///
/// #[test_traced("INFO")]
/// fn test_with_logs() {
///     debug!("filtered out");
///     assert_eq!(2 + 2, 4);
/// }
/// ```
#[proc_macro_attribute]
pub fn test_traced(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let level = if attr.is_empty() {
        "DEBUG".to_string()
    } else {
        parse_macro_input!(attr as LitStr).value()
    };
    let level = match level.to_uppercase().as_str() {
        "TRACE" => quote!(::tracing::Level::TRACE),
        "DEBUG" => quote!(::tracing::Level::DEBUG),
        "INFO" => quote!(::tracing::Level::INFO),
        "WARN" => quote!(::tracing::Level::WARN),
        "ERROR" => quote!(::tracing::Level::ERROR),
        other => {
            return Error::new(Span::call_site(), format!("unknown log level: {other}"))
                .to_compile_error()
                .into();
        }
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;

    let expanded = quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let subscriber = ::tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(#level)
                .with_line_number(true)
                .finish();
            let dispatcher = ::tracing::Dispatch::new(subscriber);
            ::tracing::dispatcher::with_default(&dispatcher, || #block)
        }
    };
    TokenStream::from(expanded)
}
