use proc_macro::TokenStream;

mod assign;

/// Derive macro wiring shared resources into a unit's fields
///
/// Fields are discovered by type:
///
/// - `App` receives the whole application context
/// - `Arc<Container>` receives the resource container
/// - `Arc<Conf>` receives the configuration handle
/// - `Logger` receives a logger scoped to the unit
///
/// An embedded `App` also receives the container, configuration and scoped
/// logger individually. `#[assign(skip)]` leaves a field alone;
/// `#[assign(app)]`, `#[assign(container)]`, `#[assign(config)]` and
/// `#[assign(logger)]` classify fields whose type is aliased.
///
/// # Example
/// ```ignore
/// use ensemble::prelude::*;
///
/// #[derive(Default, Assign)]
/// pub struct Billing {
///     conf: Arc<Conf>,
///     log: Logger,
/// }
/// ```
#[proc_macro_derive(Assign, attributes(assign))]
pub fn derive_assign(input: TokenStream) -> TokenStream {
    assign::derive_assign(input)
}
