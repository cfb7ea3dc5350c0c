//! Small declarative macros shared by the HTTP layer.

#[cfg(feature = "actix")]
#[doc(hidden)]
pub use actix_web;

/// Generates a `routes` function registering every listed handler.
///
/// ```ignore
/// macros_utils::routes! {
///     route health_route,
///     route list_monitors,
/// }
/// ```
#[cfg(feature = "actix")]
#[macro_export]
macro_rules! routes {
    ($(route $handler:ident),* $(,)?) => {
        pub fn routes(cfg: &mut $crate::actix_web::web::ServiceConfig) {
            $( cfg.service($handler); )*
        }
    };
}
