//! roam — a client-side router core.
//!
//! This facade crate re-exports the roam sub-crates through a single
//! dependency. Import everything you need with:
//!
//! ```ignore
//! use roam::prelude::*;
//!
//! # async fn run() -> Result<(), RouterError> {
//! let router = Router::new(
//!     vec![
//!         Route::new("home", "/"),
//!         Route::new("users", "/users").child(Route::new("view", "/:id")),
//!     ],
//!     RouterOptions::new().with_default_route("home"),
//! )?;
//! router.start("/users/7").await?;
//! # Ok(())
//! # }
//! ```

pub extern crate roam_core;
pub extern crate roam_paths;

// Re-export everything from roam-core at the top level for convenience.
pub use roam_core::*;

pub mod prelude {
    pub use roam_core::prelude::*;
}
