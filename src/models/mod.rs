//! Domain records, request payloads and response views.
//!
//! Records derive `FromRow` and map one-to-one onto the tables in `migrations/`.
//! Every public type also derives `TS` (front-end bindings) and `ToSchema` (OpenAPI).

mod activity;
mod analytics;
mod assessment;
mod assignment;
mod common;
mod learning_path;
mod module;
mod organization;
mod survey;
mod team;
mod user;

pub use activity::*;
pub use analytics::*;
pub use assessment::*;
pub use assignment::*;
pub use common::*;
pub use learning_path::*;
pub use module::*;
pub use organization::*;
pub use survey::*;
pub use team::*;
pub use user::*;
