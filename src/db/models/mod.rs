//! Database models split into domain-specific modules.

pub mod booking;
pub mod coach;
pub mod common;
pub mod member;
pub mod membership;
pub mod notification;
pub mod pt_package;
pub mod settings;

pub use booking::*;
pub use coach::*;
pub use common::*;
pub use member::*;
pub use membership::*;
pub use notification::*;
pub use pt_package::*;
pub use settings::*;
