//! Request handlers.

pub mod bgm;
pub mod concat;
pub mod download;
pub mod edit;
pub mod form;
pub mod health;
pub mod process;
pub mod subtitle;

pub use bgm::bgm;
pub use concat::concat;
pub use download::download;
pub use edit::edit;
pub use health::{health, index, not_found};
pub use process::{info, process};
pub use subtitle::subtitle;
