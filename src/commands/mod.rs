pub mod check;
pub mod request;
pub mod run;
pub mod utils;

pub use check::check;
pub use request::request;
pub use run::run;
