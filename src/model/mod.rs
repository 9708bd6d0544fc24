pub mod validation;
pub mod window;
