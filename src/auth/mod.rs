mod password;
mod validate;

pub use password::{hash_password, validate_password_strength, verify_password, PasswordError};
pub use validate::{validate_email, validate_username};
