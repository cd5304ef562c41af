//! Authentication module for Tubeline

pub mod cookies;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod session;

pub use jwt::{Claims, JwtError, JwtManager, TokenType};
pub use middleware::{authenticate, extract_access_token, require_auth, CurrentUser};
pub use password::{hash_password, verify_against_dummy, verify_password, PasswordError, PasswordHash};
pub use session::TokenService;
