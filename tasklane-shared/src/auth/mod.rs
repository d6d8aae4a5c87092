/// Authentication utilities
///
/// This module provides the security primitives used by the API:
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and verification
/// - [`jwt`]: JWT token generation and validation (HS256)
/// - [`csrf`]: Signed double-submit CSRF tokens for web forms
///
/// # Example
///
/// ```no_run
/// use tasklane_shared::auth::password::{hash_password, verify_password};
/// use tasklane_shared::auth::jwt::{create_token, Claims};
/// use chrono::Duration;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let claims = Claims::new(Uuid::new_v4(), Duration::minutes(60));
/// let token = create_token(&claims, "secret-key-at-least-32-bytes-long!")?;
/// # Ok(())
/// # }
/// ```

pub mod csrf;
pub mod jwt;
pub mod password;
