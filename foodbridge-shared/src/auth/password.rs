/// Password hashing with Argon2id
///
/// Hashes are PHC strings (`$argon2id$v=19$m=65536,t=3,p=4$<salt>$<hash>`), so
/// the parameters travel with each hash and can be raised later without
/// invalidating stored credentials.
///
/// # Example
///
/// ```
/// use foodbridge_shared::auth::password::{compare_password, hash_password};
///
/// let hash = hash_password("Harvest2024").unwrap();
/// assert!(compare_password("Harvest2024", &hash).unwrap());
/// assert!(!compare_password("harvest2024", &hash).unwrap());
/// ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, ParamsBuilder, Version,
};
use std::sync::OnceLock;

/// Memory cost in KiB (64 MiB)
const MEMORY_COST_KIB: u32 = 65536;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 4;
const OUTPUT_LEN: usize = 32;

/// Shortest accepted password
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Longest accepted password; bounds hashing work per request
pub const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashError(String),

    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),
}

fn params() -> Result<Params, PasswordError> {
    ParamsBuilder::new()
        .m_cost(MEMORY_COST_KIB)
        .t_cost(TIME_COST)
        .p_cost(PARALLELISM)
        .output_len(OUTPUT_LEN)
        .build()
        .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))
}

/// Hashes a plaintext password with a fresh random salt
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params()?);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashError(e.to_string()))?;

    Ok(hash.to_string())
}

/// Compares a candidate password against a stored hash in constant time
///
/// Returns `Ok(false)` for a wrong password and an error only when the stored
/// hash cannot be parsed or verification itself fails.
pub fn compare_password(candidate: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    // Parameters are read from the PHC string
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(e.to_string())),
    }
}

/// Hash of a throwaway password, built on first use with the live parameters
static DECOY_HASH: OnceLock<Option<String>> = OnceLock::new();

fn decoy_hash() -> Option<&'static str> {
    DECOY_HASH
        .get_or_init(|| hash_password("decoy-credential-7").ok())
        .as_deref()
}

/// Runs a full verification against a decoy hash and discards the result
///
/// Login calls this for unknown emails so the response takes as long as a
/// wrong password for a real account.
pub fn verify_decoy(candidate: &str) {
    if let Some(hash) = decoy_hash() {
        let _ = compare_password(candidate, hash);
    }
}

/// Checks the password policy: 8 to 128 characters with a letter and a digit
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at most {} characters long",
            MAX_PASSWORD_LENGTH
        ));
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err("Password must contain at least one letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_encodes_parameters() {
        let hash = hash_password("Compost42").expect("Hash should succeed");

        assert!(hash.starts_with("$argon2id$v=19$"));
        assert!(hash.contains("m=65536"));
        assert!(hash.contains("t=3"));
        assert!(hash.contains("p=4"));
    }

    #[test]
    fn test_hash_is_salted() {
        let a = hash_password("same_password1").unwrap();
        let b = hash_password("same_password1").unwrap();
        assert_ne!(a, b);
        assert!(compare_password("same_password1", &a).unwrap());
        assert!(compare_password("same_password1", &b).unwrap());
    }

    #[test]
    fn test_hash_does_not_contain_plaintext() {
        let hash = hash_password("VisibleSecret9").unwrap();
        assert!(!hash.contains("VisibleSecret9"));
    }

    #[test]
    fn test_compare_wrong_and_empty() {
        let hash = hash_password("Orchard77").unwrap();
        assert!(!compare_password("Orchard78", &hash).unwrap());
        assert!(!compare_password("", &hash).unwrap());
    }

    #[test]
    fn test_compare_unicode() {
        let hash = hash_password("pässwörd-1").unwrap();
        assert!(compare_password("pässwörd-1", &hash).unwrap());
        assert!(!compare_password("passwörd-1", &hash).unwrap());
    }

    #[test]
    fn test_compare_invalid_hash() {
        assert!(matches!(
            compare_password("anything", "not-a-phc-string"),
            Err(PasswordError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_decoy_uses_live_parameters() {
        let decoy = decoy_hash().expect("decoy hash");
        assert!(decoy.starts_with("$argon2id$v=19$m=65536,t=3,p=4$"));
        assert!(!compare_password("anything1", decoy).unwrap());

        // Repeated calls reuse the same hash
        verify_decoy("anything1");
        assert_eq!(decoy_hash(), Some(decoy));
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password_strength("bread2share").is_ok());
        assert!(validate_password_strength("short1").is_err());
        assert!(validate_password_strength("nodigitshere").is_err());
        assert!(validate_password_strength("1234567890").is_err());
        assert!(validate_password_strength(&"a1".repeat(65)).is_err());
    }
}
