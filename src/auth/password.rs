/// Hash a plaintext password with bcrypt at the given cost.
pub fn hash_password(plaintext: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(plaintext, cost)
}

/// Verify a plaintext password against a stored bcrypt hash.
/// Malformed hashes verify as false.
pub fn verify_password(plaintext: &str, hash: &str) -> bool {
    bcrypt::verify(plaintext, hash).unwrap_or(false)
}

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn validate_password(plaintext: &str) -> Result<(), String> {
    if plaintext.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_original_only() {
        let hash = hash_password("secret1", 4).unwrap();
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
    }

    #[test]
    fn same_password_hashes_differently() {
        let a = hash_password("secret1", 4).unwrap();
        let b = hash_password("secret1", 4).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_does_not_verify() {
        assert!(!verify_password("secret1", "not-a-bcrypt-hash"));
    }

    #[test]
    fn short_passwords_rejected() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }
}
