use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Newtype for a PIN to prevent accidental logging
#[derive(Clone)]
pub struct Pin(String);

impl std::fmt::Debug for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Pin(****)")
    }
}

impl Pin {
    /// Parse a PIN; exactly four ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.len() == 4 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err("PIN must be exactly 4 digits".to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Hash a PIN using Argon2
///
/// Salt is generated per call and embedded in the PHC string.
pub fn hash_pin(pin: &Pin) -> Result<String, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let hash = argon2
        .hash_password(pin.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash PIN: {}", e))?
        .to_string();

    Ok(hash)
}

/// Check a PIN against a stored hash.
///
/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_pin(pin: &Pin, pin_hash: &str) -> Result<bool, anyhow::Error> {
    let parsed_hash = PasswordHash::new(pin_hash)
        .map_err(|e| anyhow::anyhow!("Invalid PIN hash format: {}", e))?;

    Ok(Argon2::default()
        .verify_password(pin.as_str().as_bytes(), &parsed_hash)
        .is_ok())
}
