//! Argon2id password hashing for account creation.
//!
//! Stored form: `argon2id$<salt hex>$<hash hex>`.

use argon2::{Algorithm, Argon2, Params, Version};

const SALT_LEN: usize = 16;
const OUTPUT_LEN: usize = 32;

// m=19 MiB, t=2, p=1.
const M_COST: u32 = 19 * 1024;
const T_COST: u32 = 2;
const P_COST: u32 = 1;

fn hasher() -> anyhow::Result<Argon2<'static>> {
    let params = Params::new(M_COST, T_COST, P_COST, Some(OUTPUT_LEN))
        .map_err(|e| anyhow::anyhow!("argon2 params: {e}"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn derive(password: &str, salt: &[u8]) -> anyhow::Result<[u8; OUTPUT_LEN]> {
    let mut output = [0u8; OUTPUT_LEN];
    hasher()?
        .hash_password_into(password.as_bytes(), salt, &mut output)
        .map_err(|e| anyhow::anyhow!("argon2: {e}"))?;
    Ok(output)
}

/// Hash `password` under a fresh random salt.
pub fn hash(password: &str) -> anyhow::Result<String> {
    let mut salt = [0u8; SALT_LEN];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut salt);
    let output = derive(password, &salt)?;
    Ok(format!("argon2id${}${}", hex::encode(salt), hex::encode(output)))
}
