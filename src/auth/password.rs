use anyhow::Context;
use bcrypt::{hash, verify, DEFAULT_COST};
use tracing::error;

// Tests hash on every user they create; the minimum cost keeps them fast.
#[cfg(not(test))]
const COST: u32 = DEFAULT_COST;
#[cfg(test)]
const COST: u32 = 4;

/// Bcrypt hash (`$2b$`) of `plain` with a random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    hash(plain, COST)
        .map_err(|e| {
            error!(error = %e, "bcrypt hash error");
            e
        })
        .context("hash password")
}

/// Checks `plain` against a `$2a$`, `$2b$` or `$2y$` hash.
/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    verify(plain, hash)
        .map_err(|e| {
            error!(error = %e, "bcrypt verify error");
            e
        })
        .context("verify password")
}
