use anyhow::{Context, Result};

const HASH_COST: u32 = 10;

pub async fn hash_password(plaintext_pw: &str) -> Result<String> {
    let plaintext_pw = plaintext_pw.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(plaintext_pw, HASH_COST))
        .await
        .context("Password hashing task panicked")?
        .context("Failed to hash password")
}

pub async fn verify_password(plaintext_pw: &str, hash: &str) -> Result<bool> {
    let plaintext_pw = plaintext_pw.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(plaintext_pw, &hash))
        .await
        .context("Password verification task panicked")?
        .context("Stored password hash is malformed")
}
