use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Helper function to create URL-safe base64 encoding without padding
pub fn base64_url_encode(input: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.encode(input)
}

/// `len` bytes from the OS RNG, base64url encoded.
pub fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    base64_url_encode(&bytes)
}

/// Generate a PKCE code verifier and its S256 challenge.
///
/// 64 random bytes encode to 86 characters, inside the 43..=128 window
/// RFC 7636 allows.
pub fn generate_pkce_pair() -> (String, String) {
    let code_verifier = random_token(64);
    let code_challenge = pkce_challenge(&code_verifier);
    (code_verifier, code_challenge)
}

/// S256 code challenge for a verifier.
pub fn pkce_challenge(code_verifier: &str) -> String {
    base64_url_encode(&Sha256::digest(code_verifier.as_bytes()))
}
