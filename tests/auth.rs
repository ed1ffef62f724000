//! Token and password-hashing tests for the API auth layer.

use uuid::Uuid;
use virtutrade::api::auth::{create_token, decode_token, hash_password, verify_password};

const SECRET: &[u8] = b"test-secret";

#[test]
fn token_round_trip_preserves_user_id() {
    let user_id = Uuid::new_v4();
    let token = create_token(SECRET, user_id).unwrap();
    let claims = decode_token(SECRET, &token).unwrap();
    assert_eq!(claims.sub, user_id.to_string());
    assert!(claims.exp > claims.iat);
}

#[test]
fn token_rejected_with_wrong_secret() {
    let token = create_token(SECRET, Uuid::new_v4()).unwrap();
    assert!(decode_token(b"other-secret", &token).is_err());
}

#[test]
fn garbage_token_rejected() {
    assert!(decode_token(SECRET, "not.a.token").is_err());
}

#[test]
fn password_hash_verifies_and_rejects() {
    let hash = hash_password("hunter22").unwrap();
    assert_ne!(hash, "hunter22");
    assert!(verify_password("hunter22", &hash));
    assert!(!verify_password("hunter23", &hash));
    assert!(!verify_password("hunter22", "not-a-phc-hash"));
}
