use rand::rngs::OsRng;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};
use sha2::{Digest, Sha256};

/// Generate a new secp256k1 keypair and return (priv_hex, pub_hex_compressed, address_hex).
/// The address is the hex of the compressed public key, so it doubles as the
/// sender identity that signatures are checked against.
pub fn generate_keypair_hex() -> (String, String, String) {
    let secp = Secp256k1::new();
    let (sk, pk) = secp.generate_keypair(&mut OsRng);
    let sk_hex = hex::encode(sk.secret_bytes());
    let pk_hex = hex::encode(pk.serialize()); // compressed (33 bytes)
    let address = pk_hex.clone();
    (sk_hex, pk_hex, address)
}

/// Derive the public identity (hex of compressed pubkey) for a hex private key.
pub fn public_key_for_secret_hex(secret_hex: &str) -> Result<String, &'static str> {
    let sk = parse_secret(secret_hex)?;
    let secp = Secp256k1::signing_only();
    Ok(hex::encode(PublicKey::from_secret_key(&secp, &sk).serialize()))
}

/// SHA-256 of an arbitrary payload.
pub fn digest(payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

/// Sign a 32-byte message hash with a hex private key; returns hex DER.
pub fn sign_digest_hex(secret_hex: &str, msg32: [u8; 32]) -> Result<String, &'static str> {
    let sk = parse_secret(secret_hex)?;
    let secp = Secp256k1::signing_only();
    let msg = Message::from_digest(msg32);
    let sig = secp.sign_ecdsa(&msg, &sk);
    Ok(hex::encode(&sig.serialize_der()[..]))
}

/// Verify a signature (hex DER) against the given pubkey (hex, compressed)
/// and message hash (32 bytes).
pub fn verify_signature_hex(
    pubkey_hex: &str,
    sig_hex: &str,
    msg32: [u8; 32],
) -> Result<bool, &'static str> {
    let secp = Secp256k1::verification_only();

    let sig_bytes = hex::decode(sig_hex).map_err(|_| "invalid signature hex")?;
    let sig = Signature::from_der(&sig_bytes).map_err(|_| "invalid DER signature")?;

    let pk_bytes = hex::decode(pubkey_hex).map_err(|_| "invalid pubkey hex")?;
    let pk = PublicKey::from_slice(&pk_bytes).map_err(|_| "invalid pubkey bytes")?;

    let msg = Message::from_digest(msg32);
    Ok(secp.verify_ecdsa(&msg, &sig, &pk).is_ok())
}

fn parse_secret(secret_hex: &str) -> Result<SecretKey, &'static str> {
    let bytes = hex::decode(secret_hex).map_err(|_| "invalid private key hex")?;
    SecretKey::from_slice(&bytes).map_err(|_| "invalid private key bytes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_sign_and_verify() {
        let (sk, pk, addr) = generate_keypair_hex();
        assert_eq!(pk, addr);
        assert_eq!(public_key_for_secret_hex(&sk).unwrap(), pk);

        let msg = digest(b"hello");
        let sig = sign_digest_hex(&sk, msg).unwrap();
        assert!(verify_signature_hex(&pk, &sig, msg).unwrap());
        assert!(!verify_signature_hex(&pk, &sig, digest(b"other")).unwrap());
    }

    #[test]
    fn malformed_inputs_are_errors() {
        let (_, pk, _) = generate_keypair_hex();
        assert!(verify_signature_hex(&pk, "zz", [0u8; 32]).is_err());
        assert!(verify_signature_hex("nothex", "3006020101020101", [0u8; 32]).is_err());
        assert!(sign_digest_hex("00", [0u8; 32]).is_err());
    }
}
