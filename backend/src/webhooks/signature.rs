//! HMAC-SHA256 signing of webhook bodies.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase-hex HMAC-SHA256 of the body, for the `X-Signature` header.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time verification of a provided hex signature.
pub fn verify(secret: &str, body: &[u8], provided: &str) -> bool {
    let Ok(expected) = hex::decode(provided) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn signature_matches_reference_vector() {
        // hmac_sha256("shh", b"{\"x\":1}")
        assert_eq!(
            sign("shh", br#"{"x":1}"#),
            "69665374233fc471d160d1dadaae97719172691a415993ca8dded0bbebfe0ba7"
        );
    }

    #[rstest]
    fn verify_round_trips_and_rejects_tampering() {
        let body = br#"{"hello":"world"}"#;
        let signature = sign("topsecret", body);
        assert!(verify("topsecret", body, &signature));
        assert!(!verify("topsecret", br#"{"hello":"mars"}"#, &signature));
        assert!(!verify("othersecret", body, &signature));
        assert!(!verify("topsecret", body, "not-hex"));
    }
}
