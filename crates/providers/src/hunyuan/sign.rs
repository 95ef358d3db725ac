//! TC3-HMAC-SHA256 request signing for the Tencent Cloud API.

use chrono::{DateTime, Utc};
use gen3d_core::hashing::sha256_hex;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "TC3-HMAC-SHA256";

/// Headers covered by the signature, in canonical order.
pub const SIGNED_HEADERS: &str = "content-type;host";

const CONTENT_TYPE: &str = "application/json";

/// Credentials and scope for one service endpoint.
pub struct Signer<'a> {
    pub secret_id: &'a str,
    pub secret_key: &'a str,
    /// Short service name used in the credential scope, e.g. `ai3d`.
    pub service: &'a str,
    /// Host header value, e.g. `ai3d.tencentcloudapi.com`.
    pub host: &'a str,
}

impl Signer<'_> {
    /// Build the `Authorization` header for a JSON `POST /` request.
    pub fn authorization(&self, payload: &[u8], timestamp: i64) -> String {
        let date = signing_date(timestamp);
        let credential_scope = format!("{date}/{}/tc3_request", self.service);

        let canonical_request = format!(
            "POST\n/\n\ncontent-type:{CONTENT_TYPE}\nhost:{}\n\n{SIGNED_HEADERS}\n{}",
            self.host,
            sha256_hex(payload),
        );
        let string_to_sign = format!(
            "{ALGORITHM}\n{timestamp}\n{credential_scope}\n{}",
            sha256_hex(canonical_request.as_bytes()),
        );

        let secret_date = hmac_sha256(format!("TC3{}", self.secret_key).as_bytes(), date.as_bytes());
        let secret_service = hmac_sha256(&secret_date, self.service.as_bytes());
        let secret_signing = hmac_sha256(&secret_service, b"tc3_request");
        let signature = hex(&hmac_sha256(&secret_signing, string_to_sign.as_bytes()));

        format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            self.secret_id,
        )
    }
}

/// UTC calendar date of a Unix timestamp, `YYYY-MM-DD`.
fn signing_date(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> Signer<'static> {
        Signer {
            secret_id: "AKIDEXAMPLE",
            secret_key: "secret",
            service: "ai3d",
            host: "ai3d.tencentcloudapi.com",
        }
    }

    #[test]
    fn signing_date_is_utc() {
        // 2026-02-01T23:30:00Z
        assert_eq!(signing_date(1_769_988_600), "2026-02-01");
    }

    #[test]
    fn authorization_has_expected_shape() {
        let auth = signer().authorization(br#"{"JobId":"1"}"#, 1_769_988_600);
        assert!(auth.starts_with(
            "TC3-HMAC-SHA256 Credential=AKIDEXAMPLE/2026-02-01/ai3d/tc3_request, \
             SignedHeaders=content-type;host, Signature="
        ));
        let signature = auth.rsplit("Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_depends_on_payload_and_time() {
        let s = signer();
        let a = s.authorization(b"{}", 1_769_988_600);
        assert_eq!(a, s.authorization(b"{}", 1_769_988_600));
        assert_ne!(a, s.authorization(b"{ }", 1_769_988_600));
        assert_ne!(a, s.authorization(b"{}", 1_769_988_601));
    }
}
