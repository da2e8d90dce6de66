//! Signed cookie for local development logins.
//!
//! The cookie value is `<user_id>.<mac>` where `mac` is the URL-safe, unpadded base64 of
//! HMAC-SHA256 over the user id, keyed with `secret_key`. Nothing else is stored client-side, so
//! role and suspension changes apply on the next request.

use crate::config::DevStubConfig;
use crate::types::UserId;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Dev sessions outlive a working week.
const COOKIE_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

fn mac(secret: &str, user_id: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(user_id.as_bytes());
    Some(mac)
}

pub fn sign(user_id: UserId, secret: &str) -> Option<String> {
    let id = user_id.to_string();
    let tag = mac(secret, &id)?.finalize().into_bytes();
    Some(format!("{id}.{}", URL_SAFE_NO_PAD.encode(tag)))
}

/// The user id carried by a cookie value, if its signature checks out.
pub fn verify(value: &str, secret: &str) -> Option<UserId> {
    let (id, tag) = value.split_once('.')?;
    let user_id = Uuid::parse_str(id).ok()?;
    let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
    mac(secret, id)?.verify_slice(&tag).ok()?;
    Some(user_id)
}

/// `Set-Cookie` value establishing a dev session.
pub fn session_cookie(config: &DevStubConfig, value: &str) -> String {
    let secure = if config.cookie_secure { "; Secure" } else { "" };
    format!(
        "{}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={COOKIE_MAX_AGE_SECS}{secure}",
        config.cookie_name
    )
}

/// `Set-Cookie` value that clears the dev session.
pub fn clear_cookie(config: &DevStubConfig) -> String {
    let secure = if config.cookie_secure { "; Secure" } else { "" };
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{secure}", config.cookie_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_then_verify() {
        let user_id = Uuid::new_v4();
        let value = sign(user_id, "dev-secret").unwrap();
        assert!(value.starts_with(&user_id.to_string()));
        assert_eq!(verify(&value, "dev-secret"), Some(user_id));
    }

    #[test]
    fn test_rejects_tampering() {
        let user_id = Uuid::new_v4();
        let value = sign(user_id, "dev-secret").unwrap();
        assert_eq!(verify(&value, "other-secret"), None);

        let (_, tag) = value.split_once('.').unwrap();
        let forged = format!("{}.{tag}", Uuid::new_v4());
        assert_eq!(verify(&forged, "dev-secret"), None);

        assert_eq!(verify("garbage", "dev-secret"), None);
        assert_eq!(verify(&format!("{user_id}.!!!"), "dev-secret"), None);
    }

    #[test]
    fn test_cookie_attributes() {
        let config = DevStubConfig {
            cookie_secure: true,
            ..Default::default()
        };
        let cookie = session_cookie(&config, "abc");
        assert!(cookie.starts_with("ly_dev_user=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.ends_with("; Secure"));
        assert!(clear_cookie(&DevStubConfig::default()).contains("Max-Age=0"));
    }
}
