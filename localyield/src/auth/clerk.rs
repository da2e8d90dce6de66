//! Verification of Clerk session tokens.
//!
//! Clerk issues short-lived RS256 JWTs. Signing keys come from the instance's JWKS endpoint and
//! are cached per `kid`; an unknown `kid` triggers one refetch, which covers key rotation. A
//! static PEM key can be configured instead for air-gapped or test setups.

use crate::config::ClerkConfig;
use crate::errors::Error;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header, jwk::JwkSet};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

/// Claims read from a Clerk session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClerkClaims {
    /// Clerk user id, stored as the user's `external_id`
    pub sub: String,
    pub iss: String,
    pub exp: i64,
    #[serde(default)]
    pub azp: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

enum KeySource {
    Static(DecodingKey),
    Jwks {
        url: Url,
        client: reqwest::Client,
        keys: Cache<String, DecodingKey>,
    },
}

pub struct ClerkVerifier {
    issuer: String,
    authorized_parties: Vec<String>,
    leeway_secs: u64,
    source: KeySource,
}

impl std::fmt::Debug for ClerkVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClerkVerifier").field("issuer", &self.issuer).finish_non_exhaustive()
    }
}

fn unauthenticated(message: &str) -> Error {
    Error::Unauthenticated {
        message: Some(message.to_string()),
    }
}

impl ClerkVerifier {
    pub fn from_config(config: &ClerkConfig) -> anyhow::Result<Self> {
        let issuer = config
            .issuer
            .clone()
            .ok_or_else(|| anyhow::anyhow!("auth.clerk.issuer is required"))?;

        let source = match &config.public_key_pem {
            Some(pem) => KeySource::Static(DecodingKey::from_rsa_pem(pem.as_bytes())?),
            None => {
                let url = config
                    .resolved_jwks_url()
                    .ok_or_else(|| anyhow::anyhow!("auth.clerk needs a JWKS url or a public key"))?;
                KeySource::Jwks {
                    url,
                    client: reqwest::Client::builder().timeout(std::time::Duration::from_secs(10)).build()?,
                    keys: Cache::builder().time_to_live(config.jwks_cache_ttl).max_capacity(64).build(),
                }
            }
        };

        Ok(Self {
            issuer,
            authorized_parties: config.authorized_parties.clone(),
            leeway_secs: config.leeway_secs,
            source,
        })
    }

    /// Fetch the JWKS and cache every RSA key it carries.
    #[instrument(skip_all, err)]
    async fn refresh_keys(url: &Url, client: &reqwest::Client, keys: &Cache<String, DecodingKey>) -> Result<(), Error> {
        let set: JwkSet = client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Other(anyhow::anyhow!("fetching JWKS from {url}: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Other(anyhow::anyhow!("decoding JWKS from {url}: {e}")))?;

        for jwk in &set.keys {
            let Some(kid) = jwk.common.key_id.clone() else { continue };
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => keys.insert(kid, key).await,
                Err(e) => warn!(kid = %kid, error = %e, "Skipping unusable JWKS key"),
            }
        }
        debug!(count = set.keys.len(), "Refreshed Clerk signing keys");
        Ok(())
    }

    async fn key_for(&self, kid: Option<&str>) -> Result<DecodingKey, Error> {
        match &self.source {
            KeySource::Static(key) => Ok(key.clone()),
            KeySource::Jwks { url, client, keys } => {
                let kid = kid.ok_or_else(|| unauthenticated("Session token has no key id"))?;
                if let Some(key) = keys.get(kid).await {
                    return Ok(key);
                }
                Self::refresh_keys(url, client, keys).await?;
                keys.get(kid).await.ok_or_else(|| unauthenticated("Session token signed with an unknown key"))
            }
        }
    }

    /// Verify signature, issuer, expiry and authorized party.
    pub async fn verify(&self, token: &str) -> Result<ClerkClaims, Error> {
        let header = decode_header(token).map_err(|_| unauthenticated("Malformed session token"))?;
        if header.alg != Algorithm::RS256 {
            return Err(unauthenticated("Unsupported session token algorithm"));
        }
        let key = self.key_for(header.kid.as_deref()).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = self.leeway_secs;

        let claims = decode::<ClerkClaims>(token, &key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => unauthenticated("Session expired"),
                _ => unauthenticated("Invalid session token"),
            })?
            .claims;

        if !self.authorized_parties.is_empty() {
            let allowed = claims
                .azp
                .as_deref()
                .is_some_and(|azp| self.authorized_parties.iter().any(|party| party == azp));
            if !allowed {
                return Err(unauthenticated("Session token issued for another origin"));
            }
        }

        Ok(claims)
    }
}
