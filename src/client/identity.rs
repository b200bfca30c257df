// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Trusted (SSO) authentication material. The signed blob has the shape
//!
//! ```text
//! cn \t unix-epoch-seconds \t hostname \t  \t base64(signature)
//! ```
//!
//! where the signature covers everything before its own tab. The signature
//! primitive itself (keystore, RSA/ECDSA over SHA-1) stays outside the
//! crate behind [`ClientSigner`]; callers plug in whatever their keystore
//! tooling produces.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;

/// Signature provider for trusted authentication.
pub trait ClientSigner: Send + Sync {
    /// Common name of the signing certificate.
    fn common_name(&self) -> &str;

    /// Sign the raw auth-data bytes.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;
}

#[derive(Clone)]
pub struct Identity {
    pub trusted: bool,
    pub hostname: String,
    signer: Option<Arc<dyn ClientSigner>>,
}

impl Identity {
    pub fn trusted(hostname: &str, signer: Arc<dyn ClientSigner>) -> Self {
        Self {
            trusted: true,
            hostname: hostname.to_string(),
            signer: Some(signer),
        }
    }

    /// Trusted login relying purely on the OS account, with no signed blob.
    pub fn trusted_without_signer(hostname: &str) -> Self {
        Self {
            trusted: true,
            hostname: hostname.to_string(),
            signer: None,
        }
    }

    pub fn untrusted(hostname: &str) -> Self {
        Self {
            trusted: false,
            hostname: hostname.to_string(),
            signer: None,
        }
    }

    /// Assemble CLIENT_AUTH_DATA, or `None` when no signer is attached.
    pub fn auth_data(&self) -> Result<Option<String>> {
        let Some(signer) = &self.signer else {
            return Ok(None);
        };
        let data = format!(
            "{}\t{}\t{}\t{}",
            signer.common_name(),
            Utc::now().timestamp(),
            self.hostname,
            ""
        );
        let signature = signer.sign(data.as_bytes())?;
        Ok(Some(format!("{}\t{}", data, BASE64.encode(signature))))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("trusted", &self.trusted)
            .field("hostname", &self.hostname)
            .field("signer", &self.signer.is_some())
            .finish()
    }
}
