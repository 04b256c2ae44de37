//! Server certificate handling.
//!
//! Clients do not validate a CA chain; they pin the SHA-256 fingerprint of
//! the DER-encoded certificate, which is printed at startup.

use anyhow::Context;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

pub struct TlsMaterial {
    pub cert: CertificateDer<'static>,
    pub key: PrivateKeyDer<'static>,
    cert_pem: String,
    key_pem: String,
}

impl TlsMaterial {
    /// Generate a self-signed certificate for `names`.
    pub fn generate(names: &[String]) -> anyhow::Result<Self> {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(names.to_vec())
                .context("failed to generate self-signed certificate")?;

        Ok(Self {
            cert: cert.der().clone(),
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }

    /// Load the first certificate and private key from PEM files.
    pub fn load(cert_path: &Path, key_path: &Path) -> anyhow::Result<Self> {
        let cert_pem = std::fs::read_to_string(cert_path)
            .with_context(|| format!("failed to read {}", cert_path.display()))?;
        let cert = rustls_pemfile::certs(&mut cert_pem.as_bytes())
            .next()
            .transpose()?
            .ok_or_else(|| anyhow::anyhow!("no certificate in {}", cert_path.display()))?;

        let key_pem = std::fs::read_to_string(key_path)
            .with_context(|| format!("failed to read {}", key_path.display()))?;
        let key = rustls_pemfile::private_key(&mut key_pem.as_bytes())?
            .ok_or_else(|| anyhow::anyhow!("no private key in {}", key_path.display()))?;

        Ok(Self {
            cert,
            key,
            cert_pem,
            key_pem,
        })
    }

    /// Write certificate and key as PEM so a restarted server keeps the same
    /// fingerprint. The key file is readable by its owner only.
    pub fn save(&self, cert_path: &Path, key_path: &Path) -> anyhow::Result<()> {
        std::fs::write(cert_path, &self.cert_pem)
            .with_context(|| format!("failed to write {}", cert_path.display()))?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(key_path)
            .with_context(|| format!("failed to create {}", key_path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(self.key_pem.as_bytes())?;
        Ok(())
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.cert)
    }

    pub fn server_config(&self) -> anyhow::Result<Arc<rustls::ServerConfig>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(vec![self.cert.clone()], self.key.clone_key())?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }
}

/// Lowercase hex SHA-256 of a DER certificate.
pub fn fingerprint(cert: &CertificateDer<'_>) -> String {
    hex::encode(Sha256::digest(cert.as_ref()))
}
