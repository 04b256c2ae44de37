//! Server certificate pinning.
//!
//! The server runs with a self-signed certificate, so instead of a CA chain
//! the client checks the SHA-256 fingerprint of the presented certificate.
//! Handshake signatures are still verified with the pinned certificate's key.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, SignatureScheme};
use snapshot_server::tls::fingerprint;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub struct PinnedCertVerifier {
    expected: String,
    provider: Arc<CryptoProvider>,
    // Fingerprint of the last rejected certificate
    rejected: Mutex<Option<String>>,
}

impl PinnedCertVerifier {
    pub fn new(expected: &str, provider: Arc<CryptoProvider>) -> Self {
        Self {
            expected: expected.trim().to_ascii_lowercase(),
            provider,
            rejected: Mutex::new(None),
        }
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    /// Take the fingerprint of a certificate rejected since the last call.
    pub fn take_rejected(&self) -> Option<String> {
        self.rejected.lock().ok().and_then(|mut r| r.take())
    }
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let actual = fingerprint(end_entity);
        if actual == self.expected {
            return Ok(ServerCertVerified::assertion());
        }

        tracing::warn!("Server certificate fingerprint {} does not match pinned {}", actual, self.expected);
        if let Ok(mut rejected) = self.rejected.lock() {
            *rejected = Some(actual);
        }
        Err(rustls::Error::InvalidCertificate(
            CertificateError::ApplicationVerificationFailure,
        ))
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

/// TLS client configuration that trusts only the pinned certificate.
pub fn pinned_client_config(
    expected_fingerprint: &str,
) -> Result<(rustls::ClientConfig, Arc<PinnedCertVerifier>), rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = Arc::new(PinnedCertVerifier::new(expected_fingerprint, provider.clone()));

    let mut config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(verifier.clone())
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok((config, verifier))
}
