// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Certificate pinning for the device's self-signed HTTPS certificate.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use sha2::{Digest, Sha256};

use crate::error::TransportError;

/// Accepts exactly one leaf certificate, identified by its SHA-256 digest.
///
/// Handshake signatures are still verified, so a peer must hold the private
/// key of the pinned certificate.
#[derive(Debug)]
pub(crate) struct PinnedCertVerifier {
    expected: [u8; 32],
    provider: Arc<CryptoProvider>,
}

impl PinnedCertVerifier {
    pub(crate) fn new(expected: [u8; 32], provider: Arc<CryptoProvider>) -> Self {
        Self { expected, provider }
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
        let digest = Sha256::digest(end_entity.as_ref());
        if digest.as_slice() == self.expected {
            Ok(ServerCertVerified::assertion())
        } else {
            tracing::warn!(
                expected = %hex::encode(self.expected),
                actual = %hex::encode(digest),
                "Pinned certificate mismatch"
            );
            Err(rustls::Error::General(
                "certificate does not match pinned fingerprint".to_string(),
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Builds a client config that trusts only the pinned certificate.
pub(crate) fn pinned_client_config(expected: [u8; 32]) -> Result<ClientConfig, TransportError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = PinnedCertVerifier::new(expected, Arc::clone(&provider));

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier_for(cert: &[u8]) -> PinnedCertVerifier {
        let digest: [u8; 32] = Sha256::digest(cert).into();
        PinnedCertVerifier::new(digest, Arc::new(rustls::crypto::ring::default_provider()))
    }

    fn verify(verifier: &PinnedCertVerifier, cert: &[u8]) -> Result<ServerCertVerified, rustls::Error> {
        let server_name = ServerName::try_from("mpower.local").unwrap();
        verifier.verify_server_cert(
            &CertificateDer::from(cert.to_vec()),
            &[],
            &server_name,
            &[],
            UnixTime::now(),
        )
    }

    #[test]
    fn accepts_pinned_certificate() {
        let verifier = verifier_for(b"device certificate");
        assert!(verify(&verifier, b"device certificate").is_ok());
    }

    #[test]
    fn rejects_other_certificate() {
        let verifier = verifier_for(b"device certificate");
        assert!(verify(&verifier, b"attacker certificate").is_err());
    }

    #[test]
    fn advertises_signature_schemes() {
        let verifier = verifier_for(b"x");
        assert!(!verifier.supported_verify_schemes().is_empty());
    }

    #[test]
    fn builds_client_config() {
        assert!(pinned_client_config([0; 32]).is_ok());
    }
}
