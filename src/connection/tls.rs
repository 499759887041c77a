//! Credential bundles and TLS policy.
//!
//! A [`Credentials`] bundle pairs trust anchors with optional certificate
//! and key material under one fixed, conservative cipher policy. The
//! channel this crate manages carries internal control-plane traffic, so
//! negotiation parameters are deliberately not caller-tunable: a fixed
//! baseline removes a configuration-error surface.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pemfile::Item;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName};

use crate::engine::EngineGuard;
use crate::{Error, Result};

/// Connection end type for a credential bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsRole {
    /// Initiates the handshake and verifies the peer certificate
    Client,
    /// Accepts the handshake; client certificates are requested, not required
    Server,
}

impl std::fmt::Display for TlsRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
        }
    }
}

#[derive(Clone)]
pub(crate) enum CredentialConfig {
    Client(Arc<ClientConfig>),
    Server(Arc<ServerConfig>),
}

/// Immutable bundle of trust anchors and optional certificate material.
///
/// Cheap to clone and shareable across any number of sessions; the compiled
/// TLS configuration is reference-counted, so the bundle outlives every
/// session built from it without caller bookkeeping.
#[derive(Clone)]
pub struct Credentials {
    role: TlsRole,
    config: CredentialConfig,
    _engine: EngineGuard,
}

impl Credentials {
    /// Create a builder for a bundle with the given role.
    pub fn builder(role: TlsRole) -> CredentialsBuilder {
        CredentialsBuilder {
            role,
            ca_file: None,
            cert_file: None,
            key_file: None,
        }
    }

    /// Role this bundle was built for.
    pub fn role(&self) -> TlsRole {
        self.role
    }

    pub(crate) fn config(&self) -> &CredentialConfig {
        &self.config
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("role", &self.role)
            .field("config", &"<TlsConfig>")
            .finish()
    }
}

/// Builder for [`Credentials`].
///
/// The certificate and key files must be supplied together or not at all;
/// `build()` rejects a lone half of the pair before touching any file.
#[derive(Debug)]
pub struct CredentialsBuilder {
    role: TlsRole,
    ca_file: Option<PathBuf>,
    cert_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
}

impl CredentialsBuilder {
    /// Set the path to a CA trust file (PEM format).
    ///
    /// Without one, platform trust anchors are used, falling back to the
    /// bundled webpki roots when the platform store yields nothing.
    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    /// Set the path to the certificate file (PEM format).
    pub fn cert_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_file = Some(path.into());
        self
    }

    /// Set the path to the private key file (PEM format).
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    /// Build the credential bundle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] if only one of certificate/key was
    /// supplied, a file cannot be read, or the PEM material is malformed.
    /// Partially-built TLS state is dropped on every failure path.
    pub fn build(self) -> Result<Credentials> {
        let identity = match (&self.cert_file, &self.key_file) {
            (Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
            (None, None) => None,
            _ => {
                return Err(Error::Credential(
                    "certificate file and key file must be supplied together".into(),
                ))
            }
        };

        let engine = EngineGuard::acquire();

        let config = match self.role {
            TlsRole::Client => {
                let roots = match &self.ca_file {
                    Some(path) => load_trust_file(path)?,
                    None => platform_roots(),
                };
                let builder = ClientConfig::builder().with_root_certificates(roots);
                let config = match identity {
                    Some((cert_path, key_path)) => {
                        let (certs, key) = load_identity(&cert_path, &key_path)?;
                        builder.with_client_auth_cert(certs, key).map_err(|e| {
                            Error::Credential(format!(
                                "failed to use certificate key pair: {}",
                                e
                            ))
                        })?
                    }
                    None => builder.with_no_client_auth(),
                };
                CredentialConfig::Client(Arc::new(config))
            }
            TlsRole::Server => {
                let (cert_path, key_path) = identity.ok_or_else(|| {
                    Error::Credential("server credentials require a certificate and key".into())
                })?;
                let (certs, key) = load_identity(&cert_path, &key_path)?;

                // With trust anchors on hand, clients are asked for a
                // certificate but unauthenticated clients are still accepted.
                let builder = match &self.ca_file {
                    Some(path) => {
                        let roots = load_trust_file(path)?;
                        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                            .allow_unauthenticated()
                            .build()
                            .map_err(|e| {
                                Error::Credential(format!(
                                    "failed to build client certificate verifier: {}",
                                    e
                                ))
                            })?;
                        ServerConfig::builder().with_client_cert_verifier(verifier)
                    }
                    None => ServerConfig::builder().with_no_client_auth(),
                };
                let config = builder.with_single_cert(certs, key).map_err(|e| {
                    Error::Credential(format!("failed to use certificate key pair: {}", e))
                })?;
                CredentialConfig::Server(Arc::new(config))
            }
        };

        tracing::debug!(role = %self.role, "credentials built");
        Ok(Credentials {
            role: self.role,
            config,
            _engine: engine,
        })
    }
}

/// Load trust anchors from a PEM file.
fn load_trust_file(path: &Path) -> Result<RootCertStore> {
    let data = fs::read(path).map_err(|e| {
        Error::Credential(format!(
            "failed to read CA trust file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let mut reader = std::io::Cursor::new(&data);
    let mut roots = RootCertStore::empty();
    let mut found_certs = 0;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => {
                let _ = roots.add_parsable_certificates(std::iter::once(cert));
                found_certs += 1;
            }
            Ok(Some(_)) => {
                // Skip non-certificate items (private keys, etc.)
            }
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Credential(format!(
                    "failed to parse CA certificate from '{}'",
                    path.display()
                )));
            }
        }
    }

    if found_certs == 0 {
        return Err(Error::Credential(format!(
            "no valid certificates found in '{}'",
            path.display()
        )));
    }

    Ok(roots)
}

/// Platform trust anchors, with the bundled webpki roots as fallback.
fn platform_roots() -> RootCertStore {
    let result = rustls_native_certs::load_native_certs();

    let mut roots = RootCertStore::empty();
    for cert in result.certs {
        let _ = roots.add_parsable_certificates(std::iter::once(cert));
    }

    for err in &result.errors {
        tracing::warn!(%err, "platform certificate load error");
    }
    if roots.is_empty() {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    roots
}

/// Load a certificate chain and private key from PEM files.
fn load_identity(
    cert_path: &Path,
    key_path: &Path,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let cert_data = fs::read(cert_path).map_err(|e| {
        Error::Credential(format!(
            "failed to read certificate file '{}': {}",
            cert_path.display(),
            e
        ))
    })?;
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut std::io::Cursor::new(&cert_data))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| {
                Error::Credential(format!(
                    "failed to parse certificate from '{}': {}",
                    cert_path.display(),
                    e
                ))
            })?;
    if certs.is_empty() {
        return Err(Error::Credential(format!(
            "no certificates found in '{}'",
            cert_path.display()
        )));
    }

    let key_data = fs::read(key_path).map_err(|e| {
        Error::Credential(format!(
            "failed to read key file '{}': {}",
            key_path.display(),
            e
        ))
    })?;
    let key = rustls_pemfile::private_key(&mut std::io::Cursor::new(&key_data))
        .map_err(|e| {
            Error::Credential(format!(
                "failed to parse key from '{}': {}",
                key_path.display(),
                e
            ))
        })?
        .ok_or_else(|| {
            Error::Credential(format!("no private key found in '{}'", key_path.display()))
        })?;

    Ok((certs, key))
}

/// Parse a hostname or address literal into a TLS server name for SNI.
pub(crate) fn server_name(host: &str) -> Result<ServerName<'static>> {
    let host = host.trim_end_matches('.');
    ServerName::try_from(host.to_string())
        .map_err(|_| Error::Handshake(format!("invalid server name '{}'", host)))
}
