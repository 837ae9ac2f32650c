//! TLS connector construction and the dial path.
//!
//! TAK servers authenticate clients by certificate, frequently present
//! self-signed chains of their own, and speak both TLS 1.2 and 1.3
//! depending on deployment age. The connector is built once per client
//! so credential problems surface at construction time rather than on
//! the first dial.

use log::{info, warn};
use native_tls::{Certificate, Identity, TlsConnector};
use tokio::net::TcpStream;
use tokio_native_tls::TlsStream;

use crate::{
    config::{ClientIdentity, Endpoint},
    error::ClientError,
};

/// Build a connector from client credentials.
pub(crate) fn build_connector(
    identity: &ClientIdentity,
    ca: Option<&[u8]>,
    verify_peer: bool,
) -> Result<TlsConnector, ClientError> {
    let mut builder = TlsConnector::builder();

    let identity = match identity {
        ClientIdentity::Pem { cert, key } => Identity::from_pkcs8(cert, key)?,
        ClientIdentity::Pkcs12 { archive, passphrase } => {
            Identity::from_pkcs12(archive, passphrase)?
        }
    };
    builder.identity(identity);

    if let Some(ca) = ca {
        builder.add_root_certificate(Certificate::from_pem(ca)?);
    }

    if !verify_peer {
        warn!(
            "peer certificate verification is disabled; the TLS session will proceed even if \
             the server presents an untrusted certificate"
        );
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }

    Ok(builder.build()?)
}

/// Dial the endpoint and complete the TLS handshake.
pub(crate) async fn connect(
    endpoint: &Endpoint,
    connector: &TlsConnector,
) -> Result<TlsStream<TcpStream>, ClientError> {
    let tcp = TcpStream::connect((endpoint.host(), endpoint.port())).await?;
    // Keepalives and position updates are small and latency-sensitive.
    tcp.set_nodelay(true)?;

    let connector = tokio_native_tls::TlsConnector::from(connector.clone());
    let stream = connector.connect(endpoint.host(), tcp).await?;
    info!("tls handshake complete: endpoint={endpoint}");
    Ok(stream)
}
