use tonic::transport::{Channel, Endpoint};

use crate::error::Result;
use crate::tls::TlsIdentity;

/// Build the URI for `addr`, adding a scheme when the caller gave `host:port`.
pub fn endpoint_uri(addr: &str, tls: bool) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else if tls {
        format!("https://{}", addr)
    } else {
        format!("http://{}", addr)
    }
}

/// Open a channel to a control or node daemon, using TLS when an identity is given.
pub async fn connect(addr: &str, tls: Option<&TlsIdentity>) -> Result<Channel> {
    let uri = endpoint_uri(addr, tls.is_some());
    let endpoint = Endpoint::from_shared(uri.clone())?;

    let channel = match tls {
        Some(identity) => {
            endpoint
                .tls_config(identity.client_tls_config())?
                .connect()
                .await?
        }
        None => endpoint.connect().await?,
    };

    tracing::debug!(uri = %uri, "Connected");
    Ok(channel)
}
