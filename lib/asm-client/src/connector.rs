//! HTTPS connectors using rustls, direct or through a forward proxy.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::Uri;
use http::uri::Scheme;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::proxy::Tunnel;
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tower_service::Service;

use crate::Result;
use crate::config::{ClientConfig, ProxyConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn tls_config() -> rustls::ClientConfig {
    let root_store: rustls::RootCertStore =
        webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();

    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

/// Plain TCP connector carrying the configured connect timeout.
fn http_connector(config: &ClientConfig) -> HttpConnector {
    let mut connector = HttpConnector::new();
    connector.enforce_http(false);
    connector.set_connect_timeout(Some(config.connect_timeout));
    connector
}

/// Create an HTTPS connector with rustls.
///
/// This connector supports both HTTP/1.1 and HTTP/2, with TLS enabled
/// using the Mozilla root certificates.
#[must_use]
pub fn https_connector(config: &ClientConfig) -> HttpsConnector<HttpConnector> {
    HttpsConnectorBuilder::new()
        .with_tls_config(tls_config())
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http_connector(config))
}

/// Create an HTTPS connector that reaches every target through `proxy`.
///
/// # Errors
///
/// Returns a configuration error if the proxy address is not a valid URI.
pub fn proxied_https_connector(
    config: &ClientConfig,
    proxy: &ProxyConfig,
) -> Result<HttpsConnector<ProxyConnector>> {
    let proxy = proxy.uri()?;
    let connector = ProxyConnector {
        tunnel: Tunnel::new(proxy.clone(), http_connector(config)),
        forward: http_connector(config),
        proxy,
    };
    Ok(HttpsConnectorBuilder::new()
        .with_tls_config(tls_config())
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(connector))
}

// ============================================================================
// Forward proxy
// ============================================================================

/// Dials targets through a forward proxy.
///
/// `https` targets get a `CONNECT` tunnel that TLS then runs over. Plain
/// `http` targets are sent to the proxy itself, and the connection is marked
/// proxied so requests keep the absolute target URI in the request line.
#[derive(Clone)]
pub struct ProxyConnector {
    proxy: Uri,
    tunnel: Tunnel<HttpConnector>,
    forward: HttpConnector,
}

impl std::fmt::Debug for ProxyConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConnector")
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

impl Service<Uri> for ProxyConnector {
    type Response = ProxyStream;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<ProxyStream, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), BoxError>> {
        match self.tunnel.poll_ready(cx) {
            Poll::Ready(Ok(())) => self.forward.poll_ready(cx).map_err(Into::into),
            Poll::Ready(Err(error)) => Poll::Ready(Err(error.into())),
            Poll::Pending => Poll::Pending,
        }
    }

    fn call(&mut self, target: Uri) -> Self::Future {
        if target.scheme() == Some(&Scheme::HTTPS) {
            let connecting = self.tunnel.call(target);
            Box::pin(async move {
                Ok(ProxyStream {
                    io: connecting.await?,
                    forwarding: false,
                })
            })
        } else {
            let connecting = self.forward.call(self.proxy.clone());
            Box::pin(async move {
                Ok(ProxyStream {
                    io: connecting.await?,
                    forwarding: true,
                })
            })
        }
    }
}

/// Connection to the proxy, either tunnelled or forwarding plain requests.
#[derive(Debug)]
pub struct ProxyStream {
    io: TokioIo<TcpStream>,
    forwarding: bool,
}

impl Connection for ProxyStream {
    fn connected(&self) -> Connected {
        self.io.connected().proxy(self.forwarding)
    }
}

impl Read for ProxyStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl Write for ProxyStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.io.is_write_vectored()
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write_vectored(cx, bufs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_connector() {
        let _connector = https_connector(&ClientConfig::default());
    }

    #[test]
    fn creates_proxied_connector() {
        let proxy = ProxyConfig::new("proxy.internal", 3128);
        assert!(proxied_https_connector(&ClientConfig::default(), &proxy).is_ok());
    }

    #[test]
    fn rejects_unusable_proxy_host() {
        let proxy = ProxyConfig::new("bad host", 3128);
        assert!(proxied_https_connector(&ClientConfig::default(), &proxy).is_err());
    }
}
