// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP transport for the mPower web interface.

use std::time::Duration;

use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Client, Method};

use super::{SESSION_COOKIE, WebMethod, WebRequest, WebResponse, WebTransport, tls};
use crate::endpoint::{Endpoint, TlsTrust};
use crate::error::TransportError;

/// HTTP client bound to one endpoint.
///
/// Redirects are not followed: the device answers a successful login with a
/// redirect, and an expired session with a redirect to the login form, and
/// both must be visible to the session manager.
///
/// # Examples
///
/// ```no_run
/// use mpower_lib::endpoint::Endpoint;
/// use mpower_lib::protocol::{HttpTransport, WebRequest, WebTransport};
///
/// # async fn example() -> mpower_lib::Result<()> {
/// let endpoint = Endpoint::builder("192.168.1.20")
///     .with_credentials("ubnt", "ubnt")
///     .build()?;
/// let transport = HttpTransport::new(&endpoint)?;
/// let response = transport.send(&WebRequest::get("/mfi/sensors.cgi"), None).await?;
/// println!("HTTP {}", response.status);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport for the endpoint's web interface.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::NotConfigured` if the endpoint has no web
    /// interface, or an error if the TLS setup or client cannot be built.
    pub fn new(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let (Some(web), Some(base_url)) = (endpoint.web(), endpoint.base_url()) else {
            return Err(TransportError::NotConfigured("HTTP"));
        };

        let mut builder = Client::builder()
            .timeout(endpoint.timeout())
            .redirect(Policy::none());

        match &web.tls {
            TlsTrust::Strict => {}
            TlsTrust::AcceptInvalid => {
                tracing::warn!(host = %endpoint.host(), "TLS certificate verification disabled");
                builder = builder.danger_accept_invalid_certs(true);
            }
            TlsTrust::Pinned(digest) => {
                builder = builder.use_preconfigured_tls(tls::pinned_client_config(*digest)?);
            }
        }

        let client = builder.build().map_err(TransportError::Http)?;

        Ok(Self {
            base_url,
            client,
            timeout: endpoint.timeout(),
        })
    }

    /// Returns the base URL of the device.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_error(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Http(error)
        }
    }
}

impl WebTransport for HttpTransport {
    async fn send(
        &self,
        request: &WebRequest,
        session: Option<&str>,
    ) -> Result<WebResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let method = match request.method {
            WebMethod::Get => Method::GET,
            WebMethod::Post => Method::POST,
            WebMethod::Put => Method::PUT,
        };

        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        let mut builder = self.client.request(method, &url);
        if let Some(token) = session {
            builder = builder.header(COOKIE, format!("{SESSION_COOKIE}={token}"));
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        let response = builder.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let session_cookie = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(super::parse_session_cookie);
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_error(e))?
            .to_vec();

        tracing::debug!(status, bytes = body.len(), "Received HTTP response");

        Ok(WebResponse {
            status,
            location,
            session_cookie,
            body,
        })
    }
}
