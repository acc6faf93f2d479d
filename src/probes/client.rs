use crate::config::DownloadConfig;
use crate::errors::{classify_error, ProbeError};
use reqwest::header::{
    HeaderMap, HeaderValue, CACHE_CONTROL, REFERER, USER_AGENT,
};
use reqwest::{Client as ReqwestClient, RequestBuilder};
use std::net::{IpAddr, SocketAddr};
use url::{Host, Url};

/// An HTTP client whose only destination is one candidate address.
///
/// The test URL's host is resolved to the candidate regardless of DNS, so
/// the Host header, SNI and certificate checks still see the real name.
#[derive(Debug, Clone)]
pub struct PinnedClient {
    client: ReqwestClient,
    url: Url,
    headers: HeaderMap,
}

impl PinnedClient {
    pub fn new(
        config: &DownloadConfig,
        address: IpAddr,
    ) -> Result<Self, ProbeError> {
        let url = Url::parse(&config.url).map_err(|e| {
            ProbeError::config(format!("invalid test URL {}", config.url))
                .with_source(e)
        })?;
        let host = pinnable_host(&url)?;

        // Port 0 keeps the port from the URL (or the scheme default).
        let client = ReqwestClient::builder()
            .resolve(&host, SocketAddr::new(address, 0))
            .pool_max_idle_per_host(1)
            .no_proxy()
            .build()
            .map_err(|e| {
                ProbeError::new(classify_error(&e), "failed to build HTTP client")
                    .with_source(e)
            })?;

        let headers = download_headers(config, &url)?;

        Ok(Self { client, url, headers })
    }

    /// A GET for the test URL, ready to send.
    pub fn get(&self) -> RequestBuilder {
        self.client.get(self.url.clone()).headers(self.headers.clone())
    }
}

/// The URL's host name, which every request is pinned through.
///
/// Overrides only apply to names that need resolving, so an IP literal
/// host would send every probe to that one IP.
pub fn pinnable_host(url: &Url) -> Result<String, ProbeError> {
    match url.host() {
        Some(Host::Domain(name)) => Ok(name.to_string()),
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => {
            let host = url.host_str().unwrap_or_default();
            Err(ProbeError::config(format!(
                "test URL host {} is an IP address",
                host
            ))
            .with_suggestion(
                "Use a URL with a host name; the candidate address replaces its DNS answer.",
            ))
        }
        None => Err(ProbeError::config("test URL has no host")),
    }
}

fn download_headers(
    config: &DownloadConfig,
    url: &Url,
) -> Result<HeaderMap, ProbeError> {
    let mut headers = HeaderMap::new();

    headers.insert(USER_AGENT, header_value(&config.user_agent)?);

    headers.insert(REFERER, header_value(url.as_str())?);

    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue, ProbeError> {
    HeaderValue::from_str(value).map_err(|e| {
        ProbeError::config(format!("invalid header value {:?}", value))
            .with_source(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::net::Ipv4Addr;

    #[test]
    fn test_headers_carry_user_agent_and_referer() {
        let config = DownloadConfig::default();
        let client =
            PinnedClient::new(&config, IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();

        let request = client.get().build().unwrap();
        let headers = request.headers();

        assert_eq!(headers[USER_AGENT], config.user_agent.as_str());
        assert_eq!(headers[REFERER], config.url.as_str());
        assert_eq!(request.url().as_str(), config.url);
    }

    #[test]
    fn test_user_agent_with_newline_rejected() {
        let config = DownloadConfig {
            user_agent: "bad\nagent".to_string(),
            ..DownloadConfig::default()
        };

        let error = PinnedClient::new(&config, IpAddr::V4(Ipv4Addr::LOCALHOST))
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::Config);
    }

    #[test]
    fn test_url_without_host_rejected() {
        let config = DownloadConfig {
            url: "unix:/tmp/socket".to_string(),
            ..DownloadConfig::default()
        };

        assert!(PinnedClient::new(&config, IpAddr::V4(Ipv4Addr::LOCALHOST))
            .is_err());
    }

    #[test]
    fn test_ip_literal_host_cannot_be_pinned() {
        for url in ["http://203.0.113.5/file", "https://[2606:4700::1111]/file"] {
            let error = pinnable_host(&Url::parse(url).unwrap()).unwrap_err();
            assert_eq!(error.kind, ErrorKind::Config, "{}", url);
            assert!(error.suggestion.is_some());
        }

        let host =
            pinnable_host(&Url::parse("https://speed.cloudflare.com/x").unwrap())
                .unwrap();
        assert_eq!(host, "speed.cloudflare.com");
    }
}
