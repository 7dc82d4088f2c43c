//! Shared test helpers: mock CZDS endpoints and zone fixtures.

use crate::config::Config;
use crate::downloader::CzdsClient;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub(crate) const AUTH_PATH: &str = "/api/authenticate";
pub(crate) const LINKS_PATH: &str = "/czds/downloads/links";

/// A small zone with an SOA, NS records in both TTL/class orders, and a blank line
pub(crate) const SAMPLE_ZONE: &str = "\
com.\t86400\tin\tsoa\ta.gtld-servers.net. nstld.verisign-grs.com. 1700000000 1800 900 604800 86400
example.com.\t172800\tin\tns\ta.iana-servers.net.
example.com.\tin\t172800\tns\tb.iana-servers.net.

example.com.\t3600\tin\ta\t192.0.2.1
";

/// Config pointing both endpoints at `server`, writing into `output_dir`
pub(crate) fn test_config(server: &MockServer, output_dir: &Path) -> Config {
    let mut config = Config::new("zones@example.com", "correct horse");
    config.api.base_url = server.uri();
    config.api.auth_url = format!("{}{AUTH_PATH}", server.uri());
    config.api.request_timeout = Duration::from_secs(5);
    config.download.output_dir = output_dir.to_path_buf();
    config.download.worker_count = Some(4);
    config
}

pub(crate) fn test_client(config: Config) -> CzdsClient {
    CzdsClient::new(config).unwrap()
}

/// Mount an authentication endpoint that always issues `token`
pub(crate) async fn mount_auth(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "accessToken": token })),
        )
        .mount(server)
        .await;
}

pub(crate) fn zone_link(server: &MockServer, zone: &str) -> crate::types::ZoneLink {
    crate::types::ZoneLink::new(format!("{}/czds/downloads/{zone}.zone", server.uri()))
}

pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Issues `token-1`, `token-2`, ... on successive authentication requests
#[derive(Default)]
pub(crate) struct SequentialTokens {
    issued: AtomicUsize,
    delay: Duration,
}

impl SequentialTokens {
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            issued: AtomicUsize::new(0),
            delay,
        }
    }
}

impl Respond for SequentialTokens {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({ "accessToken": format!("token-{n}") }))
            .set_delay(self.delay)
    }
}
