//! Zone fixtures and mock CZDS endpoints

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path of the mocked authentication endpoint
pub const AUTH_PATH: &str = "/api/authenticate";

/// Path of the link listing endpoint
pub const LINKS_PATH: &str = "/czds/downloads/links";

/// Bearer token issued by [`mount_czds`]
pub const MOCK_TOKEN: &str = "integration-token";

/// A zone resembling a CZDS download: SOA, NS and glue in mixed field orders
pub const COM_ZONE: &str = "\
com.\t900\tin\tsoa\ta.gtld-servers.net. nstld.verisign-grs.com. 1700000000 1800 900 604800 86400
com.\t172800\tin\tns\ta.gtld-servers.net.
example.com.\t172800\tin\tns\ta.iana-servers.net.
example.com.\tin\t172800\tns\tb.iana-servers.net.
a.gtld-servers.net.\t172800\tin\ta\t192.5.6.30
";

/// A second, smaller zone
pub const NET_ZONE: &str = "\
net.\t900\tin\tsoa\ta.gtld-servers.net. nstld.verisign-grs.com. 1700000000 1800 900 604800 86400
example.net.\t172800\tin\tns\ta.iana-servers.net.
";

/// Gzip-compress `data` the way CZDS serves zone files
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .expect("writing to an in-memory encoder cannot fail");
    encoder
        .finish()
        .expect("finishing an in-memory encoder cannot fail")
}

/// Link for `zone` on the mock server
pub fn zone_url(server: &MockServer, zone: &str) -> String {
    format!("{}/czds/downloads/{zone}.zone", server.uri())
}

/// Mount authentication, a listing of `zones`, and a gzip body per zone
///
/// Zones whose body is `None` answer 404.
pub async fn mount_czds(server: &MockServer, zones: &[(&str, Option<&str>)]) {
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "accessToken": MOCK_TOKEN })),
        )
        .mount(server)
        .await;

    let links: Vec<String> = zones.iter().map(|(zone, _)| zone_url(server, zone)).collect();
    Mock::given(method("GET"))
        .and(path(LINKS_PATH))
        .and(header("authorization", format!("Bearer {MOCK_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(links))
        .mount(server)
        .await;

    for (zone, body) in zones {
        let template = match body {
            Some(text) => ResponseTemplate::new(200)
                .insert_header(
                    "Content-Disposition",
                    format!("attachment;filename={zone}.txt.gz").as_str(),
                )
                .set_body_bytes(gzip(text.as_bytes())),
            None => ResponseTemplate::new(404),
        };
        Mock::given(method("GET"))
            .and(path(format!("/czds/downloads/{zone}.zone")))
            .and(header("authorization", format!("Bearer {MOCK_TOKEN}").as_str()))
            .respond_with(template)
            .mount(server)
            .await;
    }
}
