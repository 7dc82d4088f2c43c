use super::*;
use crate::downloader::output::SinkItem;
use std::time::Duration;

fn with_format(server: &MockServer, temp_dir: &TempDir, format: OutputFormat) -> CzdsClient {
    let mut config = test_config(server, temp_dir.path());
    config.download.output_format = format;
    test_client(config)
}

async fn mount_zone(server: &MockServer, zone: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/czds/downloads/{zone}.zone")))
        .respond_with(template)
        .mount(server)
        .await;
}

fn drain(mut rx: tokio::sync::mpsc::Receiver<SinkItem>) -> Vec<SinkItem> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}

// --- output modes ---

#[tokio::test]
async fn test_raw_mode_writes_body_unmodified() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    mount_auth(&server, "tok").await;

    let body = gzip(SAMPLE_ZONE.as_bytes());
    mount_zone(
        &server,
        "com",
        ResponseTemplate::new(200)
            .insert_header("Content-Disposition", "attachment;filename=com.txt.gz")
            .set_body_bytes(body.clone()),
    )
    .await;

    let client = with_format(&server, &temp_dir, OutputFormat::None);
    let result = client
        .download_zone(&zone_link(&server, "com"), &NullSink)
        .await
        .unwrap();

    assert_eq!(result.outcome, DownloadOutcome::Success);
    assert_eq!(result.destination_path, temp_dir.path().join("com.txt.gz"));
    assert_eq!(result.bytes_written, body.len() as u64);
    assert_eq!(std::fs::read(&result.destination_path).unwrap(), body);
}

#[tokio::test]
async fn test_text_mode_writes_decoded_lines_and_emits_them() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    mount_auth(&server, "tok").await;
    mount_zone(
        &server,
        "com",
        ResponseTemplate::new(200)
            .insert_header("Content-Disposition", "attachment;filename=com.txt.gz")
            .set_body_bytes(gzip(SAMPLE_ZONE.as_bytes())),
    )
    .await;

    let client = with_format(&server, &temp_dir, OutputFormat::Text);
    let (sink, rx) = ChannelSink::new(64);
    let link = zone_link(&server, "com");
    let result = client.download_zone(&link, &sink).await.unwrap();

    assert!(result.is_success());
    assert_eq!(
        result.destination_path,
        temp_dir.path().join("com.txt"),
        "decoded output drops the .gz suffix"
    );
    assert_eq!(
        std::fs::read_to_string(&result.destination_path).unwrap(),
        SAMPLE_ZONE
    );

    drop(sink);
    let lines: Vec<String> = drain(rx)
        .into_iter()
        .map(|item| match item {
            SinkItem::Line { link: l, line } => {
                assert_eq!(l, link);
                line
            }
            other => panic!("text mode emitted {other:?}"),
        })
        .collect();
    let expected: Vec<&str> = SAMPLE_ZONE.lines().collect();
    assert_eq!(lines, expected);
}

#[tokio::test]
async fn test_json_mode_emits_parsed_records_and_skips_blank_lines() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    mount_auth(&server, "tok").await;
    mount_zone(
        &server,
        "com",
        ResponseTemplate::new(200).set_body_bytes(gzip(SAMPLE_ZONE.as_bytes())),
    )
    .await;

    let client = with_format(&server, &temp_dir, OutputFormat::Json);
    let (sink, rx) = ChannelSink::new(64);
    let result = client
        .download_zone(&zone_link(&server, "com"), &sink)
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(
        std::fs::read_to_string(temp_dir.path().join("com.txt")).unwrap(),
        SAMPLE_ZONE,
        "decoded text is still written to disk"
    );

    drop(sink);
    let records: Vec<_> = drain(rx)
        .into_iter()
        .map(|item| match item {
            SinkItem::Record { record, .. } => record,
            other => panic!("json mode emitted {other:?}"),
        })
        .collect();

    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.zone_name == "com"));
    assert_eq!(records[0].dns_record, "com");
    assert_eq!(records[0].record_type, "soa");
    // ttl/class order differs on these two lines
    assert_eq!(records[1].ttl, records[2].ttl);
    assert_eq!(records[1].record_class, records[2].record_class);
    assert_eq!(records[3].record_data, "192.0.2.1");
}

#[tokio::test]
async fn test_missing_content_disposition_uses_zone_name() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    mount_auth(&server, "tok").await;
    mount_zone(
        &server,
        "net",
        ResponseTemplate::new(200).set_body_string(SAMPLE_ZONE),
    )
    .await;

    let client = with_format(&server, &temp_dir, OutputFormat::None);
    let result = client
        .download_zone(&zone_link(&server, "net"), &NullSink)
        .await
        .unwrap();

    assert_eq!(result.destination_path, temp_dir.path().join("net.txt"));
    assert!(result.destination_path.exists());
}

#[tokio::test]
async fn test_output_directory_is_created() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    mount_auth(&server, "tok").await;
    mount_zone(
        &server,
        "org",
        ResponseTemplate::new(200).set_body_string("org. 3600 IN NS a0.org.afilias-nst.info.\n"),
    )
    .await;

    let mut config = test_config(&server, &temp_dir.path().join("nested").join("zones"));
    config.download.atomic_writes = true;
    let client = test_client(config);
    let result = client
        .download_zone(&zone_link(&server, "org"), &NullSink)
        .await
        .unwrap();

    assert!(result.is_success());
    assert!(temp_dir.path().join("nested/zones/org.txt").exists());
    assert!(!temp_dir.path().join("nested/zones/org.txt.part").exists());
}

// --- response state machine ---

#[tokio::test]
async fn test_unauthorized_then_ok_refreshes_once_and_succeeds() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(SequentialTokens::default())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/czds/downloads/com.zone"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/czds/downloads/com.zone"))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_ZONE))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(test_config(&server, temp_dir.path()));
    let mut events = client.subscribe();
    let result = client
        .download_zone(&zone_link(&server, "com"), &NullSink)
        .await
        .unwrap();

    assert_eq!(result.outcome, DownloadOutcome::Success);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&Event::TokenRefreshed { generation: 2 }));
}

#[tokio::test]
async fn test_unauthorized_twice_is_fatal_not_a_loop() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(SequentialTokens::default())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/czds/downloads/com.zone"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let client = test_client(test_config(&server, temp_dir.path()));
    let err = client
        .download_zone(&zone_link(&server, "com"), &NullSink)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Authentication(_)), "got {err:?}");
}

#[tokio::test]
async fn test_not_found_writes_nothing() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    mount_auth(&server, "tok").await;
    mount_zone(&server, "gone", ResponseTemplate::new(404)).await;

    let client = test_client(test_config(&server, temp_dir.path()));
    let result = client
        .download_zone(&zone_link(&server, "gone"), &NullSink)
        .await
        .unwrap();

    assert_eq!(result.outcome, DownloadOutcome::NotFound);
    assert_eq!(result.bytes_written, 0);
    assert!(!result.destination_path.exists());
}

#[tokio::test]
async fn test_server_error_is_recorded_as_failed() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    mount_auth(&server, "tok").await;
    Mock::given(method("GET"))
        .and(path("/czds/downloads/com.zone"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(test_config(&server, temp_dir.path()));
    let result = client
        .download_zone(&zone_link(&server, "com"), &NullSink)
        .await
        .unwrap();

    match result.outcome {
        DownloadOutcome::Failed(reason) => assert!(reason.contains("500"), "{reason}"),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_transient_failure_is_retried_when_configured() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    mount_auth(&server, "tok").await;
    Mock::given(method("GET"))
        .and(path("/czds/downloads/com.zone"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/czds/downloads/com.zone"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_ZONE))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server, temp_dir.path());
    config.retry.max_attempts = 2;
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.jitter = false;
    let client = test_client(config);

    let result = client
        .download_zone(&zone_link(&server, "com"), &NullSink)
        .await
        .unwrap();
    assert!(result.is_success());
}

#[tokio::test]
async fn test_slow_server_times_out_as_failed() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    mount_auth(&server, "tok").await;
    mount_zone(
        &server,
        "com",
        ResponseTemplate::new(200)
            .set_body_string(SAMPLE_ZONE)
            .set_delay(Duration::from_millis(500)),
    )
    .await;

    let mut config = test_config(&server, temp_dir.path());
    config.api.request_timeout = Duration::from_millis(100);
    let client = test_client(config);

    // the token request is fast; only the zone request stalls
    client.authenticate().await.unwrap();
    let result = client
        .download_zone(&zone_link(&server, "com"), &NullSink)
        .await
        .unwrap();

    match result.outcome {
        DownloadOutcome::Failed(reason) => assert!(reason.contains("timed out"), "{reason}"),
        other => panic!("expected Failed, got {other:?}"),
    }
}

// --- collisions and cancellation ---

#[tokio::test]
async fn test_rename_collision_keeps_existing_file() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    mount_auth(&server, "tok").await;
    mount_zone(
        &server,
        "com",
        ResponseTemplate::new(200).set_body_string("new\n"),
    )
    .await;
    std::fs::write(temp_dir.path().join("com.txt"), "old\n").unwrap();

    let mut config = test_config(&server, temp_dir.path());
    config.download.file_collision = FileCollisionAction::Rename;
    let client = test_client(config);
    let result = client
        .download_zone(&zone_link(&server, "com"), &NullSink)
        .await
        .unwrap();

    assert_eq!(result.destination_path, temp_dir.path().join("com (1).txt"));
    assert_eq!(
        std::fs::read_to_string(temp_dir.path().join("com.txt")).unwrap(),
        "old\n"
    );
}

#[tokio::test]
async fn test_skip_collision_fails_the_link() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    mount_auth(&server, "tok").await;
    mount_zone(
        &server,
        "com",
        ResponseTemplate::new(200).set_body_string("new\n"),
    )
    .await;
    std::fs::write(temp_dir.path().join("com.txt"), "old\n").unwrap();

    let mut config = test_config(&server, temp_dir.path());
    config.download.file_collision = FileCollisionAction::Skip;
    let client = test_client(config);
    let result = client
        .download_zone(&zone_link(&server, "com"), &NullSink)
        .await
        .unwrap();

    assert!(matches!(result.outcome, DownloadOutcome::Failed(_)));
    assert_eq!(
        std::fs::read_to_string(temp_dir.path().join("com.txt")).unwrap(),
        "old\n"
    );
}

#[tokio::test]
async fn test_cancelled_client_makes_no_zone_request() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    mount_auth(&server, "tok").await;
    Mock::given(method("GET"))
        .and(path("/czds/downloads/com.zone"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = test_client(test_config(&server, temp_dir.path()));
    client.cancel();
    let result = client
        .download_zone(&zone_link(&server, "com"), &NullSink)
        .await
        .unwrap();

    assert_eq!(result.outcome, DownloadOutcome::Failed("cancelled".to_string()));
}

// --- multi-member gzip ---

#[tokio::test]
async fn test_text_mode_inflates_every_gzip_member() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    mount_auth(&server, "tok").await;

    let lines: Vec<&str> = SAMPLE_ZONE.split_inclusive('\n').collect();
    let (head, tail) = lines.split_at(lines.len() / 2);
    let mut body = gzip(head.concat().as_bytes());
    body.extend(gzip(tail.concat().as_bytes()));
    mount_zone(
        &server,
        "com",
        ResponseTemplate::new(200)
            .insert_header("Content-Disposition", "attachment;filename=com.txt.gz")
            .set_body_bytes(body),
    )
    .await;

    let client = with_format(&server, &temp_dir, OutputFormat::Text);
    let (sink, rx) = ChannelSink::new(64);
    let result = client
        .download_zone(&zone_link(&server, "com"), &sink)
        .await
        .unwrap();

    assert_eq!(result.outcome, DownloadOutcome::Success);
    assert_eq!(
        std::fs::read_to_string(&result.destination_path).unwrap(),
        SAMPLE_ZONE
    );
    drop(sink);
    assert_eq!(drain(rx).len(), SAMPLE_ZONE.lines().count());
}
