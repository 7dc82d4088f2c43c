use super::*;
use crate::config::{FileCollisionAction, OutputFormat};
use crate::downloader::test_helpers::{
    AUTH_PATH, LINKS_PATH, SAMPLE_ZONE, SequentialTokens, gzip, mount_auth, test_client,
    test_config, zone_link,
};
use crate::types::DownloadOutcome;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod fetch;
