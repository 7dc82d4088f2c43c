//! Custom assertions over download results

use czds_dl::{DownloadOutcome, DownloadResult, ZoneLink};
use std::collections::HashSet;

/// Assert that `results` holds exactly one entry per link in `links`
pub fn assert_one_result_per_link(results: &[DownloadResult], links: &[ZoneLink]) {
    assert_eq!(
        results.len(),
        links.len(),
        "expected one result per link, got {results:#?}"
    );
    let reported: HashSet<&ZoneLink> = results.iter().map(|r| &r.link).collect();
    let expected: HashSet<&ZoneLink> = links.iter().collect();
    assert_eq!(reported, expected, "results do not cover exactly the input links");
}

/// Find the result for the zone named `zone`
pub fn result_for<'a>(results: &'a [DownloadResult], zone: &str) -> &'a DownloadResult {
    results
        .iter()
        .find(|r| r.link.zone_name() == zone)
        .unwrap_or_else(|| panic!("no result for zone {zone}"))
}

/// Assert the zone's outcome
pub fn assert_outcome(results: &[DownloadResult], zone: &str, expected: DownloadOutcome) {
    let result = result_for(results, zone);
    assert_eq!(result.outcome, expected, "unexpected outcome for {zone}");
}
