//! Tests for the type-safe configuration builder pattern

use pagegraph_crawl::config::CrawlConfig;
use tempfile::TempDir;

#[test]
fn test_builder_requires_output_path_and_url() {
    // This should not compile if uncommented - testing compile-time guarantees
    // let config = CrawlConfig::builder().build();

    // This should also not compile - missing url
    // let config = CrawlConfig::builder()
    //     .output_path("/tmp")
    //     .build();

    // This SHOULD compile - both required fields provided
    let temp_dir = TempDir::new().unwrap();
    let config = CrawlConfig::builder()
        .output_path(temp_dir.path())
        .url("https://example.com")
        .build()
        .unwrap();

    assert_eq!(config.output_path(), temp_dir.path());
    assert_eq!(config.url(), "https://example.com");
}

#[test]
fn test_builder_optional_fields_have_defaults() {
    let config = CrawlConfig::builder()
        .output_path("./out")
        .url("https://example.com")
        .build()
        .unwrap();

    assert_eq!(config.seconds(), 30);
    assert_eq!(config.recursive_depth(), 1);
    assert_eq!(config.launch_retries(), 3);
    assert_eq!(config.navigation_timeout_secs(), 30);
    assert!(config.headless());
    assert!(!config.crawl_duplicates());
    assert!(!config.capture_network());
    assert!(!config.capture_har_bodies());
    assert!(!config.screenshot());
    assert!(config.user_agent().is_none());
}

#[test]
fn test_builder_adds_https_scheme() {
    let config = CrawlConfig::builder()
        .output_path("./out")
        .url("example.com/path")
        .build()
        .unwrap();

    assert_eq!(config.url(), "https://example.com/path");
}

#[test]
fn test_builder_rejects_non_http_scheme() {
    let result = CrawlConfig::builder()
        .output_path("./out")
        .url("ftp://example.com")
        .build();

    assert!(result.is_err());
}

#[test]
fn test_builder_rejects_zero_depth() {
    let result = CrawlConfig::builder()
        .output_path("./out")
        .url("https://example.com")
        .recursive_depth(0)
        .build();

    assert!(result.is_err());
}

#[test]
fn test_har_bodies_imply_network_capture() {
    let config = CrawlConfig::builder()
        .capture_har_bodies(true)
        .output_path("./out")
        .url("https://example.com")
        .build()
        .unwrap();

    assert!(config.capture_network());
    assert!(config.capture_har_bodies());
}

#[test]
fn test_continuation_overrides_copy_everything_else() {
    let config = CrawlConfig::builder()
        .output_path("./out")
        .url("https://example.com")
        .recursive_depth(3)
        .screenshot(true)
        .user_agent(Some("pagegraph-test/1.0".to_string()))
        .build()
        .unwrap();

    let redirected = config.with_url("https://example.org/");
    assert_eq!(redirected.url(), "https://example.org/");
    assert_eq!(redirected.recursive_depth(), 3);
    assert!(redirected.screenshot());
    assert_eq!(redirected.user_agent(), Some("pagegraph-test/1.0"));

    let child = config.with_recursive_depth(2);
    assert_eq!(child.url(), "https://example.com");
    assert_eq!(child.recursive_depth(), 2);
}

#[test]
fn test_config_roundtrips_through_json() {
    let config = CrawlConfig::builder()
        .output_path("./out")
        .url("https://example.com")
        .crawl_duplicates(true)
        .build()
        .unwrap();

    let json = serde_json::to_string(&config).unwrap();
    let restored: CrawlConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.url(), config.url());
    assert!(restored.crawl_duplicates());
}

#[test]
fn test_deserialized_config_fills_defaults() {
    let config: CrawlConfig =
        serde_json::from_str(r#"{"url": "https://example.com/", "output_path": "./out"}"#).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.seconds(), 30);
    assert_eq!(config.recursive_depth(), 1);
}

#[tokio::test]
async fn test_crawl_rejects_invalid_config_before_launch() {
    let config: CrawlConfig =
        serde_json::from_str(r#"{"url": "file:///etc/passwd", "output_path": "./out"}"#).unwrap();
    let result = pagegraph_crawl::crawl(config).await;
    assert!(matches!(result, Err(pagegraph_crawl::CrawlError::Config(_))));
}
