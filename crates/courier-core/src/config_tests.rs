//! Tests for messenger configuration.

use super::*;

#[test]
fn test_default_config_has_empty_prefixes() {
    let config = MessengerConfig::default();

    assert_eq!(config.resource_name_prefix, "");
    assert_eq!(config.queue_arn_prefix, "");
    assert_eq!(config.topic_arn_prefix, "");
    assert_eq!(config.queue_locator_prefix, "");
}

#[test]
fn test_new_matches_default() {
    assert_eq!(MessengerConfig::new(), MessengerConfig::default());
}

#[test]
fn test_builders_set_each_prefix() {
    let config = MessengerConfig::new()
        .with_resource_name_prefix("staging_")
        .with_queue_arn_prefix("arn:sqs:local:")
        .with_topic_arn_prefix("arn:sns:local:")
        .with_queue_locator_prefix("https://queue.local/");

    assert_eq!(config.resource_name_prefix, "staging_");
    assert_eq!(config.queue_arn_prefix, "arn:sqs:local:");
    assert_eq!(config.topic_arn_prefix, "arn:sns:local:");
    assert_eq!(config.queue_locator_prefix, "https://queue.local/");
}

#[test]
fn test_config_clone_is_equal() {
    let config = MessengerConfig::new().with_resource_name_prefix("svc_");

    assert_eq!(config.clone(), config);
}
