use super::*;

#[test]
fn test_from_config_carries_messaging_settings() {
    let messaging = MessagingConfig::default();
    let config = KafkaBusConfig::from_config(&messaging);

    assert_eq!(config.bootstrap_servers, "localhost:9092");
    assert_eq!(config.topic, "orders_topic");
    assert_eq!(config.group_id.as_deref(), Some("products-service-group"));
    assert_eq!(config.ack_timeout, Duration::from_secs(10));
}

#[test]
fn test_producer_config_requires_full_acknowledgment() {
    let config = KafkaBusConfig::new("broker:9092", "orders_topic");
    let client = config.producer_config();

    assert_eq!(client.get("bootstrap.servers"), Some("broker:9092"));
    assert_eq!(client.get("acks"), Some("all"));
    assert_eq!(client.get("message.timeout.ms"), Some("10000"));
}

#[test]
fn test_consumer_config_disables_auto_commit() {
    let config =
        KafkaBusConfig::new("broker:9092", "orders_topic").with_group_id("products-service-group");
    let client = config.consumer_config("products-service-group");

    assert_eq!(client.get("group.id"), Some("products-service-group"));
    assert_eq!(client.get("enable.auto.commit"), Some("false"));
    assert_eq!(client.get("auto.offset.reset"), Some("earliest"));
}

#[test]
fn test_subscriber_requires_group_id() {
    let config = KafkaBusConfig::new("broker:9092", "orders_topic");
    let err = config.subscriber().unwrap_err();
    assert!(matches!(err, BusError::Connection(_)));
}
