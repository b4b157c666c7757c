//! Connection option handling for the MQTT broker client.

use crate::config::BrokerSection;
use crate::transport::BrokerError;
use rumqttc::v5::mqttbytes::v5::ConnectProperties;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use url::Url;

/// How long unacked QoS 1 messages survive a consumer restart.
const SESSION_EXPIRY_SECS: u32 = 3600;

/// Build MQTT options from broker configuration.
///
/// The session is persistent and acknowledgments are manual: the
/// event loop only acks a publish once the client code asks it to,
/// which is what gives the task/result channels their at-least-once
/// hand-off-then-ack behavior.
pub fn configure_mqtt_options(
    client_id: &str,
    config: &BrokerSection,
) -> Result<MqttOptions, BrokerError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| BrokerError::InvalidBrokerUrl(config.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| BrokerError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let mut mqtt_options = MqttOptions::new(client_id, host, port);

    if url.scheme() == "mqtts" {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    // Credentials come through environment variable indirection so the
    // config file never holds secrets.
    if let Some(username_env) = &config.username_env {
        if let Ok(username) = std::env::var(username_env) {
            let password = config
                .password_env
                .as_ref()
                .and_then(|env_name| std::env::var(env_name).ok())
                .unwrap_or_default();
            mqtt_options.set_credentials(&username, &password);
        }
    }

    mqtt_options.set_keep_alive(Duration::from_secs(60));
    mqtt_options.set_max_packet_size(Some(4 * 1024 * 1024));

    // Persistent session so unacked deliveries survive a restart, and
    // manual acks so hand-off precedes acknowledgment.
    mqtt_options.set_clean_start(false);
    mqtt_options.set_manual_acks(true);

    let mut props = ConnectProperties::new();
    props.session_expiry_interval = Some(SESSION_EXPIRY_SECS);
    props.receive_maximum = Some(config.prefetch.clamp(1, u16::MAX as usize) as u16);
    mqtt_options.set_connect_properties(props);

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_broker_section() -> BrokerSection {
        BrokerSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            username_env: None,
            password_env: None,
            prefetch: 10,
        }
    }

    #[test]
    fn test_configure_mqtt_options() {
        let config = test_broker_section();
        assert!(configure_mqtt_options("linecut-test", &config).is_ok());
    }

    #[test]
    fn test_invalid_broker_url() {
        let mut config = test_broker_section();
        config.broker_url = "not a url".to_string();

        let result = configure_mqtt_options("linecut-test", &config);
        assert!(matches!(result, Err(BrokerError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_default_port_for_mqtts() {
        let mut config = test_broker_section();
        config.broker_url = "mqtts://broker.example.com".to_string();
        assert!(configure_mqtt_options("linecut-test", &config).is_ok());
    }
}
