//! MQTT-backed telemetry store.
//!
//! Each key maps to the topic `<topic_prefix>/<key>`. Values are published
//! retained with QoS 1, so the broker keeps exactly one value per key and
//! late subscribers receive the latest one: the same overwrite semantics as a
//! key/value table.
//!
//! Publishing never blocks the caller. If the client queue is full (broker
//! unreachable) the write is dropped and logged.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use rumqttc::Transport;

use super::TelemetryStore;

const AVAILABILITY_TOPIC_SUFFIX: &str = "status";
const PAYLOAD_ONLINE: &str = "online";
const PAYLOAD_OFFLINE: &str = "offline";
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct MqttSettings {
    /// Broker address: `host:port`, optionally with an `mqtt://` or `mqtts://` scheme.
    pub broker: String,
    pub client_id: String,
    pub topic_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Force TLS even without an `mqtts://` scheme.
    pub use_tls: bool,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: "127.0.0.1:1883".to_string(),
            client_id: "vision_bridge".to_string(),
            topic_prefix: "vision".to_string(),
            username: None,
            password: None,
            use_tls: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct MqttEndpoint {
    host: String,
    port: u16,
    use_tls: bool,
}

pub struct MqttTelemetryStore {
    client: Client,
    topic_prefix: String,
    availability_topic: String,
}

impl MqttTelemetryStore {
    /// Create the client and start draining its connection on a background thread.
    ///
    /// The broker connection is established asynchronously; writes issued
    /// before it is up are queued.
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        let endpoint = parse_mqtt_endpoint(&settings.broker, settings.use_tls)?;
        let availability_topic = format!("{}/{}", settings.topic_prefix, AVAILABILITY_TOPIC_SUFFIX);

        let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_start(true);
        if let Some(user) = settings.username.as_deref() {
            options.set_credentials(user, settings.password.as_deref().unwrap_or_default());
        }
        let will = rumqttc::v5::mqttbytes::v5::LastWill::new(
            availability_topic.clone(),
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
            None,
        );
        options.set_last_will(will);
        if endpoint.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, connection) = Client::new(options, 64);
        spawn_connection_drain(connection, endpoint.host.clone())?;

        client
            .try_publish(
                &availability_topic,
                QoS::AtLeastOnce,
                true,
                PAYLOAD_ONLINE.as_bytes().to_vec(),
            )
            .context("queue MQTT availability message")?;
        log::info!(
            "telemetry: MQTT broker {}:{} (TLS: {}, auth: {})",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls,
            settings.username.is_some()
        );

        Ok(Self {
            client,
            topic_prefix: settings.topic_prefix.clone(),
            availability_topic,
        })
    }

    pub fn topic_for(&self, key: &str) -> String {
        format!("{}/{}", self.topic_prefix, key)
    }

    /// Mark the bridge offline and queue a clean disconnect.
    ///
    /// A clean disconnect suppresses the last will, so the offline status is
    /// published explicitly first. Writes after this are dropped and logged.
    pub fn disconnect(&self) -> Result<()> {
        self.client
            .try_publish(
                &self.availability_topic,
                QoS::AtLeastOnce,
                true,
                PAYLOAD_OFFLINE.as_bytes().to_vec(),
            )
            .context("queue MQTT offline message")?;
        self.client
            .try_disconnect()
            .context("queue MQTT disconnect")?;
        Ok(())
    }
}

impl TelemetryStore for MqttTelemetryStore {
    fn set_string(&self, key: &str, value: &str) {
        let topic = self.topic_for(key);
        if let Err(err) =
            self.client
                .try_publish(&topic, QoS::AtLeastOnce, true, value.as_bytes().to_vec())
        {
            log::warn!("telemetry: dropped write to {}: {}", topic, err);
        }
    }
}

fn spawn_connection_drain(mut connection: Connection, host: String) -> Result<()> {
    std::thread::Builder::new()
        .name("mqtt-telemetry".to_string())
        .spawn(move || {
            for event in connection.iter() {
                match event {
                    Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => break,
                    Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                    Err(rumqttc::v5::ConnectionError::RequestsDone) => break,
                    Err(e) => {
                        log::warn!("MQTT connection error ({}): {}", host, e);
                        std::thread::sleep(RECONNECT_DELAY);
                    }
                }
            }
        })
        .context("spawn MQTT connection thread")?;
    Ok(())
}

fn parse_mqtt_endpoint(addr: &str, tls_override: bool) -> Result<MqttEndpoint> {
    let mut use_tls = tls_override;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}
