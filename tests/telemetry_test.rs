// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-rotor-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! MQTT telemetry against a minimal in-process broker
//!
//! The broker speaks just enough MQTT 3.1.1 for a publishing client:
//! CONNECT/CONNACK, PUBLISH/PUBACK and PINGREQ/PINGRESP.

use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time;

use rust_rotor_monitor::config::MqttConfig;
use rust_rotor_monitor::telemetry::{rotor_topic, MqttTelemetryPublisher, TelemetryPublisher};

#[derive(Debug)]
enum BrokerEvent {
    Connected,
    Published {
        topic: String,
        qos: u8,
        payload: String,
    },
}

async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
    let header = stream.read_u8().await?;
    let mut length = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await?;
        length |= usize::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let mut body = vec![0; length];
    stream.read_exact(&mut body).await?;
    Ok((header, body))
}

async fn serve_session(
    mut stream: TcpStream,
    acknowledge: bool,
    events: mpsc::UnboundedSender<BrokerEvent>,
) -> std::io::Result<()> {
    loop {
        let (header, body) = read_packet(&mut stream).await?;
        match header >> 4 {
            1 => {
                events.send(BrokerEvent::Connected).ok();
                stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await?;
            }
            3 => {
                let qos = (header >> 1) & 0x03;
                let topic_len = usize::from(u16::from_be_bytes([body[0], body[1]]));
                let topic = String::from_utf8_lossy(&body[2..2 + topic_len]).to_string();
                let mut offset = 2 + topic_len;
                let packet_id = if qos > 0 {
                    offset += 2;
                    Some([body[offset - 2], body[offset - 1]])
                } else {
                    None
                };
                let payload = String::from_utf8_lossy(&body[offset..]).to_string();
                events
                    .send(BrokerEvent::Published {
                        topic,
                        qos,
                        payload,
                    })
                    .ok();
                if let (true, Some([high, low])) = (acknowledge, packet_id) {
                    stream.write_all(&[0x40, 0x02, high, low]).await?;
                }
            }
            12 => stream.write_all(&[0xd0, 0x00]).await?,
            _ => {}
        }
    }
}

/// Start the broker, returning its URL and the stream of what it saw
async fn start_broker(acknowledge: bool) -> (String, mpsc::UnboundedReceiver<BrokerEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (events_tx, events) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_session(stream, acknowledge, events_tx.clone()));
        }
    });
    (format!("tcp://{}", address), events)
}

fn broker_config(url: String) -> MqttConfig {
    MqttConfig {
        url,
        client_id: "rotor_monitor_test".to_string(),
        ..MqttConfig::default()
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<BrokerEvent>) -> BrokerEvent {
    time::timeout(Duration::from_secs(3), events.recv())
        .await
        .expect("broker event in time")
        .expect("broker running")
}

#[tokio::test]
async fn test_publish_is_acknowledged_at_qos_1() {
    let (url, mut events) = start_broker(true).await;
    let publisher = MqttTelemetryPublisher::connect(&broker_config(url), Duration::from_secs(2))
        .await
        .unwrap();
    assert!(matches!(next_event(&mut events).await, BrokerEvent::Connected));

    let topic = rotor_topic("1", "HP");
    publisher
        .publish(&topic, r#"{"lifeRatio":0.5}"#)
        .await
        .unwrap();
    match next_event(&mut events).await {
        BrokerEvent::Published {
            topic,
            qos,
            payload,
        } => {
            assert_eq!(topic, "TS1/RotorHP");
            assert_eq!(qos, 1);
            assert_eq!(payload, r#"{"lifeRatio":0.5}"#);
        }
        other => panic!("unexpected broker event {:?}", other),
    }

    // Consecutive publishes each wait for their own acknowledgement
    publisher.publish(&rotor_topic("1", "LP"), "{}").await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        BrokerEvent::Published { .. }
    ));
}

#[tokio::test]
async fn test_unacknowledged_publish_times_out_and_reconnects() {
    let (url, mut events) = start_broker(false).await;
    let publisher = MqttTelemetryPublisher::connect(&broker_config(url), Duration::from_millis(500))
        .await
        .unwrap();
    assert!(matches!(next_event(&mut events).await, BrokerEvent::Connected));

    let started = Instant::now();
    let result = publisher.publish(&rotor_topic("1", "HP"), "{}").await;
    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(2));

    // The broker received the message but never acknowledged it
    assert!(matches!(
        next_event(&mut events).await,
        BrokerEvent::Published { qos: 1, .. }
    ));

    // The timeout drops the connection and the client comes back
    loop {
        if let BrokerEvent::Connected = next_event(&mut events).await {
            break;
        }
    }
}

#[tokio::test]
async fn test_unreachable_broker_fails_at_startup() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let result = MqttTelemetryPublisher::connect(
        &broker_config(format!("tcp://{}", address)),
        Duration::from_millis(500),
    )
    .await;
    assert!(result.is_err());
}
