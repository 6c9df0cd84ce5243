//! Pose telemetry for the remote visualisation client.
//!
//! Frames are sent over UDP without acknowledgement. A lost or refused
//! datagram is never retried.

use crate::state::{BallState, DroneState};
use crate::{Error, Result};
use clap::ValueEnum;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wire encoding of a telemetry frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// JSON object as consumed by the visualisation server.
    #[default]
    Json,

    /// Nine little-endian `f32`: drone position, drone angles and ball position.
    Binary,
}

/// Snapshot of the simulation published once per telemetry period.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Milliseconds since the unix epoch.
    pub ts: u64,
    #[serde(rename = "dronePos")]
    pub drone_pos: [f32; 3],
    #[serde(rename = "droneAng")]
    pub drone_ang: [f32; 3],
    #[serde(rename = "droneVel")]
    pub drone_vel: [f32; 3],
    #[serde(rename = "ballPos")]
    pub ball_pos: [f32; 3],
    #[serde(rename = "ballVel")]
    pub ball_vel: [f32; 3],
}

impl Telemetry {
    /// Size of a binary frame in bytes.
    pub const BINARY_LEN: usize = 9 * 4;

    pub fn new(ts: u64, drone: &DroneState, ball: &BallState) -> Self {
        Self {
            ts,
            drone_pos: array(&drone.position),
            drone_ang: array(&drone.ang_pos),
            drone_vel: array(&drone.velocity),
            ball_pos: array(&ball.position),
            ball_vel: array(&ball.velocity),
        }
    }

    /// A frame stamped with the current wall clock time.
    pub fn now(drone: &DroneState, ball: &BallState) -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64);
        Self::new(ts, drone, ball)
    }

    pub fn encode(&self, encoding: Encoding) -> Result<Vec<u8>> {
        match encoding {
            Encoding::Json => Ok(serde_json::to_vec(self)?),
            Encoding::Binary => Ok(self.encode_binary()),
        }
    }

    fn encode_binary(&self) -> Vec<u8> {
        self.drone_pos
            .iter()
            .chain(&self.drone_ang)
            .chain(&self.ball_pos)
            .flat_map(|n| n.to_le_bytes())
            .collect()
    }
}

fn array(v: &Vector3<f32>) -> [f32; 3] {
    [v.x, v.y, v.z]
}

/// Destination of telemetry frames.
pub trait TelemetrySink: Send + Sync {
    fn publish(&self, frame: &Telemetry) -> Result<()>;
}

/// Sink sending each frame as one UDP datagram to a fixed peer.
#[derive(Debug)]
pub struct UdpTelemetry {
    socket: UdpSocket,
    encoding: Encoding,
}

impl UdpTelemetry {
    /// Open a socket and connect it to `addr`.
    pub fn connect(addr: impl ToSocketAddrs, encoding: Encoding) -> Result<Self> {
        let peer = addr
            .to_socket_addrs()
            .map_err(Error::Telemetry)?
            .next()
            .ok_or_else(|| {
                Error::Telemetry(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "telemetry address resolved to nothing",
                ))
            })?;

        let local = if peer.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };

        let socket = UdpSocket::bind(local).map_err(Error::Telemetry)?;
        socket.connect(peer).map_err(Error::Telemetry)?;

        Ok(Self { socket, encoding })
    }
}

impl TelemetrySink for UdpTelemetry {
    fn publish(&self, frame: &Telemetry) -> Result<()> {
        let bytes = frame.encode(self.encoding)?;
        self.socket.send(&bytes).map_err(Error::Telemetry)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame() -> Telemetry {
        let mut drone = DroneState::at(Vector3::new(1., 2., 3.));
        drone.ang_pos = Vector3::new(0.1, 0.2, 0.3);
        drone.velocity = Vector3::new(-1., 0., 1.);
        let ball = BallState {
            position: Vector3::new(10., 0., 5.),
            velocity: Vector3::new(-2., 0., 10.),
        };
        Telemetry::new(1_700_000_000_000, &drone, &ball)
    }

    #[test]
    fn json_uses_client_field_names() {
        let bytes = frame().encode(Encoding::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["ts"], 1_700_000_000_000u64);
        assert_eq!(value["dronePos"], serde_json::json!([1.0, 2.0, 3.0]));
        assert_eq!(value["ballVel"], serde_json::json!([-2.0, 0.0, 10.0]));
        assert!(value.get("droneAng").is_some());
        assert!(value.get("droneVel").is_some());
        assert!(value.get("ballPos").is_some());
    }

    #[test]
    fn binary_frame_is_nine_floats() {
        let bytes = frame().encode(Encoding::Binary).unwrap();
        assert_eq!(bytes.len(), Telemetry::BINARY_LEN);

        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        assert_eq!(floats, [1., 2., 3., 0.1, 0.2, 0.3, 10., 0., 5.]);
    }

    #[test]
    fn udp_sink_delivers_frames() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let sink = UdpTelemetry::connect(receiver.local_addr().unwrap(), Encoding::Json).unwrap();
        sink.publish(&frame()).unwrap();

        let mut buf = [0; 1024];
        let len = receiver.recv(&mut buf).unwrap();
        let received: Telemetry = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(received, frame());
    }
}
