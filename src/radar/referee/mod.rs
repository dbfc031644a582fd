//! Bidirectional serial link to the referee system: a framed, CRC-protected packet
//! codec, a receive-side decoding state machine, and a thread-safe send path for map
//! updates.

pub mod crc;
pub mod protocol;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::robot::Robot;
use protocol::{cmd, Color, FrameHeader};

/// The serial transport the communicator drives, abstracted behind a trait so tests
/// can substitute a mock for the real `serialport` device.
pub trait SerialTransport: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
}

impl SerialTransport for Box<dyn serialport::SerialPort> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        std::io::Read::read(self.as_mut(), buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        std::io::Write::write_all(self.as_mut(), buf)
    }
}

fn open_port(path: &str, baud_rate: u32) -> Option<Box<dyn SerialTransport>> {
    match serialport::new(path, baud_rate)
        .timeout(Duration::from_millis(50))
        .open()
    {
        Ok(port) => Some(Box::new(port) as Box<dyn SerialTransport>),
        Err(e) => {
            warn!("failed to open referee serial port {path}: {e}");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Free,
    Length,
    Crc16,
}

// Each field is independently swapped by the decoder as matching packets arrive;
// readers observe the latest value without blocking the decoder for long.
#[derive(Default)]
struct RefereeRecords {
    game_status: Option<Arc<protocol::GameStatus>>,
    robot_hp: Option<Arc<protocol::RobotHp>>,
    event_data: Option<Arc<protocol::EventData>>,
    robot_status: Option<Arc<protocol::RobotStatus>>,
    radar_mark_progress: Option<Arc<protocol::RadarMarkProgress>>,
    radar_status: Option<Arc<protocol::RadarStatus>>,
    radar_decision: Option<Arc<protocol::RadarDecision>>,
    sentry_interaction: Option<Arc<protocol::SentryInteraction>>,
}

struct Inner {
    port: Option<Box<dyn SerialTransport>>,
    is_connected: bool,
    rx_buffer: Vec<u8>,
    decode_state: DecodeState,
    expected_len: usize,
    seq: u8,
    records: RefereeRecords,
}

/// Drives the referee-system serial link: decodes inbound frames into shared records
/// and encodes outbound map-position updates. All public methods take `&self` — the
/// single `parking_lot::RwLock` inside serializes writers (decode dispatch, send)
/// against readers of the cached records.
pub struct RefereeCommunicator {
    inner: RwLock<Inner>,
    serial_path: String,
    baud_rate: u32,
    class_num: usize,
}

impl RefereeCommunicator {
    pub fn new(serial_path: impl Into<String>, baud_rate: u32, class_num: usize) -> Self {
        let serial_path = serial_path.into();
        let port = open_port(&serial_path, baud_rate);
        let is_connected = port.is_some();
        if !is_connected {
            warn!("referee communicator starting disconnected from {serial_path}");
        }

        Self {
            inner: RwLock::new(Inner {
                port,
                is_connected,
                rx_buffer: Vec::with_capacity(512),
                decode_state: DecodeState::Free,
                expected_len: 0,
                seq: 0,
                records: RefereeRecords::default(),
            }),
            serial_path,
            baud_rate,
            class_num,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.read().is_connected
    }

    // Attempts to reopen the serial device, returning the new connection status.
    pub fn reconnect(&self) -> bool {
        let mut inner = self.inner.write();
        inner.port = open_port(&self.serial_path, self.baud_rate);
        inner.is_connected = inner.port.is_some();
        inner.is_connected
    }

    // Reads whatever bytes are currently available and runs the decode state machine.
    // A no-op when disconnected.
    pub fn update(&self) {
        let mut buf = [0u8; 1024];
        let read_result = {
            let mut inner = self.inner.write();
            if !inner.is_connected {
                return;
            }
            let port = inner
                .port
                .as_mut()
                .expect("is_connected implies a port is present");
            port.read(&mut buf)
        };

        match read_result {
            Ok(0) => {}
            Ok(n) => self.ingest(&buf[..n]),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
            Err(e) => {
                warn!("referee serial read failed: {e}, marking disconnected");
                self.inner.write().is_connected = false;
            }
        }
    }

    // Appends `bytes` to the rolling receive buffer and drains as many complete frames
    // as are available. Exposed directly so callers that already hold raw serial bytes
    // (or tests) can drive the decoder without a real port.
    pub fn ingest(&self, bytes: &[u8]) {
        let mut inner = self.inner.write();
        inner.rx_buffer.extend_from_slice(bytes);
        decode_buffer(&mut inner);
    }

    // Emits a map-position packet for every opposing, located robot. Silently does
    // nothing if disconnected or if the communicator doesn't yet know its own color
    // (no `robot_status` packet received yet).
    pub fn send_map_robot(&self, robots: &[Robot]) {
        let mut inner = self.inner.write();
        if !inner.is_connected {
            return;
        }

        let Some(own_color) = inner.records.robot_status.as_ref().map(|s| s.color()) else {
            debug!("own robot_status unknown yet, skipping map-robot send");
            return;
        };

        for robot in robots {
            let (Some(label), Some(location)) = (robot.label, robot.location) else {
                continue;
            };
            let Some((color, number)) = robot_identity(label, self.class_num) else {
                continue;
            };
            if color == own_color {
                continue;
            }

            let target_robot_id = number + if color == Color::Blue { 100 } else { 0 };
            let data = protocol::encode_map_robot(target_robot_id, location.x, location.y);
            let seq = inner.seq;
            inner.seq = inner.seq.wrapping_add(1);
            let frame = protocol::encode_frame(cmd::MAP_ROBOT_DATA, &data, seq);

            let write_result = inner
                .port
                .as_mut()
                .expect("is_connected implies a port is present")
                .write_all(&frame);
            if let Err(e) = write_result {
                warn!("referee serial write failed: {e}, marking disconnected");
                inner.is_connected = false;
                return;
            }
        }
    }

    pub fn game_status(&self) -> Option<Arc<protocol::GameStatus>> {
        self.inner.read().records.game_status.clone()
    }

    pub fn robot_hp(&self) -> Option<Arc<protocol::RobotHp>> {
        self.inner.read().records.robot_hp.clone()
    }

    pub fn event_data(&self) -> Option<Arc<protocol::EventData>> {
        self.inner.read().records.event_data.clone()
    }

    pub fn robot_status(&self) -> Option<Arc<protocol::RobotStatus>> {
        self.inner.read().records.robot_status.clone()
    }

    pub fn radar_mark_progress(&self) -> Option<Arc<protocol::RadarMarkProgress>> {
        self.inner.read().records.radar_mark_progress.clone()
    }

    pub fn radar_status(&self) -> Option<Arc<protocol::RadarStatus>> {
        self.inner.read().records.radar_status.clone()
    }

    pub fn radar_decision(&self) -> Option<Arc<protocol::RadarDecision>> {
        self.inner.read().records.radar_decision.clone()
    }

    pub fn sentry_interaction(&self) -> Option<Arc<protocol::SentryInteraction>> {
        self.inner.read().records.sentry_interaction.clone()
    }
}

// Maps a detector class label to `(color, in-match robot number)` assuming the
// detector's classes are split evenly between the two teams' robot types.
fn robot_identity(label: i32, class_num: usize) -> Option<(Color, u16)> {
    if label < 0 {
        return None;
    }
    let per_color = (class_num as i32 / 2).max(1);
    let label = label;
    let color_index = label / per_color;
    let number = (label % per_color) + 1;
    let color = if color_index == 0 { Color::Red } else { Color::Blue };
    Some((color, number as u16))
}

// Drains as many complete, CRC-valid frames as `inner.rx_buffer` holds.
fn decode_buffer(inner: &mut Inner) {
    loop {
        match inner.decode_state {
            DecodeState::Free => match inner.rx_buffer.iter().position(|&b| b == protocol::SOF) {
                Some(0) => inner.decode_state = DecodeState::Length,
                Some(index) => {
                    inner.rx_buffer.drain(..index);
                    inner.decode_state = DecodeState::Length;
                }
                None => {
                    inner.rx_buffer.clear();
                    return;
                }
            },
            DecodeState::Length => {
                if inner.rx_buffer.len() < protocol::HEADER_LEN {
                    return;
                }
                let header = FrameHeader::parse(&inner.rx_buffer)
                    .expect("SOF byte already confirmed present at index 0");
                if !crc::verify_crc8(&inner.rx_buffer[..protocol::HEADER_LEN]) {
                    inner.rx_buffer.remove(0);
                    inner.decode_state = DecodeState::Free;
                    continue;
                }
                inner.expected_len = header.total_len();
                inner.decode_state = DecodeState::Crc16;
            }
            DecodeState::Crc16 => {
                if inner.rx_buffer.len() < inner.expected_len {
                    return;
                }
                let packet = &inner.rx_buffer[..inner.expected_len];
                if !crc::verify_crc16(packet) {
                    inner.rx_buffer.remove(0);
                    inner.decode_state = DecodeState::Free;
                    continue;
                }

                let cmd_id = u16::from_le_bytes([
                    packet[protocol::HEADER_LEN],
                    packet[protocol::HEADER_LEN + 1],
                ]);
                let data = &packet[protocol::HEADER_LEN + protocol::CMD_ID_LEN
                    ..packet.len() - protocol::CRC16_LEN];
                fetch_data(&mut inner.records, cmd_id, data);

                inner.rx_buffer.drain(..inner.expected_len);
                inner.decode_state = DecodeState::Free;
            }
        }
    }
}

// Parses `data` by `cmd_id` and swaps the matching record. Parse failures are logged
// and otherwise dropped.
fn fetch_data(records: &mut RefereeRecords, cmd_id: u16, data: &[u8]) {
    macro_rules! swap_record {
        ($field:ident, $ty:path) => {
            match <$ty>::parse(data) {
                Ok(record) => records.$field = Some(Arc::new(record)),
                Err(e) => warn!("failed to parse {} payload: {e}", stringify!($field)),
            }
        };
    }

    match cmd_id {
        cmd::GAME_STATUS => swap_record!(game_status, protocol::GameStatus),
        cmd::ROBOT_HP => swap_record!(robot_hp, protocol::RobotHp),
        cmd::EVENT_DATA => swap_record!(event_data, protocol::EventData),
        cmd::ROBOT_STATUS => swap_record!(robot_status, protocol::RobotStatus),
        cmd::RADAR_MARK_DATA => swap_record!(radar_mark_progress, protocol::RadarMarkProgress),
        cmd::RADAR_INFO => swap_record!(radar_status, protocol::RadarStatus),
        cmd::RADAR_DECISION => swap_record!(radar_decision, protocol::RadarDecision),
        cmd::INTERACTION => swap_record!(sentry_interaction, protocol::SentryInteraction),
        other => debug!("no handler for referee cmd_id 0x{other:04x}, dropping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disconnected_communicator() -> RefereeCommunicator {
        RefereeCommunicator {
            inner: RwLock::new(Inner {
                port: None,
                is_connected: true,
                rx_buffer: Vec::new(),
                decode_state: DecodeState::Free,
                expected_len: 0,
                seq: 0,
                records: RefereeRecords::default(),
            }),
            serial_path: "/dev/null".to_string(),
            baud_rate: 115_200,
            class_num: 14,
        }
    }

    fn robot_status_frame(robot_id: u16, seq: u8) -> Vec<u8> {
        let mut data = vec![0u8; 5];
        data[0..2].copy_from_slice(&robot_id.to_le_bytes());
        protocol::encode_frame(cmd::ROBOT_STATUS, &data, seq)
    }

    #[test]
    fn valid_frame_updates_matching_record() {
        let communicator = disconnected_communicator();
        communicator.ingest(&robot_status_frame(7, 0));

        let status = communicator.robot_status().expect("robot_status set");
        assert_eq!(status.robot_id, 7);
        assert_eq!(status.color(), Color::Red);
    }

    #[test]
    fn garbage_and_bad_crc_are_dropped_without_hanging() {
        let communicator = disconnected_communicator();

        let mut stream = vec![0xff, 0x00, 0xa5, 0x11];
        stream.extend_from_slice(&robot_status_frame(3, 0));
        stream.extend_from_slice(&[0x22, 0xa5]);

        let mut bad = robot_status_frame(5, 1);
        let last = bad.len() - 1;
        bad[last] ^= 0xff; // corrupt CRC16
        stream.extend_from_slice(&bad);

        stream.push(0xa5);
        stream.extend_from_slice(&robot_status_frame(107, 2));

        communicator.ingest(&stream);

        let status = communicator.robot_status().expect("robot_status set");
        assert_eq!(status.robot_id, 107);
        assert_eq!(status.color(), Color::Blue);
    }

    #[test]
    fn encode_map_robot_decodes_back_to_equal_fields() {
        let communicator = disconnected_communicator();
        communicator.ingest(&robot_status_frame(1, 0)); // own color: red

        let data = protocol::encode_map_robot(107, 12.34, 5.0);
        let frame = protocol::encode_frame(cmd::MAP_ROBOT_DATA, &data, 9);

        // There's no dedicated decoded record for outbound map packets (they're never
        // sent to this station), so just confirm the bytes round-trip losslessly
        // through the header/CRC machinery used by `ingest`.
        assert!(crc::verify_crc8(&frame[..protocol::HEADER_LEN]));
        assert!(crc::verify_crc16(&frame));
        let decoded_data = &frame[protocol::HEADER_LEN + protocol::CMD_ID_LEN..frame.len() - 2];
        assert_eq!(decoded_data, data.as_slice());
    }

    #[test]
    fn update_is_noop_when_disconnected() {
        let communicator = RefereeCommunicator::new("/definitely/not/a/real/port", 115_200, 14);
        assert!(!communicator.is_connected());
        communicator.update();
        assert!(communicator.game_status().is_none());
    }

    #[test]
    fn robot_identity_splits_label_space_by_color() {
        assert_eq!(robot_identity(0, 14), Some((Color::Red, 1)));
        assert_eq!(robot_identity(7, 14), Some((Color::Blue, 1)));
        assert_eq!(robot_identity(-1, 14), None);
    }
}
