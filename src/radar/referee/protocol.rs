//! Frame layout, command IDs, and decoded record types for the referee-system wire
//! protocol, following the published RoboMaster referee-system field layouts.

use anyhow::{anyhow, Result};

pub const SOF: u8 = 0xa5;
pub const HEADER_LEN: usize = 5;
pub const CRC8_LEN: usize = 1;
pub const CMD_ID_LEN: usize = 2;
pub const CRC16_LEN: usize = 2;

pub const FRAME_OVERHEAD: usize = HEADER_LEN + CMD_ID_LEN + CRC16_LEN;

pub mod cmd {
    pub const GAME_STATUS: u16 = 0x0001;
    pub const ROBOT_HP: u16 = 0x0003;
    pub const EVENT_DATA: u16 = 0x0101;
    pub const ROBOT_STATUS: u16 = 0x0201;
    pub const RADAR_MARK_DATA: u16 = 0x020c;
    pub const RADAR_INFO: u16 = 0x020e;
    pub const RADAR_DECISION: u16 = 0x0121;
    pub const MAP_ROBOT_DATA: u16 = 0x0305;
    pub const INTERACTION: u16 = 0x0301;
}

// SOF | DataLen(2) | Seq(1) | CRC8(1)
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub data_len: u16,
    pub seq: u8,
    pub crc8: u8,
}

impl FrameHeader {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN || bytes[0] != SOF {
            return None;
        }
        Some(Self {
            data_len: u16::from_le_bytes([bytes[1], bytes[2]]),
            seq: bytes[3],
            crc8: bytes[4],
        })
    }

    pub fn total_len(&self) -> usize {
        FRAME_OVERHEAD + self.data_len as usize
    }
}

pub fn encode_frame(cmd_id: u16, data: &[u8], seq: u8) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + data.len());
    frame.push(SOF);
    frame.extend_from_slice(&(data.len() as u16).to_le_bytes());
    frame.push(seq);
    super::crc::append_crc8(&mut frame);
    frame.extend_from_slice(&cmd_id.to_le_bytes());
    frame.extend_from_slice(data);
    super::crc::append_crc16(&mut frame);
    frame
}

pub fn encode_interaction_payload(sub_cmd_id: u16, sender_id: u16, receiver_id: u16, payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(6 + payload.len());
    data.extend_from_slice(&sub_cmd_id.to_le_bytes());
    data.extend_from_slice(&sender_id.to_le_bytes());
    data.extend_from_slice(&receiver_id.to_le_bytes());
    data.extend_from_slice(payload);
    data
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Blue,
}

impl Color {
    pub fn from_robot_id(robot_id: u16) -> Self {
        if robot_id >= 100 {
            Color::Blue
        } else {
            Color::Red
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GameStatus {
    pub game_type: u8,
    pub game_progress: u8,
    pub stage_remain_time: u16,
}

impl GameStatus {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(anyhow!("game_status payload too short: {} bytes", data.len()));
        }
        Ok(Self {
            game_type: data[0] & 0x0f,
            game_progress: (data[0] >> 4) & 0x0f,
            stage_remain_time: u16::from_le_bytes([data[1], data[2]]),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RobotHp {
    pub red_hero_hp: u16,
    pub red_infantry_3_hp: u16,
    pub blue_hero_hp: u16,
    pub blue_infantry_3_hp: u16,
}

impl RobotHp {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(anyhow!("robot_hp payload too short: {} bytes", data.len()));
        }
        Ok(Self {
            red_hero_hp: u16::from_le_bytes([data[0], data[1]]),
            red_infantry_3_hp: u16::from_le_bytes([data[2], data[3]]),
            blue_hero_hp: u16::from_le_bytes([data[4], data[5]]),
            blue_infantry_3_hp: u16::from_le_bytes([data[6], data[7]]),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EventData {
    pub event_flags: u32,
}

impl EventData {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(anyhow!("event_data payload too short: {} bytes", data.len()));
        }
        Ok(Self {
            event_flags: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RobotStatus {
    pub robot_id: u16,
    pub robot_level: u8,
    pub current_hp: u16,
}

impl RobotStatus {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 5 {
            return Err(anyhow!("robot_status payload too short: {} bytes", data.len()));
        }
        Ok(Self {
            robot_id: u16::from_le_bytes([data[0], data[1]]),
            robot_level: data[2],
            current_hp: u16::from_le_bytes([data[3], data[4]]),
        })
    }

    pub fn color(&self) -> Color {
        Color::from_robot_id(self.robot_id)
    }
}

// Progress (0-100%) of marking each enemy robot for auto-aim assistance.
#[derive(Debug, Clone, Copy, Default)]
pub struct RadarMarkProgress {
    pub mark_hero_progress: u8,
    pub mark_engineer_progress: u8,
    pub mark_standard_3_progress: u8,
    pub mark_sentry_progress: u8,
}

impl RadarMarkProgress {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(anyhow!(
                "radar_mark_progress payload too short: {} bytes",
                data.len()
            ));
        }
        Ok(Self {
            mark_hero_progress: data[0],
            mark_engineer_progress: data[1],
            mark_standard_3_progress: data[2],
            mark_sentry_progress: data[3],
        })
    }
}

// Remaining double-vulnerability activations/chances reported to the radar.
#[derive(Debug, Clone, Copy, Default)]
pub struct RadarStatus {
    pub double_vulnerability_chances: u8,
    pub double_vulnerability_active: bool,
}

impl RadarStatus {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(anyhow!("radar_status payload is empty"));
        }
        Ok(Self {
            double_vulnerability_chances: data[0] & 0x7f,
            double_vulnerability_active: data[0] & 0x80 != 0,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RadarDecision {
    pub accepted: bool,
}

impl RadarDecision {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(anyhow!("radar_decision payload is empty"));
        }
        Ok(Self {
            accepted: data[0] != 0,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SentryInteraction {
    pub sub_cmd_id: u16,
    pub sender_id: u16,
    pub receiver_id: u16,
    pub payload: Vec<u8>,
}

impl SentryInteraction {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 6 {
            return Err(anyhow!(
                "interaction payload too short for subcommand header: {} bytes",
                data.len()
            ));
        }
        Ok(Self {
            sub_cmd_id: u16::from_le_bytes([data[0], data[1]]),
            sender_id: u16::from_le_bytes([data[2], data[3]]),
            receiver_id: u16::from_le_bytes([data[4], data[5]]),
            payload: data[6..].to_vec(),
        })
    }
}

// Location in meters is clamped and converted to centimeters on the wire.
pub fn encode_map_robot(target_robot_id: u16, x_meters: f32, y_meters: f32) -> Vec<u8> {
    let x_cm = (x_meters * 100.0).round().clamp(0.0, 65535.0) as u16;
    let y_cm = (y_meters * 100.0).round().clamp(0.0, 65535.0) as u16;

    let mut data = Vec::with_capacity(6);
    data.extend_from_slice(&target_robot_id.to_le_bytes());
    data.extend_from_slice(&x_cm.to_le_bytes());
    data.extend_from_slice(&y_cm.to_le_bytes());
    data
}
