//! Wire packets exchanged between nodes and their length-delimited framing
//!
//! A frame is a 4-byte big-endian length followed by a bincode-encoded
//! [`Packet`]. Reading a frame and decoding it are separate steps so that a
//! malformed payload can be reported and dropped while the stream stays
//! usable.

use crate::error::{FrameError, JoinError};
use crate::message::Message;
use crate::roles::JoinRequest;
use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame accepted in either direction
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    // Handshake
    Join(JoinRequest),
    Accepted { name: String },
    Refused { name: String, error: JoinError },

    // Traffic
    Data(Message),
    Leave { name: String },
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        Ok(serialize(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        Ok(deserialize(payload)?)
    }
}

/// Writes one length-prefixed frame
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(payload.len()));
    }

    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed frame without decoding it
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let payload = packet.encode()?;
    write_frame(writer, &payload).await
}

pub async fn read_packet<R>(reader: &mut R) -> Result<Packet, FrameError>
where
    R: AsyncRead + Unpin,
{
    let payload = read_frame(reader).await?;
    Packet::decode(&payload)
}
