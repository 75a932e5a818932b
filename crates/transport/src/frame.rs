//! Length-prefixed bincode frames

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::TransportError;

/// Default upper bound of a single frame body
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Encode `value` and write it as one frame
pub async fn write_frame<W, T>(
    writer: &mut W,
    value: &T,
    max_frame_bytes: usize,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = bincode::serialize(value)?;
    if body.len() > max_frame_bytes || body.len() > u32::MAX as usize {
        return Err(TransportError::FrameTooLarge {
            size: body.len(),
            max: max_frame_bytes,
        });
    }
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and decode it
///
/// Returns `Ok(None)` when the peer closed the stream cleanly before a new frame.
pub async fn read_frame<R, T>(
    reader: &mut R,
    max_frame_bytes: usize,
) -> Result<Option<T>, TransportError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > max_frame_bytes {
        return Err(TransportError::FrameTooLarge {
            size: len,
            max: max_frame_bytes,
        });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(bincode::deserialize(&body)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Request;
    use contracts::MessageSet;

    #[tokio::test]
    async fn frames_carry_requests() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        let set = MessageSet::builder("app").with_message("hello").build();

        write_frame(&mut client, &Request::Process(set.clone()), DEFAULT_MAX_FRAME_BYTES)
            .await
            .unwrap();
        let decoded: Option<Request> = read_frame(&mut server, DEFAULT_MAX_FRAME_BYTES)
            .await
            .unwrap();

        match decoded {
            Some(Request::Process(received)) => assert_eq!(received, set),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn clean_eof_yields_none() {
        let (client, mut server) = tokio::io::duplex(1024);
        drop(client);
        let decoded: Option<Request> = read_frame(&mut server, DEFAULT_MAX_FRAME_BYTES)
            .await
            .unwrap();
        assert!(decoded.is_none());
    }

    #[tokio::test]
    async fn oversized_frames_are_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        client.write_u32(1024).await.unwrap();
        let result: Result<Option<Request>, _> = read_frame(&mut server, 16).await;
        assert!(matches!(
            result,
            Err(TransportError::FrameTooLarge { size: 1024, max: 16 })
        ));
    }
}
