//! Write pump: serialises outbound messages onto the socket.

use futures_util::SinkExt;
use pulselink_idle::{Activity, Direction};
use pulselink_protocol::{FrameCodec, Message};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Drains `write_rx` onto the socket, stamping write activity after each
/// frame. A write error cancels the connection.
pub(crate) async fn write_pump<W>(
    mut write: FramedWrite<W, FrameCodec>,
    mut write_rx: mpsc::Receiver<Message>,
    activity: Activity,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        if let Err(e) = write.send(m).await {
                            error!("write error: {e}");
                            cancel.cancel();
                            break;
                        }
                        activity.record(Direction::Write);
                    }
                    None => break,
                }
            }
        }
    }

    let _ = write.close().await;
}
