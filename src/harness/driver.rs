//! Stream and connection workload drivers.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use super::error::HarnessError;
use super::rate_limiter::RateLimiter;
use super::sink::ErrorSink;
use super::types::{Options, RunStats};
use crate::metrics::recorder;
use crate::payload::PayloadPool;
use crate::transport::{BoxedStream, MuxConn, MuxConnPtr};

/// Leading bytes shown when an echo does not match.
const PREFIX_LEN: usize = 3;

/// State shared by every unit of one stress run.
#[derive(Clone)]
pub(crate) struct Workload {
    pub options: Options,
    pub pool: PayloadPool,
    pub limiter: RateLimiter,
    pub sink: ErrorSink,
    pub stats: Arc<RunStats>,
}

/// A message handed from the write side to the read side.
struct Queued {
    index: usize,
    msg: Bytes,
    /// Resolves once the write finished; `false` if it failed.
    written: oneshot::Receiver<bool>,
}

/// Write `msg_num` messages and verify their echoes in order, then close the
/// stream once every echo has been drained.
pub(crate) async fn drive_stream(stream: BoxedStream, work: &Workload) {
    let msg_num = work.options.msg_num;
    tracing::trace!("stream driver: {} messages", msg_num);

    let (mut reader, mut writer) = tokio::io::split(stream);
    let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<Queued>();

    let write_side = async {
        for index in 0..msg_num {
            let msg = match work
                .pool
                .message_in(work.options.msg_min, work.options.msg_max)
            {
                Ok(msg) => msg,
                Err(e) => {
                    work.sink.report(e);
                    continue;
                }
            };

            // Queued before writing; the reader pairs echoes by position.
            let len = msg.len();
            let (done_tx, written) = oneshot::channel();
            let _ = queue_tx.send(Queued {
                index,
                msg: msg.clone(),
                written,
            });
            tracing::trace!(
                "writing {} bytes (message {}/{} #{})",
                len,
                index,
                msg_num,
                prefix(&msg)
            );

            match write_message(&mut writer, &msg).await {
                Ok(()) => {
                    let _ = done_tx.send(true);
                    work.stats.message_written();
                    recorder::record_message_written(len);
                }
                Err(source) => {
                    let _ = done_tx.send(false);
                    work.sink.report(HarnessError::Write { index, source });
                }
            }
        }
        drop(queue_tx);
        writer
    };

    let read_side = async {
        let mut buf = Vec::new();
        while let Some(Queued {
            index,
            msg: expected,
            mut written,
        }) = queue_rx.recv().await
        {
            buf.resize(expected.len(), 0);
            let result = {
                let read = reader.read_exact(&mut buf);
                tokio::pin!(read);
                tokio::select! {
                    biased;
                    ok = &mut written => match ok {
                        Ok(true) => read.await,
                        // Never sent, so there is no echo to wait for.
                        _ => continue,
                    },
                    res = &mut read => res,
                }
            };

            match result {
                Ok(_) => {
                    if let Some(err) = compare(index, &expected, &buf) {
                        work.sink.report(err);
                    } else {
                        work.stats.message_verified(expected.len());
                        recorder::record_message_verified(expected.len());
                    }
                }
                Err(source) => {
                    tracing::debug!(
                        "failed to read {} bytes (message {}/{} #{})",
                        expected.len(),
                        index,
                        msg_num,
                        prefix(&expected)
                    );
                    work.sink.report(HarnessError::Read {
                        index,
                        expected_len: expected.len(),
                        source,
                    });
                }
            }
        }
        reader
    };

    let (writer, reader) = tokio::join!(write_side, read_side);
    let mut stream = reader.unsplit(writer);
    if let Err(e) = stream.shutdown().await {
        tracing::debug!("stream close: {}", e);
    }
}

async fn write_message<W>(writer: &mut W, msg: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(msg).await?;
    writer.flush().await
}

/// Open one stream on `conn` and drive it. Open failures are reported and
/// the unit ends there.
pub(crate) async fn open_stream_and_rw(conn: &dyn MuxConn, work: &Workload) {
    let stream = match conn.open_stream().await {
        Ok(stream) => stream,
        Err(e) => {
            work.sink.report(HarnessError::OpenStream(e));
            return;
        }
    };
    work.stats.stream_opened();
    recorder::record_stream_opened();

    drive_stream(stream, work).await;
}

/// Fan out `stream_num` rate-limited stream units over `conn`, wait for all
/// of them, then close `conn`.
pub(crate) async fn drive_connection(conn: MuxConnPtr, work: &Workload) {
    tracing::debug!("connection driver: {} streams", work.options.stream_num);

    let mut tasks = JoinSet::new();
    for _ in 0..work.options.stream_num {
        if work.sink.is_aborted() {
            break;
        }
        let conn = conn.clone();
        let work = work.clone();
        tasks.spawn(async move {
            work.limiter
                .run(async {
                    recorder::set_units_in_flight(work.limiter.in_flight());
                    open_stream_and_rw(conn.as_ref(), &work).await;
                })
                .await;
        });
    }
    join_all(tasks, &work.sink).await;

    // Cleanup only; stream results already decided pass or fail.
    if let Err(e) = conn.close().await {
        tracing::warn!("connection close failed: {}", e);
    }
}

/// Barrier: wait for every task, reporting the ones that panicked.
pub(crate) async fn join_all(mut tasks: JoinSet<()>, sink: &ErrorSink) {
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            sink.report(e.into());
        }
    }
}

pub(crate) fn compare(index: usize, expected: &[u8], actual: &[u8]) -> Option<HarnessError> {
    if expected == actual {
        return None;
    }
    Some(HarnessError::Mismatch {
        index,
        expected_len: expected.len(),
        actual_len: actual.len(),
        expected_prefix: prefix(expected),
        actual_prefix: prefix(actual),
    })
}

fn prefix(buf: &[u8]) -> String {
    hex::encode(&buf[..buf.len().min(PREFIX_LEN)])
}
