//! Stdio transport speaking the header-block protocol.
//!
//! There is exactly one stream. Malformed blocks and unroutable requests are
//! logged and dropped; only I/O failures and oversized frames end it.

use crate::context::ServiceContext;
use crate::error::ServerError;
use crate::responder::{response_queue, ResponseQueue};
use crate::router::RequestRouter;
use glint_protocol::HeaderBlockFramer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// Serves header-block requests from `reader` until EOF, writing responses
/// to `writer` in request order.
pub async fn serve_pipe<R, W>(mut reader: R, writer: W, ctx: &ServiceContext) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (queue, writer_task) = response_queue(writer, ctx.limits.max_in_flight);
    let router = RequestRouter::new(ctx.default_language.clone());
    let mut framer = HeaderBlockFramer::new().with_max_frame_size(ctx.limits.max_pending_bytes);
    let mut buf = vec![0u8; ctx.limits.read_buffer_size];

    tracing::info!("Serving header frames on stdio");

    let result = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(ServerError::Io(e)),
        };
        tracing::debug!("[stdio] Received {} bytes", n);
        framer.extend(&buf[..n]);

        if let Err(e) = route_frames(&mut framer, &router, &queue, ctx).await {
            break Err(e);
        }
    };

    drop(queue);
    match writer_task.await {
        Ok(Ok(bytes)) => tracing::debug!("[stdio] Wrote {} response bytes", bytes),
        Ok(Err(e)) => return Err(ServerError::Io(e)),
        Err(e) => tracing::error!("[stdio] Response writer task failed: {}", e),
    }

    tracing::info!("stdio stream closed");
    result
}

async fn route_frames(
    framer: &mut HeaderBlockFramer,
    router: &RequestRouter,
    queue: &ResponseQueue,
    ctx: &ServiceContext,
) -> Result<(), ServerError> {
    loop {
        let frame = match framer.try_extract() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(e) if e.is_recoverable() => {
                tracing::warn!("[stdio] Discarding frame: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let routed = match router.route(frame) {
            Ok(routed) => routed,
            Err(e) => {
                tracing::warn!("[stdio] Dropping request: {}", e);
                continue;
            }
        };

        tracing::debug!(
            "[stdio] Highlight request: rid={:?} lang={} code_len={}",
            routed.request_id,
            routed.highlight.language,
            routed.highlight.code.len()
        );

        let render = ctx.render_job(routed.highlight);
        let router = router.clone();
        let request_id = routed.request_id;
        queue
            .push(move || {
                let html = render()?;
                match router.highlight_response(request_id.as_deref(), html).encode() {
                    Ok(frame) => Some(frame.freeze()),
                    Err(e) => {
                        tracing::warn!("[stdio] Dropping response: {}", e);
                        None
                    }
                }
            })
            .await?;
    }
}
