//! polyp-server: browser UI shell for the examination
//!
//! One shared [`Examination`](polyp_eye::Examination) sits behind an axum
//! router. The page picks or uploads a video, feeds it to the endoscope and
//! shows the annotated frames as an MJPEG stream while the toggles are
//! flipped live.

pub mod error;
pub mod feed;
pub mod http;
pub mod ui;
pub mod videos;

pub use error::{ApiError, ApiResult};
pub use feed::{FeedHub, FeedStatus};
pub use http::{create_router, AppState};
pub use videos::{sanitize_name, VideoEntry, VideoLibrary, VideoOrigin};

use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Serve the UI on `bind_address` until Ctrl-C.
pub async fn serve(state: AppState, bind_address: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_address).await?;
    serve_with_shutdown(state, listener, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Serve on an already bound listener until `signal` resolves. The running
/// feed is stopped and live streams are closed so open connections drain.
pub async fn serve_with_shutdown<F>(
    state: AppState,
    listener: TcpListener,
    signal: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Polyp scope UI listening on http://{}", listener.local_addr()?);

    let examination = Arc::clone(&state.examination);
    let feed = Arc::clone(&state.feed);
    let app = create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            info!("Shutting down");
            examination.stop();
            feed.close();
        })
        .await?;

    info!("Server stopped");
    Ok(())
}
