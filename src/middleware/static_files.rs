use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::error::BoxError;
use crate::middleware::{Middleware, Next};
use crate::request::{Request, TransportBody};
use crate::response::{ContentType, Response};

const CHUNK_SIZE: usize = 16 * 1024;

/// Serves regular files under `root` for `GET` and `HEAD`.
///
/// A hit streams the file with a content type picked from its extension and
/// ends the pipeline. Misses (no file, a directory, a path escaping `root`,
/// other methods) continue to the next middleware.
pub fn serve_dir(root: PathBuf) -> impl Middleware {
    let root: Arc<Path> = Arc::from(root);
    move |req: Request, next: Next| {
        let root = Arc::clone(&root);
        async move {
            let target = if req.method().is_read_only() {
                resolve(&root, req.path())
            } else {
                None
            };
            if let Some(path) = target {
                if let Some(res) = open(&path).await {
                    return res;
                }
            }
            next.run(req).await
        }
    }
}

/// Maps a request path onto `root`. Rejects `..` and backslashes outright
/// instead of normalizing them.
fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in request_path.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            s if s.contains('\\') => return None,
            s => path.push(s),
        }
    }
    Some(path)
}

async fn open(path: &Path) -> Option<Response> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    if !meta.is_file() {
        return None;
    }
    let file = match File::open(path).await {
        Ok(f) => f,
        Err(e) => {
            warn!(path = %path.display(), "static file unreadable: {e}");
            return None;
        }
    };
    let content_type = path
        .extension()
        .and_then(|e| e.to_str())
        .map(ContentType::from_extension)
        .unwrap_or(ContentType::OctetStream);
    debug!(path = %path.display(), content_type = content_type.as_str(), "serving static file");

    let mut res = Response::stream(content_type, file_body(file));
    res.set_header("content-length", &meta.len().to_string());
    Some(res)
}

fn file_body(file: File) -> TransportBody {
    let chunks = futures_util::stream::try_unfold(file, read_chunk);
    StreamBody::new(chunks.map_err(|e| -> BoxError { Box::new(e) })).boxed_unsync()
}

async fn read_chunk(mut file: File) -> std::io::Result<Option<(Frame<Bytes>, File)>> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let n = file.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);
    Ok(Some((Frame::data(Bytes::from(buf)), file)))
}
