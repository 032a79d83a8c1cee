//! Static file serving module
//!
//! Streams a file from the working directory into the response. Every
//! filesystem failure maps to 404; no content type or caching headers are
//! added.

use crate::http::Response;
use hyper::StatusCode;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;

/// Join a sanitized request path onto the working directory
pub fn resolve(working_directory: &Path, path: &str) -> PathBuf {
    working_directory.join(path.trim_start_matches('/'))
}

/// Stream `file_path` into the response
///
/// Returns `false` (after writing a 404) when the file cannot be opened or
/// is not a regular file.
pub async fn stream_file(file_path: &Path, res: &mut Response) -> bool {
    match open_regular_file(file_path).await {
        Ok(file) => {
            res.pipe_file(file);
            true
        }
        // File not found is common (404), no need to log
        Err(_) => {
            res.set_status(StatusCode::NOT_FOUND);
            res.end();
            false
        }
    }
}

async fn open_regular_file(path: &Path) -> io::Result<File> {
    let file = File::open(path).await?;
    if file.metadata().await?.is_file() {
        Ok(file)
    } else {
        Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_resolve_strips_leading_separator() {
        let wd = Path::new("/srv/site");
        assert_eq!(resolve(wd, "/index.html"), PathBuf::from("/srv/site/index.html"));
        assert_eq!(resolve(wd, "/css/a.css"), PathBuf::from("/srv/site/css/a.css"));
        assert_eq!(resolve(wd, "/"), PathBuf::from("/srv/site/"));
    }

    #[tokio::test]
    async fn test_stream_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.txt");
        std::fs::write(&file, "hello from disk").unwrap();

        let mut res = Response::new();
        assert!(stream_file(&file, &mut res).await);
        assert!(res.is_ended());

        let response = res.into_hyper();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello from disk");
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let mut res = Response::new();
        assert!(!stream_file(&dir.path().join("nope.html"), &mut res).await);
        assert!(res.is_ended());
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_directory_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let mut res = Response::new();
        assert!(!stream_file(dir.path(), &mut res).await);
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
