//! Staging of large media through the provider file store.
//!
//! Inline base64 works for images but video payloads must be uploaded and
//! referenced by URI. Uploaded files are not immediately usable: the store
//! processes them asynchronously, so the helper polls until the file turns
//! active or fails.

use std::time::Duration;

use crate::client::ModelBackend;
use crate::error::GeminiError;
use crate::types::{FileRef, FileState};

/// Upload size ceiling for video payloads.
pub const MAX_VIDEO_BYTES: usize = 100 * 1024 * 1024;

/// Interval between processing-state polls.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Upper bound on waiting for the store to finish processing.
const MAX_PROCESSING_WAIT: Duration = Duration::from_secs(5 * 60);

/// Upload a video and block until the file store has processed it.
///
/// Returns the active [`FileRef`] whose URI can be placed in a generation
/// request. Fails with `Validation` for oversized or non-video payloads,
/// `Timeout` if processing exceeds the wait bound, and `Generic` if the
/// store reports the file failed.
pub async fn upload_and_wait_for_video(
    backend: &dyn ModelBackend,
    bytes: Vec<u8>,
    mime_type: &str,
) -> Result<FileRef, GeminiError> {
    if !mime_type.starts_with("video/") {
        return Err(GeminiError::Validation(format!(
            "expected a video MIME type, got {mime_type}"
        )));
    }
    if bytes.is_empty() {
        return Err(GeminiError::Validation("video payload is empty".into()));
    }
    if bytes.len() > MAX_VIDEO_BYTES {
        return Err(GeminiError::Validation(format!(
            "video is {} bytes, limit is {MAX_VIDEO_BYTES}",
            bytes.len()
        )));
    }

    let uploaded = backend.upload_file(bytes, mime_type).await?;
    tracing::debug!(name = %uploaded.name, "uploaded video, waiting for processing");
    wait_for_processing(backend, uploaded).await
}

async fn wait_for_processing(
    backend: &dyn ModelBackend,
    mut file: FileRef,
) -> Result<FileRef, GeminiError> {
    let deadline = tokio::time::Instant::now() + MAX_PROCESSING_WAIT;
    loop {
        match file.state {
            FileState::Active => return Ok(file),
            FileState::Failed => {
                return Err(GeminiError::Generic(format!(
                    "file store failed to process {}",
                    file.name
                )));
            }
            FileState::Processing => {}
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(GeminiError::Timeout(format!(
                "file {} still processing after {}s",
                file.name,
                MAX_PROCESSING_WAIT.as_secs()
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
        file = backend.file_status(&file.name).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::request::GenerateContentRequest;
    use crate::client::{ModelResponse, ProviderStream, ResearchSnapshot};
    use crate::types::ResearchTask;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// File-store stub that walks through a scripted state sequence.
    struct FileStoreStub {
        states: Mutex<Vec<FileState>>,
    }

    impl FileStoreStub {
        fn new(states: Vec<FileState>) -> Self {
            Self {
                states: Mutex::new(states),
            }
        }

        fn next_state(&self) -> FileState {
            let mut states = self.states.lock().unwrap();
            if states.len() > 1 {
                states.remove(0)
            } else {
                states[0]
            }
        }

        fn file(&self, state: FileState) -> FileRef {
            FileRef {
                name: "files/vid-1".into(),
                uri: "https://files.example/vid-1".into(),
                mime_type: "video/mp4".into(),
                state,
            }
        }
    }

    #[async_trait]
    impl ModelBackend for FileStoreStub {
        async fn generate(
            &self,
            _request: GenerateContentRequest,
        ) -> Result<ModelResponse, GeminiError> {
            unimplemented!()
        }
        async fn generate_stream(
            &self,
            _request: GenerateContentRequest,
        ) -> Result<ProviderStream, GeminiError> {
            unimplemented!()
        }
        async fn submit_research(
            &self,
            _request: GenerateContentRequest,
        ) -> Result<ResearchTask, GeminiError> {
            unimplemented!()
        }
        async fn poll_research(&self, _task_id: &str) -> Result<ResearchSnapshot, GeminiError> {
            unimplemented!()
        }
        async fn follow_up_research(
            &self,
            _task_id: &str,
            _question: &str,
        ) -> Result<(), GeminiError> {
            unimplemented!()
        }
        async fn upload_file(
            &self,
            _bytes: Vec<u8>,
            _mime_type: &str,
        ) -> Result<FileRef, GeminiError> {
            Ok(self.file(self.next_state()))
        }
        async fn file_status(&self, _name: &str) -> Result<FileRef, GeminiError> {
            Ok(self.file(self.next_state()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_through_processing_until_active() {
        let stub = FileStoreStub::new(vec![
            FileState::Processing,
            FileState::Processing,
            FileState::Active,
        ]);
        let file = upload_and_wait_for_video(&stub, vec![0u8; 16], "video/mp4")
            .await
            .unwrap();
        assert_eq!(file.state, FileState::Active);
    }

    #[tokio::test]
    async fn failed_processing_is_an_error() {
        let stub = FileStoreStub::new(vec![FileState::Failed]);
        let err = upload_and_wait_for_video(&stub, vec![0u8; 16], "video/mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::Generic(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn processing_forever_times_out() {
        let stub = FileStoreStub::new(vec![FileState::Processing]);
        let err = upload_and_wait_for_video(&stub, vec![0u8; 16], "video/mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::Timeout(_)));
    }

    #[tokio::test]
    async fn rejects_non_video_and_oversized_payloads() {
        let stub = FileStoreStub::new(vec![FileState::Active]);
        assert!(matches!(
            upload_and_wait_for_video(&stub, vec![0u8; 16], "image/png").await,
            Err(GeminiError::Validation(_))
        ));
        assert!(matches!(
            upload_and_wait_for_video(&stub, vec![], "video/mp4").await,
            Err(GeminiError::Validation(_))
        ));
        assert!(matches!(
            upload_and_wait_for_video(&stub, vec![0u8; MAX_VIDEO_BYTES + 1], "video/mp4").await,
            Err(GeminiError::Validation(_))
        ));
    }
}
