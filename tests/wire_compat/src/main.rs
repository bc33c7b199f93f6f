fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use cineload_progress_store::{PlaybackPosition, ProgressRecord};
    use cineload_protocol::{
        ApiResponse, CompleteUploadRequest, CompleteUploadResponse, InitUploadRequest,
        InitUploadResponse, UploadProgress, UploadProgressResponse,
    };
    use cineload_upload::UploadEvent;

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Normalizes JSON values so that integer-valued floats compare equal.
    ///
    /// Browsers store `5400` for a float duration, serde writes `5400.0`.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture, re-serializes it, and compares the JSON
    /// values (order-independent, float-normalized comparison).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  rust:    {reserialized}"
        );
        parsed
    }

    // --- Requests ---

    #[test]
    fn fixture_init_upload_request() {
        let req = roundtrip_test::<InitUploadRequest>("init_upload_request.json");
        assert_eq!(req.chunk_size, 5 * 1024 * 1024);
    }

    #[test]
    fn fixture_complete_upload_request() {
        roundtrip_test::<CompleteUploadRequest>("complete_upload_request.json");
    }

    // --- Response envelopes ---

    #[test]
    fn fixture_init_upload_response() {
        let resp = roundtrip_test::<ApiResponse<InitUploadResponse>>("init_upload_response.json");
        assert!(resp.is_ok());
        assert_eq!(resp.data.unwrap().upload_id, "5f0c2a9e-upload");
    }

    #[test]
    fn fixture_upload_progress_response() {
        let resp = roundtrip_test::<ApiResponse<UploadProgressResponse>>(
            "upload_progress_response.json",
        );
        let data = resp.data.unwrap();
        assert_eq!(data.uploaded_chunk_indices, vec![0, 1, 2]);
        assert_eq!(data.total_chunks, Some(5));
    }

    #[test]
    fn fixture_complete_upload_response() {
        let resp =
            roundtrip_test::<ApiResponse<CompleteUploadResponse>>("complete_upload_response.json");
        assert_eq!(
            resp.data.unwrap().file_url,
            "https://cdn.example.com/videos/5f0c2a9e.mp4"
        );
    }

    #[test]
    fn fixture_error_envelopes() {
        let auth = roundtrip_test::<ApiResponse<InitUploadResponse>>("error_unauthorized.json");
        assert!(!auth.is_ok());
        assert!(auth.is_auth_error());

        let failed = roundtrip_test::<ApiResponse<serde_json::Value>>("error_chunk_failed.json");
        assert!(!failed.is_ok());
        assert!(!failed.is_auth_error());
        assert_eq!(failed.message(), "分片上传失败");
    }

    // --- Persisted records ---

    #[test]
    fn fixture_progress_record() {
        let record = roundtrip_test::<ProgressRecord>("progress_record.json");
        assert_eq!(record.uploaded_chunks, vec![0, 1]);
        assert_eq!(record.chunk_size, Some(5 * 1024 * 1024));
        assert!(record.is_compatible(5 * 1024 * 1024, 3));
    }

    #[test]
    fn fixture_progress_record_legacy() {
        // Written before chunk lists and sizes were tracked.
        let record: ProgressRecord =
            serde_json::from_value(load_fixture("progress_record_legacy.json")).unwrap();
        assert!(record.uploaded_chunks.is_empty());
        assert_eq!(record.file_type, "");
        assert_eq!(record.chunk_size, None);
        assert_eq!(record.created_at, None);
        assert!(record.is_compatible(5 * 1024 * 1024, 2));
        assert!(!record.is_compatible(5 * 1024 * 1024, 3));

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("chunkSize").is_none());
        assert_eq!(json["uploadedChunks"], serde_json::json!([]));
    }

    #[test]
    fn fixture_playback_position() {
        let pos = roundtrip_test::<PlaybackPosition>("playback_position.json");
        assert_eq!(pos.current_time, 1325.5);
        assert_eq!(pos.duration, 5400.0);
    }

    // --- Client-side snapshots ---

    #[test]
    fn fixture_upload_progress() {
        let progress = roundtrip_test::<UploadProgress>("upload_progress.json");
        assert_eq!(progress, UploadProgress::new(5242880, 12582912, 1, 3));
    }

    #[test]
    fn fixture_upload_events() {
        let events = vec![
            UploadEvent::Started {
                file_name: "trailer.mp4".into(),
                file_size: 12582912,
                total_chunks: 3,
                resumed_chunks: 0,
            },
            UploadEvent::Progress(UploadProgress::new(5242880, 12582912, 1, 3)),
            UploadEvent::Paused {
                upload_id: None,
                uploaded_chunks: 0,
                total_chunks: 3,
            },
            UploadEvent::Completed {
                upload_id: "5f0c2a9e-upload".into(),
                file_url: "https://cdn.example.com/videos/5f0c2a9e.mp4".into(),
            },
            UploadEvent::Failed {
                error: "login expired: 用户未登录".into(),
            },
            UploadEvent::Cancelled,
        ];
        assert_eq!(
            normalize_value(&serde_json::to_value(&events).unwrap()),
            normalize_value(&load_fixture("upload_events.json"))
        );
    }
}
