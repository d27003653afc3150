use lms_portal::storage::{
    MockStorageService, S3StorageClient, StorageService, extension_of, sanitize_key,
};
use uuid::Uuid;

#[cfg(test)]
mod mock_tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_presigned_url() {
        let mock = MockStorageService::new();
        let key = "modules/org/intro.mp4";
        let url = mock
            .get_presigned_upload_url(key, "video/mp4")
            .await
            .unwrap();

        assert!(url.contains("signature=fake"));
        assert!(url.contains(key));
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockStorageService::new_failing();
        assert!(
            mock.get_presigned_upload_url("a.mp4", "video/mp4")
                .await
                .is_err()
        );
        assert!(mock.put_object("a.pdf", "application/pdf", vec![1]).await.is_err());
        assert!(mock.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_mock_records_sanitized_uploads() {
        let mock = MockStorageService::new();
        let written = mock
            .put_object("modules/../../etc/passwd", "text/plain", b"root".to_vec())
            .await
            .unwrap();

        assert_eq!(written, "modules/etc/passwd");
        assert_eq!(mock.uploads(), vec![("modules/etc/passwd".to_string(), 4)]);

        // Clones share the upload log.
        let clone = mock.clone();
        clone.put_object("b.bin", "application/octet-stream", vec![0; 8]).await.unwrap();
        assert_eq!(mock.uploads().len(), 2);
    }
}

#[cfg(test)]
mod key_tests {
    use super::*;

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("/a//b/./c/../d"), "a/b/c/d");
        assert_eq!(sanitize_key("../../"), "");
        assert_eq!(sanitize_key("modules/x/y.pdf"), "modules/x/y.pdf");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Report.PDF"), "pdf");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("README"), "bin");
        assert_eq!(extension_of("weird.p/df"), "bin");
        assert_eq!(extension_of("evil.sh;rm"), "bin");
    }
}

#[cfg(test)]
mod s3_tests {
    use super::*;

    async fn client() -> S3StorageClient {
        S3StorageClient::new(
            "http://localhost:9000",
            "us-east-1",
            "testkey",
            "testsecret",
            "testbucket",
        )
        .await
    }

    #[tokio::test]
    async fn test_s3_client_creation() {
        // Construction never touches the network.
        let _client = client().await;
    }

    #[tokio::test]
    async fn test_s3_presigned_url_format() {
        let client = client().await;
        let key = format!("modules/{}/slides.pdf", Uuid::new_v4());
        let url = client
            .get_presigned_upload_url(&key, "application/pdf")
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:9000/testbucket/"));
        assert!(url.contains(&key));
        assert!(url.contains("X-Amz-Expires=600"));
    }
}
