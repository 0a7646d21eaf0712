use kubey::error::{KubeyError, Result};
use kubey::k8s::{cluster_id, context_from_id};

#[test]
fn test_error_types() {
    let err = KubeyError::connectivity("prod", "connection refused");

    assert!(err.to_string().contains("prod"));
    assert!(err.to_string().contains("connection refused"));
}

#[test]
fn test_result_alias() {
    fn lookup() -> Result<()> {
        Err(KubeyError::NotFound("cluster context-x".to_string()))
    }

    assert!(matches!(lookup(), Err(KubeyError::NotFound(_))));
}

#[test]
fn test_cluster_id_round_trip() {
    let id = cluster_id("kind-dev");

    assert_eq!(id, "context-kind-dev");
    assert_eq!(context_from_id(&id), Some("kind-dev"));
    assert_eq!(context_from_id("kind-dev"), None);
}

#[test]
fn test_version_const() {
    assert!(!kubey::VERSION.is_empty());
}
