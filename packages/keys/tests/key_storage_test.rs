//! Key store behaviour: Kubernetes secret store, factory, REST backends over httpmock

mod common;

use base64::{engine::general_purpose, Engine as _};
use common::{OpLog, RecordingStore};
use httpmock::prelude::*;
use kvault_keys::cluster::MemoryCluster;
use kvault_keys::config::{AwsCredentials, AzureCredentials, PurgePolicy, ToolConfig};
use kvault_keys::descriptor::{
    AwsKmsSsmSpec, GoogleKmsGcsSpec, KubernetesSecretSpec, UnsealingMode, VaultServerDescriptor,
};
use kvault_keys::error::VaultError;
use kvault_keys::naming::{KeyNaming, KeyPrefix};
use kvault_keys::secret::SecretValue;
use kvault_keys::services::key_storage::aws_kms_ssm::EMPTY_PARAMETER_VALUE;
use kvault_keys::services::key_storage::{
    AwsKmsSsmStore, AzureKeyVaultStore, GoogleAuth, GoogleKmsGcsStore, KubernetesSecretStore,
};
use kvault_keys::services::{create_key_store, KeyStoreGuard, TokenKeyStore};
use serde_json::json;

fn naming(shares: i64) -> KeyNaming {
    KeyNaming::new(KeyPrefix::new("k8s.uid.demo.vault"), "", shares)
}

fn kubernetes_store(cluster: &MemoryCluster) -> KubernetesSecretStore<MemoryCluster> {
    KubernetesSecretStore::new(cluster.clone(), "demo", "vault-keys", naming(5))
}

#[tokio::test]
async fn test_get_missing_key_is_not_found() {
    let cluster = MemoryCluster::new().with_secret("demo", "vault-keys", [("vault-root-token", "s.abc")]);
    let store = kubernetes_store(&cluster);

    let err = store.get("k8s.uid.demo.vault-root-token").await.unwrap_err();
    assert!(err.is_not_found());

    let err = kubernetes_store(&MemoryCluster::new())
        .get("vault-root-token")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_set_then_get_returns_value_including_empty() {
    let cluster = MemoryCluster::new();
    let store = kubernetes_store(&cluster);

    for value in ["s.abc", ""] {
        store.set("k8s.uid.demo.vault-root-token", &SecretValue::from(value)).await.unwrap();
        let read = store.get("k8s.uid.demo.vault-root-token").await.unwrap();
        assert_eq!(read.expose_secret(), value.as_bytes());
    }
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let cluster = MemoryCluster::new().with_secret("demo", "vault-keys", [("vault-unseal-key-0", "share-0")]);
    let store = kubernetes_store(&cluster);

    store.delete("vault-unseal-key-0").await.unwrap();
    store.delete("vault-unseal-key-0").await.unwrap();
    assert!(store.get("vault-unseal-key-0").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_current_and_legacy_names_never_coincide() {
    let store = kubernetes_store(&MemoryCluster::new());

    assert_ne!(store.new_token_name().unwrap(), store.old_token_name().unwrap());
    for id in 0..store.secret_shares() {
        assert_ne!(
            store.new_unseal_key_name(id).unwrap(),
            store.old_unseal_key_name(id).unwrap()
        );
    }
    assert!(matches!(
        store.new_unseal_key_name(5),
        Err(VaultError::IndexOutOfRange { id: 5, shares: 5 })
    ));
    assert!(store.old_unseal_key_name(-1).is_err());
}

#[tokio::test]
async fn test_guard_cleans_store_on_drop() {
    let log = OpLog::default();
    {
        let guard = KeyStoreGuard::new(RecordingStore::new(3, log.clone()));
        assert_eq!(guard.provider(), "recording");
    }
    assert_eq!(log.entries(), vec!["clean"]);
}

fn kubernetes_server(cluster_uid: Option<&str>) -> VaultServerDescriptor {
    let mode = UnsealingMode::KubernetesSecret(KubernetesSecretSpec {
        secret_name: "vault-keys".to_string(),
    });
    let descriptor = VaultServerDescriptor::new("demo", "vault", mode, 5, 3).unwrap();
    match cluster_uid {
        Some(uid) => descriptor.with_cluster_id(uid),
        None => descriptor,
    }
}

#[tokio::test]
async fn test_factory_uses_key_prefix_argument() {
    let cluster = MemoryCluster::new().with_statefulset(
        "demo",
        "vault",
        ["--secret-shares=5", "--key-prefix=first", "--key-prefix=custom"],
    );

    let store = create_key_store(&kubernetes_server(Some("uid")), &cluster, &ToolConfig::with_defaults())
        .await
        .unwrap();
    assert_eq!(store.new_token_name().unwrap(), "custom-root-token");
    assert_eq!(store.new_unseal_key_name(4).unwrap(), "custom-unseal-key-4");
}

#[tokio::test]
async fn test_factory_defaults_prefix_from_cluster_identity() {
    let cluster = MemoryCluster::new().with_statefulset("demo", "vault", ["--secret-shares=5"]);

    let store = create_key_store(&kubernetes_server(Some("uid")), &cluster, &ToolConfig::with_defaults())
        .await
        .unwrap();
    assert_eq!(store.new_token_name().unwrap(), "k8s.uid.demo.vault-root-token");
}

#[tokio::test]
async fn test_missing_statefulset_makes_current_names_undeterminable() {
    let cluster = MemoryCluster::new();

    let store = create_key_store(&kubernetes_server(Some("uid")), &cluster, &ToolConfig::with_defaults())
        .await
        .unwrap();
    assert!(matches!(store.new_token_name(), Err(VaultError::NameUndeterminable(_))));
    assert_eq!(store.old_token_name().unwrap(), "vault-root-token");
    assert_eq!(store.old_unseal_key_name(0).unwrap(), "vault-unseal-key-0");
}

fn azure_store(server: &MockServer, purge: PurgePolicy) -> AzureKeyVaultStore {
    let credentials = AzureCredentials {
        tenant_id: "tenant".to_string(),
        client_id: "client".to_string(),
        client_secret: SecretValue::from("secret"),
    };
    AzureKeyVaultStore::new(reqwest::Client::new(), &server.base_url(), credentials, purge, naming(5))
        .with_login_endpoint(&server.base_url())
}

fn mock_azure_token(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST).path("/tenant/oauth2/v2.0/token");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"access_token": "aad-token", "token_type": "Bearer", "expires_in": 3599}));
    })
}

#[tokio::test]
async fn test_azure_set_and_get_use_dashed_names_and_cached_token() {
    let server = MockServer::start();
    let token = mock_azure_token(&server);
    let put = server.mock(|when, then| {
        when.method(PUT)
            .path("/secrets/k8s-uid-demo-vault-root-token")
            .query_param("api-version", "7.4")
            .header("authorization", "Bearer aad-token")
            .json_body(json!({"value": "cy5hYmM=", "contentType": "password"}));
        then.status(200).json_body(json!({"value": "cy5hYmM=", "contentType": "password"}));
    });
    let get = server.mock(|when, then| {
        when.method(GET).path("/secrets/k8s-uid-demo-vault-root-token");
        then.status(200).json_body(json!({"value": "cy5hYmM=", "contentType": "password"}));
    });

    let store = azure_store(&server, PurgePolicy::default());
    store
        .set("k8s.uid.demo.vault-root-token", &SecretValue::from("s.abc"))
        .await
        .unwrap();
    let value = store.get("k8s.uid.demo.vault-root-token").await.unwrap();

    assert_eq!(value.expose_as_str().unwrap(), "s.abc");
    put.assert();
    get.assert();
    token.assert_hits(1);
}

#[tokio::test]
async fn test_azure_get_rejects_unexpected_content_type() {
    let server = MockServer::start();
    mock_azure_token(&server);
    server.mock(|when, then| {
        when.method(GET).path("/secrets/vault-root-token");
        then.status(200).json_body(json!({"value": "cy5hYmM=", "contentType": "text/plain"}));
    });

    let err = azure_store(&server, PurgePolicy::default())
        .get("vault-root-token")
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Decryption(_)));
}

#[tokio::test]
async fn test_azure_missing_secret_is_not_found() {
    let server = MockServer::start();
    mock_azure_token(&server);
    server.mock(|when, then| {
        when.method(GET).path("/secrets/vault-root-token");
        then.status(404).json_body(json!({"error": {"code": "SecretNotFound"}}));
    });

    let err = azure_store(&server, PurgePolicy::default())
        .get("vault-root-token")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_azure_delete_purges_and_gives_up_after_bounded_attempts() {
    let server = MockServer::start();
    mock_azure_token(&server);
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/secrets/vault-unseal-key-0");
        then.status(200).json_body(json!({}));
    });
    let purge = server.mock(|when, then| {
        when.method(DELETE).path("/deletedsecrets/vault-unseal-key-0");
        then.status(409).json_body(json!({"error": {"code": "Conflict"}}));
    });
    let policy = PurgePolicy {
        attempts: 2,
        interval_secs: 0,
    };

    let err = azure_store(&server, policy)
        .delete("vault-unseal-key-0")
        .await
        .unwrap_err();

    assert!(matches!(err, VaultError::BackendUnavailable(_)));
    delete.assert();
    purge.assert_hits(2);
}

#[tokio::test]
async fn test_azure_delete_of_absent_secret_succeeds_without_purge() {
    let server = MockServer::start();
    mock_azure_token(&server);
    server.mock(|when, then| {
        when.method(DELETE).path("/secrets/vault-unseal-key-0");
        then.status(404);
    });
    let purge = server.mock(|when, then| {
        when.method(DELETE).path("/deletedsecrets/vault-unseal-key-0");
        then.status(204);
    });

    azure_store(&server, PurgePolicy::default())
        .delete("vault-unseal-key-0")
        .await
        .unwrap();
    purge.assert_hits(0);
}

const CRYPTO_KEY_PATH: &str = "/v1/projects/prj/locations/global/keyRings/ring/cryptoKeys/key";

fn google_store(server: &MockServer) -> GoogleKmsGcsStore {
    let spec = GoogleKmsGcsSpec {
        bucket: "vault-bucket".to_string(),
        kms_project: "prj".to_string(),
        kms_location: "global".to_string(),
        kms_key_ring: "ring".to_string(),
        kms_crypto_key: "key".to_string(),
        credential_secret_ref: None,
    };
    GoogleKmsGcsStore::new(
        reqwest::Client::new(),
        &spec,
        GoogleAuth::Bearer(SecretValue::from("gcp-token")),
        naming(5),
    )
    .with_endpoints(&server.base_url(), &server.base_url())
}

fn mock_gcs_object(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(GET)
            .path("/storage/v1/b/vault-bucket/o/vault-root-token")
            .query_param("alt", "media")
            .header("authorization", "Bearer gcp-token");
        then.status(200).body("ciphertext");
    })
}

#[tokio::test]
async fn test_google_get_decrypts_object() {
    let server = MockServer::start();
    let object = mock_gcs_object(&server);
    let decrypt = server.mock(|when, then| {
        when.method(POST).path(format!("{CRYPTO_KEY_PATH}:decrypt"));
        then.status(200).json_body(json!({
            "plaintext": general_purpose::STANDARD.encode("s.abc"),
            "plaintextCrc32c": crc32c::crc32c(b"s.abc").to_string(),
        }));
    });

    let value = google_store(&server).get("vault-root-token").await.unwrap();

    assert_eq!(value.expose_as_str().unwrap(), "s.abc");
    object.assert();
    decrypt.assert();
}

#[tokio::test]
async fn test_google_checksum_mismatch_is_decryption_error() {
    let server = MockServer::start();
    mock_gcs_object(&server);
    server.mock(|when, then| {
        when.method(POST).path(format!("{CRYPTO_KEY_PATH}:decrypt"));
        then.status(200).json_body(json!({
            "plaintext": general_purpose::STANDARD.encode("s.abc"),
            "plaintextCrc32c": "1",
        }));
    });

    let err = google_store(&server).get("vault-root-token").await.unwrap_err();
    assert!(matches!(err, VaultError::Decryption(_)));
}

#[tokio::test]
async fn test_google_undecryptable_ciphertext_is_decryption_error() {
    let server = MockServer::start();
    mock_gcs_object(&server);
    server.mock(|when, then| {
        when.method(POST).path(format!("{CRYPTO_KEY_PATH}:decrypt"));
        then.status(400).json_body(json!({"error": {"message": "Decryption failed"}}));
    });

    let err = google_store(&server).get("vault-root-token").await.unwrap_err();
    assert!(matches!(err, VaultError::Decryption(_)));
}

#[tokio::test]
async fn test_google_missing_object_is_not_found() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/storage/v1/b/vault-bucket/o/vault-root-token");
        then.status(404).body("No such object");
    });

    let err = google_store(&server).get("vault-root-token").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_google_set_encrypts_then_uploads() {
    let server = MockServer::start();
    let encrypt = server.mock(|when, then| {
        when.method(POST).path(format!("{CRYPTO_KEY_PATH}:encrypt"));
        then.status(200).json_body(json!({
            "ciphertext": general_purpose::STANDARD.encode("ciphertext"),
            "verifiedPlaintextCrc32c": true,
        }));
    });
    let upload = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/storage/v1/b/vault-bucket/o")
            .query_param("uploadType", "media")
            .query_param("name", "vault-unseal-key-1")
            .body("ciphertext");
        then.status(200).json_body(json!({"name": "vault-unseal-key-1"}));
    });

    google_store(&server)
        .set("vault-unseal-key-1", &SecretValue::from("share-1"))
        .await
        .unwrap();
    encrypt.assert();
    upload.assert();
}

#[tokio::test]
async fn test_google_unverified_encrypt_is_rejected_before_upload() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(format!("{CRYPTO_KEY_PATH}:encrypt"));
        then.status(200).json_body(json!({
            "ciphertext": general_purpose::STANDARD.encode("ciphertext"),
            "verifiedPlaintextCrc32c": false,
        }));
    });
    let upload = server.mock(|when, then| {
        when.method(POST).path("/upload/storage/v1/b/vault-bucket/o");
        then.status(200);
    });

    let err = google_store(&server)
        .set("vault-unseal-key-1", &SecretValue::from("share-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Encryption(_)));
    upload.assert_hits(0);
}

#[tokio::test]
async fn test_google_empty_value_round_trips_without_kms() {
    let server = MockServer::start();
    let kms = server.mock(|when, then| {
        when.method(POST).path_contains(CRYPTO_KEY_PATH);
        then.status(400);
    });
    let upload = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/storage/v1/b/vault-bucket/o")
            .query_param("name", "vault-root-token")
            .body("");
        then.status(200).json_body(json!({"name": "vault-root-token"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/storage/v1/b/vault-bucket/o/vault-root-token");
        then.status(200).body("");
    });

    let store = google_store(&server);
    store.set("vault-root-token", &SecretValue::from("")).await.unwrap();
    let value = store.get("vault-root-token").await.unwrap();

    assert!(value.is_empty());
    upload.assert();
    kms.assert_hits(0);
}

const AWS_JSON: &str = "application/x-amz-json-1.1";

async fn aws_store(server: &MockServer) -> AwsKmsSsmStore {
    let spec = AwsKmsSsmSpec {
        kms_key_id: "key-1".to_string(),
        ssm_key_prefix: String::new(),
        region: "us-east-1".to_string(),
        credential_secret_ref: None,
        endpoint: Some(server.base_url()),
    };
    let credentials = AwsCredentials {
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: SecretValue::from("secret"),
    };
    AwsKmsSsmStore::connect(&spec, Some(credentials), naming(5))
        .await
        .unwrap()
}

fn mock_aws<'a>(
    server: &'a MockServer,
    target: &str,
    status: u16,
    body: serde_json::Value,
) -> httpmock::Mock<'a> {
    server.mock(|when, then| {
        when.method(POST).path("/").header("x-amz-target", target);
        then.status(status).header("content-type", AWS_JSON).json_body(body);
    })
}

fn mock_ssm_parameter<'a>(server: &'a MockServer, value: &str) -> httpmock::Mock<'a> {
    mock_aws(
        server,
        "AmazonSSM.GetParameters",
        200,
        json!({
            "Parameters": [{"Name": "vault-root-token", "Type": "String", "Value": value, "Version": 1}],
            "InvalidParameters": [],
        }),
    )
}

#[tokio::test]
async fn test_aws_get_decrypts_parameter_value() {
    let server = MockServer::start();
    let parameter = mock_ssm_parameter(&server, &general_purpose::STANDARD.encode("ciphertext"));
    let decrypt = mock_aws(
        &server,
        "TrentService.Decrypt",
        200,
        json!({"KeyId": "key-1", "Plaintext": general_purpose::STANDARD.encode("s.abc")}),
    );

    let value = aws_store(&server).await.get("vault-root-token").await.unwrap();

    assert_eq!(value.expose_as_str().unwrap(), "s.abc");
    parameter.assert();
    decrypt.assert();
}

#[tokio::test]
async fn test_aws_missing_parameter_is_not_found() {
    let server = MockServer::start();
    mock_aws(
        &server,
        "AmazonSSM.GetParameters",
        200,
        json!({"Parameters": [], "InvalidParameters": ["vault-root-token"]}),
    );

    let err = aws_store(&server).await.get("vault-root-token").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_aws_invalid_ciphertext_is_decryption_error() {
    let server = MockServer::start();
    mock_ssm_parameter(&server, &general_purpose::STANDARD.encode("ciphertext"));
    mock_aws(
        &server,
        "TrentService.Decrypt",
        400,
        json!({"__type": "InvalidCiphertextException", "message": "invalid ciphertext"}),
    );

    let err = aws_store(&server).await.get("vault-root-token").await.unwrap_err();
    assert!(matches!(err, VaultError::Decryption(_)));
}

#[tokio::test]
async fn test_aws_set_stores_base64_ciphertext() {
    let server = MockServer::start();
    let encrypt = mock_aws(
        &server,
        "TrentService.Encrypt",
        200,
        json!({"KeyId": "key-1", "CiphertextBlob": general_purpose::STANDARD.encode("ciphertext")}),
    );
    let put = server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .header("x-amz-target", "AmazonSSM.PutParameter")
            .json_body_partial(
                json!({
                    "Name": "vault-unseal-key-1",
                    "Value": general_purpose::STANDARD.encode("ciphertext"),
                    "Overwrite": true,
                })
                .to_string(),
            );
        then.status(200)
            .header("content-type", AWS_JSON)
            .json_body(json!({"Version": 1, "Tier": "Standard"}));
    });

    aws_store(&server)
        .await
        .set("vault-unseal-key-1", &SecretValue::from("share-1"))
        .await
        .unwrap();
    encrypt.assert();
    put.assert();
}

#[tokio::test]
async fn test_aws_empty_value_round_trips_without_kms() {
    let server = MockServer::start();
    let encrypt = mock_aws(&server, "TrentService.Encrypt", 400, json!({"__type": "ValidationException"}));
    let decrypt = mock_aws(&server, "TrentService.Decrypt", 400, json!({"__type": "ValidationException"}));
    let put = server.mock(|when, then| {
        when.method(POST)
            .path("/")
            .header("x-amz-target", "AmazonSSM.PutParameter")
            .json_body_partial(json!({"Name": "vault-root-token", "Value": EMPTY_PARAMETER_VALUE}).to_string());
        then.status(200)
            .header("content-type", AWS_JSON)
            .json_body(json!({"Version": 1, "Tier": "Standard"}));
    });
    mock_ssm_parameter(&server, EMPTY_PARAMETER_VALUE);

    let store = aws_store(&server).await;
    store.set("vault-root-token", &SecretValue::from("")).await.unwrap();
    let value = store.get("vault-root-token").await.unwrap();

    assert!(value.is_empty());
    put.assert();
    encrypt.assert_hits(0);
    decrypt.assert_hits(0);
}

#[tokio::test]
async fn test_aws_delete_of_absent_parameter_succeeds() {
    let server = MockServer::start();
    let delete = mock_aws(
        &server,
        "AmazonSSM.DeleteParameter",
        400,
        json!({"__type": "ParameterNotFound", "message": "parameter not found"}),
    );

    aws_store(&server).await.delete("vault-root-token").await.unwrap();
    delete.assert();
}

#[tokio::test]
async fn test_aws_delete_failure_is_reported() {
    let server = MockServer::start();
    mock_aws(
        &server,
        "AmazonSSM.DeleteParameter",
        400,
        json!({"__type": "AccessDeniedException", "message": "not authorized"}),
    );

    let err = aws_store(&server).await.delete("vault-root-token").await.unwrap_err();
    assert!(matches!(err, VaultError::BackendUnavailable(_)));
}
