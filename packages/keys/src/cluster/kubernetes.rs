//! Live cluster access through the `kube` client

use super::{ClusterClient, SecretData};
use crate::error::{VaultError, VaultResult};
use crate::naming::UNSEALER_CONTAINER;
use crate::secret::SecretValue;
use base64::{engine::general_purpose, Engine as _};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, Patch, PatchParams, PostParams};
use kube::Client;
use log::debug;
use std::collections::BTreeMap;

const VAULT_SERVER_GROUP: &str = "kubevault.com";
const VAULT_SERVER_VERSION: &str = "v1alpha2";
const VAULT_SERVER_KIND: &str = "VaultServer";
const VAULT_SERVER_PLURAL: &str = "vaultservers";

#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the local kubeconfig or the in-cluster service account
    pub async fn try_default() -> VaultResult<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl ClusterClient for KubeCluster {
    async fn get_secret(&self, namespace: &str, name: &str) -> VaultResult<Option<SecretData>> {
        let secret = self.secrets(namespace).get_opt(name).await?;
        Ok(secret.map(|secret| {
            secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(key, value)| (key, SecretValue::from_bytes(value.0)))
                .collect()
        }))
    }

    async fn set_secret_key(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &SecretValue,
    ) -> VaultResult<()> {
        let api = self.secrets(namespace);

        if api.get_opt(name).await?.is_none() {
            debug!("Creating secret {namespace}/{name}");
            let secret = Secret {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some(namespace.to_string()),
                    ..Default::default()
                },
                data: Some(BTreeMap::from([(
                    key.to_string(),
                    ByteString(value.expose_secret().to_vec()),
                )])),
                ..Default::default()
            };
            api.create(&PostParams::default(), &secret).await?;
            return Ok(());
        }

        let patch = serde_json::json!({
            "data": { key: general_purpose::STANDARD.encode(value.expose_secret()) }
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn remove_secret_key(&self, namespace: &str, name: &str, key: &str) -> VaultResult<()> {
        let api = self.secrets(namespace);
        let Some(secret) = api.get_opt(name).await? else {
            return Ok(());
        };
        let present = secret.data.as_ref().is_some_and(|data| data.contains_key(key));
        if !present {
            return Ok(());
        }

        // null removes the key under JSON merge patch semantics
        let patch = serde_json::json!({ "data": { key: null } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn unsealer_args(&self, namespace: &str, statefulset: &str) -> VaultResult<Option<Vec<String>>> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let Some(sts) = api.get_opt(statefulset).await? else {
            return Ok(None);
        };

        let args = sts
            .spec
            .and_then(|spec| spec.template.spec)
            .map(|pod| {
                pod.containers
                    .into_iter()
                    .filter(|container| container.name == UNSEALER_CONTAINER)
                    .flat_map(|container| container.args.unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(args))
    }

    async fn vault_server(&self, namespace: &str, name: &str) -> VaultResult<serde_json::Value> {
        let gvk = GroupVersionKind::gvk(VAULT_SERVER_GROUP, VAULT_SERVER_VERSION, VAULT_SERVER_KIND);
        let resource = ApiResource::from_gvk_with_plural(&gvk, VAULT_SERVER_PLURAL);
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &resource);

        let object = api.get(name).await.map_err(|err| match VaultError::from(err) {
            VaultError::NotFound(_) => VaultError::NotFound(format!("vaultserver {namespace}/{name}")),
            other => other,
        })?;
        Ok(serde_json::to_value(object)?)
    }

    async fn cluster_uid(&self) -> VaultResult<String> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespace = api.get("kube-system").await?;
        namespace
            .metadata
            .uid
            .ok_or_else(|| VaultError::backend("kubernetes", "kube-system namespace has no uid"))
    }
}
