//! Structured-resource workload.
//!
//! Mimics a control plane storing typed objects under
//! `/registry/<resource>/<namespace>/<name>`: list all objects of a resource,
//! then create, update or delete one of them with optimistic concurrency.
//! The object count hovers around a configured average.

use super::{random_string, Traffic, TrafficContext};
use crate::choice::WeightedChoices;
use crate::client::RecordingClient;
use async_trait::async_trait;
use rand::{Rng, RngCore};
use robustness_types::{KeyValue, Revision, StoreError};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Length of the random suffix of generated object names.
const NAME_SUFFIX_LEN: usize = 5;

/// Write operations the structured-resource workload can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceRequestType {
    Update,
    Create,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTraffic {
    /// Object count the workload steers towards.
    pub average_key_count: usize,

    /// Resource type, e.g. `pods`.
    pub resource: String,

    /// Namespace new objects are created in.
    pub namespace: String,

    /// Weighted writes used while the object count is near the average.
    pub write_choices: WeightedChoices<ResourceRequestType>,
}

impl ResourceTraffic {
    pub fn new(
        average_key_count: usize,
        resource: impl Into<String>,
        namespace: impl Into<String>,
        write_choices: WeightedChoices<ResourceRequestType>,
    ) -> Self {
        Self {
            average_key_count,
            resource: resource.into(),
            namespace: namespace.into(),
            write_choices,
        }
    }

    /// Prefix under which every object of the resource lives.
    pub fn prefix(&self) -> String {
        format!("/registry/{}/", self.resource)
    }

    fn generate_key<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        format!(
            "/registry/{}/{}/{}",
            self.resource,
            self.namespace,
            random_string(NAME_SUFFIX_LEN, rng)
        )
    }

    async fn write(
        &self,
        ctx: &TrafficContext,
        client: &mut RecordingClient,
        rng: &mut (dyn RngCore + Send),
        objects: &[KeyValue],
    ) -> Result<(), StoreError> {
        if objects.is_empty() || objects.len() < self.average_key_count / 2 {
            return self.create(ctx, client, rng).await;
        }

        let target = &objects[rng.gen_range(0..objects.len())];
        if objects.len() > self.average_key_count * 3 / 2 {
            return delete(client, target).await;
        }

        match *self.write_choices.pick(rng) {
            ResourceRequestType::Update => {
                client
                    .compare_revision_and_put(&target.key, &ctx.unique_value(), target.mod_revision)
                    .await
                    .map(drop)
            }
            ResourceRequestType::Create => self.create(ctx, client, rng).await,
            ResourceRequestType::Delete => delete(client, target).await,
        }
    }

    /// Create a new object; fails if the generated name already exists.
    async fn create(
        &self,
        ctx: &TrafficContext,
        client: &mut RecordingClient,
        rng: &mut (dyn RngCore + Send),
    ) -> Result<(), StoreError> {
        let key = self.generate_key(rng);
        client
            .compare_revision_and_put(&key, &ctx.unique_value(), Revision::ZERO)
            .await
            .map(drop)
    }
}

async fn delete(client: &mut RecordingClient, target: &KeyValue) -> Result<(), StoreError> {
    client
        .compare_revision_and_delete(&target.key, target.mod_revision)
        .await
        .map(drop)
}

#[async_trait]
impl Traffic for ResourceTraffic {
    async fn run(
        &self,
        ctx: &TrafficContext,
        client: &mut RecordingClient,
        rng: &mut (dyn RngCore + Send),
    ) {
        let prefix = self.prefix();
        while !ctx.should_stop() {
            let objects = match client.range(&prefix).await {
                Ok(resp) => resp.kvs,
                Err(error) => {
                    trace!(client = %client.id(), %error, "List failed");
                    ctx.throttle().await;
                    continue;
                }
            };
            ctx.throttle().await;

            if let Err(error) = self.write(ctx, client, rng, &objects).await {
                trace!(client = %client.id(), %error, "Write failed");
            }
            ctx.throttle().await;
        }
    }
}
