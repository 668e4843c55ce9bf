//! Remote KV (DynamoDB-style) client directory backend.
//!
//! Looked up via a GSI on `api_key`. Hits are cached in memory for 300s
//! keyed by the presented key; misses are never cached, so a newly
//! provisioned client isn't denied by stale negative caching. The cache
//! is pruned lazily on expiry-read rather than swept on a timer.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use dashmap::DashMap;

use lr_types::{ClientRecord, ClientStatus, Provider};

use crate::ClientDirectory;

const CACHE_TTL: Duration = Duration::from_secs(300);
const API_KEY_INDEX: &str = "api_key-index";

struct CacheEntry {
    record: ClientRecord,
    expires_at: Instant,
}

pub struct RemoteDirectory {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
    cache: DashMap<String, CacheEntry>,
}

impl RemoteDirectory {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        RemoteDirectory {
            client,
            table_name: table_name.into(),
            cache: DashMap::new(),
        }
    }

    async fn query_by_key(&self, api_key: &str) -> Option<ClientRecord> {
        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(API_KEY_INDEX)
            .key_condition_expression("api_key = :k")
            .expression_attribute_values(":k", AttributeValue::S(api_key.to_string()))
            .limit(1)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(error = %err, "client directory query failed, treating as miss");
                return None;
            }
        };

        output.items().first().and_then(item_to_client_record)
    }
}

fn item_to_client_record(
    item: &std::collections::HashMap<String, AttributeValue>,
) -> Option<ClientRecord> {
    let client_id = item.get("client_id")?.as_s().ok()?.clone();
    let api_key = item.get("api_key")?.as_s().ok()?.clone();

    let provider = match item.get("provider").and_then(|v| v.as_s().ok()).map(String::as_str) {
        Some("bedrock") => Provider::Bedrock,
        _ => Provider::Openai,
    };

    let rate_limit_rpm = item
        .get("rate_limit_rpm")
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse::<u32>().ok())
        .unwrap_or(60);

    let model_allowlist: HashSet<String> = item
        .get("model_allowlist")
        .and_then(|v| v.as_ss().ok())
        .map(|ss| ss.iter().cloned().collect())
        .unwrap_or_default();

    let upstream_api_key = item
        .get("upstream_api_key")
        .and_then(|v| v.as_s().ok())
        .cloned()
        .unwrap_or_default();

    let bedrock_model_id = item
        .get("bedrock_model_id")
        .and_then(|v| v.as_s().ok())
        .cloned()
        .unwrap_or_default();

    let status = match item.get("status").and_then(|v| v.as_s().ok()).map(String::as_str) {
        Some("suspended") => ClientStatus::Suspended,
        _ => ClientStatus::Active,
    };

    Some(ClientRecord {
        client_id,
        api_key,
        provider,
        rate_limit_rpm,
        model_allowlist,
        upstream_api_key,
        bedrock_model_id,
        status,
    })
}

#[async_trait]
impl ClientDirectory for RemoteDirectory {
    async fn lookup(&self, api_key: &str) -> Option<ClientRecord> {
        if let Some(entry) = self.cache.get(api_key) {
            if Instant::now() < entry.expires_at {
                return Some(entry.record.clone());
            }
        }
        self.cache.remove(api_key);

        let record = self.query_by_key(api_key).await?;
        self.cache.insert(
            api_key.to_string(),
            CacheEntry {
                record: record.clone(),
                expires_at: Instant::now() + CACHE_TTL,
            },
        );
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_full_item_into_client_record() {
        let mut item = HashMap::new();
        item.insert("client_id".to_string(), AttributeValue::S("c1".to_string()));
        item.insert("api_key".to_string(), AttributeValue::S("k1".to_string()));
        item.insert("provider".to_string(), AttributeValue::S("bedrock".to_string()));
        item.insert("rate_limit_rpm".to_string(), AttributeValue::N("120".to_string()));
        item.insert("status".to_string(), AttributeValue::S("suspended".to_string()));

        let record = item_to_client_record(&item).unwrap();
        assert_eq!(record.client_id, "c1");
        assert_eq!(record.provider, Provider::Bedrock);
        assert_eq!(record.rate_limit_rpm, 120);
        assert_eq!(record.status, ClientStatus::Suspended);
    }

    #[test]
    fn missing_required_fields_yield_none() {
        let item = HashMap::new();
        assert!(item_to_client_record(&item).is_none());
    }

    #[test]
    fn defaults_apply_when_optional_fields_absent() {
        let mut item = HashMap::new();
        item.insert("client_id".to_string(), AttributeValue::S("c2".to_string()));
        item.insert("api_key".to_string(), AttributeValue::S("k2".to_string()));

        let record = item_to_client_record(&item).unwrap();
        assert_eq!(record.provider, Provider::Openai);
        assert_eq!(record.rate_limit_rpm, 60);
        assert_eq!(record.status, ClientStatus::Active);
        assert!(record.model_allowlist.is_empty());
    }
}
