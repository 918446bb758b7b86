//! Running a model on a remote inference server.

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use field_pipeline::FieldDecoder;
use forecast_common::{FieldSet, RequestPatch, RetrieveRequest};
use model_output::{FieldEncoder, JsonLinesEncoder, Overrides};
use remote_client::{HttpTransport, MetadataQuery, RemoteApi, RemoteConfig, RemoteJobClient};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::{ModelConfig, REMOTE_PARAMETERS};
use crate::model::Model;
use crate::source::JsonLinesDecoder;

/// A connection to the remote server for one model.
pub struct Remote {
    api: RemoteApi,
    config: RemoteConfig,
    model: String,
    version: String,
}

impl Remote {
    pub fn connect(url: Option<String>, model: &str, version: &str) -> Result<Self> {
        let config = RemoteConfig::resolve(url, None)?;
        let transport = HttpTransport::from_config(&config)?;
        info!(url = %config.url, "Using remote server");
        Ok(Self {
            api: RemoteApi::new(config.url.clone(), Arc::new(transport)),
            config,
            model: model.to_string(),
            version: version.to_string(),
        })
    }

    pub fn api(&self) -> &RemoteApi {
        &self.api
    }

    /// Model configuration as published by the server.
    pub async fn model_config(&self) -> Result<ModelConfig> {
        let models = self.api.models().await?;
        if !models.iter().any(|m| m == &self.model) {
            error!(model = %self.model, "Model not available on remote server");
            bail!(
                "Model '{}' not available on remote server. Rerun with --models --remote to list available remote models.",
                self.model
            );
        }

        let query = MetadataQuery::Many(REMOTE_PARAMETERS.iter().map(|p| p.to_string()).collect());
        let params = self.api.metadata(&self.model, &self.version, &query).await?;

        let mut config = ModelConfig::default();
        config.apply_remote(&params)?;
        Ok(config)
    }

    /// Let the server adjust each request, keys it returns win.
    pub async fn patch_requests(&self, job_config: &Value, requests: Vec<RetrieveRequest>) -> Result<Vec<RetrieveRequest>> {
        let mut patched = Vec::with_capacity(requests.len());
        for mut request in requests {
            let update = self.api.patch_retrieve_request(job_config, &request).await?;
            request.merge(&update);
            patched.push(request);
        }
        Ok(patched)
    }

    /// Server updates for the requests an input will retrieve with.
    pub async fn server_patch(&self, job_config: &Value, requests: Vec<RetrieveRequest>) -> Result<ServerPatch> {
        ServerPatch::fetch(&self.api, job_config, requests).await
    }

    /// Upload the input fields, wait for the job and write every field of
    /// its result through the model's output.
    pub async fn run(&self, model: &mut Model, fields: &FieldSet, job_config: &Value) -> Result<usize> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input.jsonl");
        let output = dir.path().join("output.jsonl");

        let mut file = std::io::BufWriter::new(std::fs::File::create(&input)?);
        let encoder = JsonLinesEncoder;
        for field in fields.iter() {
            let encoded = encoder.encode(None, field.as_ref(), &Default::default())?;
            file.write_all(&encoded.bytes)?;
        }
        file.flush()?;
        drop(file);

        let client = RemoteJobClient::new(self.api.clone()).with_poll_interval(self.config.poll_interval);
        let outcome = client.run(&input, &output, job_config).await?;
        info!(bytes = outcome.bytes, "Received model output");

        let bytes = std::fs::read(&output)
            .with_context(|| format!("Failed to read model output: {}", output.display()))?;
        let results = JsonLinesDecoder.decode(&bytes)?;
        for field in results.iter() {
            model.write(None, field, Overrides::new())?;
        }
        Ok(results.len())
    }
}

/// Server updates fetched ahead of retrieval, applied to the request
/// each one was fetched for.
#[derive(Debug, Clone, Default)]
pub struct ServerPatch {
    updates: Vec<(RetrieveRequest, RetrieveRequest)>,
}

impl ServerPatch {
    pub async fn fetch(api: &RemoteApi, job_config: &Value, requests: Vec<RetrieveRequest>) -> Result<Self> {
        let mut updates = Vec::with_capacity(requests.len());
        for request in requests {
            let update = api.patch_retrieve_request(job_config, &request).await?;
            updates.push((request, update));
        }
        debug!(count = updates.len(), "Fetched server request patches");
        Ok(Self { updates })
    }
}

impl RequestPatch for ServerPatch {
    fn patch(&self, request: &mut RetrieveRequest) {
        if let Some((_, update)) = self.updates.iter().find(|(r, _)| r == request) {
            request.merge(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use field_pipeline::{FieldSource, RequestBasedInput};
    use forecast_common::{BaseField, Metadata, ModelSpec, ParamLevels, RunDateTime};
    use remote_client::{Body, Method, Reply, Transport};
    use reqwest::Url;
    use serde_json::json;

    /// Answers every patch call with `class=ai`, adding `expver` for
    /// requests that carry levels.
    #[derive(Default)]
    struct PatchServer {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Transport for PatchServer {
        async fn send(&self, _action: &'static str, _method: Method, url: &Url, body: Body) -> remote_client::Result<Reply> {
            *self.calls.lock().unwrap() += 1;
            let mut update = json!({"class": "ai"});
            if let Body::Json(body) = body {
                if body["patchrequest"].get("level").is_some() {
                    update["expver"] = json!("0099");
                }
            }
            Ok(Reply {
                status: 200,
                url: url.to_string(),
                body: Bytes::from(update.to_string()),
            })
        }

        async fn download(&self, _url: &Url, _target: &Path) -> remote_client::Result<u64> {
            Ok(0)
        }
    }

    /// Records requests and returns one field per (param, levelist).
    #[derive(Default)]
    struct Recording {
        requests: Mutex<Vec<RetrieveRequest>>,
    }

    impl FieldSource for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn retrieve(&self, request: &RetrieveRequest) -> forecast_common::Result<FieldSet> {
            self.requests.lock().unwrap().push(request.clone());
            let levtype = request.strings("levtype").join("");
            let levels: Vec<i64> = match request.get("levelist") {
                Some(v) => v.items().iter().filter_map(|l| l.as_i64()).collect(),
                None => vec![0],
            };
            let mut fields = FieldSet::empty();
            for param in request.strings("param") {
                for level in &levels {
                    let field = BaseField::new(vec![1.0], Metadata::new())
                        .with("param", param.as_str())
                        .with("levtype", levtype.as_str())
                        .with("levelist", *level)
                        .with("date", 20230101i64)
                        .with("time", 0i64);
                    fields.push(field.into_ref());
                }
            }
            Ok(fields)
        }
    }

    #[tokio::test]
    async fn test_server_patch_reaches_input_retrieval() {
        let server = Arc::new(PatchServer::default());
        let api = RemoteApi::new(Url::parse("https://remote.example/api/v1/").unwrap(), server.clone());
        let spec = ModelSpec {
            param_sfc: vec!["2t".into()],
            param_level_pl: ParamLevels::new(&["t"], &[500]),
            ..ModelSpec::default()
        };
        let source = Arc::new(Recording::default());
        let input = RequestBasedInput::new(source.clone(), spec, vec![RunDateTime::new(20230101, 0)]);

        let patch = ServerPatch::fetch(&api, &json!({"model": "m"}), input.requests())
            .await
            .unwrap();
        assert_eq!(*server.calls.lock().unwrap(), 2);

        let input = input.with_patch(Arc::new(patch));
        input.all_fields().unwrap();

        let requests = source.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].strings("levtype"), vec!["sfc"]);
        assert_eq!(requests[0].strings("class"), vec!["ai"]);
        assert!(!requests[0].contains_key("expver"));
        assert_eq!(requests[1].strings("levtype"), vec!["pl"]);
        assert_eq!(requests[1].strings("class"), vec!["ai"]);
        assert_eq!(requests[1].strings("expver"), vec!["0099"]);
    }

    #[test]
    fn test_server_patch_ignores_unknown_requests() {
        let known = RetrieveRequest::new().with("param", "2t");
        let patch = ServerPatch {
            updates: vec![(known.clone(), RetrieveRequest::new().with("class", "ai"))],
        };

        let mut other = RetrieveRequest::new().with("param", "msl");
        patch.patch(&mut other);
        assert!(!other.contains_key("class"));

        let mut same = known;
        patch.patch(&mut same);
        assert_eq!(same.strings("class"), vec!["ai"]);
    }
}
