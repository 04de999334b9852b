use crate::session::GenerationOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub context: Vec<i64>,
    pub options: OllamaOptions,
}

impl GenerateRequest {
    pub fn new(
        model: impl Into<String>,
        prompt: impl Into<String>,
        options: &GenerationOptions,
        context: &[i64],
    ) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream: true,
            context: context.to_vec(),
            options: OllamaOptions::from(options),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OllamaOptions {
    pub temperature: f32,
    pub num_predict: u32,
    pub num_ctx: u32,
    pub num_thread: u32,
    pub top_k: u32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub num_gpu: u32,
    pub stop: Vec<String>,
}

impl From<&GenerationOptions> for OllamaOptions {
    fn from(options: &GenerationOptions) -> Self {
        Self {
            temperature: options.temperature,
            num_predict: options.max_tokens,
            num_ctx: options.context_window,
            num_thread: options.thread_count,
            top_k: options.top_k,
            top_p: options.top_p,
            repeat_penalty: options.repeat_penalty,
            num_gpu: options.num_gpu,
            stop: options.stop.clone(),
        }
    }
}

/// One line of a streamed `/api/generate` response.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub context: Option<Vec<i64>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TagsResponse {
    pub models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
pub struct ModelTag {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PerformanceMode;
    use serde_json::json;

    #[test]
    fn request_body_matches_generate_api() {
        let options = GenerationOptions::for_mode(PerformanceMode::QualityFirst);
        let request = GenerateRequest::new("taide-8b", "hi", &options, &[5, 6]);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["model"], "taide-8b");
        assert_eq!(body["prompt"], "hi");
        assert_eq!(body["stream"], true);
        assert_eq!(body["context"], json!([5, 6]));
        assert_eq!(body["options"]["num_predict"], 8192);
        assert_eq!(body["options"]["num_thread"], 8);
        assert_eq!(body["options"]["num_ctx"], 2048);
        assert_eq!(body["options"]["top_k"], 20);
        assert_eq!(body["options"]["num_gpu"], 1);
        assert_eq!(body["options"]["stop"], json!(["User:", "Assistant:"]));
    }

    #[test]
    fn tags_payload_parses() {
        let tags: TagsResponse =
            serde_json::from_str(r#"{"models":[{"name":"llama3:8b","size":1},{"name":"taide-8b"}]}"#)
                .unwrap();
        let names: Vec<_> = tags.models.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["llama3:8b", "taide-8b"]);
    }
}
